//! The durable Change data model (§3): typed records for Change, PatchSet,
//! Approval, Reviewer, Comment and Project. Weakly-typed metadata documents
//! from the source system are represented here as tagged-union structs per
//! Design Note "weakly-typed metadata documents"; a document column is only
//! the storage boundary, not the in-memory shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::error::ServerError;

/// Maximum length of a Change subject, truncated from the commit's first
/// message line (§4.5.3).
pub const MAX_SUBJECT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    New,
    Merged,
    Abandoned,
}

impl ChangeStatus {
    /// §3: `status` transitions `NEW → ABANDONED → NEW → MERGED`; `MERGED` is
    /// terminal.
    pub fn can_transition_to(self, next: ChangeStatus) -> bool {
        use ChangeStatus::*;
        match (self, next) {
            (New, Abandoned) | (New, Merged) | (Abandoned, New) => true,
            (s, n) if s == n => true,
            _ => false,
        }
    }

    pub fn is_terminal_for_new_patch_sets(self) -> bool {
        matches!(self, ChangeStatus::Merged | ChangeStatus::Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewerState {
    Reviewer,
    Cc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub account_id: String,
    pub state: ReviewerState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub path: String,
    pub side: CommentSide,
    pub line: Option<u32>,
    pub range: Option<(u32, u32)>,
    pub message: String,
    pub author: String,
    pub updated: DateTime<Utc>,
    pub unresolved: bool,
    pub deleted: bool,
    pub in_reply_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentSide {
    Base,
    Revision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub label: String,
    pub value: i32,
    pub user_account_id: String,
    pub revision: u32,
    pub granted_at: DateTime<Utc>,
}

/// Default label ranges (§3): `Code-Review ∈ [-2,2]`, `Verified ∈ [-1,1]`;
/// anything else defaults to `[-2,2]`.
pub fn label_range(label: &str) -> (i32, i32) {
    match label {
        "Verified" => (-1, 1),
        _ => (-2, 2),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    pub number: u32,
    pub commit_id: String,
    pub uploader_account_id: String,
    pub created_on: DateTime<Utc>,
    pub description: Option<String>,
    pub is_draft: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeMetadata {
    pub is_private: bool,
    pub work_in_progress: bool,
    pub reviewers: Vec<Reviewer>,
    pub comments: Vec<Comment>,
    pub drafts: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: i64,
    pub change_key: String,
    pub project_name: String,
    pub dest_branch: String,
    pub subject: String,
    pub topic: Option<String>,
    pub status: ChangeStatus,
    pub owner_account_id: String,
    pub current_patch_set_number: u32,
    pub created_on: DateTime<Utc>,
    pub last_updated_on: DateTime<Utc>,
    pub patch_sets: Vec<PatchSet>,
    pub metadata: ChangeMetadata,
    pub approvals: Vec<Approval>,
}

impl Change {
    /// Checks the invariants from §3/§8 hold. Used by tests and as a
    /// debug-time sanity check after mutation; production code should never
    /// be able to construct a Change that fails this.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !crate::change::change_id::validate(&self.change_key) {
            return Err(format!("invalid change_key {}", self.change_key));
        }
        if self.current_patch_set_number as usize != self.patch_sets.len() {
            return Err("current_patch_set_number does not match patch set count".to_string());
        }
        let max_number = self.patch_sets.iter().map(|p| p.number).max().unwrap_or(0);
        if max_number != self.current_patch_set_number {
            return Err("current_patch_set_number does not match max patch set number".to_string());
        }
        let mut numbers: Vec<u32> = self.patch_sets.iter().map(|p| p.number).collect();
        numbers.sort_unstable();
        for (i, n) in numbers.iter().enumerate() {
            if *n != (i + 1) as u32 {
                return Err("patch set numbers are not dense and 1-based".to_string());
            }
        }
        Ok(())
    }

    /// Subject derivation rule from §4.5.3 / §8: trim, truncate at 1000
    /// chars, empty first line becomes `"No subject"`.
    pub fn derive_subject(first_line: &str) -> String {
        let trimmed = first_line.trim();
        if trimmed.is_empty() {
            return "No subject".to_string();
        }
        trimmed.chars().take(MAX_SUBJECT_LEN).collect()
    }

    /// §3: Abandon/Restore/Merge are governed by [`ChangeStatus::can_transition_to`].
    pub fn transition_status(&mut self, next: ChangeStatus) -> Result<(), ServerError> {
        if !self.status.can_transition_to(next) {
            return Err(ServerError::Conflict(format!(
                "change {} cannot transition from {:?} to {:?}",
                self.change_key, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn add_or_replace_approval(&mut self, approval: Approval) {
        self.approvals.retain(|a| {
            !(a.label == approval.label && a.user_account_id == approval.user_account_id)
        });
        self.approvals.push(approval);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectState {
    Active,
    ReadOnly,
    Hidden,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub parent_name: Option<String>,
    pub description: Option<String>,
    pub state: ProjectState,
    pub head_ref: String,
}

/// `refs/changes/XX/HASH/N` (§3, §6). `HASH` is the change-key without its
/// leading `I`, `XX` its last two characters, `N` the patch-set number.
pub fn synthetic_ref_name(change_key: &str, patch_set_number: u32) -> String {
    let hash = change_key.trim_start_matches('I');
    let suffix = &hash[hash.len().saturating_sub(2)..];
    format!("refs/changes/{suffix}/{hash}/{patch_set_number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_change() -> Change {
        Change {
            id: 1,
            change_key: "I".to_string() + &"a".repeat(40),
            project_name: "demo".to_string(),
            dest_branch: "main".to_string(),
            subject: "Subject".to_string(),
            topic: None,
            status: ChangeStatus::New,
            owner_account_id: "owner".to_string(),
            current_patch_set_number: 1,
            created_on: Utc::now(),
            last_updated_on: Utc::now(),
            patch_sets: vec![PatchSet {
                number: 1,
                commit_id: "deadbeef".repeat(5),
                uploader_account_id: "owner".to_string(),
                created_on: Utc::now(),
                description: None,
                is_draft: false,
            }],
            metadata: ChangeMetadata::default(),
            approvals: vec![],
        }
    }

    #[test]
    fn invariants_hold_for_well_formed_change() {
        assert!(base_change().check_invariants().is_ok());
    }

    #[test]
    fn invariants_reject_mismatched_patch_set_count() {
        let mut change = base_change();
        change.current_patch_set_number = 2;
        assert!(change.check_invariants().is_err());
    }

    #[test]
    fn derive_subject_truncates_and_defaults() {
        assert_eq!(Change::derive_subject("  hello  "), "hello");
        assert_eq!(Change::derive_subject(""), "No subject");
        assert_eq!(Change::derive_subject("   "), "No subject");
        let long = "x".repeat(2000);
        assert_eq!(Change::derive_subject(&long).len(), MAX_SUBJECT_LEN);
    }

    #[test]
    fn abandon_then_restore_then_abandon_permitted() {
        let mut change = base_change();
        assert!(change.transition_status(ChangeStatus::Abandoned).is_ok());
        assert!(change.transition_status(ChangeStatus::New).is_ok());
        assert!(change.transition_status(ChangeStatus::Abandoned).is_ok());
    }

    #[test]
    fn abandon_then_merge_rejected() {
        let mut change = base_change();
        change.transition_status(ChangeStatus::Abandoned).unwrap();
        assert!(change.transition_status(ChangeStatus::Merged).is_err());
    }

    #[test]
    fn synthetic_ref_name_matches_spec_format() {
        let key = format!("I{}", "a".repeat(40));
        assert_eq!(
            synthetic_ref_name(&key, 1),
            format!("refs/changes/aa/{}/1", "a".repeat(40))
        );
    }

    #[test]
    fn add_or_replace_approval_keeps_one_per_label_and_user() {
        let mut change = base_change();
        let now = Utc::now();
        change.add_or_replace_approval(Approval {
            label: "Code-Review".to_string(),
            value: 1,
            user_account_id: "alice".to_string(),
            revision: 1,
            granted_at: now,
        });
        change.add_or_replace_approval(Approval {
            label: "Code-Review".to_string(),
            value: 2,
            user_account_id: "alice".to_string(),
            revision: 1,
            granted_at: now,
        });
        assert_eq!(change.approvals.len(), 1);
        assert_eq!(change.approvals[0].value, 2);
    }

    // §8 property: derive_subject never exceeds MAX_SUBJECT_LEN and never
    // returns an empty string, for any input.
    quickcheck::quickcheck! {
        fn derive_subject_is_bounded_and_nonempty(first_line: String) -> bool {
            let subject = Change::derive_subject(&first_line);
            !subject.is_empty() && subject.chars().count() <= MAX_SUBJECT_LEN
        }
    }

    // §8 property: appending patch sets 1..=n in order always satisfies
    // check_invariants, whatever n is (within a reasonable bound so the test
    // stays fast).
    quickcheck::quickcheck! {
        fn dense_patch_set_sequence_satisfies_invariants(extra_patch_sets: u8) -> bool {
            let n = (extra_patch_sets % 20) + 1;
            let mut change = base_change();
            change.patch_sets.clear();
            change.current_patch_set_number = 0;
            for i in 1..=n as u32 {
                change.patch_sets.push(PatchSet {
                    number: i,
                    commit_id: format!("{i}").repeat(40).chars().take(40).collect(),
                    uploader_account_id: "alice".to_string(),
                    created_on: Utc::now(),
                    description: None,
                    is_draft: false,
                });
                change.current_patch_set_number = i;
            }
            change.check_invariants().is_ok()
        }
    }
}
