//! Review Surface (§4.8): reviewer set and label approvals as a state
//! machine, not UI. Account resolution (by id/email/username/display name)
//! is a seam ([`AccountResolver`]) backed by the external account directory
//! this crate deliberately does not own (§1 "Deliberately out of scope").

use async_trait::async_trait;

use crate::change::model::{label_range, Approval, Change, Reviewer, ReviewerState};
use crate::server::error::ServerError;
use chrono::Utc;

/// An account resolved from a caller-supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub account_id: String,
    pub is_active: bool,
}

/// Resolves numeric id / email / username / display name to an account, with
/// fuzzy matching as a last resort (§4.8 `addReviewer`). An embedder backs
/// this with the account directory.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, identifier: &str) -> Result<Option<ResolvedAccount>, ServerError>;
}

/// §4.8 `getReviewers(change)`: union of `REVIEWER` and `CC` sets.
pub fn get_reviewers(change: &Change) -> &[Reviewer] {
    &change.metadata.reviewers
}

/// §4.8 `addReviewer(change, reviewer_str, state)`.
pub async fn add_reviewer<R: AccountResolver>(
    change: &mut Change,
    reviewer_str: &str,
    state: ReviewerState,
    resolver: &R,
) -> Result<(), ServerError> {
    let account = resolver
        .resolve(reviewer_str)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("no account matches {reviewer_str}")))?;

    if !account.is_active {
        return Err(ServerError::PermissionDenied(format!(
            "account {} is inactive",
            account.account_id
        )));
    }
    if account.account_id == change.owner_account_id {
        return Err(ServerError::PermissionDenied(
            "the change owner cannot be added as a reviewer".to_string(),
        ));
    }
    if change
        .metadata
        .reviewers
        .iter()
        .any(|r| r.account_id == account.account_id)
    {
        return Err(ServerError::AlreadyExists(format!(
            "{} is already a reviewer on change {}",
            account.account_id, change.change_key
        )));
    }

    change.metadata.reviewers.push(Reviewer {
        account_id: account.account_id,
        state,
    });
    Ok(())
}

/// §4.8 `removeReviewer(change, identifier)`.
pub fn remove_reviewer(change: &mut Change, identifier: &str) -> Result<(), ServerError> {
    let before = change.metadata.reviewers.len();
    change
        .metadata
        .reviewers
        .retain(|r| r.account_id != identifier);
    if change.metadata.reviewers.len() == before {
        return Err(ServerError::NotFound(format!(
            "{identifier} is not a reviewer on change {}",
            change.change_key
        )));
    }
    Ok(())
}

/// §4.8 `review(change, revision, labels, …)`: validate each `(label,
/// value)` against its allowed range and replace the user's prior vote.
pub fn review(
    change: &mut Change,
    revision: u32,
    labels: &[(String, i32)],
    user_account_id: &str,
) -> Result<(), ServerError> {
    if !change.patch_sets.iter().any(|p| p.number == revision) {
        return Err(ServerError::NotFound(format!(
            "change {} has no patch set {revision}",
            change.change_key
        )));
    }

    for (label, value) in labels {
        let (min, max) = label_range(label);
        if *value < min || *value > max {
            return Err(ServerError::BadRequest(format!(
                "label {label} value {value} is out of range [{min}, {max}]"
            )));
        }
    }

    let now = Utc::now();
    for (label, value) in labels {
        change.add_or_replace_approval(Approval {
            label: label.clone(),
            value: *value,
            user_account_id: user_account_id.to_string(),
            revision,
            granted_at: now,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::model::{ChangeMetadata, ChangeStatus, PatchSet};

    fn base_change() -> Change {
        Change {
            id: 1,
            change_key: format!("I{}", "a".repeat(40)),
            project_name: "demo".to_string(),
            dest_branch: "main".to_string(),
            subject: "Fix the thing".to_string(),
            topic: None,
            status: ChangeStatus::New,
            owner_account_id: "alice".to_string(),
            current_patch_set_number: 1,
            created_on: Utc::now(),
            last_updated_on: Utc::now(),
            patch_sets: vec![PatchSet {
                number: 1,
                commit_id: "1".repeat(40),
                uploader_account_id: "alice".to_string(),
                created_on: Utc::now(),
                description: None,
                is_draft: false,
            }],
            metadata: ChangeMetadata::default(),
            approvals: vec![],
        }
    }

    struct FakeResolver {
        accounts: Vec<ResolvedAccount>,
    }

    #[async_trait]
    impl AccountResolver for FakeResolver {
        async fn resolve(&self, identifier: &str) -> Result<Option<ResolvedAccount>, ServerError> {
            Ok(self
                .accounts
                .iter()
                .find(|a| a.account_id == identifier)
                .cloned())
        }
    }

    #[tokio::test]
    async fn add_reviewer_succeeds_for_active_non_owner() {
        let mut change = base_change();
        let resolver = FakeResolver {
            accounts: vec![ResolvedAccount {
                account_id: "bob".to_string(),
                is_active: true,
            }],
        };
        add_reviewer(&mut change, "bob", ReviewerState::Reviewer, &resolver)
            .await
            .unwrap();
        assert_eq!(get_reviewers(&change).len(), 1);
    }

    #[tokio::test]
    async fn add_reviewer_rejects_owner() {
        let mut change = base_change();
        let resolver = FakeResolver {
            accounts: vec![ResolvedAccount {
                account_id: "alice".to_string(),
                is_active: true,
            }],
        };
        let err = add_reviewer(&mut change, "alice", ReviewerState::Reviewer, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn add_reviewer_twice_yields_already_added_error() {
        let mut change = base_change();
        let resolver = FakeResolver {
            accounts: vec![ResolvedAccount {
                account_id: "bob".to_string(),
                is_active: true,
            }],
        };
        add_reviewer(&mut change, "bob", ReviewerState::Reviewer, &resolver)
            .await
            .unwrap();
        let err = add_reviewer(&mut change, "bob", ReviewerState::Reviewer, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::AlreadyExists(_)));
        assert_eq!(get_reviewers(&change).len(), 1);
    }

    #[tokio::test]
    async fn add_reviewer_rejects_inactive_account() {
        let mut change = base_change();
        let resolver = FakeResolver {
            accounts: vec![ResolvedAccount {
                account_id: "bob".to_string(),
                is_active: false,
            }],
        };
        let err = add_reviewer(&mut change, "bob", ReviewerState::Reviewer, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PermissionDenied(_)));
    }

    #[test]
    fn remove_reviewer_missing_is_not_found() {
        let mut change = base_change();
        let err = remove_reviewer(&mut change, "bob").unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn remove_reviewer_removes_existing() {
        let mut change = base_change();
        change.metadata.reviewers.push(Reviewer {
            account_id: "bob".to_string(),
            state: ReviewerState::Cc,
        });
        remove_reviewer(&mut change, "bob").unwrap();
        assert!(get_reviewers(&change).is_empty());
    }

    #[test]
    fn review_rejects_out_of_range_label_value() {
        let mut change = base_change();
        let err = review(&mut change, 1, &[("Code-Review".to_string(), 5)], "bob").unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        assert!(change.approvals.is_empty());
    }

    #[test]
    fn review_replaces_prior_vote_from_same_user() {
        let mut change = base_change();
        review(&mut change, 1, &[("Code-Review".to_string(), 1)], "bob").unwrap();
        review(&mut change, 1, &[("Code-Review".to_string(), 2)], "bob").unwrap();
        assert_eq!(change.approvals.len(), 1);
        assert_eq!(change.approvals[0].value, 2);
    }

    #[test]
    fn review_rejects_unknown_revision() {
        let mut change = base_change();
        let err = review(&mut change, 9, &[("Verified".to_string(), 1)], "bob").unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }
}
