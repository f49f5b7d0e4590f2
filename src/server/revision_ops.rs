//! Revision Ops (§4.7): rebase, submit, cherry-pick, revert and move against
//! live repositories. The actual checkout/replay/merge mechanics are a seam
//! ([`RevisionRepository`]) an embedder backs with its object database; this
//! module owns only the preconditions, state transitions and Change
//! construction around those mechanics.

use chrono::Utc;
use tracing::info;

use crate::change::change_id;
use crate::change::model::{Change, ChangeMetadata, ChangeStatus, PatchSet};
use crate::change::store::ChangeStore;
use crate::server::error::ServerError;

/// Result of attempting to replay a patch-set commit onto a new base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseResult {
    Ok { new_commit_id: String },
    Conflicts,
    Other(String),
}

/// Result of attempting to merge a patch-set commit into a destination
/// branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Merged { commit_id: String },
    Conflicting,
    Failed(String),
}

/// Repository-level mechanics a revision operation needs. An embedder backs
/// this with checkout/replay/merge against a real working tree (or an
/// equivalent in-memory merge), mirroring how `RepositoryAccess` backs the
/// wire-protocol engine.
#[async_trait::async_trait]
pub trait RevisionRepository: Send + Sync {
    async fn branch_tip(&self, project_name: &str, branch: &str) -> Result<String, ServerError>;

    async fn rebase_commit(
        &self,
        project_name: &str,
        commit_id: &str,
        onto: &str,
    ) -> Result<RebaseResult, ServerError>;

    async fn merge_commit(
        &self,
        project_name: &str,
        commit_id: &str,
        onto: &str,
        message: &str,
    ) -> Result<MergeResult, ServerError>;
}

fn latest_patch_set(change: &Change) -> Result<&PatchSet, ServerError> {
    change
        .patch_sets
        .iter()
        .max_by_key(|p| p.number)
        .ok_or_else(|| ServerError::Conflict(format!("change {} has no patch sets", change.change_key)))
}

fn require_new(change: &Change) -> Result<(), ServerError> {
    if change.status != ChangeStatus::New {
        return Err(ServerError::Conflict(format!(
            "change {} is {:?}, not NEW",
            change.change_key, change.status
        )));
    }
    Ok(())
}

/// §4.7 `rebase(change)`. Preconditions: `status == NEW`, at least one patch
/// set. On success a new patch set is appended with the rebased commit (the
/// spec leaves append-vs-update-in-place implementation-defined; this crate
/// appends, so the prior patch set remains an immutable record per §3).
pub async fn rebase<R: RevisionRepository>(
    change: &mut Change,
    uploader_account_id: &str,
    repo: &R,
) -> Result<(), ServerError> {
    require_new(change)?;
    let tip_commit_id = latest_patch_set(change)?.commit_id.clone();

    let onto = repo.branch_tip(&change.project_name, &change.dest_branch).await?;
    match repo.rebase_commit(&change.project_name, &tip_commit_id, &onto).await? {
        RebaseResult::Ok { new_commit_id } => {
            let number = change.current_patch_set_number + 1;
            let now = Utc::now();
            change.patch_sets.push(PatchSet {
                number,
                commit_id: new_commit_id,
                uploader_account_id: uploader_account_id.to_string(),
                created_on: now,
                description: Some("Rebase".to_string()),
                is_draft: false,
            });
            change.current_patch_set_number = number;
            change.last_updated_on = now;
            info!(change_key = %change.change_key, patch_set = number, "rebased change");
            Ok(())
        }
        RebaseResult::Conflicts => Err(ServerError::Conflict(format!(
            "rebase of change {} conflicts with {}",
            change.change_key, change.dest_branch
        ))),
        RebaseResult::Other(msg) => Err(ServerError::Conflict(msg)),
    }
}

/// §4.7 `submit(change)`. Preconditions: `status == NEW`.
pub async fn submit<R: RevisionRepository>(change: &mut Change, repo: &R) -> Result<(), ServerError> {
    require_new(change)?;
    let tip_commit_id = latest_patch_set(change)?.commit_id.clone();
    let message = format!("Merge change {}: {}", change.change_key, change.subject);

    match repo
        .merge_commit(&change.project_name, &tip_commit_id, &change.dest_branch, &message)
        .await?
    {
        MergeResult::Merged { commit_id } => {
            change.transition_status(ChangeStatus::Merged)?;
            change.last_updated_on = Utc::now();
            info!(change_key = %change.change_key, commit_id = %commit_id, "submitted change");
            Ok(())
        }
        MergeResult::Conflicting => Err(ServerError::Conflict(format!(
            "change {} conflicts with {}",
            change.change_key, change.dest_branch
        ))),
        MergeResult::Failed(msg) => Err(ServerError::Conflict(msg)),
    }
}

/// §4.7 `cherryPick(change, revision, destination, message?)`: a brand-new
/// Change with a fresh key, same project, targeting `destination`.
pub fn cherry_pick(
    source: &Change,
    revision_commit_id: &str,
    destination: &str,
    message: Option<&str>,
    new_id: i64,
    uploader_account_id: &str,
) -> Change {
    let now = Utc::now();
    let subject = message
        .map(Change::derive_subject)
        .unwrap_or_else(|| source.subject.clone());
    let new_key = change_id::generate(
        revision_commit_id,
        &[],
        uploader_account_id,
        uploader_account_id,
        &format!("{subject}\n\n{now}", now = now.timestamp()),
    );

    Change {
        id: new_id,
        change_key: new_key,
        project_name: source.project_name.clone(),
        dest_branch: destination.to_string(),
        subject,
        topic: None,
        status: ChangeStatus::New,
        owner_account_id: uploader_account_id.to_string(),
        current_patch_set_number: 1,
        created_on: now,
        last_updated_on: now,
        patch_sets: vec![PatchSet {
            number: 1,
            commit_id: revision_commit_id.to_string(),
            uploader_account_id: uploader_account_id.to_string(),
            created_on: now,
            description: None,
            is_draft: false,
        }],
        metadata: ChangeMetadata::default(),
        approvals: vec![],
    }
}

/// §4.7 `revert(change, message?, topic?)`. Preconditions: source
/// `status == MERGED`.
pub fn revert(
    source: &Change,
    revert_commit_id: &str,
    message: Option<&str>,
    topic: Option<&str>,
    new_id: i64,
) -> Result<Change, ServerError> {
    if source.status != ChangeStatus::Merged {
        return Err(ServerError::Conflict(format!(
            "change {} is {:?}, not MERGED",
            source.change_key, source.status
        )));
    }
    let now = Utc::now();
    let subject = message
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("Revert \"{}\"", source.subject));
    let new_key = change_id::generate(
        revert_commit_id,
        &[],
        &source.owner_account_id,
        &source.owner_account_id,
        &format!("{subject}\n\n{now}", now = now.timestamp()),
    );

    Ok(Change {
        id: new_id,
        change_key: new_key,
        project_name: source.project_name.clone(),
        dest_branch: source.dest_branch.clone(),
        subject,
        topic: topic.map(|t| t.to_string()),
        status: ChangeStatus::New,
        owner_account_id: source.owner_account_id.clone(),
        current_patch_set_number: 1,
        created_on: now,
        last_updated_on: now,
        patch_sets: vec![PatchSet {
            number: 1,
            commit_id: revert_commit_id.to_string(),
            uploader_account_id: source.owner_account_id.clone(),
            created_on: now,
            description: None,
            is_draft: false,
        }],
        metadata: ChangeMetadata::default(),
        approvals: vec![],
    })
}

/// §4.7 `move(change, new_branch)`. Preconditions: `NEW`. Mutates
/// `dest_branch` only.
pub fn move_change(change: &mut Change, new_branch: &str) -> Result<(), ServerError> {
    require_new(change)?;
    change.dest_branch = new_branch.to_string();
    change.last_updated_on = Utc::now();
    Ok(())
}

/// Allocates a fresh numeric Change id from the store, for operations
/// (`cherryPick`, `revert`) that create a new Change rather than mutate an
/// existing one.
pub async fn allocate_new_change_id<S: ChangeStore>(store: &S) -> Result<i64, ServerError> {
    store.next_id().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::store::InMemoryChangeStore;
    use std::sync::Mutex;

    fn base_change(status: ChangeStatus) -> Change {
        let key = format!("I{}", "a".repeat(40));
        Change {
            id: 1,
            change_key: key,
            project_name: "demo".to_string(),
            dest_branch: "main".to_string(),
            subject: "Fix the thing".to_string(),
            topic: None,
            status,
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

    struct FakeRepo {
        tip: String,
        rebase_result: Mutex<Option<RebaseResult>>,
        merge_result: Mutex<Option<MergeResult>>,
    }

    #[async_trait::async_trait]
    impl RevisionRepository for FakeRepo {
        async fn branch_tip(&self, _project_name: &str, _branch: &str) -> Result<String, ServerError> {
            Ok(self.tip.clone())
        }

        async fn rebase_commit(
            &self,
            _project_name: &str,
            _commit_id: &str,
            _onto: &str,
        ) -> Result<RebaseResult, ServerError> {
            Ok(self.rebase_result.lock().unwrap().take().unwrap())
        }

        async fn merge_commit(
            &self,
            _project_name: &str,
            _commit_id: &str,
            _onto: &str,
            _message: &str,
        ) -> Result<MergeResult, ServerError> {
            Ok(self.merge_result.lock().unwrap().take().unwrap())
        }
    }

    #[tokio::test]
    async fn rebase_appends_patch_set_on_success() {
        let mut change = base_change(ChangeStatus::New);
        let repo = FakeRepo {
            tip: "2".repeat(40),
            rebase_result: Mutex::new(Some(RebaseResult::Ok {
                new_commit_id: "3".repeat(40),
            })),
            merge_result: Mutex::new(None),
        };
        rebase(&mut change, "alice", &repo).await.unwrap();
        assert_eq!(change.current_patch_set_number, 2);
        assert_eq!(change.patch_sets.len(), 2);
        assert!(change.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn rebase_conflicts_returns_conflict_error() {
        let mut change = base_change(ChangeStatus::New);
        let repo = FakeRepo {
            tip: "2".repeat(40),
            rebase_result: Mutex::new(Some(RebaseResult::Conflicts)),
            merge_result: Mutex::new(None),
        };
        let err = rebase(&mut change, "alice", &repo).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[tokio::test]
    async fn rebase_rejects_non_new_change() {
        let mut change = base_change(ChangeStatus::Merged);
        let repo = FakeRepo {
            tip: "2".repeat(40),
            rebase_result: Mutex::new(None),
            merge_result: Mutex::new(None),
        };
        assert!(rebase(&mut change, "alice", &repo).await.is_err());
    }

    #[tokio::test]
    async fn submit_transitions_to_merged_on_success() {
        let mut change = base_change(ChangeStatus::New);
        let repo = FakeRepo {
            tip: "2".repeat(40),
            rebase_result: Mutex::new(None),
            merge_result: Mutex::new(Some(MergeResult::Merged {
                commit_id: "4".repeat(40),
            })),
        };
        submit(&mut change, &repo).await.unwrap();
        assert_eq!(change.status, ChangeStatus::Merged);
    }

    #[tokio::test]
    async fn submit_conflicting_returns_conflict_and_leaves_status_new() {
        let mut change = base_change(ChangeStatus::New);
        let repo = FakeRepo {
            tip: "2".repeat(40),
            rebase_result: Mutex::new(None),
            merge_result: Mutex::new(Some(MergeResult::Conflicting)),
        };
        let err = submit(&mut change, &repo).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
        assert_eq!(change.status, ChangeStatus::New);
    }

    #[tokio::test]
    async fn abandon_then_submit_is_rejected() {
        let mut change = base_change(ChangeStatus::New);
        change.transition_status(ChangeStatus::Abandoned).unwrap();
        let repo = FakeRepo {
            tip: "2".repeat(40),
            rebase_result: Mutex::new(None),
            merge_result: Mutex::new(None),
        };
        let err = submit(&mut change, &repo).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[test]
    fn cherry_pick_creates_new_change_with_fresh_key() {
        let source = base_change(ChangeStatus::New);
        let picked = cherry_pick(&source, &"5".repeat(40), "release", None, 2, "bob");
        assert_ne!(picked.change_key, source.change_key);
        assert!(change_id::validate(&picked.change_key));
        assert_eq!(picked.dest_branch, "release");
        assert_eq!(picked.status, ChangeStatus::New);
        assert_eq!(picked.subject, source.subject);
    }

    #[test]
    fn revert_requires_merged_source() {
        let source = base_change(ChangeStatus::New);
        assert!(revert(&source, &"6".repeat(40), None, None, 2).is_err());
    }

    #[test]
    fn revert_of_merged_change_has_default_subject() {
        let mut source = base_change(ChangeStatus::New);
        source.transition_status(ChangeStatus::Merged).unwrap();
        let reverted = revert(&source, &"6".repeat(40), None, None, 2).unwrap();
        assert_eq!(reverted.subject, "Revert \"Fix the thing\"");
        assert_eq!(reverted.dest_branch, source.dest_branch);
    }

    #[test]
    fn move_change_mutates_dest_branch_only_when_new() {
        let mut change = base_change(ChangeStatus::New);
        move_change(&mut change, "release").unwrap();
        assert_eq!(change.dest_branch, "release");

        let mut merged = base_change(ChangeStatus::Merged);
        assert!(move_change(&mut merged, "release").is_err());
    }

    #[tokio::test]
    async fn allocate_new_change_id_increments() {
        let store = InMemoryChangeStore::new();
        let a = allocate_new_change_id(&store).await.unwrap();
        let b = allocate_new_change_id(&store).await.unwrap();
        assert_ne!(a, b);
    }
}
