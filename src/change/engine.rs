//! Change Engine (§4.5.3): turns a validated magic-branch push into a new
//! Change or a new patch set on an existing one, and keeps the synthetic
//! ref in sync. Invoked from the Receive Pipeline's pre-receive hook once
//! the Change-Id has been extracted/generated and validated -- this module
//! never parses commit messages itself.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::change::model::{Change, ChangeMetadata, PatchSet, synthetic_ref_name};
use crate::change::store::ChangeStore;
use crate::server::error::ServerError;

/// Input gathered by the Receive Pipeline for one magic-branch push.
pub struct MagicPushInput {
    pub change_key: String,
    pub commit_id: String,
    pub target_branch: String,
    pub project_name: String,
    pub uploader_account_id: String,
    /// First line of the (possibly Change-Id-amended) commit message.
    pub subject_line: String,
}

/// Result of [`ChangeEngine::apply`], mirroring the §4.5.3 contract.
pub struct ChangeEngineOutcome {
    pub change: Change,
    pub patch_set_number: u32,
    pub is_new_change: bool,
    pub synthetic_ref: String,
}

/// A seam for materializing the synthetic ref after a successful Change
/// write. Failures here are logged and swallowed (§4.5.3,
/// "Synthetic-ref publication") -- they never fail the Change write.
#[async_trait::async_trait]
pub trait SyntheticRefPublisher: Send + Sync {
    async fn force_update(&self, project_name: &str, ref_name: &str, commit_id: &str) -> Result<(), String>;
}

/// A publisher that does nothing; useful for embedders that reconcile
/// synthetic refs purely from the Change Store on next advertise (§3,
/// "on divergence, the Change Store is authoritative").
pub struct NoopPublisher;

#[async_trait::async_trait]
impl SyntheticRefPublisher for NoopPublisher {
    async fn force_update(&self, _project_name: &str, _ref_name: &str, _commit_id: &str) -> Result<(), String> {
        Ok(())
    }
}

pub struct ChangeEngine<S: ChangeStore> {
    store: Arc<S>,
}

impl<S: ChangeStore> ChangeEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The backing store, for callers that need to read or mutate a Change
    /// outside of [`ChangeEngine::apply`] (e.g. tests driving abandon/submit
    /// directly against the store).
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a new Change or append a patch set to an existing one,
    /// publishing the resulting synthetic ref through `publisher`.
    pub async fn apply<P: SyntheticRefPublisher>(
        &self,
        input: MagicPushInput,
        publisher: &P,
    ) -> Result<ChangeEngineOutcome, ServerError> {
        let existing = self
            .store
            .find_by_key(&input.project_name, &input.change_key)
            .await?;

        let (change, patch_set_number, is_new_change) = match existing {
            None => {
                let id = self.store.next_id().await?;
                let now = Utc::now();
                let change = Change {
                    id,
                    change_key: input.change_key.clone(),
                    project_name: input.project_name.clone(),
                    dest_branch: input.target_branch.clone(),
                    subject: Change::derive_subject(&input.subject_line),
                    topic: None,
                    status: crate::change::model::ChangeStatus::New,
                    owner_account_id: input.uploader_account_id.clone(),
                    current_patch_set_number: 1,
                    created_on: now,
                    last_updated_on: now,
                    patch_sets: vec![PatchSet {
                        number: 1,
                        commit_id: input.commit_id.clone(),
                        uploader_account_id: input.uploader_account_id.clone(),
                        created_on: now,
                        description: None,
                        is_draft: false,
                    }],
                    metadata: ChangeMetadata::default(),
                    approvals: vec![],
                };
                let change = self.store.insert(change).await?;
                info!(change_key = %change.change_key, project = %change.project_name, "created change");
                (change, 1u32, true)
            }
            Some(mut change) => {
                if change.dest_branch != input.target_branch {
                    return Err(ServerError::Conflict(format!(
                        "Change-Id {} is for branch {}, but you're pushing to {}",
                        change.change_key, change.dest_branch, input.target_branch
                    )));
                }
                if change.status.is_terminal_for_new_patch_sets() {
                    return Err(ServerError::Conflict(format!(
                        "change {} is {:?}",
                        change.change_key, change.status
                    )));
                }
                let number = change.current_patch_set_number + 1;
                let now = Utc::now();
                change.patch_sets.push(PatchSet {
                    number,
                    commit_id: input.commit_id.clone(),
                    uploader_account_id: input.uploader_account_id.clone(),
                    created_on: now,
                    description: None,
                    is_draft: false,
                });
                change.subject = Change::derive_subject(&input.subject_line);
                change.current_patch_set_number = number;
                change.last_updated_on = now;
                let change = self.store.update(change).await?;
                info!(change_key = %change.change_key, patch_set = number, "added patch set");
                (change, number, false)
            }
        };

        let synthetic_ref = synthetic_ref_name(&change.change_key, patch_set_number);
        if let Err(e) = publisher
            .force_update(&input.project_name, &synthetic_ref, &input.commit_id)
            .await
        {
            warn!(error = %e, ref_name = %synthetic_ref, "synthetic ref publish failed, will reconcile on next advertise");
        }

        Ok(ChangeEngineOutcome {
            change,
            patch_set_number,
            is_new_change,
            synthetic_ref,
        })
    }
}
