//! Receive Pipeline (§4.5): pre-receive validation (authoritative
//! accept/reject per command) and post-receive side effects, for both
//! magic-branch pushes and direct pushes. Pre-receive hands magic-branch
//! pushes to the [`ChangeEngine`](crate::change::engine::ChangeEngine)
//! (§4.5.3); it never writes a Change itself.

use async_trait::async_trait;

use crate::change::change_id;
use crate::change::engine::{ChangeEngine, MagicPushInput, SyntheticRefPublisher};
use crate::change::store::ChangeStore;
use crate::config::ServerConfig;
use crate::internal::object::commit::Commit;
use crate::server::error::ServerError;

/// Minimum commit-message length enforced on direct pushes to a protected
/// branch (§8 "Boundaries"). Not a configuration option in §6 -- the spec
/// states the default without naming a knob for it.
const MIN_DIRECT_PUSH_MESSAGE_LEN: usize = 10;

fn is_zero_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c == '0')
}

/// One ref update requested by the client, already decoded from pkt-lines
/// (see `protocol::types::RefCommand` for the wire-level shape this is
/// built from).
#[derive(Debug, Clone)]
pub struct ReceiveCommand {
    pub ref_name: String,
    pub old_id: String,
    pub new_id: String,
}

/// §7: per-command receive failures are `REJECTED_OTHER_REASON` with a
/// human-readable reason; other commands continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveCommandResult {
    Ok,
    RejectedOtherReason(String),
}

#[derive(Debug, Clone)]
pub struct PreReceiveOutcome {
    pub result: ReceiveCommandResult,
    pub change_key: Option<String>,
    pub patch_set_number: Option<u32>,
}

impl PreReceiveOutcome {
    fn ok() -> Self {
        Self {
            result: ReceiveCommandResult::Ok,
            change_key: None,
            patch_set_number: None,
        }
    }

    fn reject(message: impl Into<String>) -> Self {
        Self {
            result: ReceiveCommandResult::RejectedOtherReason(message.into()),
            change_key: None,
            patch_set_number: None,
        }
    }

    fn reject_for_change(message: impl Into<String>, change_key: String) -> Self {
        Self {
            result: ReceiveCommandResult::RejectedOtherReason(message.into()),
            change_key: Some(change_key),
            patch_set_number: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.result, ReceiveCommandResult::Ok)
    }
}

/// Reads commit objects by hash. An embedder backs this with its object
/// database (typically the same store behind `protocol::core::RepositoryAccess`).
#[async_trait]
pub trait CommitInspector: Send + Sync {
    async fn load_commit(&self, commit_id: &str) -> Result<Commit, ServerError>;
}

/// Fan-out target for post-receive side effects (§4.5.2): notifications and
/// CI webhooks. The actual transport is external per §1; failures here are
/// logged and swallowed, never propagated to the client.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn change_updated(
        &self,
        project_name: &str,
        change_key: &str,
        patch_set_number: u32,
    ) -> Result<(), String>;

    async fn branch_pushed(
        &self,
        project_name: &str,
        ref_name: &str,
        commit_id: &str,
    ) -> Result<(), String>;
}

/// Shared, read-only context for one receive-pack invocation.
pub struct ReceiveContext<'a, S, P, C>
where
    S: ChangeStore,
    P: SyntheticRefPublisher,
    C: CommitInspector,
{
    pub project_name: &'a str,
    pub uploader_account_id: &'a str,
    pub config: &'a ServerConfig,
    pub engine: &'a ChangeEngine<S>,
    pub publisher: &'a P,
    pub inspector: &'a C,
}

/// §4.5.1: authoritative accept/reject for one `ReceiveCommand`.
pub async fn pre_receive<S, P, C>(
    command: &ReceiveCommand,
    ctx: &ReceiveContext<'_, S, P, C>,
) -> PreReceiveOutcome
where
    S: ChangeStore,
    P: SyntheticRefPublisher,
    C: CommitInspector,
{
    if let Some(target) = command.ref_name.strip_prefix("refs/for/") {
        magic_branch_pre_receive(target, command, ctx).await
    } else {
        direct_push_pre_receive(command, ctx.config, ctx.inspector).await
    }
}

async fn magic_branch_pre_receive<S, P, C>(
    target: &str,
    command: &ReceiveCommand,
    ctx: &ReceiveContext<'_, S, P, C>,
) -> PreReceiveOutcome
where
    S: ChangeStore,
    P: SyntheticRefPublisher,
    C: CommitInspector,
{
    if target.is_empty() {
        return PreReceiveOutcome::reject("Invalid refs/for/ format");
    }

    let commit = match ctx.inspector.load_commit(&command.new_id).await {
        Ok(commit) => commit,
        Err(e) => return PreReceiveOutcome::reject(format!("cannot read commit: {e}")),
    };

    let occurrences = change_id::extract_all(&commit.message);
    if occurrences.len() > 1 {
        return PreReceiveOutcome::reject(
            "multiple Change-Id lines found in commit message; only one is allowed",
        );
    }

    let change_key = match occurrences.into_iter().next() {
        Some(id) => id,
        None if ctx.config.auto_generate_change_id => {
            let author = change_id::format_identity(
                &commit.author.name,
                &commit.author.email,
                commit.author.timestamp,
                &commit.author.timezone,
            );
            let committer = change_id::format_identity(
                &commit.committer.name,
                &commit.committer.email,
                commit.committer.timestamp,
                &commit.committer.timezone,
            );
            change_id::generate(
                &commit.tree_id.to_string(),
                &commit
                    .parent_commit_ids
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>(),
                &author,
                &committer,
                &commit.message,
            )
        }
        None => {
            return PreReceiveOutcome::reject(
                "Missing Change-Id in commit message. Run the commit-msg hook or add a 'Change-Id:' footer.",
            );
        }
    };

    if !change_id::validate(&change_key) {
        return PreReceiveOutcome::reject(format!("invalid Change-Id {change_key}"));
    }

    let input = MagicPushInput {
        change_key: change_key.clone(),
        commit_id: command.new_id.clone(),
        target_branch: target.to_string(),
        project_name: ctx.project_name.to_string(),
        uploader_account_id: ctx.uploader_account_id.to_string(),
        subject_line: commit.format_message(),
    };

    match ctx.engine.apply(input, ctx.publisher).await {
        Ok(outcome) => PreReceiveOutcome {
            result: ReceiveCommandResult::Ok,
            change_key: Some(outcome.change.change_key.clone()),
            patch_set_number: Some(outcome.patch_set_number),
        },
        Err(e) => PreReceiveOutcome::reject_for_change(e.to_string(), change_key),
    }
}

async fn direct_push_pre_receive<C: CommitInspector>(
    command: &ReceiveCommand,
    config: &ServerConfig,
    inspector: &C,
) -> PreReceiveOutcome {
    if is_zero_id(&command.new_id) {
        return if config.allow_deletes {
            PreReceiveOutcome::ok()
        } else {
            PreReceiveOutcome::reject("deletes are not allowed")
        };
    }

    let trunk_ref = format!("refs/heads/{}", config.trunk_branch_name);
    if command.ref_name.starts_with("refs/heads/")
        && command.ref_name != trunk_ref
        && !config.allow_direct_push
    {
        let branch = command.ref_name.trim_start_matches("refs/heads/");
        return PreReceiveOutcome::reject(format!(
            "direct push to {} is not allowed; push to refs/for/{} for review instead",
            command.ref_name, branch
        ));
    }

    match inspector.load_commit(&command.new_id).await {
        Ok(commit) => {
            let message = commit.message.trim();
            if message.len() < MIN_DIRECT_PUSH_MESSAGE_LEN {
                PreReceiveOutcome::reject(format!(
                    "commit message must be at least {MIN_DIRECT_PUSH_MESSAGE_LEN} characters"
                ))
            } else {
                PreReceiveOutcome::ok()
            }
        }
        Err(e) => PreReceiveOutcome::reject(format!("cannot read commit: {e}")),
    }
}

/// §4.5.2: side effects for a command that was accepted by pre-receive.
/// Swallows `NotificationSink` errors -- they are logged, never propagated.
pub async fn post_receive<N: NotificationSink>(
    command: &ReceiveCommand,
    outcome: &PreReceiveOutcome,
    project_name: &str,
    sink: &N,
) {
    if !outcome.is_ok() {
        return;
    }

    if command.ref_name.starts_with("refs/for/") {
        if let Some(change_key) = &outcome.change_key {
            let patch_set_number = outcome.patch_set_number.unwrap_or(0);
            if let Err(e) = sink
                .change_updated(project_name, change_key, patch_set_number)
                .await
            {
                tracing::warn!(
                    error = %e,
                    project = %project_name,
                    change_key = %change_key,
                    "post-receive change notification failed"
                );
            }
        }
    } else if !is_zero_id(&command.new_id) {
        if let Err(e) = sink
            .branch_pushed(project_name, &command.ref_name, &command.new_id)
            .await
        {
            tracing::warn!(
                error = %e,
                project = %project_name,
                ref_name = %command.ref_name,
                "post-receive branch notification failed"
            );
        }
    }
}
