//! Ref Advertiser (§4.4): filters the real refs of a repository by ACL and
//! injects synthetic patch-set refs. Pure over its inputs -- the caller is
//! responsible for gathering the real ref list, the open Changes for the
//! project, and which commit ids currently exist in the object database.

use std::collections::HashSet;

use crate::change::model::{Change, ChangeStatus, synthetic_ref_name};
use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseKind {
    Upload,
    Receive,
}

const ALWAYS_HIDDEN_PREFIXES: &[&str] = &[
    "refs/meta/",
    "refs/users/",
    "refs/groups/",
    "refs/cache-automerge/",
];

fn is_always_hidden(ref_name: &str) -> bool {
    ALWAYS_HIDDEN_PREFIXES.iter().any(|p| ref_name.starts_with(p))
}

/// §4.4 step 3/4: whether `ref_name` is advertised for the given operation.
/// `direct_push_allowed` captures the ACL decision for non-trunk
/// `refs/heads/*` under "Receive" (baseline policy, overridable by project
/// config per the spec; this crate models the override as a caller-supplied
/// bool rather than a full ACL engine).
fn is_permitted(ref_name: &str, kind: AdvertiseKind, config: &ServerConfig, direct_push_allowed: bool) -> bool {
    if is_always_hidden(ref_name) {
        return false;
    }
    match kind {
        AdvertiseKind::Receive => {
            let trunk_ref = format!("refs/heads/{}", config.trunk_branch_name);
            if ref_name.starts_with("refs/for/") {
                true
            } else if ref_name == trunk_ref {
                true
            } else if ref_name.starts_with("refs/heads/") {
                direct_push_allowed
            } else {
                // refs/tags/*, refs/changes/*, and anything else: denied for push.
                false
            }
        }
        AdvertiseKind::Upload => {
            ref_name.starts_with("refs/heads/")
                || ref_name.starts_with("refs/tags/")
                || ref_name.starts_with("refs/changes/")
        }
    }
}

/// Filter the real ref list per §4.4 steps 1-4.
pub fn filter_real_refs(
    real_refs: &[(String, String)],
    kind: AdvertiseKind,
    config: &ServerConfig,
    direct_push_allowed: bool,
) -> Vec<(String, String)> {
    real_refs
        .iter()
        .filter(|(name, _)| is_permitted(name, kind, config, direct_push_allowed))
        .cloned()
        .collect()
}

/// §4.4 step 5: one synthetic ref per patch set of every *open* Change
/// (`status == NEW`) whose commit exists in the object database. Changes
/// that are `MERGED`/`ABANDONED` are not advertised here -- their refs are
/// governed by the retention policy the embedder chooses (§3 lifecycle).
pub fn synthetic_refs_to_inject(
    open_changes: &[Change],
    existing_commit_ids: &HashSet<String>,
) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for change in open_changes {
        if change.status != ChangeStatus::New {
            continue;
        }
        for patch_set in &change.patch_sets {
            if existing_commit_ids.contains(&patch_set.commit_id) {
                out.push((
                    synthetic_ref_name(&change.change_key, patch_set.number),
                    patch_set.commit_id.clone(),
                ));
            } else {
                tracing::warn!(
                    change_key = %change.change_key,
                    patch_set = patch_set.number,
                    commit_id = %patch_set.commit_id,
                    "skipping synthetic ref for missing commit"
                );
            }
        }
    }
    out
}

/// Full advertisement for one operation: filtered real refs plus injected
/// synthetic refs, with the §8 invariant ("no ref... starts with any of
/// refs/meta/, refs/users/, refs/groups/, refs/cache-automerge/") holding by
/// construction.
pub fn advertised_refs(
    real_refs: &[(String, String)],
    kind: AdvertiseKind,
    config: &ServerConfig,
    direct_push_allowed: bool,
    open_changes: &[Change],
    existing_commit_ids: &HashSet<String>,
) -> Vec<(String, String)> {
    let mut refs = filter_real_refs(real_refs, kind, config, direct_push_allowed);
    refs.extend(synthetic_refs_to_inject(open_changes, existing_commit_ids));
    refs
}
