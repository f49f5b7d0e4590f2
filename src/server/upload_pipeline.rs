//! Upload Pipeline (§4.6): hooks wrapped around the library's upload-pack,
//! enforcing read access and negotiation limits. Pure decision functions plus
//! a small reachability seam ([`ReachabilityChecker`]) an embedder backs with
//! its object database -- this module never walks commit graphs itself.

use async_trait::async_trait;

use crate::config::ServerConfig;
use crate::server::error::ServerError;

/// §4.6 "Access policy over refs for read".
pub fn is_ref_readable(ref_name: &str) -> bool {
    if ref_name.starts_with("refs/meta/") || ref_name.starts_with("refs/users/") {
        return false;
    }
    ref_name.starts_with("refs/heads/")
        || ref_name.starts_with("refs/tags/")
        || ref_name.starts_with("refs/changes/")
}

/// Whether `object_id` is reachable from at least one readable ref. An
/// embedder backs this with its object database; this crate only decides
/// which refs are in scope.
#[async_trait]
pub trait ReachabilityChecker: Send + Sync {
    async fn is_reachable_from(
        &self,
        ref_name: &str,
        object_id: &str,
    ) -> Result<bool, ServerError>;
}

async fn is_accessible<R: ReachabilityChecker>(
    checker: &R,
    object_id: &str,
    readable_refs: &[String],
) -> Result<bool, ServerError> {
    for ref_name in readable_refs {
        if checker.is_reachable_from(ref_name, object_id).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// §4.6 "On begin negotiate": per-want access check plus `max_upload_objects`
/// / `max_upload_refs` enforcement.
pub async fn on_begin_negotiate<R: ReachabilityChecker>(
    wants: &[String],
    advertised_refs: &[(String, String)],
    config: &ServerConfig,
    checker: &R,
) -> Result<(), ServerError> {
    let readable_refs: Vec<String> = advertised_refs
        .iter()
        .filter(|(name, _)| is_ref_readable(name))
        .map(|(name, _)| name.clone())
        .collect();

    if readable_refs.len() > config.max_upload_refs {
        return Err(ServerError::ProtocolViolation(format!(
            "too many refs advertised: {} exceeds max_upload_refs {}",
            readable_refs.len(),
            config.max_upload_refs
        )));
    }
    if wants.len() > config.max_upload_objects {
        return Err(ServerError::ProtocolViolation(format!(
            "too many wants: {} exceeds max_upload_objects {}",
            wants.len(),
            config.max_upload_objects
        )));
    }

    for want in wants {
        if !is_accessible(checker, want, &readable_refs).await? {
            return Err(ServerError::PermissionDenied(format!(
                "object {want} is not reachable from any readable ref"
            )));
        }
    }
    Ok(())
}

/// §4.6 "On end negotiate". `not_found_count` is the number of `have`s the
/// client offered that the server could not locate.
pub fn on_end_negotiate(
    rounds: usize,
    ready: bool,
    not_found_count: usize,
    config: &ServerConfig,
) -> Result<(), ServerError> {
    if not_found_count > 0 {
        tracing::warn!(not_found_count, "client offered haves the server could not find");
    }
    if !ready && rounds > config.max_negotiation_rounds {
        return Err(ServerError::Timeout(format!(
            "negotiation exceeded {} rounds without reaching ready",
            config.max_negotiation_rounds
        )));
    }
    Ok(())
}

/// §4.6 "On send pack": recheck `want` access, then bound the estimated pack
/// size by `max_pack_objects`.
pub async fn on_send_pack<R: ReachabilityChecker>(
    wants: &[String],
    haves: &[String],
    advertised_refs: &[(String, String)],
    config: &ServerConfig,
    checker: &R,
) -> Result<(), ServerError> {
    on_begin_negotiate(wants, advertised_refs, config, checker).await?;

    let estimate = wants.len().saturating_sub(haves.len());
    if estimate > config.max_pack_objects {
        return Err(ServerError::ProtocolViolation(format!(
            "estimated pack size {estimate} exceeds max_pack_objects {}",
            config.max_pack_objects
        )));
    }
    Ok(())
}

/// §4.6 "On post-upload": pack statistics recorded after a successful
/// upload-pack. Failures recording stats are logged and swallowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackStats {
    pub total_objects: usize,
    pub total_bytes: usize,
}

#[async_trait]
pub trait UploadStatsSink: Send + Sync {
    async fn record(&self, project_name: &str, stats: PackStats) -> Result<(), String>;
}

pub async fn post_upload<S: UploadStatsSink>(
    project_name: &str,
    stats: PackStats,
    sink: &S,
) {
    if let Err(e) = sink.record(project_name, stats).await {
        tracing::warn!(error = %e, project = %project_name, "post-upload stats recording failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn ref_readability_matches_spec_policy() {
        assert!(is_ref_readable("refs/heads/main"));
        assert!(is_ref_readable("refs/tags/v1"));
        assert!(is_ref_readable("refs/changes/aa/x/1"));
        assert!(!is_ref_readable("refs/meta/config"));
        assert!(!is_ref_readable("refs/users/1/edit"));
    }

    struct FakeReachability {
        reachable: HashMap<(String, String), bool>,
    }

    #[async_trait]
    impl ReachabilityChecker for FakeReachability {
        async fn is_reachable_from(
            &self,
            ref_name: &str,
            object_id: &str,
        ) -> Result<bool, ServerError> {
            Ok(self
                .reachable
                .get(&(ref_name.to_string(), object_id.to_string()))
                .copied()
                .unwrap_or(false))
        }
    }

    #[tokio::test]
    async fn begin_negotiate_rejects_inaccessible_want() {
        let config = ServerConfig::default();
        let refs = vec![("refs/heads/main".to_string(), "a".repeat(40))];
        let checker = FakeReachability {
            reachable: HashMap::new(),
        };
        let err = on_begin_negotiate(&["b".repeat(40)], &refs, &config, &checker)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn begin_negotiate_accepts_reachable_want() {
        let config = ServerConfig::default();
        let refs = vec![("refs/heads/main".to_string(), "a".repeat(40))];
        let mut reachable = HashMap::new();
        reachable.insert(("refs/heads/main".to_string(), "b".repeat(40)), true);
        let checker = FakeReachability { reachable };
        assert!(
            on_begin_negotiate(&["b".repeat(40)], &refs, &config, &checker)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn begin_negotiate_enforces_max_upload_objects() {
        let mut config = ServerConfig::default();
        config.max_upload_objects = 1;
        let refs = vec![("refs/heads/main".to_string(), "a".repeat(40))];
        let checker = FakeReachability {
            reachable: HashMap::new(),
        };
        let wants = vec!["b".repeat(40), "c".repeat(40)];
        let err = on_begin_negotiate(&wants, &refs, &config, &checker)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));
    }

    #[test]
    fn end_negotiate_times_out_after_too_many_rounds() {
        let config = ServerConfig::default();
        let err = on_end_negotiate(config.max_negotiation_rounds + 1, false, 0, &config)
            .unwrap_err();
        assert!(matches!(err, ServerError::Timeout(_)));
    }

    #[test]
    fn end_negotiate_allows_excess_rounds_when_ready() {
        let config = ServerConfig::default();
        assert!(on_end_negotiate(config.max_negotiation_rounds + 1, true, 0, &config).is_ok());
    }

    #[tokio::test]
    async fn send_pack_rejects_estimate_over_limit() {
        let mut config = ServerConfig::default();
        config.max_pack_objects = 1;
        let refs = vec![("refs/heads/main".to_string(), "a".repeat(40))];
        let mut reachable = HashMap::new();
        for i in 0..3u8 {
            reachable.insert(("refs/heads/main".to_string(), i.to_string().repeat(40)), true);
        }
        let checker = FakeReachability { reachable };
        let wants: Vec<String> = (0..3u8).map(|i| i.to_string().repeat(40)).collect();
        let err = on_send_pack(&wants, &[], &refs, &config, &checker)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(String, PackStats)>>,
    }

    #[async_trait]
    impl UploadStatsSink for RecordingSink {
        async fn record(&self, project_name: &str, stats: PackStats) -> Result<(), String> {
            self.seen
                .lock()
                .unwrap()
                .push((project_name.to_string(), stats));
            Ok(())
        }
    }

    #[tokio::test]
    async fn post_upload_records_stats() {
        let sink = RecordingSink::default();
        let stats = PackStats {
            total_objects: 10,
            total_bytes: 1024,
        };
        post_upload("demo", stats, &sink).await;
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.total_objects, 10);
    }

    #[tokio::test]
    async fn post_upload_swallows_sink_errors() {
        struct FailingSink;

        #[async_trait]
        impl UploadStatsSink for FailingSink {
            async fn record(&self, _project_name: &str, _stats: PackStats) -> Result<(), String> {
                Err("disk full".to_string())
            }
        }

        post_upload("demo", PackStats::default(), &FailingSink).await;
    }
}
