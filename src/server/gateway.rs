//! Repository Gateway (§4.1): resolves project names to repository handles,
//! validates names, and pools/evicts the underlying handles. The actual
//! repository storage (creation, deletion, branch listing, HEAD) is a seam
//! ([`RepositoryLifecycle`]) an embedder implements against its object
//! database -- this crate only owns name validation, existence bookkeeping
//! and the bounded handle cache (§5 "Shared resources").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::server::error::ServerError;

/// Repository-lifecycle seam. An embedder backs this with a real Git
/// installation (e.g. shelling out to `git init --bare`, `git branch`, ...).
#[async_trait]
pub trait RepositoryLifecycle: Send + Sync {
    async fn create_bare(&self, name: &str) -> Result<(), ServerError>;
    async fn delete(&self, name: &str) -> Result<(), ServerError>;
    async fn exists(&self, name: &str) -> Result<bool, ServerError>;
    async fn list(&self) -> Result<Vec<String>, ServerError>;
    async fn list_branches(&self, name: &str) -> Result<Vec<String>, ServerError>;
    async fn get_head(&self, name: &str) -> Result<String, ServerError>;
    async fn set_head(&self, name: &str, reference: &str) -> Result<(), ServerError>;
    async fn cleanup_references(&self, name: &str) -> Result<(), ServerError>;
}

/// A validated, open handle to a project's repository. Opaque: callers
/// resolve concrete access (the `RepositoryAccess` trait from
/// `protocol::core`) separately, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub name: String,
}

/// `allowed_repository_name_pattern`'s default, `[A-Za-z0-9][A-Za-z0-9._/-]*[A-Za-z0-9]`,
/// checked by hand rather than compiling a regex for a pattern this narrow.
fn matches_default_pattern(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    if chars.is_empty() {
        return false;
    }
    let is_edge = |c: &char| c.is_ascii_alphanumeric();
    let is_body = |c: &char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-');
    if chars.len() == 1 {
        return is_edge(&chars[0]);
    }
    is_edge(&chars[0]) && is_edge(chars.last().unwrap()) && chars[1..chars.len() - 1].iter().all(is_body)
}

pub struct RepositoryGateway<L: RepositoryLifecycle> {
    lifecycle: L,
    validate_names: bool,
    max_name_length: usize,
    max_cached: usize,
    ttl: Duration,
    cache: RwLock<HashMap<String, Instant>>,
}

impl<L: RepositoryLifecycle> RepositoryGateway<L> {
    pub fn new(lifecycle: L, config: &ServerConfig) -> Self {
        Self {
            lifecycle,
            validate_names: config.validate_repository_names,
            max_name_length: config.max_repository_name_length,
            max_cached: config.max_cached_repositories,
            ttl: Duration::from_secs(config.repository_cache_ttl_seconds),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// §4.1 "Name validation". Fails with [`ServerError::InvalidName`].
    pub fn validate_name(&self, name: &str) -> Result<(), ServerError> {
        if !self.validate_names {
            return Ok(());
        }
        if name.trim().is_empty() {
            return Err(ServerError::InvalidName("name is empty".to_string()));
        }
        if name.contains("..") {
            return Err(ServerError::InvalidName(
                "name must not contain '..'".to_string(),
            ));
        }
        if name.len() > self.max_name_length {
            return Err(ServerError::InvalidName(format!(
                "name exceeds maximum length of {}",
                self.max_name_length
            )));
        }
        if !matches_default_pattern(name) {
            return Err(ServerError::InvalidName(format!(
                "{name} does not match the allowed repository name pattern"
            )));
        }
        Ok(())
    }

    async fn touch_cache(&self, name: &str) {
        let mut cache = self.cache.write().await;
        let now = Instant::now();
        cache.retain(|_, inserted| now.duration_since(*inserted) < self.ttl);
        if cache.len() >= self.max_cached && !cache.contains_key(name) {
            if let Some(oldest) = cache.iter().min_by_key(|(_, t)| **t).map(|(k, _)| k.clone()) {
                cache.remove(&oldest);
            }
        }
        cache.insert(name.to_string(), now);
    }

    async fn drop_cache(&self, name: &str) {
        self.cache.write().await.remove(name);
    }

    pub async fn open(&self, name: &str) -> Result<RepositoryHandle, ServerError> {
        self.validate_name(name)?;
        if !self.lifecycle.exists(name).await? {
            return Err(ServerError::NotFound(format!("repository {name} not found")));
        }
        self.touch_cache(name).await;
        Ok(RepositoryHandle {
            name: name.to_string(),
        })
    }

    pub async fn create(&self, name: &str) -> Result<RepositoryHandle, ServerError> {
        self.validate_name(name)?;
        if self.lifecycle.exists(name).await? {
            return Err(ServerError::AlreadyExists(format!(
                "repository {name} already exists"
            )));
        }
        self.lifecycle.create_bare(name).await?;
        self.touch_cache(name).await;
        Ok(RepositoryHandle {
            name: name.to_string(),
        })
    }

    pub async fn delete(&self, name: &str) -> Result<(), ServerError> {
        self.validate_name(name)?;
        self.lifecycle.delete(name).await?;
        self.drop_cache(name).await;
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> Result<bool, ServerError> {
        self.lifecycle.exists(name).await
    }

    pub async fn list(&self) -> Result<Vec<String>, ServerError> {
        self.lifecycle.list().await
    }

    pub async fn list_branches(&self, name: &str) -> Result<Vec<String>, ServerError> {
        self.lifecycle.list_branches(name).await
    }

    pub async fn get_head(&self, name: &str) -> Result<String, ServerError> {
        self.lifecycle.get_head(name).await
    }

    pub async fn set_head(&self, name: &str, reference: &str) -> Result<(), ServerError> {
        self.lifecycle.set_head(name, reference).await
    }

    pub async fn cleanup_references(&self, name: &str) -> Result<(), ServerError> {
        self.lifecycle.cleanup_references(name).await
    }

    #[cfg(test)]
    async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockLifecycle {
        repos: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl RepositoryLifecycle for MockLifecycle {
        async fn create_bare(&self, name: &str) -> Result<(), ServerError> {
            self.repos.lock().await.insert(name.to_string());
            Ok(())
        }
        async fn delete(&self, name: &str) -> Result<(), ServerError> {
            self.repos.lock().await.remove(name);
            Ok(())
        }
        async fn exists(&self, name: &str) -> Result<bool, ServerError> {
            Ok(self.repos.lock().await.contains(name))
        }
        async fn list(&self) -> Result<Vec<String>, ServerError> {
            Ok(self.repos.lock().await.iter().cloned().collect())
        }
        async fn list_branches(&self, _name: &str) -> Result<Vec<String>, ServerError> {
            Ok(vec!["main".to_string()])
        }
        async fn get_head(&self, _name: &str) -> Result<String, ServerError> {
            Ok("refs/heads/main".to_string())
        }
        async fn set_head(&self, _name: &str, _reference: &str) -> Result<(), ServerError> {
            Ok(())
        }
        async fn cleanup_references(&self, _name: &str) -> Result<(), ServerError> {
            Ok(())
        }
    }

    fn gateway() -> RepositoryGateway<MockLifecycle> {
        RepositoryGateway::new(MockLifecycle::default(), &ServerConfig::default())
    }

    #[test]
    fn name_validation_matches_spec_cases() {
        let gw = gateway();
        assert!(gw.validate_name("demo").is_ok());
        assert!(gw.validate_name("demo/sub-project.git").is_ok());
        assert!(gw.validate_name("").is_err());
        assert!(gw.validate_name("   ").is_err());
        assert!(gw.validate_name("../escape").is_err());
        assert!(gw.validate_name("a".repeat(300).as_str()).is_err());
        assert!(gw.validate_name("-leading-dash").is_err());
    }

    #[tokio::test]
    async fn create_then_open_round_trips() {
        let gw = gateway();
        gw.create("demo").await.unwrap();
        let handle = gw.open("demo").await.unwrap();
        assert_eq!(handle.name, "demo");
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let gw = gateway();
        gw.create("demo").await.unwrap();
        let err = gw.create("demo").await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn open_missing_repository_rejected() {
        let gw = gateway();
        let err = gw.open("missing").await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn cache_is_bounded_by_max_cached_repositories() {
        let mut config = ServerConfig::default();
        config.max_cached_repositories = 2;
        let gw = RepositoryGateway::new(MockLifecycle::default(), &config);
        for name in ["a", "b", "c"] {
            gw.create(name).await.unwrap();
            gw.open(name).await.unwrap();
        }
        assert!(gw.cache_len().await <= 2);
    }

    #[tokio::test]
    async fn delete_evicts_cache_entry() {
        let gw = gateway();
        gw.create("demo").await.unwrap();
        gw.open("demo").await.unwrap();
        gw.delete("demo").await.unwrap();
        assert!(gw.open("demo").await.is_err());
    }
}
