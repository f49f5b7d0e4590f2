//! Server-wide configuration, recognized options per the external-interface
//! contract: storage, transport, receive/upload policy, and name validation.

use serde::{Deserialize, Serialize};

/// Top-level server configuration. Deserializable from the embedding
/// application's config file/env; every field has a spec-mandated default so
/// a bare `ServerConfig::default()` is a valid, conservative configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    // --- Storage ---
    pub repository_base_path: String,
    pub max_cached_repositories: usize,
    pub repository_cache_ttl_seconds: u64,

    // --- HTTP ---
    pub http_enabled: bool,
    pub http_port: u16,

    // --- SSH ---
    pub ssh_enabled: bool,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_host_key_path: String,
    pub ssh_idle_timeout_seconds: u64,
    pub ssh_read_timeout_seconds: u64,

    // --- Git commands ---
    pub receive_pack_enabled: bool,
    pub upload_pack_enabled: bool,
    pub push_timeout_seconds: u64,
    pub fetch_timeout_seconds: u64,

    // --- Receive policy ---
    pub allow_creates: bool,
    pub allow_deletes: bool,
    pub allow_non_fast_forwards: bool,
    pub allow_direct_push: bool,
    pub trunk_branch_name: String,
    /// When no Change-Id footer is found on a magic-branch push, generate one
    /// server-side and accept the push instead of rejecting it (§4.5.1).
    pub auto_generate_change_id: bool,

    // --- Upload policy ---
    pub allow_reachable_sha1_in_want: bool,
    pub allow_tip_sha1_in_want: bool,
    pub max_upload_objects: usize,
    pub max_upload_refs: usize,
    pub max_negotiation_rounds: usize,
    pub max_pack_objects: usize,

    // --- Names ---
    pub validate_repository_names: bool,
    pub allowed_repository_name_pattern: String,
    pub max_repository_name_length: usize,

    // --- Anonymous access ---
    pub anonymous_read_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            repository_base_path: "repositories".to_string(),
            max_cached_repositories: 64,
            repository_cache_ttl_seconds: 600,

            http_enabled: true,
            http_port: 8080,

            ssh_enabled: true,
            ssh_host: "0.0.0.0".to_string(),
            ssh_port: 29418,
            ssh_host_key_path: "ssh_host_key".to_string(),
            ssh_idle_timeout_seconds: 300,
            ssh_read_timeout_seconds: 30,

            receive_pack_enabled: true,
            upload_pack_enabled: true,
            push_timeout_seconds: 300,
            fetch_timeout_seconds: 300,

            allow_creates: true,
            allow_deletes: false,
            allow_non_fast_forwards: false,
            allow_direct_push: false,
            trunk_branch_name: "trunk".to_string(),
            auto_generate_change_id: false,

            allow_reachable_sha1_in_want: false,
            allow_tip_sha1_in_want: true,
            max_upload_objects: 50_000,
            max_upload_refs: 5_000,
            max_negotiation_rounds: 32,
            max_pack_objects: 100_000,

            validate_repository_names: true,
            allowed_repository_name_pattern: "[A-Za-z0-9][A-Za-z0-9._/-]*[A-Za-z0-9]".to_string(),
            max_repository_name_length: 255,

            anonymous_read_enabled: false,
        }
    }
}

impl ServerConfig {
    /// SSH port must fall within the unprivileged/registered range the spec
    /// reserves for it.
    pub fn validate(&self) -> Result<(), String> {
        if !(1024..=65535).contains(&self.ssh_port) {
            return Err(format!(
                "ssh_port {} is out of the allowed range 1024-65535",
                self.ssh_port
            ));
        }
        Ok(())
    }
}
