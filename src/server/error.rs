//! Server-level error kinds (§7). Distinct from [`crate::errors::GitError`]
//! (object parsing) and [`crate::protocol::types::ProtocolError`] (wire
//! transport) -- this is the surface the Change engine and Repository
//! Gateway report through, with `From` conversions from both so pipeline
//! code can use `?` across layers without losing the original message.

use thiserror::Error;

use crate::errors::GitError;
use crate::protocol::types::ProtocolError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Render the way the SSH/HTTP fronts write failures back to the client
    /// (§6: `fatal: <message>\n`).
    pub fn to_fatal_line(&self) -> String {
        format!("fatal: {self}\n")
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidService(_) | ProtocolError::InvalidRequest(_) => {
                ServerError::BadRequest(err.to_string())
            }
            ProtocolError::RepositoryNotFound(_) | ProtocolError::ObjectNotFound(_) => {
                ServerError::NotFound(err.to_string())
            }
            ProtocolError::Unauthorized(_) => ServerError::Unauthorized(err.to_string()),
            ProtocolError::Io(_) | ProtocolError::Pack(_) | ProtocolError::Internal(_) => {
                ServerError::Internal(err.to_string())
            }
        }
    }
}

impl From<GitError> for ServerError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::RepoNotFound | GitError::ObjectNotFound(_) => {
                ServerError::NotFound(err.to_string())
            }
            GitError::UnAuthorized(_) => ServerError::Unauthorized(err.to_string()),
            _ => ServerError::BadRequest(err.to_string()),
        }
    }
}
