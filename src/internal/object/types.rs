//! Git object type enumeration shared across the object and hash modules.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// In Git, each object type is assigned a unique integer value, which is used to identify the
/// type of the object in Git repositories.
///
/// * `Blob` (1): the content of a file.
/// * `Tree` (2): a directory listing.
/// * `Commit` (3): a point in history with author, committer, message, and parents.
/// * `Tag` (4): an annotated tag.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tag => write!(f, "tag"),
        }
    }
}

impl ObjectType {
    pub fn to_bytes(&self) -> &[u8] {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE,
            ObjectType::Tree => TREE_OBJECT_TYPE,
            ObjectType::Blob => BLOB_OBJECT_TYPE,
            ObjectType::Tag => TAG_OBJECT_TYPE,
        }
    }

    /// Parses a string representation of a Git object type.
    pub fn from_string(s: &str) -> Result<ObjectType, GitError> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(s.to_string())),
        }
    }

    /// Convert an object type to its ASCII tag bytes, as used in the loose object header.
    pub fn to_data(self) -> Result<Vec<u8>, GitError> {
        Ok(self.to_bytes().to_vec())
    }

    pub fn to_u8(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }

    pub fn from_u8(number: u8) -> Result<ObjectType, GitError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(format!(
                "Invalid object type number: {number}"
            ))),
        }
    }
}
