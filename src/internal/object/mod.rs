//! Object model definitions for Git commits and the supporting trait that
//! lets higher layers build strongly typed values from raw object bytes.
//!
//! Blobs and trees are treated as opaque content owned by the underlying
//! repository storage; this crate only needs to parse commits, since the
//! Change-Id engine and revision operations reason about commit metadata
//! (parents, message, author/committer) rather than file content.

pub mod commit;
pub mod signature;
pub mod types;

use std::fmt::Display;

use crate::{errors::GitError, hash::ObjectHash, internal::object::types::ObjectType};

/// **The Object Trait**
/// Defines the common interface for Git object types that this crate parses.
pub trait ObjectTrait: Send + Sync + Display {
    /// Creates a new object from a byte slice.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized;

    /// Returns the type of the object.
    fn get_type(&self) -> ObjectType;

    fn get_size(&self) -> usize;

    fn to_data(&self) -> Result<Vec<u8>, GitError>;

    /// Computes the object hash from serialized data.
    ///
    /// Default implementation serializes the object and computes the hash from that data.
    /// Override only if you need custom hash computation or caching.
    fn object_hash(&self) -> Result<ObjectHash, GitError> {
        let data = self.to_data()?;
        Ok(ObjectHash::from_type_and_data(self.get_type(), &data))
    }
}
