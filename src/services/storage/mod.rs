//! Object-store capability used by the upload coordinator.
//!
//! An adapter stores every part upload under `(handle, part_number, version)`
//! with a fresh version, assembles the referenced versions into the final
//! object in caller-specified order, and releases everything belonging to a
//! handle on abort.

use crate::models::{ObjectHandle, ObjectLocation, PartRef};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;
pub mod s3;

pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Transient failure (network, throttling, 5xx); the same call may be retried.
    #[error("{0}")]
    Unavailable(String),

    /// Permanent failure (permissions, quota, invalid request).
    #[error("{0}")]
    Rejected(String),
}

/// Result of storing one upload of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPart {
    pub etag: String,
    pub version: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens a multipart object that will eventually live at `key`.
    async fn open_multipart(&self, key: &str) -> Result<ObjectHandle, StorageError>;

    /// Stores one upload of a part under a new version. Earlier versions of
    /// the same part number are left untouched.
    async fn put_part(
        &self,
        handle: &ObjectHandle,
        part_number: u32,
        data: Bytes,
    ) -> Result<StoredPart, StorageError>;

    /// Concatenates exactly the referenced part versions, in the given order.
    /// Retrying after a failure whose object was in fact created succeeds.
    async fn compose_final(
        &self,
        handle: &ObjectHandle,
        parts: &[PartRef],
    ) -> Result<ObjectLocation, StorageError>;

    /// Releases the multipart object and every stored part. Unknown handles succeed.
    async fn abort_multipart(&self, handle: &ObjectHandle) -> Result<(), StorageError>;

    /// Cheap reachability check for health endpoints.
    async fn ping(&self) -> Result<(), StorageError>;
}
