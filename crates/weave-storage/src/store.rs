//! The object store contract consumed by the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

use crate::error::StorageResult;

/// Information about a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Blob storage used for submissions, music and compilations.
///
/// Implementations do not retry. A failed transfer surfaces to the caller,
/// which decides whether a fresh attempt is warranted.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` under `key`, replacing any existing object.
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()>;

    /// Download `key` into `path`. Missing objects yield `StorageError::NotFound`.
    async fn get(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Time-limited retrieval URL. Does not check that the object exists.
    async fn sign_get(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// All objects under `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;
}
