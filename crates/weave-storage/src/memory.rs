//! In-memory object store.
//!
//! Used by pipeline tests and local dry runs. Transfers are real file I/O
//! against the local disk so callers see the same file side effects as with
//! S3.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::{ObjectInfo, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    fail_puts: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object directly.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) {
        let key = key.into();
        let content_type = crate::keys::content_type_for(&key).to_string();
        self.lock().insert(
            key,
            StoredObject {
                data: data.into(),
                content_type,
                last_modified,
            },
        );
    }

    /// Make every subsequent `put` fail with `UploadFailed`.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|o| o.content_type.clone())
    }

    /// Number of successful uploads.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of successful downloads.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed(format!("injected failure for {}", key)));
        }

        let data = tokio::fs::read(path).await?;
        self.lock().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str, path: &Path) -> StorageResult<()> {
        validate_key(key)?;
        let data = self
            .lock()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(key))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_get(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("memory://{}?expires_in={}", key, ttl.as_secs()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }
}
