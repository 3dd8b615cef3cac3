//! Storage trait definitions.

use async_trait::async_trait;

use super::{StorageError, StorageResult};

/// String key-value port used for session persistence.
///
/// Implementations must be safe to share across tasks, but callers drive a
/// single store serially; no cross-process coordination is expected.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove a key. Fails with [`StorageError::NotFound`] if it is absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Reject keys that are empty or could address anything outside the store.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") || key.starts_with('.') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
