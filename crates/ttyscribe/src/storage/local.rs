//! Local filesystem key-value store.

use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::traits::validate_key;
use super::{KvStore, StorageError, StorageResult};

const VALUE_EXTENSION: &str = ".json";

/// Stores each key as `<base>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl FileStore {
    /// Create a new file store. The directory is created on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a key.
    fn value_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(format!("{}{}", key, VALUE_EXTENSION)))
    }

    /// Ensure the base directory exists.
    async fn ensure_base_dir(&self) -> StorageResult<()> {
        if !fs::try_exists(&self.base_path).await? {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.value_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.value_path(key)?;
        self.ensure_base_dir().await?;

        // Write beside the target and rename so readers never see a partial value
        let tmp = self.base_path.join(format!(".{}{}.tmp", key, VALUE_EXTENSION));
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::Io(e));
        }

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(vec![]);
        }

        let mut keys = vec![];
        let mut read_dir = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(key) = name.strip_suffix(VALUE_EXTENSION) else {
                continue;
            };
            if key.starts_with('.') || !key.starts_with(prefix) {
                continue;
            }
            if entry.file_type().await?.is_file() {
                keys.push(key.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.value_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        debug!("Deleted {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("data"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _dir) = create_test_store();

        store.set("ttyscribe.sessions", "[]").await.unwrap();
        let value = store.get("ttyscribe.sessions").await.unwrap();

        assert_eq!(value.as_deref(), Some("[]"));
        assert!(store.base_path().join("ttyscribe.sessions.json").exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_without_leftovers() {
        let (store, _dir) = create_test_store();

        store.set("key", "one").await.unwrap();
        store.set("key", "two").await.unwrap();

        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("two"));
        let files: Vec<_> = std::fs::read_dir(store.base_path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let (store, _dir) = create_test_store();
        assert!(store.list("").await.unwrap().is_empty());

        store.set("ttyscribe.b", "1").await.unwrap();
        store.set("ttyscribe.a", "2").await.unwrap();
        store.set("other", "3").await.unwrap();
        std::fs::write(store.base_path().join("notes.txt"), "x").unwrap();

        let keys = store.list("ttyscribe.").await.unwrap();
        assert_eq!(keys, vec!["ttyscribe.a", "ttyscribe.b"]);
        assert_eq!(store.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = create_test_store();

        store.set("key", "value").await.unwrap();
        store.delete("key").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), None);

        let err = store.delete("key").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (store, _dir) = create_test_store();

        for key in ["../escape", "nested/key", "..", ""] {
            let err = store.set(key, "x").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "accepted {:?}", key);
        }
        assert!(!store.base_path().exists());
    }
}
