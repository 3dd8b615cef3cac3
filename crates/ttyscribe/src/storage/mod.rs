//! Key-value storage layer.
//!
//! Session records are persisted through the [`KvStore`] port, with adapters for:
//! - Local filesystem storage (one JSON file per key)
//! - In-memory storage (tests, ephemeral runs)

mod error;
mod local;
mod memory;
mod traits;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use local::FileStore;
pub use memory::MemoryStore;
pub use traits::KvStore;

/// Create a key-value store based on configuration.
pub fn create_store(config: StoreConfig) -> Arc<dyn KvStore> {
    match config {
        StoreConfig::File(path) => Arc::new(FileStore::new(path)),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    }
}

/// Storage backend selection.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Files under a base directory.
    File(PathBuf),
    /// Process memory; nothing survives a restart.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File(std::env::temp_dir().join("ttyscribe"))
    }
}
