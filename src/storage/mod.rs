//! Persistent key-value string storage backing the tier cache.
//!
//! - [`memory`]: in-process map (volatile)
//! - [`disk`]: one JSON file per key under a directory
//!
//! Every operation is fallible. Callers in this crate treat storage as
//! best-effort and degrade errors to cache misses.

pub mod disk;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use disk::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A string key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}
