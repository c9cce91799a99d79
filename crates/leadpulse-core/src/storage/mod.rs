//! Durable key-value storage backends.
//!
//! Both the credential store and the state persistor sit on top of the
//! `KeyValueStore` port, so they can be exercised without touching the
//! user's real config directory or OS keychain.
//!
//! Backends:
//! - `FileStore`: a single JSON file, rewritten atomically on every change
//! - `KeyringStore`: one OS keychain entry per key
//! - `MemoryStore`: process-local map, used by tests and dry runs

pub mod file;
pub mod keychain;
pub mod memory;

pub use file::FileStore;
pub use keychain::KeyringStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// String key-value storage with synchronous, last-write-wins semantics.
///
/// `remove` of a missing key is not an error.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
