//! Encrypted persistence of the client state tree.
//!
//! This module provides:
//! - `StateCipher`: ChaCha20-Poly1305 under a key stretched from config
//! - `PersistPolicy`: whitelist/blacklist of state slices
//! - `EncryptTransform`: tree -> ciphertext text and back, never failing loudly
//! - `Persistor`: versioned snapshot read/write/purge on a storage backend
//!
//! The whole selected tree is written as one snapshot per mutation. Anything
//! unreadable on the way back (wrong key, tampering, stale version) counts
//! as "nothing persisted".

pub mod cipher;
pub mod persistor;
pub mod policy;
pub mod transform;

pub use cipher::{CipherError, StateCipher};
pub use persistor::{PersistedSnapshot, Persistor, PERSIST_KEY, SNAPSHOT_VERSION};
pub use policy::PersistPolicy;
pub use transform::EncryptTransform;
