use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::EncryptTransform;
use crate::models::{RootState, StateTree};
use crate::storage::{KeyValueStore, StorageError};

/// Storage key holding the whole encrypted snapshot.
pub const PERSIST_KEY: &str = "persist:root";

/// Bump when the persisted slice layout changes; older snapshots are dropped.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Envelope written under `PERSIST_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub ciphertext: String,
}

impl PersistedSnapshot {
    /// Time since the snapshot was written; zero if the clock went backwards.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.saved_at).max(Duration::zero())
    }

    /// Largest whole unit of `age`, e.g. "3h ago".
    pub fn age_display(&self) -> String {
        let age = self.age();
        if age.num_days() > 0 {
            format!("{}d ago", age.num_days())
        } else if age.num_hours() > 0 {
            format!("{}h ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{}m ago", age.num_minutes())
        } else {
            "just now".to_string()
        }
    }
}

/// Writes and restores the encrypted state snapshot.
///
/// Best effort throughout: a failed write leaves the previous snapshot in
/// place and is only logged, and a failed read restores nothing.
#[derive(Clone)]
pub struct Persistor {
    store: Arc<dyn KeyValueStore>,
    transform: EncryptTransform,
}

impl Persistor {
    pub fn new(store: Arc<dyn KeyValueStore>, transform: EncryptTransform) -> Self {
        Self { store, transform }
    }

    /// Persist `tree`, replacing any previous snapshot. Returns whether anything was written.
    pub fn snapshot(&self, tree: &StateTree) -> bool {
        let ciphertext = self.transform.serialize(tree);
        if ciphertext.is_empty() {
            return false;
        }
        let snapshot = PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            ciphertext,
        };
        let encoded = match serde_json::to_string(&snapshot) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode state snapshot");
                return false;
            }
        };
        match self.store.set(PERSIST_KEY, &encoded) {
            Ok(()) => {
                debug!(bytes = encoded.len(), "State snapshot written");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to write state snapshot");
                false
            }
        }
    }

    pub fn snapshot_state(&self, state: &RootState) -> bool {
        match state.to_tree() {
            Some(tree) => self.snapshot(&tree),
            None => {
                warn!("State did not serialize to an object, snapshot skipped");
                false
            }
        }
    }

    /// Envelope of the stored snapshot, whether or not it still decrypts.
    pub fn last_saved(&self) -> Option<PersistedSnapshot> {
        let raw = match self.store.get(PERSIST_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read state snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(error = %e, "Discarding malformed state snapshot");
                None
            }
        }
    }

    /// Restore the persisted tree, or `None` if there is nothing usable.
    pub fn rehydrate(&self) -> Option<StateTree> {
        let snapshot = self.last_saved()?;
        if snapshot.version != SNAPSHOT_VERSION {
            info!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "Ignoring state snapshot from another version"
            );
            return None;
        }
        self.transform.deserialize(&snapshot.ciphertext)
    }

    /// Restore typed state, falling back to defaults when nothing usable is stored.
    pub fn rehydrate_state(&self) -> RootState {
        self.rehydrate()
            .and_then(RootState::from_tree)
            .unwrap_or_default()
    }

    pub fn purge(&self) -> Result<(), StorageError> {
        Self::discard(self.store.as_ref())
    }

    /// Remove the snapshot from `store` without needing the cipher key.
    pub fn discard(store: &dyn KeyValueStore) -> Result<(), StorageError> {
        store.remove(PERSIST_KEY)?;
        debug!("State snapshot purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthState, LoadingState};
    use crate::persist::{PersistPolicy, StateCipher};
    use crate::storage::MemoryStore;

    fn persistor(store: Arc<MemoryStore>, key: u8) -> Persistor {
        Persistor::new(
            store,
            EncryptTransform::new(StateCipher::from_key(&[key; 32]), PersistPolicy::default()),
        )
    }

    fn sample_state() -> RootState {
        RootState {
            auth: AuthState {
                is_authenticated: true,
                email: Some("rep@acme.io".to_string()),
            },
            loading: LoadingState {
                active: true,
                progress: 55,
                label: Some("Scoring leads".to_string()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_and_rehydrate() {
        let store = Arc::new(MemoryStore::new());
        let p = persistor(store, 1);

        assert!(p.snapshot_state(&sample_state()));
        let restored = p.rehydrate_state();

        assert_eq!(restored.auth, sample_state().auth);
        // Loading is transient and comes back as default
        assert_eq!(restored.loading, LoadingState::default());
    }

    #[test]
    fn test_nothing_stored_gives_default() {
        let p = persistor(Arc::new(MemoryStore::new()), 1);
        assert!(p.rehydrate().is_none());
        assert_eq!(p.rehydrate_state(), RootState::default());
    }

    #[test]
    fn test_key_change_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        persistor(store.clone(), 1).snapshot_state(&sample_state());
        assert!(persistor(store, 2).rehydrate().is_none());
    }

    #[test]
    fn test_version_mismatch_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        let p = persistor(store.clone(), 1);
        p.snapshot_state(&sample_state());

        let mut snapshot = p.last_saved().unwrap();
        snapshot.version = SNAPSHOT_VERSION + 1;
        store
            .set(PERSIST_KEY, &serde_json::to_string(&snapshot).unwrap())
            .unwrap();

        assert!(p.rehydrate().is_none());
    }

    #[test]
    fn test_malformed_envelope_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        store.set(PERSIST_KEY, "{\"version\": 1").unwrap();
        assert!(persistor(store, 1).rehydrate().is_none());
    }

    #[test]
    fn test_snapshot_replaces_previous() {
        let store = Arc::new(MemoryStore::new());
        let p = persistor(store.clone(), 1);
        p.snapshot_state(&sample_state());

        let mut next = sample_state();
        next.auth.email = Some("ae@acme.io".to_string());
        p.snapshot_state(&next);

        assert_eq!(store.len(), 1);
        assert_eq!(p.rehydrate_state().auth.email.as_deref(), Some("ae@acme.io"));
    }

    #[test]
    fn test_purge_twice() {
        let store = Arc::new(MemoryStore::new());
        let p = persistor(store.clone(), 1);
        p.snapshot_state(&sample_state());
        p.purge().unwrap();
        p.purge().unwrap();
        assert!(store.is_empty());
        assert!(p.last_saved().is_none());
    }

    #[test]
    fn test_discard_without_key() {
        let store = Arc::new(MemoryStore::new());
        persistor(store.clone(), 1).snapshot_state(&sample_state());
        assert!(!store.is_empty());

        Persistor::discard(store.as_ref()).unwrap();
        assert!(store.is_empty());
        Persistor::discard(store.as_ref()).unwrap();
    }

    #[test]
    fn test_age_display() {
        let mut snapshot = PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            ciphertext: String::new(),
        };
        assert_eq!(snapshot.age_display(), "just now");

        snapshot.saved_at = Utc::now() - Duration::minutes(5);
        assert_eq!(snapshot.age_display(), "5m ago");

        snapshot.saved_at = Utc::now() - Duration::minutes(95);
        assert_eq!(snapshot.age_display(), "1h ago");

        snapshot.saved_at = Utc::now() - Duration::hours(26);
        assert_eq!(snapshot.age_display(), "1d ago");

        // Saved "in the future" after a clock change
        snapshot.saved_at = Utc::now() + Duration::minutes(10);
        assert_eq!(snapshot.age(), Duration::zero());
        assert_eq!(snapshot.age_display(), "just now");
    }
}
