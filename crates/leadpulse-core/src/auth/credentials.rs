use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, MemoryStore, StorageError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const OTP_EMAIL_KEY: &str = "otp_email";
pub const OTP_EXPIRES_AT_KEY: &str = "otp_expires_at";

/// Everything removed by `CredentialStore::clear`.
const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    OTP_EMAIL_KEY,
    OTP_EXPIRES_AT_KEY,
];

/// Access/refresh token pair as issued by `/token/`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access: String,
    pub refresh: String,
}

impl SessionCredentials {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Token storage shared by the API client, the session manager and the CLI.
///
/// Clone is cheap; clones share the backend and the lock. Each call runs
/// under the lock. A refresh that spans an await stores its result through
/// `replace_access_token_if`, so a logout during the refresh is not undone.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn locked(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read a key, treating backend failures as absence.
    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read credential");
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        let _guard = self.locked();
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        let _guard = self.locked();
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Both tokens, if both are present.
    pub fn credentials(&self) -> Option<SessionCredentials> {
        let _guard = self.locked();
        let access = self.read(ACCESS_TOKEN_KEY)?;
        let refresh = self.read(REFRESH_TOKEN_KEY)?;
        Some(SessionCredentials { access, refresh })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Replace the stored pair.
    pub fn store(&self, credentials: &SessionCredentials) -> Result<(), StorageError> {
        let _guard = self.locked();
        self.backend.set(ACCESS_TOKEN_KEY, &credentials.access)?;
        self.backend.set(REFRESH_TOKEN_KEY, &credentials.refresh)?;
        debug!("Stored session credentials");
        Ok(())
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        let _guard = self.locked();
        self.backend.set(ACCESS_TOKEN_KEY, token)
    }

    /// Store `access` only if the refresh token is still `refresh`.
    ///
    /// Returns `Ok(false)` without writing when the session was cleared or
    /// replaced since `refresh` was read.
    pub fn replace_access_token_if(&self, refresh: &str, access: &str) -> Result<bool, StorageError> {
        let _guard = self.locked();
        if self.read(REFRESH_TOKEN_KEY).as_deref() != Some(refresh) {
            return Ok(false);
        }
        self.backend.set(ACCESS_TOKEN_KEY, access)?;
        Ok(true)
    }

    /// Remove both tokens and the OTP countdown keys. Clearing an empty store is a no-op.
    ///
    /// Every key is attempted even if an earlier removal fails; the first
    /// error is returned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.locked();
        let mut first_error = None;
        for key in SESSION_KEYS {
            if let Err(e) = self.backend.remove(key) {
                warn!(key, error = %e, "Failed to remove credential");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Cleared session credentials");
                Ok(())
            }
        }
    }

    pub(crate) fn get_raw(&self, key: &str) -> Option<String> {
        let _guard = self.locked();
        self.read(key)
    }

    pub(crate) fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.locked();
        self.backend.set(key, value)
    }

    pub(crate) fn remove_raw(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.locked();
        for key in keys {
            self.backend.remove(key)?;
        }
        Ok(())
    }
}
