use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::credentials::{CredentialStore, OTP_EMAIL_KEY, OTP_EXPIRES_AT_KEY};
use crate::storage::StorageError;

/// How long a one-time password stays valid after it is sent.
const OTP_VALID_SECS: i64 = 120;

/// Countdown for a pending one-time-password challenge (registration
/// verification, password reset).
///
/// Lives next to the tokens so `CredentialStore::clear` wipes it on logout
/// or session expiry.
#[derive(Clone)]
pub struct OtpCountdown {
    credentials: CredentialStore,
}

impl OtpCountdown {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    /// Start (or restart) the countdown for `email` using the default validity.
    pub fn start(&self, email: &str) -> Result<DateTime<Utc>, StorageError> {
        self.start_at(email, Utc::now(), Duration::seconds(OTP_VALID_SECS))
    }

    pub fn start_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
        valid_for: Duration,
    ) -> Result<DateTime<Utc>, StorageError> {
        let expires_at = now + valid_for;
        self.credentials.set_raw(OTP_EMAIL_KEY, email)?;
        self.credentials
            .set_raw(OTP_EXPIRES_AT_KEY, &expires_at.to_rfc3339())?;
        debug!(%expires_at, "OTP countdown started");
        Ok(expires_at)
    }

    pub fn pending_email(&self) -> Option<String> {
        self.credentials.get_raw(OTP_EMAIL_KEY)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.credentials.get_raw(OTP_EXPIRES_AT_KEY)?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn seconds_remaining(&self) -> i64 {
        self.seconds_remaining_at(Utc::now())
    }

    /// Whole seconds left at `now`; zero when nothing is pending or it has lapsed.
    pub fn seconds_remaining_at(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at()
            .map(|expiry| (expiry - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.seconds_remaining() > 0
    }

    pub fn cancel(&self) -> Result<(), StorageError> {
        self.credentials
            .remove_raw(&[OTP_EMAIL_KEY, OTP_EXPIRES_AT_KEY])
    }
}
