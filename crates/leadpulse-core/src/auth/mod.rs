//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: access/refresh token pair on top of a storage backend
//! - `SessionManager`: login bookkeeping, logout, and session-expiry handling
//! - `SessionEvents`: broadcast of session lifecycle signals
//! - `OtpCountdown`: pending one-time-password challenge timer
//!
//! Token expiry is not tracked locally; the server's 401 is the only signal.

pub mod credentials;
pub mod otp;
pub mod session;

pub use credentials::{CredentialStore, SessionCredentials};
pub use otp::OtpCountdown;
pub use session::{Navigator, SessionEvent, SessionEvents, SessionManager, LOGIN_ROUTE};
