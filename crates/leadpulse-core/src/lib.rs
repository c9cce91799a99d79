//! Leadpulse core - the client side of a B2B sales-intelligence dashboard.
//!
//! This crate provides:
//! - `api`: REST client whose calls run through a token-refreshing session guard
//! - `auth`: credential storage, session lifecycle, OTP countdown
//! - `persist`: encrypted, versioned snapshots of the client state tree
//! - `storage`: file, keychain and in-memory key-value backends
//! - `models`: typed state slices
//! - `config`: file plus environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod persist;
pub mod storage;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, SessionManager};
pub use config::Config;
pub use persist::Persistor;
