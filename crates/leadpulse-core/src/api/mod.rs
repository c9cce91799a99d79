//! REST API client module for the leadpulse backend.
//!
//! This module provides the `ApiClient` for talking to the sales-intelligence
//! API (lead scores, prospects, campaigns, notifications) and the
//! `SessionGuard` that keeps its bearer token fresh.
//!
//! The API uses JWT bearer tokens. An expired access token is swapped for a
//! new one through `POST /token/refresh/`, at most once per request.

pub mod client;
pub mod error;
pub mod guard;
pub mod request;

pub use client::ApiClient;
pub use error::ApiError;
pub use guard::{authorize, GuardOutcome, SessionGuard, Transport};
pub use request::{ApiRequest, ApiResponse};
