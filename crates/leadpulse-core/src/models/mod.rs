//! Data models for the client state tree.
//!
//! This module contains the serde types for each state slice:
//!
//! - `AuthState`, `UserProfile`, `Subscription`: the signed-in account
//! - `ScoreResult`, `Geolocation`, `IntentRange`: lead scoring and search filters
//! - `Campaign`, `Notification`: outreach and inbox
//! - `RootState`, `LoadingState`: the full tree and its transient slice

pub mod account;
pub mod campaign;
pub mod leads;
pub mod state;

pub use account::{AuthState, Subscription, SubscriptionStatus, UserProfile};
pub use campaign::{Campaign, CampaignStatus, Notification};
pub use leads::{Geolocation, IntentRange, LeadTier, ScoreResult};
pub use state::{LoadingState, RootState, StateTree};
