use serde::{Deserialize, Serialize};

use super::{
    AuthState, Campaign, Geolocation, IntentRange, Notification, ScoreResult, Subscription,
    UserProfile,
};

/// Untyped view of the state tree: slice name -> slice value.
pub type StateTree = serde_json::Map<String, serde_json::Value>;

/// Progress indicator for in-flight work. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    pub active: bool,
    pub progress: u8,
    pub label: Option<String>,
}

/// The whole client state. Field names are the slice names used by `PersistPolicy`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootState {
    pub auth: AuthState,
    pub user: Option<UserProfile>,
    pub score: Vec<ScoreResult>,
    pub subscription: Option<Subscription>,
    pub geolocation: Option<Geolocation>,
    pub intent_range: IntentRange,
    pub campaigns: Vec<Campaign>,
    pub notifications: Vec<Notification>,
    pub loading: LoadingState,
}

impl RootState {
    pub fn to_tree(&self) -> Option<StateTree> {
        match serde_json::to_value(self).ok()? {
            serde_json::Value::Object(tree) => Some(tree),
            _ => None,
        }
    }

    /// Typed state from a tree. Slices missing from `tree` take their
    /// defaults; a slice that is present but malformed rejects the whole tree.
    pub fn from_tree(tree: StateTree) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(tree)).ok()
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}
