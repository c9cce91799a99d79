use crate::models::StateTree;

/// Slices written to durable storage.
const DEFAULT_WHITELIST: [&str; 8] = [
    "auth",
    "user",
    "score",
    "subscription",
    "geolocation",
    "intent_range",
    "campaigns",
    "notifications",
];

/// Transient slices that never reach storage, whitelisted or not.
const DEFAULT_BLACKLIST: [&str; 1] = ["loading"];

/// Which top-level state slices are persisted. Blacklist wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistPolicy {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WHITELIST, DEFAULT_BLACKLIST)
    }
}

impl PersistPolicy {
    pub fn new<W, B>(whitelist: W, blacklist: B) -> Self
    where
        W: IntoIterator,
        W::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
            blacklist: blacklist.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, slice: &str) -> bool {
        self.whitelist.iter().any(|s| s == slice) && !self.blacklist.iter().any(|s| s == slice)
    }

    /// Copy of `tree` restricted to the allowed slices.
    pub fn select(&self, tree: &StateTree) -> StateTree {
        tree.iter()
            .filter(|(slice, _)| self.allows(slice))
            .map(|(slice, value)| (slice.clone(), value.clone()))
            .collect()
    }
}
