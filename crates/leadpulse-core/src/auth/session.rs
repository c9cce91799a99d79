use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{CredentialStore, SessionCredentials};
use crate::persist::Persistor;
use crate::storage::StorageError;

/// Where the user is sent when the session ends.
pub const LOGIN_ROUTE: &str = "/login";

/// Buffered session events per subscriber; slow subscribers see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    /// Authentication was lost and could not be recovered.
    Expired { reason: String },
}

/// Fire-and-forget broadcast of session lifecycle changes.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Send to current subscribers. Having none is fine.
    pub fn emit(&self, event: SessionEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "Session event sent"),
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "Session event dropped, no subscribers")
            }
        }
    }
}

/// Navigation port. The CLI prints a hint; a GUI would switch views.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, route: &str) {
        self(route)
    }
}

/// Owns the side effects of starting and ending a session.
///
/// The API client hands session expiry to `terminate`; user-driven sign-out
/// goes through `logout`, which additionally purges the persisted state.
#[derive(Clone)]
pub struct SessionManager {
    credentials: CredentialStore,
    events: SessionEvents,
    navigator: Arc<dyn Navigator>,
    persistor: Option<Persistor>,
}

impl SessionManager {
    pub fn new(credentials: CredentialStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            credentials,
            events: SessionEvents::new(),
            navigator,
            persistor: None,
        }
    }

    pub fn with_persistor(mut self, persistor: Persistor) -> Self {
        self.persistor = Some(persistor);
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Adopt a freshly issued token pair (login, registration verification, social sign-in).
    pub fn establish(&self, credentials: &SessionCredentials) -> Result<(), StorageError> {
        self.credentials.store(credentials)?;
        info!("Session established");
        self.events.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Handle an unrecoverable authentication failure: clear credentials,
    /// announce the expiry and send the user to the login route.
    pub fn terminate(&self, reason: &str) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear credentials on session expiry");
        }
        info!(reason, "Session expired");
        self.events.emit(SessionEvent::Expired {
            reason: reason.to_string(),
        });
        self.navigator.navigate(LOGIN_ROUTE);
    }

    /// Sign out. Safe to call when already signed out.
    pub fn logout(&self) -> Result<(), StorageError> {
        let cleared = self.credentials.clear();
        let purged = match self.persistor {
            Some(ref persistor) => persistor.purge(),
            None => Ok(()),
        };
        info!("Logged out");
        self.events.emit(SessionEvent::LoggedOut);
        self.navigator.navigate(LOGIN_ROUTE);
        cleared.and(purged)
    }
}
