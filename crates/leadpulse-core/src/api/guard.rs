//! Bearer-token interception and single-shot refresh on 401.
//!
//! Per request the guard walks this state machine:
//!
//! ```text
//! NotSent -> Sent -> Succeeded | FailedNonAuth | FailedAuth
//! FailedAuth -> RefreshAttempted -> RetrySucceeded | RetryFailed
//! RetryFailed -> SessionCleared
//! ```
//!
//! The retry flag on `ApiRequest` keeps a request from entering
//! `RefreshAttempted` twice. Concurrent requests that fail together each run
//! their own refresh; nothing is shared between them.
//!
//! The refreshed access token is only stored if the refresh token it came
//! from is still current, so a logout racing the refresh stays a logout.
//!
//! The guard itself never clears credentials or navigates. It reports
//! `GuardOutcome::SessionExpired` and the caller decides what that means.

use std::future::Future;

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use super::{ApiError, ApiRequest, ApiResponse};
use crate::auth::CredentialStore;

/// The network side of the guard: plain dispatch plus the refresh call.
pub trait Transport: Send + Sync {
    /// Send `request` once, with `Authorization: Bearer` when `bearer` is set.
    /// Non-2xx statuses come back as `Err`, a 401 as `ApiError::Unauthorized`.
    fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send;

    /// Exchange a refresh token for a new access token.
    fn refresh(&self, refresh_token: &str)
        -> impl Future<Output = Result<String, ApiError>> + Send;
}

/// Outbound interceptor: attach the bearer credential if there is one.
pub fn authorize(headers: &mut HeaderMap, bearer: Option<&str>) {
    let Some(token) = bearer else {
        return;
    };
    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Err(e) => {
            // Unrepresentable token; send unauthenticated and let the server answer 401
            warn!(error = %e, "Access token is not a valid header value, skipping");
        }
    }
}

/// How a guarded request ended.
#[derive(Debug)]
pub enum GuardOutcome {
    /// First attempt succeeded or failed with something other than a recoverable 401.
    /// Also used when the session changed while a refresh was in flight; the
    /// refreshed token is discarded and the 401 is returned as is.
    Completed(Result<ApiResponse, ApiError>),
    /// A refresh succeeded and the request was re-issued; this is the second attempt's result.
    Retried(Result<ApiResponse, ApiError>),
    /// No refresh token, or the refresh itself failed. `cause` is what the caller sees.
    SessionExpired { cause: ApiError },
}

impl GuardOutcome {
    pub fn was_retried(&self) -> bool {
        matches!(self, GuardOutcome::Retried(_))
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, GuardOutcome::SessionExpired { .. })
    }

    pub fn into_result(self) -> Result<ApiResponse, ApiError> {
        match self {
            GuardOutcome::Completed(result) | GuardOutcome::Retried(result) => result,
            GuardOutcome::SessionExpired { cause } => Err(cause),
        }
    }
}

pub struct SessionGuard<'a, T> {
    transport: &'a T,
    credentials: &'a CredentialStore,
}

impl<'a, T: Transport> SessionGuard<'a, T> {
    pub fn new(transport: &'a T, credentials: &'a CredentialStore) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub async fn execute(&self, mut request: ApiRequest) -> GuardOutcome {
        let token = self.credentials.access_token();
        debug!(
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            "Sending request"
        );

        match self.transport.send(&request, token.as_deref()).await {
            Err(ApiError::Unauthorized) if !request.is_retried() => {}
            other => return GuardOutcome::Completed(other),
        }

        request.mark_retried();

        let Some(refresh_token) = self.credentials.refresh_token() else {
            info!(path = %request.path, "Got 401 with no refresh token, session expired");
            return GuardOutcome::SessionExpired {
                cause: ApiError::Unauthorized,
            };
        };

        info!(path = %request.path, "Access token rejected, refreshing");
        let access = match self.transport.refresh(&refresh_token).await {
            Ok(access) => access,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, session expired");
                return GuardOutcome::SessionExpired { cause: e };
            }
        };

        match self.credentials.replace_access_token_if(&refresh_token, &access) {
            Ok(true) => {}
            Ok(false) => {
                // Logged out or logged in again while the refresh was in flight
                info!(path = %request.path, "Session changed during refresh, dropping refreshed token");
                return GuardOutcome::Completed(Err(ApiError::Unauthorized));
            }
            Err(e) => {
                // The retry below still uses the fresh token
                warn!(error = %e, "Failed to persist refreshed access token");
            }
        }

        debug!(path = %request.path, "Retrying request with refreshed token");
        GuardOutcome::Retried(self.transport.send(&request, Some(&access)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionCredentials;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays canned results and records what it was asked.
    #[derive(Default)]
    struct ScriptedTransport {
        sends: Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
        refreshes: Mutex<VecDeque<Result<String, ApiError>>>,
        seen_bearers: Mutex<Vec<Option<String>>>,
        seen_refresh_tokens: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn on_send(self, result: Result<ApiResponse, ApiError>) -> Self {
            self.sends.lock().unwrap().push_back(result);
            self
        }

        fn on_refresh(self, result: Result<String, ApiError>) -> Self {
            self.refreshes.lock().unwrap().push_back(result);
            self
        }

        fn bearers(&self) -> Vec<Option<String>> {
            self.seen_bearers.lock().unwrap().clone()
        }

        fn refresh_calls(&self) -> usize {
            self.seen_refresh_tokens.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _request: &ApiRequest,
            bearer: Option<&str>,
        ) -> Result<ApiResponse, ApiError> {
            self.seen_bearers.lock().unwrap().push(bearer.map(String::from));
            self.sends
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::Unauthorized))
        }

        async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
            self.seen_refresh_tokens.lock().unwrap().push(refresh_token.to_string());
            self.refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::RefreshRejected("unscripted".into())))
        }
    }

    fn ok(body: &str) -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse::new(StatusCode::OK, body))
    }

    fn logged_in(access: &str, refresh: &str) -> CredentialStore {
        let store = CredentialStore::in_memory();
        store
            .store(&SessionCredentials::new(access, refresh))
            .unwrap();
        store
    }

    #[test]
    fn test_authorize_attaches_bearer() {
        let mut headers = HeaderMap::new();
        authorize(&mut headers, Some("T"));
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer T");
    }

    #[test]
    fn test_authorize_without_token_adds_nothing() {
        let mut headers = HeaderMap::new();
        authorize(&mut headers, None);
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_authorize_skips_invalid_token() {
        let mut headers = HeaderMap::new();
        authorize(&mut headers, Some("bad\ntoken"));
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let creds = logged_in("a1", "r1");
        let transport = ScriptedTransport::default().on_send(ok("{}"));

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        assert!(matches!(outcome, GuardOutcome::Completed(Ok(_))));
        assert_eq!(transport.bearers(), vec![Some("a1".to_string())]);
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_auth_error_is_not_retried() {
        let creds = logged_in("a1", "r1");
        let transport = ScriptedTransport::default()
            .on_send(Err(ApiError::ServerError("boom".into())));

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        assert!(matches!(
            outcome,
            GuardOutcome::Completed(Err(ApiError::ServerError(_)))
        ));
        assert_eq!(transport.bearers().len(), 1);
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_then_retry_with_new_token() {
        let creds = logged_in("old", "r1");
        let transport = ScriptedTransport::default()
            .on_send(Err(ApiError::Unauthorized))
            .on_refresh(Ok("new".to_string()))
            .on_send(ok(r#"{"id": 1}"#));

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/campaigns/1/"))
            .await;

        assert!(outcome.was_retried());
        let response = outcome.into_result().unwrap();
        assert_eq!(response.body, r#"{"id": 1}"#);
        assert_eq!(
            transport.bearers(),
            vec![Some("old".to_string()), Some("new".to_string())]
        );
        assert_eq!(creds.access_token().as_deref(), Some("new"));
        // Refresh token is left as it was
        assert_eq!(creds.refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_repeated_401_refreshes_exactly_once() {
        let creds = logged_in("old", "r1");
        let transport = ScriptedTransport::default()
            .on_send(Err(ApiError::Unauthorized))
            .on_refresh(Ok("new".to_string()))
            .on_send(Err(ApiError::Unauthorized))
            .on_refresh(Ok("newer".to_string()));

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        assert!(matches!(
            outcome,
            GuardOutcome::Retried(Err(ApiError::Unauthorized))
        ));
        assert_eq!(transport.refresh_calls(), 1);
        assert_eq!(transport.bearers().len(), 2);
    }

    #[tokio::test]
    async fn test_already_retried_request_is_not_refreshed() {
        let creds = logged_in("old", "r1");
        let transport = ScriptedTransport::default().on_send(Err(ApiError::Unauthorized));

        let mut request = ApiRequest::get("/score/");
        request.mark_retried();
        let outcome = SessionGuard::new(&transport, &creds).execute(request).await;

        assert!(matches!(
            outcome,
            GuardOutcome::Completed(Err(ApiError::Unauthorized))
        ));
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_expires_session() {
        let creds = logged_in("old", "r1");
        let transport = ScriptedTransport::default()
            .on_send(Err(ApiError::Unauthorized))
            .on_refresh(Err(ApiError::RefreshRejected("Status 401".into())));

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        match outcome {
            GuardOutcome::SessionExpired { cause } => {
                assert!(matches!(cause, ApiError::RefreshRejected(_)))
            }
            other => panic!("expected SessionExpired, got {other:?}"),
        }
        assert_eq!(transport.bearers().len(), 1);
        // The guard reports; it does not clear
        assert_eq!(creds.access_token().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_expires_session() {
        let creds = CredentialStore::in_memory();
        creds.set_access_token("old").unwrap();
        let transport = ScriptedTransport::default().on_send(Err(ApiError::Unauthorized));

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        assert!(outcome.is_session_expired());
        assert_eq!(transport.refresh_calls(), 0);
    }

    /// Clears or replaces the session from inside `refresh`, the way a
    /// concurrent logout or login would.
    struct SessionChangingTransport {
        credentials: CredentialStore,
        replacement: Option<SessionCredentials>,
        sends: Mutex<usize>,
    }

    impl Transport for SessionChangingTransport {
        async fn send(
            &self,
            _request: &ApiRequest,
            _bearer: Option<&str>,
        ) -> Result<ApiResponse, ApiError> {
            *self.sends.lock().unwrap() += 1;
            Err(ApiError::Unauthorized)
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<String, ApiError> {
            self.credentials.clear().unwrap();
            if let Some(pair) = &self.replacement {
                self.credentials.store(pair).unwrap();
            }
            Ok("new".to_string())
        }
    }

    #[tokio::test]
    async fn test_logout_during_refresh_is_not_undone() {
        let creds = logged_in("old", "r1");
        let transport = SessionChangingTransport {
            credentials: creds.clone(),
            replacement: None,
            sends: Mutex::new(0),
        };

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        assert!(matches!(
            outcome,
            GuardOutcome::Completed(Err(ApiError::Unauthorized))
        ));
        assert!(!creds.is_authenticated());
        assert!(creds.refresh_token().is_none());
        // No retry went out with the discarded token
        assert_eq!(*transport.sends.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_during_refresh_keeps_new_session() {
        let creds = logged_in("old", "r1");
        let transport = SessionChangingTransport {
            credentials: creds.clone(),
            replacement: Some(SessionCredentials::new("fresh", "r2")),
            sends: Mutex::new(0),
        };

        let outcome = SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/score/"))
            .await;

        assert!(!outcome.is_session_expired());
        assert_eq!(
            creds.credentials(),
            Some(SessionCredentials::new("fresh", "r2"))
        );
    }

    #[tokio::test]
    async fn test_anonymous_request_has_no_bearer() {
        let creds = CredentialStore::in_memory();
        let transport = ScriptedTransport::default().on_send(ok("[]"));

        SessionGuard::new(&transport, &creds)
            .execute(ApiRequest::get("/plans/"))
            .await;

        assert_eq!(transport.bearers(), vec![None]);
    }
}
