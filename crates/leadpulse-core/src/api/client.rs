//! API client for the leadpulse REST backend.
//!
//! `ApiClient` is the only place that touches the network. Every call made
//! through `execute` (and the `get`/`post`/... helpers on top of it) runs
//! inside a `SessionGuard`, so an expired access token is refreshed once and
//! the call retried transparently.

use reqwest::{header::HeaderMap, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::guard::{authorize, GuardOutcome, SessionGuard, Transport};
use super::{ApiError, ApiRequest, ApiResponse};
use crate::auth::{SessionCredentials, SessionManager};
use crate::config::Config;

/// Token pair issuance endpoint.
const LOGIN_PATH: &str = "/token/";

/// Access token refresh endpoint.
const REFRESH_PATH: &str = "/token/refresh/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// API client for the leadpulse backend.
/// Clone is cheap - reqwest::Client and the session manager share state internally.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    pub fn new(config: &Config, session: SessionManager) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            session,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(ApiResponse::new(status, body))
        } else {
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Single unguarded round trip.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let mut headers = HeaderMap::new();
        authorize(&mut headers, bearer);

        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            "Response received"
        );
        Self::check_response(response).await
    }

    /// Send `request` through the session guard.
    ///
    /// If the session cannot be recovered the session manager clears the
    /// credentials and redirects to login, and the caller gets the original
    /// 401 or the refresh failure.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let outcome = SessionGuard::new(self, self.session.credentials())
            .execute(request)
            .await;
        match outcome {
            GuardOutcome::Completed(result) | GuardOutcome::Retried(result) => result,
            GuardOutcome::SessionExpired { cause } => {
                self.session.terminate(&cause.to_string());
                Err(cause)
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.execute(ApiRequest::post(path, body)).await?.json()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.execute(ApiRequest::put(path, body)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Exchange email and password for a token pair and establish the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionCredentials, ApiError> {
        let body = serde_json::to_value(LoginRequest { email, password })?;
        let response = self
            .dispatch(&ApiRequest::post(LOGIN_PATH, body), None)
            .await?;
        let pair: TokenPairResponse = response.json()?;
        let credentials = SessionCredentials::new(pair.access, pair.refresh);

        self.session.establish(&credentials).map_err(|e| {
            ApiError::InvalidResponse(format!("Login succeeded but tokens could not be stored: {}", e))
        })?;
        info!("Logged in");
        Ok(credentials)
    }

    /// Ask the refresh endpoint for a new access token.
    ///
    /// Any non-2xx status, transport failure or unexpected body is a refusal.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        let body = serde_json::to_value(RefreshRequest {
            refresh: refresh_token,
        })?;
        let response = self
            .dispatch(&ApiRequest::post(REFRESH_PATH, body), None)
            .await
            .map_err(|e| ApiError::RefreshRejected(e.to_string()))?;
        let parsed: RefreshResponse = response
            .json()
            .map_err(|e| ApiError::RefreshRejected(e.to_string()))?;
        if parsed.access.is_empty() {
            return Err(ApiError::RefreshRejected("empty access token".to_string()));
        }
        Ok(parsed.access)
    }
}

impl Transport for ApiClient {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        self.dispatch(request, bearer).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        self.refresh_access_token(refresh_token).await
    }
}
