use std::sync::{Arc, Mutex};

use leadpulse_core::auth::{CredentialStore, Navigator, SessionCredentials, SessionManager};
use leadpulse_core::config::Config;
use leadpulse_core::ApiClient;
use wiremock::MockServer;

/// Routes the session manager navigated to, in order.
#[derive(Clone, Default)]
pub struct RecordedRoutes(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl RecordedRoutes {
    pub fn navigator(&self) -> Arc<dyn Navigator> {
        let sink = self.0.clone();
        Arc::new(move |route: &str| sink.lock().unwrap().push(route.to_string()))
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Client against `base_url` with an in-memory credential store.
#[allow(dead_code)]
pub fn client_at(base_url: &str) -> (ApiClient, RecordedRoutes) {
    let config = Config {
        api_base_url: Some(base_url.to_string()),
        request_timeout_secs: 5,
        ..Default::default()
    };
    let routes = RecordedRoutes::default();
    let session = SessionManager::new(CredentialStore::in_memory(), routes.navigator());
    let api = ApiClient::new(&config, session).expect("client should build");
    (api, routes)
}

/// Client against the mock server's `/api` prefix.
#[allow(dead_code)]
pub fn test_client(server: &MockServer) -> (ApiClient, RecordedRoutes) {
    client_at(&format!("{}/api", server.uri()))
}

/// Same as `test_client`, already holding the given token pair.
#[allow(dead_code)]
pub fn logged_in_client(server: &MockServer, access: &str, refresh: &str) -> (ApiClient, RecordedRoutes) {
    let (api, routes) = test_client(server);
    api.session()
        .credentials()
        .store(&SessionCredentials::new(access, refresh))
        .expect("store credentials");
    (api, routes)
}
