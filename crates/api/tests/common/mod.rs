#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use streamfleet_api::config::ServerConfig;
use streamfleet_api::router::build_app_router;
use streamfleet_api::state::AppState;
use streamfleet_fleet::config::FleetConfig;
use streamfleet_fleet::media::SignedMediaResolver;
use streamfleet_fleet::testing::{FakeShell, InMemoryCache, InMemoryStore};

/// Origin the test router accepts for cross-origin requests.
pub const DASHBOARD_ORIGIN: &str = "http://localhost:5173";

/// Loopback listener with the dashboard origin allowed.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        cors_origins: vec![DASHBOARD_ORIGIN.to_string()],
        ..ServerConfig::default()
    }
}

/// The application router plus handles on the in-memory doubles behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<InMemoryCache>,
    pub shell: Arc<FakeShell>,
}

impl TestApp {
    /// A fresh clone of the router for one request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router with all middleware layers over
/// in-memory store, cache and shell doubles.
///
/// Uses the same `build_app_router` as `main.rs` so integration tests
/// exercise the production middleware stack.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::default());
    let cache = Arc::new(InMemoryCache::default());
    let shell = Arc::new(FakeShell::default());
    let config = test_config();

    let state = AppState::new(
        store.clone(),
        cache.clone(),
        shell.clone(),
        Arc::new(SignedMediaResolver::new(
            Some("https://api.example.com".to_string()),
            Some("test-secret".to_string()),
            3600,
        )),
        config.clone(),
        FleetConfig::default(),
    );

    TestApp {
        router: build_app_router(state, &config),
        store,
        cache,
        shell,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
