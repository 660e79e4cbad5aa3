//! Router harness shared by route tests. Auth is disabled, so every request
//! runs as the "dev" user; the adapter registry is empty because route tests
//! never reach a real provider.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tower::ServiceExt;

use crate::AppState;
use crate::chat::ChatDispatcher;
use crate::crypto::SecretCodec;
use crate::identity::{TokenSigner, auth_middleware};
use crate::limits::RateWindowTracker;
use crate::providers::AdapterRegistry;
use crate::routes;
use crate::store::UserStore;

pub struct TestApp {
    pub router: Router,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Register a key over the wire for the "dev" user.
    pub async fn add_key(&self, name: &str, provider: &str, model: &str) {
        let body = json!({
            "name": name,
            "key": "sk-test-0123456789abcdef0123",
            "provider": provider,
            "model": model,
        });
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/api-keys")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

pub async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(UserStore::new(dir.path().join("users.json")).await);
    let codec = Arc::new(SecretCodec::from_base64_key(&STANDARD.encode([9u8; 32])).unwrap());

    let dispatcher = ChatDispatcher::new(
        store.clone(),
        Arc::new(RateWindowTracker::new()),
        Arc::new(AdapterRegistry::empty()),
        codec.clone(),
    );

    let state = Arc::new(AppState {
        store,
        codec,
        dispatcher,
        tokens: TokenSigner::new("test-secret"),
        disable_auth: true,
    });

    let router = Router::new()
        .route("/chat", post(routes::chat::chat))
        .route("/chat/usage", get(routes::chat::usage))
        .route(
            "/auth/api-keys",
            post(routes::keys::add_key).get(routes::keys::list_keys),
        )
        .route(
            "/auth/api-keys/{key_id}",
            put(routes::keys::update_key).delete(routes::keys::delete_key),
        )
        .route("/auth/verify", get(routes::auth::verify))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    TestApp { router, _dir: dir }
}
