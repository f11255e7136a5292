#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, Response};
use axum::Router;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use foodly_session::config::{extract_config, ConfigV1};
use foodly_session::providers::plain_provider::PlainIdentityProvider;
use foodly_session::providers::IdentityProviderConfig;
use foodly_session::routes::create_router;
use foodly_session::startup::build_state_with;
use foodly_session::state::AppState;
use serde_json::Value;

pub const ANA: &str = "ana@example.com";
pub const BO: &str = "bo@example.com";
pub const PASSWORD: &str = "correct-horse";

pub const TEST_CONFIG: &str = r#"
version: "1.0.0"
bind_address: 127.0.0.1:8089
logging:
  level: "debug"
  format: "json"
backend:
  url: http://127.0.0.1:1
  anon_key: test-anon-key
identity_provider:
  type: plain
  users:
    - id: user-ana
      email: ana@example.com
      password: correct-horse
    - id: user-bo
      email: bo@example.com
      password: correct-horse
profile_store:
  type: memory
session:
  bootstrap_timeout_in_ms: 500
  provider_timeout_in_ms: 500
  onboarding_cache_ttl_in_secs: 5
  callback_failure_delay_in_ms: 3000
map:
  tiles_api_key: test-tiles-key
"#;

pub fn load_test_config() -> ConfigV1 {
    extract_config(Figment::new().merge(Yaml::string(TEST_CONFIG)))
        .expect("Failed to parse test config YAML")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// The provider behind the app, for minting codes and token hashes.
    pub provider: Arc<PlainIdentityProvider>,
}

pub fn build_app(config: ConfigV1) -> TestApp {
    let provider = match &config.identity_provider {
        IdentityProviderConfig::Plain(plain) => Arc::new(PlainIdentityProvider::new(plain)),
        other => panic!("tests need the plain provider, got {:?}", other),
    };
    let state = build_state_with(Arc::new(config), provider.clone());
    TestApp {
        router: create_router(state.clone()),
        state,
        provider,
    }
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request")
}

pub fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}
