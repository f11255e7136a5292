//! Public configuration for the UI shell.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::RouteConfig;
use crate::state::AppState;

/// Registers configuration routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/config/public", get(public_config))
}

/// Only values that are safe to ship to a browser.
#[derive(Serialize, Debug)]
struct PublicConfig {
    backend_url: String,
    anon_key: String,
    tiles_api_key: Option<String>,
    post_auth_redirect_url: Option<String>,
    routes: RouteConfig,
}

async fn public_config(State(state): State<AppState>) -> Json<PublicConfig> {
    let config = &state.config;
    Json(PublicConfig {
        backend_url: config.backend.url.clone(),
        anon_key: config.backend.anon_key.clone(),
        tiles_api_key: config.map.tiles_api_key.clone(),
        post_auth_redirect_url: config.post_auth_redirect_url.clone(),
        routes: config.routes.clone(),
    })
}
