//! Health check endpoints.

use axum::{
    body::Body,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::state::AppState;

/// Registers health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Returns 200 OK while the gateway is serving, whatever the session state.
async fn health_check() -> impl IntoResponse {
    Response::new(Body::from("OK"))
}
