//! The auth callback: landing page of invite, magic-link and recovery emails.

use axum::extract::{OriginalUri, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::callback::{CallbackOutcome, CallbackReport};
use crate::state::AppState;
use crate::utils::mount::MountFlag;

/// Registers callback routes under `callback_path`, the configured callback page.
pub fn routes(callback_path: &str) -> Router<AppState> {
    let callback_path = callback_path.trim_end_matches('/');
    Router::new()
        .route(callback_path, get(callback))
        .route(&format!("{}/fragment", callback_path), post(callback_fragment))
}

/// Query-string links. Fragments never reach the server; the shell forwards
/// those through `callback_fragment`.
async fn callback(State(state): State<AppState>, OriginalUri(uri): OriginalUri) -> Response {
    let location = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    run_callback(&state, &location, None).await
}

#[derive(Deserialize)]
struct ForwardedLocation {
    /// The full callback location as seen by the shell, fragment included.
    location: String,
    /// PKCE verifier the shell kept when it started the flow.
    #[serde(default)]
    code_verifier: Option<String>,
}

/// Links whose credential the server cannot see on its own: fragments, and
/// codes that need the shell's PKCE verifier.
async fn callback_fragment(
    State(state): State<AppState>,
    Json(body): Json<ForwardedLocation>,
) -> Response {
    run_callback(&state, &body.location, body.code_verifier.as_deref()).await
}

async fn run_callback(state: &AppState, location: &str, code_verifier: Option<&str>) -> Response {
    // A dropped request drops this future, so the view is mounted throughout.
    let view = MountFlag::new();
    let report = state
        .callback
        .handle_with_verifier(location, code_verifier, &view)
        .await;
    state.redirects.drain();
    report_response(report)
}

fn report_response(report: CallbackReport) -> Response {
    match &report.outcome {
        CallbackOutcome::Resolved { route } => {
            let route = route.clone();
            (StatusCode::SEE_OTHER, [(header::LOCATION, route)], Json(report)).into_response()
        }
        CallbackOutcome::Failed {
            redirect_to, delay, ..
        } => {
            let refresh = format!("{}; url={}", delay.as_secs(), redirect_to);
            (StatusCode::UNAUTHORIZED, [(header::REFRESH, refresh)], Json(report)).into_response()
        }
        CallbackOutcome::Abandoned => (StatusCode::GONE, Json(report)).into_response(),
    }
}
