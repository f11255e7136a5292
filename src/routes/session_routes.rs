//! Session state and credential endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use super::{Nothing, ShellUpdate};
use crate::models::Credentials;
use crate::providers::SignUpOutcome;
use crate::session::{AuthStatus, SessionSnapshot};
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// Registers session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(current_session))
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-up", post(sign_up))
        .route("/session/sign-out", post(sign_out))
}

#[derive(Serialize, Debug)]
struct SessionView {
    status: AuthStatus,
    #[serde(flatten)]
    snapshot: SessionSnapshot,
}

/// The current snapshot. Tokens are never part of it.
async fn current_session(State(state): State<AppState>) -> Json<SessionView> {
    let snapshot = state.store.snapshot();
    Json(SessionView {
        status: snapshot.auth_status(),
        snapshot,
    })
}

async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<ShellUpdate<Nothing>>, HTTPError> {
    state.store.sign_in(&credentials).await?;
    Ok(Json(ShellUpdate::collect(&state, Nothing {})))
}

#[derive(Serialize, Debug)]
struct SignUpView {
    /// False when the provider sent a confirmation email instead of signing in.
    signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation_sent_to: Option<String>,
}

async fn sign_up(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<ShellUpdate<SignUpView>>, HTTPError> {
    let view = match state.store.sign_up(&credentials).await? {
        SignUpOutcome::SignedIn(_) => SignUpView {
            signed_in: true,
            confirmation_sent_to: None,
        },
        SignUpOutcome::ConfirmationSent { email } => SignUpView {
            signed_in: false,
            confirmation_sent_to: Some(email),
        },
    };
    Ok(Json(ShellUpdate::collect(&state, view)))
}

/// Always succeeds; local state is cleared even if the provider is unreachable.
async fn sign_out(State(state): State<AppState>) -> Json<ShellUpdate<Nothing>> {
    state.store.sign_out().await;
    Json(ShellUpdate::collect(&state, Nothing {}))
}
