//! Onboarding and password endpoints.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use super::{Nothing, ShellUpdate};
use crate::models::{Profile, ProfileDraft};
use crate::state::AppState;
use crate::utils::http_helpers::{ActiveSession, HTTPError};

/// Registers account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/onboarding", post(complete_onboarding))
        .route("/password", post(reset_password))
}

async fn complete_onboarding(
    State(state): State<AppState>,
    _session: ActiveSession,
    Json(draft): Json<ProfileDraft>,
) -> Result<Json<ShellUpdate<Profile>>, HTTPError> {
    let profile = state.store.complete_onboarding(&draft).await?;
    Ok(Json(ShellUpdate::collect(&state, profile)))
}

#[derive(Deserialize)]
struct NewPassword {
    password: String,
    confirm_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    _session: ActiveSession,
    Json(body): Json<NewPassword>,
) -> Result<Json<ShellUpdate<Nothing>>, HTTPError> {
    state
        .store
        .reset_password(&body.password, &body.confirm_password)
        .await?;
    Ok(Json(ShellUpdate::collect(&state, Nothing {})))
}
