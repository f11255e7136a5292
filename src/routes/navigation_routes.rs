//! Route guard endpoints.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ShellUpdate;
use crate::guards::{guards_for, GuardDecision};
use crate::state::AppState;

/// Registers navigation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/navigation", post(navigate))
        .route("/guard", get(guard))
}

#[derive(Deserialize, Debug)]
struct PathQuery {
    path: String,
}

#[derive(Serialize, Debug)]
struct GuardView {
    path: String,
    #[serde(flatten)]
    decision: GuardDecision,
}

fn decide(state: &AppState, path: &str) -> GuardDecision {
    let routes = state.store.routes();
    guards_for(routes, path).check(&state.store.snapshot(), routes)
}

/// Evaluate the guards of `path` without side effects.
async fn guard(State(state): State<AppState>, Query(query): Query<PathQuery>) -> Json<GuardView> {
    let decision = decide(&state, &query.path);
    Json(GuardView {
        path: query.path,
        decision,
    })
}

/// The shell reports the page it is showing; the answer says whether it may
/// render, along with any redirect the session layer issued. Repeated reports
/// of the same page redirect at most once.
async fn navigate(
    State(state): State<AppState>,
    Json(query): Json<PathQuery>,
) -> Json<ShellUpdate<GuardView>> {
    state.store.set_route(&query.path);
    let routes = state.store.routes();
    let gate = state.views.gate_for(routes, &query.path);
    let decision = gate.evaluate(&state.store.snapshot(), routes, state.redirects.as_ref());
    if let GuardDecision::Redirect(redirect) = &decision {
        debug!("Guard on '{}' redirects to {}", query.path, redirect.to);
        state.store.set_route(&redirect.to);
    }
    Json(ShellUpdate::collect(
        &state,
        GuardView {
            path: query.path,
            decision,
        },
    ))
}
