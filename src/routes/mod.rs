//! HTTP route definitions and handlers.
//!
//! The gateway exposes the session layer to the UI shell: session state and
//! credential flows, route guards, account flows, the auth callback, and the
//! public configuration.

mod account_routes;
mod callback_routes;
mod config_routes;
mod health_routes;
mod navigation_routes;
mod session_routes;

use axum::Router;
use serde::Serialize;

use crate::session::{AuthStatus, Redirect};
use crate::state::AppState;

/// Creates the application router with all configured routes.
pub fn create_router(state: AppState) -> Router {
    let callback_path = state.config.routes.callback.clone();
    Router::new()
        .merge(session_routes::routes())
        .merge(navigation_routes::routes())
        .merge(account_routes::routes())
        .merge(callback_routes::routes(&callback_path))
        .merge(config_routes::routes())
        .merge(health_routes::routes())
        .with_state(state)
}

/// Body shared by the state-changing endpoints: the resulting status and
/// every redirect the session layer issued meanwhile.
#[derive(Serialize, Debug)]
pub(crate) struct ShellUpdate<T: Serialize> {
    pub status: AuthStatus,
    pub redirects: Vec<Redirect>,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> ShellUpdate<T> {
    pub fn collect(state: &AppState, body: T) -> Self {
        ShellUpdate {
            status: state.store.auth_status(),
            redirects: state.redirects.drain(),
            body,
        }
    }
}

/// An empty `ShellUpdate` body.
#[derive(Serialize, Debug)]
pub(crate) struct Nothing {}
