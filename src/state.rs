//! Shared application state.
//!
//! Everything the gateway handlers need: configuration, the session store,
//! the redirect queue the store navigates through, the callback handler and
//! the guard of the current view.

use std::sync::Arc;

use crate::callback::CallbackHandler;
use crate::config::ConfigV1;
use crate::guards::ViewGates;
use crate::session::{RedirectQueue, SessionStore};

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Owner of the session, identity and onboarding state.
    pub store: Arc<SessionStore>,
    /// Redirects decided by the session layer, collected by the shell.
    pub redirects: Arc<RedirectQueue>,
    pub callback: Arc<CallbackHandler>,
    /// Guard of the view the shell last reported.
    pub views: Arc<ViewGates>,
}
