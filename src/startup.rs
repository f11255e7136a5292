//! Application startup and server initialization.
//!
//! Builds the session layer from the configuration, starts the event
//! reconciler and the session bootstrap, and serves the gateway routes.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::analytics::LogSink;
use crate::callback::CallbackHandler;
use crate::config::ConfigV1;
use crate::guards::ViewGates;
use crate::profiles::{create_profile_store, ProfileReader};
use crate::providers::{create_identity_provider, IdentityProvider};
use crate::routes;
use crate::session::{
    BootstrapOutcome, EventReconciler, RedirectQueue, SessionBootstrapper, SessionSettings,
    SessionStore,
};
use crate::state::AppState;

/// Wire up the session layer and start its event reconciler.
///
/// Must be called from within a Tokio runtime.
pub fn build_state(config: Arc<ConfigV1>) -> AppState {
    let provider = create_identity_provider(&config.identity_provider, &config.backend);
    build_state_with(config, provider)
}

/// Like `build_state`, with an identity provider built by the caller.
pub fn build_state_with(config: Arc<ConfigV1>, provider: Arc<dyn IdentityProvider>) -> AppState {
    let profile_store = create_profile_store(&config.profile_store, &config.backend);
    let provider_timeout = Duration::from_millis(config.session.provider_timeout_in_ms);
    let profiles = Arc::new(
        ProfileReader::new(profile_store, config.session.onboarding_cache_ttl_in_secs)
            .with_call_timeout(provider_timeout),
    );
    let redirects = Arc::new(RedirectQueue::new());

    let settings = SessionSettings {
        routes: config.routes.clone(),
        provider_timeout,
        post_auth_redirect_url: config.post_auth_redirect_url.clone(),
    };
    let store = Arc::new(SessionStore::new(
        provider,
        profiles,
        redirects.clone(),
        Arc::new(LogSink),
        settings,
    ));
    EventReconciler::spawn(store.clone());

    let callback = Arc::new(CallbackHandler::new(
        store.clone(),
        Duration::from_millis(config.session.callback_failure_delay_in_ms),
    ));

    AppState {
        config,
        store,
        redirects,
        callback,
        views: Arc::new(ViewGates::new()),
    }
}

/// Recover the persisted session, bounded by the configured bootstrap timeout.
pub async fn bootstrap(state: &AppState) -> BootstrapOutcome {
    let limit = Duration::from_millis(state.config.session.bootstrap_timeout_in_ms);
    SessionBootstrapper::new(state.store.clone(), limit)
        .run()
        .await
}

/// Initializes and runs the gateway server.
///
/// The bootstrap runs in the background; until it finishes the session
/// reports `loading` and guards answer with the placeholder.
///
/// # Errors
///
/// Returns an error if the server fails to bind to the configured address
/// or encounters a runtime error while serving.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config.clone());
    info!(
        "Using identity provider '{}'",
        state.store.provider().get_name()
    );

    let bootstrap_state = state.clone();
    tokio::spawn(async move {
        let outcome = bootstrap(&bootstrap_state).await;
        if outcome == BootstrapOutcome::TimedOut {
            warn!("Session bootstrap timed out");
        }
    });

    info!("Starting gateway on {}", config.bind_address);
    let app = routes::create_router(state);
    let listener = TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
