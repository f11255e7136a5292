use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::SessionStore;
use crate::models::{AuthEvent, AuthEventKind};

/// Folds identity provider events into the `SessionStore`.
///
/// Events are handled one at a time, in delivery order, each to completion
/// (including its onboarding lookup) before the next one is read.
pub struct EventReconciler {
    store: Arc<SessionStore>,
}

impl EventReconciler {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Subscribe to the store's provider and process its events on a task.
    pub fn spawn(store: Arc<SessionStore>) -> JoinHandle<()> {
        let events = store.provider().subscribe();
        tokio::spawn(Self::new(store).run(events))
    }

    pub async fn run(self, mut events: UnboundedReceiver<AuthEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("Auth event stream closed");
    }

    pub async fn handle(&self, event: AuthEvent) {
        info!("Handling auth event {}", event.kind.as_str());
        match (event.kind, event.session) {
            (AuthEventKind::SignedIn, Some(session)) => {
                self.store.apply_signed_in(session).await;
            }
            (AuthEventKind::SignedIn, None) => {
                warn!("SIGNED_IN without a session, treating as signed out");
                self.store.apply_signed_out();
            }
            (AuthEventKind::SignedOut, _) => self.store.apply_signed_out(),
            (AuthEventKind::PasswordRecovery, Some(session)) => {
                self.store.apply_recovery(session).await;
            }
            (AuthEventKind::PasswordRecovery, None) => {
                warn!("PASSWORD_RECOVERY without a session, signing out");
                self.store.sign_out().await;
            }
            (kind @ (AuthEventKind::TokenRefreshed | AuthEventKind::UserUpdated), Some(session))
                if self.store.snapshot().identity_id() != Some(session.identity_id()) =>
            {
                // A late refresh must not resurrect a session signed out meanwhile.
                debug!("Ignoring {} for an identity that is not signed in", kind.as_str());
            }
            (kind, Some(session)) => {
                debug!("{} carries a session, re-deriving onboarding", kind.as_str());
                self.store.apply_refreshed(session).await;
            }
            (kind, None) => debug!("Ignoring {} without a session", kind.as_str()),
        }
    }
}
