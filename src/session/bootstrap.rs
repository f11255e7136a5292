use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use super::store::SessionStore;
use super::status::AuthStatus;
use crate::models::OnboardingStatus;

/// How a bootstrap ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Recovered,
    NoSession,
    Failed,
    TimedOut,
    /// A bootstrap already ran for this store.
    Skipped,
}

/// Recovers the persisted session once per process and classifies onboarding.
pub struct SessionBootstrapper {
    store: Arc<SessionStore>,
    limit: Duration,
}

impl SessionBootstrapper {
    pub fn new(store: Arc<SessionStore>, limit: Duration) -> Self {
        Self { store, limit }
    }

    /// Run the bootstrap. Whatever happens, the store leaves `Loading` before
    /// this returns.
    pub async fn run(&self) -> BootstrapOutcome {
        if !self.store.begin_bootstrap() {
            return BootstrapOutcome::Skipped;
        }

        // One deadline for the whole run. Running out after the session came
        // back keeps the session and leaves onboarding unknown.
        let deadline = Instant::now() + self.limit;
        let session = match timeout_at(deadline, self.store.provider().get_session()).await {
            Ok(Ok(Some(session))) => session,
            Ok(Ok(None)) => {
                info!("No persisted session");
                self.store.finish_bootstrap(None);
                return BootstrapOutcome::NoSession;
            }
            Ok(Err(e)) => {
                warn!("Session recovery failed: {}", e);
                self.store.finish_bootstrap(None);
                return BootstrapOutcome::Failed;
            }
            Err(_) => {
                warn!(
                    "Session recovery did not finish within {:?}, continuing signed out",
                    self.limit
                );
                self.store.finish_bootstrap(None);
                return BootstrapOutcome::TimedOut;
            }
        };

        let onboarding =
            match timeout_at(deadline, self.store.profiles().onboarding_status(&session)).await {
                Ok(onboarding) => onboarding,
                Err(_) => {
                    warn!(
                        "Onboarding lookup for '{}' did not finish in time",
                        session.identity.email
                    );
                    OnboardingStatus::Unknown
                }
            };
        info!(
            "Recovered session for '{}', onboarding {:?}",
            session.identity.email, onboarding
        );
        self.store.finish_bootstrap(Some((session, onboarding)));
        debug_assert_ne!(self.store.auth_status(), AuthStatus::Loading);
        BootstrapOutcome::Recovered
    }
}
