use serde::Serialize;

use super::navigation::NavigationPhase;
use crate::models::{Identity, OnboardingStatus, Session};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

impl AuthStatus {
    /// The only way to obtain an `AuthStatus`: it is never stored.
    pub fn derive(session_present: bool, bootstrap_complete: bool) -> Self {
        match (bootstrap_complete, session_present) {
            (false, _) => AuthStatus::Loading,
            (true, true) => AuthStatus::Authenticated,
            (true, false) => AuthStatus::Unauthenticated,
        }
    }
}

/// Everything the rest of the application may know about the session.
///
/// Published by the `SessionStore` after every change; readers never mutate it.
#[derive(Serialize, Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    #[serde(skip)]
    pub session: Option<Session>,
    pub onboarding: OnboardingStatus,
    pub bootstrap_complete: bool,
    pub current_route: String,
    #[serde(flatten)]
    pub phase: NavigationPhase,
    /// A recovery credential was adopted and the password has not been reset yet.
    pub recovery_in_progress: bool,
    /// Identity whose sign-in already produced its redirect.
    #[serde(skip)]
    pub redirected_identity: Option<String>,
    /// Bumped whenever the identity changes; stale async results carry an old value.
    pub epoch: u64,
}

impl SessionSnapshot {
    pub fn auth_status(&self) -> AuthStatus {
        AuthStatus::derive(self.session.is_some(), self.bootstrap_complete)
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }
}
