//! Navigation state machine.
//!
//! The store moves through `NavigationPhase` as the session settles; leaving
//! `AwaitingRedirect` is the only place a post-sign-in redirect is issued, so
//! one sign-in produces at most one redirect.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::config::RouteConfig;
use crate::models::OnboardingStatus;

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum NavigationPhase {
    /// Nothing happened yet.
    #[default]
    Idle,
    /// Session recovery in flight.
    Bootstrapping,
    /// A fresh sign-in is waiting for its onboarding answer before redirecting.
    AwaitingRedirect { identity_id: String },
    /// No redirect pending.
    Settled,
}

/// Inputs of the navigation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationInput<'a> {
    BootstrapStarted,
    BootstrapFinished,
    /// A sign-in for an identity that has not been redirected yet.
    FreshSignIn { identity_id: &'a str },
    /// The onboarding answer for `identity_id` arrived.
    OnboardingResolved { identity_id: &'a str },
    SignedOut,
}

impl NavigationPhase {
    /// The transition table. Inputs that do not apply leave the phase unchanged.
    pub fn next(&self, input: &NavigationInput<'_>) -> NavigationPhase {
        use NavigationInput as In;
        use NavigationPhase as Ph;

        match (self, input) {
            (Ph::Idle, In::BootstrapStarted) => Ph::Bootstrapping,
            (Ph::Bootstrapping, In::BootstrapFinished) => Ph::Settled,
            (_, In::FreshSignIn { identity_id }) => Ph::AwaitingRedirect {
                identity_id: identity_id.to_string(),
            },
            (Ph::AwaitingRedirect { identity_id }, In::OnboardingResolved { identity_id: id })
                if identity_id == id =>
            {
                Ph::Settled
            }
            (_, In::SignedOut) => Ph::Settled,
            (phase, _) => phase.clone(),
        }
    }

    pub fn is_awaiting(&self, id: &str) -> bool {
        matches!(self, NavigationPhase::AwaitingRedirect { identity_id } if identity_id == id)
    }
}

/// A navigation command for the UI shell.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Replace the current history entry so "back" does not return to the page.
    pub replace: bool,
}

impl Redirect {
    pub fn replace(to: impl Into<String>) -> Self {
        Redirect {
            to: to.into(),
            replace: true,
        }
    }
}

/// What triggered an intent computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
    FreshSignIn,
    Manual,
}

/// The route the app should converge on, or `None` to stay where it is.
///
/// Fresh sign-ins move the user off the sign-in pages; manual navigation is
/// left to the route guards. The callback route resolves its own target.
pub fn navigation_intent(
    routes: &RouteConfig,
    current_path: &str,
    session_present: bool,
    onboarding: OnboardingStatus,
    trigger: NavigationTrigger,
) -> Option<String> {
    if !session_present || trigger == NavigationTrigger::Manual {
        return None;
    }
    let path = crate::config::strip_query(current_path);
    if path == routes.callback || routes.is_password_recovery(path) {
        return None;
    }
    if !onboarding.is_complete() {
        return (!routes.is_onboarding(path)).then(|| routes.onboarding.clone());
    }
    routes
        .is_public_entry(path)
        .then(|| routes.dashboard.clone())
}

/// Receives the redirects the session layer decides on.
pub trait Navigator: Send + Sync {
    fn navigate(&self, redirect: &Redirect);
}

/// A `Navigator` that queues redirects until the shell collects them.
#[derive(Default)]
pub struct RedirectQueue {
    pending: Mutex<VecDeque<Redirect>>,
}

impl RedirectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Redirect> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

impl Navigator for RedirectQueue {
    fn navigate(&self, redirect: &Redirect) {
        debug!("Queueing redirect to {}", redirect.to);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(redirect.clone());
    }
}
