//! Route guards: decide whether a page may render, must wait, or must redirect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::config::{strip_query, RouteConfig};
use crate::models::OnboardingStatus;
use crate::session::{AuthStatus, Navigator, Redirect, SessionSnapshot};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session state not known yet; render a placeholder.
    Loading,
    Admit,
    Redirect(Redirect),
}

pub trait Guard: Send + Sync {
    fn check(&self, snapshot: &SessionSnapshot, routes: &RouteConfig) -> GuardDecision;
}

/// Admits signed-in users; everyone else goes to the sign-in page.
pub struct AuthGuard;

impl Guard for AuthGuard {
    fn check(&self, snapshot: &SessionSnapshot, routes: &RouteConfig) -> GuardDecision {
        match snapshot.auth_status() {
            AuthStatus::Loading => GuardDecision::Loading,
            AuthStatus::Authenticated => GuardDecision::Admit,
            AuthStatus::Unauthenticated => {
                GuardDecision::Redirect(Redirect::replace(routes.sign_in.clone()))
            }
        }
    }
}

/// Admits users who finished onboarding. `Unknown` counts as not finished.
pub struct OnboardingGuard;

impl Guard for OnboardingGuard {
    fn check(&self, snapshot: &SessionSnapshot, routes: &RouteConfig) -> GuardDecision {
        if !snapshot.bootstrap_complete {
            return GuardDecision::Loading;
        }
        match snapshot.onboarding {
            OnboardingStatus::Complete => GuardDecision::Admit,
            OnboardingStatus::Incomplete | OnboardingStatus::Unknown => {
                GuardDecision::Redirect(Redirect::replace(routes.onboarding.clone()))
            }
        }
    }
}

/// Keeps signed-in users off the sign-in and sign-up pages.
pub struct PublicOnlyGuard;

impl Guard for PublicOnlyGuard {
    fn check(&self, snapshot: &SessionSnapshot, routes: &RouteConfig) -> GuardDecision {
        match snapshot.auth_status() {
            AuthStatus::Loading => GuardDecision::Loading,
            AuthStatus::Unauthenticated => GuardDecision::Admit,
            AuthStatus::Authenticated if snapshot.onboarding.is_complete() => {
                GuardDecision::Redirect(Redirect::replace(routes.dashboard.clone()))
            }
            AuthStatus::Authenticated => {
                GuardDecision::Redirect(Redirect::replace(routes.onboarding.clone()))
            }
        }
    }
}

/// Guards applied in order; the first decision that is not `Admit` wins.
#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn check(&self, snapshot: &SessionSnapshot, routes: &RouteConfig) -> GuardDecision {
        for guard in &self.guards {
            let decision = guard.check(snapshot, routes);
            if decision != GuardDecision::Admit {
                return decision;
            }
        }
        GuardDecision::Admit
    }
}

/// The guards protecting `path`.
pub fn guards_for(routes: &RouteConfig, path: &str) -> GuardChain {
    let path = strip_query(path);
    if path == routes.callback {
        GuardChain::new()
    } else if routes.is_public_entry(path) {
        GuardChain::new().with(PublicOnlyGuard)
    } else if routes.is_onboarding(path) || routes.is_password_recovery(path) {
        GuardChain::new().with(AuthGuard)
    } else {
        GuardChain::new().with(AuthGuard).with(OnboardingGuard)
    }
}

/// The guard of one mounted view.
///
/// Re-evaluated on every snapshot; shows the placeholder while loading and
/// hands at most one redirect to the navigator over its lifetime.
pub struct RouteGate {
    path: String,
    chain: GuardChain,
    redirected: AtomicBool,
}

impl RouteGate {
    pub fn new(routes: &RouteConfig, path: impl Into<String>) -> Self {
        let path = path.into();
        let chain = guards_for(routes, &path);
        Self {
            path,
            chain,
            redirected: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn evaluate(
        &self,
        snapshot: &SessionSnapshot,
        routes: &RouteConfig,
        navigator: &dyn Navigator,
    ) -> GuardDecision {
        let decision = self.chain.check(snapshot, routes);
        if let GuardDecision::Redirect(redirect) = &decision {
            if !self.redirected.swap(true, Ordering::SeqCst) {
                debug!("Guard on '{}' redirects to {}", self.path, redirect.to);
                navigator.navigate(redirect);
            }
        }
        decision
    }
}

/// The gate of the view the shell currently shows. Reporting another path
/// mounts a new view, which gets a fresh gate.
#[derive(Default)]
pub struct ViewGates {
    current: Mutex<Option<Arc<RouteGate>>>,
}

impl ViewGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate_for(&self, routes: &RouteConfig, path: &str) -> Arc<RouteGate> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(gate) if gate.path() == path => gate.clone(),
            _ => {
                let gate = Arc::new(RouteGate::new(routes, path));
                *current = Some(gate.clone());
                gate
            }
        }
    }
}
