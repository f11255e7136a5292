//! The Session Store: single owner and only writer of session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::navigation::{
    navigation_intent, NavigationInput, NavigationTrigger, Navigator, Redirect,
};
use super::status::{AuthStatus, SessionSnapshot};
use crate::analytics::{capture_best_effort, AnalyticsSink};
use crate::config::RouteConfig;
use crate::error::AuthError;
use crate::models::{Credentials, OnboardingStatus, Session};
use crate::profiles::ProfileReader;
use crate::providers::IdentityProvider;
use crate::validation::validate_sign_in;

/// Knobs of the store that come from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub routes: RouteConfig,
    pub provider_timeout: Duration,
    pub post_auth_redirect_url: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            routes: RouteConfig::default(),
            provider_timeout: Duration::from_secs(10),
            post_auth_redirect_url: None,
        }
    }
}

/// Holds the current identity, session and onboarding state, publishes
/// immutable snapshots, and performs every state transition.
///
/// Other components read snapshots or call methods here; the event
/// reconciler, bootstrapper and callback handler use the crate-private
/// `apply_*` transitions.
pub struct SessionStore {
    pub(crate) provider: Arc<dyn IdentityProvider>,
    pub(crate) profiles: Arc<ProfileReader>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) analytics: Arc<dyn AnalyticsSink>,
    pub(crate) settings: SessionSettings,
    state: watch::Sender<SessionSnapshot>,
    bootstrap_started: AtomicBool,
}

impl SessionStore {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<ProfileReader>,
        navigator: Arc<dyn Navigator>,
        analytics: Arc<dyn AnalyticsSink>,
        settings: SessionSettings,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            provider,
            profiles,
            navigator,
            analytics,
            settings,
            state,
            bootstrap_started: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.state.borrow().auth_status()
    }

    pub fn onboarding_status(&self) -> OnboardingStatus {
        self.state.borrow().onboarding
    }

    /// A receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn routes(&self) -> &RouteConfig {
        &self.settings.routes
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    pub fn profiles(&self) -> &Arc<ProfileReader> {
        &self.profiles
    }

    /// Record the page the UI is showing.
    pub fn set_route(&self, path: &str) {
        self.state.send_if_modified(|s| {
            if s.current_route == path {
                return false;
            }
            s.current_route = path.to_string();
            true
        });
    }

    /// Sign in with email and password.
    ///
    /// Leftover artifacts of a previous session (a pending recovery, cached
    /// onboarding answers) are cleared before the new session is established.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<(), AuthError> {
        validate_sign_in(credentials)?;
        self.clear_cross_session_artifacts().await;

        let session = match timeout(
            self.settings.provider_timeout,
            self.provider.sign_in_with_password(credentials),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!("Sign-in for '{}' failed: {}", credentials.email, e);
                return Err(e);
            }
            Err(_) => {
                warn!("Sign-in for '{}' timed out", credentials.email);
                return Err(AuthError::Timeout);
            }
        };

        info!("Signed in '{}'", session.identity.email);
        let id = session.identity_id().to_string();
        self.apply_signed_in(session).await;
        capture_best_effort(self.analytics.as_ref(), "signed_in", &id).await;
        Ok(())
    }

    /// Sign out. Never fails: local state is cleared even when the provider
    /// cannot be reached.
    pub async fn sign_out(&self) {
        let id = self.snapshot().identity_id().map(str::to_string);
        match timeout(self.settings.provider_timeout, self.provider.sign_out()).await {
            Ok(Ok(())) => debug!("Provider sign-out succeeded"),
            Ok(Err(e)) => warn!("Provider sign-out failed, clearing local state anyway: {}", e),
            Err(_) => warn!("Provider sign-out timed out, clearing local state anyway"),
        }
        self.apply_signed_out();
        if let Some(id) = id {
            capture_best_effort(self.analytics.as_ref(), "signed_out", &id).await;
        }
    }

    pub(crate) async fn clear_cross_session_artifacts(&self) {
        self.state.send_if_modified(|s| {
            let had_recovery = s.recovery_in_progress;
            s.recovery_in_progress = false;
            had_recovery
        });
        self.profiles.clear().await;
    }

    /// Start the bootstrap phase. Returns false when a bootstrap already ran.
    pub(crate) fn begin_bootstrap(&self) -> bool {
        if self.bootstrap_started.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state.send_modify(|s| {
            s.phase = s.phase.next(&NavigationInput::BootstrapStarted);
        });
        true
    }

    /// Finish the bootstrap with whatever was recovered.
    ///
    /// An event processed while the bootstrap was in flight wins over the
    /// bootstrap's own answer.
    pub(crate) fn finish_bootstrap(&self, recovered: Option<(Session, OnboardingStatus)>) {
        self.state.send_modify(|s| {
            if !s.bootstrap_complete {
                if let Some((session, onboarding)) = recovered {
                    s.epoch += 1;
                    s.identity = Some(session.identity.clone());
                    s.redirected_identity = Some(session.identity.id.clone());
                    s.session = Some(session);
                    s.onboarding = onboarding;
                }
                s.bootstrap_complete = true;
            }
            s.phase = s.phase.next(&NavigationInput::BootstrapFinished);
        });
    }

    /// Adopt a session from a sign-in, then classify onboarding and issue the
    /// post-sign-in redirect if this identity has not had one yet.
    pub(crate) async fn apply_signed_in(&self, session: Session) {
        let epoch = self.adopt(session.clone(), true);
        self.refresh_onboarding(epoch, &session).await;
    }

    /// Adopt a replacement session (token refresh and similar) without
    /// touching navigation.
    pub(crate) async fn apply_refreshed(&self, session: Session) {
        let epoch = self.adopt(session.clone(), false);
        self.refresh_onboarding(epoch, &session).await;
    }

    /// Adopt a recovery credential, but only on the password-recovery page.
    /// Anywhere else it is treated as foreign and the store signs out.
    pub(crate) async fn apply_recovery(&self, session: Session) -> bool {
        let route = self.snapshot().current_route;
        if !self.settings.routes.is_password_recovery(&route) {
            warn!(
                "Recovery credential received on '{}' instead of the recovery page, signing out",
                route
            );
            self.sign_out().await;
            return false;
        }

        info!("Adopting recovery session for '{}'", session.identity.email);
        let epoch = self.adopt(session.clone(), false);
        self.state.send_modify(|s| s.recovery_in_progress = true);
        self.refresh_onboarding(epoch, &session).await;
        true
    }

    pub(crate) fn apply_signed_out(&self) {
        self.state.send_modify(|s| {
            s.epoch += 1;
            s.session = None;
            s.identity = None;
            s.onboarding = OnboardingStatus::Unknown;
            s.recovery_in_progress = false;
            s.redirected_identity = None;
            s.bootstrap_complete = true;
            s.phase = s.phase.next(&NavigationInput::SignedOut);
        });
    }

    /// Store `session`, returning the epoch onboarding results must match.
    fn adopt(&self, session: Session, fresh_sign_in: bool) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|s| {
            let id = session.identity.id.clone();
            if s.identity_id() != Some(id.as_str()) {
                s.epoch += 1;
                s.onboarding = OnboardingStatus::Unknown;
            }
            if fresh_sign_in && s.redirected_identity.as_deref() != Some(id.as_str()) {
                s.phase = s
                    .phase
                    .next(&NavigationInput::FreshSignIn { identity_id: &id });
            } else if !fresh_sign_in {
                // Adopted without a fresh sign-in: nothing to redirect for.
                s.redirected_identity = Some(id.clone());
            }
            s.identity = Some(session.identity.clone());
            s.session = Some(session);
            s.bootstrap_complete = true;
            epoch = s.epoch;
        });
        epoch
    }

    async fn refresh_onboarding(&self, epoch: u64, session: &Session) {
        let status = self.profiles.onboarding_status(session).await;
        self.apply_onboarding(epoch, session.identity_id(), status);
    }

    /// Apply an onboarding answer, dropping it if the identity changed since
    /// the lookup started.
    pub(crate) fn apply_onboarding(&self, epoch: u64, identity_id: &str, status: OnboardingStatus) {
        let routes = &self.settings.routes;
        let mut redirect = None;
        self.state.send_if_modified(|s| {
            if s.epoch != epoch || s.identity_id() != Some(identity_id) {
                debug!("Discarding stale onboarding result for '{}'", identity_id);
                return false;
            }
            s.onboarding = status;
            if s.phase.is_awaiting(identity_id) {
                s.phase = s
                    .phase
                    .next(&NavigationInput::OnboardingResolved { identity_id });
                s.redirected_identity = Some(identity_id.to_string());
                redirect = navigation_intent(
                    routes,
                    &s.current_route,
                    s.session.is_some(),
                    status,
                    NavigationTrigger::FreshSignIn,
                )
                .map(Redirect::replace);
                if let Some(r) = &redirect {
                    s.current_route = r.to.clone();
                }
            }
            true
        });
        if let Some(redirect) = redirect {
            info!("Redirecting to {} after sign-in", redirect.to);
            self.navigator.navigate(&redirect);
        }
    }

    /// Mark onboarding complete for the current identity and move to the dashboard.
    pub(crate) fn finish_onboarding(&self, identity_id: &str) {
        // Lookups started before the form was saved must not overwrite it.
        let mut epoch = 0;
        self.state.send_modify(|s| {
            s.epoch += 1;
            epoch = s.epoch;
        });
        self.apply_onboarding(epoch, identity_id, OnboardingStatus::Complete);
        let dashboard = self.settings.routes.dashboard.clone();
        self.set_route(&dashboard);
        self.navigator.navigate(&Redirect::replace(dashboard));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{credentials, session_for, Harness, ANA, ANA_ID, BO, BO_ID};

    #[tokio::test]
    async fn sign_in_of_onboarded_user_redirects_once_to_dashboard() {
        let h = Harness::new();
        h.onboarded(ANA_ID).await;
        h.store.set_route("/login");

        h.store.sign_in(&credentials(ANA)).await.unwrap();

        assert_eq!(h.store.auth_status(), AuthStatus::Authenticated);
        assert_eq!(h.store.onboarding_status(), OnboardingStatus::Complete);
        let redirects = h.redirects.drain();
        assert_eq!(redirects, vec![Redirect::replace("/dashboard")]);

        // The provider's own SIGNED_IN for the same identity arrives afterwards.
        let session = h.store.snapshot().session.unwrap();
        h.store.apply_signed_in(session).await;
        assert!(h.redirects.drain().is_empty());
    }

    #[tokio::test]
    async fn sign_in_without_profile_forces_onboarding() {
        let h = Harness::new();
        h.store.set_route("/login");

        h.store.sign_in(&credentials(ANA)).await.unwrap();

        assert_eq!(h.store.onboarding_status(), OnboardingStatus::Incomplete);
        assert_eq!(h.redirects.drain(), vec![Redirect::replace("/onboarding")]);
        assert_eq!(h.store.snapshot().current_route, "/onboarding");
    }

    #[tokio::test]
    async fn rejected_credentials_leave_state_untouched() {
        let h = Harness::new();
        h.store.finish_bootstrap(None);

        let err = h
            .store
            .sign_in(&Credentials::new(ANA, "wrong-password"))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(h.store.auth_status(), AuthStatus::Unauthenticated);
        assert!(h.redirects.drain().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_provider() {
        let h = Harness::silent();

        let err = h.store.sign_in(&Credentials::new("", "x")).await.unwrap_err();

        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn sign_in_out_in_ends_with_the_last_identity() {
        let h = Harness::new();
        h.onboarded(ANA_ID).await;
        h.not_onboarded(BO_ID).await;

        h.store.sign_in(&credentials(ANA)).await.unwrap();
        h.store.sign_out().await;
        h.store.sign_in(&credentials(BO)).await.unwrap();

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.identity_id(), Some(BO_ID));
        assert_eq!(snapshot.onboarding, OnboardingStatus::Incomplete);
        assert_eq!(snapshot.auth_status(), AuthStatus::Authenticated);
    }

    #[tokio::test]
    async fn onboarding_result_for_a_previous_identity_is_discarded() {
        let h = Harness::new();
        h.store.apply_refreshed(session_for(ANA_ID)).await;
        let stale_epoch = h.store.snapshot().epoch;

        h.store.apply_signed_out();
        h.store.apply_refreshed(session_for(BO_ID)).await;
        h.store
            .apply_onboarding(stale_epoch, ANA_ID, OnboardingStatus::Complete);

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.identity_id(), Some(BO_ID));
        assert_eq!(snapshot.onboarding, OnboardingStatus::Incomplete);
    }

    #[tokio::test]
    async fn recovery_credential_off_the_recovery_page_signs_out() {
        let h = Harness::new();
        h.store.set_route("/dashboard");

        let adopted = h.store.apply_recovery(session_for(ANA_ID)).await;

        assert!(!adopted);
        assert_eq!(h.store.auth_status(), AuthStatus::Unauthenticated);
        assert!(!h.store.snapshot().recovery_in_progress);
    }

    #[tokio::test]
    async fn recovery_credential_on_the_recovery_page_is_adopted_without_redirect() {
        let h = Harness::new();
        h.store.set_route("/reset-password");

        let adopted = h.store.apply_recovery(session_for(ANA_ID)).await;

        assert!(adopted);
        let snapshot = h.store.snapshot();
        assert!(snapshot.recovery_in_progress);
        assert_eq!(snapshot.auth_status(), AuthStatus::Authenticated);
        assert!(h.redirects.drain().is_empty());
    }

    #[tokio::test]
    async fn sign_out_clears_state_when_the_provider_does_not_answer() {
        let h = Harness::silent();
        h.store.apply_refreshed(session_for(ANA_ID)).await;
        assert_eq!(h.store.auth_status(), AuthStatus::Authenticated);

        h.store.sign_out().await;

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.auth_status(), AuthStatus::Unauthenticated);
        assert!(snapshot.identity.is_none());
        assert_eq!(snapshot.onboarding, OnboardingStatus::Unknown);
    }

    #[tokio::test]
    async fn subscribers_see_every_change() {
        let h = Harness::new();
        let mut rx = h.store.subscribe();

        h.store.sign_in(&credentials(ANA)).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().identity_id(), Some(ANA_ID));
    }

    #[tokio::test]
    async fn sign_in_finishes_when_the_profile_store_stalls() {
        let h = Harness::stalled_profiles();

        tokio::time::timeout(Duration::from_secs(3), h.store.sign_in(&credentials(ANA)))
            .await
            .expect("sign-in should not wait on the profile store forever")
            .unwrap();

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.auth_status(), AuthStatus::Authenticated);
        assert_eq!(snapshot.onboarding, OnboardingStatus::Unknown);
    }
}
