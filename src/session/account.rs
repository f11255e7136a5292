//! Account flows built on the store: sign-up, onboarding, password reset.

use tokio::time::timeout;
use tracing::{info, warn};

use super::navigation::Redirect;
use super::store::SessionStore;
use crate::analytics::capture_best_effort;
use crate::error::{AuthError, ProfileError};
use crate::models::{Credentials, Profile, ProfileDraft};
use crate::providers::SignUpOutcome;
use crate::validation::{validate_new_password, validate_sign_up};

impl SessionStore {
    /// Create an account. When the provider signs the user in right away the
    /// session is adopted like any other sign-in.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome, AuthError> {
        validate_sign_up(credentials)?;
        self.clear_cross_session_artifacts().await;

        let redirect_to = self.settings.post_auth_redirect_url.as_deref();
        let outcome = timeout(
            self.settings.provider_timeout,
            self.provider.sign_up(credentials, redirect_to),
        )
        .await
        .map_err(|_| AuthError::Timeout)??;

        if let SignUpOutcome::SignedIn(session) = &outcome {
            info!("Signed up and signed in '{}'", session.identity.email);
            if let Err(e) = self.profiles.ensure_profile(session).await {
                warn!("Could not create profile after sign-up: {}", e);
            }
            self.apply_signed_in(session.clone()).await;
        }
        Ok(outcome)
    }

    /// Save the onboarding form and mark onboarding complete.
    pub async fn complete_onboarding(&self, draft: &ProfileDraft) -> Result<Profile, ProfileError> {
        let session = self
            .snapshot()
            .session
            .ok_or(ProfileError::Unauthenticated)?;
        let profile = self.profiles.complete_onboarding(&session, draft).await?;
        self.finish_onboarding(session.identity_id());
        capture_best_effort(
            self.analytics.as_ref(),
            "onboarding_completed",
            session.identity_id(),
        )
        .await;
        Ok(profile)
    }

    /// Set a new password for the signed-in (usually recovering) user, then
    /// sign out so the new password is used for the next sign-in.
    pub async fn reset_password(&self, password: &str, confirmation: &str) -> Result<(), AuthError> {
        validate_new_password(password, confirmation)?;
        if self.snapshot().session.is_none() {
            return Err(AuthError::NoSession);
        }

        timeout(
            self.settings.provider_timeout,
            self.provider.update_user_password(password),
        )
        .await
        .map_err(|_| AuthError::Timeout)??;
        info!("Password updated");

        self.clear_cross_session_artifacts().await;
        self.sign_out().await;
        let sign_in = self.settings.routes.sign_in.clone();
        self.set_route(&sign_in);
        self.navigator.navigate(&Redirect::replace(sign_in));
        Ok(())
    }
}
