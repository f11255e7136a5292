use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cached::{Cached, TimedCache};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::ProfileStore;
use crate::error::ProfileError;
use crate::models::{OnboardingStatus, Profile, ProfileDraft, Session};
use crate::validation::normalize_profile_draft;

/// The profile read path: onboarding classification, idempotent profile
/// creation and onboarding completion.
///
/// Owns a TTL cache of onboarding answers keyed by identity id, so repeated
/// lookups for the same identity inside the window hit the backend once.
/// Every store call is bounded by `call_timeout`; running out counts as a
/// backend failure.
pub struct ProfileReader {
    store: Arc<dyn ProfileStore>,
    cache: Mutex<TimedCache<String, OnboardingStatus>>,
    call_timeout: Duration,
}

impl ProfileReader {
    pub fn new(store: Arc<dyn ProfileStore>, ttl_in_secs: u64) -> Self {
        Self {
            store,
            cache: Mutex::new(TimedCache::with_lifespan(ttl_in_secs)),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Classify the onboarding state of `session`'s identity.
    ///
    /// A missing profile means `Incomplete`; any other failure means `Unknown`.
    /// Neither ever yields `Complete`.
    pub async fn onboarding_status(&self, session: &Session) -> OnboardingStatus {
        let id = session.identity_id();
        if let Some(status) = self.cache.lock().await.cache_get(&id.to_string()) {
            debug!("Onboarding status for '{}' served from cache", id);
            return *status;
        }

        let status = match self.bounded(self.store.get_profile(id, &session.access_token)).await {
            Ok(profile) => profile.onboarding_status(),
            Err(ProfileError::NotFound) => {
                debug!("No profile for '{}' yet, onboarding required", id);
                OnboardingStatus::Incomplete
            }
            Err(e) => {
                warn!("Profile lookup for '{}' failed: {}", id, e);
                return OnboardingStatus::Unknown;
            }
        };
        self.remember(id, status).await;
        status
    }

    /// Make sure `session`'s identity has a profile row. Safe to call repeatedly
    /// and concurrently: losing a creation race counts as success.
    pub async fn ensure_profile(&self, session: &Session) -> Result<Profile, ProfileError> {
        let id = session.identity_id();
        let token = &session.access_token;
        match self.bounded(self.store.get_profile(id, token)).await {
            Ok(profile) => {
                self.remember(id, profile.onboarding_status()).await;
                return Ok(profile);
            }
            Err(ProfileError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let blank = Profile::blank(id);
        match self.bounded(self.store.create_profile(&blank, token)).await {
            Ok(()) => {
                info!("Created profile for '{}'", id);
                self.remember(id, OnboardingStatus::Incomplete).await;
                Ok(blank)
            }
            Err(ProfileError::Conflict) => {
                debug!("Profile for '{}' was created concurrently", id);
                let existing = self.bounded(self.store.get_profile(id, token)).await?;
                self.remember(id, existing.onboarding_status()).await;
                Ok(existing)
            }
            Err(e) => Err(e),
        }
    }

    /// Validate `draft`, check username uniqueness and mark onboarding complete.
    pub async fn complete_onboarding(
        &self,
        session: &Session,
        draft: &ProfileDraft,
    ) -> Result<Profile, ProfileError> {
        let draft = normalize_profile_draft(draft)?;
        let id = session.identity_id();
        let token = &session.access_token;

        if self
            .bounded(self.store.username_taken(&draft.username, id, token))
            .await?
        {
            return Err(ProfileError::UsernameTaken);
        }

        let mut profile = self.ensure_profile(session).await?;
        profile.username = Some(draft.username);
        profile.first_name = Some(draft.first_name);
        profile.last_name = Some(draft.last_name);
        profile.phone = draft.phone;
        profile.onboarding_complete = true;
        profile.updated_at = Some(Utc::now());

        let saved = self.bounded(self.store.update_profile(&profile, token)).await?;
        info!("Onboarding completed for '{}'", id);
        self.remember(id, saved.onboarding_status()).await;
        Ok(saved)
    }

    pub async fn invalidate(&self, id: &str) {
        self.cache.lock().await.cache_remove(&id.to_string());
    }

    /// Forget every cached answer, e.g. when a different identity signs in.
    pub async fn clear(&self) {
        self.cache.lock().await.cache_clear();
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProfileError>>,
    ) -> Result<T, ProfileError> {
        timeout(self.call_timeout, call).await.map_err(|_| {
            ProfileError::Backend(format!(
                "profile store did not answer within {:?}",
                self.call_timeout
            ))
        })?
    }

    async fn remember(&self, id: &str, status: OnboardingStatus) {
        self.cache.lock().await.cache_set(id.to_string(), status);
    }
}
