//! Shared fixtures for the session layer's unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use super::navigation::RedirectQueue;
use super::store::{SessionSettings, SessionStore};
use crate::analytics::AnalyticsSink;
use crate::error::{AuthError, ProfileError};
use crate::models::{AuthEvent, Credentials, Identity, Profile, Session};
use crate::profiles::{MemoryProfileStore, ProfileReader, ProfileStore};
use crate::providers::plain_provider::{PlainIdentityProvider, PlainProviderConfig, PlainUserEntry};
use crate::providers::{EventBus, FragmentTokens, IdentityProvider, OtpVerification, SignUpOutcome};

pub(crate) const ANA: &str = "ana@example.com";
pub(crate) const ANA_ID: &str = "user-ana";
pub(crate) const BO: &str = "bo@example.com";
pub(crate) const BO_ID: &str = "user-bo";
pub(crate) const PASSWORD: &str = "hunter2222";

pub(crate) fn plain_config() -> PlainProviderConfig {
    PlainProviderConfig {
        users: vec![
            PlainUserEntry {
                id: ANA_ID.to_string(),
                email: ANA.to_string(),
                password: PASSWORD.to_string(),
            },
            PlainUserEntry {
                id: BO_ID.to_string(),
                email: BO.to_string(),
                password: PASSWORD.to_string(),
            },
        ],
        session_ttl_in_secs: 3600,
    }
}

/// Fails every capture, to prove analytics never blocks a flow.
pub(crate) struct FailingSink;

#[async_trait]
impl AnalyticsSink for FailingSink {
    async fn capture(&self, _event: &str, _distinct_id: &str) -> Result<(), String> {
        Err("analytics endpoint unreachable".to_string())
    }
}

pub(crate) struct Harness {
    pub provider: Arc<PlainIdentityProvider>,
    pub profile_rows: Arc<MemoryProfileStore>,
    pub redirects: Arc<RedirectQueue>,
    pub store: Arc<SessionStore>,
}

impl Harness {
    pub fn new() -> Self {
        let provider = Arc::new(PlainIdentityProvider::new(&plain_config()));
        Self::with_provider(provider.clone(), provider)
    }

    /// A harness whose store talks to a provider that never answers.
    pub fn silent() -> Self {
        let provider = Arc::new(PlainIdentityProvider::new(&plain_config()));
        Self::with_provider(provider, Arc::new(SilentProvider::default()))
    }

    /// A harness whose store talks to `store_provider`; `provider` stays
    /// reachable for minting codes and sessions.
    pub fn with_provider(
        provider: Arc<PlainIdentityProvider>,
        store_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let profile_rows = Arc::new(MemoryProfileStore::new());
        Self::assemble(provider, store_provider, profile_rows.clone(), profile_rows)
    }

    /// A harness whose profile store never answers.
    pub fn stalled_profiles() -> Self {
        let provider = Arc::new(PlainIdentityProvider::new(&plain_config()));
        Self::assemble(
            provider.clone(),
            provider,
            Arc::new(MemoryProfileStore::new()),
            Arc::new(StallingProfileStore),
        )
    }

    fn assemble(
        provider: Arc<PlainIdentityProvider>,
        store_provider: Arc<dyn IdentityProvider>,
        profile_rows: Arc<MemoryProfileStore>,
        profile_store: Arc<dyn ProfileStore>,
    ) -> Self {
        let redirects = Arc::new(RedirectQueue::new());
        let profiles =
            ProfileReader::new(profile_store, 5).with_call_timeout(Duration::from_millis(200));
        let store = Arc::new(SessionStore::new(
            store_provider,
            Arc::new(profiles),
            redirects.clone(),
            Arc::new(FailingSink),
            SessionSettings {
                provider_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        ));
        Self {
            provider,
            profile_rows,
            redirects,
            store,
        }
    }

    pub async fn onboarded(&self, id: &str) {
        let mut profile = Profile::blank(id);
        profile.username = Some(id.replace('-', "_"));
        profile.onboarding_complete = true;
        self.profile_rows.insert(profile).await;
    }

    pub async fn not_onboarded(&self, id: &str) {
        self.profile_rows.insert(Profile::blank(id)).await;
    }
}

pub(crate) fn credentials(email: &str) -> Credentials {
    Credentials::new(email, PASSWORD)
}

pub(crate) fn session_for(id: &str) -> Session {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::hours(1);
    Session {
        identity: Identity {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            issued_at: now,
            expires_at,
        },
        access_token: format!("access-{}", id),
        refresh_token: format!("refresh-{}", id),
        expires_at,
    }
}

/// A profile store that never answers, as during a backend outage.
pub(crate) struct StallingProfileStore;

#[async_trait]
impl ProfileStore for StallingProfileStore {
    async fn get_profile(&self, _id: &str, _t: &str) -> Result<Profile, ProfileError> {
        std::future::pending().await
    }
    async fn create_profile(&self, _p: &Profile, _t: &str) -> Result<(), ProfileError> {
        std::future::pending().await
    }
    async fn update_profile(&self, _p: &Profile, _t: &str) -> Result<Profile, ProfileError> {
        std::future::pending().await
    }
    async fn username_taken(&self, _u: &str, _e: &str, _t: &str) -> Result<bool, ProfileError> {
        std::future::pending().await
    }
}

/// A provider that never answers, as during a backend outage with no timeout.
#[derive(Default)]
pub(crate) struct SilentProvider {
    events: EventBus,
}

#[async_trait]
impl IdentityProvider for SilentProvider {
    fn get_name(&self) -> &str {
        "silent"
    }
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        std::future::pending().await
    }
    async fn sign_in_with_password(&self, _c: &Credentials) -> Result<Session, AuthError> {
        std::future::pending().await
    }
    async fn sign_up(&self, _c: &Credentials, _r: Option<&str>) -> Result<SignUpOutcome, AuthError> {
        std::future::pending().await
    }
    async fn sign_out(&self) -> Result<(), AuthError> {
        std::future::pending().await
    }
    async fn exchange_code_for_session(
        &self,
        _code: &str,
        _verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        std::future::pending().await
    }
    async fn verify_otp(&self, _otp: &OtpVerification) -> Result<Session, AuthError> {
        std::future::pending().await
    }
    async fn set_session(&self, _t: &FragmentTokens) -> Result<Session, AuthError> {
        std::future::pending().await
    }
    async fn update_user_password(&self, _p: &str) -> Result<Identity, AuthError> {
        std::future::pending().await
    }
    fn subscribe(&self) -> UnboundedReceiver<AuthEvent> {
        self.events.subscribe()
    }
}
