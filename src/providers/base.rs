use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use super::gotrue_provider::{GoTrueProvider, GoTrueProviderConfig};
use super::plain_provider::{PlainIdentityProvider, PlainProviderConfig};
use crate::config::BackendConfig;
use crate::error::AuthError;
use crate::models::{AuthEvent, Credentials, Identity, LinkType, Session};

/// Configuration options for the identity provider client.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
#[serde(tag = "type")]
pub enum IdentityProviderConfig {
    /// GoTrue-compatible REST API on the configured backend.
    #[serde(rename = "gotrue")]
    GoTrue(GoTrueProviderConfig),
    /// Users listed in the config file, kept in memory.
    #[serde(rename = "plain")]
    Plain(PlainProviderConfig),
}

/// Token-hash verification input, as carried by invite and recovery links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpVerification {
    pub link_type: LinkType,
    pub token_hash: String,
}

/// Tokens recovered from the URL fragment of an implicit-flow link.
#[derive(Clone, PartialEq, Eq)]
pub struct FragmentTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub link_type: Option<LinkType>,
}

impl std::fmt::Debug for FragmentTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentTokens")
            .field("link_type", &self.link_type)
            .finish_non_exhaustive()
    }
}

/// Result of a sign-up: either an immediate session, or a pending email confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationSent { email: String },
}

/// The request/response and event surface of the hosted identity provider.
///
/// Implementations own the persisted session and emit an `AuthEvent` for
/// every change to it, in the order the changes happen.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn get_name(&self) -> &str;

    /// The persisted session, refreshed first if its access token expired.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    async fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError>;

    /// Revokes the session remotely and forgets it locally. The local part always happens.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Exchange an authorization code. `code_verifier` is the PKCE verifier
    /// of the client that started the flow, when it used PKCE.
    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError>;

    async fn verify_otp(&self, otp: &OtpVerification) -> Result<Session, AuthError>;

    /// Adopt a session handed over in a URL fragment.
    async fn set_session(&self, tokens: &FragmentTokens) -> Result<Session, AuthError>;

    /// Change the password of the signed-in user.
    async fn update_user_password(&self, password: &str) -> Result<Identity, AuthError>;

    fn subscribe(&self) -> UnboundedReceiver<AuthEvent>;
}

/// Create the identity provider client described by `config`.
pub fn create_identity_provider(
    config: &IdentityProviderConfig,
    backend: &BackendConfig,
) -> Arc<dyn IdentityProvider> {
    match config {
        IdentityProviderConfig::GoTrue(cfg) => {
            info!("Using GoTrue identity provider at {}", backend.url);
            Arc::new(GoTrueProvider::new(cfg, backend))
        }
        IdentityProviderConfig::Plain(cfg) => {
            info!(
                "Using plain identity provider with {} configured users",
                cfg.users.len()
            );
            Arc::new(PlainIdentityProvider::new(cfg))
        }
    }
}
