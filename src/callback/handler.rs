use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::params::{strip_one_time_params, CallbackParams};
use crate::error::AuthError;
use crate::models::{LinkType, Session};
use crate::providers::OtpVerification;
use crate::session::SessionStore;
use crate::utils::mount::MountFlag;

/// States of one callback run, in the order they are entered.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallbackState {
    ExchangingCredential,
    EstablishingProfile,
    Resolved { route: String },
    Failed { message: String },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Resolved {
        route: String,
    },
    /// Shown to the user, then the shell moves to `redirect_to` after `delay`.
    Failed {
        message: String,
        redirect_to: String,
        #[serde(rename = "delay_in_ms", serialize_with = "as_millis")]
        delay: Duration,
    },
    /// The view went away before the flow finished; nothing was applied.
    Abandoned,
}

fn as_millis<S: serde::Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(delay.as_millis() as u64)
}

#[derive(Serialize, Debug, Clone)]
pub struct CallbackReport {
    /// The callback location without its one-time parameters.
    pub clean_location: String,
    pub transitions: Vec<CallbackState>,
    pub outcome: CallbackOutcome,
}

/// Which credential the link carried.
enum Credential<'a> {
    Code(&'a str),
    TokenHash(OtpVerification),
    Fragment(&'a crate::providers::FragmentTokens),
    Established,
}

/// Completes auth flows started outside the app: OAuth-style code exchange,
/// invite and recovery links, magic links.
pub struct CallbackHandler {
    store: Arc<SessionStore>,
    failure_delay: Duration,
}

impl CallbackHandler {
    pub fn new(store: Arc<SessionStore>, failure_delay: Duration) -> Self {
        Self {
            store,
            failure_delay,
        }
    }

    /// Run the callback for `location`, the full callback URL (path, query
    /// and fragment). `mount` is the callback view; if it is torn down while
    /// the credential is in flight the result is discarded.
    pub async fn handle(&self, location: &str, mount: &MountFlag) -> CallbackReport {
        self.handle_with_verifier(location, None, mount).await
    }

    /// Like `handle`, for shells that started a PKCE flow and kept its
    /// `code_verifier`. The verifier is only used for a code exchange.
    pub async fn handle_with_verifier(
        &self,
        location: &str,
        code_verifier: Option<&str>,
        mount: &MountFlag,
    ) -> CallbackReport {
        let clean_location = strip_one_time_params(location);
        let params = CallbackParams::from_location(location);
        debug!("Handling auth callback {:?}", params);

        let mut run = CallbackRun {
            transitions: vec![CallbackState::ExchangingCredential],
        };
        let outcome = match self.establish(&params, code_verifier, mount).await {
            Ok(Some(session)) => {
                run.enter(CallbackState::EstablishingProfile);
                if let Err(e) = self.store.profiles().ensure_profile(&session).await {
                    // Guards still send an identity without a profile to onboarding.
                    warn!("Could not ensure profile for '{}': {}", session.identity_id(), e);
                }
                let route = self.resolve_route(&params);
                if mount.is_mounted() {
                    self.store.set_route(&route);
                }
                info!("Auth callback resolved to {}", route);
                run.enter(CallbackState::Resolved {
                    route: route.clone(),
                });
                CallbackOutcome::Resolved { route }
            }
            Ok(None) => {
                debug!("Callback view unmounted, discarding result");
                CallbackOutcome::Abandoned
            }
            Err(e) => {
                warn!("Auth callback failed: {}", e);
                let message = e.user_message();
                run.enter(CallbackState::Failed {
                    message: message.clone(),
                });
                CallbackOutcome::Failed {
                    message,
                    redirect_to: self.store.routes().sign_in.clone(),
                    delay: self.failure_delay,
                }
            }
        };

        CallbackReport {
            clean_location,
            transitions: run.transitions,
            outcome,
        }
    }

    /// Obtain and adopt the session the link carries. `Ok(None)` means the
    /// view was unmounted and nothing was adopted.
    async fn establish(
        &self,
        params: &CallbackParams,
        code_verifier: Option<&str>,
        mount: &MountFlag,
    ) -> Result<Option<Session>, AuthError> {
        if let Some(error) = &params.error {
            let description = params.error_description.as_deref().unwrap_or(error);
            return Err(AuthError::Provider(description.to_string()));
        }

        let routes = self.store.routes();
        // Recovery sessions are only adopted on the recovery page, and the
        // provider's own PASSWORD_RECOVERY event may be handled first.
        let landing = if params.is_recovery() {
            routes.password_reset.clone()
        } else {
            routes.callback.clone()
        };
        self.store.set_route(&landing);

        let provider = self.store.provider().clone();
        let session = match pick_credential(params)? {
            Credential::Code(code) => {
                debug!("Exchanging authorization code");
                self.bounded(provider.exchange_code_for_session(code, code_verifier))
                    .await?
            }
            Credential::TokenHash(otp) => {
                debug!("Verifying {} token hash", otp.link_type);
                self.bounded(provider.verify_otp(&otp)).await?
            }
            Credential::Fragment(tokens) => {
                debug!("Adopting session from URL fragment");
                self.bounded(provider.set_session(tokens)).await?
            }
            Credential::Established => self
                .bounded(provider.get_session())
                .await?
                .ok_or(AuthError::ExpiredCredential)?,
        };

        let Some(session) = mount.keep(session) else {
            return Ok(None);
        };

        if params.is_recovery() {
            if !self.store.apply_recovery(session.clone()).await {
                return Err(AuthError::ExpiredCredential);
            }
        } else {
            self.store.apply_signed_in(session.clone()).await;
        }
        Ok(Some(session))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        timeout(self.store.settings.provider_timeout, call)
            .await
            .map_err(|_| AuthError::Timeout)?
    }

    /// `next` when safe, else the page the link type implies, else the dashboard.
    fn resolve_route(&self, params: &CallbackParams) -> String {
        let routes = self.store.routes();
        if let Some(next) = params.safe_next() {
            return next.to_string();
        }
        if let Some(next) = &params.next {
            warn!("Ignoring unsafe next location '{}'", next);
        }
        match params.effective_link_type() {
            Some(LinkType::Invite) => routes.password_setup.clone(),
            Some(LinkType::Recovery) => routes.password_reset.clone(),
            _ => routes.dashboard.clone(),
        }
    }
}

fn pick_credential(params: &CallbackParams) -> Result<Credential<'_>, AuthError> {
    if let Some(code) = &params.code {
        return Ok(Credential::Code(code));
    }
    if let Some(token_hash) = &params.token_hash {
        let link_type = params.link_type.clone().ok_or_else(|| {
            AuthError::Validation(crate::error::ValidationError::new(
                "type",
                "This link is incomplete. Please request a new one.",
            ))
        })?;
        return Ok(Credential::TokenHash(OtpVerification {
            link_type,
            token_hash: token_hash.clone(),
        }));
    }
    if let Some(tokens) = &params.fragment {
        return Ok(Credential::Fragment(tokens));
    }
    Ok(Credential::Established)
}

struct CallbackRun {
    transitions: Vec<CallbackState>,
}

impl CallbackRun {
    fn enter(&mut self, state: CallbackState) {
        debug!("Callback state -> {:?}", state);
        self.transitions.push(state);
    }
}
