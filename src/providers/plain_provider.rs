use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use futures::lock::Mutex;
use tracing::{debug, warn};

use super::base::{FragmentTokens, IdentityProvider, OtpVerification, SignUpOutcome};
use super::events::EventBus;
use crate::error::AuthError;
use crate::models::{AuthEvent, AuthEventKind, Credentials, Identity, LinkType, Session};

/// PlainProviderConfig lists the accounts known to the in-memory provider.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone, Default)]
pub struct PlainProviderConfig {
    #[serde(default)]
    pub users: Vec<PlainUserEntry>,
    /// Lifetime of issued access tokens.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_in_secs: i64,
}

/// A single account (id + email + password).
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct PlainUserEntry {
    pub id: String,
    pub email: String,
    pub password: String,
}

fn default_session_ttl() -> i64 {
    3600
}

#[derive(Default)]
struct PlainState {
    users: Vec<PlainUserEntry>,
    current: Option<Session>,
    /// Every session handed out, by access token, so fragments can be redeemed.
    issued: HashMap<String, Session>,
    /// One-time authorization codes, by code, to the user id they sign in.
    codes: HashMap<String, String>,
    /// One-time token hashes, to (link type, user id).
    token_hashes: HashMap<String, (LinkType, String)>,
}

/// An identity provider backed by the user list in its config.
///
/// Used for offline development and as the provider of the integration tests:
/// one-time codes and token hashes are minted locally with `issue_code` and
/// `issue_token_hash`.
pub struct PlainIdentityProvider {
    session_ttl: Duration,
    state: Mutex<PlainState>,
    events: EventBus,
}

impl PlainIdentityProvider {
    pub fn new(config: &PlainProviderConfig) -> Self {
        Self {
            session_ttl: Duration::seconds(config.session_ttl_in_secs),
            state: Mutex::new(PlainState {
                users: config.users.clone(),
                ..Default::default()
            }),
            events: EventBus::new(),
        }
    }

    /// Mint an authorization code for `email`, as an OAuth or magic-link redirect would carry.
    pub async fn issue_code(&self, email: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        let user_id = find_by_email(&state.users, email)?.id.clone();
        let code = uuid::Uuid::new_v4().simple().to_string();
        state.codes.insert(code.clone(), user_id);
        Some(code)
    }

    /// Mint a token hash for `email`, as invite and recovery emails carry.
    pub async fn issue_token_hash(&self, email: &str, link_type: LinkType) -> Option<String> {
        let mut state = self.state.lock().await;
        let user_id = find_by_email(&state.users, email)?.id.clone();
        let hash = uuid::Uuid::new_v4().simple().to_string();
        state.token_hashes.insert(hash.clone(), (link_type, user_id));
        Some(hash)
    }

    /// Issue a session for `email` without emitting an event, as if it had been
    /// persisted by a previous run.
    pub async fn restore_session(&self, email: &str) -> Option<Session> {
        let mut state = self.state.lock().await;
        let user = find_by_email(&state.users, email)?.clone();
        let session = self.mint(&mut state, &user);
        state.current = Some(session.clone());
        Some(session)
    }

    fn mint(&self, state: &mut PlainState, user: &PlainUserEntry) -> Session {
        let now = Utc::now();
        let expires_at = now + self.session_ttl;
        let session = Session {
            identity: Identity {
                id: user.id.clone(),
                email: user.email.clone(),
                issued_at: now,
                expires_at,
            },
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            expires_at,
        };
        state
            .issued
            .insert(session.access_token.clone(), session.clone());
        session
    }

    async fn sign_in_user(&self, user_id: &str, kind: AuthEventKind) -> Result<Session, AuthError> {
        let session = {
            let mut state = self.state.lock().await;
            let user = state
                .users
                .iter()
                .find(|u| u.id == user_id)
                .cloned()
                .ok_or(AuthError::ExpiredCredential)?;
            let session = self.mint(&mut state, &user);
            state.current = Some(session.clone());
            session
        };
        self.events.emit(AuthEvent::new(kind, Some(session.clone())));
        Ok(session)
    }
}

fn find_by_email<'a>(users: &'a [PlainUserEntry], email: &str) -> Option<&'a PlainUserEntry> {
    users.iter().find(|u| u.email.eq_ignore_ascii_case(email.trim()))
}

#[async_trait]
impl IdentityProvider for PlainIdentityProvider {
    fn get_name(&self) -> &str {
        "plain"
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let mut state = self.state.lock().await;
        let Some(current) = state.current.clone() else {
            return Ok(None);
        };
        if !current.is_expired() {
            return Ok(Some(current));
        }
        let user = state.users.iter().find(|u| u.id == current.identity.id).cloned();
        match user {
            Some(user) => {
                let refreshed = self.mint(&mut state, &user);
                state.current = Some(refreshed.clone());
                drop(state);
                self.events.emit(AuthEvent::new(
                    AuthEventKind::TokenRefreshed,
                    Some(refreshed.clone()),
                ));
                Ok(Some(refreshed))
            }
            None => {
                state.current = None;
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        debug!("Plain sign-in attempt for '{}'", credentials.email);
        let user_id = {
            let state = self.state.lock().await;
            match find_by_email(&state.users, &credentials.email) {
                Some(user) if user.password == credentials.password => user.id.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        self.sign_in_user(&user_id, AuthEventKind::SignedIn).await
    }

    async fn sign_up(
        &self,
        credentials: &Credentials,
        _redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let user_id = {
            let mut state = self.state.lock().await;
            if find_by_email(&state.users, &credentials.email).is_some() {
                return Err(AuthError::Provider("User already registered".to_string()));
            }
            let user = PlainUserEntry {
                id: uuid::Uuid::new_v4().to_string(),
                email: credentials.email.trim().to_string(),
                password: credentials.password.clone(),
            };
            let id = user.id.clone();
            state.users.push(user);
            id
        };
        let session = self.sign_in_user(&user_id, AuthEventKind::SignedIn).await?;
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let had_session = {
            let mut state = self.state.lock().await;
            if let Some(session) = state.current.take() {
                state.issued.remove(&session.access_token);
                true
            } else {
                false
            }
        };
        if had_session {
            self.events.emit(AuthEvent::signed_out());
        }
        Ok(())
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        let user_id = self.state.lock().await.codes.remove(code);
        match user_id {
            Some(user_id) => self.sign_in_user(&user_id, AuthEventKind::SignedIn).await,
            None => {
                warn!("Unknown or already used authorization code");
                Err(AuthError::ExpiredCredential)
            }
        }
    }

    async fn verify_otp(&self, otp: &OtpVerification) -> Result<Session, AuthError> {
        let entry = self.state.lock().await.token_hashes.remove(&otp.token_hash);
        match entry {
            Some((link_type, user_id)) if link_type == otp.link_type => {
                self.sign_in_user(&user_id, AuthEventKind::SignedIn).await
            }
            _ => Err(AuthError::ExpiredCredential),
        }
    }

    async fn set_session(&self, tokens: &FragmentTokens) -> Result<Session, AuthError> {
        let session = {
            let mut state = self.state.lock().await;
            let session = state
                .issued
                .get(&tokens.access_token)
                .filter(|s| s.refresh_token == tokens.refresh_token)
                .cloned()
                .ok_or(AuthError::ExpiredCredential)?;
            state.current = Some(session.clone());
            session
        };
        let kind = match tokens.link_type {
            Some(LinkType::Recovery) => AuthEventKind::PasswordRecovery,
            _ => AuthEventKind::SignedIn,
        };
        self.events.emit(AuthEvent::new(kind, Some(session.clone())));
        Ok(session)
    }

    async fn update_user_password(&self, password: &str) -> Result<Identity, AuthError> {
        let session = {
            let mut state = self.state.lock().await;
            let session = state.current.clone().ok_or(AuthError::NoSession)?;
            let user = state
                .users
                .iter_mut()
                .find(|u| u.id == session.identity.id)
                .ok_or(AuthError::NoSession)?;
            user.password = password.to_string();
            session
        };
        self.events.emit(AuthEvent::new(
            AuthEventKind::UserUpdated,
            Some(session.clone()),
        ));
        Ok(session.identity)
    }

    fn subscribe(&self) -> UnboundedReceiver<AuthEvent> {
        self.events.subscribe()
    }
}
