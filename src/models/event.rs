use serde::{Deserialize, Serialize};

use super::identity::Session;

/// Kinds of events emitted by the identity provider's event stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum AuthEventKind {
    #[serde(rename = "SIGNED_IN")]
    SignedIn,
    #[serde(rename = "SIGNED_OUT")]
    SignedOut,
    #[serde(rename = "TOKEN_REFRESHED")]
    TokenRefreshed,
    #[serde(rename = "PASSWORD_RECOVERY")]
    PasswordRecovery,
    #[serde(rename = "INITIAL_SESSION")]
    InitialSession,
    #[serde(rename = "USER_UPDATED")]
    UserUpdated,
    #[serde(untagged)]
    Other(String),
}

impl AuthEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            AuthEventKind::SignedIn => "SIGNED_IN",
            AuthEventKind::SignedOut => "SIGNED_OUT",
            AuthEventKind::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEventKind::PasswordRecovery => "PASSWORD_RECOVERY",
            AuthEventKind::InitialSession => "INITIAL_SESSION",
            AuthEventKind::UserUpdated => "USER_UPDATED",
            AuthEventKind::Other(name) => name,
        }
    }
}

/// A single provider event, optionally carrying the session it refers to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        AuthEvent { kind, session }
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }
}
