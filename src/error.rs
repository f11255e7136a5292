//! Error taxonomy shared by the session layer.
//!
//! Validation failures never leave the process; provider and profile-store
//! failures are mapped onto these enums at the boundary so the rest of the
//! crate never sees raw HTTP errors.

use thiserror::Error;

/// A client-side validation failure on a single form field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError {
            field,
            message: message.into(),
        }
    }
}

/// Failures reported by the identity provider or the session store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("identity provider unavailable: {0}")]
    Network(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("credential is invalid or has expired")]
    ExpiredCredential,

    #[error("identity provider did not answer in time")]
    Timeout,

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("no active session")]
    NoSession,

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AuthError {
    /// Message safe to show next to a form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Network(_) | AuthError::Timeout => {
                "We couldn't reach the server. Check your connection and try again.".to_string()
            }
            AuthError::InvalidCredentials => "Invalid email or password.".to_string(),
            AuthError::ExpiredCredential => {
                "This link is invalid or has expired. Please request a new one.".to_string()
            }
            AuthError::Validation(e) => e.message.clone(),
            AuthError::NoSession => "Your session has ended. Please sign in again.".to_string(),
            AuthError::Provider(msg) => msg.clone(),
            AuthError::Unexpected(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Failures reported by the profile store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No profile row for the identity. Expected for new users.
    #[error("profile not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("profile already exists")]
    Conflict,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("no active session")]
    Unauthenticated,

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("profile store error: {0}")]
    Backend(String),
}

impl ProfileError {
    pub fn user_message(&self) -> String {
        match self {
            ProfileError::UsernameTaken => "That username is already taken.".to_string(),
            ProfileError::Validation(e) => e.message.clone(),
            ProfileError::Unauthenticated => {
                "Your session has ended. Please sign in again.".to_string()
            }
            _ => "We couldn't save your profile. Please try again.".to_string(),
        }
    }
}
