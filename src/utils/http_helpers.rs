use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{AuthError, ProfileError, ValidationError};
use crate::models::Session;
use crate::state::AppState;

/// A general purpose HTTP error type that can be converted into an `IntoResponse`.
#[derive(Debug)]
pub struct HTTPError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl HTTPError {
    /// Creates a new HTTP error with the given status code and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HTTPError {
            status,
            message: message.into(),
            field: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Converts our `HTTPError` into a JSON response.
impl IntoResponse for HTTPError {
    fn into_response(self) -> Response {
        let body = match self.field {
            Some(field) => json!({ "error": self.message, "field": field }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ValidationError> for HTTPError {
    fn from(e: ValidationError) -> Self {
        HTTPError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: e.message,
            field: Some(e.field),
        }
    }
}

impl From<AuthError> for HTTPError {
    fn from(e: AuthError) -> Self {
        let status = match &e {
            AuthError::Validation(v) => return v.clone().into(),
            AuthError::InvalidCredentials | AuthError::ExpiredCredential | AuthError::NoSession => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Network(_) | AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
            AuthError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AuthError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HTTPError::new(status, e.user_message())
    }
}

impl From<ProfileError> for HTTPError {
    fn from(e: ProfileError) -> Self {
        let status = match &e {
            ProfileError::Validation(v) => return v.clone().into(),
            ProfileError::UsernameTaken | ProfileError::Conflict => StatusCode::CONFLICT,
            ProfileError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ProfileError::NotFound => StatusCode::NOT_FOUND,
            ProfileError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        HTTPError::new(status, e.user_message())
    }
}

/// The session currently held by the store. Rejects with 401 when signed out.
pub struct ActiveSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for ActiveSession {
    type Rejection = HTTPError;

    async fn from_request_parts(
        _parts: &mut http::request::Parts,
        state: &AppState,
    ) -> Result<ActiveSession, HTTPError> {
        match state.store.snapshot().session {
            Some(session) => Ok(ActiveSession(session)),
            None => Err(HTTPError::new(
                StatusCode::UNAUTHORIZED,
                AuthError::NoSession.user_message(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(
            HTTPError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HTTPError::from(AuthError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            HTTPError::from(AuthError::Validation(ValidationError::new("email", "bad"))).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn taken_username_is_a_conflict() {
        assert_eq!(
            HTTPError::from(ProfileError::UsernameTaken).status(),
            StatusCode::CONFLICT
        );
    }
}
