use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::base::{FragmentTokens, IdentityProvider, OtpVerification, SignUpOutcome};
use super::events::EventBus;
use crate::config::BackendConfig;
use crate::error::{AuthError, ValidationError};
use crate::models::{
    AuthEvent, AuthEventKind, Credentials, Identity, LinkType, Session,
};

/// Config for the GoTrue-compatible identity provider.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone, Default)]
#[serde(default)]
pub struct GoTrueProviderConfig {
    /// Where the session survives restarts. Kept in memory only when unset.
    pub session_file: Option<PathBuf>,
}

/// Successful answer of the `/token` and `/verify` endpoints.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// GoTrue has used several error shapes over time; accept all of them.
#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

/// Identity provider client speaking the GoTrue REST API under `<backend>/auth/v1`.
pub struct GoTrueProvider {
    client: reqwest::Client,
    auth_url: String,
    anon_key: String,
    session_file: Option<PathBuf>,
    session: Mutex<Option<Session>>,
    loaded: AtomicBool,
    events: EventBus,
}

impl GoTrueProvider {
    pub fn new(config: &GoTrueProviderConfig, backend: &BackendConfig) -> Self {
        info!(
            "Creating GoTrue provider, session persistence: {}",
            config
                .session_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".to_string())
        );
        Self {
            client: backend.http_client(),
            auth_url: format!("{}/auth/v1", backend.url.trim_end_matches('/')),
            anon_key: backend.anon_key.clone(),
            session_file: config.session_file.clone(),
            session: Mutex::new(None),
            loaded: AtomicBool::new(false),
            events: EventBus::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.auth_url, path))
            .header("apikey", &self.anon_key)
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, AuthError> {
        debug!("Requesting token with grant_type='{}'", grant_type);
        let resp = self
            .request(Method::POST, "/token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let token = read_json::<TokenResponse>(resp).await?;
        Ok(session_from_token(token))
    }

    /// The in-memory session, loading the persisted one on first access.
    async fn current(&self) -> Option<Session> {
        let mut guard = self.session.lock().await;
        if !self.loaded.swap(true, Ordering::SeqCst) && guard.is_none() {
            if let Some(path) = &self.session_file {
                *guard = load_session(path).await;
            }
        }
        guard.clone()
    }

    async fn adopt(&self, session: Session, kind: AuthEventKind) -> Session {
        {
            let mut guard = self.session.lock().await;
            *guard = Some(session.clone());
            self.loaded.store(true, Ordering::SeqCst);
        }
        if let Some(path) = &self.session_file {
            persist_session(path, &session).await;
        }
        self.events.emit(AuthEvent::new(kind, Some(session.clone())));
        session
    }

    async fn forget(&self) {
        let had_session = {
            let mut guard = self.session.lock().await;
            self.loaded.store(true, Ordering::SeqCst);
            guard.take().is_some()
        };
        if let Some(path) = &self.session_file {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove persisted session: {}", e),
            }
        }
        if had_session {
            self.events.emit(AuthEvent::signed_out());
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let refreshed = self
            .token_grant(
                "refresh_token",
                json!({ "refresh_token": session.refresh_token }),
            )
            .await?;
        Ok(self.adopt(refreshed, AuthEventKind::TokenRefreshed).await)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<UserResponse, AuthError> {
        let resp = self
            .request(Method::GET, "/user")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_json::<UserResponse>(resp).await
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    fn get_name(&self) -> &str {
        "gotrue"
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.current().await else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!("Persisted access token expired, refreshing");
        match self.refresh(&session).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::InvalidCredentials | AuthError::ExpiredCredential) => {
                info!("Refresh token rejected, dropping persisted session");
                self.forget().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let session = self
            .token_grant(
                "password",
                json!({ "email": credentials.email, "password": credentials.password }),
            )
            .await?;
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn sign_up(
        &self,
        credentials: &Credentials,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let mut req = self.request(Method::POST, "/signup").json(&json!({
            "email": credentials.email,
            "password": credentials.password,
        }));
        if let Some(redirect_to) = redirect_to {
            req = req.query(&[("redirect_to", redirect_to)]);
        }
        let resp = req.send().await.map_err(map_transport_error)?;
        let body = read_json::<Value>(resp).await?;

        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| AuthError::Unexpected(format!("Malformed sign-up session: {}", e)))?;
            let session = self
                .adopt(session_from_token(token), AuthEventKind::SignedIn)
                .await;
            return Ok(SignUpOutcome::SignedIn(session));
        }

        debug!("Sign-up requires email confirmation");
        Ok(SignUpOutcome::ConfirmationSent {
            email: credentials.email.clone(),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.current().await;
        let remote = match &session {
            Some(session) => {
                let result = self
                    .request(Method::POST, "/logout")
                    .bearer_auth(&session.access_token)
                    .send()
                    .await
                    .map_err(map_transport_error);
                match result {
                    // An already revoked session is as signed out as it gets.
                    Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::UNAUTHORIZED => Ok(()),
                    Ok(resp) => Err(error_from_response(resp).await),
                    Err(e) => Err(e),
                }
            }
            None => Ok(()),
        };
        self.forget().await;
        remote
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        // The pkce grant is rejected without the verifier of the flow's initiator.
        let Some(verifier) = code_verifier.filter(|v| !v.is_empty()) else {
            warn!("Authorization code received without a PKCE code verifier");
            return Err(AuthError::Validation(ValidationError::new(
                "code_verifier",
                "Open this link in the browser you requested it from.",
            )));
        };
        let session = self
            .token_grant(
                "pkce",
                json!({ "auth_code": code, "code_verifier": verifier }),
            )
            .await?;
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn verify_otp(&self, otp: &OtpVerification) -> Result<Session, AuthError> {
        let resp = self
            .request(Method::POST, "/verify")
            .json(&json!({ "type": otp.link_type.as_str(), "token_hash": otp.token_hash }))
            .send()
            .await
            .map_err(map_transport_error)?;
        let token = read_json::<TokenResponse>(resp).await?;
        Ok(self
            .adopt(session_from_token(token), AuthEventKind::SignedIn)
            .await)
    }

    async fn set_session(&self, tokens: &FragmentTokens) -> Result<Session, AuthError> {
        let user = self.fetch_user(&tokens.access_token).await?;
        let now = Utc::now();
        // The fragment carries no reliable expiry; the next get_session refreshes early if needed.
        let expires_at = now + Duration::hours(1);
        let session = Session {
            identity: Identity {
                id: user.id,
                email: user.email.unwrap_or_default(),
                issued_at: now,
                expires_at,
            },
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at,
        };
        let kind = match tokens.link_type {
            Some(LinkType::Recovery) => AuthEventKind::PasswordRecovery,
            _ => AuthEventKind::SignedIn,
        };
        Ok(self.adopt(session, kind).await)
    }

    async fn update_user_password(&self, password: &str) -> Result<Identity, AuthError> {
        let session = self.current().await.ok_or(AuthError::NoSession)?;
        let resp = self
            .request(Method::PUT, "/user")
            .bearer_auth(&session.access_token)
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(map_transport_error)?;
        let user = read_json::<UserResponse>(resp).await?;
        self.events
            .emit(AuthEvent::new(AuthEventKind::UserUpdated, Some(session.clone())));
        Ok(Identity {
            id: user.id,
            email: user.email.unwrap_or(session.identity.email),
            issued_at: session.identity.issued_at,
            expires_at: session.identity.expires_at,
        })
    }

    fn subscribe(&self) -> UnboundedReceiver<AuthEvent> {
        self.events.subscribe()
    }
}

fn session_from_token(token: TokenResponse) -> Session {
    let now = Utc::now();
    let expires_at = token
        .expires_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(|| now + Duration::seconds(token.expires_in));
    Session {
        identity: Identity {
            id: token.user.id,
            email: token.user.email.unwrap_or_default(),
            issued_at: now,
            expires_at,
        },
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
    }
}

fn map_transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Network(e.to_string())
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, AuthError> {
    if !resp.status().is_success() {
        return Err(error_from_response(resp).await);
    }
    resp.json::<T>()
        .await
        .map_err(|e| AuthError::Unexpected(format!("Failed to parse provider response: {}", e)))
}

async fn error_from_response(resp: Response) -> AuthError {
    let status = resp.status();
    let body = resp.json::<ErrorBody>().await.unwrap_or_default();
    classify_error(status, &body)
}

fn classify_error(status: StatusCode, body: &ErrorBody) -> AuthError {
    let code = body
        .error_code
        .as_deref()
        .or(body.error.as_deref())
        .unwrap_or("");
    let message = body
        .error_description
        .as_deref()
        .or(body.msg.as_deref())
        .or(body.message.as_deref())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"))
        .to_string();

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::Network(message);
    }

    match code {
        "invalid_credentials" => AuthError::InvalidCredentials,
        "invalid_grant" if message.contains("Invalid login credentials") => {
            AuthError::InvalidCredentials
        }
        "invalid_grant" | "otp_expired" | "flow_state_expired" | "flow_state_not_found"
        | "bad_code_verifier" | "session_not_found" | "refresh_token_not_found" | "bad_jwt" => {
            AuthError::ExpiredCredential
        }
        _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            AuthError::ExpiredCredential
        }
        _ => AuthError::Provider(message),
    }
}

async fn load_session(path: &Path) -> Option<Session> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring unreadable persisted session: {}", e);
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read persisted session: {}", e);
            None
        }
    }
}

/// Best effort: a session that fails to persist still works for this run.
async fn persist_session(path: &Path, session: &Session) {
    let contents = match serde_json::to_string(session) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to serialize session: {}", e);
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Failed to create {}: {}", parent.display(), e);
            return;
        }
    }
    if let Err(e) = tokio::fs::write(path, contents).await {
        warn!("Failed to persist session to {}: {}", path.display(), e);
        return;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = tokio::fs::set_permissions(path, perms).await {
            warn!("Failed to restrict permissions of {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn token_body(user_id: &str, expires_in: i64) -> String {
        json!({
            "access_token": format!("access-{}", user_id),
            "token_type": "bearer",
            "expires_in": expires_in,
            "refresh_token": format!("refresh-{}", user_id),
            "user": { "id": user_id, "email": format!("{}@example.com", user_id) }
        })
        .to_string()
    }

    fn provider_for(server: &ServerGuard, session_file: Option<PathBuf>) -> GoTrueProvider {
        GoTrueProvider::new(
            &GoTrueProviderConfig { session_file },
            &BackendConfig {
                url: server.url(),
                anon_key: "anon".to_string(),
                request_timeout_in_ms: 2_000,
            },
        )
    }

    fn temp_session_file() -> PathBuf {
        std::env::temp_dir().join(format!("foodly-session-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn sign_in_adopts_session_and_emits_signed_in() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .match_header("apikey", "anon")
            .match_body(Matcher::PartialJson(json!({ "email": "ana@example.com" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ana", 3600))
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let mut events = provider.subscribe();
        let session = provider
            .sign_in_with_password(&Credentials::new("ana@example.com", "hunter22"))
            .await
            .expect("sign in should succeed");

        m.assert_async().await;
        assert_eq!(session.identity_id(), "ana");
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(provider.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn wrong_password_maps_to_invalid_credentials() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let err = provider
            .sign_in_with_password(&Credentials::new("ana@example.com", "nope"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn server_errors_map_to_network() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/verify")
            .with_status(503)
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let err = provider
            .verify_otp(&OtpVerification {
                link_type: LinkType::Invite,
                token_hash: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
    }

    #[tokio::test]
    async fn expired_otp_maps_to_expired_credential() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/v1/verify")
            .match_body(Matcher::Json(json!({ "type": "recovery", "token_hash": "stale" })))
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":403,"error_code":"otp_expired","msg":"Email link is invalid or has expired"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let err = provider
            .verify_otp(&OtpVerification {
                link_type: LinkType::Recovery,
                token_hash: "stale".to_string(),
            })
            .await
            .unwrap_err();
        m.assert_async().await;
        assert_eq!(err, AuthError::ExpiredCredential);
    }

    #[tokio::test]
    async fn code_exchange_sends_the_pkce_verifier() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "pkce".into()))
            .match_body(Matcher::Json(
                json!({ "auth_code": "code-123", "code_verifier": "verifier-abc" }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ana", 3600))
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let mut events = provider.subscribe();
        let session = provider
            .exchange_code_for_session("code-123", Some("verifier-abc"))
            .await
            .expect("code exchange should succeed");

        m.assert_async().await;
        assert_eq!(session.identity_id(), "ana");
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::SignedIn);
    }

    #[tokio::test]
    async fn code_exchange_without_verifier_never_reaches_the_backend() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/v1/token")
            .expect(0)
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let err = provider
            .exchange_code_for_session("code-123", None)
            .await
            .unwrap_err();

        m.assert_async().await;
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn sign_out_clears_local_state_even_when_logout_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ana", 3600))
            .create_async()
            .await;
        server
            .mock("POST", "/auth/v1/logout")
            .with_status(500)
            .create_async()
            .await;

        let path = temp_session_file();
        let provider = provider_for(&server, Some(path.clone()));
        provider
            .sign_in_with_password(&Credentials::new("ana@example.com", "hunter22"))
            .await
            .unwrap();
        assert!(path.exists());

        let mut events = provider.subscribe();
        assert!(provider.sign_out().await.is_err());
        assert_eq!(provider.get_session().await.unwrap(), None);
        assert!(!path.exists());
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::SignedOut);
    }

    #[tokio::test]
    async fn expired_persisted_session_is_refreshed() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .match_body(Matcher::Json(json!({ "refresh_token": "old-refresh" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ana", 3600))
            .create_async()
            .await;

        let path = temp_session_file();
        let past = Utc::now() - Duration::minutes(5);
        let stale = Session {
            identity: Identity {
                id: "ana".to_string(),
                email: "ana@example.com".to_string(),
                issued_at: past - Duration::hours(1),
                expires_at: past,
            },
            access_token: "old-access".to_string(),
            refresh_token: "old-refresh".to_string(),
            expires_at: past,
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let provider = provider_for(&server, Some(path.clone()));
        let mut events = provider.subscribe();
        let session = provider.get_session().await.unwrap().expect("session");

        m.assert_async().await;
        assert_eq!(session.refresh_token, "refresh-ana");
        assert_eq!(
            events.recv().await.unwrap().kind,
            AuthEventKind::TokenRefreshed
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn recovery_fragment_emits_password_recovery() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer fragment-access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"ana","email":"ana@example.com"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server, None);
        let mut events = provider.subscribe();
        let session = provider
            .set_session(&FragmentTokens {
                access_token: "fragment-access".to_string(),
                refresh_token: "fragment-refresh".to_string(),
                link_type: Some(LinkType::Recovery),
            })
            .await
            .unwrap();
        assert_eq!(session.identity_id(), "ana");
        assert_eq!(
            events.recv().await.unwrap().kind,
            AuthEventKind::PasswordRecovery
        );
    }

    #[test]
    fn classify_prefers_error_code_over_status() {
        let body = ErrorBody {
            error_code: Some("email_not_confirmed".to_string()),
            msg: Some("Email not confirmed".to_string()),
            ..Default::default()
        };
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, &body),
            AuthError::Provider("Email not confirmed".to_string())
        );
    }
}
