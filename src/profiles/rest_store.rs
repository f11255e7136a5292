use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use super::ProfileStore;
use crate::config::{BackendConfig, RestProfileStoreConfig};
use crate::error::ProfileError;
use crate::models::Profile;

/// Postgres unique_violation, as reported by PostgREST in the error `code`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Deserialize, Default)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: String,
}

/// A `ProfileStore` on top of the backend's PostgREST endpoint.
pub struct RestProfileStore {
    client: reqwest::Client,
    table_url: String,
    anon_key: String,
}

impl RestProfileStore {
    pub fn new(config: &RestProfileStoreConfig, backend: &BackendConfig) -> Self {
        Self {
            client: backend.http_client(),
            table_url: format!(
                "{}/rest/v1/{}",
                backend.url.trim_end_matches('/'),
                config.table
            ),
            anon_key: backend.anon_key.clone(),
        }
    }

    fn request(&self, method: Method, access_token: &str) -> RequestBuilder {
        self.client
            .request(method, &self.table_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }
}

fn transport_error(e: reqwest::Error) -> ProfileError {
    error!("Profile store request failed: {}", e);
    ProfileError::Backend(e.to_string())
}

async fn error_body(resp: Response) -> (StatusCode, PostgrestError) {
    let status = resp.status();
    (status, resp.json::<PostgrestError>().await.unwrap_or_default())
}

fn backend_error(status: StatusCode, body: &PostgrestError) -> ProfileError {
    ProfileError::Backend(format!(
        "{} {}",
        status.as_u16(),
        body.message.as_deref().unwrap_or("")
    ))
}

async fn rows<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<Vec<T>, ProfileError> {
    if !resp.status().is_success() {
        let (status, body) = error_body(resp).await;
        return Err(backend_error(status, &body));
    }
    resp.json::<Vec<T>>()
        .await
        .map_err(|e| ProfileError::Backend(format!("Failed to parse profile rows: {}", e)))
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get_profile(&self, id: &str, access_token: &str) -> Result<Profile, ProfileError> {
        let resp = self
            .request(Method::GET, access_token)
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            .send()
            .await
            .map_err(transport_error)?;
        let mut found = rows::<Profile>(resp).await?;
        debug!("Profile lookup for '{}' returned {} rows", id, found.len());
        found.pop().ok_or(ProfileError::NotFound)
    }

    async fn create_profile(&self, profile: &Profile, access_token: &str) -> Result<(), ProfileError> {
        let resp = self
            .request(Method::POST, access_token)
            .header("Prefer", "return=minimal")
            .json(profile)
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status().is_success() {
            return Ok(());
        }
        let (status, body) = error_body(resp).await;
        if status == StatusCode::CONFLICT || body.code.as_deref() == Some(UNIQUE_VIOLATION) {
            return Err(ProfileError::Conflict);
        }
        Err(backend_error(status, &body))
    }

    async fn update_profile(&self, profile: &Profile, access_token: &str) -> Result<Profile, ProfileError> {
        let resp = self
            .request(Method::PATCH, access_token)
            .query(&[("id", format!("eq.{}", profile.id))])
            .header("Prefer", "return=representation")
            .json(profile)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            let (status, body) = error_body(resp).await;
            // The only unique column an update can collide on is the username.
            if status == StatusCode::CONFLICT || body.code.as_deref() == Some(UNIQUE_VIOLATION) {
                return Err(ProfileError::UsernameTaken);
            }
            return Err(backend_error(status, &body));
        }
        let mut updated = resp
            .json::<Vec<Profile>>()
            .await
            .map_err(|e| ProfileError::Backend(format!("Failed to parse profile rows: {}", e)))?;
        updated.pop().ok_or(ProfileError::NotFound)
    }

    async fn username_taken(
        &self,
        username: &str,
        excluding_id: &str,
        access_token: &str,
    ) -> Result<bool, ProfileError> {
        let resp = self
            .request(Method::GET, access_token)
            .query(&[
                ("username", format!("eq.{}", username)),
                ("id", format!("neq.{}", excluding_id)),
                ("select", "id".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        Ok(!rows::<IdRow>(resp).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn store_for(server: &ServerGuard) -> RestProfileStore {
        RestProfileStore::new(
            &RestProfileStoreConfig::default(),
            &BackendConfig {
                url: server.url(),
                anon_key: "anon".to_string(),
                request_timeout_in_ms: 2_000,
            },
        )
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.user-1".into()),
                Matcher::UrlEncoded("select".into(), "*".into()),
            ]))
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let err = store_for(&server)
            .get_profile("user-1", "token")
            .await
            .unwrap_err();
        m.assert_async().await;
        assert_eq!(err, ProfileError::NotFound);
    }

    #[tokio::test]
    async fn test_existing_row_is_parsed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":"user-1","username":"ana","first_name":"Ana","last_name":"Lima",
                    "phone":null,"onboarding_complete":true,
                    "created_at":"2024-05-01T10:00:00Z","updated_at":"2024-05-02T10:00:00Z"}]"#,
            )
            .create_async()
            .await;

        let profile = store_for(&server)
            .get_profile("user-1", "token")
            .await
            .unwrap();
        assert!(profile.onboarding_complete);
        assert_eq!(profile.username.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_unique_violation_on_create_is_conflict() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/rest/v1/profiles")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":"23505","message":"duplicate key value violates unique constraint \"profiles_pkey\""}"#)
            .create_async()
            .await;

        let err = store_for(&server)
            .create_profile(&Profile::blank("user-1"), "token")
            .await
            .unwrap_err();
        assert_eq!(err, ProfileError::Conflict);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_mistaken_for_missing_row() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"boom"}"#)
            .create_async()
            .await;

        let err = store_for(&server)
            .get_profile("user-1", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Backend(_)));
    }

    #[tokio::test]
    async fn test_username_lookup_excludes_own_row() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "eq.ana".into()),
                Matcher::UrlEncoded("id".into(), "neq.user-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":"user-2"}]"#)
            .create_async()
            .await;

        let taken = store_for(&server)
            .username_taken("ana", "user-1", "token")
            .await
            .unwrap();
        m.assert_async().await;
        assert!(taken);
    }
}
