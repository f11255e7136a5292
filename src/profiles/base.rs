use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::memory_store::MemoryProfileStore;
use super::rest_store::RestProfileStore;
use crate::config::{BackendConfig, ProfileStoreConfig};
use crate::error::ProfileError;
use crate::models::Profile;

/// The ProfileStore trait abstracts the relational `profiles` table.
///
/// Every call carries the caller's access token; the backend enforces row-level
/// security with it.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns `ProfileError::NotFound` when the identity has no row yet.
    async fn get_profile(&self, id: &str, access_token: &str) -> Result<Profile, ProfileError>;

    /// Returns `ProfileError::Conflict` when a row with the same id already exists.
    async fn create_profile(&self, profile: &Profile, access_token: &str) -> Result<(), ProfileError>;

    /// Returns `ProfileError::UsernameTaken` when the username collides with another row.
    async fn update_profile(&self, profile: &Profile, access_token: &str) -> Result<Profile, ProfileError>;

    /// Whether any profile other than `excluding_id` already uses `username`.
    async fn username_taken(
        &self,
        username: &str,
        excluding_id: &str,
        access_token: &str,
    ) -> Result<bool, ProfileError>;
}

/// Creates a concrete profile store based on the ProfileStoreConfig.
pub fn create_profile_store(
    config: &ProfileStoreConfig,
    backend: &BackendConfig,
) -> Arc<dyn ProfileStore> {
    match config {
        ProfileStoreConfig::Rest(rest) => {
            info!("Using REST profile store, table '{}'", rest.table);
            Arc::new(RestProfileStore::new(rest, backend))
        }
        ProfileStoreConfig::Memory => {
            info!("Using in-memory profile store.");
            Arc::new(MemoryProfileStore::new())
        }
    }
}
