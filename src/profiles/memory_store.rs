use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ProfileStore;
use crate::error::ProfileError;
use crate::models::Profile;

/// A process-local profile table with the same constraints as the real one:
/// unique ids and unique usernames.
#[derive(Default)]
pub struct MemoryProfileStore {
    rows: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing the constraints.
    pub async fn insert(&self, profile: Profile) {
        self.rows.write().await.insert(profile.id.clone(), profile);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn username_in_use(rows: &HashMap<String, Profile>, username: &str, excluding_id: &str) -> bool {
    rows.values().any(|p| {
        p.id != excluding_id
            && p
                .username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(username))
    })
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, id: &str, _access_token: &str) -> Result<Profile, ProfileError> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(ProfileError::NotFound)
    }

    async fn create_profile(&self, profile: &Profile, _access_token: &str) -> Result<(), ProfileError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&profile.id) {
            return Err(ProfileError::Conflict);
        }
        rows.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update_profile(&self, profile: &Profile, _access_token: &str) -> Result<Profile, ProfileError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&profile.id) {
            return Err(ProfileError::NotFound);
        }
        if let Some(username) = &profile.username {
            if username_in_use(&rows, username, &profile.id) {
                return Err(ProfileError::UsernameTaken);
            }
        }
        rows.insert(profile.id.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn username_taken(
        &self,
        username: &str,
        excluding_id: &str,
        _access_token: &str,
    ) -> Result<bool, ProfileError> {
        Ok(username_in_use(&*self.rows.read().await, username, excluding_id))
    }
}
