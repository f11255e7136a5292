use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether the identity finished the one-time profile setup.
///
/// `Unknown` is the fail-closed default: it is never treated as `Complete`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    #[default]
    Unknown,
    Incomplete,
    Complete,
}

impl OnboardingStatus {
    pub fn is_complete(self) -> bool {
        matches!(self, OnboardingStatus::Complete)
    }
}

/// A row of the `profiles` table, keyed by identity id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub onboarding_complete: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// The empty profile created for a new identity.
    pub fn blank(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Profile {
            id: id.into(),
            username: None,
            first_name: None,
            last_name: None,
            phone: None,
            onboarding_complete: false,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn onboarding_status(&self) -> OnboardingStatus {
        if self.onboarding_complete {
            OnboardingStatus::Complete
        } else {
            OnboardingStatus::Incomplete
        }
    }
}

/// Fields submitted by the onboarding form.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone, Default)]
pub struct ProfileDraft {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}
