use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `type` carried by externally issued auth links.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Invite,
    Recovery,
    Signup,
    Magiclink,
    EmailChange,
    Email,
    #[serde(untagged)]
    Other(String),
}

impl LinkType {
    pub fn as_str(&self) -> &str {
        match self {
            LinkType::Invite => "invite",
            LinkType::Recovery => "recovery",
            LinkType::Signup => "signup",
            LinkType::Magiclink => "magiclink",
            LinkType::EmailChange => "email_change",
            LinkType::Email => "email",
            LinkType::Other(other) => other,
        }
    }
}

impl From<&str> for LinkType {
    fn from(value: &str) -> Self {
        match value {
            "invite" => LinkType::Invite,
            "recovery" => LinkType::Recovery,
            "signup" => LinkType::Signup,
            "magiclink" => LinkType::Magiclink,
            "email_change" => LinkType::EmailChange,
            "email" => LinkType::Email,
            other => LinkType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
