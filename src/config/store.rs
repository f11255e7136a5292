use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which profile store backs onboarding lookups. Tagged by "type" in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum ProfileStoreConfig {
    /// PostgREST `profiles` table on the configured backend.
    #[serde(rename = "rest")]
    Rest(RestProfileStoreConfig),
    /// Process-local table, for offline development and tests.
    #[serde(rename = "memory")]
    Memory,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RestProfileStoreConfig {
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for RestProfileStoreConfig {
    fn default() -> Self {
        RestProfileStoreConfig {
            table: default_table(),
        }
    }
}

fn default_table() -> String {
    "profiles".to_string()
}
