use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::routes::RouteConfig;
use super::store::ProfileStoreConfig;
use crate::providers::IdentityProviderConfig;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// Prefix of environment variables overriding the file, e.g. `FOODLY_BACKEND__ANON_KEY`.
pub const ENV_PREFIX: &str = "FOODLY_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub bind_address: String,
    pub backend: BackendConfig,
    pub identity_provider: IdentityProviderConfig,
    pub profile_store: ProfileStoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub routes: RouteConfig,
    #[serde(default)]
    pub map: MapConfig,
    /// Where email confirmation links send the user after authenticating.
    #[serde(default)]
    pub post_auth_redirect_url: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Base URL and public API key of the hosted identity/profile backend.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    /// Upper bound on each HTTP request to the backend.
    #[serde(default = "default_request_timeout_in_ms")]
    pub request_timeout_in_ms: u64,
}

fn default_request_timeout_in_ms() -> u64 {
    10_000
}

impl BackendConfig {
    /// An HTTP client whose requests give up after `request_timeout_in_ms`.
    pub fn http_client(&self) -> reqwest::Client {
        let timeout = std::time::Duration::from_millis(self.request_timeout_in_ms);
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Falling back to an HTTP client without timeout: {}", e);
                reqwest::Client::new()
            }
        }
    }
}

/// Timeouts and cache lifetimes of the session layer.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard upper bound on session recovery at startup.
    pub bootstrap_timeout_in_ms: u64,
    /// Upper bound on each individual identity provider call.
    pub provider_timeout_in_ms: u64,
    /// Window in which onboarding lookups for the same identity are coalesced.
    pub onboarding_cache_ttl_in_secs: u64,
    /// Delay before a failed callback sends the user back to sign-in.
    pub callback_failure_delay_in_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            bootstrap_timeout_in_ms: 10_000,
            provider_timeout_in_ms: 10_000,
            onboarding_cache_ttl_in_secs: 5,
            callback_failure_delay_in_ms: 3_000,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct MapConfig {
    /// Public key handed to the map widget for tile requests.
    #[serde(default)]
    pub tiles_api_key: Option<String>,
}

/// Merge the YAML file at `path` with `FOODLY_*` environment overrides.
pub fn figment_for(path: &str) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extract a versioned config from an already assembled figment.
pub fn extract_config(figment: Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load config from `path` (usually "config.yaml" in the current directory).
pub fn load_config(path: &str) -> ConfigV1 {
    match extract_config(figment_for(path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() {
    let schema = schema_for!(Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to render schema: {}", e),
    }
}
