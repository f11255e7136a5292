use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Paths of the pages the session layer redirects between.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct RouteConfig {
    pub sign_in: String,
    pub sign_up: String,
    pub onboarding: String,
    pub dashboard: String,
    /// Landing page of invite links, where the invited user chooses a password.
    pub password_setup: String,
    /// The password-recovery page. Recovery sessions are only adopted here.
    pub password_reset: String,
    pub callback: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        RouteConfig {
            sign_in: "/login".to_string(),
            sign_up: "/signup".to_string(),
            onboarding: "/onboarding".to_string(),
            dashboard: "/dashboard".to_string(),
            password_setup: "/onboarding/set-password".to_string(),
            password_reset: "/reset-password".to_string(),
            callback: "/auth/callback".to_string(),
        }
    }
}

impl RouteConfig {
    /// Pages only meant for signed-out visitors.
    pub fn is_public_entry(&self, path: &str) -> bool {
        let path = strip_query(path);
        path == "/" || path == self.sign_in || path == self.sign_up
    }

    pub fn is_password_recovery(&self, path: &str) -> bool {
        strip_query(path) == self.password_reset
    }

    pub fn is_onboarding(&self, path: &str) -> bool {
        let path = strip_query(path);
        path == self.onboarding || path == self.password_setup
    }
}

/// Drops the query string and fragment from a location.
pub fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_checks_ignore_query_strings() {
        let routes = RouteConfig::default();
        assert!(routes.is_public_entry("/login?redirected=1"));
        assert!(routes.is_password_recovery("/reset-password#access_token=x"));
        assert!(!routes.is_password_recovery("/dashboard"));
        assert!(routes.is_onboarding("/onboarding/set-password"));
    }
}
