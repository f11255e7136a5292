use reqwest::Url;

use crate::models::LinkType;
use crate::providers::FragmentTokens;

/// Query and fragment parameters that are only valid once.
const ONE_TIME_PARAMS: &[&str] = &[
    "code",
    "token_hash",
    "type",
    "access_token",
    "refresh_token",
    "expires_in",
    "expires_at",
    "token_type",
    "provider_token",
    "provider_refresh_token",
    "error",
    "error_code",
    "error_description",
];

/// Base for parsing the relative locations the shell reports.
const LOCAL_ORIGIN: &str = "http://localhost";

/// Everything the callback page can be handed, from both the query string
/// and the fragment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub token_hash: Option<String>,
    pub link_type: Option<LinkType>,
    pub next: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub fragment: Option<FragmentTokens>,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("has_code", &self.code.is_some())
            .field("has_token_hash", &self.token_hash.is_some())
            .field("link_type", &self.link_type)
            .field("next", &self.next)
            .field("error", &self.error)
            .field("has_fragment", &self.fragment.is_some())
            .finish()
    }
}

impl CallbackParams {
    /// Parse a location such as `/auth/callback?code=abc#access_token=...`.
    pub fn from_location(location: &str) -> Self {
        let Some(url) = parse_location(location) else {
            return Self::default();
        };

        let mut params = CallbackParams::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => params.code = non_empty(value),
                "token_hash" => params.token_hash = non_empty(value),
                "type" => params.link_type = non_empty(value).map(|t| LinkType::from(t.as_str())),
                "next" => params.next = non_empty(value),
                "error" => params.error = non_empty(value),
                "error_description" => params.error_description = non_empty(value),
                _ => {}
            }
        }
        params.fragment = url.fragment().and_then(parse_fragment);

        // Error redirects of the implicit flow arrive in the fragment.
        if params.error.is_none() {
            if let Some(fragment) = url.fragment() {
                let pairs = form_pairs(fragment);
                params.error = lookup(&pairs, "error");
                params.error_description = lookup(&pairs, "error_description");
            }
        }
        params
    }

    /// The link type from the query, else from the fragment.
    pub fn effective_link_type(&self) -> Option<&LinkType> {
        self.link_type
            .as_ref()
            .or_else(|| self.fragment.as_ref().and_then(|f| f.link_type.as_ref()))
    }

    pub fn is_recovery(&self) -> bool {
        self.effective_link_type() == Some(&LinkType::Recovery)
    }

    /// `next`, if it is safe to follow.
    pub fn safe_next(&self) -> Option<&str> {
        self.next.as_deref().filter(|next| is_safe_next(next))
    }
}

fn parse_fragment(fragment: &str) -> Option<FragmentTokens> {
    let pairs = form_pairs(fragment);
    let access_token = lookup(&pairs, "access_token")?;
    let refresh_token = lookup(&pairs, "refresh_token")?;
    Some(FragmentTokens {
        access_token,
        refresh_token,
        link_type: lookup(&pairs, "type").map(|t| LinkType::from(t.as_str())),
    })
}

fn form_pairs(encoded: &str) -> Vec<(String, String)> {
    // Reuse the query parser for fragments, which use the same encoding.
    let mut url = match Url::parse(LOCAL_ORIGIN) {
        Ok(url) => url,
        Err(_) => return Vec::new(),
    };
    url.set_query(Some(encoded));
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn lookup(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| non_empty(v.clone()))
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn parse_location(location: &str) -> Option<Url> {
    Url::parse(LOCAL_ORIGIN).ok()?.join(location).ok()
}

/// Only same-origin relative paths are followed: a single leading slash,
/// no scheme, no protocol-relative or backslash tricks.
pub fn is_safe_next(next: &str) -> bool {
    next.starts_with('/')
        && !next.starts_with("//")
        && !next.starts_with("/\\")
        && !next.contains("://")
        && !next.chars().any(char::is_control)
}

/// `location` with every one-time parameter removed from the query and the
/// fragment dropped, so a refresh cannot replay the credential.
pub fn strip_one_time_params(location: &str) -> String {
    let Some(mut url) = parse_location(location) else {
        return location.split(['?', '#']).next().unwrap_or("/").to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !ONE_TIME_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_fragment(None);
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
