use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use utoipa::ToSchema;

/// Refresh tokens of applications that leave `refresh_expire_in_hours` unset.
pub const DEFAULT_REFRESH_EXPIRE_HOURS: i64 = 720;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Upper bound for both token lifetimes (ten years).
pub const MAX_LIFETIME_HOURS: i64 = 87_600;

/// Prefix marking a redirect allow-list entry as a regular expression.
pub const REDIRECT_PATTERN_PREFIX: &str = "regex:";

/// Compiled redirect patterns keyed by their source. `None` marks a pattern
/// that failed to compile.
static REDIRECT_PATTERNS: OnceLock<DashMap<String, Option<Regex>>> = OnceLock::new();

fn redirect_pattern(pattern: &str) -> Option<Regex> {
    let cache = REDIRECT_PATTERNS.get_or_init(DashMap::new);
    if let Some(compiled) = cache.get(pattern) {
        return compiled.clone();
    }

    let compiled = match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Invalid redirect URI pattern");
            None
        }
    };
    cache.insert(pattern.to_string(), compiled.clone());
    compiled
}

/// An OAuth client registered with the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub owner: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub display_name: String,
    /// Organization whose users sign in through this application.
    pub organization: String,
    /// Name of the signing certificate (owned by `admin`).
    pub cert: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Exact URIs, or anchored regular expressions written as `regex:<pattern>`.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// `authorization_code` is always accepted in addition to these.
    #[serde(default)]
    pub grant_types: Vec<String>,
    pub expire_in_hours: i64,
    #[serde(default)]
    pub refresh_expire_in_hours: i64,
    #[serde(default)]
    pub enable_sign_up: bool,
}

impl Application {
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Refresh lifetime in hours, never shorter than the access lifetime.
    pub fn refresh_lifetime_hours(&self) -> i64 {
        let hours = if self.refresh_expire_in_hours > 0 {
            self.refresh_expire_in_hours
        } else {
            DEFAULT_REFRESH_EXPIRE_HOURS
        };
        hours.max(self.expire_in_hours)
    }

    /// Rejects lifetimes that cannot be turned into an expiry timestamp.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_LIFETIME_HOURS).contains(&self.expire_in_hours) {
            return Err(format!(
                "expireInHours of application {} must be between 1 and {}",
                self.name, MAX_LIFETIME_HOURS
            ));
        }
        if !(0..=MAX_LIFETIME_HOURS).contains(&self.refresh_expire_in_hours) {
            return Err(format!(
                "refreshExpireInHours of application {} must be between 0 and {}",
                self.name, MAX_LIFETIME_HOURS
            ));
        }
        Ok(())
    }

    pub fn allows_grant(&self, grant_type: &str) -> bool {
        grant_type == GRANT_AUTHORIZATION_CODE || self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Whether `uri` is on the allow-list. Plain entries must match verbatim;
    /// `regex:` entries must match the whole URI.
    pub fn is_redirect_uri_valid(&self, uri: &str) -> bool {
        if uri.is_empty() {
            return false;
        }

        self.redirect_uris.iter().any(|allowed| {
            match allowed.strip_prefix(REDIRECT_PATTERN_PREFIX) {
                Some(pattern) => redirect_pattern(pattern).is_some_and(|re| re.is_match(uri)),
                None => allowed == uri,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Application {
        Application {
            owner: "admin".to_string(),
            name: "app-test".to_string(),
            created_time: Utc::now(),
            display_name: String::new(),
            organization: "acme".to_string(),
            cert: "cert-built-in".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uris: vec![
                "https://app.example.com/callback".to_string(),
                r"regex:https://[a-z]+\.preview\.example\.com/cb".to_string(),
            ],
            grant_types: vec!["password".to_string()],
            expire_in_hours: 168,
            refresh_expire_in_hours: 0,
            enable_sign_up: false,
        }
    }

    #[test]
    fn test_redirect_uri_exact_and_pattern() {
        let app = app();
        assert!(app.is_redirect_uri_valid("https://app.example.com/callback"));
        assert!(app.is_redirect_uri_valid("https://pr.preview.example.com/cb"));
        assert!(!app.is_redirect_uri_valid("https://evil.com/?x=https://app.example.com/callback"));
        assert!(!app.is_redirect_uri_valid("https://app.example.com/callback/extra"));
        assert!(!app.is_redirect_uri_valid(""));
    }

    #[test]
    fn test_plain_redirect_uri_is_literal() {
        let app = app();
        assert!(!app.is_redirect_uri_valid("https://appXexample.com/callback"));
        assert!(!app.is_redirect_uri_valid("https://app-example.com/callback"));
        assert!(!app.is_redirect_uri_valid("regex:https://app.example.com/callback"));
    }

    #[test]
    fn test_invalid_pattern_matches_nothing() {
        let mut app = app();
        app.redirect_uris = vec!["regex:https://(unclosed".to_string()];
        assert!(!app.is_redirect_uri_valid("https://(unclosed"));
        // served from the cache the second time
        assert!(!app.is_redirect_uri_valid("https://(unclosed"));
    }

    #[test]
    fn test_refresh_lifetime_defaults_and_floor() {
        let mut app = app();
        assert_eq!(app.refresh_lifetime_hours(), DEFAULT_REFRESH_EXPIRE_HOURS);

        app.refresh_expire_in_hours = 24;
        assert_eq!(app.refresh_lifetime_hours(), 168);
    }

    #[test]
    fn test_lifetimes_are_bounded() {
        let mut app = app();
        assert!(app.validate().is_ok());

        app.expire_in_hours = 10_000_000_000_000;
        assert!(app.validate().is_err());

        app.expire_in_hours = 0;
        assert!(app.validate().is_err());

        app.expire_in_hours = 1;
        app.refresh_expire_in_hours = -5;
        assert!(app.validate().is_err());
    }

    #[test]
    fn test_grant_allow_list() {
        let app = app();
        assert!(app.allows_grant(GRANT_AUTHORIZATION_CODE));
        assert!(app.allows_grant(GRANT_PASSWORD));
        assert!(!app.allows_grant(GRANT_CLIENT_CREDENTIALS));
    }
}
