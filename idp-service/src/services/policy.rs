//! Request-level access policy.
//!
//! Each rule is a six-tuple `(subOwner, subName, method, urlPath, objOwner,
//! objName)`. A request is allowed when any rule matches it field by field, or
//! when the subject is the object it addresses.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const WILDCARD: &str = "*";
pub const ANONYMOUS: &str = "anonymous";
/// Rule sub-name matching every authenticated subject.
pub const NOT_ANONYMOUS: &str = "!anonymous";

/// Rules every deployment starts with.
const BUILT_IN_RULES: &[[&str; 6]] = &[
    ["built-in", "*", "*", "*", "*", "*"],
    ["app", "*", "*", "*", "*", "*"],
    ["*", "*", "POST", "/login/oauth/access_token", "*", "*"],
    ["*", "*", "POST", "/login/oauth/refresh_token", "*", "*"],
    ["*", "*", "GET", "/login/oauth/logout", "*", "*"],
    ["*", "*", "POST", "/login/oauth/introspect", "*", "*"],
    ["*", "*", "GET", "/.well-known/openid-configuration", "*", "*"],
    ["*", "*", "*", "/.well-known/jwks", "*", "*"],
    ["*", "!anonymous", "GET", "/api/userinfo", "*", "*"],
    ["*", "*", "GET", "/health", "*", "*"],
    ["*", "*", "GET", "/metrics", "*", "*"],
];

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid policy rule on line {line}: {reason}")]
    InvalidRule { line: usize, reason: String },

    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
}

/// Attributes of one inbound call.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub sub_owner: &'a str,
    pub sub_name: &'a str,
    pub method: &'a str,
    pub url_path: &'a str,
    pub obj_owner: &'a str,
    pub obj_name: &'a str,
}

impl PolicyRequest<'_> {
    fn is_self_access(&self) -> bool {
        self.sub_owner == self.obj_owner && self.sub_name == self.obj_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub sub_owner: String,
    pub sub_name: String,
    pub method: String,
    pub url_path: String,
    pub obj_owner: String,
    pub obj_name: String,
}

fn field_matches(rule: &str, value: &str) -> bool {
    rule == WILDCARD || rule == value
}

impl PolicyRule {
    pub fn new(fields: [&str; 6]) -> Self {
        let [sub_owner, sub_name, method, url_path, obj_owner, obj_name] = fields;
        Self {
            sub_owner: sub_owner.to_string(),
            sub_name: sub_name.to_string(),
            method: method.to_string(),
            url_path: url_path.to_string(),
            obj_owner: obj_owner.to_string(),
            obj_name: obj_name.to_string(),
        }
    }

    pub fn matches(&self, req: &PolicyRequest<'_>) -> bool {
        let sub_name = field_matches(&self.sub_name, req.sub_name)
            || (self.sub_name == NOT_ANONYMOUS && req.sub_name != ANONYMOUS);

        field_matches(&self.sub_owner, req.sub_owner)
            && sub_name
            && field_matches(&self.method, req.method)
            && field_matches(&self.url_path, req.url_path)
            && field_matches(&self.obj_owner, req.obj_owner)
            && field_matches(&self.obj_name, req.obj_name)
    }
}

impl FromStr for PolicyRule {
    type Err = String;

    /// Parses `p, subOwner, subName, method, urlPath, objOwner, objName`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        match parts.as_slice() {
            ["p", a, b, c, d, e, f] => {
                let fields = [*a, *b, *c, *d, *e, *f];
                if fields.iter().any(|field| field.is_empty()) {
                    return Err("empty field".to_string());
                }
                Ok(PolicyRule::new(fields))
            }
            [kind, ..] if *kind != "p" => Err(format!("unknown rule type '{}'", kind)),
            _ => Err(format!("expected 7 fields, found {}", parts.len())),
        }
    }
}

/// Parse a rule file body. Blank lines and `#` comments are skipped.
pub fn parse_rules(text: &str) -> Result<Vec<PolicyRule>, PolicyError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            text.parse::<PolicyRule>()
                .map_err(|reason| PolicyError::InvalidRule { line, reason })
        })
        .collect()
}

/// Immutable rule table shared across request tasks.
#[derive(Debug, Clone)]
pub struct PolicyMatcher {
    rules: Arc<[PolicyRule]>,
}

impl PolicyMatcher {
    pub fn built_in() -> Self {
        Self::with_rules(Vec::new())
    }

    /// Built-in rules followed by `extra`.
    pub fn with_rules(extra: Vec<PolicyRule>) -> Self {
        let rules: Vec<PolicyRule> = BUILT_IN_RULES
            .iter()
            .map(|fields| PolicyRule::new(*fields))
            .chain(extra)
            .collect();
        Self {
            rules: rules.into(),
        }
    }

    /// Built-in rules plus those in `path`, if given.
    pub fn load(path: Option<&Path>) -> Result<Self, PolicyError> {
        let extra = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                parse_rules(&text)?
            }
            None => Vec::new(),
        };

        let matcher = Self::with_rules(extra);
        tracing::info!(rules = matcher.rules.len(), "Policy rules loaded");
        Ok(matcher)
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn is_allowed(&self, req: &PolicyRequest<'_>) -> bool {
        req.is_self_access() || self.rules.iter().any(|rule| rule.matches(req))
    }
}
