use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Where a user's password is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CredentialSource {
    /// Hash stored on the user record.
    #[default]
    Local,
    /// Bind against the organization's LDAP servers as `uid`.
    Directory { uid: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Organization name.
    pub owner: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_time: DateTime<Utc>,
    /// Stable identifier, used as the `sub` claim.
    #[serde(default = "new_user_id")]
    pub id: String,
    #[serde(rename = "type", default = "default_user_type")]
    pub user_type: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(skip_serializing, default)]
    pub password_salt: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_global_admin: bool,
    #[serde(default)]
    pub is_forbidden: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub signup_application: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub credential_source: CredentialSource,
    /// External identity provider tag to the id it assigned this user.
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

fn new_user_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_user_type() -> String {
    "normal-user".to_string()
}

impl User {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            created_time: Utc::now(),
            id: new_user_id(),
            user_type: default_user_type(),
            password: String::new(),
            password_salt: String::new(),
            display_name: String::new(),
            avatar: String::new(),
            email: String::new(),
            phone: String::new(),
            affiliation: String::new(),
            tag: String::new(),
            region: String::new(),
            language: String::new(),
            is_admin: false,
            is_global_admin: false,
            is_forbidden: false,
            is_deleted: false,
            signup_application: String::new(),
            credential_source: CredentialSource::Local,
            external_ids: BTreeMap::new(),
        }
    }

    /// `owner/name`, the form used in `user_id` parameters.
    pub fn id_string(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// LDAP uid for delegated accounts, empty otherwise.
    pub fn ldap_uid(&self) -> &str {
        match &self.credential_source {
            CredentialSource::Directory { uid } => uid,
            CredentialSource::Local => "",
        }
    }
}

/// Split an `owner/name` identifier.
pub fn split_owner_name(id: &str) -> Option<(&str, &str)> {
    let (owner, name) = id.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}
