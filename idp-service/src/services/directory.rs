use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;
use thiserror::Error;

use crate::models::LdapServer;
use crate::utils::Password;

/// Result of one bind attempt against one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The user entry was found and the password accepted.
    Bound,
    /// No entry matches the uid.
    NotFound,
    /// More than one entry matches the uid.
    Ambiguous,
    /// The entry exists but the password was refused.
    Rejected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory connection failed: {0}")]
    Connection(String),

    #[error("directory call timed out")]
    Timeout,
}

impl From<ldap3::LdapError> for DirectoryError {
    fn from(err: ldap3::LdapError) -> Self {
        DirectoryError::Connection(err.to_string())
    }
}

/// Authenticates delegated accounts against a directory server.
#[async_trait]
pub trait DirectoryBinder: Send + Sync {
    async fn bind_user(
        &self,
        server: &LdapServer,
        uid: &str,
        password: &Password,
    ) -> Result<BindOutcome, DirectoryError>;
}

/// LDAP binder: admin bind, search for the uid, then bind as the entry.
#[derive(Debug, Clone)]
pub struct Ldap3Directory {
    timeout: Duration,
}

impl Ldap3Directory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn attempt(
        &self,
        server: &LdapServer,
        uid: &str,
        password: &Password,
    ) -> Result<BindOutcome, DirectoryError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &server.url()).await?;
        ldap3::drive!(conn);

        ldap.simple_bind(&server.username, &server.password)
            .await?
            .success()
            .map_err(|e| DirectoryError::Connection(format!("admin bind failed: {}", e)))?;

        let (entries, _) = ldap
            .search(&server.base_dn, Scope::Subtree, &server.user_filter(uid), vec!["dn"])
            .await?
            .success()?;

        let outcome = match entries.len() {
            0 => BindOutcome::NotFound,
            1 => {
                let dn = entries
                    .into_iter()
                    .next()
                    .map(|entry| SearchEntry::construct(entry).dn)
                    .unwrap_or_default();
                match ldap.simple_bind(&dn, password.as_str()).await?.success() {
                    Ok(_) => BindOutcome::Bound,
                    Err(e) => {
                        tracing::debug!(server = %server.id, error = %e, "LDAP user bind refused");
                        BindOutcome::Rejected
                    }
                }
            }
            _ => BindOutcome::Ambiguous,
        };

        if let Err(e) = ldap.unbind().await {
            tracing::debug!(server = %server.id, error = %e, "LDAP unbind failed");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl DirectoryBinder for Ldap3Directory {
    async fn bind_user(
        &self,
        server: &LdapServer,
        uid: &str,
        password: &Password,
    ) -> Result<BindOutcome, DirectoryError> {
        // An empty password would be an unauthenticated bind, which most servers accept
        if password.as_str().is_empty() {
            return Ok(BindOutcome::Rejected);
        }

        tokio::time::timeout(self.timeout, self.attempt(server, uid, password))
            .await
            .map_err(|_| DirectoryError::Timeout)?
    }
}
