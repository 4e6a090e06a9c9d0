use async_trait::async_trait;
use dashmap::DashMap;

use super::error::StoreError;
use crate::models::{AuthorizationCode, CodeRequest, Token};
use crate::utils::random_token;

/// Result of revoking a token by its access (or id) token value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    /// True when this call flipped an active token to revoked.
    pub was_active: bool,
    /// Application the token was issued to, if the token is known.
    pub application: Option<String>,
}

/// Persistence for authorization codes and issued token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_code(&self, code: AuthorizationCode) -> Result<(), StoreError>;

    /// Remove and return an unexpired code. Among concurrent callers at most
    /// one receives `Some`.
    async fn consume_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Persist a freshly minted token triple.
    async fn issue_token(&self, token: Token) -> Result<(), StoreError>;

    async fn find_by_access_token(&self, value: &str) -> Result<Option<Token>, StoreError>;

    /// Look up an access, refresh or id token value, scoped to `application`.
    async fn find_by_token_and_application(
        &self,
        value: &str,
        application: &str,
    ) -> Result<Option<Token>, StoreError>;

    /// Atomically detach an active refresh token issued to `application` and
    /// mark it revoked. Among concurrent callers at most one receives `Some`.
    async fn take_refresh_token(
        &self,
        application: &str,
        value: &str,
    ) -> Result<Option<Token>, StoreError>;

    async fn revoke_access_token(&self, value: &str) -> Result<bool, StoreError>;

    async fn revoke_refresh_token(&self, value: &str) -> Result<bool, StoreError>;

    /// Revoke both halves of the triple named by an access or id token value.
    /// Idempotent: repeated calls report `was_active == false`.
    async fn revoke_by_access_token(&self, value: &str) -> Result<Revocation, StoreError>;

    async fn list_by_user_and_application(
        &self,
        application: &str,
        organization: &str,
        user: &str,
    ) -> Result<Vec<Token>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Mint a new code bound to `request`.
    async fn issue_authorization_code(
        &self,
        request: CodeRequest,
    ) -> Result<AuthorizationCode, StoreError> {
        let code = AuthorizationCode::new(random_token(32), request);
        self.insert_code(code.clone()).await?;
        Ok(code)
    }
}

/// In-process token store for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryTokenStore {
    codes: DashMap<String, AuthorizationCode>,
    tokens: DashMap<String, Token>,
    by_access: DashMap<String, String>,
    by_refresh: DashMap<String, String>,
    by_id_token: DashMap<String, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, index: &DashMap<String, String>, value: &str) -> Option<Token> {
        let name = index.get(value)?.value().clone();
        self.tokens.get(&name).map(|t| t.value().clone())
    }

    fn name_for_access_or_id(&self, value: &str) -> Option<String> {
        self.by_access
            .get(value)
            .or_else(|| self.by_id_token.get(value))
            .map(|name| name.value().clone())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        self.codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self
            .codes
            .remove(code)
            .map(|(_, record)| record)
            .filter(|record| !record.is_expired()))
    }

    async fn issue_token(&self, token: Token) -> Result<(), StoreError> {
        let name = token.name.clone();
        if !token.access_token.is_empty() {
            self.by_access.insert(token.access_token.clone(), name.clone());
        }
        if !token.refresh_token.is_empty() {
            self.by_refresh.insert(token.refresh_token.clone(), name.clone());
        }
        if !token.id_token.is_empty() {
            self.by_id_token.insert(token.id_token.clone(), name.clone());
        }
        self.tokens.insert(name, token);
        Ok(())
    }

    async fn find_by_access_token(&self, value: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.resolve(&self.by_access, value))
    }

    async fn find_by_token_and_application(
        &self,
        value: &str,
        application: &str,
    ) -> Result<Option<Token>, StoreError> {
        let found = self
            .resolve(&self.by_access, value)
            .or_else(|| self.resolve(&self.by_refresh, value))
            .or_else(|| self.resolve(&self.by_id_token, value));
        Ok(found.filter(|t| t.application == application))
    }

    async fn take_refresh_token(
        &self,
        application: &str,
        value: &str,
    ) -> Result<Option<Token>, StoreError> {
        let taken = self.by_refresh.remove_if(value, |_, name| {
            self.tokens
                .get(name)
                .map(|t| t.application == application && t.is_refresh_active())
                .unwrap_or(false)
        });

        let Some((_, name)) = taken else {
            return Ok(None);
        };

        Ok(self.tokens.get_mut(&name).map(|mut token| {
            token.refresh_revoked = true;
            token.clone()
        }))
    }

    async fn revoke_access_token(&self, value: &str) -> Result<bool, StoreError> {
        let Some(name) = self.by_access.get(value).map(|n| n.value().clone()) else {
            return Ok(false);
        };
        Ok(self
            .tokens
            .get_mut(&name)
            .map(|mut token| !std::mem::replace(&mut token.access_revoked, true))
            .unwrap_or(false))
    }

    async fn revoke_refresh_token(&self, value: &str) -> Result<bool, StoreError> {
        let Some((_, name)) = self.by_refresh.remove(value) else {
            return Ok(false);
        };
        Ok(self
            .tokens
            .get_mut(&name)
            .map(|mut token| !std::mem::replace(&mut token.refresh_revoked, true))
            .unwrap_or(false))
    }

    async fn revoke_by_access_token(&self, value: &str) -> Result<Revocation, StoreError> {
        let Some(name) = self.name_for_access_or_id(value) else {
            return Ok(Revocation {
                was_active: false,
                application: None,
            });
        };

        let Some(mut token) = self.tokens.get_mut(&name) else {
            return Ok(Revocation {
                was_active: false,
                application: None,
            });
        };

        let was_active = token.is_access_active();
        token.access_revoked = true;
        token.refresh_revoked = true;
        let application = Some(token.application.clone());
        let refresh = token.refresh_token.clone();
        drop(token);

        self.by_refresh.remove(&refresh);
        Ok(Revocation {
            was_active,
            application,
        })
    }

    async fn list_by_user_and_application(
        &self,
        application: &str,
        organization: &str,
        user: &str,
    ) -> Result<Vec<Token>, StoreError> {
        let mut tokens: Vec<Token> = self
            .tokens
            .iter()
            .filter(|t| {
                t.application == application && t.organization == organization && t.user == user
            })
            .map(|t| t.value().clone())
            .collect();
        tokens.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        Ok(tokens)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
