use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

use super::error::StoreError;
use super::token_store::{Revocation, TokenStore};
use crate::models::{token::hash_token, AuthorizationCode, Token};

/// Redis-backed token store.
///
/// Codes and refresh indices are removed with `GETDEL`, so single use holds
/// across every replica sharing the instance. Token values are indexed by
/// their SHA-256 digest.
///
/// A token record is written once. Revocation only ever sets one of two flag
/// keys next to it, so concurrent revocations and rotations cannot undo each
/// other.
#[derive(Clone)]
pub struct RedisTokenStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisTokenStore {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    fn code_key(code: &str) -> String {
        format!("oauth:code:{}", hash_token(code))
    }

    fn token_key(name: &str) -> String {
        format!("oauth:token:{}", name)
    }

    fn access_revoked_key(name: &str) -> String {
        format!("oauth:revoked:access:{}", name)
    }

    fn refresh_revoked_key(name: &str) -> String {
        format!("oauth:revoked:refresh:{}", name)
    }

    fn access_key(value: &str) -> String {
        format!("oauth:access:{}", hash_token(value))
    }

    fn id_token_key(value: &str) -> String {
        format!("oauth:id:{}", hash_token(value))
    }

    fn refresh_key(application: &str, value: &str) -> String {
        format!("oauth:refresh:{}:{}", application, hash_token(value))
    }

    /// Application that owns a refresh token, for unscoped revocation.
    fn refresh_owner_key(value: &str) -> String {
        format!("oauth:refresh-owner:{}", hash_token(value))
    }

    fn pair_key(application: &str, organization: &str, user: &str) -> String {
        format!("oauth:pair:{}:{}:{}", application, organization, user)
    }

    /// Record plus its revocation flags, read in one round trip.
    async fn load_token(&self, name: &str) -> Result<Option<Token>, StoreError> {
        let mut conn = self.manager.clone();
        let (raw, access_revoked, refresh_revoked): (Option<String>, Option<String>, Option<String>) =
            redis::cmd("MGET")
                .arg(Self::token_key(name))
                .arg(Self::access_revoked_key(name))
                .arg(Self::refresh_revoked_key(name))
                .query_async(&mut conn)
                .await?;

        let Some(json) = raw else {
            return Ok(None);
        };
        let mut token: Token = serde_json::from_str(&json)?;
        token.access_revoked |= access_revoked.is_some();
        token.refresh_revoked |= refresh_revoked.is_some();
        Ok(Some(token))
    }

    /// Set a flag key for the lifetime of `token`. Returns whether this call
    /// set it.
    async fn set_flag(&self, key: String, token: &Token) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(token.retention_seconds())
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    async fn resolve(&self, index_key: &str) -> Result<Option<Token>, StoreError> {
        let mut conn = self.manager.clone();
        let name: Option<String> = redis::cmd("GET")
            .arg(index_key)
            .query_async(&mut conn)
            .await?;
        match name {
            Some(name) => self.load_token(&name).await,
            None => Ok(None),
        }
    }

    async fn resolve_access_or_id(&self, value: &str) -> Result<Option<Token>, StoreError> {
        match self.resolve(&Self::access_key(value)).await? {
            Some(token) => Ok(Some(token)),
            None => self.resolve(&Self::id_token_key(value)).await,
        }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn insert_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let ttl = (code.expires_at - chrono::Utc::now()).num_seconds().max(1);
        let json = serde_json::to_string(&code)?;

        redis::cmd("SET")
            .arg(Self::code_key(&code.code))
            .arg(json)
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(Self::code_key(code))
            .query_async(&mut conn)
            .await?;

        let record: Option<AuthorizationCode> = raw
            .map(|json| serde_json::from_str(&json))
            .transpose()?;
        Ok(record.filter(|r| !r.is_expired()))
    }

    async fn issue_token(&self, token: Token) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let ttl = token.retention_seconds();
        let json = serde_json::to_string(&token)?;
        let pair = Self::pair_key(&token.application, &token.organization, &token.user);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(Self::token_key(&token.name))
            .arg(json)
            .arg("EX")
            .arg(ttl)
            .ignore();

        if !token.access_token.is_empty() {
            pipe.cmd("SET")
                .arg(Self::access_key(&token.access_token))
                .arg(&token.name)
                .arg("EX")
                .arg(ttl)
                .ignore();
        }
        if !token.refresh_token.is_empty() {
            pipe.cmd("SET")
                .arg(Self::refresh_key(&token.application, &token.refresh_token))
                .arg(&token.name)
                .arg("EX")
                .arg(ttl)
                .ignore()
                .cmd("SET")
                .arg(Self::refresh_owner_key(&token.refresh_token))
                .arg(&token.application)
                .arg("EX")
                .arg(ttl)
                .ignore();
        }
        if !token.id_token.is_empty() {
            pipe.cmd("SET")
                .arg(Self::id_token_key(&token.id_token))
                .arg(&token.name)
                .arg("EX")
                .arg(ttl)
                .ignore();
        }

        pipe.cmd("SADD").arg(&pair).arg(&token.name).ignore();
        pipe.cmd("EXPIRE").arg(&pair).arg(ttl).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn find_by_access_token(&self, value: &str) -> Result<Option<Token>, StoreError> {
        self.resolve(&Self::access_key(value)).await
    }

    async fn find_by_token_and_application(
        &self,
        value: &str,
        application: &str,
    ) -> Result<Option<Token>, StoreError> {
        let found = match self.resolve_access_or_id(value).await? {
            Some(token) => Some(token),
            None => self.resolve(&Self::refresh_key(application, value)).await?,
        };
        Ok(found.filter(|t| t.application == application))
    }

    async fn take_refresh_token(
        &self,
        application: &str,
        value: &str,
    ) -> Result<Option<Token>, StoreError> {
        let mut conn = self.manager.clone();
        let name: Option<String> = redis::cmd("GETDEL")
            .arg(Self::refresh_key(application, value))
            .query_async(&mut conn)
            .await?;

        let Some(name) = name else {
            return Ok(None);
        };
        let Some(mut token) = self.load_token(&name).await? else {
            return Ok(None);
        };
        if !token.is_refresh_active() || token.application != application {
            return Ok(None);
        }

        self.set_flag(Self::refresh_revoked_key(&token.name), &token)
            .await?;
        token.refresh_revoked = true;
        Ok(Some(token))
    }

    async fn revoke_access_token(&self, value: &str) -> Result<bool, StoreError> {
        let Some(token) = self.find_by_access_token(value).await? else {
            return Ok(false);
        };
        if token.access_revoked {
            return Ok(false);
        }
        self.set_flag(Self::access_revoked_key(&token.name), &token)
            .await
    }

    async fn revoke_refresh_token(&self, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let application: Option<String> = redis::cmd("GET")
            .arg(Self::refresh_owner_key(value))
            .query_async(&mut conn)
            .await?;

        let Some(application) = application else {
            return Ok(false);
        };
        Ok(self.take_refresh_token(&application, value).await?.is_some())
    }

    async fn revoke_by_access_token(&self, value: &str) -> Result<Revocation, StoreError> {
        let Some(mut token) = self.resolve_access_or_id(value).await? else {
            return Ok(Revocation {
                was_active: false,
                application: None,
            });
        };

        let newly_revoked = self
            .set_flag(Self::access_revoked_key(&token.name), &token)
            .await?;
        let was_active = newly_revoked && token.is_access_active();
        self.set_flag(Self::refresh_revoked_key(&token.name), &token)
            .await?;
        token.access_revoked = true;
        token.refresh_revoked = true;

        if !token.refresh_token.is_empty() {
            let mut conn = self.manager.clone();
            redis::cmd("DEL")
                .arg(Self::refresh_key(&token.application, &token.refresh_token))
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(Revocation {
            was_active,
            application: Some(token.application),
        })
    }

    async fn list_by_user_and_application(
        &self,
        application: &str,
        organization: &str,
        user: &str,
    ) -> Result<Vec<Token>, StoreError> {
        let mut conn = self.manager.clone();
        let names: Vec<String> = redis::cmd("SMEMBERS")
            .arg(Self::pair_key(application, organization, user))
            .query_async(&mut conn)
            .await?;

        let mut tokens = Vec::with_capacity(names.len());
        for name in names {
            if let Some(token) = self.load_token(&name).await? {
                tokens.push(token);
            }
        }
        tokens.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        Ok(tokens)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(StoreError::from)
    }
}
