use chrono::{Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Application, Cert, User};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("token is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token signature does not match")]
    SignatureMismatch,

    #[error("token audience does not match")]
    WrongAudience,

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("certificate key error: {0}")]
    Key(String),
}

/// Value of the `tokenType` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "access-token")]
    Access,
    #[serde(rename = "refresh-token")]
    Refresh,
    #[serde(rename = "id-token")]
    Id,
}

/// Profile claims copied from the user record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileClaims {
    pub owner: String,
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub display_name: String,
    pub avatar: String,
    pub email: String,
    pub phone: String,
    pub affiliation: String,
    pub tag: String,
    pub region: String,
    pub language: String,
    pub is_admin: bool,
    pub is_global_admin: bool,
    pub is_forbidden: bool,
    pub signup_application: String,
    /// LDAP uid for directory accounts.
    pub ldap: String,
}

impl From<&User> for ProfileClaims {
    fn from(user: &User) -> Self {
        Self {
            owner: user.owner.clone(),
            name: user.name.clone(),
            id: user.id.clone(),
            user_type: user.user_type.clone(),
            display_name: user.display_name.clone(),
            avatar: user.avatar.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            affiliation: user.affiliation.clone(),
            tag: user.tag.clone(),
            region: user.region.clone(),
            language: user.language.clone(),
            is_admin: user.is_admin,
            is_global_admin: user.is_global_admin,
            is_forbidden: user.is_forbidden,
            signup_application: user.signup_application.clone(),
            ldap: user.ldap_uid().to_string(),
        }
    }
}

impl ProfileClaims {
    /// Claims for tokens whose subject is the application itself.
    pub fn for_application(app: &Application) -> Self {
        Self {
            owner: app.owner.clone(),
            name: app.name.clone(),
            id: app.client_id.clone(),
            user_type: "application".to_string(),
            display_name: app.display_name.clone(),
            ..Default::default()
        }
    }
}

/// Full claim set carried by every minted token.
///
/// | claim | meaning |
/// |---|---|
/// | `iss` | issuer origin |
/// | `sub` | user id, or client id for application tokens |
/// | `aud` | `[client_id]` |
/// | `iat` / `nbf` | issue time, non-decreasing across mints |
/// | `exp` | `iat` + application lifetime |
/// | `jti` | random UUID |
/// | `tokenType` | `access-token`, `refresh-token` or `id-token` |
/// | `scope`, `nonce` | echoed from the grant |
///
/// plus the flattened [`ProfileClaims`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(flatten)]
    pub profile: ProfileClaims,
    pub token_type: TokenKind,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub scope: String,
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    pub fn client_id(&self) -> &str {
        self.aud.first().map(String::as_str).unwrap_or_default()
    }
}

/// Inputs for one token.
#[derive(Debug, Clone)]
pub struct TokenTemplate {
    pub profile: ProfileClaims,
    pub subject: String,
    pub kind: TokenKind,
    pub issuer: String,
    pub audience: String,
    pub scope: String,
    pub nonce: String,
    pub lifetime: Duration,
}

struct CertKeys {
    public_key: String,
    crypto_algorithm: String,
    algorithm: Algorithm,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl CertKeys {
    /// Whether these keys were built from the current state of `cert`.
    fn matches(&self, cert: &Cert) -> bool {
        self.public_key == cert.public_key
            && self.crypto_algorithm == cert.crypto_algorithm
            && self.encoding.is_some() == !cert.private_key.is_empty()
    }
}

/// Signs and verifies tokens with certificate-bound RSA keys.
///
/// Parsed keys are cached per certificate id and re-parsed when the
/// certificate's public key changes.
#[derive(Clone, Default)]
pub struct JwtService {
    keys: Arc<DashMap<String, Arc<CertKeys>>>,
    last_iat: Arc<AtomicI64>,
}

pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtError> {
    match name {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        other => Err(JwtError::UnsupportedAlgorithm(other.to_string())),
    }
}

impl JwtService {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys_for(&self, cert: &Cert) -> Result<Arc<CertKeys>, JwtError> {
        let id = cert.id();
        if let Some(cached) = self.keys.get(&id) {
            if cached.matches(cert) {
                return Ok(Arc::clone(&cached));
            }
        }

        let algorithm = parse_algorithm(&cert.crypto_algorithm)?;
        let decoding = DecodingKey::from_rsa_pem(cert.public_key.as_bytes())
            .map_err(|e| JwtError::Key(format!("public key of {}: {}", id, e)))?;
        let encoding = if cert.private_key.is_empty() {
            None
        } else {
            Some(
                EncodingKey::from_rsa_pem(cert.private_key.as_bytes())
                    .map_err(|e| JwtError::Key(format!("private key of {}: {}", id, e)))?,
            )
        };

        let keys = Arc::new(CertKeys {
            public_key: cert.public_key.clone(),
            crypto_algorithm: cert.crypto_algorithm.clone(),
            algorithm,
            encoding,
            decoding,
        });
        self.keys.insert(id, Arc::clone(&keys));
        tracing::debug!(cert = %cert.name, "Cached certificate keys");
        Ok(keys)
    }

    fn next_iat(&self) -> i64 {
        let now = Utc::now().timestamp();
        let previous = self.last_iat.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    /// Sign a token built from `template`.
    pub fn mint(&self, template: TokenTemplate, cert: &Cert) -> Result<(String, Claims), JwtError> {
        let keys = self.keys_for(cert)?;
        let encoding = keys
            .encoding
            .as_ref()
            .ok_or_else(|| JwtError::Key(format!("certificate {} has no private key", cert.id())))?;

        let iat = self.next_iat();
        let claims = Claims {
            profile: template.profile,
            token_type: template.kind,
            nonce: template.nonce,
            scope: template.scope,
            iss: template.issuer,
            sub: template.subject,
            aud: vec![template.audience],
            exp: iat + template.lifetime.num_seconds(),
            nbf: iat,
            iat,
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(keys.algorithm);
        header.kid = Some(cert.name.clone());

        let token = encode(&header, &claims, encoding).map_err(|e| JwtError::Key(e.to_string()))?;
        Ok((token, claims))
    }

    /// Verify signature, time window and audience.
    pub fn parse(&self, token: &str, cert: &Cert, client_id: &str) -> Result<Claims, JwtError> {
        decode_header(token).map_err(|_| JwtError::Malformed)?;
        let keys = self.keys_for(cert)?;

        let mut validation = Validation::new(keys.algorithm);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_audience(&[client_id]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);

        decode::<Claims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                ErrorKind::ImmatureSignature => JwtError::NotYetValid,
                ErrorKind::InvalidAudience => JwtError::WrongAudience,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    JwtError::SignatureMismatch
                }
                ErrorKind::InvalidRsaKey(msg) => JwtError::Key(msg.clone()),
                _ => JwtError::Malformed,
            })
    }
}
