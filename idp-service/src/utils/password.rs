use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("unsupported password type: {0}")]
    UnsupportedScheme(String),

    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// Hashing scheme configured per organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    Plain,
    Salt,
    Md5Salt,
    Argon2id,
}

impl std::str::FromStr for PasswordScheme {
    type Err = PasswordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(PasswordScheme::Plain),
            "salt" => Ok(PasswordScheme::Salt),
            "md5-salt" => Ok(PasswordScheme::Md5Salt),
            "argon2id" => Ok(PasswordScheme::Argon2id),
            other => Err(PasswordError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl PasswordScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PasswordScheme::Plain => "plain",
            PasswordScheme::Salt => "salt",
            PasswordScheme::Md5Salt => "md5-salt",
            PasswordScheme::Argon2id => "argon2id",
        }
    }

    /// Hash `password` with the per-user and per-organization salts.
    ///
    /// Digest schemes chain the salts: `h = H(password)`, then `h = H(h + user_salt)`
    /// and `h = H(h + org_salt)` for each non-empty salt.
    pub fn hash(
        &self,
        password: &Password,
        user_salt: &str,
        org_salt: &str,
    ) -> Result<String, PasswordError> {
        match self {
            PasswordScheme::Plain => Ok(password.as_str().to_string()),
            PasswordScheme::Salt => Ok(chain_digest(sha256_hex, password.as_str(), user_salt, org_salt)),
            PasswordScheme::Md5Salt => Ok(chain_digest(md5_hex, password.as_str(), user_salt, org_salt)),
            PasswordScheme::Argon2id => {
                let salt = SaltString::generate(&mut OsRng);
                let input = format!("{}{}{}", password.as_str(), user_salt, org_salt);
                Argon2::default()
                    .hash_password(input.as_bytes(), &salt)
                    .map(|hash| hash.to_string())
                    .map_err(|e| PasswordError::Hash(e.to_string()))
            }
        }
    }

    /// Compare `supplied` against `stored` in constant time.
    pub fn verify(
        &self,
        stored: &str,
        supplied: &Password,
        user_salt: &str,
        org_salt: &str,
    ) -> bool {
        match self {
            PasswordScheme::Argon2id => {
                let Ok(parsed) = PasswordHash::new(stored) else {
                    return false;
                };
                let input = format!("{}{}{}", supplied.as_str(), user_salt, org_salt);
                Argon2::default()
                    .verify_password(input.as_bytes(), &parsed)
                    .is_ok()
            }
            _ => match self.hash(supplied, user_salt, org_salt) {
                Ok(candidate) => secure_eq(&candidate, stored),
                Err(_) => false,
            },
        }
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn chain_digest(digest: fn(&str) -> String, password: &str, user_salt: &str, org_salt: &str) -> String {
    let mut hash = digest(password);
    for salt in [user_salt, org_salt] {
        if !salt.is_empty() {
            hash = digest(&format!("{}{}", hash, salt));
        }
    }
    hash
}

/// Constant-time string equality.
pub fn secure_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
