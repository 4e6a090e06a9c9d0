use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::{pkcs8::DecodePublicKey, traits::PublicKeyParts, RsaPublicKey};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::oauth::ADMIN_OWNER;
use super::store::ObjectStore;
use crate::models::Cert;

/// Issuer URL: the configured origin, else derived from the `Host` header.
pub fn issuer_for(origin: Option<&str>, host: &str) -> String {
    if let Some(origin) = origin.filter(|o| !o.is_empty()) {
        return origin.trim_end_matches('/').to_string();
    }
    let scheme = if host.starts_with("localhost") {
        "http"
    } else {
        "https"
    };
    format!("{}://{}", scheme, host)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub introspection_endpoint: String,
    pub end_session_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub request_parameter_supported: bool,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn discovery_document(issuer: &str) -> OidcDiscovery {
    OidcDiscovery {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{}/login/oauth/authorize", issuer),
        token_endpoint: format!("{}/login/oauth/access_token", issuer),
        userinfo_endpoint: format!("{}/api/userinfo", issuer),
        jwks_uri: format!("{}/.well-known/jwks", issuer),
        introspection_endpoint: format!("{}/login/oauth/introspect", issuer),
        end_session_endpoint: format!("{}/login/oauth/logout", issuer),
        response_types_supported: strings(&["code"]),
        response_modes_supported: strings(&["query"]),
        grant_types_supported: strings(&[
            "authorization_code",
            "password",
            "refresh_token",
            "client_credentials",
        ]),
        subject_types_supported: strings(&["public"]),
        id_token_signing_alg_values_supported: strings(&["RS256", "RS384", "RS512"]),
        scopes_supported: strings(&["openid", "email", "profile", "phone", "offline_access"]),
        claims_supported: strings(&[
            "iss",
            "sub",
            "aud",
            "iat",
            "exp",
            "nbf",
            "jti",
            "owner",
            "name",
            "id",
            "type",
            "displayName",
            "avatar",
            "email",
            "phone",
            "affiliation",
            "tag",
            "region",
            "language",
            "isAdmin",
            "isGlobalAdmin",
            "isForbidden",
            "signupApplication",
            "ldap",
        ]),
        code_challenge_methods_supported: strings(&["S256"]),
        request_parameter_supported: false,
    }
}

/// RFC 7517 public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

pub fn public_jwk(cert: &Cert) -> Result<Jwk, rsa::pkcs8::spki::Error> {
    let key = RsaPublicKey::from_public_key_pem(&cert.public_key)?;
    Ok(Jwk {
        kty: "RSA".to_string(),
        kid: cert.name.clone(),
        alg: cert.crypto_algorithm.clone(),
        key_use: "sig".to_string(),
        n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    })
}

/// Public keys of every certificate owned by `admin`. Unparseable
/// certificates are skipped.
pub async fn json_web_key_set(store: &ObjectStore) -> JwkSet {
    let keys = store
        .list_certs(ADMIN_OWNER)
        .await
        .iter()
        .filter_map(|cert| match public_jwk(cert) {
            Ok(jwk) => Some(jwk),
            Err(e) => {
                tracing::warn!(cert = %cert.id(), error = %e, "Skipping certificate with unreadable public key");
                None
            }
        })
        .collect();
    JwkSet { keys }
}
