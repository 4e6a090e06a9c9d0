//! Boot data: the built-in organization, admin user, application, signing
//! certificate and LDAP server, plus an optional JSON seed file.

use anyhow::Context;
use chrono::Utc;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use std::path::Path;

use super::error::StoreError;
use super::oauth::ADMIN_OWNER;
use super::store::ObjectStore;
use crate::config::BuiltInCertConfig;
use crate::models::application::{
    GRANT_AUTHORIZATION_CODE, GRANT_CLIENT_CREDENTIALS, GRANT_PASSWORD, GRANT_REFRESH_TOKEN,
};
use crate::models::organization::BUILT_IN_ORGANIZATION;
use crate::models::{Application, Cert, LdapServer, Organization, User};
use crate::utils::{random_token, Password, PasswordScheme};

pub const BUILT_IN_APPLICATION: &str = "app-built-in";
pub const BUILT_IN_CERT: &str = "cert-built-in";
pub const BUILT_IN_LDAP: &str = "ldap-built-in";

const DEFAULT_AVATAR: &str = "https://casbin.org/img/casbin.svg";

/// Objects loaded from `SEED_FILE`. User passwords are plaintext and hashed
/// with their organization's scheme on insert.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SeedData {
    pub organizations: Vec<Organization>,
    pub applications: Vec<Application>,
    pub users: Vec<User>,
    pub certs: Vec<Cert>,
    pub ldap_servers: Vec<LdapServer>,
}

/// Count of objects a seed pass inserted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

impl SeedReport {
    fn record(&mut self, outcome: Result<(), StoreError>) -> Result<(), StoreError> {
        match outcome {
            Ok(()) => self.inserted += 1,
            Err(StoreError::Conflict(what)) => {
                tracing::debug!(object = %what, "Seed object already present");
                self.skipped += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

fn built_in_organization() -> Organization {
    Organization {
        owner: ADMIN_OWNER.to_string(),
        name: BUILT_IN_ORGANIZATION.to_string(),
        created_time: Utc::now(),
        display_name: "Built-in Organization".to_string(),
        website_url: "https://example.com".to_string(),
        password_type: PasswordScheme::Plain.as_str().to_string(),
        password_salt: String::new(),
        master_password: String::new(),
        default_avatar: DEFAULT_AVATAR.to_string(),
    }
}

fn built_in_user() -> User {
    let mut user = User::new(BUILT_IN_ORGANIZATION, "admin");
    user.password = "123".to_string();
    user.display_name = "Admin".to_string();
    user.avatar = DEFAULT_AVATAR.to_string();
    user.email = "admin@example.com".to_string();
    user.phone = "12345678910".to_string();
    user.affiliation = "Example Inc.".to_string();
    user.tag = "staff".to_string();
    user.is_admin = true;
    user.is_global_admin = true;
    user.signup_application = BUILT_IN_APPLICATION.to_string();
    user
}

fn built_in_application() -> Application {
    Application {
        owner: ADMIN_OWNER.to_string(),
        name: BUILT_IN_APPLICATION.to_string(),
        created_time: Utc::now(),
        display_name: "Built-in Application".to_string(),
        organization: BUILT_IN_ORGANIZATION.to_string(),
        cert: BUILT_IN_CERT.to_string(),
        client_id: random_token(16),
        client_secret: random_token(32),
        redirect_uris: Vec::new(),
        grant_types: vec![
            GRANT_AUTHORIZATION_CODE.to_string(),
            GRANT_PASSWORD.to_string(),
            GRANT_REFRESH_TOKEN.to_string(),
            GRANT_CLIENT_CREDENTIALS.to_string(),
        ],
        expire_in_hours: 168,
        refresh_expire_in_hours: 0,
        enable_sign_up: true,
    }
}

fn built_in_ldap() -> LdapServer {
    LdapServer {
        id: BUILT_IN_LDAP.to_string(),
        owner: BUILT_IN_ORGANIZATION.to_string(),
        server_name: "BuildIn LDAP Server".to_string(),
        host: "example.com".to_string(),
        port: 389,
        enable_ssl: false,
        username: "cn=buildin,dc=example,dc=com".to_string(),
        password: "123".to_string(),
        base_dn: "ou=BuildIn,dc=example,dc=com".to_string(),
        filter: "(objectClass=posixAccount)".to_string(),
    }
}

/// Load the built-in key pair from disk, or generate one.
async fn built_in_cert(config: &BuiltInCertConfig) -> Result<Cert, anyhow::Error> {
    let (private_key, public_key, bit_size) =
        match (&config.private_key_path, &config.public_key_path) {
            (Some(private_path), Some(public_path)) => {
                let private_key = tokio::fs::read_to_string(private_path)
                    .await
                    .with_context(|| format!("Failed to read private key from {}", private_path))?;
                let public_key = tokio::fs::read_to_string(public_path)
                    .await
                    .with_context(|| format!("Failed to read public key from {}", public_path))?;
                tracing::info!("Loaded built-in certificate keys from disk");
                (private_key, public_key, config.key_bits)
            }
            _ => {
                let bits = config.key_bits;
                tracing::warn!(bits, "Generating built-in RSA key pair; tokens will not verify after a restart");
                let (private_key, public_key) =
                    tokio::task::spawn_blocking(move || generate_key_pair(bits)).await??;
                (private_key, public_key, bits)
            }
        };

    Ok(Cert {
        owner: ADMIN_OWNER.to_string(),
        name: BUILT_IN_CERT.to_string(),
        created_time: Utc::now(),
        display_name: "Built-in Cert".to_string(),
        crypto_algorithm: "RS256".to_string(),
        bit_size,
        public_key,
        private_key,
    })
}

/// PKCS#8 private key and SPKI public key, PEM encoded.
pub fn generate_key_pair(bits: usize) -> Result<(String, String), anyhow::Error> {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .context("Failed to generate RSA key")?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .context("Failed to encode private key")?
        .to_string();
    let public_pem = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .context("Failed to encode public key")?;
    Ok((private_pem, public_pem))
}

/// Insert every built-in object that is not present yet.
pub async fn init_built_in(
    store: &ObjectStore,
    cert: &BuiltInCertConfig,
) -> Result<SeedReport, anyhow::Error> {
    let mut report = SeedReport::default();

    report.record(store.add_organization(built_in_organization()).await)?;
    report.record(store.add_user(built_in_user()).await)?;

    let app = built_in_application();
    let client_id = app.client_id.clone();
    if store.get_application(BUILT_IN_APPLICATION).await.is_none() {
        report.record(store.add_application(app).await)?;
        tracing::info!(client_id = %client_id, "Built-in application registered");
    }

    if store.get_cert(ADMIN_OWNER, BUILT_IN_CERT).await.is_none() {
        report.record(store.add_cert(built_in_cert(cert).await?).await)?;
    }
    report.record(store.add_ldap_server(built_in_ldap()).await)?;

    Ok(report)
}

/// Insert the objects of a seed file, skipping those already present.
pub async fn load_seed(store: &ObjectStore, path: &Path) -> Result<SeedReport, anyhow::Error> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seed: SeedData = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

    apply_seed(store, seed).await
}

pub async fn apply_seed(store: &ObjectStore, seed: SeedData) -> Result<SeedReport, anyhow::Error> {
    let mut report = SeedReport::default();

    for org in seed.organizations {
        report.record(store.add_organization(org).await)?;
    }
    for cert in seed.certs {
        report.record(store.add_cert(cert).await)?;
    }
    for app in seed.applications {
        report.record(store.add_application(app).await)?;
    }
    for mut user in seed.users {
        let org = store
            .get_organization(&user.owner)
            .await
            .with_context(|| format!("Seed user {} has no organization", user.id_string()))?;
        let scheme: PasswordScheme = org.password_type.parse()?;
        if !user.password.is_empty() {
            user.password = scheme.hash(
                &Password::new(user.password.clone()),
                &user.password_salt,
                &org.password_salt,
            )?;
        }
        report.record(store.add_user(user).await)?;
    }
    for server in seed.ldap_servers {
        report.record(store.add_ldap_server(server).await)?;
    }

    tracing::info!(inserted = report.inserted, skipped = report.skipped, "Seed data applied");
    Ok(report)
}
