//! Test helpers for idp-service integration tests.
//!
//! Builds the full router over in-memory stores, with the built-in objects
//! plus an `acme` organization, its application and users.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use idp_service::{
    build_router,
    config::{
        BuiltInCertConfig, Environment, IdpConfig, LdapConfig, PolicyConfig, RateLimitConfig,
        RedisConfig, SecurityConfig, SwaggerConfig, SwaggerMode,
    },
    models::{Application, CredentialSource, LdapServer, Organization, User},
    services::{
        init::init_built_in, BindOutcome, CredentialVerifier, DirectoryBinder, DirectoryError,
        IdentityProviders, JwtService, MemoryTokenStore, OAuthService, ObjectStore,
        OrganizationService, PolicyMatcher, TokenStore,
    },
    utils::{Password, PasswordScheme},
    AppState,
};
use serde_json::Value;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const ACME_APP: &str = "app-acme";
pub const ACME_CLIENT_ID: &str = "acme-client-id";
pub const ACME_CLIENT_SECRET: &str = "acme-client-secret";
pub const ACME_REDIRECT: &str = "http://localhost:9000/callback";
pub const ALICE_PASSWORD: &str = "alice-password";
pub const BOB_LDAP_PASSWORD: &str = "bob-directory-password";

/// Binds `bob` with [`BOB_LDAP_PASSWORD`] and rejects everything else.
pub struct FixedDirectory;

#[async_trait]
impl DirectoryBinder for FixedDirectory {
    async fn bind_user(
        &self,
        _server: &LdapServer,
        uid: &str,
        password: &Password,
    ) -> Result<BindOutcome, DirectoryError> {
        if uid == "bob" && password.as_str() == BOB_LDAP_PASSWORD {
            Ok(BindOutcome::Bound)
        } else {
            Ok(BindOutcome::Rejected)
        }
    }
}

pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

pub fn test_config() -> IdpConfig {
    IdpConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "idp-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        origin: None,
        redis: RedisConfig { url: None },
        cert: BuiltInCertConfig {
            private_key_path: Some(fixture_path("key1_private.pem")),
            public_key_path: Some(fixture_path("key1_public.pem")),
            key_bits: 2048,
        },
        policy: PolicyConfig { rules_path: None },
        seed_path: None,
        ldap: LdapConfig { timeout_seconds: 1 },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Public,
        },
        rate_limit: RateLimitConfig {
            token_attempts: 1000,
            token_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

fn acme_organization() -> Organization {
    Organization {
        owner: "admin".to_string(),
        name: "acme".to_string(),
        created_time: Utc::now(),
        display_name: "Acme".to_string(),
        website_url: "https://acme.test".to_string(),
        password_type: "salt".to_string(),
        password_salt: "acme-salt".to_string(),
        master_password: String::new(),
        default_avatar: String::new(),
    }
}

fn acme_application() -> Application {
    Application {
        owner: "admin".to_string(),
        name: ACME_APP.to_string(),
        created_time: Utc::now(),
        display_name: "Acme Portal".to_string(),
        organization: "acme".to_string(),
        cert: "cert-built-in".to_string(),
        client_id: ACME_CLIENT_ID.to_string(),
        client_secret: ACME_CLIENT_SECRET.to_string(),
        redirect_uris: vec![
            ACME_REDIRECT.to_string(),
            r"regex:https://.*\.acme\.test/cb".to_string(),
        ],
        grant_types: vec!["password".to_string(), "refresh_token".to_string()],
        expire_in_hours: 1,
        refresh_expire_in_hours: 24,
        enable_sign_up: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub tokens: Arc<dyn TokenStore>,
}

/// Response status, headers and JSON body (`Null` when empty or not JSON).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_policy(PolicyMatcher::built_in()).await
    }

    pub async fn with_policy(policy: PolicyMatcher) -> Self {
        let config = test_config();
        let store = ObjectStore::new();
        init_built_in(&store, &config.cert)
            .await
            .expect("Failed to initialize built-in objects");

        store.add_organization(acme_organization()).await.unwrap();
        store.add_application(acme_application()).await.unwrap();

        let mut alice = User::new("acme", "alice");
        alice.password_salt = "alice-salt".to_string();
        alice.password = PasswordScheme::Salt
            .hash(&Password::new(ALICE_PASSWORD), "alice-salt", "acme-salt")
            .unwrap();
        alice.display_name = "Alice".to_string();
        alice.email = "alice@acme.test".to_string();
        alice.phone = "5550100".to_string();
        store.add_user(alice).await.unwrap();

        let mut bob = User::new("acme", "bob");
        bob.credential_source = CredentialSource::Directory {
            uid: "bob".to_string(),
        };
        store.add_user(bob).await.unwrap();

        let mut mallory = User::new("acme", "mallory");
        mallory.password = PasswordScheme::Salt
            .hash(&Password::new("mallory-password"), "", "acme-salt")
            .unwrap();
        mallory.is_forbidden = true;
        store.add_user(mallory).await.unwrap();

        store
            .add_ldap_server(LdapServer {
                id: "ldap-acme".to_string(),
                owner: "acme".to_string(),
                server_name: "Acme LDAP".to_string(),
                host: "ldap.acme.test".to_string(),
                port: 389,
                enable_ssl: false,
                username: "cn=admin,dc=acme,dc=test".to_string(),
                password: "admin".to_string(),
                base_dn: "ou=people,dc=acme,dc=test".to_string(),
                filter: "(objectClass=posixAccount)".to_string(),
            })
            .await
            .unwrap();

        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let credentials = CredentialVerifier::new(store.clone(), Arc::new(FixedDirectory));
        let oauth = OAuthService::new(
            store.clone(),
            tokens.clone(),
            JwtService::new(),
            credentials,
            IdentityProviders::default(),
        );

        let state = AppState {
            config: config.clone(),
            store: store.clone(),
            oauth,
            organizations: OrganizationService::new(store),
            policy,
            token_rate_limiter: create_ip_rate_limiter(1000, 60),
            ip_rate_limiter: create_ip_rate_limiter(1000, 60),
        };
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            tokens,
        }
    }

    pub async fn built_in_client(&self) -> (String, String) {
        let app = self
            .state
            .store
            .get_application("app-built-in")
            .await
            .expect("built-in application");
        (app.client_id, app.client_secret)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_with_bearer(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        self.send(form_request(uri, fields, None)).await
    }

    /// Password grant for `acme/<username>` through the acme application.
    pub async fn password_grant(&self, username: &str, password: &str) -> TestResponse {
        self.post_form(
            "/login/oauth/access_token",
            &[
                ("grant_type", "password"),
                ("client_id", ACME_CLIENT_ID),
                ("client_secret", ACME_CLIENT_SECRET),
                ("username", username),
                ("password", password),
                ("scope", "openid profile email"),
            ],
        )
        .await
    }

    /// Access, refresh and id token of a successful password grant for alice.
    pub async fn alice_tokens(&self) -> Value {
        let response = self.password_grant("alice", ALICE_PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body
    }
}

pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", client_id, client_secret))
    )
}

pub fn form_request(uri: &str, fields: &[(&str, &str)], authorization: Option<&str>) -> Request<Body> {
    let body = serde_urlencoded::to_string(fields).unwrap();
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn query(fields: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(fields).unwrap()
}
