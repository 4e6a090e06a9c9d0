//! RFC 7662 introspection at `/login/oauth/introspect`.

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{basic_auth, form_request, query, TestApp, ACME_APP, ACME_CLIENT_ID, ACME_CLIENT_SECRET};
use idp_service::models::{IssuedTokens, Token};
use idp_service::services::jwt::{ProfileClaims, TokenTemplate};
use idp_service::services::{JwtService, TokenKind};

/// Store an access token for alice whose JWT and record expire after the
/// given (possibly negative) lifetimes.
async fn stored_access_token(app: &TestApp, jwt_lifetime: Duration, record_lifetime: Duration) -> String {
    let cert = app
        .state
        .store
        .get_cert("admin", "cert-built-in")
        .await
        .expect("built-in cert");
    let alice = app.state.store.get_user("acme", "alice").await.expect("alice");

    let (access_token, _) = JwtService::new()
        .mint(
            TokenTemplate {
                profile: ProfileClaims::from(&alice),
                subject: alice.id.clone(),
                kind: TokenKind::Access,
                issuer: "http://localhost".to_string(),
                audience: ACME_CLIENT_ID.to_string(),
                scope: "openid".to_string(),
                nonce: String::new(),
                lifetime: jwt_lifetime,
            },
            &cert,
        )
        .expect("mint");

    let record = Token::new(
        ACME_APP,
        "acme",
        "alice",
        "openid",
        IssuedTokens {
            access_token: access_token.clone(),
            refresh_token: String::new(),
            id_token: String::new(),
            access_lifetime: record_lifetime,
            refresh_lifetime: record_lifetime,
        },
    );
    app.tokens.issue_token(record).await.expect("issue");
    access_token
}

async fn introspect(app: &TestApp, token: &str) -> common::TestResponse {
    app.post_form(
        "/login/oauth/introspect",
        &[
            ("token", token),
            ("token_type_hint", "access_token"),
            ("client_id", ACME_CLIENT_ID),
            ("client_secret", ACME_CLIENT_SECRET),
        ],
    )
    .await
}

#[tokio::test]
async fn active_token_projects_its_claims() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;

    let response = introspect(&app, tokens["access_token"].as_str().unwrap()).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["active"], true);
    assert_eq!(response.body["client_id"], ACME_CLIENT_ID);
    assert_eq!(response.body["username"], "alice");
    assert_eq!(response.body["token_type"], "Bearer");
    assert_eq!(response.body["scope"], "openid profile email");
    assert_eq!(response.body["aud"][0], ACME_CLIENT_ID);
    assert_eq!(response.body["iss"], "http://localhost");
    assert!(response.body["exp"].as_i64().unwrap() > response.body["iat"].as_i64().unwrap());
    assert!(response.body["jti"].is_string());
}

#[tokio::test]
async fn basic_credentials_are_accepted() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;

    let response = app
        .send(form_request(
            "/login/oauth/introspect",
            &[("token", tokens["id_token"].as_str().unwrap())],
            Some(&basic_auth(ACME_CLIENT_ID, ACME_CLIENT_SECRET)),
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["active"], true);
}

#[tokio::test]
async fn unknown_tokens_are_inactive() {
    let app = TestApp::spawn().await;

    for token in ["", "not-a-jwt", "a.b.c"] {
        let response = introspect(&app, token).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, serde_json::json!({ "active": false }));
    }
}

#[tokio::test]
async fn expired_tokens_are_inactive() {
    let app = TestApp::spawn().await;

    let expired = stored_access_token(&app, Duration::hours(-1), Duration::hours(-1)).await;
    let response = introspect(&app, &expired).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, serde_json::json!({ "active": false }));

    // the record decides even while the signature is still within its window
    let record_expired = stored_access_token(&app, Duration::hours(1), Duration::seconds(-1)).await;
    let response = introspect(&app, &record_expired).await;
    assert_eq!(response.body, serde_json::json!({ "active": false }));

    let live = stored_access_token(&app, Duration::hours(1), Duration::hours(1)).await;
    assert_eq!(introspect(&app, &live).await.body["active"], true);
}

#[tokio::test]
async fn token_of_another_application_is_inactive() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;
    let (client_id, client_secret) = app.built_in_client().await;

    let response = app
        .post_form(
            "/login/oauth/introspect",
            &[
                ("token", tokens["access_token"].as_str().unwrap()),
                ("client_id", &client_id),
                ("client_secret", &client_secret),
            ],
        )
        .await;
    assert_eq!(response.body, serde_json::json!({ "active": false }));
}

#[tokio::test]
async fn revoked_token_is_inactive() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;
    let access = tokens["access_token"].as_str().unwrap();

    let logout = app
        .get(&format!("/login/oauth/logout?{}", query(&[("id_token_hint", access)])))
        .await;
    assert_eq!(logout.status, StatusCode::OK);

    let response = introspect(&app, access).await;
    assert_eq!(response.body, serde_json::json!({ "active": false }));

    let refresh = introspect(&app, tokens["refresh_token"].as_str().unwrap()).await;
    assert_eq!(refresh.body["active"], false);
}

#[tokio::test]
async fn rotated_refresh_token_is_inactive() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    assert_eq!(introspect(&app, refresh).await.body["active"], true);

    let rotated = app
        .post_form(
            "/login/oauth/refresh_token",
            &[
                ("client_id", ACME_CLIENT_ID),
                ("client_secret", ACME_CLIENT_SECRET),
                ("refresh_token", refresh),
            ],
        )
        .await;
    assert_eq!(rotated.status, StatusCode::OK);

    assert_eq!(introspect(&app, refresh).await.body["active"], false);
    // rotation leaves the previous access token usable until it expires
    assert_eq!(
        introspect(&app, tokens["access_token"].as_str().unwrap()).await.body["active"],
        true
    );
}

#[tokio::test]
async fn wrong_secret_is_invalid_client_without_active() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;

    let response = app
        .post_form(
            "/login/oauth/introspect",
            &[
                ("token", tokens["access_token"].as_str().unwrap()),
                ("client_id", ACME_CLIENT_ID),
                ("client_secret", "wrong"),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_client");
    assert!(response.body.get("active").is_none());
}

#[tokio::test]
async fn missing_client_credentials_is_invalid_request() {
    let app = TestApp::spawn().await;

    let response = app
        .post_form("/login/oauth/introspect", &[("token", "anything")])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
}
