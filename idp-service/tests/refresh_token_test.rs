//! Refresh-token rotation.

mod common;

use axum::http::StatusCode;
use common::{TestApp, ACME_CLIENT_ID, ACME_CLIENT_SECRET};

fn refresh_fields(refresh_token: &str) -> [(&str, &str); 4] {
    [
        ("grant_type", "refresh_token"),
        ("client_id", ACME_CLIENT_ID),
        ("client_secret", ACME_CLIENT_SECRET),
        ("refresh_token", refresh_token),
    ]
}

#[tokio::test]
async fn refresh_rotates_and_old_token_is_dead() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let rotated = app
        .post_form("/login/oauth/access_token", &refresh_fields(refresh))
        .await;
    assert_eq!(rotated.status, StatusCode::OK, "{}", rotated.body);
    let new_refresh = rotated.body["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh);
    assert_eq!(rotated.body["scope"], tokens["scope"]);

    let reused = app
        .post_form("/login/oauth/access_token", &refresh_fields(refresh))
        .await;
    assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reused.body["error"], "invalid_grant");

    let again = app
        .post_form("/login/oauth/access_token", &refresh_fields(new_refresh))
        .await;
    assert_eq!(again.status, StatusCode::OK, "{}", again.body);
}

#[tokio::test]
async fn dedicated_refresh_endpoint_forces_the_grant() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;

    let response = app
        .post_form(
            "/login/oauth/refresh_token",
            &[
                ("grant_type", "password"),
                ("client_id", ACME_CLIENT_ID),
                ("refresh_token", tokens["refresh_token"].as_str().unwrap()),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
}

#[tokio::test]
async fn access_token_cannot_refresh() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;

    let response = app
        .post_form(
            "/login/oauth/access_token",
            &refresh_fields(tokens["access_token"].as_str().unwrap()),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_grant");
}

#[tokio::test]
async fn concurrent_refreshes_exactly_one_wins() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let fields = refresh_fields(refresh);
    let (a, b) = futures::join!(
        app.post_form("/login/oauth/access_token", &fields),
        app.post_form("/login/oauth/access_token", &fields),
    );

    let successes = [a.status, b.status]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(successes, 1);
    assert!([a.status, b.status].contains(&StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn refresh_of_another_application_is_rejected() {
    let app = TestApp::spawn().await;
    let tokens = app.alice_tokens().await;
    let (client_id, client_secret) = app.built_in_client().await;

    let response = app
        .post_form(
            "/login/oauth/access_token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &client_id),
                ("client_secret", &client_secret),
                ("refresh_token", tokens["refresh_token"].as_str().unwrap()),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "invalid_grant");

    // the failed attempt must not burn the token for its own application
    let own = app
        .post_form(
            "/login/oauth/access_token",
            &refresh_fields(tokens["refresh_token"].as_str().unwrap()),
        )
        .await;
    assert_eq!(own.status, StatusCode::OK, "{}", own.body);
}
