pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::IdpConfig;
use crate::services::{ObjectStore, OAuthService, OrganizationService, PolicyMatcher};
use service_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::well_known::openid_configuration,
        handlers::well_known::jwks,
        handlers::oauth::issue_code,
        handlers::oauth::access_token,
        handlers::oauth::refresh_token,
        handlers::oauth::logout,
        handlers::oauth::introspect,
        handlers::userinfo::userinfo,
        handlers::organization::get_organizations,
        handlers::organization::get_organization,
        handlers::organization::update_organization,
        handlers::tokens::get_tokens,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::OAuthErrorResponse,
            dtos::oauth::CodeResponse,
            dtos::oauth::TokenRequest,
            dtos::oauth::TokenResponse,
            dtos::oauth::StatusResponse,
            dtos::oauth::IntrospectRequest,
            dtos::oauth::IntrospectResponse,
            dtos::oauth::UserInfo,
            dtos::admin::TokenSummary,
            services::discovery::OidcDiscovery,
            services::discovery::Jwk,
            services::discovery::JwkSet,
            models::Organization,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "OAuth", description = "Authorization codes, token grants, logout and introspection"),
        (name = "OIDC", description = "OpenID Connect userinfo"),
        (name = "Organizations", description = "Organization administration"),
        (name = "Tokens", description = "Issued token records"),
        (name = "Well-Known", description = "Public service metadata"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "client_basic",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdpConfig,
    pub store: ObjectStore,
    pub oauth: OAuthService,
    pub organizations: OrganizationService,
    pub policy: PolicyMatcher,
    pub token_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Token endpoints get their own, tighter limit
    let token_limiter = state.token_rate_limiter.clone();
    let token_routes = Router::new()
        .route(
            "/login/oauth/access_token",
            post(handlers::oauth::access_token),
        )
        .route(
            "/login/oauth/refresh_token",
            post(handlers::oauth::refresh_token),
        )
        .layer(from_fn_with_state(token_limiter, ip_rate_limit_middleware));

    // Everything below is gated by the policy table
    let gated = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openid-configuration",
            get(handlers::well_known::openid_configuration),
        )
        .route("/.well-known/jwks", get(handlers::well_known::jwks))
        .route("/login/oauth/code", post(handlers::oauth::issue_code))
        .route("/login/oauth/logout", get(handlers::oauth::logout))
        .route("/login/oauth/introspect", post(handlers::oauth::introspect))
        .route("/api/userinfo", get(handlers::userinfo::userinfo))
        .route(
            "/api/get-organizations",
            get(handlers::organization::get_organizations),
        )
        .route(
            "/api/get-organization",
            get(handlers::organization::get_organization),
        )
        .route(
            "/api/update-organization",
            post(handlers::organization::update_organization),
        )
        .route("/api/get-tokens", get(handlers::tokens::get_tokens))
        .merge(token_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::authz_middleware,
        ));

    let mut app = Router::new().merge(gated);

    // Only add Swagger UI if enabled in config
    if state.config.swagger_enabled() {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Still provide the OpenAPI JSON for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = app
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| {
                            o.parse::<service_core::axum::http::HeaderValue>()
                                .map_err(|e| {
                                    tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                                })
                                .ok()
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                    service_core::axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Token store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state
        .oauth
        .token_store()
        .health_check()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Token store health check failed");
            AppError::ServiceUnavailable
        })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "token_store": "up",
            "organizations": state.store.list_organizations().await.len(),
        }
    })))
}
