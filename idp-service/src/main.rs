use idp_service::{
    build_router,
    config::IdpConfig,
    services::{
        init::{init_built_in, load_seed},
        CredentialVerifier, IdentityProviders, JwtService, Ldap3Directory, MemoryTokenStore,
        OAuthService, ObjectStore, OrganizationService, PolicyMatcher, RedisTokenStore,
        TokenStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdpConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    idp_service::services::metrics::init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity provider"
    );

    let tokens: Arc<dyn TokenStore> = match &config.redis.url {
        Some(url) => {
            let redis = RedisTokenStore::new(url).await?;
            tracing::info!("Redis token store initialized");
            Arc::new(redis)
        }
        None => {
            tracing::warn!("REDIS_URL not set; tokens and codes are kept in process memory");
            Arc::new(MemoryTokenStore::new())
        }
    };

    // Boot data
    let store = ObjectStore::new();
    let report = init_built_in(&store, &config.cert).await?;
    tracing::info!(inserted = report.inserted, "Built-in objects initialized");
    if let Some(seed_path) = &config.seed_path {
        load_seed(&store, Path::new(seed_path)).await?;
    }

    let policy = PolicyMatcher::load(config.policy.rules_path.as_deref().map(Path::new))
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    let directory = Arc::new(Ldap3Directory::new(Duration::from_secs(
        config.ldap.timeout_seconds,
    )));
    let credentials = CredentialVerifier::new(store.clone(), directory);
    let oauth = OAuthService::new(
        store.clone(),
        tokens,
        JwtService::new(),
        credentials,
        IdentityProviders::default(),
    );
    let organizations = OrganizationService::new(store.clone());

    let token_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.token_attempts,
        config.rate_limit.token_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Token endpoints and Global IP");

    let state = AppState {
        config: config.clone(),
        store,
        oauth,
        organizations,
        policy,
        token_rate_limiter,
        ip_rate_limiter,
    };
    let app = build_router(state).await?;

    let addr = config.common.bind_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
