use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use crate::error::AppError;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Rate limiter keyed by IP address
pub type IpRateLimiter = Arc<RateLimiter<SocketAddr, DashMapStateStore<SocketAddr>, DefaultClock>>;

/// Create a keyed rate limiter (by IP) allowing `attempts` per window.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis((window_seconds * 1000) / burst.get() as u64)
        .max(Duration::from_millis(1));
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Client address used as the limiter key: the first `x-forwarded-for`
/// hop, else `x-real-ip`, else the socket peer. Proxy-supplied addresses get
/// port 0 so that one client maps to one key.
pub fn client_addr(request: &Request) -> Option<SocketAddr> {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    match forwarded {
        Some(ip) => Some(SocketAddr::new(ip, 0)),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    }
}

/// Reject requests over the per-client quota with `429` and `Retry-After`.
/// Requests without a resolvable address pass through.
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(addr) = client_addr(&request) else {
        tracing::warn!(path = %request.uri().path(), "Could not determine client address for rate limiting");
        return Ok(next.run(request).await);
    };

    if let Err(negative) = limiter.check_key(&addr) {
        let wait = negative.wait_time_from(DefaultClock::default().now());
        tracing::warn!(client = %addr.ip(), retry_after = wait.as_secs(), "Rate limit exceeded");
        return Err(AppError::TooManyRequests(
            "Too many requests from this IP. Please try again later.".to_string(),
            Some(wait.as_secs().max(1)),
        ));
    }

    Ok(next.run(request).await)
}
