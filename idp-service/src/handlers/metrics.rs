use service_core::axum::response::IntoResponse;

/// Prometheus exposition of the process metrics
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus text format", content_type = "text/plain")
    ),
    tag = "Observability"
)]
pub async fn metrics() -> impl IntoResponse {
    crate::services::metrics::get_metrics()
}
