use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<(), anyhow::Error> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Tokens minted, by grant type.
pub fn record_token_issued(grant_type: &str) {
    counter!("oauth_tokens_issued_total", "grant_type" => grant_type.to_string()).increment(1);
}

/// OAuth error responses, by error code.
pub fn record_oauth_error(code: &'static str) {
    counter!("oauth_errors_total", "error" => code).increment(1);
}

/// Policy decisions, by outcome.
pub fn record_policy_decision(allowed: bool) {
    let outcome = if allowed { "allow" } else { "deny" };
    counter!("policy_decisions_total", "outcome" => outcome).increment(1);
}
