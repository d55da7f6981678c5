use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};
use tokio::time::Instant;

use crate::AppState;

/// Sent by Prometheus with the scrape timeout configured for this target.
pub const SCRAPE_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";

/// GET <telemetry path> — runs one scrape and renders it.
///
/// Store failures never fail the request; they show up as missing families
/// and a non-zero `mastodon_exporter_errors`.
pub async fn metrics_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let requested = headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());
    let deadline = state
        .config
        .scrape_budget(requested)
        .and_then(|budget| Instant::now().checked_add(budget));

    let body = state.registry.encode(deadline).await.map_err(|e| {
        tracing::error!(error = %e, "Error encoding metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
