use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{db, AppState};

/// GET /health — database reachability plus the collectors this exporter runs.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let collectors: Vec<&str> = state.config.collectors.iter().map(|s| s.as_str()).collect();

    match db::ping(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "db": "connected", "collectors": collectors })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": e.to_string(), "collectors": collectors })),
            )
        }
    }
}
