pub mod health;
pub mod index;
pub mod metrics;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .route("/health", get(health::health_check))
        .route(&state.config.telemetry_path, get(metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
