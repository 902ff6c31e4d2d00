//! Health handler.

use axum::{extract::State, response::Json};
use serde::Serialize;

use super::router::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub storage_root: String,
    pub active_auto_captures: usize,
}

/// GET /health - liveness probe
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        storage_root: state.config.storage_root.display().to_string(),
        active_auto_captures: state.snapshots.active_auto_captures().len(),
    })
}
