//! Router configuration - centralized route definitions.
//!
//! Routes are split into public (health, always reachable for probes) and
//! the recovery API. Canvas paths may contain slashes, so canvas-scoped
//! routes use wildcard captures.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::state::RecoveryManager;
use super::{health, history, recovery, snapshots};

/// Application state type alias
pub type AppState = Arc<RecoveryManager>;

/// Build the public routes (health checks; never rate limited).
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .with_state(state)
}

/// Build the recovery API routes.
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // Operation history
        .route("/api/history/{*canvas_path}", get(history::get_history))
        .route("/api/operation/{operation_id}", get(history::get_operation))
        // Snapshots
        .route("/api/snapshots/{*canvas_path}", get(snapshots::list_snapshots))
        .route("/api/snapshot", post(snapshots::create_snapshot))
        .route("/api/snapshot/{snapshot_id}", get(snapshots::get_snapshot))
        // Rollback and diff
        .route("/api/rollback", post(recovery::rollback))
        .route("/api/diff/{snapshot_id}", get(recovery::diff_snapshot))
        .with_state(state)
}
