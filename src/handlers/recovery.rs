//! Rollback and diff handlers.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::router::AppState;
use crate::diff::{self, EdgeDiff, NodeDiff};
use crate::errors::{AppError, Result};
use crate::rollback::{RollbackRequest, RollbackResult};

/// POST /api/rollback - always 200; the success flag lives in the body.
pub async fn rollback(
    State(state): State<AppState>,
    Json(request): Json<RollbackRequest>,
) -> Json<RollbackResult> {
    Json(state.rollback.rollback(request))
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub canvas_path: String,
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub canvas_path: String,
    pub snapshot_id: String,
    pub nodes_diff: NodeDiff,
    pub edges_diff: EdgeDiff,
}

/// GET /api/diff/{snapshot_id}?canvas_path=... - compare a snapshot
/// against the live document, 404 if the snapshot is unknown.
pub async fn diff_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<DiffResponse>> {
    let snapshot = state
        .snapshots
        .get(&query.canvas_path, &snapshot_id)?
        .ok_or(AppError::SnapshotNotFound(snapshot_id))?;
    let live = state.documents.read(&query.canvas_path)?;

    let result = diff::diff(&snapshot.canvas_data, &live);
    Ok(Json(DiffResponse {
        canvas_path: query.canvas_path,
        snapshot_id: snapshot.info.id,
        nodes_diff: result.nodes,
        edges_diff: result.edges,
    }))
}
