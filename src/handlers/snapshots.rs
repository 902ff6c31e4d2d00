//! Snapshot handlers: listing, manual creation and metadata lookup.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::router::AppState;
use crate::errors::{AppError, Result};
use crate::snapshot_store::{CreateSnapshot, SnapshotIndexEntry, SnapshotType};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotListResponse {
    pub canvas_path: String,
    pub snapshots: Vec<SnapshotIndexEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// GET /api/snapshots/{canvas_path} - paginated metadata from the index
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(canvas_path): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SnapshotListResponse>> {
    let limit = query.limit.unwrap_or(20);
    let offset = query.offset.unwrap_or(0);

    let snapshots = state.snapshots.list(&canvas_path, limit, offset)?;
    let total = state.snapshots.count(&canvas_path)?;

    Ok(Json(SnapshotListResponse {
        canvas_path,
        snapshots,
        total,
        limit,
        offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSnapshotRequest {
    pub canvas_path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// POST /api/snapshot - capture a MANUAL snapshot, 201 on success
pub async fn create_snapshot(
    State(state): State<AppState>,
    Json(request): Json<CreateSnapshotRequest>,
) -> Result<(StatusCode, Json<SnapshotIndexEntry>)> {
    let snapshot = state.snapshots.create(
        &request.canvas_path,
        SnapshotType::Manual,
        CreateSnapshot {
            description: request.description,
            created_by: request.created_by,
            tags: request.tags,
            last_operation_id: None,
        },
    )?;
    Ok((StatusCode::CREATED, Json(snapshot.info)))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub canvas_path: String,
}

/// GET /api/snapshot/{snapshot_id}?canvas_path=... - metadata, 404 if unknown
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SnapshotIndexEntry>> {
    let entry = state
        .snapshots
        .get_entry(&query.canvas_path, &snapshot_id)?
        .ok_or(AppError::SnapshotNotFound(snapshot_id))?;
    Ok(Json(entry))
}
