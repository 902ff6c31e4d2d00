//! Operation history handlers.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::router::AppState;
use crate::errors::{AppError, Result};
use crate::operation_log::Operation;

/// Query parameters for paginated history listing
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub canvas_path: String,
    pub operations: Vec<Operation>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// GET /api/history/{canvas_path} - paginated operations, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path(canvas_path): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let operations = state.operations.history(&canvas_path, limit, offset)?;
    let total = state.operations.count(&canvas_path)?;

    Ok(Json(HistoryResponse {
        canvas_path,
        operations,
        total,
        limit,
        offset,
    }))
}

/// GET /api/operation/{operation_id} - one operation, 404 if unknown
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<Operation>> {
    let operation = state
        .operations
        .get(&operation_id)?
        .ok_or(AppError::OperationNotFound(operation_id))?;
    Ok(Json(operation))
}
