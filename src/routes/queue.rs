use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{FailedOperation, QueueItem, QueueStats};
use crate::queue::EnqueueResult;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct EnqueueRequest {
    pub operation_type: String,
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
pub struct FailedParams {
    pub limit: Option<i64>,
}

pub async fn enqueue(
    State(state): State<SharedState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResult>, AppError> {
    let result = state
        .manager
        .enqueue(&req.operation_type, req.payload)
        .await?;
    Ok(Json(result))
}

pub async fn list_pending(
    State(state): State<SharedState>,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    let items = state.manager.get_pending_operations().await?;
    Ok(Json(items))
}

pub async fn stats(State(state): State<SharedState>) -> Result<Json<QueueStats>, AppError> {
    let stats = state.manager.get_queue_stats().await?;
    Ok(Json(stats))
}

pub async fn list_failed(
    State(state): State<SharedState>,
    Query(params): Query<FailedParams>,
) -> Result<Json<Vec<FailedOperation>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let failed = state.manager.get_failed_operations(limit).await?;
    Ok(Json(failed))
}
