use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::coordinator::{PlatformEvent, SyncStatus};
use crate::error::AppError;
use crate::queue::SyncResult;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ConnectivityUpdate {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct VisibilityUpdate {
    pub visible: bool,
}

#[derive(Deserialize)]
pub struct AutoSyncUpdate {
    pub enabled: bool,
}

/// Run a manual pass. The pass is its own task, so a client that hangs up
/// does not cancel handlers that are already executing.
pub async fn trigger(State(state): State<SharedState>) -> Result<Json<SyncResult>, AppError> {
    state
        .coordinator
        .spawn_sync(true)
        .await
        .map_err(|e| AppError::Internal(format!("Sync task failed: {e}")))?
        .map(Json)
        .ok_or_else(|| AppError::Conflict("Sync already in progress or offline".to_string()))
}

pub async fn status(State(state): State<SharedState>) -> Json<SyncStatus> {
    Json(state.coordinator.status())
}

pub async fn connectivity(
    State(state): State<SharedState>,
    Json(req): Json<ConnectivityUpdate>,
) -> Json<SyncStatus> {
    state
        .coordinator
        .handle_event(PlatformEvent::Connectivity(req.online))
        .await;
    Json(state.coordinator.status())
}

pub async fn visibility(
    State(state): State<SharedState>,
    Json(req): Json<VisibilityUpdate>,
) -> Json<SyncStatus> {
    state
        .coordinator
        .handle_event(PlatformEvent::Visibility(req.visible))
        .await;
    Json(state.coordinator.status())
}

pub async fn auto_sync(
    State(state): State<SharedState>,
    Json(req): Json<AutoSyncUpdate>,
) -> Json<SyncStatus> {
    state.coordinator.set_auto_sync(req.enabled);
    Json(state.coordinator.status())
}

pub async fn broadcast(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let notified = state.relay.request_sync_now();
    Json(json!({ "notified": notified }))
}
