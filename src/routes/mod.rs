pub mod queue;
pub mod sync;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Queue
        .route("/api/v1/queue", get(queue::list_pending).post(queue::enqueue))
        .route("/api/v1/queue/stats", get(queue::stats))
        .route("/api/v1/queue/failed", get(queue::list_failed))
        // Sync
        .route("/api/v1/sync", post(sync::trigger))
        .route("/api/v1/sync/status", get(sync::status))
        .route("/api/v1/sync/connectivity", put(sync::connectivity))
        .route("/api/v1/sync/visibility", put(sync::visibility))
        .route("/api/v1/sync/auto", put(sync::auto_sync))
        .route("/api/v1/sync/broadcast", post(sync::broadcast))
}
