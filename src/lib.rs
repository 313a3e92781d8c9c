pub mod classify;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod models;
pub mod operations;
pub mod probe;
pub mod queue;
pub mod relay;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::coordinator::SyncCoordinator;
use crate::db::QueueStore;
use crate::operations::HandlerRegistry;
use crate::probe::ConnectivityProbe;
use crate::queue::{BACKGROUND_SYNC_TAG, QueueManager};
use crate::relay::SyncRelay;
use crate::state::{AppState, SharedState};

const MAX_BODY_SIZE: usize = 256 * 1024;
const RELAY_INTERVAL: Duration = Duration::from_secs(1);

/// Wire the store, handlers and config into a queue manager, coordinator and relay.
pub fn build_state(
    store: Arc<dyn QueueStore>,
    handlers: HandlerRegistry,
    config: Config,
) -> SharedState {
    let relay = Arc::new(SyncRelay::new(config.background_sync));
    let manager = Arc::new(
        QueueManager::new(store, config.queue_config()).with_relay(Arc::clone(&relay)),
    );
    let coordinator = SyncCoordinator::new(
        Arc::clone(&manager),
        Arc::new(handlers),
        config.coordinator_config(),
    );

    Arc::new(AppState {
        config,
        manager,
        coordinator,
        relay,
    })
}

pub fn build_app(state: SharedState) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Start the coordinator loop, the relay and, when `probe` is given, the
/// connectivity probe. All of them stop when `shutdown` flips to true.
pub fn spawn_background(
    state: &SharedState,
    probe: Option<ConnectivityProbe>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let (events_tx, events_rx) = mpsc::channel(16);
    let mut handles = Vec::with_capacity(3);

    if let Err(e) = state.relay.register_background_sync(BACKGROUND_SYNC_TAG) {
        tracing::debug!("Background sync unavailable: {e}");
    }

    handles.push(tokio::spawn(Arc::clone(&state.coordinator).run(
        events_rx,
        Some(state.relay.subscribe()),
        shutdown.clone(),
    )));

    handles.push(tokio::spawn(
        Arc::clone(&state.relay).run(RELAY_INTERVAL, shutdown.clone()),
    ));

    if let Some(probe) = probe {
        handles.push(tokio::spawn(probe.run(events_tx, shutdown)));
    }

    handles
}

async fn health() -> &'static str {
    "ok"
}
