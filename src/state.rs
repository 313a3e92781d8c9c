use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::SyncCoordinator;
use crate::queue::QueueManager;
use crate::relay::SyncRelay;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub manager: Arc<QueueManager>,
    pub coordinator: Arc<SyncCoordinator>,
    pub relay: Arc<SyncRelay>,
}
