use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::QueueStats;
use crate::queue::SyncProgress;

/// Snapshot of one coordinator, published to the API and anyone watching.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub sync_stats: QueueStats,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub auto_sync_enabled: bool,
    pub progress: Option<SyncProgress>,
}

impl SyncStatus {
    pub fn new(is_online: bool, auto_sync_enabled: bool) -> Self {
        Self {
            is_online,
            is_syncing: false,
            sync_stats: QueueStats::default(),
            last_sync_time: None,
            sync_error: None,
            auto_sync_enabled,
            progress: None,
        }
    }
}

/// Signals from the environment the coordinator runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    Connectivity(bool),
    Visibility(bool),
}
