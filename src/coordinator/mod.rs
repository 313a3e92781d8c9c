//! Per-instance sync controller.
//!
//! Tracks connectivity and visibility, guarantees at most one sync pass at a
//! time, polls for pending work and keeps queue statistics fresh for the UI.

pub mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::operations::HandlerRegistry;
use crate::queue::{ProgressFn, QueueManager, SyncProgress, SyncResult};
use crate::relay::{RelaySubscription, SyncMessage};

pub use status::{PlatformEvent, SyncStatus};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub auto_sync: bool,
    pub start_online: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(10),
            auto_sync: true,
            start_online: true,
        }
    }
}

pub struct SyncCoordinator {
    manager: Arc<QueueManager>,
    handlers: Arc<HandlerRegistry>,
    config: CoordinatorConfig,
    status: watch::Sender<SyncStatus>,
    passes: AtomicU64,
}

/// Clears `is_syncing` however the pass ends.
struct SyncingGuard<'a>(&'a watch::Sender<SyncStatus>);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|s| {
            s.is_syncing = false;
            s.progress = None;
        });
    }
}

impl SyncCoordinator {
    pub fn new(
        manager: Arc<QueueManager>,
        handlers: Arc<HandlerRegistry>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(SyncStatus::new(config.start_online, config.auto_sync));
        Arc::new(Self {
            manager,
            handlers,
            config,
            status,
            passes: AtomicU64::new(0),
        })
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Number of sync passes this coordinator has started.
    pub fn sync_passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Run one sync pass unless one is already running or the instance is offline.
    pub async fn trigger_sync(&self, show_progress: bool) -> Option<SyncResult> {
        let mut skipped = "";
        let started = self.status.send_if_modified(|s| {
            if s.is_syncing {
                skipped = "a sync is already in progress";
                return false;
            }
            if !s.is_online {
                skipped = "offline";
                return false;
            }
            s.is_syncing = true;
            s.sync_error = None;
            s.progress = None;
            true
        });

        if !started {
            tracing::debug!("Sync skipped: {skipped}");
            return None;
        }

        let _guard = SyncingGuard(&self.status);
        self.passes.fetch_add(1, Ordering::SeqCst);

        let report = |progress: SyncProgress| {
            self.status.send_modify(|s| s.progress = Some(progress));
        };
        let on_progress: Option<ProgressFn<'_>> = if show_progress {
            Some(&report)
        } else {
            None
        };

        let result = self
            .manager
            .sync_pending_operations(&self.handlers, on_progress)
            .await;

        if result.success {
            self.status
                .send_modify(|s| s.last_sync_time = Some(Utc::now()));
            self.refresh_stats().await;
            self.manager.cleanup_completed_operations().await;
        } else {
            let message = result.error.clone().unwrap_or_else(|| {
                format!("{} operation(s) failed to sync", result.failed)
            });
            tracing::warn!("Sync pass reported errors: {message}");
            self.status.send_modify(|s| s.sync_error = Some(message));
        }

        Some(result)
    }

    pub async fn refresh_stats(&self) {
        match self.manager.get_queue_stats().await {
            Ok(stats) => {
                self.status.send_if_modified(|s| {
                    if s.sync_stats == stats {
                        return false;
                    }
                    s.sync_stats = stats;
                    true
                });
            }
            Err(e) => tracing::warn!("Failed to refresh queue stats: {e}"),
        }
    }

    /// Record connectivity. Returns true on an offline to online transition.
    pub fn set_online(&self, online: bool) -> bool {
        let mut came_online = false;
        self.status.send_if_modified(|s| {
            if s.is_online == online {
                return false;
            }
            came_online = online;
            s.is_online = online;
            true
        });
        came_online
    }

    pub fn set_auto_sync(&self, enabled: bool) {
        self.status.send_modify(|s| s.auto_sync_enabled = enabled);
        tracing::info!(
            "Auto-sync {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    fn auto_sync_ready(&self) -> bool {
        let status = self.status.borrow();
        status.is_online && status.auto_sync_enabled
    }

    /// Start a background pass without waiting for it.
    pub fn spawn_sync(self: &Arc<Self>, show_progress: bool) -> JoinHandle<Option<SyncResult>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.trigger_sync(show_progress).await })
    }

    pub async fn handle_event(self: &Arc<Self>, event: PlatformEvent) {
        match event {
            PlatformEvent::Connectivity(true) => {
                if self.set_online(true) {
                    tracing::info!("Connection restored");
                    if self.auto_sync_ready() {
                        self.spawn_sync(false);
                    }
                }
            }
            PlatformEvent::Connectivity(false) => {
                let was_online = self.status.borrow().is_online;
                self.set_online(false);
                if was_online {
                    tracing::info!("Connection lost, operations will be queued");
                }
            }
            PlatformEvent::Visibility(true) => {
                if self.auto_sync_ready() {
                    self.refresh_stats().await;
                    self.spawn_sync(false);
                }
            }
            PlatformEvent::Visibility(false) => {}
        }
    }

    pub fn handle_relay_message(self: &Arc<Self>, message: SyncMessage) {
        match message {
            SyncMessage::TriggerSync { timestamp } => {
                tracing::debug!("Relay asked for a sync (sent at {timestamp})");
                if self.auto_sync_ready() {
                    self.spawn_sync(false);
                }
            }
        }
    }

    async fn poll_pending(self: &Arc<Self>) {
        if self.auto_sync_ready() && self.manager.has_pending_operations().await {
            self.spawn_sync(false);
        }
    }

    /// Drive the coordinator from platform events, relay messages and its timers until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<PlatformEvent>,
        mut relay: Option<RelaySubscription>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;

        let mut stats = tokio::time::interval(self.config.stats_interval);
        stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!("Sync coordinator started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(message) = next_message(&mut relay) => self.handle_relay_message(message),
                _ = poll.tick() => self.poll_pending().await,
                _ = stats.tick() => self.refresh_stats().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Sync coordinator stopped");
    }
}

async fn next_message(relay: &mut Option<RelaySubscription>) -> Option<SyncMessage> {
    match relay {
        Some(sub) => sub.receiver.recv().await,
        None => std::future::pending().await,
    }
}
