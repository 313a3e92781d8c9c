//! Out-of-band sync trigger.
//!
//! The relay holds no handlers and never touches the queue. It only tells
//! every open coordinator that now would be a good time to sync; each one
//! decides for itself whether to act.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    TriggerSync { timestamp: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    Unsupported,
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Unsupported => write!(f, "Background sync is not available"),
        }
    }
}

impl std::error::Error for RelayError {}

/// A registered instance's end of the relay.
pub struct RelaySubscription {
    pub client_id: Uuid,
    pub receiver: mpsc::UnboundedReceiver<SyncMessage>,
}

pub struct SyncRelay {
    background_sync: bool,
    clients: DashMap<Uuid, mpsc::UnboundedSender<SyncMessage>>,
    pending_tags: DashMap<String, i64>,
}

impl SyncRelay {
    pub fn new(background_sync: bool) -> Self {
        Self {
            background_sync,
            clients: DashMap::new(),
            pending_tags: DashMap::new(),
        }
    }

    pub fn supports_background_sync(&self) -> bool {
        self.background_sync
    }

    /// Ask for a background sync under `tag`. Repeated registrations collapse into one.
    pub fn register_background_sync(&self, tag: &str) -> Result<(), RelayError> {
        if !self.background_sync {
            return Err(RelayError::Unsupported);
        }
        self.pending_tags
            .entry(tag.to_string())
            .or_insert_with(|| Utc::now().timestamp_millis());
        Ok(())
    }

    pub fn pending_tags(&self) -> usize {
        self.pending_tags.len()
    }

    pub fn subscribe(&self) -> RelaySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = Uuid::now_v7();
        self.clients.insert(client_id, tx);
        tracing::debug!("Relay client {client_id} registered");
        RelaySubscription {
            client_id,
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, client_id: Uuid) {
        self.clients.remove(&client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// True while at least one subscriber can still receive.
    pub fn has_listeners(&self) -> bool {
        self.clients.iter().any(|client| !client.value().is_closed())
    }

    /// Handle a platform background-sync event for `tag`.
    pub fn on_background_sync(&self, tag: &str) -> usize {
        tracing::info!("Background sync event: {tag}");
        self.broadcast_trigger()
    }

    /// Explicit "sync now" request.
    pub fn request_sync_now(&self) -> usize {
        tracing::info!("Sync requested for all instances");
        self.broadcast_trigger()
    }

    /// Fire every registered tag. Returns the number of notifications delivered.
    pub fn fire_pending(&self) -> usize {
        let tags: Vec<String> = self
            .pending_tags
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        tags.into_iter()
            .filter(|tag| self.pending_tags.remove(tag).is_some())
            .map(|tag| self.on_background_sync(&tag))
            .sum()
    }

    fn broadcast_trigger(&self) -> usize {
        let message = SyncMessage::TriggerSync {
            timestamp: Utc::now().timestamp_millis(),
        };

        let mut notified = 0;
        self.clients.retain(|client_id, tx| match tx.send(message.clone()) {
            Ok(()) => {
                notified += 1;
                true
            }
            Err(_) => {
                tracing::debug!("Relay client {client_id} is gone, dropping it");
                false
            }
        });

        tracing::debug!("Sync trigger sent to {notified} instance(s)");
        notified
    }

    /// Deliver registered background syncs every `interval` until shutdown.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Sync relay started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Tags wait for a listener. A coordinator that subscribes later
            // still gets the trigger, and one coming online syncs regardless.
            if self.pending_tags() > 0 && self.has_listeners() {
                self.fire_pending();
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Sync relay stopped");
    }
}
