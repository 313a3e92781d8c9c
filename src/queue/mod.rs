pub mod backoff;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;

use crate::classify::classify;
use crate::db::QueueStore;
use crate::error::QueueError;
use crate::models::{FailedOperation, FailureContext, QueueItem, QueueStats, QueueStatus};
use crate::operations::{HandlerRegistry, Operation, OperationContext, OperationError};
use crate::relay::SyncRelay;

/// Tag used when asking the relay for a background sync after an enqueue.
pub const BACKGROUND_SYNC_TAG: &str = "sync-operations";

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: usize,
    pub retry_delays: Vec<Duration>,
    pub retention_hours: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_delays: backoff::default_delays(),
            retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnqueueResult {
    pub success: bool,
    pub queued: bool,
    pub queue_id: i64,
    pub message: String,
}

/// How a single replay attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Completed,
    /// The item was marked `retrying`; the caller decides when to replay it.
    RetryLater { delay: Duration },
    /// The item was archived and removed from the queue.
    Failed { context: FailureContext },
    /// The attempt ran but the store could not record its result. The row is
    /// left as it was and the next pass picks it up again.
    Unrecorded { error: String },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SyncProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncResult {
    pub success: bool,
    pub completed: usize,
    pub failed: usize,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn internal_error(err: QueueError) -> Self {
        Self {
            success: false,
            completed: 0,
            failed: 0,
            remaining: 0,
            error: Some(err.to_string()),
        }
    }
}

pub type ProgressFn<'a> = &'a (dyn Fn(SyncProgress) + Send + Sync);

pub struct QueueManager {
    store: Arc<dyn QueueStore>,
    config: QueueConfig,
    relay: Option<Arc<SyncRelay>>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            relay: None,
        }
    }

    /// Ask `relay` for a background sync whenever something is queued.
    pub fn with_relay(mut self, relay: Arc<SyncRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Parse, validate and queue an untyped `{operation_type, payload}` pair.
    pub async fn enqueue(
        &self,
        operation_type: &str,
        payload: serde_json::Value,
    ) -> Result<EnqueueResult, QueueError> {
        let operation =
            Operation::from_parts(operation_type, payload).map_err(QueueError::InvalidPayload)?;
        self.enqueue_operation(&operation).await
    }

    pub async fn enqueue_operation(
        &self,
        operation: &Operation,
    ) -> Result<EnqueueResult, QueueError> {
        operation.validate().map_err(QueueError::InvalidPayload)?;

        let operation_type = operation.operation_type();
        let queue_id = self
            .store
            .add_to_queue(operation_type, &operation.payload()?)
            .await?;

        tracing::debug!("Queued {operation_type} operation {queue_id}");

        if let Some(relay) = &self.relay {
            if let Err(e) = relay.register_background_sync(BACKGROUND_SYNC_TAG) {
                tracing::warn!("Background sync registration failed: {e}");
            }
        }

        Ok(EnqueueResult {
            success: true,
            queued: true,
            queue_id,
            message: "Operation queued for sync".to_string(),
        })
    }

    /// Replay one item and record the outcome in the store.
    pub async fn process_operation(
        &self,
        item: &QueueItem,
        handlers: &HandlerRegistry,
    ) -> ProcessOutcome {
        let ctx = OperationContext::for_item(item);
        let result = match handlers.get(&item.operation_type) {
            Some(handler) => handler.execute(&ctx, &item.payload).await,
            None => Err(OperationError::NoHandler(item.operation_type.clone())),
        };

        let error = match result {
            Ok(_) => {
                if let Err(e) = self.store.remove_from_queue(item.id).await {
                    tracing::error!("Failed to remove completed queue item {}: {e}", item.id);
                    return ProcessOutcome::Unrecorded {
                        error: e.to_string(),
                    };
                }
                tracing::debug!("Queue item {} ({}) completed", item.id, item.operation_type);
                return ProcessOutcome::Completed;
            }
            Err(error) => error,
        };

        let classification = classify(&error);
        let message = error.to_string();

        if classification.retriable && item.retry_count < classification.max_attempts - 1 {
            if let Err(e) = self
                .store
                .update_operation_status(item.id, QueueStatus::Retrying, Some(&message))
                .await
            {
                tracing::error!("Failed to mark queue item {} as retrying: {e}", item.id);
                return ProcessOutcome::Unrecorded {
                    error: e.to_string(),
                };
            }
            let delay = backoff::delay_for(&self.config.retry_delays, item.retry_count);
            tracing::warn!(
                "Queue item {} ({}) failed on attempt {} ({}), retrying in {:?}: {message}",
                item.id,
                item.operation_type,
                ctx.attempt,
                classification.error_type.as_str(),
                delay
            );
            return ProcessOutcome::RetryLater { delay };
        }

        let context = FailureContext::from_classification(
            &classification,
            json!({
                "message": &message,
                "kind": error.kind(),
                "attempts": ctx.attempt,
                "max_attempts": classification.max_attempts,
            }),
        );

        let snapshot = QueueItem {
            status: QueueStatus::Failed,
            retry_count: ctx.attempt,
            last_error: Some(message.clone()),
            ..item.clone()
        };

        if let Err(e) = self.store.archive_operation(&snapshot, &context).await {
            tracing::error!("Failed to archive queue item {}: {e}", item.id);
            return ProcessOutcome::Unrecorded {
                error: e.to_string(),
            };
        }

        tracing::error!(
            "Queue item {} ({}) failed permanently after {} attempt(s) ({}): {message}",
            item.id,
            item.operation_type,
            ctx.attempt,
            classification.error_type.as_str()
        );

        ProcessOutcome::Failed { context }
    }

    /// Replay every pending item once, batch by batch, then replay retryable
    /// failures one at a time after their backoff delay.
    pub async fn sync_pending_operations(
        &self,
        handlers: &HandlerRegistry,
        on_progress: Option<ProgressFn<'_>>,
    ) -> SyncResult {
        let items = match self.store.get_pending_operations().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("Failed to load pending operations: {e}");
                return SyncResult::internal_error(e);
            }
        };

        let total = items.len();
        if total > 0 {
            tracing::info!("Syncing {total} pending operation(s)");
        }

        let mut completed = 0;
        let mut failed = 0;
        let mut processed = 0;
        let mut unrecorded = 0;
        let mut retries = Vec::new();

        for batch in items.chunks(self.config.batch_size.max(1)) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|item| self.process_operation(item, handlers)),
            )
            .await;

            for (item, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    ProcessOutcome::Completed => completed += 1,
                    ProcessOutcome::Failed { .. } => failed += 1,
                    ProcessOutcome::Unrecorded { .. } => unrecorded += 1,
                    ProcessOutcome::RetryLater { delay } => retries.push((item.clone(), delay)),
                }
            }

            processed += batch.len();
            if let Some(on_progress) = on_progress {
                on_progress(SyncProgress {
                    completed: processed,
                    total,
                });
            }
        }

        for (item, delay) in retries {
            tokio::time::sleep(delay).await;

            // Mirror what the store recorded when the item was marked retrying.
            let item = QueueItem {
                status: QueueStatus::Retrying,
                retry_count: item.retry_count + 1,
                ..item
            };

            match self.process_operation(&item, handlers).await {
                ProcessOutcome::Completed => completed += 1,
                ProcessOutcome::Failed { .. } => failed += 1,
                ProcessOutcome::Unrecorded { .. } => unrecorded += 1,
                ProcessOutcome::RetryLater { .. } => {
                    tracing::debug!("Queue item {} left for the next sync pass", item.id);
                }
            }
        }

        tracing::info!("Sync pass finished: {completed} completed, {failed} failed");

        let error = (unrecorded > 0)
            .then(|| format!("{unrecorded} operation result(s) could not be saved"));

        SyncResult {
            success: failed == 0 && error.is_none(),
            completed,
            failed,
            remaining: 0,
            error,
        }
    }

    pub async fn has_pending_operations(&self) -> bool {
        match self.store.count_pending().await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!("Failed to count pending operations: {e}");
                false
            }
        }
    }

    /// Drop archived failures older than the retention window.
    pub async fn cleanup_completed_operations(&self) -> u64 {
        match self
            .store
            .clear_old_completed_operations(self.config.retention_hours)
            .await
        {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!("Cleaned up {removed} old queue record(s)");
                }
                removed
            }
            Err(e) => {
                tracing::warn!("Queue cleanup failed: {e}");
                0
            }
        }
    }

    pub async fn get_queue_stats(&self) -> Result<QueueStats, QueueError> {
        self.store.get_queue_stats().await
    }

    pub async fn get_pending_operations(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.store.get_pending_operations().await
    }

    pub async fn get_failed_operations(
        &self,
        limit: i64,
    ) -> Result<Vec<FailedOperation>, QueueError> {
        self.store.get_failed_operations(limit).await
    }
}
