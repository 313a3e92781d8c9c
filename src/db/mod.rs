//! Durable local storage for queued operations and the failed-operation archive.

pub mod failed;
pub mod queue;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::QueueError;
use crate::models::{FailedOperation, FailureContext, QueueItem, QueueStats, QueueStatus};

/// The persistent queue contract the queue manager and coordinator depend on.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new pending item and return its id. Storage failures propagate.
    async fn add_to_queue(
        &self,
        operation_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, QueueError>;

    /// Pending and retrying items, oldest first.
    async fn get_pending_operations(&self) -> Result<Vec<QueueItem>, QueueError>;

    /// Update an item in place. A missing id is logged and ignored.
    async fn update_operation_status(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError>;

    /// Delete an item. Removing a missing id is not an error.
    async fn remove_from_queue(&self, id: i64) -> Result<(), QueueError>;

    async fn add_failed_operation_with_context(
        &self,
        item: &QueueItem,
        context: &FailureContext,
    ) -> Result<(), QueueError>;

    /// Archive an item and delete it from the queue in one transaction.
    async fn archive_operation(
        &self,
        item: &QueueItem,
        context: &FailureContext,
    ) -> Result<(), QueueError>;

    /// Delete archived rows older than the cutoff; returns how many were removed.
    async fn clear_old_completed_operations(&self, hours_old: i64) -> Result<u64, QueueError>;

    async fn get_queue_stats(&self) -> Result<QueueStats, QueueError>;

    /// Newest archived failures first.
    async fn get_failed_operations(&self, limit: i64) -> Result<Vec<FailedOperation>, QueueError>;

    async fn count_pending(&self) -> Result<i64, QueueError>;
}

pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::new(pool).await
    }

    /// A transient database that lives as long as the store. Used by tests.
    pub async fn in_memory() -> Result<Self, QueueError> {
        // Every connection to `sqlite::memory:` is a separate database, so pin the pool to one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::new(pool).await
    }

    pub async fn new(pool: SqlitePool) -> Result<Self, QueueError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn add_to_queue(
        &self,
        operation_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, QueueError> {
        queue::insert(&self.pool, operation_type, payload, now_millis()).await
    }

    async fn get_pending_operations(&self) -> Result<Vec<QueueItem>, QueueError> {
        queue::list_pending(&self.pool).await
    }

    async fn update_operation_status(
        &self,
        id: i64,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let updated = queue::update_status(&self.pool, id, status, error, now_millis()).await?;
        if updated == 0 {
            tracing::warn!("Queue item {id} not found while setting status to {status}");
        }
        Ok(())
    }

    async fn remove_from_queue(&self, id: i64) -> Result<(), QueueError> {
        queue::delete(&self.pool, id).await?;
        Ok(())
    }

    async fn add_failed_operation_with_context(
        &self,
        item: &QueueItem,
        context: &FailureContext,
    ) -> Result<(), QueueError> {
        failed::insert(&self.pool, item, context, now_millis()).await?;
        Ok(())
    }

    async fn archive_operation(
        &self,
        item: &QueueItem,
        context: &FailureContext,
    ) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        failed::insert(&mut *tx, item, context, now_millis()).await?;
        queue::delete(&mut *tx, item.id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_old_completed_operations(&self, hours_old: i64) -> Result<u64, QueueError> {
        let cutoff = now_millis() - hours_old.max(0) * 60 * 60 * 1000;
        let archived = failed::delete_before(&self.pool, cutoff).await?;
        let completed = queue::delete_completed_before(&self.pool, cutoff).await?;
        Ok(archived + completed)
    }

    async fn get_queue_stats(&self) -> Result<QueueStats, QueueError> {
        let mut stats = queue::count_by_status(&self.pool).await?.into_iter().fold(
            QueueStats::default(),
            |mut acc, (status, count)| {
                match QueueStatus::parse(&status) {
                    Some(QueueStatus::Pending) => acc.pending = count,
                    Some(QueueStatus::Retrying) => acc.retrying = count,
                    Some(QueueStatus::Completed) => acc.completed = count,
                    Some(QueueStatus::Failed) => acc.failed += count,
                    None => tracing::warn!("Ignoring {count} queue rows with status '{status}'"),
                }
                acc
            },
        );
        stats.failed += failed::count(&self.pool).await?;
        Ok(stats)
    }

    async fn get_failed_operations(&self, limit: i64) -> Result<Vec<FailedOperation>, QueueError> {
        failed::list_recent(&self.pool, limit).await
    }

    async fn count_pending(&self) -> Result<i64, QueueError> {
        queue::count_pending(&self.pool).await
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, QueueError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| QueueError::Corrupt(format!("timestamp {ms} is out of range")))
}
