use sqlx::{Sqlite, SqlitePool};

use crate::error::QueueError;
use crate::models::{QueueItem, QueueStatus};

use super::from_millis;

#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: i64,
    operation_type: String,
    payload: String,
    status: String,
    retry_count: i32,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = QueueError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let status = QueueStatus::parse(&row.status).ok_or_else(|| {
            QueueError::Corrupt(format!("queue item {} has status '{}'", row.id, row.status))
        })?;
        Ok(QueueItem {
            id: row.id,
            operation_type: row.operation_type,
            payload: serde_json::from_str(&row.payload)?,
            status,
            retry_count: row.retry_count,
            last_error: row.last_error,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

pub async fn insert(
    pool: &SqlitePool,
    operation_type: &str,
    payload: &serde_json::Value,
    now: i64,
) -> Result<i64, QueueError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO queue (operation_type, payload, status, retry_count, created_at, updated_at)
         VALUES (?1, ?2, 'pending', 0, ?3, ?3) RETURNING id",
    )
    .bind(operation_type)
    .bind(serde_json::to_string(payload)?)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<QueueItem>, QueueError> {
    sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue WHERE status IN ('pending', 'retrying') ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(QueueItem::try_from)
    .collect()
}

/// Returns the number of rows touched. Moving to `retrying` counts one more attempt.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    status: QueueStatus,
    error: Option<&str>,
    now: i64,
) -> Result<u64, QueueError> {
    let result = sqlx::query(
        "UPDATE queue
         SET status = ?2,
             last_error = COALESCE(?3, last_error),
             retry_count = retry_count + CASE WHEN ?2 = 'retrying' THEN 1 ELSE 0 END,
             updated_at = ?4
         WHERE id = ?1",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete<'e, E>(executor: E, id: i64) -> Result<u64, QueueError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM queue WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_completed_before(pool: &SqlitePool, cutoff: i64) -> Result<u64, QueueError> {
    let result = sqlx::query("DELETE FROM queue WHERE status = 'completed' AND updated_at < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(String, i64)>, QueueError> {
    let rows = sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM queue GROUP BY status")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn count_pending(pool: &SqlitePool) -> Result<i64, QueueError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM queue WHERE status IN ('pending', 'retrying')",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}
