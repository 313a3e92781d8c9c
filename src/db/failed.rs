use sqlx::{Sqlite, SqlitePool};

use crate::classify::{ErrorType, Severity};
use crate::error::QueueError;
use crate::models::{FailedOperation, FailureContext, QueueItem};

use super::from_millis;

#[derive(Debug, sqlx::FromRow)]
struct FailedRow {
    id: i64,
    queue_id: i64,
    operation_type: String,
    payload: String,
    retry_count: i32,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
    error_type: String,
    user_message: String,
    action: String,
    severity: String,
    retriable: bool,
    error_details: String,
    failed_at: i64,
}

impl TryFrom<FailedRow> for FailedOperation {
    type Error = QueueError;

    fn try_from(row: FailedRow) -> Result<Self, Self::Error> {
        let error_type = ErrorType::parse(&row.error_type).ok_or_else(|| {
            QueueError::Corrupt(format!(
                "failed operation {} has error type '{}'",
                row.id, row.error_type
            ))
        })?;
        let severity = Severity::parse(&row.severity).ok_or_else(|| {
            QueueError::Corrupt(format!(
                "failed operation {} has severity '{}'",
                row.id, row.severity
            ))
        })?;
        Ok(FailedOperation {
            id: row.id,
            queue_id: row.queue_id,
            operation_type: row.operation_type,
            payload: serde_json::from_str(&row.payload)?,
            retry_count: row.retry_count,
            last_error: row.last_error,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            context: FailureContext {
                error_type,
                user_message: row.user_message,
                action: row.action,
                severity,
                retriable: row.retriable,
                error_details: serde_json::from_str(&row.error_details)?,
            },
            failed_at: from_millis(row.failed_at)?,
        })
    }
}

pub async fn insert<'e, E>(
    executor: E,
    item: &QueueItem,
    context: &FailureContext,
    failed_at: i64,
) -> Result<i64, QueueError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO failed_operations (
             queue_id, operation_type, payload, status, retry_count, last_error,
             created_at, updated_at, error_type, user_message, action, severity,
             retriable, error_details, failed_at
         )
         VALUES (?1, ?2, ?3, 'failed', ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         RETURNING id",
    )
    .bind(item.id)
    .bind(&item.operation_type)
    .bind(serde_json::to_string(&item.payload)?)
    .bind(item.retry_count)
    .bind(item.last_error.as_deref())
    .bind(item.created_at.timestamp_millis())
    .bind(item.updated_at.timestamp_millis())
    .bind(context.error_type.as_str())
    .bind(&context.user_message)
    .bind(&context.action)
    .bind(context.severity.as_str())
    .bind(context.retriable)
    .bind(serde_json::to_string(&context.error_details)?)
    .bind(failed_at)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<FailedOperation>, QueueError> {
    sqlx::query_as::<_, FailedRow>(
        "SELECT * FROM failed_operations ORDER BY failed_at DESC, id DESC LIMIT ?1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(FailedOperation::try_from)
    .collect()
}

pub async fn count(pool: &SqlitePool) -> Result<i64, QueueError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM failed_operations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn delete_before(pool: &SqlitePool, cutoff: i64) -> Result<u64, QueueError> {
    let result = sqlx::query("DELETE FROM failed_operations WHERE failed_at < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
