use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Classification, ErrorType, Severity};

/// Diagnostic context attached to an operation when it fails terminally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureContext {
    pub error_type: ErrorType,
    pub user_message: String,
    pub action: String,
    pub severity: Severity,
    pub retriable: bool,
    pub error_details: serde_json::Value,
}

impl FailureContext {
    pub fn from_classification(classification: &Classification, details: serde_json::Value) -> Self {
        Self {
            error_type: classification.error_type,
            user_message: classification.user_message.to_string(),
            action: classification.action.to_string(),
            severity: classification.severity,
            retriable: classification.retriable,
            error_details: details,
        }
    }
}

/// Archived snapshot of a queue item that will not be retried again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedOperation {
    pub id: i64,
    pub queue_id: i64,
    pub operation_type: String,
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub context: FailureContext,
    pub failed_at: DateTime<Utc>,
}
