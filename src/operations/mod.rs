pub mod remote;
pub mod template;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::QueueItem;

/// Why a replayed operation did not complete.
///
/// Handlers that can tell what went wrong return one of the typed variants.
/// `Opaque` carries only the message text and is classified heuristically.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationError {
    Network(String),
    Validation(String),
    Conflict(String),
    Permission(String),
    Opaque(String),
    NoHandler(String),
}

impl OperationError {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Network(_) => "network",
            OperationError::Validation(_) => "validation",
            OperationError::Conflict(_) => "conflict",
            OperationError::Permission(_) => "permission",
            OperationError::Opaque(_) => "opaque",
            OperationError::NoHandler(_) => "no_handler",
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationError::Network(msg)
            | OperationError::Validation(msg)
            | OperationError::Conflict(msg)
            | OperationError::Permission(msg)
            | OperationError::Opaque(msg) => write!(f, "{msg}"),
            OperationError::NoHandler(operation_type) => {
                write!(f, "No execute function registered for operation type '{operation_type}'")
            }
        }
    }
}

impl std::error::Error for OperationError {}

impl From<String> for OperationError {
    fn from(s: String) -> Self {
        OperationError::Opaque(s)
    }
}

impl From<&str> for OperationError {
    fn from(s: &str) -> Self {
        OperationError::Opaque(s.to_string())
    }
}

/// What a handler knows about the queue item it is replaying.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub queue_id: i64,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
}

impl OperationContext {
    pub fn for_item(item: &QueueItem) -> Self {
        Self {
            queue_id: item.id,
            attempt: item.retry_count + 1,
            created_at: item.created_at,
        }
    }

    /// Stable across every replay of the same queue item.
    pub fn idempotency_key(&self) -> String {
        format!("{}-{}", self.queue_id, self.created_at.timestamp_millis())
    }
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    fn operation_type(&self) -> &str;
    async fn execute(
        &self,
        ctx: &OperationContext,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, OperationError>;
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn OperationHandler>) {
        self.handlers
            .insert(handler.operation_type().to_string(), handler);
    }

    pub fn get(&self, operation_type: &str) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(operation_type)
    }

    pub fn operation_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Operation catalogue ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestCheckIn {
    pub guest_id: String,
    pub checked_in_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealServed {
    /// Anonymous meals are counted without a guest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    pub meal_type: MealType,
    pub quantity: u32,
    pub served_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowerBooking {
    pub guest_id: String,
    pub slot_start: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaundryBooking {
    pub guest_id: String,
    pub slot_start: DateTime<Utc>,
    pub load_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BicycleRepair {
    pub guest_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_id: Option<String>,
    pub status: RepairStatus,
    pub description: String,
}

const MAX_MEALS_PER_ENTRY: u32 = 50;
const MAX_LAUNDRY_LOADS: u32 = 3;

/// A domain action that can be deferred, keyed by its operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", content = "payload", rename_all = "snake_case")]
pub enum Operation {
    GuestCheckIn(GuestCheckIn),
    MealServed(MealServed),
    ShowerBooking(ShowerBooking),
    LaundryBooking(LaundryBooking),
    BicycleRepair(BicycleRepair),
}

impl Operation {
    pub const TYPES: [&'static str; 5] = [
        "guest_check_in",
        "meal_served",
        "shower_booking",
        "laundry_booking",
        "bicycle_repair",
    ];

    /// Parse an untyped `{operation_type, payload}` pair.
    pub fn from_parts(operation_type: &str, payload: serde_json::Value) -> Result<Self, String> {
        if !Self::TYPES.contains(&operation_type) {
            return Err(format!("Unknown operation type: {operation_type}"));
        }
        serde_json::from_value(serde_json::json!({
            "operation_type": operation_type,
            "payload": payload,
        }))
        .map_err(|e| format!("Invalid payload for {operation_type}: {e}"))
    }

    pub fn operation_type(&self) -> &'static str {
        match self {
            Operation::GuestCheckIn(_) => "guest_check_in",
            Operation::MealServed(_) => "meal_served",
            Operation::ShowerBooking(_) => "shower_booking",
            Operation::LaundryBooking(_) => "laundry_booking",
            Operation::BicycleRepair(_) => "bicycle_repair",
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Operation::GuestCheckIn(p) => serde_json::to_value(p),
            Operation::MealServed(p) => serde_json::to_value(p),
            Operation::ShowerBooking(p) => serde_json::to_value(p),
            Operation::LaundryBooking(p) => serde_json::to_value(p),
            Operation::BicycleRepair(p) => serde_json::to_value(p),
        }
    }

    /// Field rules that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Operation::GuestCheckIn(p) => require_guest(&p.guest_id),
            Operation::MealServed(p) => {
                if let Some(guest_id) = &p.guest_id {
                    require_guest(guest_id)?;
                }
                if p.quantity == 0 || p.quantity > MAX_MEALS_PER_ENTRY {
                    return Err(format!(
                        "quantity must be between 1 and {MAX_MEALS_PER_ENTRY}"
                    ));
                }
                Ok(())
            }
            Operation::ShowerBooking(p) => require_guest(&p.guest_id),
            Operation::LaundryBooking(p) => {
                require_guest(&p.guest_id)?;
                if p.load_count == 0 || p.load_count > MAX_LAUNDRY_LOADS {
                    return Err(format!(
                        "load_count must be between 1 and {MAX_LAUNDRY_LOADS}"
                    ));
                }
                Ok(())
            }
            Operation::BicycleRepair(p) => {
                require_guest(&p.guest_id)?;
                if p.description.trim().is_empty() {
                    return Err("description is required".to_string());
                }
                if matches!(&p.repair_id, Some(id) if id.trim().is_empty()) {
                    return Err("repair_id must not be blank".to_string());
                }
                Ok(())
            }
        }
    }
}

fn require_guest(guest_id: &str) -> Result<(), String> {
    if guest_id.trim().is_empty() {
        return Err("guest_id is required".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_payload() {
        let op = Operation::from_parts(
            "meal_served",
            json!({ "meal_type": "lunch", "quantity": 2, "served_on": "2026-03-04" }),
        )
        .unwrap();

        assert_eq!(op.operation_type(), "meal_served");
        assert!(op.validate().is_ok());
        assert_eq!(op.payload().unwrap()["meal_type"], "lunch");
    }

    #[test]
    fn rejects_unknown_type_and_bad_shape() {
        let err = Operation::from_parts("haircut", json!({})).unwrap_err();
        assert!(err.contains("Unknown operation type"));

        let err = Operation::from_parts("shower_booking", json!({ "guest_id": "g-1" })).unwrap_err();
        assert!(err.contains("slot_start"), "{err}");
    }

    #[test]
    fn field_rules() {
        let op = Operation::from_parts(
            "laundry_booking",
            json!({ "guest_id": "g-1", "slot_start": "2026-03-04T09:00:00Z", "load_count": 4 }),
        )
        .unwrap();
        assert!(op.validate().unwrap_err().contains("load_count"));

        let op = Operation::from_parts(
            "guest_check_in",
            json!({ "guest_id": "  ", "checked_in_at": "2026-03-04T09:00:00Z" }),
        )
        .unwrap();
        assert_eq!(op.validate().unwrap_err(), "guest_id is required");
    }

    #[test]
    fn no_handler_message_names_the_type() {
        let err = OperationError::NoHandler("bicycle_repair".into());
        assert_eq!(
            err.to_string(),
            "No execute function registered for operation type 'bicycle_repair'"
        );
    }

    #[test]
    fn idempotency_key_is_stable_per_item() {
        let created_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let a = OperationContext { queue_id: 7, attempt: 1, created_at };
        let b = OperationContext { queue_id: 7, attempt: 3, created_at };
        assert_eq!(a.idempotency_key(), "7-1700000000123");
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }
}
