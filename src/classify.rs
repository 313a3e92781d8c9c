//! Failure taxonomy for replayed operations.
//!
//! Handlers report typed [`OperationError`]s where they can. Errors from
//! opaque third-party calls only carry a message, so those are classified by
//! matching the message text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::operations::OperationError;

static NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)network|fetch|timed? ?out|offline|connection|unreachable|econn|socket|dns|\b50[234]\b",
    )
    .unwrap()
});

static PERMISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)permission|unauthori[sz]ed|forbidden|not allowed|access denied|\b40[13]\b")
        .unwrap()
});

static CONFLICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)conflict|duplicate|already exists|unique constraint|\b409\b").unwrap()
});

static VALIDATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)validation|invalid|required|malformed|violates|\b4(00|22)\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Network,
    Validation,
    Conflict,
    Permission,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Network => "network",
            ErrorType::Validation => "validation",
            ErrorType::Conflict => "conflict",
            ErrorType::Permission => "permission",
            ErrorType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "network" => Some(ErrorType::Network),
            "validation" => Some(ErrorType::Validation),
            "conflict" => Some(ErrorType::Conflict),
            "permission" => Some(ErrorType::Permission),
            "unknown" => Some(ErrorType::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

/// Retry policy and operator-facing wording for one failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub error_type: ErrorType,
    pub retriable: bool,
    pub max_attempts: i32,
    pub severity: Severity,
    pub user_message: &'static str,
    pub action: &'static str,
}

impl Classification {
    pub fn for_type(error_type: ErrorType) -> Self {
        match error_type {
            ErrorType::Network => Classification {
                error_type,
                retriable: true,
                max_attempts: 5,
                severity: Severity::Low,
                user_message: "Connection problem. The change is saved and will be sent again.",
                action: "retry",
            },
            ErrorType::Validation => Classification {
                error_type,
                retriable: false,
                max_attempts: 1,
                severity: Severity::Medium,
                user_message: "The server rejected the recorded data as invalid.",
                action: "review_data",
            },
            ErrorType::Conflict => Classification {
                error_type,
                retriable: false,
                max_attempts: 1,
                severity: Severity::Medium,
                user_message: "This record already exists or was changed elsewhere.",
                action: "check_duplicate",
            },
            ErrorType::Permission => Classification {
                error_type,
                retriable: false,
                max_attempts: 1,
                severity: Severity::High,
                user_message: "You do not have permission to perform this operation.",
                action: "contact_admin",
            },
            ErrorType::Unknown => Classification {
                error_type,
                retriable: true,
                max_attempts: 3,
                severity: Severity::Medium,
                user_message: "An unexpected error occurred.",
                action: "retry",
            },
        }
    }
}

/// Classify a failure message by its text alone.
pub fn classify_message(message: &str) -> ErrorType {
    if NETWORK_RE.is_match(message) {
        ErrorType::Network
    } else if PERMISSION_RE.is_match(message) {
        ErrorType::Permission
    } else if CONFLICT_RE.is_match(message) {
        ErrorType::Conflict
    } else if VALIDATION_RE.is_match(message) {
        ErrorType::Validation
    } else {
        ErrorType::Unknown
    }
}

pub fn classify(error: &OperationError) -> Classification {
    match error {
        OperationError::Network(_) => Classification::for_type(ErrorType::Network),
        OperationError::Validation(_) => Classification::for_type(ErrorType::Validation),
        OperationError::Conflict(_) => Classification::for_type(ErrorType::Conflict),
        OperationError::Permission(_) => Classification::for_type(ErrorType::Permission),
        OperationError::Opaque(message) => Classification::for_type(classify_message(message)),
        // Nothing can replay this item until a handler is registered.
        OperationError::NoHandler(_) => Classification {
            retriable: false,
            max_attempts: 1,
            severity: Severity::High,
            action: "register_handler",
            ..Classification::for_type(ErrorType::Unknown)
        },
    }
}
