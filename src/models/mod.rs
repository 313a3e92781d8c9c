pub mod failed_operation;
pub mod queue_item;
pub mod stats;

pub use failed_operation::{FailedOperation, FailureContext};
pub use queue_item::{QueueItem, QueueStatus};
pub use stats::QueueStats;
