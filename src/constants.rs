//! # System Constants
//!
//! Lifecycle states, operation names and defaults that define the operational
//! boundaries of the batching pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation names attached to structured log records
pub mod events {
    // Batch lifecycle
    pub const BATCH_OPENED: &str = "batch.opened";
    pub const BATCH_SEALED: &str = "batch.sealed";
    pub const BATCH_FLUSHED: &str = "batch.flushed";
    pub const BATCH_PROCESSING: &str = "batch.processing";
    pub const BATCH_DONE: &str = "batch.done";
    pub const BATCH_FAILED: &str = "batch.failed";
    pub const BATCH_DISCARDED: &str = "batch.discarded";

    // Grouping lifecycle
    pub const GROUPING_ENQUEUED: &str = "grouping.enqueued";
    pub const GROUPING_READY: &str = "grouping.ready";
    pub const GROUPING_RETURNED: &str = "grouping.returned";

    // Source lifecycle
    pub const SOURCE_EXHAUSTED: &str = "source.exhausted";
    pub const PIPELINE_HALTED: &str = "pipeline.halted";
}

/// System-wide constants
pub mod system {
    /// Worker count used when available parallelism cannot be determined
    pub const FALLBACK_WORKER_COUNT: usize = 4;

    /// Prefix for configuration environment variables (`PACKLINE_WORKER_COUNT`, ...)
    pub const CONFIG_ENV_PREFIX: &str = "PACKLINE";

    /// Environment variables consulted for the runtime environment, in order
    pub const ENVIRONMENT_VARIABLES: &[&str] = &["PACKLINE_ENV", "APP_ENV"];

    /// Environment variable selecting the log output format
    pub const LOG_FORMAT_VARIABLE: &str = "PACKLINE_LOG_FORMAT";

    /// Environment used when none is configured
    pub const DEFAULT_ENVIRONMENT: &str = "development";
}

/// Lifecycle of a batch. Each state is entered exactly once, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Open,
    Sealed,
    Processing,
    Done,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Open => "open",
            BatchState::Sealed => "sealed",
            BatchState::Processing => "processing",
            BatchState::Done => "done",
        }
    }

    /// The only state this one may advance to
    pub fn successor(&self) -> Option<BatchState> {
        match self {
            BatchState::Open => Some(BatchState::Sealed),
            BatchState::Sealed => Some(BatchState::Processing),
            BatchState::Processing => Some(BatchState::Done),
            BatchState::Done => None,
        }
    }

    pub fn can_transition_to(&self, next: BatchState) -> bool {
        self.successor() == Some(next)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a grouping as observed by its return router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingState {
    Enqueued,
    Ready,
    Returned,
}

impl GroupingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingState::Enqueued => "enqueued",
            GroupingState::Ready => "ready",
            GroupingState::Returned => "returned",
        }
    }
}

impl fmt::Display for GroupingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
