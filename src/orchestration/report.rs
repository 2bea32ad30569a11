//! Run report returned by [`Pipeline::stop`](super::Pipeline::stop).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SourceId;

/// Totals for one completed pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub worker_count: usize,
    /// Batches handed to the dispatch queue, partial ones included
    pub batches_dispatched: u64,
    /// Batches flushed at shutdown before reaching capacity
    pub partial_batches: u64,
    pub batches_processed: u64,
    pub items_processed: u64,
    pub groupings_delivered: u64,
    pub sources: Vec<SourceReport>,
}

/// Per-source totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub name: String,
    pub groupings_received: u64,
    pub items_received: u64,
    pub groupings_delivered: u64,
    pub items_delivered: u64,
}

impl PipelineReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn source(&self, source_id: SourceId) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// True when every received grouping went back to its source
    pub fn all_delivered(&self) -> bool {
        self.sources
            .iter()
            .all(|s| s.groupings_received == s.groupings_delivered)
    }
}
