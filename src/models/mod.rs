//! # Data Model
//!
//! Work items, groupings and batches. Groupings live in a [`GroupingArena`] keyed by a
//! stable [`GroupingId`]; work items and batches carry that id instead of a pointer to
//! their grouping, so nothing in the pipeline forms an ownership cycle.

pub mod batch;
pub mod grouping;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use batch::Batch;
pub use grouping::{Grouping, GroupingArena, GroupingSlot, WorkItem};

/// Identifier of a batch, unique within one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

/// Identifier of a grouping, unique within one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupingId(pub u64);

/// Index of a registered source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub usize);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
