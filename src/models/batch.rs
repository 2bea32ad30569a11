//! # Batches
//!
//! A batch is a capacity-bounded, append-only list of work items submitted to one
//! invocation of the processing primitive. It moves through
//! `Open -> Sealed -> Processing -> Done` exactly once; items may only be appended
//! while it is open.

use crate::constants::BatchState;
use crate::error::{PipelineError, Result};

use super::{BatchId, GroupingId, WorkItem};

/// Where a batched payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ItemOrigin {
    grouping_id: GroupingId,
    index: usize,
}

#[derive(Debug)]
pub struct Batch<T> {
    id: BatchId,
    capacity: usize,
    state: BatchState,
    // Parallel vectors so the processor sees a contiguous payload slice
    origins: Vec<ItemOrigin>,
    payloads: Vec<T>,
}

impl<T> Batch<T> {
    /// Open a new, empty batch. A zero capacity is raised to one.
    pub fn new(id: BatchId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id,
            capacity,
            state: BatchState::Open,
            origins: Vec::with_capacity(capacity),
            payloads: Vec::with_capacity(capacity),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn has_capacity(&self) -> bool {
        self.len() < self.capacity
    }

    pub fn is_full(&self) -> bool {
        !self.has_capacity()
    }

    /// Append an item. Fails if the batch is no longer open or already full.
    pub fn push(&mut self, item: WorkItem<T>) -> Result<()> {
        if self.state != BatchState::Open {
            return Err(PipelineError::invalid_state(format!(
                "cannot add item to batch {} in state {}",
                self.id, self.state
            )));
        }
        if self.is_full() {
            return Err(PipelineError::invalid_state(format!(
                "batch {} is full ({} items)",
                self.id, self.capacity
            )));
        }

        self.origins.push(ItemOrigin {
            grouping_id: item.grouping_id,
            index: item.index,
        });
        self.payloads.push(item.payload);
        Ok(())
    }

    pub fn seal(&mut self) -> Result<()> {
        self.transition(BatchState::Sealed)
    }

    pub fn begin_processing(&mut self) -> Result<()> {
        self.transition(BatchState::Processing)
    }

    pub fn finish(&mut self) -> Result<()> {
        self.transition(BatchState::Done)
    }

    fn transition(&mut self, next: BatchState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::invalid_state(format!(
                "batch {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Payloads handed to the processing primitive
    pub fn payloads_mut(&mut self) -> &mut [T] {
        &mut self.payloads
    }

    /// Split the batch back into tagged work items
    pub fn into_work_items(self) -> impl Iterator<Item = WorkItem<T>> {
        self.origins
            .into_iter()
            .zip(self.payloads)
            .map(|(origin, payload)| WorkItem {
                grouping_id: origin.grouping_id,
                index: origin.index,
                payload,
            })
    }
}
