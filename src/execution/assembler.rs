//! # Batch Assembler
//!
//! Owns the single open batch shared by every ingest thread. One mutex guards the cursor
//! and the dispatch handle together, so "append, and if now full: seal, dispatch and open
//! a fresh batch" is a single critical section. No submission can land in a batch that is
//! being sealed by another thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::constants::events;
use crate::error::{PipelineError, Result};
use crate::execution::dispatch_queue::DispatchSender;
use crate::execution::traits::BatchProcessor;
use crate::logging::log_batch_operation;
use crate::models::{Batch, BatchId, WorkItem};

struct AssemblerState<T> {
    /// `None` once flushed; later submissions are dropped
    current: Option<Batch<T>>,
    dispatch: Option<DispatchSender<T>>,
    next_batch_id: u64,
}

/// Counters describing what the assembler produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub batches_dispatched: u64,
    pub partial_batches: u64,
    pub items_submitted: u64,
    pub items_dropped: u64,
}

pub struct BatchAssembler<T> {
    state: Mutex<AssemblerState<T>>,
    processor: Arc<dyn BatchProcessor<T>>,
    config: PipelineConfig,
    batches_dispatched: AtomicU64,
    partial_batches: AtomicU64,
    items_submitted: AtomicU64,
    items_dropped: AtomicU64,
}

impl<T> std::fmt::Debug for BatchAssembler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAssembler")
            .field("processor", &"BatchProcessor")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T> BatchAssembler<T> {
    pub fn new(
        processor: Arc<dyn BatchProcessor<T>>,
        config: PipelineConfig,
        dispatch: DispatchSender<T>,
    ) -> Self {
        let first = Self::open_batch(processor.as_ref(), &config, BatchId(0));
        Self {
            state: Mutex::new(AssemblerState {
                current: Some(first),
                dispatch: Some(dispatch),
                next_batch_id: 1,
            }),
            processor,
            config,
            batches_dispatched: AtomicU64::new(0),
            partial_batches: AtomicU64::new(0),
            items_submitted: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
        }
    }

    fn open_batch(
        processor: &dyn BatchProcessor<T>,
        config: &PipelineConfig,
        id: BatchId,
    ) -> Batch<T> {
        let capacity = config.effective_capacity(processor.capacity());
        if capacity == 0 {
            warn!(batch_id = %id, "processor reported zero capacity, opening single-item batch");
        }
        let batch = Batch::new(id, capacity);
        log_batch_operation(events::BATCH_OPENED, id.0, 0, batch.state().as_str());
        batch
    }

    /// Append one item to the open batch, dispatching the batch if it is now full
    pub fn submit(&self, item: WorkItem<T>) {
        let mut state = self.state.lock();
        let AssemblerState {
            current,
            dispatch,
            next_batch_id,
        } = &mut *state;

        let Some(batch) = current.as_mut() else {
            warn!(
                grouping_id = %item.grouping_id,
                "item submitted after the assembler was flushed, dropping it"
            );
            self.items_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if let Err(e) = batch.push(item) {
            // The cursor is always reopened before the lock is released
            warn!(error = %e, "open batch rejected item, dropping it");
            self.items_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.items_submitted.fetch_add(1, Ordering::Relaxed);

        if batch.is_full() {
            let fresh = Self::open_batch(
                self.processor.as_ref(),
                &self.config,
                BatchId(*next_batch_id),
            );
            *next_batch_id += 1;
            if let Some(full) = current.replace(fresh) {
                self.seal_and_dispatch(full, dispatch.as_ref(), events::BATCH_SEALED);
            }
        }
    }

    /// Dispatch the open batch even if it is not full and close the dispatch queue
    ///
    /// Used once every source is exhausted. An empty open batch is discarded rather than
    /// dispatched. Returns the id of the dispatched partial batch, if any.
    pub fn flush_partial(&self) -> Option<BatchId> {
        let mut state = self.state.lock();
        let current = state.current.take();
        // Dropping the sender closes the queue once this function returns
        let dispatch = state.dispatch.take();
        drop(state);

        let batch = current?;
        if batch.is_empty() {
            debug!(batch_id = %batch.id(), "open batch is empty at flush, nothing to dispatch");
            return None;
        }

        let batch_id = batch.id();
        if batch.has_capacity() {
            self.partial_batches.fetch_add(1, Ordering::Relaxed);
        }
        self.seal_and_dispatch(batch, dispatch.as_ref(), events::BATCH_FLUSHED);
        Some(batch_id)
    }

    fn seal_and_dispatch(
        &self,
        mut batch: Batch<T>,
        dispatch: Option<&DispatchSender<T>>,
        operation: &str,
    ) {
        let batch_id = batch.id();
        let item_count = batch.len();

        let result: Result<()> = batch.seal().and_then(|()| {
            let sender = dispatch
                .ok_or_else(|| PipelineError::invalid_state("dispatch queue already closed"))?;
            sender.push(batch)
        });

        match result {
            Ok(()) => {
                self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
                log_batch_operation(operation, batch_id.0, item_count, "dispatched");
            }
            Err(e) => {
                warn!(batch_id = %batch_id, item_count, error = %e, "failed to dispatch batch");
                self.items_dropped
                    .fetch_add(item_count as u64, Ordering::Relaxed);
            }
        }
    }

    pub fn is_flushed(&self) -> bool {
        self.state.lock().current.is_none()
    }

    pub fn stats(&self) -> AssemblerStats {
        AssemblerStats {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            partial_batches: self.partial_batches.load(Ordering::Relaxed),
            items_submitted: self.items_submitted.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
        }
    }
}
