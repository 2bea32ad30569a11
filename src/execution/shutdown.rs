//! # Shutdown Coordinator
//!
//! Detects global exhaustion: every source has signalled end of stream. At that point the
//! open (possibly partial) batch is flushed and the dispatch queue closed, so processing
//! workers exit as soon as they observe it drained. Individual exhaustion never flushes;
//! a partially filled batch stays open for the sources that are still sending.
//!
//! Also carries the halt flag raised by the first processing fault.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::events;
use crate::execution::assembler::BatchAssembler;
use crate::models::SourceId;

#[derive(Debug)]
pub struct ShutdownCoordinator<T> {
    exhausted: Vec<AtomicBool>,
    exhausted_count: AtomicUsize,
    halted: AtomicBool,
    assembler: Arc<BatchAssembler<T>>,
}

impl<T> ShutdownCoordinator<T> {
    pub fn new(source_count: usize, assembler: Arc<BatchAssembler<T>>) -> Self {
        Self {
            exhausted: (0..source_count).map(|_| AtomicBool::new(false)).collect(),
            exhausted_count: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
            assembler,
        }
    }

    pub fn source_count(&self) -> usize {
        self.exhausted.len()
    }

    /// Record that a source reached end of stream
    ///
    /// Returns `true` when this was the last active source, in which case the open batch
    /// has been flushed and the dispatch queue closed before returning.
    pub fn mark_exhausted(&self, source_id: SourceId) -> bool {
        let Some(flag) = self.exhausted.get(source_id.0) else {
            warn!(source_id = %source_id, "exhaustion reported for unknown source");
            return false;
        };

        if flag.swap(true, Ordering::AcqRel) {
            warn!(source_id = %source_id, "source reported end of stream twice, ignoring");
            return false;
        }

        let exhausted = self.exhausted_count.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            operation = events::SOURCE_EXHAUSTED,
            source_id = %source_id,
            exhausted,
            total = self.source_count(),
            "source exhausted"
        );

        if exhausted == self.source_count() {
            self.drain();
            return true;
        }
        false
    }

    /// Flush right away when there is no source that could ever send work
    pub fn drain_if_idle(&self) -> bool {
        if self.source_count() == 0 {
            self.drain();
            return true;
        }
        false
    }

    fn drain(&self) {
        let flushed = self.assembler.flush_partial();
        info!(
            partial_batch = ?flushed.map(|id| id.0),
            "all sources exhausted, dispatch queue closed"
        );
    }

    pub fn is_exhausted(&self, source_id: SourceId) -> bool {
        self.exhausted
            .get(source_id.0)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn all_exhausted(&self) -> bool {
        self.exhausted_count.load(Ordering::Acquire) == self.source_count()
    }

    /// Stop all further processing. Returns `true` for the call that raised the flag.
    pub fn halt(&self) -> bool {
        let first = !self.halted.swap(true, Ordering::AcqRel);
        if first {
            warn!(operation = events::PIPELINE_HALTED, "pipeline halted");
        }
        first
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}
