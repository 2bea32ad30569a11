//! # Ingest Worker
//!
//! One ingest thread per source. It pulls groupings until end of stream, registers each
//! in the arena, announces it to the source's return router and only then feeds its
//! items to the shared assembler, one at a time. Announcing first means the router can
//! never see a grouping finish before it is tracked.

use crossbeam::channel::Sender;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::execution::assembler::BatchAssembler;
use crate::execution::return_router::RouterEvent;
use crate::execution::shutdown::ShutdownCoordinator;
use crate::execution::traits::Source;
use crate::models::{GroupingArena, SourceId};

/// Outcome of one ingest worker's run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub groupings_received: u64,
    pub items_received: u64,
}

pub struct IngestWorker<T> {
    source_id: SourceId,
    source: Arc<dyn Source<T>>,
    arena: Arc<GroupingArena<T>>,
    assembler: Arc<BatchAssembler<T>>,
    router: Sender<RouterEvent<T>>,
    coordinator: Arc<ShutdownCoordinator<T>>,
}

/// Reports exhaustion when the ingest loop ends, including by unwinding, so a
/// panicking source cannot keep the rest of the pipeline waiting forever
struct ExhaustionGuard<'a, T> {
    source_id: SourceId,
    router: &'a Sender<RouterEvent<T>>,
    coordinator: &'a ShutdownCoordinator<T>,
}

impl<T> Drop for ExhaustionGuard<'_, T> {
    fn drop(&mut self) {
        let _ = self.router.send(RouterEvent::SourceExhausted);
        self.coordinator.mark_exhausted(self.source_id);
    }
}

impl<T> IngestWorker<T> {
    pub fn new(
        source_id: SourceId,
        source: Arc<dyn Source<T>>,
        arena: Arc<GroupingArena<T>>,
        assembler: Arc<BatchAssembler<T>>,
        router: Sender<RouterEvent<T>>,
        coordinator: Arc<ShutdownCoordinator<T>>,
    ) -> Self {
        Self {
            source_id,
            source,
            arena,
            assembler,
            router,
            coordinator,
        }
    }

    pub fn run(self) -> IngestSummary {
        let source_name = self.source.name();
        debug!(source_id = %self.source_id, source = %source_name, "ingest worker started");

        let _guard = ExhaustionGuard {
            source_id: self.source_id,
            router: &self.router,
            coordinator: &self.coordinator,
        };
        let mut summary = IngestSummary::default();

        loop {
            if self.coordinator.is_halted() {
                warn!(source_id = %self.source_id, "pipeline halted, ingest worker stops pulling");
                break;
            }

            let Some(items) = self.source.next_grouping() else {
                debug!(source_id = %self.source_id, "source reached end of stream");
                break;
            };

            if items.is_empty() {
                warn!(source_id = %self.source_id, "source sent an empty grouping");
            }

            let (slot, work_items) = self.arena.register(self.source_id, items);
            let grouping_id = slot.id();
            summary.groupings_received += 1;
            summary.items_received += work_items.len() as u64;

            if self.router.send(RouterEvent::Enqueued(slot)).is_err() {
                // Router already stopped on halt; nobody will return this grouping
                self.arena.release(grouping_id);
                break;
            }

            trace!(
                source_id = %self.source_id,
                grouping_id = %grouping_id,
                item_count = work_items.len(),
                "submitting grouping items"
            );
            for item in work_items {
                self.assembler.submit(item);
            }
        }

        debug!(
            source_id = %self.source_id,
            groupings = summary.groupings_received,
            items = summary.items_received,
            "ingest worker finished"
        );
        summary
    }
}
