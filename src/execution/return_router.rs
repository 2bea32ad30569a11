//! # Return Router
//!
//! One router per source. The router thread exclusively owns that source's FIFO of
//! in-flight groupings and is driven by [`RouterEvent`]s on its own channel:
//!
//! - its ingest worker announces each grouping *before* submitting any of its items
//! - processing workers signal when a grouping of this source became fully processed
//! - the ingest worker signals end of stream
//!
//! After every event the router releases heads of the FIFO for as long as they are fully
//! processed, so one burst of completions can return several groupings in arrival order.
//! It exits once its source is exhausted and the FIFO is empty.

use crossbeam::channel::{self, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::constants::{events, GroupingState};
use crate::execution::traits::Source;
use crate::models::{GroupingArena, GroupingSlot, SourceId};

pub enum RouterEvent<T> {
    /// A grouping arrived from the source; it is appended to the FIFO
    Enqueued(Arc<GroupingSlot<T>>),
    /// At least one grouping of this source became fully processed
    Progress,
    /// The source reached end of stream
    SourceExhausted,
    /// A processing fault stopped the pipeline
    Halt,
}

/// Senders to every router, indexed by source
pub struct RouterDirectory<T> {
    senders: Vec<Sender<RouterEvent<T>>>,
}

impl<T> Clone for RouterDirectory<T> {
    fn clone(&self) -> Self {
        Self {
            senders: self.senders.clone(),
        }
    }
}

impl<T> RouterDirectory<T> {
    pub fn new(senders: Vec<Sender<RouterEvent<T>>>) -> Self {
        Self { senders }
    }

    /// Wake the router of `source_id` to re-check its FIFO head
    pub fn notify(&self, source_id: SourceId) {
        if let Some(sender) = self.senders.get(source_id.0) {
            // A router that already exited has nothing left to deliver
            let _ = sender.send(RouterEvent::Progress);
        }
    }

    pub fn broadcast_halt(&self) {
        for sender in &self.senders {
            let _ = sender.send(RouterEvent::Halt);
        }
    }
}

/// Outcome of one router's run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterSummary {
    pub groupings_delivered: u64,
    pub items_delivered: u64,
    /// Groupings still queued when the router stopped early
    pub groupings_abandoned: u64,
}

pub struct ReturnRouter<T> {
    source_id: SourceId,
    source: Arc<dyn Source<T>>,
    arena: Arc<GroupingArena<T>>,
    events: Receiver<RouterEvent<T>>,
    fifo: VecDeque<Arc<GroupingSlot<T>>>,
    source_exhausted: bool,
    summary: RouterSummary,
}

impl<T> ReturnRouter<T> {
    /// Create a router together with the sender its ingest worker and the processing
    /// workers use to reach it
    pub fn new(
        source_id: SourceId,
        source: Arc<dyn Source<T>>,
        arena: Arc<GroupingArena<T>>,
    ) -> (Self, Sender<RouterEvent<T>>) {
        let (sender, events) = channel::unbounded();
        let router = Self {
            source_id,
            source,
            arena,
            events,
            fifo: VecDeque::new(),
            source_exhausted: false,
            summary: RouterSummary::default(),
        };
        (router, sender)
    }

    pub fn run(mut self) -> RouterSummary {
        debug!(source_id = %self.source_id, "return router started");

        loop {
            let Ok(event) = self.events.recv() else {
                // Every sender is gone; nothing can complete the remaining groupings
                if !self.fifo.is_empty() {
                    warn!(
                        source_id = %self.source_id,
                        pending = self.fifo.len(),
                        "router channel closed with groupings still pending"
                    );
                }
                break;
            };

            match event {
                RouterEvent::Enqueued(slot) => {
                    trace!(
                        operation = events::GROUPING_ENQUEUED,
                        source_id = %self.source_id,
                        grouping_id = %slot.id(),
                        total = slot.total(),
                        state = %GroupingState::Enqueued,
                        "grouping tracked"
                    );
                    self.fifo.push_back(slot);
                }
                RouterEvent::Progress => {}
                RouterEvent::SourceExhausted => self.source_exhausted = true,
                RouterEvent::Halt => {
                    warn!(
                        source_id = %self.source_id,
                        pending = self.fifo.len(),
                        "router stopping on pipeline halt"
                    );
                    break;
                }
            }

            self.release_ready();

            if self.source_exhausted && self.fifo.is_empty() {
                break;
            }
        }

        self.summary.groupings_abandoned = self.fifo.len() as u64;
        debug!(
            source_id = %self.source_id,
            delivered = self.summary.groupings_delivered,
            abandoned = self.summary.groupings_abandoned,
            "return router finished"
        );
        self.summary
    }

    /// Deliver fully processed groupings from the head of the FIFO
    fn release_ready(&mut self) {
        while let Some(head) = self.fifo.front() {
            if !head.is_fully_processed() {
                trace!(
                    source_id = %self.source_id,
                    grouping_id = %head.id(),
                    solved = head.solved_count(),
                    total = head.total(),
                    "head grouping not ready"
                );
                return;
            }

            let Some(grouping) = head.take_grouping() else {
                return;
            };
            let grouping_id = grouping.id();
            let item_count = grouping.len();
            trace!(
                operation = events::GROUPING_READY,
                source_id = %self.source_id,
                grouping_id = %grouping_id,
                state = %GroupingState::Ready,
                "head grouping ready"
            );

            self.fifo.pop_front();
            self.arena.release(grouping_id);
            self.source.deliver(grouping);

            self.summary.groupings_delivered += 1;
            self.summary.items_delivered += item_count as u64;
            debug!(
                operation = events::GROUPING_RETURNED,
                source_id = %self.source_id,
                grouping_id = %grouping_id,
                item_count,
                state = %GroupingState::Returned,
                "grouping returned to source"
            );
        }
    }
}
