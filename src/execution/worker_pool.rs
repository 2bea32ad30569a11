//! # Processing Worker Pool
//!
//! Fixed set of OS threads draining the dispatch queue. For each sealed batch a worker
//! marks it processing, runs the processing primitive over it, writes every processed
//! payload back into its grouping and bumps that grouping's solved-count. Routers are
//! woken for every grouping the batch completed, whichever batch carried its other items.
//!
//! A processing fault (error or panic) is fatal: the fault is recorded, the pipeline is
//! halted, routers are told to stop, and batches still queued are discarded.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

use crate::constants::events;
use crate::error::{PipelineError, ProcessingFault, Result};
use crate::execution::dispatch_queue::DispatchReceiver;
use crate::execution::launcher::ThreadLauncher;
use crate::execution::return_router::RouterDirectory;
use crate::execution::shutdown::ShutdownCoordinator;
use crate::execution::traits::BatchProcessor;
use crate::logging::{log_batch_operation, log_error};
use crate::models::{Batch, GroupingArena, SourceId};

/// Per-worker totals returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub batches_processed: u64,
    pub items_processed: u64,
    pub batches_discarded: u64,
}

/// Everything a processing worker shares with the rest of the pipeline
pub struct WorkerContext<T> {
    pub queue: DispatchReceiver<T>,
    pub processor: Arc<dyn BatchProcessor<T>>,
    pub arena: Arc<GroupingArena<T>>,
    pub routers: RouterDirectory<T>,
    pub coordinator: Arc<ShutdownCoordinator<T>>,
    pub faults: Arc<Mutex<Vec<ProcessingFault>>>,
}

impl<T> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            processor: Arc::clone(&self.processor),
            arena: Arc::clone(&self.arena),
            routers: self.routers.clone(),
            coordinator: Arc::clone(&self.coordinator),
            faults: Arc::clone(&self.faults),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessingWorkerPool {
    handles: Vec<(String, JoinHandle<WorkerStats>)>,
}

impl ProcessingWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn one more named worker thread
    ///
    /// On failure the workers spawned earlier stay in the pool so the caller can close
    /// the queue and [`join`](Self::join) them.
    pub fn add_worker<T: Send + 'static>(
        &mut self,
        context: &WorkerContext<T>,
        launcher: &mut ThreadLauncher,
    ) -> Result<()> {
        let worker_id = self.handles.len();
        let name = format!("packline-worker-{worker_id}");
        let worker = ProcessingWorker {
            id: worker_id,
            context: context.clone(),
            stats: WorkerStats {
                worker_id,
                ..WorkerStats::default()
            },
        };

        let handle = launcher.spawn(name.clone(), move || worker.run())?;
        self.handles.push((name, handle));
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit
    ///
    /// Workers exit on their own once the dispatch queue is closed and drained.
    pub fn join(self) -> Result<Vec<WorkerStats>> {
        let mut stats = Vec::with_capacity(self.handles.len());
        let mut panicked = None;

        for (name, handle) in self.handles {
            match handle.join() {
                Ok(worker_stats) => stats.push(worker_stats),
                Err(_) => {
                    error!(thread = %name, "processing worker panicked");
                    panicked.get_or_insert(name);
                }
            }
        }

        match panicked {
            Some(name) => Err(PipelineError::ThreadPanicked {
                role: "processing worker",
                name,
            }),
            None => Ok(stats),
        }
    }
}

struct ProcessingWorker<T> {
    id: usize,
    context: WorkerContext<T>,
    stats: WorkerStats,
}

impl<T> ProcessingWorker<T> {
    fn run(mut self) -> WorkerStats {
        debug!(worker_id = self.id, "processing worker started");

        while let Some(batch) = self.context.queue.pop() {
            if self.context.coordinator.is_halted() {
                log_batch_operation(
                    events::BATCH_DISCARDED,
                    batch.id().0,
                    batch.len(),
                    "halted",
                );
                self.stats.batches_discarded += 1;
                continue;
            }
            self.process_batch(batch);
        }

        debug!(
            worker_id = self.id,
            batches = self.stats.batches_processed,
            items = self.stats.items_processed,
            "processing worker shutdown"
        );
        self.stats
    }

    fn process_batch(&mut self, mut batch: Batch<T>) {
        let batch_id = batch.id();
        let item_count = batch.len();

        if let Err(e) = batch.begin_processing() {
            warn!(worker_id = self.id, batch_id = %batch_id, error = %e, "skipping batch");
            return;
        }
        log_batch_operation(
            events::BATCH_PROCESSING,
            batch_id.0,
            item_count,
            batch.state().as_str(),
        );

        let processor = Arc::clone(&self.context.processor);
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| processor.process(batch.payloads_mut())))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!(
                        "processor panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                });

        if let Err(e) = outcome {
            self.fail(ProcessingFault::new(batch_id, item_count, &e));
            return;
        }

        if let Err(e) = batch.finish() {
            warn!(worker_id = self.id, batch_id = %batch_id, error = %e, "batch state out of sync");
        }
        log_batch_operation(events::BATCH_DONE, batch_id.0, item_count, "done");

        let mut completed_sources = BTreeSet::new();
        for item in batch.into_work_items() {
            let Some(slot) = self.context.arena.get(item.grouping_id) else {
                warn!(
                    batch_id = %batch_id,
                    grouping_id = %item.grouping_id,
                    "processed item belongs to an unknown grouping"
                );
                continue;
            };
            if slot.record_processed(item.index, item.payload) {
                completed_sources.insert(slot.source_id());
            }
        }

        self.notify_routers(completed_sources);
        self.stats.batches_processed += 1;
        self.stats.items_processed += item_count as u64;
    }

    fn notify_routers(&self, sources: BTreeSet<SourceId>) {
        for source_id in sources {
            self.context.routers.notify(source_id);
        }
    }

    fn fail(&self, fault: ProcessingFault) {
        log_error(
            "processing_worker",
            events::BATCH_FAILED,
            &fault.message,
            Some(&format!("batch_id={} items={}", fault.batch_id, fault.item_count)),
        );
        self.context.faults.lock().push(fault);

        if self.context.coordinator.halt() {
            self.context.routers.broadcast_halt();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
