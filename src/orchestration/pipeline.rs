//! # Pipeline
//!
//! Wires the execution components together and owns their threads: one ingest worker
//! and one return router per source, plus a fixed pool of processing workers.
//!
//! ```rust,no_run
//! use packline::{BatchProcessor, Pipeline, PipelineConfig, Source};
//! use std::sync::Arc;
//!
//! struct Squarer;
//!
//! impl BatchProcessor<u64> for Squarer {
//!     fn capacity(&self) -> usize {
//!         16
//!     }
//!
//!     fn process(&self, items: &mut [u64]) -> anyhow::Result<()> {
//!         items.iter_mut().for_each(|n| *n *= *n);
//!         Ok(())
//!     }
//! }
//!
//! # fn example(source: Arc<impl Source<u64> + 'static>) -> packline::Result<()> {
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), Squarer);
//! pipeline.add_source(source)?;
//! pipeline.start(4)?;
//! let report = pipeline.stop()?;
//! println!("{} groupings returned", report.groupings_delivered);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{ConfigurationError, PipelineError, ProcessingFault, Result};
use crate::execution::{
    dispatch_queue, BatchAssembler, BatchProcessor, DispatchReceiver, IngestSummary,
    IngestWorker, ProcessingWorkerPool, ReturnRouter, RouterDirectory, RouterEvent,
    RouterSummary, ShutdownCoordinator, Source, ThreadLauncher, WorkerContext,
};
use crate::models::{GroupingArena, SourceId};

use super::report::{PipelineReport, SourceReport};

pub struct Pipeline<T> {
    config: PipelineConfig,
    processor: Arc<dyn BatchProcessor<T>>,
    sources: Vec<Arc<dyn Source<T>>>,
    running: Option<RunningPipeline<T>>,
    started: bool,
    #[cfg(test)]
    fail_spawn_at: Option<usize>,
}

struct SourceThread<R> {
    source_id: SourceId,
    name: String,
    handle: JoinHandle<R>,
}

/// State shared by every thread of one run
struct RunShared<T> {
    arena: Arc<GroupingArena<T>>,
    assembler: Arc<BatchAssembler<T>>,
    coordinator: Arc<ShutdownCoordinator<T>>,
    faults: Arc<Mutex<Vec<ProcessingFault>>>,
}

/// Threads launched so far by `start`
struct Launch<T> {
    routers: Vec<SourceThread<RouterSummary>>,
    router_senders: Vec<Sender<RouterEvent<T>>>,
    workers: ProcessingWorkerPool,
    ingest: Vec<SourceThread<IngestSummary>>,
}

impl<T> Launch<T> {
    fn new(source_count: usize) -> Self {
        Self {
            routers: Vec::with_capacity(source_count),
            router_senders: Vec::with_capacity(source_count),
            workers: ProcessingWorkerPool::new(),
            ingest: Vec::with_capacity(source_count),
        }
    }

    /// Stop and join every router and worker after a failed start
    ///
    /// Ingest threads cannot be interrupted inside `next_grouping`; they are left to see
    /// the halt flag after their current pull and exit on their own.
    fn abort(self, shared: &RunShared<T>) {
        shared.coordinator.halt();
        RouterDirectory::new(self.router_senders).broadcast_halt();
        shared.assembler.flush_partial();

        if let Err(e) = self.workers.join() {
            warn!(error = %e, "processing worker failed during aborted start");
        }
        for router in self.routers {
            if router.handle.join().is_err() {
                warn!(source = %router.name, "return router panicked during aborted start");
            }
        }
        if !self.ingest.is_empty() {
            warn!(
                ingest_workers = self.ingest.len(),
                "ingest workers left to finish their current pull"
            );
        }
    }
}

struct RunningPipeline<T> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    worker_count: usize,
    ingest: Vec<SourceThread<IngestSummary>>,
    routers: Vec<SourceThread<RouterSummary>>,
    workers: ProcessingWorkerPool,
    assembler: Arc<BatchAssembler<T>>,
    faults: Arc<Mutex<Vec<ProcessingFault>>>,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn new<P>(config: PipelineConfig, processor: P) -> Self
    where
        P: BatchProcessor<T> + 'static,
    {
        Self::with_shared_processor(config, Arc::new(processor))
    }

    pub fn with_shared_processor(
        config: PipelineConfig,
        processor: Arc<dyn BatchProcessor<T>>,
    ) -> Self {
        Self {
            config,
            processor,
            sources: Vec::new(),
            running: None,
            started: false,
            #[cfg(test)]
            fail_spawn_at: None,
        }
    }

    /// Register a source. Only allowed before [`start`](Self::start).
    pub fn add_source<S>(&mut self, source: Arc<S>) -> Result<SourceId>
    where
        S: Source<T> + 'static,
    {
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }
        let source_id = SourceId(self.sources.len());
        self.sources.push(source);
        Ok(source_id)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn launcher(&self) -> ThreadLauncher {
        #[cfg(test)]
        if let Some(fail_at) = self.fail_spawn_at {
            return ThreadLauncher::failing_at(fail_at);
        }
        ThreadLauncher::new()
    }

    /// Spawn every thread and start pulling from the registered sources
    ///
    /// If a thread fails to spawn, everything already launched is halted and torn down
    /// before the error is returned. The pipeline can be started again unless an ingest
    /// worker had already begun pulling from its source.
    pub fn start(&mut self, worker_count: usize) -> Result<()> {
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }

        let config = PipelineConfig {
            worker_count,
            ..self.config.clone()
        };
        config.validate()?;
        let processor_capacity = self.processor.capacity();
        if processor_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "processor.capacity",
                processor_capacity,
                "processor must accept at least one item per batch",
            )
            .into());
        }
        self.started = true;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let (dispatch_sender, dispatch) = dispatch_queue();
        let assembler = Arc::new(BatchAssembler::new(
            Arc::clone(&self.processor),
            config.clone(),
            dispatch_sender,
        ));
        let shared = RunShared {
            arena: Arc::new(GroupingArena::new()),
            coordinator: Arc::new(ShutdownCoordinator::new(
                self.sources.len(),
                Arc::clone(&assembler),
            )),
            assembler,
            faults: Arc::new(Mutex::new(Vec::new())),
        };

        let mut launch = Launch::new(self.sources.len());
        let mut launcher = self.launcher();
        if let Err(e) = self.launch(&mut launch, &mut launcher, worker_count, &shared, dispatch) {
            error!(
                run_id = %run_id,
                spawned = launcher.spawned(),
                error = %e,
                "pipeline start failed, tearing down launched threads"
            );
            self.started = !launch.ingest.is_empty();
            launch.abort(&shared);
            return Err(e);
        }

        shared.coordinator.drain_if_idle();

        info!(
            run_id = %run_id,
            sources = self.sources.len(),
            worker_count,
            processor_capacity,
            batch_capacity = ?config.batch_capacity,
            "pipeline started"
        );

        let Launch {
            routers,
            router_senders,
            workers,
            ingest,
        } = launch;
        // Routers hear only from their ingest worker and the processing workers from here on
        drop(router_senders);

        self.running = Some(RunningPipeline {
            run_id,
            started_at,
            worker_count,
            ingest,
            routers,
            workers,
            assembler: shared.assembler,
            faults: shared.faults,
        });
        Ok(())
    }

    /// Spawn routers, then processing workers, then ingest workers
    fn launch(
        &self,
        launch: &mut Launch<T>,
        launcher: &mut ThreadLauncher,
        worker_count: usize,
        shared: &RunShared<T>,
        dispatch: DispatchReceiver<T>,
    ) -> Result<()> {
        for (index, source) in self.sources.iter().enumerate() {
            let source_id = SourceId(index);
            let (router, sender) =
                ReturnRouter::new(source_id, Arc::clone(source), Arc::clone(&shared.arena));
            let handle = launcher.spawn(format!("packline-router-{index}"), move || router.run())?;
            launch.routers.push(SourceThread {
                source_id,
                name: source.name(),
                handle,
            });
            launch.router_senders.push(sender);
        }

        let context = WorkerContext {
            queue: dispatch,
            processor: Arc::clone(&self.processor),
            arena: Arc::clone(&shared.arena),
            routers: RouterDirectory::new(launch.router_senders.clone()),
            coordinator: Arc::clone(&shared.coordinator),
            faults: Arc::clone(&shared.faults),
        };
        for _ in 0..worker_count {
            launch.workers.add_worker(&context, launcher)?;
        }
        info!(worker_count, "processing worker pool started");

        for (index, source) in self.sources.iter().enumerate() {
            let source_id = SourceId(index);
            let worker = IngestWorker::new(
                source_id,
                Arc::clone(source),
                Arc::clone(&shared.arena),
                Arc::clone(&shared.assembler),
                launch.router_senders[index].clone(),
                Arc::clone(&shared.coordinator),
            );
            let handle = launcher.spawn(format!("packline-ingest-{index}"), move || worker.run())?;
            launch.ingest.push(SourceThread {
                source_id,
                name: source.name(),
                handle,
            });
        }
        Ok(())
    }

    /// Block until every source is exhausted and all work has drained
    ///
    /// Returns the run report, or `ProcessingFailed` listing every batch the processing
    /// primitive failed on.
    pub fn stop(&mut self) -> Result<PipelineReport> {
        let run = self.running.take().ok_or(PipelineError::NotStarted)?;
        let mut panicked: Option<PipelineError> = None;

        let ingest: Vec<_> = run
            .ingest
            .into_iter()
            .map(|thread| {
                let summary = join_source_thread(
                    thread.handle,
                    "ingest worker",
                    &thread.name,
                    &mut panicked,
                );
                (thread.source_id, thread.name, summary)
            })
            .collect();

        let worker_stats = match run.workers.join() {
            Ok(stats) => stats,
            Err(e) => {
                panicked.get_or_insert(e);
                Vec::new()
            }
        };

        let delivered: Vec<RouterSummary> = run
            .routers
            .into_iter()
            .map(|thread| {
                join_source_thread(thread.handle, "return router", &thread.name, &mut panicked)
            })
            .collect();

        let sources: Vec<SourceReport> = ingest
            .into_iter()
            .zip(delivered)
            .map(|((source_id, name, received), returned)| SourceReport {
                source_id,
                name,
                groupings_received: received.groupings_received,
                items_received: received.items_received,
                groupings_delivered: returned.groupings_delivered,
                items_delivered: returned.items_delivered,
            })
            .collect();

        let assembler_stats = run.assembler.stats();
        let report = PipelineReport {
            run_id: run.run_id,
            started_at: run.started_at,
            finished_at: Utc::now(),
            worker_count: run.worker_count,
            batches_dispatched: assembler_stats.batches_dispatched,
            partial_batches: assembler_stats.partial_batches,
            batches_processed: worker_stats.iter().map(|s| s.batches_processed).sum(),
            items_processed: worker_stats.iter().map(|s| s.items_processed).sum(),
            groupings_delivered: sources.iter().map(|s| s.groupings_delivered).sum(),
            sources,
        };

        info!(
            run_id = %report.run_id,
            report = %serde_json::to_string(&report).unwrap_or_default(),
            "pipeline stopped"
        );

        let faults = std::mem::take(&mut *run.faults.lock());
        if !faults.is_empty() {
            error!(run_id = %report.run_id, faults = faults.len(), "pipeline run failed");
            return Err(PipelineError::ProcessingFailed { faults });
        }
        if let Some(e) = panicked {
            return Err(e);
        }
        Ok(report)
    }

    /// Start, then block until the run completes
    pub fn run(&mut self, worker_count: usize) -> Result<PipelineReport> {
        self.start(worker_count)?;
        self.stop()
    }
}

fn join_source_thread<R: Default>(
    handle: JoinHandle<R>,
    role: &'static str,
    name: &str,
    panicked: &mut Option<PipelineError>,
) -> R {
    handle.join().unwrap_or_else(|_| {
        error!(role, source = %name, "thread panicked");
        panicked.get_or_insert(PipelineError::ThreadPanicked {
            role,
            name: name.to_string(),
        });
        R::default()
    })
}
