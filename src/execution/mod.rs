//! # Execution
//!
//! The moving parts of the pipeline, leaf first:
//!
//! ```text
//! Source -> IngestWorker -> BatchAssembler -> DispatchQueue -> ProcessingWorker
//!        <- ReturnRouter  <------------- completion counters <-------'
//! ```
//!
//! [`ShutdownCoordinator`] watches source exhaustion and closes the dispatch queue once
//! no source can send more work.

pub mod assembler;
pub mod dispatch_queue;
pub mod ingest;
pub mod launcher;
pub mod return_router;
pub mod shutdown;
pub mod traits;
pub mod worker_pool;

pub use assembler::{AssemblerStats, BatchAssembler};
pub use dispatch_queue::{dispatch_queue, DispatchReceiver, DispatchSender};
pub use ingest::{IngestSummary, IngestWorker};
pub use launcher::ThreadLauncher;
pub use return_router::{ReturnRouter, RouterDirectory, RouterEvent, RouterSummary};
pub use shutdown::ShutdownCoordinator;
pub use traits::{BatchProcessor, Source};
pub use worker_pool::{ProcessingWorkerPool, WorkerContext, WorkerStats};
