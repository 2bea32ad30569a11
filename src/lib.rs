#![allow(clippy::doc_markdown)] // Allow technical terms like FIFO, OnceLock in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Packline
//!
//! Concurrent batching pipeline that turns many small, independent units of work into
//! fixed-size batches for an expensive batch-processing primitive, then hands results
//! back to their producers in the order they were submitted.
//!
//! ## Overview
//!
//! Several **sources** each produce an ordered stream of **groupings** (small lists of
//! items). Items from every source are interleaved into shared **batches** sized to the
//! processor's capacity. A pool of processing workers runs the primitive on whole
//! batches, and each source gets its groupings back, fully processed, in exactly the
//! order it produced them.
//!
//! ## Architecture
//!
//! ```text
//! Source -> IngestWorker -> BatchAssembler -> DispatchQueue -> ProcessingWorker
//!        <- ReturnRouter  <------------- completion counters <-------'
//! ```
//!
//! Every stage runs on its own OS thread and talks to the next through `crossbeam`
//! channels. Per-grouping completion counters are lock-free atomics; the only lock on
//! the hot path is the assembler's open batch.
//!
//! ## Key Features
//!
//! - **Order preservation**: groupings return per source in submission order
//! - **Dense batches**: every dispatched batch is full except possibly the last one
//! - **Clean shutdown**: the partial batch is flushed once every source is exhausted
//! - **Fault containment**: the first processing failure halts the run and is reported
//!
//! ## Module Organization
//!
//! - [`models`] - Groupings, work items, batches and the grouping arena
//! - [`execution`] - Ingest, assembly, dispatch, processing, return and shutdown
//! - [`orchestration`] - The [`Pipeline`] lifecycle and its run report
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`constants`] - Lifecycle states and log event names
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use packline::{BatchProcessor, Grouping, Pipeline, PipelineConfig, Source};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! struct Doubler;
//!
//! impl BatchProcessor<i64> for Doubler {
//!     fn capacity(&self) -> usize {
//!         64
//!     }
//!
//!     fn process(&self, items: &mut [i64]) -> anyhow::Result<()> {
//!         items.iter_mut().for_each(|n| *n *= 2);
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Numbers {
//!     pending: Mutex<Vec<Vec<i64>>>,
//!     returned: Mutex<Vec<Grouping<i64>>>,
//! }
//!
//! impl Source<i64> for Numbers {
//!     fn next_grouping(&self) -> Option<Vec<i64>> {
//!         self.pending.lock().pop()
//!     }
//!
//!     fn deliver(&self, grouping: Grouping<i64>) {
//!         self.returned.lock().push(grouping);
//!     }
//! }
//!
//! # fn main() -> packline::Result<()> {
//! packline::init_structured_logging();
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::load()?, Doubler);
//! pipeline.add_source(Arc::new(Numbers::default()))?;
//! let report = pipeline.run(4)?;
//! assert!(report.all_delivered());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                      # Unit tests
//! cargo test                            # All tests
//! cargo bench --features benchmarks     # Criterion benchmarks
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;

pub use config::PipelineConfig;
pub use constants::{BatchState, GroupingState};
pub use error::{ConfigurationError, PipelineError, ProcessingFault, Result};
pub use execution::{BatchProcessor, Source};
pub use logging::init_structured_logging;
pub use models::{BatchId, Grouping, GroupingId, SourceId};
pub use orchestration::{Pipeline, PipelineReport, SourceReport};
