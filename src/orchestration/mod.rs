//! # Orchestration
//!
//! Host-facing entry point: register sources, start the pipeline with a worker count,
//! and stop it, which blocks until every grouping has been returned.

pub mod pipeline;
pub mod report;

pub use pipeline::Pipeline;
pub use report::{PipelineReport, SourceReport};
