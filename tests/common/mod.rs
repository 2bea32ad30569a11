//! Shared fakes and strategies for the integration and property tests

#![allow(dead_code)] // Each test binary uses a different subset

pub mod fakes;
pub mod strategies;

pub use fakes::*;
pub use strategies::*;

use packline::{BatchProcessor, Pipeline, PipelineConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn test_config(worker_count: usize) -> PipelineConfig {
    PipelineConfig {
        worker_count,
        batch_capacity: None,
    }
}

/// Pipeline over [`Probe`] items that shares `processor` with the test
pub fn probe_pipeline<P>(config: PipelineConfig, processor: Arc<P>) -> Pipeline<Probe>
where
    P: BatchProcessor<Probe> + 'static,
{
    Pipeline::with_shared_processor(config, processor)
}

/// Poll `condition` until it holds, panicking after `timeout`
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        std::thread::sleep(Duration::from_millis(2));
    }
}
