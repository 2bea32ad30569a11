//! # Pipeline Configuration
//!
//! Layered configuration loading through the `config` crate: built-in defaults, then an
//! optional file (format picked from its extension), then `PACKLINE_*` environment
//! variables.
//!
//! ```rust,no_run
//! use packline::config::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load()?;
//! println!("running {} processing workers", config.worker_count);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::constants::system;
use crate::error::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Number of processing worker threads
    pub worker_count: usize,

    /// Upper bound on batch size; the processor's own capacity applies when unset
    #[serde(default)]
    pub batch_capacity: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(system::FALLBACK_WORKER_COUNT),
            batch_capacity: None,
        }
    }
}

impl PipelineConfig {
    /// Load defaults overridden by `PACKLINE_*` environment variables
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::build(None)
    }

    /// Load a configuration file, still overridable by environment variables
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("worker_count", defaults.worker_count as u64)?;

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading pipeline configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: PipelineConfig = builder
            .add_source(
                config::Environment::with_prefix(system::CONFIG_ENV_PREFIX).try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(
            worker_count = config.worker_count,
            batch_capacity = ?config.batch_capacity,
            "Pipeline configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.worker_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_count",
                self.worker_count,
                "at least one processing worker is required",
            ));
        }

        if self.batch_capacity == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "batch_capacity",
                0,
                "batches must hold at least one item",
            ));
        }

        Ok(())
    }

    /// Capacity of a new batch given what the processor currently offers
    pub fn effective_capacity(&self, processor_capacity: usize) -> usize {
        match self.batch_capacity {
            Some(limit) => processor_capacity.min(limit),
            None => processor_capacity,
        }
    }
}
