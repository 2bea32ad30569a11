//! # Pipeline Error Types
//!
//! Structured error handling for the batching pipeline using thiserror.
//!
//! Only processing faults are runtime failures. Everything else in here is a lifecycle
//! misuse by the host (starting twice, stopping before start) or a configuration problem
//! detected before any thread is spawned.

use std::fmt;
use thiserror::Error;

use crate::models::BatchId;

/// Top-level error returned by the pipeline host API
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Pipeline not started")]
    NotStarted,

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Aggregate of every batch that failed before the pipeline halted
    #[error("Processing failed for {} batch(es): {}", .faults.len(), FaultList(.faults))]
    ProcessingFailed { faults: Vec<ProcessingFault> },

    #[error("{role} thread '{name}' panicked")]
    ThreadPanicked { role: &'static str, name: String },

    #[error("Failed to spawn thread '{name}': {message}")]
    ThreadSpawn { name: String, message: String },
}

impl PipelineError {
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Faults carried by a `ProcessingFailed` error, empty for every other variant
    pub fn faults(&self) -> &[ProcessingFault] {
        match self {
            Self::ProcessingFailed { faults } => faults,
            _ => &[],
        }
    }
}

/// A single batch the processing primitive failed on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("batch {batch_id} ({item_count} items): {message}")]
pub struct ProcessingFault {
    pub batch_id: BatchId,
    pub item_count: usize,
    pub message: String,
}

impl ProcessingFault {
    pub fn new(batch_id: BatchId, item_count: usize, error: &anyhow::Error) -> Self {
        Self {
            batch_id,
            item_count,
            // Alternate formatting keeps the whole context chain
            message: format!("{error:#}"),
        }
    }
}

struct FaultList<'a>(&'a [ProcessingFault]);

impl fmt::Display for FaultList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fault) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{fault}")?;
        }
        Ok(())
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    #[error("Failed to load configuration: {error}")]
    LoadFailed { error: String },
}

impl ConfigurationError {
    pub fn invalid_value<F, V, C>(field: F, value: V, context: C) -> Self
    where
        F: Into<String>,
        V: ToString,
        C: Into<String>,
    {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::LoadFailed {
            error: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
