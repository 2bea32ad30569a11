//! # Thread Launcher
//!
//! Spawns the pipeline's named OS threads and counts them. A failed spawn surfaces as
//! [`PipelineError::ThreadSpawn`] so the caller can tear down what already runs.

use std::thread::{self, JoinHandle};
use tracing::error;

use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
pub struct ThreadLauncher {
    spawned: usize,
    #[cfg(test)]
    fail_at: Option<usize>,
}

impl ThreadLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose spawn number `fail_at` (0-based) fails
    #[cfg(test)]
    pub(crate) fn failing_at(fail_at: usize) -> Self {
        Self {
            spawned: 0,
            fail_at: Some(fail_at),
        }
    }

    pub fn spawn<R, F>(&mut self, name: String, f: F) -> Result<JoinHandle<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        #[cfg(test)]
        if self.fail_at == Some(self.spawned) {
            return Err(spawn_failed(name, "injected spawn failure"));
        }

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|e| spawn_failed(name, &e.to_string()))?;
        self.spawned += 1;
        Ok(handle)
    }

    /// Threads spawned so far
    pub fn spawned(&self) -> usize {
        self.spawned
    }
}

fn spawn_failed(name: String, message: &str) -> PipelineError {
    error!(thread = %name, error = message, "failed to spawn thread");
    PipelineError::ThreadSpawn {
        name,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawns_named_threads() {
        let mut launcher = ThreadLauncher::new();
        let handle = launcher
            .spawn("packline-test".to_string(), || {
                thread::current().name().map(str::to_string)
            })
            .unwrap();

        assert_eq!(handle.join().unwrap().as_deref(), Some("packline-test"));
        assert_eq!(launcher.spawned(), 1);
    }

    #[test]
    fn test_injected_failure_hits_requested_spawn() {
        let mut launcher = ThreadLauncher::failing_at(1);
        let first = launcher.spawn("first".to_string(), || 1).unwrap();

        let second = launcher.spawn("second".to_string(), || 2);
        assert!(matches!(
            second,
            Err(PipelineError::ThreadSpawn { ref name, .. }) if name == "second"
        ));
        assert_eq!(launcher.spawned(), 1);
        assert_eq!(first.join().unwrap(), 1);
    }
}
