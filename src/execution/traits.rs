//! # Collaborator Traits
//!
//! The two external collaborators of the pipeline: the sources that produce and consume
//! groupings, and the bulk processing primitive that works through whole batches.
//! Hosts supply concrete implementations; the pipeline only talks to these traits.

use crate::models::Grouping;

/// Producer and consumer of groupings of work
///
/// Each registered source gets exactly one ingest thread calling
/// [`next_grouping`](Source::next_grouping) and exactly one return router calling
/// [`deliver`](Source::deliver), so implementations only need to be safe for one
/// caller of each method at a time.
pub trait Source<T>: Send + Sync {
    /// Block until the next grouping is available
    ///
    /// # Returns
    ///
    /// * `Some(items)` - The items of the next grouping, in order
    /// * `None` - End of stream. Returned exactly once; the pipeline never calls again
    fn next_grouping(&self) -> Option<Vec<T>>;

    /// Hand a fully processed grouping back to the source
    ///
    /// Called once per grouping, in the order the groupings were produced.
    fn deliver(&self, grouping: Grouping<T>);

    /// Name used in log records
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Bulk processing primitive invoked once per batch
pub trait BatchProcessor<T>: Send + Sync {
    /// Number of items a freshly opened batch may hold
    ///
    /// Queried every time the pipeline opens a new batch, so implementations backed by
    /// a pool of solver instances may report different capacities over time.
    fn capacity(&self) -> usize;

    /// Process every item of a sealed batch in place
    ///
    /// # Arguments
    ///
    /// * `items` - Payloads of the batch; each slot holds that item's outcome afterwards
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every item was processed
    /// * `Err` - The batch failed; the pipeline halts and reports the fault from `stop()`
    fn process(&self, items: &mut [T]) -> anyhow::Result<()>;
}
