//! # Dispatch Queue
//!
//! Blocking multi-producer/multi-consumer hand-off of sealed batches from the assembler
//! to the processing workers, backed by an unbounded crossbeam channel.
//!
//! Termination is carried by the channel itself: once the last [`DispatchSender`] is
//! dropped, [`DispatchReceiver::pop`] keeps returning queued batches and then reports
//! "no more work" instead of blocking forever.

use crossbeam::channel::{self, Receiver, Sender};
use tracing::trace;

use crate::constants::BatchState;
use crate::error::{PipelineError, Result};
use crate::models::Batch;

/// Create a connected sender/receiver pair
pub fn dispatch_queue<T>() -> (DispatchSender<T>, DispatchReceiver<T>) {
    let (sender, receiver) = channel::unbounded();
    (DispatchSender { sender }, DispatchReceiver { receiver })
}

#[derive(Debug)]
pub struct DispatchSender<T> {
    sender: Sender<Batch<T>>,
}

impl<T> DispatchSender<T> {
    /// Enqueue a sealed batch and wake one waiting worker. Never blocks.
    pub fn push(&self, batch: Batch<T>) -> Result<()> {
        if batch.state() != BatchState::Sealed {
            return Err(PipelineError::invalid_state(format!(
                "only sealed batches can be dispatched, batch {} is {}",
                batch.id(),
                batch.state()
            )));
        }

        let batch_id = batch.id();
        self.sender.send(batch).map_err(|_| {
            PipelineError::invalid_state(format!(
                "dispatch queue has no workers left to receive batch {batch_id}"
            ))
        })?;
        trace!(batch_id = %batch_id, "batch pushed to dispatch queue");
        Ok(())
    }
}

#[derive(Debug)]
pub struct DispatchReceiver<T> {
    receiver: Receiver<Batch<T>>,
}

impl<T> Clone for DispatchReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> DispatchReceiver<T> {
    /// Block until a batch is available
    ///
    /// # Returns
    ///
    /// * `Some(batch)` - The next sealed batch, in dispatch order
    /// * `None` - The queue is closed and drained; no more work will arrive
    pub fn pop(&self) -> Option<Batch<T>> {
        self.receiver.recv().ok()
    }

    /// Batches currently waiting for a worker
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchId, GroupingId, WorkItem};

    fn sealed_batch(id: u64, items: usize) -> Batch<u32> {
        let mut batch = Batch::new(BatchId(id), items.max(1));
        for index in 0..items {
            batch
                .push(WorkItem {
                    grouping_id: GroupingId(0),
                    index,
                    payload: index as u32,
                })
                .unwrap();
        }
        batch.seal().unwrap();
        batch
    }

    #[test]
    fn test_pop_preserves_dispatch_order() {
        let (sender, receiver) = dispatch_queue();
        sender.push(sealed_batch(0, 1)).unwrap();
        sender.push(sealed_batch(1, 2)).unwrap();

        assert_eq!(receiver.len(), 2);
        assert_eq!(receiver.pop().unwrap().id(), BatchId(0));
        assert_eq!(receiver.pop().unwrap().id(), BatchId(1));
        assert!(receiver.is_empty());
    }

    #[test]
    fn test_closed_queue_drains_then_reports_no_more_work() {
        let (sender, receiver) = dispatch_queue();
        sender.push(sealed_batch(7, 3)).unwrap();
        drop(sender);

        assert_eq!(receiver.pop().unwrap().len(), 3);
        assert!(receiver.pop().is_none());
        assert!(receiver.pop().is_none());
    }

    #[test]
    fn test_open_batch_is_rejected() {
        let (sender, receiver) = dispatch_queue::<u32>();
        let batch = Batch::new(BatchId(0), 2);

        assert!(sender.push(batch).is_err());
        assert!(receiver.is_empty());
    }

    #[test]
    fn test_push_fails_once_every_worker_is_gone() {
        let (sender, receiver) = dispatch_queue::<u32>();
        drop(receiver);

        let err = sender.push(sealed_batch(4, 2)).unwrap_err();
        assert!(err.to_string().contains("no workers left"));
    }

    #[test]
    fn test_blocked_workers_wake_on_close() {
        let (sender, receiver) = dispatch_queue::<u32>();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let receiver = receiver.clone();
                std::thread::spawn(move || {
                    let mut seen = 0;
                    while receiver.pop().is_some() {
                        seen += 1;
                    }
                    seen
                })
            })
            .collect();

        for id in 0..10 {
            sender.push(sealed_batch(id, 1)).unwrap();
        }
        drop(sender);

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 10);
    }
}
