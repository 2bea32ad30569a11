//! Fake sources and processors
//!
//! Every fake works on [`Probe`] items. A probe remembers where it came from and how many
//! times a processor touched it, which lets a test check exactly-once processing and
//! that nothing is returned before it was processed.

use crossbeam::channel::{self, Receiver, Sender};
use packline::{BatchProcessor, Grouping, Source};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub source: usize,
    pub grouping: usize,
    pub index: usize,
    pub passes: u32,
}

impl Probe {
    fn processed(&self) -> Self {
        Self {
            passes: self.passes + 1,
            ..self.clone()
        }
    }
}

/// Build groupings for `source` with the given item counts
pub fn probe_groupings(source: usize, sizes: &[usize]) -> Vec<Vec<Probe>> {
    sizes
        .iter()
        .enumerate()
        .map(|(grouping, &size)| {
            (0..size)
                .map(|index| Probe {
                    source,
                    grouping,
                    index,
                    passes: 0,
                })
                .collect()
        })
        .collect()
}

/// What a source should get back for `submitted`: same shape, every probe processed once
pub fn expected_returns(submitted: &[Vec<Probe>]) -> Vec<Vec<Probe>> {
    submitted
        .iter()
        .map(|grouping| grouping.iter().map(Probe::processed).collect())
        .collect()
}

/// Bookkeeping shared by the fake sources
#[derive(Debug, Default)]
struct Deliveries {
    delivered: Mutex<Vec<Grouping<Probe>>>,
    ended: AtomicBool,
    calls_after_end: AtomicUsize,
    premature: AtomicUsize,
}

impl Deliveries {
    fn pulled(&self, next: Option<Vec<Probe>>) -> Option<Vec<Probe>> {
        if self.ended.load(Ordering::SeqCst) {
            self.calls_after_end.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        if next.is_none() {
            self.ended.store(true, Ordering::SeqCst);
        }
        next
    }

    fn record(&self, grouping: Grouping<Probe>) {
        if grouping.items().iter().any(|probe| probe.passes == 0) {
            self.premature.fetch_add(1, Ordering::SeqCst);
        }
        self.delivered.lock().push(grouping);
    }

    fn delivered_items(&self) -> Vec<Vec<Probe>> {
        self.delivered
            .lock()
            .iter()
            .map(|grouping| grouping.items().to_vec())
            .collect()
    }
}

/// Source that replays a fixed list of groupings, then reports end of stream
#[derive(Debug)]
pub struct ScriptedSource {
    name: String,
    script: Mutex<VecDeque<Vec<Probe>>>,
    submitted: Vec<Vec<Probe>>,
    pull_delay: Option<Duration>,
    deliveries: Deliveries,
}

impl ScriptedSource {
    pub fn new(name: &str, groupings: Vec<Vec<Probe>>) -> Arc<Self> {
        Arc::new(Self::build(name, groupings, None))
    }

    /// Source `source` with groupings of the given sizes
    pub fn with_sizes(source: usize, sizes: &[usize]) -> Arc<Self> {
        Self::new(&format!("source-{source}"), probe_groupings(source, sizes))
    }

    /// Like [`with_sizes`](Self::with_sizes), sleeping before handing out each grouping
    pub fn slow(source: usize, sizes: &[usize], pull_delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(
            &format!("slow-source-{source}"),
            probe_groupings(source, sizes),
            Some(pull_delay),
        ))
    }

    fn build(name: &str, groupings: Vec<Vec<Probe>>, pull_delay: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(groupings.iter().cloned().collect()),
            submitted: groupings,
            pull_delay,
            deliveries: Deliveries::default(),
        }
    }

    pub fn submitted(&self) -> &[Vec<Probe>] {
        &self.submitted
    }

    pub fn expected(&self) -> Vec<Vec<Probe>> {
        expected_returns(&self.submitted)
    }

    pub fn delivered_items(&self) -> Vec<Vec<Probe>> {
        self.deliveries.delivered_items()
    }

    pub fn delivered_count(&self) -> usize {
        self.deliveries.delivered.lock().len()
    }

    pub fn has_ended(&self) -> bool {
        self.deliveries.ended.load(Ordering::SeqCst)
    }

    pub fn calls_after_end(&self) -> usize {
        self.deliveries.calls_after_end.load(Ordering::SeqCst)
    }

    pub fn premature_deliveries(&self) -> usize {
        self.deliveries.premature.load(Ordering::SeqCst)
    }

    /// Everything came back, processed exactly once, in submission order
    pub fn assert_fully_returned(&self) {
        assert_eq!(self.delivered_items(), self.expected(), "{} returns", self.name);
        assert_eq!(self.premature_deliveries(), 0, "{} premature returns", self.name);
        assert_eq!(self.calls_after_end(), 0, "{} pulled after end", self.name);
    }
}

impl Source<Probe> for ScriptedSource {
    fn next_grouping(&self) -> Option<Vec<Probe>> {
        if let Some(delay) = self.pull_delay {
            std::thread::sleep(delay);
        }
        let next = self.script.lock().pop_front();
        self.deliveries.pulled(next)
    }

    fn deliver(&self, grouping: Grouping<Probe>) {
        self.deliveries.record(grouping);
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Source fed by the test through a channel; dropping the sender ends the stream
#[derive(Debug)]
pub struct ChannelSource {
    incoming: Receiver<Vec<Probe>>,
    deliveries: Deliveries,
}

impl ChannelSource {
    pub fn new() -> (Sender<Vec<Probe>>, Arc<Self>) {
        let (sender, incoming) = channel::unbounded();
        let source = Self {
            incoming,
            deliveries: Deliveries::default(),
        };
        (sender, Arc::new(source))
    }

    pub fn delivered_items(&self) -> Vec<Vec<Probe>> {
        self.deliveries.delivered_items()
    }

    pub fn has_ended(&self) -> bool {
        self.deliveries.ended.load(Ordering::SeqCst)
    }

    pub fn premature_deliveries(&self) -> usize {
        self.deliveries.premature.load(Ordering::SeqCst)
    }
}

impl Source<Probe> for ChannelSource {
    fn next_grouping(&self) -> Option<Vec<Probe>> {
        let next = self.incoming.recv().ok();
        self.deliveries.pulled(next)
    }

    fn deliver(&self, grouping: Grouping<Probe>) {
        self.deliveries.record(grouping);
    }
}

fn process_probes(items: &mut [Probe]) {
    for probe in items.iter_mut() {
        probe.passes += 1;
    }
}

/// Processor that records the size of every batch it sees
#[derive(Debug)]
pub struct RecordingProcessor {
    capacity: AtomicUsize,
    capacity_queries: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl RecordingProcessor {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: AtomicUsize::new(capacity),
            capacity_queries: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        })
    }

    /// Change the capacity reported to batches opened from now on
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::SeqCst);
    }

    pub fn capacity_queries(&self) -> usize {
        self.capacity_queries.load(Ordering::SeqCst)
    }

    /// Batch sizes in the order processing finished
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn sorted_batch_sizes(&self) -> Vec<usize> {
        let mut sizes = self.batch_sizes();
        sizes.sort_unstable();
        sizes
    }

    pub fn batch_count(&self) -> usize {
        self.batch_sizes.lock().len()
    }
}

impl BatchProcessor<Probe> for RecordingProcessor {
    fn capacity(&self) -> usize {
        self.capacity_queries.fetch_add(1, Ordering::SeqCst);
        self.capacity.load(Ordering::SeqCst)
    }

    fn process(&self, items: &mut [Probe]) -> anyhow::Result<()> {
        process_probes(items);
        self.batch_sizes.lock().push(items.len());
        Ok(())
    }
}

/// Processor that sleeps on every batch and tracks how many batches overlap
///
/// Batches holding an item of `lagging_grouping` sleep `lag` on top of the base delay, so
/// later batches can finish before earlier ones.
#[derive(Debug)]
pub struct SlowProcessor {
    capacity: usize,
    delay: Duration,
    lagging_grouping: Option<usize>,
    lag: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    batches: AtomicUsize,
}

impl SlowProcessor {
    pub fn new(capacity: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(capacity, delay, None, Duration::ZERO))
    }

    pub fn lagging(capacity: usize, delay: Duration, grouping: usize, lag: Duration) -> Arc<Self> {
        Arc::new(Self::build(capacity, delay, Some(grouping), lag))
    }

    fn build(
        capacity: usize,
        delay: Duration,
        lagging_grouping: Option<usize>,
        lag: Duration,
    ) -> Self {
        Self {
            capacity,
            delay,
            lagging_grouping,
            lag,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl BatchProcessor<Probe> for SlowProcessor {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn process(&self, items: &mut [Probe]) -> anyhow::Result<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let lags = self
            .lagging_grouping
            .is_some_and(|grouping| items.iter().any(|probe| probe.grouping == grouping));
        std::thread::sleep(if lags { self.delay + self.lag } else { self.delay });

        process_probes(items);
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Error,
    Panic,
}

/// Processor that fails on its `fail_on`-th call (1-based) and succeeds otherwise
#[derive(Debug)]
pub struct FailingProcessor {
    capacity: usize,
    fail_on: usize,
    mode: FailureMode,
    calls: AtomicUsize,
}

impl FailingProcessor {
    pub fn new(capacity: usize, fail_on: usize, mode: FailureMode) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            fail_on,
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BatchProcessor<Probe> for FailingProcessor {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn process(&self, items: &mut [Probe]) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            match self.mode {
                FailureMode::Error => {
                    return Err(anyhow::anyhow!("solver rejected input")
                        .context(format!("batch of {} items", items.len())));
                }
                FailureMode::Panic => panic!("solver crashed on call {call}"),
            }
        }
        process_probes(items);
        Ok(())
    }
}
