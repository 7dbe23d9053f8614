//! Raw counter sources the derived statistics are computed from.
//!
//! The cache and its tiers own these; the registry only reads them. Counter reads are
//! atomic loads, latency events sit in a bounded ring read through a per-reader cursor so
//! several registrations over the same operation never steal each other's samples.

use crate::errors::MgmtError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome classification of one cache operation (e.g. get -> hit/miss).
pub trait OperationOutcome: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Dense index in `0..values().len()`, below 64.
    fn ordinal(self) -> usize;
    fn values() -> &'static [Self];
}

/// Type-erased set of outcomes, one bit per ordinal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OutcomeSet(u64);

impl OutcomeSet {
    pub fn of<O: OperationOutcome>(outcomes: &[O]) -> Self {
        Self(outcomes.iter().fold(0u64, |bits, o| bits | (1u64 << o.ordinal())))
    }

    pub fn all<O: OperationOutcome>() -> Self {
        Self::of(O::values())
    }

    pub fn contains_ordinal(self, ordinal: usize) -> bool {
        ordinal < 64 && self.0 & (1u64 << ordinal) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

/// Latency events observed after a cursor, restricted to an outcome set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LatencyWindow {
    /// Pass this back on the next read.
    pub cursor: u64,
    pub durations_nanos: Vec<u64>,
}

/// An outcome-classified operation counter.
pub trait OperationSource: Send + Sync {
    fn operation(&self) -> &str;
    fn current_count(&self, outcomes: OutcomeSet) -> Result<u64, MgmtError>;
    fn latency_since(&self, cursor: u64, outcomes: OutcomeSet) -> Result<LatencyWindow, MgmtError>;
    /// Position of the newest latency event; a fresh reader starts here.
    fn latency_cursor(&self) -> u64;
}

/// A single numeric gauge (mapping count, occupied bytes, ...).
pub trait GaugeSource: Send + Sync {
    fn value(&self) -> Result<u64, MgmtError>;
}

impl<F> GaugeSource for F
where
    F: Fn() -> Result<u64, MgmtError> + Send + Sync,
{
    fn value(&self) -> Result<u64, MgmtError> {
        self()
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new(initial: u64) -> Self {
        Self { value: AtomicU64::new(initial) }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn sub(&self, v: u64) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| Some(cur.saturating_sub(v)));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl GaugeSource for Gauge {
    fn value(&self) -> Result<u64, MgmtError> {
        Ok(self.get())
    }
}

#[derive(Debug)]
struct LatencyEvent {
    seq: u64,
    ordinal: usize,
    nanos: u64,
}

#[derive(Debug)]
struct LatencyRing {
    events: VecDeque<LatencyEvent>,
    last_seq: u64,
    capacity: usize,
}

/// In-memory [`OperationSource`] with one atomic counter per outcome.
#[derive(Debug)]
pub struct OperationStatistic<O: OperationOutcome> {
    operation: String,
    counts: Vec<AtomicU64>,
    latencies: Mutex<LatencyRing>,
    _outcome: PhantomData<fn() -> O>,
}

impl<O: OperationOutcome> OperationStatistic<O> {
    pub fn new(operation: impl Into<String>, latency_capacity: usize) -> Self {
        let capacity = latency_capacity.max(1);
        Self {
            operation: operation.into(),
            counts: O::values().iter().map(|_| AtomicU64::new(0)).collect(),
            latencies: Mutex::new(LatencyRing {
                events: VecDeque::with_capacity(capacity.min(1024)),
                last_seq: 0,
                capacity,
            }),
            _outcome: PhantomData,
        }
    }

    /// Count one completed operation and remember how long it took.
    pub fn record(&self, outcome: O, elapsed: Duration) {
        if let Some(c) = self.counts.get(outcome.ordinal()) {
            c.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let mut ring = self.latencies.lock();
        if ring.events.len() == ring.capacity {
            ring.events.pop_front();
        }
        ring.last_seq += 1;
        let seq = ring.last_seq;
        ring.events.push_back(LatencyEvent { seq, ordinal: outcome.ordinal(), nanos });
    }

    pub fn count(&self, outcome: O) -> u64 {
        self.counts.get(outcome.ordinal()).map_or(0, |c| c.load(Ordering::Relaxed))
    }
}

impl<O: OperationOutcome> OperationSource for OperationStatistic<O> {
    fn operation(&self) -> &str {
        &self.operation
    }

    fn current_count(&self, outcomes: OutcomeSet) -> Result<u64, MgmtError> {
        Ok(self
            .counts
            .iter()
            .enumerate()
            .filter(|(i, _)| outcomes.contains_ordinal(*i))
            .map(|(_, c)| c.load(Ordering::Relaxed))
            .fold(0u64, u64::saturating_add))
    }

    fn latency_since(&self, cursor: u64, outcomes: OutcomeSet) -> Result<LatencyWindow, MgmtError> {
        let ring = self.latencies.lock();
        let durations_nanos = ring
            .events
            .iter()
            .filter(|e| e.seq > cursor && outcomes.contains_ordinal(e.ordinal))
            .map(|e| e.nanos)
            .collect();
        Ok(LatencyWindow { cursor: ring.last_seq, durations_nanos })
    }

    fn latency_cursor(&self) -> u64 {
        self.latencies.lock().last_seq
    }
}
