//! Per-registry record of sampler transitions: idle pauses, reactivations, skipped ticks,
//! on-demand sampling and disposal.
//!
//! Events are recorded from scheduler workers and callers alike, so the buffer is shared
//! rather than thread-local. Every event is also logged at TRACE to `tiermon::diag`.

use crate::logger::DIAG_TARGET;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

/// Events retained per registry before the oldest are dropped.
pub const TRACE_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplerEvent {
    /// The statistic was not queried for `time_to_disable_ms` and its timer stopped.
    Paused { statistic: String, at: u64 },
    /// A query woke an idle statistic and a fresh timer was scheduled.
    Resumed { statistic: String, at: u64 },
    /// A tick or on-demand sample could not read its source.
    Skipped { statistic: String, at: u64, reason: String },
    SampledOnDemand { sampled: usize, at: u64 },
    Disposed { registrations: usize },
}

impl SamplerEvent {
    /// Statistic the event is about, if it concerns a single one.
    pub fn statistic(&self) -> Option<&str> {
        match self {
            SamplerEvent::Paused { statistic, .. }
            | SamplerEvent::Resumed { statistic, .. }
            | SamplerEvent::Skipped { statistic, .. } => Some(statistic),
            SamplerEvent::SampledOnDemand { .. } | SamplerEvent::Disposed { .. } => None,
        }
    }
}

impl fmt::Display for SamplerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerEvent::Paused { statistic, at } => {
                write!(f, "'{statistic}' idle at {at}, sampling paused")
            }
            SamplerEvent::Resumed { statistic, at } => {
                write!(f, "'{statistic}' queried at {at}, sampling resumed")
            }
            SamplerEvent::Skipped { statistic, at, reason } => {
                write!(f, "'{statistic}' sample at {at} skipped: {reason}")
            }
            SamplerEvent::SampledOnDemand { sampled, at } => {
                write!(f, "sampled {sampled} statistic(s) on demand at {at}")
            }
            SamplerEvent::Disposed { registrations } => {
                write!(f, "disposed ({registrations} registrations)")
            }
        }
    }
}

pub struct SamplingTrace {
    scope: String,
    capacity: usize,
    events: Mutex<VecDeque<SamplerEvent>>,
}

impl SamplingTrace {
    pub fn new(scope: impl Into<String>, capacity: usize) -> Self {
        Self { scope: scope.into(), capacity: capacity.max(1), events: Mutex::new(VecDeque::new()) }
    }

    pub fn record(&self, event: SamplerEvent) {
        log::trace!(target: DIAG_TARGET, "[{}] {event}", self.scope);
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<SamplerEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn drain(&self) -> Vec<SamplerEvent> {
        std::mem::take(&mut *self.events.lock()).into()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
