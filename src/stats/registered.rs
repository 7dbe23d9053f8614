use super::history::SampledHistory;
use super::scheduler::TimerHandle;
use super::source::{GaugeSource, OperationSource, OutcomeSet};
use super::types::{MemoryUnit, NumberUnit, Statistic, StatisticDescriptor, StatisticType, TimeUnit};
use crate::config::StatisticsConfig;
use crate::errors::MgmtError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One derived statistic a registration can expose, with its public name suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Derivation {
    Count,
    Rate,
    LatencyMinimum,
    LatencyMaximum,
    LatencyAverage,
    Ratio,
    Counter,
    Size,
}

impl Derivation {
    pub fn suffix(self) -> &'static str {
        match self {
            Derivation::Count => "Count",
            Derivation::Rate => "Rate",
            Derivation::LatencyMinimum => "LatencyMinimum",
            Derivation::LatencyMaximum => "LatencyMaximum",
            Derivation::LatencyAverage => "LatencyAverage",
            Derivation::Ratio | Derivation::Counter | Derivation::Size => "",
        }
    }

    pub fn statistic_type(self) -> StatisticType {
        match self {
            Derivation::Count | Derivation::Counter => StatisticType::CounterHistory,
            Derivation::Rate => StatisticType::RateHistory,
            Derivation::LatencyMinimum | Derivation::LatencyMaximum => StatisticType::DurationHistory,
            Derivation::LatencyAverage => StatisticType::AverageHistory,
            Derivation::Ratio => StatisticType::RatioHistory,
            Derivation::Size => StatisticType::SizeHistory,
        }
    }

    pub fn derived_name(self, base: &str) -> String {
        format!("{base}{}", self.suffix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatisticKind {
    Compound,
    Ratio,
    Counter,
    Size,
}

impl StatisticKind {
    pub fn derivations(self) -> &'static [Derivation] {
        match self {
            StatisticKind::Compound => &[
                Derivation::Count,
                Derivation::Rate,
                Derivation::LatencyMinimum,
                Derivation::LatencyMaximum,
                Derivation::LatencyAverage,
            ],
            StatisticKind::Ratio => &[Derivation::Ratio],
            StatisticKind::Counter => &[Derivation::Counter],
            StatisticKind::Size => &[Derivation::Size],
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatisticKind::Compound => "compound",
            StatisticKind::Ratio => "ratio",
            StatisticKind::Counter => "counter",
            StatisticKind::Size => "size",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
struct WindowState {
    last_count: u64,
    last_timestamp: u64,
    latency_cursor: u64,
}

pub struct CompoundStatistic {
    source: Arc<dyn OperationSource>,
    outcomes: OutcomeSet,
    count: SampledHistory<u64>,
    rate: SampledHistory<f64>,
    latency_min: SampledHistory<u64>,
    latency_max: SampledHistory<u64>,
    latency_avg: SampledHistory<f64>,
    window: Mutex<WindowState>,
}

#[derive(Debug)]
struct RatioState {
    last_numerator: u64,
    last_denominator: u64,
}

pub struct RatioStatistic {
    source: Arc<dyn OperationSource>,
    numerator: OutcomeSet,
    denominator: OutcomeSet,
    ratio: SampledHistory<f64>,
    window: Mutex<RatioState>,
}

pub struct GaugeStatistic {
    gauge: Arc<dyn GaugeSource>,
    history: SampledHistory<u64>,
}

pub enum RegisteredStatistic {
    Compound(CompoundStatistic),
    Ratio(RatioStatistic),
    Counter(GaugeStatistic),
    Size(GaugeStatistic),
}

fn history<T: Copy>(cfg: &StatisticsConfig) -> SampledHistory<T> {
    SampledHistory::new(cfg.history_size)
}

impl RegisteredStatistic {
    pub(crate) fn compound(
        cfg: &StatisticsConfig,
        source: Arc<dyn OperationSource>,
        outcomes: OutcomeSet,
        now: u64,
    ) -> Result<Self, MgmtError> {
        let window = WindowState {
            last_count: source.current_count(outcomes)?,
            last_timestamp: now,
            latency_cursor: source.latency_cursor(),
        };
        Ok(RegisteredStatistic::Compound(CompoundStatistic {
            source,
            outcomes,
            count: history(cfg),
            rate: history(cfg),
            latency_min: history(cfg),
            latency_max: history(cfg),
            latency_avg: history(cfg),
            window: Mutex::new(window),
        }))
    }

    pub(crate) fn ratio(
        cfg: &StatisticsConfig,
        source: Arc<dyn OperationSource>,
        numerator: OutcomeSet,
        denominator: OutcomeSet,
    ) -> Result<Self, MgmtError> {
        let window = RatioState {
            last_numerator: source.current_count(numerator)?,
            last_denominator: source.current_count(denominator)?,
        };
        Ok(RegisteredStatistic::Ratio(RatioStatistic {
            source,
            numerator,
            denominator,
            ratio: history(cfg),
            window: Mutex::new(window),
        }))
    }

    pub(crate) fn counter(cfg: &StatisticsConfig, gauge: Arc<dyn GaugeSource>) -> Self {
        RegisteredStatistic::Counter(GaugeStatistic { gauge, history: history(cfg) })
    }

    pub(crate) fn size(cfg: &StatisticsConfig, gauge: Arc<dyn GaugeSource>) -> Self {
        RegisteredStatistic::Size(GaugeStatistic { gauge, history: history(cfg) })
    }

    pub fn kind(&self) -> StatisticKind {
        match self {
            RegisteredStatistic::Compound(_) => StatisticKind::Compound,
            RegisteredStatistic::Ratio(_) => StatisticKind::Ratio,
            RegisteredStatistic::Counter(_) => StatisticKind::Counter,
            RegisteredStatistic::Size(_) => StatisticKind::Size,
        }
    }

    /// Read the sources and append one sample to every owned history.
    ///
    /// All reads happen before any write, so a failing source leaves the histories and the
    /// window baseline untouched; the next tick then covers the missed interval.
    pub(crate) fn sample(&self, now: u64) -> Result<(), MgmtError> {
        match self {
            RegisteredStatistic::Compound(c) => {
                let mut window = c.window.lock();
                let count = c.source.current_count(c.outcomes)?;
                let latencies = c.source.latency_since(window.latency_cursor, c.outcomes)?;

                let delta = count.saturating_sub(window.last_count);
                let elapsed_ms = now.saturating_sub(window.last_timestamp);
                #[allow(clippy::cast_precision_loss)]
                let rate = if elapsed_ms == 0 {
                    0.0
                } else {
                    delta as f64 * 1000.0 / elapsed_ms as f64
                };
                c.count.record(count, now);
                c.rate.record(rate, now);
                let durations = &latencies.durations_nanos;
                if let (Some(min), Some(max)) = (durations.iter().min(), durations.iter().max()) {
                    let total: u128 = durations.iter().map(|d| u128::from(*d)).sum();
                    #[allow(clippy::cast_precision_loss)]
                    let avg = total as f64 / durations.len() as f64;
                    c.latency_min.record(*min, now);
                    c.latency_max.record(*max, now);
                    c.latency_avg.record(avg, now);
                }
                *window = WindowState {
                    last_count: count,
                    last_timestamp: now,
                    latency_cursor: latencies.cursor,
                };
                Ok(())
            }
            RegisteredStatistic::Ratio(r) => {
                let mut window = r.window.lock();
                let numerator = r.source.current_count(r.numerator)?;
                let denominator = r.source.current_count(r.denominator)?;
                let dn = numerator.saturating_sub(window.last_numerator);
                let dd = denominator.saturating_sub(window.last_denominator);
                r.ratio.record(windowed_ratio(dn, dd), now);
                window.last_numerator = numerator;
                window.last_denominator = denominator;
                Ok(())
            }
            RegisteredStatistic::Counter(g) | RegisteredStatistic::Size(g) => {
                let value = g.gauge.value()?;
                g.history.record(value, now);
                Ok(())
            }
        }
    }

    pub(crate) fn history(&self, derivation: Derivation, since: u64) -> Result<Statistic, MgmtError> {
        let stat = match (self, derivation) {
            (RegisteredStatistic::Compound(c), Derivation::Count) => {
                Statistic::CounterHistory { samples: c.count.query(since), unit: NumberUnit::Count }
            }
            (RegisteredStatistic::Compound(c), Derivation::Rate) => {
                Statistic::RateHistory { samples: c.rate.query(since), unit: TimeUnit::Seconds }
            }
            (RegisteredStatistic::Compound(c), Derivation::LatencyMinimum) => Statistic::DurationHistory {
                samples: c.latency_min.query(since),
                unit: TimeUnit::Nanoseconds,
            },
            (RegisteredStatistic::Compound(c), Derivation::LatencyMaximum) => Statistic::DurationHistory {
                samples: c.latency_max.query(since),
                unit: TimeUnit::Nanoseconds,
            },
            (RegisteredStatistic::Compound(c), Derivation::LatencyAverage) => Statistic::AverageHistory {
                samples: c.latency_avg.query(since),
                unit: TimeUnit::Nanoseconds,
            },
            (RegisteredStatistic::Ratio(r), Derivation::Ratio) => {
                Statistic::RatioHistory { samples: r.ratio.query(since), unit: NumberUnit::Ratio }
            }
            (RegisteredStatistic::Counter(g), Derivation::Counter) => {
                Statistic::CounterHistory { samples: g.history.query(since), unit: NumberUnit::Count }
            }
            (RegisteredStatistic::Size(g), Derivation::Size) => {
                Statistic::SizeHistory { samples: g.history.query(since), unit: MemoryUnit::Bytes }
            }
            (other, d) => {
                return Err(MgmtError::UnsupportedRegisteredStatisticKind(format!(
                    "{} statistic has no {:?} history",
                    other.kind(),
                    d
                )));
            }
        };
        Ok(stat)
    }

    pub(crate) fn clear(&self) {
        match self {
            RegisteredStatistic::Compound(c) => {
                c.count.clear();
                c.rate.clear();
                c.latency_min.clear();
                c.latency_max.clear();
                c.latency_avg.clear();
            }
            RegisteredStatistic::Ratio(r) => r.ratio.clear(),
            RegisteredStatistic::Counter(g) | RegisteredStatistic::Size(g) => g.history.clear(),
        }
    }
}

/// Ratio of two window deltas; an empty denominator window yields 0.0.
pub fn windowed_ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let r = numerator as f64 / denominator as f64;
    if r.is_finite() { r } else { 0.0 }
}

/// A named statistic inside a registry, with its sampling timer and activity tracking.
pub struct Registration {
    name: String,
    statistic: RegisteredStatistic,
    last_access: AtomicU64,
    active: AtomicBool,
    pub(crate) timer: Mutex<Option<TimerHandle>>,
}

impl Registration {
    pub(crate) fn new(name: String, statistic: RegisteredStatistic, now: u64) -> Self {
        Self {
            name,
            statistic,
            last_access: AtomicU64::new(now),
            active: AtomicBool::new(true),
            timer: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistic(&self) -> &RegisteredStatistic {
        &self.statistic
    }

    pub fn kind(&self) -> StatisticKind {
        self.statistic.kind()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = StatisticDescriptor> + '_ {
        self.kind()
            .derivations()
            .iter()
            .map(|d| StatisticDescriptor::new(d.derived_name(&self.name), d.statistic_type()))
    }

    /// Derivation exposed under `statistic_name`, if any.
    pub fn resolve(&self, statistic_name: &str) -> Option<Derivation> {
        let suffix = statistic_name.strip_prefix(self.name.as_str())?;
        self.kind().derivations().iter().copied().find(|d| d.suffix() == suffix)
    }

    pub(crate) fn idle_for(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_access.load(Ordering::SeqCst))
    }

    /// Record an access; returns true when this call woke an idle statistic.
    pub(crate) fn touch(&self, now: u64) -> bool {
        self.last_access.fetch_max(now, Ordering::SeqCst);
        self.active.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    /// Mark idle unless an access raced in; returns true if the statistic went idle.
    pub(crate) fn try_deactivate(&self, now: u64, time_to_disable_ms: u64) -> bool {
        self.active.store(false, Ordering::SeqCst);
        if self.idle_for(now) < time_to_disable_ms
            && self.active.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
        {
            return false;
        }
        true
    }

    pub(crate) fn sample(&self, now: u64) -> Result<(), MgmtError> {
        self.statistic.sample(now)
    }

    pub(crate) fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }
}
