mod clock;
mod history;
mod registered;
mod registry;
mod scheduler;
mod source;
mod standard;
mod trace;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use history::SampledHistory;
pub use registered::{Derivation, RegisteredStatistic, Registration, StatisticKind, windowed_ratio};
pub use registry::StatisticsRegistry;
pub use scheduler::{Scheduler, Task, Tick, TimerHandle};
pub use source::{
    Gauge, GaugeSource, LatencyWindow, OperationOutcome, OperationSource, OperationStatistic,
    OutcomeSet,
};
pub use standard::{
    CACHE_PREFIX, CacheClearOutcome, CacheCounters, CacheGetOutcome, TierCounters,
    TierEvictionOutcome, TierGauges, TierGetOutcome, TierKind, register_cache_statistics,
    register_tier_statistics,
};
pub use trace::{SamplerEvent, SamplingTrace, TRACE_CAPACITY};
pub use types::{
    MemoryUnit, NumberUnit, Sample, Statistic, StatisticDescriptor, StatisticType, TimeUnit,
};
