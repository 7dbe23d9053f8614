use serde::Serialize;
use std::fmt;

/// Kind of history a descriptor advertises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatisticType {
    CounterHistory,
    RateHistory,
    RatioHistory,
    DurationHistory,
    AverageHistory,
    SizeHistory,
}

impl fmt::Display for StatisticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatisticType::CounterHistory => "COUNTER_HISTORY",
            StatisticType::RateHistory => "RATE_HISTORY",
            StatisticType::RatioHistory => "RATIO_HISTORY",
            StatisticType::DurationHistory => "DURATION_HISTORY",
            StatisticType::AverageHistory => "AVERAGE_HISTORY",
            StatisticType::SizeHistory => "SIZE_HISTORY",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StatisticDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub statistic_type: StatisticType,
}

impl StatisticDescriptor {
    pub fn new(name: impl Into<String>, statistic_type: StatisticType) -> Self {
        Self { name: name.into(), statistic_type }
    }
}

/// One timestamped value; timestamps are epoch milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample<T> {
    pub timestamp: u64,
    pub value: T,
}

impl<T> Sample<T> {
    pub fn new(timestamp: u64, value: T) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NumberUnit {
    #[serde(rename = "COUNT")]
    Count,
    #[serde(rename = "RATIO")]
    Ratio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TimeUnit {
    #[serde(rename = "NANOSECONDS")]
    Nanoseconds,
    #[serde(rename = "SECONDS")]
    Seconds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MemoryUnit {
    #[serde(rename = "B")]
    Bytes,
}

/// Result of a statistic query: the retained history plus its unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Statistic {
    CounterHistory { samples: Vec<Sample<u64>>, unit: NumberUnit },
    RateHistory { samples: Vec<Sample<f64>>, unit: TimeUnit },
    RatioHistory { samples: Vec<Sample<f64>>, unit: NumberUnit },
    DurationHistory { samples: Vec<Sample<u64>>, unit: TimeUnit },
    AverageHistory { samples: Vec<Sample<f64>>, unit: TimeUnit },
    SizeHistory { samples: Vec<Sample<u64>>, unit: MemoryUnit },
}

impl Statistic {
    pub fn statistic_type(&self) -> StatisticType {
        match self {
            Statistic::CounterHistory { .. } => StatisticType::CounterHistory,
            Statistic::RateHistory { .. } => StatisticType::RateHistory,
            Statistic::RatioHistory { .. } => StatisticType::RatioHistory,
            Statistic::DurationHistory { .. } => StatisticType::DurationHistory,
            Statistic::AverageHistory { .. } => StatisticType::AverageHistory,
            Statistic::SizeHistory { .. } => StatisticType::SizeHistory,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Statistic::CounterHistory { samples, .. }
            | Statistic::DurationHistory { samples, .. }
            | Statistic::SizeHistory { samples, .. } => samples.len(),
            Statistic::RateHistory { samples, .. }
            | Statistic::RatioHistory { samples, .. }
            | Statistic::AverageHistory { samples, .. } => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer-valued samples (counter, duration and size histories).
    pub fn integer_samples(&self) -> Option<&[Sample<u64>]> {
        match self {
            Statistic::CounterHistory { samples, .. }
            | Statistic::DurationHistory { samples, .. }
            | Statistic::SizeHistory { samples, .. } => Some(samples.as_slice()),
            _ => None,
        }
    }

    /// Floating-point samples (rate, ratio and average histories).
    pub fn float_samples(&self) -> Option<&[Sample<f64>]> {
        match self {
            Statistic::RateHistory { samples, .. }
            | Statistic::RatioHistory { samples, .. }
            | Statistic::AverageHistory { samples, .. } => Some(samples.as_slice()),
            _ => None,
        }
    }
}
