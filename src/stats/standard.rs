//! The statistic set every managed cache exposes: cache-level get/clear families plus a
//! per-tier set of hit/miss/eviction families, ratios, mapping counts and byte sizes.

use super::registry::StatisticsRegistry;
use super::source::{Gauge, GaugeSource, OperationOutcome, OperationStatistic, OutcomeSet};
use crate::errors::MgmtError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheGetOutcome {
    HitNoLoader,
    HitWithLoader,
    MissNoLoader,
    MissWithLoader,
    Failure,
}

impl OperationOutcome for CacheGetOutcome {
    fn ordinal(self) -> usize {
        self as usize
    }
    fn values() -> &'static [Self] {
        &[
            CacheGetOutcome::HitNoLoader,
            CacheGetOutcome::HitWithLoader,
            CacheGetOutcome::MissNoLoader,
            CacheGetOutcome::MissWithLoader,
            CacheGetOutcome::Failure,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheClearOutcome {
    Success,
    Failure,
}

impl OperationOutcome for CacheClearOutcome {
    fn ordinal(self) -> usize {
        self as usize
    }
    fn values() -> &'static [Self] {
        &[CacheClearOutcome::Success, CacheClearOutcome::Failure]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TierGetOutcome {
    Hit,
    Miss,
}

impl OperationOutcome for TierGetOutcome {
    fn ordinal(self) -> usize {
        self as usize
    }
    fn values() -> &'static [Self] {
        &[TierGetOutcome::Hit, TierGetOutcome::Miss]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TierEvictionOutcome {
    Success,
    Failure,
}

impl OperationOutcome for TierEvictionOutcome {
    fn ordinal(self) -> usize {
        self as usize
    }
    fn values() -> &'static [Self] {
        &[TierEvictionOutcome::Success, TierEvictionOutcome::Failure]
    }
}

/// Storage layer of a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TierKind {
    OnHeap,
    OffHeap,
    Disk,
    Clustered,
}

impl TierKind {
    pub fn label(self) -> &'static str {
        match self {
            TierKind::OnHeap => "OnHeap",
            TierKind::OffHeap => "OffHeap",
            TierKind::Disk => "Disk",
            TierKind::Clustered => "Clustered",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw counters of the cache-level API.
pub struct CacheCounters {
    pub get: Arc<OperationStatistic<CacheGetOutcome>>,
    pub clear: Arc<OperationStatistic<CacheClearOutcome>>,
}

impl CacheCounters {
    pub fn new(latency_capacity: usize) -> Self {
        Self {
            get: Arc::new(OperationStatistic::new("get", latency_capacity)),
            clear: Arc::new(OperationStatistic::new("clear", latency_capacity)),
        }
    }
}

/// Raw counters and gauges of one tier.
pub struct TierCounters {
    pub kind: TierKind,
    pub get: Arc<OperationStatistic<TierGetOutcome>>,
    pub eviction: Arc<OperationStatistic<TierEvictionOutcome>>,
    pub mappings: Arc<dyn GaugeSource>,
    pub max_mappings: Arc<dyn GaugeSource>,
    pub allocated_bytes: Arc<dyn GaugeSource>,
    pub occupied_bytes: Arc<dyn GaugeSource>,
}

impl TierCounters {
    /// Counters backed by plain atomic gauges; the returned gauges are the same instances.
    pub fn new(kind: TierKind, latency_capacity: usize) -> (Self, TierGauges) {
        let gauges = TierGauges::default();
        let counters = Self {
            kind,
            get: Arc::new(OperationStatistic::new("get", latency_capacity)),
            eviction: Arc::new(OperationStatistic::new("eviction", latency_capacity)),
            mappings: gauges.mappings.clone(),
            max_mappings: gauges.max_mappings.clone(),
            allocated_bytes: gauges.allocated_bytes.clone(),
            occupied_bytes: gauges.occupied_bytes.clone(),
        };
        (counters, gauges)
    }
}

#[derive(Clone, Default)]
pub struct TierGauges {
    pub mappings: Arc<Gauge>,
    pub max_mappings: Arc<Gauge>,
    pub allocated_bytes: Arc<Gauge>,
    pub occupied_bytes: Arc<Gauge>,
}

pub const CACHE_PREFIX: &str = "Cache";

/// Register `Cache:Hit`, `Cache:Miss`, `Cache:Clear`, `Cache:HitRatio` and `Cache:MissRatio`.
pub fn register_cache_statistics(
    registry: &StatisticsRegistry,
    counters: &CacheCounters,
) -> Result<(), MgmtError> {
    use CacheGetOutcome::{HitNoLoader, HitWithLoader, MissNoLoader, MissWithLoader};
    let hit = OutcomeSet::of(&[HitNoLoader, HitWithLoader]);
    let miss = OutcomeSet::of(&[MissNoLoader, MissWithLoader]);
    let all_gets = OutcomeSet::all::<CacheGetOutcome>();
    let p = CACHE_PREFIX;
    registry.register_compound(&format!("{p}:Hit"), counters.get.clone(), hit)?;
    registry.register_compound(&format!("{p}:Miss"), counters.get.clone(), miss)?;
    registry.register_compound(
        &format!("{p}:Clear"),
        counters.clear.clone(),
        OutcomeSet::all::<CacheClearOutcome>(),
    )?;
    registry.register_ratio(&format!("{p}:HitRatio"), counters.get.clone(), hit, all_gets)?;
    registry.register_ratio(&format!("{p}:MissRatio"), counters.get.clone(), miss, all_gets)?;
    Ok(())
}

/// Register the per-tier statistic set under the tier label prefix (e.g. `OnHeap:HitCount`).
pub fn register_tier_statistics(
    registry: &StatisticsRegistry,
    counters: &TierCounters,
) -> Result<(), MgmtError> {
    let p = counters.kind.label();
    let hit = OutcomeSet::of(&[TierGetOutcome::Hit]);
    let miss = OutcomeSet::of(&[TierGetOutcome::Miss]);
    let all_gets = OutcomeSet::all::<TierGetOutcome>();
    registry.register_compound(&format!("{p}:Hit"), counters.get.clone(), hit)?;
    registry.register_compound(&format!("{p}:Miss"), counters.get.clone(), miss)?;
    registry.register_compound(
        &format!("{p}:Eviction"),
        counters.eviction.clone(),
        OutcomeSet::all::<TierEvictionOutcome>(),
    )?;
    registry.register_ratio(&format!("{p}:HitRatio"), counters.get.clone(), hit, all_gets)?;
    registry.register_ratio(&format!("{p}:MissRatio"), counters.get.clone(), miss, all_gets)?;
    registry.register_counter(&format!("{p}:MappingCount"), counters.mappings.clone())?;
    registry.register_counter(&format!("{p}:MaxMappingCount"), counters.max_mappings.clone())?;
    registry.register_size(&format!("{p}:AllocatedByteSize"), counters.allocated_bytes.clone())?;
    registry.register_size(&format!("{p}:OccupiedByteSize"), counters.occupied_bytes.clone())?;
    Ok(())
}
