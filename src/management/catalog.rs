//! Capability catalog: one binding per managed cache, each holding the cache-level registry
//! plus one registry per tier. Descriptor sets are recomputed from the live bindings on
//! every call.

use crate::config::StatisticsConfig;
use crate::errors::MgmtError;
use crate::stats::{
    CacheCounters, Clock, Scheduler, Statistic, StatisticDescriptor, StatisticsRegistry,
    TierCounters, TierKind, register_cache_statistics, register_tier_statistics,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const STATISTICS_CAPABILITY: &str = "StatisticsCapability";
pub const STATISTIC_COLLECTOR_CAPABILITY: &str = "StatisticCollectorCapability";
pub const SETTINGS_CAPABILITY: &str = "SettingsCapability";

pub const COLLECT_STATISTICS: &str = "collectStatistics";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallParameter {
    pub name: String,
    pub param_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallDescriptor {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<CallParameter>,
}

impl CallDescriptor {
    pub fn collect_statistics() -> Self {
        Self {
            name: COLLECT_STATISTICS.to_string(),
            return_type: "void".to_string(),
            parameters: vec![CallParameter {
                name: "statNames".to_string(),
                param_type: "java.util.Collection".to_string(),
            }],
        }
    }
}

/// Per-cache settings advertised under the settings capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheSettings {
    pub alias: String,
    pub tiers: Vec<String>,
    pub history_size: usize,
    pub history_interval_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Descriptor {
    Statistic(StatisticDescriptor),
    Call(CallDescriptor),
    Settings(CacheSettings),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub name: String,
    pub descriptors: Vec<Descriptor>,
}

impl Capability {
    pub fn new(name: impl Into<String>, descriptors: Vec<Descriptor>) -> Self {
        Self { name: name.into(), descriptors }
    }

    pub fn statistic_descriptors(&self) -> impl Iterator<Item = &StatisticDescriptor> {
        self.descriptors.iter().filter_map(|d| match d {
            Descriptor::Statistic(s) => Some(s),
            _ => None,
        })
    }
}

/// Statistics of one managed cache: a cache-level registry and one registry per tier.
pub struct CacheBinding {
    alias: String,
    cache: StatisticsRegistry,
    tiers: Vec<(TierKind, StatisticsRegistry)>,
}

impl CacheBinding {
    pub fn new(
        alias: &str,
        counters: &CacheCounters,
        tiers: &[TierCounters],
        config: &StatisticsConfig,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MgmtError> {
        let cache = StatisticsRegistry::new(alias, config.clone(), scheduler.clone(), clock.clone());
        register_cache_statistics(&cache, counters)?;
        let mut tier_registries = Vec::with_capacity(tiers.len());
        for tier in tiers {
            let registry = StatisticsRegistry::new(
                format!("{alias}/{}", tier.kind),
                config.clone(),
                scheduler.clone(),
                clock.clone(),
            );
            register_tier_statistics(&registry, tier)?;
            tier_registries.push((tier.kind, registry));
        }
        Ok(Self { alias: alias.to_string(), cache, tiers: tier_registries })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|(k, _)| *k).collect()
    }

    pub fn registries(&self) -> impl Iterator<Item = &StatisticsRegistry> {
        std::iter::once(&self.cache).chain(self.tiers.iter().map(|(_, r)| r))
    }

    /// Cache-level descriptors first, then each tier in binding order.
    pub fn descriptors(&self) -> Vec<StatisticDescriptor> {
        self.registries().flat_map(StatisticsRegistry::list_descriptors).collect()
    }

    pub fn query(&self, statistic_name: &str, since: u64) -> Result<Statistic, MgmtError> {
        let registry = self
            .registries()
            .find(|r| r.exposes(statistic_name))
            .ok_or_else(|| MgmtError::UnknownStatistic(statistic_name.to_string()))?;
        registry.query(statistic_name, since)
    }

    pub fn sample_now(&self, statistic_names: &[String]) -> usize {
        self.registries().map(|r| r.sample_now(statistic_names)).sum()
    }

    pub fn settings(&self) -> CacheSettings {
        let cfg = self.cache.config();
        CacheSettings {
            alias: self.alias.clone(),
            tiers: self.tiers.iter().map(|(k, _)| k.label().to_string()).collect(),
            history_size: cfg.history_size,
            history_interval_ms: cfg.history_interval_ms,
        }
    }

    pub fn dispose(&self) {
        for registry in self.registries() {
            registry.dispose();
        }
    }
}

/// Live set of cache bindings keyed by alias.
#[derive(Default)]
pub struct CapabilityCatalog {
    bindings: RwLock<BTreeMap<String, Arc<CacheBinding>>>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, binding: CacheBinding) -> Result<Arc<CacheBinding>, MgmtError> {
        let mut bindings = self.bindings.write();
        if bindings.contains_key(binding.alias()) {
            return Err(MgmtError::CacheAlreadyBound(binding.alias().to_string()));
        }
        let binding = Arc::new(binding);
        bindings.insert(binding.alias().to_string(), binding.clone());
        Ok(binding)
    }

    /// Unbind and dispose the registries of `alias`.
    pub fn remove(&self, alias: &str) -> Option<Arc<CacheBinding>> {
        let removed = self.bindings.write().remove(alias);
        if let Some(binding) = &removed {
            binding.dispose();
        }
        removed
    }

    pub fn get(&self, alias: &str) -> Option<Arc<CacheBinding>> {
        self.bindings.read().get(alias).cloned()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.bindings.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Union of every bound cache's descriptors, sorted by name.
    pub fn statistic_descriptors(&self) -> Vec<StatisticDescriptor> {
        let bindings = self.bindings.read();
        let union: BTreeSet<StatisticDescriptor> =
            bindings.values().flat_map(|b| b.descriptors()).collect();
        union.into_iter().collect()
    }

    pub fn descriptors_for(&self, alias: &str) -> Result<Vec<StatisticDescriptor>, MgmtError> {
        self.get(alias)
            .map(|b| b.descriptors())
            .ok_or_else(|| MgmtError::UnknownContext(alias.to_string()))
    }

    pub fn settings(&self) -> Vec<CacheSettings> {
        self.bindings.read().values().map(|b| b.settings()).collect()
    }

    /// Remove and dispose everything.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.bindings.write());
        for binding in drained.values() {
            binding.dispose();
        }
        drained.len()
    }
}
