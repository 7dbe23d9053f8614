//! Remote management boundary: capability discovery, statistic queries, collector calls and
//! lifecycle notifications for every cache of one cache manager.

mod catalog;
mod dispatch;

pub use catalog::{
    COLLECT_STATISTICS, CacheBinding, CacheSettings, CallDescriptor, CallParameter, Capability,
    CapabilityCatalog, Descriptor, SETTINGS_CAPABILITY, STATISTIC_COLLECTOR_CAPABILITY,
    STATISTICS_CAPABILITY,
};
pub use dispatch::{CallDispatcher, CallHandler, CallResult, ContextualReturn};

use crate::config::ManagementConfig;
use crate::context::{self, Context};
use crate::errors::MgmtError;
use crate::notification::{NotificationChannel, NotificationEvent, NotificationKind};
use crate::stats::{
    CacheCounters, Clock, Scheduler, Statistic, StatisticDescriptor, SystemClock, TierCounters,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Batch query result for one cache context.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContextualStatistics {
    pub context: Context,
    pub statistics: BTreeMap<String, Statistic>,
    /// Requested names no registry of the context exposes.
    pub unknown: Vec<String>,
}

/// Handles `collectStatistics` for one cache by sampling its registries immediately.
struct StatisticCollector {
    binding: Weak<CacheBinding>,
}

impl CallHandler for StatisticCollector {
    fn call(&self, method: &str, args: &[String]) -> Result<Value, MgmtError> {
        if method != COLLECT_STATISTICS {
            return Err(MgmtError::CallFailed(format!("unsupported method '{method}'")));
        }
        let binding = self.binding.upgrade().ok_or(MgmtError::RegistryDisposed)?;
        Ok(Value::from(binding.sample_now(args)))
    }
}

pub struct ManagementRegistry {
    config: ManagementConfig,
    context: Context,
    clock: Arc<dyn Clock>,
    scheduler: Arc<Scheduler>,
    catalog: CapabilityCatalog,
    dispatcher: CallDispatcher,
    notifications: NotificationChannel,
    shut_down: AtomicBool,
}

impl ManagementRegistry {
    pub fn new(config: ManagementConfig) -> Result<Self, MgmtError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ManagementConfig, clock: Arc<dyn Clock>) -> Result<Self, MgmtError> {
        config.validate()?;
        let scheduler = Arc::new(Scheduler::new(config.scheduler_threads)?);
        let notifications =
            NotificationChannel::new(config.notification_warn_threshold, clock.clone());
        log::info!(
            "management registry '{}' started ({} scheduler thread(s))",
            config.cache_manager_name,
            config.scheduler_threads
        );
        Ok(Self {
            context: Context::create(
                context::CACHE_MANAGER_NAME,
                config.cache_manager_name.clone(),
            ),
            config,
            clock,
            scheduler,
            catalog: CapabilityCatalog::new(),
            dispatcher: CallDispatcher::new(),
            notifications,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ManagementConfig {
        &self.config
    }

    /// `{cacheManagerName}` of this registry.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn cache_context(&self, alias: &str) -> Context {
        self.context.clone().with(context::CACHE_NAME, alias)
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn dispatcher(&self) -> &CallDispatcher {
        &self.dispatcher
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), MgmtError> {
        if self.is_shut_down() { Err(MgmtError::RegistryDisposed) } else { Ok(()) }
    }

    /// Bind the statistics of a new cache and announce it with `CACHE_ADDED`.
    pub fn on_cache_added(
        &self,
        alias: &str,
        counters: &CacheCounters,
        tiers: &[TierCounters],
    ) -> Result<(), MgmtError> {
        self.ensure_running()?;
        if self.catalog.get(alias).is_some() {
            return Err(MgmtError::CacheAlreadyBound(alias.to_string()));
        }
        let binding = CacheBinding::new(
            alias,
            counters,
            tiers,
            &self.config.statistics,
            self.scheduler.clone(),
            self.clock.clone(),
        )?;
        let binding = self.catalog.add(binding)?;
        let ctx = self.cache_context(alias);
        self.dispatcher.bind(
            STATISTIC_COLLECTOR_CAPABILITY,
            ctx.clone(),
            Arc::new(StatisticCollector { binding: Arc::downgrade(&binding) }),
        );
        log::info!("cache '{alias}' bound with {} tier(s)", tiers.len());
        self.notifications.emit(NotificationKind::CacheAdded, ctx);
        Ok(())
    }

    /// Tear down the statistics of `alias` and announce it with `CACHE_REMOVED`.
    pub fn on_cache_removed(&self, alias: &str) -> Result<(), MgmtError> {
        self.ensure_running()?;
        let ctx = self.cache_context(alias);
        if self.catalog.remove(alias).is_none() {
            return Err(MgmtError::UnknownContext(ctx.to_string()));
        }
        self.dispatcher.unbind_all(&ctx);
        log::info!("cache '{alias}' unbound");
        self.notifications.emit(NotificationKind::CacheRemoved, ctx);
        Ok(())
    }

    pub fn on_entity_registered(&self, entity_id: &str) {
        let ctx = Context::create(context::ENTITY_ID, entity_id);
        self.emit(NotificationKind::EntityRegistryUpdated, ctx);
    }

    pub fn on_entity_registry_updated(&self, entity_id: &str) {
        let ctx = Context::create(context::ENTITY_ID, entity_id);
        self.emit(NotificationKind::EntityRegistryUpdated, ctx);
    }

    pub fn on_client_registered(&self, client_id: &str) {
        let ctx = Context::create(context::CLIENT_ID, client_id);
        self.emit(NotificationKind::ClientRegistryUpdated, ctx);
    }

    pub fn on_server_store_created(&self, alias: &str) {
        let ctx = Context::create(context::ALIAS, alias);
        self.emit(NotificationKind::EhcacheServerStoreCreated, ctx);
    }

    pub fn on_server_store_destroyed(&self, alias: &str) {
        let ctx = Context::create(context::ALIAS, alias);
        self.emit(NotificationKind::EhcacheServerStoreDestroyed, ctx);
    }

    fn emit(&self, kind: NotificationKind, ctx: Context) {
        self.notifications.emit(kind, self.context.clone().with_all(&ctx));
    }

    /// Capabilities in fixed order: statistics, statistic collector, settings.
    pub fn list_capabilities(&self) -> Vec<Capability> {
        let statistics = self
            .catalog
            .statistic_descriptors()
            .into_iter()
            .map(Descriptor::Statistic)
            .collect();
        let settings = self.catalog.settings().into_iter().map(Descriptor::Settings).collect();
        vec![
            Capability::new(STATISTICS_CAPABILITY, statistics),
            Capability::new(
                STATISTIC_COLLECTOR_CAPABILITY,
                vec![Descriptor::Call(CallDescriptor::collect_statistics())],
            ),
            Capability::new(SETTINGS_CAPABILITY, settings),
        ]
    }

    pub fn capability(&self, name: &str) -> Result<Capability, MgmtError> {
        self.list_capabilities()
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MgmtError::UnknownCapability(name.to_string()))
    }

    pub fn descriptors_for(&self, alias: &str) -> Result<Vec<StatisticDescriptor>, MgmtError> {
        self.catalog.descriptors_for(alias)
    }

    fn resolve(&self, ctx: &Context) -> Result<Arc<CacheBinding>, MgmtError> {
        if ctx.get(context::CACHE_MANAGER_NAME) != Some(self.config.cache_manager_name.as_str()) {
            return Err(MgmtError::UnknownContext(ctx.to_string()));
        }
        ctx.get(context::CACHE_NAME)
            .and_then(|alias| self.catalog.get(alias))
            .ok_or_else(|| MgmtError::UnknownContext(ctx.to_string()))
    }

    pub fn query_statistic(
        &self,
        capability: &str,
        ctx: &Context,
        statistic_name: &str,
        since: u64,
    ) -> Result<Statistic, MgmtError> {
        self.ensure_running()?;
        if capability != STATISTICS_CAPABILITY {
            return Err(MgmtError::UnknownCapability(capability.to_string()));
        }
        self.resolve(ctx)?.query(statistic_name, since)
    }

    /// Query several statistics of one cache; an empty `names` queries all of them.
    pub fn query_statistics(
        &self,
        ctx: &Context,
        names: &[String],
        since: u64,
    ) -> Result<ContextualStatistics, MgmtError> {
        self.ensure_running()?;
        let binding = self.resolve(ctx)?;
        let names: Vec<String> = if names.is_empty() {
            binding.descriptors().into_iter().map(|d| d.name).collect()
        } else {
            names.to_vec()
        };
        let mut statistics = BTreeMap::new();
        let mut unknown = Vec::new();
        for name in names {
            match binding.query(&name, since) {
                Ok(s) => {
                    statistics.insert(name, s);
                }
                Err(MgmtError::UnknownStatistic(_)) => unknown.push(name),
                Err(e) => return Err(e),
            }
        }
        Ok(ContextualStatistics { context: ctx.clone(), statistics, unknown })
    }

    /// Sample the named statistics of every bound cache right now.
    pub fn collect_statistics(&self, statistic_names: &[String]) -> CallResult {
        if self.is_shut_down() {
            return CallResult::not_executed();
        }
        self.dispatcher.call(
            STATISTIC_COLLECTOR_CAPABILITY,
            COLLECT_STATISTICS,
            statistic_names,
            &self.context,
        )
    }

    pub fn drain_notifications(&self) -> Vec<NotificationEvent> {
        self.notifications.drain()
    }

    pub fn peek_notifications(&self) -> Option<Vec<NotificationEvent>> {
        self.notifications.peek()
    }

    /// Wait until at least one notification is pending, then drain.
    pub async fn wait_for_notifications(&self) -> Vec<NotificationEvent> {
        self.notifications.wait_for_pending().await;
        self.notifications.drain()
    }

    /// Dispose every cache binding and stop the scheduler. Idempotent.
    ///
    /// Pending notifications stay drainable.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let released = self.catalog.clear();
        self.dispatcher.unbind_all(&self.context);
        self.scheduler.shutdown();
        log::info!(
            "management registry '{}' shut down ({released} cache(s) released)",
            self.config.cache_manager_name
        );
    }
}

impl Drop for ManagementRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
