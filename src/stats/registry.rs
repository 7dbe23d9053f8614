use super::clock::Clock;
use super::registered::{Derivation, RegisteredStatistic, Registration};
use super::scheduler::{Scheduler, Task, Tick};
use super::source::{GaugeSource, OperationSource, OutcomeSet};
use super::trace::{SamplerEvent, SamplingTrace, TRACE_CAPACITY};
use super::types::{Statistic, StatisticDescriptor};
use crate::config::StatisticsConfig;
use crate::errors::MgmtError;
use crate::logger::STATS_TARGET;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Derived statistics of one cache or one tier, sampled on the shared scheduler.
///
/// Registrations keep insertion order so descriptor enumeration is deterministic.
pub struct StatisticsRegistry {
    scope: String,
    config: StatisticsConfig,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
    registrations: RwLock<Vec<Arc<Registration>>>,
    trace: Arc<SamplingTrace>,
    disposed: AtomicBool,
}

impl StatisticsRegistry {
    pub fn new(
        scope: impl Into<String>,
        config: StatisticsConfig,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scope = scope.into();
        Self {
            trace: Arc::new(SamplingTrace::new(scope.clone(), TRACE_CAPACITY)),
            scope,
            config,
            scheduler,
            clock,
            registrations: RwLock::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    pub fn trace(&self) -> &SamplingTrace {
        &self.trace
    }

    pub fn register_compound(
        &self,
        name: &str,
        source: Arc<dyn OperationSource>,
        outcomes: OutcomeSet,
    ) -> Result<(), MgmtError> {
        self.register(name, |cfg, now| RegisteredStatistic::compound(cfg, source, outcomes, now))
    }

    pub fn register_ratio(
        &self,
        name: &str,
        source: Arc<dyn OperationSource>,
        numerator: OutcomeSet,
        denominator: OutcomeSet,
    ) -> Result<(), MgmtError> {
        self.register(name, |cfg, _| RegisteredStatistic::ratio(cfg, source, numerator, denominator))
    }

    pub fn register_counter(&self, name: &str, gauge: Arc<dyn GaugeSource>) -> Result<(), MgmtError> {
        self.register(name, |cfg, _| Ok(RegisteredStatistic::counter(cfg, gauge)))
    }

    pub fn register_size(&self, name: &str, gauge: Arc<dyn GaugeSource>) -> Result<(), MgmtError> {
        self.register(name, |cfg, _| Ok(RegisteredStatistic::size(cfg, gauge)))
    }

    fn register<F>(&self, name: &str, build: F) -> Result<(), MgmtError>
    where
        F: FnOnce(&StatisticsConfig, u64) -> Result<RegisteredStatistic, MgmtError>,
    {
        let mut regs = self.registrations.write();
        if self.is_disposed() {
            return Err(MgmtError::RegistryDisposed);
        }
        let now = self.clock.now_millis();
        let statistic = build(&self.config, now)?;
        let registration = Arc::new(Registration::new(name.to_string(), statistic, now));
        let taken = |n: &str| regs.iter().any(|r| r.name() == n || r.resolve(n).is_some());
        if taken(name) || registration.descriptors().any(|d| taken(&d.name)) {
            return Err(MgmtError::DuplicateStatisticName(name.to_string()));
        }
        self.start_timer(&registration)?;
        log::debug!(
            target: STATS_TARGET,
            "[{}] registered {} statistic '{}'",
            self.scope,
            registration.kind(),
            name
        );
        regs.push(registration);
        Ok(())
    }

    /// Schedule a fresh timer for a woken registration unless the registry was disposed
    /// since the lookup. Runs under the registrations read lock so `dispose` cannot interleave.
    fn restart_timer(&self, registration: &Arc<Registration>) -> Result<(), MgmtError> {
        let _regs = self.registrations.read();
        if self.is_disposed() {
            return Err(MgmtError::RegistryDisposed);
        }
        self.start_timer(registration)
    }

    fn start_timer(&self, registration: &Arc<Registration>) -> Result<(), MgmtError> {
        let task = tick_task(
            Arc::downgrade(registration),
            self.trace.clone(),
            self.clock.clone(),
            self.config.always_on,
            self.config.time_to_disable_ms,
        );
        let handle = self.scheduler.schedule(self.config.history_interval(), task)?;
        if let Some(previous) = registration.timer.lock().replace(handle) {
            previous.cancel();
        }
        Ok(())
    }

    fn lookup(&self, statistic_name: &str) -> Option<(Arc<Registration>, Derivation)> {
        self.registrations
            .read()
            .iter()
            .find_map(|r| r.resolve(statistic_name).map(|d| (r.clone(), d)))
    }

    /// True if `statistic_name` resolves to a derived statistic of this registry.
    pub fn exposes(&self, statistic_name: &str) -> bool {
        self.lookup(statistic_name).is_some()
    }

    /// Whether the registration behind `statistic_name` is currently ticking.
    ///
    /// Unlike [`query`](Self::query) this is not an access and wakes nothing.
    pub fn is_active(&self, statistic_name: &str) -> Result<bool, MgmtError> {
        self.lookup(statistic_name)
            .map(|(r, _)| r.is_active())
            .ok_or_else(|| MgmtError::UnknownStatistic(statistic_name.to_string()))
    }

    /// History of one derived statistic since `since` (epoch millis, inclusive).
    ///
    /// Counts as an access: an idle statistic starts ticking again from the next interval.
    pub fn query(&self, statistic_name: &str, since: u64) -> Result<Statistic, MgmtError> {
        if self.is_disposed() {
            return Err(MgmtError::RegistryDisposed);
        }
        let (registration, derivation) = self
            .lookup(statistic_name)
            .ok_or_else(|| MgmtError::UnknownStatistic(statistic_name.to_string()))?;
        let now = self.clock.now_millis();
        if registration.touch(now) {
            log::debug!(
                target: STATS_TARGET,
                "[{}] reactivating statistic '{}'",
                self.scope,
                registration.name()
            );
            self.restart_timer(&registration)?;
            self.trace
                .record(SamplerEvent::Resumed { statistic: registration.name().into(), at: now });
        }
        registration.statistic().history(derivation, since)
    }

    /// Every derived descriptor, in registration order.
    pub fn list_descriptors(&self) -> Vec<StatisticDescriptor> {
        self.registrations.read().iter().flat_map(|r| r.descriptors().collect::<Vec<_>>()).collect()
    }

    pub fn registration_names(&self) -> Vec<String> {
        self.registrations.read().iter().map(|r| r.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Take one sample right now for the registrations behind `statistic_names`
    /// (all of them when empty). Returns how many registrations were sampled.
    ///
    /// A failing source is logged and skipped.
    pub fn sample_now(&self, statistic_names: &[String]) -> usize {
        if self.is_disposed() {
            return 0;
        }
        let targets: Vec<Arc<Registration>> = {
            let regs = self.registrations.read();
            regs.iter()
                .filter(|r| {
                    statistic_names.is_empty()
                        || statistic_names.iter().any(|n| r.resolve(n).is_some())
                })
                .cloned()
                .collect()
        };
        let now = self.clock.now_millis();
        let mut sampled = 0;
        for r in targets {
            match r.sample(now) {
                Ok(()) => sampled += 1,
                Err(e) => {
                    log::warn!(
                        target: STATS_TARGET,
                        "[{}] skipping sample of '{}': {e}",
                        self.scope,
                        r.name()
                    );
                    self.trace.record(SamplerEvent::Skipped {
                        statistic: r.name().into(),
                        at: now,
                        reason: e.to_string(),
                    });
                }
            }
        }
        self.trace.record(SamplerEvent::SampledOnDemand { sampled, at: now });
        sampled
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Cancel all timers and release all histories. Idempotent.
    pub fn dispose(&self) {
        let regs = {
            let mut regs = self.registrations.write();
            if self.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *regs)
        };
        for r in &regs {
            r.cancel_timer();
            r.statistic().clear();
        }
        log::info!(
            target: STATS_TARGET,
            "[{}] statistics registry disposed ({} registrations)",
            self.scope,
            regs.len()
        );
        self.trace.record(SamplerEvent::Disposed { registrations: regs.len() });
    }
}

impl Drop for StatisticsRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn tick_task(
    registration: Weak<Registration>,
    trace: Arc<SamplingTrace>,
    clock: Arc<dyn Clock>,
    always_on: bool,
    time_to_disable_ms: u64,
) -> Task {
    Arc::new(move || {
        let Some(reg) = registration.upgrade() else {
            return Tick::Stop;
        };
        let now = clock.now_millis();
        if !always_on
            && reg.idle_for(now) >= time_to_disable_ms
            && reg.try_deactivate(now, time_to_disable_ms)
        {
            log::debug!(target: STATS_TARGET, "statistic '{}' idle, sampling paused", reg.name());
            trace.record(SamplerEvent::Paused { statistic: reg.name().into(), at: now });
            return Tick::Stop;
        }
        if let Err(e) = reg.sample(now) {
            log::warn!(target: STATS_TARGET, "skipping sample of '{}': {e}", reg.name());
            trace.record(SamplerEvent::Skipped {
                statistic: reg.name().into(),
                at: now,
                reason: e.to_string(),
            });
        }
        Tick::Continue
    })
}
