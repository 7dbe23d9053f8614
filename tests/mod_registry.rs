use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tiermon::StatisticsConfig;
use tiermon::errors::MgmtError;
use tiermon::stats::{
    CacheCounters, CacheGetOutcome, Gauge, GaugeSource, ManualClock, OperationStatistic,
    OutcomeSet, SamplerEvent, Scheduler, StatisticDescriptor, StatisticType, StatisticsRegistry,
    register_cache_statistics,
};

fn setup(history_size: usize) -> (StatisticsRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let scheduler = Arc::new(Scheduler::new(1).unwrap());
    let config = StatisticsConfig {
        history_size,
        history_interval_ms: 3_600_000,
        ..Default::default()
    };
    (StatisticsRegistry::new("test", config, scheduler, clock.clone()), clock)
}

fn hits() -> OutcomeSet {
    OutcomeSet::of(&[CacheGetOutcome::HitNoLoader, CacheGetOutcome::HitWithLoader])
}

fn values(reg: &StatisticsRegistry, name: &str) -> Vec<u64> {
    let stat = reg.query(name, 0).unwrap();
    stat.integer_samples().unwrap().iter().map(|s| s.value).collect()
}

fn floats(reg: &StatisticsRegistry, name: &str) -> Vec<f64> {
    let stat = reg.query(name, 0).unwrap();
    stat.float_samples().unwrap().iter().map(|s| s.value).collect()
}

/// Poll `cond` on the real clock; scheduler workers tick on real time.
fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    true
}

#[test]
fn compound_lists_exactly_five_descriptors() {
    let (reg, _) = setup(10);
    let get = Arc::new(OperationStatistic::<CacheGetOutcome>::new("get", 16));
    reg.register_compound("Cache:Hit", get, hits()).unwrap();
    assert_eq!(
        reg.list_descriptors(),
        vec![
            StatisticDescriptor::new("Cache:HitCount", StatisticType::CounterHistory),
            StatisticDescriptor::new("Cache:HitRate", StatisticType::RateHistory),
            StatisticDescriptor::new("Cache:HitLatencyMinimum", StatisticType::DurationHistory),
            StatisticDescriptor::new("Cache:HitLatencyMaximum", StatisticType::DurationHistory),
            StatisticDescriptor::new("Cache:HitLatencyAverage", StatisticType::AverageHistory),
        ]
    );
}

#[test]
fn duplicate_registration_fails_and_leaves_descriptors_unchanged() {
    let (reg, _) = setup(10);
    let get = Arc::new(OperationStatistic::<CacheGetOutcome>::new("get", 16));
    reg.register_compound("Cache:Hit", get.clone(), hits()).unwrap();
    let before = reg.list_descriptors();

    let err = reg.register_compound("Cache:Hit", get.clone(), hits()).unwrap_err();
    assert!(matches!(err, MgmtError::DuplicateStatisticName(n) if n == "Cache:Hit"));

    // a counter named like one of the derived statistics collides as well
    let gauge: Arc<dyn GaugeSource> = Arc::new(Gauge::new(0));
    let err = reg.register_counter("Cache:HitCount", gauge).unwrap_err();
    assert!(matches!(err, MgmtError::DuplicateStatisticName(_)));

    assert_eq!(reg.list_descriptors(), before);
    assert_eq!(reg.len(), 1);
}

#[test]
fn counter_history_keeps_the_two_most_recent_samples() {
    let (reg, clock) = setup(2);
    let gauge = Arc::new(Gauge::new(0));
    reg.register_counter("MappingCount", gauge.clone()).unwrap();
    for v in [5, 7, 9] {
        clock.advance(1_000);
        gauge.set(v);
        assert_eq!(reg.sample_now(&[]), 1);
    }
    assert_eq!(values(&reg, "MappingCount"), vec![7, 9]);
    let stat = reg.query("MappingCount", 0).unwrap();
    let stamps: Vec<u64> = stat.integer_samples().unwrap().iter().map(|s| s.timestamp).collect();
    assert_eq!(stamps, vec![3_000, 4_000]);
}

#[test]
fn compound_derives_count_rate_and_windowed_latency() {
    let (reg, clock) = setup(10);
    let get = Arc::new(OperationStatistic::<CacheGetOutcome>::new("get", 16));
    reg.register_compound("Cache:Hit", get.clone(), hits()).unwrap();

    get.record(CacheGetOutcome::HitNoLoader, Duration::from_nanos(100));
    get.record(CacheGetOutcome::HitWithLoader, Duration::from_nanos(300));
    get.record(CacheGetOutcome::MissNoLoader, Duration::from_nanos(5_000));
    clock.advance(1_000);
    reg.sample_now(&[]);

    assert_eq!(values(&reg, "Cache:HitCount"), vec![2]);
    assert_eq!(floats(&reg, "Cache:HitRate"), vec![2.0]);
    assert_eq!(values(&reg, "Cache:HitLatencyMinimum"), vec![100]);
    assert_eq!(values(&reg, "Cache:HitLatencyMaximum"), vec![300]);
    assert_eq!(floats(&reg, "Cache:HitLatencyAverage"), vec![200.0]);

    // an empty window adds a count and a zero rate but no latency sample
    clock.advance(1_000);
    reg.sample_now(&[]);
    assert_eq!(values(&reg, "Cache:HitCount"), vec![2, 2]);
    assert_eq!(floats(&reg, "Cache:HitRate"), vec![2.0, 0.0]);
    assert_eq!(values(&reg, "Cache:HitLatencyMinimum"), vec![100]);

    get.record(CacheGetOutcome::HitNoLoader, Duration::from_nanos(50));
    clock.advance(500);
    reg.sample_now(&[]);
    assert_eq!(values(&reg, "Cache:HitLatencyMaximum"), vec![300, 50]);
    assert_eq!(floats(&reg, "Cache:HitRate"), vec![2.0, 0.0, 2.0]);
}

#[test]
fn ratio_with_empty_denominator_window_is_zero() {
    let (reg, clock) = setup(10);
    let get = Arc::new(OperationStatistic::<CacheGetOutcome>::new("get", 16));
    reg.register_ratio("Cache:HitRatio", get.clone(), hits(), OutcomeSet::all::<CacheGetOutcome>())
        .unwrap();
    clock.advance(1_000);
    reg.sample_now(&[]);
    get.record(CacheGetOutcome::HitNoLoader, Duration::from_nanos(1));
    get.record(CacheGetOutcome::MissNoLoader, Duration::from_nanos(1));
    get.record(CacheGetOutcome::MissWithLoader, Duration::from_nanos(1));
    get.record(CacheGetOutcome::HitWithLoader, Duration::from_nanos(1));
    clock.advance(1_000);
    reg.sample_now(&[]);
    let got = floats(&reg, "Cache:HitRatio");
    assert_eq!(got, vec![0.0, 0.5]);
    assert!(got.iter().all(|v| v.is_finite()));
}

#[test]
fn unknown_names_are_typed_failures() {
    let (reg, _) = setup(10);
    let get = Arc::new(OperationStatistic::<CacheGetOutcome>::new("get", 16));
    reg.register_compound("Cache:Hit", get, hits()).unwrap();
    for name in ["Nope", "Cache:Hit", "Cache:HitRatio", "Cache:HitCountRate"] {
        let err = reg.query(name, 0).unwrap_err();
        assert!(matches!(err, MgmtError::UnknownStatistic(ref n) if n == name), "{name}");
    }
}

#[test]
fn failing_source_skips_the_sample_only() {
    let (reg, clock) = setup(10);
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let gauge: Arc<dyn GaugeSource> = Arc::new(move || -> Result<u64, MgmtError> {
        if flag.load(Ordering::SeqCst) {
            Ok(42)
        } else {
            Err(MgmtError::SourceUnavailable("tier offline".into()))
        }
    });
    reg.register_size("OnHeap:OccupiedByteSize", gauge).unwrap();
    clock.advance(1_000);
    assert_eq!(reg.sample_now(&[]), 1);
    healthy.store(false, Ordering::SeqCst);
    clock.advance(1_000);
    assert_eq!(reg.sample_now(&[]), 0);
    assert!(reg.trace().events().iter().any(|e| matches!(
        e,
        SamplerEvent::Skipped { statistic, at: 3_000, reason }
            if statistic == "OnHeap:OccupiedByteSize" && reason.contains("tier offline")
    )));
    healthy.store(true, Ordering::SeqCst);
    clock.advance(1_000);
    assert_eq!(reg.sample_now(&[]), 1);
    assert_eq!(values(&reg, "OnHeap:OccupiedByteSize"), vec![42, 42]);
}

#[test]
fn sample_now_can_target_single_statistics() {
    let (reg, clock) = setup(10);
    let counters = CacheCounters::new(16);
    register_cache_statistics(&reg, &counters).unwrap();
    clock.advance(1_000);
    assert_eq!(reg.sample_now(&["Cache:MissRate".to_string()]), 1);
    assert_eq!(
        reg.trace().events().last(),
        Some(&SamplerEvent::SampledOnDemand { sampled: 1, at: 2_000 })
    );
    assert_eq!(values(&reg, "Cache:MissCount"), vec![0]);
    assert!(reg.query("Cache:HitCount", 0).unwrap().is_empty());
}

#[test]
fn dispose_is_idempotent_and_final() {
    let (reg, _) = setup(10);
    let gauge: Arc<dyn GaugeSource> = Arc::new(Gauge::new(3));
    reg.register_counter("MappingCount", gauge.clone()).unwrap();
    reg.dispose();
    reg.dispose();
    assert!(reg.is_disposed());
    let disposals: Vec<SamplerEvent> = reg
        .trace()
        .events()
        .into_iter()
        .filter(|e| matches!(e, SamplerEvent::Disposed { .. }))
        .collect();
    assert_eq!(disposals, vec![SamplerEvent::Disposed { registrations: 1 }]);
    assert!(reg.list_descriptors().is_empty());
    assert!(matches!(reg.query("MappingCount", 0), Err(MgmtError::RegistryDisposed)));
    assert!(matches!(
        reg.register_counter("Other", gauge),
        Err(MgmtError::RegistryDisposed)
    ));
    assert_eq!(reg.sample_now(&[]), 0);
}

#[test]
fn timer_ticks_append_samples() {
    let clock = Arc::new(ManualClock::new(1_000));
    let scheduler = Arc::new(Scheduler::new(1).unwrap());
    let config = StatisticsConfig { history_size: 100, history_interval_ms: 10, ..Default::default() };
    let reg = StatisticsRegistry::new("ticking", config, scheduler.clone(), clock.clone());
    reg.register_counter("MappingCount", Arc::new(Gauge::new(1))).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while values(&reg, "MappingCount").len() < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(values(&reg, "MappingCount").len() >= 3);
    reg.dispose();
    // every timer of the disposed registry has left the queue
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn idle_statistic_stops_ticking_and_resumes_on_query() {
    let clock = Arc::new(ManualClock::new(1_000));
    let scheduler = Arc::new(Scheduler::new(1).unwrap());
    let config = StatisticsConfig {
        history_size: 10_000,
        history_interval_ms: 5,
        time_to_disable_ms: 100,
        always_on: false,
        ..Default::default()
    };
    let reg = StatisticsRegistry::new("OnHeap", config, scheduler.clone(), clock.clone());
    let reads = Arc::new(AtomicUsize::new(0));
    let counted = reads.clone();
    let gauge: Arc<dyn GaugeSource> = Arc::new(move || -> Result<u64, MgmtError> {
        Ok(counted.fetch_add(1, Ordering::SeqCst) as u64)
    });
    reg.register_counter("MappingCount", gauge).unwrap();
    assert!(wait_until(|| reads.load(Ordering::SeqCst) >= 3));

    // nobody queries for longer than time_to_disable_ms
    clock.advance(1_000);
    assert!(wait_until(|| !reg.is_active("MappingCount").unwrap()));
    assert_eq!(scheduler.pending(), 0);
    let sampled = reads.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(reads.load(Ordering::SeqCst), sampled);

    // the query sees every sample taken before the pause, then wakes the statistic
    let expected: Vec<u64> = (0..sampled as u64).collect();
    assert_eq!(values(&reg, "MappingCount"), expected);
    assert!(reg.is_active("MappingCount").unwrap());
    assert!(wait_until(|| scheduler.pending() == 1));
    assert!(wait_until(|| reads.load(Ordering::SeqCst) > sampled));
    assert!(wait_until(|| values(&reg, "MappingCount").len() > sampled));

    let events = reg.trace().events();
    let paused = SamplerEvent::Paused { statistic: "MappingCount".into(), at: 2_000 };
    let resumed = SamplerEvent::Resumed { statistic: "MappingCount".into(), at: 2_000 };
    let position = |event: &SamplerEvent| events.iter().position(|e| e == event);
    assert!(position(&paused).unwrap() < position(&resumed).unwrap());

    reg.dispose();
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn is_active_does_not_count_as_an_access() {
    let (reg, _) = setup(10);
    reg.register_counter("MappingCount", Arc::new(Gauge::new(1))).unwrap();
    assert!(reg.is_active("MappingCount").unwrap());
    assert!(matches!(reg.is_active("Nope"), Err(MgmtError::UnknownStatistic(_))));
    assert!(reg.trace().is_empty());
}
