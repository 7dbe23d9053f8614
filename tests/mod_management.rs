use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tiermon::context::{CACHE_MANAGER_NAME, CACHE_NAME};
use tiermon::errors::MgmtError;
use tiermon::management::{
    Descriptor, ManagementRegistry, SETTINGS_CAPABILITY, STATISTIC_COLLECTOR_CAPABILITY,
    STATISTICS_CAPABILITY,
};
use tiermon::stats::{
    CacheCounters, CacheGetOutcome, ManualClock, StatisticDescriptor, TierCounters, TierGauges,
    TierKind,
};
use tiermon::{Context, ManagementConfig, NotificationKind, StatisticsConfig};

fn registry() -> (ManagementRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let config = ManagementConfig {
        cache_manager_name: "my-super-cache-manager".into(),
        statistics: StatisticsConfig {
            history_size: 2,
            history_interval_ms: 3_600_000,
            ..Default::default()
        },
        ..Default::default()
    };
    (ManagementRegistry::with_clock(config, clock.clone()).unwrap(), clock)
}

fn add_cache(reg: &ManagementRegistry, alias: &str, tiers: &[TierKind]) -> (CacheCounters, Vec<TierGauges>) {
    let counters = CacheCounters::new(64);
    let (tier_counters, gauges): (Vec<TierCounters>, Vec<TierGauges>) =
        tiers.iter().map(|k| TierCounters::new(*k, 64)).unzip();
    reg.on_cache_added(alias, &counters, &tier_counters).unwrap();
    (counters, gauges)
}

fn statistic_names(reg: &ManagementRegistry) -> BTreeSet<String> {
    reg.capability(STATISTICS_CAPABILITY)
        .unwrap()
        .statistic_descriptors()
        .map(|d| d.name.clone())
        .collect()
}

fn names(descriptors: Vec<StatisticDescriptor>) -> BTreeSet<String> {
    descriptors.into_iter().map(|d| d.name).collect()
}

#[test]
fn capabilities_are_listed_in_fixed_order() {
    let (reg, _) = registry();
    let caps: Vec<String> = reg.list_capabilities().into_iter().map(|c| c.name).collect();
    assert_eq!(caps, vec![STATISTICS_CAPABILITY, STATISTIC_COLLECTOR_CAPABILITY, SETTINGS_CAPABILITY]);
    assert!(matches!(reg.capability("ActionsCapability"), Err(MgmtError::UnknownCapability(_))));
}

#[test]
fn removing_one_cache_removes_exactly_its_descriptors() {
    let (reg, _) = registry();
    add_cache(&reg, "dedicated-cache-1", &[TierKind::OnHeap, TierKind::OffHeap]);
    add_cache(&reg, "cache-2", &[TierKind::OnHeap, TierKind::Clustered]);

    let dedicated = names(reg.descriptors_for("dedicated-cache-1").unwrap());
    let cache2 = names(reg.descriptors_for("cache-2").unwrap());
    let all = statistic_names(&reg);
    assert_eq!(all, dedicated.union(&cache2).cloned().collect());
    assert!(all.contains("Clustered:HitRatio"));

    reg.on_cache_removed("cache-2").unwrap();
    assert_eq!(statistic_names(&reg), dedicated);
    assert!(!statistic_names(&reg).contains("Clustered:HitRatio"));
    assert_eq!(names(reg.descriptors_for("dedicated-cache-1").unwrap()), dedicated);
    assert!(matches!(reg.descriptors_for("cache-2"), Err(MgmtError::UnknownContext(_))));

    // the same snapshot enumerates identically twice
    assert_eq!(reg.list_capabilities(), reg.list_capabilities());
}

#[test]
fn settings_describe_each_bound_cache() {
    let (reg, _) = registry();
    add_cache(&reg, "cache-2", &[TierKind::OnHeap, TierKind::Clustered]);
    let settings = reg.capability(SETTINGS_CAPABILITY).unwrap();
    match &settings.descriptors[..] {
        [Descriptor::Settings(s)] => {
            assert_eq!(s.alias, "cache-2");
            assert_eq!(s.tiers, vec!["OnHeap", "Clustered"]);
            assert_eq!(s.history_size, 2);
        }
        other => panic!("unexpected settings: {other:?}"),
    }
}

#[test]
fn binding_a_live_alias_twice_fails() {
    let (reg, _) = registry();
    add_cache(&reg, "cache-2", &[]);
    let err = reg.on_cache_added("cache-2", &CacheCounters::new(8), &[]).unwrap_err();
    assert!(matches!(err, MgmtError::CacheAlreadyBound(a) if a == "cache-2"));
    reg.on_cache_removed("cache-2").unwrap();
    add_cache(&reg, "cache-2", &[]);
}

#[test]
fn query_statistic_resolves_contexts() {
    let (reg, clock) = registry();
    let (_, gauges) = add_cache(&reg, "cache-2", &[TierKind::OnHeap]);
    for v in [5, 7, 9] {
        gauges[0].mappings.set(v);
        clock.advance(1_000);
        assert!(reg.collect_statistics(&["OnHeap:MappingCount".to_string()]).executed);
    }
    let ctx = reg.cache_context("cache-2");
    let stat = reg.query_statistic(STATISTICS_CAPABILITY, &ctx, "OnHeap:MappingCount", 0).unwrap();
    let got: Vec<u64> = stat.integer_samples().unwrap().iter().map(|s| s.value).collect();
    assert_eq!(got, vec![7, 9]);

    let wrong_manager = Context::create(CACHE_MANAGER_NAME, "other").with(CACHE_NAME, "cache-2");
    assert!(matches!(
        reg.query_statistic(STATISTICS_CAPABILITY, &wrong_manager, "OnHeap:MappingCount", 0),
        Err(MgmtError::UnknownContext(_))
    ));
    assert!(matches!(
        reg.query_statistic(STATISTICS_CAPABILITY, &reg.cache_context("nope"), "OnHeap:MappingCount", 0),
        Err(MgmtError::UnknownContext(_))
    ));
    assert!(matches!(
        reg.query_statistic(SETTINGS_CAPABILITY, &ctx, "OnHeap:MappingCount", 0),
        Err(MgmtError::UnknownCapability(_))
    ));
    assert!(matches!(
        reg.query_statistic(STATISTICS_CAPABILITY, &ctx, "OnHeap:Nope", 0),
        Err(MgmtError::UnknownStatistic(_))
    ));
}

#[test]
fn batch_query_reports_unknown_names() {
    let (reg, clock) = registry();
    let (counters, _) = add_cache(&reg, "cache-2", &[]);
    counters.get.record(CacheGetOutcome::HitNoLoader, Duration::from_nanos(10));
    clock.advance(1_000);
    reg.collect_statistics(&[]);

    let ctx = reg.cache_context("cache-2");
    let batch = reg
        .query_statistics(&ctx, &["Cache:HitCount".to_string(), "Cache:Bogus".to_string()], 0)
        .unwrap();
    assert_eq!(batch.unknown, vec!["Cache:Bogus".to_string()]);
    let hit = &batch.statistics["Cache:HitCount"];
    assert_eq!(hit.integer_samples().unwrap()[0].value, 1);

    let everything = reg.query_statistics(&ctx, &[], 0).unwrap();
    assert_eq!(everything.statistics.len(), 17);
    assert!(everything.unknown.is_empty());
}

#[test]
fn collect_statistics_without_caches_does_not_execute() {
    let (reg, _) = registry();
    let result = reg.collect_statistics(&[]);
    assert!(!result.executed);
    assert!(result.returns.is_empty());
}

#[test]
fn collect_statistics_reaches_every_cache() {
    let (reg, _) = registry();
    add_cache(&reg, "dedicated-cache-1", &[]);
    add_cache(&reg, "cache-2", &[TierKind::OnHeap]);
    let result = reg.collect_statistics(&[]);
    assert!(result.executed);
    assert_eq!(result.returns.len(), 2);
    assert_eq!(result.failures().count(), 0);
    let cache2 = result
        .returns
        .iter()
        .find(|r| r.context.get(CACHE_NAME) == Some("cache-2"))
        .unwrap();
    // 5 cache-level registrations + 9 on-heap ones
    assert_eq!(cache2.result.as_ref().unwrap(), &serde_json::Value::from(14));
}

#[test]
fn cache_lifecycle_emits_events_in_order() {
    let (reg, _) = registry();
    reg.on_entity_registered("cache-manager-entity");
    reg.on_server_store_created("cache-2");
    reg.on_entity_registry_updated("cache-manager-entity");
    reg.on_client_registered("client-1");
    add_cache(&reg, "cache-2", &[]);

    let kinds: Vec<NotificationKind> = reg.drain_notifications().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::EntityRegistryUpdated,
            NotificationKind::EhcacheServerStoreCreated,
            NotificationKind::EntityRegistryUpdated,
            NotificationKind::ClientRegistryUpdated,
            NotificationKind::CacheAdded,
        ]
    );
    assert!(reg.peek_notifications().is_none());

    reg.on_client_registered("client-1");
    reg.on_cache_removed("cache-2").unwrap();
    reg.on_server_store_destroyed("cache-2");
    reg.on_entity_registry_updated("cache-manager-entity");
    let events = reg.drain_notifications();
    let kinds: Vec<NotificationKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::ClientRegistryUpdated,
            NotificationKind::CacheRemoved,
            NotificationKind::EhcacheServerStoreDestroyed,
            NotificationKind::EntityRegistryUpdated,
        ]
    );
    assert_eq!(events[1].context, reg.cache_context("cache-2"));
    assert!(reg.drain_notifications().is_empty());
}

#[test]
fn removing_an_unknown_cache_emits_nothing() {
    let (reg, _) = registry();
    assert!(matches!(reg.on_cache_removed("ghost"), Err(MgmtError::UnknownContext(_))));
    assert!(reg.peek_notifications().is_none());
}

#[test]
fn shutdown_releases_caches_and_is_idempotent() {
    let (reg, _) = registry();
    add_cache(&reg, "cache-2", &[TierKind::OnHeap]);
    let ctx = reg.cache_context("cache-2");
    reg.shutdown();
    reg.shutdown();
    assert!(reg.is_shut_down());
    assert!(reg.catalog().is_empty());
    assert!(!reg.collect_statistics(&[]).executed);
    assert!(matches!(
        reg.query_statistic(STATISTICS_CAPABILITY, &ctx, "Cache:HitCount", 0),
        Err(MgmtError::RegistryDisposed)
    ));
    assert!(matches!(
        reg.on_cache_added("late", &CacheCounters::new(8), &[]),
        Err(MgmtError::RegistryDisposed)
    ));
    // the CACHE_ADDED event is still drainable
    assert_eq!(reg.drain_notifications().len(), 1);
}
