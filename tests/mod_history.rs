use proptest::prelude::*;
use tiermon::stats::SampledHistory;

fn history(capacity: usize) -> SampledHistory<u64> {
    SampledHistory::new(capacity)
}

#[test]
fn query_filters_by_since_inclusive() {
    let h = history(10);
    for t in 1..=5u64 {
        h.record(t * 10, t * 1_000);
    }
    let got: Vec<u64> = h.query(3_000).iter().map(|s| s.value).collect();
    assert_eq!(got, vec![30, 40, 50]);
    assert_eq!(h.query(6_000).len(), 0);
    // query does not consume
    assert_eq!(h.len(), 5);
}

#[test]
fn out_of_order_samples_are_kept_in_arrival_order() {
    let h = history(4);
    h.record(1, 2_000);
    h.record(2, 1_000);
    let got: Vec<(u64, u64)> = h.query(0).iter().map(|s| (s.timestamp, s.value)).collect();
    assert_eq!(got, vec![(2_000, 1), (1_000, 2)]);
    assert_eq!(h.latest().map(|s| s.value), Some(2));
}

#[test]
fn concurrent_readers_see_whole_samples() {
    let h = std::sync::Arc::new(history(64));
    let writer = {
        let h = h.clone();
        std::thread::spawn(move || {
            for i in 0..1_000u64 {
                h.record(i, i);
            }
        })
    };
    for _ in 0..100 {
        for s in h.query(0) {
            assert_eq!(s.timestamp, s.value);
        }
    }
    writer.join().unwrap();
    assert_eq!(h.len(), 64);
}

proptest! {
    #![proptest_config(proptest::test_runner::Config {
        cases: 64,
        .. proptest::test_runner::Config::default()
    })]
    #[test]
    fn prop_history_keeps_the_most_recent_capacity_samples(
        capacity in 1usize..32,
        values in proptest::collection::vec(any::<u64>(), 0..128),
    ) {
        let h = history(capacity);
        for (i, v) in values.iter().enumerate() {
            h.record(*v, i as u64);
        }
        let got: Vec<u64> = h.query(0).iter().map(|s| s.value).collect();
        let expected: Vec<u64> = values.iter().rev().take(capacity).rev().copied().collect();
        prop_assert!(got.len() <= capacity);
        prop_assert_eq!(got, expected);
    }
}
