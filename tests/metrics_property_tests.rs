//! Property-based tests for MetricsCollector invariants.
//!
//! Aggregation must be commutative: the same multiset of iteration results
//! produces an identical snapshot regardless of recording order.

use proptest::prelude::*;
use std::time::Duration;

use rampload::loadtest::error::ErrorKind;
use rampload::loadtest::executor::RequestResult;
use rampload::loadtest::metrics::MetricsCollector;

fn arb_result() -> impl Strategy<Value = RequestResult> {
    prop_oneof![
        (
            prop::sample::select(vec![200u16, 201, 404, 500, 503]),
            1u64..5_000,
            any::<bool>(),
        )
            .prop_map(|(status, ms, latency_ok)| RequestResult {
                status_code: Some(status),
                latency: Duration::from_millis(ms),
                error: None,
                check_outcomes: vec![
                    ("status was 200".to_string(), status == 200),
                    ("fast".to_string(), latency_ok),
                ],
            }),
        (1u64..10_000, any::<bool>()).prop_map(|(ms, timed_out)| {
            let error = if timed_out {
                ErrorKind::Timeout
            } else {
                ErrorKind::Connection {
                    message: "connection reset".to_string(),
                }
            };
            RequestResult {
                status_code: None,
                latency: Duration::from_millis(ms),
                error: Some(error),
                check_outcomes: vec![
                    ("status was 200".to_string(), false),
                    ("fast".to_string(), false),
                ],
            }
        }),
    ]
}

fn collect(results: &[RequestResult]) -> MetricsCollector {
    let collector = MetricsCollector::new();
    for r in results {
        collector.record(r);
    }
    collector
}

proptest! {
    #[test]
    fn snapshot_is_order_independent(
        (results, shuffled) in prop::collection::vec(arb_result(), 0..200)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
    ) {
        let a = collect(&results).snapshot();
        let b = collect(&shuffled).snapshot();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn counts_partition_iterations(results in prop::collection::vec(arb_result(), 0..200)) {
        let snap = collect(&results).snapshot();
        let responded: u64 = snap.status_codes.values().sum();

        prop_assert_eq!(snap.total_iterations, results.len() as u64);
        prop_assert_eq!(responded + snap.requests_errored, snap.total_iterations);
        prop_assert_eq!(snap.latency.count, responded);
        prop_assert_eq!(snap.checks_passed + snap.checks_failed, 2 * snap.total_iterations);
        prop_assert!((0.0..=1.0).contains(&snap.error_rate()));
        prop_assert!((0.0..=1.0).contains(&snap.check_pass_rate()));
    }
}
