#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

use rampload::loadtest::error::ErrorKind;
use rampload::loadtest::executor::RequestResult;
use rampload::loadtest::metrics::MetricsCollector;

#[derive(Debug, Arbitrary)]
enum Sample {
    Response { status: u16, latency_ms: u64, passed: bool },
    Timeout { latency_ms: u64 },
    Connection { latency_ms: u64 },
}

impl Sample {
    fn into_result(self) -> RequestResult {
        match self {
            Sample::Response { status, latency_ms, passed } => RequestResult {
                status_code: Some(status),
                latency: Duration::from_millis(latency_ms),
                error: None,
                check_outcomes: vec![("check".to_string(), passed)],
            },
            Sample::Timeout { latency_ms } => failed(ErrorKind::Timeout, latency_ms),
            Sample::Connection { latency_ms } => failed(
                ErrorKind::Connection {
                    message: "reset".to_string(),
                },
                latency_ms,
            ),
        }
    }
}

fn failed(error: ErrorKind, latency_ms: u64) -> RequestResult {
    RequestResult {
        status_code: None,
        latency: Duration::from_millis(latency_ms),
        error: Some(error),
        check_outcomes: vec![("check".to_string(), false)],
    }
}

fuzz_target!(|samples: Vec<Sample>| {
    let collector = MetricsCollector::new();
    let n = samples.len() as u64;
    for sample in samples {
        collector.record(&sample.into_result());
    }
    let snap = collector.snapshot();
    assert_eq!(snap.total_iterations, n);
    assert!((0.0..=1.0).contains(&snap.error_rate()));
    assert!(snap.latency.min <= snap.latency.max);
});
