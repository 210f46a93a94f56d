//! Virtual user (VU) task loop.
//!
//! Each VU loops request → record → sleep until the pool asks it to drain.
//! The drain request is only observed at an iteration boundary, so a VU is
//! never interrupted mid-request or mid-sleep by a graceful scale-down.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::loadtest::executor::{RequestExecutor, RequestTemplate};
use crate::loadtest::metrics::MetricsCollector;
use crate::loadtest::template::TemplateParams;

const RUN: u8 = 0;
const DRAIN: u8 = 1;
const EXITED: u8 = 2;

/// Atomic counter tracking the number of VU tasks currently executing.
///
/// Lightweight wrapper around `Arc<AtomicU32>` for clone-friendly sharing
/// across VU tasks and the pool. Decremented by a drop guard, so a task
/// aborted mid-request still leaves the count accurate.
#[derive(Debug, Clone, Default)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current number of executing VU tasks.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveVuGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ActiveVuGuard(self.0.clone())
    }
}

struct ActiveVuGuard(Arc<AtomicU32>);

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared control block between the pool and one VU.
///
/// The drain flag is a tri-state: the pool moves `RUN → DRAIN` (drain) and
/// `DRAIN → RUN` (revive); the VU moves `DRAIN → EXITED` at an iteration
/// boundary. Revive and exit race on the same compare-exchange, so exactly
/// one of them wins.
#[derive(Debug, Clone, Default)]
pub struct DrainSignal(Arc<SignalState>);

#[derive(Debug, Default)]
struct SignalState {
    flag: AtomicU8,
    started: AtomicBool,
    iterations: AtomicU64,
}

impl DrainSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the VU to stop after its current iteration. Returns `false` if it
    /// was not running.
    pub fn request_drain(&self) -> bool {
        self.0
            .flag
            .compare_exchange(RUN, DRAIN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Cancel a pending drain. Returns `false` if the VU already exited.
    pub fn revive(&self) -> bool {
        self.0
            .flag
            .compare_exchange(DRAIN, RUN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether a drain is pending.
    pub fn is_draining(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst) == DRAIN
    }

    /// Whether the VU acknowledged a drain and left its loop.
    pub fn has_exited(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst) == EXITED
    }

    /// Whether the VU task has begun executing.
    pub fn has_started(&self) -> bool {
        self.0.started.load(Ordering::SeqCst)
    }

    /// Completed iterations.
    pub fn iterations(&self) -> u64 {
        self.0.iterations.load(Ordering::SeqCst)
    }

    fn acknowledge_drain(&self) -> bool {
        self.0
            .flag
            .compare_exchange(DRAIN, EXITED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Everything a VU needs, shared read-only across all VUs of a run.
#[derive(Debug, Clone)]
pub struct VuContext {
    pub executor: RequestExecutor,
    pub request: Arc<RequestTemplate>,
    pub params: Arc<TemplateParams>,
    pub metrics: Arc<MetricsCollector>,
    pub active: ActiveVuCounter,
}

/// Main virtual user task loop.
///
/// Iterations are strictly sequential: the next request is only issued after
/// the previous result was recorded and the iteration sleep elapsed.
pub async fn vu_loop(vu_id: u32, ctx: VuContext, signal: DrainSignal) {
    let _guard = ctx.active.enter();
    signal.0.started.store(true, Ordering::SeqCst);
    debug!(vu = vu_id, "virtual user started");

    loop {
        if signal.acknowledge_drain() {
            break;
        }

        let result = ctx.executor.execute(&ctx.request, &ctx.params).await;
        trace!(
            vu = vu_id,
            status = ?result.status_code,
            latency_ms = result.latency.as_millis() as u64,
            error = result.error.as_ref().map(|e| e.category()),
            "iteration complete"
        );
        ctx.metrics.record(&result);
        signal.0.iterations.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(ctx.request.iteration_sleep).await;
    }

    debug!(vu = vu_id, iterations = signal.iterations(), "virtual user stopped");
}
