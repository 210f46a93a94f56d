//! Run controller: drives the ramp from start to verdict.
//!
//! [`RunController`] is the top-level orchestrator that:
//! - Ticks at a fixed interval, asking the [`StageScheduler`] for a target
//!   and reconciling the [`VirtualUserPool`] toward it
//! - Drains the pool once the final stage boundary passes (or on cancel)
//! - Force-stops workers still running when the grace period expires
//! - Snapshots metrics and evaluates thresholds into a [`Verdict`]
//!
//! The state machine is `Idle → Ramping → Draining → Completed`, published
//! through a [`watch`] channel.
//!
//! [`StageScheduler`]: crate::loadtest::scheduler::StageScheduler

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::loadtest::clock::{default_clock, SharedClock};
use crate::loadtest::executor::{HttpTransport, ReqwestTransport, RequestExecutor};
use crate::loadtest::metrics::{AggregateMetrics, MetricsCollector};
use crate::loadtest::pool::{PoolStatus, VirtualUserPool};
use crate::loadtest::profile::RunProfile;
use crate::loadtest::threshold::{evaluate_all, ThresholdOutcome, Verdict};
use crate::loadtest::vu::{ActiveVuCounter, VuContext};

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Ramping,
    Draining,
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Ramping => "ramping",
            Self::Draining => "draining",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Frozen aggregate metrics.
    pub metrics: AggregateMetrics,
    /// Wall time from start of ramp to completion.
    pub elapsed: Duration,
    /// Workers aborted at grace-period expiry; their in-flight results were discarded.
    pub force_stopped: u32,
    /// Highest active VU count observed at a reconcile tick.
    pub max_vus: u32,
    /// Pool counts at completion.
    pub pool: PoolStatus,
    /// Whether the ramp was cut short by cancellation.
    pub cancelled: bool,
    pub thresholds: Vec<ThresholdOutcome>,
    pub verdict: Verdict,
}

/// Top-level run orchestration and entry point.
pub struct RunController {
    profile: Arc<RunProfile>,
    transport: Arc<dyn HttpTransport>,
    clock: SharedClock,
    state_tx: watch::Sender<RunState>,
    cancel: CancellationToken,
}

impl fmt::Debug for RunController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("target", &self.profile.target.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl RunController {
    /// Creates a controller that issues real HTTP requests.
    pub fn new(profile: RunProfile) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            profile: Arc::new(profile),
            transport: Arc::new(ReqwestTransport::new()),
            clock: default_clock(),
            state_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The run profile.
    pub fn profile(&self) -> &RunProfile {
        &self.profile
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// Token that ends the ramp early and starts draining when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&self, next: RunState) {
        let prev = self.state_tx.send_replace(next);
        info!(from = %prev, to = %next, "run state changed");
    }

    /// Execute the run to completion. Per-iteration failures are recorded in
    /// metrics; nothing here fails.
    pub async fn run(&self) -> RunResult {
        let profile = &self.profile;
        let scheduler = &profile.scheduler;
        let metrics = Arc::new(MetricsCollector::new());
        let executor = RequestExecutor::new(
            self.transport.clone(),
            profile.checks.clone(),
            self.clock.clone(),
        );
        let mut pool = VirtualUserPool::new(VuContext {
            executor,
            request: profile.request.clone(),
            params: profile.params.clone(),
            metrics: metrics.clone(),
            active: ActiveVuCounter::new(),
        });

        let start = self.clock.now();
        self.transition(RunState::Ramping);
        info!(
            url = %profile.target,
            stages = scheduler.stages().len(),
            duration = %humantime::format_duration(scheduler.total_duration()),
            max_vus = scheduler.max_target(),
            "ramp started"
        );

        let mut tick = tokio::time::interval(profile.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut current_stage = None;
        let mut max_vus = 0;
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = tick.tick() => {},
                _ = self.cancel.cancelled() => {
                    info!("run cancelled, draining early");
                    cancelled = true;
                    break;
                },
            }

            let elapsed = self.clock.elapsed_since(start);
            if scheduler.is_complete(elapsed) {
                break;
            }

            let stage = scheduler.stage_index_at(elapsed);
            if stage != current_stage {
                current_stage = stage;
                info!(stage = %scheduler.stage_label(elapsed), "stage started");
            }

            let target = scheduler.target_concurrency(elapsed);
            pool.reconcile(target);
            let status = pool.status();
            max_vus = max_vus.max(status.active());
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                desired = target,
                active = status.active(),
                draining = status.draining,
                "reconciled"
            );
        }

        self.transition(RunState::Draining);
        pool.drain_all();
        let force_stopped = if pool.wait_idle(profile.grace_period).await {
            0
        } else {
            let aborted = pool.abort_remaining().await;
            warn!(
                force_stopped = aborted,
                grace = %humantime::format_duration(profile.grace_period),
                "grace period expired; in-flight iterations discarded"
            );
            aborted
        };

        let snapshot = metrics.snapshot();
        let (thresholds, verdict) = evaluate_all(&profile.thresholds, &snapshot);
        let elapsed = self.clock.elapsed_since(start);
        self.transition(RunState::Completed);
        info!(
            iterations = snapshot.total_iterations,
            errored = snapshot.requests_errored,
            verdict = %verdict,
            "run completed"
        );

        RunResult {
            metrics: snapshot,
            elapsed,
            force_stopped,
            max_vus,
            pool: pool.status(),
            cancelled,
            thresholds,
            verdict,
        }
    }
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C cancels `cancel`, which drains the pool gracefully.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
pub async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    eprintln!("\nReceived Ctrl+C, draining virtual users...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::check::{CheckConfig, CheckKind};
    use crate::loadtest::config::{LoadTestConfig, Settings, Stage};
    use crate::loadtest::error::ErrorKind;
    use crate::loadtest::executor::testing::ScriptedTransport;
    use crate::loadtest::executor::TransportResponse;
    use crate::loadtest::template::TemplateParams;
    use crate::loadtest::threshold::ThresholdConfig;
    use parking_lot::Mutex;
    use rand::prelude::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn profile(stages: Vec<Stage>, thresholds: Vec<ThresholdConfig>) -> RunProfile {
        let mut settings = Settings::with_target("http://${ALB_DNS}/load?duration=1");
        settings.request_timeout = secs(10);
        let config = LoadTestConfig {
            settings,
            stage: stages,
            check: vec![CheckConfig {
                name: "status was 200".to_string(),
                kind: CheckKind::StatusEquals { status: 200 },
            }],
            threshold: thresholds,
        };
        let params: TemplateParams = [("ALB_DNS".to_string(), "mock.local".to_string())]
            .into_iter()
            .collect();
        RunProfile::from_config(&config, params).unwrap()
    }

    fn scenario_stages() -> Vec<Stage> {
        vec![
            Stage::new(secs(30), 10),
            Stage::new(secs(60), 10),
            Stage::new(secs(30), 0),
        ]
    }

    fn pass_rate_threshold() -> Vec<ThresholdConfig> {
        vec![ThresholdConfig::CheckPassRate {
            min: 0.95,
            check: None,
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_ok_endpoint_passes() {
        let transport = Arc::new(ScriptedTransport::always(Duration::from_millis(100), 200));
        let controller = RunController::new(profile(scenario_stages(), pass_rate_threshold()))
            .with_transport(transport.clone());
        assert_eq!(controller.state(), RunState::Idle);

        let result = controller.run().await;

        assert_eq!(controller.state(), RunState::Completed);
        assert!(result.metrics.total_iterations > 500);
        assert_eq!(result.metrics.check_pass_rate(), 1.0);
        assert_eq!(result.metrics.requests_errored, 0);
        assert_eq!(result.pool.live(), 0);
        assert_eq!(result.force_stopped, 0);
        assert_eq!(result.max_vus, 10);
        assert!(!result.cancelled);
        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.verdict.exit_code(), 0);
        assert_eq!(transport.calls(), result.metrics.total_iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_500_breaches_threshold() {
        let transport = Arc::new(ScriptedTransport::always(Duration::from_millis(100), 500));
        let controller = RunController::new(profile(scenario_stages(), pass_rate_threshold()))
            .with_transport(transport);

        let result = controller.run().await;

        let check = result.metrics.check("status was 200").unwrap();
        assert_eq!(check.passed, 0);
        assert!(check.failed > 0);
        assert_eq!(result.metrics.status_codes.get(&500), Some(&check.failed));
        assert_eq!(result.verdict, Verdict::Fail);
        assert_ne!(result.verdict.exit_code(), 0);
        assert!(!result.thresholds[0].passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_dropped_connections() {
        let rng = Mutex::new(rand::rngs::StdRng::seed_from_u64(0x5eed));
        let transport = Arc::new(ScriptedTransport::new(Duration::from_millis(50), move |_| {
            if rng.lock().random_bool(0.5) {
                Err(ErrorKind::Connection {
                    message: "connection reset by peer".to_string(),
                })
            } else {
                Ok(TransportResponse::status(200))
            }
        }));
        let stages = vec![
            Stage::new(secs(10), 20),
            Stage::new(secs(50), 20),
            Stage::new(secs(10), 0),
        ];
        let controller = RunController::new(profile(stages, vec![])).with_transport(transport);

        let result = controller.run().await;

        let m = &result.metrics;
        assert!(m.total_iterations > 800, "iterations {}", m.total_iterations);
        let share = m.requests_errored as f64 / m.total_iterations as f64;
        assert!((0.42..=0.58).contains(&share), "network error share {share}");
        assert_eq!(m.error_categories.get("connection"), Some(&m.requests_errored));
        assert_eq!(result.verdict, Verdict::Pass, "no thresholds configured");
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_expiry_force_stops_and_discards() {
        let transport = Arc::new(ScriptedTransport::always(secs(60), 200));
        let mut p = profile(vec![Stage::new(secs(2), 3)], vec![]);
        p.grace_period = secs(2);
        let controller = RunController::new(p).with_transport(transport);

        let result = controller.run().await;

        assert_eq!(result.force_stopped, 2);
        assert_eq!(result.metrics.total_iterations, 0);
        assert_eq!(result.pool.live(), 0);
        assert_eq!(controller.state(), RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drains_early_and_reports_transitions() {
        let transport = Arc::new(ScriptedTransport::always(Duration::from_millis(100), 200));
        let stages = vec![Stage::new(secs(10), 5), Stage::new(secs(590), 5)];
        let controller = RunController::new(profile(stages, vec![])).with_transport(transport);

        let mut rx = controller.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_seen = seen.clone();
        let observer = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                observer_seen.lock().push(state);
                if state == RunState::Completed {
                    break;
                }
            }
        });

        let token = controller.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(secs(30)).await;
            token.cancel();
        });

        let result = controller.run().await;
        observer.await.unwrap();

        assert!(result.cancelled);
        assert!(result.elapsed < secs(60));
        assert!(result.metrics.total_iterations > 0);
        assert_eq!(result.pool.live(), 0);
        assert_eq!(
            *seen.lock(),
            vec![RunState::Ramping, RunState::Draining, RunState::Completed]
        );
    }
}
