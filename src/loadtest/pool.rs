//! Virtual user pool: owns every live VU and reconciles its size.
//!
//! Scale-down drains the most recently spawned workers first. Scale-up first
//! revives workers that are still draining (oldest first) and only then
//! spawns, so the number of live workers never exceeds
//! `max(live_before, desired)`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::loadtest::vu::{vu_loop, ActiveVuCounter, DrainSignal, VuContext};

/// Lifecycle of one VU as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualUserState {
    /// Task spawned, first iteration not yet begun.
    Spawning,
    /// Iterating.
    Running,
    /// Asked to stop after its current iteration.
    Draining,
    /// Task finished or aborted.
    Stopped,
}

impl fmt::Display for VirtualUserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Pool counts at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub spawning: u32,
    pub running: u32,
    pub draining: u32,
    /// Workers stopped since the pool was created.
    pub stopped_total: u32,
}

impl PoolStatus {
    /// Workers that will keep iterating (spawning + running).
    pub fn active(&self) -> u32 {
        self.spawning + self.running
    }

    /// Workers whose task has not yet stopped.
    pub fn live(&self) -> u32 {
        self.active() + self.draining
    }
}

struct VuHandle {
    id: u32,
    state: VirtualUserState,
    signal: DrainSignal,
    task: JoinHandle<()>,
}

/// Owns the set of live VUs. Workers are kept in spawn order.
pub struct VirtualUserPool {
    ctx: VuContext,
    tracker: TaskTracker,
    workers: Vec<VuHandle>,
    next_id: u32,
    stopped_total: u32,
}

impl fmt::Debug for VirtualUserPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualUserPool")
            .field("status", &self.status())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl VirtualUserPool {
    pub fn new(ctx: VuContext) -> Self {
        Self {
            ctx,
            tracker: TaskTracker::new(),
            workers: Vec::new(),
            next_id: 0,
            stopped_total: 0,
        }
    }

    /// Counter of VU tasks actually executing, including draining ones.
    pub fn active_tasks(&self) -> ActiveVuCounter {
        self.ctx.active.clone()
    }

    /// Current counts. Call [`refresh`](Self::refresh) first for fresh data.
    pub fn status(&self) -> PoolStatus {
        let mut status = PoolStatus {
            stopped_total: self.stopped_total,
            ..PoolStatus::default()
        };
        for w in &self.workers {
            match w.state {
                VirtualUserState::Spawning => status.spawning += 1,
                VirtualUserState::Running => status.running += 1,
                VirtualUserState::Draining => status.draining += 1,
                VirtualUserState::Stopped => {},
            }
        }
        status
    }

    /// `(id, state)` of every tracked worker in spawn order.
    pub fn states(&self) -> Vec<(u32, VirtualUserState)> {
        self.workers.iter().map(|w| (w.id, w.state)).collect()
    }

    /// Promote started workers and reap finished ones.
    pub fn refresh(&mut self) {
        for w in &mut self.workers {
            let next = match w.state {
                VirtualUserState::Draining if w.signal.has_exited() || w.task.is_finished() => {
                    Some(VirtualUserState::Stopped)
                },
                VirtualUserState::Spawning | VirtualUserState::Running
                    if w.task.is_finished() =>
                {
                    warn!(vu = w.id, "virtual user exited without being drained");
                    Some(VirtualUserState::Stopped)
                },
                VirtualUserState::Spawning if w.signal.has_started() => {
                    Some(VirtualUserState::Running)
                },
                _ => None,
            };
            if let Some(state) = next {
                if state == VirtualUserState::Stopped {
                    self.stopped_total += 1;
                    debug!(vu = w.id, iterations = w.signal.iterations(), "virtual user stopped");
                }
                w.state = state;
            }
        }
        self.workers.retain(|w| w.state != VirtualUserState::Stopped);
    }

    /// Adjust the pool toward `desired` active workers.
    pub fn reconcile(&mut self, desired: u32) {
        self.refresh();
        let active = self.status().active();

        if desired > active {
            let mut needed = desired - active;
            for w in self
                .workers
                .iter_mut()
                .filter(|w| w.state == VirtualUserState::Draining)
            {
                if needed == 0 {
                    break;
                }
                if w.signal.revive() {
                    w.state = if w.signal.has_started() {
                        VirtualUserState::Running
                    } else {
                        VirtualUserState::Spawning
                    };
                    needed -= 1;
                    debug!(vu = w.id, "virtual user revived");
                } else {
                    w.state = VirtualUserState::Stopped;
                    self.stopped_total += 1;
                    debug!(vu = w.id, "virtual user stopped before revival");
                }
            }
            self.workers.retain(|w| w.state != VirtualUserState::Stopped);
            for _ in 0..needed {
                self.spawn();
            }
        } else if desired < active {
            let excess = (active - desired) as usize;
            for w in self
                .workers
                .iter_mut()
                .rev()
                .filter(|w| {
                    matches!(
                        w.state,
                        VirtualUserState::Spawning | VirtualUserState::Running
                    )
                })
                .take(excess)
            {
                w.signal.request_drain();
                w.state = VirtualUserState::Draining;
                debug!(vu = w.id, "virtual user draining");
            }
        }
    }

    fn spawn(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        let signal = DrainSignal::new();
        let task = self
            .tracker
            .spawn(vu_loop(id, self.ctx.clone(), signal.clone()));
        debug!(vu = id, "virtual user spawned");
        self.workers.push(VuHandle {
            id,
            state: VirtualUserState::Spawning,
            signal,
            task,
        });
    }

    /// Ask every active worker to drain.
    pub fn drain_all(&mut self) {
        self.reconcile(0);
    }

    /// Wait up to `grace` for every worker to stop. Returns `true` if the
    /// pool emptied in time.
    pub async fn wait_idle(&mut self, grace: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        self.refresh();
        finished && self.workers.is_empty()
    }

    /// Forcefully stop every remaining worker, discarding in-flight
    /// iterations. Returns how many were aborted.
    pub async fn abort_remaining(&mut self) -> u32 {
        let mut aborted = 0;
        for w in self.workers.drain(..) {
            w.task.abort();
            aborted += 1;
            warn!(vu = w.id, state = %w.state, "virtual user force-stopped");
        }
        self.stopped_total += aborted;
        self.tracker.close();
        self.tracker.wait().await;
        aborted
    }
}
