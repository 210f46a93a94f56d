//! Monotonic time source for run scheduling.
//!
//! Everything that decides *when* something happens (stage interpolation,
//! reconcile ticks, grace-period expiry) reads time through [`Clock`].
//! [`TokioClock`] is backed by [`tokio::time::Instant`], so tests running
//! under `#[tokio::test(start_paused = true)]` drive the whole engine on
//! virtual time without any real sleeping.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// A monotonic clock.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Time elapsed since `start`, saturating at zero.
    fn elapsed_since(&self, start: Instant) -> Duration {
        self.now().saturating_duration_since(start)
    }
}

/// Clock backed by tokio's timer driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Returns the default clock for production runs.
pub fn default_clock() -> SharedClock {
    Arc::new(TokioClock)
}
