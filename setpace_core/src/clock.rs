//! Drift-corrected timing.
//!
//! Every timer in the engine derives its value from the difference between
//! two readings of a monotonic [`TimeSource`]. Nothing accumulates per tick,
//! so skipped, delayed or coalesced polls never introduce drift.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time axis
pub trait TimeSource: Send + Sync {
    /// Time elapsed since the source's own origin
    fn now(&self) -> Duration;
}

/// Wall-clock monotonic source backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced source. Clones share the same time axis.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Shared handle to the engine's time source
pub type SharedTime = Arc<dyn TimeSource>;

/// Start/pause clock whose elapsed value is `accumulated + (now - origin)`.
pub struct Clock {
    time: SharedTime,
    /// Source reading when the clock was last started; `None` while paused
    origin: Option<Duration>,
    accumulated: Duration,
    initial: Duration,
}

impl Clock {
    pub fn new(time: SharedTime) -> Self {
        Self {
            time,
            origin: None,
            accumulated: Duration::ZERO,
            initial: Duration::ZERO,
        }
    }

    pub fn is_running(&self) -> bool {
        self.origin.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.origin {
            Some(origin) => self.accumulated + self.time.now().saturating_sub(origin),
            None => self.accumulated,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs()
    }

    pub fn start(&mut self) {
        if self.origin.is_some() {
            return;
        }
        self.origin = Some(self.time.now());
        tracing::debug!("Clock started at {:?}", self.accumulated);
    }

    pub fn pause(&mut self) {
        if self.origin.is_none() {
            return;
        }
        self.accumulated = self.elapsed();
        self.origin = None;
        tracing::debug!("Clock paused at {:?}", self.accumulated);
    }

    /// Rewrite elapsed time and make it the new initial value.
    /// A running clock keeps running from `seconds`.
    pub fn reset(&mut self, seconds: u64) {
        self.set_time(seconds);
        self.initial = self.accumulated;
    }

    /// Rewrite elapsed time, keeping the running state.
    pub fn set_time(&mut self, seconds: u64) {
        self.set_elapsed(Duration::from_secs(seconds));
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.accumulated = elapsed;
        if self.origin.is_some() {
            self.origin = Some(self.time.now());
        }
    }

    /// Whether elapsed time differs from the value set by the last reset
    pub fn has_moved(&self) -> bool {
        self.elapsed() != self.initial
    }
}

/// Countdown anchored to a start reading of the time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    total: Duration,
    started_at: Duration,
}

impl Countdown {
    pub fn start(time: &dyn TimeSource, seconds: u32) -> Self {
        Self {
            total: Duration::from_secs(u64::from(seconds)),
            started_at: time.now(),
        }
    }

    pub fn total_secs(&self) -> u64 {
        self.total.as_secs()
    }

    pub fn remaining(&self, time: &dyn TimeSource) -> Duration {
        let run = time.now().saturating_sub(self.started_at);
        self.total.saturating_sub(run)
    }

    /// Remaining whole seconds, rounded up so a fresh 60s countdown reads 60
    pub fn remaining_secs(&self, time: &dyn TimeSource) -> u64 {
        let remaining = self.remaining(time);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    pub fn is_expired(&self, time: &dyn TimeSource) -> bool {
        self.remaining(time).is_zero()
    }
}
