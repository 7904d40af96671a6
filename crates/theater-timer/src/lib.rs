//! Periodic timers owned by a Theater session.
//!
//! Every session drives two of these: the heartbeat (PING every ~10 s)
//! and the join poll (~1 s) that delivers handshake notices. A timer is
//! a plain value owned by the session task; dropping it or calling
//! [`PeriodicTimer::stop`] cancels it, and no tick is delivered after
//! that.
//!
//! # Disabled timers
//!
//! A zero period disables the timer: [`PeriodicTimer::wait_for_tick`]
//! pends forever, which is what a `tokio::select!` branch wants.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         cmd = conn.recv() => { /* dispatch */ }
//!         _ = heartbeat.wait_for_tick() => { /* send PING */ }
//!         _ = join_poll.wait_for_tick() => { /* drain notices */ }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the session task was busy past a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedTickPolicy {
    /// Fire once, then schedule the next tick a full period from now.
    /// Missed ticks are counted, never replayed.
    #[default]
    Skip,
    /// Fire once and keep the original cadence, so the next deadline may
    /// already be due.
    KeepCadence,
}

/// Configuration for one periodic timer.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Name used in logs ("heartbeat", "join-poll").
    pub name: &'static str,
    /// Time between ticks. `Duration::ZERO` disables the timer.
    pub period: Duration,
    /// Overrun handling.
    pub policy: MissedTickPolicy,
    /// Random extra delay (0..max) before the *first* tick, so sessions
    /// accepted in the same instant don't all fire together.
    pub initial_jitter: Duration,
}

impl TimerConfig {
    /// Shortest period accepted; anything lower is clamped.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// A timer with the given period, no jitter and the default policy.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            policy: MissedTickPolicy::default(),
            initial_jitter: Duration::ZERO,
        }
    }

    /// Builder: sets the first-tick jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// Builder: sets the missed-tick policy.
    pub fn with_policy(mut self, policy: MissedTickPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Clamps out-of-range values. Called by [`PeriodicTimer::new`].
    pub fn validated(mut self) -> Self {
        if !self.period.is_zero() && self.period < Self::MIN_PERIOD {
            warn!(
                timer = self.name,
                period_ms = self.period.as_secs_f64() * 1000.0,
                "timer period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }

    /// `true` when the period is zero.
    pub fn is_disabled(&self) -> bool {
        self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`PeriodicTimer::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Monotonically increasing tick number (starts at 1).
    pub number: u64,
    /// How far past its deadline this tick fired.
    pub late_by: Duration,
    /// Whole periods that elapsed without a tick (0 in normal operation).
    pub missed: u64,
}

/// Counters kept by a timer over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub fired: u64,
    pub missed: u64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// A cancellable periodic timer.
pub struct PeriodicTimer {
    config: TimerConfig,
    next_deadline: Option<Instant>,
    stopped: bool,
    stats: TimerStats,
}

impl PeriodicTimer {
    /// Creates a timer whose first tick is one period (plus jitter) away.
    pub fn new(config: TimerConfig) -> Self {
        let config = config.validated();

        let next_deadline = if config.is_disabled() {
            debug!(timer = config.name, "timer disabled (zero period)");
            None
        } else {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max_us = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
            };
            debug!(
                timer = config.name,
                period_ms = config.period.as_millis() as u64,
                jitter_us = jitter.as_micros() as u64,
                "timer started"
            );
            Some(Instant::now() + config.period + jitter)
        };

        Self {
            config,
            next_deadline,
            stopped: false,
            stats: TimerStats::default(),
        }
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever when the timer is disabled or stopped. Cancel-safe:
    /// dropping the future before it resolves loses no tick.
    pub async fn wait_for_tick(&mut self) -> Tick {
        let deadline = match self.next_deadline {
            Some(deadline) if !self.stopped => deadline,
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(deadline).await;

        let period = self.config.period;
        let now = Instant::now();
        let late_by = now.saturating_duration_since(deadline);
        let missed = (late_by.as_nanos() / period.as_nanos()) as u64;

        self.next_deadline = Some(match self.config.policy {
            MissedTickPolicy::Skip => now + period,
            MissedTickPolicy::KeepCadence => deadline + period,
        });

        self.stats.fired += 1;
        self.stats.missed += missed;
        if missed > 0 {
            warn!(
                timer = self.config.name,
                missed,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "timer fell behind"
            );
        }
        trace!(timer = self.config.name, tick = self.stats.fired, "timer tick");

        Tick {
            number: self.stats.fired,
            late_by,
            missed,
        }
    }

    /// Restarts the schedule so the next tick is one period from now.
    pub fn reset(&mut self) {
        if !self.stopped && !self.config.is_disabled() {
            self.next_deadline = Some(Instant::now() + self.config.period);
        }
    }

    /// Cancels the timer. No further ticks are delivered. Idempotent.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.next_deadline = None;
            debug!(timer = self.config.name, fired = self.stats.fired, "timer stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// Number of ticks delivered so far.
    pub fn tick_count(&self) -> u64 {
        self.stats.fired
    }

    pub fn stats(&self) -> &TimerStats {
        &self.stats
    }
}
