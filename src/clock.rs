//! Monotonic time sources and interval pacing for the busy-poll loops.
//!
//! Both pipeline workers spin against a [`Clock`] instead of sleeping. A
//! [`Pacer`] answers "has at least one interval passed since the last
//! action?", which is all the rate control the loops need.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Source of monotonic timestamps.
pub trait Clock: Send + 'static {
    /// Current reading. Successive readings never go backwards.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant { Instant::now() }
}

/// Hand-driven [`Clock`] for deterministic tests.
///
/// Clones share the same reading, so a test can keep one handle and move
/// another into the code under test.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ipfrag::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(5));
/// assert_eq!(clock.now() - start, Duration::from_millis(5));
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self { Self::new() }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant { *self.now.lock().unwrap_or_else(PoisonError::into_inner) }
}

/// Fires at most once per `interval`.
///
/// The first call to [`Pacer::is_due`] always reports due, matching a loop
/// whose previous action happened "at time zero".
#[derive(Clone, Copy, Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration { self.interval }

    /// Whether at least one interval has elapsed since the last [`Pacer::mark`].
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Record that the paced action ran at `now`.
    pub fn mark(&mut self, now: Instant) { self.last = Some(now); }

    /// Check and mark in one step. Returns `true` when the action should run.
    pub fn tick(&mut self, now: Instant) -> bool {
        let due = self.is_due(now);
        if due {
            self.mark(now);
        }
        due
    }
}
