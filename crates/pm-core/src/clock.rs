//! Time sources for probe durations.

use std::cell::Cell;
use std::time::Instant;

/// A source of timestamps, in seconds.
pub trait Clock {
    /// Returns the current time in seconds.
    fn now(&self) -> f64;
}

/// Wall-clock time measured from when the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
///
/// Used for replaying recorded traces and in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: f64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Moves the clock to an absolute time.
    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[expect(
        clippy::float_cmp,
        reason = "manual clock values are exact"
    )]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1.5);
        assert_eq!(clock.now(), 1.5);

        clock.advance(2.0);
        assert_eq!(clock.now(), 3.5);

        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(first >= 0.0);
        assert!(second >= first);
    }
}
