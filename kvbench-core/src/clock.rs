//! Monotonic time source, in microseconds.
//!
//! Everything in the core that measures or schedules time — the
//! throttle, the coordinator's stage-duration sleep, latency sampling —
//! goes through this module so there is exactly one place that touches
//! [`std::time::Instant`].

use std::thread;
use std::time::{Duration, Instant};

/// An opaque monotonic timestamp, in microseconds since an arbitrary
/// process-local epoch (the first call to [`Clock::now`]).
pub type Micros = u64;

/// Monotonic clock anchored at construction time.
///
/// `Instant` itself has no meaningful "zero"; anchoring lets the rest of
/// the crate work with plain `u64` microsecond counts, which is what the
/// histogram, throttle and stage-duration math all want.
#[derive(Debug, Clone)]
pub struct Clock {
    epoch: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Clock { epoch: Instant::now() }
    }

    /// Microseconds elapsed since this clock was constructed.
    pub fn now(&self) -> Micros {
        self.epoch.elapsed().as_micros() as Micros
    }

    /// Converts a clock reading back into an `Instant`, for use with
    /// `Condvar::wait_timeout_while` and similar std APIs that want one.
    pub fn instant_at(&self, micros: Micros) -> Instant {
        self.epoch + Duration::from_micros(micros)
    }

    /// Sleeps the calling thread until `wakeup` (a reading from this
    /// clock), returning early if `wakeup` is already in the past.
    ///
    /// Unlike a bare `thread::sleep`, this is safe to call with a
    /// `wakeup` that may be in the past — it returns immediately rather
    /// than computing a negative duration (which would panic).
    pub fn sleep_until(&self, wakeup: Micros) {
        let now = self.now();
        if wakeup > now {
            thread::sleep(Duration::from_micros(wakeup - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic_and_starts_near_zero() {
        let clock = Clock::new();
        let t0 = clock.now();
        let t1 = clock.now();
        assert!(t1 >= t0);
        assert!(t0 < 50_000);
    }

    #[test]
    fn sleep_until_past_wakeup_returns_immediately() {
        let clock = Clock::new();
        let started = Instant::now();
        clock.sleep_until(0);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn sleep_until_future_wakeup_waits_at_least_that_long() {
        let clock = Clock::new();
        let wakeup = clock.now() + 20_000;
        let started = Instant::now();
        clock.sleep_until(wakeup);
        assert!(started.elapsed() >= Duration::from_micros(19_000));
    }
}
