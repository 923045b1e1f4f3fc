//! Per-worker dynamic throttle.
//!
//! Converges the observed inter-operation period to a `target_period` by
//! learning, as a rolling average, how much "extra" time each operation
//! takes beyond the pause it was given — then subtracting that from the
//! next pause. One instance lives on each worker's [`crate::ThreadData`];
//! it is never shared across threads, so there is no synchronization
//! here at all.

/// Approximate window (in samples) the rolling average is taken over.
const N: u64 = 20;

/// Adaptive pacer: given a stream of tick timestamps, returns how long
/// to pause before the next operation so that the long-run mean period
/// between ticks converges to `target_period`.
#[derive(Debug, Clone)]
pub struct DynThrottle {
    target_period: f64,
    n_records: u64,
    last_rec: Option<u64>,
    last_pause: u64,
    avg_fn_delay: f64,
    skip_next_update: bool,
}

impl DynThrottle {
    /// `target_period_us` is the desired average time between ticks, in
    /// microseconds. `0` is rejected by callers upstream (a `tps == 0`
    /// stage is unthrottled and never constructs a throttle at all).
    pub fn new(target_period_us: f64) -> Self {
        DynThrottle {
            target_period: target_period_us,
            n_records: 0,
            last_rec: None,
            last_pause: 0,
            avg_fn_delay: 0.0,
            skip_next_update: false,
        }
    }

    /// Records a tick at monotonic time `rec` (microseconds) and returns
    /// how long to pause, in microseconds, before the next operation.
    ///
    /// The first call on a fresh throttle only seeds `last_rec` and
    /// returns `0`, since there is no prior tick to measure a period
    /// against.
    pub fn pause_for(&mut self, rec: u64) -> u64 {
        let Some(last) = self.last_rec else {
            self.last_rec = Some(rec);
            self.n_records += 1;
            self.last_pause = 0;
            return 0;
        };

        let delta = rec.saturating_sub(last) as f64;

        if self.skip_next_update {
            self.skip_next_update = false;
        } else {
            let excess = delta - self.last_pause as f64;
            // Warm-up: until n_records reaches N, weight the newest sample
            // by 1/n (n = 1, 2, ..., N) instead of the steady-state 1/N, so
            // the first few samples don't anchor avg_fn_delay near zero.
            let samples_seen = self.n_records.min(N).max(1);
            let alpha = 1.0 / samples_seen as f64;
            self.avg_fn_delay += alpha * (excess - self.avg_fn_delay);
        }

        self.n_records += 1;
        let pause = (self.target_period - self.avg_fn_delay).max(0.0).round() as u64;
        self.last_rec = Some(rec);
        self.last_pause = pause;
        pause
    }

    /// Re-anchors the throttle at `next_rec` without letting the gap
    /// since the last tick pollute `avg_fn_delay` — for use after a long,
    /// intentional off-cycle (e.g. a logging pause) that isn't part of
    /// the steady-state operation rate.
    pub fn reset(&mut self, next_rec: u64) {
        self.last_rec = Some(next_rec);
        self.skip_next_update = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_seeds_and_returns_zero() {
        let mut t = DynThrottle::new(1000.0);
        assert_eq!(t.pause_for(12_345), 0);
    }

    /// End-to-end scenario 3: target 1000us, zero observed delay (the
    /// simulated clock advances by exactly the pause returned each time,
    /// i.e. the "operation" itself takes no time) — after 1000 samples
    /// the mean inter-arrival period should sit in [990, 1010].
    #[test]
    fn converges_under_zero_observed_delay() {
        let mut t = DynThrottle::new(1000.0);
        let mut rec = 0u64;
        let mut deltas = Vec::new();
        let _ = t.pause_for(rec);
        for _ in 0..1000 {
            let pause = t.pause_for(rec);
            let next = rec + pause;
            deltas.push(next - rec);
            rec = next;
        }
        let mean = deltas.iter().sum::<u64>() as f64 / deltas.len() as f64;
        assert!((990.0..=1010.0).contains(&mean), "mean was {mean}");
    }

    /// Convergence law from §8: with a fixed per-op latency `mu < target`,
    /// the long-run mean of the observed delta converges to `target`
    /// within 2% relative error.
    #[test]
    fn converges_with_fixed_nonzero_latency() {
        let target = 2000.0;
        let mu = 300u64;
        let mut t = DynThrottle::new(target);
        let mut rec = 0u64;
        let mut deltas = Vec::new();
        let _ = t.pause_for(rec);
        rec += mu;
        for _ in 0..1000 {
            let pause = t.pause_for(rec);
            let next = rec + pause + mu;
            deltas.push(next - rec);
            rec = next;
        }
        let mean = deltas.iter().sum::<u64>() as f64 / deltas.len() as f64;
        assert!((mean - target).abs() / target < 0.02, "mean was {mean}");
    }

    #[test]
    fn reset_skips_the_next_avg_update() {
        let mut t = DynThrottle::new(1000.0);
        let _ = t.pause_for(0);
        let _ = t.pause_for(1000);
        let avg_before = t.avg_fn_delay;
        t.reset(500_000);
        let _ = t.pause_for(510_000);
        assert_eq!(t.avg_fn_delay, avg_before);
    }
}
