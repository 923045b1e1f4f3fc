//! Thin wrapper around the `hdrhistogram` crate.
//!
//! Per spec.md §1 the core treats the HDR histogram as an external
//! collaborator: it consumes `record`, `value_at_percentile` and
//! `snapshot`, nothing more. [`HdrHistogram`] exists only to give those
//! three operations a name stable across the rest of the crate and to
//! hide the `u64`-microsecond convention this benchmark uses everywhere
//! behind the crate's own `(value, count)` recording API, and to make the
//! type `Sync` for concurrent recording from every worker.

use std::sync::Mutex;

use hdrhistogram::Histogram as HdrInner;

/// A concurrently-recordable high-dynamic-range histogram over
/// microsecond latencies.
///
/// `hdrhistogram::Histogram::record` takes `&mut self`; workers share one
/// instance per op class, so recording goes through a `Mutex`. Contention
/// is bounded by how often a single worker calls `record` (once per
/// completed operation), which is the same granularity at which it also
/// touches the linear [`crate::histogram::Histogram`].
pub struct HdrHistogram {
    inner: Mutex<HdrInner<u64>>,
}

impl HdrHistogram {
    /// `sigfig` is the number of significant decimal digits to preserve
    /// (2-3 is typical); `highest` bounds the largest recordable value.
    pub fn new(highest: u64, sigfig: u8) -> Self {
        let inner = HdrInner::new_with_bounds(1, highest.max(2), sigfig)
            .expect("static histogram bounds are always valid");
        HdrHistogram { inner: Mutex::new(inner) }
    }

    /// Records one latency sample, in microseconds. Values below 1 or
    /// above the configured `highest` are saturated to the nearest
    /// recordable value rather than dropped, matching the underlying
    /// crate's behavior.
    pub fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock().expect("hdr histogram mutex poisoned");
        let clamped = value_us.max(1);
        if inner.record(clamped).is_err() {
            inner.record(inner.high()).ok();
        }
    }

    /// Value at the given percentile (0.0..=100.0), in microseconds.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.inner.lock().expect("hdr histogram mutex poisoned").value_at_percentile(percentile)
    }

    /// Total number of samples recorded since the last reset.
    pub fn len(&self) -> u64 {
        self.inner.lock().expect("hdr histogram mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a standalone copy of the current histogram state and
    /// resets the live one to empty. Used by the reporter so the periodic
    /// percentile dump reflects only the period just elapsed.
    pub fn snapshot(&self) -> HdrInner<u64> {
        let mut inner = self.inner.lock().expect("hdr histogram mutex poisoned");
        let snap = inner.clone();
        inner.reset();
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reports_percentiles() {
        let h = HdrHistogram::new(1_000_000, 3);
        for v in 1..=1000u64 {
            h.record(v);
        }
        assert_eq!(h.len(), 1000);
        let p50 = h.value_at_percentile(50.0);
        assert!((490..=510).contains(&p50), "p50 was {p50}");
    }

    #[test]
    fn snapshot_resets_live_histogram() {
        let h = HdrHistogram::new(1_000_000, 3);
        h.record(42);
        let snap = h.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(h.is_empty());
    }

    #[test]
    fn saturates_rather_than_drops_out_of_range_values() {
        let h = HdrHistogram::new(1_000, 3);
        h.record(10_000_000);
        assert_eq!(h.len(), 1);
    }
}
