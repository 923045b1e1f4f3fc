//! Multi-range linear latency histogram.
//!
//! Built from an ordered list of contiguous `(upper_bound, bucket_width)`
//! ranges above a global lower bound, e.g. (values in microseconds):
//!
//! ```text
//! lowb = 100
//!   range 0:   100us .. 4ms,   100us buckets
//!   range 1:     4ms .. 64ms,    1ms buckets
//!   range 2:    64ms .. 128ms,   4ms buckets
//! ```
//!
//! Bucket counts are `AtomicU32` in one flat array so [`Histogram::add`]
//! never takes a lock; [`Histogram::snapshot_and_clear`] drains the array
//! bucket-by-bucket with `fetch_and_store(0)`, which is a read-reset that
//! is atomic *per bucket* but not a consistent global instant — concurrent
//! `add`s during a snapshot may land in a bucket that has already been
//! drained (and be counted in the *next* snapshot) or one that hasn't
//! been drained yet (and be counted in *this* one). This is a deliberate
//! trade against a double-buffer swap, which would need writers to agree
//! on which buffer is "current" and is unnecessary for a monitoring
//! histogram where a few samples landing in the adjacent period is noise.

use std::sync::atomic::{AtomicU32, Ordering};

/// One contiguous range of the histogram: `[lower_bound, upper_bound)`
/// divided into buckets of `bucket_width`.
#[derive(Debug, Clone, Copy)]
pub struct RangeSpec {
    pub upper_bound: u64,
    pub bucket_width: u64,
}

/// Precomputed layout for one range, derived from the `RangeSpec` list
/// at construction time.
#[derive(Debug, Clone, Copy)]
struct RangeLayout {
    lower_bound: u64,
    width: u64,
    bucket_count: u64,
    offset: usize,
}

/// Atomic, lock-free bucketed latency histogram.
pub struct Histogram {
    lowb: u64,
    ranges: Vec<RangeLayout>,
    underflow: AtomicU32,
    buckets: Vec<AtomicU32>,
    overflow: AtomicU32,
}

/// Error constructing a [`Histogram`] from an invalid range list.
#[derive(Debug)]
pub enum HistogramSpecError {
    NotAscending,
    NotContiguous,
    NonPositiveWidth,
    WidthDoesNotDivideRange,
    Empty,
}

impl std::fmt::Display for HistogramSpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            HistogramSpecError::NotAscending => "range upper bounds must be strictly ascending",
            HistogramSpecError::NotContiguous => "ranges must be contiguous",
            HistogramSpecError::NonPositiveWidth => "bucket width must be positive",
            HistogramSpecError::WidthDoesNotDivideRange => {
                "upper_bound - lower_bound must be a positive multiple of bucket_width"
            }
            HistogramSpecError::Empty => "at least one range is required",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for HistogramSpecError {}

/// A caller-owned, point-in-time view of a histogram's bucket counts.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub underflow: u64,
    /// One count per bucket, in the same flat order as the histogram's
    /// internal layout (range 0's buckets, then range 1's, ...).
    pub buckets: Vec<u64>,
    pub overflow: u64,
    pub total: u64,
}

impl Histogram {
    /// Builds a histogram with lower bound `lowb` and the given ranges,
    /// which must be strictly ascending and contiguous (range `i`'s
    /// lower bound is range `i-1`'s upper bound, and range 0's lower
    /// bound is `lowb`).
    pub fn new(lowb: u64, ranges: &[RangeSpec]) -> Result<Self, HistogramSpecError> {
        if ranges.is_empty() {
            return Err(HistogramSpecError::Empty);
        }

        let mut layouts = Vec::with_capacity(ranges.len());
        let mut offset = 0usize;
        let mut lower = lowb;
        for r in ranges {
            if r.bucket_width == 0 {
                return Err(HistogramSpecError::NonPositiveWidth);
            }
            if r.upper_bound <= lower {
                return Err(HistogramSpecError::NotAscending);
            }
            let span = r.upper_bound - lower;
            if span % r.bucket_width != 0 {
                return Err(HistogramSpecError::WidthDoesNotDivideRange);
            }
            let bucket_count = span / r.bucket_width;
            layouts.push(RangeLayout {
                lower_bound: lower,
                width: r.bucket_width,
                bucket_count,
                offset,
            });
            offset += bucket_count as usize;
            lower = r.upper_bound;
        }

        let total_buckets = offset;
        Ok(Histogram {
            lowb,
            ranges: layouts,
            underflow: AtomicU32::new(0),
            buckets: (0..total_buckets).map(|_| AtomicU32::new(0)).collect(),
            overflow: AtomicU32::new(0),
        })
    }

    /// Classifies `v` and atomically increments the matching counter.
    /// Ordering is `Relaxed`: counters are commutative across workers and
    /// only ever read back via [`Histogram::snapshot_and_clear`].
    pub fn add(&self, v: u64) {
        if v < self.lowb {
            self.underflow.fetch_add(1, Ordering::Relaxed);
            return;
        }
        for range in &self.ranges {
            let range_upper = range.lower_bound + range.width * range.bucket_count;
            if v < range_upper {
                let idx = range.offset + ((v - range.lower_bound) / range.width) as usize;
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    /// Drains every counter with a `swap(0)` and returns the result as a
    /// caller-owned [`Snapshot`]. See the module docs for the atomicity
    /// caveat.
    pub fn snapshot_and_clear(&self) -> Snapshot {
        let underflow = self.underflow.swap(0, Ordering::AcqRel) as u64;
        let mut total = underflow;
        let buckets: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| {
                let v = b.swap(0, Ordering::AcqRel) as u64;
                total += v;
                v
            })
            .collect();
        let overflow = self.overflow.swap(0, Ordering::AcqRel) as u64;
        total += overflow;

        Snapshot { underflow, buckets, overflow, total }
    }

    /// The inclusive upper value of bucket `flat_index`, used when
    /// formatting a snapshot line (§4.3 output format).
    pub fn bucket_upper_value(&self, flat_index: usize) -> u64 {
        for range in &self.ranges {
            let range_buckets = range.bucket_count as usize;
            if flat_index < range.offset + range_buckets {
                let within = (flat_index - range.offset) as u64 + 1;
                return range.lower_bound + within * range.width;
            }
        }
        u64::MAX
    }
}
