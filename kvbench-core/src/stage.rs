//! Stage data model (§3 "Stage", "Stages").
//!
//! A [`Stage`] is an immutable description of one contiguous time window
//! of uniform workload settings; a benchmark run is an ordered
//! [`Stages`] sequence. Nothing in this module touches a clock, a
//! thread, or a client — it is pure data plus the small amount of
//! workload-dice arithmetic ([`Workload::classify`]) that only needs a
//! random `u32` roll, not a live PRNG.

use crate::objspec::ObjSpec;

/// The declarative body of a UDF application, as carried by
/// [`Workload::ReadUpdateFn`]: which server-side module/function to
/// invoke, and an object spec describing the shape of its arguments.
#[derive(Debug, Clone)]
pub struct UdfSpec {
    pub module: String,
    pub function: String,
    pub args_spec: ObjSpec,
}

/// Which operation a dice roll landed on, for the mixed workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    Delete,
    Udf,
}

/// Tagged workload variant (§3, §9 "tagged variants, not inheritance
/// trees"). `InsertLinear` and `DeleteBin` are bounded: each worker
/// strides through `[key_start, key_end)` and calls
/// [`crate::coordinator::Coordinator::complete`] once it runs out of
/// keys. The rest are open-ended: workers call `complete` immediately at
/// stage start and keep rolling the dice until `do_work` clears.
#[derive(Debug, Clone)]
pub enum Workload {
    /// Bounded: one `put` per key in the stage's range, striped across
    /// workers. `pct` is carried through from the stage file for
    /// compatibility with the source workload grammar but does not
    /// affect insert behavior — see DESIGN.md for why it's unused.
    InsertLinear { pct: u32 },
    /// Open-ended: `read_pct`% reads, the rest partial updates of
    /// `write_bins` (or all bins if unset).
    ReadUpdate { read_pct: u32 },
    /// Open-ended: `read_pct`% reads, the rest full-record replaces
    /// (every bin regenerated, `write_bins` ignored).
    ReadReplace { read_pct: u32 },
    /// Open-ended: `read_pct`% reads, `write_pct`% partial updates, the
    /// remainder UDF applications.
    ReadUpdateFn { read_pct: u32, write_pct: u32, udf: UdfSpec },
    /// Open-ended: `read_pct`% reads, `write_pct`% partial updates, the
    /// remainder deletes.
    ReadUpdateDelete { read_pct: u32, write_pct: u32 },
    /// Bounded: one `delete` per key in the stage's range, striped
    /// across workers.
    DeleteBin,
}

impl Workload {
    /// Whether this workload's completion is bounded by the stage's key
    /// range (`true`) rather than by stage duration / shutdown (`false`).
    pub fn is_bounded(&self) -> bool {
        matches!(self, Workload::InsertLinear { .. } | Workload::DeleteBin)
    }

    /// Rolls the workload dice for one open-ended operation. `roll` must
    /// be in `[0, 100)`; callers draw it from their own thread-local
    /// PRNG so this function stays deterministic and allocation-free.
    ///
    /// Panics if called on a bounded workload — those never dice-roll,
    /// they execute their one fixed operation per key.
    pub fn classify(&self, roll: u32) -> Op {
        match self {
            Workload::InsertLinear { .. } | Workload::DeleteBin => {
                unreachable!("bounded workloads do not roll the dice")
            }
            Workload::ReadUpdate { read_pct } => {
                if roll < *read_pct {
                    Op::Read
                } else {
                    Op::Write
                }
            }
            Workload::ReadReplace { read_pct } => {
                if roll < *read_pct {
                    Op::Read
                } else {
                    Op::Write
                }
            }
            Workload::ReadUpdateFn { read_pct, write_pct, .. } => {
                if roll < *read_pct {
                    Op::Read
                } else if roll < read_pct.saturating_add(*write_pct) {
                    Op::Write
                } else {
                    Op::Udf
                }
            }
            Workload::ReadUpdateDelete { read_pct, write_pct } => {
                if roll < *read_pct {
                    Op::Read
                } else if roll < read_pct.saturating_add(*write_pct) {
                    Op::Write
                } else {
                    Op::Delete
                }
            }
        }
    }

    /// Whether a write in this workload replaces the whole record
    /// (`ReadReplace`) or only the stage's declared `write_bins`
    /// (everything else).
    pub fn full_replace_on_write(&self) -> bool {
        matches!(self, Workload::ReadReplace { .. })
    }
}

/// One contiguous, uniform-settings window of a benchmark run.
///
/// Immutable once built — there are no setters; a `Stage` is constructed
/// whole, either directly or via [`crate::stagefile`].
#[derive(Debug, Clone)]
pub struct Stage {
    /// Wall-clock duration of this stage, in seconds. `0` means "run
    /// until the workload's own completion condition" (key-range
    /// exhaustion for bounded workloads; indefinitely for open-ended
    /// ones, until the orchestrator's overall shutdown).
    pub duration_s: u64,
    pub desc: String,
    /// Target aggregate transactions/sec across all workers. `0` means
    /// unthrottled.
    pub tps: u64,
    /// Record TTL in seconds passed to `WritePolicy::expiration_seconds`.
    pub ttl_s: u32,
    pub key_start: u64,
    /// Half-open: keys in `[key_start, key_end)`.
    pub key_end: u64,
    /// Upper bound, in seconds, of a uniformly random prelude sleep
    /// before the stage's timed work begins. `0` skips the prelude.
    pub pause_s: u64,
    pub batch_size: u32,
    pub is_async: bool,
    /// `true`: regenerate the payload on every operation. `false`: build
    /// one fixed record at stage start and reuse it for every op.
    pub random: bool,
    pub workload: Workload,
    pub obj_spec: ObjSpec,
    pub read_bins: Option<Vec<String>>,
    pub write_bins: Option<Vec<usize>>,
}

impl Stage {
    /// Number of keys this stage's bounded workload must cover. Only
    /// meaningful when `workload.is_bounded()`.
    pub fn key_count(&self) -> u64 {
        self.key_end.saturating_sub(self.key_start)
    }

    /// Target per-worker period, in microseconds, given `n_threads`
    /// sharing the stage's aggregate `tps`. `None` when `tps == 0`
    /// (unthrottled).
    pub fn target_period_us(&self, n_threads: u32) -> Option<f64> {
        if self.tps == 0 {
            return None;
        }
        let per_thread_tps = (self.tps as f64 / n_threads.max(1) as f64).max(1e-9);
        Some(1_000_000.0 / per_thread_tps)
    }
}

/// An ordered, finite sequence of stages. Indices on public methods are
/// 1-based per §3 ("stage indices are 1-based in external surfaces,
/// 0-based internally"); internal iteration uses plain 0-based slices.
#[derive(Debug, Clone, Default)]
pub struct Stages(Vec<Stage>);

impl Stages {
    pub fn new(stages: Vec<Stage>) -> Self {
        Stages(stages)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 0-based internal accessor.
    pub fn get(&self, idx: usize) -> Option<&Stage> {
        self.0.get(idx)
    }

    /// 1-based external accessor, matching how stage numbers are
    /// reported to the user (§3).
    pub fn get_external(&self, one_based: u32) -> Option<&Stage> {
        one_based.checked_sub(1).and_then(|i| self.0.get(i as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Stages {
    type Output = Stage;
    fn index(&self, idx: usize) -> &Stage {
        &self.0[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(workload: Workload) -> Stage {
        Stage {
            duration_s: 0,
            desc: "test".into(),
            tps: 0,
            ttl_s: 0,
            key_start: 0,
            key_end: 0,
            pause_s: 0,
            batch_size: 1,
            is_async: false,
            random: false,
            workload,
            obj_spec: ObjSpec::default(),
            read_bins: None,
            write_bins: None,
        }
    }

    #[test]
    fn linear_insert_and_delete_bin_are_bounded() {
        assert!(Workload::InsertLinear { pct: 100 }.is_bounded());
        assert!(Workload::DeleteBin.is_bounded());
        assert!(!Workload::ReadUpdate { read_pct: 50 }.is_bounded());
    }

    #[test]
    fn ru_dice_splits_on_read_pct() {
        let w = Workload::ReadUpdate { read_pct: 50 };
        assert_eq!(w.classify(0), Op::Read);
        assert_eq!(w.classify(49), Op::Read);
        assert_eq!(w.classify(50), Op::Write);
        assert_eq!(w.classify(99), Op::Write);
    }

    #[test]
    fn ruf_dice_has_three_bands() {
        let w = Workload::ReadUpdateFn {
            read_pct: 65,
            write_pct: 25,
            udf: UdfSpec { module: "m".into(), function: "f".into(), args_spec: ObjSpec::default() },
        };
        assert_eq!(w.classify(0), Op::Read);
        assert_eq!(w.classify(64), Op::Read);
        assert_eq!(w.classify(65), Op::Write);
        assert_eq!(w.classify(89), Op::Write);
        assert_eq!(w.classify(90), Op::Udf);
        assert_eq!(w.classify(99), Op::Udf);
    }

    #[test]
    fn read_replace_forces_full_record_writes() {
        assert!(Workload::ReadReplace { read_pct: 100 }.full_replace_on_write());
        assert!(!Workload::ReadUpdate { read_pct: 100 }.full_replace_on_write());
    }

    #[test]
    fn key_count_is_half_open_range() {
        let mut s = stage(Workload::InsertLinear { pct: 0 });
        s.key_start = 1;
        s.key_end = 10_001;
        assert_eq!(s.key_count(), 10_000);
    }

    #[test]
    fn target_period_divides_tps_across_threads() {
        let mut s = stage(Workload::ReadUpdate { read_pct: 50 });
        s.tps = 4_000;
        let period = s.target_period_us(4).unwrap();
        assert!((period - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_tps_is_unthrottled() {
        let s = stage(Workload::ReadUpdate { read_pct: 50 });
        assert!(s.target_period_us(4).is_none());
    }

    #[test]
    fn stages_external_index_is_one_based() {
        let stages = Stages::new(vec![stage(Workload::DeleteBin), stage(Workload::DeleteBin)]);
        assert!(stages.get_external(0).is_none());
        assert!(stages.get_external(1).is_some());
        assert!(stages.get_external(2).is_some());
        assert!(stages.get_external(3).is_none());
    }
}
