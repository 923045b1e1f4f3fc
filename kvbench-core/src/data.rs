//! Process-wide shared state (§3 "ClientData", "ThreadData").
//!
//! [`ClientData`] is built once by [`crate::orchestrator::Orchestrator`]
//! and handed to every worker and the reporter as an `Arc` — the "single
//! context value threaded through spawns" design from spec.md §9, which
//! replaces the original's global mutable singleton. [`WorkerMailbox`] is
//! the per-worker half of that design: a small, `Sync` set of atomics the
//! coordinator writes and the worker polls, instead of a raw back-pointer
//! into the coordinator.

use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{AsyncKvClient, KvClient, OpCounters, OpCountersSnapshot};
use crate::hdr::HdrHistogram;
use crate::histogram::Histogram;
use crate::stage::Stages;

/// One operation class's counters plus its two latency histograms. Any
/// of the histogram fields may be absent: the linear histogram is only
/// built when `--latency` is requested, the HDR one only when HDR
/// percentile output is requested.
#[derive(Default)]
pub struct OpClassData {
    pub counters: OpCounters,
    pub linear: Option<Histogram>,
    pub hdr: Option<HdrHistogram>,
}

impl OpClassData {
    /// Records one completed operation's outcome and, on success, its
    /// latency into both histograms (§4.5 "Latency recording").
    pub fn record_result(&self, outcome: Outcome, latency_us: Option<u64>) {
        match outcome {
            Outcome::Hit => self.counters.record_hit(),
            Outcome::Miss => self.counters.record_miss(),
            Outcome::Timeout => self.counters.record_timeout(),
            Outcome::Error => self.counters.record_error(),
        }
        if let Some(us) = latency_us {
            if let Some(h) = &self.linear {
                h.add(us);
            }
            if let Some(h) = &self.hdr {
                h.record(us);
            }
        }
    }
}

/// Outcome of one client-visible operation, distinct from
/// [`crate::client::OpError`]: `Miss` is a successful `get`/`delete` that
/// found nothing, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    Timeout,
    Error,
}

/// Process-wide state, owned by the orchestrator and shared with workers
/// and the reporter via `Arc<ClientData>`. Everything mutable here is
/// behind an atomic or a mutex so no caller ever needs `&mut ClientData`.
pub struct ClientData {
    pub client: Arc<dyn KvClient>,
    pub async_client: Option<Arc<dyn AsyncKvClient>>,
    pub stages: Stages,
    pub read: OpClassData,
    pub write: OpClassData,
    pub udf: OpClassData,
    pub debug: bool,
    pub compression_ratio: f64,
    /// Base name records are generated under (§4.4.1 "Bin naming");
    /// `"testbin"` matches the worked examples in spec.md §8.
    pub bin_base_name: String,
    pub hdr_percentiles: Vec<f64>,
    pub histogram_file: Option<Mutex<File>>,
    pub hdr_dir: Option<std::path::PathBuf>,
    /// Set by the reporter once the cumulative-transaction limit (if
    /// any) is exceeded (§4.6 step 6); workers and the coordinator both
    /// poll it as an additional shutdown signal alongside `do_work`.
    pub shutdown: AtomicBool,
    pub txn_limit: Option<u64>,
    pub txn_total: AtomicU64,
}

impl ClientData {
    /// Returns `(name, &OpClassData)` for all three op classes, in the
    /// stable order the reporter iterates them (§4.6).
    pub fn op_classes(&self) -> [(&'static str, &OpClassData); 3] {
        [("read", &self.read), ("write", &self.write), ("udf", &self.udf)]
    }

    /// Adds `n` completed transactions to the cumulative total and
    /// raises `shutdown` once `txn_limit` (if set) is exceeded. Called
    /// by the reporter once per period with the period's summed counts.
    pub fn note_transactions(&self, n: u64) {
        let total = self.txn_total.fetch_add(n, Ordering::Relaxed) + n;
        if let Some(limit) = self.txn_limit
            && total >= limit
        {
            self.shutdown.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Appends one already-formatted histogram output line to the
    /// configured file, per §4.3/§6 ("Append mode, one line per
    /// snapshot per op class"), flushing immediately so a killed process
    /// never loses a fully-written line.
    pub fn write_histogram_line(&self, line: &str) -> io::Result<()> {
        let Some(file) = &self.histogram_file else { return Ok(()) };
        let mut file = file.lock().expect("histogram file mutex poisoned");
        writeln!(file, "{line}")?;
        file.flush()
    }
}

/// Records one op's outcome on `data`, attaching a latency sample only
/// when the op actually completed (`Hit`/`Miss`) — timeouts and errors
/// never produce a latency value (§4.5 "Latency recording").
pub fn finish_op(data: &OpClassData, outcome: Outcome, t0_us: u64, t1_us: u64) {
    let latency = matches!(outcome, Outcome::Hit | Outcome::Miss).then(|| t1_us.saturating_sub(t0_us));
    data.record_result(outcome, latency);
}

/// Per-worker outcome of [`crate::client::OpError`] mapped onto
/// [`Outcome`], used by workers right after an operation completes.
pub fn outcome_of<T>(result: &crate::client::OpResult<Option<T>>) -> Outcome {
    match result {
        Ok(Some(_)) => Outcome::Hit,
        Ok(None) => Outcome::Miss,
        Err(crate::client::OpError::Timeout) => Outcome::Timeout,
        Err(crate::client::OpError::Error { .. }) => Outcome::Error,
    }
}

/// Outcome for operations with no hit/miss distinction (`put`, `udf_apply`,
/// and `delete`'s `bool` is handled via [`outcome_of_bool`]).
pub fn outcome_of_unit(result: &crate::client::OpResult<()>) -> Outcome {
    match result {
        Ok(()) => Outcome::Hit,
        Err(crate::client::OpError::Timeout) => Outcome::Timeout,
        Err(crate::client::OpError::Error { .. }) => Outcome::Error,
    }
}

/// Outcome for `delete`, whose success value reports whether a record
/// existed (`true` -> hit, `false` -> miss).
pub fn outcome_of_bool(result: &crate::client::OpResult<bool>) -> Outcome {
    match result {
        Ok(true) => Outcome::Hit,
        Ok(false) => Outcome::Miss,
        Err(crate::client::OpError::Timeout) => Outcome::Timeout,
        Err(crate::client::OpError::Error { .. }) => Outcome::Error,
    }
}

/// The coordinator's per-worker mailbox (§9 "shared immutable context
/// handle and a per-worker mailbox owned by the coordinator"). Plain
/// atomics, no mutex: the coordinator only ever writes `do_work`/
/// `finished`, and the worker only ever reads them, so there is nothing
/// to race beyond what the atomics themselves guarantee.
///
/// **Ordering invariant (§3):** teardown publishes `finished = true`
/// before clearing `do_work`, so a worker observing `do_work == false`
/// can reliably check `finished` next to distinguish "move to the next
/// stage" from "the run is over."
#[derive(Debug, Default)]
pub struct WorkerMailbox {
    pub do_work: AtomicBool,
    pub finished: AtomicBool,
    pub stage_idx: AtomicUsize,
}

impl WorkerMailbox {
    pub fn new() -> Self {
        WorkerMailbox {
            do_work: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stage_idx: AtomicUsize::new(0),
        }
    }

    pub fn do_work(&self) -> bool {
        self.do_work.load(Ordering::Acquire)
    }

    pub fn stage_idx(&self) -> usize {
        self.stage_idx.load(Ordering::Acquire)
    }

    /// Called by the coordinator when a new stage starts.
    pub fn start_stage(&self, stage_idx: usize) {
        self.stage_idx.store(stage_idx, Ordering::Release);
        self.do_work.store(true, Ordering::Release);
    }

    /// Called by the coordinator at the end of a (non-final) stage.
    pub fn end_stage(&self) {
        self.do_work.store(false, Ordering::Release);
    }

    /// Called by the coordinator once, after the final stage, honoring
    /// the ordering invariant above.
    pub fn shut_down(&self) {
        self.finished.store(true, Ordering::Release);
        self.do_work.store(false, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
