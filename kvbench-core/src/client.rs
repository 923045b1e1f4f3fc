//! The external interface to the database under test (§6).
//!
//! The core never talks to a real database driver directly — it drives
//! whatever implements [`KvClient`]/[`AsyncKvClient`]. [`MockKvClient`] is
//! the in-memory stand-in used by this crate's own tests and available to
//! downstream users as a wiring example; a real binary supplies its own
//! implementation over whatever client library it links.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Value;

/// A key-ordered bag of named bin values — what gets written to, or read
/// back from, one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    bins: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record { bins: Vec::new() }
    }

    pub fn from_bins(bins: Vec<(String, Value)>) -> Self {
        Record { bins }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bins.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(entry) = self.bins.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.bins.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.bins.iter().position(|(n, _)| n == name)?;
        Some(self.bins.remove(idx).1)
    }

    pub fn bins(&self) -> &[(String, Value)] {
        &self.bins
    }

    pub fn into_bins(self) -> Vec<(String, Value)> {
        self.bins
    }
}

/// Read policy: mostly consistency/replica routing knobs the core passes
/// through unchanged rather than interprets.
#[derive(Debug, Clone, Default)]
pub struct ReadPolicy {
    pub timeout_us: Option<u64>,
    pub linearize_read: bool,
}

/// Write policy, including the `expiration-time` stage field (§6 "Stage
/// input").
#[derive(Debug, Clone, Default)]
pub struct WritePolicy {
    pub timeout_us: Option<u64>,
    /// Record TTL in seconds; `0` means "never expires" and `None` means
    /// "use the server default", matching the stage file's `expiration-time`.
    pub expiration_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct UdfPolicy {
    pub timeout_us: Option<u64>,
}

/// A per-operation failure. Unlike [`crate::error`]'s types, this is not
/// meant to abort the run — workers count these via
/// [`OpCounters`] and continue.
#[derive(Debug, Clone)]
pub enum OpError {
    Timeout,
    Error { code: i32, msg: String },
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::Timeout => write!(f, "operation timed out"),
            OpError::Error { code, msg } => write!(f, "operation failed ({code}): {msg}"),
        }
    }
}

impl std::error::Error for OpError {}

pub type OpResult<T> = Result<T, OpError>;

/// The `{hit, miss, timeout, error, count} x {read, write, udf}` counter
/// matrix from §3 ("ClientData"), one instance per op class. All fields
/// are updated with plain `fetch_add`; the Reporter drains them with
/// [`OpCounters::snapshot_and_reset`] once per period.
#[derive(Debug, Default)]
pub struct OpCounters {
    pub hit: AtomicU64,
    pub miss: AtomicU64,
    pub timeout: AtomicU64,
    pub error: AtomicU64,
    pub count: AtomicU64,
}

/// A caller-owned, point-in-time view of one [`OpCounters`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpCountersSnapshot {
    pub hit: u64,
    pub miss: u64,
    pub timeout: u64,
    pub error: u64,
    pub count: u64,
}

impl OpCounters {
    pub fn record_hit(&self) {
        self.hit.fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.miss.fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically reads and zeroes every field, matching the read-reset
    /// contract §3 requires ("counters are read-and-reset atomically by
    /// the Reporter"). Per-field, not a single global instant — the same
    /// trade-off the linear [`crate::histogram::Histogram`] makes.
    pub fn snapshot_and_reset(&self) -> OpCountersSnapshot {
        OpCountersSnapshot {
            hit: self.hit.swap(0, Ordering::AcqRel),
            miss: self.miss.swap(0, Ordering::AcqRel),
            timeout: self.timeout.swap(0, Ordering::AcqRel),
            error: self.error.swap(0, Ordering::AcqRel),
            count: self.count.swap(0, Ordering::AcqRel),
        }
    }
}

/// A one-shot callback an async operation invokes with its result.
pub type Completion<T> = Box<dyn FnOnce(OpResult<T>) + Send>;

/// Synchronous database access.
pub trait KvClient: Send + Sync {
    fn put(&self, key: u64, record: &Record, policy: &WritePolicy) -> OpResult<()>;
    fn get(&self, key: u64, policy: &ReadPolicy) -> OpResult<Option<Record>>;
    fn delete(&self, key: u64, policy: &WritePolicy) -> OpResult<bool>;
    fn batch_read(&self, keys: &[u64], policy: &ReadPolicy) -> OpResult<Vec<Option<Record>>>;
    fn udf_apply(
        &self,
        key: u64,
        module: &str,
        function: &str,
        args: &[Value],
        policy: &UdfPolicy,
    ) -> OpResult<()>;
}

/// Asynchronous database access, driven through completion callbacks
/// rather than futures — see [`crate::worker::async_worker`] for why.
pub trait AsyncKvClient: Send + Sync {
    fn put_async(&self, key: u64, record: Record, policy: WritePolicy, cb: Completion<()>);
    fn get_async(&self, key: u64, policy: ReadPolicy, cb: Completion<Option<Record>>);
    fn delete_async(&self, key: u64, policy: WritePolicy, cb: Completion<bool>);
    fn batch_read_async(
        &self,
        keys: Vec<u64>,
        policy: ReadPolicy,
        cb: Completion<Vec<Option<Record>>>,
    );
    fn udf_apply_async(
        &self,
        key: u64,
        module: String,
        function: String,
        args: Vec<Value>,
        policy: UdfPolicy,
        cb: Completion<()>,
    );
}

/// In-memory client used by the crate's own tests. Async callbacks fire
/// inline, synchronously, on the caller's thread — there is no actual
/// concurrency to model here, only the trait surface.
#[derive(Default)]
pub struct MockKvClient {
    store: Mutex<HashMap<u64, Record>>,
}

impl MockKvClient {
    pub fn new() -> Self {
        MockKvClient { store: Mutex::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.store.lock().expect("mock client mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvClient for MockKvClient {
    fn put(&self, key: u64, record: &Record, _policy: &WritePolicy) -> OpResult<()> {
        self.store.lock().expect("mock client mutex poisoned").insert(key, record.clone());
        Ok(())
    }

    fn get(&self, key: u64, _policy: &ReadPolicy) -> OpResult<Option<Record>> {
        Ok(self.store.lock().expect("mock client mutex poisoned").get(&key).cloned())
    }

    fn delete(&self, key: u64, _policy: &WritePolicy) -> OpResult<bool> {
        Ok(self.store.lock().expect("mock client mutex poisoned").remove(&key).is_some())
    }

    fn batch_read(&self, keys: &[u64], policy: &ReadPolicy) -> OpResult<Vec<Option<Record>>> {
        keys.iter().map(|&k| self.get(k, policy)).collect()
    }

    fn udf_apply(
        &self,
        _key: u64,
        _module: &str,
        _function: &str,
        _args: &[Value],
        _policy: &UdfPolicy,
    ) -> OpResult<()> {
        // No UDF runtime to model; the mock treats every apply as a no-op
        // success, matching its "wiring example" role rather than a
        // faithful database stand-in.
        Ok(())
    }
}

impl AsyncKvClient for MockKvClient {
    fn put_async(&self, key: u64, record: Record, policy: WritePolicy, cb: Completion<()>) {
        cb(self.put(key, &record, &policy));
    }

    fn get_async(&self, key: u64, policy: ReadPolicy, cb: Completion<Option<Record>>) {
        cb(self.get(key, &policy));
    }

    fn delete_async(&self, key: u64, policy: WritePolicy, cb: Completion<bool>) {
        cb(self.delete(key, &policy));
    }

    fn batch_read_async(
        &self,
        keys: Vec<u64>,
        policy: ReadPolicy,
        cb: Completion<Vec<Option<Record>>>,
    ) {
        cb(self.batch_read(&keys, &policy));
    }

    fn udf_apply_async(
        &self,
        key: u64,
        module: String,
        function: String,
        args: Vec<Value>,
        policy: UdfPolicy,
        cb: Completion<()>,
    ) {
        cb(self.udf_apply(key, &module, &function, &args, &policy));
    }
}
