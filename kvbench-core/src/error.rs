//! Error taxonomy for the benchmark core.
//!
//! Four buckets, matching the failure semantics the rest of the crate
//! relies on: [`UsageError`] and [`FatalError`] are meant to abort the
//! process before or during startup; [`ConnectInitError`] aborts the run
//! before any worker starts; everything else (per-operation timeouts and
//! errors) is *not* an error type at all — it is counted on
//! [`crate::client::OpCounters`] and the worker simply continues.

use std::fmt;

/// Rejected before any I/O is attempted: bad CLI arguments, a malformed
/// object-spec string, an empty stage list, and similar.
#[derive(Debug)]
pub enum UsageError {
    /// A command-line argument failed validation.
    BadArgument(String),
    /// The object-spec grammar failed to parse.
    ObjectSpec(crate::objspec::ParseError),
    /// A stage descriptor was internally inconsistent (e.g. `key_end < key_start`).
    BadStage(String),
    /// No stages were supplied.
    NoStages,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageError::BadArgument(msg) => write!(f, "usage: {msg}"),
            UsageError::ObjectSpec(e) => write!(f, "usage: object spec: {e}"),
            UsageError::BadStage(msg) => write!(f, "usage: stage: {msg}"),
            UsageError::NoStages => write!(f, "usage: no workload stages given"),
        }
    }
}

impl std::error::Error for UsageError {}

impl From<crate::objspec::ParseError> for UsageError {
    fn from(e: crate::objspec::ParseError) -> Self {
        UsageError::ObjectSpec(e)
    }
}

/// The client could not reach the server at all; the run is aborted
/// before any worker thread is spawned.
#[derive(Debug)]
pub enum ConnectInitError {
    /// The initial connection attempt failed.
    Unreachable(String),
    /// Authentication failed during the initial connection.
    AuthFailed(String),
}

impl fmt::Display for ConnectInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectInitError::Unreachable(msg) => write!(f, "could not reach server: {msg}"),
            ConnectInitError::AuthFailed(msg) => write!(f, "authentication failed: {msg}"),
        }
    }
}

impl std::error::Error for ConnectInitError {}

/// Unrecoverable runtime failures: thread creation, allocation.
/// Distinct from [`ConnectInitError`] in that these can happen at any
/// point in the run, not just at startup.
#[derive(Debug)]
pub enum FatalError {
    /// `std::thread::Builder::spawn` failed.
    ThreadSpawn(std::io::Error),
    /// A background thread's worker function panicked and could not be joined cleanly.
    ThreadPanic(String),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::ThreadSpawn(e) => write!(f, "failed to spawn thread: {e}"),
            FatalError::ThreadPanic(msg) => write!(f, "worker thread panicked: {msg}"),
        }
    }
}

impl std::error::Error for FatalError {}

impl From<std::io::Error> for FatalError {
    fn from(e: std::io::Error) -> Self {
        FatalError::ThreadSpawn(e)
    }
}

/// Top-level error returned by [`crate::orchestrator::Orchestrator::run`].
#[derive(Debug)]
pub enum RunError {
    Usage(UsageError),
    ConnectInit(ConnectInitError),
    Fatal(FatalError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Usage(e) => write!(f, "{e}"),
            RunError::ConnectInit(e) => write!(f, "{e}"),
            RunError::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<UsageError> for RunError {
    fn from(e: UsageError) -> Self {
        RunError::Usage(e)
    }
}

impl From<ConnectInitError> for RunError {
    fn from(e: ConnectInitError) -> Self {
        RunError::ConnectInit(e)
    }
}

impl From<FatalError> for RunError {
    fn from(e: FatalError) -> Self {
        RunError::Fatal(e)
    }
}

impl RunError {
    /// Process exit code per the core's external contract: `1` usage,
    /// `3` connect-init failure, `255` (`-1` as `u8`) fatal/thread-creation
    /// failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Usage(_) => 1,
            RunError::ConnectInit(_) => 3,
            RunError::Fatal(_) => 255,
        }
    }
}
