//! Stage lifecycle coordination.
//!
//! [`Coordinator`] provides the three primitives spec.md §4.1 asks for —
//! `wait`, `complete`, `sleep` — built on a [`Barrier`] and a
//! `Mutex`/`Condvar` pair guarding the completion count. The stage
//! lifecycle *algorithm* that drives these primitives in sequence lives
//! in [`crate::orchestrator`]; this module only owns the synchronization
//! primitives and their contract.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::barrier::Barrier;
use crate::clock::{Clock, Micros};

/// Outcome of [`Coordinator::sleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// `wakeup` elapsed before all workers completed.
    Timeout,
    /// All workers completed before `wakeup`.
    Interrupted,
}

/// Synchronizes one coordinator thread with `n_threads` workers across a
/// sequence of stages.
pub struct Coordinator {
    n_threads: u32,
    barrier: Barrier,
    unfinished: Mutex<u32>,
    cv: Condvar,
    clock: Clock,
}

impl Coordinator {
    /// `n_threads` workers plus the coordinator itself rendezvous at the
    /// barrier; `unfinished_threads` starts at `n_threads + 1` to account
    /// for the coordinator's own completion (signalled once it has slept
    /// out the stage's minimum duration).
    pub fn new(n_threads: u32, clock: Clock) -> Self {
        Coordinator {
            n_threads,
            barrier: Barrier::new(n_threads as usize + 1),
            unfinished: Mutex::new(n_threads + 1),
            cv: Condvar::new(),
            clock,
        }
    }

    pub fn n_threads(&self) -> u32 {
        self.n_threads
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Rendezvous at the barrier. Safe to call at any time during a
    /// stage, including before every worker has called [`Self::complete`].
    pub fn wait(&self) {
        self.barrier.wait();
    }

    /// Resets `unfinished_threads` to `n_threads + 1` for a new stage.
    /// Must be called by the coordinator after the barrier rendezvous
    /// that starts the stage and before any worker can call
    /// [`Self::complete`] for it.
    pub fn begin_stage(&self) {
        *self.unfinished.lock().expect("coordinator mutex poisoned") = self.n_threads + 1;
    }

    /// Declares the calling party (a worker, or the coordinator itself)
    /// complete for the current stage. Exactly one call per worker per
    /// stage, plus exactly one call by the coordinator, is required —
    /// calling more than once per stage is a caller bug this type does
    /// not protect against.
    pub fn complete(&self) {
        let mut unfinished = self.unfinished.lock().expect("coordinator mutex poisoned");
        *unfinished -= 1;
        if *unfinished == 0 {
            self.cv.notify_all();
        }
    }

    /// Sleeps until either `wakeup` (a [`Clock`] reading) elapses —
    /// returning [`SleepOutcome::Timeout`] — or `unfinished_threads`
    /// reaches zero — returning [`SleepOutcome::Interrupted`].
    ///
    /// Recomputes the remaining duration against the monotonic clock on
    /// every wakeup so a spurious or signal-driven wakeup can never cause
    /// an early return: the loop only exits once the deadline has
    /// genuinely passed or the completion count has genuinely reached
    /// zero.
    pub fn sleep(&self, wakeup: Micros) -> SleepOutcome {
        let mut guard = self.unfinished.lock().expect("coordinator mutex poisoned");
        loop {
            if *guard == 0 {
                return SleepOutcome::Interrupted;
            }
            let now = self.clock.now();
            if now >= wakeup {
                return SleepOutcome::Timeout;
            }
            let remaining = Duration::from_micros(wakeup - now);
            let (next_guard, timeout_result) =
                self.cv.wait_timeout(guard, remaining).expect("coordinator mutex poisoned");
            guard = next_guard;
            if *guard == 0 {
                return SleepOutcome::Interrupted;
            }
            if timeout_result.timed_out() {
                // Re-check the deadline for real before trusting this: a
                // late OS wakeup can report timed_out a hair before our
                // own clock agrees.
                if self.clock.now() >= wakeup {
                    return SleepOutcome::Timeout;
                }
            }
        }
    }
}
