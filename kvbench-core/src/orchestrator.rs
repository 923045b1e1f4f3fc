//! Run driver (§4.1 "Coordinator" stage lifecycle, §5 "Scheduling
//! model").
//!
//! [`Orchestrator`] owns the one [`ClientData`] for a run, spawns the
//! worker threads (sync or async, per [`RunConfig::async_mode`]) and
//! the reporter thread, and then plays the coordinator side of the
//! stage-lifecycle protocol on the calling thread: for each stage, wake
//! the workers, wait out the stage's duration and completion, flip them
//! to the next stage (or shut them down on the last), and repeat.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::clock::{Clock, Micros};
use crate::coordinator::Coordinator;
use crate::data::{ClientData, WorkerMailbox};
use crate::error::{FatalError, RunError};
use crate::worker::{self, WorkerContext};

/// Knobs the orchestrator needs beyond what's already captured on
/// [`ClientData`]: thread topology and the async event-loop tuning (§6
/// "CLI surface").
pub struct RunConfig {
    pub n_threads: u32,
    pub async_mode: bool,
    pub async_max_commands: u32,
    /// Number of cooperative event-loop threads when `async_mode` is
    /// set. Independent of `n_threads`, matching the CLI's separate
    /// "event-loop count" knob (§6) — the sync thread count and the
    /// async loop count are never both in play for the same run.
    pub event_loop_count: u32,
    pub base_seed: u64,
    /// How often the reporter ticks (§6 "histogram period").
    pub histogram_period: Duration,
}

pub struct Orchestrator {
    client_data: Arc<ClientData>,
    coordinator: Arc<Coordinator>,
    config: RunConfig,
}

impl Orchestrator {
    pub fn new(client_data: Arc<ClientData>, config: RunConfig) -> Self {
        let n_workers = if config.async_mode { config.event_loop_count } else { config.n_threads };
        let coordinator = Arc::new(Coordinator::new(n_workers, Clock::new()));
        Orchestrator { client_data, coordinator, config }
    }

    /// Runs every stage to completion, then joins all spawned threads.
    /// Returns once the final stage's workers have been signalled to
    /// shut down and have exited.
    pub fn run(&self) -> Result<(), RunError> {
        if self.client_data.stages.is_empty() {
            return Err(RunError::Usage(crate::error::UsageError::NoStages));
        }

        let n_workers =
            if self.config.async_mode { self.config.event_loop_count } else { self.config.n_threads };

        let mailboxes: Vec<Arc<WorkerMailbox>> =
            (0..n_workers).map(|_| Arc::new(WorkerMailbox::new())).collect();

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(n_workers as usize + 1);
        for (idx, mailbox) in mailboxes.iter().enumerate() {
            let ctx = WorkerContext {
                idx: idx as u32,
                n_threads: n_workers,
                client_data: self.client_data.clone(),
                coordinator: self.coordinator.clone(),
                mailbox: mailbox.clone(),
                base_seed: self.config.base_seed,
            };
            let async_mode = self.config.async_mode;
            let async_max_commands = self.config.async_max_commands;
            let handle = std::thread::Builder::new()
                .name(format!("kvbench-worker-{idx}"))
                .spawn(move || {
                    if async_mode {
                        worker::async_worker::run(&ctx, async_max_commands);
                    } else {
                        worker::sync::run(&ctx);
                    }
                })
                .map_err(FatalError::from)?;
            handles.push(handle);
        }

        let data = self.client_data.clone();
        let histogram_period = self.config.histogram_period;
        let reporter_handle = std::thread::Builder::new()
            .name("kvbench-reporter".into())
            .spawn(move || crate::reporter::run(data, histogram_period))
            .map_err(FatalError::from)?;

        let run_result = self.drive_stages(&mailboxes);

        self.client_data.shutdown.store(true, Ordering::Relaxed);

        for (idx, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                warn!("worker thread {idx} panicked");
                return Err(RunError::Fatal(FatalError::ThreadPanic(format!(
                    "worker thread {idx} panicked"
                ))));
            }
        }
        if reporter_handle.join().is_err() {
            warn!("reporter thread panicked");
        }

        run_result
    }

    /// Plays the coordinator side of the stage lifecycle (§4.1) for
    /// every stage in sequence.
    fn drive_stages(&self, mailboxes: &[Arc<WorkerMailbox>]) -> Result<(), RunError> {
        let mut rng = rand::thread_rng();
        let n_stages = self.client_data.stages.len();

        for stage_idx in 0..n_stages {
            let stage = &self.client_data.stages[stage_idx];
            let is_last = stage_idx + 1 == n_stages;

            for mailbox in mailboxes {
                mailbox.start_stage(stage_idx);
            }
            self.coordinator.begin_stage();
            info!("stage {}: {} starting", stage_idx + 1, stage.desc);
            self.coordinator.wait();

            if stage.pause_s > 0 {
                let jitter = rng.gen_range(1..=stage.pause_s);
                std::thread::sleep(Duration::from_secs(jitter));
            }

            if stage.duration_s > 0 {
                let wakeup = self.coordinator.clock().now() + stage.duration_s * 1_000_000;
                self.coordinator.sleep(wakeup);
            }

            self.coordinator.complete();
            self.coordinator.sleep(Micros::MAX);

            if is_last {
                for mailbox in mailboxes {
                    mailbox.shut_down();
                }
            } else {
                for mailbox in mailboxes {
                    mailbox.end_stage();
                }
            }
            self.coordinator.wait();
        }

        Ok(())
    }
}
