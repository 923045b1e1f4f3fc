//! Synchronous worker main loop (§4.5 "Sync worker main loop").
//!
//! One call to [`run`] drives a single OS thread through every stage in
//! the run: rendezvous at the start-of-stage barrier, execute the
//! stage's workload (bounded key-range sweep or open-ended dice loop),
//! rendezvous at the end-of-stage barrier, repeat until the coordinator
//! marks this worker finished.

use rand::Rng;
use rand::rngs::StdRng;

use crate::client::{OpError, OpResult, Record, WritePolicy};
use crate::data::{Outcome, finish_op, outcome_of, outcome_of_bool, outcome_of_unit};
use crate::objspec::populate;
use crate::stage::{Op, Stage, UdfSpec, Workload};
use crate::throttle::DynThrottle;
use crate::value::Value;

use super::{WorkerContext, roll_key, roll_percent, stage_policies};

/// Runs this worker through every stage of the benchmark, in lock-step
/// with the coordinator and every other worker.
pub fn run(ctx: &WorkerContext) {
    let mut rng = ctx.seeded_rng();
    let n_stages = ctx.client_data.stages.len();

    for _ in 0..n_stages {
        ctx.coordinator.wait();
        let stage = ctx.current_stage();
        let (read_policy, write_policy, udf_policy) = stage_policies(stage);
        let mut throttle = stage.target_period_us(ctx.n_threads).map(DynThrottle::new);

        let fixed_full_record = if !stage.random && matches!(stage.workload, Workload::InsertLinear { .. })
        {
            Some(build_record(stage, &mut rng, ctx, None))
        } else {
            None
        };
        let mixed_write_indices = resolve_write_indices(stage);
        let fixed_mixed_record = if !stage.random && !stage.workload.is_bounded() {
            Some(build_record(stage, &mut rng, ctx, mixed_write_indices.as_deref()))
        } else {
            None
        };

        match &stage.workload {
            Workload::InsertLinear { .. } => {
                let mut key = stage.key_start + ctx.idx as u64;
                while ctx.mailbox.do_work() && key < stage.key_end {
                    let record = match &fixed_full_record {
                        Some(r) => r.clone(),
                        None => build_record(stage, &mut rng, ctx, None),
                    };
                    do_put(ctx, key, &record, &write_policy, ctx.client_data.debug);
                    key += ctx.n_threads as u64;
                }
                ctx.coordinator.complete();
            }
            Workload::DeleteBin => {
                let mut key = stage.key_start + ctx.idx as u64;
                while ctx.mailbox.do_work() && key < stage.key_end {
                    do_delete(ctx, key, &write_policy, ctx.client_data.debug);
                    key += ctx.n_threads as u64;
                }
                ctx.coordinator.complete();
            }
            _ => {
                ctx.coordinator.complete();
                while ctx.mailbox.do_work() {
                    let roll = roll_percent(&mut rng);
                    match stage.workload.classify(roll) {
                        Op::Read => do_read(ctx, stage, &mut rng, &read_policy),
                        Op::Write => {
                            let record = match &fixed_mixed_record {
                                Some(r) => r.clone(),
                                None => build_record(
                                    stage,
                                    &mut rng,
                                    ctx,
                                    mixed_write_indices.as_deref(),
                                ),
                            };
                            let key = roll_key(&mut rng, stage);
                            do_put(ctx, key, &record, &write_policy, ctx.client_data.debug);
                        }
                        Op::Delete => {
                            let key = roll_key(&mut rng, stage);
                            do_delete(ctx, key, &write_policy, ctx.client_data.debug);
                        }
                        Op::Udf => {
                            if let Workload::ReadUpdateFn { udf, .. } = &stage.workload {
                                do_udf(ctx, stage, &mut rng, udf, &udf_policy);
                            }
                        }
                    }
                    if let Some(t) = throttle.as_mut() {
                        let now = ctx.coordinator.clock().now();
                        let pause = t.pause_for(now);
                        ctx.coordinator.clock().sleep_until(now + pause);
                    }
                }
            }
        }

        ctx.coordinator.wait();
        if ctx.mailbox.is_finished() {
            break;
        }
    }
}

pub(super) fn resolve_write_indices(stage: &Stage) -> Option<Vec<usize>> {
    if stage.workload.full_replace_on_write() { None } else { stage.write_bins.clone() }
}

pub(super) fn build_record(
    stage: &Stage,
    rng: &mut StdRng,
    ctx: &WorkerContext,
    indices: Option<&[usize]>,
) -> Record {
    let pairs = populate(
        &stage.obj_spec,
        rng,
        &ctx.client_data.bin_base_name,
        indices,
        ctx.client_data.compression_ratio,
    )
    .expect("stage object spec is validated before any worker starts");
    Record::from_bins(pairs)
}

/// `batch_size` consecutive keys starting from a random offset within
/// the stage's range, wrapping rather than running past `key_end`.
pub(super) fn batch_keys(rng: &mut StdRng, stage: &Stage) -> Vec<u64> {
    let range = stage.key_end.saturating_sub(stage.key_start).max(1);
    let offset = if range > 1 { rng.gen_range(0..range) } else { 0 };
    (0..stage.batch_size as u64).map(|i| stage.key_start + (offset + i) % range).collect()
}

pub(super) fn debug_print(verb: &str, result: &dyn std::fmt::Debug, debug: bool) {
    if debug {
        eprintln!("kvbench: {verb} failed: {result:?}");
    }
}

fn do_read(ctx: &WorkerContext, stage: &Stage, rng: &mut StdRng, policy: &crate::client::ReadPolicy) {
    let batched = stage.batch_size > 1 && matches!(stage.workload, Workload::ReadUpdate { .. });
    let clock = ctx.coordinator.clock();
    if batched {
        let keys = batch_keys(rng, stage);
        let t0 = clock.now();
        let result = ctx.client_data.client.batch_read(&keys, policy);
        let t1 = clock.now();
        let outcome = match &result {
            Ok(values) if values.iter().any(Option::is_some) => Outcome::Hit,
            Ok(_) => Outcome::Miss,
            Err(OpError::Timeout) => Outcome::Timeout,
            Err(OpError::Error { .. }) => Outcome::Error,
        };
        if matches!(outcome, Outcome::Error) {
            debug_print("batch_read", &result, ctx.client_data.debug);
        }
        finish_op(&ctx.client_data.read, outcome, t0, t1);
    } else {
        let key = roll_key(rng, stage);
        let t0 = clock.now();
        let result = ctx.client_data.client.get(key, policy);
        let t1 = clock.now();
        let outcome = outcome_of(&result);
        if matches!(outcome, Outcome::Error) {
            debug_print("get", &result, ctx.client_data.debug);
        }
        finish_op(&ctx.client_data.read, outcome, t0, t1);
    }
}

fn do_put(ctx: &WorkerContext, key: u64, record: &Record, policy: &WritePolicy, debug: bool) {
    let clock = ctx.coordinator.clock();
    let t0 = clock.now();
    let result = ctx.client_data.client.put(key, record, policy);
    let t1 = clock.now();
    let outcome = outcome_of_unit(&result);
    if matches!(outcome, Outcome::Error) {
        debug_print("put", &result, debug);
    }
    finish_op(&ctx.client_data.write, outcome, t0, t1);
}

fn do_delete(ctx: &WorkerContext, key: u64, policy: &WritePolicy, debug: bool) {
    let clock = ctx.coordinator.clock();
    let t0 = clock.now();
    let result: OpResult<bool> = ctx.client_data.client.delete(key, policy);
    let t1 = clock.now();
    let outcome = outcome_of_bool(&result);
    if matches!(outcome, Outcome::Error) {
        debug_print("delete", &result, debug);
    }
    finish_op(&ctx.client_data.write, outcome, t0, t1);
}

fn do_udf(
    ctx: &WorkerContext,
    stage: &Stage,
    rng: &mut StdRng,
    udf: &UdfSpec,
    policy: &crate::client::UdfPolicy,
) {
    let key = roll_key(rng, stage);
    let args: Vec<Value> = populate(&udf.args_spec, rng, "arg", None, 1.0)
        .map(|pairs| pairs.into_iter().map(|(_, v)| v).collect())
        .unwrap_or_default();
    let clock = ctx.coordinator.clock();
    let t0 = clock.now();
    let result = ctx.client_data.client.udf_apply(key, &udf.module, &udf.function, &args, policy);
    let t1 = clock.now();
    let outcome = outcome_of_unit(&result);
    if matches!(outcome, Outcome::Error) {
        debug_print("udf_apply", &result, ctx.client_data.debug);
    }
    finish_op(&ctx.client_data.udf, outcome, t0, t1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{KvClient, MockKvClient};
    use crate::clock::{Clock, Micros};
    use crate::coordinator::Coordinator;
    use crate::data::{ClientData, OpClassData, WorkerMailbox};
    use crate::objspec::ObjSpec;
    use crate::stage::Stages;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;

    fn one_worker_context(
        stage: Stage,
        mock: Arc<MockKvClient>,
    ) -> (Arc<Coordinator>, Arc<WorkerMailbox>, WorkerContext) {
        let client: Arc<dyn KvClient> = mock.clone();
        let async_client: Arc<dyn crate::client::AsyncKvClient> = mock;
        let client_data = Arc::new(ClientData {
            client,
            async_client: Some(async_client),
            stages: Stages::new(vec![stage]),
            read: OpClassData::default(),
            write: OpClassData::default(),
            udf: OpClassData::default(),
            debug: false,
            compression_ratio: 1.0,
            bin_base_name: "testbin".into(),
            hdr_percentiles: vec![],
            histogram_file: None,
            hdr_dir: None,
            shutdown: Default::default(),
            txn_limit: None,
            txn_total: AtomicU64::new(0),
        });
        let coordinator = Arc::new(Coordinator::new(1, Clock::new()));
        let mailbox = Arc::new(WorkerMailbox::new());
        let ctx = WorkerContext {
            idx: 0,
            n_threads: 1,
            client_data,
            coordinator: coordinator.clone(),
            mailbox: mailbox.clone(),
            base_seed: 7,
        };
        (coordinator, mailbox, ctx)
    }

    /// Plays the coordinator side of the single-stage lifecycle (this
    /// stage is always "last", so it ends in `shut_down` rather than
    /// `end_stage`) while a worker thread runs [`run`] against `ctx`.
    fn drive_single_stage(coordinator: &Coordinator, mailbox: &WorkerMailbox) {
        mailbox.start_stage(0);
        coordinator.begin_stage();
        coordinator.wait();
        coordinator.complete();
        coordinator.sleep(Micros::MAX);
        mailbox.shut_down();
        coordinator.wait();
    }

    #[test]
    fn bounded_insert_stage_writes_every_key_via_one_worker() {
        let mock = Arc::new(MockKvClient::new());
        let stage = Stage {
            duration_s: 0,
            desc: "load".into(),
            tps: 0,
            ttl_s: 0,
            key_start: 0,
            key_end: 50,
            pause_s: 0,
            batch_size: 1,
            is_async: false,
            random: false,
            workload: Workload::InsertLinear { pct: 100 },
            obj_spec: ObjSpec::default(),
            read_bins: None,
            write_bins: None,
        };
        let (coordinator, mailbox, ctx) = one_worker_context(stage, mock.clone());

        let worker = std::thread::spawn(move || run(&ctx));
        drive_single_stage(&coordinator, &mailbox);
        worker.join().unwrap();

        assert_eq!(mock.len(), 50);
    }

    #[test]
    fn open_ended_read_update_stage_stops_once_shut_down() {
        let mock = Arc::new(MockKvClient::new());
        let stage = Stage {
            duration_s: 0,
            desc: "transact".into(),
            tps: 0,
            ttl_s: 0,
            key_start: 0,
            key_end: 100,
            pause_s: 0,
            batch_size: 1,
            is_async: false,
            random: false,
            workload: Workload::ReadUpdate { read_pct: 50 },
            obj_spec: ObjSpec::default(),
            read_bins: None,
            write_bins: None,
        };
        let (coordinator, mailbox, ctx) = one_worker_context(stage, mock);
        let client_data = ctx.client_data.clone();

        let worker = std::thread::spawn(move || run(&ctx));

        mailbox.start_stage(0);
        coordinator.begin_stage();
        coordinator.wait();
        std::thread::sleep(std::time::Duration::from_millis(20));
        coordinator.complete();
        coordinator.sleep(Micros::MAX);
        mailbox.shut_down();
        coordinator.wait();
        worker.join().unwrap();

        let total = client_data.read.counters.snapshot_and_reset().count
            + client_data.write.counters.snapshot_and_reset().count;
        assert!(total > 0, "an open-ended worker given 20ms should complete at least one op");
    }
}
