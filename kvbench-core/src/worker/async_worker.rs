//! Cooperative async worker (§4.5 "Async worker", §9 "Async completion
//! chain").
//!
//! Modelled as a single-threaded reactor with a bounded number of
//! in-flight commands, not a `tokio` task per operation (see
//! SPEC_FULL.md §4.5 for why): this loop seeds up to
//! `async_max_commands` requests, and after every pass refills whatever
//! slots completion callbacks have freed, until `do_work` clears and no
//! request remains in flight. Completion callbacks only do bookkeeping
//! (record the result, free their slot) — they never themselves issue
//! the next request, which would recurse one stack frame per completed
//! op for a client (like [`crate::client::MockKvClient`]) whose async
//! methods fire inline. Scheduling always happens back in this loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use rand::rngs::StdRng;

use crate::client::{AsyncKvClient, Record, WritePolicy};
use crate::data::{Outcome, finish_op, outcome_of, outcome_of_bool, outcome_of_unit};
use crate::stage::{Op, Stage, UdfSpec, Workload};
use crate::throttle::DynThrottle;
use crate::value::Value;

use super::sync::{batch_keys, build_record, debug_print, resolve_write_indices};
use super::{WorkerContext, roll_key, roll_percent, stage_policies};

/// Runs this worker's async event loop through every stage.
pub fn run(ctx: &WorkerContext, async_max_commands: u32) {
    let async_client = ctx
        .client_data
        .async_client
        .clone()
        .expect("async stages require an AsyncKvClient on ClientData");
    let mut rng = ctx.seeded_rng();
    let n_stages = ctx.client_data.stages.len();
    let max_in_flight = async_max_commands.max(1) as usize;

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

        let in_flight = Arc::new(AtomicUsize::new(0));

        if stage.workload.is_bounded() {
            let next_key = AtomicI64::new((stage.key_start + ctx.idx as u64) as i64);
            let stride = ctx.n_threads as i64;
            let key_end = stage.key_end as i64;
            loop {
                while in_flight.load(Ordering::Acquire) < max_in_flight && ctx.mailbox.do_work() {
                    let key = next_key.fetch_add(stride, Ordering::AcqRel);
                    if key >= key_end {
                        break;
                    }
                    in_flight.fetch_add(1, Ordering::AcqRel);
                    match &stage.workload {
                        Workload::InsertLinear { .. } => {
                            let record = match &fixed_full_record {
                                Some(r) => r.clone(),
                                None => build_record(stage, &mut rng, ctx, None),
                            };
                            issue_put(ctx, &async_client, key as u64, record, write_policy.clone(), &in_flight);
                        }
                        Workload::DeleteBin => {
                            issue_delete(ctx, &async_client, key as u64, write_policy.clone(), &in_flight);
                        }
                        _ => unreachable!("only InsertLinear/DeleteBin are bounded"),
                    }
                }
                let drained = in_flight.load(Ordering::Acquire) == 0;
                let exhausted = next_key.load(Ordering::Acquire) >= key_end;
                if drained && (exhausted || !ctx.mailbox.do_work()) {
                    break;
                }
                std::thread::yield_now();
            }
            ctx.coordinator.complete();
        } else {
            ctx.coordinator.complete();
            loop {
                while in_flight.load(Ordering::Acquire) < max_in_flight && ctx.mailbox.do_work() {
                    in_flight.fetch_add(1, Ordering::AcqRel);
                    let roll = roll_percent(&mut rng);
                    match stage.workload.classify(roll) {
                        Op::Read => {
                            issue_read(ctx, &async_client, stage, &mut rng, read_policy.clone(), &in_flight)
                        }
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
                            issue_put(ctx, &async_client, key, record, write_policy.clone(), &in_flight);
                        }
                        Op::Delete => {
                            let key = roll_key(&mut rng, stage);
                            issue_delete(ctx, &async_client, key, write_policy.clone(), &in_flight);
                        }
                        Op::Udf => {
                            if let Workload::ReadUpdateFn { udf, .. } = &stage.workload {
                                let key = roll_key(&mut rng, stage);
                                let args: Vec<Value> = crate::objspec::populate(
                                    &udf.args_spec,
                                    &mut rng,
                                    "arg",
                                    None,
                                    1.0,
                                )
                                .map(|pairs| pairs.into_iter().map(|(_, v)| v).collect())
                                .unwrap_or_default();
                                issue_udf(
                                    ctx,
                                    &async_client,
                                    key,
                                    udf,
                                    args,
                                    udf_policy.clone(),
                                    &in_flight,
                                );
                            } else {
                                in_flight.fetch_sub(1, Ordering::AcqRel);
                            }
                        }
                    }
                    if let Some(t) = throttle.as_mut() {
                        let now = ctx.coordinator.clock().now();
                        let pause = t.pause_for(now);
                        ctx.coordinator.clock().sleep_until(now + pause);
                    }
                }
                if !ctx.mailbox.do_work() && in_flight.load(Ordering::Acquire) == 0 {
                    break;
                }
                std::thread::yield_now();
            }
        }

        ctx.coordinator.wait();
        if ctx.mailbox.is_finished() {
            break;
        }
    }
}

fn issue_put(
    ctx: &WorkerContext,
    client: &Arc<dyn AsyncKvClient>,
    key: u64,
    record: Record,
    policy: WritePolicy,
    in_flight: &Arc<AtomicUsize>,
) {
    let data = ctx.client_data.clone();
    let in_flight = in_flight.clone();
    let debug = ctx.client_data.debug;
    let t0 = ctx.coordinator.clock().now();
    let clock = ctx.coordinator.clock().clone();
    client.put_async(
        key,
        record,
        policy,
        Box::new(move |result| {
            let outcome = outcome_of_unit(&result);
            if matches!(outcome, Outcome::Error) {
                debug_print("put_async", &result, debug);
            }
            finish_op(&data.write, outcome, t0, clock.now());
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }),
    );
}

fn issue_delete(
    ctx: &WorkerContext,
    client: &Arc<dyn AsyncKvClient>,
    key: u64,
    policy: WritePolicy,
    in_flight: &Arc<AtomicUsize>,
) {
    let data = ctx.client_data.clone();
    let in_flight = in_flight.clone();
    let debug = ctx.client_data.debug;
    let t0 = ctx.coordinator.clock().now();
    let clock = ctx.coordinator.clock().clone();
    client.delete_async(
        key,
        policy,
        Box::new(move |result| {
            let outcome = outcome_of_bool(&result);
            if matches!(outcome, Outcome::Error) {
                debug_print("delete_async", &result, debug);
            }
            finish_op(&data.write, outcome, t0, clock.now());
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }),
    );
}

fn issue_read(
    ctx: &WorkerContext,
    client: &Arc<dyn AsyncKvClient>,
    stage: &Stage,
    rng: &mut StdRng,
    policy: crate::client::ReadPolicy,
    in_flight: &Arc<AtomicUsize>,
) {
    let data = ctx.client_data.clone();
    let in_flight = in_flight.clone();
    let debug = ctx.client_data.debug;
    let t0 = ctx.coordinator.clock().now();
    let clock = ctx.coordinator.clock().clone();
    if stage.batch_size > 1 && matches!(stage.workload, Workload::ReadUpdate { .. }) {
        let keys = batch_keys(rng, stage);
        client.batch_read_async(
            keys,
            policy,
            Box::new(move |result| {
                let outcome = match &result {
                    Ok(values) if values.iter().any(Option::is_some) => Outcome::Hit,
                    Ok(_) => Outcome::Miss,
                    Err(crate::client::OpError::Timeout) => Outcome::Timeout,
                    Err(crate::client::OpError::Error { .. }) => Outcome::Error,
                };
                if matches!(outcome, Outcome::Error) {
                    debug_print("batch_read_async", &result, debug);
                }
                finish_op(&data.read, outcome, t0, clock.now());
                in_flight.fetch_sub(1, Ordering::AcqRel);
            }),
        );
    } else {
        let key = roll_key(rng, stage);
        client.get_async(
            key,
            policy,
            Box::new(move |result| {
                let outcome = outcome_of(&result);
                if matches!(outcome, Outcome::Error) {
                    debug_print("get_async", &result, debug);
                }
                finish_op(&data.read, outcome, t0, clock.now());
                in_flight.fetch_sub(1, Ordering::AcqRel);
            }),
        );
    }
}

fn issue_udf(
    ctx: &WorkerContext,
    client: &Arc<dyn AsyncKvClient>,
    key: u64,
    udf: &UdfSpec,
    args: Vec<Value>,
    policy: crate::client::UdfPolicy,
    in_flight: &Arc<AtomicUsize>,
) {
    let data = ctx.client_data.clone();
    let in_flight = in_flight.clone();
    let debug = ctx.client_data.debug;
    let t0 = ctx.coordinator.clock().now();
    let clock = ctx.coordinator.clock().clone();
    client.udf_apply_async(
        key,
        udf.module.clone(),
        udf.function.clone(),
        args,
        policy,
        Box::new(move |result| {
            let outcome = outcome_of_unit(&result);
            if matches!(outcome, Outcome::Error) {
                debug_print("udf_apply_async", &result, debug);
            }
            finish_op(&data.udf, outcome, t0, clock.now());
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{KvClient, MockKvClient};
    use crate::clock::{Clock, Micros};
    use crate::coordinator::Coordinator;
    use crate::data::{ClientData, OpClassData, WorkerMailbox};
    use crate::objspec::ObjSpec;
    use crate::stage::{Stage, Stages, Workload};
    use std::sync::atomic::AtomicU64;

    fn one_worker_context(
        stage: Stage,
        mock: Arc<MockKvClient>,
    ) -> (Arc<Coordinator>, Arc<WorkerMailbox>, WorkerContext) {
        let client: Arc<dyn KvClient> = mock.clone();
        let async_client: Arc<dyn AsyncKvClient> = mock;
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
            base_seed: 3,
        };
        (coordinator, mailbox, ctx)
    }

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
    fn bounded_insert_stage_writes_every_key_via_async_worker() {
        let mock = Arc::new(MockKvClient::new());
        let stage = Stage {
            duration_s: 0,
            desc: "load".into(),
            tps: 0,
            ttl_s: 0,
            key_start: 0,
            key_end: 37,
            pause_s: 0,
            batch_size: 1,
            is_async: true,
            random: false,
            workload: Workload::InsertLinear { pct: 100 },
            obj_spec: ObjSpec::default(),
            read_bins: None,
            write_bins: None,
        };
        let (coordinator, mailbox, ctx) = one_worker_context(stage, mock.clone());

        let worker = std::thread::spawn(move || run(&ctx, 8));
        drive_single_stage(&coordinator, &mailbox);
        worker.join().unwrap();

        assert_eq!(mock.len(), 37);
    }

    #[test]
    fn open_ended_stage_drains_in_flight_callbacks_before_exiting() {
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
            is_async: true,
            random: false,
            workload: Workload::ReadUpdate { read_pct: 50 },
            obj_spec: ObjSpec::default(),
            read_bins: None,
            write_bins: None,
        };
        let (coordinator, mailbox, ctx) = one_worker_context(stage, mock);
        let client_data = ctx.client_data.clone();

        let worker = std::thread::spawn(move || run(&ctx, 4));

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
        assert!(total > 0, "an open-ended async worker given 20ms should complete at least one op");
    }
}
