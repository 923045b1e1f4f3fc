//! Per-thread transaction loops (§4.5): [`sync`] for native OS threads,
//! [`async_worker`] for the cooperative single-loop mode. Both submodules
//! share [`WorkerContext`] (the immutable handle into process-wide state)
//! and the small helpers in this file for building per-op policies and
//! rolling the workload dice.

pub mod async_worker;
pub mod sync;

use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;

use crate::client::{ReadPolicy, UdfPolicy, WritePolicy};
use crate::coordinator::Coordinator;
use crate::data::{ClientData, WorkerMailbox};
use crate::stage::Stage;

/// Everything one worker needs that isn't thread-local: back-references
/// to the shared [`ClientData`] and [`Coordinator`], and its own mailbox
/// — the "shared immutable context handle + per-worker mailbox" design
/// from spec.md §9, replacing a raw coordinator<->worker back-pointer
/// cycle.
pub struct WorkerContext {
    pub idx: u32,
    pub n_threads: u32,
    pub client_data: Arc<ClientData>,
    pub coordinator: Arc<Coordinator>,
    pub mailbox: Arc<WorkerMailbox>,
    /// Per-thread PRNG seed base; each worker derives its own stream as
    /// `base_seed ^ idx` so runs are reproducible given `--seed` (§3
    /// "PRNG" ambient note) without threads sharing a generator.
    pub base_seed: u64,
}

impl WorkerContext {
    pub fn current_stage(&self) -> &Stage {
        let stage_idx = self.mailbox.stage_idx();
        self.client_data
            .stages
            .get(stage_idx)
            .expect("coordinator never advances stage_idx past the stage count")
    }

    pub fn seeded_rng(&self) -> StdRng {
        use rand::SeedableRng;
        StdRng::seed_from_u64(self.base_seed ^ self.idx as u64)
    }
}

/// Policies for one stage, built fresh at stage start (§4.5 "init
/// per-stage policies"). `ttl_s` is the only stage field that feeds a
/// policy; everything else is a type default, since the core has no
/// further per-stage socket/retry knobs to plumb through.
pub fn stage_policies(stage: &Stage) -> (ReadPolicy, WritePolicy, UdfPolicy) {
    let write = WritePolicy {
        timeout_us: None,
        expiration_seconds: if stage.ttl_s == 0 { None } else { Some(stage.ttl_s) },
    };
    (ReadPolicy::default(), write, UdfPolicy::default())
}

/// Rolls `r in [0, 100)` for the workload dice (§4.5).
pub fn roll_percent(rng: &mut StdRng) -> u32 {
    rng.gen_range(0..100)
}

/// Rolls a uniformly random key in this stage's `[key_start, key_end)`.
pub fn roll_key(rng: &mut StdRng, stage: &Stage) -> u64 {
    if stage.key_end <= stage.key_start {
        return stage.key_start;
    }
    rng.gen_range(stage.key_start..stage.key_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objspec::ObjSpec;
    use crate::stage::Workload;
    use rand::SeedableRng;

    fn stage() -> Stage {
        Stage {
            duration_s: 0,
            desc: "t".into(),
            tps: 0,
            ttl_s: 60,
            key_start: 10,
            key_end: 20,
            pause_s: 0,
            batch_size: 1,
            is_async: false,
            random: false,
            workload: Workload::ReadUpdate { read_pct: 50 },
            obj_spec: ObjSpec::default(),
            read_bins: None,
            write_bins: None,
        }
    }

    #[test]
    fn stage_policies_carries_ttl_as_expiration() {
        let (_, write, _) = stage_policies(&stage());
        assert_eq!(write.expiration_seconds, Some(60));
    }

    #[test]
    fn zero_ttl_means_no_expiration_override() {
        let mut s = stage();
        s.ttl_s = 0;
        let (_, write, _) = stage_policies(&s);
        assert_eq!(write.expiration_seconds, None);
    }

    #[test]
    fn roll_key_stays_in_stage_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = stage();
        for _ in 0..100 {
            let k = roll_key(&mut rng, &s);
            assert!((s.key_start..s.key_end).contains(&k));
        }
    }
}
