//! kvbench-core — the benchmark engine behind `kvbench`.
//!
//! Provides:
//! - `stage`/`stagefile` — the stage data model and its YAML input format
//! - `objspec` — the object-spec mini-language (parser, generator, validator)
//! - `client` — the `KvClient`/`AsyncKvClient` seams and the in-memory mock used by tests
//! - `coordinator`/`barrier` — the stage-lifecycle synchronization primitives
//! - `throttle` — the adaptive per-worker pacer
//! - `histogram`/`hdr` — latency recording, linear and HDR
//! - `worker` — the sync and async per-thread main loops
//! - `orchestrator` — wires everything above into one run
//! - `reporter` — the periodic tick thread that drains counters/histograms
//! - `data` — the `ClientData` shared-state handle workers and the reporter read from
//! - `error` — the usage/connect-init/fatal error taxonomy
//! - `clock`/`value` — small supporting types

pub mod barrier;
pub mod client;
pub mod clock;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod hdr;
pub mod histogram;
pub mod objspec;
pub mod orchestrator;
pub mod reporter;
pub mod stage;
pub mod stagefile;
pub mod throttle;
pub mod value;
pub mod worker;
