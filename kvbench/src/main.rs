//! kvbench — key-value store benchmark harness.
//!
//! Drives a configurable mix of insert/read/update/delete/UDF workloads
//! against a `KvClient`, in stages described either by a YAML
//! workload-stages file or by a single default stage built from CLI
//! flags, and periodically reports throughput and latency.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use kvbench_core::client::MockKvClient;
use kvbench_core::data::{ClientData, OpClassData};
use kvbench_core::error::UsageError;
use kvbench_core::hdr::HdrHistogram;
use kvbench_core::histogram::{Histogram, RangeSpec};
use kvbench_core::objspec;
use kvbench_core::orchestrator::{Orchestrator, RunConfig};
use kvbench_core::stage::{Stage, Stages, Workload};
use kvbench_core::stagefile;

/// Key-value store benchmark harness.
#[derive(Parser)]
#[command(name = "kvbench", about = "Key-value store benchmark harness", version)]
struct Args {
    /// First key of the default stage's range. Ignored when `--workload-stages` is given.
    #[arg(long, default_value_t = 0)]
    start_key: u64,

    /// Number of keys in the default stage's range. Ignored when `--workload-stages` is given.
    #[arg(long, default_value_t = 1_000_000)]
    key_count: u64,

    /// Object-spec string for the default stage's record shape.
    #[arg(long = "object-spec", short = 'o', default_value = "I4")]
    object_spec: String,

    /// YAML file describing the run's stages. When omitted, a single
    /// insert-then-read-update pair of default stages is run instead.
    #[arg(long = "workload-stages", short = 'w')]
    workload_stages: Option<PathBuf>,

    /// Number of worker threads (sync mode) or event loops (async mode).
    #[arg(long, short = 'z', default_value_t = 16)]
    threads: u32,

    /// Drive the workload through the cooperative async worker instead of one OS thread per worker.
    #[arg(long = "async")]
    async_mode: bool,

    /// Maximum in-flight async commands per event loop.
    #[arg(long, default_value_t = 50)]
    async_max_commands: u32,

    /// Number of cooperative event loops in async mode. Ignored in sync mode, where `--threads` governs worker count instead.
    #[arg(long = "event-loop-count")]
    event_loop_count: Option<u32>,

    /// Print per-operation errors to stderr as they happen.
    #[arg(long)]
    debug: bool,

    /// Record a linear latency histogram and print/append a snapshot line per period.
    #[arg(long)]
    latency: bool,

    /// Comma-separated percentiles to print from the HDR histogram (e.g. "50,90,99,99.9").
    #[arg(long = "hdr-percentiles", value_delimiter = ',')]
    hdr_percentiles: Vec<f64>,

    /// Append histogram snapshot lines to this file in addition to stdout.
    #[arg(long = "histogram-output")]
    histogram_output: Option<PathBuf>,

    /// Reporter period, in seconds.
    #[arg(long = "histogram-period", default_value_t = 1)]
    histogram_period_s: u64,

    /// Directory HDR histogram logs are written under (reserved for a future on-disk HDR-log encoding).
    #[arg(long = "hdr-output-dir")]
    hdr_output_dir: Option<PathBuf>,

    /// Fraction of generated string/byte payloads that are actually random versus zero-filled, trading CPU for compressibility.
    #[arg(long = "compression-ratio", default_value_t = 1.0)]
    compression_ratio: f64,

    /// Base PRNG seed; each worker derives `seed ^ worker_index`.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("kvbench={level}").parse().unwrap())
        .add_directive(format!("kvbench_core={level}").parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Builds the default two-stage run (bulk insert, then an open-ended
/// 50/50 read/update workload) used when no workload-stages file is given.
fn default_stages(args: &Args) -> Result<Stages, UsageError> {
    let obj_spec = objspec::parse(&args.object_spec)?;
    let key_end = args.start_key.saturating_add(args.key_count);

    let load = Stage {
        duration_s: 0,
        desc: "load".into(),
        tps: 0,
        ttl_s: 0,
        key_start: args.start_key,
        key_end,
        pause_s: 0,
        batch_size: 1,
        is_async: args.async_mode,
        random: false,
        workload: Workload::InsertLinear { pct: 100 },
        obj_spec: obj_spec.clone(),
        read_bins: None,
        write_bins: None,
    };
    let transact = Stage {
        duration_s: 0,
        desc: "read/update".into(),
        tps: 0,
        ttl_s: 0,
        key_start: args.start_key,
        key_end,
        pause_s: 0,
        batch_size: 1,
        is_async: args.async_mode,
        random: false,
        workload: Workload::ReadUpdate { read_pct: 50 },
        obj_spec,
        read_bins: None,
        write_bins: None,
    };
    Ok(Stages::new(vec![load, transact]))
}

fn load_stages(args: &Args) -> Result<Stages, UsageError> {
    match &args.workload_stages {
        Some(path) => {
            let yaml = std::fs::read_to_string(path).map_err(|e| {
                UsageError::BadArgument(format!("reading {}: {e}", path.display()))
            })?;
            stagefile::parse_stage_file(&yaml)
        }
        None => default_stages(args),
    }
}

/// The default linear-histogram layout used whenever `--latency` is set
/// (§8's worked classification example): 100us-aligned buckets from
/// 100us to 4ms, 1ms buckets to 64ms, 4ms buckets to 128ms.
fn default_histogram() -> Histogram {
    Histogram::new(
        100,
        &[
            RangeSpec { upper_bound: 4_000, bucket_width: 100 },
            RangeSpec { upper_bound: 64_000, bucket_width: 1_000 },
            RangeSpec { upper_bound: 128_000, bucket_width: 4_000 },
        ],
    )
    .expect("default histogram layout is valid")
}

fn op_class(args: &Args) -> OpClassData {
    OpClassData {
        counters: Default::default(),
        linear: args.latency.then(default_histogram),
        hdr: (!args.hdr_percentiles.is_empty()).then(|| HdrHistogram::new(30_000_000, 3)),
    }
}

fn build_client_data(args: &Args, stages: Stages) -> Result<ClientData, UsageError> {
    let histogram_file = match &args.histogram_output {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path).map_err(
                |e| UsageError::BadArgument(format!("opening {}: {e}", path.display())),
            )?;
            Some(std::sync::Mutex::new(file))
        }
        None => None,
    };

    let client = Arc::new(MockKvClient::new());
    Ok(ClientData {
        client: client.clone(),
        async_client: Some(client),
        stages,
        read: op_class(args),
        write: op_class(args),
        udf: op_class(args),
        debug: args.debug,
        compression_ratio: args.compression_ratio,
        bin_base_name: "testbin".into(),
        hdr_percentiles: args.hdr_percentiles.clone(),
        histogram_file,
        hdr_dir: args.hdr_output_dir.clone(),
        shutdown: AtomicBool::new(false),
        txn_limit: None,
        txn_total: Default::default(),
    })
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let stages = match load_stages(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("kvbench: {e}");
            std::process::exit(1);
        }
    };

    let client_data = match build_client_data(&args, stages) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            eprintln!("kvbench: {e}");
            std::process::exit(1);
        }
    };

    if args.async_mode && client_data.async_client.is_none() {
        eprintln!("kvbench: --async requires an AsyncKvClient, none is available");
        std::process::exit(2);
    }

    let shutdown_flag = client_data.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_flag.shutdown.store(true, Ordering::Relaxed);
    }) {
        warn!("failed to set Ctrl-C handler: {e}");
    }

    info!("kvbench {} starting, {} stages", env!("CARGO_PKG_VERSION"), client_data.stages.len());

    let config = RunConfig {
        n_threads: args.threads,
        async_mode: args.async_mode,
        async_max_commands: args.async_max_commands,
        event_loop_count: args.event_loop_count.unwrap_or(args.threads),
        base_seed: args.seed,
        histogram_period: Duration::from_secs(args.histogram_period_s.max(1)),
    };

    let orchestrator = Orchestrator::new(client_data, config);
    match orchestrator.run() {
        Ok(()) => {
            info!("run complete");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("kvbench: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
