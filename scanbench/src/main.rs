// SPDX-License-Identifier: MIT
// scanbench: Storage Performance Indicator Measurement
//
// - Runs a scan (random data, stored through a record sink) `--repeat` times.
// - Each scan is dispatched with the selected strategy and awaited.
// - Resident memory is printed before and after every scan and at the end.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::Parser;
use log::info;
use std::path::PathBuf;

use scanbench::cycle_runner::{CycleRunner, RunnerConfig};
use scanbench::global_config::{
    self, ColumnCounts, ConfigError, DispatchStrategy, RecordSinkKind, RunConfig,
};
use scanbench::job_engine::DispatcherSlot;
use scanbench::resource_reporter::{ConsoleReporter, ProcessMemoryProbe};
use scanbench::scan::{ScanConfig, ScanJob, DESCRIPTION};

#[derive(Debug, Parser)]
#[command(author, version, about = DESCRIPTION)]
struct Args {
    /// File to store the scan data
    #[arg(short, long)]
    file: PathBuf,

    /// Number of scan repeats
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// Where to run the scan
    #[arg(short = 't', long, value_enum, default_value_t)]
    strategy: DispatchStrategy,

    /// Worker threads of the bounded pool
    #[arg(long, default_value_t = 10)]
    pool_size: usize,

    /// Record sink the scan writes to
    #[arg(short = 'p', long, value_enum, default_value_t)]
    sink: RecordSinkKind,

    /// Shut the dispatcher down after the last scan
    #[arg(short = 'j', long)]
    teardown: bool,

    /// Points per scan
    #[arg(long, default_value_t = 100)]
    points: u64,

    /// Columns per point: scalars[,spectra,images]
    #[arg(long, default_value = "20,0,1")]
    columns: String,

    /// Integration time per point, in seconds
    #[arg(long, default_value_t = 0.001)]
    integ_time: f64,

    /// Give up waiting for a scan after this many seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Pause before the final memory readout, in seconds
    #[arg(long, default_value_t = 3.0)]
    settle: f64,

    /// Print the run summary as a single JSON line instead of the readouts
    #[arg(long)]
    json: bool,
}

fn validate_args(args: Args) -> Result<RunConfig, ConfigError> {
    if args.pool_size == 0 {
        return Err(ConfigError::ZeroPoolSize);
    }
    if args.points == 0 {
        return Err(ConfigError::ZeroPoints);
    }
    if args.sink == RecordSinkKind::File {
        global_config::ensure_output_dir(&args.file)?;
    }
    let columns: ColumnCounts = args.columns.parse()?;
    let timeout = args
        .timeout
        .map(|secs| global_config::seconds("timeout", secs))
        .transpose()?;

    Ok(RunConfig {
        output: args.file,
        strategy: args.strategy,
        pool_size: args.pool_size,
        sink: args.sink,
        scan: ScanConfig {
            columns,
            nb_of_points: args.points,
            integ_time: global_config::seconds("integ-time", args.integ_time)?,
            ..ScanConfig::default()
        },
        runner: RunnerConfig {
            repeat: args.repeat,
            teardown: args.teardown,
            timeout,
            settle: global_config::seconds("settle", args.settle)?,
        },
        json: args.json,
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match validate_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    info!(
        "Running {} scans with {:?} into {:?} sink",
        config.runner.repeat, config.strategy, config.sink
    );
    let reporter = if config.json {
        ConsoleReporter::quiet()
    } else {
        ConsoleReporter::new()
    };
    let mut runner = CycleRunner::new(
        config.runner.clone(),
        DispatcherSlot::new(config.strategy, config.pool_size),
        ProcessMemoryProbe::new(),
        reporter,
    );

    let outcome = runner.run(|cycle| {
        ScanJob::new(config.scan.clone(), &config.output, config.sink).with_serialno(cycle as u64)
    })?;

    if config.json {
        println!("{}", serde_json::to_string(&outcome.report)?);
    }
    if outcome.report.failures > 0 {
        eprintln!(
            "{} of {} scans failed",
            outcome.report.failures,
            outcome.report.cycles.len()
        );
        std::process::exit(1);
    }
    Ok(())
}
