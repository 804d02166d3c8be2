// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// Mean wall-clock cost of dispatching one no-op job and waiting for it.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::time::{Duration, Instant};

use scanbench::job_engine::bounded_pool::BoundedPool;
use scanbench::job_engine::closure_job::ClosureJob;
use scanbench::job_engine::persistent_worker::PersistentWorker;
use scanbench::job_engine::transient::Transient;
use scanbench::job_engine::{Dispatcher, DispatcherExt};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Executor {
    /// Create a pool of one, run the job, shut the pool down, every time
    ThreadPoolWithJoin,
    /// Reuse one pool for all runs
    ThreadPool,
    /// Spawn and join a thread per run
    Thread,
    /// Reuse one persistent worker for all runs
    SingleWorker,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Job dispatch benchmark")]
struct Args {
    /// Number of runs
    #[arg(short, long, default_value_t = 100)]
    number: u32,

    /// Executor to use
    #[arg(short, long, value_enum)]
    executor: Executor,

    /// Pool size, defaults to 1 with join and 10 without
    #[arg(long)]
    pool_size: Option<usize>,
}

fn noop() -> ClosureJob<()> {
    ClosureJob::new("noop", |_| Ok(()))
}

fn time_runs(number: u32, mut run: impl FnMut() -> anyhow::Result<()>) -> anyhow::Result<Duration> {
    let started = Instant::now();
    for _ in 0..number {
        run()?;
    }
    Ok(started.elapsed())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.number == 0 {
        anyhow::bail!("--number must be at least 1");
    }

    println!("Run {} times", args.number);
    let total = match args.executor {
        Executor::ThreadPoolWithJoin => {
            let size = args.pool_size.unwrap_or(1);
            println!("Run thread pool (size={size}) with join");
            time_runs(args.number, || {
                let mut pool = BoundedPool::new(size)?;
                pool.submit_with_handle(noop())?.result()?;
                pool.shutdown()?;
                Ok(())
            })?
        }
        Executor::ThreadPool => {
            let size = args.pool_size.unwrap_or(10);
            println!("Run thread pool (size={size}) without join");
            let mut pool = BoundedPool::new(size)?;
            let total = time_runs(args.number, || {
                pool.submit_with_handle(noop())?.result()?;
                Ok(())
            })?;
            pool.shutdown()?;
            total
        }
        Executor::Thread => {
            println!("Run thread");
            let mut transient = Transient::new();
            time_runs(args.number, || {
                transient.run(noop())?;
                Ok(())
            })?
        }
        Executor::SingleWorker => {
            println!("Run single worker");
            let mut worker = PersistentWorker::started().context("failed to start worker")?;
            let total = time_runs(args.number, || {
                worker.run_and_wait(noop(), None)?;
                Ok(())
            })?;
            worker.join()?;
            total
        }
    };

    let mean = total.as_secs_f64() / f64::from(args.number);
    println!("Mean time: {mean}");
    Ok(())
}
