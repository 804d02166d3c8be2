// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scanbench::job_engine::closure_job::ClosureJob;

/// Sleeps for `interval`, then returns `value`.
pub fn sleeping_job(value: usize, interval: Duration) -> ClosureJob<usize> {
    ClosureJob::new(format!("sleep {value}"), move |_| {
        thread::sleep(interval);
        Ok(value)
    })
}

/// Bumps `counter` and returns the name of the thread it ran on.
pub fn counting_job(counter: &Arc<AtomicUsize>) -> ClosureJob<String> {
    let counter = counter.clone();
    ClosureJob::new("count", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(thread::current().name().unwrap_or("unnamed").to_string())
    })
}

/// Fails on the given cycle and returns the cycle number otherwise.
pub fn failing_on(cycle: usize, failing_cycle: usize) -> ClosureJob<usize> {
    ClosureJob::new(format!("cycle {cycle}"), move |_| {
        if cycle == failing_cycle {
            anyhow::bail!("cycle {cycle} failed on purpose");
        }
        Ok(cycle)
    })
}

/// Spins until cancelled, or gives up after `limit`.
pub fn cooperative_job(limit: Duration) -> ClosureJob<bool> {
    ClosureJob::new("cooperative", move |cancel| {
        let started = std::time::Instant::now();
        while !cancel.is_cancelled() && started.elapsed() < limit {
            thread::sleep(Duration::from_millis(1));
        }
        log::debug!("cooperative job saw cancellation: {}", cancel.is_cancelled());
        Ok(cancel.is_cancelled())
    })
}
