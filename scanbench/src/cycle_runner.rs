// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use log::{debug, error, info, warn};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

use crate::global_config::DispatchStrategy;
use crate::job_engine::{DispatchError, DispatcherSlot, Job, JobError};
use crate::resource_reporter::{
    reclaim_freed_memory, MemoryProbe, MemorySample, ResourceReporter,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub repeat: usize,
    /// Shut the dispatcher down after the last cycle
    pub teardown: bool,
    pub timeout: Option<Duration>,
    /// Pause before the final readout so the OS can reclaim freed pages
    pub settle: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repeat: 1,
            teardown: false,
            timeout: None,
            settle: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// 1-based
    pub cycle: usize,
    pub before: MemorySample,
    pub after: MemorySample,
    pub elapsed_secs: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub event: &'static str,
    pub strategy: DispatchStrategy,
    pub cycles: Vec<CycleReport>,
    pub failures: usize,
    pub dispatchers_created: u64,
    pub torn_down: bool,
    pub final_memory: MemorySample,
    pub elapsed_secs: f64,
}

/// Everything a run produced: the report plus each cycle's result in order.
#[derive(Debug)]
pub struct RunOutcome<T> {
    pub report: RunReport,
    pub results: Vec<Result<T, JobError>>,
}

/// Drives repeated submit-wait-report cycles through one dispatcher slot.
pub struct CycleRunner<P, R> {
    config: RunnerConfig,
    slot: DispatcherSlot,
    probe: P,
    reporter: R,
}

impl<P: MemoryProbe, R: ResourceReporter> CycleRunner<P, R> {
    pub fn new(config: RunnerConfig, slot: DispatcherSlot, probe: P, reporter: R) -> Self {
        Self {
            config,
            slot,
            probe,
            reporter,
        }
    }

    pub fn slot(&self) -> &DispatcherSlot {
        &self.slot
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Runs `config.repeat` cycles, building each cycle's job with `make_job(cycle)`.
    ///
    /// A failing or timed out job is reported and the run goes on. Only an
    /// unusable dispatcher ends the run early.
    pub fn run<J, F>(&mut self, mut make_job: F) -> Result<RunOutcome<J::Output>, DispatchError>
    where
        J: Job,
        F: FnMut(usize) -> J,
    {
        let started = Instant::now();
        let mut cycles = Vec::with_capacity(self.config.repeat);
        let mut results = Vec::with_capacity(self.config.repeat);

        for cycle in 1..=self.config.repeat {
            let before = MemorySample::take(&mut self.probe);
            let cycle_started = Instant::now();
            let result = self.slot.run_and_wait(make_job(cycle), self.config.timeout);
            let elapsed_secs = cycle_started.elapsed().as_secs_f64();
            let after = MemorySample::take(&mut self.probe);

            let error = match &result {
                Ok(_) => None,
                Err(JobError::Dispatch(e)) => {
                    error!("Cycle {cycle}: dispatcher unusable: {e}");
                    return Err(e.clone());
                }
                Err(e) => {
                    warn!("Cycle {cycle} failed: {e}");
                    Some(e.to_string())
                }
            };
            let report = CycleReport {
                cycle,
                before,
                after,
                elapsed_secs,
                error,
            };
            self.reporter.cycle(&report);
            cycles.push(report);
            results.push(result);
        }

        let torn_down = self.config.teardown && self.teardown();

        reclaim_freed_memory();
        if !self.config.settle.is_zero() {
            debug!("Settling for {:?} before the final readout", self.config.settle);
            thread::sleep(self.config.settle);
        }
        let final_memory = MemorySample::take(&mut self.probe);
        self.reporter.final_readout(&final_memory);

        let failures = cycles.iter().filter(|c| c.error.is_some()).count();
        info!(
            "Finished {} cycles with {:?}, {failures} failed",
            cycles.len(),
            self.slot.strategy()
        );
        Ok(RunOutcome {
            report: RunReport {
                event: "scan_run",
                strategy: self.slot.strategy(),
                cycles,
                failures,
                dispatchers_created: self.slot.generation(),
                torn_down,
                final_memory,
                elapsed_secs: started.elapsed().as_secs_f64(),
            },
            results,
        })
    }

    fn teardown(&mut self) -> bool {
        match self.slot.shutdown() {
            Ok(()) => true,
            Err(DispatchError::AlreadyStopped) => {
                debug!("No live dispatcher to tear down");
                false
            }
            Err(e) => {
                warn!("Dispatcher teardown failed: {e}");
                false
            }
        }
    }
}
