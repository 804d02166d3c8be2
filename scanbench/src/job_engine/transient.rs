// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Thread-per-job dispatcher.
//!
//! Every task gets a freshly spawned thread. Once the submitter has the
//! job's outcome the thread is joined, so no thread outlives its job and
//! thread creation is the only cost being measured.

use log::{debug, warn};
use std::thread::{self, JoinHandle};

use crate::global_config::DispatchStrategy;
use crate::job_engine::completion::Completion;
use crate::job_engine::dispatcher::{
    run_task, DispatchError, Dispatcher, DispatcherExt, JobError, Task,
};
use crate::job_engine::job::Job;

/// Spawns a fresh thread per job. Baseline for thread creation overhead.
#[derive(Debug, Default)]
pub struct Transient {
    spawned: u64,
    stopped: bool,
    // threads whose task may still be returning from its callback
    pending: Vec<JoinHandle<()>>,
}

impl Transient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Start a thread, wait for the job's completion signal, join the thread.
    #[track_caller]
    pub fn run<J: Job>(&mut self, job: J) -> Result<J::Output, JobError> {
        let desc = job.desc().to_string();
        let completion = Completion::new();
        let setter = completion.setter();
        let cancel = self.submit(job, move |outcome| setter.complete(outcome))?;
        let result = completion.wait(&desc, &cancel, None);
        self.job_waited();
        result
    }

    fn reap(&mut self, all: bool) {
        let mut still_running = Vec::new();
        for handle in self.pending.drain(..) {
            if all || handle.is_finished() {
                if handle.join().is_err() {
                    warn!("Transient worker thread panicked");
                }
            } else {
                still_running.push(handle);
            }
        }
        self.pending = still_running;
    }
}

impl Dispatcher for Transient {
    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::Transient
    }

    fn spawn_task(&mut self, task: Task) -> Result<(), DispatchError> {
        if self.stopped {
            return Err(DispatchError::AlreadyStopped);
        }
        self.reap(false);

        let handle = thread::Builder::new()
            .name(format!("transient-worker-{}", self.spawned))
            .spawn(move || run_task(task))
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;
        self.spawned += 1;
        self.pending.push(handle);
        Ok(())
    }

    /// Joins the thread of the job just waited for. Its callback already
    /// fired, so the thread is on its way out.
    fn job_waited(&mut self) {
        self.reap(true);
    }

    fn shutdown(&mut self) -> Result<(), DispatchError> {
        if self.stopped {
            return Err(DispatchError::AlreadyStopped);
        }
        self.stopped = true;
        self.reap(true);
        debug!("Transient dispatcher stopped after {} threads", self.spawned);
        Ok(())
    }
}

impl Drop for Transient {
    fn drop(&mut self) {
        self.reap(true);
    }
}
