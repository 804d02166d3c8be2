// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use log::error;
use thiserror::Error;

use crate::global_config::DispatchStrategy;
use crate::job_engine::bounded_pool::BoundedPool;
use crate::job_engine::completion::Completion;
use crate::job_engine::inline::Inline;
use crate::job_engine::job::{
    execute, panic_message, CallSite, CancellationToken, Job, JobFailure, JobOutcome,
};
use crate::job_engine::persistent_worker::PersistentWorker;
use crate::job_engine::transient::Transient;

/// A job bound to its completion callback, ready to run on any context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatcher has already been started")]
    AlreadyStarted,
    #[error("dispatcher has not been started")]
    NotRunning,
    #[error("dispatcher has already been stopped")]
    AlreadyStopped,
    #[error("a thread pool needs at least one worker")]
    EmptyPool,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Everything that can keep a submitter from getting its value back.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Failed(#[from] JobFailure),
    #[error("job '{job}' did not complete within {timeout:?}")]
    TimedOut { job: String, timeout: Duration },
    #[error("job '{job}' was dropped before it ran")]
    Abandoned { job: String },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Where and how a job executes.
pub trait Dispatcher: Send {
    fn strategy(&self) -> DispatchStrategy;

    /// Hands a task to an execution context. Must not wait for it to finish,
    /// except for the inline strategy which has no other context to use.
    fn spawn_task(&mut self, task: Task) -> Result<(), DispatchError>;

    /// Called once the submitter got a definite outcome for a job, i.e. the
    /// wait did not time out. Releases per-job execution contexts.
    fn job_waited(&mut self) {}

    /// Stops all execution contexts. A second call returns
    /// [`DispatchError::AlreadyStopped`].
    fn shutdown(&mut self) -> Result<(), DispatchError>;
}

impl std::fmt::Debug for dyn Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("strategy", &self.strategy())
            .finish()
    }
}

pub trait DispatcherExt: Dispatcher {
    /// Submits `job`; `on_done` is called from the worker context with the outcome.
    #[track_caller]
    fn submit<J, F>(&mut self, job: J, on_done: F) -> Result<CancellationToken, DispatchError>
    where
        J: Job,
        F: FnOnce(JobOutcome<J::Output>) + Send + 'static,
    {
        self.submit_from(job, CallSite::capture(), on_done)
    }

    /// Like `submit`, for callers that captured the call site themselves.
    fn submit_from<J, F>(
        &mut self,
        job: J,
        submitted_from: CallSite,
        on_done: F,
    ) -> Result<CancellationToken, DispatchError>
    where
        J: Job,
        F: FnOnce(JobOutcome<J::Output>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        self.spawn_task(Box::new(move || {
            on_done(execute(job, &token, &submitted_from));
        }))?;
        Ok(cancel)
    }

    /// Submits `job` and blocks until it completed or `timeout` passed.
    #[track_caller]
    fn run_and_wait<J: Job>(
        &mut self,
        job: J,
        timeout: Option<Duration>,
    ) -> Result<J::Output, JobError> {
        let desc = job.desc().to_string();
        let completion = Completion::new();
        let setter = completion.setter();
        let cancel = self.submit(job, move |outcome| setter.complete(outcome))?;
        let result = completion.wait(&desc, &cancel, timeout);
        if !matches!(result, Err(JobError::TimedOut { .. })) {
            self.job_waited();
        }
        result
    }
}

impl<D: Dispatcher + ?Sized> DispatcherExt for D {}

/// Creates a fresh, running dispatcher for `strategy`.
pub fn create_dispatcher(
    strategy: DispatchStrategy,
    pool_size: usize,
) -> Result<Box<dyn Dispatcher>, DispatchError> {
    Ok(match strategy {
        DispatchStrategy::None => Box::new(Inline::new()),
        DispatchStrategy::SingleWorker => Box::new(PersistentWorker::started()?),
        DispatchStrategy::BoundedPool => Box::new(BoundedPool::new(pool_size)?),
        DispatchStrategy::Transient => Box::new(Transient::new()),
    })
}

/// Runs a task on the current context. A panicking completion callback must
/// not take the worker down with it.
pub(crate) fn run_task(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(
            "Completion callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}
