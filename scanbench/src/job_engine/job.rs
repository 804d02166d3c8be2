// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error, warn};
use thiserror::Error;

// What we handle here could also be named Task. A job is one complete
// acquisition-and-store cycle, so the name stuck.

/// A unit of work that a dispatcher runs on one of its execution contexts.
pub trait Job: Send + 'static {
    type Output: Send + 'static;

    /// Free-form description, used for logging or debugging
    fn desc(&self) -> &str;

    /// Main entry point. Long running jobs should poll `cancel` and return early.
    fn run(self, cancel: &CancellationToken) -> anyhow::Result<Self::Output>;
}

/// Cooperative cancellation flag shared between the submitter and the job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where a job was submitted from. Captured on the submitting thread so that a
/// failure on the worker can still be traced back to its origin.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub thread: String,
    pub location: &'static Location<'static>,
    pub backtrace: Arc<Backtrace>,
}

impl CallSite {
    #[track_caller]
    pub fn capture() -> Self {
        let current = thread::current();
        let thread = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };
        Self {
            thread,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread '{}' at {}", self.thread, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("returned an error: {0}")]
    Error(String),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("was cancelled before it started")]
    Cancelled,
}

/// A job that did not produce a value, together with where it came from.
#[derive(Debug, Clone, Error)]
#[error("job '{job}' submitted from {submitted_from} {kind}")]
pub struct JobFailure {
    pub job: String,
    pub submitted_from: CallSite,
    pub kind: FailureKind,
}

pub type JobOutcome<T> = Result<T, JobFailure>;

/// Runs `job` inside the failure boundary of a worker context.
///
/// Errors and panics are turned into a [`JobFailure`] so the worker survives
/// and the submitter always receives a definite outcome.
pub(crate) fn execute<J: Job>(
    job: J,
    cancel: &CancellationToken,
    submitted_from: &CallSite,
) -> JobOutcome<J::Output> {
    let desc = job.desc().to_string();

    if cancel.is_cancelled() {
        warn!("Skipping job '{desc}', it was cancelled before it started");
        return Err(JobFailure {
            job: desc,
            submitted_from: submitted_from.clone(),
            kind: FailureKind::Cancelled,
        });
    }

    debug!("Executing job: {desc}");
    let kind = match panic::catch_unwind(AssertUnwindSafe(|| job.run(cancel))) {
        Ok(Ok(value)) => {
            debug!("Finished job: {desc}");
            return Ok(value);
        }
        Ok(Err(err)) => FailureKind::Error(format!("{err:#}")),
        Err(payload) => FailureKind::Panicked(panic_message(payload.as_ref())),
    };

    let failure = JobFailure {
        job: desc,
        submitted_from: submitted_from.clone(),
        kind,
    };
    error!(
        "Uncaught failure running {failure}\nsubmitted at:\n{}",
        submitted_from.backtrace
    );
    Err(failure)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
