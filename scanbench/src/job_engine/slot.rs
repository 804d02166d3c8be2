// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::info;

use crate::global_config::DispatchStrategy;
use crate::job_engine::completion::Completion;
use crate::job_engine::dispatcher::{
    create_dispatcher, DispatchError, Dispatcher, DispatcherExt, JobError,
};
use crate::job_engine::job::{CallSite, Job};

#[derive(Debug, Default)]
struct SlotState {
    dispatcher: Option<Box<dyn Dispatcher>>,
    generation: u64,
}

/// Holds at most one live dispatcher, created lazily on first use.
///
/// Creation happens under the lock, so concurrent callers never end up with
/// two dispatchers. After `shutdown` the next submission creates a fresh one.
#[derive(Debug)]
pub struct DispatcherSlot {
    strategy: DispatchStrategy,
    pool_size: usize,
    state: Mutex<SlotState>,
}

impl DispatcherSlot {
    pub fn new(strategy: DispatchStrategy, pool_size: usize) -> Self {
        Self {
            strategy,
            pool_size,
            state: Mutex::new(SlotState::default()),
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    pub fn is_live(&self) -> bool {
        self.lock().dispatcher.is_some()
    }

    /// Number of dispatcher instances created so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Runs `f` against the live dispatcher, creating it first if needed.
    pub fn with_dispatcher<R>(
        &self,
        f: impl FnOnce(&mut dyn Dispatcher) -> R,
    ) -> Result<R, DispatchError> {
        let mut state = self.lock();
        if state.dispatcher.is_none() {
            let dispatcher = create_dispatcher(self.strategy, self.pool_size)?;
            state.generation += 1;
            info!(
                "Created {:?} dispatcher (instance #{})",
                self.strategy, state.generation
            );
            state.dispatcher = Some(dispatcher);
        }
        match state.dispatcher.as_deref_mut() {
            Some(dispatcher) => Ok(f(dispatcher)),
            None => Err(DispatchError::NotRunning),
        }
    }

    /// Submits `job` and waits for it outside the lock.
    ///
    /// A timed out job keeps its execution context; it is released on a later
    /// submission or at shutdown.
    #[track_caller]
    pub fn run_and_wait<J: Job>(
        &self,
        job: J,
        timeout: Option<Duration>,
    ) -> Result<J::Output, JobError> {
        let submitted_from = CallSite::capture();
        let desc = job.desc().to_string();
        let completion = Completion::new();
        let setter = completion.setter();
        let cancel = self.with_dispatcher(|dispatcher| {
            dispatcher.submit_from(job, submitted_from, move |outcome| {
                setter.complete(outcome)
            })
        })??;
        let result = completion.wait(&desc, &cancel, timeout);
        if !matches!(result, Err(JobError::TimedOut { .. })) {
            let mut state = self.lock();
            if let Some(dispatcher) = state.dispatcher.as_deref_mut() {
                dispatcher.job_waited();
            }
        }
        result
    }

    /// Shuts the live dispatcher down and clears the slot.
    ///
    /// Returns [`DispatchError::AlreadyStopped`] when there is nothing to stop.
    pub fn shutdown(&self) -> Result<(), DispatchError> {
        let dispatcher = self.lock().dispatcher.take();
        match dispatcher {
            Some(mut dispatcher) => {
                info!("Shutting down {:?} dispatcher", self.strategy);
                dispatcher.shutdown()
            }
            None => Err(DispatchError::AlreadyStopped),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
