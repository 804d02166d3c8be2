// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Single long-lived worker thread.
//!
//! Tasks are queued in submission order and run one after another on the
//! same thread. `join` enqueues a stop sentinel behind them, so everything
//! submitted before still runs.

use async_channel::{Receiver, Sender};
use log::{debug, info, warn};
use std::thread::{self, JoinHandle};

use crate::global_config::DispatchStrategy;
use crate::job_engine::dispatcher::{run_task, DispatchError, Dispatcher, Task};

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Stopped,
}

enum WorkItem {
    Run(Task),
    /// Shutdown sentinel, always the last item the worker consumes.
    Stop,
}

/// One long-lived background thread draining a FIFO queue of tasks.
#[derive(Debug)]
pub struct PersistentWorker {
    name: String,
    state: State,
    thread_handle: Option<JoinHandle<()>>,
    tx: Option<Sender<WorkItem>>,
}

impl PersistentWorker {
    pub fn new() -> Self {
        Self::with_name("scan-worker")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: State::Idle,
            thread_handle: None,
            tx: None,
        }
    }

    /// Creates and starts a worker in one step.
    pub fn started() -> Result<Self, DispatchError> {
        let mut worker = Self::new();
        worker.start()?;
        Ok(worker)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn start(&mut self) -> Result<(), DispatchError> {
        match self.state {
            State::Idle => {}
            State::Running => return Err(DispatchError::AlreadyStarted),
            State::Stopped => return Err(DispatchError::AlreadyStopped),
        }

        let (tx, rx) = async_channel::unbounded();
        let name = self.name.clone();
        // run the worker loop in a dedicated thread
        let thread_handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || futures::executor::block_on(worker_loop(name, rx)))
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;

        self.thread_handle = Some(thread_handle);
        self.tx = Some(tx);
        self.state = State::Running;
        Ok(())
    }

    /// Enqueues the shutdown sentinel and blocks until the worker thread exited.
    ///
    /// Everything submitted before still runs.
    pub fn join(&mut self) -> Result<(), DispatchError> {
        match self.state {
            State::Idle => return Err(DispatchError::NotRunning),
            State::Stopped => return Err(DispatchError::AlreadyStopped),
            State::Running => {}
        }
        self.state = State::Stopped;

        if let Some(tx) = self.tx.take() {
            if tx.send_blocking(WorkItem::Stop).is_err() {
                warn!("Worker '{}' is gone already", self.name);
            }
        }
        debug!("Waiting for worker '{}' to drain its queue", self.name);
        match self.thread_handle.take() {
            Some(handle) => handle.join().map_err(|_| DispatchError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Default for PersistentWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for PersistentWorker {
    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::SingleWorker
    }

    fn spawn_task(&mut self, task: Task) -> Result<(), DispatchError> {
        match (self.state, self.tx.as_ref()) {
            (State::Running, Some(tx)) => tx
                .send_blocking(WorkItem::Run(task))
                .map_err(|_| DispatchError::WorkerPanicked),
            (State::Stopped, _) => Err(DispatchError::AlreadyStopped),
            _ => Err(DispatchError::NotRunning),
        }
    }

    fn shutdown(&mut self) -> Result<(), DispatchError> {
        self.join()
    }
}

impl Drop for PersistentWorker {
    fn drop(&mut self) {
        if self.state == State::Running {
            let _ = self.join();
        }
    }
}

async fn worker_loop(name: String, rx: Receiver<WorkItem>) {
    info!("Starting loop for {name}");
    while let Ok(item) = rx.recv().await {
        match item {
            WorkItem::Run(task) => run_task(task),
            WorkItem::Stop => break,
        }
    }
    info!("Loop for {name} ended");
}
