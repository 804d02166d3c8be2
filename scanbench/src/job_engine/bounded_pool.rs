// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Fixed-size thread pool sharing one submission queue.
//!
//! Workers pull from the same unbounded queue, so whichever thread is free
//! picks up the next task. In the scan benchmarks only one job is ever in
//! flight, which makes the pool size observably inert: the pool is there to
//! compare scheduling overhead, not to add throughput.

use async_channel::{Receiver, Sender};
use log::{debug, warn};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::global_config::DispatchStrategy;
use crate::job_engine::completion::Completion;
use crate::job_engine::dispatcher::{
    run_task, DispatchError, Dispatcher, DispatcherExt, JobError, Task,
};
use crate::job_engine::job::{CancellationToken, Job};

#[derive(Debug)]
pub struct BoundedPool {
    size: usize,
    workers: Vec<JoinHandle<()>>,
    tx: Option<Sender<Task>>,
    // kept to drop queued tasks on shutdown
    rx: Receiver<Task>,
}

impl BoundedPool {
    pub fn new(size: usize) -> Result<Self, DispatchError> {
        if size == 0 {
            return Err(DispatchError::EmptyPool);
        }

        let (tx, rx) = async_channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let task_rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("pool-worker-{worker_id}"))
                .spawn(move || {
                    while let Ok(task) = task_rx.recv_blocking() {
                        run_task(task);
                    }
                })
                .map_err(|e| DispatchError::Spawn(e.to_string()));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // release the threads spawned so far
                    tx.close();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }
        debug!("Started thread pool with {size} workers");

        Ok(Self {
            size,
            workers,
            tx: Some(tx),
            rx,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submits `job` and returns a handle to collect its result later.
    #[track_caller]
    pub fn submit_with_handle<J: Job>(
        &mut self,
        job: J,
    ) -> Result<PoolHandle<J::Output>, DispatchError> {
        let desc = job.desc().to_string();
        let completion = Completion::new();
        let setter = completion.setter();
        let cancel = self.submit(job, move |outcome| setter.complete(outcome))?;
        Ok(PoolHandle {
            desc,
            cancel,
            completion,
        })
    }
}

impl Dispatcher for BoundedPool {
    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::BoundedPool
    }

    fn spawn_task(&mut self, task: Task) -> Result<(), DispatchError> {
        let tx = self.tx.as_ref().ok_or(DispatchError::AlreadyStopped)?;
        tx.send_blocking(task)
            .map_err(|_| DispatchError::AlreadyStopped)
    }

    /// Closes the queue, drops whatever is still queued and joins all workers.
    /// Tasks that are already running finish first.
    fn shutdown(&mut self) -> Result<(), DispatchError> {
        let tx = self.tx.take().ok_or(DispatchError::AlreadyStopped)?;
        tx.close();
        let mut dropped = 0;
        while let Ok(task) = self.rx.try_recv() {
            drop(task);
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Dropped {dropped} queued tasks on shutdown");
        }

        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                result = Err(DispatchError::WorkerPanicked);
            }
        }
        debug!("Thread pool with {} workers shut down", self.size);
        result
    }
}

impl Drop for BoundedPool {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// Result handle of a pool submission.
pub struct PoolHandle<T> {
    desc: String,
    cancel: CancellationToken,
    completion: Completion<T>,
}

impl<T: Send + 'static> PoolHandle<T> {
    pub fn is_done(&self) -> bool {
        self.completion.signal().is_set()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the job finished and returns its value or its failure.
    pub fn result(self) -> Result<T, JobError> {
        self.completion.wait(&self.desc, &self.cancel, None)
    }

    pub fn result_timeout(self, timeout: Duration) -> Result<T, JobError> {
        self.completion.wait(&self.desc, &self.cancel, Some(timeout))
    }
}
