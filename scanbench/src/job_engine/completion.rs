// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::warn;

use crate::job_engine::job::{CancellationToken, JobOutcome};
use crate::job_engine::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Completed,
    TimedOut,
}

/// One-shot latch: `set` flips it once and for all, `wait` blocks until then.
///
/// Any number of threads may wait. Setting twice is harmless.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let (lock, cvar) = &*self.state;
        let mut done = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        cvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.state;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait(&self) {
        // pattern is described on https://doc.rust-lang.org/stable/std/sync/struct.Condvar.html
        let (lock, cvar) = &*self.state;
        let mut done = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = cvar.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> WaitStatus {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.state;
        let mut done = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return WaitStatus::TimedOut;
            }
            done = cvar
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        WaitStatus::Completed
    }
}

/// A completion signal that also carries the job's outcome back to the waiter.
pub struct Completion<T> {
    signal: CompletionSignal,
    slot: Arc<Mutex<Option<JobOutcome<T>>>>,
}

impl<T: Send + 'static> Completion<T> {
    pub fn new() -> Self {
        Self {
            signal: CompletionSignal::new(),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// The worker side. Dropping it without calling `complete` still releases
    /// the waiter, which then sees the job as abandoned.
    pub fn setter(&self) -> CompletionSetter<T> {
        CompletionSetter {
            signal: self.signal.clone(),
            slot: self.slot.clone(),
        }
    }

    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }

    /// Blocks until the job finished, was dropped, or `timeout` passed.
    ///
    /// On timeout the job's token is cancelled so a cooperative job can bail out.
    pub fn wait(
        self,
        desc: &str,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<T, JobError> {
        match timeout {
            None => self.signal.wait(),
            Some(timeout) => {
                if self.signal.wait_timeout(timeout) == WaitStatus::TimedOut {
                    warn!("Job '{desc}' did not complete within {timeout:?}, cancelling it");
                    cancel.cancel();
                    return Err(JobError::TimedOut {
                        job: desc.to_string(),
                        timeout,
                    });
                }
            }
        }

        let outcome = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(JobError::Failed(failure)),
            None => Err(JobError::Abandoned {
                job: desc.to_string(),
            }),
        }
    }
}

impl<T: Send + 'static> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CompletionSetter<T> {
    signal: CompletionSignal,
    slot: Arc<Mutex<Option<JobOutcome<T>>>>,
}

impl<T> CompletionSetter<T> {
    pub fn complete(self, outcome: JobOutcome<T>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        // the signal is set on drop
    }
}

impl<T> Drop for CompletionSetter<T> {
    fn drop(&mut self) {
        self.signal.set();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_returns_after_set_from_other_thread() {
        let signal = CompletionSignal::new();
        let setter = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            setter.set();
        });
        signal.wait();
        assert!(signal.is_set());
        handle.join().unwrap();
    }

    #[test]
    fn set_before_wait_is_not_lost() {
        let signal = CompletionSignal::new();
        signal.set();
        signal.wait();
        signal.wait();
        assert_eq!(
            signal.wait_timeout(Duration::from_millis(1)),
            WaitStatus::Completed
        );
    }

    #[test]
    fn set_is_idempotent() {
        let signal = CompletionSignal::new();
        signal.set();
        signal.set();
        assert!(signal.is_set());
    }

    #[test]
    fn wait_timeout_without_set_times_out() {
        let signal = CompletionSignal::new();
        let started = Instant::now();
        assert_eq!(
            signal.wait_timeout(Duration::from_millis(20)),
            WaitStatus::TimedOut
        );
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!signal.is_set());
    }

    #[test]
    fn many_waiters_are_released() {
        let signal = CompletionSignal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let s = signal.clone();
                thread::spawn(move || s.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        signal.set();
        for w in waiters {
            w.join().unwrap();
        }
    }

    #[test]
    fn racing_set_and_wait() {
        for _ in 0..200 {
            let signal = CompletionSignal::new();
            let setter = signal.clone();
            let handle = thread::spawn(move || setter.set());
            signal.wait();
            handle.join().unwrap();
        }
    }

    #[test]
    fn dropped_setter_reports_abandoned() {
        let completion: Completion<u32> = Completion::new();
        drop(completion.setter());
        let err = completion
            .wait("dropped", &CancellationToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, JobError::Abandoned { .. }));
    }

    #[test]
    fn timeout_cancels_the_token() {
        let completion: Completion<u32> = Completion::new();
        let _setter = completion.setter();
        let cancel = CancellationToken::new();
        let err = completion
            .wait("slow", &cancel, Some(Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(err, JobError::TimedOut { .. }));
        assert!(cancel.is_cancelled());
    }
}
