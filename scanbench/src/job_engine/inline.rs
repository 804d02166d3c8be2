// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::global_config::DispatchStrategy;
use crate::job_engine::dispatcher::{run_task, DispatchError, Dispatcher, Task};

/// Runs every task on the submitting thread. The no-threads baseline.
#[derive(Debug, Default)]
pub struct Inline {
    stopped: bool,
}

impl Inline {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dispatcher for Inline {
    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::None
    }

    fn spawn_task(&mut self, task: Task) -> Result<(), DispatchError> {
        if self.stopped {
            return Err(DispatchError::AlreadyStopped);
        }
        run_task(task);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DispatchError> {
        if self.stopped {
            return Err(DispatchError::AlreadyStopped);
        }
        self.stopped = true;
        Ok(())
    }
}
