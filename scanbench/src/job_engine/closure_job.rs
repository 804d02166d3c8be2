// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::job::{CancellationToken, Job};

type TaskFn<T> = Box<dyn FnOnce(&CancellationToken) -> anyhow::Result<T> + Send + 'static>;

/// A job built from a closure with its arguments captured.
pub struct ClosureJob<T> {
    desc: String,
    task: TaskFn<T>,
}

impl<T: Send + 'static> ClosureJob<T> {
    pub fn new(
        desc: impl Into<String>,
        f: impl FnOnce(&CancellationToken) -> anyhow::Result<T> + Send + 'static,
    ) -> Self {
        Self {
            desc: desc.into(),
            task: Box::new(f),
        }
    }
}

impl<T: Send + 'static> Job for ClosureJob<T> {
    type Output = T;

    fn desc(&self) -> &str {
        &self.desc
    }

    fn run(self, cancel: &CancellationToken) -> anyhow::Result<T> {
        (self.task)(cancel)
    }
}

impl<T> std::fmt::Debug for ClosureJob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureJob")
            .field("desc", &self.desc)
            .finish()
    }
}
