// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: single-job dispatch with completion signalling
//!
//! ## Overview
//! The caller hands exactly one job to a dispatcher and blocks until the
//! job's completion callback fires.
//!
//! - `single-worker`: one long-lived thread drains a FIFO queue until it
//!   consumes the shutdown sentinel.
//! - `bounded-pool`: N threads share one queue. Only one job is in flight,
//!   so N only changes scheduling overhead.
//! - `transient`: a fresh thread per job, joined afterwards.
//! - `none`: the job runs on the calling thread.
//!
//! Every job runs inside a failure boundary. Errors and panics come back to
//! the submitter as a `JobFailure` carrying the submission call site, and the
//! worker thread lives on.
//!
//! ```text
//! +---------------------------------+
//! |   CycleRunner (calling thread)  |
//! +----------------+----------------+
//!                  | submit(job, on_done)
//!                  v
//! +----------------+----------------+
//! |         DispatcherSlot          |
//! +----+----------+----------+------+
//!      |          |          |
//! +----v---+ +----v---+ +----v-----+
//! | worker | |  pool  | | transient|
//! | loop() | | N x    | | thread   |
//! +----+---+ +----+---+ +----+-----+
//!      |          |          |
//!      +----------+----------+
//!                 | on_done(outcome)
//!                 v
//!          CompletionSignal.set()  ->  caller resumes
//! ```

pub mod bounded_pool;
pub mod closure_job;
pub mod completion;
pub mod dispatcher;
pub mod inline;
pub mod job;
pub mod persistent_worker;
pub mod slot;
pub mod transient;

pub use dispatcher::{create_dispatcher, DispatchError, Dispatcher, DispatcherExt, JobError};
pub use job::{CancellationToken, Job, JobFailure, JobOutcome};
pub use slot::DispatcherSlot;

#[cfg(test)]
mod tests;
