// SPDX-License-Identifier: MIT
// scanbench: scan storage and job-dispatch benchmarks
//
// - Runs a scan job repeatedly through a selectable dispatch strategy.
// - Samples resident memory around every cycle to surface growth.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod cycle_runner;
pub mod global_config;
pub mod job_engine;
pub mod resource_reporter;
pub mod scan;
