// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::cycle_runner::RunnerConfig;
use crate::scan::ScanConfig;

/// Where the scan job executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, ValueEnum, Default, Serialize)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DispatchStrategy {
    #[default]
    /// Run the scan on the calling thread
    #[value(alias = "no")]
    None,
    /// One persistent background thread with a FIFO queue
    #[value(alias = "thread")]
    SingleWorker,
    /// A fixed-size thread pool, one job in flight at a time
    #[value(aliases = ["concurrent", "taurus"])]
    BoundedPool,
    /// A fresh thread per scan
    Transient,
}

/// Which record sink the scan writes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordSinkKind {
    #[default]
    /// SPEC-style text file
    File,
    /// In-memory table, discarded when the scan ends
    Memory,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("--columns expects 'scalars[,spectra,images]', got '{0}'")]
    InvalidColumns(String),
    #[error("--pool-size must be at least 1")]
    ZeroPoolSize,
    #[error("--points must be at least 1")]
    ZeroPoints,
    #[error("output directory '{}' does not exist", .0.display())]
    MissingOutputDir(PathBuf),
    #[error("--{name} must be a finite, non-negative number of seconds, got {value}")]
    InvalidSeconds { name: &'static str, value: f64 },
}

/// Column counts per data kind, e.g. `20,0,1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnCounts {
    pub scalars: usize,
    pub spectra: usize,
    pub images: usize,
}

impl FromStr for ColumnCounts {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidColumns(s.to_string());
        let counts = s
            .split(',')
            .map(|part| part.trim().parse::<usize>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        // a single number only configures scalars
        match counts.as_slice() {
            [scalars] => Ok(Self {
                scalars: *scalars,
                spectra: 0,
                images: 0,
            }),
            [scalars, spectra, images] => Ok(Self {
                scalars: *scalars,
                spectra: *spectra,
                images: *images,
            }),
            _ => Err(invalid()),
        }
    }
}

pub fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidSeconds { name, value });
    }
    Ok(Duration::from_secs_f64(value))
}

pub fn ensure_output_dir(file: &Path) -> Result<(), ConfigError> {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
            Err(ConfigError::MissingOutputDir(dir.to_path_buf()))
        }
        _ => Ok(()),
    }
}

/// Everything one `scanbench` run needs, validated before anything is dispatched.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output: PathBuf,
    pub strategy: DispatchStrategy,
    pub pool_size: usize,
    pub sink: RecordSinkKind,
    pub scan: ScanConfig,
    pub runner: RunnerConfig,
    pub json: bool,
}
