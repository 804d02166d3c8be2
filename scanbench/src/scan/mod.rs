// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! The scan workload: acquire points with random data and store them.

use anyhow::Context;
use log::{debug, info};
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

use crate::global_config::{ColumnCounts, RecordSinkKind};
use crate::job_engine::job::{CancellationToken, Job};

pub mod record_sink;

pub const DESCRIPTION: &str = "Storage Performance Indicator Measurement";

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub columns: ColumnCounts,
    pub nb_of_points: u64,
    pub integ_time: Duration,
    pub spectrum_len: usize,
    pub image_shape: (usize, usize),
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            columns: ColumnCounts {
                scalars: 20,
                spectra: 0,
                images: 1,
            },
            nb_of_points: 100,
            integ_time: Duration::from_millis(1),
            spectrum_len: 1024,
            image_shape: (1024, 1024),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int64,
    Float64,
    Spectrum(usize),
    Image(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub label: String,
    pub dtype: DataType,
}

impl ColumnDesc {
    fn new(name: impl Into<String>, label: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            dtype,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.dtype, DataType::Int64 | DataType::Float64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Spectrum(Vec<f64>),
    Image {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    },
}

/// One acquired point. `values` follows the order of the environ's `datadesc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub point_nb: u64,
    pub values: Vec<Value>,
}

/// Scan metadata handed to the record sink.
#[derive(Debug, Clone)]
pub struct Environ {
    pub title: String,
    pub user: String,
    pub serialno: u64,
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
    pub datadesc: Vec<ColumnDesc>,
}

impl Environ {
    pub fn prepare(config: &ScanConfig, serialno: u64) -> Self {
        let mut datadesc = vec![ColumnDesc::new("point_nb", "#Pt No", DataType::Int64)];
        for i in 0..config.columns.scalars {
            let name = format!("scalar{i}");
            datadesc.push(ColumnDesc::new(name.clone(), name, DataType::Float64));
        }
        for i in 0..config.columns.spectra {
            let name = format!("spectrum{i}");
            datadesc.push(ColumnDesc::new(
                name.clone(),
                name,
                DataType::Spectrum(config.spectrum_len),
            ));
        }
        let (rows, cols) = config.image_shape;
        for i in 0..config.columns.images {
            let name = format!("image{i}");
            datadesc.push(ColumnDesc::new(name.clone(), name, DataType::Image(rows, cols)));
        }
        datadesc.push(ColumnDesc::new("timestamp", "dt", DataType::Float64));

        Self {
            title: DESCRIPTION.to_string(),
            user: whoami(),
            serialno,
            start: OffsetDateTime::now_utc(),
            end: None,
            datadesc,
        }
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub serialno: u64,
    pub points: u64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    pub thread: String,
}

/// One complete acquisition-and-store cycle.
#[derive(Debug, Clone)]
pub struct ScanJob {
    config: ScanConfig,
    output: PathBuf,
    sink: RecordSinkKind,
    serialno: u64,
}

impl ScanJob {
    pub fn new(config: ScanConfig, output: impl Into<PathBuf>, sink: RecordSinkKind) -> Self {
        Self {
            config,
            output: output.into(),
            sink,
            serialno: 0,
        }
    }

    pub fn with_serialno(mut self, serialno: u64) -> Self {
        self.serialno = serialno;
        self
    }

    fn acquire(&self, point_nb: u64, rng: &mut impl Rng) -> Record {
        thread::sleep(self.config.integ_time);
        let columns = &self.config.columns;
        let mut values = Vec::with_capacity(2 + columns.scalars + columns.spectra + columns.images);
        values.push(Value::Int(point_nb as i64));
        for _ in 0..columns.scalars {
            let scale = rng.random_range(1..=10) as f64;
            values.push(Value::Float(rng.random::<f64>() * scale));
        }
        for _ in 0..columns.spectra {
            values.push(Value::Spectrum(vec![rng.random::<f64>(); self.config.spectrum_len]));
        }
        let (rows, cols) = self.config.image_shape;
        for _ in 0..columns.images {
            values.push(Value::Image {
                rows,
                cols,
                data: vec![rng.random::<f64>(); rows * cols],
            });
        }
        values.push(Value::Float(point_nb as f64 * rng.random::<f64>()));
        Record { point_nb, values }
    }
}

impl Job for ScanJob {
    type Output = ScanSummary;

    fn desc(&self) -> &str {
        "scan"
    }

    fn run(self, cancel: &CancellationToken) -> anyhow::Result<ScanSummary> {
        let thread = thread::current().name().unwrap_or("unnamed").to_string();
        info!("Scan #{} run in thread {thread}", self.serialno);
        let started = Instant::now();

        let mut sink = self
            .sink
            .open(&self.output)
            .with_context(|| format!("failed to open {}", self.output.display()))?;
        let mut environ = Environ::prepare(&self.config, self.serialno);
        sink.start(&environ).context("failed to start the record list")?;

        let mut rng = rand::rng();
        let mut points = 0;
        let mut cancelled = false;
        for point_nb in 0..self.config.nb_of_points {
            if cancel.is_cancelled() {
                debug!("Scan #{} cancelled after {points} points", self.serialno);
                cancelled = true;
                break;
            }
            let record = self.acquire(point_nb, &mut rng);
            sink.append(&record)
                .with_context(|| format!("failed to store point {point_nb}"))?;
            points += 1;
        }

        environ.end = Some(OffsetDateTime::now_utc());
        sink.finish(&environ).context("failed to end the record list")?;

        Ok(ScanSummary {
            serialno: self.serialno,
            points,
            cancelled,
            elapsed_secs: started.elapsed().as_secs_f64(),
            thread,
        })
    }
}
