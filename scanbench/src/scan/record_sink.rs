// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use anyhow::{bail, Context};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::global_config::RecordSinkKind;
use crate::scan::{Environ, Record, Value};

/// Where scan records go: `start` once, `append` per point, `finish` once.
pub trait RecordSink: Send {
    fn start(&mut self, environ: &Environ) -> anyhow::Result<()>;

    fn append(&mut self, record: &Record) -> anyhow::Result<()>;

    fn finish(&mut self, environ: &Environ) -> anyhow::Result<()>;
}

impl RecordSinkKind {
    pub fn open(&self, path: &Path) -> anyhow::Result<Box<dyn RecordSink>> {
        Ok(match self {
            RecordSinkKind::File => Box::new(SpecFileSink::open(path)?),
            RecordSinkKind::Memory => Box::new(MemorySink::new()),
        })
    }
}

fn timestamp(at: &OffsetDateTime) -> anyhow::Result<String> {
    at.format(&Rfc3339).context("failed to format timestamp")
}

/// Appends scans to a SPEC-style text file.
///
/// Scalars go on one data line per point, spectra on `@A` lines. The format has
/// no room for images, so only their shape is noted in a comment.
pub struct SpecFileSink {
    out: BufWriter<File>,
    scalar_mask: Vec<bool>,
}

impl SpecFileSink {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            scalar_mask: Vec::new(),
        })
    }
}

impl RecordSink for SpecFileSink {
    fn start(&mut self, environ: &Environ) -> anyhow::Result<()> {
        self.scalar_mask = environ.datadesc.iter().map(|c| c.is_scalar()).collect();
        let labels: Vec<&str> = environ
            .datadesc
            .iter()
            .filter(|c| c.is_scalar())
            .map(|c| c.label.as_str())
            .collect();

        writeln!(self.out, "#S {} {}", environ.serialno, environ.title)?;
        writeln!(self.out, "#U {}", environ.user)?;
        writeln!(self.out, "#D {}", timestamp(&environ.start)?)?;
        writeln!(self.out, "#N {}", labels.len())?;
        writeln!(self.out, "#L {}", labels.join("  "))?;
        Ok(())
    }

    fn append(&mut self, record: &Record) -> anyhow::Result<()> {
        if record.values.len() != self.scalar_mask.len() {
            bail!(
                "point {} has {} values, expected {}",
                record.point_nb,
                record.values.len(),
                self.scalar_mask.len()
            );
        }

        let mut line = Vec::new();
        for value in &record.values {
            match value {
                Value::Int(v) => line.push(v.to_string()),
                Value::Float(v) => line.push(v.to_string()),
                Value::Spectrum(data) => {
                    let joined: Vec<String> = data.iter().map(|v| v.to_string()).collect();
                    writeln!(self.out, "@A {}", joined.join(" "))?;
                }
                Value::Image { rows, cols, .. } => {
                    writeln!(self.out, "#C image {rows}x{cols} not stored")?;
                }
            }
        }
        writeln!(self.out, "{}", line.join(" "))?;
        Ok(())
    }

    fn finish(&mut self, environ: &Environ) -> anyhow::Result<()> {
        if let Some(end) = &environ.end {
            writeln!(self.out, "#C Acquisition ended at {}", timestamp(end)?)?;
        }
        writeln!(self.out)?;
        self.out.flush().context("failed to flush scan file")?;
        Ok(())
    }
}

/// Keeps the whole scan as an in-memory table until `finish` drops it.
#[derive(Debug, Default)]
pub struct MemorySink {
    columns: Vec<String>,
    rows: Option<Vec<Record>>,
    appended: u64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows currently held. Zero before `start` and after `finish`.
    pub fn len(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }
}

impl RecordSink for MemorySink {
    fn start(&mut self, environ: &Environ) -> anyhow::Result<()> {
        self.columns = environ.datadesc.iter().map(|c| c.name.clone()).collect();
        self.rows = Some(Vec::new());
        Ok(())
    }

    fn append(&mut self, record: &Record) -> anyhow::Result<()> {
        let rows = self
            .rows
            .as_mut()
            .context("record appended before the table was started")?;
        rows.push(record.clone());
        self.appended += 1;
        Ok(())
    }

    fn finish(&mut self, _environ: &Environ) -> anyhow::Result<()> {
        debug!("In-memory table held {} rows", self.len());
        self.rows = None;
        Ok(())
    }
}
