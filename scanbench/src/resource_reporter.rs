// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Process memory readouts around each scan cycle.

use log::warn;
use serde::Serialize;
use std::fmt;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;

use crate::cycle_runner::CycleReport;

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Formats a byte count with 1024-based units, rounded to two decimals.
///
/// `0` is `"0B"`, `1536` is `"1.5 KB"`, `1048576` is `"1.0 MB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    // floor(log1024(bytes)) without going through floats
    let exponent = ((63 - bytes.leading_zeros()) / 10) as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let scaled = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    // Debug keeps the trailing ".0" on whole numbers
    format!("{:?} {}", rounded, UNITS[exponent])
}

/// Signed variant for deltas, e.g. `+1.5 KB` or `-512.0 B`.
pub fn format_delta(delta: i64) -> String {
    let sign = if delta < 0 { "-" } else { "+" };
    format!("{sign}{}", format_bytes(delta.unsigned_abs()))
}

#[derive(Debug, Error)]
#[error("could not query resident memory: {0}")]
pub struct ResourceQueryError(pub String);

/// Source of the current process's resident set size.
pub trait MemoryProbe: Send {
    fn resident_bytes(&mut self) -> Result<u64, ResourceQueryError>;
}

/// Reads the resident set size of this process through sysinfo.
pub struct ProcessMemoryProbe {
    system: System,
    pid: Pid,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&mut self) -> Result<u64, ResourceQueryError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        self.system
            .process(self.pid)
            .map(|process| process.memory())
            .ok_or_else(|| ResourceQueryError(format!("process {} not found", self.pid)))
    }
}

/// A resident-memory reading. `bytes` is `None` when the query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    pub bytes: Option<u64>,
}

impl MemorySample {
    pub const UNKNOWN: MemorySample = MemorySample { bytes: None };

    /// Takes a sample. A failed query is only worth a warning.
    pub fn take(probe: &mut dyn MemoryProbe) -> Self {
        match probe.resident_bytes() {
            Ok(bytes) => Self { bytes: Some(bytes) },
            Err(e) => {
                warn!("{e}");
                Self::UNKNOWN
            }
        }
    }

    pub fn delta_since(&self, earlier: &MemorySample) -> Option<i64> {
        match (self.bytes, earlier.bytes) {
            (Some(now), Some(then)) => Some(now as i64 - then as i64),
            _ => None,
        }
    }
}

impl fmt::Display for MemorySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes {
            Some(bytes) => f.write_str(&format_bytes(bytes)),
            None => f.write_str("unknown"),
        }
    }
}

/// Receives the readouts of a run: one call per cycle, then the final one.
pub trait ResourceReporter {
    fn cycle(&mut self, report: &CycleReport);

    fn final_readout(&mut self, sample: &MemorySample);
}

/// Prints readouts to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses all output, e.g. when the summary goes out as JSON.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl ResourceReporter for ConsoleReporter {
    fn cycle(&mut self, report: &CycleReport) {
        if self.quiet {
            return;
        }
        println!("repeat #{}", report.cycle);
        println!("RSS before scan: {}", report.before);
        println!("RSS after scan: {}", report.after);
        if let Some(delta) = report.after.delta_since(&report.before) {
            println!("RSS delta: {}", format_delta(delta));
        }
        if let Some(error) = &report.error {
            println!("scan failed: {error}");
        }
    }

    fn final_readout(&mut self, sample: &MemorySample) {
        if !self.quiet {
            println!("RSS final: {sample}");
        }
    }
}

/// Hands freed heap pages back to the OS before the final readout.
pub fn reclaim_freed_memory() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        // SAFETY: malloc_trim only walks the allocator's own free lists.
        let released = unsafe { libc::malloc_trim(0) };
        log::debug!("malloc_trim released memory: {}", released != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bytes() {
        assert_eq!(format_bytes(0), "0B");
    }

    #[test]
    fn unit_steps() {
        assert_eq!(format_bytes(1), "1.0 B");
        assert_eq!(format_bytes(1023), "1023.0 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1.0 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.0 GB");
    }

    #[test]
    fn rounds_to_two_decimals() {
        // 1.2345 KB
        assert_eq!(format_bytes(1264), "1.23 KB");
        // 1.999 MB rounds up within the same unit
        assert_eq!(format_bytes(2_096_103), "2.0 MB");
    }

    #[test]
    fn largest_values_stay_in_range() {
        assert_eq!(format_bytes(u64::MAX), "16.0 EB");
    }

    #[test]
    fn deltas_carry_a_sign() {
        assert_eq!(format_delta(1536), "+1.5 KB");
        assert_eq!(format_delta(-1536), "-1.5 KB");
        assert_eq!(format_delta(0), "+0B");
    }

    struct FailingProbe;

    impl MemoryProbe for FailingProbe {
        fn resident_bytes(&mut self) -> Result<u64, ResourceQueryError> {
            Err(ResourceQueryError("no /proc".into()))
        }
    }

    #[test]
    fn failed_query_gives_unknown_sample() {
        let sample = MemorySample::take(&mut FailingProbe);
        assert_eq!(sample, MemorySample::UNKNOWN);
        assert_eq!(sample.to_string(), "unknown");
        let known = MemorySample { bytes: Some(10) };
        assert_eq!(known.delta_since(&sample), None);
    }

    #[test]
    fn process_probe_reads_this_process() {
        let mut probe = ProcessMemoryProbe::new();
        let bytes = probe.resident_bytes().unwrap();
        assert!(bytes > 0);
    }
}
