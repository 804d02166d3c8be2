// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::VecDeque;

use scanbench::cycle_runner::CycleReport;
use scanbench::resource_reporter::{
    MemoryProbe, MemorySample, ResourceQueryError, ResourceReporter,
};

/// Replays a fixed list of readings. `None` entries fail the query.
/// Once the script runs out, the last reading repeats.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    readings: VecDeque<Option<u64>>,
    last: Option<u64>,
    pub queries: usize,
}

impl ScriptedProbe {
    pub fn new(readings: impl IntoIterator<Item = Option<u64>>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last: None,
            queries: 0,
        }
    }

    /// Always reports `bytes`.
    pub fn constant(bytes: u64) -> Self {
        Self {
            readings: VecDeque::new(),
            last: Some(bytes),
            queries: 0,
        }
    }

    /// Every query fails.
    pub fn failing() -> Self {
        Self::default()
    }
}

impl MemoryProbe for ScriptedProbe {
    fn resident_bytes(&mut self) -> Result<u64, ResourceQueryError> {
        self.queries += 1;
        let reading = match self.readings.pop_front() {
            Some(reading) => {
                self.last = reading;
                reading
            }
            None => self.last,
        };
        reading.ok_or_else(|| ResourceQueryError("scripted failure".to_string()))
    }
}

/// Keeps every readout it receives.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub cycles: Vec<CycleReport>,
    pub final_readouts: Vec<MemorySample>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceReporter for RecordingReporter {
    fn cycle(&mut self, report: &CycleReport) {
        self.cycles.push(report.clone());
    }

    fn final_readout(&mut self, sample: &MemorySample) {
        self.final_readouts.push(*sample);
    }
}
