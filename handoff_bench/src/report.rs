//! Per-round results and their text/JSON rendering.

use handoff_common::Role;
use handoff_common::config::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// Timing of one (role, size) round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Side that produced this report
    pub role: Role,
    /// Process that ran the round
    pub pid: u32,
    /// Message size in bytes
    pub size: usize,
    /// Handoffs performed
    pub iterations: u64,
    /// Wall time for all handoffs
    pub elapsed_secs: f64,
    /// Seconds per handoff
    pub latency_secs: f64,
    /// Bytes per second
    pub bandwidth: f64,
}

impl RoundReport {
    /// Build a report and derive latency and bandwidth
    ///
    /// Bandwidth is 0 when either the size or the elapsed time is 0.
    pub fn new(role: Role, pid: u32, size: usize, iterations: u64, elapsed_secs: f64) -> Self {
        let latency_secs = if iterations == 0 {
            0.0
        } else {
            elapsed_secs / iterations as f64
        };
        let bandwidth = if size == 0 || elapsed_secs <= 0.0 {
            0.0
        } else {
            (size as f64 * iterations as f64) / elapsed_secs
        };

        Self {
            role,
            pid,
            size,
            iterations,
            elapsed_secs,
            latency_secs,
            bandwidth,
        }
    }

    /// Seconds per handoff
    pub fn latency(&self) -> f64 {
        self.latency_secs
    }

    /// Bytes per second
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, pid = {} bytes = {} iters = {} time = {:.6} lat = {:.9} bw = {:.2}",
            self.role,
            self.pid,
            self.size,
            self.iterations,
            self.elapsed_secs,
            self.latency_secs,
            self.bandwidth
        )
    }
}

/// Write one line per report in the requested format
pub fn write_reports<W: Write>(
    out: &mut W,
    reports: &[RoundReport],
    format: OutputFormat,
) -> io::Result<()> {
    for report in reports {
        match format {
            OutputFormat::Text => writeln!(out, "{report}")?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, report)?;
                writeln!(out)?;
            }
        }
    }
    out.flush()
}
