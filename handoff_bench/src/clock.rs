//! Time source for round timing.

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock reading in seconds
pub trait Clock {
    /// Current time in seconds
    fn now(&self) -> f64;
}

/// Reads `SystemTime`, the equivalent of `gettimeofday`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}
