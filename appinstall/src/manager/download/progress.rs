//! Progress bookkeeping.

use std::time::{Duration, Instant};

/// Rate limiter for persisting progress.
///
/// Progress is published on every chunk but written to the record store at
/// most once per interval.
#[derive(Debug, Clone)]
pub struct CheckpointThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl CheckpointThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a checkpoint is due at `now`. Marks it taken if so.
    pub fn should_checkpoint(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Forget the last checkpoint so the next one is taken immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Format a byte count with binary units and two decimals (`1.50 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["bytes", "kB", "MB", "GB", "TB", "PB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
