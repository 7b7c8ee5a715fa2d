//! NPU wall-clock timing across iterations.

use std::time::Duration;

/// Aggregate of timed iterations, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NpuTimings {
    samples: u32,
    total_us: f64,
    min_us: f64,
    max_us: f64,
}

impl NpuTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one iteration.
    pub fn record(&mut self, elapsed: Duration) -> f64 {
        let us = elapsed.as_secs_f64() * 1e6;
        if self.samples == 0 {
            self.min_us = us;
            self.max_us = us;
        } else {
            self.min_us = self.min_us.min(us);
            self.max_us = self.max_us.max(us);
        }
        self.samples += 1;
        self.total_us += us;
        us
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn total_us(&self) -> f64 {
        self.total_us
    }

    /// Mean over recorded samples; zero when nothing was timed.
    pub fn avg_us(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_us / self.samples as f64
        }
    }

    pub fn min_us(&self) -> f64 {
        self.min_us
    }

    pub fn max_us(&self) -> f64 {
        self.max_us
    }
}
