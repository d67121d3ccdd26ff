//! Running mean and standard deviation of aggregate net demand.
//!
//! Uses the single-pass recurrence so the estimator never stores samples:
//!   n += 1; delta = x - mean; mean += delta / n; m2 += delta * (x - mean)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean:  f64,
    m2:    f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the estimate.
    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance. Zero until two samples have been seen.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    /// Sample standard deviation. Zero until two samples have been seen.
    pub fn sigma(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `mean + coefficient * sigma`, the peak-demand threshold.
    pub fn threshold(&self, coefficient: f64) -> f64 {
        self.mean + coefficient * self.sigma()
    }
}
