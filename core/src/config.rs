//! Audit configuration.
//!
//! These values mirror the distribution utility's published capacity-fee
//! parameters. They are passed explicitly to the driver; nothing reads
//! them from ambient state.

use crate::error::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ASSESSMENT_INTERVAL: usize = 168; // one week of hourly timeslots
pub const DEFAULT_STD_COEFFICIENT: f64 = 1.2;
pub const DEFAULT_FEE_PER_POINT: f64 = -180.0;
pub const DEFAULT_BOOTSTRAP_HOURS: usize = 336; // two weeks

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Assessment interval in timeslots; also the demand window capacity.
    pub assessment_interval: usize,
    /// Std deviation coefficient (nu) in `mean + nu * sigma`.
    pub std_coefficient: f64,
    /// Per-point fee (lambda). Negative: a charge to the participant.
    pub fee_per_point: f64,
    /// Expected bootstrap record length. Only used to warn.
    pub bootstrap_hours: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            assessment_interval: DEFAULT_ASSESSMENT_INTERVAL,
            std_coefficient:     DEFAULT_STD_COEFFICIENT,
            fee_per_point:       DEFAULT_FEE_PER_POINT,
            bootstrap_hours:     DEFAULT_BOOTSTRAP_HOURS,
        }
    }
}

impl AuditConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AuditConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Small-interval parameters used by tests.
    pub fn default_test() -> Self {
        Self {
            assessment_interval: 4,
            std_coefficient:     0.0,
            fee_per_point:       -100.0,
            bootstrap_hours:     4,
        }
    }

    pub fn with_interval(mut self, assessment_interval: usize) -> Self {
        self.assessment_interval = assessment_interval;
        self
    }

    pub fn with_std_coefficient(mut self, std_coefficient: f64) -> Self {
        self.std_coefficient = std_coefficient;
        self
    }

    pub fn with_fee_per_point(mut self, fee_per_point: f64) -> Self {
        self.fee_per_point = fee_per_point;
        self
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.assessment_interval == 0 {
            return Err(invalid("assessment_interval must be at least 1"));
        }
        if !self.std_coefficient.is_finite() {
            return Err(invalid("std_coefficient must be finite"));
        }
        if !self.fee_per_point.is_finite() {
            return Err(invalid("fee_per_point must be finite"));
        }
        if self.fee_per_point > 0.0 {
            log::warn!(
                "fee_per_point is positive ({}); computed charges will be credits",
                self.fee_per_point
            );
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> AuditError {
    AuditError::InvalidConfig { reason: reason.to_string() }
}
