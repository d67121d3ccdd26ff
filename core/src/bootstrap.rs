//! Bootstrap seeding of the running statistics from historical usage.
//!
//! Each customer record holds hourly net usage over the bootstrap
//! horizon (normally 336 hours). Usage is summed across customers hour
//! by hour and negated into net demand, then every hour is fed to
//! RunningStats before any live timeslot is processed.

use crate::{error::AuditResult, stats::RunningStats};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapRecord {
    pub customer_name: String,
    pub net_usage:     Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct BootstrapFile {
    #[serde(default)]
    customers: Vec<BootstrapRecord>,
}

/// Read a bootstrap JSON document: `{ "customers": [ ... ] }`.
pub fn load_bootstrap(path: impl AsRef<Path>) -> AuditResult<Vec<BootstrapRecord>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let file: BootstrapFile = serde_json::from_str(&content)?;
    Ok(file.customers)
}

/// What seeding did, for the run log and the final report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub records: usize,
    pub hours:   usize,
    pub count:   u64,
    pub mean:    f64,
    pub sigma:   f64,
}

pub struct BootstrapSeeder {
    expected_hours: usize,
}

impl BootstrapSeeder {
    pub fn new(expected_hours: usize) -> Self {
        Self { expected_hours }
    }

    /// Hourly aggregate net demand across all records. The first record
    /// fixes the horizon; shorter records only contribute their own hours.
    pub fn aggregate(&self, records: &[BootstrapRecord]) -> Vec<f64> {
        let Some(first) = records.first() else {
            return Vec::new();
        };
        let hours = first.net_usage.len();
        if hours != self.expected_hours {
            log::warn!(
                "First item in customer bootstrap data is {hours} hrs long, expected {}",
                self.expected_hours
            );
        }

        let mut result = vec![0.0; hours];
        for record in records {
            if record.net_usage.len() != hours {
                log::warn!(
                    "Length inconsistency for record {}, length = {}",
                    record.customer_name,
                    record.net_usage.len()
                );
            }
            for (total, usage) in result.iter_mut().zip(&record.net_usage) {
                *total -= usage;
            }
        }
        result
    }

    /// Feed the aggregated history into `stats`. No records means no
    /// seeding: the first live sample then becomes the initial mean.
    pub fn seed(&self, records: &[BootstrapRecord], stats: &mut RunningStats) -> SeedSummary {
        if records.is_empty() {
            log::info!("No bootstrap data; running statistics start empty");
            return SeedSummary::default();
        }

        let aggregate = self.aggregate(records);
        for demand in &aggregate {
            stats.update(*demand);
        }

        let summary = SeedSummary {
            records: records.len(),
            hours:   aggregate.len(),
            count:   stats.count(),
            mean:    stats.mean(),
            sigma:   stats.sigma(),
        };
        log::info!(
            "Bootstrap data: n = {}, mean = {:.3}, sigma = {:.3}",
            summary.count,
            summary.mean,
            summary.sigma
        );
        summary
    }
}
