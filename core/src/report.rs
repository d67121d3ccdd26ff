//! Variance reports.
//!
//! Two delimited outputs:
//!   - the final report, one `participant,variance` record per participant
//!     holding the variance accumulated over the whole run;
//!   - the detail report, `game,timeslot,participant,variance` per
//!     assessment, with a header row.
//!
//! Numbers are written with four fractional digits. Rust's float
//! formatting never consults the locale, so the decimal separator is
//! always `.` and cannot collide with the field delimiter.

use crate::{
    assessment::{AnomalyCounts, AssessmentRecord},
    bootstrap::SeedSummary,
    error::AuditResult,
    stats::RunningStats,
    types::{ParticipantId, RunId},
};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantVariance {
    pub participant: ParticipantId,
    pub variance:    f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceReport {
    pub run_id:         RunId,
    pub game_id:        String,
    /// Accumulated `computed - recorded`, in registry order.
    pub participants:   Vec<ParticipantVariance>,
    pub assessments:    Vec<AssessmentRecord>,
    pub anomalies:      AnomalyCounts,
    pub bootstrap:      SeedSummary,
    pub final_stats:    RunningStats,
    pub live_timeslots: u64,
}

impl VarianceReport {
    pub fn variance_for(&self, participant: &str) -> Option<f64> {
        self.participants
            .iter()
            .find(|p| p.participant == participant)
            .map(|p| p.variance)
    }

    /// Sum of accumulated variance across participants.
    pub fn total_variance(&self) -> f64 {
        self.participants.iter().map(|p| p.variance).sum()
    }

    pub fn write_final<W: Write>(&self, writer: W) -> AuditResult<()> {
        let mut out = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        for p in &self.participants {
            out.write_record([p.participant.as_str(), format_amount(p.variance).as_str()])?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_detail<W: Write>(&self, writer: W) -> AuditResult<()> {
        let mut out = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        out.write_record(["game", "timeslot", "participant", "variance"])?;
        for record in &self.assessments {
            let timeslot = record.timeslot.to_string();
            for p in &record.participants {
                out.write_record([
                    self.game_id.as_str(),
                    timeslot.as_str(),
                    p.participant.as_str(),
                    format_amount(p.variance).as_str(),
                ])?;
            }
        }
        out.flush()?;
        Ok(())
    }

    pub fn save_final(&self, path: impl AsRef<Path>) -> AuditResult<()> {
        self.write_final(File::create(path)?)
    }

    pub fn save_detail(&self, path: impl AsRef<Path>) -> AuditResult<()> {
        self.write_detail(File::create(path)?)
    }
}

/// Fixed four-digit fractional formatting. Negative zero prints as zero.
pub fn format_amount(value: f64) -> String {
    let text = format!("{value:.4}");
    if text == "-0.0000" {
        "0.0000".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_use_four_fraction_digits() {
        assert_eq!(format_amount(12.0), "12.0000");
        assert_eq!(format_amount(-1.23456), "-1.2346");
        assert_eq!(format_amount(-0.00001), "0.0000");
    }
}
