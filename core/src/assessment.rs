//! The outcome of one peak-demand assessment.
//!
//! Records are produced by the driver, streamed to every registered
//! sink, and kept in the final report.

use crate::types::{ParticipantId, Timeslot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    /// The boundary timeslot at whose close the assessment ran.
    pub timeslot:         Timeslot,
    /// Absolute timeslot held in window slot 0 for this interval.
    pub interval_start:   Timeslot,
    pub threshold:        f64,
    pub mean:             f64,
    pub sigma:            f64,
    pub sample_count:     u64,
    /// Slots at or above threshold, before selection.
    pub qualifying_peaks: usize,
    pub peaks:            Vec<BilledPeak>,
    /// One entry per participant, in registry order.
    pub participants:     Vec<ParticipantAssessment>,
}

impl AssessmentRecord {
    pub fn participant(&self, name: &str) -> Option<&ParticipantAssessment> {
        self.participants.iter().find(|p| p.participant == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BilledPeak {
    pub rank:             usize,
    pub slot:             usize,
    pub timeslot:         Timeslot,
    pub value:            f64,
    pub excess:           f64,
    pub aggregate_charge: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantAssessment {
    pub participant:    ParticipantId,
    pub computed:       f64,
    pub recorded:       f64,
    pub recorded_count: u32,
    pub variance:       f64,
}

/// Non-fatal anomalies seen during replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyCounts {
    /// Timeslots whose aggregate net demand was exactly zero.
    pub gap_timeslots:        u64,
    /// Energy transactions delivered before the first timeslot marker.
    pub orphan_transactions:  u64,
    /// Tariff transactions that are not CONSUME or PRODUCE.
    pub ignored_transactions: u64,
    /// Timeslot markers that did not advance time.
    pub stalled_markers:      u64,
    /// Timeslots a marker jumped over.
    pub skipped_timeslots:    u64,
}
