//! Per-interval recorded charges and the run-long variance totals.

use crate::types::ParticipantIdx;

/// Capacity charges the simulated utility actually recorded during the
/// current interval. Read and cleared at every assessment.
#[derive(Debug, Clone, Default)]
pub struct RecordedChargeLedger {
    totals: Vec<f64>,
    counts: Vec<u32>,
}

impl RecordedChargeLedger {
    pub fn new(participants: usize) -> Self {
        Self {
            totals: vec![0.0; participants],
            counts: vec![0; participants],
        }
    }

    /// Grow to cover participants registered after construction.
    pub fn ensure_len(&mut self, participants: usize) {
        if self.totals.len() < participants {
            self.totals.resize(participants, 0.0);
            self.counts.resize(participants, 0);
        }
    }

    pub fn record(&mut self, participant: ParticipantIdx, charge: f64) {
        let i = participant.as_usize();
        self.ensure_len(i + 1);
        self.totals[i] += charge;
        self.counts[i] += 1;
    }

    pub fn total(&self, participant: ParticipantIdx) -> f64 {
        self.totals.get(participant.as_usize()).copied().unwrap_or(0.0)
    }

    pub fn count(&self, participant: ParticipantIdx) -> u32 {
        self.counts.get(participant.as_usize()).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.totals.iter_mut().for_each(|t| *t = 0.0);
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}

/// Sum over all assessments of `computed - recorded`, per participant.
/// Never reset during a run.
#[derive(Debug, Clone, Default)]
pub struct VarianceAccumulator {
    totals: Vec<f64>,
}

impl VarianceAccumulator {
    pub fn new(participants: usize) -> Self {
        Self { totals: vec![0.0; participants] }
    }

    pub fn ensure_len(&mut self, participants: usize) {
        if self.totals.len() < participants {
            self.totals.resize(participants, 0.0);
        }
    }

    pub fn add(&mut self, participant: ParticipantIdx, variance: f64) {
        let i = participant.as_usize();
        self.ensure_len(i + 1);
        self.totals[i] += variance;
    }

    pub fn total(&self, participant: ParticipantIdx) -> f64 {
        self.totals.get(participant.as_usize()).copied().unwrap_or(0.0)
    }

    pub fn totals(&self) -> &[f64] {
        &self.totals
    }
}
