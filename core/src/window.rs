//! One assessment interval of hourly net demand.
//!
//! A fixed-capacity ring indexed by `(timeslot - origin) mod capacity`.
//! Writing timeslot t overwrites whatever was written `capacity`
//! timeslots earlier. The aggregate row is never cleared because
//! every slot is rewritten before the next assessment reads it;
//! per-participant rows are zeroed after each assessment.

use crate::types::{ParticipantIdx, Timeslot};

#[derive(Debug, Clone)]
pub struct DemandWindow {
    origin:          Timeslot,
    aggregate:       Vec<f64>,
    per_participant: Vec<Vec<f64>>,
}

impl DemandWindow {
    /// Allocate a window whose slot 0 corresponds to `origin`.
    /// Panics if `capacity` is zero; the config validator rejects that first.
    pub fn new(origin: Timeslot, capacity: usize, participants: usize) -> Self {
        assert!(capacity > 0, "demand window capacity must be positive");
        Self {
            origin,
            aggregate: vec![0.0; capacity],
            per_participant: vec![vec![0.0; capacity]; participants],
        }
    }

    pub fn origin(&self) -> Timeslot {
        self.origin
    }

    pub fn capacity(&self) -> usize {
        self.aggregate.len()
    }

    pub fn participant_count(&self) -> usize {
        self.per_participant.len()
    }

    /// Ring slot for an absolute timeslot. Timeslots before the origin
    /// are a caller ordering violation and wrap like any other residue.
    pub fn slot_index(&self, timeslot: Timeslot) -> usize {
        let offset = timeslot as i128 - self.origin as i128;
        offset.rem_euclid(self.capacity() as i128) as usize
    }

    /// Write one timeslot's per-participant net demand and return the
    /// aggregate. `demands[p]` belongs to `ParticipantIdx(p)`; participants
    /// past the end of `demands` are written as zero.
    pub fn record_slot(&mut self, timeslot: Timeslot, demands: &[f64]) -> f64 {
        let idx = self.slot_index(timeslot);
        let mut total = 0.0;
        for (p, row) in self.per_participant.iter_mut().enumerate() {
            let demand = demands.get(p).copied().unwrap_or(0.0);
            row[idx] = demand;
            total += demand;
        }
        self.aggregate[idx] = total;
        total
    }

    /// Zero every per-participant row. The aggregate row is left alone.
    pub fn reset_interval(&mut self) {
        for row in &mut self.per_participant {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    pub fn aggregate(&self) -> &[f64] {
        &self.aggregate
    }

    pub fn aggregate_at(&self, slot: usize) -> f64 {
        self.aggregate[slot]
    }

    pub fn participant_at(&self, participant: ParticipantIdx, slot: usize) -> f64 {
        self.per_participant[participant.as_usize()][slot]
    }

    pub fn participant_row(&self, participant: ParticipantIdx) -> &[f64] {
        &self.per_participant[participant.as_usize()]
    }
}
