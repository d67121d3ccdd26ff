//! Splits one peak's charge across participants in
//! proportion to their share of demand in the peak slot.

use crate::{
    error::{AuditError, AuditResult},
    peak::PeakEvent,
    types::ParticipantIdx,
    window::DemandWindow,
};

/// The outcome of billing one peak.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakAttribution {
    pub excess:           f64,
    pub aggregate_charge: f64,
    /// Cost per participant, indexed by ParticipantIdx.
    pub costs:            Vec<f64>,
}

pub struct FeeAttributor {
    fee_per_point: f64,
}

impl FeeAttributor {
    pub fn new(fee_per_point: f64) -> Self {
        Self { fee_per_point }
    }

    /// `aggregate_charge = (value - threshold) * fee_per_point`, split by
    /// `per_participant[p][slot] / aggregate[slot]`.
    ///
    /// A billed peak with zero aggregate demand means something upstream
    /// broke; it is reported as an invariant violation, never as zero cost.
    pub fn attribute(
        &self,
        window: &DemandWindow,
        peak: &PeakEvent,
        threshold: f64,
    ) -> AuditResult<PeakAttribution> {
        let total = window.aggregate_at(peak.slot);
        if total == 0.0 {
            return Err(AuditError::ZeroAggregateDemand { slot: peak.slot });
        }

        let excess = peak.value - threshold;
        let aggregate_charge = excess * self.fee_per_point;
        let costs = (0..window.participant_count())
            .map(|p| {
                let demand = window.participant_at(ParticipantIdx(p as u32), peak.slot);
                aggregate_charge * demand / total
            })
            .collect();

        Ok(PeakAttribution { excess, aggregate_charge, costs })
    }
}
