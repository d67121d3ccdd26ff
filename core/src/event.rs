//! The replayed event stream.
//!
//! RULE: Events are delivered in non-decreasing time order. All events
//! for timeslot t arrive after the TimeslotStarted marker for t and
//! before the marker for t+1. Nothing here reorders or buffers.

use crate::types::{ParticipantId, Timeslot};
use serde::{Deserialize, Serialize};

/// Every event the auditor understands.
/// One JSON object per log line, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A retail broker taking part in the game. Only valid before the
    /// first live timeslot.
    ParticipantJoined {
        participant: ParticipantId,
    },

    /// Start of live timeslot `timeslot`; closes the previous one.
    TimeslotStarted {
        timeslot: Timeslot,
    },

    /// A customer's tariff transaction with a broker.
    TariffTransaction {
        participant: ParticipantId,
        kind: TransactionKind,
        kwh: f64,
    },

    /// A capacity charge the simulated utility actually recorded.
    CapacityCharge {
        participant: ParticipantId,
        charge: f64,
        threshold: f64,
        peak_timeslot: Timeslot,
    },
}

impl AuditEvent {
    /// Stable name for the event_log table's event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            AuditEvent::ParticipantJoined { .. } => "participant_joined",
            AuditEvent::TimeslotStarted { .. }   => "timeslot_started",
            AuditEvent::TariffTransaction { .. } => "tariff_transaction",
            AuditEvent::CapacityCharge { .. }    => "capacity_charge",
        }
    }
}

/// Tariff transaction types. Only energy flows matter for demand;
/// signups, periodic payments and the like deserialize as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Consume,
    Produce,
    #[serde(other)]
    Other,
}
