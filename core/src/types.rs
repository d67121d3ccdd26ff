//! Shared primitive types used across the auditor.

use serde::{Deserialize, Serialize};

/// A live simulation timeslot. One timeslot = one simulated hour.
pub type Timeslot = u64;

/// The external identifier of a participant (a retail broker's username).
pub type ParticipantId = String;

/// The canonical audit-run identifier.
pub type RunId = String;

/// Dense index of a participant in the run's registry.
/// Assigned once, in declaration order, and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantIdx(pub u32);

impl ParticipantIdx {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}
