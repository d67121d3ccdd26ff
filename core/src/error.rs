use thiserror::Error;

use crate::types::Timeslot;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    #[error("Malformed event on line {line}: {source}")]
    MalformedEvent {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Participant '{participant}' was never declared")]
    UnknownParticipant { participant: String },

    #[error("Participant '{participant}' declared after live replay started at timeslot {origin}")]
    RegistryFrozen { participant: String, origin: Timeslot },

    #[error("Bootstrap seeding must precede live replay (origin timeslot {origin})")]
    SeedAfterReplay { origin: Timeslot },

    #[error("Invariant violated: billed peak at window slot {slot} has zero aggregate demand")]
    ZeroAggregateDemand { slot: usize },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;
