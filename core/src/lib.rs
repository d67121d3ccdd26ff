//! Peak-demand capacity fee auditor.
//!
//! Replays a recorded retail-energy game, recomputes every peak-demand
//! capacity charge from first principles and reports, per participant,
//! the difference between computed and recorded charges.

pub mod assessment;
pub mod attribution;
pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod event;
pub mod ledger;
pub mod participant;
pub mod peak;
pub mod replay;
pub mod report;
pub mod sink;
pub mod stats;
pub mod store;
pub mod types;
pub mod window;
