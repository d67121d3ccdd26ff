//! Assessment sinks: where records go as the replay produces them.
//!
//! The driver calls every registered sink in registration order,
//! once per assessment and once at the end of the run. A sink error
//! aborts the run.

use crate::{
    assessment::AssessmentRecord,
    error::AuditResult,
    report::VarianceReport,
};
use std::any::Any;

pub trait AssessmentSink: Send {
    /// Stable name, used in log lines.
    fn name(&self) -> &'static str;

    /// Called once per completed assessment.
    fn on_assessment(&mut self, run_id: &str, record: &AssessmentRecord) -> AuditResult<()>;

    /// Called once after the last event, with the finished report.
    fn on_finish(&mut self, _report: &VarianceReport) -> AuditResult<()> {
        Ok(())
    }

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;
}
