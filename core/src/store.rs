//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The driver reaches the store through the AssessmentSink trait; the
//! runner uses it directly to import and replay event logs.

use crate::{
    assessment::{AssessmentRecord, BilledPeak, ParticipantAssessment},
    error::AuditResult,
    event::AuditEvent,
    report::VarianceReport,
    sink::AssessmentSink,
    types::Timeslot,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::any::Any;

pub struct AuditStore {
    conn: Connection,
}

impl AuditStore {
    /// Open (or create) the audit database at `path`.
    pub fn open(path: &str) -> AuditResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; ignore failures elsewhere.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AuditResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_assessments.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        game_id: &str,
        version: &str,
        started_at: DateTime<Utc>,
    ) -> AuditResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, game_id, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, game_id, version, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_run_status(&self, run_id: &str, status: &str) -> AuditResult<()> {
        self.conn.execute(
            "UPDATE run SET status = ?2 WHERE run_id = ?1",
            params![run_id, status],
        )?;
        Ok(())
    }

    /// Best-effort status write on the abort path. The abort error is the
    /// one worth returning, so a failure here is logged, not propagated.
    pub fn mark_failed(&self, run_id: &str) -> bool {
        match self.set_run_status(run_id, "failed") {
            Ok(()) => true,
            Err(e) => {
                log::error!("Could not mark run {run_id} as failed; it stays 'running': {e}");
                false
            }
        }
    }

    pub fn run_status(&self, run_id: &str) -> AuditResult<Option<String>> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM run WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, run_id: &str, event: &AuditEvent) -> AuditResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, event_type, payload) VALUES (?1, ?2, ?3)",
            params![run_id, event.type_name(), serde_json::to_string(event)?],
        )?;
        Ok(())
    }

    /// Append a whole log in one transaction. Returns the number stored.
    pub fn append_events<'a, I>(&self, run_id: &str, events: I) -> AuditResult<usize>
    where
        I: IntoIterator<Item = &'a AuditEvent>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO event_log (run_id, event_type, payload) VALUES (?1, ?2, ?3)",
            )?;
            for event in events {
                stmt.execute(params![run_id, event.type_name(), serde_json::to_string(event)?])?;
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// A run's stored events in insertion order.
    pub fn events_for_run(&self, run_id: &str) -> AuditResult<Vec<AuditEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM event_log WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let payloads = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let events = payloads
            .iter()
            .map(|p| serde_json::from_str(p))
            .collect::<Result<Vec<AuditEvent>, _>>()?;
        Ok(events)
    }

    pub fn event_count(&self, run_id: &str) -> AuditResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Assessments ────────────────────────────────────────────

    /// Persist one assessment with its peaks and participant rows atomically.
    pub fn insert_assessment(&self, run_id: &str, record: &AssessmentRecord) -> AuditResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO assessment
             (run_id, timeslot, interval_start, threshold, mean, sigma, sample_count, qualifying_peaks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                record.timeslot as i64,
                record.interval_start as i64,
                record.threshold,
                record.mean,
                record.sigma,
                record.sample_count as i64,
                record.qualifying_peaks as i64,
            ],
        )?;
        for peak in &record.peaks {
            tx.execute(
                "INSERT INTO billed_peak
                 (run_id, assessment_timeslot, rank, slot, timeslot, value, excess, aggregate_charge)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id,
                    record.timeslot as i64,
                    peak.rank as i64,
                    peak.slot as i64,
                    peak.timeslot as i64,
                    peak.value,
                    peak.excess,
                    peak.aggregate_charge,
                ],
            )?;
        }
        for p in &record.participants {
            tx.execute(
                "INSERT INTO participant_assessment
                 (run_id, assessment_timeslot, participant, computed, recorded, recorded_count, variance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run_id,
                    record.timeslot as i64,
                    p.participant,
                    p.computed,
                    p.recorded,
                    p.recorded_count,
                    p.variance,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn assessment_count(&self, run_id: &str) -> AuditResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM assessment WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Rebuild a run's assessment records in timeslot order.
    pub fn assessments_for_run(&self, run_id: &str) -> AuditResult<Vec<AssessmentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT timeslot, interval_start, threshold, mean, sigma, sample_count, qualifying_peaks
             FROM assessment WHERE run_id = ?1 ORDER BY timeslot ASC",
        )?;
        let mut records = stmt
            .query_map(params![run_id], |row| {
                Ok(AssessmentRecord {
                    timeslot:         row.get::<_, i64>(0)? as Timeslot,
                    interval_start:   row.get::<_, i64>(1)? as Timeslot,
                    threshold:        row.get(2)?,
                    mean:             row.get(3)?,
                    sigma:            row.get(4)?,
                    sample_count:     row.get::<_, i64>(5)? as u64,
                    qualifying_peaks: row.get::<_, i64>(6)? as usize,
                    peaks:            Vec::new(),
                    participants:     Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for record in &mut records {
            record.peaks = self.billed_peaks(run_id, record.timeslot)?;
            record.participants = self.participant_assessments(run_id, record.timeslot)?;
        }
        Ok(records)
    }

    fn billed_peaks(&self, run_id: &str, assessment: Timeslot) -> AuditResult<Vec<BilledPeak>> {
        let mut stmt = self.conn.prepare(
            "SELECT rank, slot, timeslot, value, excess, aggregate_charge
             FROM billed_peak WHERE run_id = ?1 AND assessment_timeslot = ?2
             ORDER BY rank ASC",
        )?;
        let peaks = stmt
            .query_map(params![run_id, assessment as i64], |row| {
                Ok(BilledPeak {
                    rank:             row.get::<_, i64>(0)? as usize,
                    slot:             row.get::<_, i64>(1)? as usize,
                    timeslot:         row.get::<_, i64>(2)? as Timeslot,
                    value:            row.get(3)?,
                    excess:           row.get(4)?,
                    aggregate_charge: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(peaks)
    }

    fn participant_assessments(
        &self,
        run_id: &str,
        assessment: Timeslot,
    ) -> AuditResult<Vec<ParticipantAssessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT participant, computed, recorded, recorded_count, variance
             FROM participant_assessment WHERE run_id = ?1 AND assessment_timeslot = ?2
             ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id, assessment as i64], |row| {
                Ok(ParticipantAssessment {
                    participant:    row.get(0)?,
                    computed:       row.get(1)?,
                    recorded:       row.get(2)?,
                    recorded_count: row.get(3)?,
                    variance:       row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Accumulated variance per participant, in first-seen order.
    pub fn variance_totals(&self, run_id: &str) -> AuditResult<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT participant, SUM(variance)
             FROM participant_assessment WHERE run_id = ?1
             GROUP BY participant ORDER BY MIN(rowid) ASC",
        )?;
        let totals = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }
}

impl AssessmentSink for AuditStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn on_assessment(&mut self, run_id: &str, record: &AssessmentRecord) -> AuditResult<()> {
        self.insert_assessment(run_id, record)
    }

    fn on_finish(&mut self, report: &VarianceReport) -> AuditResult<()> {
        self.set_run_status(&report.run_id, "completed")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
