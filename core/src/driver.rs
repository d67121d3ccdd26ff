//! The assessment driver. Replays one game's event stream.
//!
//! EXECUTION ORDER per TimeslotStarted marker (fixed, never reordered):
//!   1. Close the open timeslot:
//!      a. if it is the first closed timeslot of a later interval than
//!         any closed so far, run the peak assessment over the window
//!         as it stands (the interval that holds the data),
//!      b. then write its net demand into the window and, unless the
//!         aggregate is exactly zero, into the running statistics.
//!   2. On the very first marker, fix the window origin and freeze the
//!      participant registry.
//!   3. Open the new timeslot's demand accumulators.
//!
//! Assessing before writing matters: recorded capacity charges for an
//! interval are logged during the boundary timeslot itself, so they
//! must be compared before the ledger is cleared.
//!
//! Intervals are numbered `(t - origin) / capacity`. Comparing against
//! the highest timeslot closed so far means a marker that jumps over
//! the boundary still triggers the assessment, and a repeated boundary
//! marker cannot trigger a second one. Timeslots a jump skips over are
//! written into the window as empty slots but never sampled.

use crate::{
    assessment::{AnomalyCounts, AssessmentRecord, BilledPeak, ParticipantAssessment},
    attribution::FeeAttributor,
    bootstrap::{BootstrapRecord, BootstrapSeeder, SeedSummary},
    config::AuditConfig,
    error::{AuditError, AuditResult},
    event::{AuditEvent, TransactionKind},
    ledger::{RecordedChargeLedger, VarianceAccumulator},
    participant::ParticipantRegistry,
    peak::PeakAssessor,
    report::{ParticipantVariance, VarianceReport},
    sink::AssessmentSink,
    stats::RunningStats,
    types::{ParticipantIdx, RunId, Timeslot},
    window::DemandWindow,
};

/// Energy accumulated for the timeslot currently open.
#[derive(Debug, Clone)]
struct OpenTimeslot {
    timeslot: Timeslot,
    consumed: Vec<f64>,
    produced: Vec<f64>,
}

impl OpenTimeslot {
    fn new(timeslot: Timeslot, participants: usize) -> Self {
        Self {
            timeslot,
            consumed: vec![0.0; participants],
            produced: vec![0.0; participants],
        }
    }

    /// Net demand per participant: `-(produced + consumed)`.
    /// Consumption is logged negative, so positive means drawing from the grid.
    fn net_demand(&self) -> Vec<f64> {
        self.consumed
            .iter()
            .zip(&self.produced)
            .map(|(used, produced)| -(produced + used))
            .collect()
    }
}

pub struct AssessmentDriver {
    pub run_id:     RunId,
    pub game_id:    String,
    config:         AuditConfig,
    registry:       ParticipantRegistry,
    stats:          RunningStats,
    assessor:       PeakAssessor,
    attributor:     FeeAttributor,
    window:         Option<DemandWindow>,
    current:        Option<OpenTimeslot>,
    ledger:         RecordedChargeLedger,
    variance:       VarianceAccumulator,
    seed:           SeedSummary,
    anomalies:      AnomalyCounts,
    live_timeslots: u64,
    /// Highest timeslot closed so far.
    high_water:     Option<Timeslot>,
    history:        Vec<AssessmentRecord>,
    sinks:          Vec<Box<dyn AssessmentSink>>,
}

impl AssessmentDriver {
    pub fn new(run_id: RunId, config: AuditConfig) -> AuditResult<Self> {
        config.validate()?;
        Ok(Self {
            game_id:        run_id.clone(),
            run_id,
            assessor:       PeakAssessor::new(config.std_coefficient),
            attributor:     FeeAttributor::new(config.fee_per_point),
            config,
            registry:       ParticipantRegistry::new(),
            stats:          RunningStats::new(),
            window:         None,
            current:        None,
            ledger:         RecordedChargeLedger::default(),
            variance:       VarianceAccumulator::default(),
            seed:           SeedSummary::default(),
            anomalies:      AnomalyCounts::default(),
            live_timeslots: 0,
            high_water:     None,
            history:        Vec::new(),
            sinks:          Vec::new(),
        })
    }

    /// Label used in the detail report's `game` column. Defaults to the run id.
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = game_id.into();
        self
    }

    /// Register a sink. Sinks receive records in registration order.
    pub fn register_sink(&mut self, sink: Box<dyn AssessmentSink>) {
        self.sinks.push(sink);
    }

    /// Find a registered sink by concrete type. Used by tests and tooling.
    pub fn sink<T: 'static>(&self) -> Option<&T> {
        self.sinks.iter().find_map(|s| s.as_any().downcast_ref::<T>())
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn window(&self) -> Option<&DemandWindow> {
        self.window.as_ref()
    }

    pub fn anomalies(&self) -> &AnomalyCounts {
        &self.anomalies
    }

    pub fn assessments(&self) -> &[AssessmentRecord] {
        &self.history
    }

    /// Accumulated variance so far for `participant`.
    pub fn variance_for(&self, participant: &str) -> Option<f64> {
        self.registry.get(participant).map(|idx| self.variance.total(idx))
    }

    /// Add a participant. Only allowed before the first live timeslot.
    pub fn declare_participant(&mut self, name: &str) -> AuditResult<ParticipantIdx> {
        if let Some(window) = &self.window {
            if self.registry.get(name).is_none() {
                return Err(AuditError::RegistryFrozen {
                    participant: name.to_string(),
                    origin:      window.origin(),
                });
            }
        }
        let idx = self.registry.intern(name.to_string());
        self.ledger.ensure_len(self.registry.len());
        self.variance.ensure_len(self.registry.len());
        Ok(idx)
    }

    /// Seed the running statistics from bootstrap history.
    /// Must happen before the first live timeslot.
    pub fn seed(&mut self, records: &[BootstrapRecord]) -> AuditResult<SeedSummary> {
        if let Some(window) = &self.window {
            return Err(AuditError::SeedAfterReplay { origin: window.origin() });
        }
        self.seed = BootstrapSeeder::new(self.config.bootstrap_hours).seed(records, &mut self.stats);
        Ok(self.seed.clone())
    }

    /// Route one event.
    pub fn handle(&mut self, event: AuditEvent) -> AuditResult<()> {
        match event {
            AuditEvent::ParticipantJoined { participant } => {
                self.declare_participant(&participant)?;
            }
            AuditEvent::TimeslotStarted { timeslot } => {
                self.start_timeslot(timeslot)?;
            }
            AuditEvent::TariffTransaction { participant, kind, kwh } => {
                let idx = self.registry.resolve(&participant)?;
                self.record_energy(idx, kind, kwh);
            }
            AuditEvent::CapacityCharge { participant, charge, threshold, peak_timeslot } => {
                let idx = self.registry.resolve(&participant)?;
                log::debug!(
                    "ctx: peak-ts {peak_timeslot}, participant {participant}, charge {charge:.3}, threshold {threshold:.3}"
                );
                self.ledger.record(idx, charge);
            }
        }
        Ok(())
    }

    /// Handle every event, then finish. The first error aborts the run.
    pub fn run<I>(&mut self, events: I) -> AuditResult<VarianceReport>
    where
        I: IntoIterator<Item = AuditResult<AuditEvent>>,
    {
        for event in events {
            self.handle(event?)?;
        }
        self.finish()
    }

    /// Close the open timeslot (assessing it if it is a boundary) and
    /// build the report. Sinks see the report before it is returned.
    pub fn finish(&mut self) -> AuditResult<VarianceReport> {
        if let Some(open) = self.current.take() {
            self.close_timeslot(open)?;
        }

        let participants = self
            .registry
            .iter()
            .map(|(idx, name)| ParticipantVariance {
                participant: name.to_string(),
                variance:    self.variance.total(idx),
            })
            .collect();

        let report = VarianceReport {
            run_id:         self.run_id.clone(),
            game_id:        self.game_id.clone(),
            participants,
            assessments:    std::mem::take(&mut self.history),
            anomalies:      self.anomalies.clone(),
            bootstrap:      self.seed.clone(),
            final_stats:    self.stats.clone(),
            live_timeslots: self.live_timeslots,
        };

        for sink in &mut self.sinks {
            sink.on_finish(&report)?;
        }
        log::info!(
            "Run {} finished: {} timeslots, {} assessments, {} gaps",
            report.run_id,
            report.live_timeslots,
            report.assessments.len(),
            report.anomalies.gap_timeslots
        );
        Ok(report)
    }

    // ── Timeslot lifecycle ─────────────────────────────────────

    fn start_timeslot(&mut self, timeslot: Timeslot) -> AuditResult<()> {
        if let Some(open) = self.current.take() {
            if timeslot <= open.timeslot {
                log::warn!(
                    "Timeslot marker {timeslot} does not advance past {}; events are not reordered",
                    open.timeslot
                );
                self.anomalies.stalled_markers += 1;
            }
            self.close_timeslot(open)?;
        }

        if self.window.is_none() {
            if self.registry.is_empty() {
                log::warn!("Live replay starting at timeslot {timeslot} with no participants");
            }
            self.window = Some(DemandWindow::new(
                timeslot,
                self.config.assessment_interval,
                self.registry.len(),
            ));
            log::info!(
                "Start timeslot {timeslot}, window origin fixed, interval = {}",
                self.config.assessment_interval
            );
        }

        log::debug!("Timeslot {timeslot}");
        self.current = Some(OpenTimeslot::new(timeslot, self.registry.len()));
        Ok(())
    }

    fn record_energy(&mut self, participant: ParticipantIdx, kind: TransactionKind, kwh: f64) {
        if kind == TransactionKind::Other {
            self.anomalies.ignored_transactions += 1;
            return;
        }
        let Some(open) = self.current.as_mut() else {
            log::warn!("Tariff transaction before the first timeslot marker dropped");
            self.anomalies.orphan_transactions += 1;
            return;
        };
        let i = participant.as_usize();
        match kind {
            TransactionKind::Consume => open.consumed[i] += kwh,
            TransactionKind::Produce => open.produced[i] += kwh,
            TransactionKind::Other   => {}
        }
    }

    /// Interval number of `timeslot`; timeslots before the origin count as 0.
    fn interval_of(&self, timeslot: Timeslot) -> u64 {
        let Some(window) = &self.window else {
            return 0;
        };
        timeslot.saturating_sub(window.origin()) / self.config.assessment_interval as u64
    }

    fn close_timeslot(&mut self, open: OpenTimeslot) -> AuditResult<()> {
        let t = open.timeslot;
        if let Some(high) = self.high_water {
            let current = self.interval_of(t);
            let previous = self.interval_of(high);

            if t > high + 1 {
                log::warn!(
                    "Timeslots {}..={} missing from the log; treated as empty",
                    high + 1,
                    t - 1
                );
                self.anomalies.skipped_timeslots += t - high - 1;
            }
            let (finishing, starting): (Vec<Timeslot>, Vec<Timeslot>) = self
                .skipped_before(high, t)
                .into_iter()
                .filter(|s| {
                    let interval = self.interval_of(*s);
                    interval == previous || interval == current
                })
                .partition(|s| self.interval_of(*s) == previous);

            // Finish the interval holding the data, assess it, then
            // blank the skipped slots that belong to the new interval.
            self.blank_slots(&finishing);
            if current > previous {
                if current > previous + 1 {
                    log::warn!(
                        "Assessment intervals {}..={} saw no timeslots",
                        previous + 1,
                        current - 1
                    );
                }
                self.assess(t, previous)?;
                self.blank_slots(&starting);
            }
        }

        self.record_net_demand(&open);
        self.live_timeslots += 1;
        self.high_water = Some(self.high_water.map_or(t, |high| high.max(t)));
        Ok(())
    }

    /// Timeslots strictly between `high` and `t` that still map onto
    /// the window; anything older has been overwritten in ring order.
    fn skipped_before(&self, high: Timeslot, t: Timeslot) -> Vec<Timeslot> {
        if t <= high + 1 {
            return Vec::new();
        }
        let capacity = self.config.assessment_interval as u64;
        let start = (high + 1).max(t.saturating_sub(capacity));
        (start..t).collect()
    }

    fn blank_slots(&mut self, timeslots: &[Timeslot]) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        for s in timeslots {
            window.record_slot(*s, &[]);
        }
    }

    fn record_net_demand(&mut self, open: &OpenTimeslot) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let total = window.record_slot(open.timeslot, &open.net_demand());
        log::debug!("Total net consumption for ts {} = {total:.3}", open.timeslot);

        if total == 0.0 {
            log::warn!(
                "Timeslot {} has zero aggregate net demand; treated as a data gap",
                open.timeslot
            );
            self.anomalies.gap_timeslots += 1;
            return;
        }
        self.stats.update(total);
        log::debug!(
            "Net demand k = {}, mean = {:.3}, sigma = {:.3}",
            self.stats.count(),
            self.stats.mean(),
            self.stats.sigma()
        );
    }

    // ── Peak assessment ────────────────────────────────────────

    /// Assess interval number `interval` at the close of `timeslot`.
    fn assess(&mut self, timeslot: Timeslot, interval: u64) -> AuditResult<()> {
        let Some(window) = self.window.as_mut() else {
            return Ok(());
        };
        let interval_start = window.origin() + interval * window.capacity() as u64;
        let threshold = self.assessor.threshold(&self.stats);
        let peaks = self.assessor.find_peaks(window, threshold);
        log::info!(
            "Peak-demand assessment at timeslot {timeslot}: {} peaks found above threshold {threshold:.3}",
            peaks.len()
        );

        let mut computed = vec![0.0; self.registry.len()];
        let mut billed = Vec::new();
        for (rank, peak) in self.assessor.select(&peaks).iter().enumerate() {
            let attribution = self.attributor.attribute(window, peak, threshold)?;
            for (total, cost) in computed.iter_mut().zip(&attribution.costs) {
                *total += cost;
            }
            let peak_timeslot = interval_start + peak.slot as u64;
            log::info!(
                "Peak at ts {peak_timeslot}, pts={:.3}, charge={:.3}",
                attribution.excess,
                attribution.aggregate_charge
            );
            billed.push(BilledPeak {
                rank,
                slot:             peak.slot,
                timeslot:         peak_timeslot,
                value:            peak.value,
                excess:           attribution.excess,
                aggregate_charge: attribution.aggregate_charge,
            });
        }

        let mut participants = Vec::with_capacity(self.registry.len());
        for (idx, name) in self.registry.iter() {
            let computed = computed[idx.as_usize()];
            let recorded = self.ledger.total(idx);
            let variance = computed - recorded;
            self.variance.add(idx, variance);
            participants.push(ParticipantAssessment {
                participant:    name.to_string(),
                computed,
                recorded,
                recorded_count: self.ledger.count(idx),
                variance,
            });
        }
        self.ledger.clear();
        window.reset_interval();

        let record = AssessmentRecord {
            timeslot,
            interval_start,
            threshold,
            mean:             self.stats.mean(),
            sigma:            self.stats.sigma(),
            sample_count:     self.stats.count(),
            qualifying_peaks: peaks.len(),
            peaks:            billed,
            participants,
        };
        for sink in &mut self.sinks {
            log::debug!("assessment {timeslot} -> sink {}", sink.name());
            sink.on_assessment(&self.run_id, &record)?;
        }
        self.history.push(record);
        Ok(())
    }
}
