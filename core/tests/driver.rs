//! End-to-end replay through the assessment driver.

use peakfee_core::{
    bootstrap::BootstrapRecord,
    config::AuditConfig,
    driver::AssessmentDriver,
    error::AuditError,
    event::{AuditEvent, TransactionKind},
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn joined(name: &str) -> AuditEvent {
    AuditEvent::ParticipantJoined { participant: name.to_string() }
}

fn marker(timeslot: u64) -> AuditEvent {
    AuditEvent::TimeslotStarted { timeslot }
}

/// Consumption is logged negative; pass the positive demand.
fn consume(name: &str, demand: f64) -> AuditEvent {
    AuditEvent::TariffTransaction {
        participant: name.to_string(),
        kind:        TransactionKind::Consume,
        kwh:         -demand,
    }
}

fn produce(name: &str, kwh: f64) -> AuditEvent {
    AuditEvent::TariffTransaction {
        participant: name.to_string(),
        kind:        TransactionKind::Produce,
        kwh,
    }
}

fn charge(name: &str, amount: f64, peak_timeslot: u64) -> AuditEvent {
    AuditEvent::CapacityCharge {
        participant: name.to_string(),
        charge: amount,
        threshold: 0.0,
        peak_timeslot,
    }
}

/// Four bootstrap hours of aggregate demand 10.
fn flat_bootstrap() -> Vec<BootstrapRecord> {
    vec![BootstrapRecord { customer_name: "town".into(), net_usage: vec![-10.0; 4] }]
}

fn build(config: AuditConfig, bootstrap: &[BootstrapRecord]) -> AssessmentDriver {
    init_logs();
    let mut driver = AssessmentDriver::new("run-test".into(), config).unwrap();
    driver.seed(bootstrap).unwrap();
    driver
}

/// p1 draws `d1`, p2 draws `d2` in each of timeslots 0..n.
fn live_interval(demands: &[(f64, f64)]) -> Vec<AuditEvent> {
    let mut events = vec![joined("p1"), joined("p2")];
    for (t, (d1, d2)) in demands.iter().enumerate() {
        events.push(marker(t as u64));
        events.push(consume("p1", *d1));
        events.push(consume("p2", *d2));
    }
    events
}

fn ok(events: Vec<AuditEvent>) -> impl Iterator<Item = Result<AuditEvent, AuditError>> {
    events.into_iter().map(Ok)
}

// ── Assessment outcomes ────────────────────────────────────────

#[test]
fn flat_demand_at_threshold_bills_zero() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let mut events = live_interval(&[(6.0, 4.0); 4]);
    events.push(marker(4));

    let report = driver.run(ok(events)).unwrap();

    assert_eq!(report.assessments.len(), 1);
    let record = &report.assessments[0];
    assert_eq!(record.timeslot, 4);
    assert_eq!(record.interval_start, 0);
    assert!(close(record.threshold, 10.0));
    assert_eq!(record.qualifying_peaks, 4, "every slot equals the threshold");
    let slots: Vec<usize> = record.peaks.iter().map(|p| p.slot).collect();
    assert_eq!(slots, vec![0, 1, 2]);
    assert!(record.peaks.iter().all(|p| close(p.excess, 0.0)));

    assert_eq!(report.variance_for("p1"), Some(0.0));
    assert_eq!(report.variance_for("p2"), Some(0.0));
    assert_eq!(report.live_timeslots, 5);
}

#[test]
fn charges_recorded_during_the_boundary_timeslot_are_compared() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let mut events = live_interval(&[(6.0, 4.0); 4]);
    events.push(marker(4));
    events.push(charge("p1", -50.0, 0));
    events.push(charge("p2", -30.0, 0));

    let report = driver.run(ok(events)).unwrap();

    let record = &report.assessments[0];
    let p1 = record.participant("p1").unwrap();
    assert_eq!(p1.recorded, -50.0);
    assert_eq!(p1.recorded_count, 1);
    assert!(close(p1.variance, 50.0));
    assert!(close(report.variance_for("p2").unwrap(), 30.0));
}

#[test]
fn the_three_smallest_qualifying_peaks_are_billed() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let mut events = live_interval(&[(8.0, 4.0), (9.0, 4.0), (10.0, 4.0), (12.0, 4.0)]);
    events.push(marker(4));

    let report = driver.run(ok(events)).unwrap();
    let record = &report.assessments[0];

    // Eight samples: four bootstrap tens plus 12, 13, 14, 16.
    assert!(close(record.threshold, 11.875));
    assert_eq!(record.qualifying_peaks, 4);
    let slots: Vec<usize> = record.peaks.iter().map(|p| p.slot).collect();
    assert_eq!(slots, vec![0, 1, 2], "the highest slot is not billed");

    let computed: f64 = record.participants.iter().map(|p| p.computed).sum();
    assert!(close(computed, -337.5), "computed {computed}");

    let p2_expected = -100.0 * (0.125 * 4.0 / 12.0 + 1.125 * 4.0 / 13.0 + 2.125 * 4.0 / 14.0);
    assert!(close(record.participant("p2").unwrap().computed, p2_expected));
    assert!(close(report.total_variance(), -337.5));
}

#[test]
fn variance_accumulates_across_assessments() {
    let config = AuditConfig::default_test().with_interval(2);
    let mut driver = build(config, &flat_bootstrap());
    let mut events = live_interval(&[(6.0, 4.0); 6]);
    events.insert(events.len() - 3, charge("p1", -5.0, 2));
    events.push(marker(6));
    events.push(charge("p1", -7.0, 4));

    let report = driver.run(ok(events)).unwrap();

    let boundaries: Vec<u64> = report.assessments.iter().map(|a| a.timeslot).collect();
    assert_eq!(boundaries, vec![2, 4, 6]);
    assert_eq!(report.assessments[0].participant("p1").unwrap().recorded, 0.0);
    assert_eq!(report.assessments[1].participant("p1").unwrap().recorded, -5.0);
    assert_eq!(report.assessments[2].participant("p1").unwrap().recorded, -7.0);
    assert!(close(report.variance_for("p1").unwrap(), 12.0));
}

#[test]
fn no_assessment_before_the_first_boundary_closes() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let report = driver.run(ok(live_interval(&[(6.0, 4.0); 4]))).unwrap();
    assert!(report.assessments.is_empty());
    assert_eq!(report.variance_for("p1"), Some(0.0));
}

#[test]
fn origin_is_the_first_marker_not_zero() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let mut events = vec![joined("p1")];
    for t in 360..=364 {
        events.push(marker(t));
        events.push(consume("p1", 10.0));
    }
    let report = driver.run(ok(events)).unwrap();
    assert_eq!(report.assessments.len(), 1);
    assert_eq!(report.assessments[0].timeslot, 364);
    assert_eq!(report.assessments[0].interval_start, 360);
    assert_eq!(report.assessments[0].peaks[0].timeslot, 360);
}

/// p1 draws 6 and p2 draws 4 in every listed timeslot.
fn markers(timeslots: &[u64]) -> Vec<AuditEvent> {
    let mut events = vec![joined("p1"), joined("p2")];
    for t in timeslots {
        events.push(marker(*t));
        events.push(consume("p1", 6.0));
        events.push(consume("p2", 4.0));
    }
    events
}

#[test]
fn a_marker_that_jumps_the_boundary_still_assesses() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let mut events = markers(&[0, 1, 2, 3, 5]);
    events.push(charge("p1", -50.0, 2));
    events.extend(markers(&[6, 7]).into_iter().skip(2));

    let report = driver.run(ok(events)).unwrap();

    assert_eq!(report.assessments.len(), 1, "interval 0 is assessed exactly once");
    let record = &report.assessments[0];
    assert_eq!(record.timeslot, 5);
    assert_eq!(record.interval_start, 0);
    assert_eq!(record.participant("p1").unwrap().recorded, -50.0);
    assert_eq!(report.anomalies.skipped_timeslots, 1);
    assert_eq!(report.live_timeslots, 7);
    assert_eq!(driver.window().unwrap().aggregate_at(0), 0.0, "skipped timeslot 4 is blank");
}

#[test]
fn a_jump_over_whole_intervals_assesses_the_data_once() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let report = driver.run(ok(markers(&[0, 1, 2, 3, 13, 14, 15, 16]))).unwrap();

    let starts: Vec<(u64, u64)> =
        report.assessments.iter().map(|a| (a.timeslot, a.interval_start)).collect();
    assert_eq!(starts, vec![(13, 0), (16, 12)]);
    assert_eq!(report.anomalies.skipped_timeslots, 9);

    // Interval 12..=15 only saw 13, 14 and 15; slot 0 was blanked.
    let second = &report.assessments[1];
    assert!(second.peaks.iter().all(|p| p.slot != 0));
}

#[test]
fn a_repeated_boundary_marker_assesses_once() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let report = driver.run(ok(markers(&[0, 1, 2, 3, 4, 4, 5]))).unwrap();

    assert_eq!(report.assessments.len(), 1);
    assert_eq!(report.assessments[0].timeslot, 4);
    assert_eq!(report.anomalies.stalled_markers, 1);
    assert_eq!(report.anomalies.skipped_timeslots, 0);
}

#[test]
fn a_backwards_marker_does_not_reopen_an_assessed_interval() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let report = driver.run(ok(markers(&[0, 1, 2, 3, 4, 2, 5, 6, 7, 8]))).unwrap();

    let boundaries: Vec<u64> = report.assessments.iter().map(|a| a.timeslot).collect();
    assert_eq!(boundaries, vec![4, 8]);
    assert_eq!(report.assessments[1].interval_start, 4);
}

// ── Anomalies ──────────────────────────────────────────────────

#[test]
fn zero_demand_timeslot_is_a_gap_that_skips_stats() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let events = vec![joined("p1"), marker(0), consume("p1", 10.0), marker(1), marker(2)];
    driver.run(ok(events)).unwrap();

    // Four bootstrap samples plus timeslot 0; timeslots 1 and 2 are empty.
    assert_eq!(driver.stats().count(), 5);
    assert_eq!(driver.anomalies().gap_timeslots, 2);
    assert_eq!(driver.window().unwrap().aggregate_at(1), 0.0);
}

#[test]
fn producers_reduce_net_demand() {
    let mut driver = build(AuditConfig::default_test(), &[]);
    let events = vec![
        joined("home"),
        joined("farm"),
        marker(0),
        consume("home", 10.0),
        produce("farm", 4.0),
    ];
    driver.run(ok(events)).unwrap();
    let window = driver.window().unwrap();
    assert!(close(window.aggregate_at(0), 6.0));
    assert!(close(driver.stats().mean(), 6.0));
}

#[test]
fn stray_events_are_counted_not_fatal() {
    let mut driver = build(AuditConfig::default_test(), &flat_bootstrap());
    let events = vec![
        joined("p1"),
        consume("p1", 3.0),
        marker(0),
        AuditEvent::TariffTransaction {
            participant: "p1".into(),
            kind:        TransactionKind::Other,
            kwh:         0.0,
        },
        consume("p1", 10.0),
        marker(0),
    ];
    let report = driver.run(ok(events)).unwrap();
    assert_eq!(report.anomalies.orphan_transactions, 1);
    assert_eq!(report.anomalies.ignored_transactions, 1);
    assert_eq!(report.anomalies.stalled_markers, 1);
}

// ── Fatal errors ───────────────────────────────────────────────

#[test]
fn late_participant_is_rejected() {
    let mut driver = build(AuditConfig::default_test(), &[]);
    let err = driver
        .run(ok(vec![joined("p1"), marker(7), joined("late")]))
        .unwrap_err();
    assert!(
        matches!(err, AuditError::RegistryFrozen { ref participant, origin: 7 } if participant == "late"),
        "got {err}"
    );
}

#[test]
fn rejoining_a_known_participant_is_harmless() {
    let mut driver = build(AuditConfig::default_test(), &[]);
    driver.run(ok(vec![joined("p1"), marker(0), joined("p1")])).unwrap();
    assert_eq!(driver.registry().len(), 1);
}

#[test]
fn undeclared_participant_is_rejected() {
    let mut driver = build(AuditConfig::default_test(), &[]);
    let err = driver
        .run(ok(vec![joined("p1"), marker(0), consume("ghost", 1.0)]))
        .unwrap_err();
    assert!(matches!(err, AuditError::UnknownParticipant { .. }), "got {err}");
}

#[test]
fn seeding_after_replay_started_is_rejected() {
    let mut driver = build(AuditConfig::default_test(), &[]);
    driver.handle(marker(0)).unwrap();
    let err = driver.seed(&flat_bootstrap()).unwrap_err();
    assert!(matches!(err, AuditError::SeedAfterReplay { origin: 0 }));
}

#[test]
fn billed_peak_with_zero_aggregate_aborts_the_run() {
    // No bootstrap, an empty first timeslot, then net production:
    // the threshold drops below zero and the empty slot qualifies.
    let config = AuditConfig::default_test().with_interval(2);
    let mut driver = build(config, &[]);
    let events = vec![joined("solar"), marker(0), marker(1), produce("solar", 5.0), marker(2)];

    let err = driver.run(ok(events)).unwrap_err();
    assert!(matches!(err, AuditError::ZeroAggregateDemand { slot: 0 }), "got {err}");
}

#[test]
fn zero_interval_is_invalid() {
    let config = AuditConfig::default_test().with_interval(0);
    let err = AssessmentDriver::new("bad".into(), config).err().unwrap();
    assert!(matches!(err, AuditError::InvalidConfig { .. }));
}
