//! Proportional fee attribution for a single billed peak.

use peakfee_core::{
    attribution::FeeAttributor,
    error::AuditError,
    peak::PeakEvent,
    window::DemandWindow,
};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn charge_is_split_by_share_of_peak_demand() {
    let mut window = DemandWindow::new(0, 2, 3);
    window.record_slot(1, &[6.0, 3.0, 1.0]);

    let peak = PeakEvent::new(10.0, 1);
    let attribution = FeeAttributor::new(-180.0).attribute(&window, &peak, 8.0).unwrap();

    assert!(close(attribution.excess, 2.0));
    assert!(close(attribution.aggregate_charge, -360.0));
    assert!(close(attribution.costs[0], -216.0));
    assert!(close(attribution.costs[1], -108.0));
    assert!(close(attribution.costs[2], -36.0));
}

#[test]
fn participant_costs_sum_to_aggregate_charge() {
    let mut window = DemandWindow::new(0, 1, 4);
    window.record_slot(0, &[12.5, -3.0, 40.25, 0.75]);
    let total = window.aggregate_at(0);

    let peak = PeakEvent::new(total, 0);
    let attribution = FeeAttributor::new(-100.0).attribute(&window, &peak, 31.0).unwrap();
    let sum: f64 = attribution.costs.iter().sum();
    assert!(
        close(sum, attribution.aggregate_charge),
        "sum {sum} != aggregate {}",
        attribution.aggregate_charge
    );
}

#[test]
fn a_producer_at_the_peak_earns_a_credit() {
    let mut window = DemandWindow::new(0, 1, 2);
    window.record_slot(0, &[12.0, -2.0]);
    let peak = PeakEvent::new(10.0, 0);
    let attribution = FeeAttributor::new(-100.0).attribute(&window, &peak, 5.0).unwrap();
    assert!(attribution.costs[0] < 0.0);
    assert!(attribution.costs[1] > 0.0);
}

#[test]
fn zero_aggregate_at_a_billed_peak_is_an_error() {
    let window = DemandWindow::new(0, 3, 2);
    let peak = PeakEvent::new(0.0, 2);
    let err = FeeAttributor::new(-100.0).attribute(&window, &peak, -1.0).unwrap_err();
    assert!(matches!(err, AuditError::ZeroAggregateDemand { slot: 2 }), "got {err}");
}
