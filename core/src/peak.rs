//! Peak detection and ranking over one demand window.

use crate::{stats::RunningStats, window::DemandWindow};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Maximum number of peaks billed per assessment.
pub const BILLED_PEAKS_PER_ASSESSMENT: usize = 3;

/// A window slot whose aggregate demand met the threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeakEvent {
    pub value: f64,
    pub slot:  usize,
}

impl PeakEvent {
    pub fn new(value: f64, slot: usize) -> Self {
        Self { value, slot }
    }
}

// Ordered by value, then slot. total_cmp keeps the order total even
// for values no sane window contains.
impl Ord for PeakEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for PeakEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PeakEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PeakEvent {}

pub struct PeakAssessor {
    std_coefficient: f64,
}

impl PeakAssessor {
    pub fn new(std_coefficient: f64) -> Self {
        Self { std_coefficient }
    }

    pub fn threshold(&self, stats: &RunningStats) -> f64 {
        stats.threshold(self.std_coefficient)
    }

    /// Every slot at or above `threshold`, sorted ascending by (value, slot).
    pub fn find_peaks(&self, window: &DemandWindow, threshold: f64) -> Vec<PeakEvent> {
        let mut peaks: Vec<PeakEvent> = window
            .aggregate()
            .iter()
            .enumerate()
            .filter(|(_, value)| **value >= threshold)
            .map(|(slot, value)| PeakEvent::new(*value, slot))
            .collect();
        peaks.sort();
        peaks
    }

    /// The peaks to bill: the first BILLED_PEAKS_PER_ASSESSMENT of the
    /// ascending list. This bills the smallest qualifying peaks, which is
    /// what the utility's assessment does; do not switch to the largest
    /// without confirming the intended tariff policy.
    pub fn select<'a>(&self, sorted_peaks: &'a [PeakEvent]) -> &'a [PeakEvent] {
        let n = sorted_peaks.len().min(BILLED_PEAKS_PER_ASSESSMENT);
        &sorted_peaks[..n]
    }
}
