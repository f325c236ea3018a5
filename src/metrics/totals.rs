use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;

use super::percentiles::PercentileSet;
use super::{Category, ItemOutcome};
use crate::dispatcher::status_message;
use crate::target::{Target, TargetKind};

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 10 min, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 600_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Running sum of one `(kind, category)` key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sum {
    pub total: f64,
    pub count: u64,
}

impl Sum {
    /// `None` when nothing was observed.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }
}

/// One row of the status-code histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBucket {
    pub message: &'static str,
    pub count: u64,
}

/// Accumulated statistics of a run. Only ever grows: nothing here is
/// decremented or reset while the run is in progress.
pub struct RunningTotals {
    sums: BTreeMap<(TargetKind, Category), Sum>,

    widgets: u64,
    layouts: u64,
    valid: u64,
    invalid: u64,
    no_profile: u64,

    status_codes: BTreeMap<u16, StatusBucket>,
    overtime: Vec<Target>,

    widget_latency: Histogram<u64>,
    layout_latency: Histogram<u64>,
}

/// Read-only view handed to the report.
#[derive(Debug, Clone)]
pub struct TotalsSnapshot {
    pub sums: BTreeMap<(TargetKind, Category), Sum>,
    pub widgets: u64,
    pub layouts: u64,
    pub valid: u64,
    pub invalid: u64,
    pub no_profile: u64,
    pub status_codes: BTreeMap<u16, StatusBucket>,
    pub overtime: Vec<Target>,
    pub widget_latency: PercentileSet,
    pub layout_latency: PercentileSet,
}

// ─── RunningTotals impl ──────────────────────────────────────────

impl RunningTotals {
    pub fn new() -> Self {
        Self {
            sums: BTreeMap::new(),
            widgets: 0,
            layouts: 0,
            valid: 0,
            invalid: 0,
            no_profile: 0,
            status_codes: BTreeMap::new(),
            overtime: Vec::new(),
            widget_latency: new_histogram(),
            layout_latency: new_histogram(),
        }
    }

    /// Add `value` to the running sum of `(kind, category)`.
    pub fn fold(&mut self, kind: TargetKind, category: Category, value: f64) {
        let sum = self.sums.entry((kind, category)).or_default();
        sum.total += value;
        sum.count += 1;
    }

    /// Count one visited target: its kind, its validity and its status.
    pub fn record_item(&mut self, item: &ItemOutcome) {
        match item.target.kind() {
            TargetKind::Widget => self.widgets += 1,
            TargetKind::Layout => self.layouts += 1,
        }

        if item.valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }

        if item.no_profile {
            self.no_profile += 1;
        }

        self.status_codes
            .entry(item.status)
            .or_insert_with(|| StatusBucket {
                message: status_message(item.status),
                count: 0,
            })
            .count += 1;
    }

    /// Record the raw wall time of an item for the percentile summary.
    pub fn record_latency(&mut self, kind: TargetKind, total: Duration) {
        let us = (total.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
        let hist = match kind {
            TargetKind::Widget => &mut self.widget_latency,
            TargetKind::Layout => &mut self.layout_latency,
        };
        let _ = hist.record(us);
    }

    pub fn mark_overtime(&mut self, target: &Target) {
        self.overtime.push(target.clone());
    }

    pub fn sum(&self, kind: TargetKind, category: Category) -> Sum {
        self.sums.get(&(kind, category)).copied().unwrap_or_default()
    }

    pub fn items(&self) -> u64 {
        self.widgets + self.layouts
    }

    pub fn snapshot(&self) -> TotalsSnapshot {
        TotalsSnapshot {
            sums: self.sums.clone(),
            widgets: self.widgets,
            layouts: self.layouts,
            valid: self.valid,
            invalid: self.invalid,
            no_profile: self.no_profile,
            status_codes: self.status_codes.clone(),
            overtime: self.overtime.clone(),
            widget_latency: PercentileSet::from_histogram(&self.widget_latency),
            layout_latency: PercentileSet::from_histogram(&self.layout_latency),
        }
    }
}

impl Default for RunningTotals {
    fn default() -> Self {
        Self::new()
    }
}

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("static histogram bounds are valid")
}

// ─── Snapshot accessors ──────────────────────────────────────────

impl TotalsSnapshot {
    pub fn sum(&self, kind: TargetKind, category: Category) -> Sum {
        self.sums.get(&(kind, category)).copied().unwrap_or_default()
    }

    pub fn average(&self, kind: TargetKind, category: Category) -> Option<f64> {
        self.sum(kind, category).average()
    }

    pub fn items(&self) -> u64 {
        self.widgets + self.layouts
    }

    /// Sum of the total time of every item, in the configured time unit.
    pub fn total_time(&self) -> f64 {
        self.sum(TargetKind::Widget, Category::Total).total
            + self.sum(TargetKind::Layout, Category::Total).total
    }

    pub fn latency(&self, kind: TargetKind) -> &PercentileSet {
        match kind {
            TargetKind::Widget => &self.widget_latency,
            TargetKind::Layout => &self.layout_latency,
        }
    }

    pub fn status_count(&self, code: u16) -> u64 {
        self.status_codes.get(&code).map_or(0, |b| b.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(module: &str, status: u16, valid: bool) -> ItemOutcome {
        ItemOutcome {
            target: Target::new(module, "x"),
            status,
            valid,
            no_profile: false,
        }
    }

    #[test]
    fn averages_are_none_without_observations() {
        let totals = RunningTotals::new();
        let snapshot = totals.snapshot();

        assert_eq!(snapshot.average(TargetKind::Widget, Category::Total), None);
        assert_eq!(snapshot.items(), 0);
        assert!(!snapshot.latency(TargetKind::Widget).has_data());
    }

    #[test]
    fn fold_accumulates_per_kind_and_category() {
        let mut totals = RunningTotals::new();
        totals.fold(TargetKind::Widget, Category::Total, 0.2);
        totals.fold(TargetKind::Widget, Category::Total, 0.4);
        totals.fold(TargetKind::Layout, Category::Total, 1.0);

        let snapshot = totals.snapshot();
        let widget_avg = snapshot.average(TargetKind::Widget, Category::Total).unwrap();
        assert!((widget_avg - 0.3).abs() < 1e-9);
        assert_eq!(snapshot.sum(TargetKind::Layout, Category::Total).count, 1);
        assert!((snapshot.total_time() - 1.6).abs() < 1e-9);
        assert_eq!(snapshot.average(TargetKind::Layout, Category::Action), None);
    }

    #[test]
    fn each_item_hits_one_bucket_of_each_family() {
        let mut totals = RunningTotals::new();
        totals.record_item(&outcome("users", 200, true));
        totals.record_item(&outcome("users", 500, false));
        totals.record_item(&outcome("pages", 200, true));

        let snapshot = totals.snapshot();
        assert_eq!(snapshot.widgets, 2);
        assert_eq!(snapshot.layouts, 1);
        assert_eq!(snapshot.valid + snapshot.invalid, snapshot.items());
        assert_eq!(snapshot.status_count(200), 2);
        assert_eq!(snapshot.status_count(500), 1);
        assert_eq!(snapshot.status_codes[&500].message, "Internal Server Error");
    }

    #[test]
    fn latency_histograms_are_split_by_kind() {
        let mut totals = RunningTotals::new();
        totals.record_latency(TargetKind::Widget, Duration::from_millis(120));
        totals.record_latency(TargetKind::Widget, Duration::ZERO);

        let snapshot = totals.snapshot();
        assert_eq!(snapshot.latency(TargetKind::Widget).count, 2);
        assert_eq!(snapshot.latency(TargetKind::Layout).count, 0);
    }
}
