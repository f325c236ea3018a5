use std::time::Duration;

use hdrhistogram::Histogram;

/// Percentile breakdown of one latency histogram, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }

    pub fn p50(&self) -> Duration {
        Duration::from_micros(self.p50)
    }

    pub fn p95(&self) -> Duration {
        Duration::from_micros(self.p95)
    }

    pub fn p99(&self) -> Duration {
        Duration::from_micros(self.p99)
    }
}
