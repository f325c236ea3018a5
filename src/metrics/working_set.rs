use std::collections::BTreeMap;
use std::time::Duration;

use super::Category;
use crate::http_client::Exchange;

/// Scratch state for the item being measured. Holds the values about to be
/// folded plus the totals of every exchange issued for the item, so that
/// per-item rates stay correct when one item needs two round trips.
#[derive(Debug, Default)]
pub struct ItemWorkingSet {
    values: BTreeMap<Category, f64>,
    exchanges: u32,
    bytes: u64,
    elapsed: Duration,
}

impl ItemWorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one exchange of the current item.
    pub fn add_item_total(&mut self, exchange: &Exchange) {
        self.exchanges += 1;
        self.bytes += exchange.size();
        self.elapsed += exchange.timing.total;
    }

    pub fn set(&mut self, category: Category, value: f64) {
        self.values.insert(category, value);
    }

    pub fn get(&self, category: Category) -> Option<f64> {
        self.values.get(&category).copied()
    }

    pub fn values(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }

    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    /// Bytes per second over every exchange of the item.
    pub fn download_rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.bytes as f64 / secs)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
