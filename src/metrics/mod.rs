pub mod percentiles;
pub mod totals;
pub mod working_set;

pub use totals::{RunningTotals, StatusBucket, TotalsSnapshot};
pub use working_set::ItemWorkingSet;

use crate::target::Target;

/// A measured quantity. Time categories are stored in the configured time
/// unit, `Size` in the size unit and `Speed` in size unit per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Connect,
    Server,
    Transfer,
    Total,
    Action,
    Read,
    Render,
    DbQueries,
    DbTime,
    Size,
    Speed,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Connect,
        Category::Server,
        Category::Transfer,
        Category::Total,
        Category::Action,
        Category::Read,
        Category::Render,
        Category::DbQueries,
        Category::DbTime,
        Category::Size,
        Category::Speed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Connect => "connect",
            Category::Server => "server",
            Category::Transfer => "transfer",
            Category::Total => "total",
            Category::Action => "action",
            Category::Read => "read",
            Category::Render => "render",
            Category::DbQueries => "db queries",
            Category::DbTime => "db time",
            Category::Size => "size",
            Category::Speed => "speed",
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(
            self,
            Category::Connect
                | Category::Server
                | Category::Transfer
                | Category::Total
                | Category::Action
                | Category::Read
                | Category::Render
                | Category::DbTime
        )
    }
}

/// The per-item facts that are counted once for every visited target.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub target: Target,
    pub status: u16,
    pub valid: bool,
    /// Profiling was on but produced no sample for an otherwise valid item.
    pub no_profile: bool,
}
