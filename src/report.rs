use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::config::Units;
use crate::metrics::{Category, TotalsSnapshot};
use crate::profiler::ProfileSample;
use crate::target::{Target, TargetKind, LAYOUT_MODULE};

const TARGET_WIDTH: usize = 40;
const NO_DATA: &str = "-";

/// One line of the per-item table.
#[derive(Debug, Clone)]
pub struct ReportRow<'a> {
    pub target: &'a Target,
    pub status: u16,
    pub valid: bool,
    /// Total time in the configured time unit.
    pub time: f64,
    /// Body size in the configured size unit.
    pub size: f64,
    /// Size unit per second over every exchange of the item.
    pub speed: Option<f64>,
    pub profile: Option<ProfileSample>,
}

/// Writes the fixed-width table as rows arrive, then the closing summary.
pub struct ReportRenderer<W: Write> {
    out: W,
    units: Units,
    profiling: bool,
}

impl<W: Write> ReportRenderer<W> {
    pub fn new(out: W, units: Units, profiling: bool) -> Self {
        Self {
            out,
            units,
            profiling,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(&mut self, started: DateTime<Local>, url: &str) -> io::Result<()> {
        writeln!(self.out, "Started at: {}", started.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(self.out, "Benchmarking {url} (units: {})", self.units)
    }

    pub fn header(&mut self) -> io::Result<()> {
        let text = if self.profiling {
            format!(
                "{:<TARGET_WIDTH$}{:<8}{:<7}{:>10}{:>10}{:>10}{:>9}{:>10}{:>12}",
                "Target", "Status", "Valid", "Time", "Action", "Render", "Queries", "DB time", "Size"
            )
        } else {
            format!(
                "{:<TARGET_WIDTH$}{:<8}{:<7}{:>10}{:>12}{:>14}",
                "Target", "Status", "Valid", "Time", "Size", "Speed"
            )
        };
        writeln!(self.out)?;
        writeln!(self.out, "{text}")?;
        writeln!(self.out, "{}", "-".repeat(text.len()))
    }

    pub fn module_section(&mut self, module: &str) -> io::Result<()> {
        writeln!(self.out)?;
        if module == LAYOUT_MODULE {
            writeln!(self.out, "Processing layouts..")
        } else {
            writeln!(self.out, "Processing widgets in '{module}'")
        }
    }

    pub fn layout_section(&mut self, layout: &Target) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Processing widgets of layout '{layout}'")
    }

    pub fn row(&mut self, row: &ReportRow<'_>) -> io::Result<()> {
        let time = self.units.time;
        let size = self.units.size;

        let mut line = format!(
            "{:<TARGET_WIDTH$}{:<8}{:<7}{:>10}",
            truncate(&row.target.to_string(), TARGET_WIDTH - 1),
            row.status,
            row.valid,
            time.format(row.time),
        );

        if self.profiling {
            let (action, render, queries, db_time) = match &row.profile {
                Some(p) => (
                    time.format(time.scale_secs(p.action_time)),
                    time.format(time.scale_secs(p.render_time)),
                    p.db_query_count.to_string(),
                    time.format(time.scale_secs(p.db_query_time)),
                ),
                None => (
                    NO_DATA.to_string(),
                    NO_DATA.to_string(),
                    NO_DATA.to_string(),
                    NO_DATA.to_string(),
                ),
            };
            line.push_str(&format!(
                "{action:>10}{render:>10}{queries:>9}{db_time:>10}{:>12}",
                size.format(row.size)
            ));
        } else {
            let speed = row
                .speed
                .map(|s| format!("{}/s", size.format(s)))
                .unwrap_or_else(|| NO_DATA.to_string());
            line.push_str(&format!("{:>12}{speed:>14}", size.format(row.size)));
        }

        writeln!(self.out, "{line}")
    }

    pub fn summary(
        &mut self,
        totals: &TotalsSnapshot,
        finished: DateTime<Local>,
        elapsed: Duration,
    ) -> io::Result<()> {
        let time = self.units.time;

        writeln!(self.out)?;
        writeln!(self.out, "All done!")?;
        writeln!(
            self.out,
            "Finished at: {} (run took {:.1}s)",
            finished.format("%Y-%m-%d %H:%M:%S"),
            elapsed.as_secs_f64()
        )?;

        writeln!(self.out, "Result details:")?;
        for (code, bucket) in &totals.status_codes {
            let label = format!("{code} - {}", bucket.message);
            writeln!(self.out, "  {label:<TARGET_WIDTH$}{:>6}", bucket.count)?;
        }
        writeln!(self.out)?;

        writeln!(
            self.out,
            "Executed {} items in {}",
            totals.items(),
            time.format(totals.total_time())
        )?;
        if totals.invalid > 0 {
            writeln!(self.out, "{} requests were unsuccessful!", totals.invalid)?;
        }
        if totals.no_profile > 0 {
            writeln!(self.out, "{} items lacked profiling data!", totals.no_profile)?;
        }
        if !totals.overtime.is_empty() {
            writeln!(
                self.out,
                "{} widgets took more than {} to run:",
                totals.overtime.len(),
                time.format(time.limit())
            )?;
            for target in &totals.overtime {
                writeln!(self.out, "  {target}")?;
            }
        }

        self.averages(totals)?;
        self.percentiles(totals)
    }

    fn averages(&mut self, totals: &TotalsSnapshot) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{:<14}{:>14}{:>14}", "Average", "widget", "layout")?;

        for category in Category::ALL {
            if !self.profiling && is_profile_category(category) {
                continue;
            }
            let has_data = [TargetKind::Widget, TargetKind::Layout]
                .into_iter()
                .any(|kind| totals.average(kind, category).is_some());
            if !has_data && category != Category::Total {
                continue;
            }
            let widget = self.format_average(totals, TargetKind::Widget, category);
            let layout = self.format_average(totals, TargetKind::Layout, category);
            writeln!(self.out, "  {:<12}{widget:>14}{layout:>14}", category.label())?;
        }
        Ok(())
    }

    fn format_average(&self, totals: &TotalsSnapshot, kind: TargetKind, category: Category) -> String {
        let Some(value) = totals.average(kind, category) else {
            return NO_DATA.to_string();
        };
        match category {
            c if c.is_time() => self.units.time.format(value),
            Category::Speed => format!("{}/s", self.units.size.format(value)),
            Category::Size => self.units.size.format(value),
            _ => format!("{value:.1}"),
        }
    }

    fn percentiles(&mut self, totals: &TotalsSnapshot) -> io::Result<()> {
        let time = self.units.time;
        writeln!(self.out)?;
        writeln!(self.out, "Total time percentiles (p50 / p95 / p99)")?;
        for kind in [TargetKind::Widget, TargetKind::Layout] {
            let set = totals.latency(kind);
            let text = if set.has_data() {
                format!(
                    "{} / {} / {}",
                    time.format(time.normalize(set.p50())),
                    time.format(time.normalize(set.p95())),
                    time.format(time.normalize(set.p99())),
                )
            } else {
                NO_DATA.to_string()
            };
            writeln!(self.out, "  {:<12}{text}", kind.label())?;
        }
        Ok(())
    }
}

fn is_profile_category(category: Category) -> bool {
    matches!(
        category,
        Category::Action
            | Category::Read
            | Category::Render
            | Category::DbQueries
            | Category::DbTime
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
