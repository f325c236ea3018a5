use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Instant;

use chrono::Local;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::BenchConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BenchError, Result};
use crate::http_client::Exchange;
use crate::layout::LayoutReader;
use crate::metrics::{Category, ItemOutcome, ItemWorkingSet, RunningTotals, TotalsSnapshot};
use crate::profiler::{Correlation, Correlator};
use crate::report::{ReportRenderer, ReportRow};
use crate::target::{Target, TargetKind, TargetTree};

/// Query parameter asking the application to render a widget.
pub const RENDER_MARKER: &str = "widget_load=true";

// ─── Options ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Operator-supplied query string added to every request.
    pub params: Option<String>,
    /// Allow the shape-probe / render request pair for widgets.
    pub shape_probe: bool,
    pub login_path: String,
}

impl EngineOptions {
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url()?,
            params: config.params.clone(),
            shape_probe: config.shape_probe,
            login_path: config.login_path.clone(),
        })
    }
}

/// What a finished traversal hands back.
pub struct EngineOutcome<W> {
    pub totals: TotalsSnapshot,
    pub dispatcher: Dispatcher,
    pub output: W,
}

type Traversal<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

// ─── Engine ──────────────────────────────────────────────────────

/// Walks a target tree one exchange at a time, folds the measurements and
/// streams report rows.
pub struct Engine<W: Write> {
    dispatcher: Dispatcher,
    correlator: Correlator,
    layouts: Box<dyn LayoutReader>,
    report: ReportRenderer<W>,
    options: EngineOptions,

    totals: RunningTotals,
    working: ItemWorkingSet,
    processed: HashSet<Target>,
    /// Fixed for the whole run once traversal starts.
    two_phase: bool,
}

impl<W: Write> Engine<W> {
    pub fn new(
        dispatcher: Dispatcher,
        correlator: Correlator,
        layouts: Box<dyn LayoutReader>,
        report: ReportRenderer<W>,
        options: EngineOptions,
    ) -> Self {
        Self {
            dispatcher,
            correlator,
            layouts,
            report,
            options,
            totals: RunningTotals::new(),
            working: ItemWorkingSet::new(),
            processed: HashSet::new(),
            two_phase: false,
        }
    }

    pub async fn run(mut self, tree: &TargetTree) -> Result<EngineOutcome<W>> {
        let started = Instant::now();

        // Two-phase requests kick in once the run contains a real widget
        // module; layout-only runs stay single-phase.
        self.two_phase = self.options.shape_probe && tree.has_widget_modules();

        info!(
            targets = tree.len(),
            two_phase = self.two_phase,
            profiling = self.correlator.is_enabled(),
            "traversal started"
        );

        self.report.header()?;
        self.traverse(tree).await?;

        let totals = self.totals.snapshot();
        self.report.summary(&totals, Local::now(), started.elapsed())?;

        info!(
            items = totals.items(),
            failed = totals.invalid,
            overtime = totals.overtime.len(),
            "traversal finished"
        );

        Ok(EngineOutcome {
            totals,
            dispatcher: self.dispatcher,
            output: self.report.into_inner(),
        })
    }

    fn traverse<'a>(&'a mut self, tree: &'a TargetTree) -> Traversal<'a> {
        Box::pin(async move {
            for (module, names) in tree.modules() {
                if names.is_empty() {
                    continue;
                }
                self.report.module_section(module)?;
                for name in names {
                    self.visit(&Target::new(module, name.as_str())).await?;
                }
            }
            Ok(())
        })
    }

    async fn visit(&mut self, target: &Target) -> Result<()> {
        // First visit wins; this also stops layouts that reference
        // themselves.
        if !self.processed.insert(target.clone()) {
            debug!(%target, "already processed, skipped");
            return Ok(());
        }

        self.measure(target)
            .await
            .map_err(|e| e.at_target(target))?;

        if target.is_layout() {
            let components = self.layouts.read_components(&target.name)?;
            let nested = TargetTree::from_targets(components);
            if !nested.is_empty() {
                self.report.layout_section(target)?;
                self.traverse(&nested).await?;
                self.report.header()?;
            }
        }
        Ok(())
    }

    async fn measure(&mut self, target: &Target) -> Result<()> {
        let kind = target.kind();
        let widget = kind == TargetKind::Widget;
        self.working.reset();

        let probe_valid = if widget && self.two_phase {
            Some(self.probe(target).await?)
        } else {
            None
        };

        let url = self.target_url(target, widget);
        let exchange = self.dispatcher.get(&url).await?.clone();
        self.check_redirect(&exchange)?;
        self.working.add_item_total(&exchange);

        // In two-phase mode the JSON shape was already checked by the probe.
        let require_json = widget && !self.two_phase;
        let mut valid = is_valid(&exchange, require_json) && probe_valid.unwrap_or(true);

        let mut no_profile = false;
        let profile = match self.correlator.correlate(&exchange).await? {
            Correlation::Sample(sample) => Some(sample),
            Correlation::Empty => {
                if valid {
                    valid = false;
                    no_profile = true;
                }
                None
            }
            Correlation::Disabled => None,
        };

        let units = self.dispatcher.units();
        let timing = exchange.timing;
        if let Some(total) = self.dispatcher.response_time() {
            self.working.set(Category::Total, total);
        }
        self.working.set(Category::Server, units.time.normalize(timing.server()));
        self.working.set(Category::Transfer, units.time.normalize(timing.transfer()));
        if let Some(connect) = timing.connect {
            self.working.set(Category::Connect, units.time.normalize(connect));
        }
        if let Some(size) = self.dispatcher.response_size() {
            self.working.set(Category::Size, size);
        }
        let speed = self.working.download_rate().map(|r| units.size.normalize(r));
        if let Some(speed) = speed {
            self.working.set(Category::Speed, speed);
        }
        if let Some(p) = &profile {
            self.working.set(Category::Action, units.time.scale_secs(p.action_time));
            self.working.set(Category::Read, units.time.scale_secs(p.read_time));
            self.working.set(Category::Render, units.time.scale_secs(p.render_time));
            self.working.set(Category::DbQueries, p.db_query_count as f64);
            self.working.set(Category::DbTime, units.time.scale_secs(p.db_query_time));
        }

        // ── Fold ────────────────────────────────────────────────
        for (category, value) in self.working.values() {
            self.totals.fold(kind, category, value);
        }
        self.totals.record_item(&ItemOutcome {
            target: target.clone(),
            status: exchange.status,
            valid,
            no_profile,
        });
        self.totals.record_latency(kind, timing.total);

        let time = self.working.get(Category::Total).unwrap_or_default();
        if widget && time > units.time.limit() {
            self.totals.mark_overtime(target);
        }

        debug!(
            %target,
            status = exchange.status,
            valid,
            exchanges = self.working.exchanges(),
            "item folded"
        );

        self.report.row(&ReportRow {
            target,
            status: exchange.status,
            valid,
            time,
            size: self.working.get(Category::Size).unwrap_or_default(),
            speed,
            profile,
        })?;

        self.working.reset();
        Ok(())
    }

    /// First half of a two-phase item: ask for the JSON variant to check its
    /// shape. Only the working set sees this exchange.
    async fn probe(&mut self, target: &Target) -> Result<bool> {
        let url = self.target_url(target, false);

        let restore = self.dispatcher.ajax();
        self.dispatcher.set_ajax(true);
        let result = self.dispatcher.get(&url).await.map(Exchange::clone);
        self.dispatcher.set_ajax(restore);

        let exchange = result?;
        self.check_redirect(&exchange)?;
        self.working.add_item_total(&exchange);

        let valid = is_valid(&exchange, true);
        debug!(%target, status = exchange.status, valid, "shape probe");
        Ok(valid)
    }

    fn target_url(&self, target: &Target, render_marker: bool) -> String {
        let mut url = format!("{}/{}", self.options.base_url, target);

        let mut query = Vec::new();
        if let Some(params) = self
            .options
            .params
            .as_deref()
            .map(|p| p.trim().trim_start_matches('?'))
            .filter(|p| !p.is_empty())
        {
            query.push(params);
        }
        if render_marker {
            query.push(RENDER_MARKER);
        }

        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    /// A JSON body pointing at the login page means the session is not
    /// authenticated and every measurement would be of the login wall.
    fn check_redirect(&self, exchange: &Exchange) -> Result<()> {
        let Some(body) = exchange.json_object() else {
            return Ok(());
        };
        let Some(redirect) = body.get("redirect").and_then(Value::as_str) else {
            return Ok(());
        };

        if same_path(redirect, &self.options.login_path) {
            return Err(BenchError::auth(format!(
                "{} redirected to the login page ({redirect})",
                exchange.url
            )));
        }
        Ok(())
    }
}

/// Content type present, status 200, non-empty body, and for AJAX responses
/// a JSON object.
fn is_valid(exchange: &Exchange, require_json: bool) -> bool {
    let basic = exchange.content_type().is_some()
        && exchange.status == 200
        && !exchange.body.is_empty();
    basic && (!require_json || exchange.json_object().is_some())
}

fn same_path(redirect: &str, login_path: &str) -> bool {
    let path = reqwest::Url::parse(redirect)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| redirect.to_string());
    path.trim_end_matches('/') == login_path.trim_end_matches('/')
}
