use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::Local;
use tracing::{info, warn};

use crate::auth::sign_in;
use crate::cache::clear_cache;
use crate::config::BenchConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::{Engine, EngineOptions};
use crate::error::{BenchError, Result};
use crate::http_client::{ClientSettings, HttpClient, ReqwestClient};
use crate::layout::XmlLayoutReader;
use crate::metrics::TotalsSnapshot;
use crate::profiler::{Correlator, HttpProfiler};
use crate::report::ReportRenderer;
use crate::target::{Discoverer, FsTargetSource, Selection};

/// Result of a finished run.
pub struct RunSummary<W> {
    pub totals: TotalsSnapshot,
    pub output: W,
}

/// Run a full benchmark with the production HTTP client.
pub async fn run<W: Write>(config: &BenchConfig, selection: &str, out: W) -> Result<RunSummary<W>> {
    let client = ReqwestClient::new(client_settings(config)?)?;
    run_with_client(config, selection, Box::new(client), out).await
}

/// Run a full benchmark over `client`: discovery, session setup, the
/// traversal and the summary.
pub async fn run_with_client<W: Write>(
    config: &BenchConfig,
    selection: &str,
    client: Box<dyn HttpClient>,
    out: W,
) -> Result<RunSummary<W>> {
    // ── 1. Validate settings ─────────────────────────────────────
    let options = EngineOptions::from_config(config)?;
    let selection: Selection = selection.parse()?;
    info!(
        url = %options.base_url,
        application = %config.application,
        env = %config.env,
        units = %config.units(),
        "benchmark settings"
    );

    // ── 2. Discover targets ──────────────────────────────────────
    let source = FsTargetSource::new(config.modules_dir(), config.layouts_dir());
    let tree = Discoverer::new(&source, config.layouts).discover(&selection)?;
    info!(?selection, targets = tree.len(), "targets discovered");

    // ── 3. Cold cache ────────────────────────────────────────────
    if !config.use_cache {
        clear_cache(&config.cache_dir())?;
    }

    // ── 4. Session ───────────────────────────────────────────────
    let units = config.units();
    let mut dispatcher = Dispatcher::new(client, units);
    let mut report = ReportRenderer::new(out, units, config.profiling);
    report.banner(Local::now(), &options.base_url)?;

    let correlator = if config.profiling {
        let correlator = Correlator::new(
            Box::new(HttpProfiler::new(
                &options.base_url,
                &config.profiler_path,
                &client_settings(config)?,
            )?),
            config.debug_token_header.as_str(),
        );
        info!(url = %options.base_url, "checking the profiler");
        let first = dispatcher.get(&options.base_url).await?;
        correlator.ensure_engaged(first)?;
        correlator
    } else {
        Correlator::disabled()
    };

    if config.csrf && csrf_filter_enabled(&config.filters_file())? {
        info!("CSRF filter found, switching to AJAX requests");
        dispatcher = dispatcher.restart()?;
        dispatcher.set_ajax(true);
    }

    if let Some((username, password)) = config.credentials() {
        sign_in(
            &mut dispatcher,
            &options.base_url,
            &config.login_path,
            username,
            password,
        )
        .await?;
    }

    // ── 5. Traverse ──────────────────────────────────────────────
    let engine = Engine::new(
        dispatcher,
        correlator,
        Box::new(XmlLayoutReader::new(config.layouts_dir())),
        report,
        options,
    );
    let outcome = engine.run(&tree).await?;
    let exchanges = outcome.dispatcher.close();
    info!(items = outcome.totals.items(), exchanges, "benchmark finished");

    Ok(RunSummary {
        totals: outcome.totals,
        output: outcome.output,
    })
}

/// Settings shared by the session client and the profiler client.
fn client_settings(config: &BenchConfig) -> Result<ClientSettings> {
    Ok(ClientSettings {
        referer: config.base_url()?,
        connect_timeout: config.connect_timeout(),
        verify_tls: config.verify_tls,
    })
}

/// True when the application's `filters.yml` declares a top-level `csrf`
/// filter. A missing file declares nothing.
pub fn csrf_filter_enabled(path: &Path) -> Result<bool> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "filters file not found, CSRF bypass skipped");
            return Ok(false);
        }
        Err(e) => return Err(BenchError::io(path, e)),
    };

    let filters: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| {
        BenchError::config(format!("invalid filters file {}: {e}", path.display()))
    })?;
    Ok(filters
        .as_mapping()
        .is_some_and(|m| m.contains_key("csrf")))
}
