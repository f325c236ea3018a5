use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use widget_bench::config::{SizeUnit, TimeUnit};
use widget_bench::BenchConfig;

/// Benchmark the widgets and layout pages of a web application.
#[derive(Debug, Parser)]
#[command(name = "widget-bench", version)]
struct Cli {
    /// `*` for everything, `module/*` for one module, `module/name` for one
    /// widget (`pages/<name>` for a layout).
    #[arg(default_value = "*")]
    selection: String,

    /// YAML file with default settings.
    #[arg(short, long, env = "WIDGET_BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the application.
    #[arg(long, env = "WIDGET_BENCH_URL")]
    url: Option<String>,

    /// Query string appended to every request.
    #[arg(long, env = "WIDGET_BENCH_PARAMS")]
    params: Option<String>,

    #[arg(long, env = "WIDGET_BENCH_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "WIDGET_BENCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Collect profiler samples through the debug token header.
    #[arg(long, env = "WIDGET_BENCH_PROFILING")]
    profiling: Option<bool>,

    /// `s` or `ms`.
    #[arg(long, env = "WIDGET_BENCH_TIME_UNIT")]
    time_unit: Option<TimeUnit>,

    /// `B` or `KB`.
    #[arg(long, env = "WIDGET_BENCH_SIZE_UNIT")]
    size_unit: Option<SizeUnit>,

    /// Keep the application cache instead of clearing it first.
    #[arg(long, env = "WIDGET_BENCH_USE_CACHE")]
    use_cache: Option<bool>,

    #[arg(long, env = "WIDGET_BENCH_APPLICATION")]
    application: Option<String>,

    #[arg(long, env = "WIDGET_BENCH_ENV")]
    env: Option<String>,

    /// Bypass a CSRF filter by switching to AJAX requests.
    #[arg(long, env = "WIDGET_BENCH_CSRF")]
    csrf: Option<bool>,

    /// Include layout pages in `*` runs.
    #[arg(long, env = "WIDGET_BENCH_LAYOUTS")]
    layouts: Option<bool>,

    /// Probe each widget's JSON shape before the measured render request.
    #[arg(long, env = "WIDGET_BENCH_SHAPE_PROBE")]
    shape_probe: Option<bool>,

    /// Root of the application checkout.
    #[arg(long, env = "WIDGET_BENCH_ROOT")]
    root: Option<PathBuf>,

    #[arg(long, env = "WIDGET_BENCH_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    #[arg(long, env = "WIDGET_BENCH_VERIFY_TLS")]
    verify_tls: Option<bool>,
}

impl Cli {
    /// Layer command-line values over the file settings.
    fn apply(self, config: &mut BenchConfig) {
        if self.url.is_some() {
            config.url = self.url;
        }
        if self.params.is_some() {
            config.params = self.params;
        }
        if self.username.is_some() {
            config.username = self.username;
        }
        if self.password.is_some() {
            config.password = self.password;
        }
        set(&mut config.profiling, self.profiling);
        set(&mut config.time_unit, self.time_unit);
        set(&mut config.size_unit, self.size_unit);
        set(&mut config.use_cache, self.use_cache);
        set(&mut config.application, self.application);
        set(&mut config.env, self.env);
        set(&mut config.csrf, self.csrf);
        set(&mut config.layouts, self.layouts);
        set(&mut config.shape_probe, self.shape_probe);
        set(&mut config.root, self.root);
        set(&mut config.connect_timeout_secs, self.connect_timeout);
        set(&mut config.verify_tls, self.verify_tls);
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ── 1. Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "widget_bench=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── 2. Settings ──────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => BenchConfig::default(),
    };
    let selection = cli.selection.clone();
    cli.apply(&mut config);

    // ── 3. Benchmark ─────────────────────────────────────────────
    let summary = widget_bench::run(&config, &selection, io::stdout().lock()).await?;
    if summary.totals.invalid > 0 {
        tracing::warn!(failed = summary.totals.invalid, "some requests were unsuccessful");
    }
    Ok(())
}
