use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{BenchError, Result};

// ─── Units ───────────────────────────────────────────────────────

/// How execution times are shown and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TimeUnit {
    #[default]
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Millis,
}

impl TimeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Millis => "ms",
        }
    }

    /// Overtime threshold, expressed in this unit.
    pub fn limit(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Millis => 1000.0,
        }
    }

    pub fn normalize(&self, d: Duration) -> f64 {
        self.scale_secs(d.as_secs_f64())
    }

    pub fn scale_secs(&self, secs: f64) -> f64 {
        match self {
            TimeUnit::Seconds => secs,
            TimeUnit::Millis => secs * 1000.0,
        }
    }

    pub fn format(&self, value: f64) -> String {
        match self {
            TimeUnit::Seconds => format!("{value:.2}s"),
            TimeUnit::Millis => format!("{value:.0}ms"),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s" => Ok(TimeUnit::Seconds),
            "ms" => Ok(TimeUnit::Millis),
            other => Err(BenchError::config(format!(
                "the time unit '{other}' is invalid, one of 's,ms' is expected"
            ))),
        }
    }
}

/// How response sizes are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SizeUnit {
    #[default]
    B,
    KB,
}

impl SizeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
        }
    }

    pub fn normalize(&self, bytes: f64) -> f64 {
        match self {
            SizeUnit::B => bytes,
            SizeUnit::KB => bytes / 1024.0,
        }
    }

    pub fn format(&self, value: f64) -> String {
        match self {
            SizeUnit::B => format!("{value:.0}B"),
            SizeUnit::KB => format!("{value:.2}KB"),
        }
    }
}

impl FromStr for SizeUnit {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "B" => Ok(SizeUnit::B),
            "KB" => Ok(SizeUnit::KB),
            other => Err(BenchError::config(format!(
                "the size unit '{other}' is invalid, one of 'B,KB' is expected"
            ))),
        }
    }
}

/// The unit pair every rendered number goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Units {
    pub time: TimeUnit,
    pub size: SizeUnit,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.time.suffix(), self.size.suffix())
    }
}

// ─── Benchmark configuration ─────────────────────────────────────

/// Run settings, read from an optional YAML file and then overridden from
/// the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Base URL of the benchmarked application.
    pub url: Option<String>,
    /// Extra query string sent with every request.
    pub params: Option<String>,
    /// Collect profiling samples through the debug token.
    pub profiling: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub time_unit: TimeUnit,
    pub size_unit: SizeUnit,
    /// When false, the local cache directory is emptied before the run.
    pub use_cache: bool,
    pub application: String,
    pub env: String,
    /// Restart the session in AJAX mode when a CSRF filter is configured.
    pub csrf: bool,
    /// Include layout pages when benchmarking the whole application.
    pub layouts: bool,
    /// Probe every widget for its JSON shape before the measured render.
    pub shape_probe: bool,
    /// Root of the application checkout.
    pub root: PathBuf,
    pub connect_timeout_secs: u64,
    pub verify_tls: bool,
    pub login_path: String,
    pub debug_token_header: String,
    pub profiler_path: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            url: None,
            params: None,
            profiling: false,
            username: None,
            password: None,
            time_unit: TimeUnit::Seconds,
            size_unit: SizeUnit::B,
            use_cache: true,
            application: "frontend".into(),
            env: "prod".into(),
            csrf: false,
            layouts: false,
            shape_probe: false,
            root: PathBuf::from("."),
            connect_timeout_secs: 30,
            verify_tls: true,
            login_path: "/login".into(),
            debug_token_header: "X-Debug-Token".into(),
            profiler_path: "/_profiler".into(),
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| BenchError::config(format!("invalid configuration file: {e}")))
    }

    /// Check the settings and return the parsed base URL.
    pub fn validate(&self) -> Result<Url> {
        let raw = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BenchError::config("the URL parameter is not defined"))?;

        let url = Url::parse(raw).map_err(|e| {
            BenchError::config(format!(
                "the value '{raw}' is an invalid URL ({e}), please specify it in prot://host format"
            ))
        })?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(BenchError::config(format!(
                "the value '{raw}' has no host, please specify it in prot://host format"
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(BenchError::config("connect_timeout_secs must be at least 1"));
        }
        Ok(url)
    }

    /// Base URL without its trailing slash, ready for `/<module>/<name>`.
    pub fn base_url(&self) -> Result<String> {
        let url = self.validate()?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    pub fn units(&self) -> Units {
        Units {
            time: self.time_unit,
            size: self.size_unit,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    fn app_dir(&self) -> PathBuf {
        self.root.join("apps").join(&self.application)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.app_dir().join("modules")
    }

    pub fn layouts_dir(&self) -> PathBuf {
        self.app_dir().join("config").join("pages")
    }

    pub fn filters_file(&self) -> PathBuf {
        self.app_dir().join("config").join("filters.yml")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}
