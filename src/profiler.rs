use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BenchError, Result};
use crate::http_client::{ClientSettings, Exchange};

/// Application-level timings for one exchange, as reported by the
/// profiler. Times are in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileSample {
    pub action_time: f64,
    pub render_time: f64,
    pub read_time: f64,
    pub db_query_count: u64,
    pub db_query_time: f64,
}

/// Out-of-band profiling store, keyed by debug token.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// `Ok(None)` when the profiler has no sample for this token.
    async fn sample_for(&self, token: &str) -> Result<Option<ProfileSample>>;
}

/// Fetches samples from `<base><path>/<token>` as JSON.
pub struct HttpProfiler {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpProfiler {
    /// Uses the same TLS policy, timeout and user agent as the session
    /// client, without its cookie store.
    pub fn new(base_url: &str, path: &str, settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            http: settings.build(false)?,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), path),
        })
    }
}

#[async_trait]
impl Profiler for HttpProfiler {
    async fn sample_for(&self, token: &str) -> Result<Option<ProfileSample>> {
        let url = format!("{}/{token}", self.endpoint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BenchError::transport(&url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BenchError::transport(
                &url,
                format!("profiler answered {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BenchError::transport(&url, e))?;
        decode_sample(&body)
            .map_err(|e| BenchError::transport(&url, format!("malformed profile: {e}")))
    }
}

/// Empty bodies, `null` and `{}` carry no sample. A sample with no recorded
/// field would otherwise fold as all zeros.
fn decode_sample(body: &[u8]) -> serde_json::Result<Option<ProfileSample>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(body)? {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        value => serde_json::from_value(value).map(Some),
    }
}

/// What the correlator found for an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// Profiling is off for this run.
    Disabled,
    /// Profiling is on, but nothing was recorded for this exchange.
    Empty,
    Sample(ProfileSample),
}

/// Links exchanges to profiler samples via the debug-token header.
pub struct Correlator {
    profiler: Option<Box<dyn Profiler>>,
    token_header: String,
}

impl Correlator {
    pub fn disabled() -> Self {
        Self {
            profiler: None,
            token_header: String::new(),
        }
    }

    pub fn new(profiler: Box<dyn Profiler>, token_header: impl Into<String>) -> Self {
        Self {
            profiler: Some(profiler),
            token_header: token_header.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.profiler.is_some()
    }

    pub fn token<'a>(&self, exchange: &'a Exchange) -> Option<&'a str> {
        exchange
            .headers
            .get(&self.token_header)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Run-setup check: the first exchange must carry a debug token, or the
    /// profiler is not running on the application side.
    pub fn ensure_engaged(&self, first: &Exchange) -> Result<()> {
        if self.is_enabled() && self.token(first).is_none() {
            return Err(BenchError::config(format!(
                "profiler is not running ({} header missing), please turn off profiling",
                self.token_header
            )));
        }
        Ok(())
    }

    pub async fn correlate(&self, exchange: &Exchange) -> Result<Correlation> {
        let Some(profiler) = &self.profiler else {
            return Ok(Correlation::Disabled);
        };

        let Some(token) = self.token(exchange) else {
            warn!(url = %exchange.url, "no debug token on exchange");
            return Ok(Correlation::Empty);
        };

        match profiler.sample_for(token).await? {
            Some(sample) => Ok(Correlation::Sample(sample)),
            None => {
                debug!(token, "profiler returned no sample");
                Ok(Correlation::Empty)
            }
        }
    }
}
