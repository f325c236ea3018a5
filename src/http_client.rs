use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use tracing::debug;

use crate::error::{BenchError, Result};

const AGENT: &str = concat!("widget-bench/", env!("CARGO_PKG_VERSION"));

/// Header that tells the application to answer in its AJAX (JSON) variant.
pub const AJAX_HEADER: &str = "X-Requested-With";
const AJAX_VALUE: &str = "XMLHttpRequest";

// ─── Exchange ────────────────────────────────────────────────────

/// Response headers. Keys are case-insensitive, the last value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::default();
        for (name, value) in map {
            headers.insert(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        headers
    }
}

/// Where the wall-clock time of one exchange went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    /// Name lookup plus connect, when the client can tell.
    pub connect: Option<Duration>,
    /// Until the response head arrived.
    pub start_transfer: Duration,
    /// Until the body was fully read.
    pub total: Duration,
}

impl Timing {
    pub fn transfer(&self) -> Duration {
        self.total.saturating_sub(self.start_transfer)
    }

    /// Time the server spent before the first byte, minus connection setup.
    /// Without a connect time this includes connection setup as well.
    pub fn server(&self) -> Duration {
        self.start_transfer
            .saturating_sub(self.connect.unwrap_or_default())
    }
}

/// The outcome of one HTTP call.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub timing: Timing,
}

impl Exchange {
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").filter(|v| !v.is_empty())
    }

    /// The body decoded as a JSON object, if it is one.
    pub fn json_object(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::from_slice(&self.body).ok()? {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

// ─── Client seam ─────────────────────────────────────────────────

/// The HTTP side of a run. Implementations keep a cookie session across
/// calls, so requests must be issued one at a time.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&mut self, url: &str) -> Result<Exchange>;

    async fn post(&mut self, url: &str, form: &[(&str, &str)]) -> Result<Exchange>;

    /// Toggle the AJAX marker header on subsequent requests.
    fn set_ajax(&mut self, on: bool);

    fn ajax(&self) -> bool;

    /// A fresh client with the same settings and an empty session.
    fn restart(&self) -> Result<Box<dyn HttpClient>>;
}

/// Settings shared by a client and every client restarted from it.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub referer: String,
    pub connect_timeout: Duration,
    pub verify_tls: bool,
}

/// [`HttpClient`] backed by `reqwest` with a cookie store.
pub struct ReqwestClient {
    http: reqwest::Client,
    settings: ClientSettings,
    ajax: bool,
}

impl ClientSettings {
    /// A reqwest client with the user agent, referer, connect timeout and
    /// TLS policy of these settings. `session` adds a cookie store.
    pub fn build(&self, session: bool) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
        if let Ok(referer) = HeaderValue::from_str(&self.referer) {
            headers.insert(REFERER, referer);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(session)
            .connect_timeout(self.connect_timeout)
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()
            .map_err(|e| BenchError::config(format!("cannot initialise HTTP client: {e}")))
    }
}

impl ReqwestClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        Ok(Self {
            http: settings.build(true)?,
            settings,
            ajax: false,
        })
    }

    async fn execute(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Exchange> {
        let request = if self.ajax {
            request.header(AJAX_HEADER, AJAX_VALUE)
        } else {
            request
        };

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| BenchError::transport(url, e))?;
        let start_transfer = started.elapsed();

        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| BenchError::transport(url, e))?;
        let total = started.elapsed();

        debug!(url, status, bytes = body.len(), total_ms = total.as_millis() as u64, "exchange");

        Ok(Exchange {
            url: url.to_string(),
            status,
            headers,
            body: body.to_vec(),
            timing: Timing {
                // reqwest does not expose connection phases.
                connect: None,
                start_transfer,
                total,
            },
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&mut self, url: &str) -> Result<Exchange> {
        if url.trim().is_empty() {
            return Err(BenchError::config("the URL parameter is mandatory"));
        }
        self.execute(url, self.http.get(url)).await
    }

    async fn post(&mut self, url: &str, form: &[(&str, &str)]) -> Result<Exchange> {
        if form.is_empty() {
            return Err(BenchError::config("at least one POST parameter must be defined"));
        }
        self.execute(url, self.http.post(url).form(form)).await
    }

    fn set_ajax(&mut self, on: bool) {
        self.ajax = on;
    }

    fn ajax(&self) -> bool {
        self.ajax
    }

    fn restart(&self) -> Result<Box<dyn HttpClient>> {
        Ok(Box::new(ReqwestClient::new(self.settings.clone())?))
    }
}
