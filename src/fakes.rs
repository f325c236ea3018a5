//! In-memory stand-ins for the HTTP client, the profiler and the layout
//! reader, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BenchError, Result};
use crate::http_client::{Exchange, Headers, HttpClient, Timing};
use crate::layout::LayoutReader;
use crate::profiler::{ProfileSample, Profiler};
use crate::target::Target;

/// A canned response.
#[derive(Debug, Clone)]
pub struct FakeResponse {
    status: u16,
    content_type: Option<&'static str>,
    body: Vec<u8>,
    timing: Timing,
    token: Option<String>,
    fail: bool,
}

impl FakeResponse {
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn without_content_type(mut self) -> Self {
        self.content_type = None;
        self
    }

    pub fn with_total(mut self, total: Duration) -> Self {
        self.timing.start_transfer = total.mul_f64(0.8);
        self.timing.total = total;
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn into_exchange(self, url: &str) -> Exchange {
        let mut headers = Headers::default();
        if let Some(content_type) = self.content_type {
            headers.insert("Content-Type", content_type);
        }
        if let Some(token) = self.token {
            headers.insert("X-Debug-Token", token);
        }
        Exchange {
            url: url.to_string(),
            status: self.status,
            headers,
            body: self.body,
            timing: self.timing,
        }
    }
}

/// One request seen by [`FakeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: &'static str,
    /// Path plus query, e.g. `/users/edit?widget_load=true`.
    pub path: String,
    pub ajax: bool,
}

#[derive(Default)]
struct State {
    routes: HashMap<String, FakeResponse>,
    seen: Vec<SeenRequest>,
    restarts: usize,
}

/// Scripted [`HttpClient`]. Clones share routes and the request log, so a
/// test can keep one handle while the engine owns another.
#[derive(Clone, Default)]
pub struct FakeClient {
    state: Arc<Mutex<State>>,
    ajax: bool,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(body: &str) -> FakeResponse {
        FakeResponse {
            status: 200,
            content_type: Some("application/json"),
            body: body.as_bytes().to_vec(),
            timing: Timing {
                connect: Some(Duration::from_millis(2)),
                start_transfer: Duration::from_millis(80),
                total: Duration::from_millis(100),
            },
            token: None,
            fail: false,
        }
    }

    /// A response that never arrives: the client reports a transport error.
    pub fn failing() -> FakeResponse {
        FakeResponse {
            fail: true,
            ..Self::json("")
        }
    }

    pub fn html(body: &str) -> FakeResponse {
        FakeResponse {
            content_type: Some("text/html; charset=utf-8"),
            ..Self::json(body)
        }
    }

    /// Serve `response` for `path` (path plus query string).
    pub fn route(&self, path: &str, response: FakeResponse) {
        self.state.lock().routes.insert(path.to_string(), response);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().seen.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    pub fn restarts(&self) -> usize {
        self.state.lock().restarts
    }

    fn respond(&self, method: &'static str, url: &str) -> Result<Exchange> {
        let parsed = reqwest::Url::parse(url).map_err(|e| BenchError::transport(url, e))?;
        let path = match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        };

        let mut state = self.state.lock();
        state.seen.push(SeenRequest {
            method,
            path: path.clone(),
            ajax: self.ajax,
        });
        let response = state
            .routes
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Self::json(r#"{"ok":true}"#));
        if response.fail {
            return Err(BenchError::transport(url, "connection reset by peer"));
        }
        Ok(response.into_exchange(url))
    }
}

#[async_trait]
impl HttpClient for FakeClient {
    async fn get(&mut self, url: &str) -> Result<Exchange> {
        self.respond("GET", url)
    }

    async fn post(&mut self, url: &str, _form: &[(&str, &str)]) -> Result<Exchange> {
        self.respond("POST", url)
    }

    fn set_ajax(&mut self, on: bool) {
        self.ajax = on;
    }

    fn ajax(&self) -> bool {
        self.ajax
    }

    fn restart(&self) -> Result<Box<dyn HttpClient>> {
        self.state.lock().restarts += 1;
        Ok(Box::new(FakeClient {
            state: self.state.clone(),
            ajax: false,
        }))
    }
}

/// Profiler answering from a fixed token table; unknown tokens have no
/// sample.
#[derive(Default)]
pub struct StaticProfiler {
    samples: HashMap<String, Option<ProfileSample>>,
}

impl StaticProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &str, sample: Option<ProfileSample>) -> Self {
        self.samples.insert(token.to_string(), sample);
        self
    }
}

#[async_trait]
impl Profiler for StaticProfiler {
    async fn sample_for(&self, token: &str) -> Result<Option<ProfileSample>> {
        Ok(self.samples.get(token).copied().flatten())
    }
}

/// Layout reader backed by a map of layout name to components.
#[derive(Default)]
pub struct StaticLayouts(HashMap<String, Vec<Target>>);

impl StaticLayouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layout: &str, components: &[(&str, &str)]) -> Self {
        self.0.insert(
            layout.to_string(),
            components.iter().map(|(m, n)| Target::new(*m, *n)).collect(),
        );
        self
    }
}

impl LayoutReader for StaticLayouts {
    fn read_components(&self, layout: &str) -> Result<Vec<Target>> {
        self.0.get(layout).cloned().ok_or_else(|| BenchError::Layout {
            layout: layout.to_string(),
            message: "no such layout".into(),
        })
    }
}
