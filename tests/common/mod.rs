//! A small widget application served by axum on an ephemeral port, plus the
//! checkout directory the benchmark discovers its targets from.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path as UrlPath, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self as axum_mw, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use widget_bench::BenchConfig;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";
const SESSION_COOKIE: &str = "session=signed-in";

/// Widgets of this module answer with a login redirect unless the session
/// is signed in.
pub const SECURE_MODULE: &str = "secure";

// ─── Shared state ────────────────────────────────────────────────

#[derive(Default)]
pub struct AppState {
    tokens: AtomicU64,
    profiles: Mutex<HashMap<String, Value>>,
    /// Paths whose exchanges get a token but no stored profile.
    unprofiled: Mutex<HashSet<String>>,
    /// `(path with query, ajax header present)` per request, in order.
    hits: Mutex<Vec<(String, bool)>>,
}

// ─── Middleware ──────────────────────────────────────────────────

/// Stamps every response with a fresh debug token and stores a profile
/// sample under it, the way a profiling toolbar would.
async fn debug_token_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| path.clone());
    let ajax = req.headers().contains_key("x-requested-with");

    if path.starts_with("/_profiler") {
        return next.run(req).await;
    }
    state.hits.lock().push((path_and_query, ajax));

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    let token = format!("tok{}", state.tokens.fetch_add(1, Ordering::Relaxed));
    if let Ok(val) = token.parse() {
        response.headers_mut().insert("X-Debug-Token", val);
    }

    if !state.unprofiled.lock().contains(&path) {
        state.profiles.lock().insert(
            token,
            json!({
                "action_time": elapsed.as_secs_f64() / 2.0,
                "render_time": elapsed.as_secs_f64() / 4.0,
                "read_time": 0.0,
                "db_query_count": 3,
                "db_query_time": 0.001,
            }),
        );
    }
    response
}

// ─── Handlers ────────────────────────────────────────────────────

async fn home() -> Html<&'static str> {
    Html("<html><body>home</body></html>")
}

async fn layout(UrlPath(name): UrlPath<String>) -> Html<String> {
    Html(format!("<html><body>layout {name}</body></html>"))
}

#[derive(Debug, Deserialize)]
struct SignIn {
    #[serde(rename = "signin[username]")]
    username: String,
    #[serde(rename = "signin[password]")]
    password: String,
}

async fn login(Form(form): Form<SignIn>) -> Response {
    if form.username == USERNAME && form.password == PASSWORD {
        (
            [(header::SET_COOKIE, format!("{SESSION_COOKIE}; Path=/"))],
            Json(json!({ "success": true })),
        )
            .into_response()
    } else {
        Json(json!({ "success": false, "message": "Invalid credentials" })).into_response()
    }
}

async fn widget(
    UrlPath((module, name)): UrlPath<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if module == SECURE_MODULE && !signed_in(&headers) {
        return Json(json!({ "redirect": "/login" })).into_response();
    }
    if name == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, Html("fatal error")).into_response();
    }

    if query.get("widget_load").map(String::as_str) == Some("true") {
        return Json(json!({
            "widget": format!("{module}/{name}"),
            "html": format!("<div class=\"widget\">{module}/{name}</div>"),
        }))
        .into_response();
    }
    if headers.contains_key("x-requested-with") {
        return Json(json!({ "widget": format!("{module}/{name}"), "rows": [] })).into_response();
    }
    Html("<html><body>full page</body></html>").into_response()
}

async fn profile(
    State(state): State<Arc<AppState>>,
    UrlPath(token): UrlPath<String>,
) -> Response {
    match state.profiles.lock().get(&token) {
        Some(sample) => Json(sample.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn signed_in(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .any(|c| c.trim() == SESSION_COOKIE)
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/login", post(login))
        .route("/pages/:name", get(layout))
        .route("/_profiler/:token", get(profile))
        .route("/:module/:name", get(widget))
        .layer(axum_mw::from_fn_with_state(state.clone(), debug_token_middleware))
        .with_state(state)
}

// ─── Test harness ────────────────────────────────────────────────

/// A running application and its checkout directory.
pub struct FakeApp {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    dir: tempfile::TempDir,
}

impl FakeApp {
    pub async fn start() -> Self {
        let state = Arc::new(AppState::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn app_dir(&self) -> PathBuf {
        self.root().join("apps").join("frontend")
    }

    /// Declare a widget definition in the checkout.
    pub fn widget(&self, module: &str, name: &str) -> &Self {
        let dir = self.app_dir().join("modules").join(module).join("config");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.xml")), "<view type=\"list\"/>").unwrap();
        self
    }

    /// Declare a layout page composed of `components`.
    pub fn layout(&self, name: &str, components: &[(&str, &str)]) -> &Self {
        let dir = self.app_dir().join("config").join("pages");
        fs::create_dir_all(&dir).unwrap();
        let body: String = components
            .iter()
            .map(|(m, n)| format!("  <i:component module=\"{m}\" name=\"{n}\"/>\n"))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?>\n<i:view xmlns:i=\"urn:layout\">\n{body}</i:view>\n"
        );
        fs::write(dir.join(format!("{name}.xml")), xml).unwrap();
        self
    }

    /// Keep profiles of `path` out of the profiler store.
    pub fn without_profile(&self, path: &str) -> &Self {
        self.state.unprofiled.lock().insert(path.to_string());
        self
    }

    pub fn config(&self) -> BenchConfig {
        let pages = self.app_dir().join("config").join("pages");
        fs::create_dir_all(pages).unwrap();
        BenchConfig {
            url: Some(format!("http://{}/", self.addr)),
            root: self.root().to_path_buf(),
            ..BenchConfig::default()
        }
    }

    pub fn hits(&self) -> Vec<(String, bool)> {
        self.state.hits.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.hits().into_iter().map(|(p, _)| p).collect()
    }
}
