//! Mock CPE backend
//!
//! Serves `/health` and `/cpes/:vendor/:product` from an in-memory table,
//! with knobs for busy responses, slow keys, fixed statuses and non-JSON
//! bodies. Every request to the cpes route is counted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cpe_diff::config::Mode;
use cpe_diff::RunConfig;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a mock backend answers
#[derive(Clone)]
pub struct Behavior {
    /// Document per `vendor|product`; unknown keys get `[]`
    pub documents: HashMap<String, Value>,
    /// Answer this many cpes requests with `busy_status` before serving
    pub busy_responses: usize,
    pub busy_status: StatusCode,
    /// Keys that stall long enough to trip the read timeout
    pub slow_keys: HashSet<String>,
    /// Keys that answer with a non-JSON body
    pub garbage_keys: HashSet<String>,
    /// Status used for every served document
    pub status: StatusCode,
    pub healthy: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            busy_responses: 0,
            busy_status: StatusCode::SERVICE_UNAVAILABLE,
            slow_keys: HashSet::new(),
            garbage_keys: HashSet::new(),
            status: StatusCode::OK,
            healthy: true,
        }
    }
}

impl Behavior {
    pub fn with_document(mut self, key: &str, document: Value) -> Self {
        self.documents.insert(key.to_string(), document);
        self
    }

    pub fn busy(mut self, responses: usize, status: StatusCode) -> Self {
        self.busy_responses = responses;
        self.busy_status = status;
        self
    }

    pub fn slow(mut self, key: &str) -> Self {
        self.slow_keys.insert(key.to_string());
        self
    }

    pub fn garbage(mut self, key: &str) -> Self {
        self.garbage_keys.insert(key.to_string());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }
}

pub struct MockState {
    behavior: Behavior,
    busy_left: AtomicUsize,
    hits: AtomicUsize,
    requested: std::sync::Mutex<Vec<String>>,
}

/// A running mock backend
pub struct MockBackend {
    pub url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start(behavior: Behavior) -> Self {
        let state = Arc::new(MockState {
            busy_left: AtomicUsize::new(behavior.busy_responses),
            behavior,
            hits: AtomicUsize::new(0),
            requested: std::sync::Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route("/health", get(health))
            .route("/cpes/:vendor/:product", get(cpes))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    /// Requests received on the cpes route, including busy ones
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Keys requested on the cpes route, in arrival order
    pub fn requested(&self) -> Vec<String> {
        self.state.requested.lock().unwrap().clone()
    }
}

async fn health(State(state): State<Arc<MockState>>) -> StatusCode {
    if state.behavior.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn cpes(
    State(state): State<Arc<MockState>>,
    Path((vendor, product)): Path<(String, String)>,
) -> Response {
    let key = format!("{vendor}|{product}");
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.requested.lock().unwrap().push(key.clone());

    let busy = state
        .busy_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if busy {
        return (state.behavior.busy_status, Json(json!({"message": "busy"}))).into_response();
    }

    if state.behavior.slow_keys.contains(&key) {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    if state.behavior.garbage_keys.contains(&key) {
        return (StatusCode::OK, "<html>not json</html>").into_response();
    }

    let document = state
        .behavior
        .documents
        .get(&key)
        .cloned()
        .unwrap_or_else(|| json!([]));
    (state.behavior.status, Json(document)).into_response()
}

/// A base URL nothing listens on
pub fn closed_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Write a key list and return a fast-running config pointing at it
pub fn test_config(dir: &FsPath, old_url: &str, new_url: &str, lines: &[&str]) -> RunConfig {
    let list_path = dir.join("cpe.txt");
    std::fs::write(&list_path, lines.join("\n")).unwrap();

    let mut config = RunConfig::new(Mode::Cpes)
        .with_backends(old_url, new_url)
        .with_paths(list_path, dir.join("diff").join("cpes"))
        .with_sample_rate(1.0)
        .with_workers(2)
        .with_seed(7);
    config.read_timeout = Duration::from_millis(300);
    config.retry = config
        .retry
        .clone()
        .with_initial_backoff(Duration::from_millis(20));
    config.health.interval = Duration::from_millis(10);
    config
}
