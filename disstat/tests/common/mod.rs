//! Shared fixtures: an in-process statistics service and a scripted host bot

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use disstat::{BackendKind, BotHost, ClientConfig};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const BOT_ID: u64 = 42;
pub const API_KEY: &str = "test-api-key-0123456789";

/// A request received by the mock service
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: Arc<AtomicU16>,
    body: Arc<Mutex<Value>>,
    delay_ms: Arc<AtomicU64>,
}

/// Statistics service stand-in answering every request with one status
pub struct MockService {
    pub base_url: String,
    state: MockState,
}

impl MockService {
    pub async fn start(status: u16) -> Self {
        let state = MockState {
            requests: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(status)),
            body: Arc::new(Mutex::new(Value::Null)),
            delay_ms: Arc::new(AtomicU64::new(0)),
        };

        let app = Router::new().fallback(record).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn set_body(&self, body: Value) {
        *self.state.body.lock() = body;
    }

    /// Hold every response for `delay` after recording the request
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Poll until `count` requests reached `path` or the timeout expires
    pub async fn wait_for(&self, path: &str, count: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let matching = self.requests_to(path);
            if matching.len() >= count || tokio::time::Instant::now() >= deadline {
                return matching;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = serde_json::from_slice::<Value>(&body).ok();

    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        authorization,
        body,
    });

    let delay_ms = state.delay_ms.load(Ordering::SeqCst);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    let body = state.body.lock().to_string();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Host bot with fixed counters and a readiness gate
pub struct MockHost {
    user_id: Option<u64>,
    shards: Option<u32>,
    closed: AtomicBool,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl MockHost {
    /// A host that is already ready
    pub fn ready() -> Self {
        let host = Self::gated();
        host.open();
        host
    }

    /// A host whose readiness waits until [`MockHost::open`]
    pub fn gated() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            user_id: Some(BOT_ID),
            shards: None,
            closed: AtomicBool::new(false),
            ready_tx,
            ready_rx,
        }
    }

    pub fn without_user(mut self) -> Self {
        self.user_id = None;
        self
    }

    pub fn with_shards(mut self, shards: u32) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn open(&self) {
        let _ = self.ready_tx.send(true);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BotHost for MockHost {
    fn current_user_id(&self) -> Option<u64> {
        self.user_id
    }

    fn shard_count(&self) -> Option<u32> {
        self.shards
    }

    fn user_count(&self) -> u32 {
        150
    }

    fn guild_count(&self) -> u32 {
        12
    }

    fn all_members_count(&self) -> u32 {
        480
    }

    fn api_latency(&self) -> Option<Duration> {
        Some(Duration::from_millis(85))
    }

    async fn wait_until_ready(&self) {
        let mut rx = self.ready_rx.clone();
        loop {
            let ready = *rx.borrow_and_update();
            if ready || rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn config_for(mock: &MockService, backend: BackendKind) -> ClientConfig {
    ClientConfig::new(API_KEY, backend)
        .with_base_url(mock.base_url.clone())
        .with_report_interval(Duration::from_secs(1))
}
