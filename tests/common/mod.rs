//! Mock broker and backend on one local listener
//!
//! Tests queue responses before each call and inspect what was received.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use broker_relay::config::AppConfig;
use broker_relay::host::{MemoryUserStore, UserStore};
use broker_relay::{router, RelayState};

/// A canned upstream response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn sse(chunks: &[&str]) -> Self {
        let body = chunks
            .iter()
            .map(|c| format!("data: {}\n\n", c))
            .collect::<String>();
        Self {
            status: 200,
            content_type: "text/event-stream".to_string(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request the mock upstream saw
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Default)]
pub struct UpstreamState {
    pub broker_queue: VecDeque<MockResponse>,
    pub completion_queue: VecDeque<MockResponse>,
    pub models: Option<MockResponse>,
    pub received: Vec<Received>,
}

pub type SharedUpstream = Arc<Mutex<UpstreamState>>;

pub struct Upstream {
    pub addr: SocketAddr,
    pub state: SharedUpstream,
}

impl Upstream {
    pub fn queue_broker(&self, response: MockResponse) {
        self.state.lock().unwrap().broker_queue.push_back(response);
    }

    pub fn queue_completion(&self, response: MockResponse) {
        self.state.lock().unwrap().completion_queue.push_back(response);
    }

    pub fn set_models(&self, response: MockResponse) {
        self.state.lock().unwrap().models = Some(response);
    }

    pub fn received(&self, path: &str) -> Vec<Received> {
        self.state
            .lock()
            .unwrap()
            .received
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Relay config pointing both broker and backend at this mock
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.backend.url = format!("http://{}/v1", self.addr);
        config.backend.shared_token = Some("shared-token".to_string());
        config.broker.token_url = format!("http://{}/ensure_token", self.addr);
        config
    }
}

fn record(state: &SharedUpstream, path: &str, headers: HeaderMap, body: Value) {
    state.lock().unwrap().received.push(Received {
        path: path.to_string(),
        headers,
        body,
    });
}

fn render(mock: MockResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(mock.status).unwrap())
        .header("Content-Type", &mock.content_type);
    for (name, value) in &mock.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(mock.body)).unwrap()
}

async fn handle_ensure_token(
    State(state): State<SharedUpstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&state, "/ensure_token", headers, body);
    let mock = state
        .lock()
        .unwrap()
        .broker_queue
        .pop_front()
        .unwrap_or_else(|| MockResponse::json(200, json!({ "token": "tok_default" })));
    render(mock)
}

async fn handle_chat_completions(
    State(state): State<SharedUpstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&state, "/v1/chat/completions", headers, body);
    let mock = state
        .lock()
        .unwrap()
        .completion_queue
        .pop_front()
        .unwrap_or_else(|| MockResponse::json(200, json!({ "id": "chatcmpl-default" })));
    render(mock)
}

async fn handle_models(State(state): State<SharedUpstream>, headers: HeaderMap) -> Response {
    record(&state, "/v1/models", headers, Value::Null);
    let mock = state
        .lock()
        .unwrap()
        .models
        .clone()
        .unwrap_or_else(|| MockResponse::json(200, json!({ "data": [] })));
    render(mock)
}

/// Start the mock upstream on an ephemeral port
pub async fn start_upstream() -> Upstream {
    let state: SharedUpstream = Arc::new(Mutex::new(UpstreamState::default()));

    let app = Router::new()
        .route("/ensure_token", post(handle_ensure_token))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream { addr, state }
}

/// Serve the relay router for `config` and `store`, returning its base URL
pub async fn start_relay(config: AppConfig, store: Arc<dyn UserStore>) -> String {
    let state = RelayState {
        config: Arc::new(config),
        http_client: reqwest::Client::new(),
        store,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    format!("http://{}", addr)
}

pub fn store_with(users: impl IntoIterator<Item = broker_relay::host::UserRecord>) -> Arc<dyn UserStore> {
    Arc::new(MemoryUserStore::with_users(users))
}
