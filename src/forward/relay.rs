//! Upstream call and response relay

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::time::{Duration, Instant};

use super::payload::ChatPayload;
use crate::config::BackendConfig;
use crate::error::{RelayError, CONNECTION_ERROR_DETAIL};

/// Aggregator hosts that want attribution headers
const OPENROUTER_HOST: &str = "openrouter.ai";

/// What the backend sent back
pub enum Relayed {
    /// Buffered JSON body
    Json(Value),
    /// Buffered body that was not JSON
    Text(String),
    /// Event stream relayed as it arrives
    Stream(Response),
}

impl std::fmt::Debug for Relayed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relayed::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Relayed::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Relayed::Stream(r) => f.debug_tuple("Stream").field(&r.status()).finish(),
        }
    }
}

impl IntoResponse for Relayed {
    fn into_response(self) -> Response {
        match self {
            Relayed::Json(value) => Json(value).into_response(),
            Relayed::Text(text) => Json(Value::String(text)).into_response(),
            Relayed::Stream(response) => response,
        }
    }
}

/// Vendor headers the backend host expects on top of auth and content type
pub fn vendor_headers(base_url: &str) -> Vec<(&'static str, &'static str)> {
    if base_url.contains(OPENROUTER_HOST) {
        vec![
            ("HTTP-Referer", "https://openwebui.com/"),
            ("X-Title", "Open WebUI"),
        ]
    } else {
        Vec::new()
    }
}

/// POST an already-prepared payload to `{backend}/chat/completions`
pub async fn send_chat_completion(
    http: &reqwest::Client,
    backend: &BackendConfig,
    token: &str,
    payload: ChatPayload,
) -> Result<Relayed, RelayError> {
    let base_url = backend.base_url();
    let request_url = format!("{}/chat/completions", base_url);
    let start = Instant::now();

    let mut request = http
        .post(&request_url)
        .timeout(Duration::from_secs(backend.timeout_seconds))
        .header(header::CONTENT_TYPE, "application/json")
        .bearer_auth(token);
    for (name, value) in vendor_headers(base_url) {
        request = request.header(name, value);
    }

    let body = serde_json::to_vec(payload.as_map())
        .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;

    let response = match request.body(body).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(error = %e, url = %request_url, "Failed to reach backend");
            return Err(RelayError::Backend {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: CONNECTION_ERROR_DETAIL.to_string(),
            });
        }
    };

    let status = response.status();
    tracing::debug!(
        status = %status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Received response from backend"
    );

    if is_event_stream(response.headers()) {
        return Ok(Relayed::Stream(stream_response(response)));
    }

    buffered_response(response).await
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Read the whole body, then fail on a non-success status
async fn buffered_response(response: reqwest::Response) -> Result<Relayed, RelayError> {
    let status = response.status();

    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read backend response");
            return Err(RelayError::Backend {
                status,
                detail: CONNECTION_ERROR_DETAIL.to_string(),
            });
        }
    };

    let body = match serde_json::from_str::<Value>(&text) {
        Ok(json) => Relayed::Json(json),
        Err(e) => {
            tracing::debug!(error = %e, "Backend body is not JSON, keeping raw text");
            Relayed::Text(text)
        }
    };

    if status.is_success() {
        return Ok(body);
    }

    let detail = error_detail(&body).unwrap_or_else(|| CONNECTION_ERROR_DETAIL.to_string());
    tracing::error!(status = %status, detail = %detail, "Backend returned error response");
    Err(RelayError::Backend { status, detail })
}

/// Pull the most specific error text out of a failed backend body
pub fn error_detail(body: &Relayed) -> Option<String> {
    match body {
        Relayed::Json(json) => {
            let error = json.get("error")?;
            match error.get("message") {
                Some(Value::String(message)) => Some(message.clone()),
                Some(other) => Some(other.to_string()),
                None => match error {
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                },
            }
        }
        Relayed::Text(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

/// Relay an SSE body without buffering, keeping status and headers
///
/// The upstream response lives inside the body stream, so its connection
/// is released once the caller drains or drops the stream.
fn stream_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let headers = response.headers().clone();

    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        builder = builder.header(name, value);
    }

    let body = Body::from_stream(tracked(response.bytes_stream()));
    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build streaming response");
            (StatusCode::BAD_GATEWAY, "Failed to relay stream").into_response()
        }
    }
}

/// Logs how much was relayed when the upstream stream is released
struct StreamGuard {
    bytes: u64,
    chunks: u64,
    start: Instant,
}

impl StreamGuard {
    fn new() -> Self {
        Self {
            bytes: 0,
            chunks: 0,
            start: Instant::now(),
        }
    }

    fn record(&mut self, chunk: &Bytes) {
        self.bytes += chunk.len() as u64;
        self.chunks += 1;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        tracing::debug!(
            bytes = self.bytes,
            chunks = self.chunks,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Upstream stream released"
        );
    }
}

/// Count relayed chunks; the guard lives inside the returned stream and logs when it is dropped
fn tracked<S>(stream: S) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let mut guard = StreamGuard::new();
    stream.map(move |chunk| {
        match &chunk {
            Ok(bytes) => guard.record(bytes),
            Err(e) => tracing::error!(error = %e, "Error reading stream chunk"),
        }
        chunk
    })
}
