//! Route handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};

use super::RelayState;
use crate::access::{self, AccessContext};
use crate::catalog::{self, ModelEntry};
use crate::error::RelayError;
use crate::events::{ChannelEmitter, UiEvent};
use crate::forward::{self, Relayed};
use crate::host::UserRecord;

/// Header carrying the host's user id
pub const USER_ID_HEADER: &str = "x-openwebui-user-id";

const EVENT_BUFFER: usize = 16;

pub async fn health() -> &'static str {
    "OK"
}

pub async fn list_models(
    State(state): State<RelayState>,
) -> Result<Json<Vec<ModelEntry>>, RelayError> {
    let models = catalog::list_models(&state.http_client, &state.config.backend).await?;
    Ok(Json(models))
}

pub async fn chat_completions(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let result: Result<Relayed, RelayError> = async {
        let user = known_user(&state, &headers).await?;
        let Json(body) = body.map_err(|e| RelayError::InvalidPayload(e.body_text()))?;
        forward::pipe(&state.config, &state.http_client, &user, body).await
    }
    .await;

    match result {
        Ok(relayed) => relayed.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Run the access tool, streaming UI events as SSE and finishing with a `result` event
pub async fn enable_model_access(
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, RelayError> {
    let id = known_user(&state, &headers).await?.id;
    let (emitter, rx) = ChannelEmitter::channel(EVENT_BUFFER);
    let (result_tx, result_rx) = tokio::sync::oneshot::channel::<String>();

    tokio::spawn(async move {
        let ctx = AccessContext {
            config: &state.config,
            http: &state.http_client,
            store: state.store.as_ref(),
        };
        let text = access::enable_model_access(&ctx, &id, &emitter).await;
        if result_tx.send(text).is_err() {
            tracing::debug!("Client left before the tool finished");
        }
    });

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event: UiEvent| Event::default().json_data(event));

    let result = stream::once(async move {
        let text = result_rx.await.unwrap_or_default();
        Event::default()
            .event("result")
            .json_data(json!({ "result": text }))
    });

    Ok(Sse::new(events.chain(result)))
}

/// The caller named by the user header; missing header or unknown user is 401
async fn known_user(state: &RelayState, headers: &HeaderMap) -> Result<UserRecord, RelayError> {
    let id = user_id(headers)?;
    state
        .store
        .get_user(&id)
        .await?
        .ok_or(RelayError::UnknownUser(id))
}

fn user_id(headers: &HeaderMap) -> Result<String, RelayError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(RelayError::Unauthenticated)
}
