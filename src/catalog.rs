//! Model catalog listing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::BackendConfig;
use crate::error::RelayError;

/// Substrings identifying non-chat model families (embedding, audio, image generation)
pub const NON_CHAT_MODEL_MARKERS: &[&str] = &[
    "babbage",
    "dall-e",
    "davinci",
    "embedding",
    "tts",
    "whisper",
];

/// A model as offered to the host, with every backend field passed through
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `/models` answers with a bare list or an OpenAI-style `{data: [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelListResponse {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default)]
        data: Vec<Value>,
    },
}

impl ModelListResponse {
    fn into_models(self) -> Vec<Value> {
        match self {
            ModelListResponse::Bare(models) => models,
            ModelListResponse::Wrapped { data } => data,
        }
    }
}

pub fn is_chat_model(id: &str) -> bool {
    !NON_CHAT_MODEL_MARKERS.iter().any(|marker| id.contains(marker))
}

/// Keep chat models that have an id, filling in a display name
pub fn filter_models(models: Vec<Value>) -> Vec<ModelEntry> {
    models
        .into_iter()
        .filter_map(|model| {
            let Value::Object(mut fields) = model else {
                return None;
            };
            let id = match fields.remove("id") {
                Some(Value::String(id)) if !id.is_empty() => id,
                _ => return None,
            };
            if !is_chat_model(&id) {
                tracing::trace!(model = %id, "Skipping non-chat model");
                return None;
            }
            let name = match fields.remove("name") {
                Some(Value::String(name)) if !name.is_empty() => name,
                _ => id.clone(),
            };
            Some(ModelEntry {
                id,
                name,
                extra: fields,
            })
        })
        .collect()
}

/// Fetch and filter the backend catalog using the shared token
///
/// Without a shared token the catalog is empty and nothing is fetched.
pub async fn list_models(
    http: &reqwest::Client,
    backend: &BackendConfig,
) -> Result<Vec<ModelEntry>, RelayError> {
    let Some(token) = backend.shared_token() else {
        tracing::debug!("No shared token configured, model catalog is empty");
        return Ok(Vec::new());
    };

    let url = format!("{}/models", backend.base_url());
    let response = http
        .get(&url)
        .bearer_auth(token)
        .timeout(Duration::from_secs(backend.model_list_timeout_seconds))
        .send()
        .await
        .map_err(|e| RelayError::Catalog(format!("{} unreachable: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::Catalog(format!("{} returned {}: {}", url, status, body)));
    }

    let parsed: ModelListResponse = response
        .json()
        .await
        .map_err(|e| RelayError::Catalog(format!("{} sent an unexpected body: {}", url, e)))?;

    let raw = parsed.into_models();
    let total = raw.len();
    let models = filter_models(raw);
    tracing::debug!(total, kept = models.len(), "Fetched model catalog");

    Ok(models)
}
