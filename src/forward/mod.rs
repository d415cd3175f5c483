//! Chat-completion forwarding: identity check, token exchange, upstream relay

mod payload;
mod relay;

pub use payload::{is_reasoning_model, normalize_logit_bias, ChatPayload};
pub use relay::{error_detail, send_chat_completion, vendor_headers, Relayed};

use serde_json::Value;
use tracing::Instrument;

use crate::broker::BrokerClient;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::host::UserRecord;
use crate::identity::ExternalUserKey;

/// Resolve the user's external key or reject with the provider message
pub fn require_external_key(
    user: &UserRecord,
    config: &AppConfig,
) -> Result<ExternalUserKey, RelayError> {
    ExternalUserKey::from_oauth_sub(user.oauth_sub.as_deref()).ok_or_else(|| {
        RelayError::IdentityRejected {
            provider: config.portal.provider_name.clone(),
        }
    })
}

/// Forward a caller's chat payload on behalf of `user`
///
/// Rejections (identity, malformed payload) happen before any network call.
/// Each invocation performs a fresh token exchange and one backend request.
pub async fn pipe(
    config: &AppConfig,
    http: &reqwest::Client,
    user: &UserRecord,
    body: Value,
) -> Result<Relayed, RelayError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("pipe", %request_id, user_id = %user.id);

    async move {
        let key = require_external_key(user, config)?;
        let payload = ChatPayload::from_value(body)?.prepare()?;
        tracing::info!("{}", summarize(&payload));

        let broker = BrokerClient::new(http.clone(), config.broker.clone());
        let token = broker.obtain_token(&key, &config.portal).await?;

        send_chat_completion(http, &config.backend, &token, payload).await
    }
    .instrument(span)
    .await
}

/// One-line request summary for logs
fn summarize(payload: &ChatPayload) -> String {
    let model = payload.model().unwrap_or("unknown");
    let msg_count = payload
        .as_map()
        .get("messages")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    let mut parts = vec![format!("model={}", model), format!("msgs={}", msg_count)];
    if payload.is_streaming() {
        parts.push("stream".to_string());
    }
    format!("→ {}", parts.join(" "))
}
