//! Interactive "enable model access" tool
//!
//! Runs the same identity check and token exchange as the forwarding path,
//! then stores a direct connection to the backend in the user's UI settings
//! so the host can talk to the backend with the user's own token.
//!
//! Progress is reported on the host's UI channel; the returned text is what
//! the host relays to the end user.

mod settings;

pub use settings::{
    ConnectionConfig, DirectConnections, UiSettingsPatch, DIRECT_CONNECTIONS_KEY,
};

use tracing::Instrument;

use crate::broker::BrokerClient;
use crate::config::AppConfig;
use crate::error::{login_hint, RelayError};
use crate::events::{EventEmitter, NotificationLevel, UiEvent};
use crate::forward::require_external_key;
use crate::host::UserStore;

pub const ADMIN_HINT: &str = "Please contact administrator for help.";

/// Steps the tool reports while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPhase {
    Validating,
    ObtainingToken,
    Configuring,
    Done,
}

impl AccessPhase {
    pub fn description(self) -> &'static str {
        match self {
            AccessPhase::Validating => "Enabling model access",
            AccessPhase::ObtainingToken => "Obtaining API key",
            AccessPhase::Configuring => "Configuring direct connection",
            AccessPhase::Done => "API Key configured",
        }
    }

    fn event(self) -> UiEvent {
        UiEvent::status(self.description(), self == AccessPhase::Done)
    }
}

/// Result of a run that did not hit an unexpected error
#[derive(Debug, Clone, PartialEq)]
enum AccessOutcome {
    Configured,
    Rejected { message: String, hint: String },
}

/// Explicit dependencies of the tool
pub struct AccessContext<'a> {
    pub config: &'a AppConfig,
    pub http: &'a reqwest::Client,
    pub store: &'a dyn UserStore,
}

/// Enable model access for `user_id`, returning the text for the end user
pub async fn enable_model_access(
    ctx: &AccessContext<'_>,
    user_id: &str,
    emitter: &dyn EventEmitter,
) -> String {
    let span = tracing::info_span!("enable_model_access", user_id = %user_id);

    async move {
        emitter.emit(AccessPhase::Validating.event()).await;

        match run(ctx, user_id, emitter).await {
            Ok(AccessOutcome::Configured) => {
                emitter
                    .emit(UiEvent::notification(NotificationLevel::Success, "Operation completed."))
                    .await;
                emitter.emit(AccessPhase::Done.event()).await;
                tracing::info!("Direct connection configured");
                format!(
                    "✅ Please **refresh the page** to access newly enabled models.\nRemember to top-up credit balance at {}.",
                    ctx.config.portal.url
                )
            }
            Ok(AccessOutcome::Rejected { message, hint }) => {
                tracing::warn!(reason = %message, "Model access not enabled");
                emitter
                    .emit(UiEvent::notification(NotificationLevel::Warning, hint.clone()))
                    .await;
                emitter.emit(UiEvent::status(message.clone(), true)).await;
                format!("❗ **{}**\n{}", message, hint)
            }
            Err(e) => {
                tracing::error!(error = %e, "Enabling model access failed");
                emitter
                    .emit(UiEvent::notification(NotificationLevel::Warning, ADMIN_HINT))
                    .await;
                emitter
                    .emit(UiEvent::status(format!("An error occurred: {}", e), true))
                    .await;
                format!("Tell the user: {}", e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(
    ctx: &AccessContext<'_>,
    user_id: &str,
    emitter: &dyn EventEmitter,
) -> Result<AccessOutcome, RelayError> {
    let user = ctx
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| RelayError::UnknownUser(user_id.to_string()))?;

    let key = match require_external_key(&user, ctx.config) {
        Ok(key) => key,
        Err(e) => return Ok(rejected(e.to_string(), ADMIN_HINT)),
    };

    emitter.emit(AccessPhase::ObtainingToken.event()).await;
    let broker = BrokerClient::new(ctx.http.clone(), ctx.config.broker.clone());
    let token = match broker.exchange(&key).await?.into_token(&ctx.config.portal) {
        Ok(token) => token,
        Err(RelayError::UserNotFound { aggregator, portal_url }) => {
            return Ok(rejected(
                format!("User not found at {}.", aggregator),
                login_hint(&portal_url),
            ))
        }
        Err(e @ RelayError::BrokerFailure { .. }) => return Ok(rejected(e.to_string(), ADMIN_HINT)),
        Err(e) => return Err(e),
    };

    emitter.emit(AccessPhase::Configuring.event()).await;
    let patch = UiSettingsPatch::new(DirectConnections::single(
        ctx.config.backend.base_url(),
        token,
    ));
    let update = patch
        .into_settings_update(user.ui_settings())
        .map_err(crate::host::StoreError::from)?;
    ctx.store.update_user_settings(&user.id, update).await?;

    Ok(AccessOutcome::Configured)
}

fn rejected(message: String, hint: impl Into<String>) -> AccessOutcome {
    AccessOutcome::Rejected {
        message,
        hint: hint.into(),
    }
}
