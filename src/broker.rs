//! Credential exchange against the token broker

use axum::http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{BrokerConfig, PortalConfig};
use crate::error::RelayError;
use crate::identity::ExternalUserKey;

/// Body posted to the broker's ensure-token endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EnsureTokenRequest<'a> {
    pub oidc_user_id: &'a str,
    pub token_name: &'a str,
    pub token_group: &'a str,
}

#[derive(Debug, Deserialize)]
struct EnsureTokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// What the broker answered
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeBody {
    /// JSON body of a 200; `None` when it carried no `token` field
    Token(Option<String>),
    /// Any non-JSON or non-200 body, kept verbatim
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenExchange {
    pub status: StatusCode,
    pub body: ExchangeBody,
}

impl TokenExchange {
    /// Apply the broker failure policy: 200 yields the token, 404 is a distinct error
    pub fn into_token(self, portal: &PortalConfig) -> Result<String, RelayError> {
        match (self.status, self.body) {
            (StatusCode::OK, ExchangeBody::Token(Some(token))) => Ok(token),
            (StatusCode::OK, body) => Err(RelayError::BrokerFailure {
                status: StatusCode::OK,
                detail: format!("broker response carried no token: {}", describe(&body)),
            }),
            (StatusCode::NOT_FOUND, _) => Err(RelayError::UserNotFound {
                aggregator: portal.aggregator_name.clone(),
                portal_url: portal.url.clone(),
            }),
            (status, body) => Err(RelayError::BrokerFailure {
                status,
                detail: describe(&body),
            }),
        }
    }
}

fn describe(body: &ExchangeBody) -> String {
    match body {
        ExchangeBody::Token(Some(_)) => "[token]".to_string(),
        ExchangeBody::Token(None) => "null".to_string(),
        ExchangeBody::Raw(text) => text.clone(),
    }
}

/// Issues one fresh exchange per call, no caching
#[derive(Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    config: BrokerConfig,
}

impl BrokerClient {
    pub fn new(http: reqwest::Client, config: BrokerConfig) -> Self {
        Self { http, config }
    }

    /// POST the user key to the broker and return its raw answer
    pub async fn exchange(&self, key: &ExternalUserKey) -> Result<TokenExchange, RelayError> {
        let request = EnsureTokenRequest {
            oidc_user_id: key.as_str(),
            token_name: &self.config.token_name,
            token_group: &self.config.token_group,
        };

        tracing::debug!(
            user_key = %key,
            token_name = %self.config.token_name,
            token_group = %self.config.token_group,
            "Requesting API token from broker"
        );

        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&request)
            .send()
            .await
            .map_err(RelayError::BrokerUnreachable)?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.to_lowercase().starts_with("application/json"))
            .unwrap_or(false);

        let text = response.text().await.map_err(RelayError::BrokerUnreachable)?;
        // Only a 200 carries a token; any other body is kept verbatim as error detail
        let body = if is_json && status == StatusCode::OK {
            match serde_json::from_str::<EnsureTokenResponse>(&text) {
                Ok(parsed) => ExchangeBody::Token(parsed.token),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker sent unparsable JSON");
                    ExchangeBody::Raw(text)
                }
            }
        } else {
            ExchangeBody::Raw(text)
        };

        tracing::debug!(status = %status, "Broker answered");
        Ok(TokenExchange { status, body })
    }

    /// Exchange and apply the failure policy in one step
    pub async fn obtain_token(
        &self,
        key: &ExternalUserKey,
        portal: &PortalConfig,
    ) -> Result<String, RelayError> {
        self.exchange(key).await?.into_token(portal)
    }
}
