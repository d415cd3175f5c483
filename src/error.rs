//! Relay error taxonomy and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::host::StoreError;

/// Detail used when the backend gave nothing better to report
pub const CONNECTION_ERROR_DETAIL: &str = "Server Connection Error";

/// Errors raised by the forwarding path and the access tool
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The user did not sign in through the accepted identity provider
    #[error("You are not registered through {provider}.")]
    IdentityRejected { provider: String },

    /// The broker answered 404 for this user
    #[error("User not found at {aggregator}.")]
    UserNotFound { aggregator: String, portal_url: String },

    /// The broker answered with any other non-200 status
    #[error("An error occurred while obtaining API key: {detail}")]
    BrokerFailure { status: StatusCode, detail: String },

    #[error("Token broker unreachable: {0}")]
    BrokerUnreachable(#[source] reqwest::Error),

    /// The chat backend failed, or no response was received at all
    #[error("{detail}")]
    Backend { status: StatusCode, detail: String },

    #[error("Failed to list models: {0}")]
    Catalog(String),

    #[error("Invalid chat payload: {0}")]
    InvalidPayload(String),

    #[error("Missing user identity")]
    Unauthenticated,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RelayError {
    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::IdentityRejected { .. } => StatusCode::FORBIDDEN,
            RelayError::UserNotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::BrokerFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::BrokerUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Backend { status, .. } => *status,
            RelayError::Catalog(_) => StatusCode::BAD_GATEWAY,
            RelayError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthenticated | RelayError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
            RelayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller; 404 from the broker also says where to log in
    pub fn detail(&self) -> String {
        match self {
            RelayError::UserNotFound { portal_url, .. } => {
                format!("{}\n{}", self, login_hint(portal_url))
            }
            other => other.to_string(),
        }
    }
}

/// Hint shown when the broker does not know the user yet
pub fn login_hint(portal_url: &str) -> String {
    format!("Please first login using OIDC at {}.", portal_url)
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}
