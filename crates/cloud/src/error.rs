//! Error types for the cloud crate.

use deedbook_core::errors::{Error as CoreError, RemoteError, ValidationError};
use thiserror::Error;

/// Result type alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

/// Errors that can occur while talking to the hosted backend.
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Websocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// API error response from the backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Realtime channel join was refused or timed out
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid session)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CloudError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a subscription error
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }
}

impl From<CloudError> for CoreError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Http(e) => RemoteError::Transport(e.to_string()).into(),
            CloudError::WebSocket(e) => RemoteError::Transport(e.to_string()).into(),
            CloudError::Json(e) => RemoteError::RequestFailed(e.to_string()).into(),
            CloudError::Api { status, message } if status == 401 || status == 403 => {
                RemoteError::Unauthorized(message).into()
            }
            e @ CloudError::Api { .. } => RemoteError::RequestFailed(e.to_string()).into(),
            CloudError::Subscription(message) => RemoteError::Subscription(message).into(),
            CloudError::InvalidRequest(message) => ValidationError::InvalidInput(message).into(),
            CloudError::Auth(message) => RemoteError::Unauthorized(message).into(),
        }
    }
}
