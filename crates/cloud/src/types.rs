//! Wire types for the hosted backend's REST, auth, and realtime endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// REST
// ─────────────────────────────────────────────────────────────────────────────

/// Error body returned by the REST and auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default, alias = "msg", alias = "error_description")]
    pub message: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ApiErrorResponse {
    pub fn describe(&self) -> Option<String> {
        let message = self.message.as_deref()?;
        let mut text = match &self.code {
            Some(Value::String(code)) => format!("{}: {}", code, message),
            Some(Value::Number(code)) => format!("{}: {}", code, message),
            _ => message.to_string(),
        };
        if let Some(hint) = &self.hint {
            text.push_str(&format!(" ({})", hint));
        }
        Some(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

/// The authenticated user as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Password sign-in request body.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordGrantRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

// ─────────────────────────────────────────────────────────────────────────────
// Realtime (Phoenix channels)
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope of every message on the realtime socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Payload of a `phx_reply`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

/// Payload of a `postgres_changes` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChangesPayload {
    pub data: PostgresChange,
}

/// One row change.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}
