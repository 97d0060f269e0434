//! Core error types for Deedbook.
//!
//! This module defines transport-agnostic error types. Client-specific errors
//! (HTTP, websocket, JSON) are converted to these types by the cloud crate.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the deed register.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Remote operation failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Deed not found: {0}")]
    NotFound(String),

    #[error("Template error: {0}")]
    Template(String),
}

/// Transport-agnostic error type for calls to the hosted backend.
///
/// Every variant carries a display string so the cloud crate can map its
/// own error types without leaking them into the core.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The backend rejected or failed a query.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The session is missing, expired, or not allowed to touch the row.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// The connection could not be established or dropped mid-request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The realtime channel could not be joined.
    #[error("Subscription failed: {0}")]
    Subscription(String),
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown deed field '{0}'")]
    UnknownField(String),

    #[error("Invalid nature of document '{0}' (expected Original or Xerox)")]
    InvalidNature(String),

    #[error("Field '{key}' is not part of the '{deed_type}' template")]
    ExtraFieldNotAllowed { key: String, deed_type: String },
}
