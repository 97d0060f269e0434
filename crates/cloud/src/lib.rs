//! Deedbook Cloud - client for the hosted deed backend.
//!
//! This crate provides the production implementations of the collaborator
//! traits defined in `deedbook-core`:
//! - [`DeedbookClient`]: REST access to the `deeds` table
//! - [`SessionAuth`]: email/password sessions and identity changes
//! - [`RealtimeFeed`]: row-change notifications over the realtime socket

mod auth;
mod client;
mod error;
mod realtime;
mod types;

pub use auth::SessionAuth;
pub use client::DeedbookClient;
pub use error::{CloudError, Result};
pub use realtime::RealtimeFeed;
pub use types::{ApiErrorResponse, AuthUser, Session};
