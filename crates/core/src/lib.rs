//! Deedbook Core - Domain entities, the live deed table, and collaborator traits.
//!
//! This crate contains the register logic for Deedbook. It is transport
//! agnostic and defines traits that are implemented by the `cloud` crate.

pub mod constants;
pub mod deeds;
pub mod errors;
pub mod notices;
pub mod table;
pub mod templates;

// Re-export the types front ends touch most
pub use deeds::*;
pub use table::{DeedTable, DeedTableConfig, LoadStatus};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
