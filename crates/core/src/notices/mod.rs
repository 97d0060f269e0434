//! Notices module.
//!
//! The synchronizer reports the outcome of remote calls through a
//! [`NoticeSink`]. Front ends implement the sink to show toasts or print
//! messages.

mod notice;
mod sink;

pub use notice::*;
pub use sink::*;
