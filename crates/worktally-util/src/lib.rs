//! Shared utilities for worktallyd
//!
//! This crate provides:
//! - ID types (UserId, SessionId, TargetId, ClientId, ...)
//! - UTC clock and calendar-day helpers
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, data, config and log directories

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
