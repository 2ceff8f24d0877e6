//! Protocol types for worktallyd
//!
//! This crate defines the records shared by the store, the engine and
//! clients, plus the stable IPC surface:
//! - Domain records (sessions, targets, evaluations, notifications)
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
