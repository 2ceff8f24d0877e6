//! Core engine for worktallyd
//!
//! This crate contains:
//! - Session lifecycle (start, stop, manual entry, deletion, active lookup)
//! - Splitting of multi-day manual entries into per-day segments
//! - Category and target registries
//! - Daily target evaluation and its notification/punishment side effects
//! - The daily trigger schedule

mod emitter;
mod engine;
mod evaluation;
mod schedule;
mod sessions;
mod splitter;
mod targets;

pub use emitter::*;
pub use engine::*;
pub use evaluation::*;
pub use schedule::*;
pub use splitter::*;
