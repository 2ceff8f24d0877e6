//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub evaluation: RawEvaluationConfig,

    #[serde(default)]
    pub sessions: RawSessionsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/worktally/worktallyd.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the SQLite store
    pub data_dir: Option<PathBuf>,

    pub log_dir: Option<PathBuf>,
}

/// Daily evaluation trigger
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEvaluationConfig {
    pub enabled: Option<bool>,

    /// `HH:MM`, UTC
    pub run_at: Option<String>,

    /// "current" or "previous"
    pub evaluate_day: Option<String>,

    /// Days before today re-checked at startup
    pub backfill_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionsConfig {
    /// Maximum note length in characters
    pub max_note_length: Option<usize>,

    pub max_effectiveness_multiplier: Option<f64>,
}
