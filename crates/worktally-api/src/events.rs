//! Event types for worktallyd -> client streaming

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use worktally_util::{SessionId, UserId};

use crate::API_VERSION;

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: worktally_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStarted {
        session_id: SessionId,
        user_id: UserId,
        start_time: DateTime<Utc>,
    },

    SessionStopped {
        session_id: SessionId,
        user_id: UserId,
        duration_seconds: i64,
    },

    /// Manual entry stored as one or more per-day segments
    SessionsRecorded {
        user_id: UserId,
        session_ids: Vec<SessionId>,
    },

    SessionDeleted {
        session_id: SessionId,
        user_id: UserId,
    },

    /// An evaluation run finished
    EvaluationCompleted {
        date: NaiveDate,
        evaluated: usize,
        met: usize,
        missed: usize,
    },

    ConfigReloaded,

    /// Service is shutting down
    Shutdown,
}
