//! Audit event types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use worktally_util::{SessionId, UserId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    ConfigReloaded { success: bool },

    /// A batch of daily evaluations finished
    EvaluationRun {
        date: NaiveDate,
        trigger: String,
        evaluated: usize,
        met: usize,
        missed: usize,
    },

    /// An evaluation batch aborted part-way
    EvaluationFailed {
        date: NaiveDate,
        trigger: String,
        error: String,
    },

    /// Session removed through the IPC surface
    SessionDeleted {
        session_id: SessionId,
        owner: UserId,
        by_admin: bool,
    },

    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Set by the store on append
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: worktally_util::now(),
            event,
        }
    }
}
