//! Command types for the worktally protocol

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use worktally_util::{
    CategoryId, ClientId, NotificationId, SessionId, TargetId, UserId, WorktallyError,
};

use crate::{
    ActiveSession, Category, ClientRole, EvaluationFilter, EvaluationRun, HealthStatus,
    ManualSession, NewTarget, Notification, PunishmentEvent, Session, SessionFilter,
    TargetUpdate, WorkEvaluation, WorkTarget, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&WorktallyError> for ErrorInfo {
    fn from(err: &WorktallyError) -> Self {
        let code = match err {
            WorktallyError::Validation(_) => ErrorCode::Validation,
            WorktallyError::Conflict(_) => ErrorCode::Conflict,
            WorktallyError::NotFound(_) => ErrorCode::NotFound,
            WorktallyError::Ownership(_) => ErrorCode::Ownership,
            WorktallyError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            WorktallyError::RateLimited => ErrorCode::RateLimited,
            WorktallyError::Config(_) => ErrorCode::ConfigError,
            WorktallyError::Store(_) | WorktallyError::Ipc(_) | WorktallyError::Internal(_) => {
                ErrorCode::InternalError
            }
        };
        ErrorInfo::new(code, err.to_string())
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Validation,
    Conflict,
    NotFound,
    Ownership,
    PermissionDenied,
    RateLimited,
    ConfigError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // Sessions
    StartSession {
        user_id: UserId,
        #[serde(default)]
        category_id: Option<CategoryId>,
        #[serde(default)]
        note: Option<String>,
        #[serde(default)]
        effectiveness_multiplier: Option<f64>,
    },

    StopSession {
        user_id: UserId,
        #[serde(default)]
        note: Option<String>,
    },

    /// Record a finished session; split per UTC day when it crosses midnight
    CreateManualSession { user_id: UserId, entry: ManualSession },

    GetActiveSession { user_id: UserId },

    ListSessions {
        user_id: UserId,
        #[serde(default)]
        filter: SessionFilter,
    },

    GetSession { user_id: UserId, session_id: SessionId },

    DeleteSession { user_id: UserId, session_id: SessionId },

    // Categories
    CreateCategory {
        user_id: UserId,
        name: String,
        #[serde(default)]
        color: Option<String>,
    },

    ListCategories {
        user_id: UserId,
        #[serde(default)]
        include_archived: bool,
    },

    ArchiveCategory { user_id: UserId, category_id: CategoryId },

    // Targets
    CreateTarget { user_id: UserId, target: NewTarget },

    ListTargets {
        user_id: UserId,
        #[serde(default)]
        include_inactive: bool,
    },

    UpdateTarget {
        user_id: UserId,
        target_id: TargetId,
        update: TargetUpdate,
    },

    // Evaluation

    /// Evaluate daily targets. `date` defaults to today (UTC); omitting
    /// `user_id` covers every user and requires the admin role.
    EvaluateForDate {
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        user_id: Option<UserId>,
    },

    ListEvaluations {
        user_id: UserId,
        #[serde(default)]
        filter: EvaluationFilter,
    },

    ListNotifications {
        user_id: UserId,
        #[serde(default)]
        unread_only: bool,
    },

    MarkNotificationRead {
        user_id: UserId,
        notification_id: NotificationId,
    },

    ListPunishments { user_id: UserId },

    // Service

    /// Reload configuration (admin only)
    ReloadConfig,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// The user a command acts for, if any
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Command::StartSession { user_id, .. }
            | Command::StopSession { user_id, .. }
            | Command::CreateManualSession { user_id, .. }
            | Command::GetActiveSession { user_id }
            | Command::ListSessions { user_id, .. }
            | Command::GetSession { user_id, .. }
            | Command::DeleteSession { user_id, .. }
            | Command::CreateCategory { user_id, .. }
            | Command::ListCategories { user_id, .. }
            | Command::ArchiveCategory { user_id, .. }
            | Command::CreateTarget { user_id, .. }
            | Command::ListTargets { user_id, .. }
            | Command::UpdateTarget { user_id, .. }
            | Command::ListEvaluations { user_id, .. }
            | Command::ListNotifications { user_id, .. }
            | Command::MarkNotificationRead { user_id, .. }
            | Command::ListPunishments { user_id } => Some(*user_id),
            Command::EvaluateForDate { user_id, .. } => *user_id,
            Command::ReloadConfig
            | Command::SubscribeEvents
            | Command::UnsubscribeEvents
            | Command::GetHealth
            | Command::Ping => None,
        }
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Session(Session),
    Sessions { sessions: Vec<Session> },
    ActiveSession { active: Option<ActiveSession> },
    SessionDeleted { session_id: SessionId },
    Category(Category),
    Categories { categories: Vec<Category> },
    Target(WorkTarget),
    Targets { targets: Vec<WorkTarget> },
    EvaluationRun(EvaluationRun),
    Evaluations { evaluations: Vec<WorkEvaluation> },
    Notification(Notification),
    Notifications { notifications: Vec<Notification> },
    Punishments { punishments: Vec<PunishmentEvent> },
    ConfigReloaded,
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn command_wire_format() {
        let json = r#"{"request_id":7,"api_version":1,"command":{"type":"start_session","user_id":3}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req.request_id, 7);
        match req.command {
            Command::StartSession {
                user_id,
                category_id,
                note,
                effectiveness_multiplier,
            } => {
                assert_eq!(user_id, UserId::new(3));
                assert!(category_id.is_none() && note.is_none());
                assert!(effectiveness_multiplier.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn manual_entry_nests() {
        let cmd = Command::CreateManualSession {
            user_id: UserId::new(1),
            entry: ManualSession {
                category_id: None,
                start_time: Utc.with_ymd_and_hms(2025, 12, 15, 23, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2025, 12, 16, 1, 0, 0).unwrap(),
                note: Some("late".into()),
                effectiveness_multiplier: None,
            },
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["type"], "create_manual_session");
        assert_eq!(value["entry"]["note"], "late");
        assert_eq!(cmd.user_id(), Some(UserId::new(1)));
    }

    #[test]
    fn list_payloads_serialize() {
        let resp = Response::success(1, ResponsePayload::Sessions { sessions: vec![] });
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed.result,
            ResponseResult::Ok(ResponsePayload::Sessions { ref sessions }) if sessions.is_empty()
        ));

        let resp = Response::success(2, ResponsePayload::ActiveSession { active: None });
        assert!(serde_json::to_string(&resp).unwrap().contains("active_session"));
    }

    #[test]
    fn errors_map_to_codes() {
        let info = ErrorInfo::from(&WorktallyError::conflict("session already active"));
        assert_eq!(info.code, ErrorCode::Conflict);

        let info = ErrorInfo::from(&WorktallyError::store("locked"));
        assert_eq!(info.code, ErrorCode::InternalError);
        assert!(info.message.contains("locked"));
    }

    #[test]
    fn evaluate_defaults() {
        let cmd: Command = serde_json::from_str(r#"{"type":"evaluate_for_date"}"#).unwrap();
        assert!(matches!(
            cmd,
            Command::EvaluateForDate { date: None, user_id: None }
        ));
        assert_eq!(cmd.user_id(), None);
    }
}
