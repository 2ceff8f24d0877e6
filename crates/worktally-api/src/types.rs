//! Shared domain records for the worktally API

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use worktally_util::{
    CategoryId, EvaluationId, NotificationId, PunishmentId, SessionId, TargetId, UserId,
};

/// A stored enum label that no variant matches
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed enums that are stored and sent as snake_case strings.
macro_rules! labeled_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

labeled_enum!(
    /// How a session was recorded
    SessionSource, "session source" {
        Timer => "timer",
        Manual => "manual",
    }
);

labeled_enum!(
    /// Period a target is declared over
    TargetPeriod, "target period" {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Tomorrow => "tomorrow",
    }
);

labeled_enum!(
    EvaluationStatus, "evaluation status" {
        Met => "met",
        Missed => "missed",
    }
);

labeled_enum!(
    NotificationKind, "notification kind" {
        TargetMet => "target_met",
        TargetMissed => "target_missed",
        System => "system",
    }
);

labeled_enum!(
    /// Consequence rule attached to a missed evaluation
    PunishmentRule, "punishment rule" {
        StreakBreak => "streak_break",
    }
);

/// A time-tracking session.
///
/// `end_time == None` means the timer is still running; `duration_seconds`
/// and `effective_seconds` are filled in exactly when it stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub category_id: Option<CategoryId>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub effectiveness_multiplier: f64,
    pub effective_seconds: Option<i64>,
    pub note: Option<String>,
    pub source: SessionSource,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Running session plus how long it has been running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session: Session,
    pub elapsed_seconds: i64,
}

/// Filters for listing sessions; all bounds apply to `start_time`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFilter {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub include_active: bool,
}

/// Manual session request before splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualSession {
    pub category_id: Option<CategoryId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub effectiveness_multiplier: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub user_id: UserId,
    pub name: String,
    pub color: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

/// A declared time target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTarget {
    pub id: TargetId,
    pub user_id: UserId,
    pub target_seconds: i64,
    pub period: TargetPeriod,
    /// Empty means every category (and uncategorized sessions) counts
    pub include_category_ids: Vec<CategoryId>,
    pub effective_from: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkTarget {
    /// Whether a session filed under `category` counts towards this target
    pub fn counts_category(&self, category: Option<CategoryId>) -> bool {
        if self.include_category_ids.is_empty() {
            return true;
        }
        category.is_some_and(|c| self.include_category_ids.contains(&c))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTarget {
    pub target_seconds: i64,
    pub period: TargetPeriod,
    #[serde(default)]
    pub include_category_ids: Vec<CategoryId>,
    /// Defaults to the creation instant
    #[serde(default)]
    pub effective_from: Option<DateTime<Utc>>,
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetUpdate {
    #[serde(default)]
    pub target_seconds: Option<i64>,
    #[serde(default)]
    pub include_category_ids: Option<Vec<CategoryId>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TargetUpdate {
    pub fn is_empty(&self) -> bool {
        self.target_seconds.is_none()
            && self.include_category_ids.is_none()
            && self.is_active.is_none()
    }
}

/// Immutable outcome of evaluating one target over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkEvaluation {
    pub id: EvaluationId,
    pub user_id: UserId,
    pub target_id: TargetId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub actual_seconds: i64,
    /// Snapshot of the target at evaluation time
    pub target_seconds: i64,
    pub status: EvaluationStatus,
    pub deficit_seconds: i64,
    pub created_at: DateTime<Utc>,
}

impl WorkEvaluation {
    pub fn period_date(&self) -> NaiveDate {
        self.period_start.date_naive()
    }
}

/// Date-range filter for evaluation listings (inclusive, on period dates)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFilter {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_id: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentPayload {
    pub deficit_seconds: i64,
    pub target_seconds: i64,
    pub actual_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunishmentEvent {
    pub id: PunishmentId,
    pub user_id: UserId,
    pub evaluation_id: EvaluationId,
    pub rule_type: PunishmentRule,
    pub payload: PunishmentPayload,
    pub created_at: DateTime<Utc>,
}

/// Which users an evaluation run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "user_id", rename_all = "snake_case")]
pub enum EvaluationScope {
    AllUsers,
    User(UserId),
}

impl EvaluationScope {
    pub fn user(&self) -> Option<UserId> {
        match self {
            EvaluationScope::AllUsers => None,
            EvaluationScope::User(id) => Some(*id),
        }
    }
}

/// Summary of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub date: NaiveDate,
    pub evaluations: Vec<WorkEvaluation>,
}

impl EvaluationRun {
    pub fn met_count(&self) -> usize {
        self.evaluations
            .iter()
            .filter(|e| e.status == EvaluationStatus::Met)
            .count()
    }

    pub fn missed_count(&self) -> usize {
        self.evaluations.len() - self.met_count()
    }
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Tracks time for itself
    User,
    /// Local admin: may evaluate for everyone, reload config, moderate sessions
    Admin,
}

impl ClientRole {
    pub fn can_evaluate_all(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_reload_config(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_moderate_sessions(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    /// Users may only act as the account matching their Unix uid
    pub fn can_act_as_any_user(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub config_loaded: bool,
    pub store_ok: bool,
    pub scheduler_enabled: bool,
    pub next_evaluation_at: Option<DateTime<Utc>>,
}
