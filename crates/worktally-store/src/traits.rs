//! Store trait definitions

use chrono::{DateTime, NaiveDate, Utc};
use worktally_api::{
    Category, EvaluationFilter, EvaluationStatus, Notification, NotificationKind, PunishmentEvent,
    PunishmentPayload, PunishmentRule, Session, SessionFilter, SessionSource, TargetPeriod,
    TargetUpdate, WorkEvaluation, WorkTarget,
};
use worktally_util::{CategoryId, NotificationId, SessionId, TargetId, UserId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Categories

    fn insert_category(
        &self,
        user_id: UserId,
        name: &str,
        color: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Category>;

    fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>>;

    fn list_categories(&self, user_id: UserId, include_archived: bool) -> StoreResult<Vec<Category>>;

    fn set_category_archived(&self, id: CategoryId, archived: bool) -> StoreResult<Category>;

    // Sessions

    /// Insert one session. Fails with `Conflict` if it would be a second
    /// active session for the same user.
    fn insert_session(&self, draft: &SessionDraft) -> StoreResult<Session>;

    /// Insert several sessions in one transaction; all or none are stored.
    fn insert_sessions(&self, drafts: &[SessionDraft]) -> StoreResult<Vec<Session>>;

    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>>;

    fn get_active_session(&self, user_id: UserId) -> StoreResult<Option<Session>>;

    /// Close an active session. `NotFound` if it is missing or already closed.
    fn finish_session(&self, id: SessionId, finish: &SessionFinish) -> StoreResult<Session>;

    /// Returns whether a row was removed
    fn delete_session(&self, id: SessionId) -> StoreResult<bool>;

    /// Sessions ordered newest `start_time` first
    fn list_sessions(&self, user_id: UserId, filter: &SessionFilter) -> StoreResult<Vec<Session>>;

    /// Sum of `duration_seconds` over completed sessions whose `start_time`
    /// lies in `[start, end]`, restricted to `categories` when non-empty.
    fn sum_completed_seconds(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        categories: &[CategoryId],
    ) -> StoreResult<i64>;

    // Targets

    fn insert_target(&self, draft: &TargetDraft) -> StoreResult<WorkTarget>;

    fn get_target(&self, id: TargetId) -> StoreResult<Option<WorkTarget>>;

    fn list_targets(&self, user_id: UserId, include_inactive: bool) -> StoreResult<Vec<WorkTarget>>;

    fn update_target(
        &self,
        id: TargetId,
        update: &TargetUpdate,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<WorkTarget>;

    /// Active targets of `period` effective on or before `date` that have no
    /// evaluation for `date` yet, in id order.
    fn pending_targets(
        &self,
        period: TargetPeriod,
        date: NaiveDate,
        user_id: Option<UserId>,
    ) -> StoreResult<Vec<WorkTarget>>;

    // Evaluations

    /// Persist an evaluation with its notification and optional punishment
    /// atomically. Returns `None` (and writes nothing) when the target was
    /// already evaluated for that date.
    fn record_evaluation(&self, write: &EvaluationWrite) -> StoreResult<Option<RecordedEvaluation>>;

    /// Newest first
    fn list_evaluations(
        &self,
        user_id: UserId,
        filter: &EvaluationFilter,
    ) -> StoreResult<Vec<WorkEvaluation>>;

    // Notifications and punishments

    fn get_notification(&self, id: NotificationId) -> StoreResult<Option<Notification>>;

    /// Unread first, then newest first
    fn list_notifications(&self, user_id: UserId, unread_only: bool) -> StoreResult<Vec<Notification>>;

    /// Sets `read_at` if unset; an already-read notification keeps its timestamp.
    fn mark_notification_read(
        &self,
        id: NotificationId,
        read_at: DateTime<Utc>,
    ) -> StoreResult<Notification>;

    /// Newest first
    fn list_punishments(&self, user_id: UserId) -> StoreResult<Vec<PunishmentEvent>>;

    // Audit log

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// Session row before insertion
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
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

/// Values written when a timer session stops
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFinish {
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub effective_seconds: i64,
    /// Replaces the note when present
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetDraft {
    pub user_id: UserId,
    pub target_seconds: i64,
    pub period: TargetPeriod,
    pub include_category_ids: Vec<CategoryId>,
    pub effective_from: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Everything one target's evaluation writes
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationWrite {
    pub user_id: UserId,
    pub target_id: TargetId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub actual_seconds: i64,
    pub target_seconds: i64,
    pub status: EvaluationStatus,
    pub deficit_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub notification: NotificationDraft,
    pub punishment: Option<PunishmentDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PunishmentDraft {
    pub rule_type: PunishmentRule,
    pub payload: PunishmentPayload,
}

/// Rows created by a successful [`Store::record_evaluation`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvaluation {
    pub evaluation: WorkEvaluation,
    pub notification: Notification,
    pub punishment: Option<PunishmentEvent>,
}
