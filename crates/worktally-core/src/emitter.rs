//! Notification and punishment side effects of an evaluation

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use worktally_api::{
    EvaluationStatus, Notification, NotificationKind, PunishmentEvent, PunishmentPayload,
    PunishmentRule,
};
use worktally_store::{NotificationDraft, PunishmentDraft};
use worktally_util::{truncate_to_micros, NotificationId, Result, UserId, WorktallyError};

use crate::{Assessment, CoreEngine};

/// The notification a user gets for one evaluated day
pub fn notification_for(date: NaiveDate, assessment: &Assessment) -> NotificationDraft {
    match assessment.status {
        EvaluationStatus::Met => NotificationDraft {
            kind: NotificationKind::TargetMet,
            title: format!("Daily Target Met! - {}", date),
            body: Some(format!(
                "Great job! You met your daily target of {}s with {}s worked.",
                assessment.target_seconds, assessment.actual_seconds
            )),
        },
        EvaluationStatus::Missed => NotificationDraft {
            kind: NotificationKind::TargetMissed,
            title: format!("Daily Target Missed - {}", date),
            body: Some(format!(
                "You missed your daily target of {}s. Actual: {}s. Deficit: {}s.",
                assessment.target_seconds, assessment.actual_seconds, assessment.deficit_seconds
            )),
        },
    }
}

/// A missed day breaks the streak; a met day carries no punishment
pub fn punishment_for(assessment: &Assessment) -> Option<PunishmentDraft> {
    match assessment.status {
        EvaluationStatus::Met => None,
        EvaluationStatus::Missed => Some(PunishmentDraft {
            rule_type: PunishmentRule::StreakBreak,
            payload: PunishmentPayload {
                deficit_seconds: assessment.deficit_seconds,
                target_seconds: assessment.target_seconds,
                actual_seconds: assessment.actual_seconds,
            },
        }),
    }
}

impl CoreEngine {
    /// Unread first, then newest first
    pub fn list_notifications(&self, user: UserId, unread_only: bool) -> Result<Vec<Notification>> {
        Ok(self.store.list_notifications(user, unread_only)?)
    }

    /// Marking an already-read notification keeps its original `read_at`
    pub fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        let notification = self
            .store
            .get_notification(id)?
            .ok_or_else(|| WorktallyError::not_found(format!("Notification {}", id)))?;
        if notification.user_id != user {
            return Err(WorktallyError::ownership(format!("Notification {}", id)));
        }
        if notification.is_read() {
            return Ok(notification);
        }

        let notification = self.store.mark_notification_read(id, truncate_to_micros(now))?;
        debug!(user_id = %user, notification_id = %id, "Notification read");
        Ok(notification)
    }

    pub fn list_punishments(&self, user: UserId) -> Result<Vec<PunishmentEvent>> {
        Ok(self.store.list_punishments(user)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assess;
    use crate::engine::test_support::*;
    use worktally_api::EvaluationScope;
    use worktally_util::NotificationId;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 10).unwrap()
    }

    #[test]
    fn met_notification_text() {
        let draft = notification_for(date(), &assess(18000, 14400));
        assert_eq!(draft.kind, NotificationKind::TargetMet);
        assert_eq!(draft.title, "Daily Target Met! - 2025-12-10");
        assert_eq!(
            draft.body.as_deref(),
            Some("Great job! You met your daily target of 14400s with 18000s worked.")
        );
        assert!(punishment_for(&assess(18000, 14400)).is_none());
    }

    #[test]
    fn missed_notification_and_punishment() {
        let assessment = assess(10800, 28800);
        let draft = notification_for(date(), &assessment);
        assert_eq!(draft.kind, NotificationKind::TargetMissed);
        assert_eq!(draft.title, "Daily Target Missed - 2025-12-10");
        assert_eq!(
            draft.body.as_deref(),
            Some("You missed your daily target of 28800s. Actual: 10800s. Deficit: 18000s.")
        );

        let punishment = punishment_for(&assessment).unwrap();
        assert_eq!(punishment.rule_type, PunishmentRule::StreakBreak);
        assert_eq!(
            punishment.payload,
            PunishmentPayload {
                deficit_seconds: 18000,
                target_seconds: 28800,
                actual_seconds: 10800,
            }
        );
    }

    #[test]
    fn mark_read_is_idempotent_and_owned() {
        let engine = engine();
        engine
            .create_target(
                user(1),
                worktally_api::NewTarget {
                    target_seconds: 60,
                    period: worktally_api::TargetPeriod::Daily,
                    include_category_ids: Vec::new(),
                    effective_from: Some(at(1, 0, 0)),
                },
                at(1, 0, 0),
            )
            .unwrap();
        engine
            .evaluate_for_date(date(), EvaluationScope::User(user(1)), at(11, 0, 0))
            .unwrap();

        let notifications = engine.list_notifications(user(1), true).unwrap();
        assert_eq!(notifications.len(), 1);
        let id = notifications[0].id;

        assert!(matches!(
            engine.mark_notification_read(user(2), id, at(11, 1, 0)),
            Err(WorktallyError::Ownership(_))
        ));
        assert!(matches!(
            engine.mark_notification_read(user(1), NotificationId::new(404), at(11, 1, 0)),
            Err(WorktallyError::NotFound(_))
        ));

        let first = engine.mark_notification_read(user(1), id, at(11, 1, 0)).unwrap();
        let second = engine.mark_notification_read(user(1), id, at(11, 2, 0)).unwrap();
        assert_eq!(first.read_at, Some(at(11, 1, 0)));
        assert_eq!(second.read_at, Some(at(11, 1, 0)));
        assert!(engine.list_notifications(user(1), true).unwrap().is_empty());
        assert_eq!(engine.list_punishments(user(1)).unwrap().len(), 1);
    }
}
