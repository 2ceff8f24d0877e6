//! Daily target evaluation

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info};
use worktally_api::{
    EvaluationFilter, EvaluationScope, EvaluationStatus, TargetPeriod, WorkEvaluation, WorkTarget,
};
use worktally_store::EvaluationWrite;
use worktally_util::{
    check_date, day_bounds, truncate_to_micros, Result, UserId, WorktallyError,
};

use crate::{notification_for, punishment_for, CoreEngine};

/// Outcome of comparing worked time against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub actual_seconds: i64,
    pub target_seconds: i64,
    pub status: EvaluationStatus,
    pub deficit_seconds: i64,
}

/// Met iff `actual >= target`
pub fn assess(actual_seconds: i64, target_seconds: i64) -> Assessment {
    let status = if actual_seconds >= target_seconds {
        EvaluationStatus::Met
    } else {
        EvaluationStatus::Missed
    };
    Assessment {
        actual_seconds,
        target_seconds,
        status,
        deficit_seconds: (target_seconds - actual_seconds).max(0),
    }
}

impl CoreEngine {
    /// Evaluate every pending daily target for `date`.
    ///
    /// Targets are processed in id order, each with its own atomic write set.
    /// The first failure aborts the batch and is returned; targets committed
    /// before it stay committed, so a rerun picks up exactly the rest.
    /// Targets evaluated concurrently by another caller are skipped.
    pub fn evaluate_for_date(
        &self,
        date: NaiveDate,
        scope: EvaluationScope,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkEvaluation>> {
        let date = check_date("date", date)?;
        let targets = self
            .store
            .pending_targets(TargetPeriod::Daily, date, scope.user())?;
        debug!(%date, pending = targets.len(), "Evaluating daily targets");

        let created_at = truncate_to_micros(now);
        let mut evaluations = Vec::with_capacity(targets.len());
        for target in &targets {
            match self.evaluate_target(target, date, created_at) {
                Ok(Some(evaluation)) => evaluations.push(evaluation),
                Ok(None) => {
                    debug!(target_id = %target.id, %date, "Target already evaluated, skipping");
                }
                Err(e) => {
                    error!(
                        target_id = %target.id,
                        user_id = %target.user_id,
                        %date,
                        committed = evaluations.len(),
                        error = %e,
                        "Evaluation batch aborted"
                    );
                    return Err(e);
                }
            }
        }

        info!(
            %date,
            evaluated = evaluations.len(),
            met = evaluations.iter().filter(|e| e.status == EvaluationStatus::Met).count(),
            "Daily evaluation finished"
        );
        Ok(evaluations)
    }

    fn evaluate_target(
        &self,
        target: &WorkTarget,
        date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Option<WorkEvaluation>> {
        let (period_start, period_end) = day_bounds(date);
        let actual = self.store.sum_completed_seconds(
            target.user_id,
            period_start,
            period_end,
            &target.include_category_ids,
        )?;
        let assessment = assess(actual, target.target_seconds);

        let recorded = self.store.record_evaluation(&EvaluationWrite {
            user_id: target.user_id,
            target_id: target.id,
            period_start,
            period_end,
            actual_seconds: assessment.actual_seconds,
            target_seconds: assessment.target_seconds,
            status: assessment.status,
            deficit_seconds: assessment.deficit_seconds,
            created_at,
            notification: notification_for(date, &assessment),
            punishment: punishment_for(&assessment),
        })?;

        Ok(recorded.map(|recorded| {
            info!(
                target_id = %target.id,
                user_id = %target.user_id,
                status = %assessment.status,
                actual_seconds = assessment.actual_seconds,
                deficit_seconds = assessment.deficit_seconds,
                "Target evaluated"
            );
            recorded.evaluation
        }))
    }

    /// Newest first
    pub fn list_evaluations(
        &self,
        user: UserId,
        filter: &EvaluationFilter,
    ) -> Result<Vec<WorkEvaluation>> {
        if let Some(start) = filter.start_date {
            check_date("start_date", start)?;
        }
        if let Some(end) = filter.end_date {
            check_date("end_date", end)?;
        }
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date)
            && start > end
        {
            return Err(WorktallyError::validation("start_date is after end_date"));
        }
        Ok(self.store.list_evaluations(user, filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use chrono::Duration;
    use worktally_api::{ManualSession, NewTarget, NotificationKind, PunishmentRule};
    use worktally_util::CategoryId;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn daily(engine: &CoreEngine, uid: i64, seconds: i64, include: Vec<CategoryId>) -> WorkTarget {
        engine
            .create_target(
                user(uid),
                NewTarget {
                    target_seconds: seconds,
                    period: TargetPeriod::Daily,
                    include_category_ids: include,
                    effective_from: Some(at(1, 0, 0)),
                },
                at(1, 0, 0),
            )
            .unwrap()
    }

    fn worked(engine: &CoreEngine, uid: i64, category: Option<CategoryId>, start: DateTime<Utc>, secs: i64) {
        engine
            .create_manual_session(
                user(uid),
                ManualSession {
                    category_id: category,
                    start_time: start,
                    end_time: start + Duration::seconds(secs),
                    note: None,
                    effectiveness_multiplier: None,
                },
                at(20, 0, 0),
            )
            .unwrap();
    }

    #[test]
    fn assess_boundaries() {
        assert_eq!(assess(100, 100).status, EvaluationStatus::Met);
        assert_eq!(assess(100, 100).deficit_seconds, 0);
        assert_eq!(assess(99, 100).status, EvaluationStatus::Missed);
        assert_eq!(assess(99, 100).deficit_seconds, 1);
        assert_eq!(assess(500, 100).deficit_seconds, 0);
    }

    #[test]
    fn met_target() {
        let engine = engine();
        daily(&engine, 1, 14400, vec![]);
        worked(&engine, 1, None, at(10, 8, 0), 18000);

        let evaluations = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(11, 0, 0))
            .unwrap();
        assert_eq!(evaluations.len(), 1);
        let e = &evaluations[0];
        assert_eq!(e.status, EvaluationStatus::Met);
        assert_eq!(e.actual_seconds, 18000);
        assert_eq!(e.deficit_seconds, 0);
        assert_eq!(e.period_date(), date(10));

        let notes = engine.list_notifications(user(1), false).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::TargetMet);
        assert!(engine.list_punishments(user(1)).unwrap().is_empty());
    }

    #[test]
    fn missed_target() {
        let engine = engine();
        daily(&engine, 1, 28800, vec![]);
        worked(&engine, 1, None, at(10, 9, 0), 10800);

        let evaluations = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(11, 0, 0))
            .unwrap();
        assert_eq!(evaluations[0].status, EvaluationStatus::Missed);
        assert_eq!(evaluations[0].deficit_seconds, 18000);

        let notes = engine.list_notifications(user(1), false).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::TargetMissed);

        let punishments = engine.list_punishments(user(1)).unwrap();
        assert_eq!(punishments.len(), 1);
        assert_eq!(punishments[0].rule_type, PunishmentRule::StreakBreak);
        assert_eq!(punishments[0].payload.deficit_seconds, 18000);
        assert_eq!(punishments[0].evaluation_id, evaluations[0].id);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let engine = engine();
        daily(&engine, 1, 3600, vec![]);
        daily(&engine, 2, 3600, vec![]);

        let first = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(11, 0, 0))
            .unwrap();
        assert_eq!(first.len(), 2);
        let second = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(11, 0, 5))
            .unwrap();
        assert!(second.is_empty());
        assert_eq!(engine.list_notifications(user(1), false).unwrap().len(), 1);
        assert_eq!(engine.list_punishments(user(2)).unwrap().len(), 1);
    }

    #[test]
    fn category_filter() {
        let engine = engine();
        let a = engine.create_category(user(1), "A", None, at(1, 0, 0)).unwrap();
        let b = engine.create_category(user(1), "B", None, at(1, 0, 0)).unwrap();
        daily(&engine, 1, 3600, vec![a.id]);
        worked(&engine, 1, Some(a.id), at(10, 6, 0), 10800);
        worked(&engine, 1, Some(b.id), at(10, 10, 0), 18000);
        worked(&engine, 1, None, at(10, 16, 0), 600);

        let evaluations = engine
            .evaluate_for_date(date(10), EvaluationScope::User(user(1)), at(11, 0, 0))
            .unwrap();
        assert_eq!(evaluations[0].actual_seconds, 10800);
    }

    #[test]
    fn active_sessions_do_not_count() {
        let engine = engine();
        daily(&engine, 1, 60, vec![]);
        engine.start_session(user(1), None, None, None, at(10, 9, 0)).unwrap();

        let evaluations = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(10, 23, 0))
            .unwrap();
        assert_eq!(evaluations[0].actual_seconds, 0);
        assert_eq!(evaluations[0].status, EvaluationStatus::Missed);
    }

    #[test]
    fn window_is_the_utc_day() {
        let engine = engine();
        daily(&engine, 1, 60, vec![]);
        worked(&engine, 1, None, at(9, 23, 0), 1800);
        worked(&engine, 1, None, at(11, 0, 0), 1800);
        worked(&engine, 1, None, at(10, 0, 0), 120);

        let evaluations = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(12, 0, 0))
            .unwrap();
        assert_eq!(evaluations[0].actual_seconds, 120);
    }

    #[test]
    fn scope_and_effective_from() {
        let engine = engine();
        daily(&engine, 1, 60, vec![]);
        daily(&engine, 2, 60, vec![]);
        engine
            .create_target(
                user(3),
                NewTarget {
                    target_seconds: 60,
                    period: TargetPeriod::Daily,
                    include_category_ids: vec![],
                    effective_from: Some(at(11, 12, 0)),
                },
                at(1, 0, 0),
            )
            .unwrap();
        engine
            .create_target(
                user(1),
                NewTarget {
                    target_seconds: 60,
                    period: TargetPeriod::Weekly,
                    include_category_ids: vec![],
                    effective_from: None,
                },
                at(1, 0, 0),
            )
            .unwrap();

        let only_two = engine
            .evaluate_for_date(date(10), EvaluationScope::User(user(2)), at(11, 0, 0))
            .unwrap();
        assert_eq!(only_two.len(), 1);
        assert_eq!(only_two[0].user_id, user(2));

        // user 3's target starts later the next day, weekly targets are not evaluated
        let rest = engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(11, 0, 0))
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].user_id, user(1));

        let next_day = engine
            .evaluate_for_date(date(11), EvaluationScope::User(user(3)), at(12, 0, 0))
            .unwrap();
        assert_eq!(next_day.len(), 1);
    }

    #[test]
    fn target_snapshot_survives_update() {
        let engine = engine();
        let target = daily(&engine, 1, 3600, vec![]);
        engine
            .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(11, 0, 0))
            .unwrap();
        engine
            .update_target(
                user(1),
                target.id,
                worktally_api::TargetUpdate {
                    target_seconds: Some(7200),
                    ..Default::default()
                },
                at(11, 1, 0),
            )
            .unwrap();

        let listed = engine
            .list_evaluations(user(1), &EvaluationFilter::default())
            .unwrap();
        assert_eq!(listed[0].target_seconds, 3600);
    }

    #[test]
    fn list_evaluations_rejects_inverted_range() {
        let engine = engine();
        let filter = EvaluationFilter {
            start_date: Some(date(12)),
            end_date: Some(date(10)),
            target_id: None,
        };
        assert!(matches!(
            engine.list_evaluations(user(1), &filter),
            Err(WorktallyError::Validation(_))
        ));
    }

    #[test]
    fn out_of_range_dates_are_rejected_without_side_effects() {
        let engine = engine();
        daily(&engine, 1, 60, vec![]);
        for far in [NaiveDate::MAX, NaiveDate::from_ymd_opt(10000, 1, 1).unwrap()] {
            assert!(matches!(
                engine.evaluate_for_date(far, EvaluationScope::User(user(1)), at(20, 0, 0)),
                Err(WorktallyError::Validation(_))
            ));
            let filter = EvaluationFilter {
                start_date: None,
                end_date: Some(far),
                target_id: None,
            };
            assert!(matches!(
                engine.list_evaluations(user(1), &filter),
                Err(WorktallyError::Validation(_))
            ));
        }
        assert!(engine.list_notifications(user(1), false).unwrap().is_empty());
        assert_eq!(
            engine
                .evaluate_for_date(date(10), EvaluationScope::AllUsers, at(20, 0, 0))
                .unwrap()
                .len(),
            1
        );
    }
}
