//! Session lifecycle operations

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use worktally_api::{ActiveSession, ManualSession, Session, SessionFilter, SessionSource};
use worktally_store::{SessionDraft, SessionFinish};
use worktally_util::{
    check_timestamp, truncate_to_micros, whole_seconds_between, CategoryId, Result, SessionId,
    UserId, WorktallyError,
};

use crate::{effective_seconds, split_by_day, CoreEngine};

impl CoreEngine {
    /// Start a timer session for `user`.
    ///
    /// Fails with `Conflict` while another session of the same user is running.
    pub fn start_session(
        &self,
        user: UserId,
        category: Option<CategoryId>,
        note: Option<String>,
        multiplier: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let note = self.check_note(note)?;
        let multiplier = self.check_multiplier(multiplier)?;
        if let Some(category) = category {
            self.owned_category(user, category)?;
        }

        if let Some(active) = self.store.get_active_session(user)? {
            warn!(user_id = %user, session_id = %active.id, "Start rejected, session already active");
            return Err(WorktallyError::conflict(format!(
                "session {} is already active",
                active.id
            )));
        }

        let now = truncate_to_micros(now);
        let session = self.store.insert_session(&SessionDraft {
            user_id: user,
            category_id: category,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            effectiveness_multiplier: multiplier,
            effective_seconds: None,
            note,
            source: SessionSource::Timer,
            created_at: now,
        })?;

        info!(user_id = %user, session_id = %session.id, "Session started");
        Ok(session)
    }

    /// Stop the running session of `user`, optionally replacing its note.
    pub fn stop_session(
        &self,
        user: UserId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let note = self.check_note(note)?;
        let active = self
            .store
            .get_active_session(user)?
            .ok_or_else(|| WorktallyError::not_found("Active session"))?;

        // A clock that stepped backwards must not produce a negative duration
        let end = truncate_to_micros(now).max(active.start_time);
        let duration = whole_seconds_between(active.start_time, end);

        let session = self.store.finish_session(
            active.id,
            &SessionFinish {
                end_time: end,
                duration_seconds: duration,
                effective_seconds: effective_seconds(duration, active.effectiveness_multiplier),
                note,
            },
        )?;

        info!(
            user_id = %user,
            session_id = %session.id,
            duration_seconds = duration,
            "Session stopped"
        );
        Ok(session)
    }

    /// Record a completed session after the fact.
    ///
    /// Entries spanning several UTC dates are stored as one segment per date,
    /// all or nothing. Every created segment is returned, oldest first.
    pub fn create_manual_session(
        &self,
        user: UserId,
        entry: ManualSession,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let start = truncate_to_micros(check_timestamp("start_time", entry.start_time)?);
        let end = truncate_to_micros(check_timestamp("end_time", entry.end_time)?);
        if end <= start {
            return Err(WorktallyError::validation("end_time must be after start_time"));
        }

        let note = self.check_note(entry.note)?;
        let multiplier = self.check_multiplier(entry.effectiveness_multiplier)?;
        if let Some(category) = entry.category_id {
            self.owned_category(user, category)?;
        }

        let created_at = truncate_to_micros(now);
        let drafts: Vec<SessionDraft> = split_by_day(start, end)
            .into_iter()
            .map(|segment| SessionDraft {
                user_id: user,
                category_id: entry.category_id,
                start_time: segment.start,
                end_time: Some(segment.end),
                duration_seconds: Some(segment.duration_seconds),
                effectiveness_multiplier: multiplier,
                effective_seconds: Some(effective_seconds(segment.duration_seconds, multiplier)),
                note: note.clone(),
                source: SessionSource::Manual,
                created_at,
            })
            .collect();

        let sessions = self.store.insert_sessions(&drafts)?;
        info!(
            user_id = %user,
            segments = sessions.len(),
            total_seconds = whole_seconds_between(start, end),
            "Manual session recorded"
        );
        Ok(sessions)
    }

    /// The running session of `user` with its elapsed time, if any
    pub fn get_active_session(&self, user: UserId, now: DateTime<Utc>) -> Result<Option<ActiveSession>> {
        Ok(self.store.get_active_session(user)?.map(|session| {
            let elapsed_seconds = whole_seconds_between(session.start_time, now);
            ActiveSession {
                session,
                elapsed_seconds,
            }
        }))
    }

    pub fn get_session(&self, user: UserId, id: SessionId) -> Result<Session> {
        let session = self
            .store
            .get_session(id)?
            .ok_or_else(|| WorktallyError::not_found(format!("Session {}", id)))?;
        if session.user_id != user {
            return Err(WorktallyError::ownership(format!("Session {}", id)));
        }
        Ok(session)
    }

    /// Hard-delete a session. Admin callers may delete any user's session.
    pub fn delete_session(&self, user: UserId, id: SessionId, as_admin: bool) -> Result<Session> {
        let session = self
            .store
            .get_session(id)?
            .ok_or_else(|| WorktallyError::not_found(format!("Session {}", id)))?;
        if session.user_id != user && !as_admin {
            return Err(WorktallyError::ownership(format!("Session {}", id)));
        }

        if !self.store.delete_session(id)? {
            return Err(WorktallyError::not_found(format!("Session {}", id)));
        }

        info!(session_id = %id, owner = %session.user_id, by = %user, "Session deleted");
        Ok(session)
    }

    pub fn list_sessions(&self, user: UserId, filter: &SessionFilter) -> Result<Vec<Session>> {
        if let Some(start) = filter.start {
            check_timestamp("filter start", start)?;
        }
        if let Some(end) = filter.end {
            check_timestamp("filter end", end)?;
        }
        if let (Some(start), Some(end)) = (filter.start, filter.end)
            && start > end
        {
            return Err(WorktallyError::validation("filter start is after filter end"));
        }
        let sessions = self.store.list_sessions(user, filter)?;
        debug!(user_id = %user, count = sessions.len(), "Sessions listed");
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_support::*;
    use chrono::Duration;
    use worktally_api::{ManualSession, SessionFilter, SessionSource};
    use worktally_util::{CategoryId, SessionId, WorktallyError};

    fn manual(start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> ManualSession {
        ManualSession {
            category_id: None,
            start_time: start,
            end_time: end,
            note: None,
            effectiveness_multiplier: None,
        }
    }

    #[test]
    fn start_then_stop() {
        let engine = engine();
        let started = engine
            .start_session(user(1), None, Some("focus".into()), None, at(10, 9, 0))
            .unwrap();
        assert!(started.is_active());
        assert_eq!(started.source, SessionSource::Timer);

        let stopped = engine
            .stop_session(user(1), None, at(10, 9, 0) + Duration::milliseconds(5_400_900))
            .unwrap();
        assert_eq!(stopped.id, started.id);
        assert_eq!(stopped.duration_seconds, Some(5400));
        assert_eq!(stopped.effective_seconds, Some(5400));
        assert_eq!(stopped.note.as_deref(), Some("focus"));
    }

    #[test]
    fn second_start_conflicts() {
        let engine = engine();
        engine.start_session(user(1), None, None, None, at(10, 9, 0)).unwrap();

        let err = engine
            .start_session(user(1), None, None, None, at(10, 9, 1))
            .unwrap_err();
        assert!(matches!(err, WorktallyError::Conflict(_)));

        let all = engine
            .list_sessions(user(1), &SessionFilter { include_active: true, ..Default::default() })
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn stop_without_active_session() {
        let engine = engine();
        let err = engine.stop_session(user(1), None, at(10, 9, 0)).unwrap_err();
        assert!(matches!(err, WorktallyError::NotFound(_)));
    }

    #[test]
    fn stop_applies_multiplier_and_note() {
        let engine = engine();
        engine
            .start_session(user(1), None, None, Some(1.5), at(10, 9, 0))
            .unwrap();
        let stopped = engine
            .stop_session(user(1), Some("wrapped up".into()), at(10, 10, 0))
            .unwrap();
        assert_eq!(stopped.duration_seconds, Some(3600));
        assert_eq!(stopped.effective_seconds, Some(5400));
        assert_eq!(stopped.note.as_deref(), Some("wrapped up"));
    }

    #[test]
    fn stop_before_start_clamps_to_zero() {
        let engine = engine();
        engine.start_session(user(1), None, None, None, at(10, 9, 0)).unwrap();
        let stopped = engine.stop_session(user(1), None, at(10, 8, 0)).unwrap();
        assert_eq!(stopped.duration_seconds, Some(0));
    }

    #[test]
    fn start_checks_category_owner() {
        let engine = engine();
        let foreign = engine
            .create_category(user(2), "Theirs", None, at(1, 0, 0))
            .unwrap();

        let err = engine
            .start_session(user(1), Some(foreign.id), None, None, at(10, 9, 0))
            .unwrap_err();
        assert!(matches!(err, WorktallyError::Ownership(_)));

        let err = engine
            .start_session(user(1), Some(CategoryId::new(404)), None, None, at(10, 9, 0))
            .unwrap_err();
        assert!(matches!(err, WorktallyError::NotFound(_)));
        assert!(engine.get_active_session(user(1), at(10, 9, 0)).unwrap().is_none());
    }

    #[test]
    fn manual_same_day() {
        let engine = engine();
        let sessions = engine
            .create_manual_session(user(1), manual(at(10, 9, 0), at(10, 11, 0)), at(11, 0, 0))
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_seconds, Some(7200));
        assert_eq!(sessions[0].source, SessionSource::Manual);
        assert_eq!(sessions[0].end_time, Some(at(10, 11, 0)));
    }

    #[test]
    fn manual_across_midnight_returns_every_segment() {
        let engine = engine();
        let sessions = engine
            .create_manual_session(user(1), manual(at(15, 23, 0), at(16, 1, 0)), at(16, 2, 0))
            .unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].start_time.date_naive().to_string(), "2025-12-15");
        assert_eq!(sessions[1].start_time.date_naive().to_string(), "2025-12-16");
        let total: i64 = sessions.iter().filter_map(|s| s.duration_seconds).sum();
        assert_eq!(total, 7200);
    }

    #[test]
    fn manual_rejects_bad_range() {
        let engine = engine();
        for (start, end) in [(at(10, 9, 0), at(10, 9, 0)), (at(10, 9, 0), at(10, 8, 0))] {
            let err = engine
                .create_manual_session(user(1), manual(start, end), at(11, 0, 0))
                .unwrap_err();
            assert!(matches!(err, WorktallyError::Validation(_)));
        }
    }

    #[test]
    fn manual_rejects_five_digit_years() {
        let engine = engine();
        let far = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 10000, 1, 1, 9, 0, 0).unwrap();
        let err = engine
            .create_manual_session(user(1), manual(far, far + Duration::hours(1)), at(11, 0, 0))
            .unwrap_err();
        assert!(matches!(err, WorktallyError::Validation(_)));

        let err = engine
            .create_manual_session(user(1), manual(at(10, 9, 0), far), at(11, 0, 0))
            .unwrap_err();
        assert!(matches!(err, WorktallyError::Validation(_)));
        assert!(engine.list_sessions(user(1), &SessionFilter::default()).unwrap().is_empty());

        let filter = SessionFilter {
            end: Some(far),
            ..Default::default()
        };
        assert!(matches!(
            engine.list_sessions(user(1), &filter),
            Err(WorktallyError::Validation(_))
        ));
    }

    #[test]
    fn manual_entry_allowed_while_timer_runs() {
        let engine = engine();
        engine.start_session(user(1), None, None, None, at(10, 9, 0)).unwrap();
        engine
            .create_manual_session(user(1), manual(at(9, 9, 0), at(9, 10, 0)), at(10, 9, 5))
            .unwrap();
        assert!(engine.get_active_session(user(1), at(10, 9, 5)).unwrap().is_some());
    }

    #[test]
    fn active_session_reports_elapsed() {
        let engine = engine();
        engine.start_session(user(1), None, None, None, at(10, 9, 0)).unwrap();
        let active = engine
            .get_active_session(user(1), at(10, 9, 30))
            .unwrap()
            .unwrap();
        assert_eq!(active.elapsed_seconds, 1800);
        assert!(engine.get_active_session(user(2), at(10, 9, 30)).unwrap().is_none());
    }

    #[test]
    fn get_and_delete_check_owner() {
        let engine = engine();
        let sessions = engine
            .create_manual_session(user(1), manual(at(10, 9, 0), at(10, 10, 0)), at(10, 11, 0))
            .unwrap();
        let id = sessions[0].id;

        assert!(matches!(
            engine.get_session(user(2), id),
            Err(WorktallyError::Ownership(_))
        ));
        assert!(matches!(
            engine.delete_session(user(2), id, false),
            Err(WorktallyError::Ownership(_))
        ));
        assert!(matches!(
            engine.get_session(user(1), SessionId::new(999)),
            Err(WorktallyError::NotFound(_))
        ));

        engine.delete_session(user(1), id, false).unwrap();
        assert!(matches!(
            engine.delete_session(user(1), id, false),
            Err(WorktallyError::NotFound(_))
        ));
    }

    #[test]
    fn admin_may_delete_any_session() {
        let engine = engine();
        let sessions = engine
            .create_manual_session(user(1), manual(at(10, 9, 0), at(10, 10, 0)), at(10, 11, 0))
            .unwrap();
        let deleted = engine.delete_session(user(99), sessions[0].id, true).unwrap();
        assert_eq!(deleted.user_id, user(1));
    }

    #[test]
    fn list_rejects_inverted_filter() {
        let engine = engine();
        let filter = SessionFilter {
            start: Some(at(12, 0, 0)),
            end: Some(at(11, 0, 0)),
            ..Default::default()
        };
        assert!(matches!(
            engine.list_sessions(user(1), &filter),
            Err(WorktallyError::Validation(_))
        ));
    }
}
