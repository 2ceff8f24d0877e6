//! Dispatch of engine-backed IPC commands

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use worktally_api::{
    ClientInfo, ClientRole, Command, EvaluationRun, EvaluationScope, EventPayload,
    ResponsePayload,
};
use worktally_core::CoreEngine;
use worktally_store::{AuditEvent, AuditEventType};
use worktally_util::{Result, UserId, WorktallyError};

/// Successful command outcome plus the event to broadcast, if any
#[derive(Debug)]
pub(crate) struct Handled {
    pub payload: ResponsePayload,
    pub event: Option<EventPayload>,
}

impl Handled {
    fn quiet(payload: ResponsePayload) -> Self {
        Self {
            payload,
            event: None,
        }
    }

    fn with_event(payload: ResponsePayload, event: EventPayload) -> Self {
        Self {
            payload,
            event: Some(event),
        }
    }
}

/// Where an evaluation run came from, as recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Schedule,
    Backfill,
    Ipc,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Schedule => "schedule",
            Trigger::Backfill => "backfill",
            Trigger::Ipc => "ipc",
        }
    }
}

fn audit(engine: &CoreEngine, event: AuditEventType) {
    if let Err(e) = engine.store().append_audit(AuditEvent::new(event)) {
        warn!(error = %e, "Failed to append audit event");
    }
}

/// Run `evaluate_for_date` and record the outcome in the audit log
pub(crate) fn run_evaluation(
    engine: &CoreEngine,
    date: NaiveDate,
    scope: EvaluationScope,
    trigger: Trigger,
    now: DateTime<Utc>,
) -> Result<EvaluationRun> {
    match engine.evaluate_for_date(date, scope, now) {
        Ok(evaluations) => {
            let run = EvaluationRun { date, evaluations };
            info!(
                %date,
                trigger = trigger.as_str(),
                evaluated = run.evaluations.len(),
                met = run.met_count(),
                missed = run.missed_count(),
                "Evaluation run complete"
            );
            audit(
                engine,
                AuditEventType::EvaluationRun {
                    date,
                    trigger: trigger.as_str().to_string(),
                    evaluated: run.evaluations.len(),
                    met: run.met_count(),
                    missed: run.missed_count(),
                },
            );
            Ok(run)
        }
        Err(e) => {
            audit(
                engine,
                AuditEventType::EvaluationFailed {
                    date,
                    trigger: trigger.as_str().to_string(),
                    error: e.to_string(),
                },
            );
            Err(e)
        }
    }
}

pub(crate) fn evaluation_event(run: &EvaluationRun) -> EventPayload {
    EventPayload::EvaluationCompleted {
        date: run.date,
        evaluated: run.evaluations.len(),
        met: run.met_count(),
        missed: run.missed_count(),
    }
}

fn evaluation_scope(role: ClientRole, user_id: Option<UserId>) -> Result<EvaluationScope> {
    match user_id {
        Some(user) => Ok(EvaluationScope::User(user)),
        None if role.can_evaluate_all() => Ok(EvaluationScope::AllUsers),
        None => Err(WorktallyError::permission(
            "Admin role required to evaluate all users",
        )),
    }
}

/// A non-admin client acts only as the user id equal to its peer uid
fn check_acting_user(client: &ClientInfo, command: &Command) -> Result<()> {
    if client.role.can_act_as_any_user() {
        return Ok(());
    }
    let Some(user) = command.user_id() else {
        return Ok(());
    };
    match client.uid {
        Some(uid) if i64::from(uid) == user.get() => Ok(()),
        uid => {
            warn!(
                client_id = %client.client_id,
                ?uid,
                user_id = %user,
                "Client tried to act as another user"
            );
            Err(WorktallyError::permission(format!(
                "client may not act as user {}",
                user
            )))
        }
    }
}

/// Handle a command that maps onto a `CoreEngine` operation.
///
/// Service-level commands (config reload, subscriptions, health, ping) are
/// answered by the service itself and rejected here.
pub(crate) fn handle_engine_command(
    engine: &CoreEngine,
    client: &ClientInfo,
    command: Command,
    now: DateTime<Utc>,
) -> Result<Handled> {
    check_acting_user(client, &command)?;
    let role = client.role;
    match command {
        Command::StartSession {
            user_id,
            category_id,
            note,
            effectiveness_multiplier,
        } => {
            let session =
                engine.start_session(user_id, category_id, note, effectiveness_multiplier, now)?;
            let event = EventPayload::SessionStarted {
                session_id: session.id,
                user_id,
                start_time: session.start_time,
            };
            Ok(Handled::with_event(ResponsePayload::Session(session), event))
        }

        Command::StopSession { user_id, note } => {
            let session = engine.stop_session(user_id, note, now)?;
            let event = EventPayload::SessionStopped {
                session_id: session.id,
                user_id,
                duration_seconds: session.duration_seconds.unwrap_or_default(),
            };
            Ok(Handled::with_event(ResponsePayload::Session(session), event))
        }

        Command::CreateManualSession { user_id, entry } => {
            let sessions = engine.create_manual_session(user_id, entry, now)?;
            let event = EventPayload::SessionsRecorded {
                user_id,
                session_ids: sessions.iter().map(|s| s.id).collect(),
            };
            Ok(Handled::with_event(ResponsePayload::Sessions { sessions }, event))
        }

        Command::GetActiveSession { user_id } => {
            let active = engine.get_active_session(user_id, now)?;
            Ok(Handled::quiet(ResponsePayload::ActiveSession { active }))
        }

        Command::ListSessions { user_id, filter } => {
            let sessions = engine.list_sessions(user_id, &filter)?;
            Ok(Handled::quiet(ResponsePayload::Sessions { sessions }))
        }

        Command::GetSession { user_id, session_id } => {
            let session = engine.get_session(user_id, session_id)?;
            Ok(Handled::quiet(ResponsePayload::Session(session)))
        }

        Command::DeleteSession { user_id, session_id } => {
            let session = engine.delete_session(user_id, session_id, role.can_moderate_sessions())?;
            audit(
                engine,
                AuditEventType::SessionDeleted {
                    session_id,
                    owner: session.user_id,
                    by_admin: session.user_id != user_id,
                },
            );
            let event = EventPayload::SessionDeleted {
                session_id,
                user_id: session.user_id,
            };
            Ok(Handled::with_event(
                ResponsePayload::SessionDeleted { session_id },
                event,
            ))
        }

        Command::CreateCategory {
            user_id,
            name,
            color,
        } => {
            let category = engine.create_category(user_id, &name, color.as_deref(), now)?;
            Ok(Handled::quiet(ResponsePayload::Category(category)))
        }

        Command::ListCategories {
            user_id,
            include_archived,
        } => {
            let categories = engine.list_categories(user_id, include_archived)?;
            Ok(Handled::quiet(ResponsePayload::Categories { categories }))
        }

        Command::ArchiveCategory {
            user_id,
            category_id,
        } => {
            let category = engine.archive_category(user_id, category_id)?;
            Ok(Handled::quiet(ResponsePayload::Category(category)))
        }

        Command::CreateTarget { user_id, target } => {
            let target = engine.create_target(user_id, target, now)?;
            Ok(Handled::quiet(ResponsePayload::Target(target)))
        }

        Command::ListTargets {
            user_id,
            include_inactive,
        } => {
            let targets = engine.list_targets(user_id, include_inactive)?;
            Ok(Handled::quiet(ResponsePayload::Targets { targets }))
        }

        Command::UpdateTarget {
            user_id,
            target_id,
            update,
        } => {
            let target = engine.update_target(user_id, target_id, update, now)?;
            Ok(Handled::quiet(ResponsePayload::Target(target)))
        }

        Command::EvaluateForDate { date, user_id } => {
            let scope = evaluation_scope(role, user_id)?;
            let date = date.unwrap_or_else(|| now.date_naive());
            let run = run_evaluation(engine, date, scope, Trigger::Ipc, now)?;
            let event = evaluation_event(&run);
            Ok(Handled::with_event(ResponsePayload::EvaluationRun(run), event))
        }

        Command::ListEvaluations { user_id, filter } => {
            let evaluations = engine.list_evaluations(user_id, &filter)?;
            Ok(Handled::quiet(ResponsePayload::Evaluations { evaluations }))
        }

        Command::ListNotifications {
            user_id,
            unread_only,
        } => {
            let notifications = engine.list_notifications(user_id, unread_only)?;
            Ok(Handled::quiet(ResponsePayload::Notifications { notifications }))
        }

        Command::MarkNotificationRead {
            user_id,
            notification_id,
        } => {
            let notification = engine.mark_notification_read(user_id, notification_id, now)?;
            Ok(Handled::quiet(ResponsePayload::Notification(notification)))
        }

        Command::ListPunishments { user_id } => {
            let punishments = engine.list_punishments(user_id)?;
            Ok(Handled::quiet(ResponsePayload::Punishments { punishments }))
        }

        Command::ReloadConfig
        | Command::SubscribeEvents
        | Command::UnsubscribeEvents
        | Command::GetHealth
        | Command::Ping => Err(WorktallyError::internal(
            "service command routed to the engine",
        )),
    }
}
