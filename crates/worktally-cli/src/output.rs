//! Plain-text rendering of daemon responses

use std::fmt::Write;
use worktally_api::{
    Category, ErrorCode, Event, EventPayload, Notification, ResponsePayload, Session,
    WorkEvaluation, WorkTarget,
};
use worktally_util::format_duration;

/// Parse `4h`, `90m`, `1h30m`, `45s` or a plain number of seconds
pub fn parse_duration(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }

    let mut total: i64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("unexpected '{}' in duration '{}'", c, s)),
        };
        let value: i64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{}' in '{}'", c, s))?;
        total += value * unit;
        digits.clear();
    }
    if !digits.is_empty() || s.is_empty() {
        return Err(format!("invalid duration '{}'", s));
    }
    Ok(total)
}

pub fn error_code_label(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidRequest => "invalid request",
        ErrorCode::Validation => "validation",
        ErrorCode::Conflict => "conflict",
        ErrorCode::NotFound => "not found",
        ErrorCode::Ownership => "not yours",
        ErrorCode::PermissionDenied => "permission denied",
        ErrorCode::RateLimited => "rate limited",
        ErrorCode::ConfigError => "config error",
        ErrorCode::InternalError => "internal error",
    }
}

fn session_line(s: &Session) -> String {
    let start = s.start_time.format("%Y-%m-%d %H:%M:%S");
    let mut line = match (s.end_time, s.duration_seconds) {
        (Some(end), Some(duration)) => format!(
            "#{} {} .. {}  {}",
            s.id,
            start,
            end.format("%H:%M:%S"),
            format_duration(duration)
        ),
        _ => format!("#{} {} .. (running)", s.id, start),
    };
    if let Some(category) = s.category_id {
        let _ = write!(line, "  [category {}]", category);
    }
    if s.effectiveness_multiplier != 1.0 {
        let _ = write!(line, "  x{}", s.effectiveness_multiplier);
    }
    if let Some(note) = &s.note {
        let _ = write!(line, "  \"{}\"", note);
    }
    line
}

fn category_line(c: &Category) -> String {
    let mut line = format!("#{} {}", c.id, c.name);
    if let Some(color) = &c.color {
        let _ = write!(line, " {}", color);
    }
    if c.is_archived {
        line.push_str(" (archived)");
    }
    line
}

fn target_line(t: &WorkTarget) -> String {
    let scope = if t.include_category_ids.is_empty() {
        "all categories".to_string()
    } else {
        let ids: Vec<String> = t.include_category_ids.iter().map(|c| c.to_string()).collect();
        format!("categories {}", ids.join(","))
    };
    format!(
        "#{} {} {} ({}) from {}{}",
        t.id,
        t.period,
        format_duration(t.target_seconds),
        scope,
        t.effective_from.format("%Y-%m-%d"),
        if t.is_active { "" } else { " (inactive)" }
    )
}

fn evaluation_line(e: &WorkEvaluation) -> String {
    let mut line = format!(
        "{} target #{}: {} {} / {}",
        e.period_date(),
        e.target_id,
        e.status,
        format_duration(e.actual_seconds),
        format_duration(e.target_seconds)
    );
    if e.deficit_seconds > 0 {
        let _ = write!(line, " (short {})", format_duration(e.deficit_seconds));
    }
    line
}

fn notification_line(n: &Notification) -> String {
    let marker = if n.is_read() { " " } else { "*" };
    match &n.body {
        Some(body) => format!("{} #{} {}: {}", marker, n.id, n.title, body),
        None => format!("{} #{} {}", marker, n.id, n.title),
    }
}

fn lines<T>(items: &[T], empty: &str, f: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items.iter().map(f).collect::<Vec<_>>().join("\n")
}

pub fn render_payload(payload: &ResponsePayload) -> String {
    match payload {
        ResponsePayload::Session(s) => session_line(s),
        ResponsePayload::Sessions { sessions } => lines(sessions, "No sessions", session_line),
        ResponsePayload::ActiveSession { active: None } => "No running session".to_string(),
        ResponsePayload::ActiveSession {
            active: Some(active),
        } => format!(
            "{}  elapsed {}",
            session_line(&active.session),
            format_duration(active.elapsed_seconds)
        ),
        ResponsePayload::SessionDeleted { session_id } => format!("Deleted session #{}", session_id),
        ResponsePayload::Category(c) => category_line(c),
        ResponsePayload::Categories { categories } => {
            lines(categories, "No categories", category_line)
        }
        ResponsePayload::Target(t) => target_line(t),
        ResponsePayload::Targets { targets } => lines(targets, "No targets", target_line),
        ResponsePayload::EvaluationRun(run) => {
            let mut out = format!(
                "{}: {} evaluated, {} met, {} missed",
                run.date,
                run.evaluations.len(),
                run.met_count(),
                run.missed_count()
            );
            for e in &run.evaluations {
                out.push('\n');
                out.push_str(&evaluation_line(e));
            }
            out
        }
        ResponsePayload::Evaluations { evaluations } => {
            lines(evaluations, "No evaluations", evaluation_line)
        }
        ResponsePayload::Notification(n) => notification_line(n),
        ResponsePayload::Notifications { notifications } => {
            lines(notifications, "No notifications", notification_line)
        }
        ResponsePayload::Punishments { punishments } => lines(punishments, "No punishments", |p| {
            format!(
                "#{} {} {} (evaluation #{}, short {})",
                p.id,
                p.created_at.format("%Y-%m-%d"),
                p.rule_type,
                p.evaluation_id,
                format_duration(p.payload.deficit_seconds)
            )
        }),
        ResponsePayload::ConfigReloaded => "Configuration reloaded".to_string(),
        ResponsePayload::Subscribed { client_id } => format!("Subscribed as {}", client_id),
        ResponsePayload::Unsubscribed => "Unsubscribed".to_string(),
        ResponsePayload::Health(h) => {
            let next = h
                .next_evaluation_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "disabled".to_string());
            format!(
                "live: {}\nready: {}\nstore: {}\nnext evaluation: {}",
                h.live,
                h.ready,
                if h.store_ok { "ok" } else { "failing" },
                next
            )
        }
        ResponsePayload::Pong => "pong".to_string(),
    }
}

pub fn render_event(event: &Event) -> String {
    let time = event.timestamp.format("%H:%M:%S");
    let what = match &event.payload {
        EventPayload::SessionStarted {
            session_id,
            user_id,
            ..
        } => format!("user {} started session #{}", user_id, session_id),
        EventPayload::SessionStopped {
            session_id,
            user_id,
            duration_seconds,
        } => format!(
            "user {} stopped session #{} after {}",
            user_id,
            session_id,
            format_duration(*duration_seconds)
        ),
        EventPayload::SessionsRecorded {
            user_id,
            session_ids,
        } => format!("user {} recorded {} session(s)", user_id, session_ids.len()),
        EventPayload::SessionDeleted {
            session_id,
            user_id,
        } => format!("session #{} of user {} deleted", session_id, user_id),
        EventPayload::EvaluationCompleted {
            date,
            evaluated,
            met,
            missed,
        } => format!(
            "evaluated {}: {} targets, {} met, {} missed",
            date, evaluated, met, missed
        ),
        EventPayload::ConfigReloaded => "configuration reloaded".to_string(),
        EventPayload::Shutdown => "daemon shutting down".to_string(),
    };
    format!("[{}] {}", time, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use worktally_api::SessionSource;
    use worktally_util::{SessionId, UserId};

    #[test]
    fn durations() {
        assert_eq!(parse_duration("3600"), Ok(3600));
        assert_eq!(parse_duration("4h"), Ok(14400));
        assert_eq!(parse_duration("1h30m"), Ok(5400));
        assert_eq!(parse_duration("90m"), Ok(5400));
        assert_eq!(parse_duration("1m5s"), Ok(65));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("4x").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1h30").is_err());
    }

    fn session(end: bool) -> Session {
        let start = Utc.with_ymd_and_hms(2025, 12, 10, 9, 0, 0).unwrap();
        Session {
            id: SessionId::new(4),
            user_id: UserId::new(1),
            category_id: None,
            start_time: start,
            end_time: end.then(|| Utc.with_ymd_and_hms(2025, 12, 10, 11, 0, 0).unwrap()),
            duration_seconds: end.then_some(7200),
            effectiveness_multiplier: 1.0,
            effective_seconds: end.then_some(7200),
            note: Some("report".into()),
            source: SessionSource::Manual,
            created_at: start,
        }
    }

    #[test]
    fn session_rendering() {
        assert_eq!(
            session_line(&session(true)),
            "#4 2025-12-10 09:00:00 .. 11:00:00  2h 0m 0s  \"report\""
        );
        assert!(session_line(&session(false)).contains("(running)"));
        assert_eq!(
            render_payload(&ResponsePayload::Sessions { sessions: vec![] }),
            "No sessions"
        );
    }
}
