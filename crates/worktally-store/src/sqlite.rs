//! SQLite-based store implementation
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`),
//! so range filters and ordering work on the raw column values.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};
use worktally_api::{
    Category, EvaluationFilter, Notification, PunishmentEvent, PunishmentPayload, Session,
    SessionFilter, TargetPeriod, TargetUpdate, UnknownVariant, WorkEvaluation, WorkTarget,
};
use worktally_util::{
    format_timestamp, parse_timestamp, CategoryId, EvaluationId, NotificationId, PunishmentId,
    SessionId, TargetId, UserId,
};

use crate::{
    AuditEvent, EvaluationWrite, RecordedEvaluation, SessionDraft, SessionFinish, Store,
    StoreError, StoreResult, TargetDraft,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SESSION_COLUMNS: &str = "id, user_id, category_id, start_time, end_time, duration_seconds, \
     effectiveness_multiplier, effective_seconds, note, source, created_at";

const CATEGORY_COLUMNS: &str = "id, user_id, name, color, is_archived, created_at";

const TARGET_COLUMNS: &str = "id, user_id, target_seconds, period, include_category_ids, \
     effective_from, is_active, created_at, updated_at";

const EVALUATION_COLUMNS: &str = "id, user_id, target_id, period_start, period_end, \
     actual_seconds, target_seconds, status, deficit_seconds, created_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, created_at, read_at";

const PUNISHMENT_COLUMNS: &str = "id, user_id, evaluation_id, rule_type, payload_json, created_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                color TEXT,
                is_archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            -- Names are unique among a user's active categories
            CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_active_name
                ON categories(user_id, name) WHERE is_archived = 0;

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category_id INTEGER REFERENCES categories(id),
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_seconds INTEGER,
                effectiveness_multiplier REAL NOT NULL DEFAULT 1.0,
                effective_seconds INTEGER,
                note TEXT,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL,
                CHECK (end_time IS NULL OR end_time >= start_time)
            );

            -- At most one running timer per user
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active
                ON sessions(user_id) WHERE end_time IS NULL;
            CREATE INDEX IF NOT EXISTS idx_sessions_user_start
                ON sessions(user_id, start_time);

            CREATE TABLE IF NOT EXISTS work_targets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                target_seconds INTEGER NOT NULL CHECK (target_seconds > 0),
                period TEXT NOT NULL,
                include_category_ids TEXT NOT NULL DEFAULT '[]',
                effective_from TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_targets_user ON work_targets(user_id);

            -- One evaluation per target and day
            CREATE TABLE IF NOT EXISTS work_evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL REFERENCES work_targets(id),
                period_date TEXT NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                actual_seconds INTEGER NOT NULL,
                target_seconds INTEGER NOT NULL,
                status TEXT NOT NULL,
                deficit_seconds INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (target_id, period_date)
            );
            CREATE INDEX IF NOT EXISTS idx_evaluations_user
                ON work_evaluations(user_id, period_date);

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT,
                created_at TEXT NOT NULL,
                read_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);

            CREATE TABLE IF NOT EXISTS punishment_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                evaluation_id INTEGER NOT NULL UNIQUE REFERENCES work_evaluations(id),
                rule_type TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_punishments_user ON punishment_events(user_id);

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s).map_err(|e| conversion_error(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_timestamp(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn label_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_error(idx, e))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        category_id: row.get::<_, Option<i64>>(2)?.map(CategoryId::new),
        start_time: ts_col(row, 3)?,
        end_time: opt_ts_col(row, 4)?,
        duration_seconds: row.get(5)?,
        effectiveness_multiplier: row.get(6)?,
        effective_seconds: row.get(7)?,
        note: row.get(8)?,
        source: label_col(row, 9)?,
        created_at: ts_col(row, 10)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        name: row.get(2)?,
        color: row.get(3)?,
        is_archived: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<WorkTarget> {
    Ok(WorkTarget {
        id: TargetId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        target_seconds: row.get(2)?,
        period: label_col(row, 3)?,
        include_category_ids: json_col(row, 4)?,
        effective_from: ts_col(row, 5)?,
        is_active: row.get(6)?,
        created_at: ts_col(row, 7)?,
        updated_at: ts_col(row, 8)?,
    })
}

fn evaluation_from_row(row: &Row<'_>) -> rusqlite::Result<WorkEvaluation> {
    Ok(WorkEvaluation {
        id: EvaluationId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        target_id: TargetId::new(row.get(2)?),
        period_start: ts_col(row, 3)?,
        period_end: ts_col(row, 4)?,
        actual_seconds: row.get(5)?,
        target_seconds: row.get(6)?,
        status: label_col(row, 7)?,
        deficit_seconds: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: NotificationId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        kind: label_col(row, 2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        created_at: ts_col(row, 5)?,
        read_at: opt_ts_col(row, 6)?,
    })
}

fn punishment_from_row(row: &Row<'_>) -> rusqlite::Result<PunishmentEvent> {
    Ok(PunishmentEvent {
        id: PunishmentId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        evaluation_id: EvaluationId::new(row.get(2)?),
        rule_type: label_col(row, 3)?,
        payload: json_col::<PunishmentPayload>(row, 4)?,
        created_at: ts_col(row, 5)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Fetch one row by primary key
fn fetch_by_id<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    id: i64,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> StoreResult<Option<T>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns, table);
    Ok(conn.query_row(&sql, [id], map).optional()?)
}

fn require<T>(found: Option<T>, what: impl FnOnce() -> String) -> StoreResult<T> {
    found.ok_or_else(|| StoreError::NotFound(what()))
}

fn collect_rows<T>(
    conn: &Connection,
    sql: &str,
    args: Vec<Value>,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(args), map)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn insert_session_row(conn: &Connection, draft: &SessionDraft) -> StoreResult<Session> {
    let result = conn.execute(
        r#"
        INSERT INTO sessions (user_id, category_id, start_time, end_time, duration_seconds,
                              effectiveness_multiplier, effective_seconds, note, source, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            draft.user_id.get(),
            draft.category_id.map(CategoryId::get),
            format_timestamp(&draft.start_time),
            draft.end_time.as_ref().map(format_timestamp),
            draft.duration_seconds,
            draft.effectiveness_multiplier,
            draft.effective_seconds,
            draft.note,
            draft.source.as_str(),
            format_timestamp(&draft.created_at),
        ],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(StoreError::Conflict(format!(
                "user {} already has an active session",
                draft.user_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    debug!(session_id = id, user_id = %draft.user_id, source = %draft.source, "Session inserted");
    let session = fetch_by_id(conn, "sessions", SESSION_COLUMNS, id, session_from_row)?;
    require(session, || format!("Session {}", id))
}

impl Store for SqliteStore {
    fn insert_category(
        &self,
        user_id: UserId,
        name: &str,
        color: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Category> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = tx.execute(
            "INSERT INTO categories (user_id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id.get(), name, color, format_timestamp(&created_at)],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(format!(
                    "user {} already has an active category named '{}'",
                    user_id, name
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        let category = fetch_by_id(&tx, "categories", CATEGORY_COLUMNS, id, category_from_row)?;
        let category = require(category, || format!("Category {}", id))?;
        tx.commit()?;
        debug!(category_id = id, user_id = %user_id, "Category inserted");
        Ok(category)
    }

    fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let conn = self.lock()?;
        fetch_by_id(&conn, "categories", CATEGORY_COLUMNS, id.get(), category_from_row)
    }

    fn list_categories(&self, user_id: UserId, include_archived: bool) -> StoreResult<Vec<Category>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {} FROM categories WHERE user_id = ?", CATEGORY_COLUMNS);
        if !include_archived {
            sql.push_str(" AND is_archived = 0");
        }
        sql.push_str(" ORDER BY name COLLATE NOCASE, id");
        collect_rows(&conn, &sql, vec![Value::Integer(user_id.get())], category_from_row)
    }

    fn set_category_archived(&self, id: CategoryId, archived: bool) -> StoreResult<Category> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE categories SET is_archived = ?1 WHERE id = ?2",
            params![archived, id.get()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("Category {}", id)));
        }
        let category = fetch_by_id(&conn, "categories", CATEGORY_COLUMNS, id.get(), category_from_row)?;
        require(category, || format!("Category {}", id))
    }

    fn insert_session(&self, draft: &SessionDraft) -> StoreResult<Session> {
        let conn = self.lock()?;
        insert_session_row(&conn, draft)
    }

    fn insert_sessions(&self, drafts: &[SessionDraft]) -> StoreResult<Vec<Session>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut sessions = Vec::with_capacity(drafts.len());
        for draft in drafts {
            sessions.push(insert_session_row(&tx, draft)?);
        }

        tx.commit()?;
        debug!(count = sessions.len(), "Session batch committed");
        Ok(sessions)
    }

    fn get_session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        fetch_by_id(&conn, "sessions", SESSION_COLUMNS, id.get(), session_from_row)
    }

    fn get_active_session(&self, user_id: UserId) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sessions WHERE user_id = ?1 AND end_time IS NULL",
            SESSION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, [user_id.get()], session_from_row)
            .optional()?)
    }

    fn finish_session(&self, id: SessionId, finish: &SessionFinish) -> StoreResult<Session> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
            UPDATE sessions
            SET end_time = ?1, duration_seconds = ?2, effective_seconds = ?3,
                note = COALESCE(?4, note)
            WHERE id = ?5 AND end_time IS NULL
            "#,
            params![
                format_timestamp(&finish.end_time),
                finish.duration_seconds,
                finish.effective_seconds,
                finish.note,
                id.get(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("Active session {}", id)));
        }

        debug!(session_id = %id, duration_seconds = finish.duration_seconds, "Session finished");
        let session = fetch_by_id(&conn, "sessions", SESSION_COLUMNS, id.get(), session_from_row)?;
        require(session, || format!("Session {}", id))
    }

    fn delete_session(&self, id: SessionId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.get()])?;
        debug!(session_id = %id, deleted = changed > 0, "Session delete");
        Ok(changed > 0)
    }

    fn list_sessions(&self, user_id: UserId, filter: &SessionFilter) -> StoreResult<Vec<Session>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {} FROM sessions WHERE user_id = ?", SESSION_COLUMNS);
        let mut args = vec![Value::Integer(user_id.get())];

        if let Some(start) = &filter.start {
            sql.push_str(" AND start_time >= ?");
            args.push(Value::Text(format_timestamp(start)));
        }
        if let Some(end) = &filter.end {
            sql.push_str(" AND start_time <= ?");
            args.push(Value::Text(format_timestamp(end)));
        }
        if let Some(category) = filter.category_id {
            sql.push_str(" AND category_id = ?");
            args.push(Value::Integer(category.get()));
        }
        if !filter.include_active {
            sql.push_str(" AND end_time IS NOT NULL");
        }
        sql.push_str(" ORDER BY start_time DESC, id DESC");

        collect_rows(&conn, &sql, args, session_from_row)
    }

    fn sum_completed_seconds(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        categories: &[CategoryId],
    ) -> StoreResult<i64> {
        let conn = self.lock()?;
        let mut sql = String::from(
            "SELECT COALESCE(SUM(duration_seconds), 0) FROM sessions \
             WHERE user_id = ? AND end_time IS NOT NULL AND start_time >= ? AND start_time <= ?",
        );
        let mut args = vec![
            Value::Integer(user_id.get()),
            Value::Text(format_timestamp(&start)),
            Value::Text(format_timestamp(&end)),
        ];

        if !categories.is_empty() {
            let placeholders = vec!["?"; categories.len()].join(", ");
            sql.push_str(&format!(" AND category_id IN ({})", placeholders));
            args.extend(categories.iter().map(|c| Value::Integer(c.get())));
        }

        let total: i64 = conn.query_row(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(total)
    }

    fn insert_target(&self, draft: &TargetDraft) -> StoreResult<WorkTarget> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let created = format_timestamp(&draft.created_at);
        tx.execute(
            r#"
            INSERT INTO work_targets (user_id, target_seconds, period, include_category_ids,
                                      effective_from, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            "#,
            params![
                draft.user_id.get(),
                draft.target_seconds,
                draft.period.as_str(),
                serde_json::to_string(&draft.include_category_ids)?,
                format_timestamp(&draft.effective_from),
                created,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let target = fetch_by_id(&tx, "work_targets", TARGET_COLUMNS, id, target_from_row)?;
        let target = require(target, || format!("Target {}", id))?;
        tx.commit()?;
        debug!(target_id = id, user_id = %draft.user_id, period = %draft.period, "Target inserted");
        Ok(target)
    }

    fn get_target(&self, id: TargetId) -> StoreResult<Option<WorkTarget>> {
        let conn = self.lock()?;
        fetch_by_id(&conn, "work_targets", TARGET_COLUMNS, id.get(), target_from_row)
    }

    fn list_targets(&self, user_id: UserId, include_inactive: bool) -> StoreResult<Vec<WorkTarget>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {} FROM work_targets WHERE user_id = ?", TARGET_COLUMNS);
        if !include_inactive {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY id");
        collect_rows(&conn, &sql, vec![Value::Integer(user_id.get())], target_from_row)
    }

    fn update_target(
        &self,
        id: TargetId,
        update: &TargetUpdate,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<WorkTarget> {
        let conn = self.lock()?;
        let categories = update
            .include_category_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let changed = conn.execute(
            r#"
            UPDATE work_targets
            SET target_seconds = COALESCE(?1, target_seconds),
                include_category_ids = COALESCE(?2, include_category_ids),
                is_active = COALESCE(?3, is_active),
                updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                update.target_seconds,
                categories,
                update.is_active,
                format_timestamp(&updated_at),
                id.get(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("Target {}", id)));
        }

        debug!(target_id = %id, "Target updated");
        let target = fetch_by_id(&conn, "work_targets", TARGET_COLUMNS, id.get(), target_from_row)?;
        require(target, || format!("Target {}", id))
    }

    fn pending_targets(
        &self,
        period: TargetPeriod,
        date: NaiveDate,
        user_id: Option<UserId>,
    ) -> StoreResult<Vec<WorkTarget>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"
            SELECT {} FROM work_targets t
            WHERE t.is_active = 1
              AND t.period = ?1
              AND t.effective_from <= ?2
              AND (?3 IS NULL OR t.user_id = ?3)
              AND NOT EXISTS (
                  SELECT 1 FROM work_evaluations e
                  WHERE e.target_id = t.id AND e.period_date = ?4
              )
            ORDER BY t.id
            "#,
            TARGET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                period.as_str(),
                format_timestamp(&worktally_util::end_of_day(date)),
                user_id.map(UserId::get),
                date.format(DATE_FORMAT).to_string(),
            ],
            target_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn record_evaluation(&self, write: &EvaluationWrite) -> StoreResult<Option<RecordedEvaluation>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let created = format_timestamp(&write.created_at);

        let inserted = tx.execute(
            r#"
            INSERT INTO work_evaluations (user_id, target_id, period_date, period_start, period_end,
                                          actual_seconds, target_seconds, status, deficit_seconds,
                                          created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                write.user_id.get(),
                write.target_id.get(),
                write.period_start.date_naive().format(DATE_FORMAT).to_string(),
                format_timestamp(&write.period_start),
                format_timestamp(&write.period_end),
                write.actual_seconds,
                write.target_seconds,
                write.status.as_str(),
                write.deficit_seconds,
                created,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(target_id = %write.target_id, "Evaluation already recorded, discarding");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        let evaluation_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO notifications (user_id, kind, title, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                write.user_id.get(),
                write.notification.kind.as_str(),
                write.notification.title,
                write.notification.body,
                created,
            ],
        )?;
        let notification_id = tx.last_insert_rowid();

        let punishment_id = match &write.punishment {
            Some(punishment) => {
                tx.execute(
                    r#"
                    INSERT INTO punishment_events (user_id, evaluation_id, rule_type, payload_json, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        write.user_id.get(),
                        evaluation_id,
                        punishment.rule_type.as_str(),
                        serde_json::to_string(&punishment.payload)?,
                        created,
                    ],
                )?;
                Some(tx.last_insert_rowid())
            }
            None => None,
        };

        let evaluation = require(
            fetch_by_id(&tx, "work_evaluations", EVALUATION_COLUMNS, evaluation_id, evaluation_from_row)?,
            || format!("Evaluation {}", evaluation_id),
        )?;
        let notification = require(
            fetch_by_id(&tx, "notifications", NOTIFICATION_COLUMNS, notification_id, notification_from_row)?,
            || format!("Notification {}", notification_id),
        )?;
        let punishment = match punishment_id {
            Some(id) => Some(require(
                fetch_by_id(&tx, "punishment_events", PUNISHMENT_COLUMNS, id, punishment_from_row)?,
                || format!("Punishment {}", id),
            )?),
            None => None,
        };

        tx.commit()?;
        debug!(
            evaluation_id,
            target_id = %write.target_id,
            status = %write.status,
            "Evaluation recorded"
        );

        Ok(Some(RecordedEvaluation {
            evaluation,
            notification,
            punishment,
        }))
    }

    fn list_evaluations(
        &self,
        user_id: UserId,
        filter: &EvaluationFilter,
    ) -> StoreResult<Vec<WorkEvaluation>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {} FROM work_evaluations WHERE user_id = ?", EVALUATION_COLUMNS);
        let mut args = vec![Value::Integer(user_id.get())];

        if let Some(start) = filter.start_date {
            sql.push_str(" AND period_date >= ?");
            args.push(Value::Text(start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = filter.end_date {
            sql.push_str(" AND period_date <= ?");
            args.push(Value::Text(end.format(DATE_FORMAT).to_string()));
        }
        if let Some(target) = filter.target_id {
            sql.push_str(" AND target_id = ?");
            args.push(Value::Integer(target.get()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        collect_rows(&conn, &sql, args, evaluation_from_row)
    }

    fn get_notification(&self, id: NotificationId) -> StoreResult<Option<Notification>> {
        let conn = self.lock()?;
        fetch_by_id(&conn, "notifications", NOTIFICATION_COLUMNS, id.get(), notification_from_row)
    }

    fn list_notifications(&self, user_id: UserId, unread_only: bool) -> StoreResult<Vec<Notification>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {} FROM notifications WHERE user_id = ?", NOTIFICATION_COLUMNS);
        if unread_only {
            sql.push_str(" AND read_at IS NULL");
        }
        sql.push_str(" ORDER BY (read_at IS NOT NULL), created_at DESC, id DESC");
        collect_rows(&conn, &sql, vec![Value::Integer(user_id.get())], notification_from_row)
    }

    fn mark_notification_read(
        &self,
        id: NotificationId,
        read_at: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?1) WHERE id = ?2",
            params![format_timestamp(&read_at), id.get()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("Notification {}", id)));
        }
        let notification =
            fetch_by_id(&conn, "notifications", NOTIFICATION_COLUMNS, id.get(), notification_from_row)?;
        require(notification, || format!("Notification {}", id))
    }

    fn list_punishments(&self, user_id: UserId) -> StoreResult<Vec<PunishmentEvent>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM punishment_events WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            PUNISHMENT_COLUMNS
        );
        collect_rows(&conn, &sql, vec![Value::Integer(user_id.get())], punishment_from_row)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?1, ?2)",
            params![format_timestamp(&event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");
        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(AuditEvent {
                id: row.get(0)?,
                timestamp: ts_col(row, 1)?,
                event: json_col(row, 2)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
