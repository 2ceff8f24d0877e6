//! Core engine

use std::sync::Arc;
use tracing::info;
use worktally_api::Category;
use worktally_config::SessionRules;
use worktally_store::Store;
use worktally_util::{CategoryId, Result, UserId, WorktallyError};

/// The core engine.
///
/// Owns no mutable state of its own beyond the input rules; every invariant
/// lives in the store. Callers supply `now` so behaviour is reproducible.
pub struct CoreEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) rules: SessionRules,
}

impl CoreEngine {
    pub fn new(store: Arc<dyn Store>, rules: SessionRules) -> Self {
        info!(
            max_note_length = rules.max_note_length,
            max_multiplier = rules.max_effectiveness_multiplier,
            "Core engine initialized"
        );
        Self { store, rules }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn rules(&self) -> &SessionRules {
        &self.rules
    }

    /// Swap in new input rules after a config reload
    pub fn set_rules(&mut self, rules: SessionRules) {
        info!(
            max_note_length = rules.max_note_length,
            max_multiplier = rules.max_effectiveness_multiplier,
            "Session rules updated"
        );
        self.rules = rules;
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    /// Load a category and check that `user` owns it
    pub(crate) fn owned_category(&self, user: UserId, id: CategoryId) -> Result<Category> {
        let category = self
            .store
            .get_category(id)?
            .ok_or_else(|| WorktallyError::not_found(format!("Category {}", id)))?;
        if category.user_id != user {
            return Err(WorktallyError::ownership(format!("Category {}", id)));
        }
        Ok(category)
    }

    /// Normalize an optional note: blank becomes `None`, length is capped
    pub(crate) fn check_note(&self, note: Option<String>) -> Result<Option<String>> {
        let Some(note) = note else {
            return Ok(None);
        };
        if note.trim().is_empty() {
            return Ok(None);
        }
        let len = note.chars().count();
        if len > self.rules.max_note_length {
            return Err(WorktallyError::validation(format!(
                "note is {} characters, the limit is {}",
                len, self.rules.max_note_length
            )));
        }
        Ok(Some(note))
    }

    /// Resolve the multiplier, defaulting to 1.0
    pub(crate) fn check_multiplier(&self, multiplier: Option<f64>) -> Result<f64> {
        let value = multiplier.unwrap_or(1.0);
        let max = self.rules.max_effectiveness_multiplier;
        if !value.is_finite() || value <= 0.0 || value > max {
            return Err(WorktallyError::validation(format!(
                "effectiveness multiplier must be in (0, {}], got {}",
                max, value
            )));
        }
        Ok(value)
    }
}

/// Effective time for a session: `duration * multiplier`, rounded half up.
pub fn effective_seconds(duration_seconds: i64, multiplier: f64) -> i64 {
    (duration_seconds as f64 * multiplier).round() as i64
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use worktally_store::SqliteStore;

    pub fn engine() -> CoreEngine {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        CoreEngine::new(store, SessionRules::default())
    }

    pub fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, d, h, m, 0).unwrap()
    }

    pub fn user(id: i64) -> UserId {
        UserId::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn effective_rounds_half_up() {
        assert_eq!(effective_seconds(3600, 1.0), 3600);
        assert_eq!(effective_seconds(5, 1.5), 8);
        assert_eq!(effective_seconds(3, 0.5), 2);
        assert_eq!(effective_seconds(1, 0.4), 0);
    }

    #[test]
    fn note_rules() {
        let engine = engine();
        assert_eq!(engine.check_note(Some("  ".into())).unwrap(), None);
        assert_eq!(engine.check_note(Some("ok".into())).unwrap().as_deref(), Some("ok"));

        let long = "é".repeat(501);
        assert!(matches!(
            engine.check_note(Some(long)),
            Err(WorktallyError::Validation(_))
        ));
        assert!(engine.check_note(Some("é".repeat(500))).is_ok());
    }

    #[test]
    fn multiplier_rules() {
        let engine = engine();
        assert_eq!(engine.check_multiplier(None).unwrap(), 1.0);
        assert_eq!(engine.check_multiplier(Some(1.25)).unwrap(), 1.25);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 11.0] {
            assert!(engine.check_multiplier(Some(bad)).is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn category_ownership() {
        let engine = engine();
        let cat = engine
            .store
            .insert_category(user(1), "Deep work", None, at(1, 0, 0))
            .unwrap();

        assert!(engine.owned_category(user(1), cat.id).is_ok());
        assert!(matches!(
            engine.owned_category(user(2), cat.id),
            Err(WorktallyError::Ownership(_))
        ));
        assert!(matches!(
            engine.owned_category(user(1), CategoryId::new(99)),
            Err(WorktallyError::NotFound(_))
        ));
    }
}
