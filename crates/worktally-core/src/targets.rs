//! Category and target registries

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use worktally_api::{Category, NewTarget, TargetUpdate, WorkTarget};
use worktally_store::TargetDraft;
use worktally_util::{
    check_timestamp, truncate_to_micros, CategoryId, Result, TargetId, UserId, WorktallyError,
};

use crate::CoreEngine;

const MAX_CATEGORY_NAME: usize = 100;

fn check_category_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WorktallyError::validation("category name must not be empty"));
    }
    if name.chars().count() > MAX_CATEGORY_NAME {
        return Err(WorktallyError::validation(format!(
            "category name exceeds {} characters",
            MAX_CATEGORY_NAME
        )));
    }
    Ok(name)
}

/// `#RRGGBB`
fn check_color(color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(WorktallyError::validation(format!(
            "color '{}' is not of the form #RRGGBB",
            color
        )));
    }
    Ok(())
}

fn check_target_seconds(target_seconds: i64) -> Result<()> {
    if target_seconds <= 0 {
        return Err(WorktallyError::validation(format!(
            "target_seconds must be positive, got {}",
            target_seconds
        )));
    }
    Ok(())
}

impl CoreEngine {
    /// Fails with `Conflict` if `user` already has an active category of that name
    pub fn create_category(
        &self,
        user: UserId,
        name: &str,
        color: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Category> {
        let name = check_category_name(name)?;
        if let Some(color) = color {
            check_color(color)?;
        }

        let category = self
            .store
            .insert_category(user, name, color, truncate_to_micros(now))?;
        info!(user_id = %user, category_id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub fn list_categories(&self, user: UserId, include_archived: bool) -> Result<Vec<Category>> {
        Ok(self.store.list_categories(user, include_archived)?)
    }

    /// Archived categories stay valid references for sessions and targets
    pub fn archive_category(&self, user: UserId, id: CategoryId) -> Result<Category> {
        let category = self.owned_category(user, id)?;
        if category.is_archived {
            return Ok(category);
        }
        let category = self.store.set_category_archived(id, true)?;
        info!(user_id = %user, category_id = %id, "Category archived");
        Ok(category)
    }

    /// Owned, deduplicated include list in the order given
    fn check_included_categories(
        &self,
        user: UserId,
        ids: &[CategoryId],
    ) -> Result<Vec<CategoryId>> {
        let mut checked = Vec::with_capacity(ids.len());
        for id in ids {
            if checked.contains(id) {
                continue;
            }
            self.owned_category(user, *id)?;
            checked.push(*id);
        }
        Ok(checked)
    }

    pub fn create_target(
        &self,
        user: UserId,
        target: NewTarget,
        now: DateTime<Utc>,
    ) -> Result<WorkTarget> {
        check_target_seconds(target.target_seconds)?;
        let effective_from = target
            .effective_from
            .map(|from| check_timestamp("effective_from", from))
            .transpose()?;
        let include_category_ids = self.check_included_categories(user, &target.include_category_ids)?;

        let now = truncate_to_micros(now);
        let created = self.store.insert_target(&TargetDraft {
            user_id: user,
            target_seconds: target.target_seconds,
            period: target.period,
            include_category_ids,
            effective_from: effective_from.map(truncate_to_micros).unwrap_or(now),
            created_at: now,
        })?;

        info!(
            user_id = %user,
            target_id = %created.id,
            period = %created.period,
            target_seconds = created.target_seconds,
            "Target created"
        );
        Ok(created)
    }

    pub fn list_targets(&self, user: UserId, include_inactive: bool) -> Result<Vec<WorkTarget>> {
        let targets = self.store.list_targets(user, include_inactive)?;
        debug!(user_id = %user, count = targets.len(), "Targets listed");
        Ok(targets)
    }

    pub fn update_target(
        &self,
        user: UserId,
        id: TargetId,
        update: TargetUpdate,
        now: DateTime<Utc>,
    ) -> Result<WorkTarget> {
        let existing = self
            .store
            .get_target(id)?
            .ok_or_else(|| WorktallyError::not_found(format!("Target {}", id)))?;
        if existing.user_id != user {
            return Err(WorktallyError::ownership(format!("Target {}", id)));
        }

        if update.is_empty() {
            return Ok(existing);
        }
        if let Some(seconds) = update.target_seconds {
            check_target_seconds(seconds)?;
        }
        let include_category_ids = match &update.include_category_ids {
            Some(ids) => Some(self.check_included_categories(user, ids)?),
            None => None,
        };

        let updated = self.store.update_target(
            id,
            &TargetUpdate {
                include_category_ids,
                ..update
            },
            truncate_to_micros(now),
        )?;
        info!(user_id = %user, target_id = %id, is_active = updated.is_active, "Target updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use worktally_api::TargetPeriod;

    fn daily(seconds: i64) -> NewTarget {
        NewTarget {
            target_seconds: seconds,
            period: TargetPeriod::Daily,
            include_category_ids: Vec::new(),
            effective_from: None,
        }
    }

    #[test]
    fn category_validation() {
        let engine = engine();
        assert!(engine.create_category(user(1), "  ", None, at(1, 0, 0)).is_err());
        assert!(engine.create_category(user(1), &"x".repeat(101), None, at(1, 0, 0)).is_err());
        for bad in ["red", "#12345", "#GGGGGG", "123456#"] {
            assert!(
                engine.create_category(user(1), "Work", Some(bad), at(1, 0, 0)).is_err(),
                "{} accepted",
                bad
            );
        }

        let cat = engine
            .create_category(user(1), " Reading ", Some("#a1B2c3"), at(1, 0, 0))
            .unwrap();
        assert_eq!(cat.name, "Reading");
        assert_eq!(cat.color.as_deref(), Some("#a1B2c3"));
    }

    #[test]
    fn duplicate_active_name_conflicts() {
        let engine = engine();
        let first = engine.create_category(user(1), "Deep work", None, at(1, 0, 0)).unwrap();
        assert!(matches!(
            engine.create_category(user(1), " Deep work ", None, at(1, 0, 1)),
            Err(WorktallyError::Conflict(_))
        ));
        engine.create_category(user(2), "Deep work", None, at(1, 0, 1)).unwrap();

        engine.archive_category(user(1), first.id).unwrap();
        let second = engine.create_category(user(1), "Deep work", None, at(1, 0, 2)).unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(engine.list_categories(user(1), false).unwrap(), vec![second]);
    }

    #[test]
    fn archive_hides_from_default_listing() {
        let engine = engine();
        let cat = engine.create_category(user(1), "Old", None, at(1, 0, 0)).unwrap();
        engine.create_category(user(1), "New", None, at(1, 0, 0)).unwrap();

        assert!(matches!(
            engine.archive_category(user(2), cat.id),
            Err(WorktallyError::Ownership(_))
        ));
        let archived = engine.archive_category(user(1), cat.id).unwrap();
        assert!(archived.is_archived);
        assert!(engine.archive_category(user(1), cat.id).unwrap().is_archived);

        assert_eq!(engine.list_categories(user(1), false).unwrap().len(), 1);
        assert_eq!(engine.list_categories(user(1), true).unwrap().len(), 2);

        // still usable as a session category
        engine
            .start_session(user(1), Some(cat.id), None, None, at(2, 9, 0))
            .unwrap();
    }

    #[test]
    fn create_target_validates() {
        let engine = engine();
        for bad in [0, -60] {
            assert!(matches!(
                engine.create_target(user(1), daily(bad), at(1, 0, 0)),
                Err(WorktallyError::Validation(_))
            ));
        }

        let foreign = engine.create_category(user(2), "Theirs", None, at(1, 0, 0)).unwrap();
        let mut target = daily(3600);
        target.include_category_ids = vec![foreign.id];
        assert!(matches!(
            engine.create_target(user(1), target, at(1, 0, 0)),
            Err(WorktallyError::Ownership(_))
        ));
        assert!(engine.list_targets(user(1), true).unwrap().is_empty());
    }

    #[test]
    fn effective_from_beyond_year_9999_is_rejected() {
        let engine = engine();
        let mut target = daily(3600);
        target.effective_from =
            Some(chrono::TimeZone::with_ymd_and_hms(&Utc, 10000, 1, 1, 9, 0, 0).unwrap());
        assert!(matches!(
            engine.create_target(user(2), target, at(1, 0, 0)),
            Err(WorktallyError::Validation(_))
        ));
        assert!(engine.list_targets(user(2), true).unwrap().is_empty());
    }

    #[test]
    fn create_target_defaults_and_dedup() {
        let engine = engine();
        let cat = engine.create_category(user(1), "Deep", None, at(1, 0, 0)).unwrap();
        let mut target = daily(14400);
        target.include_category_ids = vec![cat.id, cat.id];

        let created = engine.create_target(user(1), target, at(3, 8, 0)).unwrap();
        assert_eq!(created.include_category_ids, vec![cat.id]);
        assert_eq!(created.effective_from, at(3, 8, 0));
        assert!(created.is_active);
    }

    #[test]
    fn update_target_rules() {
        let engine = engine();
        let target = engine.create_target(user(1), daily(3600), at(1, 0, 0)).unwrap();

        assert!(matches!(
            engine.update_target(user(1), TargetId::new(77), TargetUpdate::default(), at(2, 0, 0)),
            Err(WorktallyError::NotFound(_))
        ));
        let change = TargetUpdate {
            target_seconds: Some(7200),
            ..Default::default()
        };
        assert!(matches!(
            engine.update_target(user(2), target.id, change.clone(), at(2, 0, 0)),
            Err(WorktallyError::Ownership(_))
        ));
        assert!(matches!(
            engine.update_target(
                user(1),
                target.id,
                TargetUpdate { target_seconds: Some(0), ..Default::default() },
                at(2, 0, 0)
            ),
            Err(WorktallyError::Validation(_))
        ));

        let updated = engine.update_target(user(1), target.id, change, at(2, 0, 0)).unwrap();
        assert_eq!(updated.target_seconds, 7200);
        assert_eq!(updated.updated_at, at(2, 0, 0));

        let deactivated = engine
            .update_target(
                user(1),
                target.id,
                TargetUpdate { is_active: Some(false), ..Default::default() },
                at(2, 1, 0),
            )
            .unwrap();
        assert!(!deactivated.is_active);
        assert_eq!(deactivated.target_seconds, 7200);
        assert!(engine.list_targets(user(1), false).unwrap().is_empty());
        assert_eq!(engine.list_targets(user(1), true).unwrap().len(), 1);
    }
}
