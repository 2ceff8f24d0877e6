//! Validated settings structures

use crate::schema::{RawConfig, RawEvaluationConfig, RawServiceConfig, RawSessionsConfig};
use crate::validation::{parse_evaluate_day, EvaluateDay};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::PathBuf;
use worktally_util::WallClock;

pub const DEFAULT_MAX_NOTE_LENGTH: usize = 500;
pub const DEFAULT_MAX_MULTIPLIER: f64 = 10.0;

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub evaluation: EvaluationSettings,
    pub sessions: SessionRules,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            evaluation: EvaluationSettings::from_raw(raw.evaluation),
            sessions: SessionRules::from_raw(raw.sessions),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(worktally_util::socket_path_without_env),
            log_dir: raw.log_dir.unwrap_or_else(worktally_util::default_log_dir),
            data_dir: raw
                .data_dir
                .unwrap_or_else(worktally_util::data_dir_without_env),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// When and how the daily evaluation fires
#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub enabled: bool,
    pub run_at: WallClock,
    pub evaluate_day: EvaluateDay,
    pub backfill_days: u32,
}

impl EvaluationSettings {
    fn from_raw(raw: RawEvaluationConfig) -> Self {
        let default_run_at = WallClock { hour: 23, minute: 59 };
        Self {
            enabled: raw.enabled.unwrap_or(true),
            run_at: raw
                .run_at
                .and_then(|s| s.parse().ok())
                .unwrap_or(default_run_at),
            evaluate_day: raw
                .evaluate_day
                .as_deref()
                .and_then(parse_evaluate_day)
                .unwrap_or(EvaluateDay::Current),
            backfill_days: raw.backfill_days.unwrap_or(1),
        }
    }

    /// Date a run firing at `fired_at` should evaluate
    pub fn date_for_run(&self, fired_at: DateTime<Utc>) -> NaiveDate {
        let date = fired_at.date_naive();
        match self.evaluate_day {
            EvaluateDay::Current => date,
            EvaluateDay::Previous => date.pred_opt().unwrap_or(date),
        }
    }

    /// Dates re-checked on startup, oldest first, ending before `today`
    pub fn backfill_dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        (1..=i64::from(self.backfill_days))
            .rev()
            .filter_map(|n| today.checked_sub_signed(Duration::days(n)))
            .collect()
    }
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self::from_raw(RawEvaluationConfig::default())
    }
}

/// Input limits applied to session writes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRules {
    pub max_note_length: usize,
    pub max_effectiveness_multiplier: f64,
}

impl SessionRules {
    fn from_raw(raw: RawSessionsConfig) -> Self {
        Self {
            max_note_length: raw.max_note_length.unwrap_or(DEFAULT_MAX_NOTE_LENGTH),
            max_effectiveness_multiplier: raw
                .max_effectiveness_multiplier
                .unwrap_or(DEFAULT_MAX_MULTIPLIER),
        }
    }
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            max_note_length: DEFAULT_MAX_NOTE_LENGTH,
            max_effectiveness_multiplier: DEFAULT_MAX_MULTIPLIER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn run_date_follows_evaluate_day() {
        let fired = Utc.with_ymd_and_hms(2025, 12, 16, 0, 5, 0).unwrap();
        let mut settings = EvaluationSettings::default();
        assert_eq!(settings.date_for_run(fired), date(2025, 12, 16));

        settings.evaluate_day = EvaluateDay::Previous;
        assert_eq!(settings.date_for_run(fired), date(2025, 12, 15));
    }

    #[test]
    fn backfill_is_oldest_first() {
        let mut settings = EvaluationSettings::default();
        settings.backfill_days = 3;
        assert_eq!(
            settings.backfill_dates(date(2025, 3, 2)),
            vec![date(2025, 2, 27), date(2025, 2, 28), date(2025, 3, 1)]
        );

        settings.backfill_days = 0;
        assert!(settings.backfill_dates(date(2025, 3, 2)).is_empty());
    }
}
