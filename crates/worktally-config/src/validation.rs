//! Configuration validation

use crate::schema::RawConfig;
use thiserror::Error;
use worktally_util::WallClock;

/// Upper bound for startup backfill
pub const MAX_BACKFILL_DAYS: u32 = 366;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("{field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let eval = &config.evaluation;
    if let Some(run_at) = &eval.run_at
        && let Err(message) = run_at.parse::<WallClock>()
    {
        errors.push(ValidationError::InvalidTimeFormat {
            value: run_at.clone(),
            message,
        });
    }

    if let Some(day) = &eval.evaluate_day
        && parse_evaluate_day(day).is_none()
    {
        errors.push(ValidationError::InvalidValue {
            field: "evaluation.evaluate_day",
            message: format!("expected \"current\" or \"previous\", got \"{}\"", day),
        });
    }

    if let Some(days) = eval.backfill_days
        && days > MAX_BACKFILL_DAYS
    {
        errors.push(ValidationError::InvalidValue {
            field: "evaluation.backfill_days",
            message: format!("{} exceeds the maximum of {}", days, MAX_BACKFILL_DAYS),
        });
    }

    let sessions = &config.sessions;
    if sessions.max_note_length == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field: "sessions.max_note_length",
            message: "must be at least 1".into(),
        });
    }

    if let Some(max) = sessions.max_effectiveness_multiplier
        && !(max.is_finite() && max >= 1.0)
    {
        errors.push(ValidationError::InvalidValue {
            field: "sessions.max_effectiveness_multiplier",
            message: format!("must be a finite number >= 1.0, got {}", max),
        });
    }

    errors
}

/// Which UTC day the scheduled run evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluateDay {
    /// The day the trigger fires on (fits a late-evening `run_at`)
    Current,
    /// The day before (fits a just-after-midnight `run_at`)
    Previous,
}

pub(crate) fn parse_evaluate_day(s: &str) -> Option<EvaluateDay> {
    match s.trim().to_ascii_lowercase().as_str() {
        "current" | "today" => Some(EvaluateDay::Current),
        "previous" | "yesterday" => Some(EvaluateDay::Previous),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawEvaluationConfig, RawServiceConfig, RawSessionsConfig};

    fn raw() -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            evaluation: RawEvaluationConfig::default(),
            sessions: RawSessionsConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw()).is_empty());
    }

    #[test]
    fn bad_run_at() {
        let mut config = raw();
        config.evaluation.run_at = Some("7pm".into());
        let errors = validate_config(&config);
        assert!(matches!(errors[..], [ValidationError::InvalidTimeFormat { .. }]));
    }

    #[test]
    fn evaluate_day_aliases() {
        assert_eq!(parse_evaluate_day("Yesterday"), Some(EvaluateDay::Previous));
        assert_eq!(parse_evaluate_day("current"), Some(EvaluateDay::Current));
        assert_eq!(parse_evaluate_day("tomorrow"), None);
    }

    #[test]
    fn multiplier_cap_must_allow_default() {
        let mut config = raw();
        config.sessions.max_effectiveness_multiplier = Some(0.5);
        assert_eq!(validate_config(&config).len(), 1);

        config.sessions.max_effectiveness_multiplier = Some(f64::NAN);
        assert_eq!(validate_config(&config).len(), 1);
    }
}
