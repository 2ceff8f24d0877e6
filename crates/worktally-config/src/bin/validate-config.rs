//! Config validation CLI tool
//!
//! Validates a worktallyd configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use worktally_config::{ConfigError, EvaluateDay, CURRENT_CONFIG_VERSION};
use worktally_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a worktallyd configuration file.");
            eprintln!();
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match worktally_config::load_config(&config_path) {
        Ok(settings) => {
            let eval = &settings.evaluation;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.service.socket_path.display());
            println!("  Data dir: {}", settings.service.data_dir.display());
            if eval.enabled {
                let day = match eval.evaluate_day {
                    EvaluateDay::Current => "current day",
                    EvaluateDay::Previous => "previous day",
                };
                println!("  Daily evaluation: {} UTC ({})", eval.run_at, day);
                println!("  Startup backfill: {} day(s)", eval.backfill_days);
            } else {
                println!("  Daily evaluation: disabled");
            }
            println!("  Max note length: {}", settings.sessions.max_note_length);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
