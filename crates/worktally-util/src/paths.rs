//! Default paths for worktally components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/worktally/worktallyd.sock` or `/tmp/worktally-$USER/worktallyd.sock`
//! - Data: `$XDG_DATA_HOME/worktally` or `~/.local/share/worktally`
//! - Config: `$XDG_CONFIG_HOME/worktally/config.toml` or `~/.config/worktally/config.toml`
//! - Logs: `$XDG_STATE_HOME/worktally` or `~/.local/state/worktally`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const WORKTALLY_SOCKET_ENV: &str = "WORKTALLY_SOCKET";

/// Environment variable for overriding the data directory
pub const WORKTALLY_DATA_DIR_ENV: &str = "WORKTALLY_DATA_DIR";

const SOCKET_FILENAME: &str = "worktallyd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const DATABASE_FILENAME: &str = "worktally.db";
const APP_DIR: &str = "worktally";

fn xdg_or_home(xdg_var: &str, home_suffix: &[&str], last_resort: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(xdg_var) {
        return PathBuf::from(dir).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        let mut path = PathBuf::from(home);
        path.extend(home_suffix);
        return path.join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(last_resort)
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$WORKTALLY_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/worktally/worktallyd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/worktally-$USER/worktallyd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(WORKTALLY_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path ignoring `$WORKTALLY_SOCKET`, for config defaults.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$WORKTALLY_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/worktally` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/worktally` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(WORKTALLY_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Data directory ignoring `$WORKTALLY_DATA_DIR`, for config defaults.
pub fn data_dir_without_env() -> PathBuf {
    xdg_or_home("XDG_DATA_HOME", &[".local", "share"], "data")
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    xdg_or_home("XDG_STATE_HOME", &[".local", "state"], "logs")
}

/// Get the default config file location.
pub fn default_config_path() -> PathBuf {
    xdg_or_home("XDG_CONFIG_HOME", &[".config"], "config").join(CONFIG_FILENAME)
}

/// Database file inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_names_the_daemon() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains("worktally"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn data_and_log_dirs_are_namespaced() {
        assert!(data_dir_without_env().to_string_lossy().contains("worktally"));
        assert!(default_log_dir().to_string_lossy().contains("worktally"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), "config.toml");
        assert_eq!(path.parent().unwrap().file_name().unwrap(), "worktally");
    }

    #[test]
    fn database_lives_in_data_dir() {
        let dir = PathBuf::from("/var/lib/worktally");
        assert_eq!(database_path(&dir), PathBuf::from("/var/lib/worktally/worktally.db"));
    }
}
