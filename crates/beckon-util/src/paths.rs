//! Default paths for beckon components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/beckon/config.toml` or `~/.config/beckon/config.toml`
//! - Session logs: `$XDG_STATE_HOME/beckon` or `~/.local/state/beckon`

use std::path::PathBuf;

/// Environment variable for overriding the session log directory
pub const BECKON_LOG_DIR_ENV: &str = "BECKON_LOG_DIR";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "beckon";

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/beckon/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/beckon/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default session log directory.
///
/// Order of precedence:
/// 1. `$BECKON_LOG_DIR` environment variable (if set)
/// 2. `$XDG_STATE_HOME/beckon` (if XDG_STATE_HOME is set)
/// 3. `~/.local/state/beckon` (fallback)
pub fn default_log_dir() -> PathBuf {
    if let Ok(path) = std::env::var(BECKON_LOG_DIR_ENV) {
        return PathBuf::from(path);
    }

    log_dir_without_env()
}

/// Get the session log directory without checking BECKON_LOG_DIR.
/// Used for default values in configs where the env var is checked separately.
pub fn log_dir_without_env() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}
