//! Default paths for powerwatchd
//!
//! The daemon normally runs as root under systemd, so the system-wide path
//! comes first. Users running it by hand get an XDG location.

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const POWERWATCH_CONFIG_ENV: &str = "POWERWATCH_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "powerwatchd";

/// System-wide config location
const SYSTEM_CONFIG_DIR: &str = "/etc";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$POWERWATCH_CONFIG` environment variable (if set)
/// 2. `/etc/powerwatchd/config.toml` (if it exists)
/// 3. `$XDG_CONFIG_HOME/powerwatchd/config.toml` (if XDG_CONFIG_HOME is set)
/// 4. `~/.config/powerwatchd/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(POWERWATCH_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    let system = system_config_path();
    if system.exists() {
        return system;
    }

    user_config_path()
}

/// `/etc/powerwatchd/config.toml`
pub fn system_config_path() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_DIR)
        .join(APP_DIR)
        .join(CONFIG_FILENAME)
}

/// Per-user config path, without checking the environment override.
pub fn user_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join(CONFIG_FILENAME)
}
