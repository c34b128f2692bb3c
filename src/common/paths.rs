//! Configuration and scenario paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/compose-e2e/`
//! - macOS: `~/Library/Application Support/compose-e2e/`
//! - Windows: `%APPDATA%\compose-e2e\`

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "compose-e2e";

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "COMPOSE_E2E_CONFIG";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
///
/// `COMPOSE_E2E_CONFIG` wins over the platform location.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        if !explicit.trim().is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
