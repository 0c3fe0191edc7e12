//! Platform-specific paths for configuration and graph files.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/cadenza/` (Linux), `~/Library/Application Support/cadenza/` (macOS), `%APPDATA%\cadenza\` (Windows)
//! - **Config file**: `<user config>/cadenza.toml`
//! - **Graphs**: `<user config>/graphs/`

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "cadenza";

/// File name of the main config file.
const CONFIG_FILE: &str = "cadenza.toml";

/// Subdirectory name for graph descriptions.
const GRAPHS_SUBDIR: &str = "graphs";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the main config file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}

/// Returns the directory searched for graph descriptions by name.
pub fn user_graphs_dir() -> PathBuf {
    user_config_dir().join(GRAPHS_SUBDIR)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Find a graph description by path or name.
///
/// `name` is tried as a path first, then as a file in [`user_graphs_dir`]
/// (with `.toml` appended when missing).
pub fn find_graph(name: &str) -> Option<PathBuf> {
    find_graph_in(name, &user_graphs_dir())
}

pub(crate) fn find_graph_in(name: &str, dir: &Path) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let candidate = dir.join(filename);
    candidate.is_file().then_some(candidate)
}
