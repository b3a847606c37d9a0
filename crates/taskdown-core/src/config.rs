use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::StatusDefault;

pub const CONFIG_FILENAME: &str = ".taskdown.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskdownConfig {
    /// Subdirectory holding the markdown task files, relative to the config
    /// root. When unset, vault resolution falls back to `tasks/` or the root
    /// itself.
    pub root_dir: Option<String>,
    /// Status default for the `list` command: "open", "done" or "all".
    pub default_status: Option<String>,
}

impl TaskdownConfig {
    /// The configured list default, if it names a valid status.
    pub fn list_status_default(&self) -> Option<StatusDefault> {
        match self.default_status.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            Some(ref s) if s == "open" => Some(StatusDefault::Open),
            Some(ref s) if s == "done" => Some(StatusDefault::Done),
            Some(ref s) if s == "all" => Some(StatusDefault::All),
            _ => None,
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILENAME)
}

/// Walk ancestors looking for a `.taskdown.toml`.
pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    for candidate in start.ancestors() {
        if config_path(candidate).is_file() {
            return Some(candidate.to_path_buf());
        }
    }
    None
}

pub fn load_config(root: &Path) -> Option<TaskdownConfig> {
    let path = config_path(root);
    if !path.is_file() {
        return None;
    }
    let text = fs::read_to_string(&path).ok()?;
    toml::from_str::<TaskdownConfig>(&text).ok()
}

pub fn write_config(root: &Path, config: &TaskdownConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path(root);
    let body = toml::to_string_pretty(config)?;
    fs::write(&path, body)?;
    Ok(path)
}
