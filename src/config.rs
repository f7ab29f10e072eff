use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tabsync_core::lock::DEFAULT_LOCK_TIMEOUT;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// JSON workbook the commands operate on
    pub workbook: String,

    /// Directory holding one subdirectory of `.ics` files per calendar
    #[serde(default = "default_calendar_dir")]
    pub calendar_dir: String,

    /// Sync configuration file (`.toml` or `.json`). When absent, the
    /// configuration is read from the workbook's SYNC_CONFIG sheet.
    pub sync_config: Option<String>,

    /// Identity allowed to edit day sheets while they are being synced
    pub identity: Option<String>,

    /// Base URL of the workbook, used for links back to source rows
    pub url: Option<String>,

    /// How long to wait for another command to finish, in milliseconds
    pub lock_timeout_ms: Option<u64>,
}

fn default_calendar_dir() -> String {
    "~/calendar".to_string()
}

impl Config {
    pub fn identity(&self) -> String {
        self.identity
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "tabsync".to_string())
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }
}

/// Get the config directory path (~/.config/tabsync)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("tabsync");
    Ok(config_dir)
}

/// Get the config file path (~/.config/tabsync/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load config from ~/.config/tabsync/config.toml
pub fn load_config() -> Result<Config> {
    let path = config_path()?;

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}\n\n\
            Create it with the workbook to operate on:\n\n\
            workbook = \"~/workbook.json\"\n\
            calendar_dir = \"~/calendar\"",
            path.display()
        );
    }

    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

    Ok(config)
}

/// Expand ~ in paths to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "workbook = \"/tmp/book.json\"\nidentity = \"me@example.com\"\n").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.workbook, "/tmp/book.json");
        assert_eq!(config.calendar_dir, "~/calendar");
        assert_eq!(config.sync_config, None);
        assert_eq!(config.identity(), "me@example.com");
        assert_eq!(config.lock_timeout(), DEFAULT_LOCK_TIMEOUT);
    }

    #[test]
    fn test_missing_workbook_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "calendar_dir = \"/tmp/cal\"\n").unwrap();

        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/abs/book.json"), PathBuf::from("/abs/book.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/book.json"), home.join("book.json"));
        }
    }
}
