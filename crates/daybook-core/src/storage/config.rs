//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Sync targets and the conflict resolution policy
//! - Default reminder offsets and the daily summary time
//!
//! Configuration is stored at `~/.config/daybook/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::sync::types::ConflictPolicy;

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote sync backend base URL; empty disables the backend target.
    #[serde(default)]
    pub backend_url: String,
    /// External calendar service base URL; empty disables that target.
    #[serde(default)]
    pub calendar_url: String,
    /// Conflict resolution policy applied uniformly per sync session.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Periodic sync interval in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// Journal entries sent per push batch.
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,
    /// Push attempts per entry before surfacing a sync failure.
    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: u32,
}

/// Reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Default reminder offsets (minutes before start) for items that
    /// don't set their own.
    #[serde(default = "default_offsets")]
    pub default_offsets_min: Vec<i64>,
    /// Daily summary time as HH:mm, or unset to disable.
    #[serde(default)]
    pub daily_summary: Option<String>,
    /// Delivery channel identifier handed to the platform service.
    #[serde(default = "default_channel")]
    pub channel: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/daybook/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_sync_interval_secs() -> u64 {
    300
}
fn default_push_batch_size() -> usize {
    50
}
fn default_max_push_attempts() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_offsets() -> Vec<i64> {
    vec![10]
}
fn default_channel() -> String {
    "reminders".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            calendar_url: String::new(),
            conflict_policy: ConflictPolicy::default(),
            interval_secs: default_sync_interval_secs(),
            push_batch_size: default_push_batch_size(),
            max_push_attempts: default_max_push_attempts(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_offsets_min: default_offsets(),
            daily_summary: None,
            channel: default_channel(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load configuration, falling back to defaults if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/daybook/config.toml"),
            message: e.to_string(),
        })?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path (for tests).
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// Save configuration.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().map_err(|e| ConfigError::SaveFailed {
            path: PathBuf::from("~/.config/daybook/config.toml"),
            message: e.to_string(),
        })?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path (for tests).
    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// Parse the daily summary time into (hour, minute).
    pub fn daily_summary_time(&self) -> Option<(u32, u32)> {
        let raw = self.notifications.daily_summary.as_deref()?;
        let (h, m) = raw.split_once(':')?;
        let hour: u32 = h.parse().ok()?;
        let minute: u32 = m.parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        Some((hour, minute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.default_offsets_min, vec![10]);
        assert_eq!(config.sync.conflict_policy, ConflictPolicy::NewerWins);
        assert_eq!(config.sync.interval_secs, 300);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.sync.conflict_policy = ConflictPolicy::LocalWins;
        config.notifications.daily_summary = Some("08:30".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sync.conflict_policy, ConflictPolicy::LocalWins);
        assert_eq!(loaded.daily_summary_time(), Some((8, 30)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(config.sync.backend_url.is_empty());
    }

    #[test]
    fn test_daily_summary_time_validation() {
        let mut config = Config::default();
        assert_eq!(config.daily_summary_time(), None);
        config.notifications.daily_summary = Some("25:00".to_string());
        assert_eq!(config.daily_summary_time(), None);
        config.notifications.daily_summary = Some("07:05".to_string());
        assert_eq!(config.daily_summary_time(), Some((7, 5)));
    }
}
