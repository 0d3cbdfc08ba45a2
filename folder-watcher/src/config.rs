//! Configuration for folder watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Settings for a [`FolderWatcher`](crate::watcher::FolderWatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Root of the watched hierarchy.
    pub root: PathBuf,

    /// Quiet period that closes a batch, in milliseconds.
    pub debounce_ms: u64,

    /// Capacity of the raw event channel.
    pub channel_capacity: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            debounce_ms: 200,
            channel_capacity: 1000,
        }
    }
}

impl WatcherSettings {
    /// Settings watching `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the event channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse settings from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the watcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(WatcherError::Config("root must be set".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(WatcherError::Config(
                "channel capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
