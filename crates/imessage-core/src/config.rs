//! Settings loaded from `<config dir>/imessage/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lock::SingleInstanceLock;
use crate::session::SessionConfig;
use crate::store::ChatDb;
use crate::watcher::DetectorConfig;
use crate::{Error, Result};

/// Settings that persist across sessions. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messages database.
    pub database_path: PathBuf,
    /// Single-instance lock file.
    pub lock_path: PathBuf,
    /// Time between store polls.
    pub poll_interval_ms: u64,
    /// Conversations fetched per load.
    pub conversation_limit: u32,
    /// Messages fetched per conversation.
    pub message_limit: u32,
    /// Bound on refresh and message-load fetches.
    pub refresh_timeout_ms: u64,
    /// Bound on a send.
    pub send_timeout_ms: u64,
    /// Pause after a send before reloading.
    pub settle_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: ChatDb::default_path(),
            lock_path: SingleInstanceLock::default_path(),
            poll_interval_ms: 500,
            conversation_limit: 50,
            message_limit: 100,
            refresh_timeout_ms: 5_000,
            send_timeout_ms: 30_000,
            settle_delay_ms: 500,
        }
    }
}

impl Config {
    /// Default location of the settings file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imessage")
            .join("config.json")
    }

    /// Load settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be greater than 0".into()));
        }
        if self.conversation_limit == 0 || self.message_limit == 0 {
            return Err(Error::Config("limits must be greater than 0".into()));
        }
        Ok(())
    }

    /// Time between store polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bound on refresh and message-load fetches.
    #[must_use]
    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Bound on a send.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Pause after a send before reloading.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Change detector settings.
    #[must_use]
    pub const fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            poll_interval: self.poll_interval(),
            conversation_limit: self.conversation_limit,
        }
    }

    /// Session settings.
    #[must_use]
    pub const fn session(&self) -> SessionConfig {
        SessionConfig {
            conversation_limit: self.conversation_limit,
            message_limit: self.message_limit,
            load_timeout: self.refresh_timeout(),
            refresh_timeout: self.refresh_timeout(),
            send_timeout: self.send_timeout(),
            settle_delay: self.settle_delay(),
        }
    }
}
