//! Pool configuration

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_max_connections() -> usize {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Database settings, usually the `[database]` table of `canopy.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub driver: String,
    /// Path of the database file
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub const DRIVER: &'static str = "sqlite";

    /// SQLite database at `path` with default pool settings
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            driver: Self::DRIVER.to_string(),
            url: path.as_ref().display().to_string(),
            username: None,
            password: None,
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.driver != Self::DRIVER {
            return Err(StoreError::Config(format!(
                "unsupported driver {:?}, expected {:?}",
                self.driver,
                Self::DRIVER
            )));
        }
        if self.url.trim().is_empty() {
            return Err(StoreError::Config("url is required".to_string()));
        }
        if self.max_connections == 0 {
            return Err(StoreError::Config("max_connections must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_toml() {
        let config = StoreConfig::from_toml("driver = \"sqlite\"\nurl = \"/tmp/canopy.db\"\n").unwrap();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(30));
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.username.is_none());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(matches!(
            StoreConfig::from_toml("driver = \"postgres\"\nurl = \"x\"\n"),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(StoreConfig::from_toml("driver = \"sqlite\"\n"), Err(StoreError::Config(_))));
        assert!(matches!(
            StoreConfig::from_toml("driver = \"sqlite\"\nurl = \" \"\n"),
            Err(StoreError::Config(_))
        ));

        let mut config = StoreConfig::sqlite("/tmp/x.db");
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
