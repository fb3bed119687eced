//! `canopy.toml` loading

use anyhow::{Context, Result};
use canopy_store::StoreConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    /// Directory holding document bodies
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanopyConfig {
    pub database: StoreConfig,
    pub content: ContentConfig,
}

impl CanopyConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid canopy configuration")?;
        config.database.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text)
    }
}
