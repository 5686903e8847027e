use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use localchain_core::LedgerConfig;
use serde::Deserialize;

/// Contents of the optional `--config` TOML file. Every field may be omitted.
///
/// ```toml
/// [ledger]
/// mining_reward = 10
/// gas_fee = 3
/// difficulty = 4
/// verify_external_blocks = true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub ledger: LedgerConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Defaults, then the file, then command-line overrides.
pub fn resolve(path: Option<&Path>, difficulty: Option<usize>) -> Result<LedgerConfig> {
    let mut config = match path {
        Some(path) => FileConfig::load(path)?.ledger,
        None => LedgerConfig::default(),
    };
    if let Some(difficulty) = difficulty {
        config.difficulty = difficulty;
    }
    config.validate()?;
    Ok(config)
}
