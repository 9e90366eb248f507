//! Configuration management for BallotChain

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "ballotchain.toml";
pub const DIFFICULTY_ENV: &str = "BALLOTCHAIN_DIFFICULTY";

/// Upper bound on leading hex zeros; 16^8 expected hashes per seal.
pub const MAX_DIFFICULTY: usize = 8;
pub const DEFAULT_DIFFICULTY: usize = 2;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_snapshot_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_snapshot_path(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        check_difficulty(self.ledger.difficulty)?;

        if self.storage.path.trim().is_empty() {
            return Err(ChainError::ConfigError(
                "storage.path must be set".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ChainError> {
        if let Ok(raw) = std::env::var(DIFFICULTY_ENV) {
            self.ledger.difficulty = raw.trim().parse().map_err(|e| {
                ChainError::ConfigError(format!("{} is not a valid difficulty: {}", DIFFICULTY_ENV, e))
            })?;
        }
        Ok(())
    }
}

/// Reject difficulties above [`MAX_DIFFICULTY`]; sealing at those would
/// effectively never finish.
pub fn check_difficulty(difficulty: usize) -> Result<(), ChainError> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::ConfigError(format!(
            "ledger.difficulty must be at most {}, got {}",
            MAX_DIFFICULTY, difficulty
        )));
    }
    Ok(())
}

/// Load `ballotchain.toml` from the working directory, falling back to
/// defaults when it is absent.
pub fn load_config() -> Result<Config, ChainError> {
    load_config_from(Path::new(CONFIG_FILE))
}

pub fn load_config_from(path: &Path) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let mut config = parse_config(&config_str)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn parse_config(config_str: &str) -> Result<Config, ChainError> {
    if config_str.trim().is_empty() {
        return Ok(Config::default());
    }
    toml::from_str(config_str)
        .map_err(|e| ChainError::ConfigError(format!("Failed to parse {}: {}", CONFIG_FILE, e)))
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_snapshot_path() -> String {
    "./data/blockchain.json".to_string()
}
