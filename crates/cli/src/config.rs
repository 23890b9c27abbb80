use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toolreg_core::storage::Connection;
use toolreg_core::{RegistryDeps, ToolRegistry};

use crate::output::OutputFormat;

/// Sections and keys every configuration file must define
const REQUIRED: &[(&str, &[&str])] = &[
    ("database", &["path"]),
    ("chunking", &["size", "overlap"]),
    ("display", &["default_format"]),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Required configuration section '{0}' is missing")]
    MissingSection(String),

    #[error("Required configuration key '{0}' is missing")]
    MissingKey(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub chunking: ChunkingConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Chunking parameters for document ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub default_format: OutputFormat,
}

impl AppConfig {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }

        let content = std::fs::read_to_string(config_path)?;
        let config = Self::parse(&content)?;
        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: toml::Table = content.parse()?;

        for (section, keys) in REQUIRED {
            let Some(table) = raw.get(*section).and_then(toml::Value::as_table) else {
                return Err(ConfigError::MissingSection(section.to_string()));
            };
            if let Some(key) = keys.iter().find(|key| !table.contains_key(**key)) {
                return Err(ConfigError::MissingKey(format!("{section}.{key}")));
            }
        }

        let config: Self = toml::from_str(content)?;
        config.chunking.check()?;
        Ok(config)
    }
}

impl ChunkingConfig {
    fn check(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::Invalid(
                "chunking.size must be greater than 0".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Everything a command needs, built once per invocation
pub struct AppState {
    pub config: AppConfig,
    pub registry: ToolRegistry,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let connection = Connection::new(&config.database.path);
        let registry = ToolRegistry::new(RegistryDeps::new(connection))
            .context("Failed to open tool registry")?;

        Ok(Self { config, registry })
    }
}
