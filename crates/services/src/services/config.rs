//! Pipeline configuration document.
//!
//! A single versioned JSON file in the data directory. Absent means first
//! run: defaults are written back so the operator has something to edit.
//! Unparseable or future-versioned is fatal — the engine refuses to start
//! on a document it might misread. Secrets come from the environment and
//! only fall back to the document.

use std::io::ErrorKind;
use std::path::Path;

use executors::executors::ClaudeCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::services::timeout::DeadlineConfig;

pub const CONFIG_VERSION: u32 = 1;

const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const MARKETPLACE_TOKEN_ENV: &str = "MARKETPLACE_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported config version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub config_version: u32,
    /// Marketplace REST base, e.g. `https://console.algora.io/api`.
    pub marketplace_url: String,
    /// Fallbacks only; the matching env vars win when set.
    pub github_token: Option<String>,
    pub marketplace_token: Option<String>,
    pub agent: ClaudeCode,
    pub deadlines: DeadlineConfig,
    /// Aggregate score the quality gate requires, 0..=100.
    pub quality_threshold: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            marketplace_url: "https://console.algora.io/api".to_string(),
            github_token: None,
            marketplace_token: None,
            agent: ClaudeCode::default(),
            deadlines: DeadlineConfig::default(),
            quality_threshold: 70,
        }
    }
}

impl PipelineConfig {
    /// Load the document, writing defaults on first run.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let config: PipelineConfig = serde_json::from_str(&raw)?;
                if config.config_version != CONFIG_VERSION {
                    return Err(ConfigError::UnsupportedVersion {
                        found: config.config_version,
                        supported: CONFIG_VERSION,
                    });
                }
                Ok(config)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                info!("Wrote default config to {}", path.display());
                Ok(config)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn github_token(&self) -> Option<String> {
        resolve_secret(std::env::var(GITHUB_TOKEN_ENV).ok(), &self.github_token)
    }

    pub fn marketplace_token(&self) -> Option<String> {
        resolve_secret(
            std::env::var(MARKETPLACE_TOKEN_ENV).ok(),
            &self.marketplace_token,
        )
    }
}

fn resolve_secret(env_value: Option<String>, file_value: &Option<String>) -> Option<String> {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| file_value.clone())
}
