//! Settings file for nodeprep
//!
//! A missing file means defaults; a malformed one is an error.

use crate::paths;
use anyhow::{Context, Result, bail};
use hostkit::{HostOptions, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the credentials referenced by a recipe come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    /// `<env_prefix><KEY>` environment variables
    #[default]
    Env,
    /// One file per key under `dir`
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub source: SecretSource,
    pub dir: String,
    pub env_prefix: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            source: SecretSource::Env,
            dir: "/etc/nodeprep/secrets".to_string(),
            env_prefix: "NODEPREP_SECRET_".to_string(),
        }
    }
}

impl SecretsConfig {
    pub fn dir_path(&self) -> PathBuf {
        paths::expand_path(&self.dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AptConfig {
    /// Retries after the first attempt, for network failures only
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for AptConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub command_timeout_secs: u64,
    pub continue_on_error: bool,
    pub strict: bool,
    pub secrets: SecretsConfig,
    pub apt: AptConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout_secs: 300,
            continue_on_error: false,
            strict: false,
            secrets: SecretsConfig::default(),
            apt: AptConfig::default(),
        }
    }
}

impl Config {
    /// Load from the resolved config path; defaults when it does not exist
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = paths::config_file(explicit);
        if !path.exists() {
            if explicit.is_some() {
                bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            bail!("command_timeout_secs must be positive");
        }
        Ok(())
    }

    /// Backend settings, with the CLI timeout taking precedence
    pub fn host_options(&self, timeout_override: Option<u64>) -> HostOptions {
        let secs = timeout_override.unwrap_or(self.command_timeout_secs);
        HostOptions {
            timeout: Duration::from_secs(secs),
            retry: RetryConfig {
                max_attempts: self.apt.retries + 1,
                base_delay: Duration::from_secs(self.apt.retry_delay_secs),
                ..RetryConfig::default()
            },
        }
    }
}
