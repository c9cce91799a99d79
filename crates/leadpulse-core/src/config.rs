//! Application configuration management.
//!
//! Configuration is stored at `~/.config/leadpulse/config.json` and can be
//! overridden per deployment with environment variables:
//!
//! - `LEADPULSE_ENV`: `development`, `staging` or `production`
//! - `LEADPULSE_API_URL`: explicit API base URL, wins over the environment default
//! - `LEADPULSE_TIMEOUT_SECS`: HTTP request timeout
//! - `LEADPULSE_PERSIST_KEY`: passphrase for the encrypted state snapshot
//! - `LEADPULSE_CREDENTIAL_BACKEND`: `file` or `keyring`

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "leadpulse";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Environment::Development => "http://localhost:8000/api",
            Environment::Staging => "https://staging-api.leadpulse.io/api",
            Environment::Production => "https://api.leadpulse.io/api",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid {
                var: "LEADPULSE_ENV",
                value: s.to_string(),
            }),
        }
    }
}

/// Where session tokens are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

impl FromStr for CredentialBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keyring" => Ok(CredentialBackend::Keyring),
            _ => Err(ConfigError::Invalid {
                var: "LEADPULSE_CREDENTIAL_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub api_base_url: Option<String>,
    pub request_timeout_secs: u64,
    /// Not written back by `save`; supply it through the environment.
    #[serde(skip_serializing)]
    pub persist_key: Option<String>,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            api_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            persist_key: None,
            credential_backend: CredentialBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `LEADPULSE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("LEADPULSE_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(url) = lookup("LEADPULSE_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_base_url = Some(url.trim().to_string());
        }
        if let Some(raw) = lookup("LEADPULSE_TIMEOUT_SECS") {
            self.request_timeout_secs = raw
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid {
                    var: "LEADPULSE_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
        }
        if let Some(key) = lookup("LEADPULSE_PERSIST_KEY") {
            self.persist_key = Some(key);
        }
        if let Some(backend) = lookup("LEADPULSE_CREDENTIAL_BACKEND") {
            self.credential_backend = backend.parse()?;
        }
        Ok(())
    }

    /// API base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn persist_key(&self) -> Result<&str, ConfigError> {
        self.persist_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("LEADPULSE_PERSIST_KEY"))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the credential file, the state snapshot and logs.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(match self.environment {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }))
    }
}
