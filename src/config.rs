// src/config.rs

//! Manages client configuration: loading from TOML, defaults, and validation.

use crate::core::capability::Credential;
use crate::core::client::{ClientOptions, KvClient, KvClientBuilder};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Settings for the optional reconnect supervisor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Upper bound of the random delay added to each reconnect backoff.
    #[serde(with = "humantime_serde", default = "default_jitter")]
    pub jitter: Duration,
}

fn default_jitter() -> Duration {
    Duration::from_millis(250)
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jitter: default_jitter(),
        }
    }
}

/// The full client configuration as read from a file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redacted in `Debug` output.
    #[serde(default)]
    pub password: Credential,
    #[serde(default)]
    pub database: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub options: ClientOptions,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: Credential::none(),
            database: 0,
            log_level: default_log_level(),
            options: ClientOptions::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.options.max_pipeline_ops == 0 {
            return Err(anyhow!("options.max_pipeline_ops cannot be 0"));
        }
        if self.options.connection_pool_size == 0 {
            return Err(anyhow!("options.connection_pool_size cannot be 0"));
        }
        if self.options.retry_delay.is_zero() && self.options.retry_attempts > 0 {
            return Err(anyhow!(
                "options.retry_delay cannot be 0 when retry_attempts is set"
            ));
        }
        Ok(())
    }

    /// A client builder preloaded with this configuration.
    pub fn builder(&self) -> KvClientBuilder {
        KvClient::builder(self.host.clone(), self.port)
            .database(self.database)
            .credential(self.password.clone())
            .options(self.options.clone())
    }
}
