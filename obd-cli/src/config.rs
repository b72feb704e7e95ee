//! TOML configuration for obd-cli
//!
//! Looked up at an explicit path or `~/.config/obd-cli/config.toml`. A missing
//! file means defaults; a malformed one is an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{
    DEFAULT_BASE_URL, DEFAULT_USER_AGENT, EndpointSet, EntityKind, RegistryClient,
    ResilienceConfig, RetryConfig,
};

const APP_DIR: &str = "obd-cli";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub registry: RegistrySettings,
    pub resilience: ResilienceSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub base_url: String,
    pub user_agent: String,
    /// Sent with every request on top of the built-in headers
    pub headers: BTreeMap<String, String>,
    /// Sub-resource key -> path or absolute URL
    pub builder_endpoints: BTreeMap<String, String>,
    pub umbrella_endpoints: BTreeMap<String, String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: BTreeMap::new(),
            builder_endpoints: BTreeMap::new(),
            umbrella_endpoints: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub entity_concurrency: usize,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        let defaults = ResilienceConfig::default();
        Self {
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_attempts: defaults.retry.max_attempts,
            base_delay_ms: defaults.retry.base_delay.as_millis() as u64,
            max_delay_ms: defaults.retry.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.retry.backoff_multiplier,
            jitter: defaults.retry.jitter,
            entity_concurrency: defaults.entity_concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl HarvestConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => {
                    log::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn resilience_config(&self) -> ResilienceConfig {
        let r = &self.resilience;
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_attempts: r.max_attempts.max(1),
                base_delay: Duration::from_millis(r.base_delay_ms),
                max_delay: Duration::from_millis(r.max_delay_ms),
                backoff_multiplier: r.backoff_multiplier,
                jitter: r.jitter,
            })
            .request_timeout(Duration::from_secs(r.request_timeout_secs))
            .entity_concurrency(r.entity_concurrency)
            .build()
    }

    pub fn endpoints(&self, kind: EntityKind) -> EndpointSet {
        let overrides = match kind {
            EntityKind::Builder => &self.registry.builder_endpoints,
            EntityKind::Umbrella => &self.registry.umbrella_endpoints,
        };
        EndpointSet::with_overrides(kind, &self.registry.base_url, overrides)
    }

    pub fn client(&self) -> Result<RegistryClient> {
        RegistryClient::with_options(
            &self.registry.base_url,
            &self.registry.user_agent,
            &self.registry.headers,
            &self.resilience_config(),
        )
    }
}
