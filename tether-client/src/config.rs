//! Client configuration loading
//!
//! Reads `~/.config/tether/config.toml`. A missing or unreadable file is
//! not an error: every key has a default and problems are logged.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::connection::DEFAULT_RECONNECT_INTERVAL;
use crate::engine::{EngineOptions, DEFAULT_FIT_SETTLE, DEFAULT_RESIZE_DEBOUNCE};

/// Host used when neither the config nor the command line names one
pub const DEFAULT_HOST: &str = "localhost:6369";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// PTY host, or an alias from `hosts`
    pub host: String,
    /// Agent type for new sessions
    pub agent: String,
    pub reconnect_interval_ms: u64,
    pub resize_debounce_ms: u64,
    pub fit_settle_ms: u64,
    /// Delay before typing the initial prompt
    pub prompt_delay_ms: u64,
    /// Host aliases, e.g. `devbox = "wss://devbox.example.com"`
    pub hosts: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            agent: String::new(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL.as_millis() as u64,
            resize_debounce_ms: DEFAULT_RESIZE_DEBOUNCE.as_millis() as u64,
            fit_settle_ms: DEFAULT_FIT_SETTLE.as_millis() as u64,
            prompt_delay_ms: 0,
            hosts: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Resolve a host alias; anything that is not an alias is returned as is
    pub fn resolve_host<'a>(&'a self, host: &'a str) -> &'a str {
        self.hosts.get(host).map(String::as_str).unwrap_or(host)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Engine options from this config, with the given initial prompt
    pub fn engine_options(&self, initial_prompt: Option<String>) -> EngineOptions {
        EngineOptions {
            initial_prompt,
            prompt_delay: Duration::from_millis(self.prompt_delay_ms),
            resize_debounce: Duration::from_millis(self.resize_debounce_ms),
            fit_settle: Duration::from_millis(self.fit_settle_ms),
        }
    }
}

/// Load the config from the default location
pub fn load_config() -> ClientConfig {
    load_config_from(&tether_utils::config_file())
}

/// Load the config from `path`
///
/// Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_config_from(path: &Path) -> ClientConfig {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return ClientConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<ClientConfig>(&content) {
            Ok(config) => {
                tracing::debug!(
                    "Loaded config from {}: host={}, {} host aliases",
                    path.display(),
                    config.host,
                    config.hosts.len()
                );
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}, using defaults", e);
                ClientConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file: {}, using defaults", e);
            ClientConfig::default()
        }
    }
}
