use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Context, Result};

/// Service settings, loaded from `config/local.*` plus `BEACON`-prefixed
/// environment variables. The server catalog itself lives in a separate JSON
/// document (see [`ServersDocument`]).
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            poll: PollConfig::default(),
            sources: SourcesConfig::default(),
            catalog_path: default_catalog_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Seconds between the end of one polling cycle and the start of the next.
    pub refresh_interval_secs: u64,
    /// Per-source request timeout for the status probe.
    pub source_timeout_secs: u64,
    /// Fixed delay before falling through to the next status source.
    pub source_backoff_ms: u64,
    /// Hard timeout for a single latency sample.
    pub latency_timeout_ms: u64,
    /// Parallel latency samples per endpoint; successful samples are averaged.
    pub latency_samples: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            source_timeout_secs: 5,
            source_backoff_ms: 500,
            latency_timeout_ms: 2500,
            latency_samples: 3,
        }
    }
}

impl PollConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn source_backoff(&self) -> Duration {
        Duration::from_millis(self.source_backoff_ms)
    }

    pub fn latency_timeout(&self) -> Duration {
        Duration::from_millis(self.latency_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Status sources tried in order. Known names: `mcsrvstat`, `mcapi`,
    /// `minetools`, `proxy` (requires `proxy_base_url`).
    pub enabled: Vec<String>,
    #[serde(default)]
    pub proxy_base_url: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "mcsrvstat".to_string(),
                "mcapi".to_string(),
                "minetools".to_string(),
            ],
            proxy_base_url: None,
        }
    }
}

fn default_catalog_path() -> String {
    "config/servers.json".to_string()
}

impl BeaconConfig {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("BEACON").separator("__"))
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }
}

/// The server catalog document, original key names preserved.
#[derive(Debug, Clone, Deserialize)]
pub struct ServersDocument {
    #[serde(rename = "MCServerList")]
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub address: String,
    #[serde(rename = "port-java", default)]
    pub port_java: Option<u16>,
    #[serde(rename = "port-pe", default)]
    pub port_pe: Option<u16>,
}

impl ServersDocument {
    pub fn from_path(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read server catalog {path}"))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("server catalog {path} is not valid JSON"))
    }
}
