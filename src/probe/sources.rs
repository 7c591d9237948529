//! Status data sources. Each upstream exposes its own JSON schema for
//! "is this server online"; one normalizer per source maps it into the
//! canonical [`ServerStatus`] shape. Adding a source means implementing
//! [`StatusSource`] and registering it in [`build_sources`].

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::catalog::{Endpoint, ProtocolVariant};
use crate::config::SourcesConfig;
use crate::domain::{ServerStatus, UNKNOWN_VERSION};
use crate::error::{Context, Result};

#[async_trait]
pub trait StatusSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Queries the upstream and normalizes its answer. `Ok` means the source
    /// produced a definite answer (online or offline); `Err` means the
    /// source itself failed and the prober should fall through to the next.
    async fn fetch(&self, endpoint: &Endpoint) -> Result<ServerStatus>;
}

pub fn build_sources(
    config: &SourcesConfig,
    client: &reqwest::Client,
) -> Result<Vec<Arc<dyn StatusSource>>> {
    let mut sources: Vec<Arc<dyn StatusSource>> = Vec::with_capacity(config.enabled.len());
    for name in &config.enabled {
        let source: Arc<dyn StatusSource> = match name.as_str() {
            "mcsrvstat" => Arc::new(McSrvStatSource::new(client.clone())),
            "mcapi" => Arc::new(McApiSource::new(client.clone())),
            "minetools" => Arc::new(MineToolsSource::new(client.clone())),
            "proxy" => {
                let base_url = config
                    .proxy_base_url
                    .as_deref()
                    .ok_or_else(|| crate::err!("source `proxy` requires sources.proxy_base_url"))?;
                Arc::new(ProxySource::new(client.clone(), base_url))
            }
            other => crate::bail_err!("unknown status source `{other}`"),
        };
        sources.push(source);
    }
    if sources.is_empty() {
        crate::bail_err!("no status sources enabled");
    }
    Ok(sources)
}

fn format_players(online: Option<u32>, max: Option<u32>) -> String {
    format!("{}/{}", online.unwrap_or(0), max.unwrap_or(0))
}

fn version_or_unknown(version: Option<String>) -> String {
    match version {
        Some(name) if !name.is_empty() => name,
        _ => UNKNOWN_VERSION.to_string(),
    }
}

// --- api.mcsrvstat.us ---

pub struct McSrvStatSource {
    client: reqwest::Client,
}

impl McSrvStatSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct McSrvStatPayload {
    online: bool,
    #[serde(default)]
    players: Option<McSrvStatPlayers>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct McSrvStatPlayers {
    #[serde(default)]
    online: Option<u32>,
    #[serde(default)]
    max: Option<u32>,
}

impl McSrvStatPayload {
    fn normalize(self) -> ServerStatus {
        if !self.online {
            return ServerStatus::offline();
        }
        let players = self.players.unwrap_or(McSrvStatPlayers {
            online: None,
            max: None,
        });
        ServerStatus::online(
            format_players(players.online, players.max),
            version_or_unknown(self.version),
        )
    }
}

#[async_trait]
impl StatusSource for McSrvStatSource {
    fn name(&self) -> &'static str {
        "mcsrvstat.us"
    }

    async fn fetch(&self, endpoint: &Endpoint) -> Result<ServerStatus> {
        let url = format!("https://api.mcsrvstat.us/2/{}", endpoint.full_address);
        let payload: McSrvStatPayload = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("mcsrvstat.us returned an unexpected payload")?;
        Ok(payload.normalize())
    }
}

// --- mcapi.us ---

pub struct McApiSource {
    client: reqwest::Client,
}

impl McApiSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct McApiPayload {
    online: bool,
    #[serde(default)]
    players: Option<McApiPlayers>,
    #[serde(default)]
    server: Option<McApiServer>,
}

#[derive(Debug, Deserialize)]
struct McApiPlayers {
    #[serde(default)]
    now: Option<u32>,
    #[serde(default)]
    max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct McApiServer {
    #[serde(default)]
    name: Option<String>,
}

impl McApiPayload {
    fn normalize(self) -> ServerStatus {
        if !self.online {
            return ServerStatus::offline();
        }
        let players = self.players.unwrap_or(McApiPlayers {
            now: None,
            max: None,
        });
        ServerStatus::online(
            format_players(players.now, players.max),
            version_or_unknown(self.server.and_then(|server| server.name)),
        )
    }
}

#[async_trait]
impl StatusSource for McApiSource {
    fn name(&self) -> &'static str {
        "mcapi.us"
    }

    async fn fetch(&self, endpoint: &Endpoint) -> Result<ServerStatus> {
        let url = format!(
            "https://mcapi.us/server/status?ip={}&port={}",
            endpoint.host, endpoint.port
        );
        let payload: McApiPayload = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("mcapi.us returned an unexpected payload")?;
        Ok(payload.normalize())
    }
}

// --- api.minetools.eu ---

pub struct MineToolsSource {
    client: reqwest::Client,
}

impl MineToolsSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct MineToolsPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    players: Option<MineToolsPlayers>,
    #[serde(default)]
    version: Option<MineToolsVersion>,
}

#[derive(Debug, Deserialize)]
struct MineToolsPlayers {
    #[serde(default)]
    online: Option<u32>,
    #[serde(default)]
    max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MineToolsVersion {
    #[serde(default)]
    name: Option<String>,
}

impl MineToolsPayload {
    fn normalize(self) -> ServerStatus {
        // A populated `error` field means the ping failed upstream.
        if self.error.is_some() {
            return ServerStatus::offline();
        }
        let players = self.players.unwrap_or(MineToolsPlayers {
            online: None,
            max: None,
        });
        ServerStatus::online(
            format_players(players.online, players.max),
            version_or_unknown(self.version.and_then(|version| version.name)),
        )
    }
}

#[async_trait]
impl StatusSource for MineToolsSource {
    fn name(&self) -> &'static str {
        "minetools.eu"
    }

    async fn fetch(&self, endpoint: &Endpoint) -> Result<ServerStatus> {
        let url = format!(
            "https://api.minetools.eu/ping/{}/{}",
            endpoint.host, endpoint.port
        );
        let payload: MineToolsPayload = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("minetools.eu returned an unexpected payload")?;
        Ok(payload.normalize())
    }
}

// --- local proxy (/api/status shape) ---

pub struct ProxySource {
    client: reqwest::Client,
    base_url: String,
}

impl ProxySource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyPayload {
    online: bool,
    #[serde(default)]
    players: Option<ProxyPlayers>,
    #[serde(default)]
    version: Option<ProxyVersion>,
}

#[derive(Debug, Deserialize)]
struct ProxyPlayers {
    #[serde(default)]
    online: Option<u32>,
    #[serde(default)]
    max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProxyVersion {
    #[serde(default)]
    name: Option<String>,
}

impl ProxyPayload {
    fn normalize(self) -> ServerStatus {
        if !self.online {
            return ServerStatus::offline();
        }
        let players = self.players.unwrap_or(ProxyPlayers {
            online: None,
            max: None,
        });
        ServerStatus::online(
            format_players(players.online, players.max),
            version_or_unknown(self.version.and_then(|version| version.name)),
        )
    }
}

#[async_trait]
impl StatusSource for ProxySource {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn fetch(&self, endpoint: &Endpoint) -> Result<ServerStatus> {
        let family = match endpoint.variant {
            ProtocolVariant::Java => "java",
            ProtocolVariant::Bedrock => "pe",
        };
        let url = format!(
            "{}/api/status?address={}&type={}",
            self.base_url, endpoint.full_address, family
        );
        let payload: ProxyPayload = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("proxy returned an unexpected payload")?;
        Ok(payload.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NOT_AVAILABLE, UNKNOWN_VERSION};

    #[test]
    fn mcsrvstat_online_payload_normalizes() {
        let payload: McSrvStatPayload = serde_json::from_str(
            r#"{ "online": true, "players": { "online": 7, "max": 100 }, "version": "1.20.4" }"#,
        )
        .unwrap();
        let status = payload.normalize();
        assert!(status.online);
        assert_eq!(status.players, "7/100");
        assert_eq!(status.version, "1.20.4");
    }

    #[test]
    fn mcsrvstat_missing_fields_default_to_sentinels() {
        let payload: McSrvStatPayload = serde_json::from_str(r#"{ "online": true }"#).unwrap();
        let status = payload.normalize();
        assert_eq!(status.players, "0/0");
        assert_eq!(status.version, UNKNOWN_VERSION);
    }

    #[test]
    fn mcsrvstat_offline_payload_is_confirmed_offline() {
        let payload: McSrvStatPayload = serde_json::from_str(r#"{ "online": false }"#).unwrap();
        let status = payload.normalize();
        assert!(!status.online);
        assert_eq!(status.players, NOT_AVAILABLE);
        assert!(!status.is_unreachable());
    }

    #[test]
    fn mcapi_uses_now_field_for_player_count() {
        let payload: McApiPayload = serde_json::from_str(
            r#"{ "online": true, "players": { "now": 3, "max": 20 }, "server": { "name": "Paper 1.20" } }"#,
        )
        .unwrap();
        let status = payload.normalize();
        assert_eq!(status.players, "3/20");
        assert_eq!(status.version, "Paper 1.20");
    }

    #[test]
    fn minetools_error_field_means_offline() {
        let payload: MineToolsPayload =
            serde_json::from_str(r#"{ "error": "timed out" }"#).unwrap();
        assert!(!payload.normalize().online);
    }

    #[test]
    fn minetools_nested_version_name_is_used() {
        let payload: MineToolsPayload = serde_json::from_str(
            r#"{ "players": { "online": 1, "max": 10 }, "version": { "name": "1.19.2" } }"#,
        )
        .unwrap();
        let status = payload.normalize();
        assert!(status.online);
        assert_eq!(status.version, "1.19.2");
    }

    #[test]
    fn unknown_source_name_is_rejected() {
        let config = SourcesConfig {
            enabled: vec!["mystery".to_string()],
            proxy_base_url: None,
        };
        assert!(build_sources(&config, &reqwest::Client::new()).is_err());
    }

    #[test]
    fn proxy_source_requires_base_url() {
        let config = SourcesConfig {
            enabled: vec!["proxy".to_string()],
            proxy_base_url: None,
        };
        assert!(build_sources(&config, &reqwest::Client::new()).is_err());
    }
}
