//! On-demand single-server queries behind `GET /api/status`. Target parsing
//! is pure and fully tested; the actual lookup sits behind [`QueryBackend`]
//! so the HTTP layer can be exercised without the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::ProtocolVariant;
use crate::domain::{LATENCY_UNMEASURED, NOT_AVAILABLE};
use crate::error::{Context, Result};
use crate::probe::{LatencyProbe, TcpLatencyProber};

/// A fully resolved query target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub host: String,
    pub port: u16,
    pub variant: ProtocolVariant,
}

/// Resolves `address` and the optional `type` parameter into a concrete
/// target. Precedence for the port: an explicit `host:port` in the address
/// wins, then a numeric `type` value, then the variant's default port.
/// `pe` and `bedrock` (any case) select Bedrock; everything else is Java.
pub fn parse_target(address: &str, kind: Option<&str>) -> Result<QueryRequest> {
    let address = address.trim();
    if address.is_empty() {
        crate::bail_err!("address must not be empty");
    }

    let variant = match kind.map(str::trim) {
        Some(kind) if kind.eq_ignore_ascii_case("pe") || kind.eq_ignore_ascii_case("bedrock") => {
            ProtocolVariant::Bedrock
        }
        _ => ProtocolVariant::Java,
    };

    if let Some((host, port)) = address.rsplit_once(':') {
        if host.is_empty() {
            crate::bail_err!("address `{address}` has an empty host");
        }
        let port: u16 = port
            .parse()
            .with_context(|| format!("address `{address}` has an invalid port"))?;
        return Ok(QueryRequest {
            host: host.to_string(),
            port,
            variant,
        });
    }

    let port = match kind.map(str::trim).and_then(|kind| kind.parse::<u16>().ok()) {
        Some(port) => port,
        None => variant.default_port(),
    };

    Ok(QueryRequest {
        host: address.to_string(),
        port,
        variant,
    })
}

/// Response body for a proxy query. The shape is fixed so consumers can bind
/// to it without optional-field gymnastics; the offline constructor fills
/// every field with inert values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryStatus {
    pub online: bool,
    pub description: Option<String>,
    pub favicon: Option<String>,
    pub latency: i64,
    pub players: QueryPlayers,
    pub version: QueryVersion,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryPlayers {
    pub max: u32,
    pub online: u32,
    pub sample: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryVersion {
    pub name: String,
    pub protocol: i32,
}

impl QueryStatus {
    pub fn offline() -> Self {
        Self {
            online: false,
            description: None,
            favicon: None,
            latency: LATENCY_UNMEASURED,
            players: QueryPlayers::default(),
            version: QueryVersion {
                name: NOT_AVAILABLE.to_string(),
                protocol: -1,
            },
        }
    }
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<QueryStatus>;
}

/// Default backend: resolves metadata through the mcsrvstat.us API and
/// measures latency with a direct TCP connect. A single sample keeps the
/// endpoint's response time bounded.
pub struct UpstreamQueryBackend {
    client: reqwest::Client,
    latency: TcpLatencyProber,
}

impl UpstreamQueryBackend {
    pub fn new(client: reqwest::Client, sample_timeout: Duration) -> Self {
        Self {
            client,
            latency: TcpLatencyProber::new(sample_timeout, 1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamPayload {
    online: bool,
    #[serde(default)]
    motd: Option<UpstreamMotd>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    players: Option<UpstreamPlayers>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    protocol: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMotd {
    #[serde(default)]
    clean: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamPlayers {
    #[serde(default)]
    online: Option<u32>,
    #[serde(default)]
    max: Option<u32>,
    #[serde(default)]
    list: Option<Vec<String>>,
}

impl UpstreamPayload {
    fn into_status(self, latency: i64) -> QueryStatus {
        if !self.online {
            return QueryStatus::offline();
        }
        let players = self.players.unwrap_or(UpstreamPlayers {
            online: None,
            max: None,
            list: None,
        });
        QueryStatus {
            online: true,
            description: self.motd.map(|motd| motd.clean.join("\n")),
            favicon: self.icon,
            latency,
            players: QueryPlayers {
                max: players.max.unwrap_or(0),
                online: players.online.unwrap_or(0),
                sample: players.list.unwrap_or_default(),
            },
            version: QueryVersion {
                name: self.version.unwrap_or_default(),
                protocol: self.protocol.unwrap_or(0),
            },
        }
    }
}

#[async_trait]
impl QueryBackend for UpstreamQueryBackend {
    async fn query(&self, request: &QueryRequest) -> Result<QueryStatus> {
        let url = match request.variant {
            ProtocolVariant::Java => format!(
                "https://api.mcsrvstat.us/2/{}:{}",
                request.host, request.port
            ),
            ProtocolVariant::Bedrock => format!(
                "https://api.mcsrvstat.us/bedrock/2/{}:{}",
                request.host, request.port
            ),
        };
        let payload: UpstreamPayload = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("status lookup returned an unexpected payload")?;

        if !payload.online {
            return Ok(QueryStatus::offline());
        }

        let latency = self.latency.probe(&request.host, request.port).await;
        Ok(payload.into_status(latency))
    }
}
