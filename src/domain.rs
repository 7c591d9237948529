#![forbid(unsafe_code)]

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::catalog::{Catalog, Endpoint};

/// Latency sentinel for "not yet measured".
pub const LATENCY_UNMEASURED: i64 = -1;
/// Latency sentinel for "probe timed out or failed". Anything at or above
/// this value renders as a timeout.
pub const LATENCY_TIMEOUT_MS: i64 = 5000;

pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN_VERSION: &str = "未知";
pub const UNKNOWN_PLAYERS: &str = "?/?";
/// Every configured status source failed for the endpoint. Distinguishable
/// from a confirmed-offline answer so the UI can word it differently.
pub const SOURCES_EXHAUSTED: &str = "全部API错误";

/// Canonical status-probe result. Probes never error outward; every failure
/// collapses into one of the constructors below.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub online: bool,
    pub players: String,
    pub version: String,
}

impl ServerStatus {
    pub fn online(players: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            online: true,
            players: players.into(),
            version: version.into(),
        }
    }

    /// A source answered and reported the server offline.
    pub fn offline() -> Self {
        Self {
            online: false,
            players: NOT_AVAILABLE.to_string(),
            version: NOT_AVAILABLE.to_string(),
        }
    }

    /// Every configured source failed; the real state is unknown.
    pub fn unreachable() -> Self {
        Self {
            online: false,
            players: SOURCES_EXHAUSTED.to_string(),
            version: SOURCES_EXHAUSTED.to_string(),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        !self.online && self.players == SOURCES_EXHAUSTED
    }
}

/// Per-cycle measurement for one endpoint. Rebuilt wholesale every cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EndpointMeasurement {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub latency_ms: i64,
    pub online: bool,
    pub players: String,
    pub version: String,
    pub measured_at: String,
}

impl EndpointMeasurement {
    pub fn unmeasured(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            latency_ms: LATENCY_UNMEASURED,
            online: false,
            players: NOT_AVAILABLE.to_string(),
            version: UNKNOWN_VERSION.to_string(),
            measured_at: now_rfc3339(),
        }
    }

    pub fn apply_status(&mut self, status: &ServerStatus) {
        self.online = status.online;
        self.players = status.players.clone();
        self.version = status.version.clone();
        self.measured_at = now_rfc3339();
    }

    pub fn apply_latency(&mut self, latency_ms: i64) {
        self.latency_ms = latency_ms;
        self.measured_at = now_rfc3339();
    }

    fn qualifying_latency(&self) -> Option<i64> {
        (0..LATENCY_TIMEOUT_MS)
            .contains(&self.latency_ms)
            .then_some(self.latency_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub endpoints: Vec<EndpointMeasurement>,
    pub best_latency: i64,
    pub is_expanded: bool,
}

impl NodeStatus {
    /// Minimum qualifying latency across this cycle's measurements, or the
    /// unmeasured sentinel when none qualify.
    pub fn recompute_best_latency(&mut self) {
        self.best_latency = self
            .endpoints
            .iter()
            .filter_map(EndpointMeasurement::qualifying_latency)
            .min()
            .unwrap_or(LATENCY_UNMEASURED);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Testing,
    Online,
    Offline,
}

impl GroupState {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupState::Testing => "testing",
            GroupState::Online => "online",
            GroupState::Offline => "offline",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    pub name: String,
    pub nodes: Vec<NodeStatus>,
    pub state: GroupState,
    pub players: String,
    pub version: String,
}

impl GroupStatus {
    /// Post-cycle aggregation: best latencies, representative selection and
    /// the latency-ordered node sort.
    pub fn finalise(&mut self) {
        for node in &mut self.nodes {
            node.recompute_best_latency();
        }

        // Copy the summary fields out before mutating; the representative
        // borrows the node list.
        let summary = self
            .representative()
            .filter(|measurement| measurement.online)
            .map(|measurement| (measurement.players.clone(), measurement.version.clone()));
        match summary {
            Some((players, version)) => {
                self.state = GroupState::Online;
                self.players = players;
                self.version = version;
            }
            None => {
                self.state = GroupState::Offline;
                self.players = UNKNOWN_PLAYERS.to_string();
                self.version = UNKNOWN_VERSION.to_string();
            }
        }

        self.sort_nodes_by_latency();
    }

    /// First measurement reporting online, scanning nodes in order and
    /// endpoints in order within each node; falls back to the very first
    /// measurement when nothing is online.
    pub fn representative(&self) -> Option<&EndpointMeasurement> {
        self.nodes
            .iter()
            .flat_map(|node| &node.endpoints)
            .find(|measurement| measurement.online)
            .or_else(|| self.nodes.first().and_then(|node| node.endpoints.first()))
    }

    /// Stable ascending sort by best latency, unmeasured nodes last.
    fn sort_nodes_by_latency(&mut self) {
        self.nodes.sort_by_key(|node| match node.best_latency {
            LATENCY_UNMEASURED => i64::MAX,
            latency => latency,
        });
    }
}

/// The full ordered set of groups at a point in time. Replaced atomically in
/// the store, never mutated in place once published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub groups: Vec<GroupStatus>,
    pub generation: u64,
    pub completed_at: Option<String>,
}

impl Snapshot {
    pub fn initial(catalog: &Catalog) -> Self {
        Self::rebuild(catalog, 0, None)
    }

    /// Fresh snapshot with all measurements reset to sentinels. Per-node
    /// expansion flags survive the rebuild, keyed by (group, node) identity.
    pub fn rebuild(catalog: &Catalog, generation: u64, previous: Option<&Snapshot>) -> Self {
        let expanded: HashMap<(&str, &str), bool> = previous
            .iter()
            .flat_map(|snapshot| &snapshot.groups)
            .flat_map(|group| {
                group
                    .nodes
                    .iter()
                    .map(move |node| ((group.name.as_str(), node.name.as_str()), node.is_expanded))
            })
            .collect();

        let groups = catalog
            .groups
            .iter()
            .map(|group| GroupStatus {
                name: group.name.clone(),
                nodes: group
                    .nodes
                    .iter()
                    .map(|node| NodeStatus {
                        name: node.name.clone(),
                        endpoints: node
                            .endpoints
                            .iter()
                            .cloned()
                            .map(EndpointMeasurement::unmeasured)
                            .collect(),
                        best_latency: LATENCY_UNMEASURED,
                        is_expanded: expanded
                            .get(&(group.name.as_str(), node.name.as_str()))
                            .copied()
                            .unwrap_or(false),
                    })
                    .collect(),
                state: GroupState::Testing,
                players: UNKNOWN_PLAYERS.to_string(),
                version: UNKNOWN_VERSION.to_string(),
            })
            .collect();

        Self {
            groups,
            generation,
            completed_at: None,
        }
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
