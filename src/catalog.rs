#![forbid(unsafe_code)]

use serde::Serialize;

use crate::config::ServersDocument;
use crate::error::Result;

pub const DEFAULT_JAVA_PORT: u16 = 25565;
pub const DEFAULT_BEDROCK_PORT: u16 = 19132;

/// TCP port probed for latency when a node exposes only Bedrock endpoints.
/// Bedrock speaks UDP, so a TCP connect against its port never answers.
pub const FALLBACK_LATENCY_PORT: u16 = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ProtocolVariant {
    Java,
    Bedrock,
}

impl ProtocolVariant {
    /// Display label, matching what the front end prints next to an address.
    pub fn label(self) -> &'static str {
        match self {
            ProtocolVariant::Java => "Java",
            ProtocolVariant::Bedrock => "PE",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ProtocolVariant::Java => DEFAULT_JAVA_PORT,
            ProtocolVariant::Bedrock => DEFAULT_BEDROCK_PORT,
        }
    }
}

/// One network-reachable address + protocol-variant pair. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub variant: ProtocolVariant,
    pub host: String,
    pub port: u16,
    pub full_address: String,
}

impl Endpoint {
    pub fn new(variant: ProtocolVariant, host: &str, port: u16) -> Self {
        Self {
            variant,
            host: host.to_string(),
            port,
            full_address: format!("{host}:{port}"),
        }
    }
}

/// A physical server, possibly exposing both protocol variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

impl NodeSpec {
    pub fn java_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.variant == ProtocolVariant::Java)
    }

    /// Resolves the address the latency probe should touch for `endpoint`.
    ///
    /// Bedrock endpoints redirect to the node's Java endpoint when one
    /// exists; otherwise the same host on [`FALLBACK_LATENCY_PORT`].
    pub fn latency_target(&self, endpoint: &Endpoint) -> (String, u16) {
        match endpoint.variant {
            ProtocolVariant::Java => (endpoint.host.clone(), endpoint.port),
            ProtocolVariant::Bedrock => match self.java_endpoint() {
                Some(java) => (java.host.clone(), java.port),
                None => (endpoint.host.clone(), FALLBACK_LATENCY_PORT),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSpec {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
}

/// The full endpoint catalog, derived once from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    pub groups: Vec<GroupSpec>,
}

impl Catalog {
    pub fn from_document(doc: &ServersDocument) -> Result<Self> {
        if doc.groups.is_empty() {
            crate::bail_err!("server catalog defines no groups");
        }

        let mut groups = Vec::with_capacity(doc.groups.len());
        for group in &doc.groups {
            let mut nodes = Vec::with_capacity(group.servers.len());
            for server in &group.servers {
                let mut endpoints = Vec::new();
                if let Some(port) = server.port_java {
                    endpoints.push(Endpoint::new(ProtocolVariant::Java, &server.address, port));
                }
                if let Some(port) = server.port_pe {
                    endpoints.push(Endpoint::new(
                        ProtocolVariant::Bedrock,
                        &server.address,
                        port,
                    ));
                }
                if endpoints.is_empty() {
                    crate::bail_err!(
                        "server `{}` in group `{}` declares neither port-java nor port-pe",
                        server.name,
                        group.name
                    );
                }
                nodes.push(NodeSpec {
                    name: server.name.clone(),
                    endpoints,
                });
            }
            if nodes.is_empty() {
                crate::bail_err!("group `{}` contains no servers", group.name);
            }
            groups.push(GroupSpec {
                name: group.name.clone(),
                nodes,
            });
        }

        Ok(Self { groups })
    }

    pub fn endpoint_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|group| &group.nodes)
            .map(|node| node.endpoints.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServersDocument;

    fn sample_document() -> ServersDocument {
        serde_json::from_str(
            r#"{
                "MCServerList": [
                    {
                        "name": "Alpha",
                        "servers": [
                            { "name": "dual", "address": "a.example.com", "port-java": 25565, "port-pe": 19132 },
                            { "name": "pe-only", "address": "b.example.com", "port-pe": 19133 }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn derives_one_endpoint_per_declared_port() {
        let catalog = Catalog::from_document(&sample_document()).unwrap();
        assert_eq!(catalog.endpoint_count(), 3);
        let dual = &catalog.groups[0].nodes[0];
        assert_eq!(dual.endpoints[0].variant, ProtocolVariant::Java);
        assert_eq!(dual.endpoints[0].full_address, "a.example.com:25565");
        assert_eq!(dual.endpoints[1].variant, ProtocolVariant::Bedrock);
    }

    #[test]
    fn bedrock_latency_redirects_to_java_sibling() {
        let catalog = Catalog::from_document(&sample_document()).unwrap();
        let dual = &catalog.groups[0].nodes[0];
        let bedrock = &dual.endpoints[1];
        assert_eq!(
            dual.latency_target(bedrock),
            ("a.example.com".to_string(), 25565)
        );
    }

    #[test]
    fn bedrock_only_node_falls_back_to_port_80() {
        let catalog = Catalog::from_document(&sample_document()).unwrap();
        let pe_only = &catalog.groups[0].nodes[1];
        let endpoint = &pe_only.endpoints[0];
        assert_eq!(
            pe_only.latency_target(endpoint),
            ("b.example.com".to_string(), FALLBACK_LATENCY_PORT)
        );
    }

    #[test]
    fn node_without_ports_is_rejected() {
        let doc: ServersDocument = serde_json::from_str(
            r#"{ "MCServerList": [ { "name": "G", "servers": [ { "name": "n", "address": "x" } ] } ] }"#,
        )
        .unwrap();
        assert!(Catalog::from_document(&doc).is_err());
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let doc: ServersDocument = serde_json::from_str(r#"{ "MCServerList": [] }"#).unwrap();
        assert!(Catalog::from_document(&doc).is_err());
    }
}
