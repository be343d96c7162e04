//! Cluster node representation

use serde::Serialize;

use crate::config::{ConnectionConfig, ServerAddress};

/// Id of the synthetic node standing for a standalone endpoint
pub const STANDALONE_NODE_ID: &str = "0";

/// One node an aggregate operation talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    /// Node ID from CLUSTER NODES, or `"0"` for a standalone endpoint
    pub id: String,
    pub host: String,
    pub port: u16,
    pub is_master: bool,
}

impl ClusterNode {
    /// The configured endpoint as a single master
    pub fn standalone(config: &ConnectionConfig) -> Self {
        Self {
            id: STANDALONE_NODE_ID.to_string(),
            host: config.host.clone(),
            port: config.port,
            is_master: true,
        }
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }
}

/// Parse a line from CLUSTER NODES response
///
/// Format: `<id> <ip:port@cport> <flags> <master> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> ... <slot>`
///
/// Only the first three fields are used. A node is a master unless its
/// flags contain `slave` or `replica`.
///
/// Example:
/// ```text
/// 07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
/// ```
pub fn parse_cluster_node_line(line: &str) -> Option<ClusterNode> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }

    let (host, port) = parse_node_address(parts[1])?;
    let is_replica = parts[2]
        .split(',')
        .any(|flag| flag == "slave" || flag == "replica");

    Some(ClusterNode {
        id: parts[0].to_string(),
        host,
        port,
        is_master: !is_replica,
    })
}

/// Parse node address from CLUSTER NODES
/// Formats: "host:port@cport", "host:port", "host:port@cport,hostname"
fn parse_node_address(addr: &str) -> Option<(String, u16)> {
    // Handle ElastiCache format: ip:port@cport,hostname
    let addr = addr.split(',').next().unwrap_or(addr);

    // Drop the cluster bus port
    let host_port = addr.split('@').next().unwrap_or(addr);

    let (host, port) = host_port.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;

    Some((host.to_string(), port))
}
