//! Cluster topology resolution
//!
//! Topology is fetched from the seed node on every call and never cached.
//! Resolution degrades instead of failing: when `CLUSTER NODES` cannot be
//! fetched or parsed, the seed endpoint alone is used.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::node::{parse_cluster_node_line, ClusterNode};
use crate::config::ConnectionConfig;
use crate::dispatch::CommandExecutor;
use crate::utils::Result;

pub struct ClusterTopologyResolver {
    executor: Arc<CommandExecutor>,
}

impl ClusterTopologyResolver {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self { executor }
    }

    pub fn is_cluster_mode(&self, connection_id: &str) -> Result<bool> {
        Ok(self.executor.connection_config(connection_id)?.cluster_enabled)
    }

    /// Nodes an aggregate operation should visit, in a stable order
    ///
    /// Fails only when the environment is unknown.
    pub fn resolve_nodes(&self, connection_id: &str) -> Result<Vec<ClusterNode>> {
        let config = self.executor.connection_config(connection_id)?;
        Ok(self.nodes_for(&config))
    }

    /// [`resolve_nodes`](Self::resolve_nodes) for an already loaded environment
    pub fn nodes_for(&self, config: &ConnectionConfig) -> Vec<ClusterNode> {
        if !config.cluster_enabled {
            return vec![ClusterNode::standalone(config)];
        }

        let seed = config.address();
        let response = match self.executor.cluster_nodes(config, &seed) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Failed to fetch cluster topology from {}: {}; using seed node only",
                    seed, e
                );
                return vec![ClusterNode::standalone(config)];
            }
        };

        let nodes = parse_topology(&response, &seed.host);
        if nodes.is_empty() {
            warn!(
                "CLUSTER NODES from {} listed no usable nodes; using seed node only",
                seed
            );
            return vec![ClusterNode::standalone(config)];
        }

        let total = nodes.len();
        let masters = select_masters(nodes);
        info!(
            "Cluster topology from {}: {} nodes, {} selected",
            seed,
            total,
            masters.len()
        );
        masters
    }
}

/// Parse a full CLUSTER NODES response
///
/// Unparsable lines are skipped. Nodes reporting an empty host (a node that
/// does not know its own address yet) get `seed_host`. The result is sorted by
/// address so repeated resolutions line up index by index.
pub fn parse_topology(response: &str, seed_host: &str) -> Vec<ClusterNode> {
    let mut nodes: Vec<ClusterNode> = response
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let node = parse_cluster_node_line(line);
            if node.is_none() {
                debug!("Skipping CLUSTER NODES line: {}", line);
            }
            node
        })
        .map(|mut node| {
            if node.host.is_empty() {
                node.host = seed_host.to_string();
            }
            node
        })
        .collect();

    nodes.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
    nodes
}

/// Masters only, or every node when none is flagged as master
pub fn select_masters(nodes: Vec<ClusterNode>) -> Vec<ClusterNode> {
    if nodes.iter().any(|n| n.is_master) {
        nodes.into_iter().filter(|n| n.is_master).collect()
    } else {
        nodes
    }
}
