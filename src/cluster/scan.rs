//! Keyspace scanning across every node of an environment
//!
//! The caller owns the pagination session: it passes back the cursor vector
//! returned by the previous call, index-aligned with the node list. A page
//! may hold no keys while `has_more` is still set, which only means the
//! scanned windows had no matches this time.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, warn};

use super::node::ClusterNode;
use super::topology::ClusterTopologyResolver;
use crate::command::{decode::decode_scan, Command};
use crate::config::ConnectionConfig;
use crate::dispatch::CommandExecutor;
use crate::utils::{ConsoleError, Result};

/// Cursor that starts and ends a SCAN iteration
pub const START_CURSOR: &str = "0";

/// One aggregated page of scan results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Next cursor per node, same order as the resolved node list
    pub cursors: Vec<String>,
    pub has_more: bool,
}

/// Bounds for [`ScanAggregator::scan_page`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Stop once at least this many distinct keys were collected
    pub min_keys: usize,
    /// Never issue more than this many aggregate scans
    pub max_iterations: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            min_keys: 1,
            max_iterations: 10,
        }
    }
}

pub struct ScanAggregator {
    executor: Arc<CommandExecutor>,
    topology: ClusterTopologyResolver,
}

impl ScanAggregator {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        let topology = ClusterTopologyResolver::new(executor.clone());
        Self { executor, topology }
    }

    /// Advance every node's cursor by one SCAN call
    ///
    /// In cluster mode the node list is resolved fresh, nodes are scanned
    /// concurrently, and a node that fails reports cursor `"0"` instead of
    /// failing the call. When the incoming vector has any non-`"0"` entry,
    /// nodes whose cursor is `"0"` are finished and are not scanned again.
    /// A node that failed is therefore skipped for the rest of the session,
    /// even if the failure was transient; its remaining keys only show up
    /// once the caller starts over with an empty or all-`"0"` vector.
    pub fn scan(
        &self,
        pattern: &str,
        cursors: &[String],
        count: usize,
        connection_id: &str,
    ) -> Result<ScanPage> {
        let config = self.executor.connection_config(connection_id)?;

        if !config.cluster_enabled {
            let node = ClusterNode::standalone(&config);
            let cursor = cursors.first().map_or(START_CURSOR, String::as_str);
            let (next, keys) = self.scan_node(&config, &node, pattern, cursor, count)?;
            return Ok(ScanPage {
                keys,
                has_more: next != START_CURSOR,
                cursors: vec![next],
            });
        }

        let nodes = self.topology.nodes_for(&config);
        let resuming = cursors.iter().any(|c| c != START_CURSOR);

        let results: Vec<(String, Vec<String>)> = thread::scope(|s| {
            let handles: Vec<_> = nodes
                .iter()
                .enumerate()
                .map(|(idx, node)| {
                    let cursor = cursors.get(idx).map(String::as_str);
                    let config = &config;
                    s.spawn(move || {
                        if resuming && cursor == Some(START_CURSOR) {
                            return (START_CURSOR.to_string(), Vec::new());
                        }
                        let cursor = cursor.unwrap_or(START_CURSOR);
                        self.scan_node(config, node, pattern, cursor, count)
                            .unwrap_or_else(|e| {
                                warn!("{}", e.on_node(node.address().to_string()));
                                (START_CURSOR.to_string(), Vec::new())
                            })
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| (START_CURSOR.to_string(), Vec::new()))
                })
                .collect()
        });

        let mut page = ScanPage::default();
        for (cursor, keys) in results {
            page.has_more |= cursor != START_CURSOR;
            page.cursors.push(cursor);
            page.keys.extend(keys);
        }
        debug!(
            "Scanned {} nodes for '{}': {} keys, has_more={}",
            nodes.len(),
            pattern,
            page.keys.len(),
            page.has_more
        );
        Ok(page)
    }

    /// Keep scanning until enough distinct keys were collected
    ///
    /// Stops when the keyspace is exhausted, `limits.min_keys` keys were
    /// collected, or `limits.max_iterations` scans were issued. The returned
    /// cursors resume after the last scan.
    pub fn scan_page(
        &self,
        pattern: &str,
        cursors: &[String],
        count: usize,
        connection_id: &str,
        limits: PageLimits,
    ) -> Result<ScanPage> {
        let mut seen = HashSet::new();
        let mut page = ScanPage {
            cursors: cursors.to_vec(),
            ..ScanPage::default()
        };

        for _ in 0..limits.max_iterations.max(1) {
            let next = self.scan(pattern, &page.cursors, count, connection_id)?;
            for key in next.keys {
                if seen.insert(key.clone()) {
                    page.keys.push(key);
                }
            }
            page.cursors = next.cursors;
            page.has_more = next.has_more;

            if !page.has_more || page.keys.len() >= limits.min_keys {
                break;
            }
        }
        Ok(page)
    }

    fn scan_node(
        &self,
        config: &ConnectionConfig,
        node: &ClusterNode,
        pattern: &str,
        cursor: &str,
        count: usize,
    ) -> Result<(String, Vec<String>)> {
        let command = Command::new("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1).to_string());
        let reply = self.executor.query(&command, config, &node.address())?;

        decode_scan(&reply).ok_or_else(|| ConsoleError::Protocol {
            message: format!("Unexpected SCAN reply: {:?}", reply),
            command: command.to_string(),
        })
    }
}
