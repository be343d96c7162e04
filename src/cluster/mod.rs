//! Cluster topology and multi-node operations
//!
//! This module provides:
//! - Node discovery via CLUSTER NODES, with a standalone fallback
//! - SCAN aggregation over per-node cursor vectors
//! - Key lookup that follows one MOVED redirect

pub mod locate;
pub mod node;
pub mod scan;
pub mod topology;

pub use locate::{KeyLocator, KeyRecord, KeyType, KeyValue};
pub use node::ClusterNode;
pub use scan::{PageLimits, ScanAggregator, ScanPage};
pub use topology::ClusterTopologyResolver;
