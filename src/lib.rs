//! keyscope library
//!
//! Cluster-aware command dispatch for Redis/Valkey consoles: single commands
//! against a chosen node, SCAN pagination across every master, key lookup
//! with one-hop MOVED handling, and pipelined read batches.

pub mod client;
pub mod cluster;
pub mod command;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod utils;

pub use cluster::{ClusterNode, KeyRecord, PageLimits, ScanPage};
pub use command::{Command, CommandOutcome, CommandResult, OutputMode, RedirectTarget};
pub use config::{ConnectionConfig, ConnectionConfigProvider, ExecutorConfig, StaticConfigProvider};
pub use console::Console;
pub use utils::{ConsoleError, ErrorKind, Result};
