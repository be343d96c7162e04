//! Command-line argument parsing
//!
//! Connection options mirror valkey-cli (`-h`, `-p`, `-a`, `--user`, `--tls`)
//! and must be given before the subcommand. An environments file (`--config`)
//! replaces the ad-hoc connection options.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::connection_config::ConnectionConfig;

/// Environment id used for connection options given on the command line
pub const CLI_ENVIRONMENT: &str = "cli";

/// Cluster-aware command console for Redis/Valkey
#[derive(Parser, Debug, Clone)]
#[command(name = "keyscope")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true)]
#[allow(clippy::manual_non_exhaustive)]
pub struct CliArgs {
    /// Print help information
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: (),

    // ===== Environment =====
    /// JSON file with named environments
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Environment id to use (defaults to the command-line connection)
    #[arg(short = 'e', long = "env", default_value = CLI_ENVIRONMENT)]
    pub env: String,

    // ===== Connection Options =====
    /// Server hostname (cluster seed node in cluster mode)
    #[arg(short = 'h', long = "host", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short = 'p', long = "port", default_value_t = 6379)]
    pub port: u16,

    /// Password for AUTH command
    #[arg(short = 'a', long = "auth")]
    pub password: Option<String>,

    /// Username for ACL AUTH (requires --auth)
    #[arg(long = "user")]
    pub username: Option<String>,

    /// Treat the server as a cluster and address all masters
    #[arg(long = "cluster")]
    pub cluster_mode: bool,

    // ===== TLS Options =====
    /// Enable TLS connection
    #[arg(long = "tls")]
    pub tls: bool,

    /// Skip TLS certificate verification (insecure)
    #[arg(long = "tls-skip-verify")]
    pub tls_skip_verify: bool,

    /// CA certificate file for TLS
    #[arg(long = "tls-ca-cert")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Client certificate file for TLS
    #[arg(long = "tls-cert")]
    pub tls_cert: Option<PathBuf>,

    /// Client private key file for TLS
    #[arg(long = "tls-key")]
    pub tls_key: Option<PathBuf>,

    /// Server Name Indication for TLS
    #[arg(long = "tls-sni")]
    pub tls_sni: Option<String>,

    // ===== Timing Options =====
    /// Connect timeout in milliseconds
    #[arg(long = "connect-timeout", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Timeout for a single command in milliseconds
    #[arg(long = "command-timeout", default_value_t = 10_000)]
    pub command_timeout_ms: u64,

    /// Timeout for a pipelined batch in milliseconds
    #[arg(long = "batch-timeout", default_value_t = 120_000)]
    pub batch_timeout_ms: u64,

    // ===== Output Options =====
    /// Only log errors
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Log every dispatched command
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConsoleCommand {
    /// Execute one command, e.g. `exec -- HGETALL user:1`
    Exec {
        /// Send to this node (host:port) instead of the configured endpoint
        #[arg(long = "node")]
        node: Option<String>,

        /// Render replies without type annotations
        #[arg(long = "raw")]
        raw: bool,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Scan keys across every node
    Scan {
        /// Glob pattern
        #[arg(long = "match", default_value = "*")]
        pattern: String,

        /// Cursor vector from a previous page (one per node, in order)
        #[arg(long = "cursor", value_delimiter = ',')]
        cursors: Vec<String>,

        /// COUNT hint sent with each SCAN
        #[arg(long = "count", default_value_t = 100)]
        count: u32,

        /// Keep paginating until this many keys were collected
        #[arg(long = "min-keys")]
        min_keys: Option<usize>,

        /// Upper bound on SCAN rounds when --min-keys is given
        #[arg(long = "max-iterations", default_value_t = 10)]
        max_iterations: usize,
    },

    /// Locate a key and print its type, value and TTL
    Get { key: String },

    /// Run read-only commands from a file (or stdin) in one pipeline
    Batch {
        /// One command per line; `-` reads stdin
        #[arg(default_value = "-")]
        file: PathBuf,
    },

    /// Sample the types of several keys in one pipeline
    Types {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List the nodes that scans and lookups address
    Nodes,

    /// Check connectivity
    Ping {
        #[arg(long = "node")]
        node: Option<String>,
    },
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_some() && self.password.is_none() {
            return Err("--user requires --auth to be set".to_string());
        }

        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err("--tls-cert and --tls-key must both be specified".to_string());
        }

        if self.command_timeout_ms == 0 || self.batch_timeout_ms == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }

        if let ConsoleCommand::Scan { max_iterations, .. } = &self.command {
            if *max_iterations == 0 {
                return Err("--max-iterations must be at least 1".to_string());
            }
        }

        Ok(())
    }

    /// Connection settings given through the connection options
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            tls_enabled: self.tls,
            cluster_enabled: self.cluster_mode,
        }
    }
}
