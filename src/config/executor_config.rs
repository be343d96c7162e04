//! Timeouts and transport options shared by all dispatch operations

use std::time::Duration;

use super::cli::CliArgs;
use super::tls_config::TlsConfig;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub connect_timeout: Duration,
    /// Total time allowed for a single command, connect and AUTH included
    pub command_timeout: Duration,
    /// Total time allowed for a pipelined batch
    pub batch_timeout: Duration,
    /// Used for environments with `tlsEnabled`
    pub tls: TlsConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            tls: TlsConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_cli(args: &CliArgs) -> Self {
        Self {
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            command_timeout: Duration::from_millis(args.command_timeout_ms),
            batch_timeout: Duration::from_millis(args.batch_timeout_ms),
            tls: TlsConfig {
                skip_verify: args.tls_skip_verify,
                ca_cert: args.tls_ca_cert.clone(),
                client_cert: args.tls_cert.clone(),
                client_key: args.tls_key.clone(),
                sni: args.tls_sni.clone(),
            },
        }
    }
}
