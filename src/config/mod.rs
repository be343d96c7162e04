//! Configuration module

pub mod cli;
pub mod connection_config;
pub mod executor_config;
pub mod tls_config;

pub use cli::{CliArgs, ConsoleCommand, CLI_ENVIRONMENT};
pub use connection_config::{
    ConnectionConfig, ConnectionConfigProvider, ServerAddress, StaticConfigProvider,
};
pub use executor_config::ExecutorConfig;
pub use tls_config::TlsConfig;
