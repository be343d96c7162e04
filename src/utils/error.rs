//! Error types for keyscope

use std::fmt;
use std::io;
use thiserror::Error;

use crate::command::RedirectTarget;

/// Top-level error returned by dispatch, scan and lookup operations
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Connection config not found: {0}")]
    ConfigNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("{message} (command: {command})")]
    Protocol { message: String, command: String },

    #[error("Transport error [{code}]: {message}")]
    Transport { message: String, code: TransportCode },

    #[error("Redirected: {0}")]
    Redirect(RedirectTarget),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Node {node} failed: {source}")]
    NodeFailure {
        node: String,
        #[source]
        source: Box<ConsoleError>,
    },
}

/// Fieldless classification of [`ConsoleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigNotFound,
    Config,
    InvalidCommand,
    Protocol,
    Transport,
    Redirect,
    KeyNotFound,
    NodeFailure,
}

impl ConsoleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsoleError::ConfigNotFound(_) => ErrorKind::ConfigNotFound,
            ConsoleError::Config(_) => ErrorKind::Config,
            ConsoleError::InvalidCommand(_) => ErrorKind::InvalidCommand,
            ConsoleError::Protocol { .. } => ErrorKind::Protocol,
            ConsoleError::Transport { .. } => ErrorKind::Transport,
            ConsoleError::Redirect(_) => ErrorKind::Redirect,
            ConsoleError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            ConsoleError::NodeFailure { .. } => ErrorKind::NodeFailure,
        }
    }

    /// HTTP status a route layer should answer with for this error
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::ConfigNotFound | ErrorKind::KeyNotFound => 404,
            ErrorKind::InvalidCommand | ErrorKind::Protocol => 400,
            ErrorKind::Redirect => 421,
            ErrorKind::Transport => 502,
            ErrorKind::Config | ErrorKind::NodeFailure => 500,
        }
    }

    /// Wrap a failure that happened on one node of a multi-node operation
    pub fn on_node(self, node: impl Into<String>) -> Self {
        ConsoleError::NodeFailure {
            node: node.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn transport(err: &io::Error) -> Self {
        ConsoleError::Transport {
            message: err.to_string(),
            code: TransportCode::from_io(err),
        }
    }
}

/// Best-effort errno-style code attached to transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCode {
    ConnectionRefused,
    TimedOut,
    ConnectionReset,
    AuthFailed,
    Tls,
    Io,
}

impl TransportCode {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => TransportCode::ConnectionRefused,
            // Socket read timeouts surface as WouldBlock on Unix
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportCode::TimedOut,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportCode::ConnectionReset,
            io::ErrorKind::PermissionDenied => TransportCode::AuthFailed,
            _ if err.to_string().contains("Connection refused") => {
                TransportCode::ConnectionRefused
            }
            _ => TransportCode::Io,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportCode::ConnectionRefused => "ECONNREFUSED",
            TransportCode::TimedOut => "ETIMEDOUT",
            TransportCode::ConnectionReset => "ECONNRESET",
            TransportCode::AuthFailed => "EAUTH",
            TransportCode::Tls => "ETLS",
            TransportCode::Io => "EIO",
        }
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("TLS handshake failed: {0}")]
    TlsFailed(String),

    #[error("Connection closed unexpectedly")]
    Closed,

    #[error("Connection timeout after {0}ms")]
    Timeout(u64),
}

impl From<ConnectionError> for ConsoleError {
    fn from(err: ConnectionError) -> Self {
        let code = match &err {
            ConnectionError::ConnectFailed { source, .. } => TransportCode::from_io(source),
            ConnectionError::AuthFailed(_) => TransportCode::AuthFailed,
            ConnectionError::TlsFailed(_) => TransportCode::Tls,
            ConnectionError::Closed => TransportCode::ConnectionReset,
            ConnectionError::Timeout(_) => TransportCode::TimedOut,
        };
        ConsoleError::Transport {
            message: err.to_string(),
            code,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
