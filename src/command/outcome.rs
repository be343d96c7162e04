//! Classification of command results
//!
//! Cluster slot redirects are reported, never followed: the caller decides
//! whether to retry against the target, and does so at most once.

use std::fmt;
use std::io;

use serde::Serialize;

use super::parse::Command;
use crate::config::ServerAddress;
use crate::utils::{ConsoleError, RespValue, Result, TransportCode};

/// Prefixes of status text that signal a server-side failure
const ERROR_PREFIXES: [&str; 4] = ["ERR ", "WRONGTYPE ", "NOPERM ", "NOAUTH "];

/// Node named by a `MOVED <slot> <host>:<port>` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectTarget {
    pub slot: u16,
    pub host: String,
    pub port: u16,
}

impl RedirectTarget {
    /// Parse from a reply containing `MOVED <slot> <host>:<port>`
    ///
    /// The three tokens must be exactly that; anything else is not a redirect.
    /// The host may be empty (`MOVED 3999 :7001`), meaning the host that sent
    /// the reply.
    pub fn parse(text: &str) -> Option<Self> {
        let start = text.find("MOVED")?;
        let parts: Vec<&str> = text[start..].split_whitespace().collect();
        let [_, slot, address] = parts.as_slice() else {
            return None;
        };

        let slot: u16 = slot.parse().ok()?;
        let (host, port) = address.rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;

        Some(Self {
            slot,
            host: host.to_string(),
            port,
        })
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }

    /// Id a record found through this redirect is tagged with
    pub fn node_id(&self) -> String {
        self.address().to_string()
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} is served by {}:{}", self.slot, self.host, self.port)
    }
}

/// Result of dispatching one command to one node
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Success(RespValue),
    Redirect(RedirectTarget),
    ProtocolError { message: String, command: String },
    TransportError { message: String, code: TransportCode },
}

impl CommandOutcome {
    /// Classify the reply (or I/O failure) of `command` sent to `address`
    pub fn classify(
        command: &Command,
        address: &ServerAddress,
        result: io::Result<RespValue>,
    ) -> Self {
        match result {
            Ok(RespValue::Error(message)) => Self::from_error_text(command, address, message),
            Ok(RespValue::SimpleString(status)) if is_error_text(&status) => {
                Self::from_error_text(command, address, status)
            }
            Ok(reply) => CommandOutcome::Success(reply),
            Err(e) => CommandOutcome::TransportError {
                message: e.to_string(),
                code: TransportCode::from_io(&e),
            },
        }
    }

    fn from_error_text(command: &Command, address: &ServerAddress, message: String) -> Self {
        if message.contains("MOVED") {
            if let Some(mut target) = RedirectTarget::parse(&message) {
                if target.host.is_empty() {
                    target.host = address.host.clone();
                }
                return CommandOutcome::Redirect(target);
            }
        }
        CommandOutcome::ProtocolError {
            message,
            command: command.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success(_))
    }

    /// Successful reply, or the matching error variant
    pub fn into_reply(self) -> Result<RespValue> {
        match self {
            CommandOutcome::Success(reply) => Ok(reply),
            CommandOutcome::Redirect(target) => Err(ConsoleError::Redirect(target)),
            CommandOutcome::ProtocolError { message, command } => {
                Err(ConsoleError::Protocol { message, command })
            }
            CommandOutcome::TransportError { message, code } => {
                Err(ConsoleError::Transport { message, code })
            }
        }
    }
}

impl From<ConsoleError> for CommandOutcome {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::Transport { message, code } => {
                CommandOutcome::TransportError { message, code }
            }
            ConsoleError::Redirect(target) => CommandOutcome::Redirect(target),
            ConsoleError::Protocol { message, command } => {
                CommandOutcome::ProtocolError { message, command }
            }
            other => CommandOutcome::TransportError {
                message: other.to_string(),
                code: TransportCode::Io,
            },
        }
    }
}

/// True for status text a server uses to report a failed command
pub fn is_error_text(text: &str) -> bool {
    text.lines().any(|line| {
        ERROR_PREFIXES.iter().any(|p| line.starts_with(p)) || line.contains("unknown command")
    })
}
