//! Control plane trait for server communication
//!
//! Every component talks to a node through this trait, so the dispatch,
//! topology and scan logic can run against an in-memory server in tests.

use crate::utils::RespValue;
use std::io;

/// A live connection to one node
pub trait ControlPlane {
    /// Execute a command given as verb followed by its arguments
    ///
    /// # Example
    /// ```ignore
    /// let response = conn.execute(&["SCAN", "0", "MATCH", "user:*", "COUNT", "100"])?;
    /// ```
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue>;

    /// Write all commands, then read exactly one reply per command
    ///
    /// Server error replies are returned in place; only transport failures
    /// abort the pipeline.
    fn execute_pipeline(&mut self, commands: &[Vec<&str>]) -> io::Result<Vec<RespValue>>;
}

/// Convenience operations built on top of [`ControlPlane`]
pub trait ControlPlaneExt: ControlPlane {
    /// Send PING and verify PONG response
    fn ping(&mut self) -> io::Result<bool> {
        match self.execute(&["PING"])? {
            RespValue::SimpleString(s) => Ok(s == "PONG"),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            _ => Ok(false),
        }
    }

    /// Get CLUSTER NODES response as string
    fn cluster_nodes(&mut self) -> io::Result<String> {
        match self.execute(&["CLUSTER", "NODES"])? {
            RespValue::BulkString(data) => String::from_utf8(data).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
            }),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected CLUSTER NODES response: {:?}", other),
            )),
        }
    }

    /// Send AUTH command
    fn authenticate(&mut self, password: &str, username: Option<&str>) -> io::Result<()> {
        let response = match username {
            Some(user) => self.execute(&["AUTH", user, password])?,
            None => self.execute(&["AUTH", password])?,
        };

        match response {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::PermissionDenied, e)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected AUTH response: {:?}", other),
            )),
        }
    }
}

impl<T: ControlPlane + ?Sized> ControlPlaneExt for T {}
