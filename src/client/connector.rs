//! Opening connections to individual nodes

use std::time::Duration;

use super::control_plane::ControlPlane;
use super::raw_connection::ConnectionFactory;
use crate::config::{ConnectionConfig, ServerAddress, TlsConfig};
use crate::utils::ConnectionError;

pub type BoxedConnection = Box<dyn ControlPlane + Send>;

/// Opens a connection to one node of an environment
///
/// `io_timeout` is the budget of the whole call made over the returned
/// connection, from connecting to the last reply.
pub trait NodeConnector: Send + Sync {
    fn connect(
        &self,
        address: &ServerAddress,
        config: &ConnectionConfig,
        io_timeout: Duration,
    ) -> Result<BoxedConnection, ConnectionError>;
}

/// Connects over TCP (or TLS) with [`ConnectionFactory`]
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    tls: TlsConfig,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, tls: TlsConfig) -> Self {
        Self {
            connect_timeout,
            tls,
        }
    }
}

impl NodeConnector for TcpConnector {
    fn connect(
        &self,
        address: &ServerAddress,
        config: &ConnectionConfig,
        io_timeout: Duration,
    ) -> Result<BoxedConnection, ConnectionError> {
        let factory =
            ConnectionFactory::for_environment(config, self.connect_timeout, io_timeout, &self.tls);
        let conn = factory.create(&address.host, address.port)?;
        Ok(Box::new(conn))
    }
}
