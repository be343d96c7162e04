//! Client connection layer

pub mod connector;
pub mod control_plane;
pub mod raw_connection;

#[cfg(test)]
pub(crate) mod mock;

pub use connector::{BoxedConnection, NodeConnector, TcpConnector};
pub use control_plane::{ControlPlane, ControlPlaneExt};
pub use raw_connection::{ConnectionFactory, RawConnection};
