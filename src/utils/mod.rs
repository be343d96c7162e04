//! Utility modules

pub mod error;
pub mod resp;

pub use error::{ConnectionError, ConsoleError, ErrorKind, Result, TransportCode};
pub use resp::{RespDecoder, RespEncoder, RespValue};
