//! Raw TCP connection to a single node
//!
//! One connection is opened per dispatched command (or batch) and dropped
//! afterwards. Every connection carries one deadline covering connect, AUTH
//! and all round trips, so a slow node cannot stretch a call past its timeout.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::control_plane::{ControlPlane, ControlPlaneExt};
use crate::config::{ConnectionConfig, TlsConfig};
use crate::utils::{ConnectionError, RespDecoder, RespEncoder, RespValue};

/// TCP stream whose socket timeout shrinks to the time left before a deadline
///
/// The timeout is reapplied before every read and write, so a node trickling
/// bytes is still cut off once the deadline passes.
#[derive(Debug)]
pub struct DeadlineStream {
    stream: TcpStream,
    deadline: Option<Instant>,
}

impl DeadlineStream {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            deadline: None,
        }
    }

    fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            deadline: self.deadline,
        })
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn remaining(&self) -> io::Result<Option<Duration>> {
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "Call deadline exceeded",
            ));
        }
        Ok(Some(left))
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.remaining()?;
        self.stream.set_read_timeout(timeout)?;
        self.stream.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let timeout = self.remaining()?;
        self.stream.set_write_timeout(timeout)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Raw connection wrapper (TCP or TLS)
///
/// For TCP, we split into separate reader/writer. The TLS stream cannot be
/// cloned, so it sits behind one persistent reader and writes go through
/// `get_mut`.
pub enum RawConnection {
    Tcp {
        writer: BufWriter<DeadlineStream>,
        reader: BufReader<DeadlineStream>,
    },
    #[cfg(feature = "native-tls-backend")]
    NativeTls {
        stream: BufReader<native_tls::TlsStream<DeadlineStream>>,
    },
}

fn connect_stream(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    deadline: Option<Instant>,
) -> Result<DeadlineStream, ConnectionError> {
    let connect_failed = |source: io::Error| ConnectionError::ConnectFailed {
        host: host.to_string(),
        port,
        source,
    };

    let connect_timeout = match deadline {
        Some(deadline) => connect_timeout.min(deadline.saturating_duration_since(Instant::now())),
        None => connect_timeout,
    };
    if connect_timeout.is_zero() {
        return Err(connect_failed(io::Error::new(
            io::ErrorKind::TimedOut,
            "Call deadline exceeded before connecting",
        )));
    }

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(connect_failed)?
        .next()
        .ok_or_else(|| {
            connect_failed(io::Error::new(io::ErrorKind::NotFound, "No addresses found"))
        })?;

    let stream = TcpStream::connect_timeout(&addr, connect_timeout).map_err(connect_failed)?;
    stream.set_nodelay(true).ok();

    let mut stream = DeadlineStream::new(stream);
    stream.set_deadline(deadline);
    Ok(stream)
}

impl RawConnection {
    /// Plain TCP connection; `deadline` bounds connecting and every later read and write
    pub fn connect_tcp(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        deadline: Option<Instant>,
    ) -> Result<Self, ConnectionError> {
        let stream = connect_stream(host, port, connect_timeout, deadline)?;

        let writer = BufWriter::with_capacity(
            16 * 1024,
            stream
                .try_clone()
                .map_err(|e| ConnectionError::ConnectFailed {
                    host: host.to_string(),
                    port,
                    source: e,
                })?,
        );
        let reader = BufReader::with_capacity(64 * 1024, stream);

        Ok(RawConnection::Tcp { writer, reader })
    }

    #[cfg(feature = "native-tls-backend")]
    pub fn connect_tls(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        deadline: Option<Instant>,
        tls_config: &TlsConfig,
    ) -> Result<Self, ConnectionError> {
        use native_tls::{Certificate, Identity, TlsConnector};

        let mut builder = TlsConnector::builder();

        if tls_config.skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(ref ca_path) = tls_config.ca_cert {
            let ca_data = std::fs::read(ca_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read CA cert: {}", e))
            })?;
            let cert = Certificate::from_pem(&ca_data)
                .map_err(|e| ConnectionError::TlsFailed(format!("Invalid CA cert: {}", e)))?;
            builder.add_root_certificate(cert);
        }

        if tls_config.has_client_cert() {
            if let (Some(cert_path), Some(key_path)) =
                (&tls_config.client_cert, &tls_config.client_key)
            {
                let cert_data = std::fs::read(cert_path).map_err(|e| {
                    ConnectionError::TlsFailed(format!("Failed to read client cert: {}", e))
                })?;
                let key_data = std::fs::read(key_path).map_err(|e| {
                    ConnectionError::TlsFailed(format!("Failed to read client key: {}", e))
                })?;
                let identity = Identity::from_pkcs8(&cert_data, &key_data).map_err(|e| {
                    ConnectionError::TlsFailed(format!("Invalid client identity: {}", e))
                })?;
                builder.identity(identity);
            }
        } else if tls_config.client_cert.is_some() || tls_config.client_key.is_some() {
            return Err(ConnectionError::TlsFailed(
                "Client certificate and key must be given together".to_string(),
            ));
        }

        let connector = builder.build().map_err(|e| {
            ConnectionError::TlsFailed(format!("Failed to build TLS connector: {}", e))
        })?;

        // The handshake runs under the same deadline as the call
        let tcp_stream = connect_stream(host, port, connect_timeout, deadline)?;

        let tls_stream = connector
            .connect(tls_config.server_name(host), tcp_stream)
            .map_err(|e| ConnectionError::TlsFailed(e.to_string()))?;

        Ok(RawConnection::NativeTls {
            stream: BufReader::with_capacity(64 * 1024, tls_stream),
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => writer.write_all(buf),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => stream.get_mut().write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => writer.flush(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => stream.get_mut().flush(),
        }
    }

    fn read_response(&mut self) -> io::Result<RespValue> {
        match self {
            RawConnection::Tcp { reader, .. } => RespDecoder::new(reader).decode(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => RespDecoder::new(stream).decode(),
        }
    }

    /// Send an encoded buffer and read `count` replies
    ///
    /// Every read and write is bounded by the connection deadline, and the
    /// call fails with `TimedOut` once it has passed.
    pub fn round_trip(&mut self, encoder: &RespEncoder, count: usize) -> io::Result<Vec<RespValue>> {
        self.write_all(encoder.as_bytes())?;
        self.flush()?;
        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.read_response()?);
        }
        Ok(responses)
    }

    /// Replace the deadline shared by reads and writes
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        match self {
            RawConnection::Tcp { writer, reader } => {
                writer.get_mut().set_deadline(deadline);
                reader.get_mut().set_deadline(deadline);
            }
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => {
                stream.get_mut().get_mut().set_deadline(deadline);
            }
        }
    }
}

impl ControlPlane for RawConnection {
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue> {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.encode_command_str(args);
        self.round_trip(&encoder, 1)?
            .pop()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "No reply"))
    }

    fn execute_pipeline(&mut self, commands: &[Vec<&str>]) -> io::Result<Vec<RespValue>> {
        let mut encoder = RespEncoder::with_capacity(64 * commands.len().max(1));
        encoder.encode_pipeline(commands);
        self.round_trip(&encoder, commands.len())
    }
}

/// Creates authenticated connections for one environment
#[derive(Clone)]
pub struct ConnectionFactory {
    pub connect_timeout: Duration,
    /// Total budget of one call, from connecting to the last reply
    pub io_timeout: Duration,
    pub tls_config: Option<TlsConfig>,
    pub auth_password: Option<String>,
    pub auth_username: Option<String>,
}

impl ConnectionFactory {
    pub fn for_environment(
        config: &ConnectionConfig,
        connect_timeout: Duration,
        io_timeout: Duration,
        tls: &TlsConfig,
    ) -> Self {
        Self {
            connect_timeout,
            io_timeout,
            tls_config: config.tls_enabled.then(|| tls.clone()),
            auth_password: config.password.clone(),
            auth_username: config.username.clone(),
        }
    }

    /// Create a new connection to the specified host:port
    ///
    /// The call deadline starts here, so connecting and AUTH count against
    /// `io_timeout` too.
    pub fn create(&self, host: &str, port: u16) -> Result<RawConnection, ConnectionError> {
        let deadline = Some(Instant::now() + self.io_timeout);
        let mut conn = match &self.tls_config {
            #[cfg(feature = "native-tls-backend")]
            Some(tls) => RawConnection::connect_tls(host, port, self.connect_timeout, deadline, tls)?,
            #[cfg(not(feature = "native-tls-backend"))]
            Some(_) => {
                return Err(ConnectionError::TlsFailed(
                    "TLS support not compiled in".to_string(),
                ));
            }
            None => RawConnection::connect_tcp(host, port, self.connect_timeout, deadline)?,
        };

        if let Some(ref password) = self.auth_password {
            conn.authenticate(password, self.auth_username.as_deref())
                .map_err(|e| match e.kind() {
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                        ConnectionError::ConnectFailed {
                            host: host.to_string(),
                            port,
                            source: e,
                        }
                    }
                    _ => ConnectionError::AuthFailed(e.to_string()),
                })?;
        }

        Ok(conn)
    }
}
