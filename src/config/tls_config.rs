//! TLS configuration

use std::path::PathBuf;

/// TLS settings applied to every connection of a TLS-enabled environment
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub skip_verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    /// Overrides the host name sent for SNI and checked against the certificate
    pub sni: Option<String>,
}

impl TlsConfig {
    pub fn has_client_cert(&self) -> bool {
        self.client_cert.is_some() && self.client_key.is_some()
    }

    /// Name to present during the handshake with `host`
    pub fn server_name<'a>(&'a self, host: &'a str) -> &'a str {
        self.sni.as_deref().unwrap_or(host)
    }
}
