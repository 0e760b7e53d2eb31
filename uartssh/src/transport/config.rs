//! SSH server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::session::Credential;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default location of the provisioned RSA host key.
pub const DEFAULT_HOST_KEY_PATH: &str = "/spiffs/hostkey_rsa";

/// SSH server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind (default: all interfaces).
    pub listen_addr: IpAddr,

    /// SSH port (default: 22).
    pub port: u16,

    /// Path to the host private key.
    pub host_key_path: PathBuf,

    /// The single accepted credential.
    pub credential: Credential,

    /// Log presented passwords. Diagnostic only, off by default.
    pub log_credentials: bool,
}

impl ServerConfig {
    /// Get the socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            host_key_path: PathBuf::from(DEFAULT_HOST_KEY_PATH),
            credential: Credential::from_build_env(),
            log_credentials: false,
        }
    }
}
