//! Builder for the production supervisor.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::Supervisor;
use crate::bridge::{MAX_BUFFER_SIZE, PumpConfig};
use crate::error::{ConfigError, Result};
use crate::session::Credential;
use crate::transport::{ServerConfig, SshEndpoint, load_host_key, server_config};
use crate::uart::{SerialPort, UartConfig};

/// Builder for a [`Supervisor`] serving SSH on a real serial port.
///
/// # Example
///
/// ```rust,no_run
/// use uartssh::BridgeBuilder;
///
/// # async fn example() -> Result<(), uartssh::Error> {
/// let supervisor = BridgeBuilder::new()
///     .port(2222)
///     .credential("admin", "secret")
///     .uart_path("/dev/ttyUSB0")
///     .baud_rate(9600)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BridgeBuilder {
    server: ServerConfig,
    uart: UartConfig,
    pump: PumpConfig,
}

impl BridgeBuilder {
    /// Create a builder with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to bind (default: all interfaces).
    pub fn listen_addr(mut self, addr: IpAddr) -> Self {
        self.server.listen_addr = addr;
        self
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Set the host private key path.
    pub fn host_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.server.host_key_path = path.into();
        self
    }

    /// Set the accepted username and password.
    pub fn credential(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.server.credential = Credential::new(username, password);
        self
    }

    /// Log presented passwords. Diagnostic only.
    pub fn log_credentials(mut self, enabled: bool) -> Self {
        self.server.log_credentials = enabled;
        self
    }

    /// Set the serial device path.
    pub fn uart_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.uart.path = path.into();
        self
    }

    /// Set the serial baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.uart.baud_rate = baud_rate;
        self
    }

    /// Set the scratch buffer size per direction.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.pump.buffer_size = size;
        self
    }

    /// Set the byte that ends a session when received alone.
    pub fn disconnect_byte(mut self, byte: u8) -> Self {
        self.pump.disconnect_byte = byte;
        self
    }

    /// Set or clear the banner written when the bridge starts.
    pub fn banner(mut self, banner: Option<String>) -> Self {
        self.pump.banner = banner;
        self
    }

    /// Set the sleep between idle pump iterations.
    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.pump.idle_backoff = backoff;
        self
    }

    /// Check the settings without touching any device or file.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |message: String| -> Result<()> { Err(ConfigError::Invalid { message }.into()) };

        if self.pump.buffer_size == 0 || self.pump.buffer_size > MAX_BUFFER_SIZE {
            return invalid(format!(
                "buffer size must be between 1 and {}, got {}",
                MAX_BUFFER_SIZE, self.pump.buffer_size
            ));
        }
        if self.uart.baud_rate == 0 {
            return invalid("baud rate must be nonzero".to_string());
        }
        if self.server.credential.username().is_empty() {
            return invalid("username must not be empty".to_string());
        }
        Ok(())
    }

    /// Load the host key, open the UART and assemble the supervisor.
    ///
    /// Nothing is bound until the supervisor runs.
    pub async fn build(self) -> Result<Supervisor<SshEndpoint, SerialPort>> {
        self.validate()?;

        let host_key = load_host_key(&self.server.host_key_path)?;
        debug!("Loaded host key from {}", self.server.host_key_path.display());

        let endpoint = SshEndpoint::new(
            self.server.socket_addr(),
            Arc::new(server_config(host_key)),
        );
        let uart = SerialPort::open(&self.uart)?;

        Ok(Supervisor::new(
            endpoint,
            uart,
            self.server.credential,
            self.pump,
            self.server.log_credentials,
        ))
    }
}
