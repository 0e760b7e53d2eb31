//! # uartssh
//!
//! SSH server that exposes a serial port over the network.
//!
//! A remote user authenticates with a single fixed credential, opens a
//! shell channel, and from then on every byte typed is written to the UART
//! and every byte the UART produces is sent back over the encrypted channel.
//!
//! ## Lifecycle
//!
//! One connection is served at a time. The [`Supervisor`] binds, accepts a
//! single client, runs it through authentication and channel negotiation,
//! pumps bytes until the client disconnects, then releases everything and
//! reports a status code. A nonzero status is meant to be fatal for the
//! hosting process.
//!
//! ```rust,no_run
//! use uartssh::BridgeBuilder;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), uartssh::Error> {
//!     let mut supervisor = BridgeBuilder::new()
//!         .port(2222)
//!         .host_key("/etc/uartssh/hostkey_rsa")
//!         .credential("admin", "secret")
//!         .uart_path("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     loop {
//!         let status = supervisor.run_once().await;
//!         if status.code() != 0 {
//!             std::process::exit(status.code());
//!         }
//!     }
//! }
//! ```
//!
//! Press `Ctrl-G` on its own to drop the connection from the client side.

pub mod bridge;
pub mod error;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod uart;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use bridge::{BridgePump, PumpConfig, PumpExit};
pub use error::Error;
pub use session::{Credential, Session, SessionState};
pub use supervisor::{BridgeBuilder, SessionStatus, Supervisor};
pub use transport::{BridgeChannel, Endpoint, ServerConfig, Transport};
pub use uart::{SerialPort, Uart, UartConfig};
