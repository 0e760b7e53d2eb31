//! Byte relay between the negotiated channel and the UART.

mod buffer;
mod pump;

pub use buffer::ScratchBuffer;
pub use pump::{BridgePump, PumpExit, PumpStats};

use std::time::Duration;

/// Ctrl-G: a read of exactly this one byte drops the connection.
pub const DISCONNECT_BYTE: u8 = 0x07;

/// Default scratch buffer size per direction.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Largest accepted scratch buffer size.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Pump behavior.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Capacity of each scratch buffer.
    pub buffer_size: usize,

    /// Byte that ends the session when it arrives on its own.
    pub disconnect_byte: u8,

    /// Written to the channel once, before bytes start flowing.
    pub banner: Option<String>,

    /// Sleep between iterations that moved no data.
    pub idle_backoff: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            disconnect_byte: DISCONNECT_BYTE,
            banner: Some("Connected!\r\n".to_string()),
            idle_backoff: Duration::from_millis(5),
        }
    }
}
