//! Serial peripheral boundary.
//!
//! The pump only needs two operations from the UART: a read that never
//! blocks and a write of a whole chunk.

mod serial;

pub use serial::SerialPort;

use std::future::Future;
use std::path::PathBuf;

use crate::error::Result;

/// Default serial device.
pub const DEFAULT_UART_PATH: &str = "/dev/ttyS1";

/// Default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Full-duplex byte stream peripheral.
pub trait Uart: Send {
    /// Read whatever is pending into `buf` without blocking.
    ///
    /// Returns `Ok(0)` when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Serial port settings.
#[derive(Debug, Clone)]
pub struct UartConfig {
    /// Device node.
    pub path: PathBuf,

    /// Fixed baud rate.
    pub baud_rate: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_UART_PATH),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}
