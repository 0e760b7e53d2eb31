//! termios serial port, opened non-blocking.
//!
//! Uses rustix for the open and termios calls and tokio's `AsyncFd` to wait
//! for writability.

use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use log::debug;
use rustix::fs::{Mode, OFlags, open};
use rustix::termios::{ControlModes, OptionalActions, tcgetattr, tcsetattr};
use tokio::io::unix::AsyncFd;

use super::{Uart, UartConfig};
use crate::error::{Result, UartError};

fn os_error(e: rustix::io::Errno) -> io::Error {
    io::Error::from_raw_os_error(e.raw_os_error())
}

/// A tty device in raw mode at a fixed baud rate.
pub struct SerialPort {
    /// The device file descriptor wrapped for async readiness.
    fd: AsyncFd<OwnedFd>,

    /// Device path, for logs.
    path: PathBuf,
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("fd", &self.fd.as_raw_fd())
            .field("path", &self.path)
            .finish()
    }
}

impl SerialPort {
    /// Open and configure the device.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &UartConfig) -> Result<Self> {
        let path = config.path.as_path();

        let fd = open(
            path,
            OFlags::RDWR | OFlags::NOCTTY | OFlags::NONBLOCK | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| UartError::Open {
            path: path.to_path_buf(),
            source: os_error(e),
        })?;

        Self::configure(&fd, path, config.baud_rate)?;

        let fd = AsyncFd::new(fd).map_err(UartError::Io)?;
        debug!("Opened {} at {} baud", path.display(), config.baud_rate);

        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    /// Raw mode, receiver enabled, modem lines ignored, fixed speed.
    fn configure(fd: &OwnedFd, path: &Path, baud_rate: u32) -> Result<()> {
        let configure_err = |e: rustix::io::Errno| UartError::Configure {
            path: path.to_path_buf(),
            source: os_error(e),
        };

        let mut termios = tcgetattr(fd).map_err(configure_err)?;
        termios.make_raw();
        termios.control_modes |= ControlModes::CREAD | ControlModes::CLOCAL;
        termios.set_speed(baud_rate).map_err(configure_err)?;
        tcsetattr(fd, OptionalActions::Now, &termios).map_err(configure_err)?;
        Ok(())
    }
}

impl Uart for SerialPort {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match rustix::io::read(self.fd.get_ref(), buf) {
            Ok(n) => Ok(n),
            Err(rustix::io::Errno::AGAIN) | Err(rustix::io::Errno::INTR) => Ok(0),
            Err(e) => Err(UartError::Io(os_error(e)).into()),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let mut guard = self.fd.writable().await.map_err(UartError::Io)?;
            let pending = &data[written..];
            let result =
                guard.try_io(|inner| rustix::io::write(inner.get_ref(), pending).map_err(os_error));
            match result {
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(UartError::Io(e).into()),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}
