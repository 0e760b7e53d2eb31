//! Non-blocking bidirectional pump.
//!
//! Each iteration polls the channel once and the UART once, forwarding
//! whatever is ready. Order within a direction is preserved; the two
//! directions interleave in poll order. There is no flow control and no
//! retry beyond what the channel and UART writes do themselves.

use log::{debug, info, trace, warn};

use super::PumpConfig;
use super::buffer::ScratchBuffer;
use crate::error::Result;
use crate::transport::BridgeChannel;
use crate::uart::Uart;

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer sent the disconnect byte on its own.
    DisconnectRequested,

    /// The peer closed the channel.
    RemoteClosed,

    /// A channel or UART error ended the relay.
    Faulted,
}

/// Byte counters for one pump run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Bytes written to the UART.
    pub to_uart: u64,

    /// Bytes written to the channel.
    pub to_channel: u64,

    /// Loop iterations.
    pub iterations: u64,
}

enum Step {
    Idle,
    Moved,
    Exit(PumpExit),
}

/// Relays bytes between a channel and a UART until disconnect.
#[derive(Debug)]
pub struct BridgePump {
    /// Channel -> UART scratch space.
    inbound: ScratchBuffer,

    /// UART -> channel scratch space.
    outbound: ScratchBuffer,

    config: PumpConfig,

    stats: PumpStats,
}

impl BridgePump {
    /// Create a pump with buffers sized from `config`.
    pub fn new(config: PumpConfig) -> Self {
        Self {
            inbound: ScratchBuffer::new(config.buffer_size),
            outbound: ScratchBuffer::new(config.buffer_size),
            config,
            stats: PumpStats::default(),
        }
    }

    /// Counters from the current or last run.
    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Run until the disconnect byte, remote close, or an I/O fault.
    ///
    /// Faults are logged and otherwise treated like a normal end of session.
    pub async fn run<C, U>(&mut self, channel: &mut C, uart: &mut U) -> PumpExit
    where
        C: BridgeChannel,
        U: Uart,
    {
        self.stats = PumpStats::default();

        let exit = loop {
            self.stats.iterations += 1;
            match self.step(channel, uart).await {
                Ok(Step::Moved) => tokio::task::yield_now().await,
                Ok(Step::Idle) => tokio::time::sleep(self.config.idle_backoff).await,
                Ok(Step::Exit(exit)) => break exit,
                Err(e) => {
                    warn!("Bridge stopped: {}", e);
                    break PumpExit::Faulted;
                }
            }
        };

        info!(
            "Bridge finished ({:?}): {} bytes to UART, {} bytes to client",
            exit, self.stats.to_uart, self.stats.to_channel
        );
        exit
    }

    async fn step<C, U>(&mut self, channel: &mut C, uart: &mut U) -> Result<Step>
    where
        C: BridgeChannel,
        U: Uart,
    {
        let mut moved = false;

        if channel.poll_data() {
            let n = self
                .inbound
                .fill_with(|buf| channel.read_nonblocking(buf))
                .len();
            if n > 0 {
                if self.inbound.is_exactly(self.config.disconnect_byte) {
                    debug!("Disconnect byte received");
                    return Ok(Step::Exit(PumpExit::DisconnectRequested));
                }
                trace!("client -> uart: {} bytes", n);
                uart.write_all(self.inbound.filled()).await?;
                self.stats.to_uart += n as u64;
                moved = true;
            }
        }

        let n = uart.read_available(self.outbound.spare())?;
        self.outbound.set_filled(n);
        if n > 0 {
            trace!("uart -> client: {} bytes", n);
            channel.write(self.outbound.filled()).await?;
            self.stats.to_channel += n as u64;
            moved = true;
        }

        if !channel.is_open() {
            return Ok(Step::Exit(PumpExit::RemoteClosed));
        }

        Ok(if moved { Step::Moved } else { Step::Idle })
    }
}
