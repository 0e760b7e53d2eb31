//! SSH transport layer.
//!
//! The core never touches the SSH engine directly. It sees three seams:
//!
//! - [`Endpoint`]: bind, accept one connection, free the bind.
//! - [`Transport`]: a pull-style stream of [`InboundMessage`]s, each answered
//!   with exactly one [`Reply`].
//! - [`BridgeChannel`]: the negotiated channel, polled without blocking.
//!
//! [`SshEndpoint`] implements them on top of russh.

pub mod config;
mod ssh;

pub use config::ServerConfig;
pub use ssh::{SshChannel, SshEndpoint, SshTransport, load_host_key, server_config};

use std::future::Future;
use std::net::SocketAddr;

use crate::error::Result;
use crate::session::{InboundMessage, Reply};

/// Listening side of the server.
pub trait Endpoint: Send {
    /// Transport produced for each accepted connection.
    type Transport: Transport;

    /// Bind and start listening. Returns the bound address.
    fn listen(&mut self) -> impl Future<Output = Result<SocketAddr>> + Send;

    /// Block until one client connects, then start the SSH handshake.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Transport>> + Send;

    /// Release the bound socket.
    fn unbind(&mut self);
}

/// Message-level view of one SSH connection.
pub trait Transport: Send {
    /// Channel handed out when a channel open is accepted.
    type Channel: BridgeChannel;

    /// Next inbound message, or `None` once the connection has ended.
    ///
    /// A message left unanswered when this is called again is declined.
    /// Fails if the connection ended because the handshake failed.
    fn next_message(&mut self) -> impl Future<Output = Result<Option<InboundMessage>>> + Send;

    /// Answer the last message returned by [`next_message`](Self::next_message).
    fn reply(&mut self, reply: Reply) -> impl Future<Output = Result<()>> + Send;

    /// Accept the pending channel-open message and take the channel.
    fn accept_channel(&mut self) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Stop forwarding messages. Later requests are answered by
    /// [`Reply::after_negotiation`].
    fn end_negotiation(&mut self);

    /// Disconnect the peer.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Remote address, when known.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A negotiated channel, used by the bridge pump.
pub trait BridgeChannel: Send {
    /// Whether data is ready to read. Never blocks.
    fn poll_data(&mut self) -> bool;

    /// Copy ready data into `buf` without blocking. Returns 0 when nothing
    /// is ready.
    ///
    /// Never merges two separate data messages into one read.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize;

    /// Send data to the peer.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Whether the channel is still open.
    fn is_open(&self) -> bool;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
