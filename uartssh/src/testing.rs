//! In-memory transport, channel, endpoint and UART for unit tests.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use secrecy::SecretString;

use crate::error::{Result, SessionError, TransportError, UartError};
use crate::session::{AuthAttempt, ChannelKind, ChannelRequestKind, InboundMessage, Reply};
use crate::transport::{BridgeChannel, Endpoint, Transport};
use crate::uart::Uart;

/// What the scripted transport and channel observed.
#[derive(Debug, Default)]
pub(crate) struct TransportLog {
    pub replies: Vec<Reply>,
    pub channels_accepted: usize,
    pub negotiation_ended: bool,
    pub disconnected: bool,
    pub channel_closed: bool,
    pub channel_writes: Vec<u8>,
}

pub(crate) type SharedLog = Arc<Mutex<TransportLog>>;

pub(crate) fn password(user: &str, pass: &str) -> InboundMessage {
    InboundMessage::Auth {
        user: user.to_string(),
        attempt: AuthAttempt::Password(SecretString::from(pass.to_string())),
    }
}

pub(crate) fn auth_none(user: &str) -> InboundMessage {
    InboundMessage::Auth {
        user: user.to_string(),
        attempt: AuthAttempt::None,
    }
}

pub(crate) fn channel_open() -> InboundMessage {
    InboundMessage::ChannelOpen(ChannelKind::Session)
}

pub(crate) fn channel_open_other(kind: &str) -> InboundMessage {
    InboundMessage::ChannelOpen(ChannelKind::Other(kind.to_string()))
}

pub(crate) fn shell() -> InboundMessage {
    InboundMessage::ChannelRequest(ChannelRequestKind::Shell)
}

pub(crate) fn pty() -> InboundMessage {
    InboundMessage::ChannelRequest(ChannelRequestKind::Pty {
        term: "xterm".to_string(),
        cols: 80,
        rows: 24,
    })
}

pub(crate) fn exec(command: &str) -> InboundMessage {
    InboundMessage::ChannelRequest(ChannelRequestKind::Exec(command.to_string()))
}

/// When a [`ScriptedChannel`] reports itself closed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CloseWhen {
    /// Once every scripted read has been consumed.
    Drained,
    /// After this many `poll_data` calls.
    AfterPolls(usize),
    /// Only when `close()` is called.
    Never,
}

/// Channel that replays scripted reads and records writes.
pub(crate) struct ScriptedChannel {
    reads: VecDeque<Vec<u8>>,
    close_when: CloseWhen,
    polls: usize,
    closed: bool,
    log: SharedLog,
}

impl ScriptedChannel {
    pub(crate) fn new(reads: &[&[u8]], close_when: CloseWhen) -> Self {
        Self {
            reads: reads.iter().map(|chunk| chunk.to_vec()).collect(),
            close_when,
            polls: 0,
            closed: false,
            log: SharedLog::default(),
        }
    }

    pub(crate) fn idle() -> Self {
        Self::new(&[], CloseWhen::Never)
    }

    /// A channel the peer has already closed: every write fails.
    pub(crate) fn closed() -> Self {
        let mut channel = Self::new(&[], CloseWhen::Never);
        channel.closed = true;
        channel
    }

    pub(crate) fn log(&self) -> SharedLog {
        self.log.clone()
    }
}

impl BridgeChannel for ScriptedChannel {
    fn poll_data(&mut self) -> bool {
        self.polls += 1;
        !self.reads.is_empty()
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        let Some(mut chunk) = self.reads.pop_front() else {
            return 0;
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.reads.push_front(chunk.split_off(n));
        }
        n
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        self.log.lock().unwrap().channel_writes.extend_from_slice(data);
        Ok(())
    }

    fn is_open(&self) -> bool {
        if self.closed {
            return false;
        }
        match self.close_when {
            CloseWhen::Drained => !self.reads.is_empty(),
            CloseWhen::AfterPolls(n) => self.polls < n,
            CloseWhen::Never => true,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.log.lock().unwrap().channel_closed = true;
        Ok(())
    }
}

/// Transport that replays a fixed message script.
pub(crate) struct ScriptedTransport {
    messages: VecDeque<InboundMessage>,
    channel: Option<ScriptedChannel>,
    pending: bool,
    handshake_fails: bool,
    log: SharedLog,
}

impl ScriptedTransport {
    pub(crate) fn new(messages: Vec<InboundMessage>) -> (Self, SharedLog) {
        let log = SharedLog::default();
        let transport = Self {
            messages: messages.into(),
            channel: None,
            pending: false,
            handshake_fails: false,
            log: log.clone(),
        };
        (transport, log)
    }

    pub(crate) fn with_channel(
        messages: Vec<InboundMessage>,
        mut channel: ScriptedChannel,
    ) -> (Self, SharedLog) {
        let (mut transport, log) = Self::new(messages);
        channel.log = log.clone();
        transport.channel = Some(channel);
        (transport, log)
    }

    /// A transport whose key exchange fails before any message arrives.
    pub(crate) fn failing_handshake() -> (Self, SharedLog) {
        let (mut transport, log) = Self::new(vec![]);
        transport.handshake_fails = true;
        (transport, log)
    }

    fn take_pending(&mut self) -> Result<()> {
        if !self.pending {
            return Err(TransportError::NoPendingMessage.into());
        }
        self.pending = false;
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    type Channel = ScriptedChannel;

    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        if self.handshake_fails {
            let cause = russh::Error::from(io::Error::from(io::ErrorKind::ConnectionReset));
            return Err(TransportError::Handshake(cause).into());
        }
        if self.pending {
            self.pending = false;
            self.log.lock().unwrap().replies.push(Reply::Default);
        }
        let Some(message) = self.messages.pop_front() else {
            return Ok(None);
        };
        self.pending = true;
        Ok(Some(message))
    }

    async fn reply(&mut self, reply: Reply) -> Result<()> {
        self.take_pending()?;
        self.log.lock().unwrap().replies.push(reply);
        Ok(())
    }

    async fn accept_channel(&mut self) -> Result<ScriptedChannel> {
        self.take_pending()?;
        let channel = self.channel.take().ok_or(SessionError::NoChannel)?;
        let mut log = self.log.lock().unwrap();
        log.replies.push(Reply::ChannelAccept);
        log.channels_accepted += 1;
        Ok(channel)
    }

    fn end_negotiation(&mut self) {
        self.log.lock().unwrap().negotiation_ended = true;
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.log.lock().unwrap().disconnected = true;
        Ok(())
    }
}

/// Endpoint that hands out one scripted transport.
pub(crate) struct ScriptedEndpoint {
    transport: Option<ScriptedTransport>,
    fail_listen: bool,
    pub listening: bool,
    pub unbinds: usize,
}

impl ScriptedEndpoint {
    pub(crate) fn new(transport: ScriptedTransport) -> Self {
        Self {
            transport: Some(transport),
            fail_listen: false,
            listening: false,
            unbinds: 0,
        }
    }

    pub(crate) fn failing_listen() -> Self {
        Self {
            transport: None,
            fail_listen: true,
            listening: false,
            unbinds: 0,
        }
    }
}

impl Endpoint for ScriptedEndpoint {
    type Transport = ScriptedTransport;

    async fn listen(&mut self) -> Result<SocketAddr> {
        let addr: SocketAddr = ([127, 0, 0, 1], 22).into();
        if self.fail_listen {
            return Err(TransportError::Listen {
                addr,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            }
            .into());
        }
        self.listening = true;
        Ok(addr)
    }

    async fn accept(&mut self) -> Result<ScriptedTransport> {
        if !self.listening {
            return Err(TransportError::NotListening.into());
        }
        self.transport.take().ok_or_else(|| {
            TransportError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted)).into()
        })
    }

    fn unbind(&mut self) {
        self.listening = false;
        self.unbinds += 1;
    }
}

/// UART backed by memory: scripted incoming chunks, recorded writes.
#[derive(Debug, Default)]
pub(crate) struct MemoryUart {
    pub(crate) incoming: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    pub fail_writes: bool,
}

impl MemoryUart {
    pub(crate) fn new(incoming: &[&[u8]]) -> Self {
        Self {
            incoming: incoming.iter().map(|chunk| chunk.to_vec()).collect(),
            ..Default::default()
        }
    }
}

impl Uart for MemoryUart {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(mut chunk) = self.incoming.pop_front() else {
            return Ok(0);
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.incoming.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(UartError::Io(io::Error::other("uart write failed")).into());
        }
        self.written.extend_from_slice(data);
        Ok(())
    }
}
