//! SSH transport implementation using russh.
//!
//! russh drives the protocol through handler callbacks. The handler turns
//! each callback we care about into an [`InboundMessage`], pushes it into an
//! inbox together with a one-shot reply slot, and waits for the session to
//! answer. The session side pulls from the inbox at its own pace.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::FutureExt;
use log::{debug, info, trace, warn};
use russh::keys::{PrivateKey, PublicKey, load_secret_key};
use russh::server::{self, Auth, Handle, Msg, Response, RunningSession, Session as SshSession};
use russh::{Channel, ChannelId, ChannelMsg, MethodKind, MethodSet, Pty};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use super::{BridgeChannel, Endpoint, Transport};
use crate::error::{Result, SessionError, TransportError};
use crate::session::{AuthAttempt, ChannelKind, ChannelRequestKind, InboundMessage, Reply};

/// Messages that may sit in the inbox before the session pulls them.
const INBOX_CAPACITY: usize = 8;

/// How long teardown waits for the russh task after a disconnect.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Load the host private key from disk.
pub fn load_host_key(path: &Path) -> Result<PrivateKey> {
    load_secret_key(path, None).map_err(|e| {
        TransportError::HostKey {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
        .into()
    })
}

/// russh server configuration: password only, no idle timeout, no
/// keepalive, no delay on rejected attempts.
pub fn server_config(host_key: PrivateKey) -> server::Config {
    server::Config {
        keys: vec![host_key],
        methods: MethodSet::from(&[MethodKind::Password][..]),
        auth_rejection_time: Duration::ZERO,
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: None,
        keepalive_interval: None,
        ..Default::default()
    }
}

/// Listening socket plus the shared russh configuration.
pub struct SshEndpoint {
    /// Address to bind.
    addr: SocketAddr,

    /// russh configuration, built once at startup.
    config: Arc<server::Config>,

    /// Bound listener (None when unbound).
    listener: Option<TcpListener>,
}

impl SshEndpoint {
    /// Create an endpoint. Nothing is bound until [`Endpoint::listen`].
    pub fn new(addr: SocketAddr, config: Arc<server::Config>) -> Self {
        Self {
            addr,
            config,
            listener: None,
        }
    }

    /// Whether the endpoint currently holds a bound socket.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }
}

impl Endpoint for SshEndpoint {
    type Transport = SshTransport;

    async fn listen(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| TransportError::Listen {
                addr: self.addr,
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| TransportError::Listen {
                addr: self.addr,
                source,
            })?;

        self.listener = Some(listener);
        Ok(local)
    }

    async fn accept(&mut self) -> Result<SshTransport> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotListening)?;

        let (socket, peer) = listener.accept().await.map_err(TransportError::Accept)?;
        info!("Accepted connection from {}", peer);
        if let Err(e) = socket.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let handler = SessionHandler { inbox: tx };

        let running = server::run_stream(self.config.clone(), socket, handler)
            .await
            .map_err(TransportError::Handshake)?;

        Ok(SshTransport {
            handle: running.handle(),
            session: Some(running),
            inbox: Inbox::new(rx),
            received: false,
            peer,
        })
    }

    fn unbind(&mut self) {
        if self.listener.take().is_some() {
            debug!("Released {}", self.addr);
        }
    }
}

/// A message forwarded by the handler, waiting for its reply.
struct Envelope {
    message: InboundMessage,
    channel: Option<Channel<Msg>>,
    reply: oneshot::Sender<Reply>,
}

/// The slot of the message most recently handed to the session.
struct Pending {
    channel: Option<Channel<Msg>>,
    reply: oneshot::Sender<Reply>,
}

/// Receiving side of the handler's message queue.
struct Inbox {
    rx: mpsc::Receiver<Envelope>,
    pending: Option<Pending>,
    closed: bool,
}

impl Inbox {
    fn new(rx: mpsc::Receiver<Envelope>) -> Self {
        Self {
            rx,
            pending: None,
            closed: false,
        }
    }

    async fn next(&mut self) -> Option<InboundMessage> {
        if let Some(stale) = self.pending.take() {
            let _ = stale.reply.send(Reply::Default);
        }

        let Envelope {
            message,
            channel,
            reply,
        } = self.rx.recv().await?;
        self.pending = Some(Pending { channel, reply });
        Some(message)
    }

    fn reply(&mut self, reply: Reply) -> Result<()> {
        let pending = self.pending.take().ok_or(TransportError::NoPendingMessage)?;
        // The handler is gone if this fails; the session notices on the next pull.
        let _ = pending.reply.send(reply);
        Ok(())
    }

    fn accept_channel(&mut self) -> Result<Channel<Msg>> {
        let pending = self.pending.take().ok_or(TransportError::NoPendingMessage)?;
        let Some(channel) = pending.channel else {
            let _ = pending.reply.send(Reply::Default);
            return Err(SessionError::NoChannel.into());
        };
        let _ = pending.reply.send(Reply::ChannelAccept);
        Ok(channel)
    }

    fn close(&mut self) {
        self.closed = true;
        self.rx.close();
        while let Ok(envelope) = self.rx.try_recv() {
            let reply = Reply::after_negotiation(&envelope.message);
            let _ = envelope.reply.send(reply);
        }
    }
}

/// One accepted SSH connection.
pub struct SshTransport {
    /// Handle to the russh session task.
    handle: Handle,

    /// The russh session task; taken once joined.
    session: Option<RunningSession<SessionHandler>>,

    /// Messages forwarded by the handler.
    inbox: Inbox,

    /// Set once the handler forwarded anything, i.e. key exchange completed.
    received: bool,

    /// Remote address.
    peer: SocketAddr,
}

impl SshTransport {
    /// Wait for the russh session task to end and return its outcome.
    async fn join(&mut self) -> std::result::Result<(), russh::Error> {
        match self.session.take() {
            Some(running) => running.await,
            None => Ok(()),
        }
    }
}

impl Transport for SshTransport {
    type Channel = SshChannel;

    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        if self.inbox.closed {
            return Ok(None);
        }
        if let Some(message) = self.inbox.next().await {
            self.received = true;
            return Ok(Some(message));
        }

        // The handler is dropped with the session task, so it has ended.
        let outcome = self.join().await;
        match outcome {
            Ok(()) => Ok(None),
            Err(e) if !self.received => Err(TransportError::Handshake(e).into()),
            Err(e) => {
                debug!("Session with {} ended: {}", self.peer, e);
                Ok(None)
            }
        }
    }

    async fn reply(&mut self, reply: Reply) -> Result<()> {
        self.inbox.reply(reply)
    }

    async fn accept_channel(&mut self) -> Result<SshChannel> {
        Ok(SshChannel::new(self.inbox.accept_channel()?))
    }

    fn end_negotiation(&mut self) {
        self.inbox.close();
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.inbox.close();
        let sent = self
            .handle
            .disconnect(
                russh::Disconnect::ByApplication,
                "session closed".into(),
                "en".into(),
            )
            .await;

        let joined = tokio::time::timeout(DISCONNECT_GRACE, self.join()).await;
        match joined {
            Ok(Ok(())) => debug!("Disconnected {}", self.peer),
            Ok(Err(e)) => debug!("Session with {} ended: {}", self.peer, e),
            Err(_) => warn!("Session task for {} still running after disconnect", self.peer),
        }

        sent.map_err(TransportError::Ssh)?;
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// The negotiated session channel.
pub struct SshChannel {
    /// The russh channel.
    channel: Channel<Msg>,

    /// Bytes of the current data message not yet read.
    pending: BytesMut,

    /// Cleared when the peer closes the channel.
    open: bool,
}

impl SshChannel {
    fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            pending: BytesMut::new(),
            open: true,
        }
    }
}

impl BridgeChannel for SshChannel {
    fn poll_data(&mut self) -> bool {
        if !self.pending.is_empty() {
            return true;
        }

        while self.open {
            match self.channel.wait().now_or_never() {
                None => return false,
                Some(Some(ChannelMsg::Data { data })) => {
                    if data.is_empty() {
                        continue;
                    }
                    self.pending.extend_from_slice(&data);
                    return true;
                }
                Some(Some(ChannelMsg::Close)) | Some(None) => {
                    debug!("Channel {} closed by peer", self.channel.id());
                    self.open = false;
                }
                Some(Some(other)) => trace!("Ignoring channel message {:?}", other),
            }
        }
        false
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        if self.pending.is_empty() && !self.poll_data() {
            return 0;
        }

        let n = buf.len().min(self.pending.len());
        let chunk = self.pending.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        n
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::Disconnected.into());
        }
        self.channel.data(data).await.map_err(TransportError::Ssh)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.channel.close().await.map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// russh server handler: forwards callbacks into the inbox.
struct SessionHandler {
    inbox: mpsc::Sender<Envelope>,
}

impl SessionHandler {
    /// Forward a message and wait for the session's reply.
    ///
    /// Once the session stops reading, the fixed post-negotiation policy
    /// answers instead.
    async fn forward(&self, message: InboundMessage, channel: Option<Channel<Msg>>) -> Reply {
        let fallback = Reply::after_negotiation(&message);
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope {
            message,
            channel,
            reply: tx,
        };

        if self.inbox.send(envelope).await.is_err() {
            return fallback;
        }
        rx.await.unwrap_or(fallback)
    }

    async fn auth(&self, user: &str, attempt: AuthAttempt) -> Auth {
        let message = InboundMessage::Auth {
            user: user.to_string(),
            attempt,
        };
        match self.forward(message, None).await {
            Reply::AuthSuccess => Auth::Accept,
            _ => Auth::Reject {
                proceed_with_methods: Some(MethodSet::from(&[MethodKind::Password][..])),
                partial_success: false,
            },
        }
    }

    async fn request(
        &self,
        channel: ChannelId,
        kind: ChannelRequestKind,
        session: &mut SshSession,
    ) -> std::result::Result<(), russh::Error> {
        match self.forward(InboundMessage::ChannelRequest(kind), None).await {
            Reply::RequestSuccess => session.channel_success(channel)?,
            _ => session.channel_failure(channel)?,
        }
        Ok(())
    }
}

impl server::Handler for SessionHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> std::result::Result<Auth, Self::Error> {
        Ok(self.auth(user, AuthAttempt::None).await)
    }

    async fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        let attempt = AuthAttempt::Password(SecretString::from(password.to_string()));
        Ok(self.auth(user, attempt).await)
    }

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        let attempt = AuthAttempt::Unsupported("publickey".to_string());
        Ok(self.auth(user, attempt).await)
    }

    async fn auth_keyboard_interactive<'a>(
        &'a mut self,
        user: &str,
        _submethods: &str,
        _response: Option<Response<'a>>,
    ) -> std::result::Result<Auth, Self::Error> {
        let attempt = AuthAttempt::Unsupported("keyboard-interactive".to_string());
        Ok(self.auth(user, attempt).await)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut SshSession,
    ) -> std::result::Result<bool, Self::Error> {
        let message = InboundMessage::ChannelOpen(ChannelKind::Session);
        Ok(self.forward(message, Some(channel)).await == Reply::ChannelAccept)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut SshSession,
    ) -> std::result::Result<(), Self::Error> {
        let kind = ChannelRequestKind::Pty {
            term: term.to_string(),
            cols: col_width,
            rows: row_height,
        };
        self.request(channel, kind, session).await
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut SshSession,
    ) -> std::result::Result<(), Self::Error> {
        self.request(channel, ChannelRequestKind::Shell, session).await
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut SshSession,
    ) -> std::result::Result<(), Self::Error> {
        let kind = ChannelRequestKind::Exec(String::from_utf8_lossy(data).into_owned());
        self.request(channel, kind, session).await
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut SshSession,
    ) -> std::result::Result<(), Self::Error> {
        let kind = ChannelRequestKind::Env {
            name: variable_name.to_string(),
            value: variable_value.to_string(),
        };
        self.request(channel, kind, session).await
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut SshSession,
    ) -> std::result::Result<(), Self::Error> {
        let kind = ChannelRequestKind::Subsystem(name.to_string());
        self.request(channel, kind, session).await
    }
}
