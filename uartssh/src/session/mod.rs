//! Per-connection session: authentication and channel negotiation.
//!
//! A [`Session`] owns the transport for one accepted connection. Messages
//! are pulled one at a time, fed through the [`SessionState`] machine, and
//! answered immediately; nothing is queued.

mod auth;
pub mod message;
mod negotiate;
mod state;

pub use auth::{AuthOutcome, Authenticator, Credential, DEFAULT_PASSWORD, DEFAULT_USER};
pub use message::{AuthAttempt, ChannelKind, ChannelRequestKind, InboundMessage, Reply};
pub use negotiate::ChannelNegotiator;
pub use state::{SessionState, Transition};

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Result, SessionError};
use crate::transport::{BridgeChannel, Transport};

/// One connection attempt, from accept to teardown.
pub struct Session<T: Transport> {
    /// Underlying SSH transport.
    transport: T,

    /// Credential checked by the auth transition.
    credential: Arc<Credential>,

    /// Current state.
    state: SessionState,

    /// Set once a password request matched.
    authenticated: bool,

    /// Present once the channel-open gate accepted a session channel.
    channel: Option<T::Channel>,

    /// Set once the shell gate granted a shell or PTY.
    shell_granted: bool,

    /// User name from the most recent auth request.
    last_user: Option<String>,
}

impl<T: Transport> Session<T> {
    /// Create a session around a freshly accepted transport.
    pub fn new(transport: T, credential: Arc<Credential>) -> Self {
        Self {
            transport,
            credential,
            state: SessionState::AwaitingAuth,
            authenticated: false,
            channel: None,
            shell_granted: false,
            last_user: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a password request matched the credential.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether a shell or PTY was granted.
    pub fn is_shell_granted(&self) -> bool {
        self.shell_granted
    }

    /// User name from the most recent auth request, if any.
    pub fn last_user(&self) -> Option<&str> {
        self.last_user.as_deref()
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Pull the next inbound message, or `None` when the stream has ended.
    pub async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        self.transport.next_message().await
    }

    /// Feed one message through the state machine and send the reply.
    pub async fn dispatch(&mut self, message: InboundMessage) -> Result<()> {
        if let InboundMessage::Auth { user, .. } = &message {
            self.last_user = Some(user.clone());
        }

        let Transition { next, reply } = self.state.dispatch(&message, &self.credential);
        debug!(
            "{} in {}: reply {}, next {}",
            message.kind(),
            self.state,
            reply,
            next
        );

        match reply {
            Reply::ChannelAccept => {
                let channel = self.transport.accept_channel().await?;
                self.channel = Some(channel);
            }
            other => self.transport.reply(other).await?,
        }

        match (self.state, next) {
            (SessionState::AwaitingAuth, SessionState::AwaitingChannel) => {
                self.authenticated = true;
            }
            (SessionState::AwaitingShell, SessionState::Bridging) => {
                self.shell_granted = true;
            }
            _ => {}
        }
        self.state = next;
        Ok(())
    }

    /// Fail unless the session is in `expected`.
    pub fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                expected: expected.name(),
                found: self.state.name(),
            }
            .into());
        }
        Ok(())
    }

    /// The negotiated channel, available only once both gates passed.
    pub fn bridge_channel(&mut self) -> Result<&mut T::Channel> {
        self.expect_state(SessionState::Bridging)?;
        let found = self.state.name();
        self.channel.as_mut().ok_or_else(|| {
            SessionError::InvalidState {
                expected: "open channel",
                found,
            }
            .into()
        })
    }

    /// Release the channel and the connection.
    ///
    /// Errors are logged and swallowed: the peer may already be gone.
    pub async fn teardown(mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("Channel close failed: {}", e);
            }
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!("Disconnect failed: {}", e);
        }
        self.state = SessionState::Closed;
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!("Session dropped in state {} without teardown", self.state);
        }
    }
}
