//! Session state machine.
//!
//! Pure transitions: no I/O happens here. Each inbound message kind has its
//! own transition function returning the next state and the reply to send.

use std::fmt;

use super::auth::Credential;
use super::message::{AuthAttempt, ChannelKind, ChannelRequestKind, InboundMessage, Reply};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for a password that matches the credential.
    #[default]
    AwaitingAuth,

    /// Authenticated, waiting for a `session` channel open.
    AwaitingChannel,

    /// Channel open, waiting for `shell` or `pty-req`.
    AwaitingShell,

    /// Shell granted; bytes flow between channel and UART.
    Bridging,

    /// Torn down.
    Closed,
}

/// Outcome of feeding one message to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the message.
    pub next: SessionState,

    /// Reply to send for the message.
    pub reply: Reply,
}

impl Transition {
    fn stay(state: SessionState, reply: Reply) -> Self {
        Self { next: state, reply }
    }

    fn to(next: SessionState, reply: Reply) -> Self {
        Self { next, reply }
    }
}

impl SessionState {
    /// Feed one message.
    pub fn dispatch(self, message: &InboundMessage, credential: &Credential) -> Transition {
        match message {
            InboundMessage::Auth { user, attempt } => self.on_auth(user, attempt, credential),
            InboundMessage::ChannelOpen(kind) => self.on_channel_open(kind),
            InboundMessage::ChannelRequest(kind) => self.on_channel_request(kind),
            InboundMessage::Other(_) => self.on_other(),
        }
    }

    /// `SSH_MSG_USERAUTH_REQUEST`
    pub fn on_auth(self, user: &str, attempt: &AuthAttempt, credential: &Credential) -> Transition {
        match (self, attempt) {
            (SessionState::AwaitingAuth, AuthAttempt::Password(password))
                if credential.matches(user, password) =>
            {
                Transition::to(SessionState::AwaitingChannel, Reply::AuthSuccess)
            }
            (SessionState::AwaitingAuth, _) => Transition::stay(self, Reply::AuthFailure),
            _ => Transition::stay(self, Reply::Default),
        }
    }

    /// `SSH_MSG_CHANNEL_OPEN`
    pub fn on_channel_open(self, kind: &ChannelKind) -> Transition {
        match (self, kind) {
            (SessionState::AwaitingAuth, _) => Transition::stay(self, Reply::AuthFailure),
            (SessionState::AwaitingChannel, ChannelKind::Session) => {
                Transition::to(SessionState::AwaitingShell, Reply::ChannelAccept)
            }
            _ => Transition::stay(self, Reply::Default),
        }
    }

    /// `SSH_MSG_CHANNEL_REQUEST`
    pub fn on_channel_request(self, kind: &ChannelRequestKind) -> Transition {
        match self {
            SessionState::AwaitingAuth => Transition::stay(self, Reply::AuthFailure),
            SessionState::AwaitingShell if kind.grants_shell() => {
                Transition::to(SessionState::Bridging, Reply::RequestSuccess)
            }
            SessionState::Bridging if kind.grants_shell() => {
                Transition::stay(self, Reply::RequestSuccess)
            }
            _ => Transition::stay(self, Reply::Default),
        }
    }

    /// Anything the session does not understand.
    pub fn on_other(self) -> Transition {
        match self {
            SessionState::AwaitingAuth => Transition::stay(self, Reply::AuthFailure),
            _ => Transition::stay(self, Reply::Default),
        }
    }

    /// State name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            SessionState::AwaitingAuth => "awaiting-auth",
            SessionState::AwaitingChannel => "awaiting-channel",
            SessionState::AwaitingShell => "awaiting-shell",
            SessionState::Bridging => "bridging",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
