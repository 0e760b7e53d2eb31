//! Inbound protocol events and the replies the session sends back.

use std::fmt;

use secrecy::SecretString;

/// Authentication method presented by the client.
#[derive(Debug)]
pub enum AuthAttempt {
    /// `none` request, sent by most clients before anything else.
    None,

    /// Password authentication.
    Password(SecretString),

    /// Any other method (publickey, keyboard-interactive, ...).
    Unsupported(String),
}

impl AuthAttempt {
    /// Method name as it appears on the wire.
    pub fn method_name(&self) -> &str {
        match self {
            AuthAttempt::None => "none",
            AuthAttempt::Password(_) => "password",
            AuthAttempt::Unsupported(name) => name,
        }
    }
}

/// Kind of channel the client wants to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// An interactive `session` channel.
    Session,

    /// Anything else (`direct-tcpip`, `x11`, ...).
    Other(String),
}

/// Channel request type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequestKind {
    /// `shell`
    Shell,

    /// `pty-req`
    Pty { term: String, cols: u32, rows: u32 },

    /// `exec`
    Exec(String),

    /// `env`
    Env { name: String, value: String },

    /// `subsystem`
    Subsystem(String),

    /// Anything else.
    Other(String),
}

impl ChannelRequestKind {
    /// Whether this request starts the interactive shell.
    pub fn grants_shell(&self) -> bool {
        matches!(self, ChannelRequestKind::Shell | ChannelRequestKind::Pty { .. })
    }
}

/// A protocol event pulled from the transport.
///
/// Consumed by exactly one dispatch and then dropped.
#[derive(Debug)]
pub enum InboundMessage {
    /// `SSH_MSG_USERAUTH_REQUEST`
    Auth { user: String, attempt: AuthAttempt },

    /// `SSH_MSG_CHANNEL_OPEN`
    ChannelOpen(ChannelKind),

    /// `SSH_MSG_CHANNEL_REQUEST`
    ChannelRequest(ChannelRequestKind),

    /// Something the session does not handle.
    Other(String),
}

impl InboundMessage {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Auth { .. } => "auth",
            InboundMessage::ChannelOpen(_) => "channel-open",
            InboundMessage::ChannelRequest(_) => "channel-request",
            InboundMessage::Other(_) => "other",
        }
    }
}

/// Reply to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `SSH_MSG_USERAUTH_SUCCESS`
    AuthSuccess,

    /// `SSH_MSG_USERAUTH_FAILURE`, advertising `password` as the only method.
    AuthFailure,

    /// Confirm the channel open; the transport hands over the channel.
    ChannelAccept,

    /// `SSH_MSG_CHANNEL_SUCCESS`
    RequestSuccess,

    /// Decline in whatever way fits the message.
    Default,
}

impl Reply {
    /// Reply used once the session has stopped reading messages.
    ///
    /// Shell and PTY requests on the bridged channel were already granted,
    /// so repeats succeed. Everything else is declined.
    pub fn after_negotiation(message: &InboundMessage) -> Self {
        match message {
            InboundMessage::ChannelRequest(kind) if kind.grants_shell() => Reply::RequestSuccess,
            InboundMessage::Auth { .. } => Reply::AuthFailure,
            _ => Reply::Default,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reply::AuthSuccess => "auth-success",
            Reply::AuthFailure => "auth-failure",
            Reply::ChannelAccept => "channel-accept",
            Reply::RequestSuccess => "request-success",
            Reply::Default => "default",
        };
        f.write_str(name)
    }
}
