//! Error types for uartssh.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for uartssh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session negotiation errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Serial peripheral errors
    #[error("UART error: {0}")]
    Uart(#[from] UartError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Process status reported for this error.
    ///
    /// Every failure class aborts the connection and reports the same
    /// nonzero status; the outer loop decides what to do with it.
    pub fn status_code(&self) -> i32 {
        1
    }
}

/// Transport layer errors (bind, accept, handshake, channel I/O).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to bind or listen on the server socket
    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `accept()` was called before `listen()`
    #[error("Endpoint is not listening")]
    NotListening,

    /// Failed to accept a TCP connection
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// SSH handshake (version or key exchange) failed
    #[error("Key exchange failed: {0}")]
    Handshake(#[source] russh::Error),

    /// Host key could not be loaded
    #[error("Failed to load host key from {path}: {message}")]
    HostKey { path: PathBuf, message: String },

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// No message was pending when a reply was attempted
    #[error("No pending message to reply to")]
    NoPendingMessage,

    /// The peer went away
    #[error("Connection disconnected")]
    Disconnected,
}

/// Session negotiation errors (authentication, channel, shell).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The message stream ended before a valid credential was presented
    #[error("Authentication failed (last user: {})", user.as_deref().unwrap_or("<none>"))]
    AuthenticationFailed { user: Option<String> },

    /// The client never asked for a session channel
    #[error("Client did not ask for a channel session")]
    NoChannel,

    /// The client never asked for a shell or PTY
    #[error("No shell requested")]
    NoShell,

    /// An operation was attempted in the wrong session state
    #[error("Invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
}

/// Serial peripheral errors.
#[derive(Error, Debug)]
pub enum UartError {
    /// Failed to open the serial device
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to apply termios settings
    #[error("Failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error on the open device
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range or missing
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type alias using uartssh's Error.
pub type Result<T> = std::result::Result<T, Error>;
