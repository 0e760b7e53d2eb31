//! Connection lifecycle.
//!
//! The supervisor runs exactly one connection per call: bind, accept,
//! authenticate, negotiate, pump, tear down. It never retries; whatever
//! goes wrong becomes a nonzero status for the caller to act on.

mod builder;

pub use builder::BridgeBuilder;

use std::fmt;
use std::sync::Arc;

use log::{error, info, warn};

use crate::bridge::{BridgePump, PumpConfig, PumpExit};
use crate::error::{Error, Result, SessionError};
use crate::session::{AuthOutcome, Authenticator, ChannelNegotiator, Credential, Session};
use crate::transport::{BridgeChannel, Endpoint, Transport};
use crate::uart::Uart;

/// Outcome of one connection lifecycle.
#[derive(Debug)]
pub enum SessionStatus {
    /// The pump ran and ended (disconnect byte, remote close, or pump fault).
    Completed(PumpExit),

    /// A precondition failed before or during negotiation.
    Failed(Error),
}

impl SessionStatus {
    /// Process status: 0 for a completed session, nonzero otherwise.
    pub fn code(&self) -> i32 {
        match self {
            SessionStatus::Completed(_) => 0,
            SessionStatus::Failed(e) => e.status_code(),
        }
    }

    /// Check if the session completed.
    pub fn is_success(&self) -> bool {
        self.code() == 0
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Completed(exit) => write!(f, "completed ({:?})", exit),
            SessionStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Runs connection lifecycles one at a time.
pub struct Supervisor<E: Endpoint, U: Uart> {
    /// Listening side.
    endpoint: E,

    /// Serial peripheral, shared by every session.
    uart: U,

    /// The accepted credential.
    credential: Arc<Credential>,

    /// Pump settings.
    pump: PumpConfig,

    /// Authentication phase.
    authenticator: Authenticator,
}

impl<E: Endpoint, U: Uart> Supervisor<E, U> {
    /// Create a supervisor.
    pub fn new(
        endpoint: E,
        uart: U,
        credential: Credential,
        pump: PumpConfig,
        log_credentials: bool,
    ) -> Self {
        Self {
            endpoint,
            uart,
            credential: Arc::new(credential),
            pump,
            authenticator: Authenticator::new(log_credentials),
        }
    }

    /// Get a reference to the UART.
    pub fn uart(&self) -> &U {
        &self.uart
    }

    /// Get a reference to the endpoint.
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Run one full lifecycle and report its status.
    pub async fn run_once(&mut self) -> SessionStatus {
        match self.run_session().await {
            Ok(exit) => SessionStatus::Completed(exit),
            Err(e) => {
                error!("{}", e);
                SessionStatus::Failed(e)
            }
        }
    }

    /// Run one full lifecycle.
    ///
    /// The bound socket is released on every path.
    pub async fn run_session(&mut self) -> Result<PumpExit> {
        let local = self.endpoint.listen().await?;
        info!("Started sshd on {}", local);
        info!("You can login as the user {}", self.credential.username());

        let result = self.serve_one().await;
        self.endpoint.unbind();
        result
    }

    /// Accept one connection and drive it. The session is torn down on
    /// every path once accepted.
    async fn serve_one(&mut self) -> Result<PumpExit> {
        let transport = self.endpoint.accept().await?;
        let mut session = Session::new(transport, self.credential.clone());

        let result = self.drive(&mut session).await;
        session.teardown().await;
        result
    }

    async fn drive<T: Transport>(&mut self, session: &mut Session<T>) -> Result<PumpExit> {
        if let Some(peer) = session.transport_mut().peer_addr() {
            info!("Negotiating with {}", peer);
        }

        if self.authenticator.run(session).await? == AuthOutcome::NotAuthenticated {
            return Err(SessionError::AuthenticationFailed {
                user: session.last_user().map(str::to_string),
            }
            .into());
        }

        ChannelNegotiator::new().run(session).await?;
        info!("Client connected!");

        let channel = session.bridge_channel()?;
        if let Some(banner) = &self.pump.banner {
            // The pump notices a dead channel on its own.
            if let Err(e) = channel.write(banner.as_bytes()).await {
                warn!("Failed to send banner: {}", e);
            }
        }

        let mut pump = BridgePump::new(self.pump.clone());
        Ok(pump.run(channel, &mut self.uart).await)
    }
}
