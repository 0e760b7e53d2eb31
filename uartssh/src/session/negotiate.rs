//! Post-authentication channel handshake.

use log::{debug, info};

use super::{Session, SessionState};
use crate::error::{Result, SessionError};
use crate::transport::Transport;

/// Drives a session through the channel-open gate and then the shell gate.
///
/// The second gate is never entered unless the first one succeeded. If the
/// message stream ends inside either gate, negotiation fails and the session
/// must be torn down.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelNegotiator;

impl ChannelNegotiator {
    /// Create a negotiator.
    pub fn new() -> Self {
        Self
    }

    /// Run both gates. On success the session is in [`SessionState::Bridging`]
    /// and the transport has stopped forwarding messages.
    pub async fn run<T: Transport>(&self, session: &mut Session<T>) -> Result<()> {
        session.expect_state(SessionState::AwaitingChannel)?;

        if !Self::gate(session, SessionState::AwaitingChannel).await? {
            return Err(SessionError::NoChannel.into());
        }
        info!("Session channel open");

        if !Self::gate(session, SessionState::AwaitingShell).await? {
            return Err(SessionError::NoShell.into());
        }
        info!("Shell granted");

        session.transport_mut().end_negotiation();
        Ok(())
    }

    /// Pull messages until the session leaves `waiting`.
    ///
    /// Returns `false` if the stream ended first.
    async fn gate<T: Transport>(session: &mut Session<T>, waiting: SessionState) -> Result<bool> {
        while session.state() == waiting {
            let Some(message) = session.next_message().await? else {
                debug!("Message stream ended in {}", waiting);
                return Ok(false);
            };
            session.dispatch(message).await?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::session::Credential;
    use crate::session::message::Reply;
    use crate::testing::{
        ScriptedChannel, ScriptedTransport, channel_open, channel_open_other, exec, password,
        pty, shell,
    };

    fn credential() -> Arc<Credential> {
        Arc::new(Credential::new("admin", "s3cret"))
    }

    async fn authenticated(
        messages: Vec<crate::session::InboundMessage>,
    ) -> (Session<ScriptedTransport>, crate::testing::SharedLog) {
        let mut script = vec![password("admin", "s3cret")];
        script.extend(messages);
        let (transport, log) = ScriptedTransport::with_channel(script, ScriptedChannel::idle());
        let mut session = Session::new(transport, credential());
        let message = session.next_message().await.unwrap().unwrap();
        session.dispatch(message).await.unwrap();
        assert!(session.is_authenticated());
        (session, log)
    }

    #[tokio::test]
    async fn test_open_then_pty() {
        let (mut session, log) =
            authenticated(vec![exec("ls"), channel_open(), exec("ls"), pty()]).await;

        ChannelNegotiator::new().run(&mut session).await.unwrap();

        assert_eq!(session.state(), SessionState::Bridging);
        assert!(session.is_shell_granted());
        assert!(session.bridge_channel().is_ok());
        {
            let log = log.lock().unwrap();
            assert_eq!(
                log.replies,
                vec![
                    Reply::AuthSuccess,
                    Reply::Default,
                    Reply::ChannelAccept,
                    Reply::Default,
                    Reply::RequestSuccess,
                ]
            );
            assert!(log.negotiation_ended);
        }
        session.teardown().await;
    }

    #[tokio::test]
    async fn test_other_channel_kinds_are_declined() {
        let (mut session, log) =
            authenticated(vec![channel_open_other("direct-tcpip"), channel_open(), shell()]).await;

        ChannelNegotiator::new().run(&mut session).await.unwrap();

        assert_eq!(log.lock().unwrap().channels_accepted, 1);
        assert_eq!(
            log.lock().unwrap().replies[1..],
            [Reply::Default, Reply::ChannelAccept, Reply::RequestSuccess]
        );
        session.teardown().await;
    }

    #[tokio::test]
    async fn test_no_channel() {
        let (mut session, log) = authenticated(vec![shell(), exec("id")]).await;

        let err = ChannelNegotiator::new().run(&mut session).await.unwrap_err();

        assert!(matches!(err, Error::Session(SessionError::NoChannel)));
        assert_eq!(session.state(), SessionState::AwaitingChannel);
        assert!(!log.lock().unwrap().negotiation_ended);
        session.teardown().await;
    }

    #[tokio::test]
    async fn test_no_shell() {
        let (mut session, log) = authenticated(vec![channel_open(), exec("id")]).await;

        let err = ChannelNegotiator::new().run(&mut session).await.unwrap_err();

        assert!(matches!(err, Error::Session(SessionError::NoShell)));
        assert!(!session.is_shell_granted());
        assert!(session.bridge_channel().is_err());
        session.teardown().await;
        assert!(log.lock().unwrap().channel_closed);
    }

    #[tokio::test]
    async fn test_requires_authenticated_session() {
        let (transport, _log) = ScriptedTransport::new(vec![channel_open(), shell()]);
        let mut session = Session::new(transport, credential());

        let err = ChannelNegotiator::new().run(&mut session).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Session(SessionError::InvalidState { .. })
        ));
        session.teardown().await;
    }
}
