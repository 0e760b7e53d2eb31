//! Password authentication against the single configured credential.

use std::fmt;

use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

use super::Session;
use super::message::{AuthAttempt, InboundMessage};
use crate::error::Result;
use crate::transport::Transport;

/// User name compiled in when `UARTSSH_USER` is not set at build time.
pub const DEFAULT_USER: &str = "admin";

/// Password compiled in when `UARTSSH_PASS` is not set at build time.
pub const DEFAULT_PASSWORD: &str = "admin";

/// The one (username, password) pair the server accepts.
pub struct Credential {
    username: String,
    password: SecretString,
}

impl Credential {
    /// Create a credential.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Credential baked in at build time.
    ///
    /// Reads `UARTSSH_USER` and `UARTSSH_PASS` from the build environment,
    /// falling back to [`DEFAULT_USER`] and [`DEFAULT_PASSWORD`].
    pub fn from_build_env() -> Self {
        Self::new(
            option_env!("UARTSSH_USER").unwrap_or(DEFAULT_USER),
            option_env!("UARTSSH_PASS").unwrap_or(DEFAULT_PASSWORD),
        )
    }

    /// The accepted user name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Byte-for-byte comparison of both fields.
    pub fn matches(&self, user: &str, password: &SecretString) -> bool {
        user.as_bytes() == self.username.as_bytes()
            && password.expose_secret().as_bytes() == self.password.expose_secret().as_bytes()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self::new(self.username.clone(), self.password.expose_secret().to_string())
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::from_build_env()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of the authentication phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A password request matched the credential.
    Authenticated,

    /// The message stream ended first.
    NotAuthenticated,
}

/// Pulls messages until the client authenticates or goes away.
///
/// Every rejected attempt is answered with a failure that advertises
/// `password` as the only usable method.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    /// Also log the presented password. Diagnostic only.
    log_credentials: bool,
}

impl Authenticator {
    /// Create an authenticator.
    pub fn new(log_credentials: bool) -> Self {
        Self { log_credentials }
    }

    /// Run the authentication phase on a fresh session.
    pub async fn run<T: Transport>(&self, session: &mut Session<T>) -> Result<AuthOutcome> {
        while let Some(message) = session.next_message().await? {
            self.log_attempt(&message);
            session.dispatch(message).await?;

            if session.is_authenticated() {
                info!(
                    "User '{}' authenticated",
                    session.last_user().unwrap_or_default()
                );
                return Ok(AuthOutcome::Authenticated);
            }
        }

        debug!("Message stream ended before authentication");
        Ok(AuthOutcome::NotAuthenticated)
    }

    fn log_attempt(&self, message: &InboundMessage) {
        let InboundMessage::Auth { user, attempt } = message else {
            debug!("Non-auth message during authentication: {}", message.kind());
            return;
        };

        match attempt {
            AuthAttempt::Password(password) if self.log_credentials => {
                info!(
                    "User {} wants to auth with pass {}",
                    user,
                    password.expose_secret()
                );
            }
            AuthAttempt::Password(_) => info!("User {} wants to auth with a password", user),
            other => info!(
                "User {} wants to auth with unknown method {}",
                user,
                other.method_name()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::message::Reply;
    use crate::testing::{ScriptedTransport, auth_none, password};

    fn credential() -> Arc<Credential> {
        Arc::new(Credential::new("admin", "s3cret"))
    }

    #[test]
    fn test_matches_requires_both_fields() {
        let cred = Credential::new("admin", "s3cret");
        let pw = |s: &str| SecretString::from(s.to_string());

        assert!(cred.matches("admin", &pw("s3cret")));
        assert!(!cred.matches("admin", &pw("S3cret")));
        assert!(!cred.matches("Admin", &pw("s3cret")));
        assert!(!cred.matches("admin", &pw("s3cret ")));
        assert!(!cred.matches("", &pw("")));
        assert!(!cred.matches("admin\0", &pw("s3cret")));
    }

    #[test]
    fn test_non_matching_pairs_never_succeed() {
        let cred = Credential::new("admin", "s3cret");
        let users = ["admin", "root", "", "admi", "adminx"];
        let passwords = ["s3cret", "secret", "", "s3cre", "s3crett"];

        for user in users {
            for pass in passwords {
                let expected = user == "admin" && pass == "s3cret";
                let presented = SecretString::from(pass.to_string());
                assert_eq!(cred.matches(user, &presented), expected, "{user}/{pass}");
            }
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let cred = Credential::new("admin", "s3cret");
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_clone_keeps_secret() {
        let cred = Credential::new("admin", "s3cret").clone();
        assert!(cred.matches("admin", &SecretString::from("s3cret".to_string())));
    }

    #[tokio::test]
    async fn test_authenticates_on_matching_password() {
        let (transport, log) = ScriptedTransport::new(vec![
            auth_none("admin"),
            password("admin", "wrong"),
            password("admin", "s3cret"),
            password("admin", "never-read"),
        ]);
        let mut session = Session::new(transport, credential());

        let outcome = Authenticator::default().run(&mut session).await.unwrap();

        assert_eq!(outcome, AuthOutcome::Authenticated);
        assert!(session.is_authenticated());
        assert_eq!(
            log.lock().unwrap().replies,
            vec![Reply::AuthFailure, Reply::AuthFailure, Reply::AuthSuccess]
        );
        session.teardown().await;
    }

    #[tokio::test]
    async fn test_stream_end_is_not_authenticated() {
        let (transport, log) = ScriptedTransport::new(vec![
            password("admin", "a"),
            password("root", "s3cret"),
        ]);
        let mut session = Session::new(transport, credential());

        let outcome = Authenticator::new(true).run(&mut session).await.unwrap();

        assert_eq!(outcome, AuthOutcome::NotAuthenticated);
        assert!(!session.is_authenticated());
        assert_eq!(session.last_user(), Some("root"));
        assert_eq!(log.lock().unwrap().replies, vec![Reply::AuthFailure; 2]);
        session.teardown().await;
    }
}
