//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream by reading the greeting.
    ///
    /// A `BYE` greeting is an error. So is a `PREAUTH` greeting, since this
    /// client always logs in with the account's own credentials.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let capabilities = match ResponseParser::parse(&greeting)? {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => match code {
                Some(ResponseCode::Capability(caps)) => caps,
                _ => Vec::new(),
            },
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            Response::Untagged(UntaggedResponse::PreAuth { .. }) => {
                return Err(Error::InvalidState(
                    "server greeted with PREAUTH".to_string(),
                ));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        };
        debug!(capabilities = capabilities.len(), "greeting received");

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// Credentials containing CR, LF or NUL are rejected before anything
    /// is sent, as is a server that advertises `LOGINDISABLED`.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if [username, password]
            .iter()
            .any(|s| s.contains(['\r', '\n', '\0']))
        {
            return Err(Error::InvalidArgument(
                "credentials contain a line break or NUL".to_string(),
            ));
        }

        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::InvalidState(
                "server advertises LOGINDISABLED".to_string(),
            ));
        }

        self.execute(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
        info!(username, "logged in");

        Ok(self.transition())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_greeting_capabilities() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.has_capability(&Capability::Imap4Rev1));
    }

    #[tokio::test]
    async fn test_bye_greeting() {
        let mock = Builder::new().read(b"* BYE too busy\r\n").build();
        let result = Client::from_stream(mock).await;
        assert!(matches!(result, Err(Error::Bye(text)) if text == "too busy"));
    }

    #[tokio::test]
    async fn test_login_success() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice@example.com hunter2\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] Logged in\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("alice@example.com", "hunter2").await.unwrap();
        assert!(client.has_capability(&Capability::Imap4Rev1));
    }

    #[tokio::test]
    async fn test_login_queries_capabilities_when_greeting_has_none() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 AUTH=PLAIN\r\nA0000 OK done\r\n")
            .write(b"A0001 LOGIN alice hunter2\r\n")
            .read(b"A0001 OK Logged in\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("alice", "hunter2").await.unwrap();
        assert!(client.has_capability(&Capability::Auth("PLAIN".to_string())));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let result = client.login("alice", "wrong").await;
        assert!(matches!(result, Err(Error::No(text)) if text == "Invalid credentials"));
    }

    #[tokio::test]
    async fn test_login_rejects_line_breaks_before_sending() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let result = client.login("alice", "pw\r\nA0001 LOGOUT").await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_login_disabled() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED] ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let result = client.login("alice", "hunter2").await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
