//! Type-state SMTP client.

use std::marker::PhantomData;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace};

use super::{ServerInfo, SmtpStream};
use crate::command::{Command, dot_stuff};
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{AuthMechanism, Envelope, Reply, ReplyCode};

/// Type-state marker: greeting read, not logged in.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: AUTH succeeded.
#[derive(Debug)]
pub struct Authenticated;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<S, State> {
    stream: SmtpStream<S>,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl<S> Client<S, Connected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is not 220.
    pub async fn from_stream(mut stream: SmtpStream<S>) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::smtp_error(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %hostname, "smtp greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                ..ServerInfo::default()
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the server's extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self
            .execute(&Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;
        self.server_info.update_from_ehlo(&reply);
        trace!(extensions = ?self.server_info.extensions, "ehlo");
        Ok(())
    }

    /// Upgrades the connection with STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised, is refused, or the
    /// handshake fails.
    pub async fn starttls(mut self, server_host: &str, client_hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.send_command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        self.stream = self.stream.upgrade_to_tls(server_host).await?;
        self.ehlo(client_hostname).await?;
        Ok(self)
    }

    /// Authenticates and moves to the authenticated state.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable mechanism is advertised or the
    /// server rejects the credentials.
    pub async fn authenticate(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        self.auth_exchange(username, password).await?;
        Ok(self.into_authenticated())
    }

    /// Runs the AUTH exchange without giving up the client on failure.
    pub(crate) async fn auth_exchange(&mut self, username: &str, password: &str) -> Result<()> {
        let mechanism = self
            .server_info
            .preferred_mechanism()
            .ok_or_else(|| Error::NotSupported("AUTH PLAIN or LOGIN".into()))?;

        let reply = match mechanism {
            AuthMechanism::Plain => {
                let credentials = format!("\0{username}\0{password}");
                self.send_command(&Command::Auth {
                    mechanism,
                    initial_response: Some(STANDARD.encode(credentials)),
                })
                .await?
            }
            AuthMechanism::Login => {
                self.expect_continue(&Command::Auth {
                    mechanism,
                    initial_response: None,
                })
                .await?;
                self.expect_continue(&Command::AuthResponse(STANDARD.encode(username)))
                    .await?;
                self.send_command(&Command::AuthResponse(STANDARD.encode(password)))
                    .await?
            }
        };

        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }
        info!(username, mechanism = mechanism.as_str(), "smtp authenticated");
        Ok(())
    }

    pub(crate) fn into_authenticated(self) -> Client<S, Authenticated> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    async fn expect_continue(&mut self, cmd: &Command) -> Result<()> {
        let reply = self.send_command(cmd).await?;
        if reply.code == ReplyCode::AUTH_CONTINUE {
            Ok(())
        } else {
            Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
        }
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs one mail transaction: MAIL, RCPT per recipient, DATA.
    ///
    /// The message is sent dot-stuffed with CRLF line endings. When the
    /// server refuses the sender, a recipient or DATA, the transaction is
    /// reset so the connection stays usable.
    ///
    /// # Errors
    ///
    /// Returns the first rejection, or a transport error.
    pub async fn send_mail(&mut self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        if let Some(limit) = self.server_info.max_message_size()
            && limit > 0
            && message.len() > limit
        {
            return Err(Error::MessageTooLarge(message.len()));
        }

        self.execute(&Command::MailFrom {
            from: envelope.from.clone(),
        })
        .await?;

        if let Err(err) = self.open_data(envelope).await {
            if !err.is_transport() {
                self.reset().await?;
            }
            return Err(err);
        }

        self.stream.write_all(&dot_stuff(message)).await?;
        let reply = read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()));
        }

        info!(
            recipients = envelope.to.len(),
            bytes = message.len(),
            "message accepted"
        );
        Ok(())
    }

    async fn open_data(&mut self, envelope: &Envelope) -> Result<()> {
        for to in &envelope.to {
            self.execute(&Command::RcptTo { to: to.clone() }).await?;
        }

        let reply = self.send_command(&Command::Data).await?;
        if reply.code == ReplyCode::START_DATA {
            Ok(())
        } else {
            Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
        }
    }

    async fn reset(&mut self) -> Result<()> {
        self.execute(&Command::Rset).await.map(drop)
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns what the server announced.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true once the connection is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Sends QUIT and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT cannot be sent or is answered with
    /// something other than 221 or 250.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(&Command::Quit).await?;
        let _ = self.stream.shutdown().await;
        if reply.code == ReplyCode::CLOSING || reply.is_success() {
            Ok(())
        } else {
            Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
        }
    }

    async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.name(), "smtp command");
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        trace!(code = reply.code.as_u16(), "smtp reply");
        Ok(reply)
    }

    /// Sends a command and requires a 2xx reply.
    async fn execute(&mut self, cmd: &Command) -> Result<Reply> {
        let reply = self.send_command(cmd).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(Error::smtp_error(reply.code.as_u16(), reply.message_text()))
        }
    }
}

async fn read_reply<S>(stream: &mut SmtpStream<S>) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        let last = is_last_reply_line(&line);
        lines.push(line);
        if last {
            break;
        }
    }
    parse_reply(&lines)
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
    use crate::types::Address;
    use tokio_test::io::{Builder, Mock};

    fn greeted(builder: &mut Builder, ehlo: &[u8]) {
        builder
            .read(b"220 mx.example.com ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(ehlo);
    }

    async fn connected(mock: Mock) -> Client<Mock, Connected> {
        let mut client = Client::from_stream(SmtpStream::plain(mock)).await.unwrap();
        client.ehlo("localhost").await.unwrap();
        client
    }

    fn envelope(to: &[&str]) -> Envelope {
        Envelope::new(
            Address::new("me@example.com").unwrap(),
            to.iter().map(|a| Address::new(*a).unwrap()).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_greeting_must_be_220() {
        let mock = Builder::new().read(b"554 go away\r\n").build();
        let err = Client::from_stream(SmtpStream::plain(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 554, .. }));
    }

    #[tokio::test]
    async fn test_ehlo_records_extensions() {
        let mut builder = Builder::new();
        greeted(
            &mut builder,
            b"250-mx.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN\r\n",
        );
        let client = connected(builder.build()).await;
        assert_eq!(client.server_info().hostname, "mx.example.com");
        assert!(client.server_info().supports_starttls());
    }

    #[tokio::test]
    async fn test_starttls_not_advertised() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250 mx.example.com\r\n");
        let client = connected(builder.build()).await;
        let err = client
            .starttls("mx.example.com", "localhost")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_auth_plain() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250-mx.example.com\r\n250 AUTH LOGIN PLAIN\r\n");
        builder
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n");
        let client = connected(builder.build()).await;
        client.authenticate("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_login_when_only_login_offered() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250-mx.example.com\r\n250 AUTH LOGIN\r\n");
        builder
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 ok\r\n");
        let client = connected(builder.build()).await;
        client.authenticate("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250-mx.example.com\r\n250 AUTH PLAIN\r\n");
        builder
            .write(b"AUTH PLAIN AHVzZXIAYmFk\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n");
        let client = connected(builder.build()).await;
        let err = client.authenticate("user", "bad").await.unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 535, .. }));
    }

    #[tokio::test]
    async fn test_send_mail() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250-mx.example.com\r\n250 AUTH PLAIN\r\n");
        builder
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .write(b"MAIL FROM:<me@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<a@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: hi\r\n\r\n..dot\r\n.\r\n")
            .read(b"250 2.0.0 queued\r\n");
        let client = connected(builder.build()).await;
        let mut client = client.authenticate("user", "pass").await.unwrap();
        client
            .send_mail(
                &envelope(&["a@example.com", "b@example.com"]),
                b"Subject: hi\n\n.dot\n",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_recipient_resets() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250-mx.example.com\r\n250 AUTH PLAIN\r\n");
        builder
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .write(b"MAIL FROM:<me@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<nobody@example.com>\r\n")
            .read(b"550 5.1.1 No such user\r\n")
            .write(b"RSET\r\n")
            .read(b"250 ok\r\n");
        let client = connected(builder.build()).await;
        let mut client = client.authenticate("user", "pass").await.unwrap();
        let err = client
            .send_mail(&envelope(&["nobody@example.com"]), b"x")
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_oversized_message_refused_locally() {
        let mut builder = Builder::new();
        greeted(
            &mut builder,
            b"250-mx.example.com\r\n250-SIZE 4\r\n250 AUTH PLAIN\r\n",
        );
        builder
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 ok\r\n");
        let client = connected(builder.build()).await;
        let mut client = client.authenticate("user", "pass").await.unwrap();
        let err = client
            .send_mail(&envelope(&["a@example.com"]), b"too long")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge(8)));
    }

    #[tokio::test]
    async fn test_quit() {
        let mut builder = Builder::new();
        greeted(&mut builder, b"250 mx.example.com\r\n");
        builder.write(b"QUIT\r\n").read(b"221 bye\r\n");
        let client = connected(builder.build()).await;
        client.quit().await.unwrap();
    }
}
