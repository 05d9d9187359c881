//! Timed submission session.
//!
//! `Session` follows the order a submission client needs:
//! `connect`, `start_tls`, `authenticate`, then any number of `send`
//! calls, and finally `close`. Each step runs under the configured
//! timeouts.
//!
//! A transport failure, a failed STARTTLS or a timeout drops the
//! connection. A rejected AUTH or a rejected transaction leaves it open
//! so that [`Session::close`] can still say QUIT.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::client::{Authenticated, Client, Connected};
use super::config::Config;
use super::stream::{SmtpStream, connect, connect_tls};
use crate::error::{Error, Result};
use crate::types::Envelope;

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Greeted and EHLO done.
    Connected,
    /// AUTH succeeded.
    Authenticated,
}

enum Inner<S> {
    Disconnected,
    Connected(Client<S, Connected>),
    Authenticated(Client<S, Authenticated>),
}

/// SMTP session with per-step timeouts.
pub struct Session<S = TcpStream> {
    inner: Inner<S>,
    host: String,
    client_hostname: String,
    io_timeout: Duration,
}

impl<S> Inner<S> {
    const fn state(&self) -> SessionState {
        match self {
            Self::Disconnected => SessionState::Disconnected,
            Self::Connected(_) => SessionState::Connected,
            Self::Authenticated(_) => SessionState::Authenticated,
        }
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl Session<TcpStream> {
    /// Connects, reads the greeting and sends EHLO.
    ///
    /// On the implicit TLS port the connection is encrypted from the
    /// start; otherwise call [`Session::start_tls`] next.
    ///
    /// # Errors
    ///
    /// Returns a transport error, [`Error::Timeout`] or a greeting error.
    pub async fn connect(config: &Config) -> Result<Self> {
        info!(
            host = %config.host,
            port = config.port,
            implicit_tls = config.implicit_tls(),
            "connecting to smtp server"
        );
        let stream = if config.implicit_tls() {
            timed(
                config.connect_timeout,
                connect_tls(&config.host, config.port),
            )
            .await?
        } else {
            timed(config.connect_timeout, connect(&config.host, config.port)).await?
        };
        Self::from_stream(stream, config).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a session on an established stream: greeting, then EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting or EHLO fails or times out.
    pub async fn from_stream(stream: SmtpStream<S>, config: &Config) -> Result<Self> {
        let client = timed(config.io_timeout, async {
            let mut client = Client::from_stream(stream).await?;
            client.ehlo(&config.client_hostname).await?;
            Ok(client)
        })
        .await?;

        Ok(Self {
            inner: Inner::Connected(client),
            host: config.host.clone(),
            client_hostname: config.client_hostname.clone(),
            io_timeout: config.io_timeout,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Returns true when connected over TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        match &self.inner {
            Inner::Disconnected => false,
            Inner::Connected(client) => client.is_tls(),
            Inner::Authenticated(client) => client.is_tls(),
        }
    }

    /// Upgrades with STARTTLS. A no-op on an already encrypted connection.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless `Connected`; otherwise the upgrade
    /// failure, after which the session is `Disconnected`.
    pub async fn start_tls(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Disconnected) {
            Inner::Connected(client) if client.is_tls() => {
                self.inner = Inner::Connected(client);
                Ok(())
            }
            Inner::Connected(client) => {
                let client = timed(
                    self.io_timeout,
                    client.starttls(&self.host, &self.client_hostname),
                )
                .await?;
                self.inner = Inner::Connected(client);
                Ok(())
            }
            other => {
                self.inner = other;
                Err(self.wrong_state(SessionState::Connected))
            }
        }
    }

    /// Authenticates with PLAIN, or LOGIN when that is all the server
    /// offers.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless `Connected`; otherwise the AUTH
    /// failure.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let Inner::Connected(client) = &mut self.inner else {
            return Err(self.wrong_state(SessionState::Connected));
        };
        let result = timed(self.io_timeout, client.auth_exchange(username, password)).await;
        self.settle(result)?;

        if let Inner::Connected(client) = std::mem::replace(&mut self.inner, Inner::Disconnected) {
            self.inner = Inner::Authenticated(client.into_authenticated());
        }
        Ok(())
    }

    /// Sends one message. Requires `Authenticated`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] in the wrong state; otherwise the rejection
    /// or transport failure.
    pub async fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        let Inner::Authenticated(client) = &mut self.inner else {
            return Err(self.wrong_state(SessionState::Authenticated));
        };
        let result = timed(self.io_timeout, client.send_mail(envelope, message)).await;
        self.settle(result)
    }

    /// Says QUIT if connected and ends `Disconnected`. Never fails.
    pub async fn close(&mut self) {
        let limit = self.io_timeout;
        let result = match std::mem::replace(&mut self.inner, Inner::Disconnected) {
            Inner::Disconnected => return,
            Inner::Connected(client) => timed(limit, client.quit()).await,
            Inner::Authenticated(client) => timed(limit, client.quit()).await,
        };
        if let Err(err) = result {
            debug!(error = %err, "quit failed, dropping connection");
        }
        debug!(host = %self.host, "smtp session closed");
    }

    fn wrong_state(&self, required: SessionState) -> Error {
        Error::InvalidState(format!(
            "requires {required:?}, session is {:?}",
            self.state()
        ))
    }

    /// Drops the connection after failures that leave it unusable.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && !matches!(
                err,
                Error::SmtpError { .. }
                    | Error::NotSupported(_)
                    | Error::MessageTooLarge(_)
                    | Error::InvalidState(_)
            )
        {
            warn!(error = %err, "smtp session failed, disconnecting");
            self.inner = Inner::Disconnected;
        }
        result
    }
}

/// Runs a step under a deadline.
async fn timed<T>(limit: Duration, step: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| Error::Timeout(limit))?
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
    use crate::types::{Address, parse_recipients};
    use tokio_test::io::{Builder, Mock};

    fn config() -> Config {
        Config::new("mx.example.com", 587)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
    }

    fn ehlo_script(extensions: &[u8]) -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"220 mx.example.com ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(extensions);
        builder
    }

    async fn session(mock: Mock) -> Session<Mock> {
        Session::from_stream(SmtpStream::plain(mock), &config())
            .await
            .unwrap()
    }

    fn envelope() -> Envelope {
        Envelope::new(
            Address::new("me@example.com").unwrap(),
            parse_recipients("You <you@example.com>").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_flow() {
        let mock = ehlo_script(b"250-mx.example.com\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .write(b"MAIL FROM:<me@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<you@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go\r\n")
            .write(b"hi\r\n.\r\n")
            .read(b"250 queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();

        let mut session = session(mock).await;
        assert_eq!(session.state(), SessionState::Connected);
        let debug = format!("{session:?}");
        assert!(debug.contains("mx.example.com"));
        assert!(debug.contains("Connected"));
        assert!(!session.is_tls());
        session.authenticate("user", "pass").await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        session.send(&envelope(), b"hi").await.unwrap();
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_rejected_auth_still_quits() {
        let mock = ehlo_script(b"250-mx.example.com\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"535 5.7.8 bad credentials\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();

        let mut session = session(mock).await;
        let err = session.authenticate("user", "pass").await.unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 535, .. }));
        assert_eq!(session.state(), SessionState::Connected);
        session.close().await;
    }

    #[tokio::test]
    async fn test_starttls_refused_disconnects() {
        let mock = ehlo_script(b"250-mx.example.com\r\n250 STARTTLS\r\n")
            .write(b"STARTTLS\r\n")
            .read(b"454 TLS not available\r\n")
            .build();

        let mut session = session(mock).await;
        let err = session.start_tls().await.unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 454, .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_requires_authentication() {
        let mock = ehlo_script(b"250 mx.example.com\r\n").build();
        let mut session = session(mock).await;
        let err = session.send(&envelope(), b"hi").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        let mock = Builder::new().wait(Duration::from_secs(60)).build();
        let err = Session::from_stream(SmtpStream::plain(mock), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
