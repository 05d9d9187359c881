//! Timed IMAP session state machine.
//!
//! `Session` wraps the type-state [`Client`] behind a runtime state so a
//! caller can hold one value across the whole
//! `Disconnected -> Connected -> Authenticated -> Selected -> Disconnected`
//! lifecycle. Every network step runs under a timeout.
//!
//! A step that fails leaves the session `Disconnected`, except a `NO` or
//! `BAD` reply to a command in the selected state, after which the
//! connection is still in sync and stays usable. [`Session::close`] is
//! safe to call in any state and always ends `Disconnected`.
//!
//! ```ignore
//! let mut session = Session::connect(&Config::new("imap.example.com")).await?;
//! session.login("alice@example.com", &password).await?;
//! session.select("INBOX").await?;
//! let ids = session.search_all().await?;
//! session.close().await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::client::{Authenticated, Client, NotAuthenticated, Selected};
use super::config::{Config, DEFAULT_IO_TIMEOUT};
use super::stream::{ImapStream, connect_tls};
use crate::command::{FetchAttribute, SearchCriteria};
use crate::parser::FetchItem;
use crate::types::{Flags, MailboxStatus, SeqNum, Uid};
use crate::{Error, Result};

/// Observable state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Greeting received.
    Connected,
    /// Logged in.
    Authenticated,
    /// A mailbox is selected.
    Selected,
}

enum Inner<S> {
    Disconnected,
    Connected(Client<S, NotAuthenticated>),
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>, MailboxStatus),
}

impl<S> Inner<S> {
    const fn state(&self) -> SessionState {
        match self {
            Self::Disconnected => SessionState::Disconnected,
            Self::Connected(_) => SessionState::Connected,
            Self::Authenticated(_) => SessionState::Authenticated,
            Self::Selected(..) => SessionState::Selected,
        }
    }
}

/// A message fetched for listing, without touching `\Seen`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Persistent UID, when the server reported it.
    pub uid: Option<Uid>,
    /// Flags at fetch time.
    pub flags: Flags,
    /// Raw INTERNALDATE.
    pub internal_date: Option<String>,
    /// Full RFC 5322 message.
    pub raw: Vec<u8>,
}

impl FetchedMessage {
    fn from_items(items: Vec<FetchItem>) -> Self {
        let mut message = Self::default();
        for item in items {
            match item {
                FetchItem::Uid(uid) => message.uid = Some(uid),
                FetchItem::Flags(flags) => message.flags = flags,
                FetchItem::InternalDate(date) => message.internal_date = Some(date),
                FetchItem::Rfc822(Some(data))
                | FetchItem::Body {
                    data: Some(data), ..
                } => message.raw = data,
                _ => {}
            }
        }
        message
    }
}

/// IMAP session with a runtime state and per-step timeouts.
pub struct Session<S = ImapStream> {
    inner: Inner<S>,
    io_timeout: Duration,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.inner.state())
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl Session<ImapStream> {
    /// Connects over implicit TLS and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns a transport error, [`Error::Timeout`] or a greeting error.
    pub async fn connect(config: &Config) -> Result<Self> {
        info!(host = %config.host, port = config.port, "connecting to imap server");
        let stream = timed(
            config.connect_timeout,
            connect_tls(&config.host, config.port),
        )
        .await?;
        Self::from_stream(stream, config.io_timeout).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a session on an established stream by reading the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing, late or a `BYE`.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let client = timed(io_timeout, Client::from_stream(stream)).await?;
        debug!("session connected");
        Ok(Self {
            inner: Inner::Connected(client),
            io_timeout,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Returns the SELECT snapshot while a mailbox is selected.
    #[must_use]
    pub const fn mailbox_status(&self) -> Option<&MailboxStatus> {
        match &self.inner {
            Inner::Selected(_, status) => Some(status),
            _ => None,
        }
    }

    /// Logs in. Requires `Connected`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] in the wrong state; otherwise the login
    /// failure, after which the session is `Disconnected`.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Disconnected) {
            Inner::Connected(client) => {
                let client = timed(self.io_timeout, client.login(username, password)).await?;
                self.inner = Inner::Authenticated(client);
                Ok(())
            }
            other => Err(self.restore(other, SessionState::Connected)),
        }
    }

    /// Selects a mailbox. Requires `Authenticated`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] in the wrong state; otherwise the SELECT
    /// failure, after which the session is `Disconnected`.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        match std::mem::replace(&mut self.inner, Inner::Disconnected) {
            Inner::Authenticated(client) => {
                let (client, status) = timed(self.io_timeout, client.select(mailbox)).await?;
                self.inner = Inner::Selected(client, status.clone());
                Ok(status)
            }
            other => Err(self.restore(other, SessionState::Authenticated)),
        }
    }

    /// Lists every message in ascending sequence order (`SEARCH ALL`).
    ///
    /// # Errors
    ///
    /// Fails unless a mailbox is selected, or when the command fails.
    pub async fn search_all(&mut self) -> Result<Vec<SeqNum>> {
        let limit = self.io_timeout;
        let result = timed(limit, self.selected()?.search(SearchCriteria::All)).await;
        self.settle(result)
    }

    /// Fetches arbitrary items for one message.
    ///
    /// # Errors
    ///
    /// Fails unless a mailbox is selected, or when the command fails.
    pub async fn fetch(
        &mut self,
        seq: SeqNum,
        items: Vec<FetchAttribute>,
    ) -> Result<Vec<FetchItem>> {
        let limit = self.io_timeout;
        let result = timed(limit, self.selected()?.fetch(seq, items)).await;
        self.settle(result)
    }

    /// Fetches UID, flags, INTERNALDATE and the full message with
    /// `BODY.PEEK[]`, leaving `\Seen` untouched.
    ///
    /// # Errors
    ///
    /// Fails when the command fails or the server returns no message data.
    pub async fn fetch_summary_data(&mut self, seq: SeqNum) -> Result<FetchedMessage> {
        let items = self
            .fetch(
                seq,
                vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Flags,
                    FetchAttribute::InternalDate,
                    FetchAttribute::body_peek(),
                ],
            )
            .await?;
        if items.is_empty() {
            return Err(Error::Protocol(format!("no FETCH data for message {seq}")));
        }
        Ok(FetchedMessage::from_items(items))
    }

    /// Fetches the full message with `RFC822`, which marks it read.
    ///
    /// # Errors
    ///
    /// Fails when the command fails or the server returns no message data.
    pub async fn fetch_rfc822(&mut self, seq: SeqNum) -> Result<Vec<u8>> {
        let items = self.fetch(seq, vec![FetchAttribute::Rfc822]).await?;
        message_data(items).ok_or_else(|| Error::Protocol(format!("no RFC822 data for message {seq}")))
    }

    /// Fetches the full message by UID. `None` when the UID is unknown.
    ///
    /// # Errors
    ///
    /// Fails unless a mailbox is selected, or when the command fails.
    pub async fn uid_fetch_rfc822(&mut self, uid: Uid) -> Result<Option<Vec<u8>>> {
        let limit = self.io_timeout;
        let result = timed(
            limit,
            self.selected()?.uid_fetch(uid, vec![FetchAttribute::Rfc822]),
        )
        .await;
        Ok(self.settle(result)?.and_then(message_data))
    }

    /// Logs out if connected and ends `Disconnected`. Never fails; a
    /// logout that errors or times out is logged and the connection is
    /// dropped.
    pub async fn close(&mut self) {
        let limit = self.io_timeout;
        let result = match std::mem::replace(&mut self.inner, Inner::Disconnected) {
            Inner::Disconnected => return,
            Inner::Connected(client) => timed(limit, client.logout()).await,
            Inner::Authenticated(client) => timed(limit, client.logout()).await,
            Inner::Selected(client, _) => timed(limit, client.logout()).await,
        };
        if let Err(err) = result {
            debug!(error = %err, "logout failed, dropping connection");
        }
        debug!("session closed");
    }

    fn selected(&mut self) -> Result<&mut Client<S, Selected>> {
        match &mut self.inner {
            Inner::Selected(client, _) => Ok(client),
            other => Err(Error::InvalidState(format!(
                "requires {:?}, session is {:?}",
                SessionState::Selected,
                other.state()
            ))),
        }
    }

    /// Puts a state back after a call in the wrong state.
    fn restore(&mut self, inner: Inner<S>, required: SessionState) -> Error {
        let state = inner.state();
        self.inner = inner;
        Error::InvalidState(format!("requires {required:?}, session is {state:?}"))
    }

    /// Drops the connection after any failure that may have left the
    /// stream out of sync.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && !matches!(err, Error::No(_) | Error::Bad(_) | Error::InvalidState(_))
        {
            warn!(error = %err, "imap session failed, disconnecting");
            self.inner = Inner::Disconnected;
        }
        result
    }
}

fn message_data(items: Vec<FetchItem>) -> Option<Vec<u8>> {
    items.into_iter().find_map(|item| match item {
        FetchItem::Rfc822(data) | FetchItem::Body { data, .. } => data,
        _ => None,
    })
}

/// Runs a step under a deadline.
async fn timed<T>(limit: Duration, step: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

impl<S> Default for Session<S> {
    fn default() -> Self {
        Self {
            inner: Inner::Disconnected,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
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
    use crate::types::Flag;
    use tokio_test::io::{Builder, Mock};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn selected_script() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice pw\r\n")
            .read(b"A0000 OK Logged in\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\n* OK [UIDVALIDITY 7] ok\r\nA0001 OK done\r\n");
        builder
    }

    async fn selected_session(mock: Mock) -> Session<Mock> {
        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();
        session.login("alice", "pw").await.unwrap();
        session.select("INBOX").await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mock = selected_script()
            .write(b"A0002 SEARCH ALL\r\n")
            .read(b"* SEARCH 1 2\r\nA0002 OK done\r\n")
            .write(b"A0003 LOGOUT\r\n")
            .read(b"* BYE\r\nA0003 OK done\r\n")
            .build();

        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        session.login("alice", "pw").await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        let status = session.select("INBOX").await.unwrap();
        assert_eq!(status.exists, 2);
        assert_eq!(session.state(), SessionState::Selected);
        assert_eq!(session.mailbox_status().unwrap().uid_validity.unwrap().get(), 7);

        let ids = session.search_all().await.unwrap();
        assert_eq!(ids.len(), 2);

        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        session.close().await;
    }

    #[tokio::test]
    async fn test_wrong_state_keeps_connection() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .build();
        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();

        let err = session.select("INBOX").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(session.state(), SessionState::Connected);

        let err = session.search_all().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_login_disconnects() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice bad\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] nope\r\n")
            .build();
        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();
        let err = session.login("alice", "bad").await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_summary_data_uses_peek() {
        let mock = selected_script()
            .write(b"A0002 FETCH 2 (UID FLAGS INTERNALDATE BODY.PEEK[])\r\n")
            .read(concat!(
                "* 2 FETCH (UID 88 FLAGS (\\Seen) INTERNALDATE \"01-Jul-2025 10:00:00 +0000\" BODY[] {10}\r\n",
                "Subject:\r\n)\r\n",
                "A0002 OK done\r\n",
            ).as_bytes())
            .build();
        let mut session = selected_session(mock).await;
        let message = session
            .fetch_summary_data(SeqNum::new(2).unwrap())
            .await
            .unwrap();
        assert_eq!(message.uid.unwrap().get(), 88);
        assert!(message.flags.contains(&Flag::Seen));
        assert_eq!(
            message.internal_date.as_deref(),
            Some("01-Jul-2025 10:00:00 +0000")
        );
        assert_eq!(message.raw, b"Subject:\r\n");
    }

    #[tokio::test]
    async fn test_fetch_rfc822_missing_data() {
        let mock = selected_script()
            .write(b"A0002 FETCH 1 RFC822\r\n")
            .read(b"* 1 FETCH (FLAGS ())\r\nA0002 OK done\r\n")
            .build();
        let mut session = selected_session(mock).await;
        let err = session
            .fetch_rfc822(SeqNum::new(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_no_reply_keeps_session_selected() {
        let mock = selected_script()
            .write(b"A0002 FETCH 9 RFC822\r\n")
            .read(b"A0002 NO no such message\r\n")
            .build();
        let mut session = selected_session(mock).await;
        let err = session
            .fetch_rfc822(SeqNum::new(9).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::No(_)));
        assert_eq!(session.state(), SessionState::Selected);
    }

    #[tokio::test]
    async fn test_uid_fetch_rfc822() {
        let mock = selected_script()
            .write(b"A0002 UID FETCH 88 RFC822\r\n")
            .read(b"* 2 FETCH (UID 88 RFC822 {3}\r\nabc)\r\nA0002 OK done\r\n")
            .build();
        let mut session = selected_session(mock).await;
        let raw = session
            .uid_fetch_rfc822(Uid::new(88).unwrap())
            .await
            .unwrap();
        assert_eq!(raw.as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_disconnects() {
        let mock = selected_script()
            .write(b"A0002 SEARCH ALL\r\n")
            .wait(Duration::from_secs(60))
            .build();
        let mut session = selected_session(mock).await;
        let err = session.search_all().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_default_is_disconnected() {
        let mut session = Session::<Mock>::default();
        assert_eq!(session.state(), SessionState::Disconnected);
        session.close().await;
    }
}
