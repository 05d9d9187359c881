//! Network-facing mail sessions.
//!
//! Each operation opens its own session, runs the stages in order and
//! closes the session on every exit path. Protocol errors are mapped to
//! core errors according to the stage they happened in.

pub mod imap;
pub mod smtp;

use std::future::Future;
use std::time::Duration;

use modmail_smtp::Envelope;

use crate::account::Account;
use crate::codec::MessageSummary;
use crate::error::Result;

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for each command round trip.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts applied to every network step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect plus TLS handshake.
    pub connect: Duration,
    /// Each command and its response.
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            io: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// How a message is addressed in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRef {
    /// Sequence number, valid only within the session that listed it.
    Seq(u32),
    /// Persistent UID.
    Uid(u32),
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seq(n) => write!(f, "#{n}"),
            Self::Uid(n) => write!(f, "UID {n}"),
        }
    }
}

/// The network half of the engine.
///
/// [`NetworkBackend`] talks to real servers; tests substitute scripted
/// implementations.
pub trait MailBackend: Send + Sync {
    /// Lists the newest inbox messages, highest sequence number first.
    fn fetch_summaries(
        &self,
        account: &Account,
        secret: &str,
    ) -> impl Future<Output = Result<Vec<MessageSummary>>> + Send;

    /// Fetches the raw bytes of one message.
    fn fetch_message(
        &self,
        account: &Account,
        secret: &str,
        target: MessageRef,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Submits a message.
    fn send(
        &self,
        account: &Account,
        secret: &str,
        envelope: &Envelope,
        message: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Backend that connects to the account's IMAP and SMTP servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkBackend {
    timeouts: Timeouts,
}

impl NetworkBackend {
    /// Creates a backend with the given timeouts.
    #[must_use]
    pub const fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }

    /// Returns the configured timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

impl MailBackend for NetworkBackend {
    async fn fetch_summaries(&self, account: &Account, secret: &str) -> Result<Vec<MessageSummary>> {
        imap::fetch_summaries(account, secret, self.timeouts).await
    }

    async fn fetch_message(
        &self,
        account: &Account,
        secret: &str,
        target: MessageRef,
    ) -> Result<Vec<u8>> {
        imap::fetch_message(account, secret, target, self.timeouts).await
    }

    async fn send(
        &self,
        account: &Account,
        secret: &str,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<()> {
        smtp::send(account, secret, envelope, message, self.timeouts).await
    }
}
