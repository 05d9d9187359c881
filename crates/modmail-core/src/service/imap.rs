//! IMAP reader: list the inbox and fetch single messages.

use modmail_imap::{Config, Error as ImapError, MailboxStatus, SeqNum, Session, Uid};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::{MessageRef, Timeouts};
use crate::account::Account;
use crate::codec::{self, MessageSummary};
use crate::error::{Error, Result};

/// Number of messages a refresh lists.
pub const SUMMARY_LIMIT: usize = 20;

/// Mailbox every operation works on.
pub const INBOX: &str = "INBOX";

/// Step of an IMAP operation, used to classify failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connect,
    Login,
    Select,
    Read,
}

/// Connects and lists the newest inbox messages.
///
/// # Errors
///
/// `Connection` for transport failures, `Auth` for rejected credentials,
/// `Protocol` for failed commands. No partial list is returned.
pub async fn fetch_summaries(
    account: &Account,
    secret: &str,
    timeouts: Timeouts,
) -> Result<Vec<MessageSummary>> {
    let mut session = connect(account, timeouts).await?;
    let result = list_inbox(&mut session, &account.address, secret).await;
    session.close().await;
    result
}

/// Connects and fetches one message's raw bytes.
///
/// Fetching by sequence number uses `RFC822`, which marks the message read.
///
/// # Errors
///
/// As for [`fetch_summaries`]; an unknown message is `Protocol`.
pub async fn fetch_message(
    account: &Account,
    secret: &str,
    target: MessageRef,
    timeouts: Timeouts,
) -> Result<Vec<u8>> {
    let mut session = connect(account, timeouts).await?;
    let result = read_message(&mut session, &account.address, secret, target).await;
    session.close().await;
    result
}

async fn connect(account: &Account, timeouts: Timeouts) -> Result<Session> {
    let settings = &account.settings;
    let config = Config::builder(&settings.imap_server)
        .port(settings.imap_port)
        .connect_timeout(timeouts.connect)
        .io_timeout(timeouts.io)
        .build();
    Session::connect(&config)
        .await
        .map_err(|e| classify(Stage::Connect, e))
}

/// Logs in and selects the inbox.
async fn open_inbox<S>(
    session: &mut Session<S>,
    address: &str,
    secret: &str,
) -> Result<MailboxStatus>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session
        .login(address, secret)
        .await
        .map_err(|e| classify(Stage::Login, e))?;
    let status = session
        .select(INBOX)
        .await
        .map_err(|e| classify(Stage::Select, e))?;
    debug!(exists = status.exists, "inbox selected");
    Ok(status)
}

/// Lists up to [`SUMMARY_LIMIT`] messages, highest sequence number first.
///
/// The caller closes the session.
pub(crate) async fn list_inbox<S>(
    session: &mut Session<S>,
    address: &str,
    secret: &str,
) -> Result<Vec<MessageSummary>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let status = open_inbox(session, address, secret).await?;
    let uid_validity = status.uid_validity.map(|v| v.get());

    let mut ids = session
        .search_all()
        .await
        .map_err(|e| classify(Stage::Read, e))?;
    ids.sort_unstable();
    ids.dedup();

    let newest = &ids[ids.len().saturating_sub(SUMMARY_LIMIT)..];
    let mut summaries = Vec::with_capacity(newest.len());
    for &seq in newest.iter().rev() {
        let fetched = session
            .fetch_summary_data(seq)
            .await
            .map_err(|e| classify(Stage::Read, e))?;
        summaries.push(codec::summarize(seq.get(), &fetched, uid_validity));
    }

    info!(
        total = ids.len(),
        listed = summaries.len(),
        "inbox refreshed"
    );
    Ok(summaries)
}

/// Fetches one message. The caller closes the session.
pub(crate) async fn read_message<S>(
    session: &mut Session<S>,
    address: &str,
    secret: &str,
    target: MessageRef,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    open_inbox(session, address, secret).await?;

    let raw = match target {
        MessageRef::Seq(n) => {
            let seq = SeqNum::new(n)
                .ok_or_else(|| Error::Protocol(format!("invalid sequence number {n}")))?;
            session
                .fetch_rfc822(seq)
                .await
                .map_err(|e| classify(Stage::Read, e))?
        }
        MessageRef::Uid(n) => {
            let uid = Uid::new(n).ok_or_else(|| Error::Protocol(format!("invalid UID {n}")))?;
            session
                .uid_fetch_rfc822(uid)
                .await
                .map_err(|e| classify(Stage::Read, e))?
                .ok_or_else(|| Error::Protocol(format!("no message with {target}")))?
        }
    };

    debug!(message = %target, bytes = raw.len(), "message fetched");
    Ok(raw)
}

fn classify(stage: Stage, err: ImapError) -> Error {
    if stage == Stage::Connect || err.is_transport() {
        return Error::Connection(err.to_string());
    }
    match (stage, &err) {
        (Stage::Login, ImapError::No(_) | ImapError::InvalidArgument(_)) => {
            Error::Auth(err.to_string())
        }
        _ => Error::Protocol(err.to_string()),
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
    use crate::ErrorKind;
    use std::time::Duration;
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn login_script(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice@example.com hunter2\r\n")
            .read(b"A0000 OK Logged in\r\n")
    }

    fn fetch_reply(tag: &str, seq: u32, seen: bool) -> String {
        let body = format!("Subject: message {seq}\r\n\r\nbody\r\n");
        let flags = if seen { "\\Seen" } else { "" };
        format!(
            "* {seq} FETCH (UID {} FLAGS ({flags}) BODY[] {{{}}}\r\n{body})\r\n{tag} OK done\r\n",
            seq + 100,
            body.len()
        )
    }

    #[tokio::test]
    async fn test_empty_mailbox() {
        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 0 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
            .write(b"A0002 SEARCH ALL\r\n")
            .read(b"* SEARCH\r\nA0002 OK done\r\n");
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let summaries = list_inbox(&mut session, "alice@example.com", "hunter2")
            .await
            .unwrap();
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn test_lists_newest_twenty_descending() {
        let ids: Vec<String> = (1..=25).map(|n| n.to_string()).collect();
        let search = format!("* SEARCH {}\r\nA0002 OK done\r\n", ids.join(" "));

        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 25 EXISTS\r\n* OK [UIDVALIDITY 9] ok\r\nA0001 OK done\r\n")
            .write(b"A0002 SEARCH ALL\r\n")
            .read(search.as_bytes());
        let mut tag = 3;
        for seq in (6..=25).rev() {
            let tag_str = format!("A{tag:04}");
            builder
                .write(format!("{tag_str} FETCH {seq} (UID FLAGS INTERNALDATE BODY.PEEK[])\r\n").as_bytes())
                .read(fetch_reply(&tag_str, seq, seq % 2 == 0).as_bytes());
            tag += 1;
        }
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let summaries = list_inbox(&mut session, "alice@example.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(summaries.len(), SUMMARY_LIMIT);
        assert_eq!(summaries[0].id, 25);
        assert_eq!(summaries[19].id, 6);
        assert_eq!(summaries[0].uid, Some(125));
        assert_eq!(summaries[0].uid_validity, Some(9));
        assert_eq!(summaries[0].subject, "message 25");
        assert!(!summaries[0].read);
        assert!(summaries[1].read);
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice@example.com wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();

        let err = list_inbox(&mut session, "alice@example.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_line_break_in_secret_is_auth() {
        let mock = Builder::new().read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").build();
        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();

        let err = list_inbox(&mut session, "alice@example.com", "a\r\nb")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_select_failure_is_protocol() {
        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"A0001 NO Mailbox unavailable\r\n");
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let err = list_inbox(&mut session, "alice@example.com", "hunter2")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_drop_during_fetch_is_connection() {
        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 1 EXISTS\r\nA0001 OK done\r\n")
            .write(b"A0002 SEARCH ALL\r\n")
            .read(b"* SEARCH 1\r\nA0002 OK done\r\n")
            .write(b"A0003 FETCH 1 (UID FLAGS INTERNALDATE BODY.PEEK[])\r\n");
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let err = list_inbox(&mut session, "alice@example.com", "hunter2")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_read_message_by_uid() {
        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 1 EXISTS\r\nA0001 OK done\r\n")
            .write(b"A0002 UID FETCH 101 RFC822\r\n")
            .read(b"* 1 FETCH (UID 101 RFC822 {4}\r\nabcd)\r\nA0002 OK done\r\n");
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let raw = read_message(&mut session, "alice@example.com", "hunter2", MessageRef::Uid(101))
            .await
            .unwrap();
        assert_eq!(raw, b"abcd");
    }

    #[tokio::test]
    async fn test_read_message_unknown_uid() {
        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 1 EXISTS\r\nA0001 OK done\r\n")
            .write(b"A0002 UID FETCH 7 RFC822\r\n")
            .read(b"A0002 OK done\r\n");
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let err = read_message(&mut session, "alice@example.com", "hunter2", MessageRef::Uid(7))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_read_message_by_seq() {
        let mut builder = Builder::new();
        login_script(&mut builder)
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0001 OK done\r\n")
            .write(b"A0002 FETCH 3 RFC822\r\n")
            .read(b"* 3 FETCH (RFC822 {2}\r\nhi FLAGS (\\Seen))\r\nA0002 OK done\r\n");
        let mut session = Session::from_stream(builder.build(), TIMEOUT).await.unwrap();

        let raw = read_message(&mut session, "alice@example.com", "hunter2", MessageRef::Seq(3))
            .await
            .unwrap();
        assert_eq!(raw, b"hi");
    }
}
