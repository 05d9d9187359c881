//! Integration tests for the IMAP session.
//!
//! A mock stream replays canned server output and records what the
//! client sends, so whole conversations run without a server.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use modmail_imap::{Error, Flag, ResponseParser, Session, SessionState, UntaggedResponse};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Mock stream that returns predefined responses.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();
        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

#[test]
fn test_parser_capability() {
    let parsed = ResponseParser::parse(b"* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN\r\n").unwrap();
    match parsed {
        modmail_imap::Response::Untagged(UntaggedResponse::Capability(caps)) => {
            assert_eq!(caps.len(), 3);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_inbox_listing_conversation() {
    let message = "From: a@example.com\r\nSubject: Hi\r\n\r\nbody\r\n";
    let server = format!(
        concat!(
            "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Dovecot ready\r\n",
            "A0000 OK Logged in\r\n",
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n",
            "* 2 EXISTS\r\n",
            "* 0 RECENT\r\n",
            "* OK [UIDVALIDITY 1700000000] UIDs valid\r\n",
            "* OK [UIDNEXT 43] Predicted next UID\r\n",
            "A0001 OK [READ-WRITE] Select completed\r\n",
            "* SEARCH 2 1\r\n",
            "A0002 OK Search completed\r\n",
            "* 2 FETCH (UID 42 FLAGS () INTERNALDATE \"02-Jul-2025 08:30:00 +0200\" BODY[] {{{len}}}\r\n",
            "{message})\r\n",
            "A0003 OK Fetch completed\r\n",
            "* BYE Logging out\r\n",
            "A0004 OK Logout completed\r\n",
        ),
        len = message.len(),
        message = message,
    );
    let (stream, sent) = MockStream::new(server.as_bytes());

    let mut session = Session::from_stream(stream, TIMEOUT).await.unwrap();
    session.login("alice@example.com", "secret").await.unwrap();

    let status = session.select("INBOX").await.unwrap();
    assert_eq!(status.exists, 2);
    assert_eq!(status.uid_next.unwrap().get(), 43);
    assert!(!status.read_only);

    let ids = session.search_all().await.unwrap();
    let ids: Vec<u32> = ids.iter().map(|seq| seq.get()).collect();
    assert_eq!(ids, vec![1, 2]);

    let fetched = session
        .fetch_summary_data(modmail_imap::SeqNum::new(2).unwrap())
        .await
        .unwrap();
    assert_eq!(fetched.uid.unwrap().get(), 42);
    assert!(!fetched.flags.contains(&Flag::Seen));
    assert_eq!(fetched.raw, message.as_bytes());

    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    let sent = sent_text(&sent);
    assert_eq!(
        sent,
        concat!(
            "A0000 LOGIN alice@example.com secret\r\n",
            "A0001 SELECT INBOX\r\n",
            "A0002 SEARCH ALL\r\n",
            "A0003 FETCH 2 (UID FLAGS INTERNALDATE BODY.PEEK[])\r\n",
            "A0004 LOGOUT\r\n",
        )
    );
}

#[tokio::test]
async fn test_select_failure_disconnects() {
    let server = concat!(
        "* OK [CAPABILITY IMAP4rev1] ready\r\n",
        "A0000 OK Logged in\r\n",
        "A0001 NO [NONEXISTENT] Unknown mailbox\r\n",
    );
    let (stream, _sent) = MockStream::new(server.as_bytes());

    let mut session = Session::from_stream(stream, TIMEOUT).await.unwrap();
    session.login("alice", "pw").await.unwrap();
    let err = session.select("Archive").await.unwrap_err();
    assert!(matches!(err, Error::No(_)));
    assert_eq!(session.state(), SessionState::Disconnected);

    let err = session.search_all().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_connection_closed_mid_conversation() {
    let server = "* OK [CAPABILITY IMAP4rev1] ready\r\n";
    let (stream, _sent) = MockStream::new(server.as_bytes());

    let mut session = Session::from_stream(stream, TIMEOUT).await.unwrap();
    let err = session.login("alice", "pw").await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_bye_greeting_rejected() {
    let (stream, _sent) = MockStream::new(b"* BYE server shutting down\r\n");
    let err = Session::from_stream(stream, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::Bye(_)));
}
