//! SMTP sender.

use modmail_smtp::{Address, Config, Envelope, Error as SmtpError, Session, parse_recipients};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::Timeouts;
use crate::account::{Account, ValidationError};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connect,
    Auth,
    Send,
}

/// Builds the envelope for a message from `from` to a comma-separated
/// recipient list. Display names and angle brackets are stripped.
///
/// # Errors
///
/// `InvalidRecipient` for an empty or malformed list, `InvalidAccount`
/// for a malformed sender.
pub fn envelope(from: &str, to: &str) -> Result<Envelope> {
    let sender =
        Address::new(from).map_err(|_| Error::InvalidAccount(vec![ValidationError::InvalidEmail]))?;
    let recipients = parse_recipients(to).map_err(|e| Error::InvalidRecipient(e.to_string()))?;
    Envelope::new(sender, recipients).map_err(|e| Error::InvalidRecipient(e.to_string()))
}

/// Connects, secures the connection, authenticates and submits one
/// message. The session is closed with `QUIT` on every path.
///
/// # Errors
///
/// `Connection` for transport and TLS failures, `Auth` for rejected
/// credentials, `Protocol` for a rejected message.
pub async fn send(
    account: &Account,
    secret: &str,
    envelope: &Envelope,
    message: &[u8],
    timeouts: Timeouts,
) -> Result<()> {
    let settings = &account.settings;
    let config = Config::new(&settings.smtp_server, settings.smtp_port)
        .with_timeouts(timeouts.connect, timeouts.io);

    let mut session = Session::connect(&config)
        .await
        .map_err(|e| classify(Stage::Connect, e))?;

    let result = match session.start_tls().await {
        Ok(()) => deliver(&mut session, &account.address, secret, envelope, message).await,
        Err(e) => Err(classify(Stage::Connect, e)),
    };
    session.close().await;
    result
}

/// Authenticates and submits on a secured session. The caller closes it.
pub(crate) async fn deliver<S>(
    session: &mut Session<S>,
    address: &str,
    secret: &str,
    envelope: &Envelope,
    message: &[u8],
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session
        .authenticate(address, secret)
        .await
        .map_err(|e| classify(Stage::Auth, e))?;
    session
        .send(envelope, message)
        .await
        .map_err(|e| classify(Stage::Send, e))?;

    debug!(address, recipients = envelope.to.len(), "submission finished");
    Ok(())
}

fn classify(stage: Stage, err: SmtpError) -> Error {
    if stage == Stage::Connect || err.is_transport() {
        return Error::Connection(err.to_string());
    }
    match (stage, &err) {
        (Stage::Auth, SmtpError::SmtpError { .. } | SmtpError::NotSupported(_)) => {
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
    use modmail_smtp::connection::SmtpStream;
    use std::time::Duration;
    use tokio_test::io::{Builder, Mock};

    fn config() -> Config {
        Config::new("smtp.example.com", 587)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
    }

    fn greeted() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-smtp.example.com\r\n250 AUTH PLAIN LOGIN\r\n");
        builder
    }

    async fn session(mock: Mock) -> Session<Mock> {
        Session::from_stream(SmtpStream::plain(mock), &config())
            .await
            .unwrap()
    }

    #[test]
    fn test_envelope_strips_display_names() {
        let envelope = envelope(
            "alice@example.com",
            "Bob <bob@example.com>, \"Doe, Jane\" <jane@example.com>",
        )
        .unwrap();
        let to: Vec<&str> = envelope.to.iter().map(Address::as_str).collect();
        assert_eq!(to, vec!["bob@example.com", "jane@example.com"]);
    }

    #[test]
    fn test_envelope_rejects_bad_recipients() {
        for to in ["", " , ", "not-an-address"] {
            let err = envelope("alice@example.com", to).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRecipient, "{to:?}");
        }
    }

    #[tokio::test]
    async fn test_deliver() {
        let mock = greeted()
            .write(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAGh1bnRlcjI=\r\n")
            .read(b"235 2.7.0 Accepted\r\n")
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: Hi\r\n\r\nHello\r\n.\r\n")
            .read(b"250 queued\r\n")
            .build();
        let mut session = session(mock).await;
        let envelope = envelope("alice@example.com", "bob@example.com").unwrap();

        deliver(
            &mut session,
            "alice@example.com",
            "hunter2",
            &envelope,
            b"Subject: Hi\r\n\r\nHello",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_auth_is_auth() {
        let mock = greeted()
            .write(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAGh1bnRlcjI=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();
        let mut session = session(mock).await;
        let envelope = envelope("alice@example.com", "bob@example.com").unwrap();

        let err = deliver(&mut session, "alice@example.com", "hunter2", &envelope, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_rejected_message_is_protocol() {
        let mock = greeted()
            .write(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAGh1bnRlcjI=\r\n")
            .read(b"235 ok\r\n")
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"550 5.1.1 No such user\r\n")
            .write(b"RSET\r\n")
            .read(b"250 ok\r\n")
            .build();
        let mut session = session(mock).await;
        let envelope = envelope("alice@example.com", "bob@example.com").unwrap();

        let err = deliver(&mut session, "alice@example.com", "hunter2", &envelope, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_connection() {
        let mock = greeted()
            .write(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAGh1bnRlcjI=\r\n")
            .build();
        let mut session = session(mock).await;
        let envelope = envelope("alice@example.com", "bob@example.com").unwrap();

        let err = deliver(&mut session, "alice@example.com", "hunter2", &envelope, b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
