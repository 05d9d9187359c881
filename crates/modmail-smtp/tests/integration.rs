//! End-to-end submission conversations against a scripted server.

use std::time::Duration;

use tokio_test::io::Builder;

use modmail_smtp::connection::SmtpStream;
use modmail_smtp::{Address, Config, Envelope, Error, Session, SessionState, parse_recipients};

fn config() -> Config {
    Config::new("smtp.example.com", 587).with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
}

#[tokio::test]
async fn test_submission_with_rejected_then_accepted_message() {
    let message = "From: me@example.com\r\nTo: a@example.com\r\nSubject: Report\r\n\r\n.\r\nend\r\n";
    let mock = Builder::new()
        .read(b"220 smtp.example.com ESMTP Postfix\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-smtp.example.com\r\n250-PIPELINING\r\n250-SIZE 10240000\r\n250 AUTH PLAIN LOGIN\r\n")
        .write(b"AUTH PLAIN AG1lQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
        .read(b"235 2.7.0 Authentication successful\r\n")
        // First attempt: the server refuses DATA.
        .write(b"MAIL FROM:<me@example.com>\r\n")
        .read(b"250 2.1.0 Ok\r\n")
        .write(b"RCPT TO:<a@example.com>\r\n")
        .read(b"250 2.1.5 Ok\r\n")
        .write(b"DATA\r\n")
        .read(b"451 4.3.0 Try again later\r\n")
        .write(b"RSET\r\n")
        .read(b"250 2.0.0 Ok\r\n")
        // Second attempt goes through.
        .write(b"MAIL FROM:<me@example.com>\r\n")
        .read(b"250 2.1.0 Ok\r\n")
        .write(b"RCPT TO:<a@example.com>\r\n")
        .read(b"250 2.1.5 Ok\r\n")
        .write(b"DATA\r\n")
        .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
        .write(b"From: me@example.com\r\nTo: a@example.com\r\nSubject: Report\r\n\r\n..\r\nend\r\n.\r\n")
        .read(b"250 2.0.0 Ok: queued as 12345\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 2.0.0 Bye\r\n")
        .build();

    let mut session = Session::from_stream(SmtpStream::plain(mock), &config())
        .await
        .unwrap();
    session.authenticate("me@example.com", "secret").await.unwrap();

    let envelope = Envelope::new(
        Address::new("me@example.com").unwrap(),
        parse_recipients("a@example.com").unwrap(),
    )
    .unwrap();

    let err = session.send(&envelope, message.as_bytes()).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(session.state(), SessionState::Authenticated);

    session.send(&envelope, message.as_bytes()).await.unwrap();
    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_connection_dropped_during_data() {
    let mock = Builder::new()
        .read(b"220 smtp.example.com ESMTP\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250 smtp.example.com\r\n")
        .write(b"AUTH PLAIN AG1lQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
        .read(b"235 ok\r\n")
        .write(b"MAIL FROM:<me@example.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"RCPT TO:<a@example.com>\r\n")
        .read(b"250 ok\r\n")
        .write(b"DATA\r\n")
        .build();

    let mut session = Session::from_stream(SmtpStream::plain(mock), &config())
        .await
        .unwrap();
    session.authenticate("me@example.com", "secret").await.unwrap();

    let envelope = Envelope::new(
        Address::new("me@example.com").unwrap(),
        vec![Address::new("a@example.com").unwrap()],
    )
    .unwrap();
    let err = session.send(&envelope, b"hello").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
    session.close().await;
}
