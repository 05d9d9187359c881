//! Conversion between raw MIME and the views the engine hands out.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use modmail_imap::FetchedMessage;
use modmail_mime::{Attachment, Message, MessageBuilder};
use serde::Serialize;

use crate::error::Result;

/// Subject shown when a message has none.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Format of the IMAP INTERNALDATE value.
const INTERNAL_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// One row of the message list.
///
/// `id` is a sequence number and only valid for the mailbox session that
/// produced it. `uid` together with `uid_validity` identifies the message
/// across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Sequence number in the session that listed it.
    pub id: u32,
    /// Persistent UID, if the server reported one.
    pub uid: Option<u32>,
    /// UIDVALIDITY of the mailbox at listing time.
    pub uid_validity: Option<u32>,
    /// Whether the message carries `\Seen`.
    pub read: bool,
    /// Sent date, falling back to the server's arrival time.
    pub date: Option<DateTime<FixedOffset>>,
    /// Decoded From header, empty when absent.
    pub from: String,
    /// Decoded subject, [`NO_SUBJECT`] when absent or blank.
    pub subject: String,
}

/// A fully parsed message for the detail view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageDetail {
    /// Lowercased header names to decoded values; first occurrence wins.
    pub headers: BTreeMap<String, String>,
    /// Text of the first `text/plain` part.
    pub body: String,
    /// Filenames of attached parts, in order.
    pub attachment_filenames: Vec<String>,
}

/// A file to attach to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPayload {
    /// Name shown to the recipient.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl AttachmentPayload {
    /// Creates an attachment payload.
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

impl From<AttachmentPayload> for Attachment {
    fn from(payload: AttachmentPayload) -> Self {
        Self::new(payload.filename, payload.bytes)
    }
}

/// Builds a `multipart/mixed` message ready for SMTP `DATA`.
///
/// `date` defaults to the current local time.
///
/// # Errors
///
/// Returns a codec error if an address contains a line break.
pub fn build(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachments: Vec<AttachmentPayload>,
    date: Option<DateTime<FixedOffset>>,
) -> Result<Vec<u8>> {
    let mut builder = MessageBuilder::new()
        .from(from)
        .to(to)
        .subject(subject)
        .text_body(body);
    for attachment in attachments {
        builder = builder.attach(attachment.into());
    }
    if let Some(date) = date {
        builder = builder.date(date);
    }
    Ok(builder.build()?)
}

/// Parses a raw message into its detail view.
///
/// # Errors
///
/// Returns a codec error for malformed multipart structure or an
/// undecodable body part.
pub fn parse(raw: &[u8]) -> Result<MessageDetail> {
    let message = Message::parse(raw)?;

    let mut headers = BTreeMap::new();
    for (name, _) in message.headers.iter() {
        let key = name.to_ascii_lowercase();
        if headers.contains_key(&key) {
            continue;
        }
        if let Some(value) = message.headers.get_decoded(&key) {
            headers.insert(key, value);
        }
    }

    Ok(MessageDetail {
        headers,
        body: message.body_text()?,
        attachment_filenames: message.attachment_filenames(),
    })
}

/// Builds a list row from fetched data.
///
/// Only the header block is inspected, so a broken body never hides a
/// message from the list.
#[must_use]
pub fn summarize(id: u32, fetched: &FetchedMessage, uid_validity: Option<u32>) -> MessageSummary {
    let headers = modmail_mime::Headers::parse(&String::from_utf8_lossy(header_block(
        &fetched.raw,
    )));

    let subject = headers
        .get_decoded("subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());
    let from = headers.get_decoded("from").unwrap_or_default();
    let date = headers
        .get("date")
        .and_then(parse_date_header)
        .or_else(|| fetched.internal_date.as_deref().and_then(parse_internal_date));

    MessageSummary {
        id,
        uid: fetched.uid.map(|uid| uid.get()),
        uid_validity,
        read: fetched.flags.is_seen(),
        date,
        from,
        subject,
    }
}

/// Returns the bytes up to the blank line that ends the header block.
fn header_block(raw: &[u8]) -> &[u8] {
    raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| &raw[..pos + 2])
        .or_else(|| {
            raw.windows(2)
                .position(|w| w == b"\n\n")
                .map(|pos| &raw[..=pos])
        })
        .unwrap_or(raw)
}

/// Parses an RFC 2822 date, tolerating a trailing `(comment)`.
fn parse_date_header(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value).ok().or_else(|| {
        let (head, _) = value.rsplit_once('(')?;
        DateTime::parse_from_rfc2822(head.trim()).ok()
    })
}

fn parse_internal_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), INTERNAL_DATE_FORMAT).ok()
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
    use modmail_imap::{Flag, Flags, Uid};
    use proptest::prelude::*;

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00").unwrap()
    }

    fn fetched(raw: &str, seen: bool, internal_date: Option<&str>) -> FetchedMessage {
        let mut flags = Flags::new();
        if seen {
            flags.insert(Flag::Seen);
        }
        FetchedMessage {
            uid: Uid::new(42),
            flags,
            internal_date: internal_date.map(str::to_string),
            raw: raw.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_build_and_parse_with_attachment() {
        let raw = build(
            "alice@example.com",
            "bob@example.com",
            "Hi",
            "Hello",
            vec![AttachmentPayload::new("report.pdf", b"%PDF-1.4".to_vec())],
            Some(fixed_date()),
        )
        .unwrap();

        let detail = parse(&raw).unwrap();
        assert_eq!(detail.attachment_filenames, vec!["report.pdf"]);
        assert_eq!(detail.body, "Hello");
        assert_eq!(detail.headers["subject"], "Hi");
        assert_eq!(detail.headers["from"], "alice@example.com");
        assert_eq!(detail.headers["mime-version"], "1.0");
    }

    #[test]
    fn test_subject_edge_spaces_survive() {
        let raw = build(
            "alice@example.com",
            "bob@example.com",
            "  Hi there ",
            "Hello",
            Vec::new(),
            Some(fixed_date()),
        )
        .unwrap();
        assert_eq!(parse(&raw).unwrap().headers["subject"], "  Hi there ");
    }

    #[test]
    fn test_parse_first_header_wins() {
        let raw = b"Received: one\r\nReceived: two\r\nSubject: =?utf-8?B?SMOpbGxv?=\r\n\r\nbody";
        let detail = parse(raw).unwrap();
        assert_eq!(detail.headers["received"], "one");
        assert_eq!(detail.headers["subject"], "Héllo");
        assert_eq!(detail.body, "body");
        assert!(detail.attachment_filenames.is_empty());
    }

    #[test]
    fn test_parse_multipart_without_text_part() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n\r\n",
            "<p>hi</p>\r\n",
            "--b--\r\n"
        );
        let detail = parse(raw.as_bytes()).unwrap();
        assert_eq!(detail.body, "");
    }

    #[test]
    fn test_parse_missing_boundary_is_error() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nhello";
        assert!(matches!(parse(raw), Err(crate::Error::Codec(_))));
    }

    #[test]
    fn test_summarize_headers_and_flags() {
        let msg = fetched(
            "From: Alice <alice@example.com>\r\nSubject: Lunch\r\nDate: Fri, 1 Mar 2024 09:30:00 +0100\r\n\r\nbody",
            true,
            None,
        );
        let summary = summarize(7, &msg, Some(3));
        assert_eq!(summary.id, 7);
        assert_eq!(summary.uid, Some(42));
        assert_eq!(summary.uid_validity, Some(3));
        assert!(summary.read);
        assert_eq!(summary.from, "Alice <alice@example.com>");
        assert_eq!(summary.subject, "Lunch");
        assert_eq!(summary.date, Some(fixed_date()));
    }

    #[test]
    fn test_summarize_defaults() {
        let msg = fetched("Subject:   \r\n\r\nbody", false, None);
        let summary = summarize(1, &msg, None);
        assert!(!summary.read);
        assert_eq!(summary.subject, NO_SUBJECT);
        assert_eq!(summary.from, "");
        assert_eq!(summary.date, None);
    }

    #[test]
    fn test_summarize_internal_date_fallback() {
        let msg = fetched(
            "Date: sometime last week\r\n\r\n",
            false,
            Some(" 1-Mar-2024 09:30:00 +0100"),
        );
        assert_eq!(summarize(1, &msg, None).date, Some(fixed_date()));
    }

    #[test]
    fn test_date_header_with_comment() {
        assert_eq!(
            parse_date_header("Fri, 1 Mar 2024 08:30:00 +0000 (UTC)").map(|d| d.timestamp()),
            Some(fixed_date().timestamp())
        );
    }

    proptest! {
        #[test]
        fn prop_build_parse_roundtrip(
            subject in " ?[a-zA-Z0-9 äöüé]{1,40} ?",
            body in "[a-zA-Z0-9 .,!\n]{0,200}",
            names in proptest::collection::btree_set("[a-z]{1,8}\\.(txt|pdf|png)", 0..4),
        ) {
            let attachments = names
                .iter()
                .map(|name| AttachmentPayload::new(name.clone(), name.as_bytes().to_vec()))
                .collect();
            let raw = build(
                "alice@example.com",
                "bob@example.com",
                &subject,
                &body,
                attachments,
                Some(fixed_date()),
            )
            .unwrap();

            let detail = parse(&raw).unwrap();
            prop_assert_eq!(&detail.headers["subject"], &subject);
            prop_assert_eq!(detail.body.replace("\r\n", "\n"), body.replace("\r\n", "\n"));
            let found: std::collections::BTreeSet<_> =
                detail.attachment_filenames.into_iter().collect();
            prop_assert_eq!(found, names);
        }
    }
}
