//! Multipart message composition.

use crate::content_type::{ContentType, write_parameter};
use crate::encoding::{encode_base64_lines, encode_rfc2047, encode_rfc2231, encode_words};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest header value written without encoding.
const MAX_PLAIN_HEADER: usize = 900;

/// Longest body line allowed in a 7bit part (RFC 5322 section 2.1.1).
const MAX_LINE: usize = 998;

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename presented to the recipient.
    pub filename: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates a new attachment.
    #[must_use]
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

/// Builds a `multipart/mixed` message with a text part and attachments.
///
/// ```ignore
/// let raw = MessageBuilder::new()
///     .from("alice@example.com")
///     .to("bob@example.com")
///     .subject("Hi")
///     .text_body("Hello")
///     .attach(Attachment::new("report.pdf", bytes))
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: String,
    to: String,
    subject: String,
    text: String,
    attachments: Vec<Attachment>,
    date: Option<DateTime<FixedOffset>>,
    boundary: Option<String>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From header.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Sets the To header (comma-separated addresses).
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fixes the Date header instead of using the current time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Proposes a boundary. It is replaced if it occurs in any part.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Serializes the message to CRLF-terminated bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if an address header contains a line break.
    pub fn build(self) -> Result<Vec<u8>> {
        let from = encode_address_list(&self.from)?;
        let to = encode_address_list(&self.to)?;
        let subject = if self.subject.len() > MAX_PLAIN_HEADER {
            encode_words(&self.subject)
        } else {
            encode_rfc2047(&self.subject)
        };
        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset())
            .to_rfc2822();

        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        parts.push(text_part(&self.text));
        for attachment in &self.attachments {
            parts.push(attachment_part(attachment));
        }

        let mut boundary = self.boundary.unwrap_or_else(generate_boundary);
        while parts.iter().any(|part| part.contains(&boundary)) {
            boundary = generate_boundary();
        }

        let mut out = String::new();
        let _ = write!(out, "From: {from}\r\n");
        let _ = write!(out, "To: {to}\r\n");
        let _ = write!(out, "Subject: {subject}\r\n");
        let _ = write!(out, "Date: {date}\r\n");
        out.push_str("MIME-Version: 1.0\r\n");
        let content_type = ContentType::new("multipart", "mixed");
        let _ = write!(out, "Content-Type: {content_type}");
        let _ = write_parameter(&mut out, "boundary", &boundary);
        out.push_str("\r\n\r\n");

        for part in &parts {
            let _ = write!(out, "--{boundary}\r\n{part}");
        }
        let _ = write!(out, "--{boundary}--\r\n");

        Ok(out.into_bytes())
    }
}

/// Renders the text part, headers included, ending with CRLF.
fn text_part(text: &str) -> String {
    let content_type = ContentType::text_plain();
    if is_seven_bit_safe(text) {
        format!(
            "Content-Type: {content_type}\r\nContent-Transfer-Encoding: 7bit\r\n\r\n{text}\r\n"
        )
    } else {
        let encoded = encode_base64_lines(text.as_bytes());
        format!(
            "Content-Type: {content_type}\r\nContent-Transfer-Encoding: base64\r\n\r\n{encoded}"
        )
    }
}

/// Renders one attachment part, headers included, ending with CRLF.
fn attachment_part(attachment: &Attachment) -> String {
    let name = &attachment.filename;
    let disposition = if name.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{escaped}\"")
    } else {
        format!("attachment; filename*={}", encode_rfc2231(name))
    };

    format!(
        "Content-Type: {}\r\nContent-Transfer-Encoding: base64\r\nContent-Disposition: {disposition}\r\n\r\n{}",
        ContentType::octet_stream(),
        encode_base64_lines(&attachment.data),
    )
}

/// True when text can travel as 7bit: ASCII without NUL, CRLF-only line
/// breaks and lines no longer than 998 octets.
fn is_seven_bit_safe(text: &str) -> bool {
    if !text.is_ascii() || text.contains('\0') {
        return false;
    }
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => return false,
            b'\n' if i == 0 || bytes[i - 1] != b'\r' => return false,
            _ => {}
        }
    }
    text.split("\r\n").all(|line| line.len() <= MAX_LINE)
}

/// Encodes the display names in a comma-separated address list.
fn encode_address_list(value: &str) -> Result<String> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeader(format!(
            "line break in address {value:?}"
        )));
    }
    if value.is_ascii() {
        return Ok(value.to_string());
    }

    let encoded: Vec<String> = value
        .split(',')
        .map(|item| {
            let item = item.trim();
            match item.rsplit_once('<') {
                Some((name, addr)) if !name.trim().is_empty() => {
                    let name = name.trim().trim_matches('"');
                    format!("{} <{addr}", encode_rfc2047(name))
                }
                _ => item.to_string(),
            }
        })
        .collect();
    Ok(encoded.join(", "))
}

fn generate_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let count = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("modmail-{nanos:x}-{count:x}")
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
    use crate::Message;

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc2822("Tue, 1 Jul 2025 10:00:00 +0000").unwrap()
    }

    fn base() -> MessageBuilder {
        MessageBuilder::new()
            .from("alice@example.com")
            .to("bob@example.com")
            .date(fixed_date())
    }

    #[test]
    fn test_build_headers() {
        let raw = base().subject("Hi").text_body("Hello").build().unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Hi\r\n"));
        assert!(text.contains("Date: Tue, 1 Jul 2025 10:00:00 +0000\r\n"));
        assert!(text.contains("MIME-Version: 1.0\r\n"));
        assert!(text.contains("Content-Type: multipart/mixed; boundary="));
    }

    #[test]
    fn test_build_deterministic_with_fixed_boundary() {
        let a = base().boundary("fixed").text_body("x").build().unwrap();
        let b = base().boundary("fixed").text_body("x").build().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_with_attachment_parses_back() {
        let raw = base()
            .subject("Hi")
            .text_body("Hello")
            .attach(Attachment::new("report.pdf", b"%PDF-1.4 fake".to_vec()))
            .build()
            .unwrap();

        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Content-Disposition: attachment; filename=\"report.pdf\"\r\n"));

        let message = Message::parse(&raw).unwrap();
        assert_eq!(message.subject().unwrap(), "Hi");
        assert_eq!(message.body_text().unwrap(), "Hello");
        assert_eq!(message.attachment_filenames(), vec!["report.pdf"]);
        assert_eq!(message.parts[1].decode_body().unwrap(), b"%PDF-1.4 fake");
    }

    #[test]
    fn test_non_ascii_subject_and_filename() {
        let raw = base()
            .subject("Grüße")
            .text_body("Servus")
            .attach(Attachment::new("Übersicht.txt", b"data".to_vec()))
            .build()
            .unwrap();
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("Subject: =?utf-8?B?"));
        assert!(text.contains("filename*=utf-8''"));

        let message = Message::parse(&raw).unwrap();
        assert_eq!(message.subject().unwrap(), "Grüße");
        assert_eq!(message.attachment_filenames(), vec!["Übersicht.txt"]);
    }

    #[test]
    fn test_body_encoding_choice() {
        let seven = base().text_body("line one\r\nline two").build().unwrap();
        assert!(String::from_utf8(seven).unwrap().contains("7bit"));

        let bare_lf = base().text_body("line one\nline two").build().unwrap();
        let message = Message::parse(&bare_lf).unwrap();
        assert_eq!(message.parts[0].transfer_encoding().to_string(), "base64");
        assert_eq!(message.body_text().unwrap(), "line one\nline two");

        let unicode = base().text_body("naïve").build().unwrap();
        assert_eq!(Message::parse(&unicode).unwrap().body_text().unwrap(), "naïve");
    }

    #[test]
    fn test_colliding_boundary_is_replaced() {
        let raw = base()
            .boundary("clash")
            .text_body("--clash appears in the body")
            .build()
            .unwrap();
        let message = Message::parse(&raw).unwrap();
        assert_ne!(message.content_type().boundary(), Some("clash"));
        assert_eq!(message.body_text().unwrap(), "--clash appears in the body");
    }

    #[test]
    fn test_address_line_break_rejected() {
        let result = MessageBuilder::new()
            .from("alice@example.com\r\nBcc: eve@example.com")
            .to("bob@example.com")
            .build();
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_non_ascii_display_name_encoded() {
        let raw = base()
            .to("José <jose@example.com>, bob@example.com")
            .text_body("hi")
            .build()
            .unwrap();
        let message = Message::parse(&raw).unwrap();
        assert_eq!(
            message.to().unwrap(),
            "José <jose@example.com>, bob@example.com"
        );
    }

    #[test]
    fn test_empty_attachment() {
        let raw = base()
            .text_body("see attached")
            .attach(Attachment::new("empty.bin", Vec::new()))
            .build()
            .unwrap();
        let message = Message::parse(&raw).unwrap();
        assert_eq!(message.attachment_filenames(), vec!["empty.bin"]);
        assert!(message.parts[1].decode_body().unwrap().is_empty());
    }
}
