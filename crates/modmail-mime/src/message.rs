//! MIME message structure and parsing.

use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable, decode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;

/// Deepest multipart nesting accepted by the parser.
pub const MAX_DEPTH: usize = 32;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit data in lines.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    ///
    /// Unknown encodings are treated as 7bit and passed through.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => decode_quoted_printable(body),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A leaf MIME part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (still transfer-encoded).
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, defaulting to `text/plain` when absent or
    /// unparseable (RFC 2045 section 5.2).
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        content_type_of(&self.headers)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        transfer_encoding_of(&self.headers)
    }

    /// Gets the parsed `Content-Disposition` header, if any.
    #[must_use]
    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Returns the filename when this part is an attachment.
    ///
    /// A part counts as an attachment when it carries a
    /// `Content-Disposition` header. The filename comes from the
    /// disposition, falling back to the `name` parameter of the content
    /// type.
    #[must_use]
    pub fn attachment_filename(&self) -> Option<String> {
        attachment_filename_of(&self.headers)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid for its encoding.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        self.transfer_encoding().decode(&self.body)
    }

    /// Gets the decoded body as text in its declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        payload_text(&self.headers, &self.body)
    }
}

/// A parsed MIME message.
///
/// Multipart messages are flattened: `parts` holds every leaf part in walk
/// order, nested multiparts included.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Leaf parts (empty for single-part messages).
    pub parts: Vec<Part>,
    /// Body for single-part messages.
    pub body: Option<Vec<u8>>,
}

impl Message {
    /// Creates a single-part message.
    #[must_use]
    pub const fn single_part(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            parts: Vec::new(),
            body: Some(body),
        }
    }

    /// Creates a multipart message.
    #[must_use]
    pub const fn multipart(headers: Headers, parts: Vec<Part>) -> Self {
        Self {
            headers,
            parts,
            body: None,
        }
    }

    /// Parses a raw RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns an error when a multipart entity has no boundary, when its
    /// boundary never appears in the body, or when nesting is deeper than
    /// [`MAX_DEPTH`].
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (headers, body) = split_entity(raw);
        let content_type = content_type_of(&headers);

        if content_type.is_multipart() {
            let mut parts = Vec::new();
            collect_parts(&content_type, body, 1, &mut parts)?;
            Ok(Self::multipart(headers, parts))
        } else {
            Ok(Self::single_part(headers, body.to_vec()))
        }
    }

    /// Gets the content type.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        content_type_of(&self.headers)
    }

    /// Checks if this is a multipart message.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        self.body.is_none()
    }

    /// Gets the decoded From header.
    #[must_use]
    pub fn from(&self) -> Option<String> {
        self.headers.get_decoded("from")
    }

    /// Gets the decoded To header.
    #[must_use]
    pub fn to(&self) -> Option<String> {
        self.headers.get_decoded("to")
    }

    /// Gets the decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// Gets the raw Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get("date")
    }

    /// Returns the readable body text.
    ///
    /// Single-part messages yield their decoded payload. Multipart messages
    /// yield the first `text/plain` leaf, or the empty string when there is
    /// none.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected part cannot be transfer-decoded.
    pub fn body_text(&self) -> Result<String> {
        if let Some(body) = &self.body {
            return payload_text(&self.headers, body);
        }

        self.parts
            .iter()
            .find(|part| part.content_type().is("text", "plain"))
            .map_or_else(|| Ok(String::new()), Part::body_text)
    }

    /// Returns the filenames of every attachment, in part order.
    ///
    /// Only multipart messages carry attachments; a single-part message
    /// is all body, whatever its disposition says.
    #[must_use]
    pub fn attachment_filenames(&self) -> Vec<String> {
        self.parts
            .iter()
            .filter_map(Part::attachment_filename)
            .collect()
    }
}

fn content_type_of(headers: &Headers) -> ContentType {
    headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok())
        .unwrap_or_else(ContentType::text_plain)
}

fn transfer_encoding_of(headers: &Headers) -> TransferEncoding {
    headers
        .get("content-transfer-encoding")
        .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
}

fn attachment_filename_of(headers: &Headers) -> Option<String> {
    let disposition = ContentDisposition::parse(headers.get("content-disposition")?);
    disposition
        .filename()
        .or_else(|| content_type_of(headers).name().map(decode_rfc2047))
        .filter(|name| !name.is_empty())
}

fn payload_text(headers: &Headers, body: &[u8]) -> Result<String> {
    let decoded = transfer_encoding_of(headers).decode(body)?;
    let content_type = content_type_of(headers);
    Ok(decode_charset(
        &decoded,
        content_type.charset().unwrap_or("utf-8"),
    ))
}

/// Splits an entity into its headers and body.
///
/// Without a blank line the whole entity is headers.
fn split_entity(raw: &[u8]) -> (Headers, &[u8]) {
    let (header_bytes, body): (&[u8], &[u8]) = if let Some(rest) = raw.strip_prefix(b"\r\n") {
        (&[], rest)
    } else if let Some(rest) = raw.strip_prefix(b"\n") {
        (&[], rest)
    } else {
        let crlf = find(raw, b"\r\n\r\n").map(|i| (i, 4));
        let lf = find(raw, b"\n\n").map(|i| (i, 2));
        let split = match (crlf, lf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        };
        match split {
            Some((at, len)) => (&raw[..at], &raw[at + len..]),
            None => (raw, &[]),
        }
    };

    (Headers::parse(&String::from_utf8_lossy(header_bytes)), body)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn collect_parts(
    content_type: &ContentType,
    body: &[u8],
    depth: usize,
    out: &mut Vec<Part>,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::TooDeep(MAX_DEPTH));
    }
    let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;

    for chunk in split_multipart(body, boundary)? {
        let (headers, body) = split_entity(chunk);
        let content_type = content_type_of(&headers);
        if content_type.is_multipart() {
            collect_parts(&content_type, body, depth + 1, out)?;
        } else {
            out.push(Part::new(headers, body.to_vec()));
        }
    }

    Ok(())
}

/// Splits a multipart body on its boundary delimiter lines.
///
/// The preamble and epilogue are discarded. The line break before each
/// delimiter belongs to the delimiter. A missing close delimiter is
/// tolerated; a body with no delimiter at all is not.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let next = (line_end + 1).min(body.len());
        let line = body[pos..line_end].trim_ascii_end();

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(begin) = start {
                    let mut end = pos;
                    if end > begin && body[end - 1] == b'\n' {
                        end -= 1;
                        if end > begin && body[end - 1] == b'\r' {
                            end -= 1;
                        }
                    }
                    parts.push(&body[begin..end]);
                }
                if closing {
                    return if start.is_some() {
                        Ok(parts)
                    } else {
                        Err(Error::InvalidMultipart(
                            "close delimiter without any part".to_string(),
                        ))
                    };
                }
                start = Some(next);
            }
        }

        pos = next;
    }

    match start {
        Some(begin) => {
            parts.push(&body[begin.min(body.len())..]);
            Ok(parts)
        }
        None => Err(Error::InvalidMultipart(format!(
            "boundary {boundary:?} not found"
        ))),
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

    const MULTIPART: &str = concat!(
        "From: Alice <alice@example.com>\r\n",
        "To: bob@example.com\r\n",
        "Subject: =?utf-8?Q?R=C3=A9sum=C3=A9?=\r\n",
        "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
        "\r\n",
        "This is the preamble.\r\n",
        "--XYZ\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "Content-Transfer-Encoding: quoted-printable\r\n",
        "\r\n",
        "Caf=C3=A9 at noon\r\n",
        "--XYZ\r\n",
        "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
        "Content-Disposition: attachment\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0=\r\n",
        "--XYZ--\r\n",
        "epilogue\r\n",
    );

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-unknown"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_parse_multipart() {
        let message = Message::parse(MULTIPART.as_bytes()).unwrap();
        assert!(message.is_multipart());
        assert_eq!(message.parts.len(), 2);
        assert_eq!(message.subject().unwrap(), "Résumé");
        assert_eq!(message.from().unwrap(), "Alice <alice@example.com>");
        assert_eq!(message.body_text().unwrap(), "Café at noon");
        assert_eq!(message.attachment_filenames(), vec!["report.pdf"]);
        assert_eq!(message.parts[1].decode_body().unwrap(), b"%PDF-");
    }

    #[test]
    fn test_parse_single_part() {
        let raw = "Subject: Hi\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\u{e9}";
        let raw: Vec<u8> = raw
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap())
            .collect();
        let message = Message::parse(&raw).unwrap();
        assert!(!message.is_multipart());
        assert_eq!(message.body_text().unwrap(), "café");
        assert!(message.attachment_filenames().is_empty());
    }

    #[test]
    fn test_parse_lf_only_message() {
        let raw = "Subject: Plain\n\nline one\nline two\n";
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.subject().unwrap(), "Plain");
        assert_eq!(message.body_text().unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_parse_nested_multipart_flattened() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html</p>\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=notes.txt\r\n",
            "\r\n",
            "attached notes\r\n",
            "--outer--\r\n",
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.parts.len(), 3);
        assert_eq!(message.body_text().unwrap(), "plain");
        assert_eq!(message.attachment_filenames(), vec!["notes.txt"]);
    }

    #[test]
    fn test_parse_no_text_part_gives_empty_body() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>only html</p>\r\n",
            "--b--\r\n",
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.body_text().unwrap(), "");
    }

    #[test]
    fn test_disposition_without_filename_not_listed() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: inline\r\n",
            "\r\n",
            "body\r\n",
            "--b--\r\n",
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert!(message.attachment_filenames().is_empty());
        assert_eq!(message.body_text().unwrap(), "body");
    }

    #[test]
    fn test_single_part_has_no_attachments() {
        let raw = concat!(
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=report.pdf\r\n",
            "\r\n",
            "%PDF\r\n",
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert!(message.attachment_filenames().is_empty());
        assert_eq!(message.body_text().unwrap(), "%PDF\r\n");
    }

    #[test]
    fn test_missing_close_delimiter_tolerated() {
        let raw = "Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\ntruncated";
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.body_text().unwrap(), "truncated");
    }

    #[test]
    fn test_missing_boundary_parameter() {
        let raw = "Content-Type: multipart/mixed\r\n\r\n--b\r\n\r\nx\r\n--b--\r\n";
        assert!(matches!(
            Message::parse(raw.as_bytes()),
            Err(Error::MissingBoundary)
        ));
    }

    #[test]
    fn test_boundary_never_appears() {
        let raw = "Content-Type: multipart/mixed; boundary=b\r\n\r\nno parts here\r\n";
        assert!(matches!(
            Message::parse(raw.as_bytes()),
            Err(Error::InvalidMultipart(_))
        ));
    }

    #[test]
    fn test_similar_boundary_prefix_is_not_a_delimiter() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "\r\n",
            "--bb is body text\r\n",
            "--b--\r\n",
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.body_text().unwrap(), "--bb is body text");
    }

    #[test]
    fn test_undecodable_text_part_is_an_error() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "@@@not base64@@@\r\n",
            "--b--\r\n",
        );
        let message = Message::parse(raw.as_bytes()).unwrap();
        assert!(message.body_text().is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut raw = String::new();
        for depth in 0..=MAX_DEPTH {
            raw.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=b{depth}\r\n\r\n--b{depth}\r\n"
            ));
        }
        raw.push_str("\r\nleaf\r\n");
        assert!(matches!(
            Message::parse(raw.as_bytes()),
            Err(Error::TooDeep(_))
        ));
    }
}
