//! MIME content type and disposition parameters.

use crate::encoding::{decode_rfc2047, decode_rfc2231};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Characters that force a parameter value to be quoted (RFC 2045 tspecials).
const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters with lowercased names.
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Creates a text/plain content type with a UTF-8 charset.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a multipart/mixed content type with boundary.
    #[must_use]
    pub fn multipart_mixed(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "mixed").with_parameter("boundary", boundary)
    }

    /// Creates an application/octet-stream content type.
    #[must_use]
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the `name` parameter, some senders put the filename there.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks for a specific type/subtype pair, ignoring case.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type) && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted; value"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, rest) = s.split_once(';').unwrap_or((s, ""));
        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("missing subtype in {s:?}")))?;

        let main_type = main_type.trim().to_ascii_lowercase();
        let sub_type = sub_type.trim().to_ascii_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(format!("empty type in {s:?}")));
        }

        Ok(Self {
            main_type,
            sub_type,
            parameters: parse_parameters(rest),
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        for (key, value) in &self.parameters {
            write_parameter(f, key, value)?;
        }
        Ok(())
    }
}

/// Writes `; key=value`, quoting the value when it needs it.
pub(crate) fn write_parameter(f: &mut impl fmt::Write, key: &str, value: &str) -> fmt::Result {
    if key.ends_with('*') {
        // Extended values are already percent-encoded.
        write!(f, "; {key}={value}")
    } else if value.is_empty()
        || value.contains(|c: char| c.is_whitespace() || TSPECIALS.contains(c))
    {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        write!(f, "; {key}=\"{escaped}\"")
    } else {
        write!(f, "; {key}={value}")
    }
}

/// A `Content-Disposition` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased ("attachment", "inline", ...).
    pub kind: String,
    /// Parameters with lowercased names.
    pub parameters: BTreeMap<String, String>,
}

impl ContentDisposition {
    /// Parses a disposition header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (kind, rest) = s.split_once(';').unwrap_or((s, ""));
        Self {
            kind: kind.trim().to_ascii_lowercase(),
            parameters: parse_parameters(rest),
        }
    }

    /// Returns the filename, preferring the RFC 2231 `filename*` form.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        if let Some(extended) = self.parameters.get("filename*") {
            return Some(decode_rfc2231(extended));
        }
        self.parameters
            .get("filename")
            .map(|name| decode_rfc2047(name))
    }
}

/// Parses `; key=value; key="quoted value"` parameter lists.
///
/// Names are lowercased. Semicolons inside quoted strings are kept, and
/// backslash escapes inside quotes are resolved. RFC 2231 continuations
/// (`name*0`, `name*1*`) are reassembled into a single `name` or `name*`.
fn parse_parameters(input: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut continued: BTreeMap<String, Vec<(u32, bool, String)>> = BTreeMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ';' || c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_ascii_lowercase();

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => value.push(c),
                    }
                }
                // Skip anything between the closing quote and the next ';'.
                while chars.peek().is_some_and(|c| *c != ';') {
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }

        if key.is_empty() {
            continue;
        }

        match split_continuation(&key) {
            Some((base, index, extended)) => {
                continued
                    .entry(base.to_string())
                    .or_default()
                    .push((index, extended, value));
            }
            None => {
                params.insert(key, value);
            }
        }
    }

    for (base, mut sections) in continued {
        sections.sort_by_key(|(index, _, _)| *index);
        let extended = sections.first().is_some_and(|(_, ext, _)| *ext);
        let joined: String = sections.into_iter().map(|(_, _, v)| v).collect();
        let key = if extended { format!("{base}*") } else { base };
        params.entry(key).or_insert(joined);
    }

    params
}

/// Splits `name*N` or `name*N*` into (name, N, extended).
fn split_continuation(key: &str) -> Option<(&str, u32, bool)> {
    let (base, tail) = key.split_once('*')?;
    let (digits, extended) = match tail.strip_suffix('*') {
        Some(digits) => (digits, true),
        None => (tail, false),
    };
    let index = digits.parse().ok()?;
    Some((base, index, extended))
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

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain();
        assert!(ct.is("text", "plain"));
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; Charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_quoted_with_semicolon() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"a;b=c\"; x=1").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("a;b=c"));
        assert_eq!(ct.parameters.get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn test_content_type_display_quotes_specials() {
        let ct = ContentType::multipart_mixed("=_part 1");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"=_part 1\"");
        assert_eq!(
            ContentType::parse(&ct.to_string()).unwrap().boundary(),
            Some("=_part 1")
        );
    }

    #[test]
    fn test_disposition_filename_plain() {
        let cd = ContentDisposition::parse("attachment; filename=\"report.pdf\"");
        assert_eq!(cd.kind, "attachment");
        assert_eq!(cd.filename().as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_disposition_filename_extended_wins() {
        let cd = ContentDisposition::parse(
            "attachment; filename=\"fallback.txt\"; filename*=utf-8''r%C3%A9sum%C3%A9.txt",
        );
        assert_eq!(cd.filename().as_deref(), Some("résumé.txt"));
    }

    #[test]
    fn test_disposition_filename_continuation() {
        let cd = ContentDisposition::parse(
            "attachment; filename*0=\"long-\"; filename*1=\"name.txt\"",
        );
        assert_eq!(cd.filename().as_deref(), Some("long-name.txt"));
    }

    #[test]
    fn test_disposition_without_filename() {
        let cd = ContentDisposition::parse("inline");
        assert_eq!(cd.kind, "inline");
        assert!(cd.filename().is_none());
    }
}
