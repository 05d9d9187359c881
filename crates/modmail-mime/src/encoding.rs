//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 encoded words and the
//! RFC 2231 extended parameter syntax, plus the handful of charsets the
//! parser can turn into text without a conversion table dependency.

use crate::error::{Error, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::fmt::Write as _;

/// Base64 engine that accepts input with or without trailing padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Line length for base64 bodies (RFC 2045 section 6.8).
const BASE64_LINE: usize = 76;

/// Longest encoded word allowed by RFC 2047.
const MAX_ENCODED_WORD: usize = 75;

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 broken into CRLF-terminated 76 column lines.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        // Base64 output is pure ASCII, so every chunk is valid UTF-8.
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

/// Decodes Base64 data, ignoring embedded whitespace and missing padding.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// # Errors
///
/// Returns an error if an `=` escape is not followed by two hex digits or
/// a line break.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        // Soft line break, possibly with trailing whitespace before it.
        let mut j = i + 1;
        while j < data.len() && (data[j] == b' ' || data[j] == b'\t') {
            j += 1;
        }
        if data.get(j) == Some(&b'\r') && data.get(j + 1) == Some(&b'\n') {
            i = j + 2;
            continue;
        }
        if data.get(j) == Some(&b'\n') {
            i = j + 1;
            continue;
        }
        if j == data.len() {
            break;
        }

        match (data.get(i + 1), data.get(i + 2)) {
            (Some(&hi), Some(&lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                out.push(hex_value(hi) << 4 | hex_value(lo));
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(format!(
                    "invalid quoted-printable escape at byte {i}"
                )));
            }
        }
    }

    Ok(out)
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Returns true if a header value cannot be written verbatim.
///
/// Anything outside printable ASCII, leading or trailing whitespace (which
/// header unfolding would eat) and literal `=?` sequences (which a reader
/// would take for an encoded word) force encoding.
#[must_use]
pub fn needs_header_encoding(text: &str) -> bool {
    text.bytes().any(|b| !(0x20..=0x7E).contains(&b))
        || text.starts_with(' ')
        || text.ends_with(' ')
        || text.contains("=?")
}

/// Encodes a header value as one or more RFC 2047 `B` encoded words.
///
/// Values that do not need encoding are returned unchanged. Long values
/// are split on character boundaries into words of at most 75 characters,
/// joined by a folding CRLF + space.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if needs_header_encoding(text) {
        encode_words(text)
    } else {
        text.to_string()
    }
}

/// Unconditionally encodes text as folded RFC 2047 `B` encoded words.
#[must_use]
pub fn encode_words(text: &str) -> String {
    const PREFIX: &str = "=?utf-8?B?";
    const SUFFIX: &str = "?=";
    let max_encoded = MAX_ENCODED_WORD - PREFIX.len() - SUFFIX.len();
    let max_raw = max_encoded / 4 * 3;

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > max_raw && !chunk.is_empty() {
            words.push(format!("{PREFIX}{}{SUFFIX}", encode_base64(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() || words.is_empty() {
        words.push(format!("{PREFIX}{}{SUFFIX}", encode_base64(chunk.as_bytes())));
    }

    words.join("\r\n ")
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped, as the RFC
/// requires. Words that fail to decode are kept verbatim.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_ws = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        if rest.starts_with("=?")
            && let Some((decoded, consumed)) = decode_encoded_word(rest)
        {
            if !last_was_word {
                out.push_str(&pending_ws);
            }
            pending_ws.clear();
            out.push_str(&decoded);
            rest = &rest[consumed..];
            last_was_word = true;
            continue;
        }

        let mut chars = rest.chars();
        let Some(ch) = chars.next() else {
            break;
        };
        if ch == ' ' || ch == '\t' {
            pending_ws.push(ch);
        } else {
            out.push_str(&pending_ws);
            pending_ws.clear();
            out.push(ch);
            last_was_word = false;
        }
        rest = chars.as_str();
    }

    out.push_str(&pending_ws);
    out
}

/// Decodes a single encoded word at the start of `input`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(input: &str) -> Option<(String, usize)> {
    let body = input.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let payload = &body[..end];
    if payload.contains(' ') {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => {
            let spaced = payload.replace('_', " ");
            decode_quoted_printable(spaced.as_bytes()).ok()?
        }
        _ => return None,
    };

    let consumed = input.len() - body[end + 2..].len();
    // RFC 2231 allows a language suffix: charset*lang.
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((decode_charset(&bytes, charset), consumed))
}

/// Converts bytes in the given charset to a string.
///
/// UTF-8, US-ASCII, ISO-8859-1 and Windows-1252 are converted exactly;
/// anything else is treated as UTF-8 with replacement characters.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.trim().to_ascii_lowercase().as_str() {
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        "windows-1252" | "cp1252" => bytes.iter().map(|&b| cp1252_char(b)).collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Maps a Windows-1252 byte to its character.
fn cp1252_char(b: u8) -> char {
    const HIGH: [char; 32] = [
        '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}',
        '\u{017D}', '\u{FFFD}', '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}',
        '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
    ];
    if (0x80..0xA0).contains(&b) {
        HIGH[usize::from(b - 0x80)]
    } else {
        char::from(b)
    }
}

/// Encodes a parameter value in the RFC 2231 extended form `utf-8''…`.
#[must_use]
pub fn encode_rfc2231(value: &str) -> String {
    let mut out = String::from("utf-8''");
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Decodes an RFC 2231 extended parameter value (`charset'lang'pct-encoded`).
///
/// Values without the two quote separators are percent-decoded as UTF-8.
#[must_use]
pub fn decode_rfc2231(value: &str) -> String {
    let (charset, encoded) = match value.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
        [charset, _lang, encoded] => (*charset, *encoded),
        _ => ("utf-8", value),
    };

    let raw = encoded.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%'
            && let (Some(&hi), Some(&lo)) = (raw.get(i + 1), raw.get(i + 2))
            && hi.is_ascii_hexdigit()
            && lo.is_ascii_hexdigit()
        {
            bytes.push(hex_value(hi) << 4 | hex_value(lo));
            i += 3;
            continue;
        }
        bytes.push(raw[i]);
        i += 1;
    }

    decode_charset(&bytes, if charset.is_empty() { "utf-8" } else { charset })
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
    fn test_base64_encode_decode() {
        let encoded = encode_base64(b"Hello, World!");
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64(encoded.as_bytes()).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_base64_lines_wrap_at_76() {
        let data = vec![0xABu8; 200];
        let encoded = encode_base64_lines(&data);
        for line in encoded.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= 76);
        }
        assert_eq!(decode_base64(encoded.as_bytes()).unwrap(), data);
    }

    #[test]
    fn test_base64_decode_lenient() {
        assert_eq!(decode_base64(b"SGVs\r\nbG8").unwrap(), b"Hello");
        assert!(decode_base64(b"!!!!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!").unwrap(), b"Hello, World!");
        assert_eq!(
            decode_quoted_printable(b"H=C3=A9llo").unwrap(),
            "Héllo".as_bytes()
        );
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello= \nWorld").unwrap(), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable(b"bad =ZZ escape").is_err());
    }

    #[test]
    fn test_rfc2047_plain_ascii_untouched() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");
    }

    #[test]
    fn test_rfc2047_encode_decode() {
        let encoded = encode_rfc2047("Héllo");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
        assert_eq!(decode_rfc2047(&encoded), "Héllo");
    }

    #[test]
    fn test_rfc2047_long_value_splits_words() {
        let text = "Grüße aus München, ".repeat(8);
        let encoded = encode_rfc2047(&text);
        for word in encoded.split("\r\n ") {
            assert!(word.len() <= 75, "word too long: {word}");
        }
        // Folding turns CRLF + space into a single space when unfolded.
        let unfolded = encoded.replace("\r\n ", " ");
        assert_eq!(decode_rfc2047(&unfolded), text);
    }

    #[test]
    fn test_rfc2047_decode_embedded_words() {
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?Q?caf=C3=A9?= menu"),
            "Re: café menu"
        );
        assert_eq!(
            decode_rfc2047("=?ISO-8859-1?Q?a?= =?ISO-8859-1?Q?b?="),
            "ab"
        );
        assert_eq!(decode_rfc2047("=?utf-8?Q?a_b?="), "a b");
    }

    #[test]
    fn test_rfc2047_broken_word_kept() {
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047("price =? maybe"), "price =? maybe");
    }

    #[test]
    fn test_decode_charset_latin1_and_cp1252() {
        assert_eq!(decode_charset(&[0x63, 0x61, 0x66, 0xE9], "ISO-8859-1"), "café");
        assert_eq!(decode_charset(&[0x80], "windows-1252"), "€");
    }

    #[test]
    fn test_rfc2231_round_trip() {
        let encoded = encode_rfc2231("résumé 2024.pdf");
        assert!(encoded.starts_with("utf-8''"));
        assert!(!encoded.contains(' '));
        assert_eq!(decode_rfc2231(&encoded), "résumé 2024.pdf");
    }
}
