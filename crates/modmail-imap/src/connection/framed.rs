//! Framed I/O for the IMAP protocol.
//!
//! Responses are CRLF-terminated lines that may embed literals
//! (`{n}\r\n` followed by n raw bytes). The framed stream reads one whole
//! response at a time, literals included, so the parser never sees a
//! partial response.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Maximum literal size.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Framed connection for the IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let start = response.len();
            response.resize(start + literal_len, 0);
            self.reader.read_exact(&mut response[start..]).await?;
        }

        Ok(response)
    }

    /// Reads responses until the tagged completion for `tag`, which is the
    /// last element of the returned list.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();

        loop {
            let response = self.read_response().await?;
            let is_tagged = response
                .strip_prefix(tag.as_bytes())
                .is_some_and(|rest| rest.first() == Some(&b' '));

            responses.push(response);
            if is_tagged {
                return Ok(responses);
            }
        }
    }

    /// Reads a single line, up to and including its LF.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            let (take, done) = buf
                .iter()
                .position(|&b| b == b'\n')
                .map_or((buf.len(), false), |pos| (pos + 1, true));

            if line.len() + take > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            line.extend_from_slice(&buf[..take]);
            self.reader.consume(take);

            if done {
                return Ok(line);
            }
        }
    }

    /// Writes a serialized command and flushes it.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Shuts down the write half of the transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }
}

/// Parses the literal length announced at the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);

    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
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
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"* 1 FETCH (RFC822 {42}\r\n"), Some(42));
        assert_eq!(parse_literal_length(b"{7+}\r\n"), Some(7));
        assert_eq!(parse_literal_length(b"* OK {not}\r\n"), None);
        assert_eq!(parse_literal_length(b"* OK {}\r\n"), None);
        assert_eq!(parse_literal_length(b"{5}"), None);
        assert_eq!(parse_literal_length(b"* OK done\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_response_with_literal() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (RFC822 {5}\r\nhello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (RFC822 {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_literal_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (BODY[] {11}\r\nhello")
            .read(b" world)\r")
            .read(b"\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {11}\r\nhello world)\r\n");
    }

    #[tokio::test]
    async fn test_literal_containing_brace_line() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (RFC822 {6}\r\n{3}\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (RFC822 {6}\r\n{3}\r\n)\r\n");
    }

    #[tokio::test]
    async fn test_read_until_tagged() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* SEARCH 1 2\r\n* A0001 is not a tag\r\nA0001 OK done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let responses = framed.read_until_tagged("A0001").await.unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[2], b"A0001 OK done\r\n");
    }

    #[tokio::test]
    async fn test_eof_is_an_error() {
        let mock = tokio_test::io::Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(framed.read_response().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_oversized_literal_rejected() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (RFC822 {999999999999}\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            framed.read_response().await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = tokio_test::io::Builder::new()
            .write(b"A0000 NOOP\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"A0000 NOOP\r\n").await.unwrap();
    }
}
