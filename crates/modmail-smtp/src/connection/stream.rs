//! Plain and TLS transports for SMTP.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Longest reply line accepted, terminator included.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// SMTP stream, plain or TLS-encrypted.
#[derive(Debug)]
pub enum SmtpStream<S = TcpStream> {
    /// Plain connection, before STARTTLS.
    Plain(BufReader<S>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream<S>>>),
}

impl<S> SmtpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an unencrypted stream.
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    /// Returns true once the connection is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads one line with its terminator trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, invalid UTF-8 or an overlong line.
    pub async fn read_line(&mut self) -> Result<String> {
        match self {
            Self::Plain(reader) => read_line_from(reader).await,
            Self::Tls(reader) => read_line_from(reader.as_mut()).await,
        }
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => write_flush(reader.get_mut(), data).await,
            Self::Tls(reader) => write_flush(reader.get_mut(), data).await,
        }
    }

    /// Shuts down the write side.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().shutdown().await?,
            Self::Tls(reader) => reader.get_mut().shutdown().await?,
        }
        Ok(())
    }

    /// Upgrades a plain stream to TLS.
    ///
    /// Bytes the server sent after its STARTTLS reply and before the
    /// handshake are a protocol violation and abort the upgrade.
    ///
    /// # Errors
    ///
    /// Returns an error if already encrypted or if the handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let reader = match self {
            Self::Plain(reader) => reader,
            Self::Tls(_) => return Err(Error::InvalidState("already using TLS".into())),
        };
        if !reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "unexpected data before TLS handshake".into(),
            ));
        }

        let server_name = ServerName::try_from(hostname.to_string())?;
        let tls = create_tls_connector()
            .connect(server_name, reader.into_inner())
            .await?;
        debug!(hostname, "starttls handshake complete");
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }
}

async fn read_line_from<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let read = reader
        .take(MAX_LINE_LENGTH as u64)
        .read_line(&mut line)
        .await?;

    if read == 0 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if read == MAX_LINE_LENGTH && !line.ends_with('\n') {
        return Err(Error::Protocol("reply line too long".into()));
    }

    line.truncate(line.trim_end_matches(['\r', '\n']).len());
    Ok(line)
}

async fn write_flush<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Connects over plain TCP, for STARTTLS submission.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    debug!(hostname, port, "tcp connected");
    Ok(SmtpStream::plain(stream))
}

/// Connects with implicit TLS (port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let server_name = ServerName::try_from(hostname.to_string())?;
    let tcp = TcpStream::connect((hostname, port)).await?;
    debug!(hostname, port, "tcp connected, starting tls handshake");

    let tls = create_tls_connector().connect(server_name, tcp).await?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls))))
}

/// Creates a TLS connector with the Mozilla root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
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
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_lines() {
        let mock = Builder::new().read(b"250-first\r\n250 last\n").build();
        let mut stream = SmtpStream::plain(mock);
        assert_eq!(stream.read_line().await.unwrap(), "250-first");
        assert_eq!(stream.read_line().await.unwrap(), "250 last");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mock = Builder::new().build();
        let mut stream = SmtpStream::plain(mock);
        assert!(matches!(stream.read_line().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_read_line_too_long() {
        let long = vec![b'a'; MAX_LINE_LENGTH];
        let mock = Builder::new().read(&long).build();
        let mut stream = SmtpStream::plain(mock);
        assert!(matches!(
            stream.read_line().await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_all() {
        let mock = Builder::new().write(b"QUIT\r\n").build();
        let mut stream = SmtpStream::plain(mock);
        stream.write_all(b"QUIT\r\n").await.unwrap();
        assert!(!stream.is_tls());
    }

    #[tokio::test]
    async fn test_upgrade_rejects_buffered_data() {
        let mock = Builder::new().read(b"220 go ahead\r\n250 injected\r\n").build();
        let mut stream = SmtpStream::plain(mock);
        stream.read_line().await.unwrap();
        let result = stream.upgrade_to_tls("smtp.example.com").await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_invalid_host_rejected_before_connecting() {
        let result = connect_tls("not a host", 465).await;
        assert!(matches!(result, Err(Error::InvalidDnsName(_))));
    }
}
