//! Submission connection settings.

use std::time::Duration;

/// Default submission port (STARTTLS).
pub const DEFAULT_PORT: u16 = 587;

/// Port on which TLS starts immediately.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Default time allowed for TCP connect plus TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for each command round trip.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// SMTP connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, also used for certificate verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Name announced in EHLO.
    pub client_hostname: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-command timeout.
    pub io_timeout: Duration,
}

impl Config {
    /// Creates a configuration for `host:port` with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_hostname: "localhost".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Sets both timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }

    /// Whether TLS starts before the greeting.
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
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

    #[test]
    fn test_implicit_tls_only_on_465() {
        assert!(Config::new("smtp.example.com", 465).implicit_tls());
        assert!(!Config::new("smtp.example.com", DEFAULT_PORT).implicit_tls());
        assert!(!Config::new("smtp.example.com", 25).implicit_tls());
    }

    #[test]
    fn test_with_timeouts() {
        let config = Config::new("smtp.example.com", 587)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(10));
        assert_eq!(config.client_hostname, "localhost");
    }
}
