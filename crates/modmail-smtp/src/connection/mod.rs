//! SMTP connection management: transports, the type-state client and
//! the timed send session.

mod client;
mod config;
mod session;
mod stream;

pub use client::{Authenticated, Client, Connected};
pub use config::{
    Config, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, DEFAULT_PORT, IMPLICIT_TLS_PORT,
};
pub use session::{Session, SessionState};
pub use stream::{MAX_LINE_LENGTH, SmtpStream, connect, connect_tls};

use crate::types::{AuthMechanism, Extension, Reply};
use std::collections::HashSet;

/// Server capabilities from the greeting and EHLO.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Replaces the extension set from an EHLO reply.
    ///
    /// The first line of the reply is the greeting, not an extension.
    pub fn update_from_ehlo(&mut self, reply: &Reply) {
        self.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns the advertised authentication mechanisms we support.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Picks the mechanism to use: PLAIN unless only LOGIN is offered.
    ///
    /// A server that advertises no AUTH line at all still gets PLAIN.
    #[must_use]
    pub fn preferred_mechanism(&self) -> Option<AuthMechanism> {
        let advertised = self.auth_mechanisms();
        let auth_line = self
            .extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(_)));

        if !auth_line || advertised.contains(&AuthMechanism::Plain) {
            Some(AuthMechanism::Plain)
        } else if advertised.contains(&AuthMechanism::Login) {
            Some(AuthMechanism::Login)
        } else {
            None
        }
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
    use crate::types::ReplyCode;

    fn info(lines: &[&str]) -> ServerInfo {
        let mut info = ServerInfo::default();
        let mut message = vec!["mx.example.com".to_string()];
        message.extend(lines.iter().map(ToString::to_string));
        info.update_from_ehlo(&Reply::new(ReplyCode::OK, message));
        info
    }

    #[test]
    fn test_update_from_ehlo() {
        let info = info(&["STARTTLS", "SIZE 1000", "8BITMIME"]);
        assert!(info.supports_starttls());
        assert_eq!(info.max_message_size(), Some(1000));
        assert!(info.supports(&Extension::EightBitMime));
        assert_eq!(info.extensions.len(), 3);
    }

    #[test]
    fn test_preferred_mechanism() {
        assert_eq!(
            info(&["AUTH LOGIN PLAIN"]).preferred_mechanism(),
            Some(AuthMechanism::Plain)
        );
        assert_eq!(
            info(&["AUTH LOGIN"]).preferred_mechanism(),
            Some(AuthMechanism::Login)
        );
        assert_eq!(info(&[]).preferred_mechanism(), Some(AuthMechanism::Plain));
        assert_eq!(info(&["AUTH XOAUTH2"]).preferred_mechanism(), None);
    }
}
