//! Error types for the core library.

use thiserror::Error;

use crate::account::{ConfigError, CredentialError, ValidationError};

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The settings file could not be read or written.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The secret store failed (not the same as a missing secret).
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// TCP, TLS or timeout failure.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Unexpected or malformed response, or a rejected command.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed MIME.
    #[error("Message format error: {0}")]
    Codec(#[from] modmail_mime::Error),

    /// No account with this address is configured.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The account exists but the vault has no secret for it.
    #[error("No stored password for {0}")]
    MissingSecret(String),

    /// Account settings failed validation.
    #[error("Invalid account: {}", join_messages(.0))]
    InvalidAccount(Vec<ValidationError>),

    /// The recipient list is empty or malformed.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Category of an [`Error`], for front ends that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Config`].
    Config,
    /// See [`Error::Credential`].
    Credential,
    /// See [`Error::Connection`].
    Connection,
    /// See [`Error::Auth`].
    Auth,
    /// See [`Error::Protocol`].
    Protocol,
    /// See [`Error::Codec`].
    Codec,
    /// See [`Error::AccountNotFound`].
    AccountNotFound,
    /// See [`Error::MissingSecret`].
    MissingSecret,
    /// See [`Error::InvalidAccount`].
    InvalidAccount,
    /// See [`Error::InvalidRecipient`].
    InvalidRecipient,
    /// See [`Error::Cancelled`].
    Cancelled,
}

impl Error {
    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Credential(_) => ErrorKind::Credential,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Codec(_) => ErrorKind::Codec,
            Self::AccountNotFound(_) => ErrorKind::AccountNotFound,
            Self::MissingSecret(_) => ErrorKind::MissingSecret,
            Self::InvalidAccount(_) => ErrorKind::InvalidAccount,
            Self::InvalidRecipient(_) => ErrorKind::InvalidRecipient,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::message)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    fn test_kind() {
        assert_eq!(Error::Auth("no".into()).kind(), ErrorKind::Auth);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::from(modmail_mime::Error::MissingBoundary).kind(),
            ErrorKind::Codec
        );
    }

    #[test]
    fn test_invalid_account_message() {
        let err = Error::InvalidAccount(vec![
            ValidationError::InvalidEmail,
            ValidationError::InvalidImapPort,
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid account: Invalid email address format; IMAP port must be 1-65535"
        );
    }
}
