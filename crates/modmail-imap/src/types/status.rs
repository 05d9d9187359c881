//! Status keywords, capabilities, response codes and mailbox status.

use super::{Flags, SeqNum, Uid, UidValidity};

/// Completion status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command was malformed or not valid in this state.
    Bad,
    /// Connection is already authenticated.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

/// A server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1`.
    Imap4Rev1,
    /// `IMAP4rev2`.
    Imap4Rev2,
    /// `STARTTLS`.
    StartTls,
    /// `LOGINDISABLED`: the LOGIN command must not be used.
    LoginDisabled,
    /// `AUTH=<mechanism>`.
    Auth(String),
    /// Anything else, kept verbatim.
    Other(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            _ => upper
                .strip_prefix("AUTH=")
                .map_or_else(|| Self::Other(s.to_string()), |m| Self::Auth(m.to_string())),
        }
    }
}

/// Bracketed response code (`[UIDVALIDITY 42]` and friends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Human-readable alert that must be shown to the user.
    Alert,
    /// Mailbox opened read-only.
    ReadOnly,
    /// Mailbox opened read-write.
    ReadWrite,
    /// Next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY of the selected mailbox.
    UidValidity(UidValidity),
    /// First unseen message.
    Unseen(SeqNum),
    /// Flags the client may change permanently.
    PermanentFlags(Flags),
    /// Capability list sent with the greeting or LOGIN completion.
    Capability(Vec<Capability>),
    /// Unrecognised code, by name.
    Other(String),
}

/// Mailbox snapshot gathered from a SELECT response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Flags defined in the mailbox.
    pub flags: Flags,
    /// UIDVALIDITY.
    pub uid_validity: Option<UidValidity>,
    /// Next UID.
    pub uid_next: Option<Uid>,
    /// First unseen message.
    pub unseen: Option<SeqNum>,
    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
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
    fn test_capability_parse() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("logindisabled"), Capability::LoginDisabled);
        assert_eq!(
            Capability::parse("AUTH=plain"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("IDLE"),
            Capability::Other("IDLE".to_string())
        );
    }
}
