//! IMAP command builder.
//!
//! Only the commands a single-mailbox reader needs are modelled.

mod tag_generator;

pub use tag_generator::TagGenerator;

/// SEARCH criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Every message in the mailbox.
    All,
    /// Messages without `\Seen`.
    Unseen,
}

/// A FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `UID`.
    Uid,
    /// `FLAGS`.
    Flags,
    /// `INTERNALDATE`.
    InternalDate,
    /// `RFC822.SIZE`.
    Rfc822Size,
    /// `RFC822`: the full message. Sets `\Seen`.
    Rfc822,
    /// `BODY[section]` or `BODY.PEEK[section]`.
    Body {
        /// Section specifier, empty for the whole message.
        section: String,
        /// Use `.PEEK` so `\Seen` is left untouched.
        peek: bool,
    },
}

impl FetchAttribute {
    /// The whole message without setting `\Seen`.
    #[must_use]
    pub fn body_peek() -> Self {
        Self::Body {
            section: String::new(),
            peek: true,
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Uid => buf.extend_from_slice(b"UID"),
            Self::Flags => buf.extend_from_slice(b"FLAGS"),
            Self::InternalDate => buf.extend_from_slice(b"INTERNALDATE"),
            Self::Rfc822Size => buf.extend_from_slice(b"RFC822.SIZE"),
            Self::Rfc822 => buf.extend_from_slice(b"RFC822"),
            Self::Body { section, peek } => {
                buf.extend_from_slice(if *peek { b"BODY.PEEK[" } else { b"BODY[" });
                buf.extend_from_slice(section.as_bytes());
                buf.push(b']');
            }
        }
    }
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// LOGOUT command.
    Logout,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// SEARCH command.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// FETCH or UID FETCH for a single message.
    Fetch {
        /// Sequence number, or UID when `uid` is set.
        id: u32,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
        /// Address the message by UID.
        uid: bool,
    },
}

impl Command {
    /// Serializes the command with the given tag, CRLF included.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                buf.extend_from_slice(match criteria {
                    SearchCriteria::All => b"ALL",
                    SearchCriteria::Unseen => b"UNSEEN",
                });
            }

            Self::Fetch { id, items, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(format!("FETCH {id} ").as_bytes());
                if let [item] = items.as_slice() {
                    item.write(&mut buf);
                } else {
                    buf.push(b'(');
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            buf.push(b' ');
                        }
                        item.write(&mut buf);
                    }
                    buf.push(b')');
                }
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Name used in log lines. Never includes arguments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { uid: true, .. } => "UID FETCH",
            Self::Fetch { uid: false, .. } => "FETCH",
        }
    }
}

/// Writes an atom when possible, otherwise a quoted string.
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
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

    fn text(cmd: &Command) -> String {
        let bytes = cmd.serialize("A0001");
        let line = String::from_utf8(bytes).unwrap();
        line.strip_suffix("\r\n").unwrap().to_string()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(text(&Command::Capability), "A0001 CAPABILITY");
        assert_eq!(text(&Command::Logout), "A0001 LOGOUT");
    }

    #[test]
    fn test_login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "alice@example.com".to_string(),
            password: "pa ss\"wd".to_string(),
        };
        assert_eq!(
            text(&cmd),
            "A0001 LOGIN alice@example.com \"pa ss\\\"wd\""
        );
    }

    #[test]
    fn test_login_empty_password_quoted() {
        let cmd = Command::Login {
            username: "alice".to_string(),
            password: String::new(),
        };
        assert_eq!(text(&cmd), "A0001 LOGIN alice \"\"");
    }

    #[test]
    fn test_select_and_search() {
        let select = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(text(&select), "A0001 SELECT INBOX");
        let search = Command::Search {
            criteria: SearchCriteria::All,
        };
        assert_eq!(text(&search), "A0001 SEARCH ALL");
    }

    #[test]
    fn test_fetch_summary_items() {
        let cmd = Command::Fetch {
            id: 7,
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::Flags,
                FetchAttribute::InternalDate,
                FetchAttribute::body_peek(),
            ],
            uid: false,
        };
        assert_eq!(
            text(&cmd),
            "A0001 FETCH 7 (UID FLAGS INTERNALDATE BODY.PEEK[])"
        );
    }

    #[test]
    fn test_uid_fetch_single_item() {
        let cmd = Command::Fetch {
            id: 4242,
            items: vec![FetchAttribute::Rfc822],
            uid: true,
        };
        assert_eq!(text(&cmd), "A0001 UID FETCH 4242 RFC822");
        assert_eq!(cmd.name(), "UID FETCH");
    }

    #[test]
    fn test_name_hides_arguments() {
        let cmd = Command::Login {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(cmd.name(), "LOGIN");
    }
}
