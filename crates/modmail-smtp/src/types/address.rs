//! Envelope addresses and recipient lists.

use crate::error::{Error, Result};

/// Email address for the SMTP envelope.
///
/// Only the bare `local@domain` form is accepted: no display name, no
/// angle brackets and nothing that could break the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("address cannot be empty".into()));
        }
        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ','))
        {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} contains a forbidden character"
            )));
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("{addr:?} has no @")));
        };
        if domain.contains('@') {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} has more than one @"
            )));
        }
        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} has an empty local or domain part"
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: Address,
}

impl Mailbox {
    /// Parses `addr`, `<addr>` or `Display Name <addr>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address part is invalid.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        match (input.rfind('<'), input.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                let name = input[..open].trim().trim_matches('"').trim();
                Ok(Self {
                    name: (!name.is_empty()).then(|| name.to_string()),
                    address: Address::new(input[open + 1..close].trim())?,
                })
            }
            _ => Ok(Self {
                name: None,
                address: Address::new(input)?,
            }),
        }
    }
}

/// Sender and recipients of one mail transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse path (`MAIL FROM`).
    pub from: Address,
    /// Forward paths (`RCPT TO`), at least one.
    pub to: Vec<Address>,
}

impl Envelope {
    /// Creates an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no recipients.
    pub fn new(from: Address, to: Vec<Address>) -> Result<Self> {
        if to.is_empty() {
            return Err(Error::InvalidAddress("no recipients".into()));
        }
        Ok(Self { from, to })
    }
}

/// Parses a comma-separated recipient field into envelope addresses.
///
/// Commas inside quoted display names or angle brackets do not split.
/// Empty entries are skipped; a list with no addresses at all is an error.
///
/// # Errors
///
/// Returns an error if any entry is invalid or the list is empty.
pub fn parse_recipients(list: &str) -> Result<Vec<Address>> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for c in list.chars() {
        match c {
            '"' if !in_angle => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);

    let addresses = entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| Mailbox::parse(entry).map(|mailbox| mailbox.address))
        .collect::<Result<Vec<_>>>()?;

    if addresses.is_empty() {
        return Err(Error::InvalidAddress("no recipients".into()));
    }
    Ok(addresses)
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
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in [
            "",
            "userexample.com",
            "@example.com",
            "user@",
            "a@b@c",
            "user@example.com\r\nRSET",
            "user name@example.com",
            "<user@example.com>",
        ] {
            assert!(Address::new(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_mailbox_parse_forms() {
        let bare = Mailbox::parse(" bob@example.com ").unwrap();
        assert!(bare.name.is_none());
        assert_eq!(bare.address.as_str(), "bob@example.com");

        let angle = Mailbox::parse("<bob@example.com>").unwrap();
        assert!(angle.name.is_none());

        let named = Mailbox::parse("\"Bob B.\" <bob@example.com>").unwrap();
        assert_eq!(named.name.as_deref(), Some("Bob B."));
        assert_eq!(named.address.as_str(), "bob@example.com");
    }

    #[test]
    fn test_parse_recipients() {
        let list = parse_recipients("a@example.com, \"Doe, Jane\" <jane@example.com>,,<c@example.com>")
            .unwrap();
        let list: Vec<&str> = list.iter().map(Address::as_str).collect();
        assert_eq!(list, vec!["a@example.com", "jane@example.com", "c@example.com"]);
    }

    #[test]
    fn test_parse_recipients_empty() {
        assert!(matches!(parse_recipients(""), Err(Error::InvalidAddress(_))));
        assert!(matches!(parse_recipients(" , "), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_envelope_requires_recipient() {
        let from = Address::new("me@example.com").unwrap();
        assert!(Envelope::new(from.clone(), Vec::new()).is_err());
        let envelope = Envelope::new(from, parse_recipients("you@example.com").unwrap()).unwrap();
        assert_eq!(envelope.to.len(), 1);
    }

    #[test]
    fn test_parse_recipients_invalid_entry() {
        assert!(parse_recipients("a@example.com, nobody").is_err());
    }
}
