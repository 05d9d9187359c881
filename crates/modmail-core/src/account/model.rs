//! Account model types.

use serde::{Deserialize, Serialize};

/// Server endpoints for one account, as stored in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// SMTP server hostname.
    pub smtp_server: String,
    /// SMTP port (465 for implicit TLS, otherwise STARTTLS).
    pub smtp_port: u16,
    /// IMAP server hostname.
    pub imap_server: String,
    /// IMAP port (implicit TLS).
    pub imap_port: u16,
}

impl ConnectionSettings {
    /// Creates settings from the four endpoint values.
    #[must_use]
    pub fn new(
        smtp_server: impl Into<String>,
        smtp_port: u16,
        imap_server: impl Into<String>,
        imap_port: u16,
    ) -> Self {
        Self {
            smtp_server: smtp_server.into(),
            smtp_port,
            imap_server: imap_server.into(),
            imap_port,
        }
    }
}

/// An email account. The address is the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    /// Email address, also the login name.
    pub address: String,
    /// Server endpoints.
    pub settings: ConnectionSettings,
}

impl Account {
    /// Creates an account.
    #[must_use]
    pub fn new(address: impl Into<String>, settings: ConnectionSettings) -> Self {
        Self {
            address: address.into(),
            settings,
        }
    }

    /// Creates an account with settings for well-known providers.
    ///
    /// Unknown domains get empty settings for the caller to fill in.
    #[must_use]
    pub fn with_provider_defaults(address: &str) -> Self {
        let domain = address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let settings = match domain.as_str() {
            "gmail.com" | "googlemail.com" => {
                ConnectionSettings::new("smtp.gmail.com", 587, "imap.gmail.com", 993)
            }
            "outlook.com" | "hotmail.com" | "live.com" => ConnectionSettings::new(
                "smtp-mail.outlook.com",
                587,
                "outlook.office365.com",
                993,
            ),
            "yahoo.com" | "ymail.com" => {
                ConnectionSettings::new("smtp.mail.yahoo.com", 465, "imap.mail.yahoo.com", 993)
            }
            "icloud.com" | "me.com" | "mac.com" => {
                ConnectionSettings::new("smtp.mail.me.com", 587, "imap.mail.me.com", 993)
            }
            _ => ConnectionSettings::default(),
        };

        Self::new(address.trim(), settings)
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
    fn test_gmail_defaults() {
        let account = Account::with_provider_defaults("someone@Gmail.com");
        assert_eq!(account.address, "someone@Gmail.com");
        assert_eq!(account.settings.smtp_server, "smtp.gmail.com");
        assert_eq!(account.settings.smtp_port, 587);
        assert_eq!(account.settings.imap_server, "imap.gmail.com");
        assert_eq!(account.settings.imap_port, 993);
    }

    #[test]
    fn test_outlook_family() {
        for address in ["a@outlook.com", "a@hotmail.com", "a@live.com"] {
            let account = Account::with_provider_defaults(address);
            assert_eq!(account.settings.smtp_server, "smtp-mail.outlook.com");
            assert_eq!(account.settings.imap_server, "outlook.office365.com");
        }
    }

    #[test]
    fn test_unknown_domain() {
        let account = Account::with_provider_defaults("me@example.org");
        assert_eq!(account.settings, ConnectionSettings::default());
    }

    #[test]
    fn test_settings_json_shape() {
        let settings = ConnectionSettings::new("smtp.example.com", 587, "imap.example.com", 993);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "smtp_server": "smtp.example.com",
                "smtp_port": 587,
                "imap_server": "imap.example.com",
                "imap_port": 993,
            })
        );
    }
}
