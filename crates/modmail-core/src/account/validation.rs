//! Account validation.

use super::model::Account;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// IMAP host is empty.
    EmptyImapHost,
    /// IMAP host contains whitespace or control characters.
    InvalidImapHost,
    /// IMAP port is invalid.
    InvalidImapPort,
    /// SMTP host is empty.
    EmptySmtpHost,
    /// SMTP host contains whitespace or control characters.
    InvalidSmtpHost,
    /// SMTP port is invalid.
    InvalidSmtpPort,
    /// Password is empty.
    EmptyPassword,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyImapHost => "IMAP server is required",
            Self::InvalidImapHost => "IMAP server is not a valid host name",
            Self::InvalidImapPort => "IMAP port must be 1-65535",
            Self::EmptySmtpHost => "SMTP server is required",
            Self::InvalidSmtpHost => "SMTP server is not a valid host name",
            Self::InvalidSmtpPort => "SMTP port must be 1-65535",
            Self::EmptyPassword => "Password is required",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyEmail | Self::InvalidEmail => "address",
            Self::EmptyImapHost | Self::InvalidImapHost => "imap_server",
            Self::InvalidImapPort => "imap_port",
            Self::EmptySmtpHost | Self::InvalidSmtpHost => "smtp_server",
            Self::InvalidSmtpPort => "smtp_port",
            Self::EmptyPassword => "password",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns every problem found, not just the first.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &Account) -> ValidationResult {
    let mut errors = Vec::new();
    let settings = &account.settings;

    if account.address.trim().is_empty() {
        errors.push(ValidationError::EmptyEmail);
    } else if !is_valid_email(&account.address) {
        errors.push(ValidationError::InvalidEmail);
    }

    check_host(
        &settings.imap_server,
        ValidationError::EmptyImapHost,
        ValidationError::InvalidImapHost,
        &mut errors,
    );
    if settings.imap_port == 0 {
        errors.push(ValidationError::InvalidImapPort);
    }

    check_host(
        &settings.smtp_server,
        ValidationError::EmptySmtpHost,
        ValidationError::InvalidSmtpHost,
        &mut errors,
    );
    if settings.smtp_port == 0 {
        errors.push(ValidationError::InvalidSmtpPort);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks the secret given alongside a new account.
///
/// # Errors
///
/// Returns `EmptyPassword` for an empty secret.
pub(crate) fn validate_secret(secret: &str) -> Result<(), ValidationError> {
    if secret.is_empty() {
        Err(ValidationError::EmptyPassword)
    } else {
        Ok(())
    }
}

fn check_host(
    host: &str,
    empty: ValidationError,
    invalid: ValidationError,
    errors: &mut Vec<ValidationError>,
) {
    if host.trim().is_empty() {
        errors.push(empty);
    } else if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        errors.push(invalid);
    }
}

/// Basic email validation: one `@`, non-empty local part, dotted domain.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
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
    use crate::account::ConnectionSettings;

    fn valid() -> Account {
        Account::new(
            "alice@example.com",
            ConnectionSettings::new("smtp.example.com", 587, "imap.example.com", 993),
        )
    }

    #[test]
    fn test_valid_account() {
        assert!(validate_account(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let account = Account::new("", ConnectionSettings::default());
        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyEmail,
                ValidationError::EmptyImapHost,
                ValidationError::InvalidImapPort,
                ValidationError::EmptySmtpHost,
                ValidationError::InvalidSmtpPort,
            ]
        );
    }

    #[test]
    fn test_invalid_emails() {
        for address in [
            "alice",
            "@example.com",
            "alice@",
            "alice@example",
            "alice@.example.com",
            "alice@example..com",
            "a@b@example.com",
            "alice smith@example.com",
        ] {
            let mut account = valid();
            account.address = address.to_string();
            assert_eq!(
                validate_account(&account),
                Err(vec![ValidationError::InvalidEmail]),
                "{address}"
            );
        }
    }

    #[test]
    fn test_host_with_space() {
        let mut account = valid();
        account.settings.imap_server = "imap example.com".to_string();
        assert_eq!(
            validate_account(&account),
            Err(vec![ValidationError::InvalidImapHost])
        );
    }

    #[test]
    fn test_secret() {
        assert_eq!(validate_secret(""), Err(ValidationError::EmptyPassword));
        assert!(validate_secret("hunter2").is_ok());
        assert_eq!(ValidationError::EmptyPassword.field(), "password");
    }
}
