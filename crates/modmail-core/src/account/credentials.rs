//! Secret storage.
//!
//! Passwords are kept in the platform's credential store, keyed by a
//! service name and the account address:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use tracing::debug;

/// Service name used for every secret this crate stores.
pub const SERVICE_NAME: &str = "modern-mail";

/// Error type for credential operations.
///
/// A missing secret is not an error; lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// The secret backend refused the operation.
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Storage for account secrets.
pub trait CredentialVault: Send + Sync {
    /// Stores or replaces a secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> CredentialResult<()>;

    /// Looks up a secret. `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn get_secret(&self, service: &str, account: &str) -> CredentialResult<Option<String>>;

    /// Deletes a secret. Deleting a missing secret succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn delete_secret(&self, service: &str, account: &str) -> CredentialResult<()>;
}

/// Vault backed by the system keyring.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringVault;

impl KeyringVault {
    /// Creates a keyring-backed vault.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CredentialVault for KeyringVault {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> CredentialResult<()> {
        let entry = Entry::new(service, account)?;
        entry.set_password(secret)?;
        debug!(account, "Stored secret");
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> CredentialResult<Option<String>> {
        let entry = Entry::new(service, account)?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => {
                debug!(account, "No secret found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_secret(&self, service: &str, account: &str) -> CredentialResult<()> {
        let entry = Entry::new(service, account)?;
        match entry.delete_credential() {
            Ok(()) => {
                debug!(account, "Deleted secret");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process vault for tests and session-only front ends.
#[derive(Debug, Default)]
pub struct MemoryVault {
    secrets: Mutex<HashMap<(String, String), String>>,
}

impl MemoryVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.lock().map_or(0, |secrets| secrets.len())
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> CredentialResult<std::sync::MutexGuard<'_, HashMap<(String, String), String>>> {
        self.secrets
            .lock()
            .map_err(|_| CredentialError::Unavailable("memory vault lock poisoned".into()))
    }
}

impl CredentialVault for MemoryVault {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> CredentialResult<()> {
        self.lock()?
            .insert((service.to_string(), account.to_string()), secret.to_string());
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> CredentialResult<Option<String>> {
        Ok(self
            .lock()?
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn delete_secret(&self, service: &str, account: &str) -> CredentialResult<()> {
        self.lock()?
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

impl<V: CredentialVault + ?Sized> CredentialVault for std::sync::Arc<V> {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> CredentialResult<()> {
        (**self).set_secret(service, account, secret)
    }

    fn get_secret(&self, service: &str, account: &str) -> CredentialResult<Option<String>> {
        (**self).get_secret(service, account)
    }

    fn delete_secret(&self, service: &str, account: &str) -> CredentialResult<()> {
        (**self).delete_secret(service, account)
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
    fn test_memory_vault_roundtrip() {
        let vault = MemoryVault::new();
        vault
            .set_secret(SERVICE_NAME, "alice@example.com", "hunter2")
            .unwrap();
        assert_eq!(
            vault.get_secret(SERVICE_NAME, "alice@example.com").unwrap(),
            Some("hunter2".to_string())
        );
    }

    #[test]
    fn test_memory_vault_missing_is_none() {
        let vault = MemoryVault::new();
        assert_eq!(vault.get_secret(SERVICE_NAME, "nobody@example.com").unwrap(), None);
    }

    #[test]
    fn test_memory_vault_overwrite_and_delete() {
        let vault = MemoryVault::new();
        vault.set_secret(SERVICE_NAME, "a@example.com", "one").unwrap();
        vault.set_secret(SERVICE_NAME, "a@example.com", "two").unwrap();
        assert_eq!(vault.len(), 1);
        assert_eq!(
            vault.get_secret(SERVICE_NAME, "a@example.com").unwrap().as_deref(),
            Some("two")
        );

        vault.delete_secret(SERVICE_NAME, "a@example.com").unwrap();
        vault.delete_secret(SERVICE_NAME, "a@example.com").unwrap();
        assert!(vault.is_empty());
    }

    #[test]
    fn test_memory_vault_service_scoped() {
        let vault = MemoryVault::new();
        vault.set_secret("other", "a@example.com", "x").unwrap();
        assert_eq!(vault.get_secret(SERVICE_NAME, "a@example.com").unwrap(), None);
    }

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn test_keyring_roundtrip() {
        let vault = KeyringVault::new();
        let account = "modmail-test@example.com";
        vault.set_secret(SERVICE_NAME, account, "test_password").unwrap();
        assert_eq!(
            vault.get_secret(SERVICE_NAME, account).unwrap().as_deref(),
            Some("test_password")
        );
        vault.delete_secret(SERVICE_NAME, account).unwrap();
        assert_eq!(vault.get_secret(SERVICE_NAME, account).unwrap(), None);
    }
}
