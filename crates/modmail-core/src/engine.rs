//! The mail engine: the API front ends call.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::account::{
    Account, ConfigStore, ConnectionSettings, CredentialVault, KeyringVault, SERVICE_NAME,
    validate_account, validate_secret,
};
use crate::codec::{self, AttachmentPayload, MessageDetail, MessageSummary};
use crate::error::{Error, Result};
use crate::service::{MailBackend, MessageRef, NetworkBackend, Timeouts, smtp};
use crate::sync::{DEFAULT_REFRESH_INTERVAL, RefreshGate};

/// Settings for the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Location of the account settings file.
    pub config_path: PathBuf,
    /// Network timeouts.
    pub timeouts: Timeouts,
    /// Time between periodic refreshes.
    pub refresh_interval: Duration,
}

impl EngineConfig {
    /// Creates a configuration using the given settings file.
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            timeouts: Timeouts::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl Default for EngineConfig {
    /// Uses the per-user settings file, or `config.json` in the working
    /// directory when the platform has no config directory.
    fn default() -> Self {
        let path = ConfigStore::default_location().unwrap_or_else(|err| {
            warn!(error = %err, "falling back to working directory for config");
            PathBuf::from("config.json")
        });
        Self::new(path)
    }
}

/// Account management, refresh, message view and send.
///
/// Generic over the secret store and the network backend so tests can
/// substitute both. Account changes are serialised; mailbox operations
/// for one account never overlap.
pub struct MailEngine<V = KeyringVault, B = NetworkBackend> {
    store: ConfigStore,
    vault: V,
    backend: B,
    gate: RefreshGate,
    writer: tokio::sync::Mutex<()>,
    refresh_interval: Duration,
}

impl<V, B> std::fmt::Debug for MailEngine<V, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailEngine")
            .field("store", &self.store)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

impl MailEngine<KeyringVault, NetworkBackend> {
    /// Creates an engine backed by the system keyring and real servers.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_parts(
            config,
            KeyringVault::new(),
            NetworkBackend::new(config.timeouts),
        )
    }
}

impl<V, B> MailEngine<V, B>
where
    V: CredentialVault,
    B: MailBackend,
{
    /// Creates an engine from explicit parts.
    #[must_use]
    pub fn with_parts(config: &EngineConfig, vault: V, backend: B) -> Self {
        Self {
            store: ConfigStore::at(&config.config_path),
            vault,
            backend,
            gate: RefreshGate::new(),
            writer: tokio::sync::Mutex::new(()),
            refresh_interval: config.refresh_interval,
        }
    }

    /// The settings store.
    #[must_use]
    pub const fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The secret store.
    #[must_use]
    pub const fn vault(&self) -> &V {
        &self.vault
    }

    /// The network backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Configured time between periodic refreshes.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Lists configured accounts, ordered by address.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the settings file cannot be read.
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .store
            .load()?
            .into_iter()
            .map(|(address, settings)| Account::new(address, settings))
            .collect())
    }

    /// Looks up one account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for an unknown address.
    pub fn account(&self, address: &str) -> Result<Account> {
        self.store
            .load()?
            .remove(address)
            .map(|settings| Account::new(address, settings))
            .ok_or_else(|| Error::AccountNotFound(address.to_string()))
    }

    /// Adds an account or replaces an existing one, settings and secret
    /// together. Either both are stored or neither changes.
    ///
    /// # Errors
    ///
    /// `InvalidAccount` before anything is written; `Config` or
    /// `Credential` when storing fails.
    pub async fn add_account(
        &self,
        address: &str,
        settings: ConnectionSettings,
        secret: &str,
    ) -> Result<()> {
        let account = Account::new(address.trim(), settings);
        let mut problems = validate_account(&account).err().unwrap_or_default();
        if let Err(problem) = validate_secret(secret) {
            problems.push(problem);
        }
        if !problems.is_empty() {
            return Err(Error::InvalidAccount(problems));
        }

        let _writer = self.writer.lock().await;
        let previous = self
            .store
            .add_or_update(&account.address, account.settings.clone())?;

        if let Err(err) = self
            .vault
            .set_secret(SERVICE_NAME, &account.address, secret)
        {
            warn!(address = %account.address, error = %err, "storing secret failed, rolling back");
            let rollback = match previous {
                Some(settings) => self.store.add_or_update(&account.address, settings).map(drop),
                None => self.store.remove(&account.address).map(drop),
            };
            if let Err(rollback_err) = rollback {
                warn!(address = %account.address, error = %rollback_err, "config rollback failed");
            }
            return Err(err.into());
        }

        info!(address = %account.address, "account saved");
        Ok(())
    }

    /// Removes an account's settings and secret and cancels its running
    /// refresh.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` for an unknown address; `Config` or `Credential`
    /// when removal fails, in which case the settings are restored.
    pub async fn remove_account(&self, address: &str) -> Result<()> {
        let _writer = self.writer.lock().await;
        let settings = self
            .store
            .remove(address)?
            .ok_or_else(|| Error::AccountNotFound(address.to_string()))?;

        if let Err(err) = self.vault.delete_secret(SERVICE_NAME, address) {
            warn!(address, error = %err, "deleting secret failed, restoring account");
            if let Err(restore_err) = self.store.add_or_update(address, settings) {
                warn!(address, error = %restore_err, "config restore failed");
            }
            return Err(err.into());
        }

        self.gate.remove(address);
        info!(address, "account removed");
        Ok(())
    }

    /// Lists the newest inbox messages, waiting for any running refresh of
    /// the same account to finish first.
    ///
    /// # Errors
    ///
    /// `AccountNotFound`, `MissingSecret`, any network stage error, or
    /// `Cancelled`.
    pub async fn refresh(&self, address: &str) -> Result<Vec<MessageSummary>> {
        self.gate.run(address, self.fetch_summaries(address)).await
    }

    /// Like [`MailEngine::refresh`], but returns `None` without doing
    /// anything when a refresh of the account is already running.
    pub async fn refresh_if_idle(&self, address: &str) -> Option<Result<Vec<MessageSummary>>> {
        self.gate
            .run_if_idle(address, self.fetch_summaries(address))
            .await
    }

    /// Cancels the running refresh or message fetch for an account.
    pub fn cancel_refresh(&self, address: &str) {
        self.gate.cancel(address);
    }

    /// Fetches and parses a message by sequence number.
    ///
    /// Sequence numbers come from the latest refresh and may refer to a
    /// different message once the mailbox changes; prefer
    /// [`MailEngine::view_message_by_uid`].
    ///
    /// # Errors
    ///
    /// As for [`MailEngine::refresh`], plus `Codec` for malformed MIME.
    pub async fn view_message(&self, address: &str, id: u32) -> Result<MessageDetail> {
        self.gate
            .run(address, self.fetch_detail(address, MessageRef::Seq(id)))
            .await
    }

    /// Fetches and parses a message by UID.
    ///
    /// # Errors
    ///
    /// As for [`MailEngine::view_message`].
    pub async fn view_message_by_uid(&self, address: &str, uid: u32) -> Result<MessageDetail> {
        self.gate
            .run(address, self.fetch_detail(address, MessageRef::Uid(uid)))
            .await
    }

    /// Composes and submits a message from the account's address.
    ///
    /// The recipient list is checked before any connection is made.
    ///
    /// # Errors
    ///
    /// `InvalidRecipient`, `AccountNotFound`, `MissingSecret`, `Codec`, or
    /// a network stage error.
    pub async fn send_message(
        &self,
        address: &str,
        to: &str,
        subject: &str,
        body: &str,
        attachments: Vec<AttachmentPayload>,
    ) -> Result<()> {
        let (account, secret) = self.credentials(address)?;
        let envelope = smtp::envelope(&account.address, to)?;
        let raw = codec::build(&account.address, to, subject, body, attachments, None)?;

        self.backend
            .send(&account, &secret, &envelope, &raw)
            .await?;
        info!(address, recipients = envelope.to.len(), "message sent");
        Ok(())
    }

    async fn fetch_summaries(&self, address: &str) -> Result<Vec<MessageSummary>> {
        let (account, secret) = self.credentials(address)?;
        self.backend.fetch_summaries(&account, &secret).await
    }

    async fn fetch_detail(&self, address: &str, target: MessageRef) -> Result<MessageDetail> {
        let (account, secret) = self.credentials(address)?;
        let raw = self.backend.fetch_message(&account, &secret, target).await?;
        codec::parse(&raw)
    }

    fn credentials(&self, address: &str) -> Result<(Account, String)> {
        let account = self.account(address)?;
        let secret = self
            .vault
            .get_secret(SERVICE_NAME, address)?
            .ok_or_else(|| Error::MissingSecret(address.to_string()))?;
        Ok((account, secret))
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
    use crate::ErrorKind;
    use crate::account::MemoryVault;
    use crate::testing::{FailingVault, FakeBackend, engine_with, settings};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_and_list() {
        let (engine, _dir) = engine_with(FakeBackend::default()).await;

        let accounts = engine.list_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].address, "alice@example.com");
        assert_eq!(accounts[0].settings, settings());
        assert_eq!(
            engine
                .vault()
                .get_secret(SERVICE_NAME, "alice@example.com")
                .unwrap()
                .as_deref(),
            Some("hunter2")
        );
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_before_writing() {
        let (engine, _dir) = engine_with(FakeBackend::default()).await;

        let err = engine
            .add_account("bob", ConnectionSettings::default(), "")
            .await
            .unwrap_err();
        let Error::InvalidAccount(problems) = err else {
            panic!("expected InvalidAccount");
        };
        assert!(problems.contains(&crate::ValidationError::InvalidEmail));
        assert!(problems.contains(&crate::ValidationError::EmptyPassword));
        assert_eq!(engine.list_accounts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_overwrites() {
        let (engine, _dir) = engine_with(FakeBackend::default()).await;
        let mut changed = settings();
        changed.imap_port = 143;

        engine
            .add_account("alice@example.com", changed.clone(), "new-secret")
            .await
            .unwrap();
        assert_eq!(engine.account("alice@example.com").unwrap().settings, changed);
        assert_eq!(
            engine
                .vault()
                .get_secret(SERVICE_NAME, "alice@example.com")
                .unwrap()
                .as_deref(),
            Some("new-secret")
        );
    }

    #[tokio::test]
    async fn test_vault_failure_rolls_back_new_account() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("config.json"));
        let vault = FailingVault::default();
        vault.fail_set(true);
        let engine = MailEngine::with_parts(&config, vault, FakeBackend::default());

        let err = engine
            .add_account("alice@example.com", settings(), "hunter2")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Credential);
        assert!(engine.list_accounts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vault_failure_restores_previous_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("config.json"));
        let engine = MailEngine::with_parts(&config, FailingVault::default(), FakeBackend::default());
        engine
            .add_account("alice@example.com", settings(), "hunter2")
            .await
            .unwrap();

        engine.vault().fail_set(true);
        let mut changed = settings();
        changed.smtp_port = 465;
        engine
            .add_account("alice@example.com", changed, "other")
            .await
            .unwrap_err();
        assert_eq!(engine.account("alice@example.com").unwrap().settings, settings());
    }

    #[tokio::test]
    async fn test_remove_account() {
        let (engine, _dir) = engine_with(FakeBackend::default()).await;

        engine.remove_account("alice@example.com").await.unwrap();
        assert!(engine.list_accounts().unwrap().is_empty());
        assert!(engine.vault().is_empty());

        let err = engine.remove_account("alice@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotFound);
    }

    #[tokio::test]
    async fn test_remove_restores_config_when_vault_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("config.json"));
        let engine = MailEngine::with_parts(&config, FailingVault::default(), FakeBackend::default());
        engine
            .add_account("alice@example.com", settings(), "hunter2")
            .await
            .unwrap();

        engine.vault().fail_delete(true);
        let err = engine.remove_account("alice@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Credential);
        assert_eq!(engine.list_accounts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_unknown_and_missing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("config.json"));
        let engine = MailEngine::with_parts(&config, MemoryVault::new(), FakeBackend::default());

        let err = engine.refresh("nobody@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotFound);

        engine
            .store()
            .add_or_update("alice@example.com", settings())
            .unwrap();
        let err = engine.refresh("alice@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSecret);
        assert_eq!(engine.backend().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_never_overlap() {
        let (engine, _dir) = engine_with(FakeBackend::with_delay(Duration::from_secs(2))).await;
        let engine = Arc::new(engine);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.refresh("alice@example.com").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(engine.backend().calls(), 4);
        assert_eq!(engine.backend().max_concurrent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_if_idle_coalesces() {
        let (engine, _dir) = engine_with(FakeBackend::with_delay(Duration::from_secs(2))).await;
        let engine = Arc::new(engine);

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh("alice@example.com").await })
        };
        tokio::task::yield_now().await;

        assert!(engine.refresh_if_idle("alice@example.com").await.is_none());
        running.await.unwrap().unwrap();
        assert_eq!(engine.backend().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_cancels_running_refresh() {
        let (engine, _dir) = engine_with(FakeBackend::with_delay(Duration::from_secs(60))).await;
        let engine = Arc::new(engine);

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh("alice@example.com").await })
        };
        tokio::task::yield_now().await;

        engine.remove_account("alice@example.com").await.unwrap();
        let err = running.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(engine.gate.tracked(), 0);
    }

    #[tokio::test]
    async fn test_view_message() {
        let raw = codec::build(
            "bob@example.com",
            "alice@example.com",
            "Report",
            "See attached",
            vec![AttachmentPayload::new("report.pdf", vec![1, 2, 3])],
            None,
        )
        .unwrap();
        let backend = FakeBackend::default().with_message(MessageRef::Uid(77), raw);
        let (engine, _dir) = engine_with(backend).await;

        let detail = engine
            .view_message_by_uid("alice@example.com", 77)
            .await
            .unwrap();
        assert_eq!(detail.body, "See attached");
        assert_eq!(detail.attachment_filenames, vec!["report.pdf"]);

        let err = engine.view_message("alice@example.com", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_send_message() {
        let (engine, _dir) = engine_with(FakeBackend::default()).await;

        engine
            .send_message(
                "alice@example.com",
                "Bob <bob@example.com>",
                "Hi",
                "Hello",
                vec![AttachmentPayload::new("report.pdf", b"%PDF".to_vec())],
            )
            .await
            .unwrap();

        let sent = engine.backend().sent();
        assert_eq!(sent.len(), 1);
        let (recipients, raw) = &sent[0];
        assert_eq!(recipients, &vec!["bob@example.com".to_string()]);
        let detail = codec::parse(raw).unwrap();
        assert_eq!(detail.headers["from"], "alice@example.com");
        assert_eq!(detail.attachment_filenames, vec!["report.pdf"]);
    }

    #[tokio::test]
    async fn test_send_rejects_recipients_before_connecting() {
        let (engine, _dir) = engine_with(FakeBackend::default()).await;

        let err = engine
            .send_message("alice@example.com", " ", "Hi", "Hello", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRecipient);
        assert!(engine.backend().sent().is_empty());
    }
}
