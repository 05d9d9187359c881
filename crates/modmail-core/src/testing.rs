//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use modmail_smtp::Envelope;

use crate::account::{
    Account, ConnectionSettings, CredentialError, CredentialResult, CredentialVault, MemoryVault,
};
use crate::codec::MessageSummary;
use crate::engine::{EngineConfig, MailEngine};
use crate::error::{Error, Result};
use crate::service::{MailBackend, MessageRef};

pub(crate) fn settings() -> ConnectionSettings {
    ConnectionSettings::new("smtp.example.com", 587, "imap.example.com", 993)
}

/// Engine with `alice@example.com` / `hunter2` already added.
pub(crate) async fn engine_with(
    backend: FakeBackend,
) -> (MailEngine<MemoryVault, FakeBackend>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(dir.path().join("config.json"));
    let engine = MailEngine::with_parts(&config, MemoryVault::new(), backend);
    engine
        .add_account("alice@example.com", settings(), "hunter2")
        .await
        .unwrap();
    (engine, dir)
}

/// Backend that answers from memory after an optional delay.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    messages: HashMap<MessageRef, Vec<u8>>,
    sent: Mutex<Vec<(Vec<String>, Vec<u8>)>>,
}

impl FakeBackend {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn with_message(mut self, target: MessageRef, raw: Vec<u8>) -> Self {
        self.messages.insert(target, raw);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<(Vec<String>, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MailBackend for FakeBackend {
    async fn fetch_summaries(&self, _account: &Account, _secret: &str) -> Result<Vec<MessageSummary>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active);
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        Ok(vec![MessageSummary {
            id: u32::try_from(call).unwrap_or(u32::MAX),
            uid: None,
            uid_validity: None,
            read: false,
            date: None,
            from: "bob@example.com".to_string(),
            subject: "Hello".to_string(),
        }])
    }

    async fn fetch_message(
        &self,
        _account: &Account,
        _secret: &str,
        target: MessageRef,
    ) -> Result<Vec<u8>> {
        self.messages
            .get(&target)
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("no message with {target}")))
    }

    async fn send(
        &self,
        _account: &Account,
        _secret: &str,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<()> {
        let recipients = envelope.to.iter().map(|a| a.as_str().to_string()).collect();
        self.sent.lock().unwrap().push((recipients, message.to_vec()));
        Ok(())
    }
}

/// Memory vault whose writes and deletes can be made to fail.
#[derive(Debug, Default)]
pub(crate) struct FailingVault {
    inner: MemoryVault,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
}

impl FailingVault {
    pub(crate) fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

impl CredentialVault for FailingVault {
    fn set_secret(&self, service: &str, account: &str, secret: &str) -> CredentialResult<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("locked".into()));
        }
        self.inner.set_secret(service, account, secret)
    }

    fn get_secret(&self, service: &str, account: &str) -> CredentialResult<Option<String>> {
        self.inner.get_secret(service, account)
    }

    fn delete_secret(&self, service: &str, account: &str) -> CredentialResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("locked".into()));
        }
        self.inner.delete_secret(service, account)
    }
}
