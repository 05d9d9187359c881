//! End-to-end checks of the engine API with an in-memory mailbox.

#![allow(clippy::unwrap_used)]

use std::sync::Mutex;

use modmail_core::{
    Account, AttachmentPayload, ConnectionSettings, CredentialVault, EngineConfig, ErrorKind,
    MailBackend, MailEngine, MemoryVault, MessageRef, MessageSummary, Result, SERVICE_NAME, codec,
};
use modmail_smtp::Envelope;

/// A mailbox that stores what is sent to it and lists it back.
#[derive(Default)]
struct LoopbackMailbox {
    messages: Mutex<Vec<Vec<u8>>>,
}

impl MailBackend for LoopbackMailbox {
    async fn fetch_summaries(&self, account: &Account, secret: &str) -> Result<Vec<MessageSummary>> {
        assert_eq!(account.settings.imap_server, "imap.example.com");
        assert_eq!(secret, "hunter2");

        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .enumerate()
            .rev()
            .take(20)
            .map(|(i, raw)| {
                let detail = codec::parse(raw).unwrap();
                MessageSummary {
                    id: u32::try_from(i + 1).unwrap(),
                    uid: None,
                    uid_validity: None,
                    read: false,
                    date: None,
                    from: detail.headers.get("from").cloned().unwrap_or_default(),
                    subject: detail.headers.get("subject").cloned().unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn fetch_message(
        &self,
        _account: &Account,
        _secret: &str,
        target: MessageRef,
    ) -> Result<Vec<u8>> {
        let MessageRef::Seq(n) = target else {
            return Err(modmail_core::Error::Protocol("UIDs not supported".into()));
        };
        let messages = self.messages.lock().unwrap();
        usize::try_from(n)
            .ok()
            .and_then(|n| messages.get(n.checked_sub(1)?))
            .cloned()
            .ok_or_else(|| modmail_core::Error::Protocol(format!("no message {n}")))
    }

    async fn send(
        &self,
        _account: &Account,
        _secret: &str,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<()> {
        assert!(!envelope.to.is_empty());
        self.messages.lock().unwrap().push(message.to_vec());
        Ok(())
    }
}

fn settings() -> ConnectionSettings {
    ConnectionSettings::new("smtp.example.com", 587, "imap.example.com", 993)
}

async fn engine(dir: &tempfile::TempDir) -> MailEngine<MemoryVault, LoopbackMailbox> {
    let config = EngineConfig::new(dir.path().join("modern-mail/config.json"));
    let engine = MailEngine::with_parts(&config, MemoryVault::new(), LoopbackMailbox::default());
    engine
        .add_account("alice@example.com", settings(), "hunter2")
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn added_account_is_listed_and_secret_stored() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;

    let accounts = engine.list_accounts().unwrap();
    assert_eq!(accounts, vec![Account::new("alice@example.com", settings())]);
    assert_eq!(
        engine
            .vault()
            .get_secret(SERVICE_NAME, "alice@example.com")
            .unwrap()
            .as_deref(),
        Some("hunter2")
    );

    let json = std::fs::read_to_string(dir.path().join("modern-mail/config.json")).unwrap();
    assert!(!json.contains("hunter2"));
}

#[tokio::test]
async fn empty_mailbox_refreshes_to_empty_list() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;

    assert!(engine.refresh("alice@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn sent_message_can_be_listed_and_viewed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;

    engine
        .send_message(
            "alice@example.com",
            "bob@example.com",
            "Hi",
            "Hello",
            vec![AttachmentPayload::new("report.pdf", b"%PDF-1.7".to_vec())],
        )
        .await
        .unwrap();

    let summaries = engine.refresh("alice@example.com").await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].subject, "Hi");
    assert_eq!(summaries[0].from, "alice@example.com");

    let detail = engine
        .view_message("alice@example.com", summaries[0].id)
        .await
        .unwrap();
    assert_eq!(detail.body, "Hello");
    assert_eq!(detail.attachment_filenames, vec!["report.pdf"]);
}

#[tokio::test]
async fn refresh_lists_newest_twenty_first() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;

    for n in 1..=23 {
        engine
            .send_message(
                "alice@example.com",
                "bob@example.com",
                &format!("message {n}"),
                "body",
                Vec::new(),
            )
            .await
            .unwrap();
    }

    let summaries = engine.refresh("alice@example.com").await.unwrap();
    assert_eq!(summaries.len(), 20);
    assert_eq!(summaries[0].id, 23);
    assert_eq!(summaries[0].subject, "message 23");
    assert_eq!(summaries[19].id, 4);
}

#[tokio::test]
async fn removed_account_is_gone_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir).await;

    engine.remove_account("alice@example.com").await.unwrap();
    assert!(engine.list_accounts().unwrap().is_empty());
    assert!(engine.vault().is_empty());

    let err = engine.refresh("alice@example.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccountNotFound);
}
