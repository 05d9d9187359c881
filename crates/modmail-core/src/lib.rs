//! # modmail-core
//!
//! The engine behind the `modmail` client.
//!
//! This crate provides:
//! - Account management (settings file plus a secret vault)
//! - Message composition and parsing
//! - IMAP inbox listing and SMTP submission, one scoped session per call
//! - Refresh scheduling with at most one mailbox operation per account
//!
//! ```ignore
//! use modmail_core::{EngineConfig, MailEngine};
//!
//! let engine = MailEngine::new(&EngineConfig::default());
//! for summary in engine.refresh("alice@example.com").await? {
//!     println!("{} {}", summary.from, summary.subject);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod codec;
mod engine;
mod error;
pub mod service;
pub mod sync;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use account::credentials;
pub use account::{
    Account, ConfigError, ConfigStore, ConnectionSettings, CredentialError, CredentialResult,
    CredentialVault, KeyringVault, MemoryVault, SERVICE_NAME, ValidationError, ValidationResult,
    validate_account,
};
pub use codec::{AttachmentPayload, MessageDetail, MessageSummary};
pub use engine::{EngineConfig, MailEngine};
pub use error::{Error, ErrorKind, Result};
pub use service::{MailBackend, MessageRef, NetworkBackend, Timeouts};
pub use sync::{RefreshGate, SyncEvent, SyncHandle, SyncScheduler, Trigger};
