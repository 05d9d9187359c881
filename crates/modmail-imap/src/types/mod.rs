//! Core IMAP types.
//!
//! Identifiers, flags, status keywords, response codes and the mailbox
//! snapshot returned by SELECT.

#![allow(clippy::missing_const_for_fn)]

mod flags;
mod identifiers;
mod status;

pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use status::{Capability, MailboxStatus, ResponseCode, Status};
