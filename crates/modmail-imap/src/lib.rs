//! # modmail-imap
//!
//! IMAP4rev1 client (RFC 3501) covering the subset a mail reader needs to
//! list and read an inbox: LOGIN, SELECT, SEARCH, FETCH and LOGOUT.
//!
//! ## Layers
//!
//! - [`parser`]: sans-I/O lexer and response parser
//! - [`command`]: command serialization and tag generation
//! - [`connection::Client`]: type-state client over any async stream
//! - [`connection::Session`]: runtime state machine with timeouts on top
//!   of the client, for callers that keep one connection in a field
//!
//! ## Quick Start
//!
//! ```ignore
//! use modmail_imap::{Config, Session};
//!
//! #[tokio::main]
//! async fn main() -> modmail_imap::Result<()> {
//!     let mut session = Session::connect(&Config::new("imap.example.com")).await?;
//!     session.login("user@example.com", "password").await?;
//!     let status = session.select("INBOX").await?;
//!     println!("{} messages", status.exists);
//!
//!     for seq in session.search_all().await? {
//!         let message = session.fetch_summary_data(seq).await?;
//!         println!("{seq}: {} bytes", message.raw.len());
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── select() ──→ Selected
//!                                       ↑                          │
//!                                       └──────── close() ─────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, FetchedMessage, ImapStream, NotAuthenticated,
    Selected, Session, SessionState,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capability, Flag, Flags, MailboxStatus, ResponseCode, SeqNum, Status, Tag, Uid, UidValidity,
};
