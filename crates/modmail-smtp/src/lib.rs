//! # modmail-smtp
//!
//! SMTP submission client (RFC 5321) for sending one message at a time
//! from an authenticated account.
//!
//! ## Features
//!
//! - **Type-state client**: AUTH and mail transactions are only callable
//!   in the states where they are valid
//! - **TLS**: implicit TLS on port 465, STARTTLS everywhere else
//! - **Authentication**: PLAIN, or LOGIN when that is all a server offers
//! - **Timed session**: [`Session`] runs every step under a deadline and
//!   always ends with QUIT when the connection allows it
//!
//! ## Quick Start
//!
//! ```ignore
//! use modmail_smtp::{Config, Envelope, Address, Session, parse_recipients};
//!
//! #[tokio::main]
//! async fn main() -> modmail_smtp::Result<()> {
//!     let mut session = Session::connect(&Config::new("smtp.example.com", 587)).await?;
//!     session.start_tls().await?;
//!     session.authenticate("user@example.com", "password").await?;
//!
//!     let envelope = Envelope::new(
//!         Address::new("user@example.com")?,
//!         parse_recipients("Friend <friend@example.com>")?,
//!     )?;
//!     session.send(&envelope, b"Subject: Test\r\n\r\nHello\r\n").await?;
//!     session.close().await;
//!     Ok(())
//! }
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

pub use connection::{Authenticated, Client, Config, Connected, ServerInfo, Session, SessionState};
pub use error::{Error, Result};
pub use types::{
    Address, AuthMechanism, Envelope, Extension, Mailbox, Reply, ReplyCode, parse_recipients,
};
