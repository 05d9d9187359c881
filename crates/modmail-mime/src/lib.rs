//! # modmail-mime
//!
//! MIME message parsing and generation for modmail.
//!
//! ## Features
//!
//! - **Message parsing**: headers, nested multiparts flattened into leaf parts
//! - **Message generation**: `multipart/mixed` with a text part and attachments
//! - **Encoding/Decoding**: Base64, Quoted-Printable, RFC 2047 words, RFC 2231 parameters
//! - **Charsets**: UTF-8, US-ASCII, ISO-8859-1 and Windows-1252
//!
//! ## Quick Start
//!
//! ### Parsing
//!
//! ```ignore
//! use modmail_mime::Message;
//!
//! let message = Message::parse(raw_bytes)?;
//! println!("Subject: {}", message.subject().unwrap_or_default());
//! println!("Body: {}", message.body_text()?);
//! for name in message.attachment_filenames() {
//!     println!("Attachment: {name}");
//! }
//! ```
//!
//! ### Building
//!
//! ```ignore
//! use modmail_mime::{Attachment, MessageBuilder};
//!
//! let raw = MessageBuilder::new()
//!     .from("alice@example.com")
//!     .to("bob@example.com")
//!     .subject("Quarterly numbers")
//!     .text_body("Report attached.")
//!     .attach(Attachment::new("report.pdf", std::fs::read("report.pdf")?))
//!     .build()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use builder::{Attachment, MessageBuilder};
pub use content_type::{ContentDisposition, ContentType};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{MAX_DEPTH, Message, Part, TransferEncoding};
