//! Sans-I/O parser for IMAP server responses.
//!
//! The lexer splits raw bytes into tokens; the response parser builds
//! [`Response`] values from them. Both operate on one complete response
//! as delivered by the framed stream, literals included.
//!
//! ```
//! use modmail_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, UntaggedResponse};
