//! IMAP response parser.

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod helpers;
mod types;

pub use types::{FetchItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_capability_data, parse_flag_list, parse_response_code, parse_search_response,
    read_text_until_crlf,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response, literals included.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            Token::Number(n) => Self::parse_tagged(&mut lexer, &n.to_string()),
            token => Err(Error::Parse {
                position: 0,
                message: format!("expected *, + or tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let untagged = match lexer.next_token()? {
            Token::Atom(s) => match s.to_ascii_uppercase().as_str() {
                "OK" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Ok { code, text }
                }
                "NO" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::No { code, text }
                }
                "BAD" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Bad { code, text }
                }
                "PREAUTH" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::PreAuth { code, text }
                }
                "BYE" => {
                    let (code, text) = Self::parse_resp_text(lexer)?;
                    UntaggedResponse::Bye { code, text }
                }
                "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
                "FLAGS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Flags(parse_flag_list(lexer)?)
                }
                "SEARCH" => UntaggedResponse::Search(parse_search_response(lexer)?),
                other => UntaggedResponse::Other(other.to_string()),
            },
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                match keyword.to_ascii_uppercase().as_str() {
                    "EXISTS" => UntaggedResponse::Exists(n),
                    "RECENT" => UntaggedResponse::Recent(n),
                    "EXPUNGE" => UntaggedResponse::Expunge(nonzero_seq(lexer, n)?),
                    "FETCH" => {
                        let seq = nonzero_seq(lexer, n)?;
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_response(lexer)?;
                        UntaggedResponse::Fetch { seq, items }
                    }
                    other => UntaggedResponse::Other(other.to_string()),
                }
            }
            token => {
                return Err(lexer.error(&format!(
                    "unexpected token in untagged response: {token:?}"
                )));
            }
        };

        Ok(Response::Untagged(untagged))
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }
        let text = read_text_until_crlf(lexer);
        Response::Continuation {
            text: (!text.is_empty()).then_some(text),
        }
    }

    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("invalid status: {s}"))),
        }
    }

    /// Parses `[code] text`. The text may be missing entirely
    /// (`A0001 OK\r\n`), which some servers send.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        Ok((code, read_text_until_crlf(lexer)))
    }
}

fn nonzero_seq(lexer: &Lexer<'_>, n: u32) -> Result<SeqNum> {
    SeqNum::new(n).ok_or_else(|| lexer.error("sequence number cannot be 0"))
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
    use crate::types::{Capability, Flag, Uid, UidValidity};

    #[test]
    fn test_greeting() {
        let response = ResponseParser::parse(b"* OK IMAP4rev1 ready\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Ok {
                code: None,
                text: "IMAP4rev1 ready".to_string(),
            })
        );
    }

    #[test]
    fn test_greeting_with_capability_code() {
        let response =
            ResponseParser::parse(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] hi\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::Capability(caps)),
                text,
            }) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::Auth("PLAIN".to_string())));
                assert_eq!(text, "hi");
            }
            other => panic!("expected OK with capabilities, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_no() {
        let response =
            ResponseParser::parse(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
                .unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: Tag::new("A0001"),
                status: Status::No,
                code: Some(ResponseCode::Other("AUTHENTICATIONFAILED".to_string())),
                text: "Invalid credentials".to_string(),
            }
        );
    }

    #[test]
    fn test_tagged_without_text() {
        let response = ResponseParser::parse(b"A0002 OK\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged { status: Status::Ok, ref text, .. } if text.is_empty()
        ));
    }

    #[test]
    fn test_select_data() {
        assert_eq!(
            ResponseParser::parse(b"* 172 EXISTS\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Exists(172))
        );
        assert_eq!(
            ResponseParser::parse(b"* 1 RECENT\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Recent(1))
        );
        assert_eq!(
            ResponseParser::parse(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::UidValidity(
                    UidValidity::new(3857529045).unwrap()
                )),
                text: "UIDs valid".to_string(),
            })
        );
        assert_eq!(
            ResponseParser::parse(b"* OK [UIDNEXT 4392] Predicted next UID\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::UidNext(Uid::new(4392).unwrap())),
                text: "Predicted next UID".to_string(),
            })
        );
    }

    #[test]
    fn test_permanent_flags_with_wildcard() {
        let response =
            ResponseParser::parse(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n")
                .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok {
                code: Some(ResponseCode::PermanentFlags(flags)),
                ..
            }) => {
                assert!(flags.contains(&Flag::Seen));
                assert!(flags.contains(&Flag::Keyword("\\*".to_string())));
            }
            other => panic!("expected PERMANENTFLAGS, got {other:?}"),
        }
    }

    #[test]
    fn test_search() {
        let response = ResponseParser::parse(b"* SEARCH 2 3 6\r\n").unwrap();
        let expected: Vec<SeqNum> = [2, 3, 6].into_iter().filter_map(SeqNum::new).collect();
        assert_eq!(response, Response::Untagged(UntaggedResponse::Search(expected)));

        let empty = ResponseParser::parse(b"* SEARCH\r\n").unwrap();
        assert_eq!(empty, Response::Untagged(UntaggedResponse::Search(vec![])));
    }

    #[test]
    fn test_fetch() {
        let response =
            ResponseParser::parse(b"* 12 FETCH (FLAGS (\\Seen) RFC822 {2}\r\nhi)\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 12);
                assert_eq!(items.len(), 2);
                assert_eq!(items[1], FetchItem::Rfc822(Some(b"hi".to_vec())));
            }
            other => panic!("expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_untagged_is_not_an_error() {
        assert_eq!(
            ResponseParser::parse(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other("LIST".to_string()))
        );
        assert_eq!(
            ResponseParser::parse(b"* 3 XYZZY\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other("XYZZY".to_string()))
        );
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ Ready\r\n").unwrap(),
            Response::Continuation {
                text: Some("Ready".to_string())
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation { text: None }
        );
    }

    #[test]
    fn test_bye() {
        let response = ResponseParser::parse(b"* BYE Autologout; idle too long\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Bye { .. })
        ));
    }

    #[test]
    fn test_garbage() {
        assert!(ResponseParser::parse(b"(((\r\n").is_err());
        assert!(ResponseParser::parse(b"A1 MAYBE\r\n").is_err());
    }
}
