//! FETCH response parsing.

use crate::Result;
use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;

use super::helpers::parse_flag_list;
use super::types::FetchItem;

/// Parses the parenthesized item list of a FETCH response.
///
/// Items this client does not model are skipped token by token, so a
/// literal inside one of them cannot desynchronize the parser.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => match name.to_ascii_uppercase().as_str() {
                "FLAGS" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Flags(parse_flag_list(lexer)?));
                }
                "UID" => {
                    lexer.expect_space()?;
                    let n = lexer.read_number()?;
                    let uid = Uid::new(n).ok_or_else(|| lexer.error("UID cannot be 0"))?;
                    items.push(FetchItem::Uid(uid));
                }
                "RFC822.SIZE" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Rfc822Size(lexer.read_number()?));
                }
                "INTERNALDATE" => {
                    lexer.expect_space()?;
                    match lexer.next_token()? {
                        Token::QuotedString(date) => items.push(FetchItem::InternalDate(date)),
                        Token::Nil => {}
                        token => {
                            return Err(
                                lexer.error(&format!("expected INTERNALDATE, got {token:?}"))
                            );
                        }
                    }
                }
                "RFC822" => {
                    lexer.expect_space()?;
                    items.push(FetchItem::Rfc822(lexer.read_nstring_bytes()?));
                }
                "BODY" if lexer.peek() == Some(b'[') => {
                    let (section, origin) = parse_section_and_origin(lexer)?;
                    lexer.expect_space()?;
                    let data = lexer.read_nstring_bytes()?;
                    items.push(FetchItem::Body {
                        section,
                        origin,
                        data,
                    });
                }
                _ => skip_fetch_item(lexer)?,
            },
            Token::Eof => return Err(lexer.error("unterminated FETCH item list")),
            token => return Err(lexer.error(&format!("unexpected token in FETCH: {token:?}"))),
        }
    }

    Ok(items)
}

/// Parses `[section]` and an optional `<origin>` after BODY.
///
/// The section is read bytewise because it may contain a parenthesized
/// header list (`HEADER.FIELDS (FROM DATE)`).
fn parse_section_and_origin(lexer: &mut Lexer<'_>) -> Result<(String, Option<u32>)> {
    let (section, _) = skip_section(lexer)?;

    let mut origin = None;
    if lexer.peek() == Some(b'<') {
        lexer.advance();
        let mut digits = String::new();
        while let Some(b) = lexer.peek() {
            lexer.advance();
            if b == b'>' {
                break;
            }
            digits.push(char::from(b));
        }
        origin = digits.parse().ok();
    }

    Ok((section, origin))
}

/// Consumes `[...]`, returning its content. The bool is false when no
/// section was present.
fn skip_section(lexer: &mut Lexer<'_>) -> Result<(String, bool)> {
    if lexer.peek() != Some(b'[') {
        return Ok((String::new(), false));
    }
    lexer.advance();

    let mut section = Vec::new();
    loop {
        match lexer.advance() {
            Some(b']') => break,
            Some(b) => section.push(b),
            None => return Err(lexer.error("unterminated section")),
        }
    }
    Ok((String::from_utf8_lossy(&section).into_owned(), true))
}

/// Skips the value of an unmodelled item, including any section suffix.
fn skip_fetch_item(lexer: &mut Lexer<'_>) -> Result<()> {
    skip_section(lexer)?;
    if lexer.peek() == Some(b'<') {
        while let Some(b) = lexer.advance() {
            if b == b'>' {
                break;
            }
        }
    }
    lexer.expect_space()?;

    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| lexer.error("unbalanced parenthesis"))?;
            }
            Token::Eof | Token::Crlf => return Err(lexer.error("unterminated FETCH item")),
            _ => {}
        }
        if depth == 0 {
            return Ok(());
        }
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
    use crate::types::Flag;

    fn parse(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_response(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn test_summary_items() {
        let items = parse(
            b"(UID 4242 FLAGS (\\Seen) INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" BODY[] {5}\r\nhello)",
        );
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], FetchItem::Uid(Uid::new(4242).unwrap()));
        match &items[1] {
            FetchItem::Flags(flags) => assert!(flags.contains(&Flag::Seen)),
            other => panic!("expected flags, got {other:?}"),
        }
        assert_eq!(
            items[2],
            FetchItem::InternalDate("17-Jul-1996 02:44:25 -0700".to_string())
        );
        assert_eq!(
            items[3],
            FetchItem::Body {
                section: String::new(),
                origin: None,
                data: Some(b"hello".to_vec()),
            }
        );
    }

    #[test]
    fn test_rfc822_literal_with_parens_inside() {
        let items = parse(b"(RFC822 {8}\r\n(a) b)\r\n)");
        assert_eq!(items, vec![FetchItem::Rfc822(Some(b"(a) b)\r\n".to_vec()))]);
    }

    #[test]
    fn test_rfc822_nil_and_quoted() {
        assert_eq!(parse(b"(RFC822 NIL)"), vec![FetchItem::Rfc822(None)]);
        assert_eq!(
            parse(b"(RFC822 \"short\")"),
            vec![FetchItem::Rfc822(Some(b"short".to_vec()))]
        );
    }

    #[test]
    fn test_body_section_with_header_list_and_origin() {
        let items = parse(b"(BODY[HEADER.FIELDS (FROM)]<0> {3}\r\nabc)");
        assert_eq!(
            items,
            vec![FetchItem::Body {
                section: "HEADER.FIELDS (FROM)".to_string(),
                origin: Some(0),
                data: Some(b"abc".to_vec()),
            }]
        );
    }

    #[test]
    fn test_unknown_items_skipped() {
        let items = parse(
            b"(MODSEQ (12345) X-GM-LABELS (\\Inbox {3}\r\nfoo) ENVELOPE (NIL \"s\" NIL) UID 9)",
        );
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(9).unwrap())]);
    }

    #[test]
    fn test_bodystructure_is_skipped() {
        let items = parse(b"(BODY (\"text\" \"plain\" NIL NIL NIL \"7bit\" 5 1) RFC822.SIZE 5)");
        assert_eq!(items, vec![FetchItem::Rfc822Size(5)]);
    }

    #[test]
    fn test_zero_uid_rejected() {
        assert!(parse_fetch_response(&mut Lexer::new(b"(UID 0)")).is_err());
    }

    #[test]
    fn test_unterminated_list() {
        assert!(parse_fetch_response(&mut Lexer::new(b"(UID 1")).is_err());
    }
}
