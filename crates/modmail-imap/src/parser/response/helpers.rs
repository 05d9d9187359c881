//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Flag, Flags, ResponseCode, SeqNum, Uid, UidValidity};
use crate::Result;

/// Parses a bracketed response code.
///
/// Codes with a malformed or zero argument degrade to
/// [`ResponseCode::Other`] instead of failing the whole response.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_ascii_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "UIDNEXT" => read_code_number(lexer)
            .and_then(Uid::new)
            .map_or_else(|| ResponseCode::Other(upper.clone()), ResponseCode::UidNext),
        "UIDVALIDITY" => read_code_number(lexer)
            .and_then(UidValidity::new)
            .map_or_else(
                || ResponseCode::Other(upper.clone()),
                ResponseCode::UidValidity,
            ),
        "UNSEEN" => read_code_number(lexer)
            .and_then(SeqNum::new)
            .map_or_else(|| ResponseCode::Other(upper.clone()), ResponseCode::Unseen),
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?)
        }
        _ => ResponseCode::Other(atom.to_ascii_uppercase()),
    };

    // Skip any arguments not consumed above.
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

fn read_code_number(lexer: &mut Lexer<'_>) -> Option<u32> {
    if lexer.peek() != Some(b' ') {
        return None;
    }
    lexer.advance();
    match lexer.next_token() {
        Ok(Token::Number(n)) => Some(n),
        _ => None,
    }
}

/// Parses space-separated capability atoms.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => {}
            token => {
                return Err(lexer.error(&format!("unexpected token in flag list: {token:?}")));
            }
        }
    }

    Ok(flags)
}

/// Parses the numbers of a SEARCH response.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<SeqNum>> {
    let mut nums = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Number(n) = lexer.next_token()?
            && let Some(seq) = SeqNum::new(n)
        {
            nums.push(seq);
        }
    }

    Ok(nums)
}

/// Reads text until CRLF, consuming the CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();
    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end + 2);
    String::from_utf8_lossy(&remaining[..end]).into_owned()
}
