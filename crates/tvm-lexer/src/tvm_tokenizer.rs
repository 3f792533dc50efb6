//! The TVM textual tokenizer (spec.md §4.1 "TVM tokenizer").

use crate::bigint::{BigInt, Width};
use crate::error::{LexError, LexErrorKind};
use crate::kernel::{LexToken, LexerCallback};
use crate::position::Position;

/// The 18 reserved TVM keywords (spec.md §4.1/§6.1), kept sorted so lookup
/// can use binary search against the token-character run just scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvmKeyword {
    Block,
    Byval,
    CcC,
    Const,
    Define,
    Exists,
    Export,
    Function,
    Global,
    Import,
    Inreg,
    LandingPad,
    Local,
    Odr,
    Phi,
    Private,
    Recursive,
    Sret,
}

/// Sorted alphabetically by source spelling.
const KEYWORDS: &[(&str, TvmKeyword)] = &[
    ("block", TvmKeyword::Block),
    ("byval", TvmKeyword::Byval),
    ("cc_c", TvmKeyword::CcC),
    ("const", TvmKeyword::Const),
    ("define", TvmKeyword::Define),
    ("exists", TvmKeyword::Exists),
    ("export", TvmKeyword::Export),
    ("function", TvmKeyword::Function),
    ("global", TvmKeyword::Global),
    ("import", TvmKeyword::Import),
    ("inreg", TvmKeyword::Inreg),
    ("landing_pad", TvmKeyword::LandingPad),
    ("local", TvmKeyword::Local),
    ("odr", TvmKeyword::Odr),
    ("phi", TvmKeyword::Phi),
    ("private", TvmKeyword::Private),
    ("recursive", TvmKeyword::Recursive),
    ("sret", TvmKeyword::Sret),
];

fn lookup_keyword(word: &str) -> Option<TvmKeyword> {
    KEYWORDS
        .binary_search_by_key(&word, |(s, _)| s)
        .ok()
        .map(|i| KEYWORDS[i].1)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TvmTokenId {
    /// A literal ASCII character token (ids below 256 in spec.md's scheme).
    Char(u8),
    Keyword(TvmKeyword),
    Identifier,
    Number,
    /// A token-character run that isn't a keyword: an operator or bare name
    /// such as `add` used in call position.
    Operator,
    Eof,
}

#[derive(Debug, Clone)]
pub enum TvmTokenValue {
    None,
    Ident(String),
    Operator(String),
    Number(BigInt),
}

pub type TvmToken = LexToken<TvmTokenId, TvmTokenValue>;

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[derive(Clone, Default)]
pub struct TvmTokenizer;

impl TvmTokenizer {
    pub fn new() -> Self {
        TvmTokenizer
    }

    fn lex_number(&self, position: &mut Position<'_>) -> Result<TvmToken, LexError> {
        position.begin();
        position.accept(); // consume '#'

        let signed = match position.current() {
            Some(b'u') => {
                position.accept();
                false
            }
            _ => true,
        };

        let width = match position.current() {
            Some(c) if Width::from_letter(c as char).is_some() => {
                position.accept();
                Width::from_letter(c as char).unwrap()
            }
            _ => {
                return Err(LexError::new(
                    position.here(),
                    LexErrorKind::MalformedLiteral("missing width letter in literal".to_string()),
                ));
            }
        };

        let base = if position.current() == Some(b'x') {
            position.accept();
            16
        } else {
            10
        };

        let negative = if position.current() == Some(b'-') {
            position.accept();
            true
        } else {
            false
        };

        let digits_start = position.token_end();
        while let Some(b) = position.current() {
            if b.is_ascii_hexdigit() {
                position.accept();
            } else {
                break;
            }
        }
        let digits = std::str::from_utf8(&position.token_bytes()[digits_start - position.token_start()..])
            .unwrap();

        let loc = position.location();
        let value = BigInt::parse(digits, base, signed, width, negative, &loc)?;
        Ok(LexToken::new(TvmTokenId::Number, loc, TvmTokenValue::Number(value)))
    }

    fn lex_identifier(&self, position: &mut Position<'_>) -> Result<TvmToken, LexError> {
        position.begin();
        position.accept(); // consume '%'

        let mut name = String::new();
        loop {
            match position.current() {
                Some(b) if is_token_char(b) => {
                    name.push(b as char);
                    position.accept();
                }
                Some(b'%') => {
                    let d1 = position.lookahead(1);
                    let d2 = position.lookahead(2);
                    match (d1, d2) {
                        (Some(d1), Some(d2)) if d1.is_ascii_digit() && d2.is_ascii_digit() => {
                            let value = (d1 - b'0') * 10 + (d2 - b'0');
                            name.push(value as char);
                            position.accept();
                            position.accept();
                            position.accept();
                        }
                        _ => break,
                    }
                }
                _ => break,
            }
        }

        if name.is_empty() {
            return Err(LexError::new(
                position.here(),
                LexErrorKind::MalformedLiteral("empty identifier".to_string()),
            ));
        }

        let loc = position.location();
        Ok(LexToken::new(TvmTokenId::Identifier, loc, TvmTokenValue::Ident(name)))
    }

    fn lex_word(&self, position: &mut Position<'_>) -> Result<TvmToken, LexError> {
        position.begin();
        while let Some(b) = position.current() {
            if is_token_char(b) {
                position.accept();
            } else {
                break;
            }
        }
        let text = position.token_text().to_string();
        let loc = position.location();
        if let Some(kw) = lookup_keyword(&text) {
            Ok(LexToken::new(TvmTokenId::Keyword(kw), loc, TvmTokenValue::None))
        } else {
            Ok(LexToken::new(TvmTokenId::Operator, loc, TvmTokenValue::Operator(text)))
        }
    }
}

impl LexerCallback for TvmTokenizer {
    type Id = TvmTokenId;
    type Value = TvmTokenValue;

    fn lex(&mut self, position: &mut Position<'_>) -> Result<TvmToken, LexError> {
        position.skip_whitespace();

        if position.at_end() {
            return Ok(LexToken::new(TvmTokenId::Eof, position.here(), TvmTokenValue::None));
        }

        match position.current().unwrap() {
            b'#' => self.lex_number(position),
            b'%' => self.lex_identifier(position),
            b if is_token_char(b) => self.lex_word(position),
            b => {
                position.begin();
                position.accept();
                Ok(LexToken::new(TvmTokenId::Char(b), position.location(), TvmTokenValue::None))
            }
        }
    }

    fn error_name(&self, token: &TvmToken) -> String {
        match &token.id {
            TvmTokenId::Char(b) => format!("'{}'", *b as char),
            TvmTokenId::Keyword(kw) => format!("{kw:?}"),
            TvmTokenId::Identifier => match &token.value {
                TvmTokenValue::Ident(s) => format!("identifier '%{s}'"),
                _ => "identifier".to_string(),
            },
            TvmTokenId::Number => "numeric literal".to_string(),
            TvmTokenId::Operator => match &token.value {
                TvmTokenValue::Operator(s) => format!("'{s}'"),
                _ => "operator".to_string(),
            },
            TvmTokenId::Eof => "end of input".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LexerKernel;
    use std::sync::Arc;

    fn tokens(src: &'static str) -> Vec<TvmToken> {
        let position = Position::new(Arc::from("t.tvm"), src.as_bytes());
        let mut kernel = LexerKernel::new(position, TvmTokenizer::new(), 2).unwrap();
        let mut out = Vec::new();
        loop {
            let tok = kernel.peek().clone();
            let done = tok.id == TvmTokenId::Eof;
            out.push(tok);
            if done {
                break;
            }
            kernel.accept().unwrap();
        }
        out
    }

    #[test]
    fn keywords_are_recognized() {
        let toks = tokens("global function local");
        assert_eq!(toks[0].id, TvmTokenId::Keyword(TvmKeyword::Global));
        assert_eq!(toks[1].id, TvmTokenId::Keyword(TvmKeyword::Function));
        assert_eq!(toks[2].id, TvmTokenId::Keyword(TvmKeyword::Local));
    }

    #[test]
    fn identifier_and_operator_tokens() {
        let toks = tokens("%foo add");
        assert_eq!(toks[0].id, TvmTokenId::Identifier);
        match &toks[0].value {
            TvmTokenValue::Ident(s) => assert_eq!(s, "foo"),
            _ => panic!("expected ident"),
        }
        assert_eq!(toks[1].id, TvmTokenId::Operator);
    }

    #[test]
    fn identifier_escape_decodes_decimal_byte() {
        let toks = tokens("%a%%46b");
        match &toks[0].value {
            TvmTokenValue::Ident(s) => assert_eq!(s, "a.b"),
            _ => panic!("expected ident"),
        }
    }

    #[test]
    fn number_literal_hex_and_negative() {
        let toks = tokens("#i32 #ux10 #i-5");
        match &toks[0].value {
            TvmTokenValue::Number(b) => {
                assert_eq!(b.as_i128(), 32);
                assert!(b.is_signed());
            }
            _ => panic!("expected number"),
        }
        match &toks[1].value {
            TvmTokenValue::Number(b) => assert_eq!(b.as_u128(), 16),
            _ => panic!("expected number"),
        }
        match &toks[2].value {
            TvmTokenValue::Number(b) => assert_eq!(b.as_i128(), -5),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn single_char_tokens_for_punctuation() {
        let toks = tokens("(%a);");
        assert_eq!(toks[0].id, TvmTokenId::Char(b'('));
        assert_eq!(toks[2].id, TvmTokenId::Char(b')'));
        assert_eq!(toks[3].id, TvmTokenId::Char(b';'));
    }
}
