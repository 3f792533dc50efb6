//! The surface-language tokenizer (spec.md §4.1 "Surface tokenizer").
//!
//! The surface language's parser and semantic analyzer are out of scope
//! (spec.md §1 Non-goals); this module exists because the shared lexing
//! kernel's bracket-balanced capture is explicitly part of the in-scope
//! core and is exercised end-to-end by spec.md's S1 scenario.

use crate::error::{LexError, LexErrorKind};
use crate::kernel::{LexToken, LexerCallback};
use crate::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BracketKind {
    Paren,
    Square,
    Brace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceTokenId {
    Char(u8),
    /// Two-or-more-character compound operators.
    Compound(&'static str),
    Identifier,
    Number,
    BracketGroup(BracketKind),
    Eof,
}

#[derive(Debug, Clone)]
pub enum SurfaceTokenValue {
    None,
    Text(String),
    /// The captured inner text of a bracket group, with the backing
    /// buffer's lifetime guaranteed by the token holding a borrowed slice
    /// via `Text` (the "handle that keeps the backing buffer alive" in
    /// spec.md's payload description is simply the owned `String` here,
    /// since `tvm-lexer` lexes directly from an owned source string).
    Bracket(String),
}

pub type SurfaceToken = LexToken<SurfaceTokenId, SurfaceTokenValue>;

const COMPOUND_OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "->", "=>", "-:", "-&&", "-&", "::", ":&&", ":&", ":>",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[derive(Clone, Default)]
pub struct SurfaceTokenizer;

impl SurfaceTokenizer {
    pub fn new() -> Self {
        SurfaceTokenizer
    }

    fn lex_number(&self, position: &mut Position<'_>) -> SurfaceToken {
        position.begin();
        while let Some(b) = position.current() {
            if b.is_ascii_digit() || b == b'.' {
                position.accept();
            } else {
                break;
            }
        }
        let text = position.token_text().to_string();
        LexToken::new(SurfaceTokenId::Number, position.location(), SurfaceTokenValue::Text(text))
    }

    fn lex_identifier(&self, position: &mut Position<'_>) -> SurfaceToken {
        position.begin();
        position.accept();
        while let Some(b) = position.current() {
            if is_ident_continue(b) {
                position.accept();
            } else {
                break;
            }
        }
        let text = position.token_text().to_string();
        LexToken::new(SurfaceTokenId::Identifier, position.location(), SurfaceTokenValue::Text(text))
    }

    fn lex_compound(&self, position: &mut Position<'_>) -> Option<SurfaceToken> {
        for op in COMPOUND_OPERATORS {
            let bytes = op.as_bytes();
            let matches = bytes
                .iter()
                .enumerate()
                .all(|(i, b)| position.lookahead(i) == Some(*b));
            if matches {
                position.begin();
                for _ in 0..bytes.len() {
                    position.accept();
                }
                return Some(LexToken::new(
                    SurfaceTokenId::Compound(op),
                    position.location(),
                    SurfaceTokenValue::None,
                ));
            }
        }
        None
    }

    /// Capture a bracket group starting at the opening delimiter.
    ///
    /// Tracks three depth counters (brace/square/round); while the brace
    /// depth is nonzero the square and round counters are suspended, so a
    /// stray unmatched `)` inside a `{ ... }` block (e.g. `{ ) }`) is
    /// legal. A backslash escapes the following byte everywhere in the
    /// capture. Unmatched closers and EOF before the matching close are
    /// fatal lex errors.
    fn capture_bracket_group(
        &self,
        position: &mut Position<'_>,
        kind: BracketKind,
    ) -> Result<SurfaceToken, LexError> {
        position.begin();
        let (open, close) = match kind {
            BracketKind::Paren => (b'(', b')'),
            BracketKind::Square => (b'[', b']'),
            BracketKind::Brace => (b'{', b'}'),
        };
        debug_assert_eq!(position.current(), Some(open));
        position.accept();

        let mut brace_depth: i32 = 0;
        let mut square_depth: i32 = 0;
        let mut round_depth: i32 = 0;
        match kind {
            BracketKind::Paren => round_depth = 1,
            BracketKind::Square => square_depth = 1,
            BracketKind::Brace => brace_depth = 1,
        }

        let inner_start = position.token_end();
        loop {
            let Some(b) = position.current() else {
                return Err(LexError::new(
                    position.here(),
                    LexErrorKind::UnterminatedBracketGroup,
                ));
            };

            if b == b'\\' {
                position.accept();
                if position.at_end() {
                    return Err(LexError::new(
                        position.here(),
                        LexErrorKind::UnterminatedEscape,
                    ));
                }
                position.accept();
                continue;
            }

            match b {
                b'{' => brace_depth += 1,
                b'}' => {
                    brace_depth -= 1;
                    if brace_depth == 0 && matches!(kind, BracketKind::Brace) {
                        let inner_end = position.token_end();
                        let inner = std::str::from_utf8(
                            &position.token_bytes()[inner_start - position.token_start()
                                ..inner_end - position.token_start()],
                        )
                        .unwrap()
                        .to_string();
                        position.accept();
                        return Ok(LexToken::new(
                            SurfaceTokenId::BracketGroup(kind),
                            position.location(),
                            SurfaceTokenValue::Bracket(inner),
                        ));
                    }
                }
                b'(' if brace_depth == 0 => round_depth += 1,
                b')' if brace_depth == 0 => {
                    round_depth -= 1;
                    if round_depth == 0 {
                        if matches!(kind, BracketKind::Paren) {
                            let inner_end = position.token_end();
                            let inner = std::str::from_utf8(
                                &position.token_bytes()[inner_start - position.token_start()
                                    ..inner_end - position.token_start()],
                            )
                            .unwrap()
                            .to_string();
                            position.accept();
                            return Ok(LexToken::new(
                                SurfaceTokenId::BracketGroup(kind),
                                position.location(),
                                SurfaceTokenValue::Bracket(inner),
                            ));
                        } else {
                            return Err(LexError::new(
                                position.here(),
                                LexErrorKind::UnterminatedBracketGroup,
                            ));
                        }
                    } else if round_depth < 0 {
                        return Err(LexError::new(
                            position.here(),
                            LexErrorKind::UnterminatedBracketGroup,
                        ));
                    }
                }
                b'[' if brace_depth == 0 => square_depth += 1,
                b']' if brace_depth == 0 => {
                    square_depth -= 1;
                    if square_depth == 0 {
                        if matches!(kind, BracketKind::Square) {
                            let inner_end = position.token_end();
                            let inner = std::str::from_utf8(
                                &position.token_bytes()[inner_start - position.token_start()
                                    ..inner_end - position.token_start()],
                            )
                            .unwrap()
                            .to_string();
                            position.accept();
                            return Ok(LexToken::new(
                                SurfaceTokenId::BracketGroup(kind),
                                position.location(),
                                SurfaceTokenValue::Bracket(inner),
                            ));
                        } else {
                            return Err(LexError::new(
                                position.here(),
                                LexErrorKind::UnterminatedBracketGroup,
                            ));
                        }
                    } else if square_depth < 0 {
                        return Err(LexError::new(
                            position.here(),
                            LexErrorKind::UnterminatedBracketGroup,
                        ));
                    }
                }
                _ => {}
            }
            position.accept();
        }
    }
}

impl LexerCallback for SurfaceTokenizer {
    type Id = SurfaceTokenId;
    type Value = SurfaceTokenValue;

    fn lex(&mut self, position: &mut Position<'_>) -> Result<SurfaceToken, LexError> {
        position.skip_whitespace();

        if position.at_end() {
            return Ok(LexToken::new(SurfaceTokenId::Eof, position.here(), SurfaceTokenValue::None));
        }

        let b = position.current().unwrap();
        if let Some(tok) = self.lex_compound(position) {
            return Ok(tok);
        }

        match b {
            b'(' => self.capture_bracket_group(position, BracketKind::Paren),
            b'[' => self.capture_bracket_group(position, BracketKind::Square),
            b'{' => self.capture_bracket_group(position, BracketKind::Brace),
            b if b.is_ascii_digit() => Ok(self.lex_number(position)),
            b if is_ident_start(b) => Ok(self.lex_identifier(position)),
            b => {
                position.begin();
                position.accept();
                Ok(LexToken::new(SurfaceTokenId::Char(b), position.location(), SurfaceTokenValue::None))
            }
        }
    }

    fn error_name(&self, token: &SurfaceToken) -> String {
        match &token.id {
            SurfaceTokenId::Char(b) => format!("'{}'", *b as char),
            SurfaceTokenId::Compound(s) => format!("'{s}'"),
            SurfaceTokenId::Identifier => "identifier".to_string(),
            SurfaceTokenId::Number => "number".to_string(),
            SurfaceTokenId::BracketGroup(_) => "bracket group".to_string(),
            SurfaceTokenId::Eof => "end of input".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LexerKernel;
    use std::sync::Arc;

    fn tokens(src: &'static str) -> Vec<SurfaceToken> {
        let position = Position::new(Arc::from("t.surf"), src.as_bytes());
        let mut kernel = LexerKernel::new(position, SurfaceTokenizer::new(), 2).unwrap();
        let mut out = Vec::new();
        loop {
            let tok = kernel.peek().clone();
            let done = tok.id == SurfaceTokenId::Eof;
            out.push(tok);
            if done {
                break;
            }
            kernel.accept().unwrap();
        }
        out
    }

    /// S1: `foo(bar, 3.14)` lexes to `id("foo")` then a paren bracket group
    /// whose captured text is `bar, 3.14`.
    #[test]
    fn s1_identifier_then_bracket_group() {
        let toks = tokens("foo(bar, 3.14)");
        assert_eq!(toks[0].id, SurfaceTokenId::Identifier);
        match &toks[0].value {
            SurfaceTokenValue::Text(s) => assert_eq!(s, "foo"),
            _ => panic!("expected identifier text"),
        }
        assert_eq!(toks[1].id, SurfaceTokenId::BracketGroup(BracketKind::Paren));
        match &toks[1].value {
            SurfaceTokenValue::Bracket(s) => assert_eq!(s, "bar, 3.14"),
            _ => panic!("expected bracket capture"),
        }
    }

    #[test]
    fn brace_suspends_inner_depth_counters() {
        let toks = tokens("{ ) }");
        assert_eq!(toks[0].id, SurfaceTokenId::BracketGroup(BracketKind::Brace));
        match &toks[0].value {
            SurfaceTokenValue::Bracket(s) => assert_eq!(s, " ) "),
            _ => panic!("expected bracket capture"),
        }
    }

    #[test]
    fn unterminated_bracket_group_is_fatal() {
        let position = Position::new(Arc::from("t"), b"(abc".as_slice());
        let err = LexerKernel::new(position, SurfaceTokenizer::new(), 2);
        assert!(err.is_err());
    }

    #[test]
    fn zero_length_bracket_group_parses() {
        let toks = tokens("()");
        match &toks[0].value {
            SurfaceTokenValue::Bracket(s) => assert_eq!(s, ""),
            _ => panic!("expected bracket capture"),
        }
    }

    #[test]
    fn compound_operators_are_recognized() {
        let toks = tokens("a -> b");
        assert_eq!(toks[1].id, SurfaceTokenId::Compound("->"));
    }
}
