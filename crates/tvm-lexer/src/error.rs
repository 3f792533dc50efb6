//! Lexical error taxonomy (spec.md §7, "Lex error").

use crate::position::PhysicalLocation;
use std::fmt;

#[derive(Debug, Clone)]
pub enum LexErrorKind {
    BadCharacter(char),
    MalformedLiteral(String),
    UnterminatedBracketGroup,
    UnterminatedEscape,
    UnterminatedString,
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub location: PhysicalLocation,
    pub kind: LexErrorKind,
}

impl LexError {
    pub fn new(location: PhysicalLocation, kind: LexErrorKind) -> Self {
        LexError { location, kind }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match &self.kind {
            LexErrorKind::BadCharacter(c) => format!("unexpected character '{c}'"),
            LexErrorKind::MalformedLiteral(msg) => format!("malformed literal: {msg}"),
            LexErrorKind::UnterminatedBracketGroup => "unterminated bracket group".to_string(),
            LexErrorKind::UnterminatedEscape => "unterminated escape sequence".to_string(),
            LexErrorKind::UnterminatedString => "unterminated string literal".to_string(),
        };
        write!(f, "{}: {}", self.location, message)
    }
}

impl std::error::Error for LexError {}
