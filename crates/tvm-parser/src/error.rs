//! Parse error taxonomy (spec.md §7, "Parse error").
//!
//! "There is no panic-mode recovery: the first error terminates parsing"
//! (spec.md §4.2) — `ParseError` is therefore always fatal to the current
//! parse, mirroring `Lexer::unexpected`/`Lexer::error` in the original.

use std::fmt;
use tvm_lexer::{LexError, PhysicalLocation};

#[derive(Debug, Clone)]
pub enum ParseError {
    Lex(LexError),
    /// An unexpected token, carrying its physical location and the
    /// offending token's diagnostic name (spec.md §7).
    UnexpectedToken {
        location: PhysicalLocation,
        found: String,
        expected: Option<String>,
    },
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::Lex(e)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "{e}"),
            ParseError::UnexpectedToken {
                location,
                found,
                expected,
            } => match expected {
                Some(expected) => write!(
                    f,
                    "{location}: unexpected token {found}, expected {expected}"
                ),
                None => write!(f, "{location}: unexpected token {found}"),
            },
        }
    }
}

impl std::error::Error for ParseError {}
