//! Semantic errors raised while building or lowering the value graph
//! (spec.md §7 "Semantic error").

use std::fmt;
use tvm_lexer::PhysicalLocation;

#[derive(Debug, Clone)]
pub enum SemanticError {
    DuplicateSymbol {
        name: String,
        location: PhysicalLocation,
    },
    UnknownName {
        name: String,
        location: PhysicalLocation,
    },
    TypeMismatch {
        expected: String,
        found: String,
        location: PhysicalLocation,
    },
    /// A structural error not tied to one source location: a malformed
    /// dominator reference, an unresolved recursive-type body, and
    /// similar builder-internal invariant violations.
    Malformed(String),
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticError::DuplicateSymbol { name, location } => {
                write!(f, "{location}: duplicate symbol '{name}'")
            }
            SemanticError::UnknownName { name, location } => {
                write!(f, "{location}: unknown name '{name}'")
            }
            SemanticError::TypeMismatch {
                expected,
                found,
                location,
            } => write!(f, "{location}: expected {expected}, found {found}"),
            SemanticError::Malformed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for SemanticError {}
