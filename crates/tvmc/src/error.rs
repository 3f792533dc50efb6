//! Aggregated CLI error type (spec.md §7), mirroring the teacher's
//! `CodeGenError`'s `From`-conversion pattern
//! (`compiler/src/codegen.rs`): one variant per library error kind,
//! each `Display`ed through to the underlying error's own
//! `file:line:column: message` formatting.

use std::fmt;

use crate::config::ConfigError;

#[derive(Debug)]
pub enum TvmcError {
    Io(std::io::Error),
    Lex(tvm_lexer::LexError),
    Parse(tvm_parser::ParseError),
    Semantic(tvm_ir::SemanticError),
    Target(tvm_abi::TargetError),
    Backend(tvm_backend::BackendError),
    Jit(tvm_jit::JitError),
    Config(ConfigError),
}

impl fmt::Display for TvmcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TvmcError::Io(e) => write!(f, "{e}"),
            TvmcError::Lex(e) => write!(f, "{e}"),
            TvmcError::Parse(e) => write!(f, "{e}"),
            TvmcError::Semantic(e) => write!(f, "{e}"),
            TvmcError::Target(e) => write!(f, "{e}"),
            TvmcError::Backend(e) => write!(f, "{e}"),
            TvmcError::Jit(e) => write!(f, "{e}"),
            TvmcError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TvmcError {}

impl From<std::io::Error> for TvmcError {
    fn from(e: std::io::Error) -> Self {
        TvmcError::Io(e)
    }
}

impl From<tvm_lexer::LexError> for TvmcError {
    fn from(e: tvm_lexer::LexError) -> Self {
        TvmcError::Lex(e)
    }
}

impl From<tvm_parser::ParseError> for TvmcError {
    fn from(e: tvm_parser::ParseError) -> Self {
        TvmcError::Parse(e)
    }
}

impl From<tvm_ir::SemanticError> for TvmcError {
    fn from(e: tvm_ir::SemanticError) -> Self {
        TvmcError::Semantic(e)
    }
}

impl From<tvm_abi::TargetError> for TvmcError {
    fn from(e: tvm_abi::TargetError) -> Self {
        TvmcError::Target(e)
    }
}

impl From<tvm_backend::BackendError> for TvmcError {
    fn from(e: tvm_backend::BackendError) -> Self {
        TvmcError::Backend(e)
    }
}

impl From<tvm_jit::JitError> for TvmcError {
    fn from(e: tvm_jit::JitError) -> Self {
        TvmcError::Jit(e)
    }
}

impl From<ConfigError> for TvmcError {
    fn from(e: ConfigError) -> Self {
        TvmcError::Config(e)
    }
}

impl From<String> for TvmcError {
    fn from(e: String) -> Self {
        TvmcError::Backend(tvm_backend::BackendError::Logic(e))
    }
}
