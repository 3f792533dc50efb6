//! Recursive-descent parser for the TVM textual module format (spec.md
//! §4.2).
//!
//! Builds an AST (see [`ast`]) directly from the token stream produced by
//! `tvm_lexer::TvmTokenizer`; there is no separate concrete-syntax-tree
//! stage. Downstream crates (`tvm-ir`) lower this AST into the SSA value
//! graph.

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::*;
pub use error::ParseError;
pub use parser::{parse_module, Parser};
