//! Shared lexing kernel for the TVM and surface-language front ends
//! (spec.md §4.1).
//!
//! This crate owns position tracking, the fixed-depth backtracking token
//! ring buffer, and the two concrete tokenizers (TVM and surface) that
//! plug into it. Everything above the token stream — grammar, AST
//! construction, type checking — lives in downstream crates.

pub mod bigint;
pub mod error;
pub mod kernel;
pub mod position;
pub mod surface_tokenizer;
pub mod tvm_tokenizer;

pub use bigint::{BigInt, Width};
pub use error::{LexError, LexErrorKind};
pub use kernel::{LexToken, LexerCallback, LexerKernel};
pub use position::{Checkpoint, LogicalLocation, PhysicalLocation, Position, SourceLocation};
pub use surface_tokenizer::{BracketKind, SurfaceToken, SurfaceTokenId, SurfaceTokenValue, SurfaceTokenizer};
pub use tvm_tokenizer::{TvmKeyword, TvmToken, TvmTokenId, TvmTokenValue, TvmTokenizer};
