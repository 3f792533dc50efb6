//! JIT orchestrator (spec.md §4.7): loads compiled TVM modules, tracks
//! their exported symbols, and drives static constructor/destructor
//! ordering across modules.

pub mod backend;
pub mod error;
pub mod orchestrator;

pub use backend::{FakeJit, JitBackend, ProcessHandle, ProcessJit};
pub use error::JitError;
pub use orchestrator::JitOrchestrator;
