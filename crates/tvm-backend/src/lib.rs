//! C99-text emission backend (spec.md §4.6): turns a built [`IrModule`]
//! into a C translation unit, then invokes the system `cc` to produce a
//! loadable artifact for [`tvm_jit`](../tvm_jit/index.html).

pub mod emit;
pub mod error;
pub mod invoke;
pub mod operators;

pub use emit::emit_module;
pub use error::BackendError;
pub use invoke::{compile_object, compile_shared_object};

use std::path::Path;

use tvm_ir::function::IrModule;

/// Emits `ir` to C text and compiles it straight to a shared object at
/// `output_path` — the common case used by the JIT orchestrator.
pub fn compile_module(ir: &IrModule, output_path: &Path) -> Result<(), BackendError> {
    let text = emit_module(ir)?;
    compile_shared_object(&text, output_path)
}
