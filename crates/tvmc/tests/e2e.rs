//! End-to-end pipeline tests (spec.md §8 S2), mirroring the teacher's
//! crate-level `tests/` integration style and `tempfile` usage for
//! scratch build directories.

use tvm_abi::CallingConventionEngine;
use tvm_ir::lower_module;
use tvm_jit::{JitOrchestrator, ProcessJit};

/// spec.md §8 S2: parse, lower, compile, and JIT-run an add function,
/// through the real `cc`-invoking `ProcessJit` backend.
#[test]
fn compiles_and_jit_runs_an_add_function() {
    let source = "%f = export function (%a:(int #i32),%b:(int #i32)) > (int #i32) {\n    return (add %a %b);\n};\n";
    let ast = tvm_parser::parse_module("e2e", source).expect("parses");
    let mut module = tvm_ir::build_module(&ast).expect("builds");

    let mut engine = CallingConventionEngine::new("x86_64-unknown-linux-gnu", "cc_c").expect("known triple");
    lower_module(&mut module, &mut engine).expect("lowers");

    let dir = tempfile::tempdir().expect("tempdir");
    let backend = ProcessJit::with_workdir(dir.path().to_path_buf());
    let mut jit = JitOrchestrator::new(backend);
    jit.add_module("e2e", &module).expect("module compiles and loads");

    let address = jit.get_symbol("e2e", "f").expect("f is exported");
    let f: unsafe extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(address as *const ()) };
    assert_eq!(unsafe { f(3, 4) }, 7);
    assert_eq!(unsafe { f(-1, 1) }, 0);

    jit.destroy().expect("destroy runs cleanly");
}
