//! The JIT backend seam (spec.md §4.7), grounded on
//! `original_source/src/Tvm/Jit.hpp`'s abstract `Jit` class
//! (`add_module`/`remove_module`/`get_symbol`/`destroy`) and
//! `JitLinux.cpp`'s `dlopen`/`dlsym` loader — re-expressed as a trait
//! over an opaque per-module `Handle` so the orchestrator in
//! [`crate::orchestrator`] never depends on how a module was actually
//! compiled and loaded.

use tvm_ir::function::IrModule;

use crate::error::JitError;

/// One backend's way of turning a module into a loaded, callable
/// artifact. [`ProcessJit`] does this for real via `tvm-backend` + the
/// OS dynamic loader; [`FakeJit`] is a test double that never touches
/// a compiler or the filesystem.
pub trait JitBackend {
    type Handle;

    fn compile(&mut self, name: &str, ir: &IrModule) -> Result<Self::Handle, JitError>;

    /// Resolves `name` to an address within `handle`'s artifact, if it
    /// exports a symbol by that name.
    fn symbol_address(&self, handle: &Self::Handle, name: &str) -> Option<usize>;

    /// Runs the module's static constructors (spec.md §4.7
    /// "add_module: ... run module static constructors").
    fn call_ctors(&self, handle: &Self::Handle) -> Result<(), JitError>;

    /// Runs the module's static destructors (spec.md §4.7
    /// "remove_module: run module static destructors").
    fn call_dtors(&self, handle: &Self::Handle) -> Result<(), JitError>;
}

/// The real backend: compiles through `tvm-backend` to a shared object
/// and loads it with `libloading` (the Rust equivalent of
/// `JitLinux.cpp`'s `dlopen`/`dlsym`).
pub struct ProcessJit {
    workdir: std::path::PathBuf,
}

pub struct ProcessHandle {
    #[allow(dead_code)]
    path: std::path::PathBuf,
    library: libloading::Library,
}

impl ProcessJit {
    pub fn new() -> Self {
        ProcessJit {
            workdir: std::env::temp_dir(),
        }
    }

    pub fn with_workdir(workdir: std::path::PathBuf) -> Self {
        ProcessJit { workdir }
    }
}

impl Default for ProcessJit {
    fn default() -> Self {
        ProcessJit::new()
    }
}

impl JitBackend for ProcessJit {
    type Handle = ProcessHandle;

    fn compile(&mut self, name: &str, ir: &IrModule) -> Result<Self::Handle, JitError> {
        let path = self.workdir.join(format!("tvm_jit_{name}.so"));
        tvm_backend::compile_module(ir, &path)?;
        // Safety: `path` was just produced by our own backend invocation
        // above; loading it executes the compiled module's global
        // initializers, consistent with spec.md §5's "blocking points:
        // ... running constructors/destructors, which execute foreign
        // code synchronously".
        let library = unsafe { libloading::Library::new(&path) }.map_err(|e| JitError::Load(e.to_string()))?;
        Ok(ProcessHandle { path, library })
    }

    fn symbol_address(&self, handle: &Self::Handle, name: &str) -> Option<usize> {
        unsafe {
            let symbol: libloading::Symbol<'_, *const ()> = handle.library.get(name.as_bytes()).ok()?;
            Some(*symbol as usize)
        }
    }

    fn call_ctors(&self, handle: &Self::Handle) -> Result<(), JitError> {
        call_convention_symbol(handle, "__tvm_ctor")
    }

    fn call_dtors(&self, handle: &Self::Handle) -> Result<(), JitError> {
        call_convention_symbol(handle, "__tvm_dtor")
    }
}

/// Calls a conventionally-named, no-argument `extern "C"` symbol if the
/// module's artifact exports one; a module with no static initializers
/// simply has no such symbol, which is not an error.
fn call_convention_symbol(handle: &ProcessHandle, name: &str) -> Result<(), JitError> {
    unsafe {
        let symbol: Result<libloading::Symbol<'_, unsafe extern "C" fn()>, _> = handle.library.get(name.as_bytes());
        if let Ok(ctor) = symbol {
            ctor();
        }
    }
    Ok(())
}

/// A test double recording constructor/destructor calls and symbol
/// addresses in memory, with no compiler or dynamic loader involved —
/// used to exercise the orchestrator's ordering guarantees (spec.md §8
/// S6) deterministically.
#[derive(Default)]
pub struct FakeJit {
    pub log: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
    next_address: usize,
}

pub struct FakeHandle {
    name: String,
    symbols: std::collections::HashMap<String, usize>,
}

impl FakeJit {
    pub fn new() -> Self {
        FakeJit {
            log: std::rc::Rc::new(std::cell::RefCell::new(Vec::new())),
            next_address: 0x1000,
        }
    }
}

impl JitBackend for FakeJit {
    type Handle = FakeHandle;

    fn compile(&mut self, name: &str, ir: &IrModule) -> Result<Self::Handle, JitError> {
        let mut symbols = std::collections::HashMap::new();
        for function in &ir.functions {
            symbols.insert(function.name.clone(), self.next_address);
            self.next_address += 8;
        }
        for global in &ir.globals {
            symbols.insert(global.name.clone(), self.next_address);
            self.next_address += 8;
        }
        Ok(FakeHandle {
            name: name.to_string(),
            symbols,
        })
    }

    fn symbol_address(&self, handle: &Self::Handle, name: &str) -> Option<usize> {
        handle.symbols.get(name).copied()
    }

    fn call_ctors(&self, handle: &Self::Handle) -> Result<(), JitError> {
        self.log.borrow_mut().push(format!("{}_ctor", handle.name));
        Ok(())
    }

    fn call_dtors(&self, handle: &Self::Handle) -> Result<(), JitError> {
        self.log.borrow_mut().push(format!("{}_dtor", handle.name));
        Ok(())
    }
}
