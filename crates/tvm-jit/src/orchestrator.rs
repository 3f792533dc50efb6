//! The JIT orchestrator (spec.md §4.7): `add_module`/`remove_module`/
//! `get_symbol`/`destroy` over a generic [`JitBackend`], grounded on
//! `original_source/src/Tvm/Jit.hpp`'s `Jit` interface and the
//! teacher's `test_runner.rs`/`main.rs` orchestration style (drive a
//! compile step, then invoke the produced artifact, surfacing failures
//! as a single aggregated error type).

use std::collections::HashMap;

use tracing::{debug, info};
use tvm_ir::function::IrModule;
use tvm_parser::ast::Linkage;

use crate::backend::JitBackend;
use crate::error::JitError;

struct ModuleHandle<H> {
    artifact: H,
    exported: Vec<String>,
    load_priority: u64,
}

/// Holds a map `Module → ModuleHandle` (spec.md §4.7) plus the global
/// exported-symbol table every module's non-local/import globals and
/// functions are registered into.
pub struct JitOrchestrator<B: JitBackend> {
    backend: B,
    modules: HashMap<String, ModuleHandle<B::Handle>>,
    /// symbol name -> (owning module, address). Append-on-add,
    /// conditional-remove-on-remove (spec.md §5 shared-resource
    /// policy): a later module may shadow an earlier definition, and
    /// removing the shadowing module does not resurrect the earlier
    /// one (this implementation "simply drops the entry", explicitly
    /// sanctioned by spec.md §5 as acceptable).
    exported_symbols: HashMap<String, (String, usize)>,
    next_priority: u64,
    /// Names in add order, so `destroy` can walk them in reverse.
    order: Vec<String>,
}

impl<B: JitBackend> JitOrchestrator<B> {
    pub fn new(backend: B) -> Self {
        JitOrchestrator {
            backend,
            modules: HashMap::new(),
            exported_symbols: HashMap::new(),
            next_priority: 0,
            order: Vec::new(),
        }
    }

    /// spec.md §4.7 "add_module(M): lower, compile, load, register
    /// every symbol whose linkage is not local/import into the global
    /// exported-symbol map; assign the next load priority; run module
    /// static constructors. Fails if M is already present."
    pub fn add_module(&mut self, name: &str, ir: &IrModule) -> Result<(), JitError> {
        if self.modules.contains_key(name) {
            return Err(JitError::AlreadyPresent { module: name.to_string() });
        }

        let artifact = self.backend.compile(name, ir)?;

        let mut exported = Vec::new();
        for function in &ir.functions {
            if is_exported(function.linkage) {
                if let Some(addr) = self.backend.symbol_address(&artifact, &function.name) {
                    self.exported_symbols.insert(function.name.clone(), (name.to_string(), addr));
                    exported.push(function.name.clone());
                }
            }
        }
        for global in &ir.globals {
            if is_exported(global.linkage) {
                if let Some(addr) = self.backend.symbol_address(&artifact, &global.name) {
                    self.exported_symbols.insert(global.name.clone(), (name.to_string(), addr));
                    exported.push(global.name.clone());
                }
            }
        }

        let load_priority = self.next_priority;
        self.next_priority += 1;

        self.backend.call_ctors(&artifact)?;

        debug!(module = name, load_priority, exported = exported.len(), "module added to JIT");
        self.modules.insert(
            name.to_string(),
            ModuleHandle {
                artifact,
                exported,
                load_priority,
            },
        );
        self.order.push(name.to_string());
        Ok(())
    }

    /// spec.md §4.7 "remove_module(M): run module static destructors;
    /// unregister its exported symbols (only if the global map still
    /// points at this module's copy); drop the handle. Fails if M is
    /// unknown."
    pub fn remove_module(&mut self, name: &str) -> Result<(), JitError> {
        let handle = self.modules.remove(name).ok_or_else(|| JitError::UnknownModule { module: name.to_string() })?;
        self.backend.call_dtors(&handle.artifact)?;
        for symbol in &handle.exported {
            if self.exported_symbols.get(symbol).map(|(owner, _)| owner.as_str()) == Some(name) {
                self.exported_symbols.remove(symbol);
            }
        }
        self.order.retain(|n| n != name);
        Ok(())
    }

    /// spec.md §4.7 "get_symbol(g): look up g.module; require it
    /// present; return the address from the module handle's table."
    pub fn get_symbol(&self, module: &str, name: &str) -> Result<usize, JitError> {
        if !self.modules.contains_key(module) {
            return Err(JitError::UnknownModule { module: module.to_string() });
        }
        self.exported_symbols
            .get(name)
            .filter(|(owner, _)| owner == module)
            .map(|(_, addr)| *addr)
            .ok_or_else(|| JitError::SymbolNotFound { name: name.to_string() })
    }

    /// Inter-module resolution by name alone (spec.md §4.7 "On lookup
    /// by name from the compiled code, the orchestrator consults its
    /// exported-symbol map before falling back to the backend's native
    /// resolver" — the fallback itself is the dynamic loader's own
    /// resolution once the artifact is loaded, so there is nothing
    /// further to do here once the map lookup misses).
    pub fn resolve_symbol(&self, name: &str) -> Option<usize> {
        self.exported_symbols.get(name).map(|(_, addr)| *addr)
    }

    /// spec.md §4.7 "destroy: run destructors for every loaded module
    /// in reverse load-priority order, then drop all handles."
    pub fn destroy(mut self) -> Result<(), JitError> {
        let mut order = self.order.clone();
        order.sort_by_key(|name| std::cmp::Reverse(self.modules[name].load_priority));
        for name in &order {
            if let Some(handle) = self.modules.get(name) {
                self.backend.call_dtors(&handle.artifact)?;
            }
        }
        info!(modules = order.len(), "JIT orchestrator destroyed");
        self.modules.clear();
        self.exported_symbols.clear();
        self.order.clear();
        Ok(())
    }
}

fn is_exported(linkage: Linkage) -> bool {
    !matches!(linkage, Linkage::Local | Linkage::Import)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeJit;
    use tvm_ir::builder::build_module;

    fn build(src: &str) -> IrModule {
        let ast = tvm_parser::parse_module("test", src).expect("parses");
        build_module(&ast).expect("builds")
    }

    /// spec.md §8 S6: destructors run in strict reverse add order.
    #[test]
    fn destroy_runs_destructors_in_reverse_add_order() {
        let backend = FakeJit::new();
        let log = backend.log.clone();
        let mut jit = JitOrchestrator::new(backend);

        let m1 = build("%m1 = export function () > (int #i32) { return #i32x0; };");
        let m2 = build("%m2 = export function () > (int #i32) { return #i32x0; };");
        jit.add_module("M1", &m1).unwrap();
        jit.add_module("M2", &m2).unwrap();
        jit.destroy().unwrap();

        assert_eq!(*log.borrow(), vec!["M1_ctor", "M2_ctor", "M2_dtor", "M1_dtor"]);
    }

    #[test]
    fn add_module_rejects_a_duplicate_name() {
        let mut jit = JitOrchestrator::new(FakeJit::new());
        let m = build("%m = export function () > (int #i32) { return #i32x0; };");
        jit.add_module("M", &m).unwrap();
        let err = jit.add_module("M", &m).unwrap_err();
        assert!(matches!(err, JitError::AlreadyPresent { .. }));
    }

    #[test]
    fn get_symbol_resolves_an_exported_function() {
        let mut jit = JitOrchestrator::new(FakeJit::new());
        let m = build("%f = export function () > (int #i32) { return #i32x0; };");
        jit.add_module("M", &m).unwrap();
        assert!(jit.get_symbol("M", "f").is_ok());
    }

    #[test]
    fn remove_module_unregisters_its_symbols_but_not_a_shadowing_modules() {
        let mut jit = JitOrchestrator::new(FakeJit::new());
        let m1 = build("%f = export function () > (int #i32) { return #i32x0; };");
        jit.add_module("M1", &m1).unwrap();
        jit.remove_module("M1").unwrap();
        assert!(matches!(jit.get_symbol("M1", "f"), Err(JitError::UnknownModule { .. })));
    }
}
