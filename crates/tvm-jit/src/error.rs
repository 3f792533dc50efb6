//! JIT orchestrator errors (spec.md §7 "JIT error").

use std::fmt;

#[derive(Debug)]
pub enum JitError {
    /// spec.md §4.7 "Fails if M is already present."
    AlreadyPresent { module: String },
    /// spec.md §4.7 "Fails if M is unknown" (`remove_module`) or the
    /// symbol's owning module is unknown (`get_symbol`).
    UnknownModule { module: String },
    /// `get_symbol` found no entry in the exported-symbol map.
    SymbolNotFound { name: String },
    /// The backend failed to compile the module to a loadable artifact.
    Backend(tvm_backend::BackendError),
    /// The OS dynamic loader rejected the compiled artifact.
    Load(String),
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::AlreadyPresent { module } => write!(f, "module '{module}' is already loaded"),
            JitError::UnknownModule { module } => write!(f, "no such module '{module}'"),
            JitError::SymbolNotFound { name } => write!(f, "no exported symbol named '{name}'"),
            JitError::Backend(e) => write!(f, "{e}"),
            JitError::Load(msg) => write!(f, "failed to load compiled artifact: {msg}"),
        }
    }
}

impl std::error::Error for JitError {}

impl From<tvm_backend::BackendError> for JitError {
    fn from(e: tvm_backend::BackendError) -> Self {
        JitError::Backend(e)
    }
}
