//! Writes generated C text to disk and invokes `cc` (spec.md §4.6),
//! mirroring the teacher's `compile_file_with_config` pattern: write
//! the generated text next to the requested output path, then shell
//! out to the system toolchain and surface a non-zero exit as an
//! error carrying its stderr.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::BackendError;

/// Compiles a generated C translation unit into a shared object,
/// suitable for the JIT orchestrator's `dlopen`-based loader.
pub fn compile_shared_object(c_source: &str, output_path: &Path) -> Result<(), BackendError> {
    let c_path = output_path.with_extension("c");
    fs::write(&c_path, c_source)?;
    debug!(path = %c_path.display(), "wrote generated C translation unit");

    let mut cc = Command::new(cc_binary());
    cc.arg("-shared")
        .arg("-fPIC")
        .arg("-O2")
        .arg(&c_path)
        .arg("-o")
        .arg(output_path);

    run(cc)
}

/// Compiles a generated C translation unit into a relocatable object
/// file without linking, for callers that drive their own link step.
pub fn compile_object(c_source: &str, output_path: &Path) -> Result<(), BackendError> {
    let c_path = output_path.with_extension("c");
    fs::write(&c_path, c_source)?;

    let mut cc = Command::new(cc_binary());
    cc.arg("-c").arg("-fPIC").arg("-O2").arg(&c_path).arg("-o").arg(output_path);

    run(cc)
}

fn run(mut cc: Command) -> Result<(), BackendError> {
    let output = cc.output()?;
    if !output.status.success() {
        return Err(BackendError::Invoke {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

fn cc_binary() -> String {
    std::env::var("CC").unwrap_or_else(|_| "cc".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cc_binary_honors_the_cc_environment_variable() {
        std::env::set_var("CC", "my-special-cc");
        assert_eq!(cc_binary(), "my-special-cc");
        std::env::remove_var("CC");
        assert_eq!(cc_binary(), "cc");
    }
}
