//! `tvm.toml` property dictionary (spec.md §6.4 "A property dictionary
//! with a `tvm.jit` key selecting a backend name and per-backend
//! subsections ... The orchestrator ignores unknown keys"), parsed
//! with `serde`/`toml` mirroring the teacher's `CompilerConfig`
//! extensibility pattern (`compiler/src/config.rs`).

use std::fmt;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TvmConfig {
    #[serde(default)]
    pub tvm: TvmSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvmSection {
    /// Backend name selected under `tvm.jit` (spec.md §6.4). Only
    /// `"c"` (the `tvm-backend` C-text emitter) is implemented; other
    /// names are accepted and ignored, per the spec's "ignores unknown
    /// keys" tolerance.
    #[serde(default = "default_jit_backend")]
    pub jit: String,

    /// Target triple passed to `tvm_abi::select_cc`. Defaults to the
    /// host build's triple.
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default)]
    pub c: CSection,
}

impl Default for TvmSection {
    fn default() -> Self {
        TvmSection {
            jit: default_jit_backend(),
            target: default_target(),
            c: CSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CSection {
    /// Overrides the `CC` environment variable lookup in `tvm-backend`
    /// (spec.md §6.4 "tvm.c.<kind>.path").
    pub path: Option<String>,
}

fn default_jit_backend() -> String {
    "c".to_string()
}

fn default_target() -> String {
    // Matches whatever target this binary itself was built for; the
    // alternative ABIs (x86 cdecl, ARM EABI) remain reachable via an
    // explicit `tvm.target` override or `--target`.
    built_host_triple().to_string()
}

#[cfg(target_arch = "x86_64")]
fn built_host_triple() -> &'static str {
    "x86_64-unknown-linux-gnu"
}

#[cfg(target_arch = "x86")]
fn built_host_triple() -> &'static str {
    "i686-unknown-linux-gnu"
}

#[cfg(target_arch = "arm")]
fn built_host_triple() -> &'static str {
    "armv7-unknown-linux-gnueabi"
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm")))]
fn built_host_triple() -> &'static str {
    "x86_64-unknown-linux-gnu"
}

impl Default for TvmConfig {
    fn default() -> Self {
        TvmConfig {
            tvm: TvmSection::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "error reading config: {e}"),
            ConfigError::Parse(e) => write!(f, "error parsing config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl TvmConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&text).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored() {
        let config: TvmConfig = toml::from_str(
            "[tvm]\njit = \"c\"\ntarget = \"x86_64-unknown-linux-gnu\"\nsomething_future = 1\n",
        )
        .expect("parses despite the unknown key");
        assert_eq!(config.tvm.jit, "c");
    }

    #[test]
    fn an_empty_file_falls_back_to_defaults() {
        let config: TvmConfig = toml::from_str("").expect("parses");
        assert_eq!(config.tvm.jit, "c");
    }
}
