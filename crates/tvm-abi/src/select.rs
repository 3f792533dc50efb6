//! Target-triple to calling-convention dispatch (spec.md §4.5
//! "`select_cc(triple, cc) -> Handler`").

use tvm_ir::lowering::LoweredType;

use crate::disposition::ClassifiedSignature;
use crate::error::TargetError;
use crate::x86::ReturnConvention;
use crate::{amd64, arm, x86};

/// One of the conventions this crate can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    SysVAmd64,
    X86CdeclLinux,
    X86CdeclWindows,
    ArmEabi,
}

impl Convention {
    pub fn classify(&self, params: &[LoweredType], ret: &LoweredType) -> ClassifiedSignature {
        match self {
            Convention::SysVAmd64 => amd64::classify_signature(params, ret),
            Convention::X86CdeclLinux => x86::classify_signature(params, ret, ReturnConvention::LinuxSret),
            Convention::X86CdeclWindows => x86::classify_signature(params, ret, ReturnConvention::CoerceSmall),
            Convention::ArmEabi => arm::classify_signature(params, ret),
        }
    }
}

/// Picks a [`Convention`] for a target triple (spec.md §4.5). Only the
/// architecture and, for x86, the OS component are inspected; the
/// calling-convention name from the TVM source (`cc_c`, currently the
/// only one the grammar accepts) is recorded for the error path.
pub fn select_cc(triple: &str, cc_name: &str) -> Result<Convention, TargetError> {
    let arch = triple.split('-').next().unwrap_or(triple);
    let convention = match arch {
        "x86_64" | "amd64" => Convention::SysVAmd64,
        "i386" | "i486" | "i586" | "i686" => {
            if triple.contains("windows") || triple.contains("msvc") || triple.contains("mingw") {
                Convention::X86CdeclWindows
            } else {
                Convention::X86CdeclLinux
            }
        }
        "arm" | "armv7" | "armv7a" | "thumbv7" => Convention::ArmEabi,
        _ => {
            return Err(TargetError {
                triple: triple.to_string(),
                convention: cc_name.to_string(),
            })
        }
    };
    Ok(convention)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_sysv_amd64_for_x86_64_linux() {
        assert_eq!(select_cc("x86_64-unknown-linux-gnu", "cc_c").unwrap(), Convention::SysVAmd64);
    }

    #[test]
    fn selects_windows_cdecl_for_i686_windows() {
        assert_eq!(select_cc("i686-pc-windows-msvc", "cc_c").unwrap(), Convention::X86CdeclWindows);
    }

    #[test]
    fn selects_linux_cdecl_for_i686_linux() {
        assert_eq!(select_cc("i686-unknown-linux-gnu", "cc_c").unwrap(), Convention::X86CdeclLinux);
    }

    #[test]
    fn selects_arm_eabi_for_armv7() {
        assert_eq!(select_cc("armv7-unknown-linux-gnueabi", "cc_c").unwrap(), Convention::ArmEabi);
    }

    #[test]
    fn rejects_unknown_architecture() {
        let err = select_cc("riscv64-unknown-linux-gnu", "cc_c").unwrap_err();
        assert_eq!(err.triple, "riscv64-unknown-linux-gnu");
    }
}
