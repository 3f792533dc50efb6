//! x86 cdecl classification (spec.md §4.5 "x86 cdecl").
//!
//! Grounded on `original_source/src/Tvm/llvm/CallingConventions.cpp`'s
//! x86 path: every non-empty aggregate is passed `byval` with a minimum
//! alignment of 4 (the platform stack alignment), never split across
//! eightbytes the way AMD64 does. Returns are where the platforms
//! diverge (§9 design note "sret/Linux-cdecl asymmetry"): Linux always
//! returns an aggregate through a hidden sret pointer, while the
//! Windows/BSD variant of cdecl coerces a 1-8 byte aggregate straight
//! into `eax`/`edx` instead.

use tvm_ir::lowering::{AggregateLayout, LoweredType, PrimType};

use crate::disposition::{default_disposition, AttrFlags, ClassifiedParam, ClassifiedSignature, CoercionType, Disposition};

/// Distinguishes the two cdecl return conventions this crate supports
/// (spec.md §9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnConvention {
    /// Linux: any non-register-sized aggregate return is always sret.
    LinuxSret,
    /// Windows/BSD: aggregates up to 8 bytes coerce into eax:edx.
    CoerceSmall,
}

fn classify_param(lowered: &LoweredType) -> ClassifiedParam {
    if lowered.layout.size == 0 {
        return ClassifiedParam {
            disposition: Disposition::Ignore,
            attrs: AttrFlags::empty(),
        };
    }
    if lowered.register_type.is_some() {
        return ClassifiedParam {
            disposition: default_disposition(lowered),
            attrs: AttrFlags::empty(),
        };
    }
    ClassifiedParam {
        disposition: Disposition::Byval {
            align: lowered.layout.align.max(4),
        },
        attrs: AttrFlags::BYVAL,
    }
}

fn classify_return(lowered: &LoweredType, convention: ReturnConvention) -> ClassifiedParam {
    if lowered.layout.size == 0 {
        return ClassifiedParam {
            disposition: Disposition::Ignore,
            attrs: AttrFlags::empty(),
        };
    }
    if lowered.register_type.is_some() {
        return ClassifiedParam {
            disposition: default_disposition(lowered),
            attrs: AttrFlags::empty(),
        };
    }
    match convention {
        ReturnConvention::LinuxSret => ClassifiedParam {
            disposition: Disposition::Byval {
                align: lowered.layout.align.max(4),
            },
            attrs: AttrFlags::empty(),
        },
        ReturnConvention::CoerceSmall if lowered.layout.size <= 8 => ClassifiedParam {
            disposition: Disposition::Default {
                coerce_to: Some(coerce_eax_edx(&lowered.layout)),
                expand: true,
            },
            attrs: AttrFlags::empty(),
        },
        ReturnConvention::CoerceSmall => ClassifiedParam {
            disposition: Disposition::Byval {
                align: lowered.layout.align.max(4),
            },
            attrs: AttrFlags::empty(),
        },
    }
}

fn coerce_eax_edx(layout: &AggregateLayout) -> CoercionType {
    if layout.size <= 4 {
        CoercionType { members: vec![PrimType::from_size(layout.size)] }
    } else {
        CoercionType {
            members: vec![PrimType::I32, PrimType::from_size(layout.size - 4)],
        }
    }
}

/// Classifies a full signature under x86 cdecl (spec.md §4.5). `params`
/// are pushed right-to-left on the caller's stack by the backend; this
/// classifier only decides *how* each value is represented, not the
/// push order.
pub fn classify_signature(
    params: &[LoweredType],
    ret: &LoweredType,
    convention: ReturnConvention,
) -> ClassifiedSignature {
    let ret_classified = classify_return(ret, convention);
    let sret_synthesized = matches!(ret_classified.disposition, Disposition::Byval { .. });
    let params = params.iter().map(classify_param).collect();
    ClassifiedSignature {
        params,
        ret: ret_classified,
        sret_synthesized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvm_ir::lowering::Member;

    fn agg(size: u64, align: u64, members: Vec<Member>) -> LoweredType {
        LoweredType {
            register_type: None,
            layout: AggregateLayout { size, align, members },
        }
    }

    #[test]
    fn non_empty_aggregate_param_is_byval_with_min_align_four() {
        let lowered = agg(12, 4, vec![Member { offset: 0, prim: PrimType::I32 }]);
        let classified = classify_param(&lowered);
        assert_eq!(classified.disposition, Disposition::Byval { align: 4 });

        let under_aligned = agg(2, 1, vec![Member { offset: 0, prim: PrimType::I8 }]);
        assert_eq!(classify_param(&under_aligned).disposition, Disposition::Byval { align: 4 });
    }

    #[test]
    fn linux_cdecl_aggregate_return_is_always_sret() {
        let lowered = agg(8, 4, vec![Member { offset: 0, prim: PrimType::I32 }]);
        let classified = classify_return(&lowered, ReturnConvention::LinuxSret);
        assert!(matches!(classified.disposition, Disposition::Byval { .. }));
    }

    #[test]
    fn windows_cdecl_small_aggregate_return_coerces_into_registers() {
        let lowered = agg(8, 4, vec![Member { offset: 0, prim: PrimType::I32 }, Member { offset: 4, prim: PrimType::I32 }]);
        let classified = classify_return(&lowered, ReturnConvention::CoerceSmall);
        match classified.disposition {
            Disposition::Default { coerce_to: Some(c), .. } => assert_eq!(c.members.len(), 2),
            other => panic!("expected a coerced eax:edx return, got {other:?}"),
        }
    }
}
