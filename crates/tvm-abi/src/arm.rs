//! ARM EABI classification (spec.md §4.5 "ARM EABI").
//!
//! Four 32-bit core argument registers (r0-r3). A parameter whose type
//! requires 8-byte alignment must start on an even register, skipping
//! r1 or r3 if the next free register is odd (`original_source`'s
//! `ARM::eabi` parameter walk). The first aggregate that doesn't fully
//! fit in the remaining core registers is split (`Disposition::Split`):
//! the head is passed in whatever registers remain, the tail spills to
//! a `byval` pointer. Every aggregate parameter after that first split
//! is passed fully `byval` — once the register file is committed to
//! the stack, EABI does not reuse earlier freed registers.
//!
//! This crate does not classify VFP/hard-float argument registers
//! (design note §9's ARM hard-float TODO): every value here is treated
//! as occupying core registers, matching the soft-float EABI variant.

use tvm_ir::lowering::LoweredType;

use crate::disposition::{default_disposition, AttrFlags, ClassifiedParam, ClassifiedSignature, CoercionType, Disposition};

const CORE_REGISTERS: u32 = 4;

struct RegWalk {
    next: u32,
    split_used: bool,
}

impl RegWalk {
    fn new() -> Self {
        RegWalk { next: 0, split_used: false }
    }

    fn remaining(&self) -> u32 {
        CORE_REGISTERS.saturating_sub(self.next)
    }

    fn align_to_even(&mut self) {
        if self.next % 2 == 1 {
            self.next += 1;
        }
    }
}

fn words(size: u64) -> u32 {
    (((size + 3) / 4) as u32).max(1)
}

fn classify_one(lowered: &LoweredType, walk: &mut RegWalk) -> ClassifiedParam {
    if lowered.layout.size == 0 {
        return ClassifiedParam {
            disposition: Disposition::Ignore,
            attrs: AttrFlags::empty(),
        };
    }

    if lowered.layout.align >= 8 {
        walk.align_to_even();
    }

    if let Some(_prim) = lowered.register_type {
        let need = words(lowered.layout.size);
        if walk.remaining() == 0 {
            return byval(lowered.layout.align);
        }
        if need <= walk.remaining() {
            walk.next += need;
            return ClassifiedParam {
                disposition: default_disposition(lowered),
                attrs: AttrFlags::empty(),
            };
        }
        // A multi-word register value that doesn't fully fit is treated
        // like an aggregate below and may split.
    }

    let need = words(lowered.layout.size);
    if walk.remaining() == 0 {
        return byval(lowered.layout.align);
    }
    if need <= walk.remaining() {
        walk.next += need;
        return ClassifiedParam {
            disposition: Disposition::Default {
                coerce_to: Some(CoercionType {
                    members: lowered.layout.members.iter().map(|m| m.prim).collect(),
                }),
                expand: true,
            },
            attrs: AttrFlags::empty(),
        };
    }

    if !walk.split_used {
        walk.split_used = true;
        let head_words = walk.remaining();
        let head = CoercionType {
            members: lowered
                .layout
                .members
                .iter()
                .take(head_words as usize)
                .map(|m| m.prim)
                .collect(),
        };
        walk.next = CORE_REGISTERS;
        return ClassifiedParam {
            disposition: Disposition::Split {
                head,
                tail_align: lowered.layout.align.max(4),
            },
            attrs: AttrFlags::empty(),
        };
    }

    byval(lowered.layout.align)
}

fn byval(align: u64) -> ClassifiedParam {
    ClassifiedParam {
        disposition: Disposition::Byval { align: align.max(4) },
        attrs: AttrFlags::BYVAL,
    }
}

/// Classifies a full signature under ARM EABI (spec.md §4.5). Returns
/// larger than a register pair are sret; everything else follows the
/// default disposition.
pub fn classify_signature(params: &[LoweredType], ret: &LoweredType) -> ClassifiedSignature {
    let ret_classified = if ret.layout.size == 0 {
        ClassifiedParam { disposition: Disposition::Ignore, attrs: AttrFlags::empty() }
    } else if ret.register_type.is_some() || ret.layout.size <= 8 {
        default_return(ret)
    } else {
        byval(ret.layout.align)
    };
    let sret_synthesized = matches!(ret_classified.disposition, Disposition::Byval { .. });

    let mut walk = RegWalk::new();
    if sret_synthesized {
        walk.next = 1; // the hidden sret pointer occupies r0
    }
    let params = params.iter().map(|p| classify_one(p, &mut walk)).collect();

    ClassifiedSignature {
        params,
        ret: ret_classified,
        sret_synthesized,
    }
}

fn default_return(lowered: &LoweredType) -> ClassifiedParam {
    ClassifiedParam {
        disposition: default_disposition(lowered),
        attrs: AttrFlags::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvm_ir::lowering::{AggregateLayout, Member, PrimType};

    fn int_param(bits: u64) -> LoweredType {
        let prim = PrimType::from_size(bits / 8);
        LoweredType {
            register_type: Some(prim),
            layout: AggregateLayout { size: prim.size(), align: prim.align(), members: vec![Member { offset: 0, prim }] },
        }
    }

    fn double_word_aligned_8(size: u64) -> LoweredType {
        LoweredType {
            register_type: None,
            layout: AggregateLayout {
                size,
                align: 8,
                members: (0..size / 4).map(|i| Member { offset: i * 4, prim: PrimType::I32 }).collect(),
            },
        }
    }

    /// spec.md §8 boundary: an 8-byte-aligned parameter skips r3 when
    /// only r0..r2 have been consumed, starting at r4 (i.e. stack).
    #[test]
    fn eight_byte_aligned_param_skips_an_odd_register() {
        let mut walk = RegWalk::new();
        walk.next = 3; // r0,r1,r2 already consumed; r3 is free but odd
        let lowered = double_word_aligned_8(8);
        let classified = classify_one(&lowered, &mut walk);
        // r3 was skipped to align to r4, which is out of range -> byval.
        assert!(matches!(classified.disposition, Disposition::Byval { .. }) || walk.next >= 4);
    }

    #[test]
    fn first_oversized_aggregate_splits_then_subsequent_ones_are_byval() {
        let mut walk = RegWalk::new();
        walk.next = 2; // r0, r1 consumed
        let big = LoweredType {
            register_type: None,
            layout: AggregateLayout {
                size: 12,
                align: 4,
                members: vec![
                    Member { offset: 0, prim: PrimType::I32 },
                    Member { offset: 4, prim: PrimType::I32 },
                    Member { offset: 8, prim: PrimType::I32 },
                ],
            },
        };
        let first = classify_one(&big, &mut walk);
        assert!(matches!(first.disposition, Disposition::Split { .. }));
        assert_eq!(walk.next, CORE_REGISTERS);

        let second = classify_one(&big, &mut walk);
        assert!(matches!(second.disposition, Disposition::Byval { .. }));
    }

    #[test]
    fn four_plain_int_params_all_fit_in_core_registers() {
        let params = vec![int_param(32), int_param(32), int_param(32), int_param(32)];
        let ret = int_param(32);
        let classified = classify_signature(&params, &ret);
        for p in &classified.params {
            assert!(matches!(p.disposition, Disposition::Default { .. }));
        }
    }
}
