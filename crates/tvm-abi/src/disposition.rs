//! Parameter/return dispositions and the classified signature they form
//! (spec.md §4.5).

use bitflags::bitflags;
use tvm_ir::lowering::{LoweredType, PrimType};

bitflags! {
    /// Per-parameter ABI attribute flags (spec.md §6.3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttrFlags: u8 {
        const BYVAL = 0b01;
        const INREG = 0b10;
    }
}

/// A synthetic type an aggregate is bitcast through memory to satisfy a
/// calling convention (spec.md §4.5, GLOSSARY "Coercion type").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionType {
    pub members: Vec<PrimType>,
}

impl CoercionType {
    pub fn single(prim: PrimType) -> Self {
        CoercionType { members: vec![prim] }
    }
}

/// spec.md §4.5 "A disposition is one of: default, byval, inreg, ignore,
/// split".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Default {
        coerce_to: Option<CoercionType>,
        expand: bool,
    },
    Byval {
        align: u64,
    },
    Inreg {
        coerce_to: Option<CoercionType>,
    },
    Ignore,
    /// ARM-only: head bytes in a register, tail bytes as a `byval`
    /// pointer.
    Split {
        head: CoercionType,
        tail_align: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedParam {
    pub disposition: Disposition,
    pub attrs: AttrFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSignature {
    pub params: Vec<ClassifiedParam>,
    pub ret: ClassifiedParam,
    /// spec.md §4.5 step 2: "If the return disposition is byval, insert
    /// an sret pointer at the head of the argument list and mark the
    /// function as sret."
    pub sret_synthesized: bool,
}

pub(crate) fn default_disposition(lowered: &LoweredType) -> Disposition {
    if lowered.layout.size == 0 {
        return Disposition::Ignore;
    }
    match lowered.register_type {
        Some(_) => Disposition::Default {
            coerce_to: None,
            expand: false,
        },
        None => Disposition::Default {
            coerce_to: Some(CoercionType {
                members: lowered.layout.members.iter().map(|m| m.prim).collect(),
            }),
            expand: true,
        },
    }
}
