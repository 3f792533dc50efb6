//! The typed SSA value graph with bidirectional use-edges (spec.md §3.4,
//! §4.3).
//!
//! Grounded on design note §9's resolution of the original `User`/`Used`
//! intrusive list: "an arena + 32-bit index pair (no lifetime complexity,
//! O(1) replacement)". Values live in a single flat arena owned by
//! [`crate::module::Module`]; operand edges are plain [`ValueId`]s, and
//! each value keeps an explicit reverse-edge list (`users`) instead of the
//! original's circular intrusive list — slot-index recovery is then a
//! direct field read rather than a list walk, which is the one place this
//! implementation knowingly departs from the original's representation
//! while preserving its observable behavior (spec.md §8 invariants 1-2).

use std::fmt;

/// An index into a [`crate::module::Module`]'s value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// spec.md §3.4: "category (functional/parameter/instruction/block/
/// global/recursive)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Functional,
    Parameter,
    Instruction,
    Block,
    Global,
    Recursive,
}

/// The category-specific payload. A tagged union rather than a deep
/// inheritance hierarchy, per design note §9.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The distinguished `Metatype`, or a bare functional tag with no
    /// associated data (most type constructors and operators).
    Tag(String),
    /// An integer literal's width/signedness, duplicated here from the
    /// AST so the lowering pass never needs to reach back into it.
    IntLiteral {
        width: tvm_lexer::Width,
        signed: bool,
        bits: u128,
    },
    /// A named global, parameter, or block.
    Name(String),
    None,
}

/// A reverse edge: `owner.operands[slot] == <the value holding this edge>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseEdge {
    pub owner: ValueId,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct Value {
    /// `None` only for the self-typed `Metatype` singleton.
    pub ty: Option<ValueId>,
    pub category: Category,
    pub payload: Payload,
    pub operands: Vec<ValueId>,
    pub(crate) users: Vec<UseEdge>,
}

impl Value {
    pub fn users(&self) -> &[UseEdge] {
        &self.users
    }
}

/// The structural interning key for a functional value (spec.md §4.3
/// "Interning of functional values"): `(tag, operand-ids, type-id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternKey {
    pub tag: String,
    pub operands: Vec<ValueId>,
    pub ty: ValueId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_id_displays_as_percent_prefixed_index() {
        assert_eq!(ValueId(7).to_string(), "%7");
    }
}
