//! The value-graph arena plus the module-level symbol table and
//! interning table (spec.md §3.4, §4.3).

use std::collections::HashMap;

use tvm_lexer::PhysicalLocation;

use crate::error::SemanticError;
use crate::value::{Category, InternKey, Payload, UseEdge, Value, ValueId};

pub struct Module {
    values: Vec<Value>,
    metatype: ValueId,
    /// spec.md §4.3 "Global symbol table": name -> value, duplicate
    /// names rejected.
    symbols: HashMap<String, ValueId>,
    /// spec.md §4.3 "Interning of functional values".
    interned: HashMap<InternKey, ValueId>,
}

impl Module {
    pub fn new() -> Self {
        let mut module = Module {
            values: Vec::new(),
            metatype: ValueId(0),
            symbols: HashMap::new(),
            interned: HashMap::new(),
        };
        let id = ValueId(0);
        module.values.push(Value {
            ty: Some(id),
            category: Category::Functional,
            payload: Payload::Tag("Metatype".to_string()),
            operands: Vec::new(),
            users: Vec::new(),
        });
        module
    }

    pub fn metatype(&self) -> ValueId {
        self.metatype
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.index()]
    }

    pub fn symbol(&self, name: &str) -> Option<ValueId> {
        self.symbols.get(name).copied()
    }

    fn push(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(value);
        id
    }

    /// Registers a fresh value's operand edges by appending the reverse
    /// edge to every operand's user list. Must be called exactly once,
    /// right after a value with non-empty `operands` is pushed.
    fn link_operands(&mut self, owner: ValueId) {
        let operands = self.values[owner.index()].operands.clone();
        for (slot, operand) in operands.into_iter().enumerate() {
            self.values[operand.index()].users.push(UseEdge { owner, slot });
        }
    }

    /// Intern a functional value by `(tag, operands, type)` (spec.md
    /// §4.3): the same inputs always yield the same node.
    pub fn intern_functional(&mut self, tag: &str, operands: Vec<ValueId>, ty: ValueId) -> ValueId {
        let key = InternKey {
            tag: tag.to_string(),
            operands: operands.clone(),
            ty,
        };
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.push(Value {
            ty: Some(ty),
            category: Category::Functional,
            payload: Payload::Tag(tag.to_string()),
            operands,
            users: Vec::new(),
        });
        self.link_operands(id);
        self.interned.insert(key, id);
        id
    }

    pub fn intern_int_literal(
        &mut self,
        width: tvm_lexer::Width,
        signed: bool,
        bits: u128,
        ty: ValueId,
    ) -> ValueId {
        let key = InternKey {
            tag: format!("intlit:{width:?}:{signed}:{bits:#x}"),
            operands: Vec::new(),
            ty,
        };
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.push(Value {
            ty: Some(ty),
            category: Category::Functional,
            payload: Payload::IntLiteral { width, signed, bits },
            operands: Vec::new(),
            users: Vec::new(),
        });
        self.interned.insert(key, id);
        id
    }

    /// A non-interned instruction, appended to `block` by the caller.
    pub fn new_instruction(&mut self, tag: &str, operands: Vec<ValueId>, ty: ValueId) -> ValueId {
        let id = self.push(Value {
            ty: Some(ty),
            category: Category::Instruction,
            payload: Payload::Tag(tag.to_string()),
            operands,
            users: Vec::new(),
        });
        self.link_operands(id);
        id
    }

    pub fn new_parameter(&mut self, name: Option<String>, ty: ValueId) -> ValueId {
        let id = self.push(Value {
            ty: Some(ty),
            category: Category::Parameter,
            payload: match name {
                Some(n) => Payload::Name(n),
                None => Payload::None,
            },
            operands: Vec::new(),
            users: Vec::new(),
        });
        id
    }

    pub fn new_block(&mut self, name: Option<String>, ty: ValueId) -> ValueId {
        self.push(Value {
            ty: Some(ty),
            category: Category::Block,
            payload: match name {
                Some(n) => Payload::Name(n),
                None => Payload::None,
            },
            operands: Vec::new(),
            users: Vec::new(),
        })
    }

    pub fn new_recursive(&mut self, name: String, ty: ValueId) -> ValueId {
        self.push(Value {
            ty: Some(ty),
            category: Category::Recursive,
            payload: Payload::Name(name),
            operands: Vec::new(),
            users: Vec::new(),
        })
    }

    /// spec.md §4.3 "Global symbol table": inserts `id` under `name`,
    /// rejecting duplicates.
    pub fn new_global(
        &mut self,
        name: String,
        id: ValueId,
        location: &PhysicalLocation,
    ) -> Result<(), SemanticError> {
        if self.symbols.contains_key(&name) {
            return Err(SemanticError::DuplicateSymbol {
                name,
                location: location.clone(),
            });
        }
        self.symbols.insert(name, id);
        Ok(())
    }

    /// *Set operand slot `k` of `u` to `v`* (spec.md §4.3): unlinks the
    /// old edge (if any) and splices `u` into `v`'s user list.
    pub fn set_operand(&mut self, owner: ValueId, slot: usize, new_operand: ValueId) {
        let old = self.values[owner.index()].operands[slot];
        self.values[old.index()].users.retain(|e| !(e.owner == owner && e.slot == slot));
        self.values[owner.index()].operands[slot] = new_operand;
        self.values[new_operand.index()].users.push(UseEdge {
            owner,
            slot,
        });
    }

    /// *Replace `v` with `w`* (spec.md §4.3, §8 invariant 2): O(users of
    /// `v`). Every edge that pointed at `v` now points at `w`, and `w`
    /// inherits the entire reverse-edge list; `v.users` becomes empty.
    pub fn replace_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let edges = std::mem::take(&mut self.values[old.index()].users);
        for edge in &edges {
            self.values[edge.owner.index()].operands[edge.slot] = new;
        }
        self.values[new.index()].users.extend(edges);
    }

    pub fn users_of(&self, id: ValueId) -> &[UseEdge] {
        &self.values[id.index()].users
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_type_of_metatype_is_metatype() {
        let module = Module::new();
        let mt = module.metatype();
        assert_eq!(module.value(mt).ty, Some(mt));
    }

    #[test]
    fn interning_returns_the_same_node_for_the_same_inputs() {
        let mut module = Module::new();
        let mt = module.metatype();
        let i32_ty = module.intern_functional("i32", vec![], mt);
        let x = module.intern_functional("x", vec![], i32_ty);
        let y = module.intern_functional("y", vec![], i32_ty);

        let a1 = module.intern_functional("add", vec![x, y], i32_ty);
        let a2 = module.intern_functional("add", vec![x, y], i32_ty);
        assert_eq!(a1, a2);
    }

    #[test]
    fn every_operand_edge_has_a_matching_reverse_edge() {
        let mut module = Module::new();
        let mt = module.metatype();
        let i32_ty = module.intern_functional("i32", vec![], mt);
        let x = module.intern_functional("x", vec![], i32_ty);
        let y = module.intern_functional("y", vec![], i32_ty);
        let add = module.intern_functional("add", vec![x, y], i32_ty);

        let users_of_x = module.users_of(x);
        assert_eq!(users_of_x.len(), 1);
        assert_eq!(users_of_x[0].owner, add);
        assert_eq!(users_of_x[0].slot, 0);
    }

    /// spec.md §8 S5.
    #[test]
    fn replace_uses_rewires_every_former_user_and_empties_the_old_list() {
        let mut module = Module::new();
        let mt = module.metatype();
        let i32_ty = module.intern_functional("i32", vec![], mt);
        let x = module.intern_functional("x", vec![], i32_ty);
        let y = module.intern_functional("y", vec![], i32_ty);
        let z = module.intern_functional("z", vec![], i32_ty);
        let w = module.intern_functional("w", vec![], i32_ty);

        let a = module.intern_functional("add", vec![x, y], i32_ty);
        let b = module.intern_functional("add", vec![a, z], i32_ty);
        let c = module.intern_functional("add", vec![a, w], i32_ty);
        let a_prime = module.intern_functional("add", vec![x, x], i32_ty);

        module.replace_uses(a, a_prime);

        assert_eq!(module.value(b).operands[0], a_prime);
        assert_eq!(module.value(c).operands[0], a_prime);
        assert!(module.users_of(a).is_empty());
        assert_eq!(module.users_of(a_prime).len(), 2);
    }
}
