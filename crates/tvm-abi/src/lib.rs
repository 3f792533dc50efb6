//! Calling-convention engine: classifies TVM function signatures for
//! System V AMD64, x86 cdecl, and ARM EABI, and implements
//! [`tvm_ir::lowering::TargetCallback`] so the aggregate-lowering pass
//! can drive it directly (spec.md §4.5).
//!
//! Beyond classification, this engine *is* the §4.5 rewrite: it retypes
//! each function's signature to its lowered registers/`byval`
//! pointers/`sret` pointer, reconstructs each source parameter at
//! function entry from an `alloca`'d stack slot (`lower_function_entry`),
//! and rewrites call sites and `return` statements to match
//! (`lower_function_call`/`lower_return`), grounded on
//! `original_source/src/Tvm/ModuleRewriter.cpp`'s rewrite shape and
//! `CallingConventions.cpp`'s classify-then-apply split.

pub mod amd64;
pub mod arm;
pub mod disposition;
pub mod error;
pub mod select;
pub mod x86;

use std::collections::HashMap;

use tvm_ir::function::{IrModule, ParamSig};
use tvm_ir::lowering::{
    self, AggregateLoweringPass, LoweredType, LoweredValue, PrimType, TargetCallback,
};
use tvm_ir::value::ValueId;

pub use disposition::{AttrFlags, ClassifiedParam, ClassifiedSignature, CoercionType, Disposition};
pub use error::TargetError;
pub use select::{select_cc, Convention};

/// Drives classification for every function in a module against one
/// target triple/calling-convention pair, and caches the result for
/// later backend consumption.
pub struct CallingConventionEngine {
    convention: Convention,
    signatures: HashMap<ValueId, ClassifiedSignature>,
    /// Each function's pre-lowering `(params, result_type)`, kept so
    /// `lower_function_entry` can reconstruct against the original
    /// shape after `lower_function` has already overwritten it.
    old_signatures: HashMap<ValueId, (Vec<ParamSig>, ValueId)>,
    /// The synthesized `sret` pointer parameter per function, consulted
    /// by `lower_return`.
    sret_params: HashMap<ValueId, ValueId>,
}

impl CallingConventionEngine {
    pub fn new(triple: &str, cc_name: &str) -> Result<Self, TargetError> {
        let convention = select_cc(triple, cc_name)?;
        Ok(CallingConventionEngine {
            convention,
            signatures: HashMap::new(),
            old_signatures: HashMap::new(),
            sret_params: HashMap::new(),
        })
    }

    /// The classified signature recorded for `function_id` by a prior
    /// [`tvm_ir::lowering::lower_module`] run, if any.
    pub fn signature_of(&self, function_id: ValueId) -> Option<&ClassifiedSignature> {
        self.signatures.get(&function_id)
    }

    fn param_types(ir: &IrModule, function_id: ValueId) -> Vec<ValueId> {
        ir.functions
            .iter()
            .find(|f| f.id == function_id)
            .map(|f| f.signature.params.iter().map(|p| p.ty).collect())
            .unwrap_or_default()
    }

    fn result_type(ir: &IrModule, function_id: ValueId) -> Option<ValueId> {
        ir.functions.iter().find(|f| f.id == function_id).map(|f| f.signature.result_type)
    }

    /// The lowered result type for a function whose signature has
    /// already been rewritten by `lower_function` (spec.md §4.5 step
    /// 2): `void` when `sret`/ignored, a packed register when the
    /// return coerces through more than one member, otherwise the
    /// single register type.
    fn lowered_result_type(ir: &mut IrModule, classified: &ClassifiedSignature, lowered_ret: &LoweredType) -> ValueId {
        if classified.sret_synthesized {
            return lowering::void_type_value(ir);
        }
        match &classified.ret.disposition {
            Disposition::Ignore => lowering::void_type_value(ir),
            Disposition::Default { coerce_to: None, .. } | Disposition::Inreg { coerce_to: None } => {
                lowering::register_type_value(ir, lowered_ret.register_type.unwrap_or(PrimType::I64))
            }
            Disposition::Default { coerce_to: Some(ct), .. } | Disposition::Inreg { coerce_to: Some(ct) } => {
                let total: u64 = ct.members.iter().map(|m| m.size()).sum();
                lowering::register_type_value(ir, PrimType::from_size(total))
            }
            // Neither a `return`-position `byval` nor `split` occurs
            // without also setting `sret_synthesized` (amd64/x86/arm all
            // route an oversized return through `sret` instead).
            Disposition::Byval { .. } | Disposition::Split { .. } => lowering::void_type_value(ir),
        }
    }

    /// Spills `value` (of type `value_ty`) to a fresh stack slot and
    /// loads each coercion member back out of it — the memory-mediated
    /// bitcast a register-coerced aggregate argument/return needs
    /// (spec.md §4.5 step 3). Returns the loaded register values and the
    /// instructions realizing them, in emission order.
    fn spill_and_decompose(
        ir: &mut IrModule,
        value: ValueId,
        value_ty: ValueId,
        members: &[PrimType],
    ) -> (Vec<ValueId>, Vec<ValueId>) {
        let mut prelude = Vec::new();
        let temp = lowering::make_alloca(ir, value_ty);
        prelude.push(temp);
        prelude.push(lowering::make_store(ir, temp, value));
        let mut offset = 0u64;
        let mut loaded = Vec::with_capacity(members.len());
        for member in members {
            let member_ty = lowering::register_type_value(ir, *member);
            let mptr = lowering::make_element_ptr(ir, temp, offset, member_ty);
            if mptr != temp {
                prelude.push(mptr);
            }
            let val = lowering::make_load(ir, mptr, member_ty);
            prelude.push(val);
            loaded.push(val);
            offset += member.size();
        }
        (loaded, prelude)
    }

    /// Spills `value` to a fresh stack slot and returns just the pointer
    /// (spec.md §4.5 step 3's `byval` case): the callee/caller on the
    /// other end of a `byval` edge only ever sees the pointer.
    fn spill_for_byval(ir: &mut IrModule, value: ValueId, value_ty: ValueId) -> (ValueId, Vec<ValueId>) {
        let temp = lowering::make_alloca(ir, value_ty);
        let store = lowering::make_store(ir, temp, value);
        (temp, vec![temp, store])
    }
}

impl TargetCallback for CallingConventionEngine {
    /// Rewrites a `call` instruction's argument list into its callee's
    /// lowered calling convention (spec.md §4.5 steps 3-4): `sret`
    /// pointer first, then each argument passed through, decomposed into
    /// registers, or spilled to a `byval` pointer per its disposition.
    fn lower_function_call(&mut self, ir: &mut IrModule, call: ValueId) -> Result<ValueId, String> {
        let (fi, bi, si) = match lowering::locate_statement(ir, call) {
            Some(loc) => loc,
            None => return Ok(call),
        };
        let operands = ir.graph.value(call).operands.clone();
        let callee = *operands.first().ok_or("call with no callee")?;
        let classified = match self.signatures.get(&callee).cloned() {
            Some(c) => c,
            // An indirect or not-yet-classified callee: leave the call
            // untouched rather than guess at its convention.
            None => return Ok(call),
        };
        let orig_args = &operands[1..];

        let mut new_operands = vec![callee];
        let mut prelude = Vec::new();
        let mut sret_ptr = None;

        if classified.sret_synthesized {
            let orig_result_ty = self
                .old_signatures
                .get(&callee)
                .map(|(_, rt)| *rt)
                .ok_or("sret callee missing its pre-lowering result type")?;
            let alloca_id = lowering::make_alloca(ir, orig_result_ty);
            prelude.push(alloca_id);
            new_operands.push(alloca_id);
            sret_ptr = Some(alloca_id);
        }

        for (arg, classified_param) in orig_args.iter().zip(classified.params.iter()) {
            let arg_ty = ir.graph.value(*arg).ty.ok_or("argument value has no type")?;
            match &classified_param.disposition {
                Disposition::Ignore => {}
                Disposition::Default { coerce_to: None, .. } | Disposition::Inreg { coerce_to: None } => {
                    new_operands.push(*arg);
                }
                Disposition::Default { coerce_to: Some(ct), .. } | Disposition::Inreg { coerce_to: Some(ct) } => {
                    let (loaded, stmts) = Self::spill_and_decompose(ir, *arg, arg_ty, &ct.members);
                    prelude.extend(stmts);
                    new_operands.extend(loaded);
                }
                Disposition::Byval { .. } => {
                    let (ptr, stmts) = Self::spill_for_byval(ir, *arg, arg_ty);
                    prelude.extend(stmts);
                    new_operands.push(ptr);
                }
                Disposition::Split { head, .. } => {
                    let (loaded, stmts) = Self::spill_and_decompose(ir, *arg, arg_ty, &head.members);
                    let head_size: u64 = head.members.iter().map(|m| m.size()).sum();
                    prelude.extend(stmts);
                    new_operands.extend(loaded);
                    let temp = *prelude.first().expect("spill_and_decompose always allocas first");
                    let tail_ty = lowering::ptr_type_value(ir);
                    let tail_ptr = lowering::make_element_ptr(ir, temp, head_size, tail_ty);
                    if tail_ptr != temp {
                        prelude.push(tail_ptr);
                    }
                    new_operands.push(tail_ptr);
                }
            }
        }

        let result_ty = match lowering::find_function_index(ir, callee) {
            Some(callee_fi) => ir.functions[callee_fi].signature.result_type,
            None => ir.graph.value(call).ty.unwrap_or(callee),
        };

        let new_call = ir.graph.new_instruction("call", new_operands, result_ty);
        ir.functions[fi].blocks[bi].statements.splice(si..=si, prelude.into_iter().chain(std::iter::once(new_call)));

        let representation = match sret_ptr {
            Some(ptr) => LoweredValue::Memory { ptr, ty_size: 0, ty_align: 0 },
            None => LoweredValue::Register(new_call),
        };
        match representation {
            LoweredValue::Register(v) => ir.graph.replace_uses(call, v),
            LoweredValue::Memory { ptr, .. } => ir.graph.replace_uses(call, ptr),
        }
        Ok(new_call)
    }

    /// Rewrites a `return` statement (spec.md §4.5 step 2/5): writes
    /// through the `sret` pointer when the callee's return was
    /// synthesized as one, or packs a multi-member coerced return
    /// through a stack temporary into the single register the lowered
    /// signature promises.
    fn lower_return(&mut self, ir: &mut IrModule, ret: ValueId) -> Result<ValueId, String> {
        let (fi, bi, si) = match lowering::locate_statement(ir, ret) {
            Some(loc) => loc,
            None => return Ok(ret),
        };
        let function_id = ir.functions[fi].id;
        let classified = match self.signatures.get(&function_id).cloned() {
            Some(c) => c,
            None => return Ok(ret),
        };
        let operand = ir.graph.value(ret).operands.first().copied();

        if classified.sret_synthesized {
            let sret_ptr = *self
                .sret_params
                .get(&function_id)
                .ok_or("sret function missing its recorded sret pointer")?;
            let mut prelude = Vec::new();
            if let Some(val) = operand {
                prelude.push(lowering::make_store(ir, sret_ptr, val));
            }
            let void_ty = lowering::void_type_value(ir);
            let new_ret = ir.graph.new_instruction("return", vec![], void_ty);
            ir.functions[fi].blocks[bi].statements.splice(si..=si, prelude.into_iter().chain(std::iter::once(new_ret)));
            ir.graph.replace_uses(ret, new_ret);
            return Ok(new_ret);
        }

        let needs_packing = matches!(
            &classified.ret.disposition,
            Disposition::Default { coerce_to: Some(ct), .. } | Disposition::Inreg { coerce_to: Some(ct) }
                if ct.members.len() > 1
        );
        if !needs_packing {
            return Ok(ret);
        }
        let members = match &classified.ret.disposition {
            Disposition::Default { coerce_to: Some(ct), .. } | Disposition::Inreg { coerce_to: Some(ct) } => ct.members.clone(),
            _ => unreachable!("needs_packing only set for a multi-member coercion"),
        };
        let val = operand.ok_or("return missing its operand for a non-void disposition")?;
        let val_ty = ir.graph.value(val).ty.ok_or("return operand has no type")?;
        let temp = lowering::make_alloca(ir, val_ty);
        let store_id = lowering::make_store(ir, temp, val);
        let total: u64 = members.iter().map(|m| m.size()).sum();
        let packed_ty = lowering::register_type_value(ir, PrimType::from_size(total));
        let loaded = lowering::make_load(ir, temp, packed_ty);
        let new_ret = ir.graph.new_instruction("return", vec![loaded], packed_ty);
        ir.functions[fi].blocks[bi].statements.splice(si..=si, [temp, store_id, loaded, new_ret]);
        ir.graph.replace_uses(ret, new_ret);
        Ok(new_ret)
    }

    /// Rewrites a function's declared signature into its ABI-lowered
    /// form (spec.md §4.5 step 2): an `sret` pointer first if the return
    /// disposition demands one, then each parameter's registers/`byval`
    /// pointer(s) in turn. The function's body isn't touched here —
    /// `lower_function_entry` reconstructs it once every function's
    /// external signature (needed by call sites) has been rewritten.
    fn lower_function(&mut self, ir: &mut IrModule, function_id: ValueId) -> Result<(), String> {
        let param_type_ids = Self::param_types(ir, function_id);
        let result_type_id = Self::result_type(ir, function_id)
            .ok_or_else(|| format!("no such function {function_id}"))?;

        let mut pass = AggregateLoweringPass::new(self);
        let lowered_params: Vec<LoweredType> = param_type_ids.iter().map(|&ty| pass_lower(&mut pass, ir, ty)).collect();
        let lowered_ret = pass_lower(&mut pass, ir, result_type_id);

        let classified = self.convention.classify(&lowered_params, &lowered_ret);

        let fi = lowering::find_function_index(ir, function_id).ok_or_else(|| format!("no such function {function_id}"))?;
        let old_params = ir.functions[fi].signature.params.clone();
        self.old_signatures.insert(function_id, (old_params.clone(), result_type_id));

        let mut new_params = Vec::new();
        if classified.sret_synthesized {
            let ptr_ty = lowering::ptr_type_value(ir);
            let sret_value = ir.graph.new_parameter(Some(format!("{}.sret", ir.functions[fi].name)), ptr_ty);
            self.sret_params.insert(function_id, sret_value);
            new_params.push(ParamSig {
                name: Some("sret".to_string()),
                attrs: tvm_parser::ast::ParamAttrs::default(),
                ty: ptr_ty,
                value: Some(sret_value),
            });
        }

        for ((orig, lowered), classified_param) in old_params.iter().zip(lowered_params.iter()).zip(classified.params.iter()) {
            match &classified_param.disposition {
                Disposition::Ignore => {}
                Disposition::Default { coerce_to: None, .. } | Disposition::Inreg { coerce_to: None } => {
                    let reg_ty = lowering::register_type_value(ir, lowered.register_type.unwrap_or(PrimType::I64));
                    if let Some(v) = orig.value {
                        ir.graph.value_mut(v).ty = reg_ty;
                    }
                    new_params.push(ParamSig {
                        name: orig.name.clone(),
                        attrs: orig.attrs,
                        ty: reg_ty,
                        value: orig.value,
                    });
                }
                Disposition::Default { coerce_to: Some(ct), .. } | Disposition::Inreg { coerce_to: Some(ct) } => {
                    for (i, member) in ct.members.iter().enumerate() {
                        let reg_ty = lowering::register_type_value(ir, *member);
                        let name = orig.name.as_ref().map(|n| format!("{n}.{i}"));
                        let v = ir.graph.new_parameter(name.clone(), reg_ty);
                        new_params.push(ParamSig { name, attrs: orig.attrs, ty: reg_ty, value: Some(v) });
                    }
                }
                Disposition::Byval { .. } => {
                    let ptr_ty = lowering::ptr_type_value(ir);
                    let v = ir.graph.new_parameter(orig.name.clone(), ptr_ty);
                    new_params.push(ParamSig { name: orig.name.clone(), attrs: orig.attrs, ty: ptr_ty, value: Some(v) });
                }
                Disposition::Split { head, .. } => {
                    for (i, member) in head.members.iter().enumerate() {
                        let reg_ty = lowering::register_type_value(ir, *member);
                        let name = orig.name.as_ref().map(|n| format!("{n}.{i}"));
                        let v = ir.graph.new_parameter(name.clone(), reg_ty);
                        new_params.push(ParamSig { name, attrs: orig.attrs, ty: reg_ty, value: Some(v) });
                    }
                    let ptr_ty = lowering::ptr_type_value(ir);
                    let tail_name = orig.name.as_ref().map(|n| format!("{n}.tail"));
                    let v = ir.graph.new_parameter(tail_name.clone(), ptr_ty);
                    new_params.push(ParamSig { name: tail_name, attrs: orig.attrs, ty: ptr_ty, value: Some(v) });
                }
            }
        }

        let new_result_ty = Self::lowered_result_type(ir, &classified, &lowered_ret);
        ir.functions[fi].signature.params = new_params;
        ir.functions[fi].signature.sret = classified.sret_synthesized;
        ir.functions[fi].signature.result_type = new_result_ty;
        self.signatures.insert(function_id, classified);
        Ok(())
    }

    /// Reconstructs each source parameter at function entry (spec.md
    /// §4.5 step 2, reversed): a register-fitting parameter is retyped
    /// in place (already done by `lower_function`), a coerced or `byval`
    /// parameter gets an `alloca`'d slot that the body's old references
    /// are redirected onto — never rematerializing an aggregate-typed
    /// SSA value, per invariant 3.
    fn lower_function_entry(&mut self, ir: &mut IrModule, function_id: ValueId) -> Result<(), String> {
        let (old_params, _old_result_ty) = match self.old_signatures.get(&function_id).cloned() {
            Some(v) => v,
            None => return Ok(()),
        };
        let classified = match self.signatures.get(&function_id).cloned() {
            Some(c) => c,
            None => return Ok(()),
        };
        let fi = lowering::find_function_index(ir, function_id).ok_or_else(|| format!("no such function {function_id}"))?;
        if ir.functions[fi].blocks.is_empty() {
            return Ok(());
        }

        let new_params = ir.functions[fi].signature.params.clone();
        let mut cursor = if classified.sret_synthesized { 1 } else { 0 };
        let mut entry_stmts = Vec::new();
        let mut value_map: HashMap<ValueId, LoweredValue> = HashMap::new();

        for (orig, classified_param) in old_params.iter().zip(classified.params.iter()) {
            match &classified_param.disposition {
                Disposition::Ignore => {}
                Disposition::Default { coerce_to: None, .. } | Disposition::Inreg { coerce_to: None } => {
                    let phys = new_params[cursor].value.ok_or("lowered register parameter has no value")?;
                    cursor += 1;
                    if let Some(old) = orig.value {
                        value_map.insert(old, LoweredValue::Register(phys));
                    }
                }
                Disposition::Default { coerce_to: Some(ct), .. } | Disposition::Inreg { coerce_to: Some(ct) } => {
                    let members: Vec<(PrimType, ValueId)> = ct
                        .members
                        .iter()
                        .enumerate()
                        .map(|(i, m)| new_params[cursor + i].value.map(|v| (*m, v)).ok_or("lowered member parameter has no value"))
                        .collect::<Result<_, _>>()?;
                    cursor += ct.members.len();
                    let alloca_id = lowering::make_alloca(ir, orig.ty);
                    entry_stmts.push(alloca_id);
                    let mut offset = 0u64;
                    for (member, phys) in members {
                        let member_ty = lowering::register_type_value(ir, member);
                        let mptr = lowering::make_element_ptr(ir, alloca_id, offset, member_ty);
                        if mptr != alloca_id {
                            entry_stmts.push(mptr);
                        }
                        entry_stmts.push(lowering::make_store(ir, mptr, phys));
                        offset += member.size();
                    }
                    if let Some(old) = orig.value {
                        value_map.insert(old, LoweredValue::Memory { ptr: alloca_id, ty_size: offset, ty_align: 0 });
                    }
                }
                Disposition::Byval { .. } => {
                    let phys = new_params[cursor].value.ok_or("byval parameter has no value")?;
                    cursor += 1;
                    if let Some(old) = orig.value {
                        value_map.insert(old, LoweredValue::Memory { ptr: phys, ty_size: 0, ty_align: 0 });
                    }
                }
                Disposition::Split { head, .. } => {
                    let head_members: Vec<(PrimType, ValueId)> = head
                        .members
                        .iter()
                        .enumerate()
                        .map(|(i, m)| new_params[cursor + i].value.map(|v| (*m, v)).ok_or("lowered split-head parameter has no value"))
                        .collect::<Result<_, _>>()?;
                    cursor += head.members.len();
                    let tail_ptr = new_params[cursor].value.ok_or("split-tail parameter has no value")?;
                    cursor += 1;

                    let alloca_id = lowering::make_alloca(ir, orig.ty);
                    entry_stmts.push(alloca_id);
                    let mut offset = 0u64;
                    for (member, phys) in head_members {
                        let member_ty = lowering::register_type_value(ir, member);
                        let mptr = lowering::make_element_ptr(ir, alloca_id, offset, member_ty);
                        if mptr != alloca_id {
                            entry_stmts.push(mptr);
                        }
                        entry_stmts.push(lowering::make_store(ir, mptr, phys));
                        offset += member.size();
                    }
                    let tail_ty = lowering::register_type_value(ir, PrimType::I64);
                    let tail_val = lowering::make_load(ir, tail_ptr, tail_ty);
                    entry_stmts.push(tail_val);
                    let dest_ptr = lowering::make_element_ptr(ir, alloca_id, offset, tail_ty);
                    if dest_ptr != alloca_id {
                        entry_stmts.push(dest_ptr);
                    }
                    entry_stmts.push(lowering::make_store(ir, dest_ptr, tail_val));
                    if let Some(old) = orig.value {
                        value_map.insert(old, LoweredValue::Memory { ptr: alloca_id, ty_size: 0, ty_align: 0 });
                    }
                }
            }
        }

        lowering::prepend_entry_statements(ir, function_id, entry_stmts)?;

        for (old, representation) in value_map {
            match representation {
                LoweredValue::Register(new_v) => ir.graph.replace_uses(old, new_v),
                LoweredValue::Memory { ptr, .. } => ir.graph.replace_uses(old, ptr),
            }
        }
        Ok(())
    }
}

fn pass_lower(pass: &mut AggregateLoweringPass<'_, CallingConventionEngine>, ir: &IrModule, ty: ValueId) -> LoweredType {
    pass.lower_type(ir, ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvm_ir::builder::build_module;

    fn build(src: &str) -> IrModule {
        let ast = tvm_parser::parse_module("test", src).expect("parses");
        build_module(&ast).expect("builds")
    }

    #[test]
    fn engine_classifies_and_records_a_simple_function_signature() {
        let ir = build(
            "%f = export function (%a:(int #i32),%b:(int #i32)) > (int #i32) {\n\
                return (add %a %b);\n\
            };",
        );
        let mut ir = ir;
        let mut engine = CallingConventionEngine::new("x86_64-unknown-linux-gnu", "cc_c").unwrap();
        let function_id = ir.functions[0].id;
        tvm_ir::lowering::lower_module(&mut ir, &mut engine).expect("lowers");
        let classified = engine.signature_of(function_id).expect("recorded");
        assert_eq!(classified.params.len(), 2);
    }

    #[test]
    fn engine_rejects_unsupported_triples_at_construction() {
        let err = CallingConventionEngine::new("riscv64-unknown-linux-gnu", "cc_c").unwrap_err();
        assert_eq!(err.convention, "cc_c");
    }
}
