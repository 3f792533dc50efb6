//! AST → typed value graph (spec.md §4.3 "Module builder", §2 row
//! "AST → typed value graph with name resolution, block/phi
//! construction").
//!
//! Two scopes of name resolution are modeled:
//! - **Module scope**: global symbols (`%name` for an already-built
//!   earlier function/global/define/recursive-type). Forward references
//!   between globals are not supported — a deliberate simplification
//!   recorded in DESIGN.md, since spec.md leaves global ordering
//!   unconstrained and the distilled grammar has no separate
//!   "declaration" form to forward-declare a symbol.
//! - **Function scope**: phantom/ordinary parameters, block labels, and
//!   statement names, all visible for the remainder of the function
//!   being built.

use std::collections::HashMap;

use tvm_lexer::PhysicalLocation;
use tvm_parser::ast::{self, Expr, GlobalElement};

use crate::error::SemanticError;
use crate::function::{FunctionSignature, IrBlock, IrDefine, IrFunction, IrGlobal, IrModule, IrRecursiveType, ParamSig};
use crate::value::ValueId;

/// Type-level constructors: a `Call` tagged with one of these names is
/// itself a type (its value-graph type is `Metatype`), per spec.md §3.3
/// ("expression ... function-type literal, exists-type") and the §6.1
/// example `(int #32)`.
const TYPE_CONSTRUCTORS: &[&str] = &["int", "ptr", "struct", "union", "array"];

#[derive(Default, Clone)]
struct Scope {
    names: HashMap<String, ValueId>,
    blocks: HashMap<String, ValueId>,
    default_entry: Option<ValueId>,
}

impl Scope {
    fn resolve_name(&self, name: &str) -> Option<ValueId> {
        self.names.get(name).copied()
    }

    fn resolve_block(&self, name: Option<&str>) -> Option<ValueId> {
        match name {
            Some(n) => self.blocks.get(n).copied(),
            None => self.default_entry,
        }
    }
}

pub fn build_module(ast: &ast::Module) -> Result<IrModule, SemanticError> {
    let mut ir = IrModule::new();
    for global in &ast.globals {
        build_global(&mut ir, global)?;
    }
    Ok(ir)
}

fn build_global(ir: &mut IrModule, global: &ast::NamedGlobal) -> Result<(), SemanticError> {
    match &global.element {
        GlobalElement::Function(f) => build_function(ir, &global.name, &global.location, f),
        GlobalElement::GlobalVariable(gv) => build_global_variable(ir, &global.name, &global.location, gv),
        GlobalElement::GlobalDefine(gd) => build_define(ir, &global.name, &global.location, gd),
        GlobalElement::RecursiveType(rt) => build_recursive_type(ir, &global.name, &global.location, rt),
    }
}

fn module_scope() -> Scope {
    Scope::default()
}

fn build_function(
    ir: &mut IrModule,
    name: &str,
    location: &PhysicalLocation,
    f: &ast::Function,
) -> Result<(), SemanticError> {
    let metatype = ir.graph.metatype();
    let scope = module_scope();

    let phantom_params = build_param_sigs(ir, &f.function_type.phantom_params, &scope, false)?;
    let params = build_param_sigs(ir, &f.function_type.params, &scope, true)?;
    let result_type = build_type_expr(ir, &f.function_type.result_type, &scope)?;

    let signature = FunctionSignature {
        calling_convention: f.function_type.calling_convention,
        sret: f.function_type.sret,
        phantom_params,
        params,
        result_attrs: f.function_type.result_attrs,
        result_type,
    };

    let function_ty = build_function_type_value(ir, &signature, metatype);
    let id = ir.graph.new_recursive(name.to_string(), function_ty);
    // Functions are registered as `Global`-category in spirit (spec.md
    // §3.4 categories); `new_recursive` is reused here only because it
    // is the one constructor that stores a `Payload::Name` without
    // requiring operands — the category tag itself is overwritten below.
    ir.graph.value_mut(id).category = crate::value::Category::Global;
    ir.graph.new_global(name.to_string(), id, location)?;

    let mut fn_scope = scope.clone();
    for p in signature.phantom_params.iter().chain(signature.params.iter()) {
        if let (Some(n), Some(v)) = (&p.name, p.value) {
            fn_scope.names.insert(n.clone(), v);
        }
    }

    let blocks = match &f.blocks {
        Some(ast_blocks) => Some(build_blocks(ir, &mut fn_scope, ast_blocks)?),
        None => None,
    };

    ir.functions.push(IrFunction {
        id,
        name: name.to_string(),
        linkage: f.linkage,
        signature,
        blocks: blocks.unwrap_or_default(),
    });
    Ok(())
}

fn build_param_sigs(
    ir: &mut IrModule,
    params: &[ast::Param],
    scope: &Scope,
    runtime: bool,
) -> Result<Vec<ParamSig>, SemanticError> {
    params
        .iter()
        .map(|p| {
            let ty = build_type_expr(ir, &p.ty, scope)?;
            let value = if runtime {
                Some(ir.graph.new_parameter(p.name.clone(), ty))
            } else {
                None
            };
            Ok(ParamSig {
                name: p.name.clone(),
                attrs: p.attrs,
                ty,
                value,
            })
        })
        .collect()
}

fn build_function_type_value(ir: &mut IrModule, sig: &FunctionSignature, metatype: ValueId) -> ValueId {
    let mut operands = vec![sig.result_type];
    operands.extend(sig.phantom_params.iter().map(|p| p.ty));
    operands.extend(sig.params.iter().map(|p| p.ty));
    ir.graph.intern_functional("function", operands, metatype)
}

fn build_blocks(ir: &mut IrModule, scope: &mut Scope, ast_blocks: &[ast::Block]) -> Result<Vec<IrBlock>, SemanticError> {
    let metatype = ir.graph.metatype();
    let block_ty = ir.graph.intern_functional("block", vec![], metatype);

    let mut ids = Vec::with_capacity(ast_blocks.len());
    for (i, b) in ast_blocks.iter().enumerate() {
        let id = ir.graph.new_block(b.name.clone(), block_ty);
        if i == 0 {
            scope.default_entry = Some(id);
        }
        if let Some(name) = &b.name {
            scope.blocks.insert(name.clone(), id);
        }
        ids.push(id);
    }

    let mut blocks = Vec::with_capacity(ast_blocks.len());
    for (ast_block, id) in ast_blocks.iter().zip(ids.iter().copied()) {
        let dominator = match &ast_block.dominator {
            Some(name) => Some(scope.resolve_block(Some(name)).ok_or_else(|| SemanticError::UnknownName {
                name: name.clone(),
                location: ast_block.location.clone(),
            })?),
            None => None,
        };

        let mut statements = Vec::with_capacity(ast_block.statements.len());
        for stmt in &ast_block.statements {
            let value = build_statement_expr(ir, scope, &stmt.expr)?;
            statements.push(value);
            if let Some(name) = &stmt.name {
                scope.names.insert(name.clone(), value);
            }
        }

        blocks.push(IrBlock {
            id,
            name: ast_block.name.clone(),
            dominator,
            landing_pad: ast_block.landing_pad,
            statements,
        });
    }
    Ok(blocks)
}

fn build_statement_expr(ir: &mut IrModule, scope: &Scope, expr: &Expr) -> Result<ValueId, SemanticError> {
    match expr {
        Expr::Phi { ty, nodes, .. } => build_phi(ir, scope, ty, nodes),
        other => build_expr(ir, scope, other),
    }
}

fn build_phi(
    ir: &mut IrModule,
    scope: &Scope,
    ty: &Expr,
    nodes: &[ast::PhiNode],
) -> Result<ValueId, SemanticError> {
    let ty_id = build_type_expr(ir, ty, scope)?;
    let mut operands = vec![ty_id];
    for node in nodes {
        let pred = scope
            .resolve_block(node.predecessor.as_deref())
            .ok_or_else(|| SemanticError::UnknownName {
                name: node.predecessor.clone().unwrap_or_default(),
                location: node.location.clone(),
            })?;
        let value = build_expr(ir, scope, &node.value)?;
        operands.push(pred);
        operands.push(value);
    }
    Ok(ir.graph.new_instruction("phi", operands, ty_id))
}

/// Build an expression appearing in type position (parameter types,
/// global types/initializers, `define` bodies, result types). Equivalent
/// in grammar terms to [`tvm_parser::parser::Parser::parse_root_expression`].
fn build_type_expr(ir: &mut IrModule, expr: &Expr, scope: &Scope) -> Result<ValueId, SemanticError> {
    build_expr(ir, scope, expr)
}

fn build_expr(ir: &mut IrModule, scope: &Scope, expr: &Expr) -> Result<ValueId, SemanticError> {
    let metatype = ir.graph.metatype();
    match expr {
        Expr::Name(name, location) => scope
            .resolve_name(name)
            .or_else(|| ir.graph.symbol(name))
            .ok_or_else(|| SemanticError::UnknownName {
                name: name.clone(),
                location: location.clone(),
            }),
        Expr::IntLiteral {
            width,
            signed,
            value,
            ..
        } => {
            let ty_tag = literal_type_tag(*width, *signed);
            let ty = ir.graph.intern_functional(&ty_tag, vec![], metatype);
            Ok(ir.graph.intern_int_literal(*width, *signed, value.raw_bits(), ty))
        }
        Expr::Call {
            operator,
            operands,
            ..
        } => {
            let operand_ids = operands
                .iter()
                .map(|o| build_expr(ir, scope, o))
                .collect::<Result<Vec<_>, _>>()?;
            let ty = infer_call_type(ir, operator, &operand_ids, metatype);
            if TYPE_CONSTRUCTORS.contains(&operator.as_str()) {
                Ok(ir.graph.intern_functional(operator, operand_ids, ty))
            } else {
                Ok(ir.graph.new_instruction(operator, operand_ids, ty))
            }
        }
        Expr::FunctionType(ft, _) => {
            let phantom_params = build_param_sigs(ir, &ft.phantom_params, scope, false)?;
            let params = build_param_sigs(ir, &ft.params, scope, false)?;
            let result_type = build_type_expr(ir, &ft.result_type, scope)?;
            let signature = FunctionSignature {
                calling_convention: ft.calling_convention,
                sret: ft.sret,
                phantom_params,
                params,
                result_attrs: ft.result_attrs,
                result_type,
            };
            Ok(build_function_type_value(ir, &signature, metatype))
        }
        Expr::Exists { params, body, .. } => {
            let mut inner = scope.clone();
            let param_sigs = build_param_sigs(ir, params, &inner, false)?;
            for p in &param_sigs {
                if let Some(n) = &p.name {
                    inner.names.insert(n.clone(), p.ty);
                }
            }
            let body_id = build_type_expr(ir, body, &inner)?;
            let mut operands: Vec<ValueId> = param_sigs.iter().map(|p| p.ty).collect();
            operands.push(body_id);
            Ok(ir.graph.intern_functional("exists", operands, metatype))
        }
        Expr::Phi { ty, nodes, .. } => build_phi(ir, scope, ty, nodes),
    }
}

fn infer_call_type(ir: &mut IrModule, operator: &str, operands: &[ValueId], metatype: ValueId) -> ValueId {
    if TYPE_CONSTRUCTORS.contains(&operator) {
        return metatype;
    }
    if let Some(stripped) = operator.strip_prefix("cmp_") {
        let _ = stripped;
        return ir.graph.intern_functional("i1", vec![], metatype);
    }
    operands
        .first()
        .and_then(|&id| ir.graph.value(id).ty)
        .unwrap_or(metatype)
}

fn literal_type_tag(width: tvm_lexer::Width, signed: bool) -> String {
    let base = match width {
        tvm_lexer::Width::Byte => "8",
        tvm_lexer::Width::Short => "16",
        tvm_lexer::Width::Int => "32",
        tvm_lexer::Width::Long => "64",
        tvm_lexer::Width::Quad => "128",
        tvm_lexer::Width::IntPtr => "ptr",
    };
    format!("{}{}", if signed { "i" } else { "u" }, base)
}

fn build_global_variable(
    ir: &mut IrModule,
    name: &str,
    location: &PhysicalLocation,
    gv: &ast::GlobalVariable,
) -> Result<(), SemanticError> {
    let scope = module_scope();
    let ty = build_type_expr(ir, &gv.ty, &scope)?;
    let initializer = gv.initializer.as_ref().map(|e| build_expr(ir, &scope, e)).transpose()?;
    let id = ir.graph.new_parameter(Some(name.to_string()), ty);
    ir.graph.value_mut(id).category = crate::value::Category::Global;
    ir.graph.new_global(name.to_string(), id, location)?;
    ir.globals.push(IrGlobal {
        id,
        name: name.to_string(),
        linkage: gv.linkage,
        constant: gv.constant,
        ty,
        initializer,
    });
    Ok(())
}

fn build_define(
    ir: &mut IrModule,
    name: &str,
    location: &PhysicalLocation,
    gd: &ast::GlobalDefine,
) -> Result<(), SemanticError> {
    let scope = module_scope();
    let value = build_type_expr(ir, &gd.value, &scope)?;
    ir.graph.new_global(name.to_string(), value, location)?;
    ir.defines.push(IrDefine {
        name: name.to_string(),
        value,
    });
    Ok(())
}

fn build_recursive_type(
    ir: &mut IrModule,
    name: &str,
    location: &PhysicalLocation,
    rt: &ast::RecursiveType,
) -> Result<(), SemanticError> {
    let metatype = ir.graph.metatype();
    let scope = module_scope();
    let phantom_params = build_param_sigs(ir, &rt.phantom_params, &scope, false)?;
    let mut inner = scope.clone();
    for p in &phantom_params {
        if let Some(n) = &p.name {
            inner.names.insert(n.clone(), p.ty);
        }
    }
    let params = build_param_sigs(ir, &rt.params, &inner, false)?;
    for p in &params {
        if let Some(n) = &p.name {
            inner.names.insert(n.clone(), p.ty);
        }
    }
    let id = ir.graph.new_recursive(name.to_string(), metatype);
    ir.graph.new_global(name.to_string(), id, location)?;
    let body = build_type_expr(ir, &rt.body, &inner)?;

    ir.recursive_types.push(IrRecursiveType {
        id,
        name: name.to_string(),
        phantom_params,
        params,
        body,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(src: &str) -> IrModule {
        let ast = tvm_parser::parse_module("t.tvm", src).expect("parse");
        build_module(&ast).expect("build")
    }

    #[test]
    fn builds_a_define_of_an_int_literal() {
        let ir = build("%x = define #ix10;");
        assert_eq!(ir.defines.len(), 1);
        assert_eq!(ir.defines[0].name, "x");
    }

    /// spec.md §8 S2 (build half: the add instruction's operands resolve
    /// to the function's own parameters).
    #[test]
    fn builds_a_function_with_a_return_of_an_add() {
        let ir = build(
            "%f = export function (%a : #i32, %b : #i32) > #i32 {\n\
                return (add %a %b);\n\
            };",
        );
        let f = ir.function("f").unwrap();
        assert_eq!(f.signature.params.len(), 2);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].statements.len(), 1);
        let ret = ir.graph.value(f.blocks[0].statements[0]);
        assert_eq!(ret.operands.len(), 1);
        let add = ir.graph.value(ret.operands[0]);
        assert_eq!(add.operands.len(), 2);
    }

    #[test]
    fn rejects_duplicate_global_names() {
        let ast = tvm_parser::parse_module(
            "t.tvm",
            "%x = define #i10;\n%x = define #i20;",
        )
        .unwrap();
        let err = build_module(&ast).unwrap_err();
        matches!(err, SemanticError::DuplicateSymbol { .. });
    }

    #[test]
    fn rejects_unknown_names() {
        let ast = tvm_parser::parse_module("t.tvm", "%x = define %nope;").unwrap();
        let err = build_module(&ast).unwrap_err();
        matches!(err, SemanticError::UnknownName { .. });
    }
}
