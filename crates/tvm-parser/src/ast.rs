//! The TVM module AST (spec.md §3.3).
//!
//! Shaped directly on the original parser's `Parser::*` node hierarchy
//! (`GlobalElement`, `FunctionTypeExpression`, `Block`, `NamedExpression`,
//! `Expression`), re-expressed as plain Rust enums instead of an
//! inheritance hierarchy of heap-allocated nodes — there is no polymorphic
//! dispatch in this tree, so a tagged union is both simpler and matches
//! design note §9 ("re-express as a tagged union").

use std::sync::Arc;
use tvm_lexer::{BigInt, PhysicalLocation, Width};

/// Visibility of a symbol across translation units (spec.md §4.2 "Linkage
/// keywords"). Missing linkage in source defaults to `Private`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Local,
    Private,
    Odr,
    Export,
    Import,
}

impl Default for Linkage {
    fn default() -> Self {
        Linkage::Private
    }
}

/// Calling convention named on a function type; `cc_c` selects the C ABI,
/// absence selects the TVM-native convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    Tvm,
    C,
}

impl Default for CallingConvention {
    fn default() -> Self {
        CallingConvention::Tvm
    }
}

/// Per-parameter attribute bits (spec.md §3.3/§6.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamAttrs {
    pub byval: bool,
    pub inreg: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub globals: Vec<NamedGlobal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedGlobal {
    pub name: String,
    pub element: GlobalElement,
    pub location: PhysicalLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalElement {
    Function(Function),
    GlobalVariable(GlobalVariable),
    GlobalDefine(GlobalDefine),
    RecursiveType(RecursiveType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub linkage: Linkage,
    pub function_type: FunctionType,
    pub blocks: Option<Vec<Block>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub constant: bool,
    pub linkage: Linkage,
    pub ty: Box<Expr>,
    pub initializer: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDefine {
    pub value: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveType {
    pub phantom_params: Vec<Param>,
    pub params: Vec<Param>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub calling_convention: CallingConvention,
    pub sret: bool,
    pub phantom_params: Vec<Param>,
    pub params: Vec<Param>,
    pub result_attrs: ParamAttrs,
    pub result_type: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub attrs: ParamAttrs,
    pub ty: Box<Expr>,
    pub location: PhysicalLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: Option<String>,
    pub dominator: Option<String>,
    pub landing_pad: bool,
    pub statements: Vec<Statement>,
    pub location: PhysicalLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub name: Option<String>,
    pub expr: Expr,
    pub location: PhysicalLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    pub predecessor: Option<String>,
    pub value: Box<Expr>,
    pub location: PhysicalLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A bare `%name` reference.
    Name(String, PhysicalLocation),
    /// An operator applied to zero or more operand expressions, e.g.
    /// `(add %a %b)` or a bare zero-arity operator such as `true`.
    Call {
        operator: String,
        operands: Vec<Expr>,
        location: PhysicalLocation,
    },
    /// An integer literal, carrying its declared width/signedness and
    /// parsed value.
    IntLiteral {
        width: Width,
        signed: bool,
        value: Arc<BigInt>,
        location: PhysicalLocation,
    },
    FunctionType(Box<FunctionType>, PhysicalLocation),
    /// `exists ( params ) > body`: a type-level existential quantifier.
    Exists {
        params: Vec<Param>,
        body: Box<Expr>,
        location: PhysicalLocation,
    },
    Phi {
        ty: Box<Expr>,
        nodes: Vec<PhiNode>,
        location: PhysicalLocation,
    },
}

impl Expr {
    pub fn location(&self) -> &PhysicalLocation {
        match self {
            Expr::Name(_, loc) => loc,
            Expr::Call { location, .. } => location,
            Expr::IntLiteral { location, .. } => location,
            Expr::FunctionType(_, loc) => loc,
            Expr::Exists { location, .. } => location,
            Expr::Phi { location, .. } => location,
        }
    }
}
