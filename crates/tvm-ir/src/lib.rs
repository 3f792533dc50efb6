//! The typed SSA value graph, module builder, and aggregate-lowering
//! pass (spec.md §3.4, §4.3, §4.4).

pub mod builder;
pub mod error;
pub mod function;
pub mod lowering;
pub mod module;
pub mod value;

pub use builder::build_module;
pub use error::SemanticError;
pub use function::{FunctionSignature, IrBlock, IrDefine, IrFunction, IrGlobal, IrModule, IrRecursiveType, ParamSig};
pub use lowering::{
    lower_module, AggregateLayout, LoweredType, LoweredValue, Member, ModuleRewriter, TargetCallback,
};
pub use module::Module;
pub use value::{Category, InternKey, Payload, UseEdge, Value, ValueId};
