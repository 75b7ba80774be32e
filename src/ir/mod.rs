//! Representation of functions in the middle end.

mod builtin;
pub mod condcodes;
pub mod dfg;
pub mod entities;
mod extfunc;
pub mod function;
pub mod instructions;
pub mod layout;
pub mod memref;
mod progpoint;
mod pts;
pub mod types;

pub use crate::ir::builtin::Builtin;
pub use crate::ir::condcodes::{CondCode, IntCC};
pub use crate::ir::dfg::{DataFlowGraph, ValueData, ValueDef};
pub use crate::ir::entities::{AnyEntity, Block, Field, FuncRef, Inst, MemState, Type, Value, Var};
pub use crate::ir::extfunc::ExtFuncData;
pub use crate::ir::function::{DisplayFunction, Function, Linkage, RangeInfo, VarData, VarKind};
pub use crate::ir::instructions::{
    ArgValue, AssertExpr, BinaryOp, CallArg, CallData, CallDest, CallFlags, Callee, InstData,
    Operand, RetVal, SwitchCase, UnaryOp,
};
pub use crate::ir::layout::Layout;
pub use crate::ir::memref::{Component, Deref, MemRef, RefBase};
pub use crate::ir::progpoint::ProgramPoint;
pub use crate::ir::pts::{PointsToInfo, PtSolution};
pub use crate::ir::types::{FieldData, RecordBuilder, TypeData, TypeKind, TypeStore};
