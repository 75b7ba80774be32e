//! IR entity references.
//!
//! Instructions reference other entities in the function: blocks, SSA values, named
//! declarations, types and record fields, external functions, and memory states. These
//! references are not Rust references. They are structs wrapping a `u32` index into a table in
//! the [`Function`](super::Function), with a separate index type per entity so that they cannot
//! be confused with one another.
//!
//! We prefer `Option<EntityRef>` in function arguments and return values, and the
//! `PackedOption<EntityRef>` representation in compact data structures.
//!
//! The entity references all implement `Display`, printing a short prefix followed by the index.

use crate::entity::entity_impl;
use core::fmt;

/// An opaque reference to a basic block in a [`Function`](super::Function).
///
/// While the order is stable, it is arbitrary and does not necessarily resemble the layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
///
/// Every value has exactly one definition: an instruction result, or the incoming value of a
/// function parameter.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction in a [`Function`](super::Function).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a named declaration: a local, a parameter, the result slot, or a
/// global variable.
///
/// Declarations live in memory. Their scalar contents, once promoted, are SSA values.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);
entity_impl!(Var, "var");

/// An opaque reference to a type in the function's [`TypeStore`](super::types::TypeStore).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);
entity_impl!(Type, "type");

/// An opaque reference to a field of a record or union type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field(u32);
entity_impl!(Field, "field");

/// An opaque reference to an external function called from the function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// An opaque reference to a version of memory in the memory SSA form.
///
/// Every memory-writing instruction defines a new memory state, and every memory-reading
/// instruction uses one. Memory PHIs merge the states flowing into a join block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemState(u32);
entity_impl!(MemState, "mem");

/// A reference to any of the entities defined in this module that can appear in verifier
/// messages.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnyEntity {
    /// The whole function.
    Function,
    /// A basic block.
    Block(Block),
    /// An instruction.
    Inst(Inst),
    /// An SSA value.
    Value(Value),
    /// A declaration.
    Var(Var),
    /// A memory state.
    MemState(MemState),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Function => write!(f, "function"),
            Self::Block(r) => r.fmt(f),
            Self::Inst(r) => r.fmt(f),
            Self::Value(r) => r.fmt(f),
            Self::Var(r) => r.fmt(f),
            Self::MemState(r) => r.fmt(f),
        }
    }
}

impl From<Block> for AnyEntity {
    fn from(r: Block) -> Self {
        Self::Block(r)
    }
}

impl From<Inst> for AnyEntity {
    fn from(r: Inst) -> Self {
        Self::Inst(r)
    }
}

impl From<Value> for AnyEntity {
    fn from(r: Value) -> Self {
        Self::Value(r)
    }
}

impl From<Var> for AnyEntity {
    fn from(r: Var) -> Self {
        Self::Var(r)
    }
}

impl From<MemState> for AnyEntity {
    fn from(r: MemState) -> Self {
        Self::MemState(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn value_with_number() {
        assert_eq!(Value::new(0).to_string(), "v0");
        assert_eq!(Value::new(1).to_string(), "v1");
        assert_eq!(MemState::new(7).to_string(), "mem7");
    }

    #[test]
    fn any_entity_display() {
        assert_eq!(AnyEntity::from(Block::new(3)).to_string(), "block3");
        assert_eq!(AnyEntity::Function.to_string(), "function");
        assert_eq!(AnyEntity::from(Var::new(2)).to_string(), "var2");
    }
}
