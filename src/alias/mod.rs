//! Alias analysis.
//!
//! The [`AliasOracle`] decides whether memory references may overlap, and whether statements
//! may read, write or kill them. References are wrapped in an [`AoRef`], which lazily computes
//! the base object and the accessed bit range of a [`MemRef`](crate::ir::MemRef) or of a region
//! given by a pointer and a size.
//!
//! The oracle combines several sources of information:
//!
//! - offsets and sizes relative to a common base object,
//! - restrict cliques attached to dereferences,
//! - type-based alias sets ([`AliasSetTable`]),
//! - points-to solutions of pointer values,
//! - the structure of the access paths,
//! - the known memory effects of builtin functions ([`BuiltinEffects`]).
//!
//! [`MemWalker`] uses the oracle to walk memory SSA.

mod access_path;
mod ao_ref;
mod builtins;
mod calls;
mod oracle;
mod stats;
mod tbaa;
mod walk;

pub use self::ao_ref::{AoRef, BaseExtent, known_subrange, ranges_maybe_overlap};
pub use self::builtins::{AccessSize, BuiltinEffects, ErrnoEffect, MemArg};
pub use self::oracle::AliasOracle;
pub use self::stats::{AliasStats, QueryCounter};
pub use self::tbaa::{AliasSet, AliasSetTable, TypeMatch};
pub use self::walk::{MemWalker, TranslateMode, VuseVisitor, WalkResult, WalkStep};
