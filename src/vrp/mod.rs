//! Value range propagation.
//!
//! [`Vrp::run`] computes a [`ValueRange`] for every integer and pointer SSA value of a function:
//!
//! 1. Facts implied by conditional branches, switches and pointer dereferences are collected
//!    for the names that are live where they hold.
//! 2. Each fact is materialized as an `assert` pseudo-definition of a fresh name, and the uses
//!    it dominates are renamed to the fresh name.
//! 3. The SSA propagation engine runs [`VrpPropagate`] to a fixed point.
//! 4. The computed ranges are exported to the function's range metadata and the assertions are
//!    removed again.
//!
//! The lattice and the range arithmetic are usable on their own through [`ValueRange`],
//! [`range_fold_binary`] and [`range_fold_unary`].

mod arith;
mod asserts;
mod bound;
mod lattice;
mod range_op;
mod solver;
mod values;

pub use self::arith::{range_fold_binary, range_fold_unary};
pub use self::bound::{Bound, Comparison, ScalarTy, compare_values};
pub use self::lattice::{RangeKind, ValueRange};
pub use self::range_op::{UnaryCode, fold_binary, fold_unary};
pub use self::solver::VrpPropagate;
pub use self::values::{VrValues, VrpValue, compare_range_with_value, compare_ranges};

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Function, IntCC, Operand, Value};
use crate::propagate::ssa_propagate;
use crate::result::{MidendError, MidendResult};
use crate::settings::Flags;
use crate::timing;
use crate::verifier::{Assertions, verify_function};

/// The result of range propagation over one function.
pub struct Vrp {
    values: VrValues,
}

impl Vrp {
    /// Run range propagation over `func`.
    ///
    /// On success the function has its original shape again, except for critical edges that
    /// were split, and `func.range_info` holds the computed ranges.
    pub fn run(func: &mut Function, flags: &Flags) -> MidendResult<Self> {
        if func.layout.entry_block().is_none() {
            return Err(MidendError::MissingEntry);
        }
        verify_function(func, Assertions::Forbidden)?;

        let mut cfg = ControlFlowGraph::with_function(func);
        cfg.mark_dfs_back_edges(func);
        let mut domtree = DominatorTree::with_function(func, &cfg);

        let loci = {
            let _tt = timing::vrp_find_asserts();
            asserts::find_assert_locations(func, &cfg, &domtree, flags)
        };
        let inserted = {
            let _tt = timing::vrp_insert_asserts();
            asserts::insert_range_assertions(func, &mut cfg, &mut domtree, &loci)
        };
        log::debug!("inserted {inserted} range assertions");
        verify_function(func, Assertions::Allowed)?;

        cfg.compute(func);
        cfg.mark_dfs_back_edges(func);
        domtree.compute(func, &cfg);

        let mut client = VrpPropagate::new(VrValues::new(func, flags));
        {
            let _tt = timing::vrp_propagate();
            ssa_propagate(func, &mut cfg, &domtree, &mut client);
        }
        let values = client.values;

        let removed = {
            let _tt = timing::vrp_remove_asserts();
            asserts::export_ranges(func, &values);
            asserts::remove_range_assertions(func)
        };
        debug_assert_eq!(inserted, removed);
        verify_function(func, Assertions::Forbidden)?;

        if crate::trace_log_enabled!() {
            for v in func.dfg.values() {
                if !values.range(v).is_undefined() {
                    log::trace!("{v}: {}", values.lattice(v));
                }
            }
        }
        Ok(Self { values })
    }

    /// The range computed for `v`.
    ///
    /// Values in code found unreachable, and values of types without ranges, are `Undefined`.
    pub fn get_range(&self, v: Value) -> ValueRange {
        self.values.range(v)
    }

    /// The solved lattice values.
    pub fn values(&self) -> &VrValues {
        &self.values
    }

    /// Fold `a cond b` using the solved ranges and equivalences.
    pub fn evaluate_conditional(
        &self,
        func: &Function,
        cond: IntCC,
        a: Operand,
        b: Operand,
    ) -> Option<bool> {
        self.values.evaluate_conditional(func, cond, a, b, true)
    }
}
