//! Points-to solutions.
//!
//! The solutions are computed by a points-to analysis outside this crate and attached to the
//! function in [`PointsToInfo`]. A solution over-approximates the set of objects a pointer may
//! point to.

use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{Value, Var};
use core::fmt;

/// The set of objects a pointer may point to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PtSolution {
    /// The pointer may point to anything.
    pub anything: bool,
    /// The pointer may point to any global memory.
    pub nonlocal: bool,
    /// The pointer may point to any escaped memory. The escaped objects are described by the
    /// function-level [`PointsToInfo::escaped`] solution.
    pub escaped: bool,
    /// The pointer may be null.
    pub null: bool,
    /// `vars` contains a global variable.
    pub vars_contains_nonlocal: bool,
    /// `vars` contains an escaped local.
    pub vars_contains_escaped: bool,
    /// `vars` contains an escaped heap object.
    pub vars_contains_escaped_heap: bool,
    /// `vars` contains a restrict tag.
    pub vars_contains_restrict: bool,
    /// `vars` contains a declaration whose definition may be replaced at link or load time.
    pub vars_contains_interposable: bool,
    /// The declarations the pointer may point to.
    pub vars: FxHashSet<Var>,
}

impl PtSolution {
    /// A solution that may point to anything.
    pub fn anything() -> Self {
        Self {
            anything: true,
            ..Self::default()
        }
    }

    /// A solution pointing to exactly the given declarations.
    pub fn vars(vars: impl IntoIterator<Item = Var>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Does the solution point to nothing at all?
    pub fn is_empty(&self) -> bool {
        !self.anything && !self.nonlocal && !self.escaped && !self.null && self.vars.is_empty()
    }

    /// Is this the solution of a pointer that may point to anything?
    pub fn is_anything(&self) -> bool {
        self.anything
    }
}

impl fmt::Display for PtSolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut sep = "";
        f.write_str("{")?;
        for (flag, name) in [
            (self.anything, "anything"),
            (self.nonlocal, "nonlocal"),
            (self.escaped, "escaped"),
            (self.null, "null"),
        ] {
            if flag {
                write!(f, "{sep}{name}")?;
                sep = " ";
            }
        }
        let mut vars: Vec<_> = self.vars.iter().copied().collect();
        vars.sort();
        for v in vars {
            write!(f, "{sep}{v}")?;
            sep = " ";
        }
        f.write_str("}")
    }
}

/// Points-to solutions for a function.
#[derive(Clone, Debug, Default)]
pub struct PointsToInfo {
    /// Solutions of pointer SSA values. Pointers without a solution may point to anything.
    pub ptr_info: FxHashMap<Value, PtSolution>,
    /// The set of objects that escape the function: passed to callees, stored to global memory
    /// or returned.
    pub escaped: PtSolution,
}

impl PointsToInfo {
    /// Get the solution for the pointer `ptr`, if known.
    pub fn get(&self, ptr: Value) -> Option<&PtSolution> {
        self.ptr_info.get(&ptr)
    }

    /// Attach a solution to `ptr`.
    pub fn set(&mut self, ptr: Value, pt: PtSolution) {
        self.ptr_info.insert(ptr, pt);
    }

    /// Does `pt` include global memory?
    pub fn includes_global(&self, pt: &PtSolution) -> bool {
        if pt.anything || pt.nonlocal || pt.vars_contains_nonlocal || pt.vars_contains_escaped_heap
        {
            return true;
        }
        // `escaped` is a placeholder for the escaped solution.
        pt.escaped && !core::ptr::eq(pt, &self.escaped) && self.includes_global(&self.escaped)
    }

    /// Does `pt` include the declaration `var`? `is_global` tells whether `var` lives in global
    /// memory.
    pub fn includes(&self, pt: &PtSolution, var: Var, is_global: bool) -> bool {
        if pt.anything || (pt.nonlocal && is_global) || pt.vars.contains(&var) {
            return true;
        }
        pt.escaped && !core::ptr::eq(pt, &self.escaped) && self.includes(&self.escaped, var, is_global)
    }

    /// Can two pointers with solutions `pt1` and `pt2` point to the same object?
    pub fn intersect(&self, pt1: &PtSolution, pt2: &PtSolution) -> bool {
        if pt1.anything || pt2.anything {
            return true;
        }

        // If either points to unknown global memory and the other points to any global memory
        // they alias.
        if (pt1.nonlocal && (pt2.nonlocal || pt2.vars_contains_nonlocal))
            || (pt2.nonlocal && pt1.vars_contains_nonlocal)
        {
            return true;
        }

        // Likewise for escaped memory.
        if (pt1.escaped && (pt2.escaped || pt2.vars_contains_escaped))
            || (pt2.escaped && pt1.vars_contains_escaped)
        {
            return true;
        }

        let (small, large) = if pt1.vars.len() <= pt2.vars.len() {
            (&pt1.vars, &pt2.vars)
        } else {
            (&pt2.vars, &pt1.vars)
        };
        small.iter().any(|v| large.contains(v))
    }
}
