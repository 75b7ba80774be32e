//! Pass timing.
//!
//! Every analysis phase that can be timed is listed in `define_passes!`. Starting a phase returns
//! a token; the phase ends when the token is dropped. Tokens nest, so the time of a phase which
//! runs inside another one is accounted as child time of the outer phase.

use core::fmt;
use std::any::Any;
use std::cell::RefCell;

use crate::default_profiler::DefaultProfiler;

pub use crate::default_profiler::{PassTimes, take_current};

macro_rules! define_passes {
    ($($pass:ident: $desc:expr,)+) => {
        /// A single profiled analysis phase.
        #[allow(non_camel_case_types, reason = "pass names double as constructor functions")]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum Pass {
            $(#[doc=$desc] $pass,)+
            /// No active pass.
            None,
        }

        /// The number of profiled passes.
        pub const NUM_PASSES: usize = Pass::None as usize;

        const DESCRIPTIONS: [&str; NUM_PASSES] = [ $($desc),+ ];

        const ALL_PASSES: [Pass; NUM_PASSES] = [ $(Pass::$pass),+ ];

        $(
            #[doc=$desc]
            #[must_use]
            pub fn $pass() -> Box<dyn Any> {
                start_pass(Pass::$pass)
            }
        )+
    }
}

define_passes! {
    flowgraph: "Control flow graph",
    domtree: "Dominator tree",
    mem_ssa: "Memory SSA construction",
    verifier: "Verify IR",
    alias_walk: "Virtual SSA walks",
    vrp_find_asserts: "Find range assertions",
    vrp_insert_asserts: "Insert range assertions",
    vrp_propagate: "Range propagation",
    vrp_remove_asserts: "Remove range assertions",
}

impl Pass {
    /// A number that can be used to index into a dense array of pass timings.
    pub fn idx(self) -> usize {
        self as usize
    }

    /// Turn an index back into a pass identifier.
    pub fn from_idx(idx: usize) -> Self {
        ALL_PASSES.get(idx).copied().unwrap_or(Pass::None)
    }

    /// Description of the pass.
    pub fn description(self) -> &'static str {
        match DESCRIPTIONS.get(self.idx()) {
            Some(s) => s,
            None => "<no pass>",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A profiler.
pub trait Profiler {
    /// Start a profiling pass.
    ///
    /// Will return a token which when dropped indicates the end of the pass.
    ///
    /// Multiple passes can be active at the same time, but they must be started and stopped in a
    /// LIFO fashion.
    fn start_pass(&self, pass: Pass) -> Box<dyn Any>;
}

thread_local! {
    static PROFILER: RefCell<Box<dyn Profiler>> = RefCell::new(Box::new(DefaultProfiler));
}

/// Set the profiler for the current thread.
///
/// Returns the old profiler.
pub fn set_thread_profiler(new_profiler: Box<dyn Profiler>) -> Box<dyn Profiler> {
    PROFILER.with(|profiler| std::mem::replace(&mut *profiler.borrow_mut(), new_profiler))
}

fn start_pass(pass: Pass) -> Box<dyn Any> {
    PROFILER.with(|profiler| profiler.borrow().start_pass(pass))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Pass::None.to_string(), "<no pass>");
        assert_eq!(Pass::vrp_propagate.to_string(), "Range propagation");
        assert_eq!(Pass::from_idx(Pass::domtree.idx()), Pass::domtree);
        assert_eq!(Pass::from_idx(NUM_PASSES + 3), Pass::None);
    }

    #[test]
    fn nested_tokens() {
        let _ = take_current();
        {
            let _outer = vrp_propagate();
            let _inner = alias_walk();
        }
        let times = take_current();
        assert_eq!(times.runs(Pass::vrp_propagate), 1);
        assert_eq!(times.runs(Pass::alias_walk), 1);
        assert_eq!(times.runs(Pass::domtree), 0);
    }
}
