//! Middle-end analyses: a memory alias oracle and value-range propagation.
//!
//! The crate is organized around a small SSA intermediate representation in [`ir`], with the
//! usual supporting analyses ([`flowgraph`], [`dominator_tree`], [`mem_ssa`]). The [`alias`]
//! module answers may-alias, may-use, may-clobber and kill queries between memory references and
//! statements, and walks the virtual def-use chains of memory. The [`vrp`] module computes value
//! ranges for scalar SSA values with an assertion-driven fixed-point solver.
#![warn(missing_docs)]

pub use crate::result::{MidendError, MidendResult};
pub use crate::verifier::verify_function;

pub use cranelift_entity as entity;

pub mod alias;
pub mod cursor;
pub mod dominator_tree;
pub mod flowgraph;
pub mod ir;
pub mod mem_ssa;
pub mod propagate;
pub mod settings;
pub mod timing;
pub mod verifier;
pub mod vrp;

pub use crate::entity::packed_option;

mod default_profiler;
mod fx;
mod result;

/// Even when trace logging is disabled, the trace macro has a significant performance cost so we
/// disable it by default.
#[macro_export]
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(any(feature = "trace-log", debug_assertions)) {
            ::log::trace!($($tt)*);
        }
    };
}

/// Dynamic check for whether trace logging is enabled.
#[macro_export]
macro_rules! trace_log_enabled {
    () => {
        cfg!(any(feature = "trace-log", debug_assertions))
            && ::log::log_enabled!(::log::Level::Trace)
    };
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// Route `log` output to the test harness when `RUST_LOG` is set.
    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
