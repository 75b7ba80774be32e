//! External function declarations.

use crate::fx::FxHashSet;
use crate::ir::{Builtin, Var};
use core::fmt;

/// An external function called from the function being analyzed.
#[derive(Clone, Debug, Default)]
pub struct ExtFuncData {
    /// Name of the function.
    pub name: String,
    /// Builtin identity, if the function has known semantics.
    pub builtin: Option<Builtin>,
    /// Whole-program summary: static variables the callee and everything it calls never read.
    pub not_read: Option<FxHashSet<Var>>,
    /// Whole-program summary: static variables the callee and everything it calls never write.
    pub not_written: Option<FxHashSet<Var>>,
}

impl ExtFuncData {
    /// Declare a function with no known semantics.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            builtin: name.parse().ok(),
            ..Self::default()
        }
    }

    /// Declare the builtin `builtin`.
    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            name: builtin.name().to_string(),
            builtin: Some(builtin),
            ..Self::default()
        }
    }

    /// Is `var` known to be never read by calls to this function?
    pub fn never_reads(&self, var: Var) -> bool {
        self.not_read.as_ref().is_some_and(|s| s.contains(&var))
    }

    /// Is `var` known to be never written by calls to this function?
    pub fn never_writes(&self, var: Var) -> bool {
        self.not_written.as_ref().is_some_and(|s| s.contains(&var))
    }
}

impl fmt::Display for ExtFuncData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn builtin_by_name() {
        assert_eq!(ExtFuncData::new("memcpy").builtin, Some(Builtin::Memcpy));
        assert_eq!(ExtFuncData::new("foo").builtin, None);
        let mut f = ExtFuncData::new("foo");
        f.not_written = Some([Var::new(1)].into_iter().collect());
        assert!(f.never_writes(Var::new(1)));
        assert!(!f.never_reads(Var::new(1)));
    }
}
