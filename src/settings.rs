//! Analysis settings.
//!
//! Settings are built with a [`Builder`] which accepts textual `name = value` assignments, and
//! then frozen into an immutable [`Flags`] object which the analyses query through typed getters.
//!
//! ```ignore
//! use midend::settings::{self, Configurable};
//!
//! let mut b = settings::builder();
//! b.set("alias_walk_limit", "50")?;
//! b.enable("can_throw_non_call_exceptions")?;
//! let flags = settings::Flags::new(b);
//! assert_eq!(flags.alias_walk_limit(), 50);
//! ```

use core::fmt;
use thiserror::Error;

/// A string-based configurator for settings groups.
pub trait Configurable {
    /// Set the string value of any setting by name.
    ///
    /// This can set any type of setting whether it is numeric or boolean.
    fn set(&mut self, name: &str, value: &str) -> SetResult<()>;

    /// Enable a boolean setting.
    fn enable(&mut self, name: &str) -> SetResult<()>;
}

/// An error produced when changing a setting.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SetError {
    /// No setting by this name exists.
    #[error("No existing setting named '{0}'")]
    BadName(String),

    /// Type mismatch for setting (e.g., setting a numeric value on a bool).
    #[error("Trying to set a setting with the wrong type")]
    BadType,

    /// This is not a valid value for this setting.
    #[error("Unexpected value for a setting, expected {0}")]
    BadValue(String),
}

/// A result returned when changing a setting.
pub type SetResult<T> = Result<T, SetError>;

#[derive(Clone, Copy)]
enum Detail {
    Bool { default: bool },
    Num { default: u32 },
}

struct Descriptor {
    name: &'static str,
    detail: Detail,
}

// The order of this table defines the storage index of each setting in `Builder::values`.
const DESCRIPTORS: [Descriptor; 7] = [
    Descriptor {
        name: "strict_aliasing",
        detail: Detail::Bool { default: true },
    },
    Descriptor {
        name: "errno_math",
        detail: Detail::Bool { default: true },
    },
    Descriptor {
        name: "delete_null_pointer_checks",
        detail: Detail::Bool { default: true },
    },
    Descriptor {
        name: "can_throw_non_call_exceptions",
        detail: Detail::Bool { default: false },
    },
    Descriptor {
        name: "vrp_phi_widening",
        detail: Detail::Bool { default: true },
    },
    Descriptor {
        name: "alias_walk_limit",
        detail: Detail::Num { default: 1000 },
    },
    Descriptor {
        name: "max_vrp_switch_assertions",
        detail: Detail::Num { default: 10 },
    },
];

const STRICT_ALIASING: usize = 0;
const ERRNO_MATH: usize = 1;
const DELETE_NULL_POINTER_CHECKS: usize = 2;
const CAN_THROW_NON_CALL_EXCEPTIONS: usize = 3;
const VRP_PHI_WIDENING: usize = 4;
const ALIAS_WALK_LIMIT: usize = 5;
const MAX_VRP_SWITCH_ASSERTIONS: usize = 6;

/// Collect settings values before creating a [`Flags`] object.
#[derive(Clone)]
pub struct Builder {
    values: [u32; DESCRIPTORS.len()],
}

/// Create a new builder with all settings at their default values.
pub fn builder() -> Builder {
    let mut values = [0; DESCRIPTORS.len()];
    for (slot, d) in values.iter_mut().zip(DESCRIPTORS.iter()) {
        *slot = match d.detail {
            Detail::Bool { default } => u32::from(default),
            Detail::Num { default } => default,
        };
    }
    Builder { values }
}

impl Builder {
    fn lookup(&self, name: &str) -> SetResult<(usize, Detail)> {
        DESCRIPTORS
            .iter()
            .position(|d| d.name == name)
            .map(|idx| (idx, DESCRIPTORS[idx].detail))
            .ok_or_else(|| SetError::BadName(name.to_string()))
    }
}

fn parse_bool_value(value: &str) -> SetResult<bool> {
    match value {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(SetError::BadValue("bool".to_string())),
    }
}

impl Configurable for Builder {
    fn set(&mut self, name: &str, value: &str) -> SetResult<()> {
        let (idx, detail) = self.lookup(name)?;
        self.values[idx] = match detail {
            Detail::Bool { .. } => u32::from(parse_bool_value(value)?),
            Detail::Num { .. } => value
                .parse()
                .map_err(|_| SetError::BadValue("number".to_string()))?,
        };
        Ok(())
    }

    fn enable(&mut self, name: &str) -> SetResult<()> {
        let (idx, detail) = self.lookup(name)?;
        match detail {
            Detail::Bool { .. } => {
                self.values[idx] = 1;
                Ok(())
            }
            Detail::Num { .. } => Err(SetError::BadType),
        }
    }
}

/// Flags group shared by the alias oracle and the range solver.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Flags {
    values: [u32; DESCRIPTORS.len()],
}

impl Flags {
    /// Create flags from the values collected in `builder`.
    pub fn new(builder: Builder) -> Self {
        Self {
            values: builder.values,
        }
    }

    /// Apply type-based alias analysis rules of the source language.
    pub fn strict_aliasing(&self) -> bool {
        self.values[STRICT_ALIASING] != 0
    }

    /// Math and allocation builtins may set `errno`.
    pub fn errno_math(&self) -> bool {
        self.values[ERRNO_MATH] != 0
    }

    /// Dereferencing a null pointer traps, so pointers that were dereferenced are non-null.
    pub fn delete_null_pointer_checks(&self) -> bool {
        self.values[DELETE_NULL_POINTER_CHECKS] != 0
    }

    /// Instructions other than calls may throw.
    pub fn can_throw_non_call_exceptions(&self) -> bool {
        self.values[CAN_THROW_NON_CALL_EXCEPTIONS] != 0
    }

    /// Widen ranges of loop-carried PHIs once they change after their first visit.
    pub fn vrp_phi_widening(&self) -> bool {
        self.values[VRP_PHI_WIDENING] != 0
    }

    /// Step budget for a single virtual-SSA walk.
    pub fn alias_walk_limit(&self) -> u32 {
        self.values[ALIAS_WALK_LIMIT]
    }

    /// Maximum number of case assertions registered for a single switch index.
    pub fn max_vrp_switch_assertions(&self) -> u32 {
        self.values[MAX_VRP_SWITCH_ASSERTIONS]
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new(builder())
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[midend]")?;
        for (d, &value) in DESCRIPTORS.iter().zip(self.values.iter()) {
            match d.detail {
                Detail::Bool { .. } => writeln!(f, "{} = {}", d.name, value != 0)?,
                Detail::Num { .. } => writeln!(f, "{} = {}", d.name, value)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_default() {
        let f = Flags::default();
        assert_eq!(
            f.to_string(),
            "[midend]\n\
             strict_aliasing = true\n\
             errno_math = true\n\
             delete_null_pointer_checks = true\n\
             can_throw_non_call_exceptions = false\n\
             vrp_phi_widening = true\n\
             alias_walk_limit = 1000\n\
             max_vrp_switch_assertions = 10\n"
        );
        assert!(f.strict_aliasing());
        assert!(!f.can_throw_non_call_exceptions());
    }

    #[test]
    fn modify_bool() {
        let mut b = builder();
        assert_eq!(b.enable("not_there"), Err(SetError::BadName("not_there".to_string())));
        assert_eq!(b.enable("alias_walk_limit"), Err(SetError::BadType));
        assert_eq!(b.set("strict_aliasing", "off"), Ok(()));
        assert_eq!(
            b.set("errno_math", "maybe"),
            Err(SetError::BadValue("bool".to_string()))
        );
        b.enable("can_throw_non_call_exceptions").unwrap();

        let f = Flags::new(b);
        assert!(!f.strict_aliasing());
        assert!(f.errno_math());
        assert!(f.can_throw_non_call_exceptions());
    }

    #[test]
    fn modify_num() {
        let mut b = builder();
        assert_eq!(b.set("alias_walk_limit", "50"), Ok(()));
        assert_eq!(
            b.set("max_vrp_switch_assertions", "-3"),
            Err(SetError::BadValue("number".to_string()))
        );
        let f = Flags::new(b);
        assert_eq!(f.alias_walk_limit(), 50);
        assert_eq!(f.max_vrp_switch_assertions(), 10);
    }
}
