//! Condition codes for integer and pointer comparisons.
//!
//! A condition code determines how two operands are compared. The signedness of the comparison is
//! not part of the code: it is the signedness of the compared operands' type.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

/// Common traits of condition codes.
pub trait CondCode: Copy {
    /// Get the inverse condition code of `self`.
    ///
    /// The inverse condition code produces the opposite result for all comparisons.
    /// That is, `cmp CC, x, y` is true if and only if `cmp CC.inverse(), x, y` is false.
    #[must_use]
    fn inverse(self) -> Self;

    /// Get the reversed condition code for `self`.
    ///
    /// The reversed condition code produces the same result as swapping `x` and `y` in the
    /// comparison. That is, `cmp CC, x, y` is the same as `cmp CC.reverse(), y, x`.
    #[must_use]
    fn reverse(self) -> Self;
}

/// Condition code for comparing integers and pointers.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum IntCC {
    /// `==`.
    Equal,
    /// `!=`.
    NotEqual,
    /// `<`.
    LessThan,
    /// `<=`.
    LessThanOrEqual,
    /// `>`.
    GreaterThan,
    /// `>=`.
    GreaterThanOrEqual,
}

impl CondCode for IntCC {
    fn inverse(self) -> Self {
        use self::IntCC::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            LessThan => GreaterThanOrEqual,
            LessThanOrEqual => GreaterThan,
            GreaterThan => LessThanOrEqual,
            GreaterThanOrEqual => LessThan,
        }
    }

    fn reverse(self) -> Self {
        use self::IntCC::*;
        match self {
            Equal => Equal,
            NotEqual => NotEqual,
            LessThan => GreaterThan,
            LessThanOrEqual => GreaterThanOrEqual,
            GreaterThan => LessThan,
            GreaterThanOrEqual => LessThanOrEqual,
        }
    }
}

impl IntCC {
    /// Is this an equality comparison?
    pub fn is_equality(self) -> bool {
        matches!(self, IntCC::Equal | IntCC::NotEqual)
    }

    /// Evaluate the condition on two ordered operands.
    pub fn eval<T: Ord>(self, a: T, b: T) -> bool {
        use self::IntCC::*;
        match self {
            Equal => a == b,
            NotEqual => a != b,
            LessThan => a < b,
            LessThanOrEqual => a <= b,
            GreaterThan => a > b,
            GreaterThanOrEqual => a >= b,
        }
    }

    /// Get the corresponding string condition code for the IntCC object.
    pub fn to_static_str(self) -> &'static str {
        use self::IntCC::*;
        match self {
            Equal => "eq",
            NotEqual => "ne",
            LessThan => "lt",
            LessThanOrEqual => "le",
            GreaterThan => "gt",
            GreaterThanOrEqual => "ge",
        }
    }
}

impl Display for IntCC {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

impl FromStr for IntCC {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use self::IntCC::*;
        match s {
            "eq" => Ok(Equal),
            "ne" => Ok(NotEqual),
            "lt" => Ok(LessThan),
            "le" => Ok(LessThanOrEqual),
            "gt" => Ok(GreaterThan),
            "ge" => Ok(GreaterThanOrEqual),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INT_ALL: [IntCC; 6] = [
        IntCC::Equal,
        IntCC::NotEqual,
        IntCC::LessThan,
        IntCC::LessThanOrEqual,
        IntCC::GreaterThan,
        IntCC::GreaterThanOrEqual,
    ];

    #[test]
    fn int_inverse() {
        for r in &INT_ALL {
            let cc = *r;
            let inv = cc.inverse();
            assert!(cc != inv);
            assert_eq!(inv.inverse(), cc);
            for (a, b) in [(1, 2), (2, 2), (3, 2)] {
                assert_ne!(cc.eval(a, b), inv.eval(a, b));
            }
        }
    }

    #[test]
    fn int_reverse() {
        for r in &INT_ALL {
            let cc = *r;
            let rev = cc.reverse();
            assert_eq!(rev.reverse(), cc);
            for (a, b) in [(1, 2), (2, 2), (3, 2)] {
                assert_eq!(cc.eval(a, b), rev.eval(b, a));
            }
        }
    }

    #[test]
    fn int_display() {
        for r in &INT_ALL {
            let cc = *r;
            assert_eq!(cc.to_string().parse(), Ok(cc));
        }
        assert_eq!("bogus".parse::<IntCC>(), Err(()));
    }
}
