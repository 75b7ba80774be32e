//! Scalar domains and range bounds.
//!
//! Range endpoints are kept as `i128` in the natural interpretation of their domain: a signed
//! 8-bit domain holds values in `[-128, 127]`, an unsigned 64-bit domain values in
//! `[0, 2^64 - 1]`. Every arithmetic result is truncated back into its domain with
//! [`ScalarTy::wrap`].

use crate::ir::{Operand, Type, TypeKind, TypeStore, Value, Var};
use core::cmp::Ordering;
use core::fmt;

/// An integral or pointer domain ranges are computed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalarTy {
    /// Precision in bits, between 1 and 64.
    pub bits: u8,
    /// Two's complement interpretation.
    pub signed: bool,
    /// Arithmetic overflow wraps around.
    pub wraps: bool,
    /// The domain is a pointer domain.
    pub pointer: bool,
}

impl ScalarTy {
    /// An integer domain.
    pub fn int(bits: u8, signed: bool, wraps: bool) -> Self {
        debug_assert!((1..=64).contains(&bits));
        Self {
            bits,
            signed,
            wraps,
            pointer: false,
        }
    }

    /// The pointer domain: unsigned 64-bit with undefined overflow.
    pub fn pointer() -> Self {
        Self {
            bits: 64,
            signed: false,
            wraps: false,
            pointer: true,
        }
    }

    /// The boolean domain `{0, 1}`.
    pub fn boolean() -> Self {
        Self::int(1, false, true)
    }

    /// The domain of values of type `ty`, or `None` if ranges are not tracked for it.
    pub fn of(types: &TypeStore, ty: Type) -> Option<Self> {
        match *types.kind(ty) {
            TypeKind::Bool => Some(Self::boolean()),
            TypeKind::Int {
                bits,
                signed,
                wraps,
            } => Some(Self::int(bits, signed, wraps)),
            TypeKind::Pointer { .. } => Some(Self::pointer()),
            _ => None,
        }
    }

    /// Smallest value of the domain.
    pub fn min_value(self) -> i128 {
        if self.signed {
            -(1i128 << (self.bits - 1))
        } else {
            0
        }
    }

    /// Largest value of the domain.
    pub fn max_value(self) -> i128 {
        if self.signed {
            (1i128 << (self.bits - 1)) - 1
        } else {
            (1i128 << self.bits) - 1
        }
    }

    /// Is `v` representable in the domain?
    pub fn contains(self, v: i128) -> bool {
        self.min_value() <= v && v <= self.max_value()
    }

    /// Truncate `v` to the domain precision and reinterpret it with the domain signedness.
    pub fn wrap(self, v: i128) -> i128 {
        let modulus = 1i128 << self.bits;
        let low = v.rem_euclid(modulus);
        if self.signed && low > self.max_value() {
            low - modulus
        } else {
            low
        }
    }

    /// The two's complement bit pattern of `v`, zero-extended.
    pub fn to_bits(self, v: i128) -> u128 {
        (v as u128) & self.mask()
    }

    /// Inverse of `to_bits`.
    pub fn from_bits(self, bits: u128) -> i128 {
        self.wrap((bits & self.mask()) as i128)
    }

    /// All value bits set.
    pub fn mask(self) -> u128 {
        (1u128 << self.bits) - 1
    }

    /// Can the solver assume arithmetic on the domain never overflows?
    pub fn overflow_undefined(self) -> bool {
        !self.pointer && !self.wraps
    }

    /// Is `v` negative when read as a signed number of this precision?
    pub fn sign_bit(self, v: i128) -> bool {
        self.to_bits(v) >> (self.bits - 1) & 1 == 1
    }

    /// Is `b` the smallest domain value? Pointers have no minimum unless `handle_pointers`.
    pub fn is_min(self, b: Bound, handle_pointers: bool) -> bool {
        if self.pointer && !handle_pointers {
            return false;
        }
        matches!(b, Bound::Int(v) if v <= self.min_value())
    }

    /// Is `b` the largest domain value? Pointers have no maximum unless `handle_pointers`.
    pub fn is_max(self, b: Bound, handle_pointers: bool) -> bool {
        if self.pointer && !handle_pointers {
            return false;
        }
        matches!(b, Bound::Int(v) if v >= self.max_value())
    }
}

impl fmt::Display for ScalarTy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.pointer {
            return f.write_str("ptr");
        }
        write!(f, "{}{}", if self.signed { 'i' } else { 'u' }, self.bits)?;
        if self.wraps && self.signed {
            f.write_str(".wrap")?;
        }
        Ok(())
    }
}

/// An endpoint of a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bound {
    /// An integer constant.
    Int(i128),
    /// The invariant address `&var + offset`.
    Addr {
        /// The addressed declaration.
        var: Var,
        /// Byte offset.
        offset: i64,
    },
    /// `name + offset`, or `-name + offset` when `neg` is set.
    Sym {
        /// The symbol.
        name: Value,
        /// The symbol is negated.
        neg: bool,
        /// Constant part.
        offset: i128,
    },
}

impl Bound {
    /// The plain symbol `name`.
    pub fn name(name: Value) -> Self {
        Bound::Sym {
            name,
            neg: false,
            offset: 0,
        }
    }

    /// The bound denoted by an operand.
    pub fn from_operand(op: Operand) -> Self {
        match op {
            Operand::Value(v) => Bound::name(v),
            Operand::Const { value, .. } => Bound::Int(value),
            Operand::Addr { var, offset } => Bound::Addr { var, offset },
        }
    }

    /// The integer constant, if this is one.
    pub fn as_int(self) -> Option<i128> {
        match self {
            Bound::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Is this bound a run-time invariant?
    pub fn is_invariant(self) -> bool {
        !self.is_symbolic()
    }

    /// Does this bound depend on an SSA name?
    pub fn is_symbolic(self) -> bool {
        matches!(self, Bound::Sym { .. })
    }

    /// The bound offset by the constant `c`, without wrapping.
    pub fn offset_by(self, c: i128) -> Self {
        match self {
            Bound::Int(v) => Bound::Int(v + c),
            Bound::Addr { var, offset } => Bound::Addr {
                var,
                offset: offset.wrapping_add(c as i64),
            },
            Bound::Sym { name, neg, offset } => Bound::Sym {
                name,
                neg,
                offset: offset + c,
            },
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Bound::Int(v) => write!(f, "{v}"),
            Bound::Addr { var, offset: 0 } => write!(f, "&{var}"),
            Bound::Addr { var, offset } => write!(f, "&{var}{offset:+}"),
            Bound::Sym { name, neg, offset } => {
                if neg {
                    f.write_str("-")?;
                }
                write!(f, "{name}")?;
                if offset != 0 {
                    write!(f, " {} {}", if offset < 0 { '-' } else { '+' }, offset.abs())?;
                }
                Ok(())
            }
        }
    }
}

/// Result of comparing two bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// The first bound is smaller.
    Less,
    /// The bounds are equal.
    Equal,
    /// The first bound is larger.
    Greater,
    /// The bounds are provably different, but not ordered.
    NotEqual,
    /// The bounds cannot be compared.
    Unknown,
}

impl Comparison {
    fn from_ordering(o: Ordering) -> Self {
        match o {
            Ordering::Less => Comparison::Less,
            Ordering::Equal => Comparison::Equal,
            Ordering::Greater => Comparison::Greater,
        }
    }

    /// The comparison with the operands swapped.
    pub fn reverse(self) -> Self {
        match self {
            Comparison::Less => Comparison::Greater,
            Comparison::Greater => Comparison::Less,
            c => c,
        }
    }
}

/// Compare two bounds of domain `ty`.
///
/// Symbolic bounds only compare when both use the same symbol with the same sign, or when one is
/// a constant and overflow is undefined, in which case `n + c` is assumed not to wrap around.
pub fn compare_values(ty: ScalarTy, a: Bound, b: Bound) -> Comparison {
    if a == b {
        return Comparison::Equal;
    }

    match (a, b) {
        (
            Bound::Sym {
                name: n1,
                neg: neg1,
                offset: o1,
            },
            Bound::Sym {
                name: n2,
                neg: neg2,
                offset: o2,
            },
        ) => {
            if n1 != n2 || neg1 != neg2 {
                return Comparison::Unknown;
            }
            if o1 == o2 {
                return Comparison::Equal;
            }
            if !ty.overflow_undefined() {
                return Comparison::Unknown;
            }
            Comparison::from_ordering(o1.cmp(&o2))
        }
        (Bound::Sym { offset, .. }, Bound::Int(cst)) => symbolic_vs_constant(ty, offset, cst),
        (Bound::Int(cst), Bound::Sym { offset, .. }) => {
            symbolic_vs_constant(ty, offset, cst).reverse()
        }
        (Bound::Sym { .. }, _) | (_, Bound::Sym { .. }) => Comparison::Unknown,
        (Bound::Int(x), Bound::Int(y)) => Comparison::from_ordering(x.cmp(&y)),
        (
            Bound::Addr {
                var: v1,
                offset: o1,
            },
            Bound::Addr {
                var: v2,
                offset: o2,
            },
        ) => {
            if v1 == v2 {
                Comparison::from_ordering(o1.cmp(&o2))
            } else {
                Comparison::NotEqual
            }
        }
        (Bound::Addr { .. }, Bound::Int(0)) | (Bound::Int(0), Bound::Addr { .. }) => {
            Comparison::NotEqual
        }
        (Bound::Addr { .. }, Bound::Int(_)) | (Bound::Int(_), Bound::Addr { .. }) => {
            Comparison::Unknown
        }
    }
}

/// Compare `±n + inv` against `cst`, assuming `n + inv` does not overflow.
fn symbolic_vs_constant(ty: ScalarTy, inv: i128, cst: i128) -> Comparison {
    if inv == 0 || !ty.overflow_undefined() {
        return Comparison::Unknown;
    }
    // If `cst - inv` wraps, `n + inv` would have to overflow to reach `cst`.
    let diff = ty.wrap(cst - inv);
    if 0i128.cmp(&inv) != diff.cmp(&cst) {
        Comparison::from_ordering(cst.cmp(&inv)).reverse()
    } else {
        Comparison::Unknown
    }
}

/// Is `a < b`? `None` when the bounds cannot be compared.
pub fn operand_less_p(ty: ScalarTy, a: Bound, b: Bound) -> Option<bool> {
    // Addresses of declarations are never null, and pointers are unsigned.
    match (a, b) {
        (Bound::Int(0), Bound::Addr { .. }) => return Some(true),
        (Bound::Addr { .. }, Bound::Int(0)) => return Some(false),
        _ => {}
    }
    match compare_values(ty, a, b) {
        Comparison::Less => Some(true),
        Comparison::Equal | Comparison::Greater => Some(false),
        Comparison::NotEqual | Comparison::Unknown => None,
    }
}
