//! The value range lattice.
//!
//! A [`ValueRange`] is one of
//!
//! - `Undefined`: no value has been seen yet, or the value is unreachable.
//! - `Range [min, max]`: the value lies between the two bounds.
//! - `AntiRange ~[min, max]`: the value lies outside the two bounds.
//! - `Varying`: the value may be anything in its domain.
//!
//! Ranges are always kept canonical: swapped constant bounds are reinterpreted as the opposite
//! kind, anti-ranges touching an end of the domain become ranges, and ranges spanning the whole
//! domain become `Varying`. Bounds may be symbolic (`±name + constant`), in which case no
//! canonicalization is attempted.
//!
//! Meet (`union_`) and intersection are not exact; they return a conservative value that can be
//! expressed as a single range or anti-range.

use crate::trace;
use crate::vrp::bound::{Bound, Comparison, ScalarTy, compare_values, operand_less_p};
use core::fmt;

/// The kind of a [`ValueRange`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// No information.
    Undefined,
    /// `[min, max]`.
    Range,
    /// `~[min, max]`.
    AntiRange,
    /// All values.
    Varying,
}

/// A lattice value describing the values an SSA name may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueRange {
    /// No value.
    Undefined,
    /// Any value of the domain.
    Varying(ScalarTy),
    /// A value between `min` and `max`, inclusive.
    Range {
        /// The domain.
        ty: ScalarTy,
        /// Lower bound.
        min: Bound,
        /// Upper bound.
        max: Bound,
    },
    /// A value outside of `[min, max]`.
    AntiRange {
        /// The domain.
        ty: ScalarTy,
        /// Lower bound of the excluded region.
        min: Bound,
        /// Upper bound of the excluded region.
        max: Bound,
    },
}

impl ValueRange {
    /// The canonical lattice value for `kind` with the given bounds.
    pub fn new(ty: ScalarTy, kind: RangeKind, min: Bound, max: Bound) -> Self {
        match kind {
            RangeKind::Undefined => return ValueRange::Undefined,
            RangeKind::Varying => return ValueRange::Varying(ty),
            RangeKind::Range | RangeKind::AntiRange => {}
        }

        let (mut lo, mut hi) = match (min, max) {
            (Bound::Int(lo), Bound::Int(hi)) => (lo, hi),
            _ => return Self::raw(ty, kind, min, max),
        };
        let mut kind = kind;

        if hi < lo {
            // A wrapping range, [lo, MAX] U [MIN, hi].
            if ty.bits == 1 {
                return ValueRange::Varying(ty);
            }
            (lo, hi) = (hi + 1, lo - 1);
            if hi < lo {
                return ValueRange::Varying(ty);
            }
            kind = match kind {
                RangeKind::Range => RangeKind::AntiRange,
                _ => RangeKind::Range,
            };
        }

        if kind == RangeKind::AntiRange {
            let is_min = lo <= ty.min_value();
            let is_max = hi >= ty.max_value();
            if is_min && is_max {
                return ValueRange::Undefined;
            } else if ty.bits == 1 && (is_min || is_max) {
                // The remaining single value.
                let v = if is_min {
                    ty.max_value()
                } else {
                    ty.min_value()
                };
                (lo, hi) = (v, v);
                kind = RangeKind::Range;
            } else if (is_min && !ty.pointer) || (ty.pointer && lo == 0) {
                (lo, hi) = (hi + 1, ty.max_value());
                kind = RangeKind::Range;
            } else if is_max && !ty.pointer {
                (lo, hi) = (ty.min_value(), lo - 1);
                kind = RangeKind::Range;
            }
        }

        if lo == ty.min_value() && hi == ty.max_value() {
            return match kind {
                RangeKind::Range => ValueRange::Varying(ty),
                _ => ValueRange::Undefined,
            };
        }

        Self::raw(ty, kind, Bound::Int(lo), Bound::Int(hi))
    }

    fn raw(ty: ScalarTy, kind: RangeKind, min: Bound, max: Bound) -> Self {
        match kind {
            RangeKind::Range => ValueRange::Range { ty, min, max },
            RangeKind::AntiRange => ValueRange::AntiRange { ty, min, max },
            RangeKind::Varying => ValueRange::Varying(ty),
            RangeKind::Undefined => ValueRange::Undefined,
        }
    }

    /// `[min, max]`.
    pub fn range(ty: ScalarTy, min: Bound, max: Bound) -> Self {
        Self::new(ty, RangeKind::Range, min, max)
    }

    /// `~[min, max]`.
    pub fn anti_range(ty: ScalarTy, min: Bound, max: Bound) -> Self {
        Self::new(ty, RangeKind::AntiRange, min, max)
    }

    /// `[lo, hi]` with constant bounds.
    pub fn ints(ty: ScalarTy, lo: i128, hi: i128) -> Self {
        Self::range(ty, Bound::Int(lo), Bound::Int(hi))
    }

    /// The single value `b`.
    pub fn singleton_of(ty: ScalarTy, b: Bound) -> Self {
        Self::range(ty, b, b)
    }

    /// The single constant `v`.
    pub fn constant(ty: ScalarTy, v: i128) -> Self {
        Self::ints(ty, v, v)
    }

    /// `[0, 0]`.
    pub fn zero(ty: ScalarTy) -> Self {
        Self::constant(ty, 0)
    }

    /// `~[0, 0]`.
    pub fn nonzero(ty: ScalarTy) -> Self {
        Self::anti_range(ty, Bound::Int(0), Bound::Int(0))
    }

    /// The kind of the range.
    pub fn kind(&self) -> RangeKind {
        match self {
            ValueRange::Undefined => RangeKind::Undefined,
            ValueRange::Varying(_) => RangeKind::Varying,
            ValueRange::Range { .. } => RangeKind::Range,
            ValueRange::AntiRange { .. } => RangeKind::AntiRange,
        }
    }

    /// The domain, unless undefined.
    pub fn ty(&self) -> Option<ScalarTy> {
        match *self {
            ValueRange::Undefined => None,
            ValueRange::Varying(ty)
            | ValueRange::Range { ty, .. }
            | ValueRange::AntiRange { ty, .. } => Some(ty),
        }
    }

    /// Lower bound. `Varying` reports the smallest domain value.
    pub fn min(&self) -> Option<Bound> {
        self.parts().map(|(_, _, min, _)| min)
    }

    /// Upper bound. `Varying` reports the largest domain value.
    pub fn max(&self) -> Option<Bound> {
        self.parts().map(|(_, _, _, max)| max)
    }

    fn parts(&self) -> Option<(RangeKind, ScalarTy, Bound, Bound)> {
        match *self {
            ValueRange::Undefined => None,
            ValueRange::Varying(ty) => Some((
                RangeKind::Varying,
                ty,
                Bound::Int(ty.min_value()),
                Bound::Int(ty.max_value()),
            )),
            ValueRange::Range { ty, min, max } => Some((RangeKind::Range, ty, min, max)),
            ValueRange::AntiRange { ty, min, max } => Some((RangeKind::AntiRange, ty, min, max)),
        }
    }

    /// Is this `Undefined`?
    pub fn is_undefined(&self) -> bool {
        matches!(self, ValueRange::Undefined)
    }

    /// Is this `Varying`?
    pub fn is_varying(&self) -> bool {
        matches!(self, ValueRange::Varying(_))
    }

    /// Make this range `Varying` over `ty`.
    pub fn set_varying(&mut self, ty: ScalarTy) {
        *self = ValueRange::Varying(ty);
    }

    /// Make this range `Undefined`.
    pub fn set_undefined(&mut self) {
        *self = ValueRange::Undefined;
    }

    /// Make this range `~[0, 0]` over `ty`.
    pub fn set_nonzero(&mut self, ty: ScalarTy) {
        *self = Self::nonzero(ty);
    }

    /// Make this range `[0, 0]` over `ty`.
    pub fn set_zero(&mut self, ty: ScalarTy) {
        *self = Self::zero(ty);
    }

    /// Does a bound depend on an SSA name?
    pub fn symbolic_p(&self) -> bool {
        match *self {
            ValueRange::Range { min, max, .. } | ValueRange::AntiRange { min, max, .. } => {
                min.is_symbolic() || max.is_symbolic()
            }
            _ => false,
        }
    }

    /// Are both bounds integer constants? False for `Varying` and `Undefined`.
    pub fn constant_p(&self) -> bool {
        match *self {
            ValueRange::Range { min, max, .. } | ValueRange::AntiRange { min, max, .. } => {
                min.as_int().is_some() && max.as_int().is_some()
            }
            _ => false,
        }
    }

    /// Are both bounds known integers? True for `Varying`.
    pub fn has_numeric_bounds(&self) -> bool {
        self.is_varying() || self.constant_p()
    }

    /// Is this `[0, 0]`?
    pub fn zero_p(&self) -> bool {
        matches!(
            *self,
            ValueRange::Range {
                min: Bound::Int(0),
                max: Bound::Int(0),
                ..
            }
        )
    }

    /// Does this range exclude exactly zero?
    pub fn nonzero_p(&self) -> bool {
        match *self {
            ValueRange::AntiRange {
                ty,
                min: Bound::Int(0),
                max: Bound::Int(0),
            } => ty.signed,
            ValueRange::Range {
                ty,
                min: Bound::Int(1),
                max,
            } => !ty.signed && ty.is_max(max, true),
            _ => false,
        }
    }

    /// Is `val` inside the range? `None` when that cannot be decided.
    pub fn value_inside_range(&self, val: Bound) -> Option<bool> {
        let (kind, ty, min, max) = match self.parts() {
            None => return Some(false),
            Some((RangeKind::Varying, ..)) => return Some(true),
            Some(p) => p,
        };

        if operand_less_p(ty, val, min)? {
            return Some(kind != RangeKind::Range);
        }
        let above = operand_less_p(ty, max, val)?;
        Some(if kind == RangeKind::Range { !above } else { above })
    }

    /// May the range contain `val`?
    pub fn may_contain_p(&self, val: Bound) -> bool {
        self.value_inside_range(val) != Some(false)
    }

    /// Does the range definitely contain the constant `v`?
    pub fn contains_p(&self, v: i128) -> bool {
        if self.symbolic_p() {
            return self.normalize_symbolics().contains_p(v);
        }
        self.value_inside_range(Bound::Int(v)) == Some(true)
    }

    /// May the range contain zero?
    pub fn range_includes_zero_p(&self) -> bool {
        match self {
            ValueRange::Undefined => false,
            ValueRange::Varying(_) => true,
            _ => self.may_contain_p(Bound::Int(0)),
        }
    }

    /// The single value in the range, if it has exactly one.
    pub fn singleton(&self) -> Option<Bound> {
        match *self {
            ValueRange::AntiRange { ty, max, .. } => {
                if self.nonzero_p() {
                    return if ty.bits == 1 { Some(max) } else { None };
                }
                if self.num_pairs() == 1 {
                    let (vr0, _) = self.ranges_from_anti_range(true)?;
                    return vr0.singleton();
                }
                None
            }
            ValueRange::Range { min, max, .. } if min == max && min.is_invariant() => Some(min),
            _ => None,
        }
    }

    /// Split a constant anti-range into the ranges below and above its excluded region.
    ///
    /// The first range is always defined; the second one may be `Undefined`. Returns `None`
    /// for anything other than an anti-range with constant bounds, and for pointers unless
    /// `handle_pointers`.
    pub fn ranges_from_anti_range(&self, handle_pointers: bool) -> Option<(Self, Self)> {
        let (ty, lo, hi) = match *self {
            ValueRange::AntiRange {
                ty,
                min: Bound::Int(lo),
                max: Bound::Int(hi),
            } => (ty, lo, hi),
            _ => return None,
        };
        if ty.pointer && !handle_pointers {
            return None;
        }

        let mut vr0 = ValueRange::Undefined;
        let mut vr1 = ValueRange::Undefined;
        if ty.min_value() < lo {
            vr0 = Self::ints(ty, ty.min_value(), lo - 1);
        }
        if hi < ty.max_value() {
            vr1 = Self::ints(ty, hi + 1, ty.max_value());
        }
        if vr0.is_undefined() {
            vr0 = vr1;
            vr1 = ValueRange::Undefined;
        }
        if vr0.is_undefined() {
            None
        } else {
            Some((vr0, vr1))
        }
    }

    /// The number of disjoint constant sub-ranges covered by the range.
    pub fn num_pairs(&self) -> usize {
        match *self {
            ValueRange::Undefined => 0,
            ValueRange::Varying(_) => 1,
            _ if self.symbolic_p() => self.normalize_symbolics().num_pairs(),
            ValueRange::AntiRange { ty, min, max } => {
                if ty.is_min(min, true) || ty.is_max(max, true) {
                    1
                } else {
                    2
                }
            }
            _ => 1,
        }
    }

    /// The lower bound of sub-range `pair`.
    pub fn lower_bound(&self, pair: usize) -> i128 {
        if self.symbolic_p() {
            return self.normalize_symbolics().lower_bound(pair);
        }
        debug_assert!(pair < self.num_pairs());
        match self.parts() {
            Some((RangeKind::AntiRange, ty, min, max)) => {
                if pair == 1 || ty.is_min(min, true) {
                    int_of(max) + 1
                } else {
                    ty.min_value()
                }
            }
            Some((_, _, min, _)) => int_of(min),
            None => panic!("lower bound of an undefined range"),
        }
    }

    /// The upper bound of sub-range `pair`.
    pub fn upper_bound(&self, pair: usize) -> i128 {
        if self.symbolic_p() {
            return self.normalize_symbolics().upper_bound(pair);
        }
        debug_assert!(pair < self.num_pairs());
        match self.parts() {
            Some((RangeKind::AntiRange, ty, min, _)) => {
                if pair == 1 || ty.is_min(min, true) {
                    ty.max_value()
                } else {
                    int_of(min) - 1
                }
            }
            Some((_, _, _, max)) => int_of(max),
            None => panic!("upper bound of an undefined range"),
        }
    }

    /// Swap a range for its anti-range and vice versa.
    pub fn invert(&mut self) {
        *self = match *self {
            ValueRange::Range { ty, min, max } => ValueRange::AntiRange { ty, min, max },
            ValueRange::AntiRange { ty, min, max } => ValueRange::Range { ty, min, max },
            _ => panic!("inverting {self}"),
        };
    }

    /// Replace address bounds of pointer ranges by what they imply about nullness.
    pub fn normalize_addresses(&self) -> Self {
        match self.ty() {
            Some(ty) if ty.pointer && !self.has_numeric_bounds() => {
                if !self.range_includes_zero_p() {
                    Self::nonzero(ty)
                } else {
                    ValueRange::Varying(ty)
                }
            }
            _ => *self,
        }
    }

    /// Widen symbolic bounds to the domain extremes, and normalize addresses.
    pub fn normalize_symbolics(&self) -> Self {
        let (kind, ty, min, max) = match self.parts() {
            None | Some((RangeKind::Varying, ..)) => return *self,
            Some(p) => p,
        };
        let (min_sym, max_sym) = (min.is_symbolic(), max.is_symbolic());
        if !min_sym && !max_sym {
            return self.normalize_addresses();
        }
        if min_sym && max_sym {
            return ValueRange::Varying(ty);
        }
        let dmin = Bound::Int(ty.min_value());
        let dmax = Bound::Int(ty.max_value());
        if kind == RangeKind::Range {
            return if min_sym {
                Self::range(ty, dmin, max)
            } else {
                Self::range(ty, min, dmax)
            };
        }
        // ~[SYM, N] is at least [N + 1, MAX], ~[N, SYM] at most [MIN, N - 1].
        match (min_sym, min, max) {
            (true, _, Bound::Int(n)) if !ty.is_max(max, false) => {
                Self::range(ty, Bound::Int(n + 1), dmax)
            }
            (false, Bound::Int(n), _) if !ty.is_min(min, false) => {
                Self::range(ty, dmin, Bound::Int(n - 1))
            }
            _ => ValueRange::Varying(ty),
        }
    }

    /// Intersect `self` with `other`.
    pub fn intersect(&mut self, other: &Self) {
        let result = intersect_helper(self, other);
        trace!("intersecting {self} and {other} to {result}");
        *self = result;
    }

    /// Meet `self` with `other`: the result contains both ranges.
    pub fn union_(&mut self, other: &Self) {
        let result = union_helper(self, other);
        trace!("meeting {self} and {other} to {result}");
        *self = result;
    }
}

fn int_of(b: Bound) -> i128 {
    b.as_int().expect("numeric bound")
}

/// A working copy of a range during meet and intersection.
#[derive(Clone, Copy)]
struct Parts {
    kind: RangeKind,
    min: Bound,
    max: Bound,
}

impl Parts {
    fn set(&mut self, kind: RangeKind, min: Bound, max: Bound) {
        *self = Parts { kind, min, max };
    }

    fn give_up(&mut self) {
        self.kind = RangeKind::Varying;
    }

    fn undefined(&mut self) {
        self.kind = RangeKind::Undefined;
    }
}

fn is_int(b: Bound) -> bool {
    b.as_int().is_some()
}

/// `b + c`, for constant `b`.
fn plus(b: Bound, c: i128) -> Bound {
    Bound::Int(int_of(b) + c)
}

fn less(ty: ScalarTy, a: Bound, b: Bound) -> bool {
    operand_less_p(ty, a, b) == Some(true)
}

fn union_ranges(ty: ScalarTy, vr0: &mut Parts, vr1: Parts) {
    let cmpmin = compare_values(ty, vr0.min, vr1.min);
    let cmpmax = compare_values(ty, vr0.max, vr1.max);
    let mineq = cmpmin == Comparison::Equal;
    let maxeq = cmpmax == Comparison::Equal;
    use RangeKind::{AntiRange, Range};

    // In the pictures below, [] is vr0 and () is vr1.
    if mineq && maxeq {
        // [( )]
        if vr0.kind != vr1.kind {
            vr0.give_up();
        }
    } else if less(ty, vr0.max, vr1.min) || less(ty, vr1.max, vr0.min) {
        // [ ] ( ) or ( ) [ ]
        match (vr0.kind, vr1.kind) {
            (AntiRange, AntiRange) => vr0.give_up(),
            (AntiRange, _) => {}
            (_, AntiRange) => *vr0 = vr1,
            _ => {
                // The convex hull, or an anti-range for the gap if the hull spans everything.
                if less(ty, vr0.max, vr1.min) {
                    if is_int(vr0.max)
                        && is_int(vr1.min)
                        && ty.is_min(vr0.min, false)
                        && ty.is_max(vr1.max, false)
                    {
                        let min = plus(vr0.max, 1);
                        let max = plus(vr1.min, -1);
                        if operand_less_p(ty, max, min) != Some(true) {
                            vr0.set(AntiRange, min, max);
                        } else {
                            vr0.max = vr1.max;
                        }
                    } else {
                        vr0.max = vr1.max;
                    }
                } else if is_int(vr1.max)
                    && is_int(vr0.min)
                    && ty.is_min(vr1.min, false)
                    && ty.is_max(vr0.max, false)
                {
                    let min = plus(vr1.max, 1);
                    let max = plus(vr0.min, -1);
                    if operand_less_p(ty, max, min) != Some(true) {
                        vr0.set(AntiRange, min, max);
                    } else {
                        vr0.min = vr1.min;
                    }
                } else {
                    vr0.min = vr1.min;
                }
            }
        }
    } else if (maxeq || cmpmax == Comparison::Greater) && (mineq || cmpmin == Comparison::Less) {
        // [ ( ) ] or [( ) ] or [ ( )]
        match (vr0.kind, vr1.kind) {
            (Range, Range) => {}
            (AntiRange, AntiRange) => *vr0 = vr1,
            (AntiRange, Range) => {
                // Arbitrarily choose the right or left gap.
                if !mineq && is_int(vr1.min) {
                    vr0.max = plus(vr1.min, -1);
                } else if !maxeq && is_int(vr1.max) {
                    vr0.min = plus(vr1.max, 1);
                } else {
                    vr0.give_up();
                }
            }
            // The result covers everything.
            _ => vr0.give_up(),
        }
    } else if (maxeq || cmpmax == Comparison::Less) && (mineq || cmpmin == Comparison::Greater) {
        // ( [ ] ) or ([ ] ) or ( [ ])
        match (vr0.kind, vr1.kind) {
            (Range, Range) => *vr0 = vr1,
            (AntiRange, AntiRange) => {}
            (Range, AntiRange) => {
                if !mineq && is_int(vr0.min) {
                    let max = plus(vr0.min, -1);
                    vr0.set(AntiRange, vr1.min, max);
                } else if !maxeq && is_int(vr0.max) {
                    let min = plus(vr0.max, 1);
                    vr0.set(AntiRange, min, vr1.max);
                } else {
                    vr0.give_up();
                }
            }
            _ => vr0.give_up(),
        }
    } else if cmpmin == Comparison::Less
        && cmpmax == Comparison::Less
        && (less(ty, vr1.min, vr0.max) || vr1.min == vr0.max)
    {
        // [ ( ] ) or [ ]( )
        match (vr0.kind, vr1.kind) {
            (Range, Range) => vr0.max = vr1.max,
            (AntiRange, AntiRange) => vr0.min = vr1.min,
            (AntiRange, Range) => {
                if is_int(vr1.min) {
                    vr0.max = plus(vr1.min, -1);
                } else {
                    vr0.give_up();
                }
            }
            _ => {
                if is_int(vr0.max) {
                    let min = plus(vr0.max, 1);
                    vr0.set(AntiRange, min, vr1.max);
                } else {
                    vr0.give_up();
                }
            }
        }
    } else if cmpmin == Comparison::Greater
        && cmpmax == Comparison::Greater
        && (less(ty, vr0.min, vr1.max) || vr0.min == vr1.max)
    {
        // ( [ ) ] or ( )[ ]
        match (vr0.kind, vr1.kind) {
            (Range, Range) => vr0.min = vr1.min,
            (AntiRange, AntiRange) => vr0.max = vr1.max,
            (AntiRange, Range) => {
                if is_int(vr1.max) {
                    vr0.min = plus(vr1.max, 1);
                } else {
                    vr0.give_up();
                }
            }
            _ => {
                if is_int(vr0.min) {
                    let max = plus(vr0.min, -1);
                    vr0.set(AntiRange, vr1.min, max);
                } else {
                    vr0.give_up();
                }
            }
        }
    } else {
        vr0.give_up();
    }
}

fn intersect_ranges(ty: ScalarTy, vr0: &mut Parts, vr1: Parts) {
    let mineq = vr0.min == vr1.min;
    let maxeq = vr0.max == vr1.max;
    use RangeKind::{AntiRange, Range};

    if mineq && maxeq {
        // [( )]
        if vr0.kind != vr1.kind {
            vr0.undefined();
        }
    } else if less(ty, vr0.max, vr1.min) || less(ty, vr1.max, vr0.min) {
        // [ ] ( ) or ( ) [ ]
        match (vr0.kind, vr1.kind) {
            (Range, AntiRange) => {}
            (AntiRange, Range) => *vr0 = vr1,
            (Range, Range) => vr0.undefined(),
            _ => {
                // Merge adjacent anti-ranges, otherwise arbitrarily keep vr0.
                if is_int(vr0.max)
                    && is_int(vr1.min)
                    && less(ty, vr0.max, vr1.min)
                    && int_of(vr1.min) - int_of(vr0.max) == 1
                {
                    vr0.max = vr1.max;
                } else if is_int(vr1.max)
                    && is_int(vr0.min)
                    && less(ty, vr1.max, vr0.min)
                    && int_of(vr0.min) - int_of(vr1.max) == 1
                {
                    vr0.min = vr1.min;
                }
            }
        }
    } else if (maxeq || less(ty, vr1.max, vr0.max)) && (mineq || less(ty, vr0.min, vr1.min)) {
        // [ ( ) ] or [( ) ] or [ ( )]
        match (vr0.kind, vr1.kind) {
            (Range, Range) => *vr0 = vr1,
            (Range, AntiRange) => {
                if mineq {
                    // The right gap, the left one is empty.
                    vr0.min = if is_int(vr1.max) {
                        plus(vr1.max, 1)
                    } else {
                        vr1.max
                    };
                } else if maxeq {
                    vr0.max = if is_int(vr1.min) {
                        plus(vr1.min, -1)
                    } else {
                        vr1.min
                    };
                } else if ty.is_min(vr0.min, false) && ty.is_max(vr0.max, false) {
                    *vr0 = vr1;
                }
            }
            (AntiRange, AntiRange) => {}
            _ => vr0.undefined(),
        }
    } else if (maxeq || less(ty, vr0.max, vr1.max)) && (mineq || less(ty, vr1.min, vr0.min)) {
        // ( [ ] ) or ([ ] ) or ( [ ])
        match (vr0.kind, vr1.kind) {
            (Range, Range) => {}
            (AntiRange, Range) => {
                if mineq {
                    let min = if is_int(vr0.max) {
                        plus(vr0.max, 1)
                    } else {
                        vr0.max
                    };
                    vr0.set(Range, min, vr1.max);
                } else if maxeq {
                    let max = if is_int(vr0.min) {
                        plus(vr0.min, -1)
                    } else {
                        vr0.min
                    };
                    vr0.set(Range, vr1.min, max);
                } else if ty.is_min(vr1.min, false) && ty.is_max(vr1.max, false) {
                    // The range is effectively varying.
                } else if vr0.min == vr0.max
                    && vr0.min == Bound::Int(0)
                    && (ty.bits >= 32 || ty.pointer)
                    && is_wide(ty, vr1)
                {
                    // Keep ~[0, 0] over a relatively wide range.
                } else {
                    *vr0 = vr1;
                }
            }
            (AntiRange, AntiRange) => *vr0 = vr1,
            _ => vr0.undefined(),
        }
    } else if (less(ty, vr1.min, vr0.max) || vr1.min == vr0.max) && less(ty, vr0.min, vr1.min) {
        // [ ( ] ) or [ ]( )
        match (vr0.kind, vr1.kind) {
            (AntiRange, AntiRange) => vr0.max = vr1.max,
            (Range, Range) => vr0.min = vr1.min,
            (Range, AntiRange) => {
                vr0.max = if is_int(vr1.min) {
                    plus(vr1.min, -1)
                } else {
                    vr1.min
                };
            }
            _ => {
                let min = if is_int(vr0.max) {
                    plus(vr0.max, 1)
                } else {
                    vr0.max
                };
                vr0.set(Range, min, vr1.max);
            }
        }
    } else if (less(ty, vr0.min, vr1.max) || vr0.min == vr1.max) && less(ty, vr1.min, vr0.min) {
        // ( [ ) ] or ( )[ ]
        match (vr0.kind, vr1.kind) {
            (AntiRange, AntiRange) => vr0.min = vr1.min,
            (Range, Range) => vr0.max = vr1.max,
            (Range, AntiRange) => {
                vr0.min = if is_int(vr1.max) {
                    plus(vr1.max, 1)
                } else {
                    vr1.max
                };
            }
            _ => {
                let max = if is_int(vr0.min) {
                    plus(vr0.min, -1)
                } else {
                    vr0.min
                };
                vr0.set(Range, vr1.min, max);
            }
        }
    }

    if vr0.kind == RangeKind::Undefined {
        return;
    }

    // vr0 is a conservative answer, unless vr1 is a constant singleton.
    if vr1.kind == Range && vr1.min.is_invariant() && vr1.min == vr1.max {
        *vr0 = vr1;
    }
}

/// Does the constant range `vr` span more than half the bits of `ty`?
fn is_wide(ty: ScalarTy, vr: Parts) -> bool {
    match (vr.min, vr.max) {
        (Bound::Int(lo), Bound::Int(hi)) => {
            let width = ty.to_bits(hi - lo);
            let clz = width.leading_zeros() as i64 - (128 - i64::from(ty.bits));
            clz < i64::from(ty.bits) / 2
        }
        _ => false,
    }
}

fn canonical(ty: ScalarTy, parts: Parts) -> ValueRange {
    match parts.kind {
        RangeKind::Undefined => ValueRange::Undefined,
        RangeKind::Varying => ValueRange::Varying(ty),
        kind => ValueRange::new(ty, kind, parts.min, parts.max),
    }
}

fn intersect_helper(vr0: &ValueRange, vr1: &ValueRange) -> ValueRange {
    if vr1.is_varying() {
        return *vr0;
    }
    if vr0.is_varying() {
        return *vr1;
    }
    let (Some((k0, ty, min0, max0)), Some((k1, _, min1, max1))) = (vr0.parts(), vr1.parts())
    else {
        return ValueRange::Undefined;
    };

    let mut parts = Parts {
        kind: k0,
        min: min0,
        max: max0,
    };
    intersect_ranges(
        ty,
        &mut parts,
        Parts {
            kind: k1,
            min: min1,
            max: max1,
        },
    );
    // The canonical form of an inverted range can still be a range; fall back to vr0 rather
    // than losing everything.
    let result = canonical(ty, parts);
    if result.is_varying() { *vr0 } else { result }
}

fn union_helper(vr0: &ValueRange, vr1: &ValueRange) -> ValueRange {
    if vr1.is_undefined() || vr0.is_varying() {
        return *vr0;
    }
    if vr0.is_undefined() || vr1.is_varying() {
        return *vr1;
    }
    let (Some((k0, ty, min0, max0)), Some((k1, _, min1, max1))) = (vr0.parts(), vr1.parts())
    else {
        unreachable!();
    };

    let mut parts = Parts {
        kind: k0,
        min: min0,
        max: max0,
    };
    union_ranges(
        ty,
        &mut parts,
        Parts {
            kind: k1,
            min: min1,
            max: max1,
        },
    );
    let result = canonical(ty, parts);

    // Before giving up, see whether at least nullness survives.
    if result.is_varying() && !vr0.range_includes_zero_p() && !vr1.range_includes_zero_p() {
        return ValueRange::nonzero(ty);
    }
    result
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (kind, ty, min, max) = match self.parts() {
            None => return f.write_str("UNDEFINED"),
            Some((RangeKind::Varying, ty, ..)) => return write!(f, "{ty} VARYING"),
            Some(p) => p,
        };
        write!(f, "{ty} ")?;
        if kind == RangeKind::AntiRange {
            f.write_str("~")?;
        }
        f.write_str("[")?;
        if ty.signed && ty.bits != 1 && ty.is_min(min, false) {
            f.write_str("-INF")?;
        } else {
            write!(f, "{min}")?;
        }
        f.write_str(", ")?;
        if ty.bits != 1 && !ty.pointer && ty.is_max(max, false) {
            f.write_str("+INF")?;
        } else {
            write!(f, "{max}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::{Value, Var};
    use proptest::prelude::*;

    /// Every canonical constant range over `ty`, plus `Undefined` and `Varying`.
    pub(crate) fn all_ranges(ty: ScalarTy) -> Vec<ValueRange> {
        let mut out = vec![ValueRange::Undefined, ValueRange::Varying(ty)];
        for lo in ty.min_value()..=ty.max_value() {
            for hi in lo..=ty.max_value() {
                out.push(ValueRange::ints(ty, lo, hi));
                out.push(ValueRange::anti_range(ty, Bound::Int(lo), Bound::Int(hi)));
            }
        }
        out
    }

    fn s32() -> ScalarTy {
        ScalarTy::int(32, true, false)
    }

    #[test]
    fn canonicalize() {
        let u8_ = ScalarTy::int(8, false, true);
        let s8 = ScalarTy::int(8, true, false);
        assert_eq!(ValueRange::ints(u8_, 0, 255), ValueRange::Varying(u8_));
        assert_eq!(
            ValueRange::anti_range(u8_, Bound::Int(0), Bound::Int(255)),
            ValueRange::Undefined
        );
        // Swapped bounds wrap around.
        assert_eq!(
            ValueRange::ints(u8_, 250, 5),
            ValueRange::AntiRange {
                ty: u8_,
                min: Bound::Int(6),
                max: Bound::Int(249)
            }
        );
        assert_eq!(
            ValueRange::anti_range(s8, Bound::Int(3), Bound::Int(-3)),
            ValueRange::ints(s8, -2, 2)
        );
        // [C + 1, C] covers everything.
        assert_eq!(ValueRange::ints(s8, 4, 3), ValueRange::Varying(s8));
        // Anti-ranges touching an extreme.
        assert_eq!(ValueRange::nonzero(u8_), ValueRange::ints(u8_, 1, 255));
        assert_eq!(
            ValueRange::anti_range(s8, Bound::Int(100), Bound::Int(127)),
            ValueRange::ints(s8, -128, 99)
        );
        assert!(ValueRange::nonzero(s32()).nonzero_p());
        assert!(ValueRange::nonzero(u8_).nonzero_p());
        // Booleans.
        let b = ScalarTy::boolean();
        assert_eq!(ValueRange::ints(b, 1, 0), ValueRange::Varying(b));
        assert_eq!(
            ValueRange::anti_range(b, Bound::Int(0), Bound::Int(0)),
            ValueRange::constant(b, 1)
        );
        // Pointers keep nullness.
        let p = ScalarTy::pointer();
        assert_eq!(
            ValueRange::nonzero(p),
            ValueRange::ints(p, 1, p.max_value())
        );
    }

    #[test]
    fn symbolic_ranges() {
        let n = Bound::name(Value::new(1));
        let ty = s32();
        let r = ValueRange::range(ty, Bound::Int(0), n);
        assert!(r.symbolic_p());
        assert!(!r.constant_p());
        assert_eq!(
            r.normalize_symbolics(),
            ValueRange::ints(ty, 0, ty.max_value())
        );
        assert!(r.contains_p(5));
        assert_eq!(r.value_inside_range(Bound::Int(5)), None);
        assert_eq!(r.value_inside_range(Bound::Int(-1)), Some(false));
        assert_eq!(r.num_pairs(), 1);

        let ar = ValueRange::anti_range(ty, n, Bound::Int(10));
        assert_eq!(
            ar.normalize_symbolics(),
            ValueRange::ints(ty, 11, ty.max_value())
        );
        assert_eq!(
            ValueRange::range(ty, n, n.offset_by(1)).normalize_symbolics(),
            ValueRange::Varying(ty)
        );
        assert_eq!(ValueRange::singleton_of(ty, n).singleton(), None);
    }

    #[test]
    fn addresses() {
        let p = ScalarTy::pointer();
        let a = Bound::Addr {
            var: Var::new(0),
            offset: 0,
        };
        let r = ValueRange::singleton_of(p, a);
        assert_eq!(r.singleton(), Some(a));
        assert!(!r.range_includes_zero_p());
        assert_eq!(r.normalize_addresses(), ValueRange::nonzero(p));
        assert_eq!(r.to_string(), "ptr [&var0, &var0]");
    }

    #[test]
    fn pairs_and_singletons() {
        let ty = s32();
        let ar = ValueRange::anti_range(ty, Bound::Int(-5), Bound::Int(5));
        assert_eq!(ar.num_pairs(), 2);
        assert_eq!(ar.lower_bound(0), ty.min_value());
        assert_eq!(ar.upper_bound(0), -6);
        assert_eq!(ar.lower_bound(1), 6);
        assert_eq!(ar.upper_bound(1), ty.max_value());
        assert_eq!(ValueRange::Varying(ty).num_pairs(), 1);
        assert_eq!(ValueRange::Undefined.num_pairs(), 0);
        assert_eq!(ValueRange::constant(ty, 3).singleton(), Some(Bound::Int(3)));

        let (lo, hi) = ar.ranges_from_anti_range(false).unwrap();
        assert_eq!(lo, ValueRange::ints(ty, ty.min_value(), -6));
        assert_eq!(hi, ValueRange::ints(ty, 6, ty.max_value()));

        let mut r = ValueRange::ints(ty, 1, 2);
        r.invert();
        assert_eq!(r.kind(), RangeKind::AntiRange);
        assert_eq!(r.to_string(), "i32 ~[1, 2]");
        assert_eq!(ValueRange::ints(ty, ty.min_value(), 0).to_string(), "i32 [-INF, 0]");
    }

    #[test]
    fn meet_and_intersect() {
        let ty = s32();
        let mut r = ValueRange::ints(ty, 1, 5);
        r.union_(&ValueRange::ints(ty, 3, 9));
        assert_eq!(r, ValueRange::ints(ty, 1, 9));

        // Disjoint ranges spanning both ends become an anti-range of the gap.
        let mut r = ValueRange::ints(ty, ty.min_value(), -1);
        r.union_(&ValueRange::ints(ty, 1, ty.max_value()));
        assert_eq!(r, ValueRange::nonzero(ty));

        // Neither side includes zero.
        let mut r = ValueRange::nonzero(ty);
        r.union_(&ValueRange::anti_range(ty, Bound::Int(-1), Bound::Int(3)));
        assert_eq!(r, ValueRange::nonzero(ty));

        let mut r = ValueRange::ints(ty, 0, 10);
        r.intersect(&ValueRange::ints(ty, 5, 20));
        assert_eq!(r, ValueRange::ints(ty, 5, 10));

        let mut r = ValueRange::ints(ty, 0, 10);
        r.intersect(&ValueRange::anti_range(ty, Bound::Int(0), Bound::Int(3)));
        assert_eq!(r, ValueRange::ints(ty, 4, 10));

        let mut r = ValueRange::ints(ty, 0, 10);
        r.intersect(&ValueRange::ints(ty, 20, 30));
        assert_eq!(r, ValueRange::Undefined);

        // Adjacent anti-ranges merge.
        let mut r = ValueRange::anti_range(ty, Bound::Int(0), Bound::Int(3));
        r.intersect(&ValueRange::anti_range(ty, Bound::Int(4), Bound::Int(6)));
        assert_eq!(r, ValueRange::anti_range(ty, Bound::Int(0), Bound::Int(6)));

        // ~[0, 0] is preferred over a wide range.
        let mut r = ValueRange::nonzero(ty);
        r.intersect(&ValueRange::ints(ty, -1_000_000, 1 << 30));
        assert_eq!(r, ValueRange::nonzero(ty));

        let mut r = ValueRange::Varying(ty);
        r.intersect(&ValueRange::Undefined);
        assert_eq!(r, ValueRange::Undefined);
    }

    fn members(ty: ScalarTy, r: &ValueRange) -> Vec<i128> {
        (ty.min_value()..=ty.max_value())
            .filter(|&v| r.contains_p(v))
            .collect()
    }

    #[test]
    fn lattice_soundness_4bit() {
        for ty in [
            ScalarTy::int(4, false, true),
            ScalarTy::int(4, true, false),
            ScalarTy::int(4, true, true),
        ] {
            let ranges: Vec<_> = all_ranges(ty)
                .into_iter()
                .map(|r| (r, members(ty, &r)))
                .collect();
            for (a, ma) in &ranges {
                for (b, mb) in &ranges {
                    let mut u = *a;
                    u.union_(b);
                    for &v in ma.iter().chain(mb.iter()) {
                        assert!(u.contains_p(v), "{v} missing from {a} U {b} = {u}");
                    }
                    let mut i = *a;
                    i.intersect(b);
                    if i.is_undefined() {
                        continue;
                    }
                    for &v in ma.iter().filter(|v| mb.contains(v)) {
                        assert!(i.contains_p(v), "{v} missing from {a} ^ {b} = {i}");
                    }
                }
            }
        }
    }

    #[test]
    fn empty_intersections_are_empty() {
        let ty = ScalarTy::int(4, true, false);
        let ranges = all_ranges(ty);
        for a in &ranges {
            let ma = members(ty, a);
            for b in &ranges {
                let mut i = *a;
                i.intersect(b);
                if i.is_undefined() {
                    assert!(
                        ma.iter().all(|&v| !b.contains_p(v)),
                        "{a} ^ {b} is not empty"
                    );
                }
            }
        }
    }

    fn arb_range() -> impl Strategy<Value = (ScalarTy, RangeKind, i128, i128)> {
        (1u8..=8, any::<bool>(), any::<bool>(), any::<bool>())
            .prop_flat_map(|(bits, signed, wraps, anti)| {
                let ty = ScalarTy::int(bits, signed, wraps);
                let kind = if anti {
                    RangeKind::AntiRange
                } else {
                    RangeKind::Range
                };
                let dom = ty.min_value()..=ty.max_value();
                (Just(ty), Just(kind), dom.clone(), dom)
            })
    }

    proptest! {
        #[test]
        fn canonicalization_is_idempotent((ty, kind, lo, hi) in arb_range()) {
            let r = ValueRange::new(ty, kind, Bound::Int(lo), Bound::Int(hi));
            let again = match (r.min(), r.max()) {
                (Some(min), Some(max)) => ValueRange::new(ty, r.kind(), min, max),
                _ => r,
            };
            prop_assert_eq!(r, again);
            if let (Some(Bound::Int(min)), Some(Bound::Int(max))) = (r.min(), r.max()) {
                prop_assert!(min <= max);
            }
        }

        #[test]
        fn canonicalization_keeps_members((ty, kind, lo, hi) in arb_range()) {
            let r = ValueRange::new(ty, kind, Bound::Int(lo), Bound::Int(hi));
            for v in ty.min_value()..=ty.max_value() {
                let inside = if lo <= hi {
                    lo <= v && v <= hi
                } else {
                    v >= lo || v <= hi
                };
                let expected = inside == (kind == RangeKind::Range);
                // Degenerate swapped inputs may only widen.
                if expected {
                    prop_assert!(r.contains_p(v), "{} not in {}", v, r);
                } else if lo <= hi {
                    prop_assert!(!r.contains_p(v), "{} in {}", v, r);
                }
            }
        }
    }
}
