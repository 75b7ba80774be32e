//! Range folding of individual operators.
//!
//! Every operator folds pairs of constant sub-ranges `[lh_lb, lh_ub] op [rh_lb, rh_ub]`; the
//! generic driver splits anti-ranges into their sub-ranges and unions the results. Operands
//! reaching this module have had symbolic bounds and addresses normalized away.
//!
//! Addition, subtraction and pointer addition are folded by [`arith`](super::arith) because
//! they also handle symbolic bounds.

use crate::ir::{BinaryOp, UnaryOp};
use crate::settings::Flags;
use crate::vrp::arith;
use crate::vrp::bound::{Bound, ScalarTy};
use crate::vrp::lattice::ValueRange;

/// A unary operation, including conversions between scalar domains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryCode {
    /// Negation.
    Neg,
    /// Bitwise complement.
    BitNot,
    /// Absolute value.
    Abs,
    /// Conversion from the operand domain to the result domain.
    Convert,
}

impl From<UnaryOp> for UnaryCode {
    fn from(op: UnaryOp) -> Self {
        match op {
            UnaryOp::Neg => UnaryCode::Neg,
            UnaryOp::BitNot => UnaryCode::BitNot,
            UnaryOp::Abs => UnaryCode::Abs,
        }
    }
}

/// Overflow of a bound computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Overflow {
    None,
    Underflow,
    Overflow,
}

impl Overflow {
    /// Classify the exact result `v` against the domain `ty`.
    pub(crate) fn of(ty: ScalarTy, v: i128) -> Self {
        if v < ty.min_value() {
            Overflow::Underflow
        } else if v > ty.max_value() {
            Overflow::Overflow
        } else {
            Overflow::None
        }
    }
}

/// Build `[wmin, wmax]` in `ty` from exact bounds that may have overflowed.
fn value_range_with_overflow(
    ty: ScalarTy,
    wmin: i128,
    wmax: i128,
    min_ovf: Overflow,
    max_ovf: Overflow,
) -> ValueRange {
    if ty.bits == 1 && wmin != wmax {
        return ValueRange::Varying(ty);
    }

    if ty.wraps {
        if (min_ovf != Overflow::None) == (max_ovf != Overflow::None) {
            let (tmin, tmax) = (ty.wrap(wmin), ty.wrap(wmax));
            if tmin > tmax {
                ValueRange::Varying(ty)
            } else {
                ValueRange::ints(ty, tmin, tmax)
            }
        } else if (min_ovf == Overflow::Underflow && max_ovf == Overflow::None)
            || (max_ovf == Overflow::Overflow && min_ovf == Overflow::None)
        {
            ValueRange::ints(ty, ty.wrap(wmin), ty.wrap(wmax))
        } else {
            ValueRange::Varying(ty)
        }
    } else {
        if min_ovf != Overflow::None && min_ovf == max_ovf {
            return ValueRange::Undefined;
        }
        let saturate = |v: i128, ovf| match ovf {
            Overflow::Underflow => ty.min_value(),
            Overflow::Overflow => ty.max_value(),
            Overflow::None => v,
        };
        ValueRange::ints(ty, saturate(wmin, min_ovf), saturate(wmax, max_ovf))
    }
}

fn includes_zero(lb: i128, ub: i128) -> bool {
    lb <= 0 && 0 <= ub
}

/// Fold the four corners of `[lh_lb, lh_ub] op [rh_lb, rh_ub]` for an operator monotone in
/// each operand. `op` returns `None` on an overflow that cannot be represented.
fn cross_product(
    ty: ScalarTy,
    lh: (i128, i128),
    rh: (i128, i128),
    op: impl Fn(i128, i128) -> Option<i128>,
) -> ValueRange {
    let corners = || -> Option<[i128; 4]> {
        let cp1 = op(lh.0, rh.0)?;
        let cp3 = if lh.0 == lh.1 { cp1 } else { op(lh.1, rh.0)? };
        let cp2 = if rh.0 == rh.1 { cp1 } else { op(lh.0, rh.1)? };
        let cp4 = if lh.0 == lh.1 { cp2 } else { op(lh.1, rh.1)? };
        Some([cp1, cp2, cp3, cp4])
    };
    let Some([mut cp1, mut cp2, mut cp3, mut cp4]) = corners() else {
        return ValueRange::Varying(ty);
    };
    if cp1 > cp2 {
        core::mem::swap(&mut cp1, &mut cp2);
    }
    if cp3 > cp4 {
        core::mem::swap(&mut cp3, &mut cp4);
    }
    value_range_with_overflow(
        ty,
        cp1.min(cp3),
        cp2.max(cp4),
        Overflow::None,
        Overflow::None,
    )
}

/// `a * b`, or `None` if the product does not fit.
fn checked_mul(ty: ScalarTy, a: i128, b: i128) -> Option<i128> {
    a.checked_mul(b).filter(|&p| ty.contains(p))
}

fn mult(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    if ty.overflow_undefined() {
        return cross_product(ty, lh, rh, |a, b| checked_mul(ty, a, b));
    }

    // Multiply in twice the precision, so that an unsigned [-3, -1] * [-3, -1] does not
    // degrade to varying.
    let size = 1i128 << ty.bits;
    let sizem1 = size - 1;
    let (mut min0, mut max0) = lh;
    let (mut min1, mut max1) = rh;
    if !ty.signed {
        if size < min0 + max0 {
            min0 -= size;
            max0 -= size;
        }
        if size < min1 + max1 {
            min1 -= size;
            max1 -= size;
        }
    }

    let prods = || -> Option<[i128; 4]> {
        Some([
            min0.checked_mul(min1)?,
            min0.checked_mul(max1)?,
            max0.checked_mul(min1)?,
            max0.checked_mul(max1)?,
        ])
    };
    let Some(mut p) = prods() else {
        return ValueRange::Varying(ty);
    };
    p.sort_unstable();
    if p[3] - p[0] >= sizem1 {
        ValueRange::Varying(ty)
    } else {
        ValueRange::ints(ty, ty.wrap(p[0]), ty.wrap(p[3]))
    }
}

fn div(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128), flags: &Flags) -> ValueRange {
    if rh == (0, 0) {
        return ValueRange::Undefined;
    }
    let trunc_div = |a: i128, b: i128| -> Option<i128> {
        if b == 0 {
            return None;
        }
        let q = a / b;
        if ty.contains(q) {
            Some(q)
        } else if ty.overflow_undefined() {
            // Only MIN / -1 overflows.
            Some(ty.max_value())
        } else {
            None
        }
    };

    if !includes_zero(rh.0, rh.1) {
        return cross_product(ty, lh, rh, trunc_div);
    }
    // A division by zero may trap, and then must not be assumed away.
    if flags.can_throw_non_call_exceptions() {
        return ValueRange::Varying(ty);
    }

    // Divide by [rh_lb, -1] and [1, rh_ub] separately.
    let mut r = if rh.0 < 0 {
        cross_product(ty, lh, (rh.0, -1), trunc_div)
    } else {
        ValueRange::Undefined
    };
    if rh.1 > 0 {
        r.union_(&cross_product(ty, lh, (1, rh.1), trunc_div));
    }
    r
}

fn trunc_mod(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    if rh == (0, 0) {
        return ValueRange::Undefined;
    }
    // |a % b| < |b|, and a % b lies between 0 and a.
    let mut new_ub = ty.wrap(rh.1 - 1);
    if ty.signed {
        new_ub = new_ub.max(ty.wrap(-1 - rh.0));
    }
    let new_lb = if ty.signed {
        ty.wrap(-new_ub).max(lh.0.min(0))
    } else {
        0
    };
    let tmp = if ty.signed && lh.1 < 0 { 0 } else { lh.1 };
    new_ub = new_ub.min(tmp);
    value_range_with_overflow(ty, new_lb, new_ub, Overflow::None, Overflow::None)
}

/// Bits which may be set and bits which must be set in all values of `[lb, ub]`.
fn zero_nonzero_bits(ty: ScalarTy, lb: i128, ub: i128) -> (u128, u128) {
    let (blb, bub) = (ty.to_bits(lb), ty.to_bits(ub));
    if lb == ub {
        (blb, blb)
    } else if lb >= 0 || ub < 0 {
        let xor_mask = blb ^ bub;
        let mut maybe = blb | bub;
        let mut must = blb & bub;
        if xor_mask != 0 {
            let mask = (1u128 << (127 - xor_mask.leading_zeros())) - 1;
            maybe |= mask;
            must &= !mask;
        }
        (maybe, must)
    } else {
        (ty.mask(), 0)
    }
}

fn bit_and(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    let (maybe_lh, must_lh) = zero_nonzero_bits(ty, lh.0, lh.1);
    let (maybe_rh, must_rh) = zero_nonzero_bits(ty, rh.0, rh.1);
    let mut new_lb = ty.from_bits(must_lh & must_rh);
    let mut new_ub = ty.from_bits(maybe_lh & maybe_rh);

    // Both negative: the result is no larger than either.
    if lh.1 < 0 && rh.1 < 0 {
        new_ub = new_ub.min(lh.1).min(rh.1);
    }
    // A non-negative operand bounds the result.
    if lh.0 >= 0 {
        new_ub = new_ub.min(lh.1);
    }
    if rh.0 >= 0 {
        new_ub = new_ub.min(rh.1);
    }
    // x & SIGN_BIT is in [MIN, 0].
    if new_lb > new_ub
        && ty.signed
        && ((lh.0 == lh.1 && lh.0 == ty.min_value()) || (rh.0 == rh.1 && rh.0 == ty.min_value()))
    {
        new_lb = ty.min_value();
        new_ub = 0;
    }
    if new_lb > new_ub {
        ValueRange::Varying(ty)
    } else {
        value_range_with_overflow(ty, new_lb, new_ub, Overflow::None, Overflow::None)
    }
}

fn bit_or(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    let (maybe_lh, must_lh) = zero_nonzero_bits(ty, lh.0, lh.1);
    let (maybe_rh, must_rh) = zero_nonzero_bits(ty, rh.0, rh.1);
    let mut new_lb = ty.from_bits(must_lh | must_rh);
    let new_ub = ty.from_bits(maybe_lh | maybe_rh);

    if lh.0 >= 0 && rh.0 >= 0 {
        new_lb = new_lb.max(lh.0).max(rh.0);
    }
    // A negative operand bounds the result from below.
    if lh.1 < 0 {
        new_lb = new_lb.max(lh.0);
    }
    if rh.1 < 0 {
        new_lb = new_lb.max(rh.0);
    }
    if new_lb > new_ub {
        ValueRange::Varying(ty)
    } else {
        value_range_with_overflow(ty, new_lb, new_ub, Overflow::None, Overflow::None)
    }
}

fn bit_xor(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    let (maybe_lh, must_lh) = zero_nonzero_bits(ty, lh.0, lh.1);
    let (maybe_rh, must_rh) = zero_nonzero_bits(ty, rh.0, rh.1);
    let zero_bits = (must_lh & must_rh) | !(maybe_lh | maybe_rh);
    let one_bits = (must_lh & !maybe_rh) | (must_rh & !maybe_lh);
    let new_ub = ty.from_bits(!zero_bits);
    let new_lb = ty.from_bits(one_bits);

    // Only useful if the result has a known sign.
    if new_lb < 0 || new_ub >= 0 {
        value_range_with_overflow(ty, new_lb, new_ub, Overflow::None, Overflow::None)
    } else {
        ValueRange::Varying(ty)
    }
}

fn lshift(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    let shl = |a: i128, b: i128| Some(ty.from_bits(ty.to_bits(a) << b));
    // A shift only moves zeros (or, for negative values, ones) out when the operand is small
    // enough. Then the value changes monotonically.
    let overflow_pos = if ty.signed {
        i128::from(ty.bits) - 1
    } else {
        i128::from(ty.bits)
    };
    let bound_shift = overflow_pos - rh.1;
    if bound_shift < 0 {
        return ValueRange::Varying(ty);
    }
    let bound = 1i128 << bound_shift;
    let in_bounds = if ty.signed {
        lh.1 < bound && -bound < lh.0
    } else {
        lh.1 < bound
    };
    if in_bounds {
        cross_product(ty, lh, rh, shl)
    } else {
        ValueRange::Varying(ty)
    }
}

fn rshift(ty: ScalarTy, lh: (i128, i128), rh: (i128, i128)) -> ValueRange {
    cross_product(ty, lh, rh, |a, b| Some(a >> b))
}

fn abs(ty: ScalarTy, lh: (i128, i128)) -> ValueRange {
    let (lb, ub) = lh;
    if !ty.signed || lb >= 0 {
        return ValueRange::ints(ty, lb, ub);
    }
    let (min_value, max_value) = (ty.min_value(), ty.max_value());
    // -MIN is MIN when overflow wraps.
    if !ty.overflow_undefined() && lb == min_value {
        return ValueRange::Varying(ty);
    }
    let abs_of = |v: i128| if v == min_value { max_value } else { v.abs() };
    let (mut min, mut max) = (abs_of(lb), abs_of(ub));
    if lb <= 0 && ub >= 0 {
        max = max.max(min);
        min = 0;
    } else if min > max {
        core::mem::swap(&mut min, &mut max);
    }
    if min > max {
        (min, max) = (0, max_value);
    }
    ValueRange::ints(ty, min, max)
}

fn convert(ty: ScalarTy, from: ScalarTy, lh: (i128, i128)) -> ValueRange {
    // A narrowing conversion keeps the range only if it fits in the narrower domain.
    if ty.bits < from.bits && (lh.1 - lh.0) >> ty.bits != 0 {
        return ValueRange::Varying(ty);
    }
    ValueRange::ints(ty, ty.wrap(lh.0), ty.wrap(lh.1))
}

/// The constant sub-ranges of `vr`, treating non-numeric ranges as varying over `ty`.
fn pairs(vr: &ValueRange, ty: ScalarTy) -> Vec<(i128, i128)> {
    let vr = if vr.has_numeric_bounds() {
        *vr
    } else {
        ValueRange::Varying(vr.ty().unwrap_or(ty))
    };
    (0..vr.num_pairs())
        .map(|i| (vr.lower_bound(i), vr.upper_bound(i)))
        .collect()
}

/// Fold every pair of sub-ranges of the operands with `wi_fold` and union the results.
fn fold_pairs(
    ty: ScalarTy,
    lh: &ValueRange,
    rh: &ValueRange,
    wi_fold: impl Fn((i128, i128), (i128, i128)) -> ValueRange,
) -> ValueRange {
    if lh.is_undefined() || rh.is_undefined() {
        return ValueRange::Undefined;
    }
    let rh_pairs = pairs(rh, ty);
    let mut r = ValueRange::Undefined;
    for x in pairs(lh, ty) {
        for &y in &rh_pairs {
            r.union_(&wi_fold(x, y));
            if r.is_varying() {
                return r;
            }
        }
    }
    r
}

/// Bounds of the whole of `vr`, or `None` if they are not numeric.
fn hull(vr: &ValueRange) -> Option<(i128, i128)> {
    if vr.is_undefined() || !vr.has_numeric_bounds() {
        return None;
    }
    Some((vr.lower_bound(0), vr.upper_bound(vr.num_pairs() - 1)))
}

/// Shift counts outside of `[0, bits)` are undefined behavior and tell us nothing.
fn undefined_shift(ty: ScalarTy, rh: &ValueRange) -> Option<ValueRange> {
    if rh.is_undefined() {
        return Some(ValueRange::Undefined);
    }
    match hull(rh) {
        Some((lo, hi)) if lo >= 0 && hi < i128::from(ty.bits) => None,
        _ => Some(ValueRange::Varying(ty)),
    }
}

fn retag(vr: ValueRange, ty: ScalarTy) -> ValueRange {
    match (vr.kind(), vr.min(), vr.max()) {
        (kind, Some(min), Some(max)) => ValueRange::new(ty, kind, min, max),
        _ => vr,
    }
}

/// Fold `lh op rh` with constant or varying operands.
pub fn fold_binary(
    op: BinaryOp,
    ty: ScalarTy,
    lh: &ValueRange,
    rh: &ValueRange,
    flags: &Flags,
) -> ValueRange {
    match op {
        BinaryOp::Add => arith::plus_minus(false, ty, lh, rh),
        BinaryOp::Sub => arith::plus_minus(true, ty, lh, rh),
        BinaryOp::PointerAdd => arith::pointer_plus(ty, lh, rh, flags),
        BinaryOp::Mul => fold_pairs(ty, lh, rh, |x, y| mult(ty, x, y)),
        BinaryOp::Div | BinaryOp::ExactDiv => fold_pairs(ty, lh, rh, |x, y| div(ty, x, y, flags)),
        BinaryOp::Rem => fold_pairs(ty, lh, rh, |x, y| trunc_mod(ty, x, y)),
        BinaryOp::Min => fold_pairs(ty, lh, rh, |x, y| {
            ValueRange::ints(ty, x.0.min(y.0), x.1.min(y.1))
        }),
        BinaryOp::Max => fold_pairs(ty, lh, rh, |x, y| {
            ValueRange::ints(ty, x.0.max(y.0), x.1.max(y.1))
        }),
        BinaryOp::And => fold_pairs(ty, lh, rh, |x, y| bit_and(ty, x, y)),
        BinaryOp::Or => fold_pairs(ty, lh, rh, |x, y| bit_or(ty, x, y)),
        BinaryOp::Xor => fold_pairs(ty, lh, rh, |x, y| bit_xor(ty, x, y)),
        BinaryOp::Shl => {
            if let Some(r) = undefined_shift(ty, rh) {
                return r;
            }
            // x << C is x * (1 << C) with wrapping multiplication.
            if let Some(Bound::Int(shift)) = rh.singleton() {
                let wrapping = ScalarTy { wraps: true, ..ty };
                let factor = wrapping.from_bits(1u128 << shift);
                if lh.is_undefined() {
                    return ValueRange::Undefined;
                }
                let lh = retag(*lh, wrapping);
                let r = fold_pairs(wrapping, &lh, &ValueRange::constant(wrapping, factor), |x, y| {
                    mult(wrapping, x, y)
                });
                return retag(r, ty);
            }
            fold_pairs(ty, lh, rh, |x, y| lshift(ty, x, y))
        }
        BinaryOp::Shr => {
            if let Some(r) = undefined_shift(ty, rh) {
                return r;
            }
            fold_pairs(ty, lh, rh, |x, y| rshift(ty, x, y))
        }
    }
}

/// Fold `code lh`, where `lh` is in domain `from`.
pub fn fold_unary(code: UnaryCode, ty: ScalarTy, lh: &ValueRange, from: ScalarTy) -> ValueRange {
    match code {
        UnaryCode::Neg => arith::plus_minus(true, ty, &ValueRange::zero(ty), lh),
        UnaryCode::BitNot => {
            arith::plus_minus(true, ty, &ValueRange::constant(ty, ty.wrap(-1)), lh)
        }
        UnaryCode::Abs => {
            let varying = ValueRange::Varying(ty);
            fold_pairs(ty, lh, &varying, |x, _| abs(ty, x))
        }
        UnaryCode::Convert => {
            let varying = ValueRange::Varying(ty);
            let lh = if lh.has_numeric_bounds() || lh.is_undefined() {
                *lh
            } else {
                ValueRange::Varying(from)
            };
            fold_pairs(ty, &lh, &varying, |x, _| convert(ty, from, x))
        }
    }
}
