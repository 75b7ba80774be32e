//! Range arithmetic entry points.
//!
//! [`range_fold_binary`] and [`range_fold_unary`] compute the range of an expression from the
//! ranges of its operands. Addition and subtraction keep symbolic bounds of the form
//! `±name + constant` where that is possible; everything else is folded on constant bounds by
//! [`range_op`](super::range_op).

use crate::ir::{BinaryOp, Value};
use crate::settings::Flags;
use crate::vrp::bound::{Bound, Comparison, ScalarTy, compare_values};
use crate::vrp::lattice::{RangeKind, ValueRange};
use crate::vrp::range_op::{self, Overflow, UnaryCode};

/// A bound split into its symbol and its constant part.
///
/// The constant part is `None` for a bare symbol, which is different from a constant `0`
/// when combining bounds.
type SplitBound = (Option<(Value, bool)>, Option<i128>);

fn single_symbol(b: Bound) -> Option<SplitBound> {
    match b {
        Bound::Int(v) => Some((None, Some(v))),
        Bound::Sym { name, neg, offset } => Some((Some((name, neg)), (offset != 0).then_some(offset))),
        Bound::Addr { .. } => None,
    }
}

/// Combine the constant parts of two bounds, reporting overflow.
fn combine_bound(minus: bool, ty: ScalarTy, op0: Option<i128>, op1: Option<i128>) -> (i128, Overflow) {
    match (op0, op1) {
        (Some(a), Some(b)) => {
            let exact = if minus { a - b } else { a + b };
            (ty.wrap(exact), Overflow::of(ty, exact))
        }
        (Some(a), None) => (a, Overflow::None),
        (None, Some(b)) if minus => {
            // Only negating the sign bit pattern overflows.
            let ovf = if ty.to_bits(b) == 1u128 << (ty.bits - 1) {
                Overflow::Overflow
            } else {
                Overflow::None
            };
            (ty.wrap(-b), ovf)
        }
        (None, Some(b)) => (b, Overflow::None),
        (None, None) => (0, Overflow::None),
    }
}

/// The range kind and constant bounds for `[wmin, wmax]` computed with overflow.
///
/// `None` means varying.
fn set_value_range_with_overflow(
    ty: ScalarTy,
    wmin: i128,
    wmax: i128,
    min_ovf: Overflow,
    max_ovf: Overflow,
) -> Option<(RangeKind, i128, i128)> {
    if ty.bits == 1 && wmax < wmin {
        return None;
    }

    if !ty.wraps {
        let saturate = |v: i128, ovf| match ovf {
            Overflow::Underflow => ty.min_value(),
            Overflow::Overflow => ty.max_value(),
            Overflow::None => v,
        };
        return Some((RangeKind::Range, saturate(wmin, min_ovf), saturate(wmax, max_ovf)));
    }

    if (min_ovf != Overflow::None) == (max_ovf != Overflow::None) {
        // Both bounds wrapped the same way, or neither did.
        if wmin > wmax {
            None
        } else {
            Some((RangeKind::Range, wmin, wmax))
        }
    } else if (min_ovf == Overflow::Underflow && max_ovf == Overflow::None)
        || (max_ovf == Overflow::Overflow && min_ovf == Overflow::None)
    {
        // One bound wrapped: the values between wmax and wmin are excluded.
        let new_min = ty.wrap(wmax + 1);
        let new_max = ty.wrap(wmin - 1);
        let covers = new_min < wmax || new_max > wmin;
        if covers || new_min > new_max {
            None
        } else {
            Some((RangeKind::AntiRange, new_min, new_max))
        }
    } else {
        None
    }
}

/// Reattach the symbols of the operands to a combined constant bound.
fn adjust_symbolic_bound(
    bound: i128,
    minus: bool,
    ty: ScalarTy,
    sym0: Option<(Value, bool)>,
    sym1: Option<(Value, bool)>,
) -> Option<Bound> {
    let name0 = sym0.map(|s| s.0);
    let name1 = sym1.map(|s| s.0);
    match (sym0, sym1) {
        _ if name0 == name1 => Some(Bound::Int(bound)),
        (Some((name, neg)), _) => Some(Bound::Sym {
            name,
            neg,
            offset: bound,
        }),
        (None, Some((name, neg))) => {
            // Negating a symbol could introduce an overflow.
            if !minus || neg || ty.wraps {
                Some(Bound::Sym {
                    name,
                    neg: neg ^ minus,
                    offset: bound,
                })
            } else {
                None
            }
        }
        (None, None) => Some(Bound::Int(bound)),
    }
}

/// Bounds of a range or of a varying domain.
fn endpoints(vr: &ValueRange) -> Option<(Bound, Bound)> {
    match *vr {
        ValueRange::Varying(ty) => Some((Bound::Int(ty.min_value()), Bound::Int(ty.max_value()))),
        ValueRange::Range { min, max, .. } => Some((min, max)),
        _ => None,
    }
}

/// Split an anti-range operand into its sub-ranges and union the results of `f` on them.
fn split_anti_range(
    vr: &ValueRange,
    f: impl Fn(&ValueRange) -> ValueRange,
) -> Option<ValueRange> {
    let (lo, hi) = vr.ranges_from_anti_range(false)?;
    let mut r = f(&lo);
    if !hi.is_undefined() {
        r.union_(&f(&hi));
    }
    Some(r)
}

/// The range of `vr0 + vr1`, or of `vr0 - vr1` if `minus`.
pub(crate) fn plus_minus(
    minus: bool,
    ty: ScalarTy,
    vr0: &ValueRange,
    vr1: &ValueRange,
) -> ValueRange {
    if vr0.is_undefined() || vr1.is_undefined() {
        return ValueRange::Undefined;
    }
    if let Some(r) = split_anti_range(vr0, |part| plus_minus(minus, ty, part, vr1)) {
        return r;
    }
    if let Some(r) = split_anti_range(vr1, |part| plus_minus(minus, ty, vr0, part)) {
        return r;
    }

    let varying = ValueRange::Varying(ty);
    let (Some((min0, max0)), Some((min1, max1))) = (endpoints(vr0), endpoints(vr1)) else {
        return varying;
    };
    let (min_op0, min_op1) = (min0, if minus { max1 } else { min1 });
    let (max_op0, max_op1) = (max0, if minus { min1 } else { max1 });

    let (
        Some((sym_min0, inv_min0)),
        Some((sym_min1, inv_min1)),
        Some((sym_max0, inv_max0)),
        Some((sym_max1, inv_max1)),
    ) = (
        single_symbol(min_op0),
        single_symbol(min_op1),
        single_symbol(max_op0),
        single_symbol(max_op1),
    )
    else {
        return varying;
    };

    // Symbols on both sides must cancel.
    let compatible = |a: Option<(Value, bool)>, b: Option<(Value, bool)>| match (a, b) {
        (Some((n0, neg0)), Some((n1, neg1))) => n0 == n1 && neg0 == (if minus { neg1 } else { !neg1 }),
        _ => true,
    };
    if !compatible(sym_min0, sym_min1) || !compatible(sym_max0, sym_max1) {
        return varying;
    }

    let (wmin, min_ovf) = combine_bound(minus, ty, inv_min0, inv_min1);
    let (wmax, max_ovf) = combine_bound(minus, ty, inv_max0, inv_max1);

    // An overflowing constant part of a symbolic bound is meaningless.
    let name = |s: Option<(Value, bool)>| s.map(|s| s.0);
    if (min_ovf != Overflow::None && name(sym_min0) != name(sym_min1))
        || (max_ovf != Overflow::None && name(sym_max0) != name(sym_max1))
    {
        return varying;
    }

    let Some((kind, wmin, wmax)) = set_value_range_with_overflow(ty, wmin, wmax, min_ovf, max_ovf)
    else {
        return varying;
    };
    let (Some(min), Some(max)) = (
        adjust_symbolic_bound(wmin, minus, ty, sym_min0, sym_min1),
        adjust_symbolic_bound(wmax, minus, ty, sym_max0, sym_max1),
    ) else {
        return varying;
    };

    match compare_values(ty, min, max) {
        Comparison::Unknown | Comparison::Greater => varying,
        _ => ValueRange::new(ty, kind, min, max),
    }
}

/// The range of `vr0 + vr1` where `vr0` is a pointer and `vr1` a byte offset.
pub(crate) fn pointer_plus(
    ty: ScalarTy,
    vr0: &ValueRange,
    vr1: &ValueRange,
    flags: &Flags,
) -> ValueRange {
    if vr0.is_undefined() || vr1.is_undefined() {
        return ValueRange::Undefined;
    }
    // A null pointer plus a positive constant is still not a valid object address, unless
    // null pointer checks may not be deleted.
    let positive_offset = match (vr1.kind(), vr1.ty(), vr1.max()) {
        (RangeKind::Range, Some(oty), Some(Bound::Int(max))) => {
            vr1.constant_p() && !oty.sign_bit(max)
        }
        _ => false,
    };
    if (!vr0.range_includes_zero_p() || !vr1.range_includes_zero_p())
        && !ty.wraps
        && (flags.delete_null_pointer_checks() || positive_offset)
    {
        ValueRange::nonzero(ty)
    } else if vr0.zero_p() && vr1.zero_p() {
        ValueRange::zero(ty)
    } else {
        ValueRange::Varying(ty)
    }
}

/// Compute the range of `vr0 op vr1` in the domain `ty`.
///
/// Callers only ask for integral and pointer domains; instructions producing other types have
/// no range.
pub fn range_fold_binary(
    op: BinaryOp,
    ty: ScalarTy,
    vr0: &ValueRange,
    vr1: &ValueRange,
    flags: &Flags,
) -> ValueRange {
    if vr0.is_undefined() && vr1.is_undefined() {
        return ValueRange::Undefined;
    }
    // One undefined operand does not make the result undefined.
    let drop_undefined = |vr: &ValueRange| {
        if vr.is_undefined() {
            ValueRange::Varying(ty)
        } else {
            *vr
        }
    };
    let vr0 = drop_undefined(vr0);
    let vr1 = drop_undefined(vr1);

    if vr0.symbolic_p() || vr1.symbolic_p() {
        return match op {
            BinaryOp::Add => plus_minus(false, ty, &vr0, &vr1),
            BinaryOp::Sub => plus_minus(true, ty, &vr0, &vr1),
            BinaryOp::PointerAdd => pointer_plus(ty, &vr0, &vr1, flags),
            _ => range_op::fold_binary(
                op,
                ty,
                &vr0.normalize_symbolics(),
                &vr1.normalize_symbolics(),
                flags,
            ),
        };
    }
    range_op::fold_binary(
        op,
        ty,
        &vr0.normalize_addresses(),
        &vr1.normalize_addresses(),
        flags,
    )
}

/// Compute the range of `code vr0`, where `vr0` is in the domain `from` and the result in `ty`.
pub fn range_fold_unary(code: UnaryCode, ty: ScalarTy, vr0: &ValueRange, from: ScalarTy) -> ValueRange {
    if vr0.is_undefined() {
        return ValueRange::Undefined;
    }
    if vr0.symbolic_p() {
        // -X is 0 - X and ~X is -1 - X, which keeps symbolic bounds.
        return match code {
            UnaryCode::Neg => plus_minus(true, ty, &ValueRange::zero(from), vr0),
            UnaryCode::BitNot => {
                plus_minus(true, ty, &ValueRange::constant(from, from.wrap(-1)), vr0)
            }
            UnaryCode::Abs | UnaryCode::Convert => {
                range_op::fold_unary(code, ty, &vr0.normalize_symbolics(), from)
            }
        };
    }
    range_op::fold_unary(code, ty, &vr0.normalize_addresses(), from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::Var;
    use crate::settings::{self, Configurable};
    use crate::vrp::lattice::tests::all_ranges;

    fn flags() -> Flags {
        Flags::new(settings::builder())
    }

    fn sym(n: usize, neg: bool, offset: i128) -> Bound {
        Bound::Sym {
            name: Value::new(n),
            neg,
            offset,
        }
    }

    fn add(ty: ScalarTy, a: (i128, i128), b: (i128, i128)) -> ValueRange {
        plus_minus(false, ty, &ValueRange::ints(ty, a.0, a.1), &ValueRange::ints(ty, b.0, b.1))
    }

    fn sub(ty: ScalarTy, a: (i128, i128), b: (i128, i128)) -> ValueRange {
        plus_minus(true, ty, &ValueRange::ints(ty, a.0, a.1), &ValueRange::ints(ty, b.0, b.1))
    }

    #[test]
    fn constant_bounds() {
        let s32 = ScalarTy::int(32, true, false);
        assert_eq!(add(s32, (1, 5), (2, 3)), ValueRange::ints(s32, 3, 8));
        assert_eq!(sub(s32, (1, 5), (2, 3)), ValueRange::ints(s32, -2, 3));
        // ~[0, 0] + [1, 1] is [MIN + 1, 0] U [2, MAX], whose hull is [MIN + 1, MAX].
        let nz = ValueRange::nonzero(s32);
        let r = plus_minus(false, s32, &nz, &ValueRange::constant(s32, 1));
        assert_eq!(r, ValueRange::ints(s32, s32.min_value() + 1, s32.max_value()));
    }

    #[test]
    fn wrapping_overflow() {
        let u8_ = ScalarTy::int(8, false, true);
        // Neither bound wraps.
        assert_eq!(add(u8_, (10, 20), (1, 2)), ValueRange::ints(u8_, 11, 22));
        // Both wrap.
        assert_eq!(add(u8_, (250, 255), (10, 10)), ValueRange::ints(u8_, 4, 9));
        // Only the maximum wraps.
        assert_eq!(
            add(u8_, (250, 255), (0, 10)),
            ValueRange::anti_range(u8_, Bound::Int(10), Bound::Int(249))
        );
        // Only the minimum wraps.
        assert_eq!(
            sub(u8_, (0, 5), (1, 1)),
            ValueRange::anti_range(u8_, Bound::Int(5), Bound::Int(254))
        );
        // Wrapping in both directions.
        let s8w = ScalarTy::int(8, true, true);
        assert!(add(s8w, (-100, 100), (-100, 100)).is_varying());
    }

    #[test]
    fn saturating_overflow() {
        let s8 = ScalarTy::int(8, true, false);
        assert_eq!(add(s8, (100, 120), (10, 10)), ValueRange::ints(s8, 110, 127));
        assert_eq!(sub(s8, (-120, 0), (10, 10)), ValueRange::ints(s8, -128, -10));
        assert_eq!(add(s8, (120, 127), (10, 10)), ValueRange::constant(s8, 127));
    }

    #[test]
    fn symbolic_bounds() {
        let s32 = ScalarTy::int(32, true, false);
        let u32_ = ScalarTy::int(32, false, true);
        let n = Value::new(3);

        // [n, n + 5] + 1
        let r = plus_minus(
            false,
            s32,
            &ValueRange::range(s32, Bound::name(n), sym(3, false, 5)),
            &ValueRange::constant(s32, 1),
        );
        assert_eq!(r, ValueRange::range(s32, sym(3, false, 1), sym(3, false, 6)));

        // n - n
        let nn = ValueRange::singleton_of(s32, Bound::name(n));
        assert_eq!(plus_minus(true, s32, &nn, &nn), ValueRange::zero(s32));

        // 5 - n negates the symbol, which may overflow unless overflow wraps.
        let five = ValueRange::constant(s32, 5);
        assert!(plus_minus(true, s32, &five, &nn).is_varying());
        let five = ValueRange::constant(u32_, 5);
        let nn = ValueRange::singleton_of(u32_, Bound::name(n));
        assert_eq!(
            plus_minus(true, u32_, &five, &nn),
            ValueRange::singleton_of(u32_, sym(3, true, 5))
        );

        // Different symbols do not combine.
        let mm = ValueRange::singleton_of(s32, Bound::name(Value::new(4)));
        let nn = ValueRange::singleton_of(s32, Bound::name(n));
        assert!(plus_minus(false, s32, &nn, &mm).is_varying());
    }

    #[test]
    fn unary_keeps_symbols() {
        let s32 = ScalarTy::int(32, true, false);
        let u32_ = ScalarTy::int(32, false, true);
        let nn = ValueRange::singleton_of(u32_, Bound::name(Value::new(0)));
        assert_eq!(
            range_fold_unary(UnaryCode::Neg, u32_, &nn, u32_),
            ValueRange::singleton_of(u32_, sym(0, true, 0))
        );
        assert_eq!(
            range_fold_unary(UnaryCode::BitNot, u32_, &nn, u32_),
            ValueRange::singleton_of(u32_, sym(0, true, 0xffff_ffff))
        );
        // Other operators see the symbolic range as its constant hull.
        let below = ValueRange::range(s32, Bound::Int(-4), Bound::name(Value::new(1)));
        assert_eq!(
            range_fold_unary(UnaryCode::Abs, s32, &below, s32),
            ValueRange::ints(s32, 0, i128::from(i32::MAX))
        );
    }

    #[test]
    fn pointers() {
        let ptr = ScalarTy::pointer();
        let off = ScalarTy::int(64, false, true);
        let f = flags();
        let nonnull = ValueRange::nonzero(ptr);
        let any = ValueRange::Varying(off);
        assert_eq!(
            range_fold_binary(BinaryOp::PointerAdd, ptr, &nonnull, &any, &f),
            ValueRange::nonzero(ptr)
        );
        let four = ValueRange::constant(off, 4);
        let unknown = ValueRange::Varying(ptr);
        assert_eq!(
            range_fold_binary(BinaryOp::PointerAdd, ptr, &unknown, &four, &f),
            ValueRange::nonzero(ptr)
        );
        assert_eq!(
            range_fold_binary(
                BinaryOp::PointerAdd,
                ptr,
                &ValueRange::zero(ptr),
                &ValueRange::zero(off),
                &f
            ),
            ValueRange::zero(ptr)
        );

        let mut b = settings::builder();
        b.set("delete_null_pointer_checks", "false").unwrap();
        let keep_null = Flags::new(b);
        assert_eq!(
            range_fold_binary(BinaryOp::PointerAdd, ptr, &unknown, &four, &keep_null),
            ValueRange::nonzero(ptr)
        );
        let minus_four = ValueRange::constant(off, off.wrap(-4));
        assert!(
            range_fold_binary(BinaryOp::PointerAdd, ptr, &unknown, &minus_four, &keep_null)
                .is_varying()
        );

        // The address of a declaration is not null.
        let addr = ValueRange::singleton_of(
            ptr,
            Bound::Addr {
                var: Var::new(0),
                offset: 0,
            },
        );
        assert_eq!(
            range_fold_binary(BinaryOp::PointerAdd, ptr, &addr, &any, &f),
            ValueRange::nonzero(ptr)
        );
    }

    #[test]
    fn undefined_operands() {
        let s32 = ScalarTy::int(32, true, false);
        let f = flags();
        let u = ValueRange::Undefined;
        let one = ValueRange::constant(s32, 1);
        assert!(range_fold_binary(BinaryOp::Add, s32, &u, &u, &f).is_undefined());
        // The undefined side is taken as varying, so non-wrapping addition drops the minimum.
        assert_eq!(
            range_fold_binary(BinaryOp::Add, s32, &u, &one, &f),
            ValueRange::ints(s32, s32.min_value() + 1, s32.max_value())
        );
        assert!(range_fold_unary(UnaryCode::Neg, s32, &u, s32).is_undefined());
    }

    /// The members of `vr` over a domain of at most 16 values, as a bit set.
    fn members(ty: ScalarTy, vr: &ValueRange) -> u32 {
        (ty.min_value()..=ty.max_value())
            .filter(|&v| vr.contains_p(v))
            .fold(0, |m, v| m | 1 << ty.to_bits(v))
    }

    #[test]
    fn plus_minus_is_sound_4bit() {
        let f = flags();
        for ty in [
            ScalarTy::int(4, false, true),
            ScalarTy::int(4, true, false),
            ScalarTy::int(4, true, true),
        ] {
            let ranges: Vec<_> = all_ranges(ty)
                .into_iter()
                .filter(|r| !r.is_undefined())
                .map(|r| (r, members(ty, &r)))
                .collect();
            for op in [BinaryOp::Add, BinaryOp::Sub] {
                for (a, ma) in &ranges {
                    for (b, mb) in &ranges {
                        let r = range_fold_binary(op, ty, a, b, &f);
                        let mr = members(ty, &r);
                        for x in ty.min_value()..=ty.max_value() {
                            if ma & 1 << ty.to_bits(x) == 0 {
                                continue;
                            }
                            for y in ty.min_value()..=ty.max_value() {
                                if mb & 1 << ty.to_bits(y) == 0 {
                                    continue;
                                }
                                let exact = if op == BinaryOp::Add { x + y } else { x - y };
                                if !ty.wraps && !ty.contains(exact) {
                                    continue;
                                }
                                let v = ty.wrap(exact);
                                assert!(
                                    mr & 1 << ty.to_bits(v) != 0,
                                    "{op:?} in {ty}: {x}, {y} = {v} not in {a}, {b} = {r}"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}
