//! Lattice values of SSA names and the range semantics of instructions.
//!
//! [`VrValues`] owns the current [`VrpValue`] of every SSA name during propagation. It knows how
//! to compute the range an instruction produces from the ranges of its operands, how to narrow a
//! range given an asserted comparison, and how to decide comparisons from ranges and
//! equivalences.

use crate::entity::SecondaryMap;
use crate::flowgraph::{ControlFlowGraph, EdgeFlags};
use crate::fx::FxHashSet;
use crate::ir::{
    AssertExpr, Builtin, CallData, CallFlags, Callee, CondCode, Function, Inst, InstData, IntCC,
    MemRef, Operand, RefBase, Value, ValueDef,
};
use crate::settings::Flags;
use crate::trace;
use crate::vrp::arith::{range_fold_binary, range_fold_unary};
use crate::vrp::bound::{Bound, Comparison, ScalarTy, compare_values};
use crate::vrp::lattice::{RangeKind, ValueRange};
use crate::vrp::range_op::UnaryCode;
use core::fmt;

/// A value range together with the names known to hold the same value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VrpValue {
    /// The range.
    pub range: ValueRange,
    /// Names equal to the value described. Always empty for `Undefined` and `Varying`.
    pub equiv: FxHashSet<Value>,
}

impl Default for VrpValue {
    fn default() -> Self {
        Self::new(ValueRange::Undefined)
    }
}

impl VrpValue {
    /// A value with no equivalences.
    pub fn new(range: ValueRange) -> Self {
        Self {
            range,
            equiv: FxHashSet::default(),
        }
    }

    /// Replace the range, keeping the equivalences unless the new range has no bounds.
    pub fn update(&mut self, range: ValueRange) {
        self.range = range;
        if range.is_undefined() || range.is_varying() {
            self.equiv.clear();
        }
    }

    /// Make this value `Varying` over `ty`.
    pub fn set_varying(&mut self, ty: ScalarTy) {
        self.update(ValueRange::Varying(ty));
    }

    /// Record that `var`, and everything equivalent to it, is equal to this value.
    pub fn equiv_add(&mut self, var: Value, var_vr: &VrpValue) {
        self.equiv.insert(var);
        self.equiv.extend(var_vr.equiv.iter().copied());
    }

    /// Narrow this value by `other`. The equivalences of both hold for the result.
    pub fn intersect(&mut self, other: &VrpValue) {
        if self.range.is_varying() {
            *self = other.clone();
            return;
        }
        let mut range = self.range;
        range.intersect(&other.range);
        self.update(range);
        if !self.range.is_undefined() {
            self.equiv.extend(other.equiv.iter().copied());
        }
    }

    /// Meet this value with `other`. Only equivalences common to both survive.
    pub fn union_(&mut self, other: &VrpValue) {
        if self.range.is_undefined() {
            *self = other.clone();
            return;
        }
        let mut range = self.range;
        range.union_(&other.range);
        self.equiv.retain(|v| other.equiv.contains(v));
        self.update(range);
    }

    fn sorted_equiv(&self) -> Vec<Value> {
        let mut names: Vec<Value> = self.equiv.iter().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Display for VrpValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.range)?;
        if !self.equiv.is_empty() {
            f.write_str("  EQUIVALENCES: {")?;
            for v in self.sorted_equiv() {
                write!(f, " {v}")?;
            }
            f.write_str(" }")?;
        }
        Ok(())
    }
}

/// The domain of the SSA value `v`, if its ranges are tracked.
pub(crate) fn value_ty(func: &Function, v: Value) -> Option<ScalarTy> {
    ScalarTy::of(&func.types, func.dfg.value_type(v))
}

/// The domain of `op`, if its ranges are tracked.
pub(crate) fn operand_ty(func: &Function, op: Operand) -> Option<ScalarTy> {
    ScalarTy::of(&func.types, func.operand_type(op))
}

fn is_param(func: &Function, v: Value) -> bool {
    matches!(func.dfg.value_def(v), ValueDef::Param(_))
}

fn floor_log2(v: i128) -> u32 {
    debug_assert!(v > 0);
    127 - v.leading_zeros()
}

/// The kind and the bounds of a range or anti-range.
fn bounds(vr: &ValueRange) -> Option<(RangeKind, ScalarTy, Bound, Bound)> {
    match *vr {
        ValueRange::Range { ty, min, max } => Some((RangeKind::Range, ty, min, max)),
        ValueRange::AntiRange { ty, min, max } => Some((RangeKind::AntiRange, ty, min, max)),
        ValueRange::Undefined | ValueRange::Varying(_) => None,
    }
}

/// Decide `vr0 cond vr1` for all pairs of values in the two ranges.
///
/// Returns `None` when the comparison may go either way.
pub fn compare_ranges(cond: IntCC, vr0: &ValueRange, vr1: &ValueRange) -> Option<bool> {
    let (k0, ty, mut min0, mut max0) = bounds(vr0)?;
    let (k1, _, mut min1, mut max1) = bounds(vr1)?;
    let cmp = |a, b| compare_values(ty, a, b);

    if k0 == RangeKind::AntiRange || k1 == RangeKind::AntiRange {
        if k0 == k1 || !cond.is_equality() {
            return None;
        }
        // ~[a, b] == [a, b] is always false.
        if cmp(min0, min1) == Comparison::Equal && cmp(max0, max1) == Comparison::Equal {
            return Some(cond == IntCC::NotEqual);
        }
        return None;
    }

    let cond = match cond {
        IntCC::GreaterThan | IntCC::GreaterThanOrEqual => {
            core::mem::swap(&mut min0, &mut min1);
            core::mem::swap(&mut max0, &mut max1);
            cond.reverse()
        }
        _ => cond,
    };
    let single0 = cmp(min0, max0) == Comparison::Equal;
    let single1 = cmp(min1, max1) == Comparison::Equal;

    match cond {
        IntCC::Equal => {
            if single0 && single1 {
                let cmp_min = cmp(min0, min1);
                let cmp_max = cmp(max0, max1);
                if cmp_min == Comparison::Equal && cmp_max == Comparison::Equal {
                    return Some(true);
                }
                if cmp_min != Comparison::Unknown && cmp_max != Comparison::Unknown {
                    return Some(false);
                }
            } else if cmp(min0, max1) == Comparison::Greater
                || cmp(min1, max0) == Comparison::Greater
            {
                return Some(false);
            }
            None
        }
        IntCC::NotEqual => {
            let cmp1 = cmp(max0, min1);
            let cmp2 = cmp(min0, max1);
            if (cmp1 == Comparison::Less && cmp2 == Comparison::Less)
                || (cmp1 == Comparison::Greater && cmp2 == Comparison::Greater)
            {
                Some(true)
            } else if single0
                && single1
                && cmp(min0, min1) == Comparison::Equal
                && cmp(max0, max1) == Comparison::Equal
            {
                Some(false)
            } else {
                None
            }
        }
        IntCC::LessThan | IntCC::LessThanOrEqual => {
            let strict = cond == IntCC::LessThan;
            let tst = cmp(max0, min1);
            if tst == Comparison::Less || (!strict && tst == Comparison::Equal) {
                return Some(true);
            }
            let tst = cmp(min0, max1);
            if tst == Comparison::Greater || (strict && tst == Comparison::Equal) {
                return Some(false);
            }
            None
        }
        IntCC::GreaterThan | IntCC::GreaterThanOrEqual => unreachable!(),
    }
}

/// Decide `vr cond val` for all values in `vr`.
pub fn compare_range_with_value(cond: IntCC, vr: &ValueRange, val: Bound) -> Option<bool> {
    let (kind, ty, min, max) = bounds(vr)?;
    let cmp = |a, b| compare_values(ty, a, b);

    if kind == RangeKind::AntiRange {
        // Only equality is decidable, and only if `val` is excluded.
        if !cond.is_equality() {
            return None;
        }
        if !vr.may_contain_p(val) {
            return Some(cond == IntCC::NotEqual);
        }
        return None;
    }

    match cond {
        IntCC::Equal => {
            if cmp(min, max) == Comparison::Equal {
                match cmp(min, val) {
                    Comparison::Equal => return Some(true),
                    Comparison::Less | Comparison::Greater | Comparison::NotEqual => {
                        return Some(false);
                    }
                    Comparison::Unknown => {}
                }
            } else if cmp(val, min) == Comparison::Less || cmp(max, val) == Comparison::Less {
                return Some(false);
            }
            None
        }
        IntCC::NotEqual => {
            if cmp(max, val) == Comparison::Less || cmp(min, val) == Comparison::Greater {
                return Some(true);
            }
            if cmp(min, max) == Comparison::Equal && cmp(min, val) == Comparison::Equal {
                return Some(false);
            }
            None
        }
        IntCC::LessThan | IntCC::LessThanOrEqual => {
            let strict = cond == IntCC::LessThan;
            let tst = cmp(max, val);
            if tst == Comparison::Less || (!strict && tst == Comparison::Equal) {
                return Some(true);
            }
            let tst = cmp(min, val);
            if tst == Comparison::Greater || (strict && tst == Comparison::Equal) {
                return Some(false);
            }
            None
        }
        IntCC::GreaterThan | IntCC::GreaterThanOrEqual => {
            let strict = cond == IntCC::GreaterThan;
            let tst = cmp(min, val);
            if tst == Comparison::Greater || (!strict && tst == Comparison::Equal) {
                return Some(true);
            }
            let tst = cmp(max, val);
            if tst == Comparison::Less || (strict && tst == Comparison::Equal) {
                return Some(false);
            }
            None
        }
    }
}

/// Widen the new range of a loop PHI so that propagation terminates quickly.
///
/// A bound that grew since the last visit jumps to one short of its domain extreme; a bound that
/// shrank keeps its old value.
fn widen_phi_range(ty: ScalarTy, old: &ValueRange, new: &ValueRange) -> ValueRange {
    let (Some(old_min), Some(old_max), Some(new_min), Some(new_max)) =
        (old.min(), old.max(), new.min(), new.max())
    else {
        return ValueRange::Varying(ty);
    };
    let cmp_min = compare_values(ty, old_min, new_min);
    let cmp_max = compare_values(ty, old_max, new_max);
    if cmp_min == Comparison::Unknown || cmp_max == Comparison::Unknown {
        return ValueRange::Varying(ty);
    }
    let changed = cmp_min != Comparison::Equal || cmp_max != Comparison::Equal;
    if (old.kind() != RangeKind::Range || new.kind() != RangeKind::Range || ty.pointer) && changed {
        return ValueRange::Varying(ty);
    }

    let mut min = new_min;
    let mut max = new_max;
    match cmp_min {
        Comparison::Less => min = old_min,
        Comparison::Greater | Comparison::NotEqual if !ty.is_min(new_min, false) => {
            min = Bound::Int(ty.min_value() + 1);
        }
        _ => {}
    }
    match cmp_max {
        Comparison::Greater => max = old_max,
        Comparison::Less if !ty.is_max(new_max, false) => max = Bound::Int(ty.max_value() - 1),
        _ => {}
    }

    let widened = ValueRange::new(ty, new.kind(), min, max);
    match (widened.min(), widened.max()) {
        (Some(min), Some(max))
            if !widened.is_varying()
                && ((ty.is_max(max, false) && ty.is_min(min, false))
                    || compare_values(ty, min, max) == Comparison::Greater) =>
        {
            ValueRange::Varying(ty)
        }
        _ => widened,
    }
}

/// The current lattice values of all SSA names.
pub struct VrValues {
    values: SecondaryMap<Value, VrpValue>,
    /// Number of executable incoming edges seen at the last visit of each PHI.
    phi_edge_counts: SecondaryMap<Value, u32>,
    flags: Flags,
}

impl VrValues {
    /// Lattice values for `func`: parameters are `Varying`, everything else `Undefined`.
    pub fn new(func: &Function, flags: &Flags) -> Self {
        let mut values: SecondaryMap<Value, VrpValue> = SecondaryMap::new();
        for v in func.dfg.values() {
            if is_param(func, v) {
                if let Some(ty) = value_ty(func, v) {
                    values[v] = VrpValue::new(ValueRange::Varying(ty));
                }
            }
        }
        Self {
            values,
            phi_edge_counts: SecondaryMap::new(),
            flags: flags.clone(),
        }
    }

    /// The flags the values are computed with.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// The lattice value of `v`.
    pub fn lattice(&self, v: Value) -> &VrpValue {
        &self.values[v]
    }

    /// The range of `v`.
    pub fn range(&self, v: Value) -> ValueRange {
        self.values[v].range
    }

    /// The range of an operand, `None` if its type is not tracked.
    pub fn operand_range(&self, func: &Function, op: Operand) -> Option<ValueRange> {
        let ty = operand_ty(func, op)?;
        Some(match op {
            Operand::Value(v) => self.values[v].range,
            Operand::Const { value, .. } => ValueRange::constant(ty, value),
            Operand::Addr { var, offset } => {
                ValueRange::singleton_of(ty, Bound::Addr { var, offset })
            }
        })
    }

    /// Give up on `v`.
    pub fn set_varying(&mut self, func: &Function, v: Value) {
        if let Some(ty) = value_ty(func, v) {
            self.values[v].set_varying(ty);
        }
    }

    /// Record `new` as the value of `v` and return true if it changed.
    ///
    /// Values never move back up the lattice: a value that was known and becomes `Undefined`
    /// drops to `Varying` instead.
    pub fn update_value_range(&mut self, ty: ScalarTy, v: Value, new: VrpValue) -> bool {
        let old = &mut self.values[v];
        if *old == new {
            return false;
        }
        if new.range.is_undefined() {
            old.set_varying(ty);
        } else {
            *old = new;
        }
        trace!("{v}: {old}");
        true
    }

    /// The range `var` is known to have when `var cond limit` holds.
    pub fn extract_range_for_var_from_comparison(
        &self,
        func: &Function,
        var: Value,
        cond: IntCC,
        limit: Operand,
    ) -> VrpValue {
        let mut vr = VrpValue::default();
        let Some(ty) = value_ty(func, var) else {
            return vr;
        };

        // Pointers only keep track of equality, and `x < x` tells nothing.
        if (ty.pointer && !cond.is_equality()) || limit == Operand::Value(var) {
            vr.set_varying(ty);
            return vr;
        }

        // Use the range of a limit that is a name, unless it carries no useful bounds.
        let limit_vr = limit.as_value().map(|l| self.values[l].range).filter(|lr| {
            !lr.is_undefined()
                && !lr.is_varying()
                && !(lr.symbolic_p()
                    && !matches!(*lr, ValueRange::Range { min, max, .. } if min == max))
        });
        let limit_bound = Bound::from_operand(limit);

        vr.equiv_add(var, &self.values[var]);

        match cond {
            IntCC::Equal => {
                let range = match limit_vr {
                    Some(lr) => lr,
                    None => ValueRange::singleton_of(ty, limit_bound),
                };
                vr.update(range);
                if let Operand::Value(l) = limit {
                    vr.equiv_add(l, &self.values[l]);
                }
            }
            IntCC::NotEqual => {
                // An anti-range can only be built from a single-valued limit.
                let (mut min, mut max) = match limit_vr {
                    Some(ValueRange::Range { min, max, .. })
                        if compare_values(ty, min, max) == Comparison::Equal =>
                    {
                        (min, max)
                    }
                    _ => (limit_bound, limit_bound),
                };
                if !ty.pointer && ty.is_min(min, false) && ty.is_max(max, false) {
                    min = limit_bound;
                    max = limit_bound;
                }
                vr.update(ValueRange::anti_range(ty, min, max));
            }
            IntCC::LessThan | IntCC::LessThanOrEqual => {
                let min = Bound::Int(ty.min_value());
                let mut max = match limit_vr {
                    Some(lr @ ValueRange::Range { .. }) => lr.max().unwrap_or(limit_bound),
                    _ => limit_bound,
                };
                if cond == IntCC::LessThan && compare_values(ty, max, min) == Comparison::Equal {
                    // Nothing is smaller than the minimum.
                    vr.set_varying(ty);
                } else {
                    if cond == IntCC::LessThan {
                        max = max.offset_by(-1);
                    }
                    vr.update(ValueRange::range(ty, min, max));
                }
            }
            IntCC::GreaterThan | IntCC::GreaterThanOrEqual => {
                let max = Bound::Int(ty.max_value());
                let mut min = match limit_vr {
                    Some(lr @ ValueRange::Range { .. }) => lr.min().unwrap_or(limit_bound),
                    _ => limit_bound,
                };
                if cond == IntCC::GreaterThan && compare_values(ty, min, max) == Comparison::Equal
                {
                    vr.set_varying(ty);
                } else {
                    if cond == IntCC::GreaterThan {
                        min = min.offset_by(1);
                    }
                    vr.update(ValueRange::range(ty, min, max));
                }
            }
        }

        vr.intersect(&self.values[var]);
        vr
    }

    /// The range of `dst = assert src, expr cond bound`.
    pub fn extract_range_from_assert(
        &self,
        func: &Function,
        src: Value,
        expr: AssertExpr,
        cond: IntCC,
        bound: Operand,
    ) -> VrpValue {
        let AssertExpr::Offset { ty: uty, offset } = expr else {
            return self.extract_range_for_var_from_comparison(func, src, cond, bound);
        };

        // `(unsigned)src + offset <= limit` is a range test on `src`, `>` an anti-range test.
        let mut vr = VrpValue::default();
        let Some(ty) = value_ty(func, src) else {
            return vr;
        };
        let (Some(uty), Some(limit)) = (ScalarTy::of(&func.types, uty), bound.as_const()) else {
            vr.set_varying(ty);
            return vr;
        };
        if uty.bits != ty.bits || !matches!(cond, IntCC::LessThanOrEqual | IntCC::GreaterThan) {
            vr.set_varying(ty);
            return vr;
        }
        vr.equiv_add(src, &self.values[src]);

        let min = uty.wrap(-offset);
        let max = uty.wrap(limit + min);
        // Large unsigned values are deliberately read as negative signed ones here.
        let min = Bound::Int(ty.wrap(min));
        let max = Bound::Int(ty.wrap(max));
        let kind = if cond == IntCC::LessThanOrEqual {
            RangeKind::Range
        } else {
            RangeKind::AntiRange
        };
        vr.update(ValueRange::new(ty, kind, min, max));
        vr.intersect(&self.values[src]);
        vr
    }

    /// The range of `v` for deciding comparisons: its own symbol if nothing better is known.
    fn vr_for_comparison(&self, func: &Function, v: Value) -> ValueRange {
        let vr = self.values[v].range;
        if vr.is_varying() || vr.is_undefined() {
            if let Some(ty) = value_ty(func, v) {
                return ValueRange::singleton_of(ty, Bound::name(v));
            }
        }
        vr
    }

    fn evaluate_using_ranges(
        &self,
        func: &Function,
        cond: IntCC,
        op0: Operand,
        op1: Operand,
    ) -> Option<bool> {
        let vr0 = op0.as_value().map(|v| self.values[v].range);
        let vr1 = op1.as_value().map(|v| self.values[v].range);
        let mut res = None;
        if let (Some(vr0), Some(vr1)) = (&vr0, &vr1) {
            res = compare_ranges(cond, vr0, vr1);
        }
        if res.is_none() {
            if let Some(vr0) = &vr0 {
                res = compare_range_with_value(cond, vr0, Bound::from_operand(op1));
            }
        }
        if res.is_none() {
            if let Some(vr1) = &vr1 {
                res = compare_range_with_value(cond.reverse(), vr1, Bound::from_operand(op0));
            }
        }
        if res.is_none() && vr0.is_none() && vr1.is_none() {
            let ty = operand_ty(func, op0)?;
            let vr0 = ValueRange::singleton_of(ty, Bound::from_operand(op0));
            res = compare_range_with_value(cond, &vr0, Bound::from_operand(op1));
        }
        res
    }

    /// Decide `var cond val` from the ranges of `var` and its equivalences.
    ///
    /// Unless `use_equiv` is set, only equivalent names that are parameters are consulted; the
    /// values of other names may still change.
    fn compare_name_with_value(
        &self,
        func: &Function,
        cond: IntCC,
        var: Value,
        val: Operand,
        use_equiv: bool,
    ) -> Option<bool> {
        let val = Bound::from_operand(val);
        let mut retval = compare_range_with_value(cond, &self.vr_for_comparison(func, var), val);
        for name in self.values[var].sorted_equiv() {
            if name == var || (!use_equiv && !is_param(func, name)) {
                continue;
            }
            if let Some(t) =
                compare_range_with_value(cond, &self.vr_for_comparison(func, name), val)
            {
                // Equivalent names disagreeing means this is dead code.
                if retval.is_some_and(|r| r != t) {
                    return None;
                }
                retval = Some(t);
            }
        }
        retval
    }

    /// Decide `n1 cond n2` from the ranges of both names and their equivalences.
    fn compare_names(&self, func: &Function, cond: IntCC, n1: Value, n2: Value) -> Option<bool> {
        let mut e1 = self.values[n1].sorted_equiv();
        e1.push(n1);
        let mut e2 = self.values[n2].sorted_equiv();
        e2.push(n2);

        // Equivalent names compare equal without looking at ranges.
        if e1.iter().any(|v| e2.contains(v)) {
            return Some(matches!(
                cond,
                IntCC::Equal | IntCC::LessThanOrEqual | IntCC::GreaterThanOrEqual
            ));
        }

        let mut retval = None;
        for &a in &e1 {
            let vr1 = self.vr_for_comparison(func, a);
            for &b in &e2 {
                let vr2 = self.vr_for_comparison(func, b);
                if let Some(t) = compare_ranges(cond, &vr1, &vr2) {
                    if retval.is_some_and(|r| r != t) {
                        return None;
                    }
                    retval = Some(t);
                }
            }
        }
        retval
    }

    /// Decide the comparison `op0 cond op1`, `None` if it may go either way.
    ///
    /// `use_equiv` enables the equivalence-based comparisons that are only valid once the
    /// values have stopped changing.
    pub fn evaluate_conditional(
        &self,
        func: &Function,
        cond: IntCC,
        op0: Operand,
        op1: Operand,
        use_equiv: bool,
    ) -> Option<bool> {
        operand_ty(func, op0)?;
        if let Some(res) = self.evaluate_using_ranges(func, cond, op0, op1) {
            return Some(res);
        }
        match (op0, op1) {
            (Operand::Value(a), Operand::Value(b)) if use_equiv => {
                self.compare_names(func, cond, a, b)
            }
            (Operand::Value(a), _) => self.compare_name_with_value(func, cond, a, op1, use_equiv),
            (_, Operand::Value(b)) => {
                self.compare_name_with_value(func, cond.reverse(), b, op0, use_equiv)
            }
            _ => None,
        }
    }

    /// The range of a copy of `src`.
    fn extract_range_from_copy(&self, ty: ScalarTy, func: &Function, src: Operand) -> VrpValue {
        let Operand::Value(v) = src else {
            return VrpValue::new(self.operand_range(func, src).unwrap_or(ValueRange::Varying(ty)));
        };
        let src_vr = &self.values[v];
        let mut vr = if src_vr.range.is_varying() {
            VrpValue::new(ValueRange::singleton_of(ty, Bound::name(v)))
        } else {
            src_vr.clone()
        };
        if !vr.range.is_undefined() {
            vr.equiv_add(v, src_vr);
        }
        vr
    }

    /// The range of `args[0] op args[1]`, retrying with symbolic operands where a range is
    /// based on the other operand.
    fn extract_range_from_binary(
        &self,
        func: &Function,
        ty: ScalarTy,
        op: crate::ir::BinaryOp,
        args: [Operand; 2],
    ) -> ValueRange {
        use crate::ir::BinaryOp;

        let varying = ValueRange::Varying(ty);
        let vr0 = self.operand_range(func, args[0]).unwrap_or(varying);
        let vr1 = self.operand_range(func, args[1]).unwrap_or(varying);
        let mut vr = range_fold_binary(op, ty, &vr0, &vr1, &self.flags);

        let is_plus_minus = matches!(op, BinaryOp::Add | BinaryOp::Sub);
        let based_on = |vr: &ValueRange, sym: Value| {
            let is_sym = |b: Option<Bound>| matches!(b, Some(Bound::Sym { name, .. }) if name == sym);
            is_sym(vr.min()) || is_sym(vr.max())
        };
        // The other operand as [MIN, sym], [sym, MAX] or [sym, sym]. An invariant bound of the
        // range based on it selects the infinite side.
        let retry = |based: &ValueRange, sym: Value| {
            let (near, far) = if op == BinaryOp::Sub {
                (based.max(), based.min())
            } else {
                (based.min(), based.max())
            };
            let name = Bound::name(sym);
            if near.is_some_and(|b| b.is_invariant()) {
                ValueRange::range(ty, Bound::Int(ty.min_value()), name)
            } else if far.is_some_and(|b| b.is_invariant()) {
                ValueRange::range(ty, name, Bound::Int(ty.max_value()))
            } else {
                ValueRange::singleton_of(ty, name)
            }
        };
        if vr.is_varying() && is_plus_minus {
            if let Operand::Value(b) = args[1] {
                if vr0.kind() == RangeKind::Range && based_on(&vr0, b) {
                    let n_vr1 = retry(&vr0, b);
                    vr = range_fold_binary(op, ty, &vr0, &n_vr1, &self.flags);
                }
            }
        }
        if vr.is_varying() && is_plus_minus {
            if let Operand::Value(a) = args[0] {
                if vr1.kind() == RangeKind::Range && based_on(&vr1, a) {
                    let n_vr0 = retry(&vr1, a);
                    vr = range_fold_binary(op, ty, &n_vr0, &vr1, &self.flags);
                }
            }
        }

        // x - y is nonzero when y is known to differ from x.
        if vr.is_varying() && op == BinaryOp::Sub {
            let excludes = |r: &ValueRange, other: Operand| match (*r, other) {
                (ValueRange::AntiRange { min, max, .. }, Operand::Value(o)) => {
                    min == max && min == Bound::name(o)
                }
                _ => false,
            };
            if (args[0].as_value().is_some() && excludes(&vr0, args[1]))
                || excludes(&vr1, args[0])
            {
                vr = ValueRange::nonzero(ty);
            }
        }
        vr
    }

    /// Is the address `&mem` known to be non-null?
    fn address_nonzero(&self, func: &Function, mem: &MemRef) -> bool {
        match &mem.base {
            RefBase::Var(_) | RefBase::Const | RefBase::Code => true,
            RefBase::Deref(deref) => {
                // &p->a is p plus an offset: non-null if p is and the offset cannot wrap to null.
                let no_offset = deref.offset == 0 && mem.path.is_empty() && deref.index.is_none();
                if !no_offset && !self.flags.delete_null_pointer_checks() {
                    return false;
                }
                self.operand_range(func, deref.ptr)
                    .is_some_and(|vr| !vr.is_undefined() && !vr.range_includes_zero_p())
            }
            RefBase::Value(_) => false,
        }
    }

    /// The range of the result of a call.
    fn extract_range_from_call(&self, func: &Function, ty: ScalarTy, call: &CallData) -> ValueRange {
        let builtin = match call.callee {
            Callee::Direct(f) => func.ext_funcs[f].builtin,
            Callee::Indirect(_) => None,
        };
        let arg0 = call.arg(0);
        let arg_info = arg0.and_then(|op| {
            let aty = operand_ty(func, op)?;
            let vr = self.operand_range(func, op)?;
            Some((op, aty, vr))
        });
        // Constant bounds of a non-negative argument range.
        let nonneg_bounds = |vr: &ValueRange| match *vr {
            ValueRange::Range {
                min: Bound::Int(lo),
                max: Bound::Int(hi),
                ..
            } if lo >= 0 => Some((lo, hi)),
            _ => None,
        };
        let int_range = |lo: i128, hi: i128| {
            if lo < ty.min_value() || hi > ty.max_value() {
                ValueRange::Varying(ty)
            } else {
                ValueRange::ints(ty, lo, hi)
            }
        };

        match (builtin, arg_info) {
            (Some(Builtin::Popcount | Builtin::Ffs), Some((_, aty, vr))) => {
                let prec = i128::from(aty.bits);
                let mini = if vr.is_undefined() || vr.range_includes_zero_p() {
                    0
                } else {
                    1
                };
                let maxi = match nonneg_bounds(&vr) {
                    Some((_, 0)) => 0,
                    Some((_, hi)) => i128::from(floor_log2(hi)) + 1,
                    None => prec,
                };
                int_range(mini.min(maxi), maxi)
            }
            (Some(Builtin::Parity), _) => int_range(0, 1),
            (Some(Builtin::Clz), Some((_, aty, vr))) => {
                let prec = i128::from(aty.bits);
                let (mut mini, mut maxi) = (0, prec - 1);
                if let Some((lo, hi)) = nonneg_bounds(&vr) {
                    if lo > 0 {
                        maxi = prec - 1 - i128::from(floor_log2(lo));
                    }
                    if hi > 0 {
                        mini = prec - 1 - i128::from(floor_log2(hi));
                    }
                }
                int_range(mini, maxi)
            }
            (Some(Builtin::Ctz), Some((_, aty, vr))) => {
                let prec = i128::from(aty.bits);
                let maxi = match nonneg_bounds(&vr) {
                    Some((_, hi)) if hi > 0 => i128::from(floor_log2(hi)),
                    _ => prec - 1,
                };
                int_range(0, maxi)
            }
            (Some(Builtin::ConstantP), _) => match arg0 {
                // A parameter is never a compile-time constant once inlining is done.
                Some(Operand::Value(v)) if is_param(func, v) => ValueRange::zero(ty),
                _ => int_range(0, 1),
            },
            _ if ty.pointer
                && (call.flags.contains(CallFlags::RETURNS_NONNULL)
                    || builtin == Some(Builtin::Alloca)) =>
            {
                ValueRange::nonzero(ty)
            }
            _ => ValueRange::Varying(ty),
        }
    }

    /// The value a non-PHI instruction computes for its result.
    ///
    /// Returns the result and its domain, or `None` if the instruction defines no tracked value.
    pub fn extract_range_from_inst(
        &self,
        func: &Function,
        inst: Inst,
    ) -> Option<(Value, ScalarTy, VrpValue)> {
        let data = func.inst(inst);
        let dst = data.result()?;
        let ty = value_ty(func, dst)?;
        let varying = ValueRange::Varying(ty);

        let vr = match *data {
            InstData::Unary { op, arg, .. } => match (self.operand_range(func, arg), operand_ty(func, arg)) {
                (Some(vr0), Some(from)) => {
                    VrpValue::new(range_fold_unary(UnaryCode::from(op), ty, &vr0, from))
                }
                _ => VrpValue::new(varying),
            },
            InstData::Convert { src, .. } => match (self.operand_range(func, src), operand_ty(func, src)) {
                (Some(vr0), Some(from)) => {
                    VrpValue::new(range_fold_unary(UnaryCode::Convert, ty, &vr0, from))
                }
                _ => VrpValue::new(varying),
            },
            InstData::Binary { op, args, .. } => {
                VrpValue::new(self.extract_range_from_binary(func, ty, op, args))
            }
            InstData::Compare { cond, args, .. } => {
                match self.evaluate_conditional(func, cond, args[0], args[1], false) {
                    Some(b) => VrpValue::new(ValueRange::constant(ty, i128::from(b))),
                    // A comparison is always true or false.
                    None if ty.bits > 1 => VrpValue::new(ValueRange::ints(ty, 0, 1)),
                    None => VrpValue::new(varying),
                }
            }
            InstData::Copy { src, .. } => self.extract_range_from_copy(ty, func, src),
            InstData::AddrOf { ref mem, .. } => {
                if let (RefBase::Var(var), true) = (&mem.base, mem.path.is_empty()) {
                    VrpValue::new(ValueRange::singleton_of(
                        ty,
                        Bound::Addr {
                            var: *var,
                            offset: 0,
                        },
                    ))
                } else if ty.pointer && self.address_nonzero(func, mem) {
                    VrpValue::new(ValueRange::nonzero(ty))
                } else {
                    VrpValue::new(varying)
                }
            }
            InstData::Load { .. } => VrpValue::new(varying),
            InstData::Call(ref call) => VrpValue::new(self.extract_range_from_call(func, ty, call)),
            InstData::Assert {
                src,
                expr,
                cond,
                bound,
                ..
            } => self.extract_range_from_assert(func, src, expr, cond, bound),
            _ => VrpValue::new(varying),
        };
        Some((dst, ty, vr))
    }

    /// The meet of the arguments of `phi` on executable edges.
    ///
    /// Returns the result and its domain, or `None` if the PHI defines no tracked value.
    pub fn extract_range_from_phi(
        &mut self,
        func: &Function,
        cfg: &ControlFlowGraph,
        phi: Inst,
    ) -> Option<(Value, ScalarTy, VrpValue)> {
        let InstData::Phi { dst, ref args } = *func.inst(phi) else {
            return None;
        };
        let ty = value_ty(func, dst)?;
        let block = func.layout.inst_block(phi)?;

        let mut result = VrpValue::default();
        let mut first = true;
        let mut edges = 0;
        let mut may_simulate_backedge_again = false;
        for &(pred, arg) in args {
            let Some(edge) = cfg.find_edge(pred, block) else {
                continue;
            };
            let flags = cfg.flags(edge);
            if !flags.contains(EdgeFlags::EXECUTABLE) {
                continue;
            }
            edges += 1;
            let back_edge = flags.contains(EdgeFlags::DFS_BACK);

            let arg_vr = match arg {
                Operand::Value(v) => {
                    if back_edge && func.dfg.value_inst(v).is_some() {
                        may_simulate_backedge_again = true;
                    }
                    let vr = &self.values[v];
                    if back_edge {
                        // Equivalences and symbolic ranges must not flow around loops.
                        let mut tem = VrpValue::new(vr.range);
                        if tem.range.symbolic_p() {
                            tem.set_varying(ty);
                        }
                        tem
                    } else if vr.range.is_varying() {
                        // Still record that the PHI may equal this very name.
                        VrpValue::new(ValueRange::singleton_of(ty, Bound::name(v)))
                    } else {
                        vr.clone()
                    }
                }
                _ => VrpValue::new(
                    self.operand_range(func, arg)
                        .unwrap_or(ValueRange::Varying(ty)),
                ),
            };

            if first {
                result = arg_vr;
            } else {
                result.union_(&arg_vr);
            }
            first = false;
            if result.range.is_varying() {
                break;
            }
        }

        if result.range.is_varying() || result.range.is_undefined() {
            return Some((dst, ty, result));
        }

        let old_edges = self.phi_edge_counts[dst];
        self.phi_edge_counts[dst] = edges;
        let old = self.values[dst].range;
        // Only widen when no new edge became executable, so conditionals outside of loops get
        // one more exact iteration.
        if self.flags.vrp_phi_widening()
            && edges > 0
            && args.len() > 1
            && edges == old_edges
            && !old.is_undefined()
            && may_simulate_backedge_again
        {
            let widened = widen_phi_range(ty, &old, &result.range);
            trace!("widening {dst} from {old} and {} to {widened}", result.range);
            result.update(widened);
        }
        Some((dst, ty, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::entity::EntityRef;
    use crate::ir::{BinaryOp, ExtFuncData, RetVal, Var};

    fn s32() -> ScalarTy {
        ScalarTy::int(32, true, false)
    }

    fn u32_() -> ScalarTy {
        ScalarTy::int(32, false, true)
    }

    #[test]
    fn ranges_compare() {
        let s = s32();
        let a = ValueRange::ints(s, 0, 5);
        let b = ValueRange::ints(s, 6, 9);
        assert_eq!(compare_ranges(IntCC::LessThan, &a, &b), Some(true));
        assert_eq!(compare_ranges(IntCC::GreaterThanOrEqual, &a, &b), Some(false));
        assert_eq!(compare_ranges(IntCC::Equal, &a, &b), Some(false));
        assert_eq!(compare_ranges(IntCC::NotEqual, &a, &b), Some(true));

        let c = ValueRange::ints(s, 5, 7);
        assert_eq!(compare_ranges(IntCC::LessThan, &a, &c), None);
        assert_eq!(compare_ranges(IntCC::LessThanOrEqual, &a, &c), Some(true));
        assert_eq!(compare_ranges(IntCC::GreaterThan, &a, &c), Some(false));
        assert_eq!(compare_ranges(IntCC::GreaterThanOrEqual, &a, &c), None);
        assert_eq!(compare_ranges(IntCC::LessThanOrEqual, &a, &ValueRange::ints(s, 5, 9)), Some(true));

        let five = ValueRange::constant(s, 5);
        assert_eq!(compare_ranges(IntCC::Equal, &five, &five), Some(true));
        assert_eq!(compare_ranges(IntCC::NotEqual, &five, &five), Some(false));

        // Only equality is decidable against anti-ranges.
        let not_five = ValueRange::anti_range(s, Bound::Int(5), Bound::Int(5));
        assert_eq!(compare_ranges(IntCC::Equal, &not_five, &five), Some(false));
        assert_eq!(compare_ranges(IntCC::NotEqual, &five, &not_five), Some(true));
        assert_eq!(compare_ranges(IntCC::LessThan, &five, &not_five), None);
        assert_eq!(compare_ranges(IntCC::Equal, &not_five, &not_five), None);

        assert_eq!(compare_ranges(IntCC::Equal, &ValueRange::Varying(s), &five), None);
        assert_eq!(compare_ranges(IntCC::Equal, &ValueRange::Undefined, &five), None);
    }

    #[test]
    fn range_against_value() {
        let s = s32();
        let a = ValueRange::ints(s, 1, 9);
        assert_eq!(compare_range_with_value(IntCC::GreaterThan, &a, Bound::Int(0)), Some(true));
        assert_eq!(compare_range_with_value(IntCC::GreaterThan, &a, Bound::Int(1)), None);
        assert_eq!(compare_range_with_value(IntCC::LessThan, &a, Bound::Int(1)), Some(false));
        assert_eq!(compare_range_with_value(IntCC::LessThanOrEqual, &a, Bound::Int(9)), Some(true));
        assert_eq!(compare_range_with_value(IntCC::Equal, &a, Bound::Int(10)), Some(false));
        assert_eq!(compare_range_with_value(IntCC::NotEqual, &a, Bound::Int(0)), Some(true));
        assert_eq!(compare_range_with_value(IntCC::Equal, &a, Bound::Int(5)), None);

        let nz = ValueRange::nonzero(s);
        assert_eq!(compare_range_with_value(IntCC::Equal, &nz, Bound::Int(0)), Some(false));
        assert_eq!(compare_range_with_value(IntCC::NotEqual, &nz, Bound::Int(0)), Some(true));
        assert_eq!(compare_range_with_value(IntCC::GreaterThan, &nz, Bound::Int(0)), None);

        // Distinct declarations have distinct addresses.
        let p = ScalarTy::pointer();
        let a_addr = Bound::Addr { var: Var::new(0), offset: 0 };
        let b_addr = Bound::Addr { var: Var::new(1), offset: 0 };
        let pa = ValueRange::singleton_of(p, a_addr);
        assert_eq!(compare_range_with_value(IntCC::Equal, &pa, b_addr), Some(false));
        assert_eq!(compare_range_with_value(IntCC::Equal, &pa, a_addr), Some(true));
        assert_eq!(compare_range_with_value(IntCC::Equal, &pa, Bound::Int(0)), Some(false));
    }

    #[test]
    fn merging_equivalences() {
        let s = s32();
        let (v1, v2, v3) = (Value::new(1), Value::new(2), Value::new(3));
        let mut a = VrpValue::new(ValueRange::ints(s, 0, 10));
        a.equiv.extend([v1, v2]);
        let mut b = VrpValue::new(ValueRange::ints(s, 5, 20));
        b.equiv.extend([v2, v3]);

        let mut meet = a.clone();
        meet.union_(&b);
        assert_eq!(meet.range, ValueRange::ints(s, 0, 20));
        assert_eq!(meet.sorted_equiv(), vec![v2]);

        let mut both = a.clone();
        both.intersect(&b);
        assert_eq!(both.range, ValueRange::ints(s, 5, 10));
        assert_eq!(both.sorted_equiv(), vec![v1, v2, v3]);

        let mut none = VrpValue::new(ValueRange::ints(s, 0, 1));
        none.equiv.insert(v1);
        none.intersect(&VrpValue::new(ValueRange::ints(s, 5, 6)));
        assert!(none.range.is_undefined());
        assert!(none.equiv.is_empty());

        let mut undef = VrpValue::default();
        undef.union_(&a);
        assert_eq!(undef, a);
        assert_eq!(a.to_string(), "i32 [0, 10]  EQUIVALENCES: { v1 v2 }");
    }

    #[test]
    fn no_transition_back_to_undefined() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let x = func.declare_param("x", i32t);
        let mut values = VrValues::new(&func, &Flags::default());
        let s = s32();
        assert!(values.range(x).is_varying());

        let y = Value::new(1);
        assert!(!values.update_value_range(s, y, VrpValue::default()));
        assert!(values.update_value_range(s, y, VrpValue::new(ValueRange::ints(s, 0, 3))));
        assert!(!values.update_value_range(s, y, VrpValue::new(ValueRange::ints(s, 0, 3))));
        assert!(values.update_value_range(s, y, VrpValue::default()));
        assert!(values.range(y).is_varying());
    }

    /// A function with parameters `x: i32`, `n: i32` and `u: u32`.
    fn params() -> (Function, Value, Value, Value) {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let u32t = func.types.int(32, false);
        let x = func.declare_param("x", i32t);
        let n = func.declare_param("n", i32t);
        let u = func.declare_param("u", u32t);
        (func, x, n, u)
    }

    #[test]
    fn comparisons_narrow_ranges() {
        let (func, x, n, u) = params();
        let values = VrValues::new(&func, &Flags::default());
        let s = s32();
        let i32t = func.dfg.value_type(x);
        let c = |v| func.iconst(i32t, v);

        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::GreaterThan, c(0));
        assert_eq!(vr.range, ValueRange::ints(s, 1, s.max_value()));
        assert_eq!(vr.sorted_equiv(), vec![x]);

        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::LessThan, c(10));
        assert_eq!(vr.range, ValueRange::ints(s, s.min_value(), 9));

        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::Equal, c(7));
        assert_eq!(vr.range, ValueRange::constant(s, 7));

        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::NotEqual, c(7));
        assert_eq!(vr.range, ValueRange::anti_range(s, Bound::Int(7), Bound::Int(7)));

        // x < MIN is impossible, and x < x says nothing.
        let vr = values.extract_range_for_var_from_comparison(
            &func,
            x,
            IntCC::LessThan,
            c(s.min_value()),
        );
        assert!(vr.range.is_varying());
        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::LessThan, x.into());
        assert!(vr.range.is_varying());

        // A symbolic limit.
        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::LessThan, n.into());
        assert_eq!(
            vr.range,
            ValueRange::range(
                s,
                Bound::Int(s.min_value()),
                Bound::Sym { name: n, neg: false, offset: -1 }
            )
        );
        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::Equal, n.into());
        assert_eq!(vr.range, ValueRange::singleton_of(s, Bound::name(n)));
        assert_eq!(vr.sorted_equiv(), vec![x, n]);

        // Unsigned x != 0 is x >= 1.
        let u32t = func.dfg.value_type(u);
        let vr = values.extract_range_for_var_from_comparison(
            &func,
            u,
            IntCC::NotEqual,
            func.iconst(u32t, 0),
        );
        assert_eq!(vr.range, ValueRange::ints(u32_(), 1, u32_().max_value()));
    }

    #[test]
    fn limit_ranges_are_used() {
        let (mut func, x, n, _) = params();
        let i32t = func.dfg.value_type(x);
        let block = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(block);
        let ten = pos.func.iconst(i32t, 10);
        let m = pos.ins().copy(i32t, ten);
        pos.ins().ret(None);

        let mut values = VrValues::new(&func, &Flags::default());
        let s = s32();
        values.update_value_range(s, m, VrpValue::new(ValueRange::ints(s, 5, 10)));
        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::LessThan, m.into());
        assert_eq!(vr.range, ValueRange::ints(s, s.min_value(), 9));
        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::GreaterThan, m.into());
        assert_eq!(vr.range, ValueRange::ints(s, 6, s.max_value()));
        // [5, 10] is not a single value, so `x != m` only excludes `m` itself.
        let vr = values.extract_range_for_var_from_comparison(&func, x, IntCC::NotEqual, m.into());
        assert_eq!(vr.range, ValueRange::anti_range(s, Bound::name(m), Bound::name(m)));
        let _ = n;
    }

    #[test]
    fn offset_assertions_are_range_tests() {
        let (mut func, x, _, _) = params();
        let u32t = func.types.int(32, false);
        let values = VrValues::new(&func, &Flags::default());
        let s = s32();

        // (unsigned)x + 5 <= 10 means x in [-5, 5].
        let expr = AssertExpr::Offset { ty: u32t, offset: 5 };
        let vr = values.extract_range_from_assert(
            &func,
            x,
            expr,
            IntCC::LessThanOrEqual,
            func.iconst(u32t, 10),
        );
        assert_eq!(vr.range, ValueRange::ints(s, -5, 5));

        // (unsigned)x - 3 > 4 means x outside of [3, 7].
        let expr = AssertExpr::Offset { ty: u32t, offset: -3 };
        let vr = values.extract_range_from_assert(
            &func,
            x,
            expr,
            IntCC::GreaterThan,
            func.iconst(u32t, 4),
        );
        assert_eq!(vr.range, ValueRange::anti_range(s, Bound::Int(3), Bound::Int(7)));
    }

    #[test]
    fn phi_widening() {
        let s = s32();
        let old = ValueRange::ints(s, 0, 1);
        assert_eq!(
            widen_phi_range(s, &old, &ValueRange::ints(s, 0, 2)),
            ValueRange::ints(s, 0, s.max_value() - 1)
        );
        assert_eq!(
            widen_phi_range(s, &old, &ValueRange::ints(s, -1, 1)),
            ValueRange::ints(s, s.min_value() + 1, 1)
        );
        // Shrinking bounds keep their old value.
        assert_eq!(widen_phi_range(s, &ValueRange::ints(s, 0, 5), &ValueRange::ints(s, 1, 6)), ValueRange::ints(s, 0, s.max_value() - 1));
        assert_eq!(widen_phi_range(s, &old, &old), old);
        // Anti-ranges that change give up.
        let anti = ValueRange::anti_range(s, Bound::Int(0), Bound::Int(5));
        assert!(widen_phi_range(s, &old, &anti).is_varying());
        assert_eq!(
            widen_phi_range(s, &ValueRange::ints(s, -1, 1), &ValueRange::ints(s, -2, 2)),
            ValueRange::ints(s, s.min_value() + 1, s.max_value() - 1)
        );
        // Reaching the whole domain gives up.
        let u8t = ScalarTy::int(8, false, true);
        assert!(
            widen_phi_range(u8t, &ValueRange::ints(u8t, 0, 5), &ValueRange::ints(u8t, 0, 255))
                .is_varying()
        );
    }

    #[test]
    fn statement_ranges() {
        let (mut func, x, n, u) = params();
        let i32t = func.dfg.value_type(x);
        let u32t = func.dfg.value_type(u);
        let i8t = func.types.int(8, true);
        let block = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(block);
        let five = pos.func.iconst(i32t, 5);
        let c = pos.ins().copy(i32t, five);
        let cx = pos.ins().copy(i32t, x);
        let sum = pos.ins().binary(BinaryOp::Add, i32t, c, five);
        let narrow = pos.ins().convert(i8t, u);
        let cmp = pos.ins().icmp(IntCC::LessThan, c, sum);
        let cmp_unknown = pos.ins().icmp(IntCC::LessThan, x, n);
        pos.ins().ret(Some(RetVal::Operand(sum.into())));

        let mut values = VrValues::new(&func, &Flags::default());
        let insts: Vec<Inst> = func.layout.block_insts(block).collect();
        for &inst in &insts {
            if let Some((dst, ty, vr)) = values.extract_range_from_inst(&func, inst) {
                values.update_value_range(ty, dst, vr);
            }
        }
        let s = s32();
        assert_eq!(values.range(c), ValueRange::constant(s, 5));
        assert_eq!(values.range(cx), ValueRange::singleton_of(s, Bound::name(x)));
        assert_eq!(values.lattice(cx).sorted_equiv(), vec![x]);
        assert_eq!(values.range(sum), ValueRange::constant(s, 10));
        assert!(values.range(narrow).is_varying());
        assert_eq!(values.range(cmp), ValueRange::constant(ScalarTy::boolean(), 1));
        assert!(values.range(cmp_unknown).is_varying());
        let _ = u32t;
    }

    #[test]
    fn builtin_call_ranges() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let u32t = func.types.int(32, false);
        let ptr = func.types.void_ptr;
        let x = func.declare_param("x", u32t);
        let popcount = func.import_function(ExtFuncData::builtin(Builtin::Popcount));
        let clz = func.import_function(ExtFuncData::builtin(Builtin::Clz));
        let parity = func.import_function(ExtFuncData::builtin(Builtin::Parity));
        let constant_p = func.import_function(ExtFuncData::builtin(Builtin::ConstantP));
        let alloca = func.import_function(ExtFuncData::builtin(Builtin::Alloca));
        let malloc = func.import_function(ExtFuncData::builtin(Builtin::Malloc));

        let block = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(block);
        let call = |f, arg: Operand| CallData::new(Callee::Direct(f), [arg.into()]);
        let small = pos.func.iconst(u32t, 12);
        let r_pop = pos.ins().call_value(i32t, call(popcount, x.into()));
        let r_pop_small = pos.ins().call_value(i32t, call(popcount, small));
        let r_clz = pos.ins().call_value(i32t, call(clz, x.into()));
        let r_clz_small = pos.ins().call_value(i32t, call(clz, small));
        let r_par = pos.ins().call_value(i32t, call(parity, x.into()));
        let r_cp = pos.ins().call_value(i32t, call(constant_p, x.into()));
        let r_alloca = pos.ins().call_value(ptr, call(alloca, small));
        let r_malloc = pos.ins().call_value(ptr, call(malloc, small));
        pos.ins().ret(None);

        let values = VrValues::new(&func, &Flags::default());
        let range = |v: Value| {
            let inst = func.dfg.value_inst(v).unwrap();
            values.extract_range_from_inst(&func, inst).unwrap().2.range
        };
        let s = s32();
        assert_eq!(range(r_pop), ValueRange::ints(s, 0, 32));
        assert_eq!(range(r_pop_small), ValueRange::ints(s, 1, 4));
        assert_eq!(range(r_clz), ValueRange::ints(s, 0, 31));
        assert_eq!(range(r_clz_small), ValueRange::constant(s, 28));
        assert_eq!(range(r_par), ValueRange::ints(s, 0, 1));
        assert_eq!(range(r_cp), ValueRange::zero(s));
        assert!(range(r_alloca).nonzero_p());
        assert!(range(r_malloc).is_varying());
    }
}
