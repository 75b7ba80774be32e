//! Range assertions.
//!
//! A conditional branch tells something about the names it compares on each outgoing edge, and
//! a dereference tells that the pointer is not null afterwards. Range propagation is sparse, so
//! such facts need a name of their own: an `Assert` pseudo-definition
//!
//! ```text
//!     v7 = assert v3, v3 > 0
//! ```
//!
//! is inserted where the fact holds, and the uses it dominates are renamed to `v7`. Once the
//! ranges are solved, [`remove_range_assertions`] turns the assertions back into plain uses of
//! their source names.

use crate::cursor::FuncCursor;
use crate::dominator_tree::DominatorTree;
use crate::entity::{EntityRef, SecondaryMap};
use crate::flowgraph::{ControlFlowGraph, Edge, EdgeFlags};
use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{
    AssertExpr, BinaryOp, Block, CallFlags, CondCode, Function, Inst, InstData, IntCC, Operand,
    RangeInfo, SwitchCase, UnaryOp, Value,
};
use crate::settings::Flags;
use crate::trace;
use crate::vrp::bound::{Bound, ScalarTy};
use crate::vrp::lattice::ValueRange;
use crate::vrp::values::{VrValues, value_ty};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// The expression an assertion constrains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum LocusExpr {
    /// The name itself.
    Name,
    /// `(unsigned)name + offset` at precision `bits`.
    Offset { bits: u8, offset: i128 },
}

/// Where an assertion is inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AssertPos {
    /// On an outgoing edge of a conditional.
    Edge(Edge),
    /// Right after an instruction.
    After(Inst),
    /// At the start of a block, after its PHIs.
    BlockStart(Block),
}

/// A registered assertion `expr(name) cond val`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AssertLocus {
    pub name: Value,
    pub expr: LocusExpr,
    pub cond: IntCC,
    pub val: Operand,
    pub pos: AssertPos,
    /// The block the fact is known to hold in.
    pub bb: Block,
}

/// A fact on an edge that has not been checked for liveness yet.
struct AssertInfo {
    name: Value,
    expr: LocusExpr,
    cond: IntCC,
    val: Operand,
}

fn operand_key(op: Operand) -> (u8, i128, i64) {
    match op {
        Operand::Value(v) => (0, v.index() as i128, 0),
        Operand::Const { value, .. } => (1, value, 0),
        Operand::Addr { var, offset } => (2, var.index() as i128, offset),
    }
}

struct AssertFinder<'a> {
    func: &'a Function,
    cfg: &'a ControlFlowGraph,
    domtree: &'a DominatorTree,
    flags: &'a Flags,
    /// Instructions using each value.
    users: FxHashMap<Value, SmallVec<[Inst; 2]>>,
    /// Number of operands using each value.
    use_counts: SecondaryMap<Value, u32>,
    /// Names live at the start of each block, as far as they are known.
    live: SecondaryMap<Block, FxHashSet<Value>>,
    asserts_for: BTreeMap<Value, Vec<AssertLocus>>,
}

/// Find the assertions worth inserting into `func`.
///
/// `cfg` must have its `DFS_BACK` flags computed.
pub(crate) fn find_assert_locations(
    func: &Function,
    cfg: &ControlFlowGraph,
    domtree: &DominatorTree,
    flags: &Flags,
) -> Vec<AssertLocus> {
    let mut finder = AssertFinder::new(func, cfg, domtree, flags);
    finder.run();
    finder.process_assert_insertions()
}

impl<'a> AssertFinder<'a> {
    fn new(
        func: &'a Function,
        cfg: &'a ControlFlowGraph,
        domtree: &'a DominatorTree,
        flags: &'a Flags,
    ) -> Self {
        let mut users: FxHashMap<Value, SmallVec<[Inst; 2]>> = FxHashMap::default();
        let mut use_counts = SecondaryMap::new();
        for block in func.layout.blocks() {
            for inst in func.layout.block_insts(block) {
                let uses = func.inst(inst).uses();
                for &v in &uses {
                    use_counts[v] += 1;
                }
                let mut uses = uses;
                uses.sort_unstable();
                uses.dedup();
                for v in uses {
                    users.entry(v).or_default().push(inst);
                }
            }
        }
        Self {
            func,
            cfg,
            domtree,
            flags,
            users,
            use_counts,
            live: SecondaryMap::new(),
            asserts_for: BTreeMap::new(),
        }
    }

    fn run(&mut self) {
        // Names flowing into loop header PHIs are live at the latches. Liveness is computed in
        // one backward pass, so without this there would be no assertions in latches.
        for edge in self.cfg.edges() {
            let data = *self.cfg.edge(edge);
            if !data.flags.contains(EdgeFlags::DFS_BACK) {
                continue;
            }
            for phi in self.func.block_phis(data.dst) {
                if let InstData::Phi { args, .. } = self.func.inst(phi) {
                    for &(pred, arg) in args {
                        if let (true, Operand::Value(v)) = (pred == data.src, arg) {
                            self.live[data.src].insert(v);
                        }
                    }
                }
            }
        }

        let rpo: Vec<Block> = self.domtree.cfg_rpo().copied().collect();
        for &block in rpo.iter().rev() {
            let mut live = core::mem::take(&mut self.live[block]);
            self.find_assert_locations_in(block, &mut live);
            if !live.is_empty() {
                for &edge in self.cfg.preds(block) {
                    let data = self.cfg.edge(edge);
                    if data.flags.contains(EdgeFlags::DFS_BACK) {
                        continue;
                    }
                    let src = data.src;
                    self.live[src].extend(live.iter().copied());
                }
            }
            self.live[block] = live;
        }
    }

    fn live_on_edge(&self, edge: Edge, name: Value) -> bool {
        self.live[self.cfg.edge(edge).dst].contains(&name)
    }

    fn find_assert_locations_in(&mut self, block: Block, live: &mut FxHashSet<Value>) {
        let func = self.func;
        if let Some(term) = func.terminator(block) {
            match func.inst(term) {
                &InstData::Branch {
                    cond,
                    args,
                    then_dest,
                    else_dest,
                    ..
                } if then_dest != else_dest => {
                    self.find_conditional_asserts(block, cond, args, then_dest, else_dest);
                }
                InstData::Switch {
                    index: Operand::Value(index),
                    cases,
                    default,
                } => self.find_switch_asserts(block, *index, cases, *default),
                _ => {}
            }
        }

        let insts: SmallVec<[Inst; 16]> = func.layout.block_insts(block).collect();
        for &inst in insts.iter().rev() {
            let data = func.inst(inst);
            if data.is_phi() {
                continue;
            }
            let uses = data.uses();
            for &op in &uses {
                if !live.contains(&op) || !self.infer_nonnull(inst, op) {
                    continue;
                }
                // Pointers converted to `op` are non-null as well.
                let mut t = op;
                while let Some(InstData::Convert {
                    src: Operand::Value(src),
                    ..
                }) = func.dfg.value_inst_data(t)
                {
                    if !func.types.is_pointer(func.dfg.value_type(*src)) {
                        break;
                    }
                    t = *src;
                    if live.contains(&t) {
                        let zero = func.iconst(func.dfg.value_type(t), 0);
                        self.register_new_assert_for(
                            t,
                            LocusExpr::Name,
                            IntCC::NotEqual,
                            zero,
                            block,
                            AssertPos::After(inst),
                        );
                    }
                }
                let zero = func.iconst(func.dfg.value_type(op), 0);
                self.register_new_assert_for(
                    op,
                    LocusExpr::Name,
                    IntCC::NotEqual,
                    zero,
                    block,
                    AssertPos::After(inst),
                );
            }
            live.extend(uses);
            if let Some(dst) = data.result() {
                live.remove(&dst);
            }
        }

        for phi in func.block_phis(block) {
            if let InstData::Phi { dst, args } = func.inst(phi) {
                live.extend(args.iter().filter_map(|(_, arg)| arg.as_value()));
                live.remove(dst);
            }
        }
    }

    /// Does executing `inst` prove that the pointer `op` is not null?
    fn infer_nonnull(&self, inst: Inst, op: Value) -> bool {
        let func = self.func;
        if !self.flags.delete_null_pointer_checks()
            || !func.types.is_pointer(func.dfg.value_type(op))
        {
            return false;
        }
        let data = func.inst(inst);
        // Facts need a place after the instruction, and instructions that may throw continue
        // elsewhere.
        match data {
            _ if data.is_terminator() => return false,
            InstData::Asm { .. } | InstData::AddrOf { .. } => return false,
            InstData::Call(call) if !call.flags.contains(CallFlags::NOTHROW) => return false,
            InstData::Load { .. } | InstData::Store { .. } | InstData::Aggregate { .. }
                if self.flags.can_throw_non_call_exceptions() =>
            {
                return false;
            }
            _ => {}
        }
        data.mem_refs().iter().any(|mem| {
            mem.base
                .as_deref()
                .is_some_and(|deref| deref.ptr == Operand::Value(op))
        })
    }

    fn find_conditional_asserts(
        &mut self,
        block: Block,
        cond: IntCC,
        args: [Operand; 2],
        then_dest: Block,
        else_dest: Block,
    ) {
        for (dest, invert) in [(then_dest, false), (else_dest, true)] {
            if dest == block {
                continue;
            }
            let Some(edge) = self.cfg.find_edge(block, dest) else {
                continue;
            };
            let mut asserts = Vec::new();
            for op in args {
                if let Operand::Value(name) = op {
                    self.register_edge_assert_for(
                        name,
                        edge,
                        cond,
                        args[0],
                        args[1],
                        invert,
                        &mut asserts,
                    );
                }
            }
            self.finish_register_edge_assert_for(edge, asserts);
        }
    }

    fn find_switch_asserts(
        &mut self,
        block: Block,
        index: Value,
        cases: &[SwitchCase],
        default: Block,
    ) {
        let func = self.func;
        let ty = func.dfg.value_type(index);
        let Some(default_edge) = self.cfg.find_edge(block, default) else {
            return;
        };

        // Cases grouped by destination, in case order within a group.
        let mut sorted: SmallVec<[(Block, usize); 8]> =
            cases.iter().enumerate().map(|(i, c)| (c.dest, i)).collect();
        sorted.sort_unstable();
        let mut i = 0;
        while i < sorted.len() {
            let dest = sorted[i].0;
            let first = &cases[sorted[i].1];
            let mut j = i;
            while j + 1 < sorted.len() && sorted[j + 1].0 == dest {
                j += 1;
            }
            let last = &cases[sorted[j].1];
            i = j + 1;

            // The default label reaches this destination too.
            if dest == default {
                continue;
            }
            let Some(edge) = self.cfg.find_edge(block, dest) else {
                continue;
            };
            let (min, max) = (first.low, last.high.max(first.low));
            let mut asserts = Vec::new();
            let idx = Operand::Value(index);
            if min == max {
                let val = func.iconst(ty, min);
                self.register_edge_assert_for(
                    index,
                    edge,
                    IntCC::Equal,
                    idx,
                    val,
                    false,
                    &mut asserts,
                );
            } else {
                let lo = func.iconst(ty, min);
                self.register_edge_assert_for(
                    index,
                    edge,
                    IntCC::GreaterThanOrEqual,
                    idx,
                    lo,
                    false,
                    &mut asserts,
                );
                let hi = func.iconst(ty, max);
                self.register_edge_assert_for(
                    index,
                    edge,
                    IntCC::LessThanOrEqual,
                    idx,
                    hi,
                    false,
                    &mut asserts,
                );
            }
            self.finish_register_edge_assert_for(edge, asserts);
        }

        if !self.live_on_edge(default_edge, index) {
            return;
        }
        let Some(scalar) = value_ty(func, index) else {
            return;
        };

        // The default edge excludes every case. Contiguous cases are merged into one fact.
        let mut limit = self.flags.max_vrp_switch_assertions();
        let mut i = 0;
        while i < cases.len() && limit > 0 {
            if cases[i].dest == default {
                i += 1;
                continue;
            }
            let min = cases[i].low;
            let mut max = cases[i].high;
            i += 1;
            while i < cases.len() && cases[i].dest != default && cases[i].low == max + 1 {
                max = cases[i].high;
                i += 1;
            }

            let asserts = if min == max {
                let mut asserts = Vec::new();
                let val = func.iconst(ty, min);
                self.register_edge_assert_for(
                    index,
                    default_edge,
                    IntCC::NotEqual,
                    Operand::Value(index),
                    val,
                    false,
                    &mut asserts,
                );
                asserts
            } else {
                // (unsigned)index - min > max - min, which is ~[min, max] for index.
                let uty = ScalarTy::int(scalar.bits, false, true);
                vec![AssertInfo {
                    name: index,
                    expr: LocusExpr::Offset {
                        bits: scalar.bits,
                        offset: -min,
                    },
                    cond: IntCC::GreaterThan,
                    val: func.iconst(ty, uty.wrap(max - min)),
                }]
            };
            self.finish_register_edge_assert_for(default_edge, asserts);
            limit -= 1;
        }
    }

    /// Orient the comparison `op0 cond op1` as `name code val`, on the false edge if `invert`.
    fn extract_code_and_val(
        &self,
        name: Value,
        cond: IntCC,
        op0: Operand,
        op1: Operand,
        invert: bool,
    ) -> Option<(IntCC, Operand)> {
        let (mut code, val) = if op0 == Operand::Value(name) {
            (cond, op1)
        } else if op1 == Operand::Value(name) {
            (cond.reverse(), op0)
        } else {
            return None;
        };
        if invert {
            code = code.inverse();
        }
        let ty = ScalarTy::of(&self.func.types, self.func.operand_type(val))?;

        // Always-false predicates are left to folding.
        if !ty.pointer {
            match (code, val.as_const()) {
                (IntCC::GreaterThan, Some(c)) if c >= ty.max_value() => return None,
                (IntCC::LessThan, Some(c)) if c <= ty.min_value() => return None,
                _ => {}
            }
        }
        Some((code, val))
    }

    fn register_edge_assert_for(
        &self,
        name: Value,
        edge: Edge,
        cond: IntCC,
        op0: Operand,
        op1: Operand,
        invert: bool,
        asserts: &mut Vec<AssertInfo>,
    ) {
        let Some((code, val)) = self.extract_code_and_val(name, cond, op0, op1, invert) else {
            return;
        };
        self.register_edge_assert_for_2(name, edge, cond, op0, op1, invert, asserts);

        // `name != 0` where `name = a & b` means both `a` and `b` are non-zero; `name == 0` with
        // `name = a | b` means both are zero.
        let is_const = |c: i128| val.as_const() == Some(c);
        let one_bit = value_ty(self.func, name).is_some_and(|ty| ty.bits == 1);
        let truthy = (code == IntCC::Equal && is_const(1)) || (code == IntCC::NotEqual && is_const(0));
        let falsy = (code == IntCC::Equal && is_const(0)) || (code == IntCC::NotEqual && is_const(1));
        match self.func.dfg.value_inst_data(name) {
            Some(&InstData::Binary {
                op: BinaryOp::And,
                args: [a, b],
                ..
            }) if truthy => {
                self.register_edge_assert_for_1(a, IntCC::NotEqual, edge, asserts);
                self.register_edge_assert_for_1(b, IntCC::NotEqual, edge, asserts);
            }
            Some(&InstData::Binary {
                op: BinaryOp::Or,
                args: [a, b],
                ..
            }) if falsy && (one_bit || code == IntCC::Equal) => {
                self.register_edge_assert_for_1(a, IntCC::Equal, edge, asserts);
                self.register_edge_assert_for_1(b, IntCC::Equal, edge, asserts);
            }
            // A comparison result tested against 0 or 1.
            Some(&InstData::Compare {
                cond: inner,
                args: [a, b],
                ..
            }) if truthy || falsy => {
                for x in [a, b].into_iter().filter_map(Operand::as_value) {
                    self.register_edge_assert_for_2(x, edge, inner, a, b, falsy, asserts);
                }
            }
            _ => {}
        }
    }

    /// Register `op code 0` and whatever follows from the definition of `op`.
    fn register_edge_assert_for_1(
        &self,
        op: Operand,
        code: IntCC,
        edge: Edge,
        asserts: &mut Vec<AssertInfo>,
    ) {
        let func = self.func;
        let Operand::Value(op) = op else {
            return;
        };
        let Some(ty) = value_ty(func, op) else {
            return;
        };
        asserts.push(AssertInfo {
            name: op,
            expr: LocusExpr::Name,
            cond: code,
            val: func.iconst(func.dfg.value_type(op), 0),
        });

        match func.dfg.value_inst_data(op) {
            Some(&InstData::Compare {
                cond: inner,
                args: [a, b],
                ..
            }) => {
                let invert = code == IntCC::Equal;
                for x in [a, b].into_iter().filter_map(Operand::as_value) {
                    self.register_edge_assert_for_2(x, edge, inner, a, b, invert, asserts);
                }
            }
            Some(&InstData::Binary { op: bop, args, .. })
                if (code == IntCC::NotEqual && bop == BinaryOp::And)
                    || (code == IntCC::Equal && bop == BinaryOp::Or) =>
            {
                for a in args {
                    if let Operand::Value(v) = a
                        && self.use_counts[v] == 1
                    {
                        self.register_edge_assert_for_1(a, code, edge, asserts);
                    }
                }
            }
            Some(&InstData::Unary {
                op: UnaryOp::BitNot,
                arg,
                ..
            }) if ty.bits == 1 => {
                self.register_edge_assert_for_1(arg, code.inverse(), edge, asserts);
            }
            Some(&InstData::Copy { src, .. }) => {
                self.register_edge_assert_for_1(src, code, edge, asserts);
            }
            Some(&InstData::Convert { src, .. }) => {
                // Not through narrowing conversions or from pointers.
                if let Some(from) = ScalarTy::of(&func.types, func.operand_type(src))
                    && !from.pointer
                    && from.bits <= ty.bits
                {
                    self.register_edge_assert_for_1(src, code, edge, asserts);
                }
            }
            _ => {}
        }
    }

    /// Register `name code val` plus the facts on the names `name` is computed from.
    fn register_edge_assert_for_2(
        &self,
        name: Value,
        edge: Edge,
        cond: IntCC,
        op0: Operand,
        op1: Operand,
        invert: bool,
        asserts: &mut Vec<AssertInfo>,
    ) {
        let func = self.func;
        let Some((code, val)) = self.extract_code_and_val(name, cond, op0, op1, invert) else {
            return;
        };
        asserts.push(AssertInfo {
            name,
            expr: LocusExpr::Name,
            cond: code,
            val,
        });

        let (Some(name_ty), Some(c)) = (value_ty(func, name), val.as_const()) else {
            return;
        };
        if name_ty.pointer {
            return;
        }
        let bits = name_ty.bits;
        let def = func.dfg.value_inst_data(name);
        let integral = |v: Value| value_ty(func, v).filter(|t| !t.pointer);

        // `name <= C` with `name = (unsigned)name3 + C2` is a range test on `name3`; `name > C`
        // is an anti-range test.
        if matches!(code, IntCC::LessThanOrEqual | IntCC::GreaterThan) && !name_ty.signed {
            let mut def_stmt = def;
            let mut plus: Option<(Value, i128)> = None;
            if let Some(&InstData::Binary {
                op: BinaryOp::Add,
                args: [Operand::Value(name2), Operand::Const { value: cst2, .. }],
                ..
            }) = def
            {
                plus = Some((name2, cst2));
                def_stmt = func.dfg.value_inst_data(name2);
            }
            if let Some(&InstData::Convert {
                src: Operand::Value(name3),
                ..
            }) = def_stmt
                && integral(name3).is_some_and(|t| t.signed && t.bits == bits)
            {
                asserts.push(AssertInfo {
                    name: name3,
                    expr: LocusExpr::Offset {
                        bits,
                        offset: plus.map_or(0, |(_, cst2)| cst2),
                    },
                    cond: code,
                    val,
                });
            }
            if let Some((name2, cst2)) = plus
                && integral(name2).is_some_and(|t| t.bits == bits)
            {
                asserts.push(AssertInfo {
                    name: name2,
                    expr: LocusExpr::Offset { bits, offset: cst2 },
                    cond: code,
                    val,
                });
            }
        }

        if code.is_equality() {
            // Post-increments: `if (i++ == C)` also tells `i + 1 == C + 1` for the uses of the
            // incremented value, and similarly for conversions of `name`.
            let src = self.cfg.edge(edge).src;
            for &user in self.users.get(&name).into_iter().flatten() {
                let Some(user_block) = func.layout.inst_block(user) else {
                    continue;
                };
                if !self.domtree.block_dominates(user_block, src) {
                    continue;
                }
                let (dst, cst) = match *func.inst(user) {
                    InstData::Binary {
                        op: op @ (BinaryOp::Add | BinaryOp::Sub),
                        dst,
                        args: [Operand::Value(a), Operand::Const { value: cst2, .. }],
                    } if a == name => (dst, if op == BinaryOp::Add { c + cst2 } else { c - cst2 }),
                    InstData::Convert {
                        dst,
                        src: Operand::Value(a),
                    } if a == name => {
                        let narrowing = value_ty(func, dst).is_some_and(|t| t.bits < bits);
                        if code == IntCC::NotEqual && narrowing {
                            continue;
                        }
                        (dst, c)
                    }
                    _ => continue,
                };
                let Some(dst_ty) = value_ty(func, dst) else {
                    continue;
                };
                asserts.push(AssertInfo {
                    name: dst,
                    expr: LocusExpr::Name,
                    cond: code,
                    val: func.iconst(func.dfg.value_type(dst), dst_ty.wrap(cst)),
                });
            }
        }

        match def {
            // name ==/!= C with name = a +- C2 gives a ==/!= C -+ C2.
            Some(&InstData::Binary {
                op: op @ (BinaryOp::Add | BinaryOp::Sub),
                args: [Operand::Value(a), Operand::Const { value: cst2, .. }],
                ..
            }) if code.is_equality() => {
                if let Some(aty) = integral(a) {
                    let cst = if op == BinaryOp::Add { c - cst2 } else { c + cst2 };
                    if aty.contains(cst) || !aty.overflow_undefined() {
                        asserts.push(AssertInfo {
                            name: a,
                            expr: LocusExpr::Name,
                            cond: code,
                            val: func.iconst(func.dfg.value_type(a), aty.wrap(cst)),
                        });
                    }
                }
            }
            // A signed comparison of `name = (signed)name2` with an unsigned `name2` of the same
            // precision is a range test on `name2` shifted by the signed minimum.
            Some(&InstData::Convert {
                src: Operand::Value(name2),
                ..
            }) if name_ty.signed
                && !code.is_equality()
                && integral(name2).is_some_and(|t| !t.signed && t.bits == bits)
                && (matches!(code, IntCC::LessThanOrEqual | IntCC::GreaterThan)
                    || c != name_ty.min_value()) =>
            {
                let uty = ScalarTy::int(bits, false, true);
                let min = uty.wrap(name_ty.min_value());
                let mut cst = uty.wrap(min + uty.wrap(c));
                let mut new_code = code;
                if matches!(code, IntCC::LessThan | IntCC::GreaterThanOrEqual) {
                    new_code = if code == IntCC::LessThan {
                        IntCC::LessThanOrEqual
                    } else {
                        IntCC::GreaterThan
                    };
                    cst = uty.wrap(cst - 1);
                }
                asserts.push(AssertInfo {
                    name: name2,
                    expr: LocusExpr::Offset { bits, offset: min },
                    cond: new_code,
                    val: func.iconst(func.dfg.value_type(name2), cst),
                });
            }
            // (a & mask) ==/!= C with a mask of high bits is a range test on `a`.
            Some(&InstData::Binary {
                op: BinaryOp::And,
                args: [Operand::Value(a), Operand::Const { value: mask, .. }],
                ..
            }) if code.is_equality() && integral(a).is_some_and(|t| t.bits == bits) => {
                let uty = ScalarTy::int(bits, false, true);
                let low = uty.mask() & !uty.to_bits(mask);
                let cst = uty.to_bits(c);
                if low != 0 && low & (low + 1) == 0 && cst & low == 0 {
                    asserts.push(AssertInfo {
                        name: a,
                        expr: LocusExpr::Offset {
                            bits,
                            offset: -(cst as i128),
                        },
                        cond: if code == IntCC::Equal {
                            IntCC::LessThanOrEqual
                        } else {
                            IntCC::GreaterThan
                        },
                        val: func.iconst(func.dfg.value_type(a), low as i128),
                    });
                }
            }
            _ => {}
        }
    }

    /// Keep the facts on names that are live at the destination of `edge`.
    fn finish_register_edge_assert_for(&mut self, edge: Edge, asserts: Vec<AssertInfo>) {
        let dest = self.cfg.edge(edge).dst;
        for info in asserts {
            if self.live[dest].contains(&info.name) {
                self.register_new_assert_for(
                    info.name,
                    info.expr,
                    info.cond,
                    info.val,
                    dest,
                    AssertPos::Edge(edge),
                );
            }
        }
    }

    /// Record the assertion, or move an identical one up to `bb` if `bb` dominates it.
    ///
    /// A critical edge is split, and the new block does not dominate what its destination
    /// dominates, so facts on critical edges never replace other locations.
    fn register_new_assert_for(
        &mut self,
        name: Value,
        expr: LocusExpr,
        cond: IntCC,
        val: Operand,
        bb: Block,
        pos: AssertPos,
    ) {
        let critical = matches!(pos, AssertPos::Edge(e) if self.cfg.is_critical(e));
        let locs = self.asserts_for.entry(name).or_default();
        for loc in locs.iter_mut() {
            if loc.cond == cond
                && loc.val == val
                && loc.expr == expr
                && !critical
                && self.domtree.block_dominates(bb, loc.bb)
            {
                loc.bb = bb;
                loc.pos = pos;
                return;
            }
        }
        trace!("assert {name} {cond} {val:?} ({expr:?}) at {pos:?}");
        locs.push(AssertLocus {
            name,
            expr,
            cond,
            val,
            pos,
            bb,
        });
    }

    /// Order the assertions, drop duplicates on one edge, and move facts that hold on every
    /// incoming edge of a block to the start of the block.
    fn process_assert_insertions(self) -> Vec<AssertLocus> {
        let cfg = self.cfg;
        let mut all: Vec<AssertLocus> = self.asserts_for.into_values().flatten().collect();
        all.sort_by_key(|loc| match loc.pos {
            AssertPos::Edge(e) => {
                let data = cfg.edge(e);
                (0, data.dst.index(), loc.cond, loc.name, loc.expr, operand_key(loc.val), data.src.index())
            }
            AssertPos::After(inst) => {
                (1, loc.bb.index(), loc.cond, loc.name, loc.expr, operand_key(loc.val), inst.index())
            }
            AssertPos::BlockStart(b) => {
                (1, b.index(), loc.cond, loc.name, loc.expr, operand_key(loc.val), usize::MAX)
            }
        });

        type Key = (Block, IntCC, Value, LocusExpr, Operand);
        let mut slots: Vec<Option<AssertLocus>> = all.into_iter().map(Some).collect();
        let mut common: Option<Key> = None;
        let mut commonj = 0;
        let mut ecnt = 0;
        for i in 0..slots.len() {
            let Some(loc) = slots[i].as_ref() else {
                continue;
            };
            let AssertPos::Edge(edge) = loc.pos else {
                common = None;
                continue;
            };
            let dst = cfg.edge(edge).dst;
            let key = (dst, loc.cond, loc.name, loc.expr, loc.val);
            let prev_edge = i
                .checked_sub(1)
                .and_then(|j| slots[j].as_ref())
                .map(|prev| prev.pos);
            if common != Some(key) {
                common = Some(key);
                commonj = i;
                ecnt = 1;
            } else if prev_edge == Some(AssertPos::Edge(edge)) {
                if commonj == i - 1 {
                    commonj = i;
                }
                slots[i - 1] = None;
            } else {
                ecnt += 1;
                if cfg.preds(dst).len() == ecnt {
                    // The fact holds on every way into `dst`.
                    if let Some(loc) = slots[i].as_mut() {
                        loc.pos = AssertPos::BlockStart(dst);
                        loc.bb = dst;
                    }
                    common = None;
                    for slot in &mut slots[commonj..i] {
                        *slot = None;
                    }
                }
            }
        }

        slots
            .into_iter()
            .flatten()
            // x == x says nothing.
            .filter(|loc| !(loc.expr == LocusExpr::Name && loc.val == Operand::Value(loc.name)))
            .collect()
    }
}

/// Insert the assertions `loci` into `func`, splitting edges as needed, and rename the uses
/// they dominate. Returns the number of assertions inserted.
///
/// `cfg` is kept up to date; `domtree` is recomputed.
pub(crate) fn insert_range_assertions(
    func: &mut Function,
    cfg: &mut ControlFlowGraph,
    domtree: &mut DominatorTree,
    loci: &[AssertLocus],
) -> usize {
    // The last assertion placed at each position, so the ones sharing it stay in order.
    let mut last_at: FxHashMap<AssertPos, Inst> = FxHashMap::default();
    let mut inserted: FxHashMap<Value, SmallVec<[Inst; 4]>> = FxHashMap::default();

    for loc in loci {
        let (expr, bound) = match loc.expr {
            LocusExpr::Name => (AssertExpr::Name, loc.val),
            LocusExpr::Offset { bits, offset } => {
                let uty = func.types.int(bits, false);
                let bound = match loc.val {
                    Operand::Const { value, .. } => Operand::Const { ty: uty, value },
                    other => other,
                };
                (AssertExpr::Offset { ty: uty, offset }, bound)
            }
        };

        enum At {
            After(Inst),
            Before(Inst),
            FirstInsertionPoint(Block),
            AfterPhis(Block),
        }
        let at = match (last_at.get(&loc.pos), loc.pos) {
            (Some(&prev), _) => At::After(prev),
            (None, AssertPos::Edge(edge)) => {
                let dst = cfg.edge(edge).dst;
                if cfg.is_single_pred(edge) && func.block_phis(dst).next().is_none() {
                    At::FirstInsertionPoint(dst)
                } else {
                    let block = cfg.split_edge(func, edge);
                    let jump = func
                        .terminator(block)
                        .expect("split block ends in a jump");
                    At::Before(jump)
                }
            }
            (None, AssertPos::After(inst)) => At::After(inst),
            (None, AssertPos::BlockStart(block)) => At::AfterPhis(block),
        };

        let mut pos = FuncCursor::new(func);
        match at {
            At::After(inst) => pos.goto_after_inst(inst),
            At::Before(inst) => pos.goto_inst(inst),
            At::FirstInsertionPoint(block) => pos.goto_first_insertion_point(block),
            At::AfterPhis(block) => pos.goto_after_phis(block),
        }
        let dst = pos.ins().assert(loc.name, expr, loc.cond, bound);
        let inst = func
            .dfg
            .value_inst(dst)
            .expect("assertion result is an instruction result");
        trace!("inserted {dst} = assert {} at {:?}", loc.name, loc.pos);
        last_at.insert(loc.pos, inst);
        inserted.entry(loc.name).or_default().push(inst);
    }

    domtree.compute(func, cfg);
    rename_asserted_uses(func, domtree, &inserted);
    loci.len()
}

/// Point each use of an asserted name at the innermost assertion dominating the use.
fn rename_asserted_uses(
    func: &mut Function,
    domtree: &DominatorTree,
    inserted: &FxHashMap<Value, SmallVec<[Inst; 4]>>,
) {
    let innermost = |func: &Function, name: Value, point: Inst| -> Option<Value> {
        let mut best: Option<Inst> = None;
        for &a in inserted.get(&name)? {
            if a != point
                && domtree.dominates(a, point, &func.layout)
                && best.is_none_or(|b| domtree.dominates(b, a, &func.layout))
            {
                best = Some(a);
            }
        }
        best.and_then(|a| func.inst(a).result())
    };

    let blocks: SmallVec<[Block; 16]> = func.layout.blocks().collect();
    for block in blocks {
        let insts: SmallVec<[Inst; 16]> = func.layout.block_insts(block).collect();
        for inst in insts {
            if let InstData::Phi { args, .. } = func.inst(inst) {
                // A PHI argument is used at the end of its predecessor.
                let renames: SmallVec<[(usize, Value, Value); 4]> = args
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &(pred, arg))| {
                        let name = arg.as_value()?;
                        let point = func.terminator(pred)?;
                        Some((i, name, innermost(func, name, point)?))
                    })
                    .collect();
                if let InstData::Phi { args, .. } = &mut func.dfg.insts[inst] {
                    for (i, from, to) in renames {
                        args[i].1.replace_value(from, to);
                    }
                }
            } else {
                let mut uses = func.inst(inst).uses();
                uses.sort_unstable();
                uses.dedup();
                for name in uses {
                    if let Some(to) = innermost(func, name, inst) {
                        func.dfg.insts[inst].replace_uses(name, to);
                    }
                }
            }
        }
    }
}

/// Record the solved ranges on `func.range_info`.
///
/// Integer names get their constant ranges; pointer names only whether they are non-null.
pub(crate) fn export_ranges(func: &mut Function, values: &VrValues) {
    let names: SmallVec<[Value; 32]> = func.dfg.values().collect();
    for v in names {
        let Some(ty) = value_ty(func, v) else {
            continue;
        };
        let info = match values.range(v) {
            vr if ty.pointer => {
                let known = matches!(vr, ValueRange::Range { .. } | ValueRange::AntiRange { .. });
                (known && vr.constant_p() && !vr.range_includes_zero_p())
                    .then_some(RangeInfo::NonNull)
            }
            ValueRange::Range {
                min: Bound::Int(min),
                max: Bound::Int(max),
                ..
            } => Some(RangeInfo::Range { min, max }),
            ValueRange::AntiRange {
                min: Bound::Int(min),
                max: Bound::Int(max),
                ..
            } => Some(RangeInfo::AntiRange { min, max }),
            _ => None,
        };
        if info.is_some() {
            func.range_info[v] = info;
        }
    }
}

/// Remove all assertions from `func`, sending their uses back to the asserted names. Returns
/// the number of assertions removed.
pub(crate) fn remove_range_assertions(func: &mut Function) -> usize {
    let blocks: SmallVec<[Block; 16]> = func.layout.blocks().collect();
    let mut removed = 0;
    for block in blocks {
        let insts: SmallVec<[Inst; 16]> = func.layout.block_insts(block).collect();
        for inst in insts {
            // Read the source now: it may itself have been an assertion that is gone.
            if let &InstData::Assert { dst, src, .. } = func.inst(inst) {
                func.replace_uses(dst, src);
                func.layout.remove_inst(inst);
                func.range_info[dst] = None;
                removed += 1;
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RetVal;

    fn prepare(func: &Function) -> (ControlFlowGraph, DominatorTree) {
        let mut cfg = ControlFlowGraph::with_function(func);
        cfg.mark_dfs_back_edges(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        (cfg, domtree)
    }

    fn asserts_in(func: &Function, block: Block) -> Vec<(Value, AssertExpr, IntCC, Operand)> {
        func.layout
            .block_insts(block)
            .filter_map(|inst| match *func.inst(inst) {
                InstData::Assert {
                    src,
                    expr,
                    cond,
                    bound,
                    ..
                } => Some((src, expr, cond, bound)),
                _ => None,
            })
            .collect()
    }

    fn assert_results(func: &Function, block: Block) -> Vec<Value> {
        func.layout
            .block_insts(block)
            .filter_map(|inst| match *func.inst(inst) {
                InstData::Assert { dst, .. } => Some(dst),
                _ => None,
            })
            .collect()
    }

    /// Follow `v` through assertions to the name they narrow.
    fn asserted_root(func: &Function, mut v: Value) -> Value {
        while let Some(&InstData::Assert { src, .. }) = func.dfg.value_inst_data(v) {
            v = src;
        }
        v
    }

    fn all_asserts(func: &Function) -> usize {
        func.layout
            .blocks()
            .map(|b| asserts_in(func, b).len())
            .sum()
    }

    /// `if x > 0 { return x } else { return x }`.
    #[test]
    fn branch_facts_on_both_edges() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let x = func.declare_param("x", i32t);
        let entry = func.dfg.make_block();
        let yes = func.dfg.make_block();
        let no = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(entry);
        let zero = pos.func.iconst(i32t, 0);
        pos.ins().branch(IntCC::GreaterThan, x, zero, yes, no);
        pos.insert_block(yes);
        pos.ins().ret(Some(RetVal::Operand(x.into())));
        pos.insert_block(no);
        pos.ins().ret(Some(RetVal::Operand(x.into())));

        let flags = Flags::default();
        let (mut cfg, mut domtree) = prepare(&func);
        let loci = find_assert_locations(&func, &cfg, &domtree, &flags);
        assert_eq!(loci.len(), 2);
        insert_range_assertions(&mut func, &mut cfg, &mut domtree, &loci);

        assert_eq!(
            asserts_in(&func, yes),
            vec![(x, AssertExpr::Name, IntCC::GreaterThan, zero)]
        );
        assert_eq!(
            asserts_in(&func, no),
            vec![(x, AssertExpr::Name, IntCC::LessThanOrEqual, zero)]
        );

        // The returns use the assertions.
        let ret = func.terminator(yes).unwrap();
        let asserted = func.layout.first_inst(yes).and_then(|i| func.inst(i).result());
        assert_eq!(func.inst(ret).uses().first().copied(), asserted);

        assert_eq!(remove_range_assertions(&mut func), 2);
        assert_eq!(func.inst(ret).uses().first().copied(), Some(x));
        assert_eq!(all_asserts(&func), 0);
    }

    #[test]
    fn dead_names_get_no_facts() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let x = func.declare_param("x", i32t);
        let entry = func.dfg.make_block();
        let yes = func.dfg.make_block();
        let no = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(entry);
        let zero = pos.func.iconst(i32t, 0);
        pos.ins().branch(IntCC::Equal, x, zero, yes, no);
        pos.insert_block(yes);
        pos.ins().ret(Some(RetVal::Operand(x.into())));
        pos.insert_block(no);
        pos.ins().ret(None);

        let (cfg, domtree) = prepare(&func);
        let loci = find_assert_locations(&func, &cfg, &domtree, &Flags::default());
        assert_eq!(loci.len(), 1);
        assert_eq!(loci[0].cond, IntCC::Equal);
        assert_eq!(loci[0].bb, yes);
    }

    /// `c = x > 0 & x < 10; if c != 0 { return x }`.
    #[test]
    fn facts_through_boolean_and() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let boolt = func.types.bool;
        let x = func.declare_param("x", i32t);
        let entry = func.dfg.make_block();
        let yes = func.dfg.make_block();
        let no = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(entry);
        let zero = pos.func.iconst(i32t, 0);
        let ten = pos.func.iconst(i32t, 10);
        let a = pos.ins().icmp(IntCC::GreaterThan, x, zero);
        let b = pos.ins().icmp(IntCC::LessThan, x, ten);
        let c = pos.ins().binary(BinaryOp::And, boolt, a, b);
        let fals = pos.func.iconst(boolt, 0);
        pos.ins().branch(IntCC::NotEqual, c, fals, yes, no);
        pos.insert_block(yes);
        pos.ins().ret(Some(RetVal::Operand(x.into())));
        pos.insert_block(no);
        pos.ins().ret(None);

        let (mut cfg, mut domtree) = prepare(&func);
        let loci = find_assert_locations(&func, &cfg, &domtree, &Flags::default());
        insert_range_assertions(&mut func, &mut cfg, &mut domtree, &loci);
        let on_x: Vec<_> = asserts_in(&func, yes)
            .into_iter()
            .filter(|f| asserted_root(&func, f.0) == x)
            .collect();
        let facts: Vec<_> = on_x.iter().map(|f| (f.2, f.3)).collect();
        assert_eq!(facts.len(), 2);
        assert!(facts.contains(&(IntCC::GreaterThan, zero)));
        assert!(facts.contains(&(IntCC::LessThan, ten)));
        // The second assertion narrows the result of the first.
        assert_eq!(on_x[0].0, x);
        assert_ne!(on_x[1].0, x);
        assert!(assert_results(&func, yes).contains(&on_x[1].0));
    }

    /// A dereference of `p` makes `p` non-null for the rest of the block.
    #[test]
    fn dereference_implies_nonnull() {
        use crate::ir::{Deref, MemRef};

        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let pty = func.types.pointer_to(i32t);
        let p = func.declare_param("p", pty);
        let entry = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(entry);
        let mem = MemRef::deref(Deref::new(p.into(), i32t, pty));
        let load = pos.ins().load(i32t, mem);
        let q = pos.ins().copy(pty, p);
        pos.ins().ret(Some(RetVal::Operand(q.into())));

        let (mut cfg, mut domtree) = prepare(&func);
        let loci = find_assert_locations(&func, &cfg, &domtree, &Flags::default());
        assert_eq!(loci.len(), 1);
        assert_eq!(loci[0].pos, AssertPos::After(func.dfg.value_inst(load).unwrap()));
        insert_range_assertions(&mut func, &mut cfg, &mut domtree, &loci);
        let copy = func.dfg.value_inst(q).unwrap();
        assert_ne!(func.inst(copy).uses()[0], p);

        // Without null pointer check deletion nothing is inferred.
        let mut b = crate::settings::builder();
        crate::settings::Configurable::set(&mut b, "delete_null_pointer_checks", "false").unwrap();
        let no_delete = crate::settings::Flags::new(b);
        remove_range_assertions(&mut func);
        let (cfg, domtree) = prepare(&func);
        assert!(find_assert_locations(&func, &cfg, &domtree, &no_delete).is_empty());
    }

    /// `switch x { 1 | 2 | 3 => a, 7 => b, _ => c }` with `x` used in every arm.
    #[test]
    fn switch_cases_and_default() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let u32t = func.types.int(32, false);
        let x = func.declare_param("x", i32t);
        let entry = func.dfg.make_block();
        let a = func.dfg.make_block();
        let b = func.dfg.make_block();
        let c = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(entry);
        let cases = vec![
            SwitchCase { low: 1, high: 1, dest: a },
            SwitchCase { low: 2, high: 3, dest: a },
            SwitchCase { low: 7, high: 7, dest: b },
        ];
        pos.ins().switch(x, cases, c);
        for block in [a, b, c] {
            pos.insert_block(block);
            pos.ins().ret(Some(RetVal::Operand(x.into())));
        }

        let (mut cfg, mut domtree) = prepare(&func);
        let loci = find_assert_locations(&func, &cfg, &domtree, &Flags::default());
        insert_range_assertions(&mut func, &mut cfg, &mut domtree, &loci);
        let k = |v| func.iconst(i32t, v);
        let first_in_a = assert_results(&func, a)[0];
        assert_eq!(
            asserts_in(&func, a),
            vec![
                (x, AssertExpr::Name, IntCC::LessThanOrEqual, k(3)),
                (first_in_a, AssertExpr::Name, IntCC::GreaterThanOrEqual, k(1)),
            ]
        );
        assert_eq!(asserts_in(&func, b), vec![(x, AssertExpr::Name, IntCC::Equal, k(7))]);

        let in_default = asserts_in(&func, c);
        assert_eq!(in_default.len(), 2);
        assert_eq!(in_default[0].0, x);
        assert_eq!(in_default[1].0, assert_results(&func, c)[0]);
        let mut default_facts: Vec<_> = in_default.into_iter().map(|f| (f.1, f.2, f.3)).collect();
        default_facts.sort_by_key(|f| f.1);
        assert_eq!(
            default_facts,
            vec![
                (AssertExpr::Name, IntCC::NotEqual, k(7)),
                (
                    AssertExpr::Offset { ty: u32t, offset: -1 },
                    IntCC::GreaterThan,
                    func.iconst(u32t, 2)
                ),
            ]
        );
    }

    /// The same fact on both edges into a join is placed once at the join.
    #[test]
    fn common_facts_move_to_the_join() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let x = func.declare_param("x", i32t);
        let y = func.declare_param("y", i32t);
        let entry = func.dfg.make_block();
        let left = func.dfg.make_block();
        let join = func.dfg.make_block();
        let out = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        let zero = pos.func.iconst(i32t, 0);
        pos.insert_block(entry);
        pos.ins().branch(IntCC::NotEqual, x, zero, left, out);
        pos.insert_block(left);
        pos.ins().branch(IntCC::Equal, y, zero, join, out);
        pos.insert_block(join);
        pos.ins().ret(None);
        pos.insert_block(out);
        pos.ins().ret(Some(RetVal::Operand(x.into())));

        let (cfg, domtree) = prepare(&func);
        let loci = find_assert_locations(&func, &cfg, &domtree, &Flags::default());
        // x == 0 on entry -> out, nothing about x on left -> out.
        let on_out: Vec<_> = loci.iter().filter(|l| l.name == x && l.bb == out).collect();
        assert_eq!(on_out.len(), 1);
        assert!(matches!(on_out[0].pos, AssertPos::Edge(_)));

        // Now make the second branch test x too: x == 0 reaches `out` on both edges.
        let mut func2 = func.clone();
        let term = func2.terminator(left).unwrap();
        func2.dfg.insts[term] = InstData::Branch {
            cond: IntCC::NotEqual,
            args: [x.into(), zero],
            then_dest: join,
            else_dest: out,
        };
        let (cfg, domtree) = prepare(&func2);
        let loci = find_assert_locations(&func2, &cfg, &domtree, &Flags::default());
        let on_out: Vec<_> = loci.iter().filter(|l| l.name == x && l.bb == out).collect();
        assert_eq!(on_out.len(), 1);
        assert_eq!(on_out[0].pos, AssertPos::BlockStart(out));
    }

    #[test]
    fn exported_ranges() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let x = func.declare_param("x", i32t);
        let entry = func.dfg.make_block();
        let mut pos = FuncCursor::new(&mut func);
        pos.insert_block(entry);
        let five = pos.func.iconst(i32t, 5);
        let y = pos.ins().copy(i32t, five);
        pos.ins().ret(None);

        let mut values = VrValues::new(&func, &Flags::default());
        let s = ScalarTy::int(32, true, false);
        values.update_value_range(s, y, crate::vrp::values::VrpValue::new(ValueRange::ints(s, 0, 5)));
        export_ranges(&mut func, &values);
        assert_eq!(func.range_info[y], Some(RangeInfo::Range { min: 0, max: 5 }));
        assert_eq!(func.range_info[x], None);
    }
}
