//! The range propagation client of the SSA propagation engine.

use crate::flowgraph::{ControlFlowGraph, Edge};
use crate::ir::{Block, Function, Inst, InstData, Operand, SwitchCase};
use crate::propagate::{PropStatus, PropagationClient};
use crate::trace;
use crate::vrp::bound::ScalarTy;
use crate::vrp::lattice::ValueRange;
use crate::vrp::values::{VrValues, VrpValue};
use smallvec::SmallVec;

/// Computes value ranges for [`ssa_propagate`](crate::propagate::ssa_propagate).
pub struct VrpPropagate {
    /// The lattice values.
    pub values: VrValues,
}

impl VrpPropagate {
    /// A client starting from `values`.
    pub fn new(values: VrValues) -> Self {
        Self { values }
    }

    fn update(&mut self, ty: ScalarTy, dst: crate::ir::Value, vr: VrpValue) -> PropStatus {
        if !self.values.update_value_range(ty, dst, vr) {
            return PropStatus::NotInteresting;
        }
        if self.values.range(dst).is_varying() {
            PropStatus::Varying
        } else {
            PropStatus::Interesting
        }
    }

    fn visit_branch(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        inst: Inst,
        data: &InstData,
    ) -> Option<Edge> {
        let InstData::Branch {
            cond,
            args,
            then_dest,
            else_dest,
        } = *data
        else {
            return None;
        };
        // Equivalences are not used while values may still change.
        let taken = self
            .values
            .evaluate_conditional(func, cond, args[0], args[1], false)?;
        trace!("{cond} {:?} {:?} is always {taken}", args[0], args[1]);
        let block = func.layout.inst_block(inst)?;
        cfg.find_edge(block, if taken { then_dest } else { else_dest })
    }

    fn visit_switch(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        inst: Inst,
        index: Operand,
        cases: &[SwitchCase],
        default: Block,
    ) -> Option<Edge> {
        let vr = self.values.operand_range(func, index)?;
        // Nothing is done for symbolic ranges.
        if !vr.constant_p() {
            return None;
        }
        let dest = switch_destination(&vr, cases, default)?;
        trace!("switch on {vr} always goes to {dest}");
        cfg.find_edge(func.layout.inst_block(inst)?, dest)
    }
}

/// The single destination a switch on an index in `vr` can reach, if there is one.
pub(crate) fn switch_destination(
    vr: &ValueRange,
    cases: &[SwitchCase],
    default: Block,
) -> Option<Block> {
    let mut sorted: SmallVec<[&SwitchCase; 8]> = cases.iter().collect();
    sorted.sort_by_key(|c| c.low);

    let mut dests: SmallVec<[Block; 4]> = SmallVec::new();
    let add = |b: Block, dests: &mut SmallVec<[Block; 4]>| {
        if !dests.contains(&b) {
            dests.push(b);
        }
    };
    for pair in 0..vr.num_pairs() {
        let (lo, hi) = (vr.lower_bound(pair), vr.upper_bound(pair));
        // The next index value not yet known to be covered by a case.
        let mut next = Some(lo);
        for case in sorted.iter().filter(|c| c.high >= lo && c.low <= hi) {
            if next.is_some_and(|n| case.low > n) {
                add(default, &mut dests);
            }
            add(case.dest, &mut dests);
            next = next.filter(|_| case.high < hi).map(|_| case.high + 1);
        }
        if next.is_some() {
            add(default, &mut dests);
        }
    }
    match dests.as_slice() {
        &[dest] => Some(dest),
        _ => None,
    }
}

impl PropagationClient for VrpPropagate {
    fn visit_stmt(
        &mut self,
        func: &Function,
        cfg: &ControlFlowGraph,
        inst: Inst,
    ) -> (PropStatus, Option<Edge>) {
        let data = func.inst(inst);
        let taken = match *data {
            InstData::Branch { .. } => Some(self.visit_branch(func, cfg, inst, data)),
            InstData::Switch {
                index,
                ref cases,
                default,
            } => Some(self.visit_switch(func, cfg, inst, index, cases, default)),
            _ => None,
        };
        if let Some(taken) = taken {
            return match taken {
                Some(edge) => (PropStatus::Interesting, Some(edge)),
                None => (PropStatus::Varying, None),
            };
        }

        match self.values.extract_range_from_inst(func, inst) {
            Some((dst, ty, vr)) => (self.update(ty, dst, vr), None),
            None => (PropStatus::Varying, None),
        }
    }

    fn visit_phi(&mut self, func: &Function, cfg: &ControlFlowGraph, phi: Inst) -> PropStatus {
        match self.values.extract_range_from_phi(func, cfg, phi) {
            Some((dst, ty, vr)) => self.update(ty, dst, vr),
            None => PropStatus::Varying,
        }
    }
}
