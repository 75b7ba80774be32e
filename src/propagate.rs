//! Sparse conditional propagation engine.
//!
//! The engine simulates statements of a function in reverse post-order, following only CFG edges
//! it has found to be executable and re-simulating statements when one of their operands changes
//! value. What a "value" is and how statements compute them is up to a [`PropagationClient`].
//!
//! Two pairs of worklists are kept: one for blocks reached through executable edges and one for
//! statements whose operands changed. Work behind the current position in the reverse post-order
//! (that is, reached through a back edge) goes to a separate list that is only processed once the
//! forward lists are empty, so every iteration sweeps the function once.

use crate::dominator_tree::DominatorTree;
use crate::entity::SecondaryMap;
use crate::flowgraph::{ControlFlowGraph, Edge, EdgeFlags};
use crate::ir::{Block, Function, Inst, InstData, Operand, Value};
use crate::trace;
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// The outcome of visiting a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropStatus {
    /// The statement produced nothing of interest, or the same value as before.
    NotInteresting,
    /// The statement produced a new value that may still change.
    Interesting,
    /// The statement produced a value that will not change any more.
    Varying,
}

/// The semantics of a propagation problem.
pub trait PropagationClient {
    /// Evaluate the non-PHI instruction `inst`.
    ///
    /// For terminators, also return the outgoing edge that is known to be taken, if any. An
    /// `Interesting` terminator without a taken edge adds no edges; a `Varying` one adds all of
    /// them.
    fn visit_stmt(
        &mut self,
        func: &Function,
        cfg: &ControlFlowGraph,
        inst: Inst,
    ) -> (PropStatus, Option<Edge>);

    /// Evaluate the PHI instruction `phi`. Arguments on edges `cfg` does not flag
    /// `EXECUTABLE` must be ignored.
    fn visit_phi(&mut self, func: &Function, cfg: &ControlFlowGraph, phi: Inst) -> PropStatus;
}

/// Worklist state of one propagation run.
struct SsaPropagator<'a> {
    func: &'a Function,
    cfg: &'a mut ControlFlowGraph,

    /// Position of each reachable block in the reverse post-order.
    block_order: SecondaryMap<Block, Option<u32>>,
    order_block: Vec<Block>,
    /// Position of each reachable instruction in the reverse post-order.
    inst_order: SecondaryMap<Inst, Option<u32>>,
    order_inst: Vec<Inst>,
    /// Instructions using each value.
    users: SecondaryMap<Value, SmallVec<[Inst; 4]>>,

    simulate_again: SecondaryMap<Inst, bool>,
    visited: SecondaryMap<Block, bool>,

    cfg_blocks: BTreeSet<u32>,
    cfg_blocks_back_edges: BTreeSet<u32>,
    ssa_edges: BTreeSet<u32>,
    ssa_edges_back_edges: BTreeSet<u32>,
    curr_order: u32,

    num_visits: usize,
}

impl<'a> SsaPropagator<'a> {
    fn new(func: &'a Function, cfg: &'a mut ControlFlowGraph, domtree: &DominatorTree) -> Self {
        let mut block_order = SecondaryMap::new();
        let mut inst_order = SecondaryMap::new();
        let mut order_block = Vec::new();
        let mut order_inst = Vec::new();
        let mut users: SecondaryMap<Value, SmallVec<[Inst; 4]>> = SecondaryMap::new();
        let mut simulate_again = SecondaryMap::new();

        for &block in domtree.cfg_rpo() {
            block_order[block] = Some(order_block.len() as u32);
            order_block.push(block);
            for inst in func.layout.block_insts(block) {
                inst_order[inst] = Some(order_inst.len() as u32);
                order_inst.push(inst);
                simulate_again[inst] = true;
                for v in func.dfg.insts[inst].uses() {
                    if users[v].last() != Some(&inst) {
                        users[v].push(inst);
                    }
                }
            }
        }

        // Executability is recomputed from scratch.
        let edges: SmallVec<[Edge; 16]> = cfg.edges().collect();
        for edge in edges {
            cfg.set_flags(edge, EdgeFlags::EXECUTABLE, false);
        }

        Self {
            func,
            cfg,
            block_order,
            order_block,
            inst_order,
            order_inst,
            users,
            simulate_again,
            visited: SecondaryMap::new(),
            cfg_blocks: BTreeSet::new(),
            cfg_blocks_back_edges: BTreeSet::new(),
            ssa_edges: BTreeSet::new(),
            ssa_edges_back_edges: BTreeSet::new(),
            curr_order: 0,
            num_visits: 0,
        }
    }

    /// Mark `edge` executable and queue its destination.
    fn add_control_edge(&mut self, edge: Edge) {
        if self.cfg.flags(edge).contains(EdgeFlags::EXECUTABLE) {
            return;
        }
        self.cfg.set_flags(edge, EdgeFlags::EXECUTABLE, true);
        let dst = self.cfg.edge(edge).dst;
        let Some(order) = self.block_order[dst] else {
            return;
        };
        trace!("adding edge {} -> {} to the worklist", self.cfg.edge(edge).src, dst);
        if order < self.curr_order {
            self.cfg_blocks_back_edges.insert(order);
        } else {
            self.cfg_blocks.insert(order);
        }
    }

    /// Queue the statements using `value` for re-simulation.
    fn add_ssa_edge(&mut self, value: Value) {
        for i in 0..self.users[value].len() {
            let user = self.users[value][i];
            if !self.simulate_again[user] {
                continue;
            }
            let Some(block) = self.func.layout.inst_block(user) else {
                continue;
            };
            // Statements in blocks not simulated yet will be visited with their block.
            if !self.visited[block] {
                continue;
            }
            if let InstData::Phi { args, .. } = &self.func.dfg.insts[user] {
                let executable = args.iter().any(|&(pred, arg)| {
                    arg == Operand::Value(value)
                        && self
                            .cfg
                            .find_edge(pred, block)
                            .is_some_and(|e| self.cfg.flags(e).contains(EdgeFlags::EXECUTABLE))
                });
                if !executable {
                    continue;
                }
            }
            let (Some(order), Some(block_order)) = (self.inst_order[user], self.block_order[block])
            else {
                continue;
            };
            if block_order < self.curr_order {
                self.ssa_edges_back_edges.insert(order);
            } else {
                self.ssa_edges.insert(order);
            }
        }
    }

    /// Does `inst` use a value whose definition may still change?
    fn has_simulate_again_uses(&self, inst: Inst) -> bool {
        let defined_again = |v: Value| {
            self.func
                .dfg
                .value_inst(v)
                .is_some_and(|def| self.simulate_again[def])
        };
        match &self.func.dfg.insts[inst] {
            InstData::Phi { args, .. } => {
                let block = self.func.layout.inst_block(inst);
                args.iter().any(|&(pred, arg)| {
                    let executable = block
                        .and_then(|b| self.cfg.find_edge(pred, b))
                        .is_some_and(|e| self.cfg.flags(e).contains(EdgeFlags::EXECUTABLE));
                    !executable || matches!(arg, Operand::Value(v) if defined_again(v))
                })
            }
            data => data.uses().into_iter().any(defined_again),
        }
    }

    fn simulate_stmt(&mut self, client: &mut (impl PropagationClient + ?Sized), inst: Inst) {
        if !self.simulate_again[inst] {
            return;
        }
        self.num_visits += 1;

        let func = self.func;
        let data = &func.dfg.insts[inst];
        let (status, taken_edge) = if data.is_phi() {
            (client.visit_phi(func, self.cfg, inst), None)
        } else {
            client.visit_stmt(func, self.cfg, inst)
        };
        let output = data.result();
        trace!("visited {}: {:?}", data, status);

        match status {
            PropStatus::Varying => {
                // The statement will not produce anything new; stop simulating it.
                self.simulate_again[inst] = false;
                if let Some(v) = output {
                    self.add_ssa_edge(v);
                }
                if data.is_terminator() {
                    if let Some(block) = func.layout.inst_block(inst) {
                        let succs: SmallVec<[Edge; 4]> = self.cfg.succs(block).into();
                        for edge in succs {
                            self.add_control_edge(edge);
                        }
                    }
                }
                return;
            }
            PropStatus::Interesting => {
                if let Some(v) = output {
                    self.add_ssa_edge(v);
                }
                if let Some(edge) = taken_edge {
                    self.add_control_edge(edge);
                }
            }
            PropStatus::NotInteresting => {}
        }

        if !self.has_simulate_again_uses(inst) {
            self.simulate_again[inst] = false;
        }
    }

    fn simulate_block(&mut self, client: &mut (impl PropagationClient + ?Sized), block: Block) {
        trace!("simulating {}", block);

        // PHIs are simulated every time a new incoming edge becomes executable.
        let phis: SmallVec<[Inst; 4]> = self.func.block_phis(block).collect();
        for phi in phis {
            self.simulate_stmt(client, phi);
        }

        if self.visited[block] {
            return;
        }
        self.visited[block] = true;
        let insts: SmallVec<[Inst; 16]> = self
            .func
            .layout
            .block_insts(block)
            .skip_while(|&inst| self.func.dfg.insts[inst].is_phi())
            .collect();
        for inst in insts {
            self.simulate_stmt(client, inst);
        }

        // A block with a single successor always falls through to it.
        if let &[edge] = self.cfg.succs(block) {
            self.add_control_edge(edge);
        }
    }

    fn run(&mut self, client: &mut (impl PropagationClient + ?Sized)) {
        let Some(entry) = self.func.layout.entry_block() else {
            return;
        };
        if let Some(order) = self.block_order[entry] {
            self.cfg_blocks.insert(order);
        }

        loop {
            let next_block = self.cfg_blocks.first().copied();
            let next_stmt = self.ssa_edges.first().copied();
            if next_block.is_none() && next_stmt.is_none() {
                if self.cfg_blocks_back_edges.is_empty() && self.ssa_edges_back_edges.is_empty() {
                    break;
                }
                trace!("swapping worklists");
                core::mem::swap(&mut self.cfg_blocks, &mut self.cfg_blocks_back_edges);
                core::mem::swap(&mut self.ssa_edges, &mut self.ssa_edges_back_edges);
                self.curr_order = 0;
                continue;
            }

            let next_stmt = next_stmt.map(|order| {
                let inst = self.order_inst[order as usize];
                let block = self
                    .func
                    .layout
                    .inst_block(inst)
                    .and_then(|b| self.block_order[b])
                    .unwrap_or(0);
                (order, inst, block)
            });

            match (next_block, next_stmt) {
                (Some(order), stmt) if stmt.is_none_or(|(_, _, b)| order <= b) => {
                    self.curr_order = order;
                    self.cfg_blocks.remove(&order);
                    let block = self.order_block[order as usize];
                    self.simulate_block(client, block);
                }
                (_, Some((order, inst, block_order))) => {
                    self.curr_order = block_order;
                    self.ssa_edges.remove(&order);
                    self.simulate_stmt(client, inst);
                }
                (_, None) => unreachable!(),
            }
        }
    }
}

/// Propagate `client`'s values through `func` until a fixed point is reached.
///
/// On return, the `EXECUTABLE` flags of `cfg` tell which edges may be taken. `domtree` must be
/// computed for `cfg`.
pub fn ssa_propagate(
    func: &Function,
    cfg: &mut ControlFlowGraph,
    domtree: &DominatorTree,
    client: &mut (impl PropagationClient + ?Sized),
) {
    debug_assert!(cfg.is_valid() && domtree.is_valid());
    let mut prop = SsaPropagator::new(func, cfg, domtree);
    prop.run(client);
    log::debug!(
        "propagation in {}: {} statement visits over {} instructions",
        func.name,
        prop.num_visits,
        prop.order_inst.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::{BinaryOp, IntCC, RetVal};

    /// Constant propagation over the three-level lattice.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    enum Lat {
        #[default]
        Undef,
        Const(i128),
        Varying,
    }

    impl Lat {
        fn meet(self, other: Lat) -> Lat {
            match (self, other) {
                (Lat::Undef, x) | (x, Lat::Undef) => x,
                (Lat::Const(a), Lat::Const(b)) if a == b => Lat::Const(a),
                _ => Lat::Varying,
            }
        }
    }

    #[derive(Default)]
    struct ConstProp {
        values: SecondaryMap<Value, Lat>,
        visits: usize,
    }

    impl ConstProp {
        fn operand(&self, func: &Function, op: Operand) -> Lat {
            match op {
                Operand::Const { value, .. } => Lat::Const(value),
                Operand::Value(v) if func.dfg.value_inst(v).is_none() => Lat::Varying,
                Operand::Value(v) => self.values[v],
                Operand::Addr { .. } => Lat::Varying,
            }
        }

        fn set(&mut self, v: Value, lat: Lat) -> PropStatus {
            let new = self.values[v].meet(lat);
            if new == self.values[v] {
                return PropStatus::NotInteresting;
            }
            self.values[v] = new;
            if new == Lat::Varying {
                PropStatus::Varying
            } else {
                PropStatus::Interesting
            }
        }
    }

    impl PropagationClient for ConstProp {
        fn visit_stmt(
            &mut self,
            func: &Function,
            cfg: &ControlFlowGraph,
            inst: Inst,
        ) -> (PropStatus, Option<Edge>) {
            self.visits += 1;
            match *func.inst(inst) {
                InstData::Copy { dst, src } => (self.set(dst, self.operand(func, src)), None),
                InstData::Binary {
                    op: BinaryOp::Add,
                    dst,
                    args,
                } => {
                    let lat = match (self.operand(func, args[0]), self.operand(func, args[1])) {
                        (Lat::Const(a), Lat::Const(b)) => Lat::Const(a + b),
                        (Lat::Undef, _) | (_, Lat::Undef) => Lat::Undef,
                        _ => Lat::Varying,
                    };
                    (self.set(dst, lat), None)
                }
                InstData::Branch {
                    cond,
                    args,
                    then_dest,
                    else_dest,
                } => match (self.operand(func, args[0]), self.operand(func, args[1])) {
                    (Lat::Const(a), Lat::Const(b)) => {
                        let dest = if cond.eval(a, b) { then_dest } else { else_dest };
                        let block = func.layout.inst_block(inst).unwrap();
                        (PropStatus::Interesting, cfg.find_edge(block, dest))
                    }
                    (Lat::Undef, _) | (_, Lat::Undef) => (PropStatus::NotInteresting, None),
                    _ => (PropStatus::Varying, None),
                },
                _ => (PropStatus::Varying, None),
            }
        }

        fn visit_phi(&mut self, func: &Function, cfg: &ControlFlowGraph, phi: Inst) -> PropStatus {
            self.visits += 1;
            let InstData::Phi { dst, ref args } = *func.inst(phi) else {
                unreachable!()
            };
            let block = func.layout.inst_block(phi).unwrap();
            let mut lat = Lat::Undef;
            for &(pred, arg) in args {
                let edge = cfg.find_edge(pred, block).unwrap();
                if cfg.flags(edge).contains(EdgeFlags::EXECUTABLE) {
                    lat = lat.meet(self.operand(func, arg));
                }
            }
            self.set(dst, lat)
        }
    }

    fn run(func: &Function, client: &mut ConstProp) -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        ssa_propagate(func, &mut cfg, &domtree, client);
        cfg
    }

    #[test]
    fn folded_branch() {
        crate::test_utils::init_logging();
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        let block3 = func.dfg.make_block();

        let mut cur = FuncCursor::new(&mut func);
        cur.insert_block(block0);
        let one = cur.func.iconst(i32t, 1);
        cur.ins().branch(IntCC::Equal, one, one, block1, block2);
        cur.insert_block(block1);
        let five = cur.func.iconst(i32t, 5);
        let a = cur.ins().copy(i32t, five);
        cur.ins().jump(block3);
        cur.insert_block(block2);
        let seven = cur.func.iconst(i32t, 7);
        let b = cur.ins().copy(i32t, seven);
        cur.ins().jump(block3);
        cur.insert_block(block3);
        let p = cur.ins().phi(i32t, [(block1, Operand::Value(a)), (block2, Operand::Value(b))]);
        cur.ins().ret(Some(RetVal::Operand(p.into())));

        let mut cp = ConstProp::default();
        let cfg = run(&func, &mut cp);
        assert_eq!(cp.values[a], Lat::Const(5));
        assert_eq!(cp.values[b], Lat::Undef);
        assert_eq!(cp.values[p], Lat::Const(5));
        let dead = cfg.find_edge(block0, block2).unwrap();
        assert!(!cfg.flags(dead).contains(EdgeFlags::EXECUTABLE));
        let live = cfg.find_edge(block1, block3).unwrap();
        assert!(cfg.flags(live).contains(EdgeFlags::EXECUTABLE));
    }

    #[test]
    fn loop_reaches_fixed_point() {
        crate::test_utils::init_logging();
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let block0 = func.dfg.make_block();
        let block1 = func.dfg.make_block();
        let block2 = func.dfg.make_block();
        let block3 = func.dfg.make_block();

        let mut cur = FuncCursor::new(&mut func);
        cur.insert_block(block0);
        cur.ins().jump(block1);
        cur.insert_block(block1);
        let zero = cur.func.iconst(i32t, 0);
        let i = cur.ins().phi(i32t, [(block0, zero)]);
        let ten = cur.func.iconst(i32t, 10);
        cur.ins().branch(IntCC::LessThan, i, ten, block2, block3);
        cur.insert_block(block2);
        let one = cur.func.iconst(i32t, 1);
        let j = cur.ins().binary(BinaryOp::Add, i32t, i, one);
        cur.ins().jump(block1);
        cur.insert_block(block3);
        cur.ins().ret(Some(RetVal::Operand(i.into())));

        let phi = func.dfg.value_inst(i).unwrap();
        if let InstData::Phi { args, .. } = &mut func.dfg.insts[phi] {
            args.push((block2, Operand::Value(j)));
        }

        let mut cp = ConstProp::default();
        let cfg = run(&func, &mut cp);
        assert_eq!(cp.values[i], Lat::Varying);
        assert_eq!(cp.values[j], Lat::Varying);
        for edge in cfg.edges() {
            assert!(cfg.flags(edge).contains(EdgeFlags::EXECUTABLE));
        }
        // Every statement settles after a bounded number of visits.
        assert!(cp.visits <= 3 * func.dfg.num_insts(), "{} visits", cp.visits);
    }
}
