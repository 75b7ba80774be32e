//! Memory SSA: SSA form for the single virtual memory variable.
//!
//! Every statement reading memory has a *virtual use* of the memory state live before it, and
//! every statement writing memory additionally defines a new state, its *virtual definition*. At
//! control flow joins of different states, memory PHIs merge them. The state live at function
//! entry belongs to no statement.
//!
//! PHIs are placed at the iterated dominance frontier of the blocks containing memory writes,
//! and states are renamed by a walk over the dominator tree.

use crate::dominator_tree::{DominatorTree, DominatorTreePreorder};
use crate::entity::{PrimaryMap, SecondaryMap};
use crate::flowgraph::ControlFlowGraph;
use crate::fx::FxHashSet;
use crate::ir::{Block, Function, Inst, MemState};
use crate::packed_option::PackedOption;
use crate::result::{MidendError, MidendResult};
use crate::timing;
use core::fmt;
use smallvec::SmallVec;

/// Where a memory state is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemStateDef {
    /// The state at function entry.
    Entry,
    /// The virtual definition of a memory-writing instruction.
    Inst(Inst),
    /// The memory PHI of a block.
    Phi(Block),
}

/// A use of a memory state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemUser {
    /// The virtual use of an instruction.
    Inst(Inst),
    /// An argument of the memory PHI of a block.
    Phi(Block),
}

/// A memory PHI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemPhi {
    /// The state defined by the PHI.
    pub state: PackedOption<MemState>,
    /// Incoming states, one per reachable predecessor.
    pub args: SmallVec<[(Block, MemState); 2]>,
}

#[derive(Clone, Debug)]
struct MemStateData {
    def: MemStateDef,
    uses: SmallVec<[MemUser; 4]>,
}

/// Memory SSA form of a function.
pub struct MemSsa {
    states: PrimaryMap<MemState, MemStateData>,
    vuse: SecondaryMap<Inst, PackedOption<MemState>>,
    vdef: SecondaryMap<Inst, PackedOption<MemState>>,
    phis: SecondaryMap<Block, Option<MemPhi>>,
    entry: MemState,
}

impl MemSsa {
    /// Build memory SSA for `func`.
    ///
    /// The CFG and dominator tree must be up to date.
    pub fn build(
        func: &Function,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
    ) -> MidendResult<Self> {
        let _tt = timing::mem_ssa();
        let entry_block = func.layout.entry_block().ok_or(MidendError::MissingEntry)?;

        let mut states = PrimaryMap::new();
        let entry = states.push(MemStateData {
            def: MemStateDef::Entry,
            uses: SmallVec::new(),
        });
        let mut ssa = Self {
            states,
            vuse: SecondaryMap::new(),
            vdef: SecondaryMap::new(),
            phis: SecondaryMap::new(),
            entry,
        };

        ssa.place_phis(func, cfg, domtree);
        ssa.rename(func, cfg, domtree, entry_block);
        log::debug!(
            "memory SSA for {}: {} states",
            func.name,
            ssa.states.len()
        );
        Ok(ssa)
    }

    fn place_phis(&mut self, func: &Function, cfg: &ControlFlowGraph, domtree: &DominatorTree) {
        // Dominance frontiers, as in Cooper, Harvey and Kennedy, "A Simple, Fast Dominance
        // Algorithm".
        let mut frontiers: SecondaryMap<Block, SmallVec<[Block; 2]>> = SecondaryMap::new();
        for &block in domtree.cfg_postorder() {
            let preds: SmallVec<[Block; 4]> = cfg
                .pred_iter(block)
                .filter(|&p| domtree.is_reachable(p))
                .collect();
            if preds.len() < 2 {
                continue;
            }
            let idom = domtree.idom(block);
            for pred in preds {
                let mut runner = Some(pred);
                while let Some(r) = runner {
                    if Some(r) == idom {
                        break;
                    }
                    if !frontiers[r].contains(&block) {
                        frontiers[r].push(block);
                    }
                    runner = domtree.idom(r);
                }
            }
        }

        let mut worklist: Vec<Block> = domtree
            .cfg_postorder()
            .iter()
            .copied()
            .filter(|&block| {
                func.layout
                    .block_insts(block)
                    .any(|inst| func.dfg.insts[inst].writes_memory())
            })
            .collect();
        let mut has_phi = FxHashSet::default();
        while let Some(block) = worklist.pop() {
            for &df in frontiers[block].iter() {
                if has_phi.insert(df) {
                    let state = self.states.push(MemStateData {
                        def: MemStateDef::Phi(df),
                        uses: SmallVec::new(),
                    });
                    self.phis[df] = Some(MemPhi {
                        state: state.into(),
                        args: SmallVec::new(),
                    });
                    worklist.push(df);
                }
            }
        }
    }

    fn rename(
        &mut self,
        func: &Function,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
        entry_block: Block,
    ) {
        let dtpo = DominatorTreePreorder::with_domtree(domtree);
        // Each stack entry is a block and the state live on entry to it.
        let mut stack = vec![(entry_block, self.entry)];
        while let Some((block, incoming)) = stack.pop() {
            let mut current = match &self.phis[block] {
                Some(phi) => phi.state.expect("placed phi has a state"),
                None => incoming,
            };
            for inst in func.layout.block_insts(block) {
                let data = &func.dfg.insts[inst];
                let writes = data.writes_memory();
                if writes || data.reads_memory() {
                    self.vuse[inst] = current.into();
                    self.states[current].uses.push(MemUser::Inst(inst));
                }
                if writes {
                    current = self.states.push(MemStateData {
                        def: MemStateDef::Inst(inst),
                        uses: SmallVec::new(),
                    });
                    self.vdef[inst] = current.into();
                }
            }
            for succ in cfg.succ_iter(block) {
                if let Some(phi) = &mut self.phis[succ] {
                    phi.args.push((block, current));
                    self.states[current].uses.push(MemUser::Phi(succ));
                }
            }
            for child in dtpo.children(block) {
                stack.push((child, current));
            }
        }
    }

    /// The state at function entry.
    pub fn entry_state(&self) -> MemState {
        self.entry
    }

    /// Is `state` the function entry state?
    pub fn is_entry(&self, state: MemState) -> bool {
        state == self.entry
    }

    /// The number of memory states.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// The memory state used by `inst`, if it accesses memory.
    pub fn vuse(&self, inst: Inst) -> Option<MemState> {
        self.vuse[inst].expand()
    }

    /// The memory state defined by `inst`, if it writes memory.
    pub fn vdef(&self, inst: Inst) -> Option<MemState> {
        self.vdef[inst].expand()
    }

    /// Where `state` is defined.
    pub fn def(&self, state: MemState) -> MemStateDef {
        self.states[state].def
    }

    /// The instruction defining `state`, if it is a virtual definition.
    pub fn def_inst(&self, state: MemState) -> Option<Inst> {
        match self.states[state].def {
            MemStateDef::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    /// The uses of `state`.
    pub fn uses(&self, state: MemState) -> &[MemUser] {
        &self.states[state].uses
    }

    /// The memory PHI of `block`, if any.
    pub fn phi(&self, block: Block) -> Option<&MemPhi> {
        self.phis[block].as_ref()
    }

    /// The block where `state` is defined.
    pub fn def_block(&self, state: MemState, func: &Function) -> Option<Block> {
        match self.states[state].def {
            MemStateDef::Entry => func.layout.entry_block(),
            MemStateDef::Inst(inst) => func.layout.inst_block(inst),
            MemStateDef::Phi(block) => Some(block),
        }
    }

    /// Does the definition of `a` dominate the definition of `b`?
    ///
    /// The entry state dominates everything; a PHI dominates the instructions of its block.
    pub fn def_dominates(
        &self,
        a: MemState,
        b: MemState,
        func: &Function,
        domtree: &DominatorTree,
    ) -> bool {
        match (self.def(a), self.def(b)) {
            (MemStateDef::Entry, _) => true,
            (_, MemStateDef::Entry) => false,
            (MemStateDef::Inst(ia), MemStateDef::Inst(ib)) => {
                domtree.dominates(ia, ib, &func.layout)
            }
            (MemStateDef::Phi(ba), MemStateDef::Inst(ib)) => {
                domtree.dominates(ba, ib, &func.layout)
            }
            (MemStateDef::Inst(ia), MemStateDef::Phi(bb)) => {
                domtree.dominates(ia, bb, &func.layout)
            }
            (MemStateDef::Phi(ba), MemStateDef::Phi(bb)) => domtree.block_dominates(ba, bb),
        }
    }

    /// Return an object that can display the memory SSA annotations of `func`.
    pub fn display<'a>(&'a self, func: &'a Function) -> DisplayMemSsa<'a> {
        DisplayMemSsa { ssa: self, func }
    }
}

/// Wrapper type capable of displaying the memory SSA form of a function.
pub struct DisplayMemSsa<'a> {
    ssa: &'a MemSsa,
    func: &'a Function,
}

impl fmt::Display for DisplayMemSsa<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for block in self.func.layout.blocks() {
            writeln!(f, "{block}:")?;
            if let Some(phi) = self.ssa.phi(block) {
                match phi.state.expand() {
                    Some(state) => write!(f, "    {state} = mem_phi")?,
                    None => write!(f, "    mem_phi")?,
                }
                for (i, (pred, state)) in phi.args.iter().enumerate() {
                    write!(f, "{} {pred}: {state}", if i == 0 { "" } else { "," })?;
                }
                writeln!(f)?;
            }
            for inst in self.func.layout.block_insts(block) {
                write!(f, "    ")?;
                if let Some(def) = self.ssa.vdef(inst) {
                    write!(f, "{def} = ")?;
                }
                if let Some(vuse) = self.ssa.vuse(inst) {
                    write!(f, "[{vuse}] ")?;
                }
                writeln!(f, "{}", self.func.dfg.insts[inst])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::{IntCC, MemRef, VarData};

    #[test]
    fn loop_phi() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let n = func.declare_param("n", i32t);
        let a = func.declare_var(VarData::local("a", i32t).address_taken());
        let entry = func.dfg.make_block();
        let header = func.dfg.make_block();
        let body = func.dfg.make_block();
        let exit = func.dfg.make_block();

        let mut cur = FuncCursor::new(&mut func);
        cur.insert_block(entry);
        let zero = cur.func.iconst(i32t, 0);
        let init = cur.ins().store(MemRef::var(a), zero);
        cur.ins().jump(header);
        cur.insert_block(header);
        cur.ins().branch(IntCC::LessThan, n, zero, body, exit);
        cur.insert_block(body);
        let update = cur.ins().store(MemRef::var(a), n);
        cur.ins().jump(header);
        cur.insert_block(exit);
        let v = cur.ins().load(i32t, MemRef::var(a));
        cur.ins().ret(None);

        let cfg = ControlFlowGraph::with_function(&func);
        let domtree = DominatorTree::with_function(&func, &cfg);
        let ssa = MemSsa::build(&func, &cfg, &domtree).unwrap();

        assert_eq!(ssa.vuse(init), Some(ssa.entry_state()));
        let s_init = ssa.vdef(init).unwrap();
        let phi = ssa.phi(header).unwrap();
        let s_phi = phi.state.unwrap();
        assert_eq!(ssa.def(s_phi), MemStateDef::Phi(header));
        assert_eq!(ssa.vuse(update), Some(s_phi));
        let s_update = ssa.vdef(update).unwrap();
        assert_eq!(phi.args.as_slice(), &[(entry, s_init), (body, s_update)]);

        let load = func.dfg.value_inst(v).unwrap();
        assert_eq!(ssa.vuse(load), Some(s_phi));
        assert_eq!(ssa.vdef(load), None);
        assert!(ssa.uses(s_phi).contains(&MemUser::Inst(load)));
        assert!(ssa.uses(s_update).contains(&MemUser::Phi(header)));
        assert!(ssa.def_dominates(s_init, s_update, &func, &domtree));
        assert!(!ssa.def_dominates(s_update, s_phi, &func, &domtree));
        assert!(ssa.phi(body).is_none());
        assert!(ssa.phi(exit).is_none());

        let text = ssa.display(&func).to_string();
        assert!(text.contains(&format!(
            "{header}:\n    {s_phi} = mem_phi {entry}: {s_init}, {body}: {s_update}\n"
        )));
        assert!(text.contains(&format!("    {s_init} = [{}] ", ssa.entry_state())));
        assert!(text.contains(&format!("    [{s_phi}] ")));
    }

    #[test]
    fn missing_entry() {
        let func = Function::new();
        let cfg = ControlFlowGraph::with_function(&func);
        let domtree = DominatorTree::with_function(&func, &cfg);
        assert_eq!(
            MemSsa::build(&func, &cfg, &domtree).err(),
            Some(MidendError::MissingEntry)
        );
    }
}
