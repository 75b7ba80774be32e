//! A control flow graph represented as mappings of basic blocks to their predecessor and
//! successor edges.
//!
//! Edges are first-class entities: every `(src, dst)` pair of blocks connected by a terminator has
//! exactly one [`Edge`], carrying [`EdgeFlags`]. Analyses attach facts to edges (executability,
//! back-edge-ness, assertions inserted on the edge), and critical edges can be split to get a
//! block to put code on.

use crate::cursor::FuncCursor;
use crate::entity::{PrimaryMap, SecondaryMap, entity_impl};
use crate::ir::{Block, Function};
use crate::timing;
use bitflags::bitflags;
use smallvec::SmallVec;

/// An opaque reference to a CFG edge.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge(u32);
entity_impl!(Edge, "edge");

bitflags! {
    /// Flags attached to a CFG edge.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EdgeFlags: u8 {
        /// The edge may be taken at run time, as far as propagation knows.
        const EXECUTABLE = 1 << 0;
        /// The edge is a back edge of a depth-first search from the entry block.
        const DFS_BACK = 1 << 1;
    }
}

/// Data of a CFG edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeData {
    /// The block whose terminator branches.
    pub src: Block,
    /// The branch destination.
    pub dst: Block,
    /// Flags.
    pub flags: EdgeFlags,
}

/// A container for the successors and predecessors of some block.
#[derive(Clone, Default)]
struct CfgNode {
    /// Incoming edges, in the order the edges were discovered.
    preds: SmallVec<[Edge; 2]>,
    /// Outgoing edges, in terminator order.
    succs: SmallVec<[Edge; 2]>,
}

/// The Control Flow Graph maintains a mapping of blocks to their predecessor and successor
/// edges, where each edge is unique per pair of blocks.
pub struct ControlFlowGraph {
    edges: PrimaryMap<Edge, EdgeData>,
    nodes: SecondaryMap<Block, CfgNode>,
    valid: bool,
}

impl ControlFlowGraph {
    /// Allocate a new blank control flow graph.
    pub fn new() -> Self {
        Self {
            edges: PrimaryMap::new(),
            nodes: SecondaryMap::new(),
            valid: false,
        }
    }

    /// Clear all data structures in this control flow graph.
    pub fn clear(&mut self) {
        self.edges.clear();
        self.nodes.clear();
        self.valid = false;
    }

    /// Allocate and compute the control flow graph for `func`.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Compute the control flow graph of `func`.
    ///
    /// This will clear and overwrite any information already stored in this data structure.
    pub fn compute(&mut self, func: &Function) {
        let _tt = timing::flowgraph();
        self.clear();
        self.nodes.resize(func.dfg.num_blocks());

        for block in func.layout.blocks() {
            for dst in func.block_successors(block) {
                self.add_edge(block, dst);
            }
        }

        self.valid = true;
    }

    fn add_edge(&mut self, src: Block, dst: Block) -> Edge {
        let edge = self.edges.push(EdgeData {
            src,
            dst,
            flags: EdgeFlags::empty(),
        });
        self.nodes[src].succs.push(edge);
        self.nodes[dst].preds.push(edge);
        edge
    }

    /// Check if the CFG is in a valid state.
    ///
    /// This only checks that `compute()` has been called since the last `clear()`.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Get the data of `edge`.
    pub fn edge(&self, edge: Edge) -> &EdgeData {
        &self.edges[edge]
    }

    /// The flags of `edge`.
    pub fn flags(&self, edge: Edge) -> EdgeFlags {
        self.edges[edge].flags
    }

    /// Set or clear `flags` on `edge`.
    pub fn set_flags(&mut self, edge: Edge, flags: EdgeFlags, value: bool) {
        self.edges[edge].flags.set(flags, value);
    }

    /// Iterate over all the edges.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.keys()
    }

    /// The number of edges, including edges of blocks no longer in the graph.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Incoming edges of `block`.
    pub fn preds(&self, block: Block) -> &[Edge] {
        &self.nodes[block].preds
    }

    /// Outgoing edges of `block`.
    pub fn succs(&self, block: Block) -> &[Edge] {
        &self.nodes[block].succs
    }

    /// Get an iterator over the CFG predecessors of `block`.
    pub fn pred_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.nodes[block].preds.iter().map(|&e| self.edges[e].src)
    }

    /// Get an iterator over the CFG successors of `block`.
    pub fn succ_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.nodes[block].succs.iter().map(|&e| self.edges[e].dst)
    }

    /// The edge from `src` to `dst`, if any.
    pub fn find_edge(&self, src: Block, dst: Block) -> Option<Edge> {
        self.nodes[src]
            .succs
            .iter()
            .copied()
            .find(|&e| self.edges[e].dst == dst)
    }

    /// Is `edge` the only edge out of its source block?
    pub fn is_single_succ(&self, edge: Edge) -> bool {
        self.succs(self.edges[edge].src).len() == 1
    }

    /// Is `edge` the only edge into its destination block?
    pub fn is_single_pred(&self, edge: Edge) -> bool {
        self.preds(self.edges[edge].dst).len() == 1
    }

    /// A critical edge leaves a block with several successors and enters a block with several
    /// predecessors. Code can only be placed on it by splitting it.
    pub fn is_critical(&self, edge: Edge) -> bool {
        !self.is_single_succ(edge) && !self.is_single_pred(edge)
    }

    /// Split `edge` by inserting a forwarding block, and return the new block.
    ///
    /// The terminator of the source block is retargeted to the new block, and PHI arguments in
    /// the destination refer to the new block. `edge` keeps connecting the source to the new
    /// block; a new edge with the same flags connects the new block to the destination.
    pub fn split_edge(&mut self, func: &mut Function, edge: Edge) -> Block {
        let EdgeData { src, dst, flags } = self.edges[edge];
        let new_block = func.dfg.make_block();

        let term = func.terminator(src).expect("edge source has a terminator");
        func.dfg.insts[term].retarget(dst, new_block);
        let phis: SmallVec<[_; 4]> = func.block_phis(dst).collect();
        for phi in phis {
            func.dfg.insts[phi].retarget(src, new_block);
        }

        let mut pos = FuncCursor::new(func).at_bottom(src);
        pos.insert_block(new_block);
        pos.ins().jump(dst);

        self.nodes.resize(func.dfg.num_blocks());
        self.edges[edge].dst = new_block;
        self.nodes[new_block].preds.push(edge);
        let out = self.edges.push(EdgeData {
            src: new_block,
            dst,
            flags,
        });
        self.nodes[new_block].succs.push(out);
        for e in self.nodes[dst].preds.iter_mut() {
            if *e == edge {
                *e = out;
            }
        }
        crate::trace!("split {} -> {} with {}", src, dst, new_block);
        new_block
    }

    /// Compute the `DFS_BACK` flag of every edge with a depth-first search from the entry block,
    /// and return true if any back edge exists.
    pub fn mark_dfs_back_edges(&mut self, func: &Function) -> bool {
        #[derive(Clone, Copy, Default, PartialEq, Eq)]
        enum State {
            #[default]
            Unseen,
            OnStack,
            Done,
        }

        for data in self.edges.values_mut() {
            data.flags.remove(EdgeFlags::DFS_BACK);
        }
        let Some(entry) = func.layout.entry_block() else {
            return false;
        };

        let mut state: SecondaryMap<Block, State> = SecondaryMap::new();
        let mut found = false;
        // Each stack entry is a block and the index of the next outgoing edge to visit.
        let mut stack: Vec<(Block, usize)> = vec![(entry, 0)];
        state[entry] = State::OnStack;
        while let Some(top) = stack.last_mut() {
            let block = top.0;
            match self.nodes[block].succs.get(top.1).copied() {
                Some(edge) => {
                    top.1 += 1;
                    let dst = self.edges[edge].dst;
                    match state[dst] {
                        State::Unseen => {
                            state[dst] = State::OnStack;
                            stack.push((dst, 0));
                        }
                        State::OnStack => {
                            self.edges[edge].flags.insert(EdgeFlags::DFS_BACK);
                            found = true;
                        }
                        State::Done => {}
                    }
                }
                None => {
                    state[block] = State::Done;
                    stack.pop();
                }
            }
        }
        found
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
