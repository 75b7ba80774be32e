//! A dominator tree represented as mappings of blocks to their immediate dominator.

use crate::entity::SecondaryMap;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function, Layout, ProgramPoint};
use crate::packed_option::PackedOption;
use crate::timing;
use core::cmp::{self, Ordering};
use core::mem;

/// Spanning tree node, used during domtree computation.
#[derive(Clone, Default)]
struct SpanningTreeNode {
    /// This node's block in the CFG.
    block: PackedOption<Block>,
    /// Node's ancestor in the spanning tree. Invalidated during semi-dominator computation.
    ancestor: u32,
    /// The smallest semi value discovered on any semi-dominator path through the node so far.
    label: u32,
    /// Semi-dominator value for the node.
    semi: u32,
    /// Immediate dominator value for the node, initialized to the node's ancestor.
    idom: u32,
}

/// DFS preorder number for unvisited nodes and the virtual root in the spanning tree.
const NOT_VISITED: u32 = 0;

/// Spanning tree in CFG preorder. Node 0 is a virtual root without a block.
#[derive(Clone)]
struct SpanningTree {
    nodes: Vec<SpanningTreeNode>,
}

impl SpanningTree {
    fn new() -> Self {
        Self {
            nodes: vec![Default::default()],
        }
    }

    fn len(&self) -> u32 {
        self.nodes.len() as u32
    }

    fn clear(&mut self) {
        self.nodes.truncate(1);
    }

    /// Returns the preorder number of the new node.
    fn push(&mut self, ancestor: u32, block: Block) -> u32 {
        let pre_number = self.len();
        self.nodes.push(SpanningTreeNode {
            block: block.into(),
            ancestor,
            label: pre_number,
            semi: pre_number,
            idom: ancestor,
        });
        pre_number
    }
}

impl core::ops::Index<u32> for SpanningTree {
    type Output = SpanningTreeNode;

    fn index(&self, idx: u32) -> &Self::Output {
        &self.nodes[idx as usize]
    }
}

impl core::ops::IndexMut<u32> for SpanningTree {
    fn index_mut(&mut self, idx: u32) -> &mut Self::Output {
        &mut self.nodes[idx as usize]
    }
}

/// Traversal event computing both the preorder spanning tree and the postorder block list.
enum TraversalEvent {
    Enter(u32, Block),
    Exit(Block),
}

/// Dominator tree node. We keep one of these per block.
#[derive(Clone, Default)]
struct DominatorTreeNode {
    /// Immediate dominator for the block, `None` for unreachable blocks and the entry.
    idom: PackedOption<Block>,
    /// Preorder traversal number, zero for unreachable blocks.
    pre_number: u32,
}

/// The dominator tree for a single function, computed using the Semi-NCA algorithm.
pub struct DominatorTree {
    stree: SpanningTree,
    /// CFG blocks in postorder.
    postorder: Vec<Block>,
    nodes: SecondaryMap<Block, DominatorTreeNode>,

    dfs_worklist: Vec<TraversalEvent>,
    eval_worklist: Vec<u32>,

    valid: bool,
}

/// Methods for querying the dominator tree.
impl DominatorTree {
    /// Is `block` reachable from the entry block?
    pub fn is_reachable(&self, block: Block) -> bool {
        self.nodes[block].pre_number != NOT_VISITED
    }

    /// Get the CFG post-order of blocks that was used to compute the dominator tree.
    ///
    /// The post-order is not updated when the CFG is modified.
    pub fn cfg_postorder(&self) -> &[Block] {
        debug_assert!(self.is_valid());
        &self.postorder
    }

    /// Get an iterator over the CFG reverse post-order of blocks.
    pub fn cfg_rpo(&self) -> impl Iterator<Item = &Block> {
        debug_assert!(self.is_valid());
        self.postorder.iter().rev()
    }

    /// Returns the immediate dominator of `block`.
    ///
    /// This returns `None` if `block` is not reachable from the entry block, or if it is the
    /// entry block which has no dominators.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes[block].idom.into()
    }

    /// Returns `true` if `a` dominates `b`.
    ///
    /// This means that every control-flow path from the function entry to `b` must go through
    /// `a`. Dominance is ill defined for unreachable blocks; this returns `false` if either block
    /// is unreachable, except for instructions in the same block.
    ///
    /// Instructions and blocks dominate themselves.
    pub fn dominates<A, B>(&self, a: A, b: B, layout: &Layout) -> bool
    where
        A: Into<ProgramPoint>,
        B: Into<ProgramPoint>,
    {
        let a = a.into();
        let b = b.into();
        let block_b = layout.pp_block(b);
        match a {
            ProgramPoint::Block(block_a) => self.block_dominates(block_a, block_b),
            ProgramPoint::Inst(_) => {
                let block_a = layout.pp_block(a);
                if block_a == block_b {
                    layout.pp_cmp(a, b) != Ordering::Greater
                } else {
                    self.block_dominates(block_a, block_b)
                }
            }
        }
    }

    /// Returns `true` if `block_a` dominates `block_b`. A block dominates itself.
    pub fn block_dominates(&self, block_a: Block, mut block_b: Block) -> bool {
        let pre_a = self.nodes[block_a].pre_number;

        // Run a finger up the dominator tree from b until we see a.
        while pre_a < self.nodes[block_b].pre_number {
            match self.idom(block_b) {
                Some(idom) => block_b = idom,
                None => return false,
            }
        }

        block_a == block_b
    }
}

impl DominatorTree {
    /// Allocate a new blank dominator tree. Use `compute` to compute the dominator tree for a
    /// function.
    pub fn new() -> Self {
        Self {
            stree: SpanningTree::new(),
            nodes: SecondaryMap::new(),
            postorder: Vec::new(),
            dfs_worklist: Vec::new(),
            eval_worklist: Vec::new(),
            valid: false,
        }
    }

    /// Allocate and compute a dominator tree.
    pub fn with_function(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut domtree = Self::new();
        domtree.compute(func, cfg);
        domtree
    }

    /// Reset and compute a CFG post-order and dominator tree using the Semi-NCA algorithm:
    ///
    /// Linear-Time Algorithms for Dominators and Related Problems.
    /// Loukas Georgiadis, Princeton University, November 2005.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        let _tt = timing::domtree();
        debug_assert!(cfg.is_valid());

        self.clear();
        self.compute_spanning_tree(func);
        self.compute_domtree(cfg);

        self.valid = true;
    }

    /// Clear the data structures used to represent the dominator tree.
    pub fn clear(&mut self) {
        self.stree.clear();
        self.nodes.clear();
        self.postorder.clear();
        self.valid = false;
    }

    /// Check if `compute()` has been called since the last `clear()`.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    fn compute_spanning_tree(&mut self, func: &Function) {
        self.nodes.resize(func.dfg.num_blocks());

        if let Some(block) = func.layout.entry_block() {
            self.dfs_worklist.push(TraversalEvent::Enter(0, block));
        }

        while let Some(event) = self.dfs_worklist.pop() {
            match event {
                TraversalEvent::Enter(parent, block) => {
                    if self.nodes[block].pre_number != NOT_VISITED {
                        continue;
                    }
                    self.dfs_worklist.push(TraversalEvent::Exit(block));
                    let pre_number = self.stree.push(parent, block);
                    self.nodes[block].pre_number = pre_number;

                    // Chase successors in reverse so the first successor comes first in the
                    // postorder.
                    for succ in func.block_successors(block).into_iter().rev() {
                        if self.nodes[succ].pre_number == NOT_VISITED {
                            self.dfs_worklist
                                .push(TraversalEvent::Enter(pre_number, succ));
                        }
                    }
                }
                TraversalEvent::Exit(block) => self.postorder.push(block),
            }
        }
    }

    /// Eval-link procedure: for a predecessor `v` of node `w`, return `v` if `v < w`, otherwise
    /// the minimum semi-dominator of nodes above `w` on a semi-dominator path, with path
    /// compression.
    fn eval(&mut self, v: u32, last_linked: u32) -> u32 {
        if self.stree[v].ancestor < last_linked {
            return self.stree[v].label;
        }

        let mut root = v;
        loop {
            self.eval_worklist.push(root);
            root = self.stree[root].ancestor;
            if self.stree[root].ancestor < last_linked {
                break;
            }
        }

        let mut prev = root;
        let root = self.stree[prev].ancestor;
        while let Some(curr) = self.eval_worklist.pop() {
            if self.stree[prev].label < self.stree[curr].label {
                self.stree[curr].label = self.stree[prev].label;
            }
            self.stree[curr].ancestor = root;
            prev = curr;
        }

        self.stree[v].label
    }

    fn compute_domtree(&mut self, cfg: &ControlFlowGraph) {
        // Semi-dominators.
        for w in (1..self.stree.len()).rev() {
            let block = self.stree[w].block.expect("virtual root excluded");
            let mut semi = self.stree[w].ancestor;
            let last_linked = w + 1;

            for pred in cfg.pred_iter(block) {
                let pre = self.nodes[pred].pre_number;
                if pre == NOT_VISITED {
                    continue;
                }
                semi = cmp::min(semi, self.eval(pre, last_linked));
            }

            self.stree[w].label = semi;
            self.stree[w].semi = semi;
        }

        // Immediate dominators.
        for v in 1..self.stree.len() {
            let semi = self.stree[v].semi;
            let block = self.stree[v].block.expect("virtual root excluded");
            let mut idom = self.stree[v].idom;
            while idom > semi {
                idom = self.stree[idom].idom;
            }
            self.stree[v].idom = idom;
            self.nodes[block].idom = self.stree[idom].block;
        }
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-order information computed for a dominator tree.
///
/// Provides a forward traversable dominator tree through `children()`, an ordering of blocks
/// according to a dominator tree pre-order, and constant time block dominance checks.
pub struct DominatorTreePreorder {
    nodes: SecondaryMap<Block, ExtraNode>,
    stack: Vec<Block>,
}

#[derive(Default, Clone)]
struct ExtraNode {
    /// First child node in the domtree.
    child: PackedOption<Block>,
    /// Next sibling node in the domtree, ordered according to the CFG RPO.
    sibling: PackedOption<Block>,
    /// Dominator tree pre-order number. Unreachable blocks have number 0, the entry block is 1.
    pre_number: u32,
    /// Maximum `pre_number` in the sub-tree rooted at this node.
    pre_max: u32,
}

impl DominatorTreePreorder {
    /// Create a new blank `DominatorTreePreorder`.
    pub fn new() -> Self {
        Self {
            nodes: SecondaryMap::new(),
            stack: Vec::new(),
        }
    }

    /// Allocate and compute the pre-order of `domtree`.
    pub fn with_domtree(domtree: &DominatorTree) -> Self {
        let mut dtpo = Self::new();
        dtpo.compute(domtree);
        dtpo
    }

    /// Recompute this data structure to match `domtree`.
    pub fn compute(&mut self, domtree: &DominatorTree) {
        self.nodes.clear();

        // Following the CFG post-order and pushing to the front of the sibling lists orders them
        // according to the CFG reverse post-order.
        for &block in domtree.cfg_postorder() {
            if let Some(idom) = domtree.idom(block) {
                let sib = mem::replace(&mut self.nodes[idom].child, block.into());
                self.nodes[block].sibling = sib;
            } else {
                self.stack.push(block);
            }
        }

        debug_assert!(self.stack.len() <= 1);
        let mut n = 0;
        while let Some(block) = self.stack.pop() {
            n += 1;
            let node = &mut self.nodes[block];
            node.pre_number = n;
            node.pre_max = n;
            if let Some(n) = node.sibling.expand() {
                self.stack.push(n);
            }
            if let Some(n) = node.child.expand() {
                self.stack.push(n);
            }
        }

        // A node comes after all its dominator tree children in the CFG post-order.
        for &block in domtree.cfg_postorder() {
            if let Some(idom) = domtree.idom(block) {
                let pre_max = cmp::max(self.nodes[block].pre_max, self.nodes[idom].pre_max);
                self.nodes[idom].pre_max = pre_max;
            }
        }
    }

    /// Get an iterator over the direct children of `block` in the dominator tree, in CFG reverse
    /// post-order.
    pub fn children(&self, block: Block) -> ChildIter<'_> {
        ChildIter {
            dtpo: self,
            next: self.nodes[block].child,
        }
    }

    /// Constant time dominance check with block granularity. A block dominates itself.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let na = &self.nodes[a];
        let nb = &self.nodes[b];
        na.pre_number != NOT_VISITED
            && na.pre_number <= nb.pre_number
            && na.pre_max >= nb.pre_max
    }

    /// Compare two blocks according to the dominator pre-order.
    pub fn pre_cmp_block(&self, a: Block, b: Block) -> Ordering {
        self.nodes[a].pre_number.cmp(&self.nodes[b].pre_number)
    }
}

impl Default for DominatorTreePreorder {
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator that enumerates the direct children of a block in the dominator tree.
pub struct ChildIter<'a> {
    dtpo: &'a DominatorTreePreorder,
    next: PackedOption<Block>,
}

impl Iterator for ChildIter<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let n = self.next.expand();
        if let Some(block) = n {
            self.next = self.dtpo.nodes[block].sibling;
        }
        n
    }
}
