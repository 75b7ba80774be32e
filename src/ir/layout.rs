//! Function layout.
//!
//! The order of basic blocks in a function and the order of instructions in a block is
//! determined by the `Layout` data structure defined in this module.

use crate::entity::SecondaryMap;
use crate::entity::packed_option::PackedOption;
use crate::ir::progpoint::ProgramPoint;
use crate::ir::{Block, Inst};
use core::cmp;

/// The `Layout` struct determines the layout of blocks and instructions in a function. It does
/// not contain definitions of instructions or blocks, but depends on `Inst` and `Block` entity
/// references being defined elsewhere.
///
/// This data structure determines:
///
/// - The order of blocks in the function.
/// - Which block contains a given instruction.
/// - The order of instructions with a block.
///
/// While data dependencies are not recorded, instruction ordering does affect control
/// dependencies, so part of the semantics of the program are determined by the layout.
#[derive(Clone, Default)]
pub struct Layout {
    // Linked list nodes for the layout order of blocks. Forms a doubly linked list, terminated
    // in both ends by `None`.
    blocks: SecondaryMap<Block, BlockNode>,

    // Linked list nodes for the layout order of instructions. Forms a doubly linked list per
    // block, terminated in both ends by `None`.
    insts: SecondaryMap<Inst, InstNode>,

    // First block in the layout order, or `None` when no blocks have been laid out.
    first_block: Option<Block>,

    // Last block in the layout order, or `None` when no blocks have been laid out.
    last_block: Option<Block>,
}

#[derive(Clone, Debug, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
    inserted: bool,
}

#[derive(Clone, Debug, Default)]
struct InstNode {
    // The block containing this instruction, or `None` if the instruction is not yet inserted.
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
    seq: u32,
}

// Sequence numbers are spaced out so most insertions don't need to renumber.
const SEQ_STRIDE: u32 = 16;

impl Layout {
    /// Create a new empty `Layout`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the program order of two program points in the same block.
    ///
    /// A block header comes before all the instructions in the block.
    pub fn pp_cmp(&self, a: impl Into<ProgramPoint>, b: impl Into<ProgramPoint>) -> cmp::Ordering {
        let key = |pp: ProgramPoint| match pp {
            ProgramPoint::Block(block) => (block, None),
            ProgramPoint::Inst(inst) => (
                self.inst_block(inst).expect("instruction not in layout"),
                Some(self.insts[inst].seq),
            ),
        };
        let (ab, aseq) = key(a.into());
        let (bb, bseq) = key(b.into());
        debug_assert_eq!(ab, bb, "pp_cmp across blocks");
        aseq.cmp(&bseq)
    }

    // Renumber the instructions of `block` with fresh, evenly spaced sequence numbers.
    fn renumber_insts(&mut self, block: Block) {
        let mut seq = SEQ_STRIDE;
        let mut cur = self.blocks[block].first_inst.expand();
        while let Some(inst) = cur {
            self.insts[inst].seq = seq;
            seq += SEQ_STRIDE;
            cur = self.insts[inst].next.expand();
        }
    }

    // Assign a sequence number to `inst`, which was just linked in.
    fn assign_inst_seq(&mut self, inst: Inst) {
        let prev_seq = self.insts[inst].prev.expand().map_or(0, |p| self.insts[p].seq);
        match self.insts[inst].next.expand() {
            None => self.insts[inst].seq = prev_seq + SEQ_STRIDE,
            Some(next) => {
                let next_seq = self.insts[next].seq;
                if next_seq - prev_seq > 1 {
                    self.insts[inst].seq = prev_seq + (next_seq - prev_seq) / 2;
                } else {
                    let block = self.insts[inst].block.expect("inserted instruction");
                    self.renumber_insts(block);
                }
            }
        }
    }
}

/// Methods for laying out blocks.
///
/// An unknown block starts out as *not inserted* in the block layout. The layout is a linear
/// order of inserted blocks. Once a block has been inserted in the layout, instructions can be
/// added. A block can only be removed from the layout when it is empty.
impl Layout {
    /// Is `block` currently part of the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        self.blocks[block].inserted
    }

    /// Insert `block` as the last block in the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot append block that is already in the layout"
        );
        {
            let node = &mut self.blocks[block];
            debug_assert!(node.first_inst.is_none() && node.last_inst.is_none());
            node.prev = self.last_block.into();
            node.next = None.into();
            node.inserted = true;
        }
        if let Some(last) = self.last_block {
            self.blocks[last].next = block.into();
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
    }

    /// Insert `block` in the layout after the existing block `after`.
    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(after),
            "block insertion point not in the layout"
        );
        let before = self.blocks[after].next;
        {
            let node = &mut self.blocks[block];
            node.next = before;
            node.prev = after.into();
            node.inserted = true;
        }
        self.blocks[after].next = block.into();
        match before.expand() {
            None => self.last_block = Some(block),
            Some(b) => self.blocks[b].prev = block.into(),
        }
    }

    /// Remove `block` from the layout.
    pub fn remove_block(&mut self, block: Block) {
        debug_assert!(self.is_block_inserted(block), "block not in the layout");
        debug_assert!(self.first_inst(block).is_none(), "block must be empty.");

        // Clear the `block` node and extract links.
        let prev;
        let next;
        {
            let n = &mut self.blocks[block];
            prev = n.prev;
            next = n.next;
            n.prev = None.into();
            n.next = None.into();
            n.inserted = false;
        }
        // Fix up links to `block`.
        match prev.expand() {
            None => self.first_block = next.expand(),
            Some(p) => self.blocks[p].next = next,
        }
        match next.expand() {
            None => self.last_block = prev.expand(),
            Some(n) => self.blocks[n].prev = prev,
        }
    }

    /// Return an iterator over all blocks in layout order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            layout: self,
            next: self.first_block,
        }
    }

    /// Get the function's entry block.
    /// This is simply the first block in the layout order.
    pub fn entry_block(&self) -> Option<Block> {
        self.first_block
    }

    /// Get the last block in the layout.
    pub fn last_block(&self) -> Option<Block> {
        self.last_block
    }

    /// Get the block preceding `block` in the layout order.
    pub fn prev_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].prev.expand()
    }

    /// Get the block following `block` in the layout order.
    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }
}

/// Iterate over blocks in layout order. See [crate::ir::layout::Layout::blocks].
pub struct Blocks<'f> {
    layout: &'f Layout,
    next: Option<Block>,
}

impl<'f> Iterator for Blocks<'f> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        match self.next {
            Some(block) => {
                self.next = self.layout.next_block(block);
                Some(block)
            }
            None => None,
        }
    }
}

/// Methods for arranging instructions.
///
/// An instruction starts out as *not inserted* in the layout. An instruction can be inserted into
/// a block at a given position.
impl Layout {
    /// Get the block containing `inst`, or `None` if `inst` is not inserted in the layout.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block.into()
    }

    /// Get the block containing the program point `pp`. Panic if `pp` is not in the layout.
    pub fn pp_block(&self, pp: ProgramPoint) -> Block {
        match pp {
            ProgramPoint::Block(block) => block,
            ProgramPoint::Inst(inst) => self.inst_block(inst).expect("Program point not in layout"),
        }
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert_eq!(self.inst_block(inst), None);
        debug_assert!(
            self.is_block_inserted(block),
            "Cannot append instructions to block not in layout"
        );
        {
            let block_node = &mut self.blocks[block];
            {
                let inst_node = &mut self.insts[inst];
                inst_node.block = block.into();
                inst_node.prev = block_node.last_inst;
                debug_assert!(inst_node.next.is_none());
            }
            if block_node.first_inst.is_none() {
                block_node.first_inst = inst.into();
            } else {
                self.insts[block_node.last_inst.expect("non-empty block")].next = inst.into();
            }
            block_node.last_inst = inst.into();
        }
        self.assign_inst_seq(inst);
    }

    /// Fetch a block's first instruction.
    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.into()
    }

    /// Fetch a block's last instruction.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.into()
    }

    /// Fetch the instruction following `inst`.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    /// Fetch the instruction preceding `inst`.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Insert `inst` before the instruction `before` in the same block.
    pub fn insert_inst(&mut self, inst: Inst, before: Inst) {
        debug_assert_eq!(self.inst_block(inst), None);
        let block = self
            .inst_block(before)
            .expect("Instruction before insertion point not in the layout");
        let after = self.insts[before].prev;
        {
            let inst_node = &mut self.insts[inst];
            inst_node.block = block.into();
            inst_node.next = before.into();
            inst_node.prev = after;
        }
        self.insts[before].prev = inst.into();
        match after.expand() {
            None => self.blocks[block].first_inst = inst.into(),
            Some(a) => self.insts[a].next = inst.into(),
        }
        self.assign_inst_seq(inst);
    }

    /// Remove `inst` from the layout.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block(inst).expect("Instruction already removed.");
        // Clear the `inst` node and extract links.
        let prev;
        let next;
        {
            let n = &mut self.insts[inst];
            prev = n.prev;
            next = n.next;
            n.block = None.into();
            n.prev = None.into();
            n.next = None.into();
        }
        // Fix up links to `inst`.
        match prev.expand() {
            None => self.blocks[block].first_inst = next,
            Some(p) => self.insts[p].next = next,
        }
        match next.expand() {
            None => self.blocks[block].last_inst = prev,
            Some(n) => self.insts[n].prev = prev,
        }
    }

    /// Iterate over the instructions in `block` in layout order.
    pub fn block_insts(&self, block: Block) -> Insts<'_> {
        Insts {
            layout: self,
            head: self.blocks[block].first_inst.into(),
            tail: self.blocks[block].last_inst.into(),
        }
    }
}

/// Iterate over instructions in a block in layout order. See [`Layout::block_insts`].
pub struct Insts<'f> {
    layout: &'f Layout,
    head: Option<Inst>,
    tail: Option<Inst>,
}

impl<'f> Iterator for Insts<'f> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let rval = self.head;
        if let Some(inst) = rval {
            if self.head == self.tail {
                self.head = None;
                self.tail = None;
            } else {
                self.head = self.layout.insts[inst].next.into();
            }
        }
        rval
    }
}

impl<'f> DoubleEndedIterator for Insts<'f> {
    fn next_back(&mut self) -> Option<Inst> {
        let rval = self.tail;
        if let Some(inst) = rval {
            if self.head == self.tail {
                self.head = None;
                self.tail = None;
            } else {
                self.tail = self.layout.insts[inst].prev.into();
            }
        }
        rval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use core::cmp::Ordering;

    fn verify(layout: &Layout, block: Block, insts: &[Inst]) {
        let got: Vec<Inst> = layout.block_insts(block).collect();
        assert_eq!(got, insts);
        let rev: Vec<Inst> = layout.block_insts(block).rev().collect();
        let mut expected = insts.to_vec();
        expected.reverse();
        assert_eq!(rev, expected);
        for w in insts.windows(2) {
            assert_eq!(layout.pp_cmp(w[0], w[1]), Ordering::Less);
            assert_eq!(layout.pp_cmp(block, w[0]), Ordering::Less);
        }
    }

    #[test]
    fn append_block() {
        let mut layout = Layout::new();
        let (b0, b1, b2) = (Block::new(0), Block::new(1), Block::new(2));
        assert_eq!(layout.entry_block(), None);
        layout.append_block(b1);
        layout.append_block(b2);
        layout.insert_block_after(b0, b1);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), [b1, b0, b2]);
        assert_eq!(layout.entry_block(), Some(b1));
        assert_eq!(layout.last_block(), Some(b2));
        layout.remove_block(b0);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), [b1, b2]);
        assert!(!layout.is_block_inserted(b0));
    }

    #[test]
    fn insert_inst() {
        let mut layout = Layout::new();
        let b1 = Block::new(1);
        layout.append_block(b1);
        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);
        layout.append_inst(i1, b1);
        verify(&layout, b1, &[i1]);
        layout.insert_inst(i2, i1);
        verify(&layout, b1, &[i2, i1]);
        layout.insert_inst(i0, i1);
        verify(&layout, b1, &[i2, i0, i1]);
        assert_eq!(layout.inst_block(i0), Some(b1));

        layout.remove_inst(i0);
        verify(&layout, b1, &[i2, i1]);
        assert_eq!(layout.inst_block(i0), None);
    }

    #[test]
    fn renumbering() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        layout.append_block(b0);
        let last = Inst::new(0);
        layout.append_inst(last, b0);
        // Repeatedly insert right before the last instruction to exhaust the gaps.
        let mut order = Vec::new();
        for i in 1..40 {
            let inst = Inst::new(i);
            layout.insert_inst(inst, last);
            order.push(inst);
        }
        order.push(last);
        verify(&layout, b0, &order);
    }
}
