//! Cursor library.
//!
//! This module defines a cursor that can be used for inserting and removing instructions, and an
//! instruction builder creating the SSA results of the instructions it inserts.

use crate::ir::{
    self, AssertExpr, BinaryOp, Block, CallData, CallDest, Function, Inst, InstData, IntCC,
    MemRef, Operand, RetVal, SwitchCase, Type, UnaryOp, Value, ValueDef,
};
use smallvec::SmallVec;

/// The possible positions of a cursor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Cursor is not pointing anywhere. No instructions can be inserted.
    Nowhere,
    /// Cursor is pointing at an existing instruction.
    /// New instructions will be inserted *before* the current instruction.
    At(Inst),
    /// Cursor is before the beginning of a block. No instructions can be inserted. Calling
    /// `next_inst()` will move to the first instruction in the block.
    Before(Block),
    /// Cursor is pointing after the end of a block.
    /// New instructions will be appended to the block.
    After(Block),
}

/// Function cursor.
///
/// A `FuncCursor` holds a mutable reference to a whole `ir::Function` while keeping a position
/// too. The function can be re-borrowed by accessing the public `cur.func` member.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    /// The referenced function.
    pub func: &'f mut Function,
}

impl<'f> FuncCursor<'f> {
    /// Create a new `FuncCursor` pointing nowhere.
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            pos: CursorPosition::Nowhere,
            func,
        }
    }

    /// Get the current cursor position.
    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    /// Set the current position.
    pub fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    fn layout(&self) -> &ir::Layout {
        &self.func.layout
    }

    /// Rebuild this cursor positioned at `inst`.
    pub fn at_inst(mut self, inst: Inst) -> Self {
        self.goto_inst(inst);
        self
    }

    /// Rebuild this cursor positioned after `inst`.
    pub fn after_inst(mut self, inst: Inst) -> Self {
        self.goto_after_inst(inst);
        self
    }

    /// Rebuild this cursor positioned at the top of `block`.
    pub fn at_top(mut self, block: Block) -> Self {
        self.goto_top(block);
        self
    }

    /// Rebuild this cursor positioned at the bottom of `block`.
    pub fn at_bottom(mut self, block: Block) -> Self {
        self.goto_bottom(block);
        self
    }

    /// Rebuild this cursor positioned at the first insertion point for `block`.
    pub fn at_first_insertion_point(mut self, block: Block) -> Self {
        self.goto_first_insertion_point(block);
        self
    }

    /// Get the block corresponding to the current position.
    pub fn current_block(&self) -> Option<Block> {
        match self.pos {
            CursorPosition::Nowhere => None,
            CursorPosition::At(inst) => self.layout().inst_block(inst),
            CursorPosition::Before(block) | CursorPosition::After(block) => Some(block),
        }
    }

    /// Get the instruction corresponding to the current position, if any.
    pub fn current_inst(&self) -> Option<Inst> {
        match self.pos {
            CursorPosition::At(inst) => Some(inst),
            _ => None,
        }
    }

    /// Go to a specific instruction which must be inserted in the layout.
    /// New instructions will be inserted before `inst`.
    pub fn goto_inst(&mut self, inst: Inst) {
        debug_assert!(self.layout().inst_block(inst).is_some());
        self.pos = CursorPosition::At(inst);
    }

    /// Go to the position after a specific instruction, which must be inserted
    /// in the layout. New instructions will be inserted after `inst`.
    pub fn goto_after_inst(&mut self, inst: Inst) {
        self.pos = match self.layout().next_inst(inst) {
            Some(next) => CursorPosition::At(next),
            None => CursorPosition::After(
                self.layout()
                    .inst_block(inst)
                    .expect("current instruction removed?"),
            ),
        };
    }

    /// Go to the top of `block`.
    pub fn goto_top(&mut self, block: Block) {
        debug_assert!(self.layout().is_block_inserted(block));
        self.pos = CursorPosition::Before(block);
    }

    /// Go to the bottom of `block`. Inserted instructions will be appended to `block`.
    pub fn goto_bottom(&mut self, block: Block) {
        debug_assert!(self.layout().is_block_inserted(block));
        self.pos = CursorPosition::After(block);
    }

    /// Go to the position for inserting instructions at the beginning of `block`.
    pub fn goto_first_insertion_point(&mut self, block: Block) {
        match self.layout().first_inst(block) {
            Some(inst) => self.goto_inst(inst),
            None => self.goto_bottom(block),
        }
    }

    /// Go to the position for inserting instructions after the PHIs of `block`.
    pub fn goto_after_phis(&mut self, block: Block) {
        let first = self
            .func
            .layout
            .block_insts(block)
            .find(|&inst| !self.func.dfg.insts[inst].is_phi());
        match first {
            Some(inst) => self.goto_inst(inst),
            None => self.goto_bottom(block),
        }
    }

    /// Go to the top of the next block in layout order and return it.
    pub fn next_block(&mut self) -> Option<Block> {
        let next = match self.current_block() {
            Some(block) => self.layout().next_block(block),
            None => self.layout().entry_block(),
        };
        self.pos = match next {
            Some(block) => CursorPosition::Before(block),
            None => CursorPosition::Nowhere,
        };
        next
    }

    /// Move to the next instruction in the same block and return it.
    ///
    /// When there are no more instructions, the cursor moves to the bottom of the block.
    pub fn next_inst(&mut self) -> Option<Inst> {
        match self.pos {
            CursorPosition::Nowhere | CursorPosition::After(..) => None,
            CursorPosition::At(inst) => {
                if let Some(next) = self.layout().next_inst(inst) {
                    self.pos = CursorPosition::At(next);
                    Some(next)
                } else {
                    self.pos = CursorPosition::After(
                        self.layout()
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    None
                }
            }
            CursorPosition::Before(block) => {
                if let Some(next) = self.layout().first_inst(block) {
                    self.pos = CursorPosition::At(next);
                    Some(next)
                } else {
                    self.pos = CursorPosition::After(block);
                    None
                }
            }
        }
    }

    /// Insert an already created instruction at the current position.
    ///
    /// The cursor is left pointing at the same instruction, so instructions inserted one after
    /// another appear in program order.
    pub fn insert_inst(&mut self, inst: Inst) {
        match self.pos {
            CursorPosition::Nowhere | CursorPosition::Before(..) => {
                panic!("Invalid insert_inst position")
            }
            CursorPosition::At(cur) => self.func.layout.insert_inst(inst, cur),
            CursorPosition::After(block) => self.func.layout.append_inst(inst, block),
        }
    }

    /// Remove the instruction under the cursor.
    ///
    /// The cursor moves to the next instruction, or the bottom of the block.
    pub fn remove_inst(&mut self) -> Inst {
        let inst = self.current_inst().expect("No instruction to remove");
        self.next_inst();
        self.func.layout.remove_inst(inst);
        inst
    }

    /// Insert a new block after the current block and move to its bottom.
    pub fn insert_block(&mut self, new_block: Block) {
        match self.current_block() {
            Some(block) => self.func.layout.insert_block_after(new_block, block),
            None => self.func.layout.append_block(new_block),
        }
        self.pos = CursorPosition::After(new_block);
    }

    /// Create an instruction builder that inserts at the current position.
    pub fn ins(&mut self) -> InsertBuilder<'_, 'f> {
        InsertBuilder { cursor: self }
    }
}

/// Builder of instructions inserted at the position of a `FuncCursor`.
pub struct InsertBuilder<'c, 'f> {
    cursor: &'c mut FuncCursor<'f>,
}

impl InsertBuilder<'_, '_> {
    fn build(self, data: InstData) -> Inst {
        let inst = self.cursor.func.dfg.make_inst(data);
        self.cursor.insert_inst(inst);
        inst
    }

    /// Create the result of the instruction about to be built.
    fn result(&mut self, ty: Type) -> Value {
        let dfg = &mut self.cursor.func.dfg;
        let inst = dfg.next_inst();
        dfg.make_value(ty, ValueDef::Inst(inst))
    }

    /// `op arg`.
    pub fn unary(mut self, op: UnaryOp, ty: Type, arg: impl Into<Operand>) -> Value {
        let dst = self.result(ty);
        self.build(InstData::Unary {
            op,
            dst,
            arg: arg.into(),
        });
        dst
    }

    /// `a op b`.
    pub fn binary(
        mut self,
        op: BinaryOp,
        ty: Type,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Value {
        let dst = self.result(ty);
        self.build(InstData::Binary {
            op,
            dst,
            args: [a.into(), b.into()],
        });
        dst
    }

    /// `a cond b` as a boolean.
    pub fn icmp(mut self, cond: IntCC, a: impl Into<Operand>, b: impl Into<Operand>) -> Value {
        let ty = self.cursor.func.types.bool;
        let dst = self.result(ty);
        self.build(InstData::Compare {
            cond,
            dst,
            args: [a.into(), b.into()],
        });
        dst
    }

    /// A copy of `src`.
    pub fn copy(mut self, ty: Type, src: impl Into<Operand>) -> Value {
        let dst = self.result(ty);
        self.build(InstData::Copy {
            dst,
            src: src.into(),
        });
        dst
    }

    /// `src` converted to `ty`.
    pub fn convert(mut self, ty: Type, src: impl Into<Operand>) -> Value {
        let dst = self.result(ty);
        self.build(InstData::Convert {
            dst,
            src: src.into(),
        });
        dst
    }

    /// The address of `mem`, a pointer of type `ty`.
    pub fn addr_of(mut self, ty: Type, mem: MemRef) -> Value {
        let dst = self.result(ty);
        self.build(InstData::AddrOf {
            dst,
            mem: Box::new(mem),
        });
        dst
    }

    /// Load a scalar of type `ty` from `mem`.
    pub fn load(mut self, ty: Type, mem: MemRef) -> Value {
        let dst = self.result(ty);
        self.build(InstData::Load {
            dst,
            mem: Box::new(mem),
        });
        dst
    }

    /// Store `src` to `mem`.
    pub fn store(self, mem: MemRef, src: impl Into<Operand>) -> Inst {
        self.build(InstData::Store {
            mem: Box::new(mem),
            src: src.into(),
        })
    }

    /// Copy the aggregate `src` to `dst`.
    pub fn aggregate(self, dst: MemRef, src: MemRef) -> Inst {
        self.build(InstData::Aggregate {
            dst: Box::new(dst),
            src: Box::new(src),
        })
    }

    /// A call whose result, if any, is already described by `call.dest`.
    pub fn call(self, call: CallData) -> Inst {
        self.build(InstData::Call(Box::new(call)))
    }

    /// A call returning a scalar of type `ty`.
    pub fn call_value(mut self, ty: Type, mut call: CallData) -> Value {
        let dst = self.result(ty);
        call.dest = Some(CallDest::Value(dst));
        self.build(InstData::Call(Box::new(call)));
        dst
    }

    /// Inline assembly.
    pub fn asm(self, volatile: bool, clobbers_memory: bool) -> Inst {
        self.build(InstData::Asm {
            volatile,
            clobbers_memory,
        })
    }

    /// Return from the function.
    pub fn ret(self, value: Option<RetVal>) -> Inst {
        self.build(InstData::Return { value })
    }

    /// Unconditional branch.
    pub fn jump(self, dest: Block) -> Inst {
        self.build(InstData::Jump { dest })
    }

    /// Conditional branch on `a cond b`.
    pub fn branch(
        self,
        cond: IntCC,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        then_dest: Block,
        else_dest: Block,
    ) -> Inst {
        self.build(InstData::Branch {
            cond,
            args: [a.into(), b.into()],
            then_dest,
            else_dest,
        })
    }

    /// Multi-way branch.
    pub fn switch(self, index: impl Into<Operand>, cases: Vec<SwitchCase>, default: Block) -> Inst {
        self.build(InstData::Switch {
            index: index.into(),
            cases,
            default,
        })
    }

    /// A PHI of type `ty`.
    pub fn phi(mut self, ty: Type, args: impl IntoIterator<Item = (Block, Operand)>) -> Value {
        let dst = self.result(ty);
        self.build(InstData::Phi {
            dst,
            args: args.into_iter().collect::<SmallVec<_>>(),
        });
        dst
    }

    /// An assertion of `expr(src) cond bound`.
    pub fn assert(
        mut self,
        src: Value,
        expr: AssertExpr,
        cond: IntCC,
        bound: impl Into<Operand>,
    ) -> Value {
        let ty = self.cursor.func.dfg.value_type(src);
        let dst = self.result(ty);
        self.build(InstData::Assert {
            dst,
            src,
            expr,
            cond,
            bound: bound.into(),
        });
        dst
    }
}
