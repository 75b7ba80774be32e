//! Data flow graph tracking instructions and SSA values.

use crate::entity::{PrimaryMap, packed_option::PackedOption};
use crate::ir::{Block, Inst, InstData, Type, Value, Var};

/// Where a value is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Defined by an instruction.
    Inst(Inst),
    /// The incoming value of a parameter declaration at function entry.
    Param(Var),
}

impl ValueDef {
    /// Get the defining instruction, if any.
    pub fn inst(self) -> Option<Inst> {
        match self {
            ValueDef::Inst(inst) => Some(inst),
            ValueDef::Param(_) => None,
        }
    }
}

/// Data about an SSA value.
#[derive(Clone, Debug)]
pub struct ValueData {
    /// Type of the value.
    pub ty: Type,
    /// Definition of the value.
    pub def: ValueDef,
    /// The declaration this value is a version of, if any.
    pub var: PackedOption<Var>,
    /// The value is a pointer that only points to read-only memory.
    pub points_to_readonly: bool,
}

/// A data flow graph defines all instructions and basic blocks in a function as well as the data
/// flow dependencies between them.
///
/// The layout of blocks and instructions is kept separately in
/// [`Layout`](super::Layout). An instruction can exist in the DFG without being laid out.
#[derive(Clone, Default)]
pub struct DataFlowGraph {
    /// Data about all of the instructions in the function, including those that have been
    /// removed from the layout.
    pub insts: PrimaryMap<Inst, InstData>,

    /// Basic blocks in the function.
    blocks: PrimaryMap<Block, ()>,

    /// Primary value table with entries for all values.
    values: PrimaryMap<Value, ValueData>,
}

impl DataFlowGraph {
    /// Create a new empty `DataFlowGraph`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new basic block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.push(())
    }

    /// Get the total number of basic blocks created in this function, whether they are
    /// currently inserted in the layout or not.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Get the total number of instructions created in this function.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// The instruction the next call to [`make_inst`](Self::make_inst) will create.
    ///
    /// Results of the instruction are created before the instruction itself, and refer to it.
    pub fn next_inst(&self) -> Inst {
        self.insts.next_key()
    }

    /// Create a new instruction.
    pub fn make_inst(&mut self, data: InstData) -> Inst {
        let inst = self.insts.push(data);
        debug_assert!(
            self.insts[inst]
                .result()
                .is_none_or(|v| self.values[v].def == ValueDef::Inst(inst)),
            "result of {inst} defined elsewhere"
        );
        inst
    }

    /// Get the total number of values.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Iterate over all the values.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.values.keys()
    }

    /// Create a new value of type `ty` defined at `def`.
    pub fn make_value(&mut self, ty: Type, def: ValueDef) -> Value {
        self.values.push(ValueData {
            ty,
            def,
            var: None.into(),
            points_to_readonly: false,
        })
    }

    /// Check if a value reference is valid.
    pub fn value_is_valid(&self, v: Value) -> bool {
        self.values.is_valid(v)
    }

    /// Get the type of a value.
    pub fn value_type(&self, v: Value) -> Type {
        self.values[v].ty
    }

    /// Get the definition of a value.
    pub fn value_def(&self, v: Value) -> ValueDef {
        self.values[v].def
    }

    /// Get the data of a value.
    pub fn value_data(&self, v: Value) -> &ValueData {
        &self.values[v]
    }

    /// Get the data of a value for modification.
    pub fn value_data_mut(&mut self, v: Value) -> &mut ValueData {
        &mut self.values[v]
    }

    /// Get the declaration `v` is a version of.
    pub fn value_var(&self, v: Value) -> Option<Var> {
        self.values[v].var.expand()
    }

    /// Record that `v` is a version of `var`.
    pub fn set_value_var(&mut self, v: Value, var: Var) {
        self.values[v].var = var.into();
    }

    /// Get the instruction defining `v`, if any.
    pub fn value_inst(&self, v: Value) -> Option<Inst> {
        self.values[v].def.inst()
    }

    /// Get the instruction defining `v`, if `v` is defined by an instruction.
    pub fn value_inst_data(&self, v: Value) -> Option<&InstData> {
        self.value_inst(v).map(|inst| &self.insts[inst])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Operand, TypeStore};

    #[test]
    fn results_refer_to_their_instruction() {
        let mut types = TypeStore::new();
        let i32t = types.int(32, true);
        let mut dfg = DataFlowGraph::new();
        let inst = dfg.next_inst();
        let dst = dfg.make_value(i32t, ValueDef::Inst(inst));
        let made = dfg.make_inst(InstData::Binary {
            op: BinaryOp::Add,
            dst,
            args: [
                Operand::Const {
                    ty: i32t,
                    value: 1,
                },
                Operand::Const {
                    ty: i32t,
                    value: 2,
                },
            ],
        });
        assert_eq!(made, inst);
        assert_eq!(dfg.value_inst(dst), Some(inst));
        assert_eq!(dfg.value_type(dst), i32t);
        assert_eq!(dfg.num_values(), 1);
    }
}
