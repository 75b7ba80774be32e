//! Intermediate representation of a function.
//!
//! The `Function` struct defined in this module owns all of its basic blocks, instructions,
//! declarations and types.

use crate::entity::{PrimaryMap, SecondaryMap};
use crate::ir::{
    Block, DataFlowGraph, ExtFuncData, FuncRef, Inst, InstData, Layout, Operand, PointsToInfo, Type,
    TypeStore, Value, ValueDef, Var,
};
use core::fmt;
use smallvec::SmallVec;

/// Linkage of a global variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// A static variable only visible in its translation unit, or a function-local static.
    Static,
    /// A variable defined here and visible to other translation units.
    Public,
    /// A variable defined elsewhere.
    External,
}

/// The storage class of a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// An automatic variable.
    Local,
    /// A function parameter.
    Param,
    /// The slot holding the function result.
    Result,
    /// A variable with static storage duration.
    Global(Linkage),
}

/// A named declaration.
#[derive(Clone, Debug)]
pub struct VarData {
    /// Name, for printing.
    pub name: String,
    /// Declared type.
    pub ty: Type,
    /// Storage class.
    pub kind: VarKind,
    /// The address of the variable is taken somewhere.
    pub address_taken: bool,
    /// The variable is never written after initialization.
    pub readonly: bool,
    /// The variable can only be accessed directly, never through pointers, even if it is
    /// global.
    pub nonaliased: bool,
    /// The variable is bound to a hardware register.
    pub hard_register: bool,
}

impl VarData {
    /// A declaration of kind `kind`.
    pub fn new(name: &str, ty: Type, kind: VarKind) -> Self {
        Self {
            name: name.to_string(),
            ty,
            kind,
            address_taken: false,
            readonly: false,
            nonaliased: false,
            hard_register: false,
        }
    }

    /// A local variable.
    pub fn local(name: &str, ty: Type) -> Self {
        Self::new(name, ty, VarKind::Local)
    }

    /// A function parameter.
    pub fn param(name: &str, ty: Type) -> Self {
        Self::new(name, ty, VarKind::Param)
    }

    /// A global variable with the given linkage.
    pub fn global(name: &str, ty: Type, linkage: Linkage) -> Self {
        Self::new(name, ty, VarKind::Global(linkage))
    }

    /// Builder method marking the variable address-taken.
    pub fn address_taken(mut self) -> Self {
        self.address_taken = true;
        self
    }

    /// Builder method marking the variable read-only.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Does the variable have static storage duration?
    pub fn is_global(&self) -> bool {
        matches!(self.kind, VarKind::Global(_))
    }

    /// Is the variable visible outside of its translation unit?
    pub fn is_public(&self) -> bool {
        matches!(
            self.kind,
            VarKind::Global(Linkage::Public | Linkage::External)
        )
    }

    /// Is the variable defined in another translation unit?
    pub fn is_external(&self) -> bool {
        matches!(self.kind, VarKind::Global(Linkage::External))
    }

    /// May the variable be accessed through pointers?
    pub fn may_be_aliased(&self) -> bool {
        (self.is_public() || self.address_taken)
            && !(self.is_global() && (self.readonly || self.nonaliased))
    }
}

/// Range information exported onto an SSA value by value-range propagation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeInfo {
    /// The integer value lies in `[min, max]`.
    Range {
        /// Smallest value.
        min: i128,
        /// Largest value.
        max: i128,
    },
    /// The integer value lies outside `[min, max]`.
    AntiRange {
        /// Smallest excluded value.
        min: i128,
        /// Largest excluded value.
        max: i128,
    },
    /// The pointer value is not null.
    NonNull,
}

impl fmt::Display for RangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RangeInfo::Range { min, max } => write!(f, "[{min}, {max}]"),
            RangeInfo::AntiRange { min, max } => write!(f, "~[{min}, {max}]"),
            RangeInfo::NonNull => write!(f, "nonnull"),
        }
    }
}

/// A function.
///
/// Functions can be cloned, but it is not a very fast operation.
/// The clone will have all the same entity numbers as the original.
#[derive(Clone)]
pub struct Function {
    /// Name of this function, for printing.
    pub name: String,

    /// Types used by the function.
    pub types: TypeStore,

    /// Declarations: locals, parameters, the result and referenced globals.
    pub vars: PrimaryMap<Var, VarData>,

    /// Parameter declarations, in order.
    pub params: Vec<Var>,

    /// External functions called.
    pub ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,

    /// Data flow graph containing the primary definition of all instructions, blocks and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions in the function body.
    pub layout: Layout,

    /// Points-to solutions of pointer values.
    pub pta: PointsToInfo,

    /// Range information recorded by value-range propagation.
    pub range_info: SecondaryMap<Value, Option<RangeInfo>>,
}

impl Function {
    /// Create a function with the given name.
    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            types: TypeStore::new(),
            vars: PrimaryMap::new(),
            params: Vec::new(),
            ext_funcs: PrimaryMap::new(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            pta: PointsToInfo::default(),
            range_info: SecondaryMap::new(),
        }
    }

    /// Create a new empty, anonymous function.
    pub fn new() -> Self {
        Self::with_name("")
    }

    /// Declare a variable.
    pub fn declare_var(&mut self, data: VarData) -> Var {
        self.vars.push(data)
    }

    /// Declare a parameter and return the SSA value of its incoming value.
    pub fn declare_param(&mut self, name: &str, ty: Type) -> Value {
        let var = self.declare_var(VarData::param(name, ty));
        self.params.push(var);
        let v = self.dfg.make_value(ty, ValueDef::Param(var));
        self.dfg.set_value_var(v, var);
        v
    }

    /// Declare an external function.
    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.ext_funcs.push(data)
    }

    /// An integer constant operand.
    pub fn iconst(&self, ty: Type, value: i128) -> Operand {
        Operand::Const { ty, value }
    }

    /// The type of an operand.
    pub fn operand_type(&self, op: Operand) -> Type {
        match op {
            Operand::Value(v) => self.dfg.value_type(v),
            Operand::Const { ty, .. } => ty,
            Operand::Addr { .. } => self.types.void_ptr,
        }
    }

    /// Get the data of the declaration `var`.
    pub fn var(&self, var: Var) -> &VarData {
        &self.vars[var]
    }

    /// Replace every use of `from` with `to` in the instructions of the layout.
    pub fn replace_uses(&mut self, from: Value, to: Value) {
        let blocks: Vec<_> = self.layout.blocks().collect();
        for block in blocks {
            let insts: Vec<_> = self.layout.block_insts(block).collect();
            for inst in insts {
                self.dfg.insts[inst].replace_uses(from, to);
            }
        }
    }

    /// The PHI instructions at the start of `block`.
    pub fn block_phis(&self, block: Block) -> impl Iterator<Item = Inst> + '_ {
        self.layout
            .block_insts(block)
            .take_while(move |&inst| self.dfg.insts[inst].is_phi())
    }

    /// The terminator of `block`, if the block has one.
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        self.layout
            .last_inst(block)
            .filter(|&inst| self.dfg.insts[inst].is_terminator())
    }

    /// Get the data of an instruction.
    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.dfg.insts[inst]
    }

    /// The successors of `block` in the order its terminator lists them.
    pub fn block_successors(&self, block: Block) -> SmallVec<[Block; 2]> {
        match self.terminator(block) {
            Some(inst) => self.dfg.insts[inst].branch_destinations(),
            None => SmallVec::new(),
        }
    }

    /// Return an object that can display this function.
    pub fn display(&self) -> DisplayFunction<'_> {
        DisplayFunction(self)
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper type capable of displaying a `Function`.
pub struct DisplayFunction<'a>(&'a Function);

impl fmt::Display for DisplayFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let func = self.0;
        write!(f, "function {}(", func.name)?;
        for (i, &p) in func.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}: {}", func.types.display(func.vars[p].ty))?;
        }
        writeln!(f, ") {{")?;
        for (var, data) in func.vars.iter() {
            if data.kind != VarKind::Param {
                writeln!(
                    f,
                    "    {var} = {:?} {}: {}",
                    data.kind,
                    data.name,
                    func.types.display(data.ty)
                )?;
            }
        }
        for (fr, ext) in func.ext_funcs.iter() {
            writeln!(f, "    {fr} = {ext}")?;
        }
        for block in func.layout.blocks() {
            writeln!(f, "{block}:")?;
            for inst in func.layout.block_insts(block) {
                write!(f, "    {}", func.dfg.insts[inst])?;
                if let Some(v) = func.dfg.insts[inst].result() {
                    if let Some(r) = func.range_info[v] {
                        write!(f, " ; {r}")?;
                    }
                }
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn may_be_aliased() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let local = VarData::local("a", i32t);
        assert!(!local.may_be_aliased());
        assert!(local.clone().address_taken().may_be_aliased());
        let g = VarData::global("g", i32t, Linkage::Public);
        assert!(g.may_be_aliased());
        assert!(!g.clone().readonly().may_be_aliased());
        let s = VarData::global("s", i32t, Linkage::Static);
        assert!(!s.may_be_aliased());
        assert!(s.is_global());
    }

    #[test]
    fn params() {
        let mut func = Function::with_name("f");
        let i32t = func.types.int(32, true);
        let x = func.declare_param("x", i32t);
        assert_eq!(func.dfg.value_def(x), ValueDef::Param(func.params[0]));
        assert_eq!(func.dfg.value_var(x), Some(func.params[0]));
        assert_eq!(func.operand_type(x.into()), i32t);
        assert_eq!(func.display().to_string(), "function f(var0: i32) {\n}\n");
    }
}
