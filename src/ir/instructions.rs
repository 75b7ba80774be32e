//! Instruction formats and operands.
//!
//! Instructions are three-address statements in SSA form. Scalar results are SSA values, memory
//! is accessed through [`MemRef`]s, and blocks end with exactly one terminator.

use crate::ir::condcodes::IntCC;
use crate::ir::{Block, FuncRef, MemRef, PtSolution, Type, Value, Var};
use bitflags::bitflags;
use core::fmt;
use smallvec::SmallVec;

/// An instruction operand: an SSA value or an invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// An SSA value.
    Value(Value),
    /// An integer constant of type `ty`, stored sign- or zero-extended according to the type.
    Const {
        /// Type of the constant.
        ty: Type,
        /// The value.
        value: i128,
    },
    /// The invariant address `&var + offset`.
    Addr {
        /// The declaration whose address is taken.
        var: Var,
        /// Byte offset from the start of `var`.
        offset: i64,
    },
}

impl Operand {
    /// Get the SSA value, if this operand is one.
    pub fn as_value(self) -> Option<Value> {
        match self {
            Operand::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Get the integer constant, if this operand is one.
    pub fn as_const(self) -> Option<i128> {
        match self {
            Operand::Const { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Is this the integer constant `c`?
    pub fn is_const(self, c: i128) -> bool {
        self.as_const() == Some(c)
    }

    /// Is this an invariant, a constant or an address?
    pub fn is_invariant(self) -> bool {
        !matches!(self, Operand::Value(_))
    }

    /// Replace `from` with `to` if this operand is `from`.
    pub fn replace_value(&mut self, from: Value, to: Value) {
        if *self == Operand::Value(from) {
            *self = Operand::Value(to);
        }
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Const { value, .. } => write!(f, "{value}"),
            Operand::Addr { var, offset: 0 } => write!(f, "&{var}"),
            Operand::Addr { var, offset } => write!(f, "&{var}+{offset}"),
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Two's complement negation.
    Neg,
    /// Bitwise not.
    BitNot,
    /// Absolute value.
    Abs,
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division truncating towards zero.
    Div,
    /// Division known to have no remainder.
    ExactDiv,
    /// Remainder of truncating division.
    Rem,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Left shift.
    Shl,
    /// Right shift, arithmetic for signed types.
    Shr,
    /// Pointer plus a byte offset.
    PointerAdd,
}

impl UnaryOp {
    fn to_static_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::BitNot => "bnot",
            UnaryOp::Abs => "abs",
        }
    }
}

impl BinaryOp {
    fn to_static_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::ExactDiv => "exact_div",
            BinaryOp::Rem => "rem",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::And => "band",
            BinaryOp::Or => "bor",
            BinaryOp::Xor => "bxor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::PointerAdd => "ptr_add",
        }
    }

    /// Is `a op b == b op a`?
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::Min
                | BinaryOp::Max
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
        )
    }
}

/// The left-hand side of an assertion condition.
///
/// An assertion `dst = assert src, expr cond bound` states that `expr cond bound` holds where
/// `dst` is defined, with `expr` derived from `src`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssertExpr {
    /// The asserted value itself.
    Name,
    /// `(ty)src + offset`, computed in the unsigned type `ty`. This encodes range tests: with
    /// `cond` being `<=`, `src` lies in `[-offset, bound - offset]`.
    Offset {
        /// The unsigned type the test is computed in.
        ty: Type,
        /// The added constant, zero for a plain conversion.
        offset: i128,
    },
}

/// One case of a switch: indices in `[low, high]` go to `dest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwitchCase {
    /// Smallest index of the case.
    pub low: i128,
    /// Largest index of the case.
    pub high: i128,
    /// Destination block.
    pub dest: Block,
}

bitflags! {
    /// Side-effect summary flags of a call.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CallFlags: u8 {
        /// The callee neither reads nor writes memory.
        const CONST = 1 << 0;
        /// The callee reads but does not write memory.
        const PURE = 1 << 1;
        /// A const or pure callee that may not terminate.
        const LOOPING_CONST_OR_PURE = 1 << 2;
        /// The callee touches no memory visible to the program, but the call must be kept.
        const NOVOPS = 1 << 3;
        /// The call does not throw.
        const NOTHROW = 1 << 4;
        /// The callee never returns a null pointer.
        const RETURNS_NONNULL = 1 << 5;
    }
}

/// The callee of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Callee {
    /// A direct call of an external function.
    Direct(FuncRef),
    /// A call through a function pointer.
    Indirect(Value),
}

/// An argument value of a call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgValue {
    /// A scalar passed in a register.
    Operand(Operand),
    /// An aggregate passed by value.
    Mem(Box<MemRef>),
}

/// A call argument.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallArg {
    /// The argument value.
    pub value: ArgValue,
    /// The callee does not use the argument.
    pub unused: bool,
}

impl CallArg {
    /// The argument as a scalar operand, if it is one.
    pub fn operand(&self) -> Option<Operand> {
        match self.value {
            ArgValue::Operand(op) => Some(op),
            ArgValue::Mem(_) => None,
        }
    }
}

impl From<Operand> for CallArg {
    fn from(op: Operand) -> Self {
        Self {
            value: ArgValue::Operand(op),
            unused: false,
        }
    }
}

impl From<Value> for CallArg {
    fn from(v: Value) -> Self {
        Operand::Value(v).into()
    }
}

/// Where the result of a call goes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallDest {
    /// An SSA value.
    Value(Value),
    /// Memory: the call returns an aggregate.
    Mem(Box<MemRef>),
}

/// The data of a call instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallData {
    /// The called function.
    pub callee: Callee,
    /// The arguments.
    pub args: SmallVec<[CallArg; 4]>,
    /// Where the result goes, if it is used.
    pub dest: Option<CallDest>,
    /// Side-effect summary flags.
    pub flags: CallFlags,
    /// The static chain argument of a nested function call.
    pub static_chain: Option<Operand>,
    /// Objects the call may read.
    pub uses: PtSolution,
    /// Objects the call may write.
    pub clobbers: PtSolution,
}

impl CallData {
    /// A call of `callee` that may use and clobber anything.
    pub fn new(callee: Callee, args: impl IntoIterator<Item = CallArg>) -> Self {
        Self {
            callee,
            args: args.into_iter().collect(),
            dest: None,
            flags: CallFlags::empty(),
            static_chain: None,
            uses: PtSolution::anything(),
            clobbers: PtSolution::anything(),
        }
    }

    /// The `i`th argument as a scalar operand.
    pub fn arg(&self, i: usize) -> Option<Operand> {
        self.args.get(i).and_then(|a| a.operand())
    }

    /// The SSA value the call defines, if any.
    pub fn dest_value(&self) -> Option<Value> {
        match self.dest {
            Some(CallDest::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// The memory the result is stored to, if any.
    pub fn dest_mem(&self) -> Option<&MemRef> {
        match &self.dest {
            Some(CallDest::Mem(m)) => Some(m),
            _ => None,
        }
    }
}

/// The value returned by a return instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RetVal {
    /// A scalar.
    Operand(Operand),
    /// An aggregate read from memory.
    Mem(Box<MemRef>),
}

/// Contents of an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstData {
    /// `dst = op arg`.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The result.
        dst: Value,
        /// The operand.
        arg: Operand,
    },
    /// `dst = args[0] op args[1]`.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// The result.
        dst: Value,
        /// The operands.
        args: [Operand; 2],
    },
    /// `dst = args[0] cond args[1]`, a boolean.
    Compare {
        /// The comparison.
        cond: IntCC,
        /// The result.
        dst: Value,
        /// The compared operands.
        args: [Operand; 2],
    },
    /// `dst = src`.
    Copy {
        /// The result.
        dst: Value,
        /// The copied operand.
        src: Operand,
    },
    /// `dst = (type of dst) src`.
    Convert {
        /// The result.
        dst: Value,
        /// The converted operand.
        src: Operand,
    },
    /// `dst = &mem`.
    AddrOf {
        /// The result.
        dst: Value,
        /// The object whose address is taken.
        mem: Box<MemRef>,
    },
    /// `dst = mem`.
    Load {
        /// The result.
        dst: Value,
        /// The loaded memory.
        mem: Box<MemRef>,
    },
    /// `mem = src`.
    Store {
        /// The stored memory.
        mem: Box<MemRef>,
        /// The stored value.
        src: Operand,
    },
    /// `dst = src` for aggregates in memory.
    Aggregate {
        /// The written memory.
        dst: Box<MemRef>,
        /// The read memory.
        src: Box<MemRef>,
    },
    /// A call.
    Call(Box<CallData>),
    /// Inline assembly.
    Asm {
        /// The statement is volatile.
        volatile: bool,
        /// The statement has a `"memory"` clobber.
        clobbers_memory: bool,
    },
    /// Return from the function.
    Return {
        /// The returned value.
        value: Option<RetVal>,
    },
    /// Unconditional branch.
    Jump {
        /// Destination.
        dest: Block,
    },
    /// `if args[0] cond args[1] goto then_dest else goto else_dest`.
    Branch {
        /// The comparison.
        cond: IntCC,
        /// The compared operands.
        args: [Operand; 2],
        /// Destination when the condition holds.
        then_dest: Block,
        /// Destination when the condition fails.
        else_dest: Block,
    },
    /// Multi-way branch on `index`.
    Switch {
        /// The switch index.
        index: Operand,
        /// Cases, sorted and not overlapping.
        cases: Vec<SwitchCase>,
        /// Destination of indices not covered by a case.
        default: Block,
    },
    /// `dst = src` where `expr cond bound` is known to hold.
    Assert {
        /// The result, a narrowed copy of `src`.
        dst: Value,
        /// The asserted value.
        src: Value,
        /// Left-hand side of the condition.
        expr: AssertExpr,
        /// The comparison.
        cond: IntCC,
        /// Right-hand side of the condition.
        bound: Operand,
    },
    /// `dst = phi(args)`, one argument per predecessor block.
    Phi {
        /// The result.
        dst: Value,
        /// Incoming values.
        args: SmallVec<[(Block, Operand); 4]>,
    },
}

impl InstData {
    /// The SSA value defined by the instruction, if any.
    pub fn result(&self) -> Option<Value> {
        match *self {
            InstData::Unary { dst, .. }
            | InstData::Binary { dst, .. }
            | InstData::Compare { dst, .. }
            | InstData::Copy { dst, .. }
            | InstData::Convert { dst, .. }
            | InstData::AddrOf { dst, .. }
            | InstData::Load { dst, .. }
            | InstData::Assert { dst, .. }
            | InstData::Phi { dst, .. } => Some(dst),
            InstData::Call(ref call) => call.dest_value(),
            _ => None,
        }
    }

    /// The SSA values used by the instruction.
    pub fn uses(&self) -> SmallVec<[Value; 4]> {
        let mut out = SmallVec::new();
        let mut op = |o: &Operand| {
            if let Operand::Value(v) = *o {
                out.push(v);
            }
        };
        match self {
            InstData::Unary { arg, .. } => op(arg),
            InstData::Binary { args, .. }
            | InstData::Compare { args, .. }
            | InstData::Branch { args, .. } => args.iter().for_each(op),
            InstData::Copy { src, .. } | InstData::Convert { src, .. } => op(src),
            InstData::Store { src, .. } => op(src),
            InstData::Switch { index, .. } => op(index),
            InstData::Assert { src, bound, .. } => {
                op(&Operand::Value(*src));
                op(bound);
            }
            InstData::Phi { args, .. } => args.iter().for_each(|(_, a)| op(a)),
            InstData::Return {
                value: Some(RetVal::Operand(o)),
            } => op(o),
            InstData::Call(call) => {
                if let Callee::Indirect(v) = call.callee {
                    op(&Operand::Value(v));
                }
                for a in &call.args {
                    if let ArgValue::Operand(o) = &a.value {
                        op(o);
                    }
                }
                if let Some(chain) = &call.static_chain {
                    op(chain);
                }
            }
            _ => {}
        }
        for mem in self.mem_refs() {
            out.extend(mem.used_values());
        }
        out
    }

    /// All the memory references appearing in the instruction.
    pub fn mem_refs(&self) -> SmallVec<[&MemRef; 2]> {
        let mut out = SmallVec::new();
        match self {
            InstData::AddrOf { mem, .. } | InstData::Load { mem, .. } => out.push(&**mem),
            InstData::Store { mem, .. } => out.push(&**mem),
            InstData::Aggregate { dst, src } => {
                out.push(&**dst);
                out.push(&**src);
            }
            InstData::Return {
                value: Some(RetVal::Mem(m)),
            } => out.push(&**m),
            InstData::Call(call) => {
                for a in &call.args {
                    if let ArgValue::Mem(m) = &a.value {
                        out.push(&**m);
                    }
                }
                if let Some(CallDest::Mem(m)) = &call.dest {
                    out.push(&**m);
                }
            }
            _ => {}
        }
        out
    }

    /// Replace all uses of `from` with `to`.
    pub fn replace_uses(&mut self, from: Value, to: Value) {
        let rewrite = |o: &mut Operand| o.replace_value(from, to);
        match self {
            InstData::Unary { arg, .. } => rewrite(arg),
            InstData::Binary { args, .. }
            | InstData::Compare { args, .. }
            | InstData::Branch { args, .. } => args.iter_mut().for_each(rewrite),
            InstData::Copy { src, .. } | InstData::Convert { src, .. } => rewrite(src),
            InstData::AddrOf { mem, .. } | InstData::Load { mem, .. } => {
                mem.replace_value(from, to)
            }
            InstData::Store { mem, src } => {
                mem.replace_value(from, to);
                rewrite(src);
            }
            InstData::Aggregate { dst, src } => {
                dst.replace_value(from, to);
                src.replace_value(from, to);
            }
            InstData::Switch { index, .. } => rewrite(index),
            InstData::Assert { src, bound, .. } => {
                if *src == from {
                    *src = to;
                }
                rewrite(bound);
            }
            InstData::Phi { args, .. } => args.iter_mut().for_each(|(_, a)| rewrite(a)),
            InstData::Return { value: Some(v) } => match v {
                RetVal::Operand(o) => rewrite(o),
                RetVal::Mem(m) => m.replace_value(from, to),
            },
            InstData::Call(call) => {
                if call.callee == Callee::Indirect(from) {
                    call.callee = Callee::Indirect(to);
                }
                for a in call.args.iter_mut() {
                    match &mut a.value {
                        ArgValue::Operand(o) => rewrite(o),
                        ArgValue::Mem(m) => m.replace_value(from, to),
                    }
                }
                if let Some(CallDest::Mem(m)) = &mut call.dest {
                    m.replace_value(from, to);
                }
                if let Some(chain) = &mut call.static_chain {
                    rewrite(chain);
                }
            }
            _ => {}
        }
    }

    /// Does this instruction end a block?
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstData::Return { .. }
                | InstData::Jump { .. }
                | InstData::Branch { .. }
                | InstData::Switch { .. }
        )
    }

    /// Is this a PHI?
    pub fn is_phi(&self) -> bool {
        matches!(self, InstData::Phi { .. })
    }

    /// The blocks this terminator may branch to, in order and with duplicates removed.
    pub fn branch_destinations(&self) -> SmallVec<[Block; 2]> {
        let mut out: SmallVec<[Block; 2]> = SmallVec::new();
        let mut push = |b: Block| {
            if !out.contains(&b) {
                out.push(b);
            }
        };
        match self {
            InstData::Jump { dest } => push(*dest),
            InstData::Branch {
                then_dest,
                else_dest,
                ..
            } => {
                push(*then_dest);
                push(*else_dest);
            }
            InstData::Switch { cases, default, .. } => {
                for c in cases {
                    push(c.dest);
                }
                push(*default);
            }
            _ => {}
        }
        out
    }

    /// Redirect branches to `old` so they go to `new`.
    pub fn retarget(&mut self, old: Block, new: Block) {
        let fix = |b: &mut Block| {
            if *b == old {
                *b = new;
            }
        };
        match self {
            InstData::Jump { dest } => fix(dest),
            InstData::Branch {
                then_dest,
                else_dest,
                ..
            } => {
                fix(then_dest);
                fix(else_dest);
            }
            InstData::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|c| fix(&mut c.dest));
                fix(default);
            }
            InstData::Phi { args, .. } => args.iter_mut().for_each(|(b, _)| fix(b)),
            _ => {}
        }
    }

    /// The call data, if this is a call.
    pub fn as_call(&self) -> Option<&CallData> {
        match self {
            InstData::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Does the instruction write memory?
    pub fn writes_memory(&self) -> bool {
        match self {
            InstData::Store { .. } | InstData::Aggregate { .. } => true,
            InstData::Call(call) => !call.flags.intersects(
                CallFlags::CONST
                    | CallFlags::PURE
                    | CallFlags::LOOPING_CONST_OR_PURE
                    | CallFlags::NOVOPS,
            ),
            InstData::Asm {
                volatile,
                clobbers_memory,
            } => *volatile || *clobbers_memory,
            _ => false,
        }
    }

    /// Does the instruction read memory?
    pub fn reads_memory(&self) -> bool {
        match self {
            InstData::Load { .. } | InstData::Aggregate { .. } => true,
            InstData::Call(call) => {
                !call.flags.intersects(CallFlags::CONST | CallFlags::NOVOPS)
                    || call.static_chain.is_some()
                    || call.args.iter().any(|a| matches!(a.value, ArgValue::Mem(_)))
            }
            InstData::Return { value } => !matches!(value, Some(RetVal::Operand(_))),
            InstData::Asm {
                volatile,
                clobbers_memory,
            } => *volatile || *clobbers_memory,
            _ => false,
        }
    }

    /// The memory written by a store, aggregate copy or call returning in memory.
    pub fn lhs_mem(&self) -> Option<&MemRef> {
        match self {
            InstData::Store { mem, .. } => Some(&**mem),
            InstData::Aggregate { dst, .. } => Some(&**dst),
            InstData::Call(call) => call.dest_mem(),
            _ => None,
        }
    }

    /// The memory read by a load or aggregate copy.
    pub fn rhs_mem(&self) -> Option<&MemRef> {
        match self {
            InstData::Load { mem, .. } => Some(&**mem),
            InstData::Aggregate { src, .. } => Some(&**src),
            _ => None,
        }
    }
}

impl fmt::Display for InstData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstData::Unary { op, dst, arg } => write!(f, "{dst} = {} {arg}", op.to_static_str()),
            InstData::Binary { op, dst, args } => {
                write!(f, "{dst} = {} {}, {}", op.to_static_str(), args[0], args[1])
            }
            InstData::Compare { cond, dst, args } => {
                write!(f, "{dst} = icmp {cond} {}, {}", args[0], args[1])
            }
            InstData::Copy { dst, src } => write!(f, "{dst} = {src}"),
            InstData::Convert { dst, src } => write!(f, "{dst} = convert {src}"),
            InstData::AddrOf { dst, mem } => write!(f, "{dst} = &{mem}"),
            InstData::Load { dst, mem } => write!(f, "{dst} = load {mem}"),
            InstData::Store { mem, src } => write!(f, "store {mem}, {src}"),
            InstData::Aggregate { dst, src } => write!(f, "{dst} = {src}"),
            InstData::Call(call) => {
                match &call.dest {
                    Some(CallDest::Value(v)) => write!(f, "{v} = ")?,
                    Some(CallDest::Mem(m)) => write!(f, "{m} = ")?,
                    None => {}
                }
                match call.callee {
                    Callee::Direct(fr) => write!(f, "call {fr}(")?,
                    Callee::Indirect(v) => write!(f, "call_indirect {v}(")?,
                }
                for (i, a) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &a.value {
                        ArgValue::Operand(o) => write!(f, "{o}")?,
                        ArgValue::Mem(m) => write!(f, "{m}")?,
                    }
                }
                write!(f, ")")
            }
            InstData::Asm {
                volatile,
                clobbers_memory,
            } => write!(
                f,
                "asm{}{}",
                if *volatile { " volatile" } else { "" },
                if *clobbers_memory { " memory" } else { "" }
            ),
            InstData::Return { value: None } => write!(f, "return"),
            InstData::Return {
                value: Some(RetVal::Operand(o)),
            } => write!(f, "return {o}"),
            InstData::Return {
                value: Some(RetVal::Mem(m)),
            } => write!(f, "return {m}"),
            InstData::Jump { dest } => write!(f, "jump {dest}"),
            InstData::Branch {
                cond,
                args,
                then_dest,
                else_dest,
            } => write!(
                f,
                "br {cond} {}, {}, {then_dest}, {else_dest}",
                args[0], args[1]
            ),
            InstData::Switch {
                index,
                cases,
                default,
            } => {
                write!(f, "switch {index}")?;
                for c in cases {
                    if c.low == c.high {
                        write!(f, ", {}: {}", c.low, c.dest)?;
                    } else {
                        write!(f, ", {}..={}: {}", c.low, c.high, c.dest)?;
                    }
                }
                write!(f, ", default: {default}")
            }
            InstData::Assert {
                dst,
                src,
                expr,
                cond,
                bound,
            } => match expr {
                AssertExpr::Name => write!(f, "{dst} = assert {src}, {src} {cond} {bound}"),
                AssertExpr::Offset { offset, .. } => write!(
                    f,
                    "{dst} = assert {src}, (unsigned){src} + {offset} {cond} {bound}"
                ),
            },
            InstData::Phi { dst, args } => {
                write!(f, "{dst} = phi")?;
                for (i, (b, a)) in args.iter().enumerate() {
                    write!(f, "{} {b}: {a}", if i == 0 { "" } else { "," })?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn uses_and_replace() {
        let (v0, v1, v2) = (Value::new(0), Value::new(1), Value::new(2));
        let mut inst = InstData::Binary {
            op: BinaryOp::Add,
            dst: v2,
            args: [v0.into(), v1.into()],
        };
        assert_eq!(inst.result(), Some(v2));
        assert_eq!(inst.uses().as_slice(), &[v0, v1]);
        inst.replace_uses(v0, v1);
        assert_eq!(inst.uses().as_slice(), &[v1, v1]);
        assert_eq!(inst.to_string(), "v2 = add v1, v1");
    }

    #[test]
    fn branch_destinations() {
        let (b1, b2) = (Block::new(1), Block::new(2));
        let mut inst = InstData::Switch {
            index: Value::new(0).into(),
            cases: vec![
                SwitchCase {
                    low: 0,
                    high: 0,
                    dest: b1,
                },
                SwitchCase {
                    low: 2,
                    high: 3,
                    dest: b2,
                },
            ],
            default: b1,
        };
        assert!(inst.is_terminator());
        assert_eq!(inst.branch_destinations().as_slice(), &[b1, b2]);
        let b3 = Block::new(3);
        inst.retarget(b1, b3);
        assert_eq!(inst.branch_destinations().as_slice(), &[b3, b2]);
    }

    #[test]
    fn call_memory_effects() {
        let mut call = CallData::new(Callee::Direct(FuncRef::new(0)), []);
        let inst = InstData::Call(Box::new(call.clone()));
        assert!(inst.reads_memory());
        assert!(inst.writes_memory());
        call.flags = CallFlags::PURE;
        let inst = InstData::Call(Box::new(call.clone()));
        assert!(inst.reads_memory());
        assert!(!inst.writes_memory());
        call.flags = CallFlags::CONST;
        let inst = InstData::Call(Box::new(call));
        assert!(!inst.reads_memory());
        assert!(!inst.writes_memory());
    }
}
