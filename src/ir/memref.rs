//! Memory references.
//!
//! A [`MemRef`] describes the storage accessed by a load, a store or an aggregate copy. It is a
//! base object followed by an access path: the chain of field selections, array indexings and
//! reinterpretations applied to the base, innermost first.
//!
//! The base is either a named declaration or a dereference of a pointer. Dereferences carry the
//! type of the access, the pointer type used for type-based alias analysis, and the
//! restrict-qualification clique information of the pointer they go through.

use crate::ir::{Field, Function, Operand, Type, Value, Var};
use core::fmt;
use smallvec::SmallVec;

/// The dereference of a pointer, `*(ptr + offset)`, optionally with a scaled index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Deref {
    /// The pointer being dereferenced.
    pub ptr: Operand,
    /// Constant byte offset added to the pointer.
    pub offset: i64,
    /// The type of the accessed object.
    pub ty: Type,
    /// The pointer type whose pointee determines the alias set of the access.
    pub alias_ptr_ty: Type,
    /// Restrict clique of the pointer, 0 if the pointer is not restrict-qualified.
    pub clique: u16,
    /// Identity of the restrict pointer within its clique.
    pub base_id: u16,
    /// A variable index multiplied by a constant step, for indexed addressing.
    pub index: Option<(Value, u64)>,
}

impl Deref {
    /// Dereference `ptr` accessing an object of type `ty` with alias pointer type `alias_ptr_ty`.
    pub fn new(ptr: Operand, ty: Type, alias_ptr_ty: Type) -> Self {
        Self {
            ptr,
            offset: 0,
            ty,
            alias_ptr_ty,
            clique: 0,
            base_id: 0,
            index: None,
        }
    }

    /// Builder method setting the constant byte offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Builder method setting the restrict clique and base.
    pub fn with_restrict(mut self, clique: u16, base_id: u16) -> Self {
        self.clique = clique;
        self.base_id = base_id;
        self
    }

    /// Builder method setting a scaled variable index.
    pub fn with_index(mut self, index: Value, step: u64) -> Self {
        self.index = Some((index, step));
        self
    }
}

/// The base object of a memory reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RefBase {
    /// A named declaration.
    Var(Var),
    /// A pointer dereference.
    Deref(Deref),
    /// An SSA register used as an object. This is degenerate, it has no storage others can
    /// reach.
    Value(Value),
    /// A constant object, like a string literal.
    Const,
    /// Code: a function or a label.
    Code,
}

impl RefBase {
    /// Is this a pointer dereference?
    pub fn is_deref(&self) -> bool {
        matches!(self, RefBase::Deref(_))
    }

    /// Is this a named declaration?
    pub fn is_var(&self) -> bool {
        matches!(self, RefBase::Var(_))
    }

    /// Get the dereference, if this is one.
    pub fn as_deref(&self) -> Option<&Deref> {
        match self {
            RefBase::Deref(d) => Some(d),
            _ => None,
        }
    }
}

/// One step of an access path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    /// Select a field of a record or union.
    Field(Field),
    /// Index an array of type `array`.
    Index {
        /// The index, either a constant or an SSA value.
        index: Operand,
        /// The type of the indexed array.
        array: Type,
    },
    /// Reinterpret the object as another type of the same size.
    Reinterpret(Type),
    /// Extract `bit_size` bits starting at `bit_offset` as a value of type `ty`.
    BitFieldRef {
        /// The type of the extracted value.
        ty: Type,
        /// First bit.
        bit_offset: u64,
        /// Number of bits.
        bit_size: u64,
    },
}

impl Component {
    /// The type of the object this component produces.
    pub fn ty(&self, func: &Function) -> Type {
        match *self {
            Component::Field(f) => func.types.field(f).ty,
            Component::Index { array, .. } => func
                .types
                .element(array)
                .expect("indexing a non-array type"),
            Component::Reinterpret(ty) => ty,
            Component::BitFieldRef { ty, .. } => ty,
        }
    }

    /// Does this component invalidate structural matching of the path below it?
    pub fn is_reinterpretation(&self) -> bool {
        matches!(
            self,
            Component::Reinterpret(_) | Component::BitFieldRef { .. }
        )
    }
}

/// A memory reference: a base object and an access path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemRef {
    /// The base object.
    pub base: RefBase,
    /// The access path, innermost component first.
    pub path: SmallVec<[Component; 4]>,
    /// The access is volatile.
    pub volatile: bool,
}

impl MemRef {
    /// A reference to the whole declaration `var`.
    pub fn var(var: Var) -> Self {
        Self::with_base(RefBase::Var(var))
    }

    /// A reference through a pointer dereference.
    pub fn deref(deref: Deref) -> Self {
        Self::with_base(RefBase::Deref(deref))
    }

    /// A reference with the given base and an empty path.
    pub fn with_base(base: RefBase) -> Self {
        Self {
            base,
            path: SmallVec::new(),
            volatile: false,
        }
    }

    /// Builder method selecting `field`.
    pub fn field(mut self, field: Field) -> Self {
        self.path.push(Component::Field(field));
        self
    }

    /// Builder method indexing an array of type `array`.
    pub fn index(mut self, index: Operand, array: Type) -> Self {
        self.path.push(Component::Index { index, array });
        self
    }

    /// Builder method reinterpreting the object as `ty`.
    pub fn reinterpret(mut self, ty: Type) -> Self {
        self.path.push(Component::Reinterpret(ty));
        self
    }

    /// Builder method extracting a bit range.
    pub fn bit_field_ref(mut self, ty: Type, bit_offset: u64, bit_size: u64) -> Self {
        self.path.push(Component::BitFieldRef {
            ty,
            bit_offset,
            bit_size,
        });
        self
    }

    /// Builder method marking the access volatile.
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// Number of components in the access path.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Type of the base object.
    pub fn base_type(&self, func: &Function) -> Type {
        match &self.base {
            RefBase::Var(v) => func.vars[*v].ty,
            RefBase::Deref(d) => d.ty,
            RefBase::Value(v) => func.dfg.value_type(*v),
            RefBase::Const | RefBase::Code => func.types.void,
        }
    }

    /// Type of the sub-reference made of the base and the first `depth` components.
    pub fn type_at(&self, func: &Function, depth: usize) -> Type {
        if depth == 0 {
            self.base_type(func)
        } else {
            self.path[depth - 1].ty(func)
        }
    }

    /// Type of the accessed object.
    pub fn ty(&self, func: &Function) -> Type {
        self.type_at(func, self.path.len())
    }

    /// The SSA values used by this reference: the dereferenced pointer and variable indices.
    pub fn used_values(&self) -> impl Iterator<Item = Value> + '_ {
        let base = match &self.base {
            RefBase::Deref(d) => {
                let ptr = d.ptr.as_value();
                let idx = d.index.map(|(v, _)| v);
                [ptr, idx]
            }
            RefBase::Value(v) => [Some(*v), None],
            _ => [None, None],
        };
        base.into_iter().flatten().chain(self.path.iter().filter_map(|c| match c {
            Component::Index { index, .. } => index.as_value(),
            _ => None,
        }))
    }

    /// Replace uses of `from` with `to`.
    pub fn replace_value(&mut self, from: Value, to: Value) {
        match &mut self.base {
            RefBase::Deref(d) => {
                d.ptr.replace_value(from, to);
                if let Some((v, _)) = &mut d.index {
                    if *v == from {
                        *v = to;
                    }
                }
            }
            RefBase::Value(v) if *v == from => *v = to,
            _ => {}
        }
        for c in self.path.iter_mut() {
            if let Component::Index { index, .. } = c {
                index.replace_value(from, to);
            }
        }
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.volatile {
            write!(f, "volatile ")?;
        }
        match &self.base {
            RefBase::Var(v) => write!(f, "{v}")?,
            RefBase::Deref(d) => {
                write!(f, "MEM[{}", d.ptr)?;
                if let Some((idx, step)) = d.index {
                    write!(f, " + {idx} * {step}")?;
                }
                if d.offset != 0 {
                    write!(f, " + {}", d.offset)?;
                }
                write!(f, "]")?;
                if d.clique != 0 {
                    write!(f, "{{clique {} base {}}}", d.clique, d.base_id)?;
                }
            }
            RefBase::Value(v) => write!(f, "{v}")?,
            RefBase::Const => write!(f, "<const>")?,
            RefBase::Code => write!(f, "<code>")?,
        }
        for c in &self.path {
            match c {
                Component::Field(field) => write!(f, ".{field}")?,
                Component::Index { index, .. } => write!(f, "[{index}]")?,
                Component::Reinterpret(ty) => write!(f, " as {ty}")?,
                Component::BitFieldRef {
                    bit_offset,
                    bit_size,
                    ..
                } => write!(f, "{{{bit_offset}:{bit_size}}}")?,
            }
        }
        Ok(())
    }
}
