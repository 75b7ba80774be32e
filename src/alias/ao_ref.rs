//! Memory references as seen by the alias oracle.
//!
//! An [`AoRef`] wraps a [`MemRef`] and lazily computes what the oracle needs to know about it:
//! the base object with the bit range accessed inside it, and the alias sets of the access and
//! of its base. A reference can also be synthesized from a pointer and a size, for the memory
//! accessed by a builtin call.

use crate::alias::tbaa::{AliasSet, AliasSetTable};
use crate::ir::{
    BinaryOp, Component, Deref, Function, InstData, MemRef, Operand, RangeInfo, RefBase, Type,
    TypeKind,
};
use core::cell::{Cell, OnceCell};
use core::fmt;

/// The base object of a reference and the bits accessed inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseExtent {
    /// The base object. Dereferences of constant addresses are folded into the declaration.
    pub base: RefBase,
    /// Offset of the access from the start of the base, in bits. For a dereference base this
    /// does not include the constant offset of the dereference itself.
    pub offset: i64,
    /// Size of the access in bits, if known.
    pub size: Option<u64>,
    /// Upper bound on the number of bits that may be accessed, if known.
    pub max_size: Option<u64>,
}

impl BaseExtent {
    /// Is the extent of the access known exactly?
    pub fn is_exact(&self) -> bool {
        self.size.is_some() && self.size == self.max_size
    }
}

/// A memory reference being queried.
///
/// The cached properties are computed on first use. An `AoRef` is meant to live for the
/// duration of one query, or of one walk.
pub struct AoRef<'a> {
    mem: Option<&'a MemRef>,
    extent: OnceCell<BaseExtent>,
    ref_set: Cell<Option<AliasSet>>,
    base_set: Cell<Option<AliasSet>>,
    volatile: bool,
}

impl<'a> AoRef<'a> {
    /// The reference accessing `mem`.
    pub fn new(mem: &'a MemRef) -> Self {
        Self {
            mem: Some(mem),
            extent: OnceCell::new(),
            ref_set: Cell::new(None),
            base_set: Cell::new(None),
            volatile: mem.volatile,
        }
    }

    /// The reference accessing `size` bytes at `ptr`, or an unknown amount of memory starting at
    /// `ptr` if `size` is not a constant.
    ///
    /// A pointer produced by taking an address, or by adding a constant to another pointer, is
    /// looked through once to find the object it points into.
    pub fn from_pointer_and_size(func: &Function, ptr: Operand, size: Option<Operand>) -> Self {
        let extent = extent_from_pointer_and_size(func, ptr, size);
        crate::trace!(
            "{ptr} with size {size:?} accesses {} at {} size {:?}",
            DisplayBase(&extent.base),
            extent.offset,
            extent.size
        );
        let r = Self {
            mem: None,
            extent: OnceCell::new(),
            ref_set: Cell::new(Some(AliasSet::WILDCARD)),
            base_set: Cell::new(Some(AliasSet::WILDCARD)),
            volatile: false,
        };
        let _ = r.extent.set(extent);
        r
    }

    /// The reference expression, if the reference was built from one.
    pub fn mem(&self) -> Option<&'a MemRef> {
        self.mem
    }

    /// Is the access volatile?
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// The base object and extent of the access.
    pub fn extent(&self, func: &Function) -> &BaseExtent {
        self.extent.get_or_init(|| {
            let mem = self
                .mem
                .expect("references without an expression have a preset extent");
            base_and_extent(func, mem)
        })
    }

    /// The base object of the access.
    pub fn base(&self, func: &Function) -> &RefBase {
        &self.extent(func).base
    }

    /// The alias set of the access.
    pub fn alias_set(&self, func: &Function, tbaa: &AliasSetTable) -> AliasSet {
        if let Some(set) = self.ref_set.get() {
            return set;
        }
        let set = match self.mem {
            Some(mem) => ref_alias_set(func, tbaa, mem),
            None => AliasSet::WILDCARD,
        };
        self.ref_set.set(Some(set));
        set
    }

    /// The alias set of the base object of the access.
    pub fn base_alias_set(&self, func: &Function, tbaa: &AliasSetTable) -> AliasSet {
        if let Some(set) = self.base_set.get() {
            return set;
        }
        let set = match self.mem {
            Some(mem) => base_alias_set(func, tbaa, &mem.base),
            None => AliasSet::WILDCARD,
        };
        self.base_set.set(Some(set));
        set
    }
}

impl fmt::Display for AoRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.mem, self.extent.get()) {
            (Some(mem), _) => write!(f, "{mem}"),
            (None, Some(e)) => write!(f, "{}+{}:{:?}", DisplayBase(&e.base), e.offset, e.size),
            (None, None) => f.write_str("<ref>"),
        }
    }
}

struct DisplayBase<'b>(&'b RefBase);

impl fmt::Display for DisplayBase<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            RefBase::Var(v) => write!(f, "{v}"),
            RefBase::Deref(d) => write!(f, "MEM[{}]", d.ptr),
            RefBase::Value(v) => write!(f, "{v}"),
            RefBase::Const => f.write_str("<const>"),
            RefBase::Code => f.write_str("<code>"),
        }
    }
}

/// The constant byte offset of a dereference, including the offset of a constant address.
pub fn mem_ref_offset(d: &Deref) -> i64 {
    match d.ptr {
        Operand::Addr { offset, .. } => d.offset + offset,
        _ => d.offset,
    }
}

/// Decompose the whole of `mem` into its base object and accessed bit range.
pub fn base_and_extent(func: &Function, mem: &MemRef) -> BaseExtent {
    base_and_extent_at(func, mem, mem.depth())
}

/// Decompose the sub-reference of `mem` made of its base and first `depth` components.
///
/// Variable array indices extend `max_size` to the remaining extent of the array, which is
/// unknown for arrays at the end of their containing object.
pub fn base_and_extent_at(func: &Function, mem: &MemRef, depth: usize) -> BaseExtent {
    let types = &func.types;
    let path = &mem.path[..depth];

    let size = match path.last() {
        Some(Component::Field(f)) => types.field(*f).bit_size,
        Some(Component::BitFieldRef { bit_size, .. }) => Some(*bit_size),
        _ => types.size_bits(mem.type_at(func, depth)),
    };
    let mut max_size: Option<i128> = size.map(i128::from);
    let mut offset: i128 = 0;
    let mut seen_variable_array = false;

    // Walk from the outermost component inwards.
    for d in (0..depth).rev() {
        match &path[d] {
            Component::BitFieldRef { bit_offset, .. } => offset += i128::from(*bit_offset),
            Component::Field(f) => {
                let field = types.field(*f);
                let pos = i128::from(field.bit_position());
                offset += pos;
                let container = mem.type_at(func, d);
                let last = types.fields_of(container).last() == Some(f);
                if seen_variable_array && (last || !types.is_record(container)) {
                    // The variable index may reach into the padding after the field.
                    max_size = match (max_size, field.bit_size, types.size_bits(container)) {
                        (Some(m), Some(fsize), Some(csize)) => {
                            Some(m + i128::from(csize) - i128::from(fsize) - pos)
                        }
                        _ => None,
                    };
                }
            }
            Component::Index { index, array } => {
                let (elem, low) = match *types.kind(*array) {
                    TypeKind::Array { elem, low_bound, .. } => (elem, i128::from(low_bound)),
                    TypeKind::Vector { elem, .. } => (elem, 0),
                    _ => (mem.type_at(func, d + 1), 0),
                };
                let elem_bits = types.size_bits(elem).map(i128::from);
                match (index.as_const(), elem_bits) {
                    (Some(i), Some(eb)) => {
                        offset += (i - low) * eb;
                        // A constant index further out bounds variable ones further in.
                        seen_variable_array = false;
                    }
                    _ => {
                        max_size = match (max_size, types.size_bits(*array)) {
                            (Some(_), Some(asize)) => Some(i128::from(asize) - offset),
                            _ => None,
                        };
                        seen_variable_array = true;
                        if let (Some(v), Some(eb), 0) = (index.as_value(), elem_bits, low)
                            && let Some(RangeInfo::Range { min, max }) = func.range_info[v]
                        {
                            if 0 < max {
                                let rmax = (max + 1) * eb;
                                if max_size.is_none_or(|m| rmax < m) {
                                    if max_size.is_some() {
                                        seen_variable_array = false;
                                    }
                                    max_size = Some(rmax);
                                }
                            }
                            if 0 <= min {
                                offset += min * eb;
                                max_size = max_size.map(|m| m - min * eb);
                            }
                        }
                    }
                }
            }
            Component::Reinterpret(_) => {}
        }
    }

    let mut base = mem.base.clone();
    let mut base_ty = mem.base_type(func);
    if let RefBase::Deref(deref) = &mem.base
        && let Operand::Addr { var, offset: addr_offset } = deref.ptr
    {
        base = RefBase::Var(var);
        base_ty = func.var(var).ty;
        if deref.index.is_some() {
            // The index can reach the whole object.
            offset = 0;
            max_size = None;
        } else {
            offset += i128::from(addr_offset + deref.offset) * 8;
        }
    }

    if seen_variable_array
        && let Some(m) = max_size
        && types.size_bits(base_ty).is_none_or(|s| offset + m == i128::from(s))
    {
        // The access may run past the declared end of a trailing array.
        max_size = None;
    }

    if let RefBase::Var(var) = base {
        let data = func.var(var);
        if data.is_external() && seen_variable_array {
            if types.is_array(data.ty) {
                max_size = None;
            }
        } else if max_size.is_none()
            && let Some(s) = types.size_bits(data.ty)
        {
            max_size = Some(i128::from(s) - offset);
        }
    }

    let Ok(offset) = i64::try_from(offset) else {
        return BaseExtent {
            base,
            offset: 0,
            size,
            max_size: None,
        };
    };
    BaseExtent {
        base,
        offset,
        size,
        max_size: max_size.and_then(|m| u64::try_from(m).ok()),
    }
}

/// The base object of `mem` and the constant byte offset of `mem` inside it, if the offset is a
/// compile-time constant.
pub fn addr_base_and_unit_offset(func: &Function, mem: &MemRef) -> Option<(RefBase, i64)> {
    let types = &func.types;
    let mut bits: i64 = 0;
    for (d, c) in mem.path.iter().enumerate() {
        match c {
            Component::Field(f) => bits += i64::try_from(types.field(*f).bit_position()).ok()?,
            Component::BitFieldRef { bit_offset, .. } => {
                bits += i64::try_from(*bit_offset).ok()?
            }
            Component::Index { index, array } => {
                let low = match *types.kind(*array) {
                    TypeKind::Array { low_bound, .. } => low_bound,
                    _ => 0,
                };
                let elem_bits = types.size_bits(mem.type_at(func, d + 1))?;
                let i = i64::try_from(index.as_const()?).ok()?;
                bits += (i - low).checked_mul(i64::try_from(elem_bits).ok()?)?;
            }
            Component::Reinterpret(_) => {}
        }
    }
    if bits % 8 != 0 {
        return None;
    }
    let mut bytes = bits / 8;
    let base = match &mem.base {
        RefBase::Deref(d) => match d.ptr {
            Operand::Addr { .. } if d.index.is_some() => return None,
            Operand::Addr { var, .. } => {
                bytes += mem_ref_offset(d);
                RefBase::Var(var)
            }
            _ => mem.base.clone(),
        },
        base => base.clone(),
    };
    Some((base, bytes))
}

fn extent_from_pointer_and_size(func: &Function, ptr: Operand, size: Option<Operand>) -> BaseExtent {
    let mut ptr = ptr;
    let mut extra_offset: i64 = 0;
    let mut addr_of: Option<&MemRef> = None;
    if let Some(v) = ptr.as_value() {
        match func.dfg.value_inst_data(v) {
            Some(InstData::AddrOf { mem, .. }) => addr_of = Some(&**mem),
            Some(&InstData::Copy { src, .. }) if matches!(src, Operand::Addr { .. }) => ptr = src,
            Some(&InstData::Binary {
                op: BinaryOp::PointerAdd,
                args: [base, off],
                ..
            }) => {
                if let Some(c) = off.as_const().and_then(|c| i64::try_from(c).ok()) {
                    ptr = base;
                    extra_offset = c.saturating_mul(8);
                }
            }
            _ => {}
        }
    }

    let mut size = size
        .and_then(Operand::as_const)
        .filter(|&s| 0 <= s && s <= i128::from(i64::MAX / 8))
        .map(|s| s as u64 * 8);

    let (base, offset) = if let Some(mem) = addr_of {
        match addr_base_and_unit_offset(func, mem) {
            Some((base, bytes)) => (base, bytes * 8),
            None => {
                size = None;
                (base_and_extent(func, mem).base, 0)
            }
        }
    } else if let Operand::Addr { var, offset } = ptr {
        (RefBase::Var(var), offset * 8)
    } else {
        let types = &func.types;
        (
            RefBase::Deref(Deref::new(ptr, types.char, types.void_ptr)),
            0,
        )
    };

    BaseExtent {
        base,
        offset: offset + extra_offset,
        size,
        max_size: size,
    }
}

/// The alias set of an access through a pointer of type `ptr_ty`.
pub fn deref_alias_set(func: &Function, tbaa: &AliasSetTable, ptr_ty: Type) -> AliasSet {
    match *func.types.kind(ptr_ty) {
        TypeKind::Pointer { ref_all: true, .. } => AliasSet::WILDCARD,
        TypeKind::Pointer { pointee, .. } => tbaa.set_of(pointee),
        _ => AliasSet::WILDCARD,
    }
}

/// Does the dereference access its memory with a type other than the pointee of its alias
/// pointer type?
pub fn is_view_converted(func: &Function, deref: &Deref) -> bool {
    let types = &func.types;
    types
        .pointee(deref.alias_ptr_ty)
        .is_none_or(|p| types.canonical(p) != types.canonical(deref.ty))
}

fn is_ref_all(func: &Function, ptr_ty: Type) -> bool {
    matches!(
        func.types.kind(ptr_ty),
        TypeKind::Pointer { ref_all: true, .. }
    )
}

fn base_alias_set(func: &Function, tbaa: &AliasSetTable, base: &RefBase) -> AliasSet {
    match base {
        RefBase::Deref(d) if is_ref_all(func, d.alias_ptr_ty) => AliasSet::WILDCARD,
        RefBase::Deref(d) if is_view_converted(func, d) => {
            deref_alias_set(func, tbaa, d.alias_ptr_ty)
        }
        RefBase::Deref(d) => tbaa.set_of(d.ty),
        RefBase::Var(v) => tbaa.set_of(func.var(*v).ty),
        RefBase::Value(v) => tbaa.set_of(func.dfg.value_type(*v)),
        RefBase::Const | RefBase::Code => AliasSet::WILDCARD,
    }
}

fn ref_alias_set(func: &Function, tbaa: &AliasSetTable, mem: &MemRef) -> AliasSet {
    let types = &func.types;
    if let RefBase::Deref(d) = &mem.base {
        if is_ref_all(func, d.alias_ptr_ty) {
            return AliasSet::WILDCARD;
        }
        if is_view_converted(func, d) {
            return deref_alias_set(func, tbaa, d.alias_ptr_ty);
        }
    }

    // Members that cannot have their address taken use the alias set of the innermost
    // object containing them that can. So do union members accessed through the union.
    let parent = mem.path.iter().enumerate().find_map(|(d, c)| {
        let container = mem.type_at(func, d);
        let uses_parent = match c {
            Component::Field(f) => types.field(*f).bit_field || types.is_union(container),
            c => c.is_reinterpretation(),
        };
        (uses_parent || tbaa.set_of(container).is_wildcard()).then_some(d)
    });
    tbaa.set_of(mem.type_at(func, parent.unwrap_or(mem.depth())))
}

fn in_range(val: i64, pos: i64, size: Option<u64>) -> bool {
    if val < pos {
        return false;
    }
    size.is_none_or(|s| i128::from(val) - i128::from(pos) < i128::from(s))
}

/// May the bit ranges `[pos1, pos1 + size1)` and `[pos2, pos2 + size2)` overlap? Unknown sizes
/// extend to infinity, empty ranges overlap nothing.
pub fn ranges_maybe_overlap(pos1: i64, size1: Option<u64>, pos2: i64, size2: Option<u64>) -> bool {
    if in_range(pos2, pos1, size1) {
        return size2 != Some(0);
    }
    if in_range(pos1, pos2, size2) {
        return size1 != Some(0);
    }
    false
}

/// Is `[pos1, pos1 + size1)` known to be inside `[pos2, pos2 + size2)`?
pub fn known_subrange(pos1: i64, size1: Option<u64>, pos2: i64, size2: Option<u64>) -> bool {
    let (Some(size1), Some(size2)) = (size1, size2) else {
        return false;
    };
    pos1 >= pos2
        && size1 <= size2
        && i128::from(pos1) - i128::from(pos2) <= i128::from(size2) - i128::from(size1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::{Linkage, VarData};

    #[test]
    fn overlap() {
        assert!(ranges_maybe_overlap(0, Some(32), 16, Some(32)));
        assert!(!ranges_maybe_overlap(0, Some(32), 32, Some(32)));
        assert!(ranges_maybe_overlap(64, None, 1000, Some(8)));
        assert!(!ranges_maybe_overlap(64, None, 0, Some(64)));
        assert!(!ranges_maybe_overlap(0, Some(0), 0, Some(8)));
        assert!(known_subrange(8, Some(8), 0, Some(32)));
        assert!(!known_subrange(24, Some(16), 0, Some(32)));
        assert!(!known_subrange(0, None, 0, Some(32)));
    }

    #[test]
    fn fields_and_indices() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let i64t = func.types.int(64, true);
        let arr = func.types.array(i32t, Some(10));
        let mut b = func.types.record_builder("s");
        let fa = b.field("a", i32t);
        let fb = b.field("b", arr);
        let s = b.finish();
        let x = func.declare_var(VarData::local("x", s));
        let i = func.declare_param("i", i64t);

        let e = base_and_extent(&func, &MemRef::var(x).field(fa));
        assert_eq!((e.base, e.offset, e.size, e.max_size), (RefBase::Var(x), 0, Some(32), Some(32)));

        let c = func.iconst(i64t, 3);
        let e = base_and_extent(&func, &MemRef::var(x).field(fb).index(c, arr));
        assert_eq!((e.offset, e.size, e.max_size), (32 + 96, Some(32), Some(32)));
        assert!(e.is_exact());

        // A variable index may touch the whole array.
        let mem = MemRef::var(x).field(fb).index(i.into(), arr);
        let e = base_and_extent(&func, &mem);
        assert_eq!((e.offset, e.size, e.max_size), (32, Some(32), Some(320)));

        // Unless the index is known to be small.
        func.range_info[i] = Some(RangeInfo::Range { min: 2, max: 4 });
        let e = base_and_extent(&func, &mem);
        assert_eq!((e.offset, e.size, e.max_size), (32 + 64, Some(32), Some(96)));
    }

    #[test]
    fn trailing_arrays() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let i64t = func.types.int(64, true);
        let mut b = func.types.record_builder("flex");
        b.field("len", i32t);
        let data = b.flexible_array("data", i32t);
        let flex = b.finish();
        let flex_arr = func.types.field(data).ty;
        let pflex = func.types.pointer_to(flex);
        let p = func.declare_param("p", pflex);
        let i = func.declare_param("i", i64t);

        let mem = MemRef::deref(Deref::new(p.into(), flex, pflex))
            .field(data)
            .index(i.into(), flex_arr);
        let e = base_and_extent(&func, &mem);
        assert!(e.base.is_deref());
        assert_eq!((e.offset, e.size, e.max_size), (32, Some(32), None));
    }

    #[test]
    fn constant_addresses_fold() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let pi = func.types.pointer_to(i32t);
        let arr = func.types.array(i32t, Some(4));
        let g = func.declare_var(VarData::global("g", arr, Linkage::Static));
        let addr = Operand::Addr { var: g, offset: 4 };

        let mem = MemRef::deref(Deref::new(addr, i32t, pi).with_offset(4));
        let e = base_and_extent(&func, &mem);
        assert_eq!((e.base, e.offset, e.size), (RefBase::Var(g), 64, Some(32)));
        assert_eq!(addr_base_and_unit_offset(&func, &mem), Some((RefBase::Var(g), 8)));

        let r = AoRef::from_pointer_and_size(&func, addr, Some(func.iconst(i32t, 8)));
        let e = r.extent(&func);
        assert_eq!((e.base.clone(), e.offset, e.size), (RefBase::Var(g), 32, Some(64)));
    }

    #[test]
    fn pointer_producers() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let i64t = func.types.int(64, true);
        let pi = func.types.pointer_to(i32t);
        let arr = func.types.array(i32t, Some(8));
        let a = func.declare_var(VarData::local("a", arr).address_taken());
        let q = func.declare_param("q", pi);
        let n = func.declare_param("n", i64t);
        let block = func.dfg.make_block();
        let mut cur = FuncCursor::new(&mut func);
        cur.insert_block(block);
        let two = cur.func.iconst(i64t, 2);
        let eight = cur.func.iconst(i64t, 8);
        let p_const = cur.ins().addr_of(pi, MemRef::var(a).index(two, arr));
        let p_var = cur.ins().addr_of(pi, MemRef::var(a).index(n.into(), arr));
        let q8 = cur.ins().binary(BinaryOp::PointerAdd, pi, q, eight);
        cur.ins().ret(None);

        let r = AoRef::from_pointer_and_size(&func, p_const.into(), Some(func.iconst(i64t, 4)));
        let e = r.extent(&func);
        assert_eq!((e.base.clone(), e.offset, e.size), (RefBase::Var(a), 64, Some(32)));

        // A variable offset leaves the size unknown.
        let r = AoRef::from_pointer_and_size(&func, p_var.into(), Some(func.iconst(i64t, 4)));
        let e = r.extent(&func);
        assert_eq!((e.base.clone(), e.offset, e.size), (RefBase::Var(a), 0, None));

        let r = AoRef::from_pointer_and_size(&func, q8.into(), None);
        let e = r.extent(&func);
        assert_eq!(e.offset, 64);
        assert_eq!(e.base.as_deref().map(|d| d.ptr), Some(Operand::Value(q)));
        assert_eq!(e.max_size, None);
    }

    #[test]
    fn alias_sets() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let f32t = func.types.float(32);
        let s = func.types.record("s", &[("i", i32t), ("f", f32t)]);
        let ps = func.types.pointer_to(s);
        let ref_all = func.types.pointer_to_ref_all(s);
        let mut u = func.types.union_builder("u");
        let ui = u.field("i", i32t);
        u.field("f", f32t);
        let ut = u.finish();
        let p = func.declare_param("p", ps);
        let x = func.declare_var(VarData::local("x", ut));
        let fi = func.types.fields_of(s)[0];
        let tbaa = AliasSetTable::new(&func.types, true);

        let direct = MemRef::deref(Deref::new(p.into(), s, ps)).field(fi);
        let r = AoRef::new(&direct);
        assert_eq!(r.alias_set(&func, &tbaa), tbaa.set_of(i32t));
        assert_eq!(r.base_alias_set(&func, &tbaa), tbaa.set_of(s));

        let through_char = MemRef::deref(Deref::new(p.into(), s, ref_all)).field(fi);
        let r = AoRef::new(&through_char);
        assert!(r.alias_set(&func, &tbaa).is_wildcard());
        assert!(r.base_alias_set(&func, &tbaa).is_wildcard());

        // Accessing an int through a pointer to the record uses the record's set.
        let punned = MemRef::deref(Deref::new(p.into(), i32t, ps));
        assert_eq!(AoRef::new(&punned).alias_set(&func, &tbaa), tbaa.set_of(s));

        let member = MemRef::var(x).field(ui);
        assert_eq!(AoRef::new(&member).alias_set(&func, &tbaa), tbaa.set_of(ut));
    }
}
