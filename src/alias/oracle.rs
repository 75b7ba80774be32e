//! The alias oracle.
//!
//! The oracle answers whether two memory references may access the same memory, and whether a
//! statement may read, write or fully overwrite a reference. Every answer is conservative:
//! `true` from a may-alias query only means that no disambiguation succeeded.
//!
//! Disambiguation proceeds from cheap to expensive: the base objects and the accessed bit
//! ranges, restrict cliques, type-based alias sets, points-to sets, and finally the structure of
//! the access paths.

use crate::alias::access_path::{PathOverlap, PathRef, SubRef};
use crate::alias::ao_ref::{
    AoRef, BaseExtent, base_and_extent, is_view_converted, known_subrange, mem_ref_offset,
    ranges_maybe_overlap,
};
use crate::alias::stats::AliasStats;
use crate::alias::tbaa::{AliasSetTable, TypeMatch, compare_sizes};
use crate::ir::{
    BinaryOp, Builtin, CallData, CallFlags, Callee, Component, Deref, Function, Inst, InstData,
    MemRef, Operand, RefBase, RetVal, Var,
};
use crate::settings::Flags;
use crate::trace;

/// Alias queries about the memory references of one function.
pub struct AliasOracle<'a> {
    pub(crate) func: &'a Function,
    pub(crate) flags: &'a Flags,
    pub(crate) stats: Option<&'a AliasStats>,
    pub(crate) tbaa: AliasSetTable<'a>,
}

fn full(mem: &MemRef) -> SubRef<'_> {
    SubRef {
        mem,
        depth: mem.depth(),
    }
}

impl<'a> AliasOracle<'a> {
    /// Create an oracle for `func`.
    pub fn new(func: &'a Function, flags: &'a Flags) -> Self {
        Self {
            func,
            flags,
            stats: None,
            tbaa: AliasSetTable::new(&func.types, flags.strict_aliasing()),
        }
    }

    /// Builder method recording query statistics in `stats`.
    pub fn with_stats(mut self, stats: &'a AliasStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The function being queried.
    pub fn func(&self) -> &'a Function {
        self.func
    }

    /// The alias set table used for type-based disambiguation.
    pub fn alias_sets(&self) -> &AliasSetTable<'a> {
        &self.tbaa
    }

    /// May `r1` and `r2` access the same memory?
    pub fn refs_may_alias(&self, r1: &AoRef, r2: &AoRef) -> bool {
        self.refs_may_alias_tbaa(r1, r2, true)
    }

    /// May `r1` and `r2` access the same memory? Type-based rules are only used with `tbaa_p`.
    pub fn refs_may_alias_tbaa(&self, r1: &AoRef, r2: &AoRef, tbaa_p: bool) -> bool {
        let res = self.refs_may_alias_2(r1, r2, tbaa_p);
        trace!("refs_may_alias({r1}, {r2}) = {res}");
        if let Some(stats) = self.stats {
            stats.refs_may_alias.record(res);
        }
        res
    }

    /// Does a `store` executing after `load` depend on it?
    pub fn refs_anti_dependent(&self, load: &MemRef, store: &MemRef) -> bool {
        self.refs_may_alias_tbaa(&AoRef::new(load), &AoRef::new(store), false)
    }

    /// Do two stores depend on each other's order?
    pub fn refs_output_dependent(&self, store1: &MemRef, store2: &MemRef) -> bool {
        self.refs_may_alias_tbaa(&AoRef::new(store1), &AoRef::new(store2), false)
    }

    fn refs_may_alias_2(&self, r1: &AoRef, r2: &AoRef, tbaa_p: bool) -> bool {
        let func = self.func;
        let e1 = r1.extent(func);
        let e2 = r2.extent(func);

        // Registers and constants used as objects, like the source of a struct copy from a
        // register.
        match (&e1.base, &e2.base) {
            (RefBase::Value(_) | RefBase::Const, _) | (_, RefBase::Value(_) | RefBase::Const) => {
                return false;
            }
            // Aliases of code are not tracked.
            (RefBase::Code, _) | (_, RefBase::Code) => return true,
            _ => {}
        }

        if r1.is_volatile() && r2.is_volatile() {
            return true;
        }

        // Offset based disambiguation of two declarations comes before TBAA, so type punning
        // through unions works on must-alias accesses.
        if let (&RefBase::Var(v1), &RefBase::Var(v2)) = (&e1.base, &e2.base) {
            return self.decl_refs_may_alias(r1, v1, e1, r2, v2, e2);
        }

        // Accesses in the same restrict clique through different restrict pointers.
        if let (RefBase::Deref(d1), RefBase::Deref(d2)) = (&e1.base, &e2.base)
            && d1.clique != 0
            && d1.clique == d2.clique
            && d1.base_id != d2.base_id
        {
            return false;
        }

        // Put the declaration first.
        let (r1, e1, r2, e2) = if e1.base.is_deref() && e2.base.is_var() {
            (r2, e2, r1, e1)
        } else {
            (r1, e1, r2, e2)
        };

        if tbaa_p
            && self.flags.strict_aliasing()
            && !self.tbaa.alias_sets_conflict(
                r1.alias_set(func, &self.tbaa),
                r2.alias_set(func, &self.tbaa),
            )
        {
            return false;
        }

        // Memory that may not be written cannot be clobbered by the other access.
        let readonly = |base: &RefBase| {
            base.as_deref()
                .and_then(|d| d.ptr.as_value())
                .is_some_and(|p| func.dfg.value_data(p).points_to_readonly)
        };
        if readonly(&e1.base) || readonly(&e2.base) {
            return false;
        }

        match (&e1.base, &e2.base) {
            (&RefBase::Var(var), RefBase::Deref(d2)) => {
                self.indirect_ref_may_alias_decl(r2, d2, e2, r1, var, e1, tbaa_p)
            }
            (RefBase::Deref(d1), RefBase::Deref(d2)) => {
                self.indirect_refs_may_alias(r1, d1, e1, r2, d2, e2, tbaa_p)
            }
            _ => true,
        }
    }

    /// Can two declarations be the same object?
    fn same_decl(&self, v1: Var, v2: Var) -> bool {
        // Different register variables may be bound to the same hardware register.
        v1 == v2 || (self.func.var(v1).hard_register && self.func.var(v2).hard_register)
    }

    fn decl_refs_may_alias(
        &self,
        r1: &AoRef,
        v1: Var,
        e1: &BaseExtent,
        r2: &AoRef,
        v2: Var,
        e2: &BaseExtent,
    ) -> bool {
        if !self.same_decl(v1, v2) {
            return false;
        }
        if !ranges_maybe_overlap(e1.offset, e1.max_size, e2.offset, e2.max_size) {
            return false;
        }
        if e1.is_exact() && e2.is_exact() {
            return true;
        }
        // Components with variable positions.
        if let (Some(m1), Some(m2)) = (r1.mem(), r2.mem())
            && m1.depth() > 0
            && m2.depth() > 0
            && self.nonoverlapping_refs_since_match(None, full(m1), None, full(m2), false)
                == PathOverlap::Disjoint
        {
            return false;
        }
        true
    }

    /// `r1` is based on the dereference `d1`, `r2` on the declaration `var`.
    fn indirect_ref_may_alias_decl(
        &self,
        r1: &AoRef,
        d1: &Deref,
        e1: &BaseExtent,
        r2: &AoRef,
        var: Var,
        e2: &BaseExtent,
        tbaa_p: bool,
    ) -> bool {
        let func = self.func;
        let types = &func.types;
        let tbaa = &self.tbaa;

        // The pointer cannot point before the start of the declaration. Indexed addressing
        // may compute bases that do.
        let moff = mem_ref_offset(d1).saturating_mul(8);
        if d1.index.is_none()
            && !ranges_maybe_overlap(e1.offset.saturating_add(moff), None, e2.offset, e2.max_size)
        {
            return false;
        }
        if !self.ptr_deref_may_alias_decl(d1.ptr, var) {
            return false;
        }

        // Disambiguations relying on strict aliasing rules follow.
        if !self.flags.strict_aliasing() || !tbaa_p {
            return true;
        }
        let base1_set = r1.base_alias_set(func, tbaa);
        let base2_set = r2.base_alias_set(func, tbaa);
        if base1_set.is_wildcard() || base2_set.is_wildcard() {
            return true;
        }
        // Nothing is known about the dynamic type of the declaration beyond its alias set
        // containing the access, so use the usual conflict test.
        if base1_set != base2_set && !tbaa.alias_sets_conflict(base1_set, base2_set) {
            return false;
        }

        // An access through the pointer bigger than the declaration cannot access it. A member
        // of a union may be accessed through a pointer to the union though.
        if let Some(pointee) = types.pointee(d1.alias_ptr_ty)
            && !types.is_union(pointee)
            && compare_sizes(types.size_bits(func.var(var).ty), types.size_bits(pointee)).is_lt()
        {
            return false;
        }

        let Some(m2) = r2.mem() else {
            return true;
        };
        // A declaration accessed through a dereference of its address.
        let mut doffset2 = e2.offset;
        let dbase2 = m2.base.as_deref();
        if let Some(d2) = dbase2 {
            doffset2 = doffset2.saturating_sub(mem_ref_offset(d2).saturating_mul(8));
            if is_view_converted(func, d2) {
                return true;
            }
        }
        if is_view_converted(func, d1) {
            return true;
        }

        // Accesses through the same type do not alias if they do not overlap, with offsets
        // measured from the start of the type. Arrays of variable size are not objects, they
        // may overlap by a multiple of their element size.
        if d1.index.is_none()
            && dbase2.is_none_or(|d| d.index.is_none())
            && tbaa.same_type_for_tbaa(d1.ty, m2.base_type(func)) == TypeMatch::Same
        {
            let partial = types.is_array(d1.ty) && types.size_bits(d1.ty).is_none();
            if !partial && !ranges_maybe_overlap(e1.offset, e1.max_size, doffset2, e2.max_size) {
                return false;
            }
            let Some(m1) = r1.mem() else {
                return true;
            };
            if !partial && e1.is_exact() && e2.is_exact() {
                return true;
            }
            let match2 = if dbase2.is_some() { None } else { Some(0) };
            return match self.nonoverlapping_refs_since_match(
                Some(0),
                full(m1),
                match2,
                full(m2),
                partial,
            ) {
                PathOverlap::Unknown => !self.nonoverlapping_component_refs(full(m1), full(m2)),
                res => res != PathOverlap::Disjoint,
            };
        }

        match r1.mem() {
            Some(m1) if m1.depth() > 0 || m2.depth() > 0 => self.aliasing_component_refs(
                PathRef {
                    mem: m1,
                    ref_set: r1.alias_set(func, tbaa),
                    base_set: base1_set,
                    offset: e1.offset,
                    max_size: e1.max_size,
                },
                PathRef {
                    mem: m2,
                    ref_set: r2.alias_set(func, tbaa),
                    base_set: base2_set,
                    offset: e2.offset,
                    max_size: e2.max_size,
                },
            ),
            _ => true,
        }
    }

    fn indirect_refs_may_alias(
        &self,
        r1: &AoRef,
        d1: &Deref,
        e1: &BaseExtent,
        r2: &AoRef,
        d2: &Deref,
        e2: &BaseExtent,
        tbaa_p: bool,
    ) -> bool {
        let func = self.func;
        let types = &func.types;
        let tbaa = &self.tbaa;

        // Two dereferences of the same pointer.
        if d1.ptr == d2.ptr && d1.index == d2.index {
            let moff1 = mem_ref_offset(d1).saturating_mul(8);
            let moff2 = mem_ref_offset(d2).saturating_mul(8);
            if !ranges_maybe_overlap(
                e1.offset.saturating_add(moff1),
                e1.max_size,
                e2.offset.saturating_add(moff2),
                e2.max_size,
            ) {
                return false;
            }
            if e1.is_exact() && e2.is_exact() {
                return true;
            }
            if let (Some(m1), Some(m2)) = (r1.mem(), r2.mem()) {
                match self.nonoverlapping_refs_since_match(None, full(m1), None, full(m2), false) {
                    PathOverlap::Unknown => {}
                    res => return res != PathOverlap::Disjoint,
                }
            }
        }

        if !self.ptr_derefs_may_alias(d1.ptr, d2.ptr) {
            return false;
        }

        // Disambiguations relying on strict aliasing rules follow.
        if !self.flags.strict_aliasing() || !tbaa_p {
            return true;
        }
        let base1_set = r1.base_alias_set(func, tbaa);
        let base2_set = r2.base_alias_set(func, tbaa);
        if base1_set.is_wildcard() || base2_set.is_wildcard() {
            return true;
        }
        if base1_set != base2_set && !tbaa.alias_sets_conflict(base1_set, base2_set) {
            return false;
        }
        if is_view_converted(func, d1) || is_view_converted(func, d2) {
            return true;
        }

        // Accesses through pointers to the same type do not alias if they do not overlap.
        // Arrays are not objects, they may overlap by a multiple of their element size.
        if d1.index.is_none()
            && d2.index.is_none()
            && let (Some(p1), Some(p2)) = (types.pointee(d1.alias_ptr_ty), types.pointee(d2.alias_ptr_ty))
            && tbaa.same_type_for_tbaa(p1, p2) == TypeMatch::Same
        {
            let partial = types.is_array(p1);
            if !partial && !ranges_maybe_overlap(e1.offset, e1.max_size, e2.offset, e2.max_size) {
                return false;
            }
            let (Some(m1), Some(m2)) = (r1.mem(), r2.mem()) else {
                return true;
            };
            if !partial && e1.is_exact() && e2.is_exact() {
                return true;
            }
            return match self.nonoverlapping_refs_since_match(
                Some(0),
                full(m1),
                Some(0),
                full(m2),
                partial,
            ) {
                PathOverlap::Unknown => !self.nonoverlapping_component_refs(full(m1), full(m2)),
                res => res != PathOverlap::Disjoint,
            };
        }

        match (r1.mem(), r2.mem()) {
            (Some(m1), Some(m2)) if m1.depth() > 0 || m2.depth() > 0 => {
                self.aliasing_component_refs(
                    PathRef {
                        mem: m1,
                        ref_set: r1.alias_set(func, tbaa),
                        base_set: base1_set,
                        offset: e1.offset,
                        max_size: e1.max_size,
                    },
                    PathRef {
                        mem: m2,
                        ref_set: r2.alias_set(func, tbaa),
                        base_set: base2_set,
                        offset: e2.offset,
                        max_size: e2.max_size,
                    },
                )
            }
            _ => true,
        }
    }

    /// Look through conversions and offsetting of a pointer without points-to information.
    fn strip_pointer(&self, mut ptr: Operand) -> Operand {
        let dfg = &self.func.dfg;
        while let Operand::Value(v) = ptr
            && self.func.pta.get(v).is_none()
        {
            ptr = match dfg.value_inst_data(v) {
                Some(&InstData::Copy { src, .. } | &InstData::Convert { src, .. })
                    if self.is_pointer(src) =>
                {
                    src
                }
                Some(&InstData::Binary {
                    op: BinaryOp::PointerAdd,
                    args: [base, _],
                    ..
                }) => base,
                _ => break,
            };
        }
        ptr
    }

    fn is_pointer(&self, op: Operand) -> bool {
        match op {
            Operand::Value(v) => self.func.types.is_pointer(self.func.dfg.value_type(v)),
            Operand::Addr { .. } => true,
            Operand::Const { ty, .. } => self.func.types.is_pointer(ty),
        }
    }

    /// May a dereference of `ptr` access the declaration `var`?
    pub fn ptr_deref_may_alias_decl(&self, ptr: Operand, var: Var) -> bool {
        let func = self.func;
        match self.strip_pointer(ptr) {
            Operand::Addr { var: pointee, .. } => self.same_decl(pointee, var),
            Operand::Const { .. } => true,
            Operand::Value(p) => {
                if !func.types.is_pointer(func.dfg.value_type(p)) {
                    return true;
                }
                let data = func.var(var);
                if !data.may_be_aliased() {
                    return false;
                }
                match func.pta.get(p) {
                    Some(pt) => func.pta.includes(pt, var, data.is_global()),
                    None => true,
                }
            }
        }
    }

    /// May dereferences of `ptr1` and `ptr2` access the same memory? Type-based rules are
    /// up to the caller.
    pub fn ptr_derefs_may_alias(&self, ptr1: Operand, ptr2: Operand) -> bool {
        let func = self.func;
        let ptr1 = self.strip_pointer(ptr1);
        let ptr2 = self.strip_pointer(ptr2);
        match (ptr1, ptr2) {
            (Operand::Addr { var, .. }, other) | (other, Operand::Addr { var, .. }) => {
                self.ptr_deref_may_alias_decl(other, var)
            }
            (Operand::Value(p1), Operand::Value(p2)) => {
                let types = &func.types;
                if !types.is_pointer(func.dfg.value_type(p1))
                    || !types.is_pointer(func.dfg.value_type(p2))
                {
                    return true;
                }
                // Two identical pointers alias even with empty points-to sets.
                if p1 == p2 {
                    return true;
                }
                match (func.pta.get(p1), func.pta.get(p2)) {
                    (Some(pt1), Some(pt2)) => func.pta.intersect(pt1, pt2),
                    _ => true,
                }
            }
            _ => true,
        }
    }

    /// May a dereference of `ptr` access the memory of `r`?
    pub fn ptr_deref_may_alias_ref(&self, ptr: Operand, r: &AoRef) -> bool {
        match *r.base(self.func) {
            RefBase::Deref(ref d) => self.ptr_derefs_may_alias(ptr, d.ptr),
            RefBase::Var(var) => self.ptr_deref_may_alias_decl(ptr, var),
            _ => true,
        }
    }

    /// Do `ptr1` and `ptr2` compare unequal because they point to different objects?
    pub fn ptrs_compare_unequal(&self, ptr1: Operand, ptr2: Operand) -> bool {
        let func = self.func;
        let (obj, ptr) = match (ptr1, ptr2) {
            (Operand::Addr { var, .. }, Operand::Value(p))
            | (Operand::Value(p), Operand::Addr { var, .. }) => (var, p),
            _ => return false,
        };
        let Some(pt) = func.pta.get(ptr) else {
            return false;
        };
        // Restrict does not permit optimizing pointer comparisons, and interposable objects
        // may turn out to be the same.
        if pt.vars_contains_restrict || pt.vars_contains_interposable {
            return false;
        }
        // An object defined elsewhere may be weak and live at address zero.
        let data = func.var(obj);
        if data.is_external() {
            return false;
        }
        !func.pta.includes(pt, obj, data.is_global())
    }

    /// May a dereference of `ptr` access global memory?
    pub fn ptr_deref_may_alias_global(&self, ptr: Operand) -> bool {
        let func = self.func;
        match self.strip_pointer(ptr) {
            Operand::Addr { var, .. } => func.var(var).is_global(),
            Operand::Const { .. } => true,
            Operand::Value(p) => match func.pta.get(p) {
                Some(pt) => func.pta.includes_global(pt),
                None => true,
            },
        }
    }

    /// May `r` access global memory?
    pub fn ref_may_alias_global(&self, r: &AoRef) -> bool {
        match *r.base(self.func) {
            RefBase::Var(var) => self.func.var(var).is_global(),
            RefBase::Deref(ref d) => self.ptr_deref_may_alias_global(d.ptr),
            _ => true,
        }
    }

    /// May `inst` write global memory?
    pub fn stmt_may_clobber_global(&self, inst: Inst) -> bool {
        let data = self.func.inst(inst);
        if !data.writes_memory() {
            return false;
        }
        match data {
            InstData::Store { mem, .. } | InstData::Aggregate { dst: mem, .. } => {
                self.ref_may_alias_global(&AoRef::new(mem))
            }
            _ => true,
        }
    }

    /// May `inst` read the memory of `r`?
    pub fn ref_maybe_used_by_stmt(&self, inst: Inst, r: &AoRef, tbaa_p: bool) -> bool {
        let func = self.func;
        match func.inst(inst) {
            InstData::Load { mem, .. } | InstData::Aggregate { src: mem, .. } => {
                self.refs_may_alias_tbaa(&AoRef::new(mem), r, tbaa_p)
            }
            InstData::Call(call) => self.ref_maybe_used_by_call(call, r, tbaa_p),
            InstData::Return { value } => {
                if let Some(RetVal::Mem(mem)) = value
                    && self.refs_may_alias_tbaa(&AoRef::new(mem), r, tbaa_p)
                {
                    return true;
                }
                // Memory visible to the caller is used by the return.
                match *r.base(func) {
                    RefBase::Var(var) => func.var(var).is_global(),
                    RefBase::Deref(ref d) => self.ptr_deref_may_alias_global(d.ptr),
                    _ => false,
                }
            }
            InstData::Asm { .. } => true,
            _ => false,
        }
    }

    /// May `inst` write the memory of `r`?
    pub fn stmt_may_clobber_ref(&self, inst: Inst, r: &AoRef, tbaa_p: bool) -> bool {
        match self.func.inst(inst) {
            InstData::Call(call) => {
                if let Some(dest) = call.dest_mem()
                    && self.refs_may_alias_tbaa(r, &AoRef::new(dest), tbaa_p)
                {
                    return true;
                }
                self.call_may_clobber_ref(call, r)
            }
            InstData::Store { mem, .. } | InstData::Aggregate { dst: mem, .. } => {
                self.refs_may_alias_tbaa(r, &AoRef::new(mem), tbaa_p)
            }
            data @ InstData::Asm { .. } => data.writes_memory(),
            _ => false,
        }
    }

    /// May `inst` throw an exception caught in the current function?
    fn stmt_can_throw(&self, data: &InstData) -> bool {
        if !self.flags.can_throw_non_call_exceptions() {
            return false;
        }
        match data {
            InstData::Call(call) => !call.flags.contains(CallFlags::NOTHROW),
            InstData::Store { mem, .. } => mem.base.is_deref(),
            InstData::Aggregate { dst, src } => dst.base.is_deref() || src.base.is_deref(),
            _ => false,
        }
    }

    /// Does `inst` overwrite all of the memory of `r`?
    pub fn stmt_kills_ref(&self, inst: Inst, r: &AoRef) -> bool {
        let func = self.func;
        let data = func.inst(inst);

        if let Some(lhs) = data.lhs_mem()
            && !self.stmt_can_throw(data)
        {
            if let Some(mem) = r.mem()
                && self.lhs_is_literal_base(lhs, mem)
            {
                return true;
            }

            // Non-literal equal bases, with constant offset and size.
            let e = r.extent(func);
            if e.max_size.is_none() {
                return false;
            }
            let lhs_e = base_and_extent(func, lhs);
            let mut offset = lhs_e.offset;
            let mut ref_offset = e.offset;
            let mut size = lhs_e.size;
            if lhs_e.base != e.base {
                if self.same_addr_size_stores(&lhs_e, e) {
                    return true;
                }
                match (&lhs_e.base, &e.base) {
                    (RefBase::Deref(d1), RefBase::Deref(d2))
                        if d1.ptr == d2.ptr && d1.index == d2.index =>
                    {
                        if d1.offset != d2.offset {
                            offset = offset.saturating_add(mem_ref_offset(d1).saturating_mul(8));
                            ref_offset =
                                ref_offset.saturating_add(mem_ref_offset(d2).saturating_mul(8));
                        }
                    }
                    _ => size = None,
                }
            }
            if size == lhs_e.max_size && known_subrange(ref_offset, e.max_size, offset, size) {
                return true;
            }
        }

        if let InstData::Call(call) = data
            && let Some(builtin) = self.call_builtin(call)
        {
            return self.builtin_kills_ref(call, builtin, r);
        }
        false
    }

    /// Is `lhs` the same object as the reference `mem`, or one of the objects `mem` selects from?
    fn lhs_is_literal_base(&self, lhs: &MemRef, mem: &MemRef) -> bool {
        let func = self.func;
        let types = &func.types;
        // Drop components of `mem` from the outside until the outermost ones match.
        let mut depth = mem.depth();
        let mut dropped_array = None;
        while depth > 0 && !outermost_equal(lhs, mem, depth) {
            if matches!(mem.path[depth - 1], Component::Index { .. }) {
                dropped_array = Some(depth - 1);
            }
            depth -= 1;
        }
        // An access past the end of a trailing array may be outside of the candidate.
        if let Some(d) = dropped_array
            && self.array_at_end(mem, d)
        {
            return false;
        }
        types.size_bits(lhs.ty(func)) == types.size_bits(mem.type_at(func, depth))
            && same_address(lhs, lhs.depth(), mem, depth)
    }

    /// May the array indexed by component `d` of `mem` extend past the end of the object
    /// containing it?
    fn array_at_end(&self, mem: &MemRef, d: usize) -> bool {
        let types = &self.func.types;
        if let Component::Index { array, .. } = mem.path[d]
            && types.size_bits(array).is_none_or(|s| s == 0)
        {
            return true;
        }
        if !mem.base.is_deref() {
            return false;
        }
        mem.path[..d].iter().all(|c| match *c {
            Component::Field(f) => {
                let parent = types.field(f).parent;
                types.is_union(parent) || types.fields_of(parent).last() == Some(&f)
            }
            Component::Index { .. } => false,
            _ => true,
        })
    }

    fn same_addr_size_stores(&self, e1: &BaseExtent, e2: &BaseExtent) -> bool {
        let func = self.func;
        if e1.offset != 0 || e2.offset != 0 {
            return false;
        }
        let (var, d) = match (&e1.base, &e2.base) {
            (&RefBase::Var(v), RefBase::Deref(d)) | (RefBase::Deref(d), &RefBase::Var(v)) => (v, d),
            _ => return false,
        };
        if !e1.is_exact() || !e2.is_exact() || e1.size != e2.size {
            return false;
        }
        // A store through a pointer with a singleton points-to set.
        if mem_ref_offset(d) != 0 || d.index.is_some() {
            return false;
        }
        let Some(pt) = d.ptr.as_value().and_then(|p| func.pta.get(p)) else {
            return false;
        };
        if pt.anything || pt.nonlocal || pt.escaped || pt.vars.len() != 1 || !pt.vars.contains(&var)
        {
            return false;
        }
        if self.flags.can_throw_non_call_exceptions() && pt.null {
            return false;
        }
        // The pointer points to the start of the object if the store covers all of it.
        func.types.size_bits(func.var(var).ty).is_some_and(|s| Some(s) == e1.size)
    }

    /// The builtin called by `call`, if it is a direct call to one.
    pub(crate) fn call_builtin(&self, call: &CallData) -> Option<Builtin> {
        match call.callee {
            Callee::Direct(f) => self.func.ext_funcs[f].builtin,
            Callee::Indirect(_) => None,
        }
    }

    fn builtin_kills_ref(&self, call: &CallData, builtin: Builtin, r: &AoRef) -> bool {
        let func = self.func;
        match builtin {
            Builtin::Free => match (r.base(func), call.arg(0)) {
                (RefBase::Deref(d), Some(ptr)) => d.ptr == ptr,
                _ => false,
            },
            Builtin::Memcpy
            | Builtin::Mempcpy
            | Builtin::Memmove
            | Builtin::Memset
            | Builtin::MemcpyChk
            | Builtin::MempcpyChk
            | Builtin::MemmoveChk
            | Builtin::MemsetChk
            | Builtin::Strncpy
            | Builtin::Stpncpy
            | Builtin::Calloc => {
                let e = r.extent(func);
                if e.max_size.is_none() {
                    return false;
                }
                // In execution order calloc never kills anything, but it writes the same memory
                // as a later store would.
                let (dest, len) = if builtin == Builtin::Calloc {
                    let (Some(n), Some(size)) = (
                        call.arg(0).and_then(Operand::as_const),
                        call.arg(1).and_then(Operand::as_const),
                    ) else {
                        return false;
                    };
                    let (Some(dest), Some(len)) = (call.dest_value(), n.checked_mul(size)) else {
                        return false;
                    };
                    (Operand::Value(dest), len)
                } else {
                    let (Some(dest), Some(len)) =
                        (call.arg(0), call.arg(2).and_then(Operand::as_const))
                    else {
                        return false;
                    };
                    (dest, len)
                };
                let Some(len_bits) = u64::try_from(len).ok().and_then(|l| l.checked_mul(8)) else {
                    return false;
                };
                let len = Operand::Const {
                    ty: func.types.size,
                    value: len,
                };
                let dref = AoRef::from_pointer_and_size(func, dest, Some(len));
                let de = dref.extent(func);
                if de.size.is_none() {
                    return false;
                }
                let mut offset = de.offset;
                let mut ref_offset = e.offset;
                let same_base = match (&de.base, &e.base) {
                    (RefBase::Deref(d1), RefBase::Deref(d2)) => {
                        offset = offset.saturating_add(mem_ref_offset(d1).saturating_mul(8));
                        ref_offset = ref_offset.saturating_add(mem_ref_offset(d2).saturating_mul(8));
                        d1.ptr == d2.ptr
                    }
                    (RefBase::Deref(_), _) => false,
                    (b1, b2) => b1 == b2,
                };
                same_base && known_subrange(ref_offset, e.max_size, offset, Some(len_bits))
            }
            Builtin::VaEnd => match (call.arg(0), r.base(func)) {
                (Some(Operand::Addr { var, offset: 0 }), &RefBase::Var(base)) => var == base,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Are the outermost components of `a` and of the first `b_depth` components of `b` the same,
/// ignoring the objects they apply to?
fn outermost_equal(a: &MemRef, b: &MemRef, b_depth: usize) -> bool {
    match (a.path.last(), b_depth.checked_sub(1).map(|d| &b.path[d])) {
        (Some(ca), Some(cb)) => ca == cb,
        _ => false,
    }
}

/// Do the sub-references of `a` and `b` at the given depths designate the same address?
fn same_address(a: &MemRef, a_depth: usize, b: &MemRef, b_depth: usize) -> bool {
    let base_equal = match (&a.base, &b.base) {
        (RefBase::Deref(d1), RefBase::Deref(d2)) => {
            d1.ptr == d2.ptr && d1.offset == d2.offset && d1.index == d2.index
        }
        (b1, b2) => b1 == b2,
    };
    base_equal && a.path[..a_depth] == b.path[..b_depth]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::{CallArg, ExtFuncData, Linkage, PtSolution, Type, Value, VarData};
    use proptest::prelude::*;
    use crate::settings::{self, Configurable};
    use crate::test_utils::init_logging;

    fn may_alias(func: &Function, m1: &MemRef, m2: &MemRef) -> bool {
        let flags = Flags::default();
        let oracle = AliasOracle::new(func, &flags);
        let (r1, r2) = (AoRef::new(m1), AoRef::new(m2));
        let res = oracle.refs_may_alias(&r1, &r2);
        assert_eq!(res, oracle.refs_may_alias(&r2, &r1), "{m1} vs {m2}");
        res
    }

    fn relaxed() -> Flags {
        let mut b = settings::builder();
        b.set("strict_aliasing", "false").unwrap();
        Flags::new(b)
    }

    #[test]
    fn fields_through_same_pointer() {
        init_logging();
        // struct S { struct { int x; int y; } a; int b; } *p;  p->a.x vs p->a.y
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let mut b = func.types.record_builder("A");
        let x = b.field("x", i32t);
        let y = b.field("y", i32t);
        let inner = b.finish();
        let mut b = func.types.record_builder("S");
        let a = b.field("a", inner);
        b.field("b", i32t);
        let s = b.finish();
        let ps = func.types.pointer_to(s);
        let p = func.declare_param("p", ps);

        let at = |f| MemRef::deref(Deref::new(p.into(), s, ps)).field(a).field(f);
        assert!(!may_alias(&func, &at(x), &at(y)));
        assert!(may_alias(&func, &at(x), &at(x)));
    }

    #[test]
    fn declarations() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let i64t = func.types.int(64, true);
        let arr = func.types.array(i32t, Some(8));
        let a = func.declare_var(VarData::local("a", arr));
        let b = func.declare_var(VarData::local("b", arr));
        let i = func.declare_param("i", i64t);
        let c = |n| func.iconst(i64t, n);

        let elem = |v, idx: Operand| MemRef::var(v).index(idx, arr);
        assert!(!may_alias(&func, &elem(a, c(1)), &elem(b, c(1))));
        assert!(!may_alias(&func, &elem(a, c(1)), &elem(a, c(2))));
        assert!(may_alias(&func, &elem(a, c(1)), &elem(a, i.into())));
        assert!(may_alias(&func, &MemRef::var(a), &elem(a, c(7))));
        let mut r1 = func.var(a).clone();
        r1.hard_register = true;
        let r1 = func.declare_var(r1);
        let mut r2 = func.var(b).clone();
        r2.hard_register = true;
        let r2 = func.declare_var(r2);
        assert!(may_alias(&func, &MemRef::var(r1), &MemRef::var(r2)));
    }

    #[test]
    fn degenerate_bases() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let v = func.declare_param("v", i32t);
        let g = func.declare_var(VarData::global("g", i32t, Linkage::Public));
        let reg = MemRef::with_base(RefBase::Value(v));
        assert!(!may_alias(&func, &reg, &MemRef::var(g)));
        assert!(!may_alias(&func, &MemRef::with_base(RefBase::Const), &MemRef::var(g)));
        assert!(may_alias(&func, &MemRef::with_base(RefBase::Code), &MemRef::var(g)));
    }

    struct Ptrs {
        func: Function,
        int: Type,
        float: Type,
        pi: Type,
        pf: Type,
        p: Value,
        q: Value,
    }

    fn two_pointers() -> Ptrs {
        let mut func = Function::new();
        let int = func.types.int(32, true);
        let float = func.types.float(32);
        let pi = func.types.pointer_to(int);
        let pf = func.types.pointer_to(float);
        let p = func.declare_param("p", pi);
        let q = func.declare_param("q", pf);
        Ptrs {
            func,
            int,
            float,
            pi,
            pf,
            p,
            q,
        }
    }

    #[test]
    fn type_based() {
        let t = two_pointers();
        let mi = MemRef::deref(Deref::new(t.p.into(), t.int, t.pi));
        let mf = MemRef::deref(Deref::new(t.q.into(), t.float, t.pf));
        assert!(!may_alias(&t.func, &mi, &mf));

        let flags = relaxed();
        let oracle = AliasOracle::new(&t.func, &flags);
        assert!(oracle.refs_may_alias(&AoRef::new(&mi), &AoRef::new(&mf)));

        // Without TBAA the accesses are anti-dependent.
        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags);
        assert!(oracle.refs_anti_dependent(&mi, &mf));
        assert!(oracle.refs_output_dependent(&mi, &mf));
    }

    #[test]
    fn points_to_sets() {
        let mut t = two_pointers();
        let a = t.func.declare_var(VarData::local("a", t.int).address_taken());
        let b = t.func.declare_var(VarData::local("b", t.int).address_taken());
        let p2 = t.func.declare_param("p2", t.pi);
        t.func.pta.set(t.p, PtSolution::vars([a]));
        t.func.pta.set(p2, PtSolution::vars([b]));

        let m1 = MemRef::deref(Deref::new(t.p.into(), t.int, t.pi));
        let m2 = MemRef::deref(Deref::new(p2.into(), t.int, t.pi));
        assert!(!may_alias(&t.func, &m1, &m2));
        assert!(!may_alias(&t.func, &m1, &MemRef::var(b)));
        assert!(may_alias(&t.func, &m1, &MemRef::var(a)));

        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags);
        assert!(oracle.ptrs_compare_unequal(t.p.into(), Operand::Addr { var: b, offset: 0 }));
        assert!(!oracle.ptrs_compare_unequal(t.p.into(), Operand::Addr { var: a, offset: 0 }));
        assert!(!oracle.ptrs_compare_unequal(t.p.into(), t.q.into()));
        assert!(!oracle.ptr_deref_may_alias_global(t.p.into()));
        assert!(oracle.ptr_deref_may_alias_global(t.q.into()));
    }

    #[test]
    fn pointer_offsets_without_points_to() {
        let mut t = two_pointers();
        let i64t = t.func.types.int(64, true);
        let a = t.func.declare_var(VarData::local("a", t.int).address_taken());
        let b = t.func.declare_var(VarData::local("b", t.int).address_taken());
        t.func.pta.set(t.p, PtSolution::vars([a]));
        let block = t.func.dfg.make_block();
        let mut cur = FuncCursor::new(&mut t.func);
        cur.insert_block(block);
        let four = cur.func.iconst(i64t, 4);
        let p4 = cur.ins().binary(BinaryOp::PointerAdd, t.pi, t.p, four);

        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags);
        assert!(oracle.ptr_deref_may_alias_decl(p4.into(), a));
        assert!(!oracle.ptr_deref_may_alias_decl(p4.into(), b));
        assert!(oracle.ptr_derefs_may_alias(p4.into(), t.p.into()));
        assert!(oracle.ptr_deref_may_alias_decl(t.q.into(), b));
    }

    #[test]
    fn restrict_cliques() {
        let t = two_pointers();
        let p2 = t.q;
        let m1 = MemRef::deref(Deref::new(t.p.into(), t.int, t.pi).with_restrict(1, 1));
        let m2 = MemRef::deref(Deref::new(p2.into(), t.int, t.pi).with_restrict(1, 2));
        let m3 = MemRef::deref(Deref::new(p2.into(), t.int, t.pi).with_restrict(2, 2));
        assert!(!may_alias(&t.func, &m1, &m2));
        assert!(may_alias(&t.func, &m1, &m3));
    }

    #[test]
    fn readonly_memory() {
        let mut t = two_pointers();
        let g = t.func.declare_var(VarData::global("g", t.int, Linkage::Public));
        let m1 = MemRef::deref(Deref::new(t.p.into(), t.int, t.pi));
        assert!(may_alias(&t.func, &m1, &MemRef::var(g)));
        t.func.dfg.value_data_mut(t.p).points_to_readonly = true;
        assert!(!may_alias(&t.func, &m1, &MemRef::var(g)));
    }

    #[test]
    fn pointer_into_small_declaration() {
        let mut func = Function::new();
        let i16t = func.types.int(16, true);
        let i64t = func.types.int(64, true);
        let p64 = func.types.pointer_to(i64t);
        let p = func.declare_param("p", p64);
        let v = func.declare_var(VarData::global("v", i16t, Linkage::Public));
        let m1 = MemRef::deref(Deref::new(p.into(), i64t, p64));
        // A 64-bit access cannot be inside a 16-bit object.
        assert!(!may_alias(&func, &m1, &MemRef::var(v)));
    }

    #[test]
    fn statements() {
        init_logging();
        let mut t = two_pointers();
        let g = t.func.declare_var(VarData::global("g", t.int, Linkage::Public));
        let l = t.func.declare_var(VarData::local("l", t.int));
        let block = t.func.dfg.make_block();
        let mut cur = FuncCursor::new(&mut t.func);
        cur.insert_block(block);
        let store_g = cur.ins().store(MemRef::var(g), t.p);
        let store_l = cur.ins().store(MemRef::var(l), t.p);
        let asm = cur.ins().asm(true, false);
        let quiet_asm = cur.ins().asm(false, false);
        let ret = cur.ins().ret(None);

        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags);
        let (mg, ml) = (MemRef::var(g), MemRef::var(l));
        let (rg, rl) = (AoRef::new(&mg), AoRef::new(&ml));
        assert!(oracle.stmt_may_clobber_ref(store_g, &rg, true));
        assert!(!oracle.stmt_may_clobber_ref(store_g, &rl, true));
        assert!(oracle.stmt_may_clobber_ref(asm, &rl, true));
        assert!(!oracle.stmt_may_clobber_ref(quiet_asm, &rl, true));
        assert!(oracle.stmt_may_clobber_global(store_g));
        assert!(!oracle.stmt_may_clobber_global(store_l));
        assert!(oracle.ref_maybe_used_by_stmt(ret, &rg, true));
        assert!(!oracle.ref_maybe_used_by_stmt(ret, &rl, true));
        assert!(!oracle.ref_maybe_used_by_stmt(store_l, &rl, true));
        assert!(oracle.ref_may_alias_global(&rg));
        assert!(!oracle.ref_may_alias_global(&rl));
    }

    #[test]
    fn kills() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let s = func.types.record("S", &[("x", i32t), ("y", i32t)]);
        let x = func.types.fields_of(s)[0];
        let ps = func.types.pointer_to(s);
        let v = func.declare_var(VarData::local("v", s).address_taken());
        let p = func.declare_param("p", ps);
        let memset = func.import_function(ExtFuncData::builtin(Builtin::Memset));
        let free = func.import_function(ExtFuncData::builtin(Builtin::Free));
        let i64t = func.types.int(64, true);
        let block = func.dfg.make_block();
        let mut cur = FuncCursor::new(&mut func);
        cur.insert_block(block);
        let whole = cur.ins().aggregate(MemRef::var(v), MemRef::deref(Deref::new(p.into(), s, ps)));
        let zero = cur.func.iconst(i32t, 0);
        let eight = cur.func.iconst(i64t, 8);
        let four = cur.func.iconst(i64t, 4);
        let addr = Operand::Addr { var: v, offset: 0 };
        let clear8 = cur.ins().call(CallData::new(
            Callee::Direct(memset),
            [addr, zero, eight].map(CallArg::from),
        ));
        let clear4 = cur.ins().call(CallData::new(
            Callee::Direct(memset),
            [addr, zero, four].map(CallArg::from),
        ));
        let store_x = cur.ins().store(MemRef::var(v).field(x), zero);
        let freed = cur.ins().call(CallData::new(Callee::Direct(free), [CallArg::from(p)]));

        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        let mx = MemRef::var(v).field(x);
        let mv = MemRef::var(v);
        let by_p = MemRef::deref(Deref::new(p.into(), s, ps)).field(x);
        let (rx, rv, rp) = (AoRef::new(&mx), AoRef::new(&mv), AoRef::new(&by_p));

        assert!(oracle.stmt_kills_ref(whole, &rx));
        assert!(oracle.stmt_kills_ref(whole, &rv));
        assert!(oracle.stmt_kills_ref(clear8, &rv));
        assert!(oracle.stmt_kills_ref(clear4, &rx));
        assert!(!oracle.stmt_kills_ref(clear4, &rv));
        assert!(oracle.stmt_kills_ref(store_x, &rx));
        assert!(!oracle.stmt_kills_ref(store_x, &rv));
        assert!(oracle.stmt_kills_ref(freed, &rp));
        assert!(!oracle.stmt_kills_ref(freed, &rx));
    }

    #[test]
    fn single_object_store_kills() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let pi = func.types.pointer_to(i32t);
        let v = func.declare_var(VarData::local("v", i32t).address_taken());
        let p = func.declare_param("p", pi);
        func.pta.set(p, PtSolution::vars([v]));
        let block = func.dfg.make_block();
        let mut cur = FuncCursor::new(&mut func);
        cur.insert_block(block);
        let zero = cur.func.iconst(i32t, 0);
        let store = cur.ins().store(MemRef::deref(Deref::new(p.into(), i32t, pi)), zero);

        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        let mv = MemRef::var(v);
        assert!(oracle.stmt_kills_ref(store, &AoRef::new(&mv)));
    }

    #[test]
    fn statistics() {
        let t = two_pointers();
        let stats = AliasStats::default();
        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags).with_stats(&stats);
        let mi = MemRef::deref(Deref::new(t.p.into(), t.int, t.pi));
        let mf = MemRef::deref(Deref::new(t.q.into(), t.float, t.pf));
        oracle.refs_may_alias(&AoRef::new(&mi), &AoRef::new(&mf));
        oracle.refs_may_alias(&AoRef::new(&mi), &AoRef::new(&mi));
        assert_eq!(stats.refs_may_alias.queries(), 2);
        assert_eq!(stats.refs_may_alias.disambiguations(), 1);
    }

    fn build_ref(func: &Function, shape: (u8, u8, i64), ctx: &RefCtx) -> MemRef {
        let (base, field, idx) = shape;
        let base = match base % 4 {
            0 => MemRef::var(ctx.a),
            1 => MemRef::var(ctx.b),
            2 => MemRef::deref(Deref::new(ctx.p.into(), ctx.s, ctx.ps)),
            _ => MemRef::deref(Deref::new(ctx.q.into(), ctx.s, ctx.ps).with_offset(4)),
        };
        let f = func.types.fields_of(ctx.s)[usize::from(field % 2)];
        let mem = base.field(f);
        if field % 2 == 1 {
            let i64t = func.types.size;
            let index = if idx < 0 {
                Operand::Value(ctx.i)
            } else {
                Operand::Const { ty: i64t, value: i128::from(idx) }
            };
            mem.index(index, ctx.arr)
        } else {
            mem
        }
    }

    struct RefCtx {
        s: Type,
        ps: Type,
        arr: Type,
        a: Var,
        b: Var,
        p: Value,
        q: Value,
        i: Value,
    }

    fn ref_ctx() -> (Function, RefCtx) {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let arr = func.types.array(i32t, Some(4));
        let s = func.types.record("S", &[("n", i32t), ("v", arr)]);
        let ps = func.types.pointer_to(s);
        let size = func.types.size;
        let a = func.declare_var(VarData::local("a", s).address_taken());
        let b = func.declare_var(VarData::local("b", s));
        let p = func.declare_param("p", ps);
        let q = func.declare_param("q", ps);
        let i = func.declare_param("i", size);
        func.pta.set(p, PtSolution::vars([a]));
        (func, RefCtx { s, ps, arr, a, b, p, q, i })
    }

    proptest! {
        #[test]
        fn may_alias_is_symmetric(
            r1 in (any::<u8>(), any::<u8>(), -1i64..4),
            r2 in (any::<u8>(), any::<u8>(), -1i64..4),
        ) {
            let (func, ctx) = ref_ctx();
            let m1 = build_ref(&func, r1, &ctx);
            let m2 = build_ref(&func, r2, &ctx);
            let flags = Flags::default();
            let oracle = AliasOracle::new(&func, &flags);
            let (a1, a2) = (AoRef::new(&m1), AoRef::new(&m2));
            prop_assert_eq!(oracle.refs_may_alias(&a1, &a2), oracle.refs_may_alias(&a2, &a1));
            prop_assert!(oracle.refs_may_alias(&a1, &AoRef::new(&m1)));
            // Dropping type-based rules never disambiguates more.
            if oracle.refs_may_alias(&a1, &a2) {
                prop_assert!(oracle.refs_may_alias_tbaa(&a1, &a2, false));
            }
        }

        /// Lay `a` out at address 0, `b` at 1000 and an unnamed `S` at 500, then check that every
        /// pair of references touching a common byte is reported as aliasing.
        #[test]
        fn overlapping_bytes_always_alias(
            r1 in (any::<u8>(), any::<u8>(), -1i64..4),
            r2 in (any::<u8>(), any::<u8>(), -1i64..4),
            q_at_a in any::<bool>(),
            i in 0i64..4,
        ) {
            let (mut func, ctx) = ref_ctx();
            let m1 = build_ref(&func, r1, &ctx);
            let m2 = build_ref(&func, r2, &ctx);

            // `p` holds the address of `a`; `q + 4` is the address of `a` or of the unnamed object.
            let target = if q_at_a { 0 } else { 500 };
            let bytes = |(base, field, idx): (u8, u8, i64)| {
                let object = match base % 4 {
                    0 | 2 => 0,
                    1 => 1000,
                    _ => target,
                };
                // `n` is at offset 0 and `v` at offset 4, both made of 4-byte ints.
                let start = if field % 2 == 0 {
                    object
                } else {
                    object + 4 + 4 * if idx < 0 { i } else { idx }
                };
                start..start + 4
            };
            let (b1, b2) = (bytes(r1), bytes(r2));
            let overlap = b1.start < b2.end && b2.start < b1.end;

            let i32t = func.types.int(32, true);
            let block = func.dfg.make_block();
            let mut cur = FuncCursor::new(&mut func);
            cur.insert_block(block);
            let zero = cur.func.iconst(i32t, 0);
            let store = cur.ins().store(m1.clone(), zero);
            let loaded = cur.ins().load(i32t, m2.clone());
            cur.ins().ret(None);
            let load = func.dfg.value_inst(loaded).unwrap();

            let flags = Flags::default();
            let oracle = AliasOracle::new(&func, &flags);
            let (a1, a2) = (AoRef::new(&m1), AoRef::new(&m2));
            if overlap {
                prop_assert!(oracle.refs_may_alias(&a1, &a2), "{m1} vs {m2} with i = {i}");
                prop_assert!(oracle.stmt_may_clobber_ref(store, &a2, true));
                prop_assert!(oracle.ref_maybe_used_by_stmt(load, &a1, true));
            }
        }
    }
}
