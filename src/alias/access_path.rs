//! Access path disambiguation.
//!
//! Two references whose bases are the same object, or may be, can still be proven disjoint by
//! looking at the components selected from the base. When the bases are of different types
//! the access paths are first searched for a common type that can serve as an anchor.
//!
//! Access paths are handled as stacks of components: the components of a [`MemRef`] are
//! stored innermost first, and matching pops them from the base outwards.

use crate::alias::ao_ref::{base_and_extent_at, mem_ref_offset, ranges_maybe_overlap};
use crate::alias::oracle::AliasOracle;
use crate::alias::tbaa::{AliasSet, TypeMatch};
use crate::ir::{Component, Field, MemRef, RefBase, Type, TypeKind, TypeStore};
use crate::trace;
use smallvec::SmallVec;

/// Result of matching two access paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PathOverlap {
    /// The accesses cannot overlap.
    Disjoint,
    /// The accesses start at the same address, given bases at the same address.
    SameAddress,
    /// Nothing is known.
    Unknown,
}

/// The sub-reference made of the base of `mem` and its first `depth` components.
#[derive(Clone, Copy)]
pub(crate) struct SubRef<'m> {
    pub mem: &'m MemRef,
    pub depth: usize,
}

impl<'m> SubRef<'m> {
    /// The part of `mem` below its innermost reinterpretation.
    pub fn below_reinterpretations(mem: &'m MemRef) -> Self {
        Self {
            mem,
            depth: reinterpretation_depth(mem, 0),
        }
    }

    fn components(&self) -> &'m [Component] {
        &self.mem.path[..self.depth]
    }
}

/// A reference together with the properties access path disambiguation needs.
#[derive(Clone, Copy)]
pub(crate) struct PathRef<'m> {
    pub mem: &'m MemRef,
    pub ref_set: AliasSet,
    pub base_set: AliasSet,
    pub offset: i64,
    pub max_size: Option<u64>,
}

/// The smallest depth at or above `from` where `mem.path` has a reinterpretation.
fn reinterpretation_depth(mem: &MemRef, from: usize) -> usize {
    mem.path[from..]
        .iter()
        .position(Component::is_reinterpretation)
        .map_or(mem.depth(), |i| from + i)
}

fn low_bound(types: &TypeStore, array: Type) -> i128 {
    match *types.kind(array) {
        TypeKind::Array { low_bound, .. } => i128::from(low_bound),
        _ => 0,
    }
}

fn index_at_low_bound(types: &TypeStore, c: &Component) -> bool {
    match *c {
        Component::Index { index, array } => index.is_const(low_bound(types, array)),
        _ => true,
    }
}

/// The type of the outermost access to a trailing array of unknown or zero size, if any.
///
/// Such an array may extend past the end of its containing object, so it can be bigger than
/// the types further in.
fn trailing_array_type(types: &TypeStore, mem: &MemRef) -> Option<Type> {
    mem.path.iter().rev().find_map(|c| {
        let Component::Field(f) = *c else {
            return None;
        };
        let field = types.field(f);
        let trailing = types.is_array(field.ty)
            && types.size_bytes(field.ty).is_none_or(|s| s == 0)
            && types.fields_of(field.parent).last() == Some(&f);
        trailing.then_some(field.ty)
    })
}

/// Components of `sub` outside the sub-reference at `start`, arranged so that popping yields
/// them from the base outwards. Everything outside a reinterpretation is dropped.
fn component_stack<'m>(sub: SubRef<'m>, start: usize) -> SmallVec<[&'m Component; 8]> {
    let path = &sub.components()[start..];
    let end = path
        .iter()
        .position(Component::is_reinterpretation)
        .unwrap_or(path.len());
    path[..end].iter().rev().collect()
}

/// Pop components up to and including the next field selection.
fn pop_field(stack: &mut SmallVec<[&Component; 8]>, seen_unmatched: &mut bool) -> Option<Field> {
    loop {
        match *stack.pop()? {
            Component::Field(f) => return Some(f),
            _ => *seen_unmatched = true,
        }
    }
}

impl AliasOracle<'_> {
    /// Compare two array indices into arrays whose starting addresses are the same, or whose
    /// arrays are disjoint.
    fn nonoverlapping_array_refs(&self, c1: &Component, c2: &Component) -> PathOverlap {
        let types = &self.func.types;
        let (
            &Component::Index {
                index: i1,
                array: a1,
            },
            &Component::Index {
                index: i2,
                array: a2,
            },
        ) = (c1, c2)
        else {
            return PathOverlap::Unknown;
        };
        let (low1, low2) = (low_bound(types, a1), low_bound(types, a2));

        if i1.is_const(low1) && i2.is_const(low2) {
            return PathOverlap::SameAddress;
        }
        let elem_size = |a: Type| types.element(a).and_then(|e| types.size_bytes(e));
        match (elem_size(a1), elem_size(a2)) {
            (Some(s1), Some(s2)) if s1 == s2 => {}
            _ => return PathOverlap::Unknown,
        }
        // Equal element sizes cannot introduce partial overlaps from here on.
        if low1 != low2 {
            return PathOverlap::SameAddress;
        }
        match (i1.as_const(), i2.as_const()) {
            (Some(c1), Some(c2)) if c1 != c2 => PathOverlap::Disjoint,
            _ => PathOverlap::SameAddress,
        }
    }

    /// Compare two fields selected from objects at the same address.
    ///
    /// This works without type-based assumptions, so it is valid without strict aliasing.
    pub(crate) fn nonoverlapping_fields(&self, f1: Field, f2: Field) -> PathOverlap {
        let types = &self.func.types;
        let storage_unit = |f: Field| {
            let data = types.field(f);
            match data.representative.expand() {
                Some(rep) if types.is_record(data.parent) => rep,
                _ => f,
            }
        };
        let (f1, f2) = (storage_unit(f1), storage_unit(f2));
        let (d1, d2) = (types.field(f1), types.field(f2));

        // Bit-fields can be accessed with wider accesses.
        if d1.bit_field && d2.bit_field {
            return PathOverlap::Unknown;
        }
        if d1.parent == d2.parent && types.is_record(d1.parent) {
            return if f1 != f2 {
                PathOverlap::Disjoint
            } else {
                PathOverlap::SameAddress
            };
        }
        let (pos1, pos2) = (d1.bit_position(), d2.bit_position());
        if pos1 == pos2 {
            return PathOverlap::SameAddress;
        }
        if let (Some(s1), Some(s2)) = (d1.bit_size, d2.bit_size)
            && !ranges_maybe_overlap(pos1 as i64, Some(s1), pos2 as i64, Some(s2))
        {
            return PathOverlap::Disjoint;
        }
        PathOverlap::Unknown
    }

    /// Try to disambiguate `ref1` and `ref2` given that the sub-references at `match1` and
    /// `match2` are either at the same address or disjoint. A `None` match stands for bases
    /// known to be the same object.
    ///
    /// With `partial_overlap`, the outermost arrays may overlap by a multiple of their element
    /// size.
    pub(crate) fn nonoverlapping_refs_since_match(
        &self,
        match1: Option<usize>,
        ref1: SubRef,
        match2: Option<usize>,
        ref2: SubRef,
        mut partial_overlap: bool,
    ) -> PathOverlap {
        let start1 = match1.unwrap_or(0);
        let start2 = match2.unwrap_or(0);
        // Queries with nothing to match are not counted.
        if start1 >= ref1.depth || start2 >= ref2.depth {
            return PathOverlap::Unknown;
        }

        let counter = self.stats.map(|s| &s.nonoverlapping_refs_since_match);
        let result = |r: PathOverlap| {
            if let Some(c) = counter {
                match r {
                    PathOverlap::Disjoint => c.no_alias(),
                    PathOverlap::SameAddress => c.must_overlap(),
                    PathOverlap::Unknown => c.may_alias(),
                }
            }
            r
        };

        let mut stack1 = component_stack(ref1, start1);
        let mut stack2 = component_stack(ref2, start2);

        // A dereference only starts at the same address as the other side if the offsets
        // agree.
        let deref_offset = |matched: Option<usize>, sub: SubRef| match (&sub.mem.base, matched) {
            (RefBase::Deref(d), None) => Some((mem_ref_offset(d), d.index.is_some())),
            _ => None,
        };
        let off1 = deref_offset(match1, ref1);
        let off2 = deref_offset(match2, ref2);
        let offsets_differ = match (off1, off2) {
            (Some((_, true)), _) | (_, Some((_, true))) => true,
            (Some((o1, _)), None) => o1 != 0,
            (None, Some((o2, _))) => o2 != 0,
            (Some((o1, _)), Some((o2, _))) => o1 != o2,
            (None, None) => false,
        };
        if offsets_differ {
            return result(PathOverlap::Unknown);
        }

        let types = &self.func.types;
        loop {
            // An unmatched component with a nonzero offset was skipped, so partial overlaps are
            // possible.
            let mut seen_unmatched = false;

            if !stack1.is_empty() && !stack2.is_empty() {
                let leading_indices = |s: &SmallVec<[&Component; 8]>| {
                    s.iter()
                        .rev()
                        .take_while(|c| matches!(c, Component::Index { .. }))
                        .count()
                };
                let mut n1 = leading_indices(&stack1);
                let mut n2 = leading_indices(&stack2);

                // One path may start with an array and the other with its element. Skipping
                // an index keeps the bases equal only if it selects the first element.
                while n1 > n2 {
                    if let Some(c) = stack1.pop()
                        && !index_at_low_bound(types, c)
                    {
                        return PathOverlap::SameAddress;
                    }
                    n1 -= 1;
                }
                while n2 > n1 {
                    if let Some(c) = stack2.pop()
                        && !index_at_low_bound(types, c)
                    {
                        return PathOverlap::SameAddress;
                    }
                    n2 -= 1;
                }

                for _ in 0..n1 {
                    let (Some(c1), Some(c2)) = (stack1.pop(), stack2.pop()) else {
                        break;
                    };
                    let cmp = self.nonoverlapping_array_refs(c1, c2);
                    if cmp == PathOverlap::Disjoint && !partial_overlap {
                        return result(PathOverlap::Disjoint);
                    }
                    partial_overlap = false;
                    if cmp == PathOverlap::Unknown {
                        seen_unmatched = true;
                    }
                }
            }

            let Some(f1) = pop_field(&mut stack1, &mut seen_unmatched) else {
                return result(PathOverlap::SameAddress);
            };
            let Some(f2) = pop_field(&mut stack2, &mut seen_unmatched) else {
                return result(PathOverlap::SameAddress);
            };
            partial_overlap = false;

            let size1 = types.size_bits(types.field(f1).parent);
            let size2 = types.size_bits(types.field(f2).parent);
            if seen_unmatched && (size1.is_none() || size1 != size2) {
                return result(PathOverlap::Unknown);
            }

            match self.nonoverlapping_fields(f1, f2) {
                PathOverlap::SameAddress => {}
                r => return result(r),
            }
        }
    }

    /// Can the fields selected by `x` and `y` be proven to never overlap, for any pair of
    /// objects? This relies on type-based aliasing rules.
    pub(crate) fn nonoverlapping_component_refs(&self, x: SubRef, y: SubRef) -> bool {
        if !self.flags.strict_aliasing() || x.depth == 0 || y.depth == 0 {
            return false;
        }
        let types = &self.func.types;
        let record_fields = |sub: SubRef| -> SmallVec<[Field; 8]> {
            let mut fields: SmallVec<[Field; 8]> = sub.components()
                [..reinterpretation_depth(sub.mem, 0).min(sub.depth)]
                .iter()
                .filter_map(|c| match *c {
                    Component::Field(f) if types.is_record(types.field(f).parent) => Some(f),
                    _ => None,
                })
                .collect();
            fields.sort_by_key(|&f| types.canonical(types.field(f).parent));
            fields
        };

        let fields_x = record_fields(x);
        if fields_x.is_empty() {
            return false;
        }
        let counter = self.stats.map(|s| &s.nonoverlapping_component_refs);
        let result = |r: bool| {
            if let Some(c) = counter {
                c.record(!r);
            }
            r
        };
        let fields_y = record_fields(y);
        if fields_y.is_empty() {
            return result(false);
        }

        let disjoint = |fx: Field, fy: Field| {
            self.tbaa
                .same_type_for_tbaa(types.field(fx).parent, types.field(fy).parent)
                == TypeMatch::Same
                && self.nonoverlapping_fields(fx, fy) == PathOverlap::Disjoint
        };
        let (mut i, mut j) = (0, 0);
        loop {
            let (fx, fy) = (fields_x[i], fields_y[j]);
            // Different fields of the same record.
            if disjoint(fx, fy) {
                return result(true);
            }
            if types.canonical(types.field(fx).parent) < types.canonical(types.field(fy).parent) {
                i += 1;
                if i == fields_x.len() {
                    break;
                }
            } else {
                j += 1;
                if j == fields_y.len() {
                    break;
                }
            }
        }
        result(false)
    }

    /// Disambiguate two references of which at least one is based on a dereference, by looking
    /// for the base type of one in the access path of the other.
    pub(crate) fn aliasing_component_refs(&self, r1: PathRef, r2: PathRef) -> bool {
        let func = self.func;
        let types = &func.types;
        let tbaa = &self.tbaa;
        let counter = self.stats.map(|s| &s.aliasing_component_refs);
        let result = |may_alias: bool| {
            if let Some(c) = counter {
                c.record(may_alias);
            }
            may_alias
        };

        let ref1 = SubRef::below_reinterpretations(r1.mem);
        let ref2 = SubRef::below_reinterpretations(r2.mem);
        let type1 = r1.mem.type_at(func, 0);
        let type2 = r2.mem.type_at(func, 0);
        let end1 = trailing_array_type(types, r1.mem);
        let end2 = trailing_array_type(types, r2.mem);
        let mut maybe_match = false;

        // The path of ref2 can only contain type1 if type2 is big enough to hold it.
        let cmp_outer = tbaa.compare_type_sizes(type2, type1);
        if (cmp_outer.is_ge() || end2.is_some_and(|t| tbaa.compare_type_sizes(t, type1).is_ge()))
            && let Some(may_alias) =
                self.aliasing_component_refs_walk(&r1, ref1, type1, end1, &r2, ref2, &mut maybe_match)
        {
            return may_alias;
        }
        if (cmp_outer.is_le() || end1.is_some_and(|t| tbaa.compare_type_sizes(t, type2).is_ge()))
            && let Some(may_alias) =
                self.aliasing_component_refs_walk(&r2, ref2, type2, end2, &r1, ref1, &mut maybe_match)
        {
            return may_alias;
        }

        // Without a decision about type equality, paths may overlap anywhere.
        if maybe_match {
            return result(!self.nonoverlapping_component_refs(ref1, ref2));
        }

        // The accesses can only alias if one path is a continuation of the other, possibly
        // through a part that is not visible. That needs the outer type of one path to be big
        // enough and composite, and to contain the base of the other.
        let continues = |outer: Type, end: Option<Type>, inner_base: Type, base_set: AliasSet, ref_set: AliasSet| {
            tbaa.compare_type_sizes(outer, inner_base).is_ge()
                && end.is_none_or(|e| tbaa.compare_type_sizes(outer, e).is_ge())
                && types.has_components(outer)
                && (base_set == ref_set || tbaa.alias_set_subset_of(base_set, ref_set))
        };
        let outer1 = r1.mem.type_at(func, ref1.depth);
        let outer2 = r2.mem.type_at(func, ref2.depth);
        if continues(outer2, end1, type1, r1.base_set, r2.ref_set)
            || continues(outer1, end2, type2, r2.base_set, r1.ref_set)
        {
            return result(true);
        }
        result(false)
    }

    /// Walk the path of `ref2` from the outside in, looking for a type matching `type1`, the
    /// base type of `r1`. Returns `None` when no match is found.
    fn aliasing_component_refs_walk(
        &self,
        r1: &PathRef,
        ref1: SubRef,
        type1: Type,
        end1: Option<Type>,
        r2: &PathRef,
        ref2: SubRef,
        maybe_match: &mut bool,
    ) -> Option<bool> {
        let func = self.func;
        let tbaa = &self.tbaa;
        let mut depth = ref2.depth;
        let mut same = TypeMatch::Different;
        loop {
            let ty = r2.mem.type_at(func, depth);
            let cmp = tbaa.compare_type_sizes(type1, ty);
            // Everything further out is too big to be part of type1.
            if cmp.is_lt() && end1.is_none_or(|e| tbaa.compare_type_sizes(e, ty).is_lt()) {
                break;
            }
            if cmp.is_eq() {
                same = tbaa.same_type_for_tbaa(ty, type1);
                match same {
                    TypeMatch::Same => break,
                    // Keep looking for an exact match, but remember there may have been one.
                    TypeMatch::Unknown => *maybe_match = true,
                    TypeMatch::Different => {}
                }
            }
            if depth == 0 {
                break;
            }
            depth -= 1;
        }
        if same != TypeMatch::Same {
            return None;
        }

        trace!("access paths of {} and {} match at depth {depth}", r1.mem, r2.mem);
        // Arrays can overlap by multiples of their element size when both are the bases of
        // their accesses.
        let types = &func.types;
        let partial_overlap =
            types.is_array(type1) && (types.size_bits(type1).is_none() || depth == 0);
        if partial_overlap {
            *maybe_match = true;
        }
        Some(self.aliasing_matching_component_refs(r1, ref1, r2, ref2, depth, partial_overlap))
    }

    /// Disambiguate given that the base of `r1` and the sub-reference of `r2` at `match2` are
    /// at the same address or disjoint.
    fn aliasing_matching_component_refs(
        &self,
        r1: &PathRef,
        ref1: SubRef,
        r2: &PathRef,
        ref2: SubRef,
        match2: usize,
        partial_overlap: bool,
    ) -> bool {
        let func = self.func;
        let counter = self.stats.map(|s| &s.aliasing_component_refs);
        let result = |may_alias: bool| {
            if let Some(c) = counter {
                c.record(may_alias);
            }
            may_alias
        };

        if !partial_overlap {
            let adj1 = base_and_extent_at(func, r1.mem, 0).offset;
            let adj2 = base_and_extent_at(func, r2.mem, match2).offset;
            if !ranges_maybe_overlap(
                r1.offset.saturating_sub(adj1),
                r1.max_size,
                r2.offset.saturating_sub(adj2),
                r2.max_size,
            ) {
                return result(false);
            }
        }

        let cmp =
            self.nonoverlapping_refs_since_match(Some(0), ref1, Some(match2), ref2, partial_overlap);
        if cmp == PathOverlap::Disjoint
            || (cmp == PathOverlap::Unknown && self.nonoverlapping_component_refs(ref1, ref2))
        {
            return result(false);
        }
        result(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasStats;
    use crate::ir::{Deref, Function, VarData};
    use crate::settings::{self, Configurable, Flags};

    struct Types {
        func: Function,
        inner: Type,
        outer: Type,
        x: Field,
        y: Field,
        a: Field,
        k: Field,
    }

    // struct A { int x; int y; };  struct B { struct A a; int k; };
    fn types() -> Types {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let mut b = func.types.record_builder("A");
        let x = b.field("x", i32t);
        let y = b.field("y", i32t);
        let inner = b.finish();
        let mut b = func.types.record_builder("B");
        let a = b.field("a", inner);
        let k = b.field("k", i32t);
        let outer = b.finish();
        Types {
            func,
            inner,
            outer,
            x,
            y,
            a,
            k,
        }
    }

    #[test]
    fn fields_of_same_record() {
        let t = types();
        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags);
        assert_eq!(oracle.nonoverlapping_fields(t.x, t.y), PathOverlap::Disjoint);
        assert_eq!(oracle.nonoverlapping_fields(t.x, t.x), PathOverlap::SameAddress);
        // `a` and `x` are both at offset 0.
        assert_eq!(oracle.nonoverlapping_fields(t.a, t.x), PathOverlap::SameAddress);
        assert_eq!(oracle.nonoverlapping_fields(t.k, t.y), PathOverlap::Disjoint);
    }

    #[test]
    fn bit_fields() {
        let mut func = Function::new();
        let u32t = func.types.int(32, false);
        let mut b = func.types.record_builder("bits");
        let lo = b.bit_field("lo", u32t, 3);
        let hi = b.bit_field("hi", u32t, 5);
        b.finish();
        let mut b = func.types.record_builder("other");
        let o = b.bit_field("o", u32t, 3);
        b.finish();
        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        // Bit-fields in the same storage unit are at the same address.
        assert_eq!(oracle.nonoverlapping_fields(lo, hi), PathOverlap::SameAddress);
        assert_eq!(oracle.nonoverlapping_fields(lo, o), PathOverlap::SameAddress);
    }

    #[test]
    fn since_match() {
        let mut t = types();
        let i64t = t.func.types.int(64, true);
        let arr = t.func.types.array(t.inner, Some(4));
        let v = t.func.declare_var(VarData::local("v", arr));
        let i = t.func.declare_param("i", i64t);
        let one = t.func.iconst(i64t, 1);
        let two = t.func.iconst(i64t, 2);
        let stats = AliasStats::default();
        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags).with_stats(&stats);

        let m1 = MemRef::var(v).index(one, arr).field(t.x);
        let m2 = MemRef::var(v).index(two, arr).field(t.x);
        let m3 = MemRef::var(v).index(i.into(), arr).field(t.y);
        let m4 = MemRef::var(v).index(i.into(), arr).field(t.x);
        let sub = |m| SubRef { mem: m, depth: 2 };
        let cmp = |a, b| oracle.nonoverlapping_refs_since_match(Some(0), sub(a), Some(0), sub(b), false);

        assert_eq!(cmp(&m1, &m2), PathOverlap::Disjoint);
        // Unknown index, but the fields differ.
        assert_eq!(cmp(&m1, &m3), PathOverlap::Disjoint);
        assert_eq!(cmp(&m1, &m4), PathOverlap::SameAddress);
        assert_eq!(stats.nonoverlapping_refs_since_match.disambiguations(), 2);
        assert_eq!(stats.nonoverlapping_refs_since_match.must_overlaps(), 1);

        // With partial overlap the outermost indices prove nothing.
        assert_eq!(
            oracle.nonoverlapping_refs_since_match(Some(0), sub(&m1), Some(0), sub(&m2), true),
            PathOverlap::SameAddress
        );
    }

    #[test]
    fn deref_offsets_must_agree() {
        let mut t = types();
        let pb = t.func.types.pointer_to(t.outer);
        let p = t.func.declare_param("p", pb);
        let flags = Flags::default();
        let oracle = AliasOracle::new(&t.func, &flags);

        let at = |off| MemRef::deref(Deref::new(p.into(), t.outer, pb).with_offset(off)).field(t.k);
        let (m0, m8) = (at(0), at(8));
        let sub = |m| SubRef { mem: m, depth: 1 };
        let none = |a, b| oracle.nonoverlapping_refs_since_match(None, sub(a), None, sub(b), false);
        let m_a = MemRef::deref(Deref::new(p.into(), t.outer, pb)).field(t.a);
        assert_eq!(none(&m0, &m_a), PathOverlap::Disjoint);
        assert_eq!(none(&m0, &m8), PathOverlap::Unknown);
    }

    #[test]
    fn component_refs_by_type() {
        let mut t = types();
        let pa = t.func.types.pointer_to(t.inner);
        let pb = t.func.types.pointer_to(t.outer);
        let p = t.func.declare_param("p", pa);
        let q = t.func.declare_param("q", pb);
        let mut flags_builder = settings::builder();
        let strict = Flags::default();
        flags_builder.set("strict_aliasing", "false").unwrap();
        let relaxed = Flags::new(flags_builder);

        // p->x against q->a.y
        let m1 = MemRef::deref(Deref::new(p.into(), t.inner, pa)).field(t.x);
        let m2 = MemRef::deref(Deref::new(q.into(), t.outer, pb))
            .field(t.a)
            .field(t.y);
        let x = SubRef::below_reinterpretations(&m1);
        let y = SubRef::below_reinterpretations(&m2);
        assert!(AliasOracle::new(&t.func, &strict).nonoverlapping_component_refs(x, y));
        assert!(!AliasOracle::new(&t.func, &relaxed).nonoverlapping_component_refs(x, y));

        let m3 = MemRef::deref(Deref::new(q.into(), t.outer, pb))
            .field(t.a)
            .field(t.x);
        let z = SubRef::below_reinterpretations(&m3);
        assert!(!AliasOracle::new(&t.func, &strict).nonoverlapping_component_refs(x, z));
    }
}
