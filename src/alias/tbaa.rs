//! Type-based alias analysis.
//!
//! Every type is assigned an alias set. An access through an lvalue of one type may only touch
//! an object whose alias set conflicts with the access's alias set. Alias set 0, the wildcard,
//! conflicts with everything: character types, `may_alias` types and accesses through `ref_all`
//! pointers use it.
//!
//! The alias set of a record or union has the sets of all its (nested) field types as children,
//! since an lvalue of the aggregate type accesses all its members. All data pointers are
//! children of the `void *` set.
//!
//! Sets are assigned lazily the first time a type is queried.

use crate::entity::{PrimaryMap, entity_impl};
use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{Type, TypeKind, TypeStore};
use core::cell::RefCell;
use core::cmp::Ordering;

/// An alias set.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasSet(u32);
entity_impl!(AliasSet, "alias-set");

impl AliasSet {
    /// The set conflicting with all other sets.
    pub const WILDCARD: Self = Self(0);

    /// Is this the wildcard set?
    pub fn is_wildcard(self) -> bool {
        self == Self::WILDCARD
    }
}

/// The answer of [`AliasSetTable::same_type_for_tbaa`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeMatch {
    /// The types are the same for type-based alias analysis.
    Same,
    /// The types are known to be different.
    Different,
    /// Undecided.
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum SetKey {
    Bool,
    Int(u8),
    Float(u8),
    VoidPointer,
    Pointer(Type),
    Aggregate(Type),
}

#[derive(Debug, Default)]
struct AliasSetData {
    children: FxHashSet<AliasSet>,
    has_zero_child: bool,
    is_pointer: bool,
    // A child is a pointer set.
    has_pointer: bool,
}

/// Alias sets of the types in a [`TypeStore`].
pub struct AliasSetTable<'a> {
    types: &'a TypeStore,
    strict: bool,
    sets: RefCell<PrimaryMap<AliasSet, AliasSetData>>,
    keys: RefCell<FxHashMap<SetKey, AliasSet>>,
}

impl<'a> AliasSetTable<'a> {
    /// Create a table for `types`. Without `strict_aliasing`, every type gets the wildcard set.
    pub fn new(types: &'a TypeStore, strict_aliasing: bool) -> Self {
        let mut sets = PrimaryMap::new();
        sets.push(AliasSetData::default());
        Self {
            types,
            strict: strict_aliasing,
            sets: RefCell::new(sets),
            keys: RefCell::new(FxHashMap::default()),
        }
    }

    /// The type store.
    pub fn types(&self) -> &'a TypeStore {
        self.types
    }

    /// Get the alias set of `ty`.
    pub fn set_of(&self, ty: Type) -> AliasSet {
        if !self.strict {
            return AliasSet::WILDCARD;
        }
        let types = self.types;
        let canon = types.canonical(ty);
        if types.data(ty).may_alias || types.data(canon).may_alias {
            return AliasSet::WILDCARD;
        }
        let key = match *types.kind(canon) {
            TypeKind::Void | TypeKind::Function => return AliasSet::WILDCARD,
            TypeKind::Int { bits: 8, .. } => return AliasSet::WILDCARD,
            TypeKind::Int { bits, .. } => SetKey::Int(bits),
            TypeKind::Bool => SetKey::Bool,
            TypeKind::Float { bits } => SetKey::Float(bits),
            TypeKind::Pointer { pointee, .. } => {
                let pointee = types.canonical(pointee);
                if *types.kind(pointee) == TypeKind::Void {
                    SetKey::VoidPointer
                } else {
                    SetKey::Pointer(pointee)
                }
            }
            TypeKind::Array { elem, .. } | TypeKind::Vector { elem, .. } => {
                return self.set_of(elem);
            }
            TypeKind::Record { .. } | TypeKind::Union { .. } => SetKey::Aggregate(canon),
        };
        if let Some(&set) = self.keys.borrow().get(&key) {
            return set;
        }
        self.create(key, canon)
    }

    fn create(&self, key: SetKey, canon: Type) -> AliasSet {
        let mut data = AliasSetData::default();
        match key {
            SetKey::VoidPointer => data.is_pointer = true,
            SetKey::Pointer(_) => {
                data.is_pointer = true;
                let void_ptr = self.set_of(self.types.void_ptr);
                let set = self.push(key, data);
                self.sets.borrow_mut()[void_ptr].children.insert(set);
                return set;
            }
            SetKey::Aggregate(_) => {
                // Field sets are computed before borrowing the table.
                let members: Vec<AliasSet> = self
                    .types
                    .fields_of(canon)
                    .iter()
                    .map(|&f| self.set_of(self.types.field(f).ty))
                    .collect();
                let sets = self.sets.borrow();
                for set in members {
                    if set.is_wildcard() {
                        data.has_zero_child = true;
                        continue;
                    }
                    let member = &sets[set];
                    data.children.insert(set);
                    data.children.extend(member.children.iter().copied());
                    data.has_zero_child |= member.has_zero_child;
                    data.has_pointer |= member.is_pointer || member.has_pointer;
                }
            }
            _ => {}
        }
        self.push(key, data)
    }

    fn push(&self, key: SetKey, data: AliasSetData) -> AliasSet {
        let set = self.sets.borrow_mut().push(data);
        self.keys.borrow_mut().insert(key, set);
        crate::trace!("{key:?} gets {set}");
        set
    }

    /// Do accesses with sets `s1` and `s2` always conflict?
    pub fn alias_sets_must_conflict(&self, s1: AliasSet, s2: AliasSet) -> bool {
        s1.is_wildcard() || s2.is_wildcard() || s1 == s2
    }

    /// May accesses with sets `s1` and `s2` refer to the same object?
    pub fn alias_sets_conflict(&self, s1: AliasSet, s2: AliasSet) -> bool {
        if self.alias_sets_must_conflict(s1, s2) {
            return true;
        }
        let sets = self.sets.borrow();
        let (d1, d2) = (&sets[s1], &sets[s2]);
        if d1.has_zero_child || d1.children.contains(&s2) {
            return true;
        }
        if d2.has_zero_child || d2.children.contains(&s1) {
            return true;
        }
        // Any pointer may be stored where a `void *` lives.
        (d1.is_pointer && d2.has_pointer) || (d2.is_pointer && d1.has_pointer)
    }

    /// Is every object accessible with set `s1` also accessible with set `s2`?
    pub fn alias_set_subset_of(&self, s1: AliasSet, s2: AliasSet) -> bool {
        if s1 == s2 || s2.is_wildcard() {
            return true;
        }
        let sets = self.sets.borrow();
        let d2 = &sets[s2];
        d2.has_zero_child || d2.children.contains(&s1) || (sets[s1].is_pointer && d2.has_pointer)
    }

    /// Are `t1` and `t2` the same type for the purpose of type-based alias analysis?
    pub fn same_type_for_tbaa(&self, t1: Type, t2: Type) -> TypeMatch {
        let types = self.types;
        if types.canonical(t1) == types.canonical(t2) {
            return TypeMatch::Same;
        }
        // Arrays with different index types are not unified.
        if types.is_array(t1) && types.is_array(t2) {
            return TypeMatch::Unknown;
        }
        if self.set_of(t1) == self.set_of(t2) {
            return TypeMatch::Unknown;
        }
        TypeMatch::Different
    }

    /// Compare the sizes of `t1` and `t2`, looking through arrays and vectors. Unknown sizes
    /// compare equal.
    pub fn compare_type_sizes(&self, t1: Type, t2: Type) -> Ordering {
        compare_sizes(
            self.types.size_bits(self.strip_arrays(t1)),
            self.types.size_bits(self.strip_arrays(t2)),
        )
    }

    fn strip_arrays(&self, mut ty: Type) -> Type {
        while let Some(elem) = self.types.element(ty) {
            ty = elem;
        }
        ty
    }
}

/// Compare two sizes. Unknown sizes compare equal.
pub fn compare_sizes(s1: Option<u64>, s2: Option<u64>) -> Ordering {
    match (s1, s2) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sets() {
        let mut types = TypeStore::new();
        let i32t = types.int(32, true);
        let u32t = types.int(32, false);
        let i64t = types.int(64, true);
        let f32t = types.float(32);
        let u8t = types.int(8, false);
        let tbaa = AliasSetTable::new(&types, true);

        // Signedness does not matter.
        assert_eq!(tbaa.set_of(i32t), tbaa.set_of(u32t));
        assert_ne!(tbaa.set_of(i32t), tbaa.set_of(i64t));
        assert!(!tbaa.alias_sets_conflict(tbaa.set_of(i32t), tbaa.set_of(f32t)));
        assert!(tbaa.set_of(u8t).is_wildcard());
        assert!(tbaa.set_of(types.char).is_wildcard());
        assert!(tbaa.alias_sets_conflict(tbaa.set_of(u8t), tbaa.set_of(f32t)));
    }

    #[test]
    fn aggregates_and_pointers() {
        let mut types = TypeStore::new();
        let i32t = types.int(32, true);
        let f64t = types.float(64);
        let inner = types.record("inner", &[("x", i32t), ("y", i32t)]);
        let outer = types.record("outer", &[("a", inner), ("d", f64t)]);
        let (ch, vp) = (types.char, types.void_ptr);
        let with_char = types.record("c", &[("c", ch)]);
        let pi = types.pointer_to(i32t);
        let pf = types.pointer_to(f64t);
        let boxed = types.record("boxed", &[("p", vp)]);
        let arr = types.array(inner, Some(4));
        let tbaa = AliasSetTable::new(&types, true);

        let (si, sin, sout) = (tbaa.set_of(i32t), tbaa.set_of(inner), tbaa.set_of(outer));
        // Children are transitive.
        assert!(tbaa.alias_sets_conflict(sout, si));
        assert!(tbaa.alias_set_subset_of(si, sout));
        assert!(tbaa.alias_set_subset_of(sin, sout));
        assert!(!tbaa.alias_set_subset_of(sout, sin));
        assert!(tbaa.alias_sets_conflict(tbaa.set_of(with_char), tbaa.set_of(f64t)));
        assert_eq!(tbaa.set_of(arr), sin);

        let (spi, spf, svp) = (
            tbaa.set_of(pi),
            tbaa.set_of(pf),
            tbaa.set_of(types.void_ptr),
        );
        assert!(!tbaa.alias_sets_conflict(spi, spf));
        assert!(tbaa.alias_sets_conflict(spi, svp));
        assert!(tbaa.alias_sets_conflict(spf, tbaa.set_of(boxed)));
        assert!(!tbaa.alias_sets_conflict(spf, si));
    }

    #[test]
    fn type_matching() {
        let mut types = TypeStore::new();
        let i32t = types.int(32, true);
        let u32t = types.int(32, false);
        let f32t = types.float(32);
        let named = types.variant_of(i32t, "my_int");
        let a3 = types.array(i32t, Some(3));
        let a4 = types.array(i32t, Some(4));
        let v4 = types.vector(i32t, 4);
        let may = types.variant_of(f32t, "alias_float");
        types.set_may_alias(may);
        let tbaa = AliasSetTable::new(&types, true);

        assert_eq!(tbaa.same_type_for_tbaa(i32t, named), TypeMatch::Same);
        assert_eq!(tbaa.same_type_for_tbaa(i32t, u32t), TypeMatch::Unknown);
        assert_eq!(tbaa.same_type_for_tbaa(a3, a4), TypeMatch::Unknown);
        assert_eq!(tbaa.same_type_for_tbaa(i32t, f32t), TypeMatch::Different);
        assert!(tbaa.set_of(may).is_wildcard());

        assert_eq!(tbaa.compare_type_sizes(a3, v4), Ordering::Equal);
        assert_eq!(tbaa.compare_type_sizes(a3, types.char), Ordering::Greater);

        let lax = AliasSetTable::new(&types, false);
        assert!(lax.set_of(i32t).is_wildcard());
        assert_eq!(lax.same_type_for_tbaa(i32t, f32t), TypeMatch::Unknown);
    }
}
