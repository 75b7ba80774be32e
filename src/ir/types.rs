//! Types of values and memory objects.
//!
//! Unlike machine-level IRs, this IR keeps source-level aggregate types around: the alias oracle
//! needs record layouts and type identities to disambiguate accesses structurally and by type,
//! and the range solver needs integer precision and overflow semantics.
//!
//! Types live in a [`TypeStore`] owned by the function and are referred to by [`Type`] handles.
//! Every type has a *canonical* type: variants (typedefs, qualified copies) share the canonical
//! type of the type they were derived from, and type-based alias analysis only ever compares
//! canonical types.

use crate::entity::{PrimaryMap, packed_option::PackedOption};
use crate::fx::FxHashMap;
use crate::ir::{Field, Type};
use core::fmt;

/// The shape of a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// No value.
    Void,
    /// A one-bit unsigned truth value.
    Bool,
    /// An integer of `bits` precision.
    ///
    /// `wraps` is set when arithmetic overflow is defined to wrap around. When it is clear,
    /// overflow is undefined behavior and the range solver may assume it does not happen.
    Int {
        /// Precision in bits, between 1 and 64.
        bits: u8,
        /// Signed two's complement interpretation.
        signed: bool,
        /// Overflow wraps.
        wraps: bool,
    },
    /// A floating point number.
    Float {
        /// Width in bits.
        bits: u8,
    },
    /// A data pointer.
    Pointer {
        /// The pointed-to type.
        pointee: Type,
        /// Accesses through this pointer type may alias anything.
        ref_all: bool,
    },
    /// A record with fields at distinct offsets.
    Record {
        /// Fields in declaration order.
        fields: Vec<Field>,
    },
    /// A union whose fields all start at offset 0.
    Union {
        /// Fields in declaration order.
        fields: Vec<Field>,
    },
    /// An array of `len` elements indexed starting at `low_bound`.
    Array {
        /// Element type.
        elem: Type,
        /// Number of elements, `None` for arrays of unknown size.
        len: Option<u64>,
        /// The index of the first element.
        low_bound: i64,
    },
    /// A SIMD vector.
    Vector {
        /// Lane type.
        elem: Type,
        /// Number of lanes.
        lanes: u32,
    },
    /// A function type. Functions are code, not data.
    Function,
}

/// Data describing a single type.
#[derive(Clone, Debug)]
pub struct TypeData {
    /// The shape of the type.
    pub kind: TypeKind,
    /// Size in bytes, `None` for incomplete and variable-sized types.
    pub size: Option<u64>,
    /// The canonical type this type is a variant of. A canonical type refers to itself.
    pub canonical: Type,
    /// Accesses through lvalues of this type may alias anything, like character types.
    pub may_alias: bool,
    /// An optional name, for printing.
    pub name: Option<String>,
}

/// Data describing a single field of a record or union.
#[derive(Clone, Debug)]
pub struct FieldData {
    /// Name of the field.
    pub name: String,
    /// The record or union type containing this field.
    pub parent: Type,
    /// The type of the field.
    pub ty: Type,
    /// Byte offset of the storage unit containing the field.
    pub offset: u64,
    /// Bit offset of the field from `offset`.
    pub bit_offset: u64,
    /// Size of the field in bits, `None` for flexible array members.
    pub bit_size: Option<u64>,
    /// This is a bit-field.
    pub bit_field: bool,
    /// For bit-fields, a field covering the whole storage unit the bit-field lives in.
    pub representative: PackedOption<Field>,
}

impl FieldData {
    /// Bit position of the field from the start of its parent.
    pub fn bit_position(&self) -> u64 {
        self.offset * 8 + self.bit_offset
    }
}

/// Storage for all the types and fields used by a function.
#[derive(Clone)]
pub struct TypeStore {
    types: PrimaryMap<Type, TypeData>,
    fields: PrimaryMap<Field, FieldData>,
    ints: FxHashMap<(u8, bool, bool), Type>,
    pointers: FxHashMap<(Type, bool), Type>,

    /// The `void` type.
    pub void: Type,
    /// The boolean type.
    pub bool: Type,
    /// The plain character type. Accesses through it alias everything.
    pub char: Type,
    /// The unsigned integer type of object sizes.
    pub size: Type,
    /// `void *`.
    pub void_ptr: Type,
}

impl TypeStore {
    /// Create a type store with the standard types.
    pub fn new() -> Self {
        let mut types = PrimaryMap::new();
        let void = types.next_key();
        types.push(TypeData {
            kind: TypeKind::Void,
            size: None,
            canonical: void,
            may_alias: false,
            name: Some("void".to_string()),
        });
        let mut store = Self {
            types,
            fields: PrimaryMap::new(),
            ints: FxHashMap::default(),
            pointers: FxHashMap::default(),
            void,
            bool: void,
            char: void,
            size: void,
            void_ptr: void,
        };
        store.bool = store.make(TypeKind::Bool, Some(1));
        store.char = store.int(8, true);
        store.size = store.int(64, false);
        store.void_ptr = store.pointer_to(void);
        store
    }

    /// Create a new canonical type.
    pub fn make(&mut self, kind: TypeKind, size: Option<u64>) -> Type {
        let next = self.types.next_key();
        self.types.push(TypeData {
            kind,
            size,
            canonical: next,
            may_alias: false,
            name: None,
        })
    }

    /// Create a named variant of `ty`, like a typedef. It has the same canonical type.
    pub fn variant_of(&mut self, ty: Type, name: &str) -> Type {
        let mut data = self.types[ty].clone();
        data.name = Some(name.to_string());
        self.types.push(data)
    }

    /// Get the integer type of `bits` precision with the default overflow behavior: unsigned
    /// arithmetic wraps, signed overflow is undefined.
    pub fn int(&mut self, bits: u8, signed: bool) -> Type {
        self.int_with_overflow(bits, signed, !signed)
    }

    /// Get the integer type of `bits` precision with explicit overflow behavior.
    pub fn int_with_overflow(&mut self, bits: u8, signed: bool, wraps: bool) -> Type {
        debug_assert!(bits >= 1 && bits <= 64);
        if let Some(&ty) = self.ints.get(&(bits, signed, wraps)) {
            return ty;
        }
        let bytes = u64::from(bits).div_ceil(8);
        let ty = self.make(TypeKind::Int { bits, signed, wraps }, Some(bytes));
        self.ints.insert((bits, signed, wraps), ty);
        ty
    }

    /// Get the floating point type of `bits` width.
    pub fn float(&mut self, bits: u8) -> Type {
        self.make(TypeKind::Float { bits }, Some(u64::from(bits) / 8))
    }

    /// Get the pointer type to `pointee`.
    pub fn pointer_to(&mut self, pointee: Type) -> Type {
        self.pointer(pointee, false)
    }

    /// Get a pointer type to `pointee` whose dereferences may alias any object.
    pub fn pointer_to_ref_all(&mut self, pointee: Type) -> Type {
        self.pointer(pointee, true)
    }

    fn pointer(&mut self, pointee: Type, ref_all: bool) -> Type {
        if let Some(&ty) = self.pointers.get(&(pointee, ref_all)) {
            return ty;
        }
        let ty = self.make(TypeKind::Pointer { pointee, ref_all }, Some(8));
        self.pointers.insert((pointee, ref_all), ty);
        ty
    }

    /// Create an array of `len` elements of `elem`, indexed from 0.
    pub fn array(&mut self, elem: Type, len: Option<u64>) -> Type {
        self.array_with_low_bound(elem, len, 0)
    }

    /// Create an array of `len` elements of `elem` whose first index is `low_bound`.
    pub fn array_with_low_bound(&mut self, elem: Type, len: Option<u64>, low_bound: i64) -> Type {
        let size = match (self.size_bytes(elem), len) {
            (Some(e), Some(n)) => Some(e * n),
            _ => None,
        };
        self.make(
            TypeKind::Array {
                elem,
                len,
                low_bound,
            },
            size,
        )
    }

    /// Create a vector of `lanes` lanes of `elem`.
    pub fn vector(&mut self, elem: Type, lanes: u32) -> Type {
        let size = self.size_bytes(elem).map(|e| e * u64::from(lanes));
        self.make(TypeKind::Vector { elem, lanes }, size)
    }

    /// Start building a record type named `name`.
    pub fn record_builder(&mut self, name: &str) -> RecordBuilder<'_> {
        let ty = self.make(TypeKind::Record { fields: Vec::new() }, None);
        self.types[ty].name = Some(name.to_string());
        RecordBuilder {
            store: self,
            ty,
            is_union: false,
            next_bit: 0,
            align: 1,
            unit: None,
        }
    }

    /// Start building a union type named `name`.
    pub fn union_builder(&mut self, name: &str) -> RecordBuilder<'_> {
        let ty = self.make(TypeKind::Union { fields: Vec::new() }, None);
        self.types[ty].name = Some(name.to_string());
        RecordBuilder {
            store: self,
            ty,
            is_union: true,
            next_bit: 0,
            align: 1,
            unit: None,
        }
    }

    /// Create a record type with the given fields laid out with natural alignment.
    pub fn record(&mut self, name: &str, fields: &[(&str, Type)]) -> Type {
        let mut b = self.record_builder(name);
        for &(n, t) in fields {
            b.field(n, t);
        }
        b.finish()
    }

    /// Mark `ty` so that accesses through lvalues of that type may alias anything.
    pub fn set_may_alias(&mut self, ty: Type) {
        self.types[ty].may_alias = true;
    }

    /// Get the data of `ty`.
    pub fn data(&self, ty: Type) -> &TypeData {
        &self.types[ty]
    }

    /// Get the kind of `ty`.
    pub fn kind(&self, ty: Type) -> &TypeKind {
        &self.types[ty].kind
    }

    /// Get the data of `field`.
    pub fn field(&self, field: Field) -> &FieldData {
        &self.fields[field]
    }

    /// The canonical type of `ty`.
    pub fn canonical(&self, ty: Type) -> Type {
        self.types[ty].canonical
    }

    /// Size of `ty` in bytes.
    pub fn size_bytes(&self, ty: Type) -> Option<u64> {
        self.types[ty].size
    }

    /// Size of `ty` in bits.
    pub fn size_bits(&self, ty: Type) -> Option<u64> {
        match self.types[ty].kind {
            TypeKind::Bool => Some(8),
            _ => self.types[ty].size.map(|s| s * 8),
        }
    }

    /// Required alignment of `ty` in bytes.
    pub fn align(&self, ty: Type) -> u64 {
        match self.types[ty].kind {
            TypeKind::Array { elem, .. } => self.align(elem),
            TypeKind::Record { ref fields } | TypeKind::Union { ref fields } => fields
                .iter()
                .map(|&f| self.align(self.fields[f].ty))
                .max()
                .unwrap_or(1),
            _ => self.types[ty].size.unwrap_or(1).clamp(1, 8),
        }
    }

    /// The fields of a record or union type, empty otherwise.
    pub fn fields_of(&self, ty: Type) -> &[Field] {
        match self.types[ty].kind {
            TypeKind::Record { ref fields } | TypeKind::Union { ref fields } => fields,
            _ => &[],
        }
    }

    /// Is `ty` an integer or boolean type?
    pub fn is_integral(&self, ty: Type) -> bool {
        matches!(self.types[ty].kind, TypeKind::Int { .. } | TypeKind::Bool)
    }

    /// Is `ty` a pointer type?
    pub fn is_pointer(&self, ty: Type) -> bool {
        matches!(self.types[ty].kind, TypeKind::Pointer { .. })
    }

    /// Is `ty` a record type?
    pub fn is_record(&self, ty: Type) -> bool {
        matches!(self.types[ty].kind, TypeKind::Record { .. })
    }

    /// Is `ty` a union type?
    pub fn is_union(&self, ty: Type) -> bool {
        matches!(self.types[ty].kind, TypeKind::Union { .. })
    }

    /// Is `ty` an array type?
    pub fn is_array(&self, ty: Type) -> bool {
        matches!(self.types[ty].kind, TypeKind::Array { .. })
    }

    /// Is `ty` a record, union or array type?
    pub fn is_aggregate(&self, ty: Type) -> bool {
        matches!(
            self.types[ty].kind,
            TypeKind::Record { .. } | TypeKind::Union { .. } | TypeKind::Array { .. }
        )
    }

    /// Does `ty` have sub-objects which can be accessed on their own?
    pub fn has_components(&self, ty: Type) -> bool {
        self.is_aggregate(ty) || matches!(self.types[ty].kind, TypeKind::Vector { .. })
    }

    /// Is `ty` a character-like integer type whose lvalues may alias anything?
    pub fn is_char_like(&self, ty: Type) -> bool {
        matches!(self.types[ty].kind, TypeKind::Int { bits: 8, .. })
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self, ty: Type) -> Option<Type> {
        match self.types[ty].kind {
            TypeKind::Pointer { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    /// The element type of an array or vector type.
    pub fn element(&self, ty: Type) -> Option<Type> {
        match self.types[ty].kind {
            TypeKind::Array { elem, .. } | TypeKind::Vector { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// A display adapter for `ty`.
    pub fn display(&self, ty: Type) -> DisplayType<'_> {
        DisplayType { store: self, ty }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for record and union layouts.
///
/// Ordinary fields are placed at the next offset aligned to their natural alignment. Bit-fields are
/// packed into storage units of their declared type. Each storage unit is represented by a
/// hidden field which is recorded as the representative of the bit-fields sharing it.
pub struct RecordBuilder<'a> {
    store: &'a mut TypeStore,
    ty: Type,
    is_union: bool,
    next_bit: u64,
    align: u64,
    // Current bit-field storage unit: (representative, unit start bit, unit size in bits).
    unit: Option<(Field, u64, u64)>,
}

impl<'a> RecordBuilder<'a> {
    fn push_field(&mut self, data: FieldData) -> Field {
        let field = self.store.fields.push(data);
        match self.store.types[self.ty].kind {
            TypeKind::Record { ref mut fields } | TypeKind::Union { ref mut fields } => {
                fields.push(field)
            }
            _ => unreachable!("record builder on a non-record type"),
        }
        field
    }

    /// Add a field of type `ty`.
    pub fn field(&mut self, name: &str, ty: Type) -> Field {
        self.unit = None;
        let align = self.store.align(ty);
        self.align = self.align.max(align);
        let offset = if self.is_union {
            0
        } else {
            self.next_bit.div_ceil(8).next_multiple_of(align)
        };
        let bit_size = self.store.size_bits(ty);
        if !self.is_union {
            self.next_bit = offset * 8 + bit_size.unwrap_or(0);
        }
        self.push_field(FieldData {
            name: name.to_string(),
            parent: self.ty,
            ty,
            offset,
            bit_offset: 0,
            bit_size,
            bit_field: false,
            representative: None.into(),
        })
    }

    /// Add a bit-field of `bits` bits with declared type `ty`.
    pub fn bit_field(&mut self, name: &str, ty: Type, bits: u64) -> Field {
        let unit_bits = self.store.size_bits(ty).unwrap_or(8);
        let fits = match self.unit {
            Some((_, start, size)) => self.next_bit + bits <= start + size,
            None => false,
        };
        if !fits {
            let align = self.store.align(ty);
            self.align = self.align.max(align);
            let start = if self.is_union {
                0
            } else {
                self.next_bit.div_ceil(8).next_multiple_of(align) * 8
            };
            let repr = self.store.fields.push(FieldData {
                name: format!("{name}$unit"),
                parent: self.ty,
                ty,
                offset: start / 8,
                bit_offset: 0,
                bit_size: Some(unit_bits),
                bit_field: false,
                representative: None.into(),
            });
            self.unit = Some((repr, start, unit_bits));
            self.next_bit = start;
        }
        let (repr, start, _) = self.unit.expect("storage unit was just created");
        let bit = self.next_bit;
        if !self.is_union {
            self.next_bit += bits;
        }
        self.push_field(FieldData {
            name: name.to_string(),
            parent: self.ty,
            ty,
            offset: start / 8,
            bit_offset: bit - start,
            bit_size: Some(bits),
            bit_field: true,
            representative: repr.into(),
        })
    }

    /// Add a trailing array of unknown size.
    pub fn flexible_array(&mut self, name: &str, elem: Type) -> Field {
        let ty = self.store.array(elem, None);
        let align = self.store.align(elem);
        self.align = self.align.max(align);
        let offset = self.next_bit.div_ceil(8).next_multiple_of(align);
        self.next_bit = offset * 8;
        self.unit = None;
        self.push_field(FieldData {
            name: name.to_string(),
            parent: self.ty,
            ty,
            offset,
            bit_offset: 0,
            bit_size: None,
            bit_field: false,
            representative: None.into(),
        })
    }

    /// Finish the layout and return the type.
    pub fn finish(self) -> Type {
        let size = if self.is_union {
            self.store
                .fields_of(self.ty)
                .iter()
                .map(|&f| self.store.fields[f].bit_size.unwrap_or(0))
                .max()
                .unwrap_or(0)
                .div_ceil(8)
        } else {
            self.next_bit.div_ceil(8)
        };
        self.store.types[self.ty].size = Some(size.next_multiple_of(self.align));
        self.ty
    }
}

/// Display adapter for a type.
pub struct DisplayType<'a> {
    store: &'a TypeStore,
    ty: Type,
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = self.store.data(self.ty);
        if let Some(name) = &data.name {
            return f.write_str(name);
        }
        match data.kind {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Int { bits, signed, .. } => {
                write!(f, "{}{}", if signed { "i" } else { "u" }, bits)
            }
            TypeKind::Float { bits } => write!(f, "f{bits}"),
            TypeKind::Pointer { pointee, .. } => write!(f, "{}*", self.store.display(pointee)),
            TypeKind::Array { elem, len, .. } => match len {
                Some(n) => write!(f, "{}[{n}]", self.store.display(elem)),
                None => write!(f, "{}[]", self.store.display(elem)),
            },
            TypeKind::Vector { elem, lanes } => {
                write!(f, "{}x{lanes}", self.store.display(elem))
            }
            TypeKind::Record { .. } => write!(f, "struct {}", self.ty),
            TypeKind::Union { .. } => write!(f, "union {}", self.ty),
            TypeKind::Function => write!(f, "fn"),
        }
    }
}
