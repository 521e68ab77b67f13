//! Type universe for Asthra
//!
//! All type descriptors live in a single arena owned by the compilation.
//! Code refers to types through [`TypeId`] handles, so descriptors are never
//! freed individually and recursive types (`struct Node { next: *Node }`)
//! need no back-references.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::symbols::Symbol;

/// Handle into the [`TypeUniverse`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Size of the enum discriminant tag, in bytes.
///
/// Enum values are laid out as `{ u32 tag; payload }` with the payload
/// starting immediately after the tag and the whole value rounded up to
/// 8-byte alignment. This layout is ABI and must not change.
pub const ENUM_TAG_SIZE: u64 = 4;

/// Alignment of a complete enum value.
pub const ENUM_ALIGN: u64 = 8;

/// Primitive type kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Isize,
    Usize,
    F32,
    F64,
    Bool,
    Char,
    /// Runtime-managed string handle. Distinct from `*u8`.
    String,
    Void,
}

impl PrimitiveKind {
    pub fn size(self) -> u64 {
        match self {
            PrimitiveKind::I8 | PrimitiveKind::U8 | PrimitiveKind::Bool => 1,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 | PrimitiveKind::Char => 4,
            PrimitiveKind::I64
            | PrimitiveKind::U64
            | PrimitiveKind::Isize
            | PrimitiveKind::Usize
            | PrimitiveKind::F64
            | PrimitiveKind::String => 8,
            PrimitiveKind::Void => 0,
        }
    }

    pub fn align(self) -> u64 {
        match self {
            PrimitiveKind::Void => 1,
            other => other.size(),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::U8
                | PrimitiveKind::U16
                | PrimitiveKind::U32
                | PrimitiveKind::U64
                | PrimitiveKind::Isize
                | PrimitiveKind::Usize
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::Isize
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Value range for integer primitives, as (min, max) in i128 space.
    /// Returns None for non-integer kinds.
    pub fn integer_range(self) -> Option<(i128, i128)> {
        let bits: u32 = match self {
            PrimitiveKind::I8 | PrimitiveKind::U8 => 8,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 16,
            PrimitiveKind::I32 | PrimitiveKind::U32 => 32,
            PrimitiveKind::I64
            | PrimitiveKind::U64
            | PrimitiveKind::Isize
            | PrimitiveKind::Usize => 64,
            _ => return None,
        };
        if self.is_signed() {
            Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
        } else {
            Some((0, (1i128 << bits) - 1))
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::Isize => "isize",
            PrimitiveKind::Usize => "usize",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::String => "string",
            PrimitiveKind::Void => "void",
        }
    }

    /// Parse a primitive type name as it appears in source.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "i8" => PrimitiveKind::I8,
            "i16" => PrimitiveKind::I16,
            "i32" => PrimitiveKind::I32,
            "i64" => PrimitiveKind::I64,
            "u8" => PrimitiveKind::U8,
            "u16" => PrimitiveKind::U16,
            "u32" => PrimitiveKind::U32,
            "u64" => PrimitiveKind::U64,
            "isize" => PrimitiveKind::Isize,
            "usize" => PrimitiveKind::Usize,
            "f32" => PrimitiveKind::F32,
            "f64" => PrimitiveKind::F64,
            "bool" => PrimitiveKind::Bool,
            "char" => PrimitiveKind::Char,
            "string" => PrimitiveKind::String,
            "void" => PrimitiveKind::Void,
            _ => return None,
        };
        Some(kind)
    }
}

/// A named struct field with its resolved type and computed byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
    pub offset: u64,
}

/// A single enum variant.
///
/// `value` is the source-level integer value (explicit or auto-incremented
/// from 0). `discriminant` is the runtime tag stored in the first four bytes
/// of the enum layout; for user enums it is the FNV-1a hash of the variant
/// name, for the intrinsic `Option`/`Result` it is fixed (0/1).
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub payload: Option<TypeId>,
    pub value: i64,
    pub discriminant: u32,
}

/// Tagged type descriptor payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Pointer {
        pointee: TypeId,
        mutable: bool,
    },
    Slice {
        element: TypeId,
        mutable: bool,
    },
    Array {
        element: TypeId,
        length: u64,
    },
    Tuple {
        elements: Vec<TypeId>,
        offsets: Vec<u64>,
    },
    Struct {
        name: String,
        type_params: Vec<String>,
        fields: Vec<StructField>,
        methods: HashMap<String, Symbol>,
    },
    Enum {
        name: String,
        type_params: Vec<String>,
        variants: Vec<EnumVariant>,
    },
    Function {
        params: Vec<TypeId>,
        ret: TypeId,
        is_extern: bool,
        extern_name: Option<String>,
        /// Index of the first variadic parameter, for variadic externs.
        variadic_from: Option<usize>,
    },
    GenericInstance {
        base: TypeId,
        args: Vec<TypeId>,
    },
    /// Built-in sugar for the standard `Result` enum.
    Result {
        ok: TypeId,
        err: TypeId,
    },
    TypeParameter {
        name: String,
    },
    /// Placeholder during inference.
    Unknown,
    /// Escape hatch for predeclared symbols whose signatures are special-cased.
    Builtin,
}

/// A type descriptor: category payload plus computed layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub size: u64,
    pub align: u64,
}

/// FNV-1a over a variant name, used as the stable runtime discriminant for
/// user-defined enums. Part of the ABI.
pub fn variant_name_hash(name: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// The arena of all type descriptors for one compilation.
pub struct TypeUniverse {
    types: Vec<TypeDescriptor>,
    primitives: HashMap<PrimitiveKind, TypeId>,
    unknown: TypeId,
    builtin: TypeId,
    option_enum: TypeId,
    result_enum: TypeId,
}

impl Default for TypeUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeUniverse {
    pub fn new() -> Self {
        let mut universe = TypeUniverse {
            types: Vec::new(),
            primitives: HashMap::new(),
            unknown: TypeId(0),
            builtin: TypeId(0),
            option_enum: TypeId(0),
            result_enum: TypeId(0),
        };

        universe.unknown = universe.alloc(TypeKind::Unknown, 0, 1);
        universe.builtin = universe.alloc(TypeKind::Builtin, 0, 1);

        // The intrinsic Option/Result enums. Their discriminants are fixed
        // by the ABI, not hashed.
        let t = universe.type_parameter("T");
        let e = universe.type_parameter("E");
        universe.option_enum = universe.intrinsic_enum(
            "Option",
            vec!["T".to_string()],
            vec![("Some", Some(t), 0), ("None", None, 1)],
        );
        universe.result_enum = universe.intrinsic_enum(
            "Result",
            vec!["T".to_string(), "E".to_string()],
            vec![("Ok", Some(t), 0), ("Err", Some(e), 1)],
        );

        universe
    }

    fn alloc(&mut self, kind: TypeKind, size: u64, align: u64) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDescriptor { kind, size, align });
        id
    }

    fn intrinsic_enum(
        &mut self,
        name: &str,
        type_params: Vec<String>,
        variants: Vec<(&str, Option<TypeId>, u32)>,
    ) -> TypeId {
        let variants = variants
            .into_iter()
            .enumerate()
            .map(|(i, (vname, payload, disc))| EnumVariant {
                name: vname.to_string(),
                payload,
                value: i as i64,
                discriminant: disc,
            })
            .collect::<Vec<_>>();
        let size = self.enum_layout_size(&variants);
        self.alloc(
            TypeKind::Enum {
                name: name.to_string(),
                type_params,
                variants,
            },
            size,
            ENUM_ALIGN,
        )
    }

    fn enum_layout_size(&self, variants: &[EnumVariant]) -> u64 {
        let payload_max = variants
            .iter()
            .filter_map(|v| v.payload)
            .map(|ty| self.size_of(ty))
            .max()
            .unwrap_or(0);
        align_up(ENUM_TAG_SIZE + payload_max, ENUM_ALIGN)
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// Interned primitive descriptor.
    pub fn primitive(&mut self, kind: PrimitiveKind) -> TypeId {
        if let Some(&id) = self.primitives.get(&kind) {
            return id;
        }
        let id = self.alloc(TypeKind::Primitive(kind), kind.size(), kind.align());
        self.primitives.insert(kind, id);
        id
    }

    pub fn unknown(&self) -> TypeId {
        self.unknown
    }

    pub fn builtin(&self) -> TypeId {
        self.builtin
    }

    pub fn option_enum(&self) -> TypeId {
        self.option_enum
    }

    pub fn result_enum(&self) -> TypeId {
        self.result_enum
    }

    pub fn pointer_to(&mut self, pointee: TypeId, mutable: bool) -> TypeId {
        self.alloc(TypeKind::Pointer { pointee, mutable }, 8, 8)
    }

    /// Slices are a 16-byte `{ ptr, len }` descriptor.
    pub fn slice_of(&mut self, element: TypeId, mutable: bool) -> TypeId {
        self.alloc(TypeKind::Slice { element, mutable }, 16, 8)
    }

    /// Fixed arrays require a compile-time length of at least 1.
    pub fn array_of(&mut self, element: TypeId, length: u64) -> Option<TypeId> {
        if length == 0 {
            return None;
        }
        let elem_size = self.size_of(element);
        let elem_align = self.align_of(element);
        Some(self.alloc(
            TypeKind::Array { element, length },
            elem_size * length,
            elem_align,
        ))
    }

    /// Tuples require arity of at least 2. Element offsets respect natural
    /// alignment; the whole tuple is padded out to its max alignment.
    pub fn tuple_of(&mut self, elements: Vec<TypeId>) -> Option<TypeId> {
        if elements.len() < 2 {
            return None;
        }
        let mut offsets = Vec::with_capacity(elements.len());
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for &elem in &elements {
            let align = self.align_of(elem).max(1);
            let size = self.size_of(elem);
            offset = align_up(offset, align);
            offsets.push(offset);
            offset += size;
            max_align = max_align.max(align);
        }
        let size = align_up(offset, max_align);
        Some(self.alloc(TypeKind::Tuple { elements, offsets }, size, max_align))
    }

    pub fn function(
        &mut self,
        params: Vec<TypeId>,
        ret: TypeId,
        is_extern: bool,
        extern_name: Option<String>,
        variadic_from: Option<usize>,
    ) -> TypeId {
        self.alloc(
            TypeKind::Function {
                params,
                ret,
                is_extern,
                extern_name,
                variadic_from,
            },
            8,
            8,
        )
    }

    /// Build a struct descriptor, computing field offsets with natural
    /// alignment and trailing padding to the max field alignment.
    /// Duplicate field names are the caller's responsibility to reject.
    pub fn struct_type(
        &mut self,
        name: String,
        type_params: Vec<String>,
        fields: Vec<(String, TypeId)>,
    ) -> TypeId {
        let mut laid_out = Vec::with_capacity(fields.len());
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for (fname, fty) in fields {
            let align = self.align_of(fty).max(1);
            let size = self.size_of(fty);
            offset = align_up(offset, align);
            laid_out.push(StructField {
                name: fname,
                ty: fty,
                offset,
            });
            offset += size;
            max_align = max_align.max(align);
        }
        let size = align_up(offset, max_align);
        self.alloc(
            TypeKind::Struct {
                name,
                type_params,
                fields: laid_out,
                methods: HashMap::new(),
            },
            size,
            max_align,
        )
    }

    /// Build a user enum descriptor. Discriminants are the FNV-1a hash of
    /// each variant name; `value` is the explicit source value where given,
    /// auto-incremented from 0 otherwise (resolved by the analyzer).
    pub fn enum_type(
        &mut self,
        name: String,
        type_params: Vec<String>,
        variants: Vec<(String, Option<TypeId>, i64)>,
    ) -> TypeId {
        let variants = variants
            .into_iter()
            .map(|(vname, payload, value)| {
                let discriminant = variant_name_hash(&vname);
                EnumVariant {
                    name: vname,
                    payload,
                    value,
                    discriminant,
                }
            })
            .collect::<Vec<_>>();
        let size = self.enum_layout_size(&variants);
        self.alloc(
            TypeKind::Enum {
                name,
                type_params,
                variants,
            },
            size,
            ENUM_ALIGN,
        )
    }

    /// Instantiate a generic struct or enum with concrete arguments.
    ///
    /// Returns None when the base is not a generic struct/enum or the
    /// argument count does not match its parameter count. Re-instantiation
    /// with the same arguments yields a fresh but structurally-equal
    /// descriptor; callers compare by structural equality.
    pub fn instantiate(&mut self, base: TypeId, args: Vec<TypeId>) -> Option<TypeId> {
        let param_count = match self.kind(base) {
            TypeKind::Struct { type_params, .. } | TypeKind::Enum { type_params, .. } => {
                type_params.len()
            }
            _ => return None,
        };
        if param_count == 0 || param_count != args.len() {
            return None;
        }
        // Layout of an instance matches the substituted base.
        let (size, align) = self.instance_layout(base, &args);
        Some(self.alloc(TypeKind::GenericInstance { base, args }, size, align))
    }

    fn instance_layout(&mut self, base: TypeId, args: &[TypeId]) -> (u64, u64) {
        match self.kind(base).clone() {
            TypeKind::Struct {
                type_params,
                fields,
                ..
            } => {
                let mut offset = 0u64;
                let mut max_align = 1u64;
                for field in &fields {
                    let fty = self.substitute(field.ty, &type_params, args);
                    let align = self.align_of(fty).max(1);
                    offset = align_up(offset, align) + self.size_of(fty);
                    max_align = max_align.max(align);
                }
                (align_up(offset, max_align), max_align)
            }
            TypeKind::Enum {
                type_params,
                variants,
                ..
            } => {
                let payload_max = variants
                    .iter()
                    .filter_map(|v| v.payload)
                    .map(|ty| {
                        let sub = self.substitute(ty, &type_params, args);
                        self.size_of(sub)
                    })
                    .max()
                    .unwrap_or(0);
                (
                    align_up(ENUM_TAG_SIZE + payload_max, ENUM_ALIGN),
                    ENUM_ALIGN,
                )
            }
            _ => (0, 1),
        }
    }

    /// Substitute type parameters (by name) with concrete arguments.
    pub fn substitute(&mut self, ty: TypeId, params: &[String], args: &[TypeId]) -> TypeId {
        match self.kind(ty).clone() {
            TypeKind::TypeParameter { name } => params
                .iter()
                .position(|p| *p == name)
                .map(|i| args[i])
                .unwrap_or(ty),
            TypeKind::Pointer { pointee, mutable } => {
                let sub = self.substitute(pointee, params, args);
                if sub == pointee {
                    ty
                } else {
                    self.pointer_to(sub, mutable)
                }
            }
            TypeKind::Slice { element, mutable } => {
                let sub = self.substitute(element, params, args);
                if sub == element {
                    ty
                } else {
                    self.slice_of(sub, mutable)
                }
            }
            TypeKind::Array { element, length } => {
                let sub = self.substitute(element, params, args);
                if sub == element {
                    ty
                } else {
                    self.array_of(sub, length).unwrap_or(ty)
                }
            }
            TypeKind::Tuple { elements, .. } => {
                let subs: Vec<TypeId> = elements
                    .iter()
                    .map(|&e| self.substitute(e, params, args))
                    .collect();
                if subs == elements {
                    ty
                } else {
                    self.tuple_of(subs).unwrap_or(ty)
                }
            }
            TypeKind::Result { ok, err } => {
                let ok_sub = self.substitute(ok, params, args);
                let err_sub = self.substitute(err, params, args);
                if ok_sub == ok && err_sub == err {
                    ty
                } else {
                    self.result_of(ok_sub, err_sub)
                }
            }
            TypeKind::GenericInstance { base, args: inner } => {
                let subs: Vec<TypeId> = inner
                    .iter()
                    .map(|&a| self.substitute(a, params, args))
                    .collect();
                if subs == inner {
                    ty
                } else {
                    self.instantiate(base, subs).unwrap_or(ty)
                }
            }
            _ => ty,
        }
    }

    /// Built-in `Result<T, E>` sugar. Layout matches the instantiated
    /// intrinsic Result enum.
    pub fn result_of(&mut self, ok: TypeId, err: TypeId) -> TypeId {
        let payload_max = self.size_of(ok).max(self.size_of(err));
        let size = align_up(ENUM_TAG_SIZE + payload_max, ENUM_ALIGN);
        self.alloc(TypeKind::Result { ok, err }, size, ENUM_ALIGN)
    }

    /// Replace a descriptor in place.
    ///
    /// Used by the analyzer's two-phase declaration processing: struct and
    /// enum names are stubbed first so fields may reference types declared
    /// later in the module, then each stub is overwritten with its
    /// fully-resolved descriptor at the same id.
    pub(crate) fn redefine(&mut self, id: TypeId, kind: TypeKind, size: u64, align: u64) {
        self.types[id.0 as usize] = TypeDescriptor { kind, size, align };
    }

    pub fn type_parameter(&mut self, name: &str) -> TypeId {
        self.alloc(
            TypeKind::TypeParameter {
                name: name.to_string(),
            },
            0,
            1,
        )
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.0 as usize].kind
    }

    pub fn size_of(&self, id: TypeId) -> u64 {
        self.types[id.0 as usize].size
    }

    pub fn align_of(&self, id: TypeId) -> u64 {
        self.types[id.0 as usize].align
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_unknown(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Unknown)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Primitive(p) if p.is_integer())
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Primitive(p) if p.is_numeric())
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Primitive(PrimitiveKind::Bool))
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Primitive(PrimitiveKind::Void))
    }

    pub fn primitive_kind(&self, id: TypeId) -> Option<PrimitiveKind> {
        match self.kind(id) {
            TypeKind::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// Attach a method symbol to a struct's method table after the fact
    /// (impl blocks are analyzed after the struct declaration).
    pub fn attach_method(&mut self, struct_id: TypeId, name: String, symbol: Symbol) -> bool {
        match &mut self.types[struct_id.0 as usize].kind {
            TypeKind::Struct { methods, .. } => {
                methods.insert(name, symbol);
                true
            }
            _ => false,
        }
    }

    /// Look up a method in a struct's (or generic struct instance's) table.
    pub fn find_method(&self, id: TypeId, name: &str) -> Option<&Symbol> {
        match self.kind(id) {
            TypeKind::Struct { methods, .. } => methods.get(name),
            TypeKind::GenericInstance { base, .. } => self.find_method(*base, name),
            _ => None,
        }
    }

    /// Look up a field in a struct (or generic struct instance).
    pub fn find_field(&self, id: TypeId, name: &str) -> Option<&StructField> {
        match self.kind(id) {
            TypeKind::Struct { fields, .. } => fields.iter().find(|f| f.name == name),
            TypeKind::GenericInstance { base, .. } => self.find_field(*base, name),
            _ => None,
        }
    }

    /// View any Result-shaped type as its `(ok, err)` pair: the sugar form
    /// and instances of the intrinsic Result enum are interchangeable.
    pub fn as_result_pair(&self, id: TypeId) -> Option<(TypeId, TypeId)> {
        match self.kind(id) {
            TypeKind::Result { ok, err } => Some((*ok, *err)),
            TypeKind::GenericInstance { base, args }
                if *base == self.result_enum && args.len() == 2 =>
            {
                Some((args[0], args[1]))
            }
            _ => None,
        }
    }

    /// View an `Option<T>` instance as its payload type.
    pub fn as_option_payload(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::GenericInstance { base, args }
                if *base == self.option_enum && args.len() == 1 =>
            {
                Some(args[0])
            }
            _ => None,
        }
    }

    /// The enum descriptor (and type arguments) behind a scrutinee type,
    /// looking through generic instances and Result sugar.
    pub fn as_enum(&self, id: TypeId) -> Option<(TypeId, Vec<TypeId>)> {
        match self.kind(id) {
            TypeKind::Enum { .. } => Some((id, Vec::new())),
            TypeKind::GenericInstance { base, args } => match self.kind(*base) {
                TypeKind::Enum { .. } => Some((*base, args.clone())),
                _ => None,
            },
            TypeKind::Result { ok, err } => Some((self.result_enum, vec![*ok, *err])),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Equality / compatibility
    // ------------------------------------------------------------------

    /// Structural equality. Structs and enums compare nominally by name;
    /// generic instances by base identity and pointwise argument equality.
    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (TypeKind::Primitive(pa), TypeKind::Primitive(pb)) => pa == pb,
            (
                TypeKind::Pointer {
                    pointee: pa,
                    mutable: ma,
                },
                TypeKind::Pointer {
                    pointee: pb,
                    mutable: mb,
                },
            ) => ma == mb && self.types_equal(*pa, *pb),
            (
                TypeKind::Slice {
                    element: ea,
                    mutable: ma,
                },
                TypeKind::Slice {
                    element: eb,
                    mutable: mb,
                },
            ) => ma == mb && self.types_equal(*ea, *eb),
            (
                TypeKind::Array {
                    element: ea,
                    length: la,
                },
                TypeKind::Array {
                    element: eb,
                    length: lb,
                },
            ) => la == lb && self.types_equal(*ea, *eb),
            (TypeKind::Tuple { elements: ea, .. }, TypeKind::Tuple { elements: eb, .. }) => {
                ea.len() == eb.len()
                    && ea
                        .iter()
                        .zip(eb.iter())
                        .all(|(&x, &y)| self.types_equal(x, y))
            }
            (TypeKind::Struct { name: na, .. }, TypeKind::Struct { name: nb, .. }) => na == nb,
            (TypeKind::Enum { name: na, .. }, TypeKind::Enum { name: nb, .. }) => na == nb,
            (
                TypeKind::Function {
                    params: pa,
                    ret: ra,
                    ..
                },
                TypeKind::Function {
                    params: pb,
                    ret: rb,
                    ..
                },
            ) => {
                pa.len() == pb.len()
                    && self.types_equal(*ra, *rb)
                    && pa
                        .iter()
                        .zip(pb.iter())
                        .all(|(&x, &y)| self.types_equal(x, y))
            }
            (
                TypeKind::GenericInstance { base: ba, args: aa },
                TypeKind::GenericInstance { base: bb, args: ab },
            ) => {
                self.types_equal(*ba, *bb)
                    && aa.len() == ab.len()
                    && aa
                        .iter()
                        .zip(ab.iter())
                        .all(|(&x, &y)| self.types_equal(x, y))
            }
            (TypeKind::Result { ok: oa, err: ea }, TypeKind::Result { ok: ob, err: eb }) => {
                self.types_equal(*oa, *ob) && self.types_equal(*ea, *eb)
            }
            (TypeKind::TypeParameter { name: na }, TypeKind::TypeParameter { name: nb }) => {
                na == nb
            }
            (TypeKind::Unknown, TypeKind::Unknown) => true,
            (TypeKind::Builtin, TypeKind::Builtin) => true,
            _ => false,
        }
    }

    /// Assignability of `from` into a slot of type `to`.
    ///
    /// Holds when the types are structurally equal, when either side is
    /// Unknown during inference, or when a Result-shaped pair matches the
    /// built-in sugar on the other side. Integer-literal widening is a
    /// separate check ([`Self::literal_fits`]) because literal-ness is only
    /// known at the expression being analyzed.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if self.types_equal(from, to) {
            return true;
        }
        if self.is_unknown(from) || self.is_unknown(to) {
            return true;
        }
        if let (Some((fo, fe)), Some((to_ok, to_err))) =
            (self.as_result_pair(from), self.as_result_pair(to))
        {
            return self.is_assignable(fo, to_ok) && self.is_assignable(fe, to_err);
        }
        false
    }

    /// Whether an integer literal value may take on the target type.
    /// Widening across signedness is permitted when the value fits.
    pub fn literal_fits(&self, value: i128, target: TypeId) -> bool {
        match self.primitive_kind(target).and_then(|p| p.integer_range()) {
            Some((min, max)) => value >= min && value <= max,
            None => false,
        }
    }

    /// FFI compatibility for extern signatures.
    ///
    /// Primitives pass except `string`; pointers pass when their pointee
    /// does; arrays when their element does; tuples and structs when every
    /// element does; payload-free enums pass (they are plain tags);
    /// function pointers pass. Slices and `Result` do not (slices get the
    /// pointer+length lowering at the declaration instead).
    pub fn is_ffi_compatible(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Primitive(PrimitiveKind::String) => false,
            TypeKind::Primitive(_) => true,
            TypeKind::Pointer { pointee, .. } => self.is_ffi_compatible(*pointee),
            TypeKind::Array { element, .. } => self.is_ffi_compatible(*element),
            TypeKind::Tuple { elements, .. } => {
                elements.iter().all(|&e| self.is_ffi_compatible(e))
            }
            TypeKind::Struct {
                type_params,
                fields,
                ..
            } => type_params.is_empty() && fields.iter().all(|f| self.is_ffi_compatible(f.ty)),
            TypeKind::Enum { variants, .. } => variants.iter().all(|v| v.payload.is_none()),
            TypeKind::Function { .. } => true,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    /// Human-readable type name for diagnostics; also the canonical name
    /// for generic instances (`Base<A, B>`), which is deterministic for
    /// identical argument vectors.
    pub fn name_of(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Primitive(p) => p.name().to_string(),
            TypeKind::Pointer { pointee, mutable } => {
                let m = if *mutable { "*mut " } else { "*const " };
                format!("{}{}", m, self.name_of(*pointee))
            }
            TypeKind::Slice { element, mutable } => {
                let m = if *mutable { "mut " } else { "" };
                format!("[]{}{}", m, self.name_of(*element))
            }
            TypeKind::Array { element, length } => {
                format!("[{}; {}]", self.name_of(*element), length)
            }
            TypeKind::Tuple { elements, .. } => {
                let names: Vec<String> = elements.iter().map(|&e| self.name_of(e)).collect();
                format!("({})", names.join(", "))
            }
            TypeKind::Struct { name, .. } | TypeKind::Enum { name, .. } => name.clone(),
            TypeKind::Function { params, ret, .. } => {
                let names: Vec<String> = params.iter().map(|&p| self.name_of(p)).collect();
                format!("fn({}) -> {}", names.join(", "), self.name_of(*ret))
            }
            TypeKind::GenericInstance { base, args } => {
                let names: Vec<String> = args.iter().map(|&a| self.name_of(a)).collect();
                format!("{}<{}>", self.name_of(*base), names.join(", "))
            }
            TypeKind::Result { ok, err } => {
                format!("Result<{}, {}>", self.name_of(*ok), self.name_of(*err))
            }
            TypeKind::TypeParameter { name } => name.clone(),
            TypeKind::Unknown => "<unknown>".to_string(),
            TypeKind::Builtin => "<builtin>".to_string(),
        }
    }

    /// Discriminant for a named variant of an enum descriptor.
    pub fn variant_discriminant(&self, enum_id: TypeId, variant: &str) -> Option<u32> {
        match self.kind(enum_id) {
            TypeKind::Enum { variants, .. } => variants
                .iter()
                .find(|v| v.name == variant)
                .map(|v| v.discriminant),
            _ => None,
        }
    }

    /// Variant descriptor lookup on an enum.
    pub fn find_variant(&self, enum_id: TypeId, variant: &str) -> Option<&EnumVariant> {
        match self.kind(enum_id) {
            TypeKind::Enum { variants, .. } => variants.iter().find(|v| v.name == variant),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_layout() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        assert_eq!(u.size_of(i32_ty), 4);
        assert_eq!(u.align_of(i32_ty), 4);
        let void = u.primitive(PrimitiveKind::Void);
        assert_eq!(u.size_of(void), 0);
    }

    #[test]
    fn test_primitives_interned() {
        let mut u = TypeUniverse::new();
        assert_eq!(
            u.primitive(PrimitiveKind::I64),
            u.primitive(PrimitiveKind::I64)
        );
    }

    #[test]
    fn test_array_layout_and_zero_rejection() {
        let mut u = TypeUniverse::new();
        let i64_ty = u.primitive(PrimitiveKind::I64);
        let arr = u.array_of(i64_ty, 5).unwrap();
        assert_eq!(u.size_of(arr), 40);
        assert!(u.array_of(i64_ty, 0).is_none());
    }

    #[test]
    fn test_tuple_offsets_respect_alignment() {
        let mut u = TypeUniverse::new();
        let i8_ty = u.primitive(PrimitiveKind::I8);
        let i64_ty = u.primitive(PrimitiveKind::I64);
        let tup = u.tuple_of(vec![i8_ty, i64_ty]).unwrap();
        match u.kind(tup) {
            TypeKind::Tuple { offsets, .. } => assert_eq!(offsets, &vec![0, 8]),
            _ => panic!("expected tuple"),
        }
        assert_eq!(u.size_of(tup), 16);
        assert!(u.tuple_of(vec![i8_ty]).is_none());
    }

    #[test]
    fn test_struct_layout_trailing_padding() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let i64_ty = u.primitive(PrimitiveKind::I64);
        let s = u.struct_type(
            "Pair".to_string(),
            vec![],
            vec![("a".to_string(), i32_ty), ("b".to_string(), i64_ty)],
        );
        assert_eq!(u.size_of(s), 16);
        assert_eq!(u.align_of(s), 8);
        assert_eq!(u.find_field(s, "b").unwrap().offset, 8);
    }

    #[test]
    fn test_equality_reflexive_symmetric() {
        let mut u = TypeUniverse::new();
        let a = u.primitive(PrimitiveKind::I32);
        let ptr1 = u.pointer_to(a, true);
        let ptr2 = u.pointer_to(a, true);
        let ptr3 = u.pointer_to(a, false);
        assert!(u.types_equal(ptr1, ptr1));
        assert!(u.types_equal(ptr1, ptr2));
        assert!(u.types_equal(ptr2, ptr1));
        assert!(!u.types_equal(ptr1, ptr3));
    }

    #[test]
    fn test_nominal_struct_equality() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let a = u.struct_type("A".to_string(), vec![], vec![("x".to_string(), i32_ty)]);
        let a2 = u.struct_type("A".to_string(), vec![], vec![("x".to_string(), i32_ty)]);
        let b = u.struct_type("B".to_string(), vec![], vec![("x".to_string(), i32_ty)]);
        assert!(u.types_equal(a, a2));
        assert!(!u.types_equal(a, b));
    }

    #[test]
    fn test_instantiate_arity_and_canonical_name() {
        let mut u = TypeUniverse::new();
        let t = u.type_parameter("T");
        let base = u.struct_type(
            "Vec".to_string(),
            vec!["T".to_string()],
            vec![("data".to_string(), t)],
        );
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let inst1 = u.instantiate(base, vec![i32_ty]).unwrap();
        let inst2 = u.instantiate(base, vec![i32_ty]).unwrap();
        assert_eq!(u.name_of(inst1), "Vec<i32>");
        assert_eq!(u.name_of(inst1), u.name_of(inst2));
        assert!(u.types_equal(inst1, inst2));
        // Wrong arity
        assert!(u.instantiate(base, vec![i32_ty, i32_ty]).is_none());
        // Non-generic base
        let plain = u.struct_type("P".to_string(), vec![], vec![]);
        assert!(u.instantiate(plain, vec![i32_ty]).is_none());
    }

    #[test]
    fn test_result_sugar_interchangeable() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let s = u.primitive(PrimitiveKind::String);
        let sugar = u.result_of(i32_ty, s);
        let result_enum = u.result_enum();
        let inst = u.instantiate(result_enum, vec![i32_ty, s]).unwrap();
        assert!(u.is_assignable(inst, sugar));
        assert!(u.is_assignable(sugar, inst));
        assert_eq!(u.as_result_pair(sugar), Some((i32_ty, s)));
        assert_eq!(u.as_result_pair(inst), Some((i32_ty, s)));
    }

    #[test]
    fn test_result_layout_is_16_bytes() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let s = u.primitive(PrimitiveKind::String);
        let sugar = u.result_of(i32_ty, s);
        assert_eq!(u.size_of(sugar), 16);
        assert_eq!(u.align_of(sugar), 8);
    }

    #[test]
    fn test_variant_hash_stable() {
        // The hash is ABI; a change here breaks compiled programs.
        assert_eq!(variant_name_hash("Some"), variant_name_hash("Some"));
        assert_ne!(variant_name_hash("Some"), variant_name_hash("None"));
        // FNV-1a of empty input is the offset basis.
        assert_eq!(variant_name_hash(""), 0x811c9dc5);
    }

    #[test]
    fn test_intrinsic_discriminants() {
        let u = TypeUniverse::new();
        assert_eq!(u.variant_discriminant(u.option_enum(), "Some"), Some(0));
        assert_eq!(u.variant_discriminant(u.option_enum(), "None"), Some(1));
        assert_eq!(u.variant_discriminant(u.result_enum(), "Ok"), Some(0));
        assert_eq!(u.variant_discriminant(u.result_enum(), "Err"), Some(1));
    }

    #[test]
    fn test_user_enum_discriminants_hashed() {
        let mut u = TypeUniverse::new();
        let e = u.enum_type(
            "Color".to_string(),
            vec![],
            vec![
                ("Red".to_string(), None, 0),
                ("Green".to_string(), None, 1),
            ],
        );
        assert_eq!(
            u.variant_discriminant(e, "Red"),
            Some(variant_name_hash("Red"))
        );
        // Empty enum: tag-only layout.
        let empty = u.enum_type("Never".to_string(), vec![], vec![]);
        assert_eq!(u.size_of(empty), 8);
    }

    #[test]
    fn test_literal_widening() {
        let mut u = TypeUniverse::new();
        let u32_ty = u.primitive(PrimitiveKind::U32);
        let i8_ty = u.primitive(PrimitiveKind::I8);
        assert!(u.literal_fits(0, u32_ty));
        assert!(!u.literal_fits(-1, u32_ty));
        assert!(!u.literal_fits(300, i8_ty));
        assert!(u.literal_fits(-128, i8_ty));
    }

    #[test]
    fn test_ffi_compatibility() {
        let mut u = TypeUniverse::new();
        let i32_ty = u.primitive(PrimitiveKind::I32);
        let s = u.primitive(PrimitiveKind::String);
        let ptr = u.pointer_to(i32_ty, false);
        let slice = u.slice_of(i32_ty, false);
        let sugar = u.result_of(i32_ty, s);
        assert!(u.is_ffi_compatible(i32_ty));
        assert!(!u.is_ffi_compatible(s));
        assert!(u.is_ffi_compatible(ptr));
        assert!(!u.is_ffi_compatible(slice));
        assert!(!u.is_ffi_compatible(sugar));
        // Payload-free enums are plain tags.
        let tag_enum = u.enum_type(
            "Flag".to_string(),
            vec![],
            vec![("On".to_string(), None, 0), ("Off".to_string(), None, 1)],
        );
        assert!(u.is_ffi_compatible(tag_enum));
        let payload_enum = u.enum_type(
            "Wrapped".to_string(),
            vec![],
            vec![("Value".to_string(), Some(i32_ty), 0)],
        );
        assert!(!u.is_ffi_compatible(payload_enum));
    }

    #[test]
    fn test_substitute_generic_fields() {
        let mut u = TypeUniverse::new();
        let t = u.type_parameter("T");
        let i64_ty = u.primitive(PrimitiveKind::I64);
        let params = vec!["T".to_string()];
        let args = vec![i64_ty];
        assert_eq!(u.substitute(t, &params, &args), i64_ty);
        let ptr_t = u.pointer_to(t, true);
        let sub = u.substitute(ptr_t, &params, &args);
        match u.kind(sub) {
            TypeKind::Pointer { pointee, mutable } => {
                assert_eq!(*pointee, i64_ty);
                assert!(mutable);
            }
            _ => panic!("expected pointer"),
        }
    }
}
