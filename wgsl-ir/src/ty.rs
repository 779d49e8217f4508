#![forbid(unsafe_code)]

//! Interned WGSL types shared by the resolver and the IR.

use std::fmt;

use wgsl_ast::{Handle, UniqueArena};

pub type TypeId = Handle<Type>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Bool,
    I32,
    U32,
    F32,
    F16,
    AbstractInt,
    AbstractFloat,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::I32 => "i32",
            Scalar::U32 => "u32",
            Scalar::F32 => "f32",
            Scalar::F16 => "f16",
            Scalar::AbstractInt => "abstract-int",
            Scalar::AbstractFloat => "abstract-float",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Scalar::Bool,
            "i32" => Scalar::I32,
            "u32" => Scalar::U32,
            "f32" => Scalar::F32,
            "f16" => Scalar::F16,
            _ => return None,
        })
    }

    pub fn is_abstract(self) -> bool {
        matches!(self, Scalar::AbstractInt | Scalar::AbstractFloat)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Scalar::I32 | Scalar::U32 | Scalar::AbstractInt)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F16 | Scalar::AbstractFloat)
    }

    pub fn is_signed(self) -> bool {
        !matches!(self, Scalar::U32 | Scalar::Bool)
    }

    pub fn is_numeric(self) -> bool {
        self != Scalar::Bool
    }

    /// The type an abstract scalar takes when nothing else decides it.
    pub fn concretize(self) -> Self {
        match self {
            Scalar::AbstractInt => Scalar::I32,
            Scalar::AbstractFloat => Scalar::F32,
            s => s,
        }
    }

    /// Byte size and alignment in host-shareable layout.
    pub fn size_align(self) -> (u32, u32) {
        match self {
            Scalar::F16 => (2, 2),
            Scalar::AbstractInt | Scalar::AbstractFloat => (8, 8),
            _ => (4, 4),
        }
    }

    /// Cost of the automatic conversion `self -> to`, or `None` when no such
    /// conversion exists. Identity costs nothing.
    pub fn conversion_rank(self, to: Scalar) -> Option<u32> {
        if self == to {
            return Some(0);
        }
        match (self, to) {
            (Scalar::AbstractFloat, Scalar::F32) => Some(1),
            (Scalar::AbstractFloat, Scalar::F16) => Some(2),
            (Scalar::AbstractInt, Scalar::I32) => Some(3),
            (Scalar::AbstractInt, Scalar::U32) => Some(4),
            (Scalar::AbstractInt, Scalar::AbstractFloat) => Some(5),
            (Scalar::AbstractInt, Scalar::F32) => Some(6),
            (Scalar::AbstractInt, Scalar::F16) => Some(7),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    Handle,
}

impl AddressSpace {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "function" => AddressSpace::Function,
            "private" => AddressSpace::Private,
            "workgroup" => AddressSpace::Workgroup,
            "uniform" => AddressSpace::Uniform,
            "storage" => AddressSpace::Storage,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AddressSpace::Function => "function",
            AddressSpace::Private => "private",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Uniform => "uniform",
            AddressSpace::Storage => "storage",
            AddressSpace::Handle => "handle",
        }
    }

    pub fn default_access(self) -> Access {
        match self {
            AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Handle => Access::Read,
            _ => Access::ReadWrite,
        }
    }

    /// Address spaces a module-scope `var` may live in.
    pub fn is_module_scope(self) -> bool {
        !matches!(self, AddressSpace::Function)
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "read" => Access::Read,
            "write" => Access::Write,
            "read_write" => Access::ReadWrite,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "read_write",
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArraySize {
    Constant(u32),
    Runtime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDim {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl TextureDim {
    pub fn suffix(self) -> &'static str {
        match self {
            TextureDim::D1 => "1d",
            TextureDim::D2 => "2d",
            TextureDim::D2Array => "2d_array",
            TextureDim::D3 => "3d",
            TextureDim::Cube => "cube",
            TextureDim::CubeArray => "cube_array",
        }
    }

    /// Number of coordinate components used to address a texel.
    pub fn coords(self) -> u8 {
        match self {
            TextureDim::D1 => 1,
            TextureDim::D2 | TextureDim::D2Array => 2,
            TextureDim::D3 | TextureDim::Cube | TextureDim::CubeArray => 3,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, TextureDim::D2Array | TextureDim::CubeArray)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Float,
    R32Uint,
    R32Sint,
    R32Float,
    Rg32Uint,
    Rg32Sint,
    Rg32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
    Bgra8Unorm,
}

impl TexelFormat {
    const ALL: [(TexelFormat, &'static str); 17] = [
        (TexelFormat::Rgba8Unorm, "rgba8unorm"),
        (TexelFormat::Rgba8Snorm, "rgba8snorm"),
        (TexelFormat::Rgba8Uint, "rgba8uint"),
        (TexelFormat::Rgba8Sint, "rgba8sint"),
        (TexelFormat::Rgba16Uint, "rgba16uint"),
        (TexelFormat::Rgba16Sint, "rgba16sint"),
        (TexelFormat::Rgba16Float, "rgba16float"),
        (TexelFormat::R32Uint, "r32uint"),
        (TexelFormat::R32Sint, "r32sint"),
        (TexelFormat::R32Float, "r32float"),
        (TexelFormat::Rg32Uint, "rg32uint"),
        (TexelFormat::Rg32Sint, "rg32sint"),
        (TexelFormat::Rg32Float, "rg32float"),
        (TexelFormat::Rgba32Uint, "rgba32uint"),
        (TexelFormat::Rgba32Sint, "rgba32sint"),
        (TexelFormat::Rgba32Float, "rgba32float"),
        (TexelFormat::Bgra8Unorm, "bgra8unorm"),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().find(|(_, n)| *n == name).map(|(f, _)| *f)
    }

    pub fn name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(f, _)| *f == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }

    /// Scalar type of the channels as seen by a shader.
    pub fn channel_scalar(self) -> Scalar {
        match self {
            TexelFormat::Rgba8Uint
            | TexelFormat::Rgba16Uint
            | TexelFormat::R32Uint
            | TexelFormat::Rg32Uint
            | TexelFormat::Rgba32Uint => Scalar::U32,
            TexelFormat::Rgba8Sint
            | TexelFormat::Rgba16Sint
            | TexelFormat::R32Sint
            | TexelFormat::Rg32Sint
            | TexelFormat::Rgba32Sint => Scalar::I32,
            _ => Scalar::F32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureClass {
    Sampled { scalar: Scalar, multisampled: bool },
    Depth { multisampled: bool },
    Storage { format: TexelFormat, access: Access },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
    pub offset: u32,
    pub size: u32,
    pub align: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub members: Vec<StructMember>,
    pub size: u32,
    pub align: u32,
}

impl StructType {
    pub fn member(&self, name: &str) -> Option<(usize, &StructMember)> {
        self.members.iter().enumerate().find(|(_, m)| m.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(Scalar),
    Vector {
        size: u8,
        scalar: Scalar,
    },
    Matrix {
        columns: u8,
        rows: u8,
        scalar: Scalar,
    },
    Atomic(Scalar),
    Array {
        base: TypeId,
        size: ArraySize,
        stride: u32,
    },
    Struct(StructType),
    Pointer {
        space: AddressSpace,
        store: TypeId,
        access: Access,
    },
    /// The type of a memory view produced by naming a variable; loads happen
    /// implicitly when it is used as a value.
    Reference {
        space: AddressSpace,
        store: TypeId,
        access: Access,
    },
    Sampler {
        comparison: bool,
    },
    Texture {
        dim: TextureDim,
        class: TextureClass,
    },
}

/// A struct member before layout.
#[derive(Clone, Debug)]
pub struct MemberDecl {
    pub name: String,
    pub ty: TypeId,
    /// `@size(n)` override.
    pub size: Option<u32>,
    /// `@align(n)` override.
    pub align: Option<u32>,
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Interner for [`Type`]s. Structurally equal types share one [`TypeId`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeArena {
    types: UniqueArena<Type>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ty: Type) -> TypeId {
        self.types.insert(ty)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn try_get(&self, id: TypeId) -> Option<&Type> {
        self.types.try_get(id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types.iter()
    }

    pub fn scalar(&mut self, scalar: Scalar) -> TypeId {
        self.insert(Type::Scalar(scalar))
    }

    pub fn bool(&mut self) -> TypeId {
        self.scalar(Scalar::Bool)
    }

    pub fn i32(&mut self) -> TypeId {
        self.scalar(Scalar::I32)
    }

    pub fn u32(&mut self) -> TypeId {
        self.scalar(Scalar::U32)
    }

    pub fn f32(&mut self) -> TypeId {
        self.scalar(Scalar::F32)
    }

    pub fn vector(&mut self, size: u8, scalar: Scalar) -> TypeId {
        self.insert(Type::Vector { size, scalar })
    }

    pub fn matrix(&mut self, columns: u8, rows: u8, scalar: Scalar) -> TypeId {
        self.insert(Type::Matrix {
            columns,
            rows,
            scalar,
        })
    }

    pub fn array(&mut self, base: TypeId, size: ArraySize) -> TypeId {
        let (elem_size, elem_align) = self.size_align(base);
        let stride = round_up(elem_size, elem_align);
        self.insert(Type::Array { base, size, stride })
    }

    pub fn pointer(&mut self, space: AddressSpace, store: TypeId, access: Access) -> TypeId {
        self.insert(Type::Pointer {
            space,
            store,
            access,
        })
    }

    pub fn reference(&mut self, space: AddressSpace, store: TypeId, access: Access) -> TypeId {
        self.insert(Type::Reference {
            space,
            store,
            access,
        })
    }

    /// Lays out a struct following WGSL's host-shareable rules.
    pub fn structure(&mut self, name: impl Into<String>, members: Vec<MemberDecl>) -> TypeId {
        let mut offset = 0u32;
        let mut struct_align = 1u32;
        let mut laid_out = Vec::with_capacity(members.len());
        for m in members {
            let (natural_size, natural_align) = self.size_align(m.ty);
            let align = m.align.unwrap_or(natural_align).max(1);
            let size = m.size.unwrap_or(natural_size);
            offset = round_up(offset, align);
            laid_out.push(StructMember {
                name: m.name,
                ty: m.ty,
                offset,
                size,
                align,
            });
            offset += size;
            struct_align = struct_align.max(align);
        }
        let ty = Type::Struct(StructType {
            name: name.into(),
            members: laid_out,
            size: round_up(offset, struct_align),
            align: struct_align,
        });
        self.insert(ty)
    }

    /// Byte size and alignment of `id`.
    pub fn size_align(&self, id: TypeId) -> (u32, u32) {
        match self.get(id) {
            Type::Scalar(s) | Type::Atomic(s) => s.size_align(),
            Type::Vector { size, scalar } => {
                let (s, _) = scalar.size_align();
                let n = u32::from(*size);
                let align = if n == 2 { 2 * s } else { 4 * s };
                (n * s, align)
            }
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let (s, _) = scalar.size_align();
                let r = u32::from(*rows);
                let col_align = if r == 2 { 2 * s } else { 4 * s };
                let col_size = round_up(r * s, col_align);
                (u32::from(*columns) * col_size, col_align)
            }
            Type::Array { base, size, stride } => {
                let (_, align) = self.size_align(*base);
                let count = match size {
                    ArraySize::Constant(n) => *n,
                    ArraySize::Runtime => 1,
                };
                (count * stride, align)
            }
            Type::Struct(s) => (s.size, s.align),
            Type::Pointer { .. }
            | Type::Reference { .. }
            | Type::Sampler { .. }
            | Type::Texture { .. } => (0, 1),
        }
    }

    /// The scalar at the leaves of a scalar, vector, matrix or atomic type.
    pub fn scalar_of(&self, id: TypeId) -> Option<Scalar> {
        match self.get(id) {
            Type::Scalar(s) | Type::Atomic(s) => Some(*s),
            Type::Vector { scalar, .. } | Type::Matrix { scalar, .. } => Some(*scalar),
            _ => None,
        }
    }

    pub fn as_scalar(&self, id: TypeId) -> Option<Scalar> {
        match self.get(id) {
            Type::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    pub fn vector_size(&self, id: TypeId) -> Option<u8> {
        match self.get(id) {
            Type::Vector { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Scalar(Scalar::Bool))
    }

    /// Strips a reference: `ref<S, T, A>` becomes `T`.
    pub fn store_type(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Reference { store, .. } => *store,
            _ => id,
        }
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Reference { .. })
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer { .. })
    }

    /// Whether any scalar inside `id` is abstract.
    pub fn is_abstract(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Scalar(s) | Type::Atomic(s) => s.is_abstract(),
            Type::Vector { scalar, .. } | Type::Matrix { scalar, .. } => scalar.is_abstract(),
            Type::Array { base, .. } => self.is_abstract(*base),
            Type::Struct(s) => s.members.iter().any(|m| self.is_abstract(m.ty)),
            Type::Pointer { store, .. } | Type::Reference { store, .. } => {
                self.is_abstract(*store)
            }
            Type::Sampler { .. } | Type::Texture { .. } => false,
        }
    }

    /// Replaces abstract scalars with their default concrete types.
    pub fn concretize(&mut self, id: TypeId) -> TypeId {
        if !self.is_abstract(id) {
            return id;
        }
        self.map_scalar(id, Scalar::concretize)
    }

    /// Rebuilds a scalar, vector, matrix or array type with each leaf scalar
    /// mapped through `f`. Other types are returned unchanged.
    pub fn map_scalar(&mut self, id: TypeId, f: impl Fn(Scalar) -> Scalar + Copy) -> TypeId {
        match self.get(id).clone() {
            Type::Scalar(s) => self.scalar(f(s)),
            Type::Vector { size, scalar } => self.vector(size, f(scalar)),
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => self.matrix(columns, rows, f(scalar)),
            Type::Array { base, size, .. } => {
                let base = self.map_scalar(base, f);
                self.array(base, size)
            }
            _ => id,
        }
    }

    /// Cost of converting a value of type `from` to `to`, when `from` is
    /// automatically convertible (abstract numeric conversions applied
    /// component-wise).
    pub fn conversion_rank(&self, from: TypeId, to: TypeId) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        match (self.get(from), self.get(to)) {
            (Type::Scalar(a), Type::Scalar(b)) => a.conversion_rank(*b),
            (
                Type::Vector { size: n, scalar: a },
                Type::Vector { size: m, scalar: b },
            ) if n == m => a.conversion_rank(*b),
            (
                Type::Matrix {
                    columns: c1,
                    rows: r1,
                    scalar: a,
                },
                Type::Matrix {
                    columns: c2,
                    rows: r2,
                    scalar: b,
                },
            ) if c1 == c2 && r1 == r2 => a.conversion_rank(*b),
            (
                Type::Array {
                    base: b1, size: s1, ..
                },
                Type::Array {
                    base: b2, size: s2, ..
                },
            ) if s1 == s2 => self.conversion_rank(*b1, *b2),
            _ => None,
        }
    }

    /// Whether values of this type can be created with a constructor
    /// expression and stored in `function`/`private` variables.
    pub fn is_constructible(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Scalar(_) | Type::Vector { .. } | Type::Matrix { .. } => true,
            Type::Array { base, size, .. } => {
                matches!(size, ArraySize::Constant(_)) && self.is_constructible(*base)
            }
            Type::Struct(s) => s.members.iter().all(|m| self.is_constructible(m.ty)),
            _ => false,
        }
    }

    /// Whether values of this type may live in host-shareable memory.
    pub fn is_host_shareable(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Scalar(s) | Type::Atomic(s) => !matches!(s, Scalar::Bool) && !s.is_abstract(),
            Type::Vector { scalar, .. } | Type::Matrix { scalar, .. } => {
                !matches!(scalar, Scalar::Bool) && !scalar.is_abstract()
            }
            Type::Array { base, .. } => self.is_host_shareable(*base),
            Type::Struct(s) => s.members.iter().all(|m| self.is_host_shareable(m.ty)),
            _ => false,
        }
    }

    pub fn is_handle(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Sampler { .. } | Type::Texture { .. })
    }

    /// Whether the type contains a runtime-sized array.
    pub fn has_runtime_array(&self, id: TypeId) -> bool {
        match self.get(id) {
            Type::Array {
                size: ArraySize::Runtime,
                ..
            } => true,
            Type::Struct(s) => s.members.last().is_some_and(|m| self.has_runtime_array(m.ty)),
            _ => false,
        }
    }

    /// Element type of an indexable type: vector component, matrix column
    /// or array element.
    pub fn element(&mut self, id: TypeId) -> Option<TypeId> {
        match self.get(id).clone() {
            Type::Vector { scalar, .. } => Some(self.scalar(scalar)),
            Type::Matrix { rows, scalar, .. } => Some(self.vector(rows, scalar)),
            Type::Array { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Number of elements reachable by indexing, when statically known.
    pub fn element_count(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            Type::Vector { size, .. } => Some(u32::from(*size)),
            Type::Matrix { columns, .. } => Some(u32::from(*columns)),
            Type::Array {
                size: ArraySize::Constant(n),
                ..
            } => Some(*n),
            _ => None,
        }
    }

    /// WGSL spelling of a type, e.g. `vec3<f32>`, `ptr<function, i32, read_write>`.
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Scalar(s) => s.name().to_string(),
            Type::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => format!("mat{columns}x{rows}<{scalar}>"),
            Type::Atomic(s) => format!("atomic<{s}>"),
            Type::Array { base, size, .. } => match size {
                ArraySize::Constant(n) => format!("array<{}, {n}>", self.display(*base)),
                ArraySize::Runtime => format!("array<{}>", self.display(*base)),
            },
            Type::Struct(s) => s.name.clone(),
            Type::Pointer {
                space,
                store,
                access,
            } => format!("ptr<{space}, {}, {}>", self.display(*store), access.name()),
            Type::Reference {
                space,
                store,
                access,
            } => format!("ref<{space}, {}, {}>", self.display(*store), access.name()),
            Type::Sampler { comparison: false } => "sampler".to_string(),
            Type::Sampler { comparison: true } => "sampler_comparison".to_string(),
            Type::Texture { dim, class } => match class {
                TextureClass::Sampled {
                    scalar,
                    multisampled: false,
                } => format!("texture_{}<{scalar}>", dim.suffix()),
                TextureClass::Sampled {
                    scalar,
                    multisampled: true,
                } => format!("texture_multisampled_{}<{scalar}>", dim.suffix()),
                TextureClass::Depth { multisampled: false } => {
                    format!("texture_depth_{}", dim.suffix())
                }
                TextureClass::Depth { multisampled: true } => {
                    format!("texture_depth_multisampled_{}", dim.suffix())
                }
                TextureClass::Storage { format, access } => format!(
                    "texture_storage_{}<{}, {}>",
                    dim.suffix(),
                    format.name(),
                    access.name()
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups_structurally_equal_types() {
        let mut types = TypeArena::new();
        let a = types.vector(3, Scalar::F32);
        let b = types.vector(3, Scalar::F32);
        let c = types.vector(4, Scalar::F32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn vec3_layout_rounds_to_16() {
        let mut types = TypeArena::new();
        let v3 = types.vector(3, Scalar::F32);
        assert_eq!(types.size_align(v3), (12, 16));
        let arr = types.array(v3, ArraySize::Constant(2));
        assert_eq!(types.size_align(arr), (32, 16));
    }

    #[test]
    fn struct_layout_follows_member_alignment() {
        let mut types = TypeArena::new();
        let f = types.f32();
        let v3 = types.vector(3, Scalar::F32);
        let s = types.structure(
            "S",
            vec![
                MemberDecl { name: "a".into(), ty: f, size: None, align: None },
                MemberDecl { name: "b".into(), ty: v3, size: None, align: None },
                MemberDecl { name: "c".into(), ty: f, size: None, align: Some(32) },
            ],
        );
        let Type::Struct(st) = types.get(s) else {
            panic!("expected struct");
        };
        let offsets: Vec<_> = st.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, [0, 16, 32]);
        assert_eq!((st.size, st.align), (64, 32));
    }

    #[test]
    fn mat3x3_layout() {
        let mut types = TypeArena::new();
        let m = types.matrix(3, 3, Scalar::F32);
        assert_eq!(types.size_align(m), (48, 16));
    }

    #[test]
    fn conversion_ranks_prefer_f32_for_abstract_float() {
        assert_eq!(Scalar::AbstractFloat.conversion_rank(Scalar::F32), Some(1));
        assert_eq!(Scalar::AbstractInt.conversion_rank(Scalar::I32), Some(3));
        assert!(
            Scalar::AbstractInt.conversion_rank(Scalar::I32)
                < Scalar::AbstractInt.conversion_rank(Scalar::F32)
        );
        assert_eq!(Scalar::I32.conversion_rank(Scalar::U32), None);
        assert_eq!(Scalar::F32.conversion_rank(Scalar::F16), None);
    }

    #[test]
    fn concretize_vectors_and_arrays() {
        let mut types = TypeArena::new();
        let av = types.vector(2, Scalar::AbstractFloat);
        let concrete = types.concretize(av);
        assert_eq!(types.display(concrete), "vec2<f32>");
        let ai = types.scalar(Scalar::AbstractInt);
        let arr = types.array(ai, ArraySize::Constant(3));
        let concrete = types.concretize(arr);
        assert_eq!(types.display(concrete), "array<i32, 3>");
    }

    #[test]
    fn display_pointer() {
        let mut types = TypeArena::new();
        let i = types.i32();
        let p = types.pointer(AddressSpace::Function, i, Access::ReadWrite);
        assert_eq!(types.display(p), "ptr<function, i32, read_write>");
    }
}
