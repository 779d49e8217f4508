#![forbid(unsafe_code)]

//! Block-structured intermediate representation for resolved WGSL modules,
//! plus the transforms that rewrite it for a backend.

pub mod builder;
pub mod constant;
pub mod display;
pub mod ir;
pub mod transform;
pub mod ty;
pub mod validate;

pub use builder::Builder;
pub use constant::{ConstError, ConstValue, EvalMode, ScalarValue};
pub use display::disassemble;
pub use ir::*;
pub use transform::{DataKey, DataMap, Pipeline, TargetOptions, Transform, TransformError};
pub use ty::{
    Access, AddressSpace, ArraySize, MemberDecl, Scalar, StructMember, StructType, TexelFormat,
    TextureClass, TextureDim, Type, TypeArena, TypeId,
};
pub use validate::{IrValidationError, validate};
