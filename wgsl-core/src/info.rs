#![forbid(unsafe_code)]

//! Facts the resolver attaches to the syntax tree, keyed by node handle.

use std::collections::{BTreeSet, HashMap};

use wgsl_ast::{DeclId, ExprId, LocalKind, StmtId};
use wgsl_ir::{
    Access, AddressSpace, BindingPoint, ConstValue, IoAttributes, Stage, TypeArena, TypeId,
};

use crate::symbols::Symbol;

/// When an expression's value becomes known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvalStage {
    Const,
    Override,
    Runtime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprInfo {
    /// Type after any materialization demanded by the context.
    pub ty: TypeId,
    /// The abstract type the expression had before materialization.
    pub abstract_ty: Option<TypeId>,
    pub stage: EvalStage,
    /// Present for const-expressions.
    pub value: Option<ConstValue>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallTarget {
    Function(DeclId),
    Builtin { name: String },
    /// Value constructor, zero value or splat.
    Construct(TypeId),
    /// Value conversion between scalar types of the same shape.
    Convert(TypeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberAccess {
    Field(u32),
    Swizzle(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: TypeId,
    pub io: IoAttributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub ret: Option<TypeId>,
    pub ret_io: IoAttributes,
    pub stage: Option<Stage>,
    pub workgroup_size: Option<[u32; 3]>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GlobalInfo {
    Var {
        store: TypeId,
        space: AddressSpace,
        access: Access,
        binding: Option<BindingPoint>,
    },
    Const {
        ty: TypeId,
        value: ConstValue,
    },
    Override {
        ty: TypeId,
        id: Option<u32>,
    },
    /// A struct or alias.
    Type(TypeId),
    Function,
    ConstAssert,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalInfo {
    pub name: String,
    pub kind: LocalKind,
    /// Store type of a `var`, value type of a `let` or `const`.
    pub ty: TypeId,
    pub value: Option<ConstValue>,
}

/// The resolver's side-table. The syntax tree is never modified; everything
/// learned about it lands here.
#[derive(Clone, Debug, Default)]
pub struct SemanticInfo {
    pub types: TypeArena,
    pub exprs: HashMap<ExprId, ExprInfo>,
    pub idents: HashMap<ExprId, Symbol>,
    pub calls: HashMap<ExprId, CallTarget>,
    pub members: HashMap<ExprId, MemberAccess>,
    pub functions: HashMap<DeclId, FunctionInfo>,
    pub globals: HashMap<DeclId, GlobalInfo>,
    pub locals: HashMap<StmtId, LocalInfo>,
    /// Shader IO attributes of struct members, for entry point interfaces.
    pub struct_io: HashMap<TypeId, Vec<IoAttributes>>,
    pub extensions: BTreeSet<String>,
    /// Declarations in dependency order.
    pub order: Vec<DeclId>,
}

impl SemanticInfo {
    pub fn expr(&self, id: ExprId) -> Option<&ExprInfo> {
        self.exprs.get(&id)
    }

    pub fn type_of(&self, id: ExprId) -> Option<TypeId> {
        self.exprs.get(&id).map(|i| i.ty)
    }

    pub fn value_of(&self, id: ExprId) -> Option<&ConstValue> {
        self.exprs.get(&id).and_then(|i| i.value.as_ref())
    }

    pub fn symbol(&self, id: ExprId) -> Option<Symbol> {
        self.idents.get(&id).copied()
    }

    pub fn is_enabled(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }
}
