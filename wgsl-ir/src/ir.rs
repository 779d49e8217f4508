#![forbid(unsafe_code)]

use wgsl_ast::Span;

use crate::constant::ConstValue;
use crate::ty::{Access, AddressSpace, TypeArena, TypeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    Complement,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::Complement => "~",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    And,
    Or,
    Xor,
    Shl,
    Shr,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
            Stage::Compute => "compute",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

/// Shader interface attributes of an entry point parameter, return value or
/// struct member.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoAttributes {
    pub builtin: Option<String>,
    pub location: Option<u32>,
    pub interpolate: Option<String>,
    pub invariant: bool,
    pub blend_src: Option<u32>,
}

impl IoAttributes {
    pub fn is_empty(&self) -> bool {
        self == &IoAttributes::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub types: TypeArena,
    pub root: RootBlock,
    pub functions: Vec<Function>,
    /// Type and origin of every value, indexed by [`ValueId`].
    pub values: Vec<ValueDef>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, id: ValueId) -> Option<&ValueDef> {
        self.values.get(id.0 as usize)
    }

    pub fn value_type(&self, id: ValueId) -> Option<TypeId> {
        self.value(id).map(|v| v.ty)
    }

    pub fn constant_value(&self, id: ValueId) -> Option<&ConstValue> {
        match &self.value(id)?.kind {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn new_value(&mut self, ty: TypeId, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueDef { ty, kind });
        id
    }

    pub fn constant(&mut self, ty: TypeId, value: ConstValue) -> ValueId {
        self.new_value(ty, ValueKind::Constant(value))
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.id == id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| f.stage.is_some())
    }

    /// The module-scope `var` or `override` instruction producing `value`.
    pub fn root_inst(&self, value: ValueId) -> Option<&Inst> {
        self.root.insts.iter().find(|i| i.dest == Some(value))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueDef {
    pub ty: TypeId,
    pub kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    /// Result of an instruction.
    Inst,
    Param { function: FunctionId, index: u32 },
    Constant(ConstValue),
}

/// Module-scope declarations: `Var` and `Override` instructions only. The
/// root block has no terminator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RootBlock {
    pub insts: Vec<Inst>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub span: Span,
    pub stage: Option<Stage>,
    pub workgroup_size: Option<[u32; 3]>,
    pub params: Vec<Param>,
    pub ret: Option<ReturnValue>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl Function {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
    pub value: ValueId,
    pub io: IoAttributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnValue {
    pub ty: TypeId,
    pub io: IoAttributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub span: Span,
    pub insts: Vec<Inst>,
    /// `None` only while the block is under construction.
    pub term: Option<Terminator>,
}

impl BasicBlock {
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.term {
            Some(Terminator::Branch(b)) => vec![*b],
            Some(Terminator::BranchIf {
                then_bb, else_bb, ..
            }) => vec![*then_bb, *else_bb],
            Some(Terminator::Switch {
                default_bb, cases, ..
            }) => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default_bb);
                out
            }
            Some(Terminator::Return(_)) | Some(Terminator::Unreachable) | None => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inst {
    pub span: Span,
    pub dest: Option<ValueId>,
    pub kind: InstKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    /// Declares a variable; the result is a pointer to its storage.
    Var {
        name: String,
        space: AddressSpace,
        access: Access,
        init: Option<ValueId>,
        binding: Option<BindingPoint>,
    },
    /// Pipeline-overridable constant.
    Override {
        name: String,
        id: Option<u32>,
        init: Option<ValueId>,
    },
    /// Names an immutable value.
    Let { name: String, value: ValueId },
    Load { ptr: ValueId },
    Store { ptr: ValueId, value: ValueId },
    /// Pointer or value access through a chain of indices. Struct member
    /// indices are constants.
    Access { base: ValueId, indices: Vec<ValueId> },
    Swizzle { base: ValueId, components: Vec<u8> },
    Binary { op: BinOp, lhs: ValueId, rhs: ValueId },
    Unary { op: UnaryOp, operand: ValueId },
    /// Value conversion to the result type.
    Convert { value: ValueId },
    Bitcast { value: ValueId },
    Construct { args: Vec<ValueId> },
    Call { callee: FunctionId, args: Vec<ValueId> },
    BuiltinCall { name: String, args: Vec<ValueId> },
    Discard,
}

impl InstKind {
    /// Values this instruction reads.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstKind::Var { init, .. } | InstKind::Override { init, .. } => {
                init.iter().copied().collect()
            }
            InstKind::Let { value, .. } => vec![*value],
            InstKind::Load { ptr } => vec![*ptr],
            InstKind::Store { ptr, value } => vec![*ptr, *value],
            InstKind::Access { base, indices } => {
                std::iter::once(*base).chain(indices.iter().copied()).collect()
            }
            InstKind::Swizzle { base, .. } => vec![*base],
            InstKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Unary { operand, .. } => vec![*operand],
            InstKind::Convert { value } | InstKind::Bitcast { value } => vec![*value],
            InstKind::Construct { args }
            | InstKind::Call { args, .. }
            | InstKind::BuiltinCall { args, .. } => args.clone(),
            InstKind::Discard => Vec::new(),
        }
    }

    /// Rewrites every operand through `f`.
    pub fn map_operands(&mut self, mut f: impl FnMut(ValueId) -> ValueId) {
        match self {
            InstKind::Var { init, .. } | InstKind::Override { init, .. } => {
                if let Some(v) = init {
                    *v = f(*v);
                }
            }
            InstKind::Let { value, .. } => *value = f(*value),
            InstKind::Load { ptr } => *ptr = f(*ptr),
            InstKind::Store { ptr, value } => {
                *ptr = f(*ptr);
                *value = f(*value);
            }
            InstKind::Access { base, indices } => {
                *base = f(*base);
                indices.iter_mut().for_each(|i| *i = f(*i));
            }
            InstKind::Swizzle { base, .. } => *base = f(*base),
            InstKind::Binary { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            InstKind::Unary { operand, .. } => *operand = f(*operand),
            InstKind::Convert { value } | InstKind::Bitcast { value } => *value = f(*value),
            InstKind::Construct { args }
            | InstKind::Call { args, .. }
            | InstKind::BuiltinCall { args, .. } => args.iter_mut().for_each(|a| *a = f(*a)),
            InstKind::Discard => {}
        }
    }

    /// Whether removing an unused instance has no observable effect.
    pub fn is_pure(&self) -> bool {
        match self {
            InstKind::Store { .. }
            | InstKind::Call { .. }
            | InstKind::Discard
            | InstKind::Var { .. }
            | InstKind::Override { .. } => false,
            InstKind::BuiltinCall { name, .. } => !has_side_effects(name),
            _ => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstKind::Var { .. } => "var",
            InstKind::Override { .. } => "override",
            InstKind::Let { .. } => "let",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::Access { .. } => "access",
            InstKind::Swizzle { .. } => "swizzle",
            InstKind::Binary { .. } => "binary",
            InstKind::Unary { .. } => "unary",
            InstKind::Convert { .. } => "convert",
            InstKind::Bitcast { .. } => "bitcast",
            InstKind::Construct { .. } => "construct",
            InstKind::Call { .. } => "call",
            InstKind::BuiltinCall { .. } => "builtin call",
            InstKind::Discard => "discard",
        }
    }
}

/// Builtins that write memory, synchronize or depend on invocation state.
fn has_side_effects(name: &str) -> bool {
    name.starts_with("atomic")
        || name.starts_with("subgroup")
        || name.ends_with("Barrier")
        || matches!(name, "textureStore" | "workgroupUniformLoad")
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Return(Option<ValueId>),

    Branch(BlockId),

    BranchIf {
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    },

    Switch {
        selector: ValueId,
        default_bb: BlockId,
        cases: Vec<(i64, BlockId)>,
    },

    /// Marks the end of a path control can never reach.
    Unreachable,
}

impl Terminator {
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Terminator::Return(v) => v.iter().copied().collect(),
            Terminator::BranchIf { cond, .. } => vec![*cond],
            Terminator::Switch { selector, .. } => vec![*selector],
            Terminator::Branch(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn map_operands(&mut self, mut f: impl FnMut(ValueId) -> ValueId) {
        match self {
            Terminator::Return(Some(v)) => *v = f(*v),
            Terminator::BranchIf { cond, .. } => *cond = f(*cond),
            Terminator::Switch { selector, .. } => *selector = f(*selector),
            _ => {}
        }
    }
}

#[derive(Default, Debug)]
pub struct IdGen {
    next_block: u32,
    next_function: u32,
}

impl IdGen {
    pub fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn fresh_function(&mut self) -> FunctionId {
        let id = FunctionId(self.next_function);
        self.next_function += 1;
        id
    }
}
