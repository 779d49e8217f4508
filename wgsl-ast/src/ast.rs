#![forbid(unsafe_code)]

//! WGSL syntax tree.
//!
//! Nodes live in the arenas of a [`Module`] and refer to each other through
//! [`ExprId`], [`StmtId`] and [`DeclId`] handles. Those handles are the
//! stable identities later stages key their side-tables on.

use crate::arena::{Arena, Handle};
use crate::{Ident, Span};

pub type ExprId = Handle<Expr>;
pub type StmtId = Handle<Stmt>;
pub type DeclId = Handle<GlobalDecl>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub directives: Vec<Directive>,
    /// Global declarations in source order.
    pub decls: Arena<GlobalDecl>,
    pub exprs: Arena<Expr>,
    pub stmts: Arena<Stmt>,
}

impl Module {
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id]
    }

    pub fn decl(&self, id: DeclId) -> &GlobalDecl {
        &self.decls[id]
    }

    pub fn functions(&self) -> impl Iterator<Item = (DeclId, &FunctionDecl)> {
        self.decls.iter().filter_map(|(id, d)| match d {
            GlobalDecl::Function(f) => Some((id, f)),
            _ => None,
        })
    }

    pub fn find_decl(&self, name: &str) -> Option<DeclId> {
        self.decls
            .iter()
            .find(|(_, d)| d.name().is_some_and(|n| n.node == name))
            .map(|(id, _)| id)
    }

    pub fn enabled_extensions(&self) -> impl Iterator<Item = &Ident> {
        self.directives.iter().flat_map(|d| match d {
            Directive::Enable(e) => e.names.as_slice(),
            _ => &[][..],
        })
    }
}

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Enable(EnableDirective),
    Requires(RequiresDirective),
    Diagnostic(DiagnosticDirective),
}

impl Directive {
    pub fn span(&self) -> Span {
        match self {
            Directive::Enable(d) => d.span,
            Directive::Requires(d) => d.span,
            Directive::Diagnostic(d) => d.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnableDirective {
    pub span: Span,
    pub names: Vec<Ident>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequiresDirective {
    pub span: Span,
    pub names: Vec<Ident>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticDirective {
    pub span: Span,
    pub control: DiagnosticControl,
}

/// `(severity, rule)` pair shared by the `diagnostic` directive and attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticControl {
    pub span: Span,
    pub severity: Ident,
    /// One or two dot-separated names (`derivative_uniformity`, `chromium.foo`).
    pub rule: Vec<Ident>,
}

impl DiagnosticControl {
    pub fn rule_name(&self) -> String {
        self.rule
            .iter()
            .map(|i| i.node.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub span: Span,
    pub name: Ident,
    pub args: Vec<ExprId>,
}

pub fn find_attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attrs.iter().find(|a| a.name.node == name)
}

#[derive(Clone, Debug, PartialEq)]
pub enum GlobalDecl {
    Var(VarDecl),
    Const(ConstDecl),
    Override(OverrideDecl),
    Alias(AliasDecl),
    Struct(StructDecl),
    Function(FunctionDecl),
    ConstAssert(ConstAssert),
}

impl GlobalDecl {
    pub fn span(&self) -> Span {
        match self {
            GlobalDecl::Var(d) => d.span,
            GlobalDecl::Const(d) => d.span,
            GlobalDecl::Override(d) => d.span,
            GlobalDecl::Alias(d) => d.span,
            GlobalDecl::Struct(d) => d.span,
            GlobalDecl::Function(d) => d.span,
            GlobalDecl::ConstAssert(d) => d.span,
        }
    }

    pub fn name(&self) -> Option<&Ident> {
        match self {
            GlobalDecl::Var(d) => Some(&d.name),
            GlobalDecl::Const(d) => Some(&d.name),
            GlobalDecl::Override(d) => Some(&d.name),
            GlobalDecl::Alias(d) => Some(&d.name),
            GlobalDecl::Struct(d) => Some(&d.name),
            GlobalDecl::Function(d) => Some(&d.name),
            GlobalDecl::ConstAssert(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            GlobalDecl::Var(_) => "var",
            GlobalDecl::Const(_) => "const",
            GlobalDecl::Override(_) => "override",
            GlobalDecl::Alias(_) => "alias",
            GlobalDecl::Struct(_) => "struct",
            GlobalDecl::Function(_) => "function",
            GlobalDecl::ConstAssert(_) => "const_assert",
        }
    }
}

/// `var<space, access> name : T = init;` at module or function scope.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    /// Address space and access mode, as written between `var<` and `>`.
    pub template_args: Vec<ExprId>,
    pub ty: Option<ExprId>,
    pub init: Option<ExprId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstDecl {
    pub span: Span,
    pub name: Ident,
    pub ty: Option<ExprId>,
    pub init: ExprId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverrideDecl {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub ty: Option<ExprId>,
    pub init: Option<ExprId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasDecl {
    pub span: Span,
    pub name: Ident,
    pub ty: ExprId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDecl {
    pub span: Span,
    pub name: Ident,
    pub members: Vec<StructMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructMember {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub ty: ExprId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Option<ReturnType>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub ty: ExprId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnType {
    pub attrs: Vec<Attribute>,
    pub ty: ExprId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstAssert {
    pub span: Span,
    pub expr: ExprId,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<StmtId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Block(Block),
    Return(Option<ExprId>),
    If(IfStmt),
    Switch(SwitchStmt),
    Loop(LoopStmt),
    For(ForStmt),
    While(WhileStmt),
    Break,
    Continue,
    Discard,
    Decl(LocalDecl),
    Assign(AssignStmt),
    Increment(IncrementStmt),
    Call(ExprId),
    ConstAssert(ExprId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub cond: ExprId,
    pub then_block: Block,
    /// Either another `if` statement (`else if`) or a block statement.
    pub else_stmt: Option<StmtId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchStmt {
    pub selector: ExprId,
    pub clauses: Vec<SwitchClause>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchClause {
    pub span: Span,
    pub selectors: Vec<CaseSelector>,
    pub body: Block,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaseSelector {
    Default(Span),
    Expr(ExprId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopStmt {
    pub body: Block,
    pub continuing: Option<Continuing>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Continuing {
    pub span: Span,
    pub body: Block,
    pub break_if: Option<ExprId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub init: Option<StmtId>,
    pub cond: Option<ExprId>,
    pub update: Option<StmtId>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub cond: ExprId,
    pub body: Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalKind {
    Var,
    Let,
    Const,
}

impl LocalKind {
    pub fn keyword(self) -> &'static str {
        match self {
            LocalKind::Var => "var",
            LocalKind::Let => "let",
            LocalKind::Const => "const",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalDecl {
    pub kind: LocalKind,
    pub name: Ident,
    /// Only `var` carries template arguments (`var<function>`).
    pub template_args: Vec<ExprId>,
    pub ty: Option<ExprId>,
    pub init: Option<ExprId>,
}

/// `lhs = rhs`, `lhs op= rhs`, or the phony `_ = rhs` when `lhs` is `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub lhs: Option<ExprId>,
    pub op: Option<BinaryOp>,
    pub rhs: ExprId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncrementOp {
    Increment,
    Decrement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncrementStmt {
    pub lhs: ExprId,
    pub op: IncrementOp,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

/// An identifier optionally followed by a template list, e.g. `vec3<f32>`.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplatedIdent {
    pub ident: Ident,
    pub template_args: Vec<ExprId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(TemplatedIdent),
    Literal(Literal),
    Call {
        callee: TemplatedIdent,
        args: Vec<ExprId>,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: UnaryOp,
        expr: ExprId,
    },
    Member {
        base: ExprId,
        member: Ident,
    },
    Index {
        base: ExprId,
        index: ExprId,
    },
    Bitcast {
        ty: ExprId,
        expr: ExprId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int { value: i64, suffix: IntSuffix },
    Float { value: f64, suffix: FloatSuffix },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntSuffix {
    None,
    I,
    U,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatSuffix {
    None,
    F,
    H,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    Complement,
    Deref,
    AddressOf,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::Complement => "~",
            UnaryOp::Deref => "*",
            UnaryOp::AddressOf => "&",
        }
    }
}

/// Calls `f` on every direct sub-expression of `expr`.
pub fn for_each_child_expr(expr: &ExprKind, mut f: impl FnMut(ExprId)) {
    match expr {
        ExprKind::Ident(t) => t.template_args.iter().copied().for_each(f),
        ExprKind::Literal(_) => {}
        ExprKind::Call { callee, args } => {
            callee.template_args.iter().copied().for_each(&mut f);
            args.iter().copied().for_each(f);
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            f(*lhs);
            f(*rhs);
        }
        ExprKind::Unary { expr, .. } => f(*expr),
        ExprKind::Member { base, .. } => f(*base),
        ExprKind::Index { base, index } => {
            f(*base);
            f(*index);
        }
        ExprKind::Bitcast { ty, expr } => {
            f(*ty);
            f(*expr);
        }
    }
}
