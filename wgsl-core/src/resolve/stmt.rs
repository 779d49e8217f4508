#![forbid(unsafe_code)]

//! Statements and control-flow behaviors.
//!
//! Every statement has a set of behaviors describing how control can leave
//! it: falling through to the next statement, returning, breaking or
//! continuing. A function with a return type whose body can fall through is
//! missing a return.

use std::collections::HashMap;

use wgsl_ast::{
    AssignStmt, Block, CaseSelector, ExprId, ExprKind, ForStmt, IfStmt, IncrementStmt, LocalDecl,
    LocalKind, LoopStmt, Span, StmtId, StmtKind, SwitchStmt, WhileStmt,
};
use wgsl_ir::{AddressSpace, Scalar, Type, TypeId};

use super::{Construct, Resolver, Result};
use crate::error::ResolveError;
use crate::info::{EvalStage, LocalInfo};
use crate::overload;
use crate::symbols::Symbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(super) struct Behaviors(u8);

impl Behaviors {
    pub const NEXT: Self = Self(1);
    pub const RETURN: Self = Self(2);
    pub const BREAK: Self = Self(4);
    pub const CONTINUE: Self = Self(8);
    /// A statement failed to resolve; how it leaves is not known.
    pub const UNKNOWN: Self = Self(16);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Behaviors of a whole loop given those of its body: a `break` leaves
    /// the loop normally, `continue` stays inside it.
    fn after_loop(self) -> Self {
        if self.contains(Self::BREAK) {
            self.without(Self::BREAK).without(Self::CONTINUE).with(Self::NEXT)
        } else {
            self.without(Self::NEXT).without(Self::CONTINUE)
        }
    }
}

/// Behaviors assumed for a statement that failed to resolve. A `return`
/// still returns; anything else may fall through.
fn failed(kind: &StmtKind) -> Behaviors {
    match kind {
        StmtKind::Return(_) => Behaviors::RETURN,
        _ => Behaviors::NEXT.with(Behaviors::UNKNOWN),
    }
}

impl Resolver<'_> {
    fn construct_scope<T>(&mut self, construct: Construct, f: impl FnOnce(&mut Self) -> T) -> T {
        if let Some(func) = self.func.as_mut() {
            func.constructs.push(construct);
        }
        let out = f(self);
        if let Some(func) = self.func.as_mut() {
            func.constructs.pop();
        }
        out
    }

    fn innermost(&self) -> impl Iterator<Item = Construct> + '_ {
        self.func
            .iter()
            .flat_map(|f| f.constructs.iter().rev().copied())
    }

    /// Checks a statement list, recording errors and returning the list's
    /// behaviors. Statements after one that cannot fall through are still
    /// checked but flagged as unreachable.
    pub(super) fn stmts(&mut self, stmts: &[StmtId]) -> Behaviors {
        let module = self.module;
        let mut acc = Behaviors::NEXT;
        let mut warned = false;
        for id in stmts {
            if !acc.contains(Behaviors::NEXT) && !warned {
                self.warn(module.stmt(*id).span, "code is unreachable");
                warned = true;
            }
            let b = match self.stmt(*id) {
                Ok(b) => b,
                Err(e) => {
                    self.errors.push(e);
                    failed(&module.stmt(*id).kind)
                }
            };
            if acc.contains(Behaviors::NEXT) {
                acc = acc.without(Behaviors::NEXT).with(b);
            }
        }
        acc
    }

    fn block(&mut self, block: &Block) -> Behaviors {
        self.symbols.push_scope();
        let b = self.stmts(&block.stmts);
        self.symbols.pop_scope();
        b
    }

    fn report<T>(&mut self, result: Result<T>) {
        if let Err(e) = result {
            self.errors.push(e);
        }
    }

    fn stmt(&mut self, id: StmtId) -> Result<Behaviors> {
        let module = self.module;
        let stmt = module.stmt(id);
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Block(b) => Ok(self.block(b)),
            StmtKind::Return(value) => self.return_stmt(*value, span),
            StmtKind::If(s) => Ok(self.if_stmt(s)),
            StmtKind::Switch(s) => Ok(self.switch_stmt(s, span)),
            StmtKind::Loop(l) => Ok(self.loop_stmt(l)),
            StmtKind::For(f) => Ok(self.for_stmt(f)),
            StmtKind::While(w) => Ok(self.while_stmt(w)),
            StmtKind::Break => {
                for c in self.innermost() {
                    match c {
                        Construct::Loop | Construct::Switch => return Ok(Behaviors::BREAK),
                        Construct::Continuing => {
                            return Err(ResolveError::validation(
                                span,
                                "'break' is not allowed in a continuing block; use 'break if'",
                            ));
                        }
                    }
                }
                Err(ResolveError::validation(
                    span,
                    "'break' must be inside a loop or switch",
                ))
            }
            StmtKind::Continue => {
                for c in self.innermost() {
                    match c {
                        Construct::Loop => return Ok(Behaviors::CONTINUE),
                        Construct::Switch => continue,
                        Construct::Continuing => {
                            return Err(ResolveError::validation(
                                span,
                                "'continue' is not allowed in a continuing block",
                            ));
                        }
                    }
                }
                Err(ResolveError::validation(span, "'continue' must be inside a loop"))
            }
            StmtKind::Discard => Ok(Behaviors::NEXT),
            StmtKind::Decl(d) => self.local(id, d, span).map(|()| Behaviors::NEXT),
            StmtKind::Assign(a) => self.assign(a, span).map(|()| Behaviors::NEXT),
            StmtKind::Increment(i) => self.increment(i, span).map(|()| Behaviors::NEXT),
            StmtKind::Call(e) => {
                let expr = module.expr(*e);
                match &expr.kind {
                    ExprKind::Call { callee, args } => {
                        self.call(*e, callee, args, expr.span, true)?;
                        Ok(Behaviors::NEXT)
                    }
                    _ => Err(ResolveError::validation(
                        expr.span,
                        "expression statement must be a function call",
                    )),
                }
            }
            StmtKind::ConstAssert(e) => self.const_assert(*e, span).map(|()| Behaviors::NEXT),
        }
    }

    fn return_stmt(&mut self, value: Option<ExprId>, span: Span) -> Result<Behaviors> {
        if self.innermost().any(|c| c == Construct::Continuing) {
            return Err(ResolveError::validation(
                span,
                "'return' is not allowed in a continuing block",
            ));
        }
        let (name, ret) = match &self.func {
            Some(f) => (f.name.clone(), f.ret),
            None => return Err(ResolveError::validation(span, "'return' outside of a function")),
        };
        match (value, ret) {
            (Some(e), Some(ret)) => {
                self.expr(e)?;
                self.convert(e, ret)?;
            }
            (None, None) => {}
            (Some(e), None) => {
                self.expr(e)?;
                return Err(ResolveError::validation(
                    span,
                    format!("function '{name}' has no return type; 'return' must not have a value"),
                ));
            }
            (None, Some(ret)) => {
                return Err(ResolveError::validation(
                    span,
                    format!("missing return value; function '{name}' returns '{}'", self.display(ret)),
                ));
            }
        }
        Ok(Behaviors::RETURN)
    }

    pub(super) fn condition(&mut self, e: ExprId) -> Result<()> {
        let ty = self.expr(e)?;
        let ty = self.value_type(ty);
        if self.info.types.is_bool(ty) {
            Ok(())
        } else {
            Err(ResolveError::TypeMismatch {
                expected: "bool".to_string(),
                found: self.display(ty),
                span: self.module.expr(e).span,
            })
        }
    }

    fn if_stmt(&mut self, s: &IfStmt) -> Behaviors {
        let cond = self.condition(s.cond);
        self.report(cond);
        let then = self.block(&s.then_block);
        let otherwise = match s.else_stmt {
            Some(e) => match self.stmt(e) {
                Ok(b) => b,
                Err(err) => {
                    self.errors.push(err);
                    failed(&self.module.stmt(e).kind)
                }
            },
            None => Behaviors::NEXT,
        };
        then.with(otherwise)
    }

    fn switch_stmt(&mut self, s: &SwitchStmt, span: Span) -> Behaviors {
        let result = self.switch_selectors(s, span);
        self.report(result);
        let mut acc = Behaviors::default();
        for clause in &s.clauses {
            let b = self.construct_scope(Construct::Switch, |r| r.block(&clause.body));
            acc = acc.with(b);
        }
        if acc.contains(Behaviors::BREAK) {
            acc = acc.without(Behaviors::BREAK).with(Behaviors::NEXT);
        }
        if acc == Behaviors::default() {
            acc = Behaviors::NEXT;
        }
        acc
    }

    /// Gives the selector and every case value one integer type and checks
    /// the cases are distinct const-expressions with exactly one default.
    fn switch_selectors(&mut self, s: &SwitchStmt, span: Span) -> Result<()> {
        let selector = self.expr(s.selector)?;
        let selector = self.value_type(selector);
        let mut exprs = Vec::new();
        let mut defaults = Vec::new();
        for clause in &s.clauses {
            for sel in &clause.selectors {
                match sel {
                    CaseSelector::Default(sp) => defaults.push(*sp),
                    CaseSelector::Expr(e) => exprs.push(*e),
                }
            }
        }
        let mut scalars = Vec::with_capacity(exprs.len() + 1);
        for id in std::iter::once(s.selector).chain(exprs.iter().copied()) {
            let ty = if id == s.selector {
                selector
            } else {
                let t = self.expr(id)?;
                self.value_type(t)
            };
            match self.info.types.as_scalar(ty).filter(|s| s.is_integer()) {
                Some(scalar) => scalars.push(scalar),
                None => {
                    return Err(ResolveError::TypeMismatch {
                        expected: "i32 or u32".to_string(),
                        found: self.display(ty),
                        span: self.module.expr(id).span,
                    });
                }
            }
        }
        let common = overload::common_scalar(&scalars).ok_or_else(|| {
            ResolveError::validation(
                self.module.expr(s.selector).span,
                "the case selector values must have the same type as the selector expression",
            )
        })?;
        let common = self.info.types.scalar(match common {
            Scalar::AbstractInt => Scalar::I32,
            s => s,
        });
        self.convert(s.selector, common)?;

        let mut seen: HashMap<i64, Span> = HashMap::new();
        for e in exprs {
            self.convert(e, common)?;
            let case_span = self.module.expr(e).span;
            if self.stage(e) != EvalStage::Const {
                return Err(ResolveError::validation(
                    case_span,
                    "case selector must be a const-expression",
                ));
            }
            let value = self.info.value_of(e).and_then(|v| v.as_i64()).unwrap_or_default();
            if let Some(previous) = seen.insert(value, case_span) {
                return Err(ResolveError::Redeclaration {
                    name: format!("case {value}"),
                    span: case_span,
                    previous,
                });
            }
        }
        match defaults.as_slice() {
            [_] => Ok(()),
            [] => Err(ResolveError::validation(
                span,
                "switch statement must have exactly one default clause",
            )),
            [_, second, ..] => Err(ResolveError::validation(
                *second,
                "switch statement must have exactly one default clause",
            )),
        }
    }

    fn loop_stmt(&mut self, l: &LoopStmt) -> Behaviors {
        self.symbols.push_scope();
        let mut b = self.construct_scope(Construct::Loop, |r| r.stmts(&l.body.stmts));
        if let Some(c) = &l.continuing {
            let continuing = self.construct_scope(Construct::Continuing, |r| {
                r.symbols.push_scope();
                let b = r.stmts(&c.body.stmts);
                if let Some(e) = c.break_if {
                    let cond = r.condition(e);
                    r.report(cond);
                }
                r.symbols.pop_scope();
                b
            });
            b = b.with(continuing);
            if c.break_if.is_some() {
                b = b.with(Behaviors::BREAK);
            }
        }
        self.symbols.pop_scope();
        b.after_loop()
    }

    fn for_stmt(&mut self, f: &ForStmt) -> Behaviors {
        self.symbols.push_scope();
        if let Some(init) = f.init {
            let r = self.stmt(init);
            self.report(r);
        }
        if let Some(cond) = f.cond {
            let r = self.condition(cond);
            self.report(r);
        }
        if let Some(update) = f.update {
            let r = self.construct_scope(Construct::Continuing, |r| r.stmt(update));
            self.report(r);
        }
        let mut b = self.construct_scope(Construct::Loop, |r| r.block(&f.body));
        self.symbols.pop_scope();
        if f.cond.is_some() {
            b = b.with(Behaviors::BREAK);
        }
        b.after_loop()
    }

    fn while_stmt(&mut self, w: &WhileStmt) -> Behaviors {
        let cond = self.condition(w.cond);
        self.report(cond);
        let b = self.construct_scope(Construct::Loop, |r| r.block(&w.body));
        b.with(Behaviors::BREAK).after_loop()
    }

    fn local(&mut self, id: StmtId, d: &LocalDecl, span: Span) -> Result<()> {
        let result = self.local_info(d, span);
        let symbol = match &result {
            Ok(info) => {
                self.info.locals.insert(id, info.clone());
                Symbol::Local(id)
            }
            Err(_) => Symbol::Poisoned,
        };
        let declared = self.symbols.declare(&d.name.node, symbol, d.name.span);
        result?;
        declared.map_err(|previous| ResolveError::Redeclaration {
            name: d.name.node.clone(),
            span: d.name.span,
            previous,
        })
    }

    fn local_info(&mut self, d: &LocalDecl, span: Span) -> Result<LocalInfo> {
        let declared = match d.ty {
            Some(t) => Some(self.resolve_type(t)?),
            None => None,
        };
        let init_ty = match d.init {
            Some(init) => Some(self.expr(init)?),
            None => None,
        };
        let (ty, value) = match d.kind {
            LocalKind::Var => {
                let (space, access) = self.var_template(&d.template_args)?;
                if space.is_some_and(|s| s != AddressSpace::Function) || access.is_some() {
                    return Err(ResolveError::address_space(
                        span,
                        "function-scope 'var' must use the 'function' address space",
                    ));
                }
                let store = match (declared, d.init) {
                    (Some(t), Some(init)) => {
                        self.convert(init, t)?;
                        t
                    }
                    (Some(t), None) => t,
                    (None, Some(init)) => self.concretize(init)?,
                    (None, None) => {
                        return Err(ResolveError::validation(
                            d.name.span,
                            "'var' declaration requires a type or initializer",
                        ));
                    }
                };
                if !self.info.types.is_constructible(store) {
                    return Err(ResolveError::address_space(
                        span,
                        format!(
                            "function-scope 'var' must have a constructible type, found '{}'",
                            self.display(store)
                        ),
                    ));
                }
                (store, None)
            }
            LocalKind::Let => {
                let Some(init) = d.init else {
                    return Err(ResolveError::validation(
                        d.name.span,
                        "'let' declaration requires an initializer",
                    ));
                };
                let ty = match declared {
                    Some(t) => {
                        self.convert(init, t)?;
                        t
                    }
                    None => self.concretize(init)?,
                };
                let types = &self.info.types;
                if !types.is_constructible(ty) && !types.is_pointer(ty) {
                    return Err(ResolveError::validation(
                        span,
                        format!(
                            "'let' must have a constructible or pointer type, found '{}'",
                            self.display(ty)
                        ),
                    ));
                }
                (ty, None)
            }
            LocalKind::Const => {
                let (Some(init), Some(init_ty)) = (d.init, init_ty) else {
                    return Err(ResolveError::validation(
                        d.name.span,
                        "'const' declaration requires an initializer",
                    ));
                };
                if self.stage(init) != EvalStage::Const {
                    return Err(ResolveError::validation(
                        self.module.expr(init).span,
                        "'const' initializer must be a const-expression",
                    ));
                }
                let ty = match declared {
                    Some(t) => {
                        self.convert(init, t)?;
                        t
                    }
                    None => self.value_type(init_ty),
                };
                (ty, self.info.value_of(init).cloned())
            }
        };
        Ok(LocalInfo {
            name: d.name.node.clone(),
            kind: d.kind,
            ty,
            value,
        })
    }

    /// Error for an assignment whose left side is not a writable reference.
    fn not_assignable(&self, lhs: ExprId, ty: TypeId) -> ResolveError {
        let span = self.module.expr(lhs).span;
        if let ExprKind::Ident(t) = &self.module.expr(lhs).kind {
            let name = &t.ident.node;
            match self.info.symbol(lhs) {
                Some(Symbol::Local(stmt)) => {
                    if let Some(local) = self.info.locals.get(&stmt) {
                        return ResolveError::validation(
                            span,
                            format!(
                                "cannot assign to '{name}': '{}' declarations are immutable",
                                local.kind.keyword()
                            ),
                        );
                    }
                }
                Some(Symbol::Param(..)) => {
                    return ResolveError::validation(
                        span,
                        format!("cannot assign to parameter '{name}'"),
                    );
                }
                Some(Symbol::Global(_)) => {
                    return ResolveError::validation(
                        span,
                        format!("cannot assign to '{name}': only variables can be assigned"),
                    );
                }
                _ => {}
            }
        }
        ResolveError::validation(
            span,
            format!("cannot assign to a value of type '{}'", self.display(ty)),
        )
    }

    /// The store type of a writable reference on the left of an
    /// assignment.
    fn writable(&self, lhs: ExprId, ty: TypeId, span: Span) -> Result<TypeId> {
        let Type::Reference {
            space,
            store,
            access,
        } = self.info.types.get(ty).clone()
        else {
            return Err(self.not_assignable(lhs, ty));
        };
        if !access.can_write() {
            return Err(ResolveError::address_space(
                span,
                format!(
                    "cannot store into a read-only view of type '{}'",
                    self.display(ty)
                ),
            ));
        }
        if space == AddressSpace::Handle || !self.info.types.is_constructible(store) {
            return Err(ResolveError::validation(
                span,
                format!("cannot assign a value of type '{}'", self.display(store)),
            ));
        }
        Ok(store)
    }

    fn assign(&mut self, a: &AssignStmt, span: Span) -> Result<()> {
        let Some(lhs) = a.lhs else {
            self.expr(a.rhs)?;
            self.concretize(a.rhs)?;
            return Ok(());
        };
        let lhs_ty = self.expr(lhs)?;
        let store = self.writable(lhs, lhs_ty, span)?;
        let rhs_ty = self.expr(a.rhs)?;
        let Some(op) = a.op else {
            return self.convert(a.rhs, store);
        };
        let builtins = self.builtins;
        let overloads = builtins.binary(op);
        let rhs_ty = self.value_type(rhs_ty);
        let name = format!("operator {}=", op.symbol());
        let selected = overload::select(&mut self.info.types, overloads, &[store, rhs_ty])
            .ok()
            .filter(|s| s.ret == Some(store) && s.params.first() == Some(&store));
        let Some(selected) = selected else {
            return Err(ResolveError::NoMatchingOverload {
                call: format!("{name} ({}, {})", self.display(store), self.display(rhs_ty)),
                candidates: overloads
                    .iter()
                    .map(|o| o.signature(&format!("operator {}", op.symbol())))
                    .collect(),
                span,
            });
        };
        let rhs_param = selected
            .params
            .get(1)
            .copied()
            .map(|p| self.info.types.concretize(p));
        match rhs_param {
            Some(p) => self.convert(a.rhs, p),
            None => Ok(()),
        }
    }

    fn increment(&mut self, i: &IncrementStmt, span: Span) -> Result<()> {
        let ty = self.expr(i.lhs)?;
        let store = self.writable(i.lhs, ty, span)?;
        match self.info.types.as_scalar(store) {
            Some(Scalar::I32 | Scalar::U32) => Ok(()),
            _ => Err(ResolveError::TypeMismatch {
                expected: "i32 or u32".to_string(),
                found: self.display(store),
                span,
            }),
        }
    }
}
