#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::ast::*;

/// Copies nodes from one [`Module`] into another.
///
/// Every source node is cloned at most once: a second request for the same
/// id returns the handle produced the first time, so shared sub-trees stay
/// shared in the destination. Expressions registered with
/// [`CloneContext::replace_expr`] are not cloned; the given destination node
/// is used in their place.
pub struct CloneContext<'a> {
    src: &'a Module,
    dst: &'a mut Module,
    exprs: HashMap<ExprId, ExprId>,
    stmts: HashMap<StmtId, StmtId>,
    decls: HashMap<DeclId, DeclId>,
}

impl<'a> CloneContext<'a> {
    pub fn new(src: &'a Module, dst: &'a mut Module) -> Self {
        Self {
            src,
            dst,
            exprs: HashMap::new(),
            stmts: HashMap::new(),
            decls: HashMap::new(),
        }
    }

    pub fn src(&self) -> &'a Module {
        self.src
    }

    /// Destination module, for building replacement nodes.
    pub fn dst(&mut self) -> &mut Module {
        self.dst
    }

    /// Makes every later reference to `original` resolve to `replacement`,
    /// a node that already lives in the destination module.
    pub fn replace_expr(&mut self, original: ExprId, replacement: ExprId) {
        self.exprs.insert(original, replacement);
    }

    pub fn cloned_expr(&self, original: ExprId) -> Option<ExprId> {
        self.exprs.get(&original).copied()
    }

    pub fn cloned_decl(&self, original: DeclId) -> Option<DeclId> {
        self.decls.get(&original).copied()
    }

    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        if let Some(&done) = self.exprs.get(&id) {
            return done;
        }
        let module = self.src;
        let src = module.expr(id);
        let kind = match &src.kind {
            ExprKind::Ident(t) => ExprKind::Ident(self.clone_templated(t)),
            ExprKind::Literal(l) => ExprKind::Literal(*l),
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: self.clone_templated(callee),
                args: self.clone_exprs(args),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: *op,
                lhs: self.clone_expr(*lhs),
                rhs: self.clone_expr(*rhs),
            },
            ExprKind::Unary { op, expr } => ExprKind::Unary {
                op: *op,
                expr: self.clone_expr(*expr),
            },
            ExprKind::Member { base, member } => ExprKind::Member {
                base: self.clone_expr(*base),
                member: member.clone(),
            },
            ExprKind::Index { base, index } => ExprKind::Index {
                base: self.clone_expr(*base),
                index: self.clone_expr(*index),
            },
            ExprKind::Bitcast { ty, expr } => ExprKind::Bitcast {
                ty: self.clone_expr(*ty),
                expr: self.clone_expr(*expr),
            },
        };
        let new = self.dst.exprs.append(Expr {
            span: src.span,
            kind,
        });
        self.exprs.insert(id, new);
        new
    }

    fn clone_exprs(&mut self, ids: &[ExprId]) -> Vec<ExprId> {
        ids.iter().map(|&e| self.clone_expr(e)).collect()
    }

    fn clone_opt_expr(&mut self, id: Option<ExprId>) -> Option<ExprId> {
        id.map(|e| self.clone_expr(e))
    }

    fn clone_templated(&mut self, t: &TemplatedIdent) -> TemplatedIdent {
        TemplatedIdent {
            ident: t.ident.clone(),
            template_args: self.clone_exprs(&t.template_args),
        }
    }

    pub fn clone_attrs(&mut self, attrs: &[Attribute]) -> Vec<Attribute> {
        attrs
            .iter()
            .map(|a| Attribute {
                span: a.span,
                name: a.name.clone(),
                args: self.clone_exprs(&a.args),
            })
            .collect()
    }

    pub fn clone_block(&mut self, block: &Block) -> Block {
        Block {
            span: block.span,
            stmts: block.stmts.iter().map(|&s| self.clone_stmt(s)).collect(),
        }
    }

    pub fn clone_stmt(&mut self, id: StmtId) -> StmtId {
        if let Some(&done) = self.stmts.get(&id) {
            return done;
        }
        let module = self.src;
        let src = module.stmt(id);
        let kind = match &src.kind {
            StmtKind::Block(b) => StmtKind::Block(self.clone_block(b)),
            StmtKind::Return(e) => StmtKind::Return(self.clone_opt_expr(*e)),
            StmtKind::If(s) => StmtKind::If(IfStmt {
                cond: self.clone_expr(s.cond),
                then_block: self.clone_block(&s.then_block),
                else_stmt: s.else_stmt.map(|e| self.clone_stmt(e)),
            }),
            StmtKind::Switch(s) => {
                let selector = self.clone_expr(s.selector);
                let clauses = s
                    .clauses
                    .iter()
                    .map(|c| SwitchClause {
                        span: c.span,
                        selectors: c
                            .selectors
                            .iter()
                            .map(|sel| match sel {
                                CaseSelector::Default(sp) => CaseSelector::Default(*sp),
                                CaseSelector::Expr(e) => CaseSelector::Expr(self.clone_expr(*e)),
                            })
                            .collect(),
                        body: self.clone_block(&c.body),
                    })
                    .collect();
                StmtKind::Switch(SwitchStmt { selector, clauses })
            }
            StmtKind::Loop(l) => StmtKind::Loop(LoopStmt {
                body: self.clone_block(&l.body),
                continuing: l.continuing.as_ref().map(|c| Continuing {
                    span: c.span,
                    body: self.clone_block(&c.body),
                    break_if: self.clone_opt_expr(c.break_if),
                }),
            }),
            StmtKind::For(f) => StmtKind::For(ForStmt {
                init: f.init.map(|s| self.clone_stmt(s)),
                cond: self.clone_opt_expr(f.cond),
                update: f.update.map(|s| self.clone_stmt(s)),
                body: self.clone_block(&f.body),
            }),
            StmtKind::While(w) => StmtKind::While(WhileStmt {
                cond: self.clone_expr(w.cond),
                body: self.clone_block(&w.body),
            }),
            StmtKind::Break => StmtKind::Break,
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::Discard => StmtKind::Discard,
            StmtKind::Decl(d) => StmtKind::Decl(LocalDecl {
                kind: d.kind,
                name: d.name.clone(),
                template_args: self.clone_exprs(&d.template_args),
                ty: self.clone_opt_expr(d.ty),
                init: self.clone_opt_expr(d.init),
            }),
            StmtKind::Assign(a) => StmtKind::Assign(AssignStmt {
                lhs: self.clone_opt_expr(a.lhs),
                op: a.op,
                rhs: self.clone_expr(a.rhs),
            }),
            StmtKind::Increment(i) => StmtKind::Increment(IncrementStmt {
                lhs: self.clone_expr(i.lhs),
                op: i.op,
            }),
            StmtKind::Call(e) => StmtKind::Call(self.clone_expr(*e)),
            StmtKind::ConstAssert(e) => StmtKind::ConstAssert(self.clone_expr(*e)),
        };
        let new = self.dst.stmts.append(Stmt {
            span: src.span,
            kind,
        });
        self.stmts.insert(id, new);
        new
    }

    /// Clones a global declaration and appends it to the destination's
    /// declaration list.
    pub fn clone_decl(&mut self, id: DeclId) -> DeclId {
        if let Some(&done) = self.decls.get(&id) {
            return done;
        }
        let module = self.src;
        let decl = match module.decl(id) {
            GlobalDecl::Var(v) => GlobalDecl::Var(VarDecl {
                span: v.span,
                attrs: self.clone_attrs(&v.attrs),
                name: v.name.clone(),
                template_args: self.clone_exprs(&v.template_args),
                ty: self.clone_opt_expr(v.ty),
                init: self.clone_opt_expr(v.init),
            }),
            GlobalDecl::Const(c) => GlobalDecl::Const(ConstDecl {
                span: c.span,
                name: c.name.clone(),
                ty: self.clone_opt_expr(c.ty),
                init: self.clone_expr(c.init),
            }),
            GlobalDecl::Override(o) => GlobalDecl::Override(OverrideDecl {
                span: o.span,
                attrs: self.clone_attrs(&o.attrs),
                name: o.name.clone(),
                ty: self.clone_opt_expr(o.ty),
                init: self.clone_opt_expr(o.init),
            }),
            GlobalDecl::Alias(a) => GlobalDecl::Alias(AliasDecl {
                span: a.span,
                name: a.name.clone(),
                ty: self.clone_expr(a.ty),
            }),
            GlobalDecl::Struct(s) => GlobalDecl::Struct(StructDecl {
                span: s.span,
                name: s.name.clone(),
                members: s
                    .members
                    .iter()
                    .map(|m| StructMember {
                        span: m.span,
                        attrs: self.clone_attrs(&m.attrs),
                        name: m.name.clone(),
                        ty: self.clone_expr(m.ty),
                    })
                    .collect(),
            }),
            GlobalDecl::Function(f) => GlobalDecl::Function(FunctionDecl {
                span: f.span,
                attrs: self.clone_attrs(&f.attrs),
                name: f.name.clone(),
                params: f
                    .params
                    .iter()
                    .map(|p| Param {
                        span: p.span,
                        attrs: self.clone_attrs(&p.attrs),
                        name: p.name.clone(),
                        ty: self.clone_expr(p.ty),
                    })
                    .collect(),
                ret: f.ret.as_ref().map(|r| ReturnType {
                    attrs: self.clone_attrs(&r.attrs),
                    ty: self.clone_expr(r.ty),
                }),
                body: self.clone_block(&f.body),
            }),
            GlobalDecl::ConstAssert(c) => GlobalDecl::ConstAssert(ConstAssert {
                span: c.span,
                expr: self.clone_expr(c.expr),
            }),
        };
        let new = self.dst.decls.append(decl);
        self.decls.insert(id, new);
        new
    }

    /// Clones directives and every declaration, in order.
    pub fn clone_module(&mut self) {
        let module = self.src;
        self.dst.directives.extend(module.directives.iter().cloned());
        for id in module.decls.handles() {
            self.clone_decl(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span;

    fn ident(name: &str, at: usize) -> crate::Ident {
        crate::Spanned::new(span(at, name.len()), name.to_string())
    }

    fn ident_expr(m: &mut Module, name: &str, at: usize) -> ExprId {
        m.exprs.append(Expr {
            span: span(at, name.len()),
            kind: ExprKind::Ident(TemplatedIdent {
                ident: ident(name, at),
                template_args: Vec::new(),
            }),
        })
    }

    #[test]
    fn shared_subexpressions_stay_shared() {
        let mut src = Module::default();
        let a = ident_expr(&mut src, "a", 0);
        let sum = src.exprs.append(Expr {
            span: span(0, 5),
            kind: ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: a,
                rhs: a,
            },
        });

        let mut dst = Module::default();
        let mut ctx = CloneContext::new(&src, &mut dst);
        let cloned = ctx.clone_expr(sum);
        assert_eq!(ctx.clone_expr(sum), cloned);
        assert_eq!(dst.exprs.len(), 2);
        match &dst.exprs[cloned].kind {
            ExprKind::Binary { lhs, rhs, .. } => assert_eq!(lhs, rhs),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn replacement_substitutes_node() {
        let mut src = Module::default();
        let a = ident_expr(&mut src, "a", 0);
        let neg = src.exprs.append(Expr {
            span: span(0, 2),
            kind: ExprKind::Unary {
                op: UnaryOp::Negate,
                expr: a,
            },
        });

        let mut dst = Module::default();
        let mut ctx = CloneContext::new(&src, &mut dst);
        let b = ident_expr(ctx.dst(), "b", 0);
        ctx.replace_expr(a, b);
        let cloned = ctx.clone_expr(neg);
        match &dst.exprs[cloned].kind {
            ExprKind::Unary { expr, .. } => assert_eq!(*expr, b),
            other => panic!("unexpected {other:?}"),
        }
    }
}
