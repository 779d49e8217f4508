#![forbid(unsafe_code)]

//! Module-scope declaration ordering.
//!
//! Globals may be declared in any order, so the resolver walks them in an
//! order where every declaration comes after everything it names. A name
//! that refers back to a declaration still being visited is a cycle.

use std::collections::{HashMap, HashSet};

use wgsl_ast::{
    Attribute, Block, CaseSelector, DeclId, ExprId, ExprKind, GlobalDecl, Module, Span, StmtId,
    StmtKind, for_each_child_expr,
};

use crate::error::ResolveError;

/// One use of a module-scope name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub span: Span,
}

/// Attributes whose arguments are enumerants rather than expressions.
const ENUMERANT_ATTRS: [&str; 3] = ["builtin", "interpolate", "diagnostic"];

struct Collector<'m> {
    module: &'m Module,
    scopes: Vec<HashSet<String>>,
    seen: HashSet<String>,
    refs: Vec<Reference>,
}

impl<'m> Collector<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            scopes: Vec::new(),
            seen: HashSet::new(),
            refs: Vec::new(),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn name(&mut self, name: &str, span: Span) {
        if self.is_local(name) || !self.seen.insert(name.to_string()) {
            return;
        }
        self.refs.push(Reference {
            name: name.to_string(),
            span,
        });
    }

    fn expr(&mut self, id: ExprId) {
        let expr = self.module.expr(id);
        match &expr.kind {
            ExprKind::Ident(t) => self.name(&t.ident.node, t.ident.span),
            ExprKind::Call { callee, .. } => self.name(&callee.ident.node, callee.ident.span),
            _ => {}
        }
        for_each_child_expr(&expr.kind, |child| self.expr(child));
    }

    fn opt_expr(&mut self, id: Option<ExprId>) {
        if let Some(id) = id {
            self.expr(id);
        }
    }

    fn attrs(&mut self, attrs: &[Attribute]) {
        for attr in attrs {
            if ENUMERANT_ATTRS.contains(&attr.name.node.as_str()) {
                continue;
            }
            for arg in &attr.args {
                self.expr(*arg);
            }
        }
    }

    fn block(&mut self, block: &Block) {
        self.scopes.push(HashSet::new());
        self.stmts(&block.stmts);
        self.scopes.pop();
    }

    fn stmts(&mut self, stmts: &[StmtId]) {
        for stmt in stmts {
            self.stmt(*stmt);
        }
    }

    fn stmt(&mut self, id: StmtId) {
        let module = self.module;
        match &module.stmt(id).kind {
            StmtKind::Block(b) => self.block(b),
            StmtKind::Return(e) => self.opt_expr(*e),
            StmtKind::If(s) => {
                self.expr(s.cond);
                self.block(&s.then_block);
                if let Some(e) = s.else_stmt {
                    self.stmt(e);
                }
            }
            StmtKind::Switch(s) => {
                self.expr(s.selector);
                for clause in &s.clauses {
                    for sel in &clause.selectors {
                        if let CaseSelector::Expr(e) = sel {
                            self.expr(*e);
                        }
                    }
                    self.block(&clause.body);
                }
            }
            StmtKind::Loop(l) => {
                self.scopes.push(HashSet::new());
                self.stmts(&l.body.stmts);
                if let Some(c) = &l.continuing {
                    self.scopes.push(HashSet::new());
                    self.stmts(&c.body.stmts);
                    self.opt_expr(c.break_if);
                    self.scopes.pop();
                }
                self.scopes.pop();
            }
            StmtKind::For(f) => {
                self.scopes.push(HashSet::new());
                if let Some(init) = f.init {
                    self.stmt(init);
                }
                self.opt_expr(f.cond);
                if let Some(update) = f.update {
                    self.stmt(update);
                }
                self.block(&f.body);
                self.scopes.pop();
            }
            StmtKind::While(w) => {
                self.expr(w.cond);
                self.block(&w.body);
            }
            StmtKind::Decl(d) => {
                self.opt_expr(d.ty);
                self.opt_expr(d.init);
                self.declare(&d.name.node);
            }
            StmtKind::Assign(a) => {
                self.opt_expr(a.lhs);
                self.expr(a.rhs);
            }
            StmtKind::Increment(i) => self.expr(i.lhs),
            StmtKind::Call(e) | StmtKind::ConstAssert(e) => self.expr(*e),
            StmtKind::Break | StmtKind::Continue | StmtKind::Discard => {}
        }
    }
}

/// Module-scope names used by `decl`, in first-use order. Names bound by a
/// parameter or local declaration are skipped where they shadow.
pub fn references(module: &Module, decl: DeclId) -> Vec<Reference> {
    let mut c = Collector::new(module);
    match module.decl(decl) {
        GlobalDecl::Var(v) => {
            c.attrs(&v.attrs);
            c.opt_expr(v.ty);
            c.opt_expr(v.init);
        }
        GlobalDecl::Const(d) => {
            c.opt_expr(d.ty);
            c.expr(d.init);
        }
        GlobalDecl::Override(o) => {
            c.attrs(&o.attrs);
            c.opt_expr(o.ty);
            c.opt_expr(o.init);
        }
        GlobalDecl::Alias(a) => c.expr(a.ty),
        GlobalDecl::Struct(s) => {
            for m in &s.members {
                c.attrs(&m.attrs);
                c.expr(m.ty);
            }
        }
        GlobalDecl::Function(f) => {
            c.attrs(&f.attrs);
            c.scopes.push(HashSet::new());
            for p in &f.params {
                c.attrs(&p.attrs);
                c.expr(p.ty);
            }
            if let Some(ret) = &f.ret {
                c.attrs(&ret.attrs);
                c.expr(ret.ty);
            }
            for p in &f.params {
                c.declare(&p.name.node);
            }
            c.stmts(&f.body.stmts);
            c.scopes.pop();
        }
        GlobalDecl::ConstAssert(a) => c.expr(a.expr),
    }
    c.refs
}

/// Declarations in resolution order plus the cycles found on the way.
#[derive(Clone, Debug, Default)]
pub struct Ordering {
    pub order: Vec<DeclId>,
    pub cycles: Vec<ResolveError>,
    /// Declarations on a cycle; they are left out of `order`.
    pub cyclic: HashSet<DeclId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Sorter<'m> {
    module: &'m Module,
    names: HashMap<&'m str, DeclId>,
    marks: HashMap<DeclId, Mark>,
    path: Vec<DeclId>,
    out: Ordering,
}

impl Sorter<'_> {
    fn label(&self, id: DeclId) -> String {
        self.module
            .decl(id)
            .name()
            .map_or_else(|| "const_assert".to_string(), |n| n.node.clone())
    }

    fn visit(&mut self, id: DeclId) {
        match self.marks.get(&id) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                let start = self.path.iter().position(|d| *d == id).unwrap_or(0);
                let cycle: Vec<DeclId> = self.path[start..].to_vec();
                let mut chain: Vec<String> = cycle.iter().map(|d| self.label(*d)).collect();
                chain.push(self.label(id));
                let span = self
                    .module
                    .decl(id)
                    .name()
                    .map_or_else(|| self.module.decl(id).span(), |n| n.span);
                log::debug!("dependency cycle: {}", chain.join(" -> "));
                self.out.cycles.push(ResolveError::CyclicDependency { chain, span });
                self.out.cyclic.extend(cycle);
                return;
            }
            None => {}
        }
        self.marks.insert(id, Mark::Visiting);
        self.path.push(id);
        for r in references(self.module, id) {
            if let Some(&target) = self.names.get(r.name.as_str()) {
                self.visit(target);
            }
        }
        self.path.pop();
        self.marks.insert(id, Mark::Done);
        if !self.out.cyclic.contains(&id) {
            self.out.order.push(id);
        }
    }
}

/// Orders every declaration after the declarations it references, keeping
/// source order where there is no constraint. The first declaration of a
/// name is the one references bind to.
pub fn order(module: &Module) -> Ordering {
    let mut names = HashMap::new();
    for (id, decl) in module.decls.iter() {
        if let Some(name) = decl.name() {
            names.entry(name.node.as_str()).or_insert(id);
        }
    }
    let mut sorter = Sorter {
        module,
        names,
        marks: HashMap::new(),
        path: Vec::new(),
        out: Ordering::default(),
    };
    for id in module.decls.handles() {
        sorter.visit(id);
    }
    let mut out = sorter.out;
    let cyclic = out.cyclic.clone();
    out.order.retain(|d| !cyclic.contains(d));
    out
}

/// Every declaration reachable from `root` through references, `root`
/// included.
pub fn transitive(module: &Module, root: DeclId) -> HashSet<DeclId> {
    let mut names = HashMap::new();
    for (id, decl) in module.decls.iter() {
        if let Some(name) = decl.name() {
            names.entry(name.node.clone()).or_insert(id);
        }
    }
    let mut seen = HashSet::new();
    let mut work = vec![root];
    while let Some(id) = work.pop() {
        if !seen.insert(id) {
            continue;
        }
        for r in references(module, id) {
            if let Some(&target) = names.get(&r.name) {
                work.push(target);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Module {
        let (module, errors) = wgsl_parse::parse_source(src);
        assert!(errors.is_empty(), "{errors:?}");
        module
    }

    fn names(module: &Module, order: &[DeclId]) -> Vec<String> {
        order
            .iter()
            .filter_map(|d| module.decl(*d).name().map(|n| n.node.clone()))
            .collect()
    }

    #[test]
    fn uses_come_after_declarations() {
        let m = parse("fn a() -> i32 { return b(); } const c = 2; fn b() -> i32 { return c; }");
        let o = order(&m);
        assert_eq!(names(&m, &o.order), ["c", "b", "a"]);
        assert!(o.cycles.is_empty());
    }

    #[test]
    fn locals_shadow_globals() {
        let m = parse("const x = 1; fn f() { let x = 2; let y = x; }");
        let f = m.find_decl("f").unwrap();
        let refs: Vec<String> = references(&m, f).into_iter().map(|r| r.name).collect();
        assert!(!refs.contains(&"x".to_string()), "{refs:?}");
    }

    #[test]
    fn cycles_are_named_in_order() {
        let m = parse("const a = b; const b = a; const ok = 1;");
        let o = order(&m);
        assert_eq!(o.cycles.len(), 1);
        assert_eq!(
            o.cycles[0].to_string(),
            "cyclic dependency: a -> b -> a"
        );
        assert_eq!(names(&m, &o.order), ["ok"]);
    }

    #[test]
    fn recursion_is_a_cycle() {
        let m = parse("fn f() { f(); }");
        let o = order(&m);
        assert_eq!(o.cycles[0].to_string(), "cyclic dependency: f -> f");
    }
}
