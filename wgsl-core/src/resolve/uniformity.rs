#![forbid(unsafe_code)]

//! Uniformity analysis.
//!
//! Runs over resolved functions in dependency order, so a callee's summary
//! is known before its first call site. Every value carries a [`Taint`]: it
//! is either known to vary between invocations, or depends on some of the
//! enclosing function's parameters. Control flow carries a taint too; an
//! operation that needs uniform control flow reached under a non-uniform
//! taint is reported at the level set by `diagnostic(...)` or the
//! function's `@diagnostic` attribute.
//!
//! Variables accumulate taint: a store never makes a variable uniform
//! again.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use wgsl_ast::{
    Attribute, BinaryOp, DeclId, Directive, ExprId, ExprKind, GlobalDecl, LocalKind, Module,
    Span, StmtId, StmtKind, UnaryOp,
};
use wgsl_ir::{AddressSpace, IoAttributes};

use crate::info::{CallTarget, EvalStage, GlobalInfo, SemanticInfo};
use crate::symbols::Symbol;

/// Builtin values that are the same for every invocation in a dispatch.
const UNIFORM_BUILTINS: [&str; 3] = ["num_workgroups", "workgroup_id", "subgroup_size"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Level {
    Off,
    Info,
    Warning,
    Error,
}

impl Level {
    fn from_name(name: &str) -> Option<Level> {
        Some(match name {
            "off" => Level::Off,
            "info" => Level::Info,
            "warning" => Level::Warning,
            "error" => Level::Error,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rule {
    Derivative,
    Subgroup,
    /// Barriers are always errors; no diagnostic rule controls them.
    Barrier,
}

fn builtin_rule(name: &str) -> Option<Rule> {
    match name {
        "dpdx" | "dpdxCoarse" | "dpdxFine" | "dpdy" | "dpdyCoarse" | "dpdyFine" | "fwidth"
        | "fwidthCoarse" | "fwidthFine" | "textureSample" | "textureSampleBias"
        | "textureSampleCompare" => Some(Rule::Derivative),
        "subgroupAdd" | "subgroupMul" | "subgroupMin" | "subgroupMax" | "subgroupBroadcast"
        | "subgroupBallot" | "subgroupElect" => Some(Rule::Subgroup),
        "workgroupBarrier" | "storageBarrier" | "textureBarrier" | "workgroupUniformLoad" => {
            Some(Rule::Barrier)
        }
        _ => None,
    }
}

#[derive(Clone, Copy, Debug)]
struct Filters {
    derivative: Level,
    subgroup: Level,
}

impl Default for Filters {
    fn default() -> Self {
        Filters {
            derivative: Level::Error,
            subgroup: Level::Error,
        }
    }
}

impl Filters {
    fn set(&mut self, severity: &str, rule: &str) {
        let Some(level) = Level::from_name(severity) else { return };
        match rule {
            "derivative_uniformity" => self.derivative = level,
            "subgroup_uniformity" => self.subgroup = level,
            _ => {}
        }
    }

    fn level(&self, rule: Rule) -> Level {
        match rule {
            Rule::Derivative => self.derivative,
            Rule::Subgroup => self.subgroup,
            Rule::Barrier => Level::Error,
        }
    }

    fn for_module(module: &Module) -> Filters {
        let mut filters = Filters::default();
        for directive in &module.directives {
            if let Directive::Diagnostic(d) = directive {
                filters.set(&d.control.severity.node, &d.control.rule_name());
            }
        }
        filters
    }

    fn with_attrs(mut self, module: &Module, attrs: &[Attribute]) -> Filters {
        for attr in attrs.iter().filter(|a| a.name.node == "diagnostic") {
            if let [severity, rule] = attr.args.as_slice() {
                if let (Some(severity), Some(rule)) = (dotted(module, *severity), dotted(module, *rule)) {
                    self.set(&severity, &rule);
                }
            }
        }
        self
    }
}

/// `name` or `prefix.name` as written in a `@diagnostic` argument.
fn dotted(module: &Module, id: ExprId) -> Option<String> {
    match &module.expr(id).kind {
        ExprKind::Ident(t) if t.template_args.is_empty() => Some(t.ident.node.clone()),
        ExprKind::Member { base, member } => Some(format!("{}.{}", dotted(module, *base)?, member.node)),
        _ => None,
    }
}

/// What a value or a point in control flow depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Taint {
    non_uniform: bool,
    /// Parameters of the function being analyzed.
    params: BTreeSet<usize>,
}

impl Taint {
    fn non_uniform() -> Taint {
        Taint {
            non_uniform: true,
            params: BTreeSet::new(),
        }
    }

    fn param(index: usize) -> Taint {
        Taint {
            non_uniform: false,
            params: BTreeSet::from([index]),
        }
    }

    fn join(&mut self, other: &Taint) {
        self.non_uniform |= other.non_uniform;
        self.params.extend(other.params.iter().copied());
    }

    fn joined(mut self, other: &Taint) -> Taint {
        self.join(other);
        self
    }

    /// Rewrites a callee-relative taint in terms of the caller's arguments.
    fn substitute(&self, args: &[Taint]) -> Taint {
        let mut out = Taint {
            non_uniform: self.non_uniform,
            params: BTreeSet::new(),
        };
        for &i in &self.params {
            if let Some(arg) = args.get(i) {
                out.join(arg);
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
struct Requirement {
    rule: Rule,
    level: Level,
    /// The builtin that imposes it.
    builtin: String,
}

/// What a caller needs to know about a function.
#[derive(Clone, Debug, Default)]
struct Summary {
    /// Present when the function must be called from uniform control flow.
    requires: Option<Requirement>,
    /// Parameters that decide whether the requirement is reached.
    uniform_params: BTreeSet<usize>,
    ret: Taint,
    /// Values stored through pointer parameters.
    stores: BTreeMap<usize, Taint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Construct {
    Loop,
    Switch,
}

#[derive(Clone, Debug)]
pub(super) struct Finding {
    pub level: Level,
    pub span: Span,
    pub message: String,
}

/// Analyzes every resolved function. Findings at level `off` are dropped.
pub(super) fn analyze(module: &Module, info: &SemanticInfo) -> Vec<Finding> {
    let module_filters = Filters::for_module(module);
    let mut summaries: HashMap<DeclId, Summary> = HashMap::new();
    let mut findings = Vec::new();
    for &id in &info.order {
        let GlobalDecl::Function(f) = module.decl(id) else { continue };
        let Some(fi) = info.functions.get(&id) else { continue };
        let mut walker = Walker {
            module,
            info,
            summaries: &summaries,
            filters: module_filters.with_attrs(module, &f.attrs),
            func: id,
            entry: fi.stage.is_some(),
            vars: HashMap::new(),
            aliases: HashMap::new(),
            cf: Taint::default(),
            exits: Taint::default(),
            constructs: Vec::new(),
            summary: Summary::default(),
            findings: BTreeMap::new(),
        };
        walker.stmts(&f.body.stmts);
        log::trace!(
            "uniformity of '{}': requires {:?}",
            fi.name,
            walker.summary.requires.as_ref().map(|r| r.rule)
        );
        findings.extend(walker.findings.into_values());
        let summary = walker.summary;
        summaries.insert(id, summary);
    }
    findings
}

struct Walker<'a> {
    module: &'a Module,
    info: &'a SemanticInfo,
    summaries: &'a HashMap<DeclId, Summary>,
    filters: Filters,
    func: DeclId,
    entry: bool,
    /// Locals, and pointer parameters that were stored through.
    vars: HashMap<Symbol, Taint>,
    /// Pointer `let`s to the variable they point into.
    aliases: HashMap<Symbol, Symbol>,
    cf: Taint,
    /// Control flow at every `return`, `continue` or loop `break` so far.
    exits: Taint,
    constructs: Vec<Construct>,
    summary: Summary,
    /// Keyed by position so that loop iterations report once.
    findings: BTreeMap<(usize, String), Finding>,
}

impl<'a> Walker<'a> {
    fn stmts(&mut self, stmts: &[StmtId]) {
        for id in stmts {
            self.stmt(*id);
        }
    }

    fn stmt(&mut self, id: StmtId) {
        let module = self.module;
        match &module.stmt(id).kind {
            StmtKind::Block(b) => self.stmts(&b.stmts),
            StmtKind::Return(value) => {
                if let Some(v) = value {
                    let t = self.expr(*v).joined(&self.cf);
                    self.summary.ret.join(&t);
                }
                self.exit();
            }
            StmtKind::If(s) => {
                let c = self.expr(s.cond);
                let saved = self.cf.clone();
                self.cf.join(&c);
                self.stmts(&s.then_block.stmts);
                if let Some(e) = s.else_stmt {
                    self.cf = saved.clone().joined(&c).joined(&self.exits);
                    self.stmt(e);
                }
                self.cf = saved.joined(&self.exits);
            }
            StmtKind::Switch(s) => {
                let c = self.expr(s.selector);
                let saved = self.cf.clone();
                self.constructs.push(Construct::Switch);
                for clause in &s.clauses {
                    self.cf = saved.clone().joined(&c).joined(&self.exits);
                    self.stmts(&clause.body.stmts);
                }
                self.constructs.pop();
                self.cf = saved.joined(&self.exits);
            }
            StmtKind::Loop(l) => self.looped(|w| {
                w.stmts(&l.body.stmts);
                if let Some(c) = &l.continuing {
                    w.stmts(&c.body.stmts);
                    if let Some(cond) = c.break_if {
                        w.exit_if(cond);
                    }
                }
            }),
            StmtKind::For(f) => {
                if let Some(init) = f.init {
                    self.stmt(init);
                }
                self.looped(|w| {
                    if let Some(cond) = f.cond {
                        w.exit_if(cond);
                    }
                    w.stmts(&f.body.stmts);
                    if let Some(update) = f.update {
                        w.stmt(update);
                    }
                });
            }
            StmtKind::While(l) => self.looped(|w| {
                w.exit_if(l.cond);
                w.stmts(&l.body.stmts);
            }),
            StmtKind::Break => {
                if self.constructs.last() == Some(&Construct::Loop) {
                    self.exit();
                }
            }
            StmtKind::Continue => self.exit(),
            // Demotes to a helper invocation; the others keep running.
            StmtKind::Discard => {}
            StmtKind::Decl(d) => {
                let key = Symbol::Local(id);
                let Some(init) = d.init else {
                    let cf = self.cf.clone();
                    self.vars.entry(key).or_default().join(&cf);
                    return;
                };
                if d.kind == LocalKind::Const {
                    return;
                }
                let t = self.expr(init).joined(&self.cf);
                if d.kind == LocalKind::Let && self.is_pointer(init) {
                    if let Some(root) = self.root(init) {
                        self.aliases.insert(key, root);
                    }
                }
                self.vars.entry(key).or_default().join(&t);
            }
            StmtKind::Assign(a) => {
                let mut t = self.expr(a.rhs).joined(&self.cf);
                let Some(lhs) = a.lhs else { return };
                if a.op.is_some() {
                    t.join(&self.expr(lhs));
                } else {
                    t.join(&self.indices(lhs));
                }
                if let Some(root) = self.root(lhs) {
                    self.store(root, t);
                }
            }
            StmtKind::Increment(s) => {
                let t = self.expr(s.lhs).joined(&self.cf);
                if let Some(root) = self.root(s.lhs) {
                    self.store(root, t);
                }
            }
            StmtKind::Call(e) => {
                self.expr(*e);
            }
            StmtKind::ConstAssert(_) => {}
        }
    }

    /// Runs `body` until variables and exits stop changing.
    fn looped(&mut self, body: impl Fn(&mut Self)) {
        let saved = self.cf.clone();
        self.constructs.push(Construct::Loop);
        loop {
            let vars = self.vars.clone();
            let exits = self.exits.clone();
            self.cf = saved.clone().joined(&self.exits);
            body(self);
            if self.vars == vars && self.exits == exits {
                break;
            }
        }
        self.constructs.pop();
        self.cf = saved.joined(&self.exits);
    }

    /// A loop condition: the loop is left where it is false.
    fn exit_if(&mut self, cond: ExprId) {
        let c = self.expr(cond);
        self.cf.join(&c);
        self.exit();
    }

    fn exit(&mut self) {
        let cf = self.cf.clone();
        self.exits.join(&cf);
    }

    fn store(&mut self, root: Symbol, value: Taint) {
        match root {
            Symbol::Local(_) => self.vars.entry(root).or_default().join(&value),
            Symbol::Param(_, i) => {
                self.summary.stores.entry(i).or_default().join(&value);
                self.vars.entry(root).or_default().join(&value);
            }
            Symbol::Global(_) | Symbol::Poisoned => {}
        }
    }

    fn is_pointer(&self, id: ExprId) -> bool {
        self.info
            .type_of(id)
            .is_some_and(|ty| self.info.types.is_pointer(ty))
    }

    /// The variable an lvalue or pointer expression refers into.
    fn root(&self, id: ExprId) -> Option<Symbol> {
        match &self.module.expr(id).kind {
            ExprKind::Ident(_) => {
                let symbol = self.info.symbol(id)?;
                Some(self.aliases.get(&symbol).copied().unwrap_or(symbol))
            }
            ExprKind::Member { base, .. } | ExprKind::Index { base, .. } => self.root(*base),
            ExprKind::Unary {
                op: UnaryOp::Deref | UnaryOp::AddressOf,
                expr,
            } => self.root(*expr),
            _ => None,
        }
    }

    /// Taint of the index expressions along an lvalue.
    fn indices(&mut self, id: ExprId) -> Taint {
        let module = self.module;
        match &module.expr(id).kind {
            ExprKind::Index { base, index } => {
                let i = self.expr(*index);
                self.indices(*base).joined(&i)
            }
            ExprKind::Member { base, .. } | ExprKind::Unary { expr: base, .. } => self.indices(*base),
            _ => Taint::default(),
        }
    }

    fn expr(&mut self, id: ExprId) -> Taint {
        let module = self.module;
        let stage = self.info.expr(id).map(|e| e.stage);
        if matches!(stage, Some(EvalStage::Const | EvalStage::Override)) {
            return Taint::default();
        }
        match &module.expr(id).kind {
            ExprKind::Ident(_) => self.ident(id),
            ExprKind::Literal(_) => Taint::default(),
            ExprKind::Call { args, .. } => self.call(id, args),
            ExprKind::Binary {
                op: BinaryOp::LogicalAnd | BinaryOp::LogicalOr,
                lhs,
                rhs,
            } => {
                let l = self.expr(*lhs);
                let saved = self.cf.clone();
                self.cf.join(&l);
                let r = self.expr(*rhs);
                self.cf = saved;
                l.joined(&r)
            }
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Index { base: lhs, index: rhs } => {
                let l = self.expr(*lhs);
                let r = self.expr(*rhs);
                l.joined(&r)
            }
            ExprKind::Unary { expr, .. }
            | ExprKind::Member { base: expr, .. }
            | ExprKind::Bitcast { expr, .. } => self.expr(*expr),
        }
    }

    fn ident(&self, id: ExprId) -> Taint {
        let Some(symbol) = self.info.symbol(id) else {
            return Taint::default();
        };
        let symbol = self.aliases.get(&symbol).copied().unwrap_or(symbol);
        let stored = self.vars.get(&symbol).cloned().unwrap_or_default();
        match symbol {
            Symbol::Local(_) => stored,
            Symbol::Param(_, i) if self.entry => self.entry_param(i),
            Symbol::Param(_, i) => Taint::param(i).joined(&stored),
            Symbol::Global(decl) => match self.info.globals.get(&decl) {
                Some(GlobalInfo::Var { space, access, .. })
                    if *space != AddressSpace::Uniform
                        && *space != AddressSpace::Handle
                        && access.can_write() =>
                {
                    Taint::non_uniform()
                }
                _ => Taint::default(),
            },
            Symbol::Poisoned => Taint::default(),
        }
    }

    fn entry_param(&self, index: usize) -> Taint {
        let uniform = |io: &IoAttributes| {
            io.builtin
                .as_deref()
                .is_some_and(|b| UNIFORM_BUILTINS.contains(&b))
        };
        let Some(param) = self
            .info
            .functions
            .get(&self.func)
            .and_then(|f| f.params.get(index))
        else {
            return Taint::non_uniform();
        };
        let all_uniform = match self.info.struct_io.get(&param.ty) {
            Some(members) => members.iter().all(uniform),
            None => uniform(&param.io),
        };
        if all_uniform {
            Taint::default()
        } else {
            Taint::non_uniform()
        }
    }

    fn call(&mut self, id: ExprId, args: &[ExprId]) -> Taint {
        let span = self.module.expr(id).span;
        let taints: Vec<Taint> = args.iter().map(|a| self.expr(*a)).collect();
        match self.info.calls.get(&id) {
            Some(CallTarget::Builtin { name }) => self.builtin_call(name, span, taints),
            Some(CallTarget::Function(callee)) => self.function_call(*callee, span, args, &taints),
            _ => taints.iter().fold(Taint::default(), |acc, t| acc.joined(t)),
        }
    }

    fn builtin_call(&mut self, name: &str, span: Span, args: Vec<Taint>) -> Taint {
        match builtin_rule(name) {
            Some(rule) => {
                let requirement = Requirement {
                    rule,
                    level: self.filters.level(rule),
                    builtin: name.to_string(),
                };
                let cf = self.cf.clone();
                self.require(&requirement, &cf, span, || {
                    format!("'{name}' must only be called from uniform control flow")
                });
                if rule == Rule::Barrier {
                    Taint::default()
                } else {
                    Taint::non_uniform()
                }
            }
            None if name == "arrayLength" => Taint::default(),
            None => args.iter().fold(Taint::default(), |acc, t| acc.joined(t)),
        }
    }

    fn function_call(&mut self, callee: DeclId, span: Span, args: &[ExprId], taints: &[Taint]) -> Taint {
        let (summaries, info) = (self.summaries, self.info);
        let Some(summary) = summaries.get(&callee) else {
            return taints.iter().fold(Taint::default(), |acc, t| acc.joined(t));
        };
        let name = info
            .functions
            .get(&callee)
            .map(|f| f.name.as_str())
            .unwrap_or("function");
        if let Some(requirement) = &summary.requires {
            let cf = self.cf.clone();
            self.require(requirement, &cf, span, || {
                format!(
                    "'{name}' must only be called from uniform control flow, as it calls '{}'",
                    requirement.builtin
                )
            });
            for &i in &summary.uniform_params {
                let (Some(arg), Some(t)) = (args.get(i), taints.get(i)) else { continue };
                let arg_span = self.module.expr(*arg).span;
                self.require(requirement, t, arg_span, || {
                    format!(
                        "argument {} of '{name}' must be uniform, as it decides whether '{}' is called",
                        i + 1,
                        requirement.builtin
                    )
                });
            }
        }
        for (i, stored) in &summary.stores {
            let Some(arg) = args.get(*i) else { continue };
            if let Some(root) = self.root(*arg) {
                let t = stored.substitute(taints).joined(&self.cf);
                self.store(root, t);
            }
        }
        summary.ret.substitute(taints)
    }

    /// Records that reaching here needs `taint` to be uniform.
    fn require(
        &mut self,
        requirement: &Requirement,
        taint: &Taint,
        span: Span,
        message: impl FnOnce() -> String,
    ) {
        if requirement.level == Level::Off {
            return;
        }
        let stronger = self
            .summary
            .requires
            .as_ref()
            .is_none_or(|r| r.level < requirement.level);
        if stronger {
            self.summary.requires = Some(requirement.clone());
        }
        self.summary.uniform_params.extend(taint.params.iter().copied());
        if taint.non_uniform {
            let message = message();
            self.findings.insert(
                (span.offset(), message.clone()),
                Finding {
                    level: requirement.level,
                    span,
                    message,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use wgsl_ast::{Diagnostics, Severity};

    use crate::error::ResolveError;
    use crate::features::FeatureSet;

    fn check(src: &str) -> (Result<(), ResolveError>, Diagnostics) {
        let (module, errors) = wgsl_parse::parse_source(src);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        let mut diags = Diagnostics::for_source("test.wgsl", src);
        let result = crate::resolve(&module, &FeatureSet::new(), &mut diags).map(|_| ());
        (result, diags)
    }

    fn non_uniform(src: &str) -> String {
        match check(src).0 {
            Err(ResolveError::NonUniform { message, .. }) => message,
            other => panic!("expected a uniformity error, got {other:?}"),
        }
    }

    fn uniform(src: &str) {
        let (result, diags) = check(src);
        assert!(result.is_ok(), "{result:?}");
        assert!(diags.is_empty(), "{:?}", diags.into_vec());
    }

    const BRANCHY: &str = "\
@fragment fn fs(@location(0) x: f32) -> @location(0) f32 {
    var d = 0.0;
    if x > 0.0 { d = dpdx(x); }
    return d;
}";

    #[test]
    fn derivative_under_varying_condition() {
        let message = non_uniform(BRANCHY);
        assert_eq!(message, "'dpdx' must only be called from uniform control flow");
    }

    #[test]
    fn uniform_buffers_and_constants_keep_control_flow_uniform() {
        uniform(
            "@group(0) @binding(0) var<uniform> k: f32;
             const limit = 2.0;
             @fragment fn fs(@location(0) x: f32) -> @location(0) f32 {
                 if k > limit { return dpdx(x); }
                 return fwidth(x);
             }",
        );
    }

    #[test]
    fn writable_globals_vary() {
        let message = non_uniform(
            "var<private> flag: bool;
             @fragment fn fs(@location(0) x: f32) -> @location(0) f32 {
                 if flag { return dpdy(x); }
                 return 0.0;
             }",
        );
        assert!(message.contains("dpdy"), "{message}");
    }

    #[test]
    fn diagnostic_directive_sets_the_severity() {
        uniform(&format!("diagnostic(off, derivative_uniformity);\n{BRANCHY}"));

        let (result, diags) = check(&format!("diagnostic(warning, derivative_uniformity);\n{BRANCHY}"));
        assert!(result.is_ok());
        let found: Vec<_> = diags.iter().map(|d| d.severity).collect();
        assert_eq!(found, [Severity::Warning]);

        let (result, diags) = check(&format!("diagnostic(info, derivative_uniformity);\n{BRANCHY}"));
        assert!(result.is_ok());
        let found: Vec<_> = diags.iter().map(|d| d.severity).collect();
        assert_eq!(found, [Severity::Note]);
    }

    #[test]
    fn function_attribute_overrides_the_directive() {
        let src = BRANCHY.replace("@fragment", "@fragment @diagnostic(error, derivative_uniformity)");
        non_uniform(&format!("diagnostic(off, derivative_uniformity);\n{src}"));

        let src = BRANCHY.replace("@fragment", "@fragment @diagnostic(off, derivative_uniformity)");
        uniform(&src);
    }

    #[test]
    fn callers_inherit_the_requirement() {
        let message = non_uniform(
            "fn helper(v: f32) -> f32 { return dpdx(v); }
             @fragment fn fs(@location(0) x: f32) -> @location(0) f32 {
                 if x > 0.0 { return helper(x); }
                 return 0.0;
             }",
        );
        assert_eq!(
            message,
            "'helper' must only be called from uniform control flow, as it calls 'dpdx'"
        );
    }

    #[test]
    fn parameters_that_guard_a_derivative_must_be_uniform() {
        let helper = "fn helper(c: bool, v: f32) -> f32 { if c { return dpdx(v); } return 0.0; }\n";
        let message = non_uniform(&format!(
            "{helper}@fragment fn fs(@location(0) x: f32) -> @location(0) f32 {{ return helper(x > 0.0, x); }}"
        ));
        assert!(message.starts_with("argument 1 of 'helper' must be uniform"), "{message}");

        uniform(&format!(
            "{helper}@group(0) @binding(0) var<uniform> k: f32;\n\
             @fragment fn fs(@location(0) x: f32) -> @location(0) f32 {{ return helper(k > 0.0, x); }}"
        ));
    }

    #[test]
    fn early_return_makes_the_rest_non_uniform() {
        non_uniform(
            "@fragment fn fs(@location(0) x: f32) -> @location(0) f32 {
                 if x > 0.0 { return 0.0; }
                 return dpdx(x);
             }",
        );
    }

    #[test]
    fn short_circuit_operands_run_conditionally() {
        non_uniform(
            "@fragment fn fs(@location(0) x: f32) -> @location(0) f32 {
                 if x > 0.0 && dpdx(x) > 1.0 { return 1.0; }
                 return 0.0;
             }",
        );
    }

    #[test]
    fn barriers_ignore_diagnostic_filters() {
        let message = non_uniform(
            "diagnostic(off, derivative_uniformity);
             @compute @workgroup_size(64)
             fn main(@builtin(local_invocation_index) i: u32) {
                 for (var j = 0u; j < i; j++) { workgroupBarrier(); }
             }",
        );
        assert!(message.contains("workgroupBarrier"), "{message}");

        uniform(
            "@compute @workgroup_size(64)
             fn main(@builtin(workgroup_id) wg: vec3<u32>) {
                 for (var j = 0u; j < wg.x; j++) { workgroupBarrier(); }
             }",
        );
    }

    #[test]
    fn taint_flows_through_variables_and_pointers() {
        non_uniform(
            "@compute @workgroup_size(64)
             fn main(@builtin(local_invocation_index) i: u32) {
                 var m = 1u;
                 m = m + i;
                 if m > 3u { workgroupBarrier(); }
             }",
        );
        non_uniform(
            "fn set(p: ptr<function, u32>, v: u32) { *p = v; }
             @compute @workgroup_size(64)
             fn main(@builtin(local_invocation_index) i: u32) {
                 var m = 0u;
                 set(&m, i);
                 if m > 0u { workgroupBarrier(); }
             }",
        );
        uniform(
            "fn set(p: ptr<function, u32>, v: u32) { *p = v; }
             @compute @workgroup_size(64)
             fn main(@builtin(local_invocation_index) i: u32) {
                 var m = 0u;
                 set(&m, 4u);
                 if m > 0u { workgroupBarrier(); }
             }",
        );
    }

    #[test]
    fn switch_break_rejoins_control_flow() {
        uniform(
            "@group(0) @binding(0) var<uniform> k: u32;
             @compute @workgroup_size(64)
             fn main(@builtin(local_invocation_index) i: u32) {
                 switch k {
                     case 0u: { break; }
                     default: {}
                 }
                 workgroupBarrier();
             }",
        );
    }
}
