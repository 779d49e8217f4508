#![forbid(unsafe_code)]

//! Name resolution and type checking.
//!
//! The resolver walks module-scope declarations in dependency order, binds
//! every identifier, infers and checks every expression, and evaluates
//! const-expressions. Results land in a [`SemanticInfo`]; the syntax tree is
//! left untouched. A declaration that fails is poisoned so that its uses do
//! not report the same problem again.

mod entry;
mod expr;
mod stmt;
mod ty;
mod uniformity;

use std::collections::{HashMap, HashSet};

use log::debug;
use wgsl_ast::{
    DeclId, DiagnosticControl, Diagnostics, Severity, Directive, ExprId, GlobalDecl, Module, OverrideDecl,
    Span, StructDecl, VarDecl, span_end,
};
use wgsl_ir::{AddressSpace, BindingPoint, ConstError, MemberDecl, Scalar, Type, TypeId};

use crate::builtins::BuiltinTable;
use crate::dependency;
use crate::error::ResolveError;
use crate::features::{Feature, FeatureSet};
use crate::info::{EvalStage, FunctionInfo, GlobalInfo, ParamInfo, SemanticInfo};
use crate::symbols::{Symbol, SymbolTable, closest};

pub(crate) use expr::{ast_binop, ast_unop};

type Result<T> = std::result::Result<T, ResolveError>;

/// Diagnostic rules this implementation recognizes.
const KNOWN_RULES: [&str; 2] = ["derivative_uniformity", "subgroup_uniformity"];

const SEVERITIES: [&str; 4] = ["error", "warning", "info", "off"];

/// Statement kinds `break` and `continue` care about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Construct {
    Loop,
    Switch,
    Continuing,
}

struct FnContext {
    name: String,
    ret: Option<TypeId>,
    constructs: Vec<Construct>,
}

struct Resolver<'a> {
    module: &'a Module,
    features: &'a FeatureSet,
    builtins: &'a BuiltinTable,
    info: SemanticInfo,
    symbols: SymbolTable,
    poisoned: HashSet<DeclId>,
    errors: Vec<ResolveError>,
    /// Warnings and notes; errors go to `errors`.
    remarks: Vec<(Severity, Span, String)>,
    func: Option<FnContext>,
    override_ids: HashMap<u32, Span>,
}

/// Resolves `module` against the standard builtin table. Every error and
/// warning is appended to `diagnostics` in source order; the first error is
/// also returned.
pub fn resolve(
    module: &Module,
    features: &FeatureSet,
    diagnostics: &mut Diagnostics,
) -> Result<SemanticInfo> {
    let builtins = BuiltinTable::standard();
    resolve_with_builtins(module, features, &builtins, diagnostics)
}

/// Like [`resolve`], with a caller-provided builtin table.
pub fn resolve_with_builtins(
    module: &Module,
    features: &FeatureSet,
    builtins: &BuiltinTable,
    diagnostics: &mut Diagnostics,
) -> Result<SemanticInfo> {
    let mut resolver = Resolver {
        module,
        features,
        builtins,
        info: SemanticInfo::default(),
        symbols: SymbolTable::new(),
        poisoned: HashSet::new(),
        errors: Vec::new(),
        remarks: Vec::new(),
        func: None,
        override_ids: HashMap::new(),
    };
    resolver.run();
    resolver.finish(diagnostics)
}

fn const_error(span: Span, e: ConstError) -> ResolveError {
    ResolveError::ConstEvaluationOverflow {
        message: e.0,
        span,
    }
}

impl<'a> Resolver<'a> {
    fn run(&mut self) {
        let module = self.module;
        self.directives();

        let mut skipped = HashSet::new();
        for (id, decl) in module.decls.iter() {
            let Some(name) = decl.name() else { continue };
            if let Err(previous) = self.symbols.declare(&name.node, Symbol::Global(id), name.span) {
                self.errors.push(ResolveError::Redeclaration {
                    name: name.node.clone(),
                    span: name.span,
                    previous,
                });
                skipped.insert(id);
            }
        }

        let ordering = dependency::order(module);
        self.errors.extend(ordering.cycles);
        self.poisoned.extend(ordering.cyclic);

        for id in ordering.order {
            if skipped.contains(&id) {
                continue;
            }
            match self.global(id) {
                Ok(()) => self.info.order.push(id),
                Err(e) => {
                    debug!("poisoning '{}': {e}", module.decl(id).kind_name());
                    self.poisoned.insert(id);
                    self.errors.push(e);
                }
            }
        }

        if self.errors.is_empty() {
            self.uniformity();
        }
    }

    fn uniformity(&mut self) {
        for finding in uniformity::analyze(self.module, &self.info) {
            let severity = match finding.level {
                uniformity::Level::Error => {
                    self.errors.push(ResolveError::NonUniform {
                        message: finding.message,
                        span: finding.span,
                    });
                    continue;
                }
                uniformity::Level::Warning => Severity::Warning,
                uniformity::Level::Info => Severity::Note,
                uniformity::Level::Off => continue,
            };
            self.remarks.push((severity, finding.span, finding.message));
        }
    }

    fn finish(mut self, diagnostics: &mut Diagnostics) -> Result<SemanticInfo> {
        type Report<'e> = std::result::Result<&'e ResolveError, (Severity, Span, String)>;
        let mut reports: Vec<(usize, Report<'_>)> = self
            .errors
            .iter()
            .filter(|e| !e.is_poisoned())
            .map(|e| (e.span().offset(), Ok(e)))
            .collect();
        let remarks = std::mem::take(&mut self.remarks);
        for (severity, span, message) in remarks {
            reports.push((span.offset(), Err((severity, span, message))));
        }
        reports.sort_by_key(|r| r.0);
        for (_, report) in reports {
            match report {
                Ok(e) => e.report(diagnostics),
                Err((Severity::Note, span, message)) => diagnostics.note(span, message),
                Err((_, span, message)) => diagnostics.warning(span, message),
            }
        }

        self.errors.sort_by_key(|e| e.span().offset());
        debug!(
            "resolved {} declarations, {} errors",
            self.info.order.len(),
            self.errors.iter().filter(|e| !e.is_poisoned()).count()
        );
        match self.errors.into_iter().find(|e| !e.is_poisoned()) {
            Some(e) => Err(e),
            None => Ok(self.info),
        }
    }

    fn warn(&mut self, span: Span, message: impl Into<String>) {
        self.remarks.push((Severity::Warning, span, message.into()));
    }

    fn directives(&mut self) {
        let module = self.module;
        for directive in &module.directives {
            match directive {
                Directive::Enable(d) => {
                    for name in &d.names {
                        if !FeatureSet::is_known_extension(&name.node) {
                            self.errors.push(ResolveError::validation(
                                name.span,
                                format!("unknown extension '{}'", name.node),
                            ));
                        } else if !self.features.is_enabled(&name.node) {
                            self.errors.push(ResolveError::validation(
                                name.span,
                                format!("extension '{}' is not supported", name.node),
                            ));
                        } else {
                            self.info.extensions.insert(name.node.clone());
                        }
                    }
                }
                Directive::Requires(d) => {
                    for name in &d.names {
                        if !FeatureSet::is_known_language_feature(&name.node) {
                            self.errors.push(ResolveError::validation(
                                name.span,
                                format!("unknown language feature '{}'", name.node),
                            ));
                        } else if !self.features.is_enabled(&name.node) {
                            self.errors.push(ResolveError::validation(
                                name.span,
                                format!("language feature '{}' is not supported", name.node),
                            ));
                        }
                    }
                }
                Directive::Diagnostic(d) => {
                    if let Err(e) = self.diagnostic_control(&d.control) {
                        self.errors.push(e);
                    }
                }
            }
        }
    }

    fn diagnostic_control(&mut self, control: &DiagnosticControl) -> Result<()> {
        self.diagnostic_rule(&control.severity.node, control.severity.span, &control.rule_name(), control.span)
    }

    fn diagnostic_rule(&mut self, severity: &str, severity_span: Span, rule: &str, span: Span) -> Result<()> {
        if !SEVERITIES.contains(&severity) {
            return Err(ResolveError::validation(
                severity_span,
                format!(
                    "invalid diagnostic severity '{severity}'; expected 'error', 'warning', 'info' or 'off'"
                ),
            ));
        }
        if !rule.contains('.') && !KNOWN_RULES.contains(&rule) {
            self.warn(span, format!("unrecognized diagnostic rule '{rule}'"));
        }
        Ok(())
    }

    /// Fails unless `feature` is turned on: extensions by an `enable`
    /// directive, language features by the compilation's feature set.
    fn require(&self, feature: Feature, what: impl Into<String>, span: Span) -> Result<()> {
        let on = if feature.is_extension() {
            self.info.is_enabled(feature.name())
        } else {
            self.features.is_enabled(feature.name())
        };
        if on {
            Ok(())
        } else {
            Err(ResolveError::FeatureNotEnabled {
                what: what.into(),
                directive: feature.directive(),
                span,
            })
        }
    }

    fn display(&self, ty: TypeId) -> String {
        self.info.types.display(ty)
    }

    fn unresolved(&self, name: &str, span: Span) -> ResolveError {
        let candidates = self
            .symbols
            .visible_names()
            .chain(self.builtins.function_names())
            .chain(ty::PREDECLARED_TYPES.iter().copied());
        ResolveError::UnresolvedIdentifier {
            name: name.to_string(),
            suggestion: closest(name, candidates),
            span,
        }
    }

    // -----------------------------------------------------------------------
    // Module-scope declarations
    // -----------------------------------------------------------------------

    fn global(&mut self, id: DeclId) -> Result<()> {
        let module = self.module;
        match module.decl(id) {
            GlobalDecl::Var(v) => self.global_var(id, v),
            GlobalDecl::Const(c) => {
                let init = self.expr(c.init)?;
                if self.stage(c.init) != EvalStage::Const {
                    return Err(ResolveError::validation(
                        module.expr(c.init).span,
                        "'const' initializer must be a const-expression",
                    ));
                }
                let ty = match c.ty {
                    Some(t) => {
                        let t = self.resolve_type(t)?;
                        self.convert(c.init, t)?;
                        t
                    }
                    None => self.value_type(init),
                };
                let value = self.info.value_of(c.init).cloned().ok_or_else(|| {
                    ResolveError::validation(c.span, "'const' initializer has no value")
                })?;
                self.info.globals.insert(id, GlobalInfo::Const { ty, value });
                Ok(())
            }
            GlobalDecl::Override(o) => self.global_override(id, o),
            GlobalDecl::Alias(a) => {
                let ty = self.resolve_type(a.ty)?;
                self.info.globals.insert(id, GlobalInfo::Type(ty));
                Ok(())
            }
            GlobalDecl::Struct(s) => self.structure(id, s),
            GlobalDecl::Function(f) => self.function(id, f),
            GlobalDecl::ConstAssert(a) => {
                self.const_assert(a.expr, a.span)?;
                self.info.globals.insert(id, GlobalInfo::ConstAssert);
                Ok(())
            }
        }
    }

    fn const_assert(&mut self, expr: ExprId, span: Span) -> Result<()> {
        let ty = self.expr(expr)?;
        let ty = self.value_type(ty);
        if !self.info.types.is_bool(ty) {
            return Err(ResolveError::TypeMismatch {
                expected: "bool".to_string(),
                found: self.display(ty),
                span: self.module.expr(expr).span,
            });
        }
        match self.info.value_of(expr).and_then(|v| v.as_bool()) {
            Some(true) => Ok(()),
            Some(false) => Err(ResolveError::validation(span, "const assertion failed")),
            None => Err(ResolveError::validation(
                self.module.expr(expr).span,
                "const assertion requires a const-expression",
            )),
        }
    }

    fn global_var(&mut self, id: DeclId, v: &VarDecl) -> Result<()> {
        self.check_attrs(&v.attrs, entry::VAR_ATTRS, "a module-scope 'var'")?;
        let (space, access) = self.var_template(&v.template_args)?;
        let declared = match v.ty {
            Some(t) => Some(self.resolve_type(t)?),
            None => None,
        };
        if let Some(init) = v.init {
            self.expr(init)?;
        }
        let store = match (declared, v.init) {
            (Some(t), Some(init)) => {
                self.convert(init, t)?;
                t
            }
            (Some(t), None) => t,
            (None, Some(init)) => self.concretize(init)?,
            (None, None) => {
                return Err(ResolveError::validation(
                    v.name.span,
                    "'var' declaration requires a type or initializer",
                ));
            }
        };
        let types = &self.info.types;
        let handle = types.is_handle(store);
        let space = match space {
            Some(_) if handle => {
                return Err(ResolveError::address_space(
                    v.span,
                    format!("variables of type '{}' must not specify an address space", self.display(store)),
                ));
            }
            Some(s) => s,
            None if handle => AddressSpace::Handle,
            None => {
                return Err(ResolveError::address_space(
                    v.span,
                    "module-scope 'var' declarations that are not of texture or sampler types must provide an address space",
                ));
            }
        };
        if space == AddressSpace::Function {
            return Err(ResolveError::address_space(
                v.span,
                "module-scope 'var' must not use the 'function' address space",
            ));
        }
        let access = match access {
            Some(_) if space != AddressSpace::Storage => {
                return Err(ResolveError::address_space(
                    v.span,
                    "only variables in the 'storage' address space may specify an access mode",
                ));
            }
            Some(wgsl_ir::Access::Write) => {
                return Err(ResolveError::address_space(
                    v.span,
                    "access mode 'write' is not valid for the 'storage' address space",
                ));
            }
            Some(a) => a,
            None => space.default_access(),
        };
        if let Some(init) = v.init {
            if space != AddressSpace::Private {
                return Err(ResolveError::address_space(
                    self.module.expr(init).span,
                    format!("'var' in the '{space}' address space must not have an initializer"),
                ));
            }
            if self.stage(init) == EvalStage::Runtime {
                return Err(ResolveError::validation(
                    self.module.expr(init).span,
                    "module-scope 'var' initializer must be a const-expression or override-expression",
                ));
            }
        }
        self.check_store_type(store, space, access, v.span)?;

        let binding = self.binding(&v.attrs, space, v.span)?;
        self.info.globals.insert(
            id,
            GlobalInfo::Var {
                store,
                space,
                access,
                binding,
            },
        );
        Ok(())
    }

    /// Whether a variable in `space` may hold values of type `store`.
    fn check_store_type(
        &self,
        store: TypeId,
        space: AddressSpace,
        access: wgsl_ir::Access,
        span: Span,
    ) -> Result<()> {
        let types = &self.info.types;
        let atomic = self.contains_atomic(store);
        let ok = match space {
            AddressSpace::Storage => types.is_host_shareable(store) && (!atomic || access.can_write()),
            AddressSpace::Uniform => {
                types.is_host_shareable(store) && !types.has_runtime_array(store) && !atomic
            }
            AddressSpace::Workgroup => !types.is_handle(store) && !types.has_runtime_array(store),
            AddressSpace::Private | AddressSpace::Function => types.is_constructible(store),
            AddressSpace::Handle => types.is_handle(store),
        };
        if ok {
            Ok(())
        } else {
            Err(ResolveError::address_space(
                span,
                format!(
                    "type '{}' cannot be used in address space '{space}'",
                    self.display(store)
                ),
            ))
        }
    }

    fn contains_atomic(&self, ty: TypeId) -> bool {
        match self.info.types.get(ty) {
            Type::Atomic(_) => true,
            Type::Array { base, .. } => self.contains_atomic(*base),
            Type::Struct(s) => s.members.iter().any(|m| self.contains_atomic(m.ty)),
            _ => false,
        }
    }

    fn binding(
        &mut self,
        attrs: &[wgsl_ast::Attribute],
        space: AddressSpace,
        span: Span,
    ) -> Result<Option<BindingPoint>> {
        let group = match wgsl_ast::find_attr(attrs, "group") {
            Some(a) => Some(self.attr_u32(a)?),
            None => None,
        };
        let binding = match wgsl_ast::find_attr(attrs, "binding") {
            Some(a) => Some(self.attr_u32(a)?),
            None => None,
        };
        let resource = matches!(
            space,
            AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Handle
        );
        match (group, binding) {
            (Some(group), Some(binding)) if resource => Ok(Some(BindingPoint { group, binding })),
            _ if resource => Err(ResolveError::attribute(
                span,
                "resource variables require '@group' and '@binding' attributes",
            )),
            (None, None) => Ok(None),
            _ => Err(ResolveError::attribute(
                span,
                "non-resource variables must not have '@group' or '@binding' attributes",
            )),
        }
    }

    fn global_override(&mut self, id: DeclId, o: &OverrideDecl) -> Result<()> {
        self.check_attrs(&o.attrs, entry::OVERRIDE_ATTRS, "an 'override'")?;
        if let Some(init) = o.init {
            self.expr(init)?;
            if self.stage(init) == EvalStage::Runtime {
                return Err(ResolveError::validation(
                    self.module.expr(init).span,
                    "'override' initializer must be an override-expression",
                ));
            }
        }
        let ty = match (o.ty, o.init) {
            (Some(t), init) => {
                let t = self.resolve_type(t)?;
                if let Some(init) = init {
                    self.convert(init, t)?;
                }
                t
            }
            (None, Some(init)) => self.concretize(init)?,
            (None, None) => {
                return Err(ResolveError::validation(
                    o.name.span,
                    "'override' declaration requires a type or initializer",
                ));
            }
        };
        let concrete_scalar = self
            .info
            .types
            .as_scalar(ty)
            .is_some_and(|s| !s.is_abstract());
        if !concrete_scalar {
            return Err(ResolveError::validation(
                o.span,
                format!("'override' type must be a concrete scalar, found '{}'", self.display(ty)),
            ));
        }
        let id_attr = match wgsl_ast::find_attr(&o.attrs, "id") {
            Some(a) => {
                let value = self.attr_u32(a)?;
                if value > 65535 {
                    return Err(ResolveError::attribute(
                        a.span,
                        "'@id' value must be between 0 and 65535",
                    ));
                }
                if let Some(previous) = self.override_ids.insert(value, a.span) {
                    return Err(ResolveError::Redeclaration {
                        name: format!("@id({value})"),
                        span: a.span,
                        previous,
                    });
                }
                Some(value)
            }
            None => None,
        };
        self.info
            .globals
            .insert(id, GlobalInfo::Override { ty, id: id_attr });
        Ok(())
    }

    fn structure(&mut self, id: DeclId, s: &StructDecl) -> Result<()> {
        if s.members.is_empty() {
            return Err(ResolveError::validation(
                s.name.span,
                "structures must have at least one member",
            ));
        }
        let mut seen: HashMap<&str, Span> = HashMap::new();
        let mut members = Vec::with_capacity(s.members.len());
        let mut io = Vec::with_capacity(s.members.len());
        for (i, m) in s.members.iter().enumerate() {
            if let Some(previous) = seen.insert(m.name.node.as_str(), m.name.span) {
                return Err(ResolveError::Redeclaration {
                    name: m.name.node.clone(),
                    span: m.name.span,
                    previous,
                });
            }
            self.check_attrs(&m.attrs, entry::MEMBER_ATTRS, "a structure member")?;
            let ty = self.resolve_type(m.ty)?;
            let types = &self.info.types;
            let last = i + 1 == s.members.len();
            if types.has_runtime_array(ty) {
                let direct = matches!(
                    types.get(ty),
                    Type::Array {
                        size: wgsl_ir::ArraySize::Runtime,
                        ..
                    }
                );
                if !direct || !last {
                    return Err(ResolveError::validation(
                        m.span,
                        "runtime-sized arrays can only be the last member of a structure",
                    ));
                }
            } else if !types.is_constructible(ty) && !self.contains_atomic(ty) {
                return Err(ResolveError::validation(
                    m.span,
                    format!("type '{}' cannot be used as a structure member", self.display(ty)),
                ));
            }
            let natural = self.info.types.size_align(ty).0;
            let size = match wgsl_ast::find_attr(&m.attrs, "size") {
                Some(a) => {
                    let n = self.attr_u32(a)?;
                    if n < natural {
                        return Err(ResolveError::attribute(
                            a.span,
                            format!("'@size' must be at least the byte size of the member type ({natural})"),
                        ));
                    }
                    Some(n)
                }
                None => None,
            };
            let align = match wgsl_ast::find_attr(&m.attrs, "align") {
                Some(a) => {
                    let n = self.attr_u32(a)?;
                    if !n.is_power_of_two() {
                        return Err(ResolveError::attribute(
                            a.span,
                            "'@align' value must be a positive power of two",
                        ));
                    }
                    Some(n)
                }
                None => None,
            };
            members.push(MemberDecl {
                name: m.name.node.clone(),
                ty,
                size,
                align,
            });
            io.push(self.io_attributes(&m.attrs, m.span)?);
        }
        let ty = self.info.types.structure(s.name.node.clone(), members);
        if io.iter().any(|a| !a.is_empty()) {
            self.info.struct_io.insert(ty, io);
        }
        self.info.globals.insert(id, GlobalInfo::Type(ty));
        Ok(())
    }

    fn function(&mut self, id: DeclId, f: &wgsl_ast::FunctionDecl) -> Result<()> {
        self.check_attrs(&f.attrs, entry::FUNCTION_ATTRS, "a function")?;
        let stage = self.shader_stage(&f.attrs)?;

        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            self.check_attrs(&p.attrs, entry::PARAM_ATTRS, "a parameter")?;
            let ty = self.resolve_type(p.ty)?;
            self.check_param_type(ty, p.span)?;
            let io = self.io_attributes(&p.attrs, p.span)?;
            params.push(ParamInfo {
                name: p.name.node.clone(),
                ty,
                io,
            });
        }
        let (ret, ret_io) = match &f.ret {
            Some(r) => {
                self.check_attrs(&r.attrs, entry::RETURN_ATTRS, "a return type")?;
                let ty = self.resolve_type(r.ty)?;
                if !self.info.types.is_constructible(ty) {
                    return Err(ResolveError::validation(
                        self.module.expr(r.ty).span,
                        format!("function return type must be constructible, found '{}'", self.display(ty)),
                    ));
                }
                let io = self.io_attributes(&r.attrs, self.module.expr(r.ty).span)?;
                (Some(ty), io)
            }
            None => (None, Default::default()),
        };
        let workgroup_size = self.workgroup_size(f, stage)?;
        let info = FunctionInfo {
            name: f.name.node.clone(),
            params,
            ret,
            ret_io,
            stage,
            workgroup_size,
        };
        if info.stage.is_some() {
            self.entry_point_io(f, &info)?;
        } else if !info.ret_io.is_empty() || info.params.iter().any(|p| !p.io.is_empty()) {
            return Err(ResolveError::attribute(
                f.name.span,
                "shader IO attributes are only valid on entry point parameters and return types",
            ));
        }
        self.info.functions.insert(id, info);
        self.info.globals.insert(id, GlobalInfo::Function);

        self.symbols.push_scope();
        for (i, p) in f.params.iter().enumerate() {
            if let Err(previous) = self.symbols.declare(&p.name.node, Symbol::Param(id, i), p.name.span) {
                self.errors.push(ResolveError::Redeclaration {
                    name: p.name.node.clone(),
                    span: p.name.span,
                    previous,
                });
            }
        }
        self.func = Some(FnContext {
            name: f.name.node.clone(),
            ret,
            constructs: Vec::new(),
        });
        let behaviors = self.stmts(&f.body.stmts);
        self.func = None;
        self.symbols.pop_scope();

        if ret.is_some()
            && behaviors.contains(stmt::Behaviors::NEXT)
            && !behaviors.contains(stmt::Behaviors::UNKNOWN)
        {
            let end = span_end(f.body.span).saturating_sub(1);
            self.errors.push(ResolveError::validation(
                wgsl_ast::span(end, 1),
                "missing return at end of function",
            ));
        }
        Ok(())
    }

    fn check_param_type(&self, ty: TypeId, span: Span) -> Result<()> {
        let types = &self.info.types;
        match types.get(ty) {
            Type::Pointer { space, .. } => match space {
                AddressSpace::Function | AddressSpace::Private => Ok(()),
                AddressSpace::Storage | AddressSpace::Uniform | AddressSpace::Workgroup => self
                    .require(
                        Feature::UnrestrictedPointerParameters,
                        format!("a pointer parameter in the '{space}' address space"),
                        span,
                    ),
                AddressSpace::Handle => Err(ResolveError::address_space(
                    span,
                    "pointers to the 'handle' address space are not allowed",
                )),
            },
            _ if types.is_constructible(ty) || types.is_handle(ty) => Ok(()),
            _ => Err(ResolveError::validation(
                span,
                format!("type '{}' cannot be used as a function parameter", self.display(ty)),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Shared expression helpers
    // -----------------------------------------------------------------------

    fn stage(&self, id: ExprId) -> EvalStage {
        self.info
            .expr(id)
            .map_or(EvalStage::Runtime, |i| i.stage)
    }

    /// The type a value of `ty` has once loaded: references are stripped.
    fn value_type(&self, ty: TypeId) -> TypeId {
        self.info.types.store_type(ty)
    }

    /// Implicitly converts the expression to `to`, materializing abstract
    /// values. Loads are implied.
    fn convert(&mut self, id: ExprId, to: TypeId) -> Result<()> {
        let Some(info) = self.info.exprs.get(&id).cloned() else {
            return Ok(());
        };
        let from = self.value_type(info.ty);
        if from == to {
            return Ok(());
        }
        let span = self.module.expr(id).span;
        if self.info.types.conversion_rank(from, to).is_none() {
            return Err(self.conversion_error(from, to, span));
        }
        let value = match &info.value {
            Some(v) => Some(
                crate::const_eval::materialize(&mut self.info.types, v, to)
                    .map_err(|e| const_error(span, e))?,
            ),
            None => None,
        };
        if let Some(entry) = self.info.exprs.get_mut(&id) {
            entry.abstract_ty.get_or_insert(info.ty);
            entry.ty = to;
            entry.value = value;
        }
        Ok(())
    }

    fn conversion_error(&self, from: TypeId, to: TypeId, span: Span) -> ResolveError {
        let types = &self.info.types;
        let same_shape = match (types.get(from), types.get(to)) {
            (Type::Scalar(a), Type::Scalar(b)) => a.is_numeric() && b.is_numeric(),
            (Type::Vector { size: n, .. }, Type::Vector { size: m, .. }) => n == m,
            _ => false,
        };
        if same_shape {
            ResolveError::InvalidImplicitConversion {
                from: self.display(from),
                to: self.display(to),
                span,
            }
        } else {
            ResolveError::TypeMismatch {
                expected: self.display(to),
                found: self.display(from),
                span,
            }
        }
    }

    /// Materializes an abstract expression to its default concrete type and
    /// returns the resulting value type.
    fn concretize(&mut self, id: ExprId) -> Result<TypeId> {
        let ty = match self.info.type_of(id) {
            Some(t) => self.value_type(t),
            None => self.info.types.scalar(Scalar::I32),
        };
        if !self.info.types.is_abstract(ty) {
            return Ok(ty);
        }
        let concrete = self.info.types.concretize(ty);
        self.convert(id, concrete)?;
        Ok(concrete)
    }
}

#[cfg(test)]
mod tests;
