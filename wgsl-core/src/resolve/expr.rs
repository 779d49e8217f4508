#![forbid(unsafe_code)]

use wgsl_ast::{
    BinaryOp, DeclId, ExprId, ExprKind, FloatSuffix, IntSuffix, Literal, LocalKind,
    TemplatedIdent, UnaryOp, Span,
};
use wgsl_ir::{
    Access, AddressSpace, ArraySize, BinOp, ConstValue, Scalar, ScalarValue, Type, TypeId,
};

use super::ty::{Shape, is_predeclared_type, parse_shape};
use super::{Resolver, Result, const_error};
use crate::builtins::Overload;
use crate::const_eval;
use crate::error::ResolveError;
use crate::features::Feature;
use crate::info::{CallTarget, EvalStage, ExprInfo, GlobalInfo, MemberAccess};
use crate::overload::{self, OverloadError};
use crate::symbols::Symbol;

const F16_MAX: f64 = 65504.0;
/// Literals at or above this magnitude round to infinity.
const F16_OVERFLOW: f64 = 65520.0;

/// The IR operator for a source operator. Short-circuiting operators fold
/// like their bitwise counterparts on `bool`.
pub(crate) fn ast_binop(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Mod,
        BinaryOp::And | BinaryOp::LogicalAnd => BinOp::And,
        BinaryOp::Or | BinaryOp::LogicalOr => BinOp::Or,
        BinaryOp::Xor => BinOp::Xor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        BinaryOp::Eq => BinOp::Eq,
        BinaryOp::Ne => BinOp::Ne,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::Le => BinOp::Le,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::Ge => BinOp::Ge,
    }
}

pub(crate) fn ast_unop(op: UnaryOp) -> Option<wgsl_ir::UnaryOp> {
    match op {
        UnaryOp::Negate => Some(wgsl_ir::UnaryOp::Negate),
        UnaryOp::Not => Some(wgsl_ir::UnaryOp::Not),
        UnaryOp::Complement => Some(wgsl_ir::UnaryOp::Complement),
        UnaryOp::Deref | UnaryOp::AddressOf => None,
    }
}

/// Component indices named by a swizzle, e.g. `zyx` -> `[2, 1, 0]`. Letters
/// from `xyzw` and `rgba` cannot be mixed.
pub(crate) fn parse_swizzle(name: &str, size: u8) -> Option<Vec<u8>> {
    if name.is_empty() || name.len() > 4 {
        return None;
    }
    ["xyzw", "rgba"].iter().find_map(|set| {
        name.chars()
            .map(|c| {
                set.find(c)
                    .and_then(|i| u8::try_from(i).ok())
                    .filter(|i| *i < size)
            })
            .collect::<Option<Vec<u8>>>()
    })
}

enum Callee {
    Function(DeclId),
    Type(TypeId),
    /// `vec3(..)`, `mat2x2(..)` or `array(..)` with the element type taken
    /// from the arguments.
    Inferred(Option<Shape>),
    Builtin,
}

/// A memory view an access expression goes through.
#[derive(Clone, Copy)]
struct View {
    space: AddressSpace,
    access: Access,
}

impl Resolver<'_> {
    fn record(
        &mut self,
        id: ExprId,
        ty: TypeId,
        stage: EvalStage,
        value: Option<ConstValue>,
    ) -> TypeId {
        self.info.exprs.insert(
            id,
            ExprInfo {
                ty,
                abstract_ty: None,
                stage,
                value,
            },
        );
        ty
    }

    /// Resolves an expression that produces a value and returns its type,
    /// which is a reference type for memory views.
    pub(super) fn expr(&mut self, id: ExprId) -> Result<TypeId> {
        let module = self.module;
        let expr = module.expr(id);
        let span = expr.span;
        match &expr.kind {
            ExprKind::Ident(t) => self.ident(id, t, span),
            ExprKind::Literal(lit) => self.literal(id, *lit, span),
            ExprKind::Call { callee, args } => match self.call(id, callee, args, span, false)? {
                Some(ty) => Ok(ty),
                None => Err(ResolveError::validation(
                    span,
                    format!("'{}' does not return a value", callee.ident.node),
                )),
            },
            ExprKind::Binary { op, lhs, rhs } => self.binary(id, *op, *lhs, *rhs, span),
            ExprKind::Unary { op, expr } => self.unary(id, *op, *expr, span),
            ExprKind::Member { base, member } => self.member(id, *base, member, span),
            ExprKind::Index { base, index } => self.index(id, *base, *index, span),
            ExprKind::Bitcast { ty, expr } => self.bitcast(id, *ty, *expr, span),
        }
    }

    fn poisoned(name: &str, span: Span) -> ResolveError {
        ResolveError::Poisoned {
            name: name.to_string(),
            span,
        }
    }

    fn ident(&mut self, id: ExprId, t: &TemplatedIdent, span: Span) -> Result<TypeId> {
        let name = t.ident.node.as_str();
        let Some(declared) = self.symbols.lookup(name) else {
            if is_predeclared_type(name) {
                return Err(ResolveError::validation(
                    span,
                    format!("type '{name}' cannot be used as a value"),
                ));
            }
            if self.builtins.is_function(name) {
                return Err(ResolveError::validation(
                    span,
                    format!("builtin function '{name}' cannot be used as a value"),
                ));
            }
            return Err(self.unresolved(name, span));
        };
        if !t.template_args.is_empty() {
            return Err(ResolveError::validation(
                span,
                format!("'{name}' does not take template arguments"),
            ));
        }
        let (ty, stage, value) = match declared.symbol {
            Symbol::Poisoned => return Err(Self::poisoned(name, span)),
            Symbol::Local(stmt) => {
                let Some(local) = self.info.locals.get(&stmt).cloned() else {
                    return Err(Self::poisoned(name, span));
                };
                match local.kind {
                    LocalKind::Var => {
                        let r = self.info.types.reference(
                            AddressSpace::Function,
                            local.ty,
                            Access::ReadWrite,
                        );
                        (r, EvalStage::Runtime, None)
                    }
                    LocalKind::Let => (local.ty, EvalStage::Runtime, None),
                    LocalKind::Const => (local.ty, EvalStage::Const, local.value),
                }
            }
            Symbol::Param(decl, i) => {
                let ty = self
                    .info
                    .functions
                    .get(&decl)
                    .and_then(|f| f.params.get(i))
                    .map(|p| p.ty)
                    .ok_or_else(|| Self::poisoned(name, span))?;
                (ty, EvalStage::Runtime, None)
            }
            Symbol::Global(decl) => {
                if self.poisoned.contains(&decl) {
                    return Err(Self::poisoned(name, span));
                }
                match self.info.globals.get(&decl).cloned() {
                    Some(GlobalInfo::Var {
                        store,
                        space,
                        access,
                        ..
                    }) => {
                        let r = self.info.types.reference(space, store, access);
                        (r, EvalStage::Runtime, None)
                    }
                    Some(GlobalInfo::Const { ty, value }) => (ty, EvalStage::Const, Some(value)),
                    Some(GlobalInfo::Override { ty, .. }) => (ty, EvalStage::Override, None),
                    Some(GlobalInfo::Type(_)) => {
                        return Err(ResolveError::validation(
                            span,
                            format!("type '{name}' cannot be used as a value"),
                        ));
                    }
                    Some(GlobalInfo::Function) => {
                        return Err(ResolveError::validation(
                            span,
                            format!("function '{name}' cannot be used as a value"),
                        ));
                    }
                    _ => return Err(Self::poisoned(name, span)),
                }
            }
        };
        self.info.idents.insert(id, declared.symbol);
        Ok(self.record(id, ty, stage, value))
    }

    fn literal(&mut self, id: ExprId, lit: Literal, span: Span) -> Result<TypeId> {
        let value = match lit {
            Literal::Bool(b) => ScalarValue::Bool(b),
            Literal::Int { value, suffix } => match suffix {
                IntSuffix::None => ScalarValue::AbstractInt(value),
                IntSuffix::I => ScalarValue::I32(i32::try_from(value).map_err(|_| {
                    ResolveError::ConstEvaluationOverflow {
                        message: format!("value {value} cannot be represented as 'i32'"),
                        span,
                    }
                })?),
                IntSuffix::U => ScalarValue::U32(u32::try_from(value).map_err(|_| {
                    ResolveError::ConstEvaluationOverflow {
                        message: format!("value {value} cannot be represented as 'u32'"),
                        span,
                    }
                })?),
            },
            Literal::Float { value, suffix } => match suffix {
                FloatSuffix::None => ScalarValue::AbstractFloat(value),
                FloatSuffix::F => {
                    if value.abs() > f64::from(f32::MAX) {
                        return Err(ResolveError::ConstEvaluationOverflow {
                            message: format!("value {value} cannot be represented as 'f32'"),
                            span,
                        });
                    }
                    ScalarValue::F32(value as f32)
                }
                FloatSuffix::H => {
                    self.require(Feature::F16, "an 'f16' literal", span)?;
                    if value.abs() >= F16_OVERFLOW {
                        return Err(ResolveError::ConstEvaluationOverflow {
                            message: format!("value {value} cannot be represented as 'f16'"),
                            span,
                        });
                    }
                    ScalarValue::F16(value.clamp(-F16_MAX, F16_MAX) as f32)
                }
            },
        };
        let ty = self.info.types.scalar(value.scalar());
        Ok(self.record(id, ty, EvalStage::Const, Some(ConstValue::Scalar(value))))
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    fn callee(&mut self, t: &TemplatedIdent, span: Span) -> Result<Callee> {
        let name = t.ident.node.as_str();
        if let Some(declared) = self.symbols.lookup(name) {
            let decl = match declared.symbol {
                Symbol::Global(decl) => decl,
                Symbol::Poisoned => return Err(Self::poisoned(name, span)),
                _ => {
                    return Err(ResolveError::validation(
                        span,
                        format!("'{name}' is not a function"),
                    ));
                }
            };
            return match self.info.globals.get(&decl) {
                Some(GlobalInfo::Function) => {
                    self.no_template(t, span)?;
                    Ok(Callee::Function(decl))
                }
                Some(GlobalInfo::Type(ty)) => {
                    let ty = *ty;
                    self.no_template(t, span)?;
                    Ok(Callee::Type(ty))
                }
                None if self.poisoned.contains(&decl) => Err(Self::poisoned(name, span)),
                _ => Err(ResolveError::validation(
                    span,
                    format!("'{name}' is not a function"),
                )),
            };
        }
        if t.template_args.is_empty() {
            if name == "array" {
                return Ok(Callee::Inferred(None));
            }
            if let Some(shape) = parse_shape(name).filter(|s| s.scalar.is_none()) {
                return Ok(Callee::Inferred(Some(shape)));
            }
        }
        if let Some(ty) = self.predeclared_type(t, span)? {
            return Ok(Callee::Type(ty));
        }
        if self.builtins.is_function(name) {
            self.no_template(t, span)?;
            return Ok(Callee::Builtin);
        }
        Err(self.unresolved(name, t.ident.span))
    }

    /// Resolves a call. `allow_void` admits functions without a return
    /// type, which is only valid in statement position.
    pub(super) fn call(
        &mut self,
        id: ExprId,
        callee: &TemplatedIdent,
        args: &[ExprId],
        span: Span,
        allow_void: bool,
    ) -> Result<Option<TypeId>> {
        let target = self.callee(callee, span)?;
        let mut arg_tys = Vec::with_capacity(args.len());
        for arg in args {
            let ty = self.expr(*arg)?;
            arg_tys.push(self.value_type(ty));
        }
        let name = callee.ident.node.as_str();
        match target {
            Callee::Function(decl) => self.user_call(id, decl, args, span, allow_void),
            Callee::Type(ty) => self.construct(id, ty, args, &arg_tys, span).map(Some),
            Callee::Inferred(shape) => {
                let ty = self.infer_constructor(name, shape, &arg_tys, span)?;
                self.construct(id, ty, args, &arg_tys, span).map(Some)
            }
            Callee::Builtin => self.builtin_call(id, name, args, &arg_tys, span, allow_void),
        }
    }

    fn user_call(
        &mut self,
        id: ExprId,
        decl: DeclId,
        args: &[ExprId],
        span: Span,
        allow_void: bool,
    ) -> Result<Option<TypeId>> {
        let Some(function) = self.info.functions.get(&decl).cloned() else {
            return Err(Self::poisoned(
                self.module.decl(decl).name().map_or("", |n| n.node.as_str()),
                span,
            ));
        };
        if function.stage.is_some() {
            return Err(ResolveError::validation(
                span,
                format!("entry point '{}' cannot be called", function.name),
            ));
        }
        if args.len() != function.params.len() {
            return Err(ResolveError::validation(
                span,
                format!(
                    "'{}' expects {} argument{}, found {}",
                    function.name,
                    function.params.len(),
                    if function.params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
            ));
        }
        for (arg, param) in args.iter().zip(&function.params) {
            self.convert(*arg, param.ty)?;
        }
        self.info.calls.insert(id, CallTarget::Function(decl));
        match function.ret {
            Some(ret) => Ok(Some(self.record(id, ret, EvalStage::Runtime, None))),
            None if allow_void => Ok(None),
            None => Err(ResolveError::validation(
                span,
                format!("function '{}' does not return a value", function.name),
            )),
        }
    }

    fn arg_list(&self, arg_tys: &[TypeId]) -> String {
        arg_tys
            .iter()
            .map(|t| self.display(*t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn overload_error(
        &self,
        error: OverloadError,
        call: String,
        name: &str,
        overloads: &[Overload],
        span: Span,
    ) -> ResolveError {
        match error {
            OverloadError::NoMatch => ResolveError::NoMatchingOverload {
                call,
                candidates: overloads.iter().map(|o| o.signature(name)).collect(),
                span,
            },
            OverloadError::Ambiguous(indices) => ResolveError::AmbiguousOverload {
                call,
                candidates: indices
                    .iter()
                    .filter_map(|i| overloads.get(*i))
                    .map(|o| o.signature(name))
                    .collect(),
                span,
            },
        }
    }

    fn builtin_call(
        &mut self,
        id: ExprId,
        name: &str,
        args: &[ExprId],
        arg_tys: &[TypeId],
        span: Span,
        allow_void: bool,
    ) -> Result<Option<TypeId>> {
        let builtins = self.builtins;
        let overloads = builtins.function(name).unwrap_or(&[]);
        let selected = match overload::select(&mut self.info.types, overloads, arg_tys) {
            Ok(s) => s,
            Err(e) => {
                let call = format!("{name}({})", self.arg_list(arg_tys));
                return Err(self.overload_error(e, call, name, overloads, span));
            }
        };
        let chosen = &overloads[selected.index];
        if let Some(feature) = chosen.feature {
            self.require(feature, format!("'{name}'"), span)?;
        }
        let arg_stage = args
            .iter()
            .map(|a| self.stage(*a))
            .max()
            .unwrap_or(EvalStage::Const);
        let foldable = chosen.const_fn.is_some() && arg_stage == EvalStage::Const;
        let mut params = selected.params;
        let mut ret = selected.ret;
        if !foldable {
            let types = &mut self.info.types;
            params = params.into_iter().map(|p| types.concretize(p)).collect();
            ret = ret.map(|r| types.concretize(r));
        }
        for (arg, param) in args.iter().zip(&params) {
            self.convert(*arg, *param)?;
        }
        self.info.calls.insert(
            id,
            CallTarget::Builtin {
                name: name.to_string(),
            },
        );
        let Some(ret) = ret else {
            return if allow_void {
                Ok(None)
            } else {
                Err(ResolveError::validation(
                    span,
                    format!("builtin '{name}' does not return a value"),
                ))
            };
        };
        let (stage, value) = match chosen.const_fn {
            Some(f) if foldable => {
                let values: Vec<ConstValue> = args
                    .iter()
                    .filter_map(|a| self.info.value_of(*a).cloned())
                    .collect();
                let value = f(&mut self.info.types, ret, &values).map_err(|e| const_error(span, e))?;
                (EvalStage::Const, Some(value))
            }
            Some(_) if arg_stage == EvalStage::Override => (EvalStage::Override, None),
            _ => (EvalStage::Runtime, None),
        };
        Ok(Some(self.record(id, ret, stage, value)))
    }

    fn infer_constructor(
        &mut self,
        name: &str,
        shape: Option<Shape>,
        arg_tys: &[TypeId],
        span: Span,
    ) -> Result<TypeId> {
        let Some(shape) = shape else {
            let Some(&first) = arg_tys.first() else {
                return Err(ResolveError::validation(
                    span,
                    "'array' constructor without arguments requires an explicit element type and count",
                ));
            };
            let mut element = first;
            for ty in arg_tys {
                let types = &self.info.types;
                if types.conversion_rank(*ty, element).is_some() {
                    continue;
                }
                if types.conversion_rank(element, *ty).is_some() {
                    element = *ty;
                    continue;
                }
                return Err(ResolveError::validation(
                    span,
                    format!(
                        "'array' constructor arguments have no common type: '{}' and '{}'",
                        self.display(element),
                        self.display(*ty)
                    ),
                ));
            }
            let count = u32::try_from(arg_tys.len()).unwrap_or(u32::MAX);
            return Ok(self.info.types.array(element, ArraySize::Constant(count)));
        };
        let mut scalars = Vec::with_capacity(arg_tys.len());
        for ty in arg_tys {
            match self.info.types.get(*ty) {
                Type::Scalar(s) | Type::Vector { scalar: s, .. } | Type::Matrix { scalar: s, .. } => {
                    scalars.push(*s)
                }
                _ => {
                    return Err(ResolveError::validation(
                        span,
                        format!("cannot construct '{name}' from '{}'", self.display(*ty)),
                    ));
                }
            }
        }
        let scalar = if scalars.is_empty() {
            Scalar::AbstractInt
        } else {
            overload::common_scalar(&scalars).ok_or_else(|| {
                ResolveError::validation(
                    span,
                    format!(
                        "cannot infer the element type of '{name}' from ({})",
                        self.arg_list(arg_tys)
                    ),
                )
            })?
        };
        let scalar = match (shape.columns, scalar) {
            (Some(_), Scalar::AbstractInt) => Scalar::AbstractFloat,
            _ => scalar,
        };
        self.shaped(shape, scalar, span)
    }

    /// Checks a value constructor or conversion `ty(args)` and evaluates it
    /// when every argument is a const-expression.
    fn construct(
        &mut self,
        id: ExprId,
        ty: TypeId,
        args: &[ExprId],
        arg_tys: &[TypeId],
        span: Span,
    ) -> Result<TypeId> {
        if !self.info.types.is_constructible(ty) {
            return Err(ResolveError::validation(
                span,
                format!("type '{}' is not constructible", self.display(ty)),
            ));
        }
        let mut target = CallTarget::Construct(ty);
        if !args.is_empty() {
            match self.info.types.get(ty).clone() {
                Type::Scalar(scalar) => {
                    self.arity(ty, args.len(), 1, span)?;
                    match self.info.types.get(arg_tys[0]).clone() {
                        Type::Scalar(from) => {
                            if from.conversion_rank(scalar).is_some() {
                                self.convert(args[0], ty)?;
                            } else {
                                self.concretize(args[0])?;
                                target = CallTarget::Convert(ty);
                            }
                        }
                        _ => return Err(self.mismatch("a scalar".into(), arg_tys[0], span)),
                    }
                }
                Type::Vector { size, scalar } => {
                    let element = self.info.types.scalar(scalar);
                    if let [arg] = args {
                        match self.info.types.get(arg_tys[0]).clone() {
                            Type::Scalar(_) => self.convert(*arg, element)?,
                            Type::Vector { size: n, scalar: from } if n == size => {
                                if from.conversion_rank(scalar).is_some() {
                                    self.convert(*arg, ty)?;
                                } else {
                                    self.concretize(*arg)?;
                                    target = CallTarget::Convert(ty);
                                }
                            }
                            _ => {
                                return Err(self.mismatch(self.display(ty), arg_tys[0], span));
                            }
                        }
                    } else {
                        let mut count = 0u8;
                        for (arg, arg_ty) in args.iter().zip(arg_tys) {
                            match self.info.types.get(*arg_ty).clone() {
                                Type::Scalar(_) => {
                                    self.convert(*arg, element)?;
                                    count = count.saturating_add(1);
                                }
                                Type::Vector { size: n, .. } => {
                                    let part = self.info.types.vector(n, scalar);
                                    self.convert(*arg, part)?;
                                    count = count.saturating_add(n);
                                }
                                _ => {
                                    return Err(self.mismatch(self.display(element), *arg_ty, span));
                                }
                            }
                        }
                        if count != size {
                            return Err(ResolveError::validation(
                                span,
                                format!(
                                    "'{}' constructor expects {size} components, found {count}",
                                    self.display(ty)
                                ),
                            ));
                        }
                    }
                }
                Type::Matrix {
                    columns,
                    rows,
                    scalar,
                } => {
                    let element = self.info.types.scalar(scalar);
                    let column = self.info.types.vector(rows, scalar);
                    if let [arg] = args {
                        match self.info.types.get(arg_tys[0]).clone() {
                            Type::Matrix {
                                columns: c,
                                rows: r,
                                scalar: from,
                            } if c == columns && r == rows => {
                                if from.conversion_rank(scalar).is_some() {
                                    self.convert(*arg, ty)?;
                                } else {
                                    self.concretize(*arg)?;
                                    target = CallTarget::Convert(ty);
                                }
                            }
                            _ => return Err(self.mismatch(self.display(ty), arg_tys[0], span)),
                        }
                    } else if arg_tys
                        .iter()
                        .all(|t| matches!(self.info.types.get(*t), Type::Scalar(_)))
                    {
                        self.arity(ty, args.len(), usize::from(columns) * usize::from(rows), span)?;
                        for arg in args {
                            self.convert(*arg, element)?;
                        }
                    } else {
                        self.arity(ty, args.len(), usize::from(columns), span)?;
                        for arg in args {
                            self.convert(*arg, column)?;
                        }
                    }
                }
                Type::Array { base, size, .. } => {
                    if let ArraySize::Constant(n) = size {
                        self.arity(ty, args.len(), usize::try_from(n).unwrap_or(usize::MAX), span)?;
                    }
                    for arg in args {
                        self.convert(*arg, base)?;
                    }
                }
                Type::Struct(s) => {
                    self.arity(ty, args.len(), s.members.len(), span)?;
                    for (arg, member) in args.iter().zip(&s.members) {
                        self.convert(*arg, member.ty)?;
                    }
                }
                _ => {}
            }
        }

        let stage = args
            .iter()
            .map(|a| self.stage(*a))
            .max()
            .unwrap_or(EvalStage::Const);
        let value = if stage == EvalStage::Const {
            let values = args
                .iter()
                .map(|a| self.info.value_of(*a).cloned())
                .collect::<Option<Vec<_>>>();
            match values {
                Some(values) => {
                    let result = match (&target, values.first()) {
                        (CallTarget::Convert(_), Some(v)) => {
                            const_eval::convert(&mut self.info.types, v, ty)
                        }
                        _ => const_eval::construct(&mut self.info.types, ty, &values),
                    };
                    Some(result.map_err(|e| const_error(span, e))?)
                }
                None => None,
            }
        } else {
            None
        };
        self.info.calls.insert(id, target);
        Ok(self.record(id, ty, stage, value))
    }

    fn mismatch(&self, expected: String, found: TypeId, span: Span) -> ResolveError {
        ResolveError::TypeMismatch {
            expected,
            found: self.display(found),
            span,
        }
    }

    fn arity(&self, ty: TypeId, found: usize, expected: usize, span: Span) -> Result<()> {
        if found == expected {
            return Ok(());
        }
        Err(ResolveError::validation(
            span,
            format!(
                "'{}' constructor expects {expected} argument{}, found {found}",
                self.display(ty),
                if expected == 1 { "" } else { "s" }
            ),
        ))
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    fn binary(&mut self, id: ExprId, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: Span) -> Result<TypeId> {
        let l = self.expr(lhs)?;
        let r = self.expr(rhs)?;
        let arg_tys = [self.value_type(l), self.value_type(r)];
        let builtins = self.builtins;
        let overloads = builtins.binary(op);
        let name = format!("operator {}", op.symbol());
        let selected = match overload::select(&mut self.info.types, overloads, &arg_tys) {
            Ok(s) => s,
            Err(e) => {
                let call = format!("{name} ({})", self.arg_list(&arg_tys));
                return Err(self.overload_error(e, call, &name, overloads, span));
            }
        };
        let stage = self.stage(lhs).max(self.stage(rhs));
        let foldable = stage == EvalStage::Const;
        let types = &mut self.info.types;
        let (lp, rp, ret) = match (selected.params.as_slice(), selected.ret) {
            ([lp, rp], Some(ret)) if foldable => (*lp, *rp, ret),
            ([lp, rp], Some(ret)) => (types.concretize(*lp), types.concretize(*rp), types.concretize(ret)),
            _ => {
                return Err(ResolveError::validation(span, format!("malformed overload for {name}")));
            }
        };
        self.convert(lhs, lp)?;
        self.convert(rhs, rp)?;
        let value = match (foldable, self.info.value_of(lhs).cloned(), self.info.value_of(rhs).cloned()) {
            (true, Some(lv), Some(rv)) => Some(
                const_eval::binary(&mut self.info.types, ast_binop(op), (&lv, lp), (&rv, rp), ret)
                    .map_err(|e| const_error(span, e))?,
            ),
            _ => None,
        };
        Ok(self.record(id, ret, stage, value))
    }

    fn unary(&mut self, id: ExprId, op: UnaryOp, operand: ExprId, span: Span) -> Result<TypeId> {
        let ty = self.expr(operand)?;
        match op {
            UnaryOp::AddressOf => return self.address_of(id, operand, ty, span),
            UnaryOp::Deref => {
                let ptr = self.value_type(ty);
                return match self.info.types.get(ptr).clone() {
                    Type::Pointer {
                        space,
                        store,
                        access,
                    } => {
                        let r = self.info.types.reference(space, store, access);
                        Ok(self.record(id, r, EvalStage::Runtime, None))
                    }
                    _ => Err(ResolveError::validation(
                        span,
                        format!("cannot dereference a value of type '{}'", self.display(ptr)),
                    )),
                };
            }
            UnaryOp::Negate | UnaryOp::Not | UnaryOp::Complement => {}
        }
        let arg_ty = self.value_type(ty);
        let builtins = self.builtins;
        let overloads = builtins.unary(op);
        let name = format!("operator {}", op.symbol());
        let selected = match overload::select(&mut self.info.types, overloads, &[arg_ty]) {
            Ok(s) => s,
            Err(e) => {
                let call = format!("{name} ({})", self.display(arg_ty));
                return Err(self.overload_error(e, call, &name, overloads, span));
            }
        };
        let stage = self.stage(operand);
        let foldable = stage == EvalStage::Const;
        let (param, ret) = match (selected.params.first(), selected.ret) {
            (Some(p), Some(r)) if foldable => (*p, r),
            (Some(p), Some(r)) => (self.info.types.concretize(*p), self.info.types.concretize(r)),
            _ => {
                return Err(ResolveError::validation(span, format!("malformed overload for {name}")));
            }
        };
        self.convert(operand, param)?;
        let value = match (foldable, ast_unop(op), self.info.value_of(operand)) {
            (true, Some(ir_op), Some(v)) => {
                Some(const_eval::unary(ir_op, v).map_err(|e| const_error(span, e))?)
            }
            _ => None,
        };
        Ok(self.record(id, ret, stage, value))
    }

    fn address_of(&mut self, id: ExprId, operand: ExprId, ty: TypeId, span: Span) -> Result<TypeId> {
        let Type::Reference {
            space,
            store,
            access,
        } = self.info.types.get(ty).clone()
        else {
            return Err(ResolveError::validation(
                span,
                "cannot take the address of an expression that is not a memory view",
            ));
        };
        if space == AddressSpace::Handle {
            return Err(ResolveError::address_space(
                span,
                "cannot take the address of a texture or sampler",
            ));
        }
        let component = match &self.module.expr(operand).kind {
            ExprKind::Member { .. } => {
                matches!(self.info.members.get(&operand), Some(MemberAccess::Swizzle(_)))
            }
            ExprKind::Index { base, .. } => self.info.type_of(*base).is_some_and(|b| {
                let b = self.info.types.store_type(b);
                let b = match self.info.types.get(b) {
                    Type::Pointer { store, .. } => *store,
                    _ => b,
                };
                matches!(self.info.types.get(b), Type::Vector { .. })
            }),
            _ => false,
        };
        if component {
            return Err(ResolveError::validation(
                span,
                "cannot take the address of a vector component",
            ));
        }
        let ptr = self.info.types.pointer(space, store, access);
        Ok(self.record(id, ptr, EvalStage::Runtime, None))
    }

    // -----------------------------------------------------------------------
    // Access expressions
    // -----------------------------------------------------------------------

    /// Splits a base type into the memory view it goes through, if any, and
    /// the type being accessed.
    fn view(&mut self, ty: TypeId, span: Span) -> Result<(Option<View>, TypeId)> {
        match self.info.types.get(ty).clone() {
            Type::Reference {
                space,
                store,
                access,
            } => Ok((Some(View { space, access }), store)),
            Type::Pointer {
                space,
                store,
                access,
            } => {
                self.require(
                    Feature::PointerCompositeAccess,
                    "accessing a component through a pointer",
                    span,
                )?;
                Ok((Some(View { space, access }), store))
            }
            _ => Ok((None, ty)),
        }
    }

    fn viewed(&mut self, view: Option<View>, ty: TypeId) -> TypeId {
        match view {
            Some(v) => self.info.types.reference(v.space, ty, v.access),
            None => ty,
        }
    }

    fn member(&mut self, id: ExprId, base: ExprId, member: &wgsl_ast::Ident, span: Span) -> Result<TypeId> {
        let base_ty = self.expr(base)?;
        let (view, inner) = self.view(base_ty, span)?;
        let stage = self.stage(base);
        let base_value = if view.is_none() {
            self.info.value_of(base).cloned()
        } else {
            None
        };
        let unknown = ResolveError::UnknownMember {
            ty: self.display(inner),
            member: member.node.clone(),
            span: member.span,
        };
        match self.info.types.get(inner).clone() {
            Type::Struct(s) => {
                let Some((index, field)) = s.member(&member.node) else {
                    return Err(unknown);
                };
                let field_ty = field.ty;
                let ty = self.viewed(view, field_ty);
                let value = base_value.and_then(|v| v.element(index).cloned());
                let index = u32::try_from(index).unwrap_or(u32::MAX);
                self.info.members.insert(id, MemberAccess::Field(index));
                Ok(self.record(id, ty, stage, value))
            }
            Type::Vector { size, scalar } => {
                let Some(components) = parse_swizzle(&member.node, size) else {
                    return Err(unknown);
                };
                let ty = match components.len() {
                    1 => {
                        let s = self.info.types.scalar(scalar);
                        self.viewed(view, s)
                    }
                    n => self
                        .info
                        .types
                        .vector(u8::try_from(n).unwrap_or(4), scalar),
                };
                let value = match base_value {
                    Some(v) => Some(
                        const_eval::swizzle(&v, &components, ty).map_err(|e| const_error(span, e))?,
                    ),
                    None => None,
                };
                self.info.members.insert(id, MemberAccess::Swizzle(components));
                Ok(self.record(id, ty, stage, value))
            }
            _ => Err(unknown),
        }
    }

    fn index(&mut self, id: ExprId, base: ExprId, index: ExprId, span: Span) -> Result<TypeId> {
        let base_ty = self.expr(base)?;
        let index_ty = self.expr(index)?;
        let index_ty = self.value_type(index_ty);
        if !self.info.types.as_scalar(index_ty).is_some_and(Scalar::is_integer) {
            return Err(ResolveError::TypeMismatch {
                expected: "i32 or u32".to_string(),
                found: self.display(index_ty),
                span: self.module.expr(index).span,
            });
        }
        self.concretize(index)?;
        let (view, mut inner) = self.view(base_ty, span)?;
        let stage = self.stage(base).max(self.stage(index));
        if view.is_none() && stage != EvalStage::Const && self.info.types.is_abstract(inner) {
            inner = self.concretize(base)?;
        }
        let Some(element) = self.info.types.element(inner) else {
            return Err(ResolveError::validation(
                span,
                format!("cannot index into a value of type '{}'", self.display(inner)),
            ));
        };
        let i = self.info.value_of(index).and_then(ConstValue::as_i64);
        if let Some(i) = i {
            let count = self.info.types.element_count(inner);
            let out_of_bounds = i < 0 || count.is_some_and(|n| i >= i64::from(n));
            if out_of_bounds {
                return Err(ResolveError::validation(
                    self.module.expr(index).span,
                    match count {
                        Some(n) => format!("index {i} is out of bounds [0..{}]", n.saturating_sub(1)),
                        None => format!("index {i} is out of bounds"),
                    },
                ));
            }
        }
        let ty = self.viewed(view, element);
        let value = match (view, self.info.value_of(base), i) {
            (None, Some(v), Some(i)) => {
                Some(const_eval::index(v, i).map_err(|e| const_error(span, e))?)
            }
            _ => None,
        };
        Ok(self.record(id, ty, stage, value))
    }

    /// Width in bits of a concrete numeric scalar or vector.
    fn bit_width(&self, ty: TypeId) -> Option<u32> {
        match self.info.types.get(ty) {
            Type::Scalar(s) if s.is_numeric() && !s.is_abstract() => Some(8 * s.size_align().0),
            Type::Vector { size, scalar } if scalar.is_numeric() && !scalar.is_abstract() => {
                Some(8 * u32::from(*size) * scalar.size_align().0)
            }
            _ => None,
        }
    }

    fn bitcast(&mut self, id: ExprId, ty: ExprId, operand: ExprId, span: Span) -> Result<TypeId> {
        let to = self.resolve_type(ty)?;
        self.expr(operand)?;
        let from = self.concretize(operand)?;
        let from_bits = self.bit_width(from);
        if from_bits.is_none() || from_bits != self.bit_width(to) {
            return Err(ResolveError::validation(
                span,
                format!(
                    "cannot bitcast from '{}' to '{}'",
                    self.display(from),
                    self.display(to)
                ),
            ));
        }
        Ok(self.record(id, to, EvalStage::Runtime, None))
    }
}
