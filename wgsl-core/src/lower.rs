#![forbid(unsafe_code)]

//! Lowering from the resolved syntax tree to the block-structured IR.

use std::collections::HashMap;

use log::debug;
use wgsl_ast::{
    BinaryOp, Block, CaseSelector, DeclId, Diagnostics, ExprId, ExprKind, FunctionDecl,
    GlobalDecl, IncrementOp, LocalKind, Module, Span, StmtId, StmtKind,
};
use wgsl_ir::{
    BinOp, BlockId, Builder, ConstValue, FunctionId, InstKind, ScalarValue, Terminator, Type,
    TypeId, ValueId,
};

use crate::const_eval;
use crate::error::LowerError;
use crate::info::{CallTarget, ExprInfo, GlobalInfo, MemberAccess, SemanticInfo};
use crate::resolve::{ast_binop, ast_unop};
use crate::symbols::Symbol;

type Result<T> = std::result::Result<T, LowerError>;

/// Lowers a successfully resolved module. Module-scope variables and
/// overrides go to the root block; functions are emitted in dependency
/// order so callees exist before their callers.
pub fn lower(
    module: &Module,
    info: &SemanticInfo,
    diagnostics: &mut Diagnostics,
) -> Result<wgsl_ir::Module> {
    let mut lowerer = Lowerer {
        module,
        info,
        b: Builder::new(info.types.clone()),
        globals: HashMap::new(),
        functions: HashMap::new(),
        locals: HashMap::new(),
        params: Vec::new(),
        targets: Vec::new(),
    };
    match lowerer.lower_module() {
        Ok(()) => Ok(lowerer.b.finish()),
        Err(e) => {
            e.report(diagnostics);
            Err(e)
        }
    }
}

/// Where `break` and `continue` go from inside a loop or switch.
#[derive(Clone, Copy, Debug)]
struct Target {
    brk: BlockId,
    /// `None` for a switch: `continue` passes through it to the loop.
    cont: Option<BlockId>,
}

struct Lowerer<'a> {
    module: &'a Module,
    info: &'a SemanticInfo,
    b: Builder,
    /// Module-scope `var` pointers and `override` values.
    globals: HashMap<DeclId, ValueId>,
    functions: HashMap<DeclId, FunctionId>,
    /// `var` pointers and `let` values of the current function.
    locals: HashMap<StmtId, ValueId>,
    params: Vec<ValueId>,
    targets: Vec<Target>,
}

impl<'a> Lowerer<'a> {
    fn lower_module(&mut self) -> Result<()> {
        let module = self.module;
        for &id in &self.info.order {
            match module.decl(id) {
                GlobalDecl::Var(v) => {
                    let Some(GlobalInfo::Var {
                        store,
                        space,
                        access,
                        binding,
                    }) = self.info.globals.get(&id).cloned()
                    else {
                        return Err(missing("module-scope 'var'", v.name.span));
                    };
                    let init = v.init.map(|e| self.root_initializer(e, "'var'")).transpose()?;
                    let ptr = self
                        .b
                        .root_var(v.span, v.name.node.clone(), space, access, store, init, binding);
                    self.globals.insert(id, ptr);
                }
                GlobalDecl::Override(o) => {
                    let Some(GlobalInfo::Override { ty, id: override_id }) =
                        self.info.globals.get(&id).cloned()
                    else {
                        return Err(missing("'override'", o.name.span));
                    };
                    let init = o.init.map(|e| self.root_initializer(e, "'override'")).transpose()?;
                    let value = self
                        .b
                        .root_override(o.span, o.name.node.clone(), ty, override_id, init);
                    self.globals.insert(id, value);
                }
                GlobalDecl::Function(f) => self.lower_function(id, f)?,
                GlobalDecl::Const(_)
                | GlobalDecl::Alias(_)
                | GlobalDecl::Struct(_)
                | GlobalDecl::ConstAssert(_) => {}
            }
        }
        Ok(())
    }

    /// Module-scope initializers must fold to a constant; the root block
    /// holds no computation.
    fn root_initializer(&mut self, init: ExprId, what: &str) -> Result<ValueId> {
        let span = self.module.expr(init).span;
        let info = self.expr_info(init)?;
        match &info.value {
            Some(value) => Ok(self.constant(info.ty, value.clone(), span)),
            None => Err(LowerError::UnsupportedConstruct {
                construct: format!("{what} initializer that depends on an override"),
                span,
            }),
        }
    }

    fn lower_function(&mut self, id: DeclId, f: &FunctionDecl) -> Result<()> {
        let Some(info) = self.info.functions.get(&id) else {
            return Err(missing("function", f.name.span));
        };
        self.locals.clear();
        self.params.clear();
        self.targets.clear();

        let fid = self
            .b
            .begin_function(info.name.clone(), f.span, info.stage, info.workgroup_size);
        for p in &info.params {
            let ty = self.ir_type(p.ty);
            let value = self.b.add_param(p.name.clone(), ty, p.io.clone());
            self.params.push(value);
        }
        if let Some(ret) = info.ret {
            self.b.set_return(ret, info.ret_io.clone());
        }
        self.functions.insert(id, fid);

        self.lower_block(&f.body)?;
        self.b.finish_function();
        debug!("lowered function '{}'", info.name);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn lower_block(&mut self, block: &Block) -> Result<()> {
        for &stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, id: StmtId) -> Result<()> {
        let module = self.module;
        let stmt = module.stmt(id);
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Block(b) => self.lower_block(b),
            StmtKind::Return(value) => {
                let value = value.map(|e| self.value(e)).transpose()?;
                self.b.terminate(Terminator::Return(value));
                Ok(())
            }
            StmtKind::If(s) => {
                let cond = self.value(s.cond)?;
                let then_bb = self.b.create_block(s.then_block.span);
                let merge = self.b.create_block(span);
                let else_bb = match s.else_stmt {
                    Some(e) => self.b.create_block(module.stmt(e).span),
                    None => merge,
                };
                self.b.terminate(Terminator::BranchIf {
                    cond,
                    then_bb,
                    else_bb,
                });
                self.b.switch_to(then_bb);
                self.lower_block(&s.then_block)?;
                self.b.terminate(Terminator::Branch(merge));
                if let Some(e) = s.else_stmt {
                    self.b.switch_to(else_bb);
                    self.lower_stmt(e)?;
                    self.b.terminate(Terminator::Branch(merge));
                }
                self.b.switch_to(merge);
                Ok(())
            }
            StmtKind::Switch(s) => {
                let selector = self.value(s.selector)?;
                let merge = self.b.create_block(span);
                let mut cases = Vec::new();
                let mut default_bb = merge;
                let mut bodies = Vec::with_capacity(s.clauses.len());
                for clause in &s.clauses {
                    let bb = self.b.create_block(clause.span);
                    for selector in &clause.selectors {
                        match selector {
                            CaseSelector::Default(_) => default_bb = bb,
                            CaseSelector::Expr(e) => {
                                let Some(value) = self.info.value_of(*e).and_then(|v| v.as_i64())
                                else {
                                    return Err(missing("case selector", module.expr(*e).span));
                                };
                                cases.push((value, bb));
                            }
                        }
                    }
                    bodies.push(bb);
                }
                self.b.terminate(Terminator::Switch {
                    selector,
                    default_bb,
                    cases,
                });
                self.targets.push(Target {
                    brk: merge,
                    cont: None,
                });
                for (clause, bb) in s.clauses.iter().zip(bodies) {
                    self.b.switch_to(bb);
                    self.lower_block(&clause.body)?;
                    self.b.terminate(Terminator::Branch(merge));
                }
                self.targets.pop();
                self.b.switch_to(merge);
                Ok(())
            }
            StmtKind::Loop(l) => {
                let header = self.b.create_block(l.body.span);
                let continuing = self
                    .b
                    .create_block(l.continuing.as_ref().map_or(span, |c| c.span));
                let merge = self.b.create_block(span);
                self.b.terminate(Terminator::Branch(header));

                self.b.switch_to(header);
                self.targets.push(Target {
                    brk: merge,
                    cont: Some(continuing),
                });
                self.lower_block(&l.body)?;
                self.b.terminate(Terminator::Branch(continuing));
                self.targets.pop();

                self.b.switch_to(continuing);
                match &l.continuing {
                    Some(c) => {
                        self.lower_block(&c.body)?;
                        match c.break_if {
                            Some(cond) => {
                                let cond = self.value(cond)?;
                                self.b.terminate(Terminator::BranchIf {
                                    cond,
                                    then_bb: merge,
                                    else_bb: header,
                                });
                            }
                            None => self.b.terminate(Terminator::Branch(header)),
                        }
                    }
                    None => self.b.terminate(Terminator::Branch(header)),
                }
                self.b.switch_to(merge);
                Ok(())
            }
            StmtKind::For(f) => {
                if let Some(init) = f.init {
                    self.lower_stmt(init)?;
                }
                let header = self.b.create_block(span);
                let body = self.b.create_block(f.body.span);
                let continuing = self.b.create_block(span);
                let merge = self.b.create_block(span);
                self.b.terminate(Terminator::Branch(header));

                self.b.switch_to(header);
                match f.cond {
                    Some(cond) => {
                        let cond = self.value(cond)?;
                        self.b.terminate(Terminator::BranchIf {
                            cond,
                            then_bb: body,
                            else_bb: merge,
                        });
                    }
                    None => self.b.terminate(Terminator::Branch(body)),
                }

                self.b.switch_to(body);
                self.targets.push(Target {
                    brk: merge,
                    cont: Some(continuing),
                });
                self.lower_block(&f.body)?;
                self.b.terminate(Terminator::Branch(continuing));
                self.targets.pop();

                self.b.switch_to(continuing);
                if let Some(update) = f.update {
                    self.lower_stmt(update)?;
                }
                self.b.terminate(Terminator::Branch(header));
                self.b.switch_to(merge);
                Ok(())
            }
            StmtKind::While(w) => {
                let header = self.b.create_block(span);
                let body = self.b.create_block(w.body.span);
                let merge = self.b.create_block(span);
                self.b.terminate(Terminator::Branch(header));

                self.b.switch_to(header);
                let cond = self.value(w.cond)?;
                self.b.terminate(Terminator::BranchIf {
                    cond,
                    then_bb: body,
                    else_bb: merge,
                });

                self.b.switch_to(body);
                self.targets.push(Target {
                    brk: merge,
                    cont: Some(header),
                });
                self.lower_block(&w.body)?;
                self.b.terminate(Terminator::Branch(header));
                self.targets.pop();
                self.b.switch_to(merge);
                Ok(())
            }
            StmtKind::Break => {
                let Some(target) = self.targets.last() else {
                    return Err(unsupported("'break' outside of a loop or switch", span));
                };
                self.b.terminate(Terminator::Branch(target.brk));
                Ok(())
            }
            StmtKind::Continue => {
                let Some(cont) = self.targets.iter().rev().find_map(|t| t.cont) else {
                    return Err(unsupported("'continue' outside of a loop", span));
                };
                self.b.terminate(Terminator::Branch(cont));
                Ok(())
            }
            StmtKind::Discard => {
                self.b.effect(span, InstKind::Discard);
                Ok(())
            }
            StmtKind::Decl(d) => {
                let Some(local) = self.info.locals.get(&id) else {
                    return Err(missing("local declaration", d.name.span));
                };
                match d.kind {
                    LocalKind::Var => {
                        let init = d.init.map(|e| self.value(e)).transpose()?;
                        let ptr = self.b.local_var(span, local.name.clone(), local.ty, init);
                        self.locals.insert(id, ptr);
                    }
                    LocalKind::Let => {
                        let Some(init) = d.init else {
                            return Err(missing("'let' initializer", d.name.span));
                        };
                        let value = self.value(init)?;
                        let ty = self.ir_type(local.ty);
                        let named = self.b.inst(
                            span,
                            ty,
                            InstKind::Let {
                                name: local.name.clone(),
                                value,
                            },
                        );
                        self.locals.insert(id, named);
                    }
                    LocalKind::Const => {}
                }
                Ok(())
            }
            StmtKind::Assign(a) => {
                let Some(lhs) = a.lhs else {
                    self.value(a.rhs)?;
                    return Ok(());
                };
                let ptr = self.lower_expr(lhs)?;
                let value = match a.op {
                    None => self.value(a.rhs)?,
                    Some(op) => {
                        let store = self.pointee(ptr, span)?;
                        let current = self.b.inst(span, store, InstKind::Load { ptr });
                        let rhs = self.value(a.rhs)?;
                        self.b.inst(
                            span,
                            store,
                            InstKind::Binary {
                                op: ast_binop(op),
                                lhs: current,
                                rhs,
                            },
                        )
                    }
                };
                self.b.effect(span, InstKind::Store { ptr, value });
                Ok(())
            }
            StmtKind::Increment(inc) => {
                let ptr = self.lower_expr(inc.lhs)?;
                let store = self.pointee(ptr, span)?;
                let one = match self.b.types().as_scalar(store) {
                    Some(wgsl_ir::Scalar::U32) => ScalarValue::U32(1),
                    Some(wgsl_ir::Scalar::I32) => ScalarValue::I32(1),
                    _ => return Err(unsupported("increment of a non-integer", span)),
                };
                let one = self.b.constant(store, ConstValue::Scalar(one));
                let current = self.b.inst(span, store, InstKind::Load { ptr });
                let op = match inc.op {
                    IncrementOp::Increment => BinOp::Add,
                    IncrementOp::Decrement => BinOp::Sub,
                };
                let value = self.b.inst(
                    span,
                    store,
                    InstKind::Binary {
                        op,
                        lhs: current,
                        rhs: one,
                    },
                );
                self.b.effect(span, InstKind::Store { ptr, value });
                Ok(())
            }
            StmtKind::Call(call) => {
                if self.info.value_of(*call).is_some() {
                    return Ok(());
                }
                let expr = module.expr(*call);
                let ExprKind::Call { callee, args } = &expr.kind else {
                    return Err(unsupported("expression statement that is not a call", expr.span));
                };
                self.lower_call(*call, &callee.ident.node, args, expr.span)?;
                Ok(())
            }
            StmtKind::ConstAssert(_) => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// Lowers `id` and loads through the result when it is a reference.
    fn value(&mut self, id: ExprId) -> Result<ValueId> {
        let info = self.expr_info(id)?;
        let lowered = self.lower_expr(id)?;
        match self.info.types.get(info.ty) {
            Type::Reference { store, .. } => {
                let span = self.module.expr(id).span;
                Ok(self.b.inst(span, *store, InstKind::Load { ptr: lowered }))
            }
            _ => Ok(lowered),
        }
    }

    /// Lowers `id` as written: references become pointers, const-expressions
    /// become constants.
    fn lower_expr(&mut self, id: ExprId) -> Result<ValueId> {
        let module = self.module;
        let expr = module.expr(id);
        let span = expr.span;
        let info = self.expr_info(id)?;
        if let Some(value) = &info.value {
            return Ok(self.constant(info.ty, value.clone(), span));
        }
        let ty = self.ir_type(info.ty);
        match &expr.kind {
            ExprKind::Ident(t) => match self.info.symbol(id) {
                Some(Symbol::Global(decl)) => self
                    .globals
                    .get(&decl)
                    .copied()
                    .ok_or_else(|| missing(format!("'{}'", t.ident.node), span)),
                Some(Symbol::Local(stmt)) => self
                    .locals
                    .get(&stmt)
                    .copied()
                    .ok_or_else(|| missing(format!("'{}'", t.ident.node), span)),
                Some(Symbol::Param(_, index)) => self
                    .params
                    .get(index)
                    .copied()
                    .ok_or_else(|| missing(format!("parameter '{}'", t.ident.node), span)),
                Some(Symbol::Poisoned) | None => {
                    Err(missing(format!("identifier '{}'", t.ident.node), span))
                }
            },
            ExprKind::Literal(_) => Err(missing("literal value", span)),
            ExprKind::Call { callee, args } => self
                .lower_call(id, &callee.ident.node, args, span)?
                .ok_or_else(|| unsupported(format!("'{}' used as a value", callee.ident.node), span)),
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                    self.short_circuit(*op == BinaryOp::LogicalAnd, *lhs, *rhs, span)
                }
                _ => {
                    let lhs = self.value(*lhs)?;
                    let rhs = self.value(*rhs)?;
                    Ok(self.b.inst(
                        span,
                        ty,
                        InstKind::Binary {
                            op: ast_binop(*op),
                            lhs,
                            rhs,
                        },
                    ))
                }
            },
            ExprKind::Unary { op, expr: operand } => match ast_unop(*op) {
                Some(op) => {
                    let operand = self.value(*operand)?;
                    Ok(self.b.inst(span, ty, InstKind::Unary { op, operand }))
                }
                // `*p` and `&r` only change how the same pointer is viewed.
                None => self.lower_expr(*operand),
            },
            ExprKind::Member { base, member } => {
                let Some(access) = self.info.members.get(&id) else {
                    return Err(missing(format!("member '{}'", member.node), span));
                };
                let through_pointer = self.is_pointer_like(*base)?;
                let base = if through_pointer {
                    self.lower_expr(*base)?
                } else {
                    self.value(*base)?
                };
                match access {
                    MemberAccess::Field(index) => {
                        let index = self.index_constant(*index);
                        Ok(self.b.inst(
                            span,
                            ty,
                            InstKind::Access {
                                base,
                                indices: vec![index],
                            },
                        ))
                    }
                    MemberAccess::Swizzle(components) => match components.as_slice() {
                        [single] => {
                            let index = self.index_constant(u32::from(*single));
                            Ok(self.b.inst(
                                span,
                                ty,
                                InstKind::Access {
                                    base,
                                    indices: vec![index],
                                },
                            ))
                        }
                        _ => {
                            let base = if through_pointer {
                                let store = self.pointee(base, span)?;
                                self.b.inst(span, store, InstKind::Load { ptr: base })
                            } else {
                                base
                            };
                            Ok(self.b.inst(
                                span,
                                ty,
                                InstKind::Swizzle {
                                    base,
                                    components: components.clone(),
                                },
                            ))
                        }
                    },
                }
            }
            ExprKind::Index { base, index } => {
                let base = if self.is_pointer_like(*base)? {
                    self.lower_expr(*base)?
                } else {
                    self.value(*base)?
                };
                let index = self.value(*index)?;
                Ok(self.b.inst(
                    span,
                    ty,
                    InstKind::Access {
                        base,
                        indices: vec![index],
                    },
                ))
            }
            ExprKind::Bitcast { expr: operand, .. } => {
                let value = self.value(*operand)?;
                Ok(self.b.inst(span, ty, InstKind::Bitcast { value }))
            }
        }
    }

    /// Emits a call; `None` for calls that produce no value.
    fn lower_call(
        &mut self,
        id: ExprId,
        name: &str,
        args: &[ExprId],
        span: Span,
    ) -> Result<Option<ValueId>> {
        let Some(target) = self.info.calls.get(&id) else {
            return Err(missing(format!("call to '{name}'"), span));
        };
        let ty = self.info.type_of(id).map(|t| self.ir_type(t));
        let args = args
            .iter()
            .map(|a| self.value(*a))
            .collect::<Result<Vec<_>>>()?;
        let kind = match target {
            CallTarget::Function(decl) => {
                let Some(&callee) = self.functions.get(decl) else {
                    return Err(missing(format!("function '{name}'"), span));
                };
                InstKind::Call { callee, args }
            }
            CallTarget::Builtin { name } => InstKind::BuiltinCall {
                name: name.clone(),
                args,
            },
            CallTarget::Construct(_) => InstKind::Construct { args },
            CallTarget::Convert(_) => match args.as_slice() {
                [value] => InstKind::Convert { value: *value },
                _ => {
                    return Err(unsupported(
                        format!("conversion to '{name}' with {} arguments", args.len()),
                        span,
                    ));
                }
            },
        };
        match ty {
            Some(ty) => Ok(Some(self.b.inst(span, ty, kind))),
            None => {
                self.b.effect(span, kind);
                Ok(None)
            }
        }
    }

    /// `&&` and `||` evaluate the right operand only when needed, through a
    /// function-scope temporary.
    fn short_circuit(&mut self, and: bool, lhs: ExprId, rhs: ExprId, span: Span) -> Result<ValueId> {
        let bool_ty = self.b.types().bool();
        let lhs = self.value(lhs)?;
        let tmp = self.b.local_var(span, "", bool_ty, Some(lhs));
        let rhs_bb = self.b.create_block(span);
        let merge = self.b.create_block(span);
        let (then_bb, else_bb) = if and { (rhs_bb, merge) } else { (merge, rhs_bb) };
        self.b.terminate(Terminator::BranchIf {
            cond: lhs,
            then_bb,
            else_bb,
        });
        self.b.switch_to(rhs_bb);
        let rhs = self.value(rhs)?;
        self.b.effect(span, InstKind::Store { ptr: tmp, value: rhs });
        self.b.terminate(Terminator::Branch(merge));
        self.b.switch_to(merge);
        Ok(self.b.inst(span, bool_ty, InstKind::Load { ptr: tmp }))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn expr_info(&self, id: ExprId) -> Result<&'a ExprInfo> {
        let info: &'a SemanticInfo = self.info;
        info.expr(id)
            .ok_or_else(|| missing("expression", self.module.expr(id).span))
    }

    fn is_pointer_like(&self, id: ExprId) -> Result<bool> {
        let ty = self.expr_info(id)?.ty;
        Ok(matches!(
            self.info.types.get(ty),
            Type::Reference { .. } | Type::Pointer { .. }
        ))
    }

    /// IR values have no reference types: references lower to pointers.
    fn ir_type(&mut self, ty: TypeId) -> TypeId {
        match self.b.types().get(ty).clone() {
            Type::Reference {
                space,
                store,
                access,
            } => self.b.types().pointer(space, store, access),
            _ => ty,
        }
    }

    fn pointee(&mut self, ptr: ValueId, span: Span) -> Result<TypeId> {
        let ty = self.b.module().value_type(ptr);
        match ty.map(|t| self.b.types().get(t).clone()) {
            Some(Type::Pointer { store, .. }) => Ok(store),
            _ => Err(unsupported("assignment through a non-pointer value", span)),
        }
    }

    fn index_constant(&mut self, index: u32) -> ValueId {
        let u32_ty = self.b.types().u32();
        self.b.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(index)))
    }

    /// A constant of the expression's type. Abstract values that were never
    /// materialized by their context take the default concrete type.
    fn constant(&mut self, ty: TypeId, value: ConstValue, span: Span) -> ValueId {
        if !self.b.types().is_abstract(ty) {
            return self.b.constant(ty, value);
        }
        let concrete = self.b.types().concretize(ty);
        match const_eval::materialize(self.b.types(), &value, concrete) {
            Ok(v) => self.b.constant(concrete, v),
            Err(e) => {
                debug!("keeping abstract constant at {}: {}", span.offset(), e.0);
                self.b.constant(ty, value)
            }
        }
    }
}

fn missing(what: impl Into<String>, span: Span) -> LowerError {
    LowerError::MissingSemanticInfo {
        what: what.into(),
        span,
    }
}

fn unsupported(construct: impl Into<String>, span: Span) -> LowerError {
    LowerError::UnsupportedConstruct {
        construct: construct.into(),
        span,
    }
}

#[cfg(test)]
mod tests {
    use wgsl_ast::Diagnostics;
    use wgsl_ir::{InstKind, Terminator, disassemble, validate};

    use super::*;
    use crate::features::FeatureSet;
    use crate::resolve::resolve;

    fn lower_src(src: &str) -> wgsl_ir::Module {
        let (module, errors) = wgsl_parse::parse_source(src);
        assert!(errors.is_empty(), "{errors:?}");
        let mut diags = Diagnostics::for_source("test.wgsl", src);
        let info = resolve(&module, &FeatureSet::new(), &mut diags)
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        let ir = lower(&module, &info, &mut diags).unwrap();
        validate(&ir).unwrap_or_else(|e| panic!("{e}\n{}", disassemble(&ir)));
        ir
    }

    #[test]
    fn folded_return_is_a_single_block() {
        let ir = lower_src("fn f() -> i32 { return 1 + 2; }");
        let f = ir.function_by_name("f").unwrap();
        assert_eq!(f.blocks.len(), 1);
        let Some(Terminator::Return(Some(v))) = &f.blocks[0].term else {
            panic!("expected a return with a value");
        };
        assert_eq!(
            ir.constant_value(*v),
            Some(&ConstValue::Scalar(ScalarValue::I32(3)))
        );
    }

    #[test]
    fn store_to_private_variable() {
        let ir = lower_src("var<private> x: i32; fn f() { x = 5; }");
        assert_eq!(ir.root.insts.len(), 1);
        assert!(matches!(
            ir.root.insts[0].kind,
            InstKind::Var {
                space: wgsl_ir::AddressSpace::Private,
                ..
            }
        ));
        let f = ir.function_by_name("f").unwrap();
        let store = f
            .insts()
            .find_map(|i| match i.kind {
                InstKind::Store { ptr, .. } => Some(ptr),
                _ => None,
            })
            .unwrap();
        assert_eq!(Some(store), ir.root.insts[0].dest);
    }

    #[test]
    fn logical_and_branches_around_the_right_operand() {
        let ir = lower_src("fn g() -> bool { return true; } fn f(a: bool) -> bool { return a && g(); }");
        let f = ir.function_by_name("f").unwrap();
        assert!(f.blocks.len() >= 3, "{}", disassemble(&ir));
        let call_blocks: Vec<_> = f
            .blocks
            .iter()
            .filter(|b| b.insts.iter().any(|i| matches!(i.kind, InstKind::Call { .. })))
            .collect();
        assert_eq!(call_blocks.len(), 1);
        assert_ne!(call_blocks[0].id, f.entry);
    }

    #[test]
    fn loops_have_a_back_edge() {
        let ir = lower_src(
            "fn f() -> i32 { var s = 0; for (var i = 0; i < 4; i++) { if i == 2 { continue; } s += i; } return s; }",
        );
        let f = ir.function_by_name("f").unwrap();
        let back_edge = f.blocks.iter().any(|b| {
            b.successors()
                .iter()
                .any(|s| f.blocks.iter().position(|x| x.id == *s) < f.blocks.iter().position(|x| x.id == b.id))
        });
        assert!(back_edge, "{}", disassemble(&ir));
    }

    #[test]
    fn switch_cases_map_to_blocks() {
        let ir = lower_src(
            "fn f(x: u32) -> u32 { var r = 0u; switch x { case 1u, 2u: { r = 1u; } default: { r = 2u; } } return r; }",
        );
        let f = ir.function_by_name("f").unwrap();
        let cases = f
            .blocks
            .iter()
            .find_map(|b| match &b.term {
                Some(Terminator::Switch { cases, .. }) => Some(cases.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(cases.iter().map(|c| c.0).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(cases[0].1, cases[1].1);
    }

    #[test]
    fn entry_point_metadata_is_carried() {
        let ir = lower_src(
            "@group(0) @binding(0) var<storage, read_write> out: array<u32>;\n\
             @compute @workgroup_size(64) fn main(@builtin(global_invocation_id) id: vec3<u32>) { out[id.x] = id.x * 2u; }",
        );
        let main = ir.entry_points().next().unwrap();
        assert_eq!(main.workgroup_size, Some([64, 1, 1]));
        assert_eq!(main.params[0].io.builtin.as_deref(), Some("global_invocation_id"));
    }

    #[test]
    fn override_initializer_must_fold() {
        let src = "override a: i32 = 1; override b = a * 2;";
        let (module, _) = wgsl_parse::parse_source(src);
        let mut diags = Diagnostics::for_source("test.wgsl", src);
        let info = resolve(&module, &FeatureSet::new(), &mut diags).unwrap();
        let e = lower(&module, &info, &mut diags).unwrap_err();
        assert!(matches!(e, LowerError::UnsupportedConstruct { .. }), "{e:?}");
        assert!(diags.has_errors());
    }
}
