#![forbid(unsafe_code)]
#![allow(unused_assignments)]

//! Structural checks over an IR [`Module`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use miette::Diagnostic;
use thiserror::Error;

use crate::ir::{BlockId, Function, InstKind, Module, Terminator, ValueId, ValueKind};

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[error("invalid IR in {location}: {message}")]
#[diagnostic(code(wgsl::ir))]
pub struct IrValidationError {
    pub location: String,
    pub message: String,
}

fn err(location: &str, message: impl Into<String>) -> IrValidationError {
    IrValidationError {
        location: location.to_string(),
        message: message.into(),
    }
}

/// Checks the invariants every producer and transform must preserve:
/// root block contents, one terminator per block, branch targets inside the
/// function, defined operands that dominate their uses, and no abstract
/// types.
pub fn validate(module: &Module) -> Result<(), IrValidationError> {
    let mut defined: HashMap<ValueId, &str> = HashMap::new();
    for inst in &module.root.insts {
        if !matches!(inst.kind, InstKind::Var { .. } | InstKind::Override { .. }) {
            return Err(err(
                "root block",
                format!("'{}' instruction at module scope", inst.kind.name()),
            ));
        }
        for operand in inst.kind.operands() {
            check_operand(module, "root block", operand, None)?;
            if let Some(ValueKind::Inst) = module.value(operand).map(|v| &v.kind) {
                if !defined.contains_key(&operand) {
                    return Err(err("root block", format!("%{} used before definition", operand.0)));
                }
            }
        }
        if let Some(dest) = inst.dest {
            check_defined_once(module, "root block", dest, &mut defined, "root")?;
        }
    }

    for function in &module.functions {
        validate_function(module, function, &defined)?;
    }
    Ok(())
}

fn check_defined_once<'a>(
    module: &Module,
    location: &str,
    dest: ValueId,
    defined: &mut HashMap<ValueId, &'a str>,
    owner: &'a str,
) -> Result<(), IrValidationError> {
    let Some(def) = module.value(dest) else {
        return Err(err(location, format!("result %{} has no value record", dest.0)));
    };
    if !matches!(def.kind, ValueKind::Inst) {
        return Err(err(location, format!("result %{} is not an instruction value", dest.0)));
    }
    if module.types.is_abstract(def.ty) {
        return Err(err(
            location,
            format!("%{} has abstract type '{}'", dest.0, module.types.display(def.ty)),
        ));
    }
    if defined.insert(dest, owner).is_some() {
        return Err(err(location, format!("%{} is defined more than once", dest.0)));
    }
    Ok(())
}

fn check_operand(
    module: &Module,
    location: &str,
    operand: ValueId,
    function: Option<&Function>,
) -> Result<(), IrValidationError> {
    let Some(def) = module.value(operand) else {
        return Err(err(location, format!("operand %{} does not exist", operand.0)));
    };
    if module.types.is_abstract(def.ty) {
        return Err(err(
            location,
            format!("operand %{} has abstract type '{}'", operand.0, module.types.display(def.ty)),
        ));
    }
    if let ValueKind::Param { function: owner, .. } = def.kind {
        if function.is_none_or(|f| f.id != owner) {
            return Err(err(location, format!("parameter %{} used outside its function", operand.0)));
        }
    }
    Ok(())
}

fn validate_function(
    module: &Module,
    function: &Function,
    root_defs: &HashMap<ValueId, &str>,
) -> Result<(), IrValidationError> {
    let location = format!("function '{}'", function.name);
    let ids: BTreeSet<BlockId> = function.blocks.iter().map(|b| b.id).collect();
    if ids.len() != function.blocks.len() {
        return Err(err(&location, "duplicate block ids"));
    }
    if !ids.contains(&function.entry) {
        return Err(err(&location, "entry block is missing"));
    }

    // Where each instruction value is defined: (block, position).
    let mut def_site: HashMap<ValueId, (BlockId, usize)> = HashMap::new();
    let mut defined = root_defs.clone();
    for block in &function.blocks {
        let Some(term) = &block.term else {
            return Err(err(&location, format!("block %b{} has no terminator", block.id.0)));
        };
        for target in block.successors() {
            if !ids.contains(&target) {
                return Err(err(
                    &location,
                    format!("block %b{} branches to %b{} outside the function", block.id.0, target.0),
                ));
            }
        }
        if let Terminator::Return(value) = term {
            if value.is_some() != function.ret.is_some() {
                return Err(err(&location, "return value does not match the function signature"));
            }
        }
        for (pos, inst) in block.insts.iter().enumerate() {
            if matches!(inst.kind, InstKind::Override { .. }) {
                return Err(err(&location, "'override' inside a function"));
            }
            if let Some(dest) = inst.dest {
                check_defined_once(module, &location, dest, &mut defined, "function")?;
                def_site.insert(dest, (block.id, pos));
            }
        }
    }

    let dominators = dominators(function);
    for block in &function.blocks {
        let reachable = dominators.contains_key(&block.id);
        let uses = block
            .insts
            .iter()
            .enumerate()
            .flat_map(|(pos, inst)| inst.kind.operands().into_iter().map(move |v| (pos, v)))
            .chain(
                block
                    .term
                    .iter()
                    .flat_map(|t| t.operands())
                    .map(|v| (usize::MAX, v)),
            );
        for (pos, value) in uses {
            check_operand(module, &location, value, Some(function))?;
            let Some(def) = module.value(value) else { continue };
            if !matches!(def.kind, ValueKind::Inst) || root_defs.contains_key(&value) {
                continue;
            }
            let Some(&(def_block, def_pos)) = def_site.get(&value) else {
                return Err(err(&location, format!("%{} is used but never defined here", value.0)));
            };
            if !reachable {
                continue;
            }
            let ok = if def_block == block.id {
                def_pos < pos
            } else {
                dominators
                    .get(&block.id)
                    .is_some_and(|doms| doms.contains(&def_block))
            };
            if !ok {
                return Err(err(
                    &location,
                    format!("definition of %{} does not dominate its use in %b{}", value.0, block.id.0),
                ));
            }
        }
    }
    Ok(())
}

/// Dominator sets of the blocks reachable from the entry.
pub fn dominators(function: &Function) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    let reachable = reachable_blocks(function);
    let mut preds: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for block in &function.blocks {
        if !reachable.contains(&block.id) {
            continue;
        }
        for succ in block.successors() {
            preds.entry(succ).or_default().push(block.id);
        }
    }

    let mut doms: BTreeMap<BlockId, BTreeSet<BlockId>> = reachable
        .iter()
        .map(|&b| {
            if b == function.entry {
                (b, BTreeSet::from([b]))
            } else {
                (b, reachable.clone())
            }
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &reachable {
            if b == function.entry {
                continue;
            }
            let mut new: Option<BTreeSet<BlockId>> = None;
            for p in preds.get(&b).into_iter().flatten() {
                let Some(pd) = doms.get(p) else { continue };
                new = Some(match new {
                    None => pd.clone(),
                    Some(acc) => acc.intersection(pd).copied().collect(),
                });
            }
            let mut new = new.unwrap_or_default();
            new.insert(b);
            if doms.get(&b) != Some(&new) {
                doms.insert(b, new);
                changed = true;
            }
        }
    }
    doms
}

pub fn reachable_blocks(function: &Function) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![function.entry];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(block) = function.block(id) {
            stack.extend(block.successors());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::constant::{ConstValue, ScalarValue};
    use crate::ir::{BinOp, IoAttributes};
    use crate::ty::{Scalar, TypeArena};
    use wgsl_ast::Span;

    fn sp() -> Span {
        Span::from(0..0)
    }

    #[test]
    fn accepts_well_formed_module() {
        let mut b = Builder::new(TypeArena::new());
        let i32_ty = b.types().i32();
        b.begin_function("f", sp(), None, None);
        b.set_return(i32_ty, IoAttributes::default());
        let one = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(1)));
        let v = b.inst(sp(), i32_ty, InstKind::Binary { op: BinOp::Add, lhs: one, rhs: one });
        b.terminate(Terminator::Return(Some(v)));
        b.finish_function();
        assert_eq!(validate(&b.finish()), Ok(()));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut b = Builder::new(TypeArena::new());
        b.begin_function("f", sp(), None, None);
        let mut module = b.finish();
        assert!(validate(&module).unwrap_err().message.contains("no terminator"));
        module.functions[0].blocks[0].term = Some(Terminator::Return(None));
        assert_eq!(validate(&module), Ok(()));
    }

    #[test]
    fn rejects_use_not_dominated_by_definition() {
        let mut b = Builder::new(TypeArena::new());
        let bool_ty = b.types().bool();
        let i32_ty = b.types().i32();
        b.begin_function("f", sp(), None, None);
        let cond = b.constant(bool_ty, ConstValue::Scalar(ScalarValue::Bool(true)));
        let one = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(1)));
        let then_bb = b.create_block(sp());
        let else_bb = b.create_block(sp());
        let merge = b.create_block(sp());
        b.terminate(Terminator::BranchIf { cond, then_bb, else_bb });
        b.switch_to(then_bb);
        let v = b.inst(sp(), i32_ty, InstKind::Unary { op: crate::ir::UnaryOp::Negate, operand: one });
        b.terminate(Terminator::Branch(merge));
        b.switch_to(else_bb);
        b.terminate(Terminator::Branch(merge));
        b.switch_to(merge);
        b.inst(sp(), i32_ty, InstKind::Let { name: "x".into(), value: v });
        b.finish_function();
        let e = validate(&b.finish()).unwrap_err();
        assert!(e.message.contains("does not dominate"), "{e}");
    }

    #[test]
    fn rejects_abstract_types() {
        let mut b = Builder::new(TypeArena::new());
        let ai = b.types().scalar(Scalar::AbstractInt);
        b.begin_function("f", sp(), None, None);
        let c = b.constant(ai, ConstValue::Scalar(ScalarValue::AbstractInt(1)));
        b.inst(sp(), ai, InstKind::Let { name: "x".into(), value: c });
        b.finish_function();
        let e = validate(&b.finish()).unwrap_err();
        assert!(e.message.contains("abstract"), "{e}");
    }

    #[test]
    fn rejects_non_declarations_in_root() {
        let mut module = Module::new();
        let i32_ty = module.types.i32();
        let dest = module.new_value(i32_ty, ValueKind::Inst);
        module.root.insts.push(crate::ir::Inst {
            span: sp(),
            dest: Some(dest),
            kind: InstKind::Discard,
        });
        assert!(validate(&module).is_err());
    }
}
