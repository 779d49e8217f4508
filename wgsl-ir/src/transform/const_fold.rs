#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::constant::{ConstValue, EvalMode, ScalarValue};
use crate::ir::{BinOp, InstKind, Module, Terminator, UnaryOp, ValueId};
use crate::ty::{Type, TypeId};

use super::{DataMap, Transform, TransformError};

/// Replaces instructions whose operands are all constants with the constant
/// they compute, then collapses branches on constant conditions.
///
/// Folding uses runtime arithmetic: integer overflow wraps and division by
/// zero follows the WGSL runtime rules rather than failing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantFolding;

impl Transform for ConstantFolding {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn apply(&self, module: &mut Module, _inputs: &DataMap) -> Result<DataMap, TransformError> {
        let mut folded = 0usize;
        for index in 0..module.functions.len() {
            folded += fold_function(module, index);
        }
        if folded > 0 {
            log::debug!("folded {folded} instructions");
        }
        Ok(DataMap::new())
    }
}

fn fold_function(module: &mut Module, index: usize) -> usize {
    let mut replace: HashMap<ValueId, ValueId> = HashMap::new();
    let mut folded = 0;
    let block_count = module.functions[index].blocks.len();
    for b in 0..block_count {
        let mut i = 0;
        while i < module.functions[index].blocks[b].insts.len() {
            let inst = &mut module.functions[index].blocks[b].insts[i];
            inst.kind.map_operands(|v| *replace.get(&v).unwrap_or(&v));
            let Some(dest) = inst.dest else {
                i += 1;
                continue;
            };
            let kind = inst.kind.clone();
            let Some(ty) = module.value_type(dest) else {
                i += 1;
                continue;
            };
            match evaluate(module, &kind, ty) {
                Some(value) => {
                    let constant = module.constant(ty, value);
                    replace.insert(dest, constant);
                    module.functions[index].blocks[b].insts.remove(i);
                    folded += 1;
                }
                None => i += 1,
            }
        }
    }

    for block in &mut module.functions[index].blocks {
        if let Some(term) = &mut block.term {
            term.map_operands(|v| *replace.get(&v).unwrap_or(&v));
        }
    }

    for b in 0..block_count {
        let simplified = match &module.functions[index].blocks[b].term {
            Some(Terminator::BranchIf {
                cond,
                then_bb,
                else_bb,
            }) => module
                .constant_value(*cond)
                .and_then(ConstValue::as_bool)
                .map(|c| Terminator::Branch(if c { *then_bb } else { *else_bb })),
            Some(Terminator::Switch {
                selector,
                default_bb,
                cases,
            }) => module.constant_value(*selector).and_then(ConstValue::as_i64).map(|s| {
                let target = cases
                    .iter()
                    .find(|(v, _)| *v == s)
                    .map_or(*default_bb, |(_, bb)| *bb);
                Terminator::Branch(target)
            }),
            _ => None,
        };
        if let Some(term) = simplified {
            module.functions[index].blocks[b].term = Some(term);
            folded += 1;
        }
    }
    folded
}

fn constant(module: &Module, id: ValueId) -> Option<&ConstValue> {
    module.constant_value(id)
}

fn evaluate(module: &mut Module, kind: &InstKind, ty: TypeId) -> Option<ConstValue> {
    match kind {
        InstKind::Let { value, .. } => constant(module, *value).cloned(),
        InstKind::Binary { op, lhs, rhs } => {
            let lhs = constant(module, *lhs)?.clone();
            let rhs = constant(module, *rhs)?.clone();
            fold_binary(*op, &lhs, &rhs, ty)
        }
        InstKind::Unary { op, operand } => {
            let operand = constant(module, *operand)?.clone();
            fold_unary(*op, &operand, ty)
        }
        InstKind::Convert { value } => {
            let value = constant(module, *value)?.clone();
            let target = module.types.scalar_of(ty)?;
            map_scalars(&value, ty, &|s| s.convert(target).ok())
        }
        InstKind::Construct { args } => {
            let elements = args
                .iter()
                .map(|a| constant(module, *a).cloned())
                .collect::<Option<Vec<_>>>()?;
            construct(module, ty, elements)
        }
        InstKind::Swizzle { base, components } => {
            let base = constant(module, *base)?.clone();
            if components.len() == 1 {
                return base.element(usize::from(components[0])).cloned();
            }
            let elements = components
                .iter()
                .map(|c| base.element(usize::from(*c)).cloned())
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Composite { ty, elements })
        }
        InstKind::Access { base, indices } => {
            let mut value = constant(module, *base)?.clone();
            for index in indices {
                let i = constant(module, *index)?.as_i64()?;
                value = value.element(usize::try_from(i).ok()?)?.clone();
            }
            Some(value)
        }
        _ => None,
    }
}

/// Constructor arguments spread into components: `vec4(v2, 0, 1)` takes
/// the components of `v2` first.
fn construct(module: &Module, ty: TypeId, args: Vec<ConstValue>) -> Option<ConstValue> {
    match module.types.get(ty) {
        Type::Scalar(s) => {
            let s = *s;
            match args.as_slice() {
                [ConstValue::Scalar(v)] => v.convert(s).ok().map(ConstValue::Scalar),
                _ => None,
            }
        }
        Type::Vector { size, .. } => {
            let size = usize::from(*size);
            let mut elements = Vec::with_capacity(size);
            for arg in args {
                match arg {
                    ConstValue::Scalar(_) => elements.push(arg),
                    ConstValue::Composite { elements: inner, .. } => elements.extend(inner),
                }
            }
            if elements.len() == 1 {
                elements = vec![elements[0].clone(); size];
            }
            (elements.len() == size).then_some(ConstValue::Composite { ty, elements })
        }
        Type::Array { .. } | Type::Struct(_) | Type::Matrix { .. } => {
            if args.is_empty() {
                return None;
            }
            let expected = match module.types.get(ty) {
                Type::Struct(s) => s.members.len(),
                _ => module.types.element_count(ty)? as usize,
            };
            let composite_args = args.iter().all(|a| matches!(a, ConstValue::Composite { .. }))
                || matches!(module.types.get(ty), Type::Struct(_) | Type::Array { .. });
            (args.len() == expected && composite_args)
                .then_some(ConstValue::Composite { ty, elements: args })
        }
        _ => None,
    }
}

fn map_scalars(
    value: &ConstValue,
    ty: TypeId,
    f: &dyn Fn(ScalarValue) -> Option<ScalarValue>,
) -> Option<ConstValue> {
    match value {
        ConstValue::Scalar(s) => f(*s).map(ConstValue::Scalar),
        ConstValue::Composite { elements, .. } => {
            let elements = elements
                .iter()
                .map(|e| e.as_scalar().and_then(f).map(ConstValue::Scalar))
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Composite { ty, elements })
        }
    }
}

fn fold_unary(op: UnaryOp, value: &ConstValue, ty: TypeId) -> Option<ConstValue> {
    match value {
        ConstValue::Scalar(s) => s.unary(op, EvalMode::Wrapping).ok().map(ConstValue::Scalar),
        ConstValue::Composite { elements, .. } => {
            let elements = elements
                .iter()
                .map(|e| e.as_scalar()?.unary(op, EvalMode::Wrapping).ok().map(ConstValue::Scalar))
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Composite { ty, elements })
        }
    }
}

/// Scalar and component-wise vector arithmetic. A scalar operand is splat
/// against a vector one.
fn fold_binary(op: BinOp, lhs: &ConstValue, rhs: &ConstValue, ty: TypeId) -> Option<ConstValue> {
    let eval = |a: ScalarValue, b: ScalarValue| a.binary(op, b, EvalMode::Wrapping).ok();
    match (lhs, rhs) {
        (ConstValue::Scalar(a), ConstValue::Scalar(b)) => eval(*a, *b).map(ConstValue::Scalar),
        (ConstValue::Composite { elements: a, .. }, ConstValue::Composite { elements: b, .. }) => {
            if a.len() != b.len() {
                return None;
            }
            let elements = a
                .iter()
                .zip(b)
                .map(|(x, y)| eval(x.as_scalar()?, y.as_scalar()?).map(ConstValue::Scalar))
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Composite { ty, elements })
        }
        (ConstValue::Composite { elements, .. }, ConstValue::Scalar(s)) => {
            let elements = elements
                .iter()
                .map(|x| eval(x.as_scalar()?, *s).map(ConstValue::Scalar))
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Composite { ty, elements })
        }
        (ConstValue::Scalar(s), ConstValue::Composite { elements, .. }) => {
            let elements = elements
                .iter()
                .map(|y| eval(*s, y.as_scalar()?).map(ConstValue::Scalar))
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Composite { ty, elements })
        }
    }
}
