#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::ir::{Function, InstKind, Module, ValueId};
use crate::ty::AddressSpace;
use crate::validate::reachable_blocks;

use super::{DataMap, Transform, TransformError};

/// Removes blocks no path from the entry reaches, then repeatedly removes
/// side-effect-free instructions whose results are never used.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadCodeElimination;

impl Transform for DeadCodeElimination {
    fn name(&self) -> &str {
        "DeadCodeElimination"
    }

    fn apply(&self, module: &mut Module, _inputs: &DataMap) -> Result<DataMap, TransformError> {
        for function in &mut module.functions {
            let blocks = remove_unreachable_blocks(function);
            let insts = remove_unused_insts(function);
            if blocks + insts > 0 {
                log::debug!(
                    "'{}': removed {blocks} unreachable blocks and {insts} dead instructions",
                    function.name
                );
            }
        }
        Ok(DataMap::new())
    }
}

fn remove_unreachable_blocks(function: &mut Function) -> usize {
    let reachable = reachable_blocks(function);
    let before = function.blocks.len();
    function.blocks.retain(|b| reachable.contains(&b.id));
    before - function.blocks.len()
}

fn use_counts(function: &Function) -> HashMap<ValueId, usize> {
    let mut uses = HashMap::new();
    for block in &function.blocks {
        for inst in &block.insts {
            for v in inst.kind.operands() {
                *uses.entry(v).or_insert(0) += 1;
            }
        }
        for v in block.term.iter().flat_map(|t| t.operands()) {
            *uses.entry(v).or_insert(0) += 1;
        }
    }
    uses
}

fn removable(kind: &InstKind) -> bool {
    match kind {
        InstKind::Var { space, .. } => *space == AddressSpace::Function,
        _ => kind.is_pure(),
    }
}

fn remove_unused_insts(function: &mut Function) -> usize {
    let mut removed = 0;
    loop {
        let uses = use_counts(function);
        let mut changed = false;
        for block in &mut function.blocks {
            let before = block.insts.len();
            block.insts.retain(|inst| {
                let Some(dest) = inst.dest else { return true };
                !(removable(&inst.kind) && !uses.contains_key(&dest))
            });
            if block.insts.len() != before {
                removed += before - block.insts.len();
                changed = true;
            }
        }
        if !changed {
            return removed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::constant::{ConstValue, ScalarValue};
    use crate::ir::{BinOp, Terminator};
    use crate::ty::TypeArena;
    use crate::validate::validate;
    use wgsl_ast::Span;

    fn sp() -> Span {
        Span::from(0..0)
    }

    #[test]
    fn removes_unused_pure_chain_and_unreachable_blocks() {
        let mut b = Builder::new(TypeArena::new());
        let i32_ty = b.types().i32();
        b.begin_function("f", sp(), None, None);
        let one = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(1)));
        let x = b.local_var(sp(), "x", i32_ty, Some(one));
        let loaded = b.inst(sp(), i32_ty, InstKind::Load { ptr: x });
        b.inst(sp(), i32_ty, InstKind::Binary { op: BinOp::Add, lhs: loaded, rhs: one });
        b.terminate(Terminator::Return(None));
        let dead = b.create_block(sp());
        b.switch_to(dead);
        b.effect(sp(), InstKind::Discard);
        b.finish_function();
        let mut module = b.finish();

        DeadCodeElimination.apply(&mut module, &DataMap::new()).unwrap();
        validate(&module).unwrap();
        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 1);
        assert!(f.blocks[0].insts.is_empty());

        let once = module.clone();
        DeadCodeElimination.apply(&mut module, &DataMap::new()).unwrap();
        assert_eq!(module, once);
    }

    #[test]
    fn keeps_side_effects() {
        let mut b = Builder::new(TypeArena::new());
        let i32_ty = b.types().i32();
        let g = b.root_var(sp(), "g", AddressSpace::Private, crate::ty::Access::ReadWrite, i32_ty, None, None);
        b.begin_function("f", sp(), None, None);
        let one = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(1)));
        b.effect(sp(), InstKind::Store { ptr: g, value: one });
        b.inst(sp(), i32_ty, InstKind::BuiltinCall { name: "atomicAdd".into(), args: vec![g, one] });
        b.finish_function();
        let mut module = b.finish();
        DeadCodeElimination.apply(&mut module, &DataMap::new()).unwrap();
        assert_eq!(module.functions[0].blocks[0].insts.len(), 2);
    }
}
