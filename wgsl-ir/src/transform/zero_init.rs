#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::constant::{ConstValue, ScalarValue};
use crate::ir::{
    BasicBlock, BinOp, BlockId, Function, FunctionId, Inst, InstKind, IoAttributes, Module,
    Param, Stage, Terminator, ValueId, ValueKind,
};
use crate::ty::{Type, TypeId};

use super::{DataKey, DataMap, EntryPointInterfaces, Transform, TransformError};

const LOCAL_INDEX: &str = "local_invocation_index";
const NAME: &str = "ZeroInitWorkgroupMemory";

/// Makes compute entry points zero their `var<workgroup>` memory before
/// any other code runs: invocation 0 stores zeros, then every invocation
/// waits on a workgroup barrier.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroInitWorkgroupMemory;

impl Transform for ZeroInitWorkgroupMemory {
    fn name(&self) -> &str {
        NAME
    }

    fn inputs(&self) -> Vec<DataKey> {
        vec![DataKey::of::<EntryPointInterfaces>()]
    }

    fn apply(&self, module: &mut Module, inputs: &DataMap) -> Result<DataMap, TransformError> {
        let interfaces = inputs.get::<EntryPointInterfaces>().ok_or_else(|| {
            TransformError::MissingTransformInput {
                transform: NAME.to_string(),
                input: DataKey::of::<EntryPointInterfaces>().name().to_string(),
            }
        })?;
        for entry in &interfaces.entries {
            if entry.stage != Stage::Compute || entry.workgroup_vars.is_empty() {
                continue;
            }
            init_entry(module, entry.function, &entry.workgroup_vars)?;
        }
        Ok(DataMap::new())
    }
}

/// The zeroing block a previous run inserted, and the variables it covers.
fn existing_init(function: &Function) -> Option<(BlockId, BTreeSet<ValueId>)> {
    let entry = function.block(function.entry)?;
    let Some(Terminator::BranchIf {
        then_bb, else_bb, ..
    }) = &entry.term
    else {
        return None;
    };
    let init = function.block(*then_bb)?;
    if init.term != Some(Terminator::Branch(*else_bb)) {
        return None;
    }
    let cont = function.block(*else_bb)?;
    let barrier = cont
        .insts
        .first()
        .is_some_and(|i| matches!(&i.kind, InstKind::BuiltinCall { name, .. } if name == "workgroupBarrier"));
    if !barrier {
        return None;
    }
    let mut vars = BTreeSet::new();
    for inst in &init.insts {
        match &inst.kind {
            InstKind::Store { ptr, .. } => {
                vars.insert(*ptr);
            }
            InstKind::BuiltinCall { name, args } if name == "atomicStore" => {
                vars.extend(args.first().copied());
            }
            _ => return None,
        }
    }
    Some((init.id, vars))
}

fn zero_store(module: &mut Module, var: ValueId, store: TypeId, span: wgsl_ast::Span) -> Result<Inst, TransformError> {
    if let Type::Atomic(scalar) = module.types.get(store).clone() {
        let scalar_ty = module.types.scalar(scalar);
        let zero = module.constant(scalar_ty, ConstValue::Scalar(ScalarValue::zero(scalar)));
        return Ok(Inst {
            span,
            dest: None,
            kind: InstKind::BuiltinCall {
                name: "atomicStore".to_string(),
                args: vec![var, zero],
            },
        });
    }
    let Some(value) = ConstValue::zero(&mut module.types, store) else {
        return Err(TransformError::UnsupportedConstruct {
            transform: NAME.to_string(),
            construct: format!("workgroup memory of type '{}'", module.types.display(store)),
        });
    };
    let zero = module.constant(store, value);
    Ok(Inst {
        span,
        dest: None,
        kind: InstKind::Store { ptr: var, value: zero },
    })
}

fn local_index_param(module: &mut Module, fid: FunctionId) -> Option<ValueId> {
    let function = module.function(fid)?;
    if let Some(p) = function
        .params
        .iter()
        .find(|p| p.io.builtin.as_deref() == Some(LOCAL_INDEX))
    {
        return Some(p.value);
    }
    let index = function.params.len() as u32;
    let u32_ty = module.types.u32();
    let value = module.new_value(u32_ty, ValueKind::Param { function: fid, index });
    module.function_mut(fid)?.params.push(Param {
        name: format!("__{LOCAL_INDEX}"),
        ty: u32_ty,
        value,
        io: IoAttributes {
            builtin: Some(LOCAL_INDEX.to_string()),
            ..IoAttributes::default()
        },
    });
    Some(value)
}

fn init_entry(module: &mut Module, fid: FunctionId, vars: &[ValueId]) -> Result<(), TransformError> {
    let Some(function) = module.function(fid) else {
        return Ok(());
    };
    let span = function.span;
    let existing = existing_init(function);
    let done = existing.as_ref().map(|(_, v)| v.clone()).unwrap_or_default();
    let pending: Vec<ValueId> = vars.iter().copied().filter(|v| !done.contains(v)).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let mut stores = Vec::with_capacity(pending.len());
    for var in pending {
        let store = match module.value_type(var).map(|t| module.types.get(t)) {
            Some(Type::Pointer { store, .. }) => *store,
            _ => continue,
        };
        stores.push(zero_store(module, var, store, span)?);
    }

    if let Some((init_id, _)) = existing {
        if let Some(init) = module.function_mut(fid).and_then(|f| f.block_mut(init_id)) {
            init.insts.extend(stores);
        }
        return Ok(());
    }

    let Some(index) = local_index_param(module, fid) else {
        return Ok(());
    };
    let u32_ty = module.types.u32();
    let bool_ty = module.types.bool();
    let zero = module.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(0)));
    let cond = module.new_value(bool_ty, ValueKind::Inst);

    let Some(function) = module.function_mut(fid) else {
        return Ok(());
    };
    let next = function.blocks.iter().map(|b| b.id.0).max().map_or(0, |m| m + 1);
    let init_id = BlockId(next);
    let cont_id = BlockId(next + 1);
    let Some(entry_pos) = function.blocks.iter().position(|b| b.id == function.entry) else {
        return Ok(());
    };
    let entry = &mut function.blocks[entry_pos];
    let body = std::mem::take(&mut entry.insts);
    let term = entry.term.take();
    entry.insts.push(Inst {
        span,
        dest: Some(cond),
        kind: InstKind::Binary {
            op: BinOp::Eq,
            lhs: index,
            rhs: zero,
        },
    });
    entry.term = Some(Terminator::BranchIf {
        cond,
        then_bb: init_id,
        else_bb: cont_id,
    });

    let mut cont_insts = vec![Inst {
        span,
        dest: None,
        kind: InstKind::BuiltinCall {
            name: "workgroupBarrier".to_string(),
            args: Vec::new(),
        },
    }];
    cont_insts.extend(body);
    function.blocks.insert(
        entry_pos + 1,
        BasicBlock {
            id: init_id,
            span,
            insts: stores,
            term: Some(Terminator::Branch(cont_id)),
        },
    );
    function.blocks.insert(
        entry_pos + 2,
        BasicBlock {
            id: cont_id,
            span,
            insts: cont_insts,
            term,
        },
    );
    log::debug!("zero-initialized workgroup memory in '{}'", function.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::display::disassemble;
    use crate::transform::EntryPointInterface;
    use crate::ty::{Access, AddressSpace, ArraySize, Scalar, TypeArena};
    use crate::validate::validate;
    use wgsl_ast::Span;

    fn module_with_workgroup_array() -> Module {
        let sp = Span::from(0..0);
        let mut b = Builder::new(TypeArena::new());
        let f32_ty = b.types().f32();
        let arr = b.types().array(f32_ty, ArraySize::Constant(4));
        let counter = b.types().insert(Type::Atomic(Scalar::U32));
        let tile = b.root_var(sp, "tile", AddressSpace::Workgroup, Access::ReadWrite, arr, None, None);
        let count = b.root_var(sp, "count", AddressSpace::Workgroup, Access::ReadWrite, counter, None, None);
        b.begin_function("main", sp, Some(Stage::Compute), Some([4, 1, 1]));
        let u32_ty = b.types().u32();
        b.inst(sp, arr, InstKind::Load { ptr: tile });
        b.inst(sp, u32_ty, InstKind::BuiltinCall { name: "atomicLoad".into(), args: vec![count] });
        b.finish_function();
        b.finish()
    }

    fn run(module: &mut Module) {
        let data = EntryPointInterface.apply(module, &DataMap::new()).unwrap();
        ZeroInitWorkgroupMemory.apply(module, &data).unwrap();
        validate(module).unwrap();
    }

    #[test]
    fn guards_zeroing_with_invocation_zero_and_barrier() {
        let mut module = module_with_workgroup_array();
        run(&mut module);
        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 3);
        assert_eq!(f.params.len(), 1);
        assert_eq!(f.params[0].io.builtin.as_deref(), Some(LOCAL_INDEX));
        let text = disassemble(&module);
        assert!(text.contains("store %0, array<f32, 4>(0.0f, 0.0f, 0.0f, 0.0f)"), "{text}");
        assert!(text.contains("atomicStore %1, 0u"), "{text}");
        assert!(text.contains("workgroupBarrier"), "{text}");
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let mut module = module_with_workgroup_array();
        run(&mut module);
        let once = module.clone();
        run(&mut module);
        assert_eq!(module, once);
    }

    #[test]
    fn requires_interfaces() {
        let mut module = module_with_workgroup_array();
        let err = ZeroInitWorkgroupMemory
            .apply(&mut module, &DataMap::new())
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingTransformInput { .. }));
    }
}
