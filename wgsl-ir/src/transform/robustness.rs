#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::constant::{ConstValue, ScalarValue};
use crate::ir::{BinOp, Inst, InstKind, Module, ValueId, ValueKind};
use crate::ty::{AddressSpace, ArraySize, Scalar, Type, TypeId};

use super::{DataKey, DataMap, Transform, TransformError};

const NAME: &str = "Robustness";

/// Which accesses [`Robustness`] leaves alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// Pointer accesses into these address spaces are not clamped.
    pub ignored_spaces: BTreeSet<AddressSpace>,
}

/// Clamps dynamic array, vector and matrix indices into bounds with
/// `min(u32(i), count - 1)`. Runtime-sized arrays use `arrayLength`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Robustness;

impl Transform for Robustness {
    fn name(&self) -> &str {
        NAME
    }

    fn inputs(&self) -> Vec<DataKey> {
        vec![DataKey::of::<RobustnessConfig>()]
    }

    fn apply(&self, module: &mut Module, inputs: &DataMap) -> Result<DataMap, TransformError> {
        let config = inputs.get::<RobustnessConfig>().ok_or_else(|| {
            TransformError::MissingTransformInput {
                transform: NAME.to_string(),
                input: DataKey::of::<RobustnessConfig>().name().to_string(),
            }
        })?;
        for index in 0..module.functions.len() {
            let clamped = clamp_function(module, index, config)?;
            if clamped > 0 {
                log::debug!("clamped {clamped} indices in '{}'", module.functions[index].name);
            }
        }
        Ok(DataMap::new())
    }
}

/// What earlier instructions in the function define, for recognising
/// indices this transform already clamped.
#[derive(Default)]
struct Defs {
    /// `min` results and their bound operand.
    min_bound: HashMap<ValueId, ValueId>,
    /// `arrayLength(p) - 1` results.
    length_bound: HashSet<ValueId>,
    array_length: HashSet<ValueId>,
    access_base: HashMap<ValueId, ValueId>,
}

impl Defs {
    fn record(&mut self, inst: &Inst) {
        let Some(dest) = inst.dest else { return };
        match &inst.kind {
            InstKind::BuiltinCall { name, args } if name == "min" && args.len() == 2 => {
                self.min_bound.insert(dest, args[1]);
            }
            InstKind::BuiltinCall { name, .. } if name == "arrayLength" => {
                self.array_length.insert(dest);
            }
            InstKind::Binary {
                op: BinOp::Sub,
                lhs,
                ..
            } if self.array_length.contains(lhs) => {
                self.length_bound.insert(dest);
            }
            InstKind::Access { base, .. } => {
                self.access_base.insert(dest, *base);
            }
            _ => {}
        }
    }

    fn root_of(&self, mut value: ValueId) -> ValueId {
        while let Some(base) = self.access_base.get(&value) {
            value = *base;
        }
        value
    }
}

enum Bound {
    Constant(u32),
    Runtime,
}

fn is_clamped(module: &Module, defs: &Defs, index: ValueId, bound: &Bound) -> bool {
    let Some(limit) = defs.min_bound.get(&index) else {
        return false;
    };
    match bound {
        Bound::Constant(n) => module
            .constant_value(*limit)
            .and_then(ConstValue::as_i64)
            .is_some_and(|l| l >= 0 && l < i64::from(*n)),
        Bound::Runtime => defs.length_bound.contains(limit),
    }
}

fn clamp_function(
    module: &mut Module,
    index: usize,
    config: &RobustnessConfig,
) -> Result<usize, TransformError> {
    let mut defs = Defs::default();
    let mut clamped = 0;
    for b in 0..module.functions[index].blocks.len() {
        let old = std::mem::take(&mut module.functions[index].blocks[b].insts);
        let mut insts = Vec::with_capacity(old.len());
        for mut inst in old {
            if let InstKind::Access { base, indices } = &mut inst.kind {
                let mut pending = Vec::new();
                clamped += clamp_access(
                    module,
                    config,
                    &defs,
                    inst.span,
                    *base,
                    indices,
                    &mut pending,
                )?;
                for p in &pending {
                    defs.record(p);
                }
                insts.extend(pending);
            }
            defs.record(&inst);
            insts.push(inst);
        }
        module.functions[index].blocks[b].insts = insts;
    }
    Ok(clamped)
}

fn push(module: &mut Module, out: &mut Vec<Inst>, span: wgsl_ast::Span, ty: TypeId, kind: InstKind) -> ValueId {
    let dest = module.new_value(ty, ValueKind::Inst);
    out.push(Inst {
        span,
        dest: Some(dest),
        kind,
    });
    dest
}

fn clamp_access(
    module: &mut Module,
    config: &RobustnessConfig,
    defs: &Defs,
    span: wgsl_ast::Span,
    base: ValueId,
    indices: &mut [ValueId],
    out: &mut Vec<Inst>,
) -> Result<usize, TransformError> {
    let Some(base_ty) = module.value_type(base) else {
        return Ok(0);
    };
    let (mut current, pointer) = match module.types.get(base_ty) {
        Type::Pointer {
            space,
            store,
            access,
        } => {
            if config.ignored_spaces.contains(space) {
                return Ok(0);
            }
            (*store, Some((*space, *access)))
        }
        _ => (base_ty, None),
    };

    let mut clamped = 0;
    for k in 0..indices.len() {
        let index = indices[k];
        let ty = module.types.get(current).clone();
        let bound = match &ty {
            Type::Struct(s) => {
                let member = module
                    .constant_value(index)
                    .and_then(ConstValue::as_i64)
                    .and_then(|i| s.members.get(usize::try_from(i).ok()?));
                match member {
                    Some(m) => current = m.ty,
                    None => return Ok(clamped),
                }
                continue;
            }
            Type::Array {
                size: ArraySize::Runtime,
                ..
            } => Bound::Runtime,
            _ => match module.types.element_count(current) {
                Some(n) => Bound::Constant(n),
                None => return Ok(clamped),
            },
        };
        let Some(element) = module.types.element(current) else {
            return Ok(clamped);
        };

        if let Some(c) = module.constant_value(index).and_then(ConstValue::as_i64) {
            if let Bound::Constant(n) = bound {
                if c < 0 || c >= i64::from(n) {
                    let u32_ty = module.types.u32();
                    let last = ScalarValue::U32(n.saturating_sub(1));
                    indices[k] = module.constant(u32_ty, ConstValue::Scalar(last));
                    clamped += 1;
                }
                current = element;
                continue;
            }
        }
        if is_clamped(module, defs, index, &bound) {
            current = element;
            continue;
        }

        if matches!(bound, Bound::Runtime) && pointer.is_none() {
            return Ok(clamped);
        }

        // Not interned until a clamp is emitted.
        let u32_ty = module.types.u32();
        let unsigned = match module.value_type(index).and_then(|t| module.types.as_scalar(t)) {
            Some(Scalar::U32) => index,
            _ => push(module, out, span, u32_ty, InstKind::Convert { value: index }),
        };
        let limit = match bound {
            Bound::Constant(n) => {
                module.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(n.saturating_sub(1))))
            }
            Bound::Runtime => {
                let Some((space, access)) = pointer else {
                    return Ok(clamped);
                };
                if matches!(module.value(defs.root_of(base)).map(|v| &v.kind), Some(ValueKind::Param { .. })) {
                    return Err(TransformError::UnsupportedConstruct {
                        transform: NAME.to_string(),
                        construct: "runtime-sized array reached through a pointer parameter".to_string(),
                    });
                }
                let array_ptr = if k == 0 {
                    base
                } else {
                    let ptr_ty = module.types.pointer(space, current, access);
                    push(
                        module,
                        out,
                        span,
                        ptr_ty,
                        InstKind::Access {
                            base,
                            indices: indices[..k].to_vec(),
                        },
                    )
                };
                let length = push(
                    module,
                    out,
                    span,
                    u32_ty,
                    InstKind::BuiltinCall {
                        name: "arrayLength".to_string(),
                        args: vec![array_ptr],
                    },
                );
                let one = module.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(1)));
                push(
                    module,
                    out,
                    span,
                    u32_ty,
                    InstKind::Binary {
                        op: BinOp::Sub,
                        lhs: length,
                        rhs: one,
                    },
                )
            }
        };
        indices[k] = push(
            module,
            out,
            span,
            u32_ty,
            InstKind::BuiltinCall {
                name: "min".to_string(),
                args: vec![unsigned, limit],
            },
        );
        clamped += 1;
        current = element;
    }
    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::display::disassemble;
    use crate::ir::{BindingPoint, IoAttributes};
    use crate::ty::{Access, MemberDecl, TypeArena};
    use crate::validate::validate;
    use wgsl_ast::Span;

    fn sp() -> Span {
        Span::from(0..0)
    }

    fn config() -> DataMap {
        DataMap::new().with(RobustnessConfig::default())
    }

    #[test]
    fn clamps_dynamic_index_into_fixed_array() {
        let mut b = Builder::new(TypeArena::new());
        let f32_ty = b.types().f32();
        let i32_ty = b.types().i32();
        let arr = b.types().array(f32_ty, ArraySize::Constant(8));
        let data = b.root_var(sp(), "data", AddressSpace::Private, Access::ReadWrite, arr, None, None);
        b.begin_function("f", sp(), None, None);
        let i = b.add_param("i", i32_ty, IoAttributes::default());
        let ptr_ty = b.types().pointer(AddressSpace::Private, f32_ty, Access::ReadWrite);
        let elem = b.inst(sp(), ptr_ty, InstKind::Access { base: data, indices: vec![i] });
        b.inst(sp(), f32_ty, InstKind::Load { ptr: elem });
        b.finish_function();
        let mut module = b.finish();

        Robustness.apply(&mut module, &config()).unwrap();
        validate(&module).unwrap();
        let text = disassemble(&module);
        assert!(text.contains("convert %"), "{text}");
        assert!(text.contains(", 7u"), "{text}");
        assert!(text.contains("min %"), "{text}");

        let once = module.clone();
        Robustness.apply(&mut module, &config()).unwrap();
        assert_eq!(module, once);
    }

    #[test]
    fn runtime_array_uses_array_length() {
        let mut b = Builder::new(TypeArena::new());
        let u32_ty = b.types().u32();
        let runtime = b.types().array(u32_ty, ArraySize::Runtime);
        let buffer = b.types().structure(
            "Buffer",
            vec![
                MemberDecl { name: "count".into(), ty: u32_ty, size: None, align: None },
                MemberDecl { name: "items".into(), ty: runtime, size: None, align: None },
            ],
        );
        let buf = b.root_var(
            sp(),
            "buf",
            AddressSpace::Storage,
            Access::ReadWrite,
            buffer,
            None,
            Some(BindingPoint { group: 0, binding: 0 }),
        );
        b.begin_function("f", sp(), None, None);
        let i = b.add_param("i", u32_ty, IoAttributes::default());
        let member = b.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(1)));
        let ptr_ty = b.types().pointer(AddressSpace::Storage, u32_ty, Access::ReadWrite);
        b.inst(sp(), ptr_ty, InstKind::Access { base: buf, indices: vec![member, i] });
        b.finish_function();
        let mut module = b.finish();

        Robustness.apply(&mut module, &config()).unwrap();
        validate(&module).unwrap();
        let text = disassemble(&module);
        assert!(text.contains("arrayLength %"), "{text}");
        assert!(text.contains("sub %"), "{text}");
        assert!(!text.contains("convert"), "{text}");
    }

    #[test]
    fn ignored_spaces_are_left_alone() {
        let mut b = Builder::new(TypeArena::new());
        let f32_ty = b.types().f32();
        let i32_ty = b.types().i32();
        let arr = b.types().array(f32_ty, ArraySize::Constant(8));
        let data = b.root_var(sp(), "data", AddressSpace::Private, Access::ReadWrite, arr, None, None);
        b.begin_function("f", sp(), None, None);
        let i = b.add_param("i", i32_ty, IoAttributes::default());
        let ptr_ty = b.types().pointer(AddressSpace::Private, f32_ty, Access::ReadWrite);
        b.inst(sp(), ptr_ty, InstKind::Access { base: data, indices: vec![i] });
        b.finish_function();
        let mut module = b.finish();
        let before = module.clone();
        let config = RobustnessConfig {
            ignored_spaces: BTreeSet::from([AddressSpace::Private]),
        };
        Robustness.apply(&mut module, &DataMap::new().with(config)).unwrap();
        assert_eq!(module, before);
    }

    #[test]
    fn in_bounds_constant_indices_leave_the_module_unchanged() {
        let mut b = Builder::new(TypeArena::new());
        let f32_ty = b.types().f32();
        let i32_ty = b.types().i32();
        let arr = b.types().array(f32_ty, ArraySize::Constant(4));
        let data = b.root_var(sp(), "data", AddressSpace::Private, Access::ReadWrite, arr, None, None);
        b.begin_function("f", sp(), None, None);
        let two = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(2)));
        let ptr_ty = b.types().pointer(AddressSpace::Private, f32_ty, Access::ReadWrite);
        b.inst(sp(), ptr_ty, InstKind::Access { base: data, indices: vec![two] });
        b.finish_function();
        let mut module = b.finish();
        let before = module.clone();
        Robustness.apply(&mut module, &config()).unwrap();
        assert_eq!(module, before);
    }
}
