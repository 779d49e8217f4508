#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::ir::{BindingPoint, InstKind, Module};

use super::{DataKey, DataMap, Transform, TransformError};

const NAME: &str = "BindingRemapper";

/// Old binding point to new binding point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingRemap {
    pub bindings: BTreeMap<BindingPoint, BindingPoint>,
}

impl BindingRemap {
    /// Rejects maps whose targets are themselves remapped.
    fn check(&self) -> Result<(), TransformError> {
        for (from, to) in &self.bindings {
            if from == to {
                continue;
            }
            if let Some(next) = self.bindings.get(to).filter(|next| *next != to) {
                return Err(TransformError::InvalidInput {
                    transform: NAME.to_string(),
                    message: format!(
                        "chained binding remap @group({}) @binding({}) -> @group({}) @binding({}) -> @group({}) @binding({})",
                        from.group, from.binding, to.group, to.binding, next.group, next.binding
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Moves resource variables to new binding points.
#[derive(Debug, Default, Clone, Copy)]
pub struct BindingRemapper;

impl Transform for BindingRemapper {
    fn name(&self) -> &str {
        NAME
    }

    fn inputs(&self) -> Vec<DataKey> {
        vec![DataKey::of::<BindingRemap>()]
    }

    fn apply(&self, module: &mut Module, inputs: &DataMap) -> Result<DataMap, TransformError> {
        let remap = inputs
            .get::<BindingRemap>()
            .ok_or_else(|| TransformError::MissingTransformInput {
                transform: NAME.to_string(),
                input: DataKey::of::<BindingRemap>().name().to_string(),
            })?;
        remap.check()?;
        for inst in &mut module.root.insts {
            let InstKind::Var {
                name,
                binding: Some(binding),
                ..
            } = &mut inst.kind
            else {
                continue;
            };
            if let Some(to) = remap.bindings.get(binding) {
                log::debug!(
                    "'{name}': @group({}) @binding({}) -> @group({}) @binding({})",
                    binding.group,
                    binding.binding,
                    to.group,
                    to.binding
                );
                *binding = *to;
            }
        }
        Ok(DataMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ty::{Access, AddressSpace, TypeArena};
    use wgsl_ast::Span;

    fn bp(group: u32, binding: u32) -> BindingPoint {
        BindingPoint { group, binding }
    }

    fn module() -> Module {
        let mut b = Builder::new(TypeArena::new());
        let f32_ty = b.types().f32();
        b.root_var(
            Span::from(0..0),
            "u",
            AddressSpace::Uniform,
            Access::Read,
            f32_ty,
            None,
            Some(bp(0, 0)),
        );
        b.finish()
    }

    fn binding_of(module: &Module) -> Option<BindingPoint> {
        match &module.root.insts[0].kind {
            InstKind::Var { binding, .. } => *binding,
            _ => None,
        }
    }

    #[test]
    fn remaps_and_is_idempotent() {
        let mut module = module();
        let data = DataMap::new().with(BindingRemap {
            bindings: BTreeMap::from([(bp(0, 0), bp(1, 3))]),
        });
        BindingRemapper.apply(&mut module, &data).unwrap();
        assert_eq!(binding_of(&module), Some(bp(1, 3)));
        BindingRemapper.apply(&mut module, &data).unwrap();
        assert_eq!(binding_of(&module), Some(bp(1, 3)));
    }

    #[test]
    fn rejects_chains() {
        let mut module = module();
        let data = DataMap::new().with(BindingRemap {
            bindings: BTreeMap::from([(bp(0, 0), bp(0, 1)), (bp(0, 1), bp(0, 2))]),
        });
        let err = BindingRemapper.apply(&mut module, &data).unwrap_err();
        assert!(err.to_string().contains("chained binding remap"), "{err}");
    }
}
