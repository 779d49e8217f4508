#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::ir::{BindingPoint, FunctionId, InstKind, IoAttributes, Module, Stage, ValueId};
use crate::ty::{Access, AddressSpace, TypeId};

use super::{DataKey, DataMap, Transform, TransformError};

/// One shader input or output of an entry point.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceValue {
    pub name: String,
    pub ty: TypeId,
    pub io: IoAttributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceBinding {
    pub name: String,
    pub var: ValueId,
    pub binding: BindingPoint,
    pub space: AddressSpace,
    pub access: Access,
    pub ty: TypeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceEntry {
    pub function: FunctionId,
    pub name: String,
    pub stage: Stage,
    pub workgroup_size: Option<[u32; 3]>,
    pub inputs: Vec<InterfaceValue>,
    pub output: Option<InterfaceValue>,
    /// Bound resources reachable from the entry point, ordered by binding.
    pub resources: Vec<ResourceBinding>,
    /// `var<workgroup>` declarations reachable from the entry point.
    pub workgroup_vars: Vec<ValueId>,
}

/// Interfaces of every entry point in the module.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryPointInterfaces {
    pub entries: Vec<InterfaceEntry>,
}

impl EntryPointInterfaces {
    pub fn get(&self, name: &str) -> Option<&InterfaceEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Collects what each entry point reads and writes across the pipeline
/// boundary. The module itself is left unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryPointInterface;

impl Transform for EntryPointInterface {
    fn name(&self) -> &str {
        "EntryPointInterface"
    }

    fn outputs(&self) -> Vec<DataKey> {
        vec![DataKey::of::<EntryPointInterfaces>()]
    }

    fn apply(&self, module: &mut Module, _inputs: &DataMap) -> Result<DataMap, TransformError> {
        Ok(DataMap::new().with(interfaces(module)))
    }
}

pub fn interfaces(module: &Module) -> EntryPointInterfaces {
    let mut entries = Vec::new();
    for function in module.entry_points() {
        let Some(stage) = function.stage else { continue };
        let globals = referenced_globals(module, function.id);
        let mut resources = Vec::new();
        let mut workgroup_vars = Vec::new();
        for inst in &module.root.insts {
            let Some(dest) = inst.dest else { continue };
            if !globals.contains(&dest) {
                continue;
            }
            let InstKind::Var {
                name,
                space,
                access,
                binding,
                ..
            } = &inst.kind
            else {
                continue;
            };
            let Some(ptr_ty) = module.value_type(dest) else { continue };
            let ty = match module.types.get(ptr_ty) {
                crate::ty::Type::Pointer { store, .. } => *store,
                _ => ptr_ty,
            };
            if *space == AddressSpace::Workgroup {
                workgroup_vars.push(dest);
            }
            if let Some(binding) = binding {
                resources.push(ResourceBinding {
                    name: name.clone(),
                    var: dest,
                    binding: *binding,
                    space: *space,
                    access: *access,
                    ty,
                });
            }
        }
        resources.sort_by_key(|r| r.binding);
        entries.push(InterfaceEntry {
            function: function.id,
            name: function.name.clone(),
            stage,
            workgroup_size: function.workgroup_size,
            inputs: function
                .params
                .iter()
                .map(|p| InterfaceValue {
                    name: p.name.clone(),
                    ty: p.ty,
                    io: p.io.clone(),
                })
                .collect(),
            output: function.ret.as_ref().map(|r| InterfaceValue {
                name: format!("{}_result", function.name),
                ty: r.ty,
                io: r.io.clone(),
            }),
            resources,
            workgroup_vars,
        });
    }
    EntryPointInterfaces { entries }
}

/// Module-scope values used by `entry` or any function it calls.
fn referenced_globals(module: &Module, entry: FunctionId) -> BTreeSet<ValueId> {
    let roots: BTreeSet<ValueId> = module.root.insts.iter().filter_map(|i| i.dest).collect();
    let mut seen_fns = BTreeSet::new();
    let mut stack = vec![entry];
    let mut used = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if !seen_fns.insert(id) {
            continue;
        }
        let Some(function) = module.function(id) else { continue };
        for inst in function.insts() {
            if let InstKind::Call { callee, .. } = &inst.kind {
                stack.push(*callee);
            }
            used.extend(inst.kind.operands().into_iter().filter(|v| roots.contains(v)));
        }
        for block in &function.blocks {
            used.extend(
                block
                    .term
                    .iter()
                    .flat_map(|t| t.operands())
                    .filter(|v| roots.contains(v)),
            );
        }
    }
    // Override initializers may name other overrides.
    let mut changed = true;
    while changed {
        changed = false;
        for inst in &module.root.insts {
            if inst.dest.is_some_and(|d| used.contains(&d)) {
                for v in inst.kind.operands() {
                    if roots.contains(&v) && used.insert(v) {
                        changed = true;
                    }
                }
            }
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ir::Terminator;
    use crate::ty::TypeArena;
    use wgsl_ast::Span;

    #[test]
    fn collects_resources_through_calls() {
        let sp = Span::from(0..0);
        let mut b = Builder::new(TypeArena::new());
        let f32_ty = b.types().f32();
        let u32_ty = b.types().u32();
        let buf = b.root_var(
            sp,
            "buf",
            AddressSpace::Storage,
            Access::Read,
            f32_ty,
            None,
            Some(BindingPoint { group: 0, binding: 1 }),
        );
        let unused = b.root_var(
            sp,
            "unused",
            AddressSpace::Uniform,
            Access::Read,
            f32_ty,
            None,
            Some(BindingPoint { group: 0, binding: 0 }),
        );
        let scratch = b.root_var(sp, "scratch", AddressSpace::Workgroup, Access::ReadWrite, u32_ty, None, None);
        let helper = b.begin_function("helper", sp, None, None);
        b.inst(sp, f32_ty, InstKind::Load { ptr: buf });
        b.finish_function();
        b.begin_function("main", sp, Some(Stage::Compute), Some([64, 1, 1]));
        b.effect(sp, InstKind::Call { callee: helper, args: vec![] });
        b.inst(sp, u32_ty, InstKind::Load { ptr: scratch });
        b.terminate(Terminator::Return(None));
        b.finish_function();
        let mut module = b.finish();

        let data = EntryPointInterface.apply(&mut module, &DataMap::new()).unwrap();
        let interfaces = data.get::<EntryPointInterfaces>().unwrap();
        let main = interfaces.get("main").unwrap();
        assert_eq!(main.stage, Stage::Compute);
        assert_eq!(main.workgroup_size, Some([64, 1, 1]));
        assert_eq!(main.resources.len(), 1);
        assert_eq!(main.resources[0].name, "buf");
        assert!(main.resources.iter().all(|r| r.var != unused));
        assert_eq!(main.workgroup_vars, vec![scratch]);
    }
}
