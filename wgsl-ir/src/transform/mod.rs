#![forbid(unsafe_code)]
#![allow(unused_assignments)]

//! IR-to-IR transforms and the pipeline that orders and runs them.

mod binding_remapper;
mod const_fold;
mod dce;
mod entry_point;
mod robustness;
mod zero_init;

pub use binding_remapper::{BindingRemap, BindingRemapper};
pub use const_fold::ConstantFolding;
pub use dce::DeadCodeElimination;
pub use entry_point::{EntryPointInterface, EntryPointInterfaces, InterfaceEntry, InterfaceValue, ResourceBinding};
pub use robustness::{Robustness, RobustnessConfig};
pub use zero_init::ZeroInitWorkgroupMemory;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::ir::Module;
use crate::validate::{IrValidationError, validate};

#[derive(Debug, Error, Diagnostic)]
pub enum TransformError {
    #[error("transform '{transform}' requires '{input}', which is neither supplied nor produced by another transform")]
    #[diagnostic(code(wgsl::transform::missing_input))]
    MissingTransformInput { transform: String, input: String },

    #[error("transform '{transform}' cannot handle {construct}")]
    #[diagnostic(code(wgsl::transform::unsupported))]
    UnsupportedConstruct { transform: String, construct: String },

    #[error("transform dependencies form a cycle: {}", .transforms.join(" -> "))]
    #[diagnostic(code(wgsl::transform::cycle))]
    DependencyCycle { transforms: Vec<String> },

    #[error("invalid input for transform '{transform}': {message}")]
    #[diagnostic(code(wgsl::transform::input))]
    InvalidInput { transform: String, message: String },

    #[error("transform '{transform}' produced invalid IR")]
    #[diagnostic(code(wgsl::transform::invalid_ir))]
    InvalidIr {
        transform: String,
        #[source]
        source: IrValidationError,
    },
}

/// Identifies a [`DataMap`] entry by the Rust type of its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey {
    id: TypeId,
    name: &'static str,
}

impl DataKey {
    pub fn of<T: Any>() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            id: TypeId::of::<T>(),
            name: full.rsplit("::").next().unwrap_or(full),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Heterogeneous payloads passed between transforms, at most one per type.
#[derive(Default)]
pub struct DataMap {
    items: HashMap<DataKey, Box<dyn Any + Send + Sync>>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.items.insert(DataKey::of::<T>(), Box::new(value));
    }

    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.items.get(&DataKey::of::<T>())?.downcast_ref()
    }

    pub fn contains(&self, key: &DataKey) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: DataMap) {
        self.items.extend(other.items);
    }
}

impl fmt::Debug for DataMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.items.keys().map(|k| k.name).collect();
        names.sort_unstable();
        f.debug_set().entries(names).finish()
    }
}

/// A module-rewriting step. Transforms are idempotent: applying one twice
/// leaves the module as the first application did.
pub trait Transform: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Payloads that must be in the data map before this transform runs.
    fn inputs(&self) -> Vec<DataKey> {
        Vec::new()
    }

    /// Payloads this transform adds to the data map.
    fn outputs(&self) -> Vec<DataKey> {
        Vec::new()
    }

    fn apply(&self, module: &mut Module, inputs: &DataMap) -> Result<DataMap, TransformError>;
}

/// Backend flags selecting which transforms run.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetOptions {
    pub fold_constants: bool,
    pub eliminate_dead_code: bool,
    pub robustness: Option<RobustnessConfig>,
    pub zero_init_workgroup_memory: bool,
    pub binding_remap: Option<BindingRemap>,
    /// Prune the module to this entry point before lowering.
    pub entry_point: Option<String>,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            fold_constants: true,
            eliminate_dead_code: true,
            robustness: None,
            zero_init_workgroup_memory: false,
            binding_remap: None,
            entry_point: None,
        }
    }
}

impl TargetOptions {
    /// Payloads the target supplies to its pipeline.
    pub fn inputs(&self) -> DataMap {
        let mut data = DataMap::new();
        if let Some(config) = &self.robustness {
            data.insert(config.clone());
        }
        if let Some(remap) = &self.binding_remap {
            data.insert(remap.clone());
        }
        data
    }
}

#[derive(Debug, Default)]
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn with(mut self, transform: impl Transform + 'static) -> Self {
        self.add(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// The transforms a target needs, in insertion order; `run` reorders
    /// them to satisfy data dependencies.
    pub fn for_target(target: &TargetOptions) -> Self {
        let mut pipeline = Pipeline::new();
        if target.binding_remap.is_some() {
            pipeline.add(Box::new(BindingRemapper));
        }
        if target.fold_constants {
            pipeline.add(Box::new(ConstantFolding));
        }
        if target.robustness.is_some() {
            pipeline.add(Box::new(Robustness));
        }
        if target.zero_init_workgroup_memory {
            pipeline.add(Box::new(ZeroInitWorkgroupMemory));
            pipeline.add(Box::new(EntryPointInterface));
        }
        if target.eliminate_dead_code {
            pipeline.add(Box::new(DeadCodeElimination));
        }
        pipeline
    }

    /// Names in execution order.
    pub fn names(&self, supplied: &DataMap) -> Result<Vec<String>, TransformError> {
        Ok(self
            .order(supplied)?
            .into_iter()
            .map(|i| self.transforms[i].name().to_string())
            .collect())
    }

    /// Topological order over produce/consume edges. Among ready
    /// transforms the earliest added runs first.
    fn order(&self, supplied: &DataMap) -> Result<Vec<usize>, TransformError> {
        let producers: Vec<Vec<DataKey>> = self.transforms.iter().map(|t| t.outputs()).collect();
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); self.transforms.len()];
        for (i, t) in self.transforms.iter().enumerate() {
            for input in t.inputs() {
                let mut found = supplied.contains(&input);
                for (j, outputs) in producers.iter().enumerate() {
                    if j != i && outputs.contains(&input) {
                        deps[i].push(j);
                        found = true;
                    }
                }
                if !found {
                    return Err(TransformError::MissingTransformInput {
                        transform: t.name().to_string(),
                        input: input.name().to_string(),
                    });
                }
            }
        }

        let mut done = vec![false; self.transforms.len()];
        let mut order = Vec::with_capacity(self.transforms.len());
        while order.len() < self.transforms.len() {
            let next = (0..self.transforms.len())
                .find(|&i| !done[i] && deps[i].iter().all(|&d| done[d]));
            match next {
                Some(i) => {
                    done[i] = true;
                    order.push(i);
                }
                None => {
                    let transforms = (0..self.transforms.len())
                        .filter(|&i| !done[i])
                        .map(|i| self.transforms[i].name().to_string())
                        .collect();
                    return Err(TransformError::DependencyCycle { transforms });
                }
            }
        }
        Ok(order)
    }

    /// Runs every transform, validating the module after each one. Returns
    /// the supplied data plus everything the transforms produced.
    pub fn run(&self, module: &mut Module, supplied: DataMap) -> Result<DataMap, TransformError> {
        let order = self.order(&supplied)?;
        let mut data = supplied;
        for i in order {
            let transform = &self.transforms[i];
            let before = log::log_enabled!(log::Level::Debug).then(|| module.clone());
            let produced = transform.apply(module, &data)?;
            validate(module).map_err(|source| TransformError::InvalidIr {
                transform: transform.name().to_string(),
                source,
            })?;
            if let Some(before) = before {
                log::debug!(
                    "transform '{}' {}",
                    transform.name(),
                    if before == *module { "left the module unchanged" } else { "changed the module" }
                );
            }
            data.extend(produced);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Produces;
    #[derive(Debug)]
    struct Consumes;
    #[derive(Debug)]
    struct Token;

    impl Transform for Produces {
        fn name(&self) -> &str {
            "produces"
        }
        fn outputs(&self) -> Vec<DataKey> {
            vec![DataKey::of::<Token>()]
        }
        fn apply(&self, _: &mut Module, _: &DataMap) -> Result<DataMap, TransformError> {
            Ok(DataMap::new().with(Token))
        }
    }

    impl Transform for Consumes {
        fn name(&self) -> &str {
            "consumes"
        }
        fn inputs(&self) -> Vec<DataKey> {
            vec![DataKey::of::<Token>()]
        }
        fn apply(&self, _: &mut Module, data: &DataMap) -> Result<DataMap, TransformError> {
            assert!(data.get::<Token>().is_some());
            Ok(DataMap::new())
        }
    }

    #[test]
    fn consumers_run_after_producers() {
        let pipeline = Pipeline::new().with(Consumes).with(Produces);
        assert_eq!(
            pipeline.names(&DataMap::new()).unwrap(),
            ["produces", "consumes"]
        );
        let mut module = Module::new();
        let data = pipeline.run(&mut module, DataMap::new()).unwrap();
        assert!(data.get::<Token>().is_some());
    }

    #[test]
    fn missing_input_is_reported() {
        let pipeline = Pipeline::new().with(Consumes);
        let err = pipeline.names(&DataMap::new()).unwrap_err();
        assert!(matches!(
            err,
            TransformError::MissingTransformInput { ref input, .. } if input == "Token"
        ));
        assert!(pipeline.names(&DataMap::new().with(Token)).is_ok());
    }

    #[derive(Debug)]
    struct Loop(&'static str, bool);

    #[derive(Debug)]
    struct A;
    #[derive(Debug)]
    struct B;

    impl Transform for Loop {
        fn name(&self) -> &str {
            self.0
        }
        fn inputs(&self) -> Vec<DataKey> {
            vec![if self.1 { DataKey::of::<A>() } else { DataKey::of::<B>() }]
        }
        fn outputs(&self) -> Vec<DataKey> {
            vec![if self.1 { DataKey::of::<B>() } else { DataKey::of::<A>() }]
        }
        fn apply(&self, _: &mut Module, _: &DataMap) -> Result<DataMap, TransformError> {
            Ok(DataMap::new())
        }
    }

    #[test]
    fn cycles_are_reported() {
        let pipeline = Pipeline::new().with(Loop("x", true)).with(Loop("y", false));
        let err = pipeline.names(&DataMap::new()).unwrap_err();
        assert!(matches!(err, TransformError::DependencyCycle { ref transforms } if transforms.len() == 2));
    }

    #[test]
    fn target_pipeline_orders_interface_before_zero_init() {
        let target = TargetOptions {
            zero_init_workgroup_memory: true,
            ..TargetOptions::default()
        };
        let names = Pipeline::for_target(&target).names(&target.inputs()).unwrap();
        assert_eq!(
            names,
            [
                "ConstantFolding",
                "EntryPointInterface",
                "ZeroInitWorkgroupMemory",
                "DeadCodeElimination"
            ]
        );
    }
}
