#![forbid(unsafe_code)]

//! `wgslc.toml`: compile options loaded from a file.
//!
//! ```toml
//! emit = "ir"
//! entry_point = "main"
//!
//! [features]
//! f16 = false
//!
//! [target]
//! fold_constants = true
//! zero_init_workgroup_memory = true
//! robustness = { ignored_spaces = ["uniform"] }
//!
//! [[target.binding_remap]]
//! from = { group = 0, binding = 1 }
//! to = { group = 2, binding = 0 }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use wgsl_core::FeatureSet;
use wgsl_ir::transform::{BindingRemap, RobustnessConfig};
use wgsl_ir::{AddressSpace, BindingPoint, TargetOptions};

use crate::CompileOptions;

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(wgslc::config))]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What the CLI prints for each successful compilation.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emit {
    /// Disassembled IR after the target's transforms.
    #[default]
    Ir,
    /// The parsed (and possibly pruned) syntax tree.
    Ast,
    /// Diagnostics only.
    None,
}

/// A parsed configuration file. Every field is optional; absent fields keep
/// the defaults of [`CompileOptions`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub emit: Option<Emit>,

    #[serde(default)]
    pub entry_point: Option<String>,

    /// Feature name to enabled flag.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,

    #[serde(default)]
    target: Target,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Target {
    #[serde(default)]
    fold_constants: Option<bool>,

    #[serde(default)]
    eliminate_dead_code: Option<bool>,

    #[serde(default)]
    zero_init_workgroup_memory: Option<bool>,

    #[serde(default)]
    robustness: Option<Robustness>,

    #[serde(default)]
    binding_remap: Vec<Remap>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Robustness {
    #[serde(default)]
    ignored_spaces: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Point {
    group: u32,
    binding: u32,
}

impl From<Point> for BindingPoint {
    fn from(p: Point) -> Self {
        BindingPoint {
            group: p.group,
            binding: p.binding,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Remap {
    from: Point,
    to: Point,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::new(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::new(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| ConfigError::new(format!("failed to parse {}: {e}", path.display())))
    }

    /// Builds the options this file describes on top of the defaults.
    pub fn compile_options(&self) -> Result<CompileOptions, ConfigError> {
        let mut features = FeatureSet::new();
        for (name, on) in &self.features {
            if !features.set(name, *on) {
                return Err(ConfigError::new(format!("unknown feature '{name}'")));
            }
        }

        let defaults = TargetOptions::default();
        let t = &self.target;
        let robustness = match &t.robustness {
            Some(r) => Some(robustness_config(r)?),
            None => None,
        };
        let binding_remap = if t.binding_remap.is_empty() {
            None
        } else {
            let mut remap = BindingRemap::default();
            for r in &t.binding_remap {
                let from = BindingPoint::from(r.from);
                if remap.bindings.insert(from, r.to.into()).is_some() {
                    return Err(ConfigError::new(format!(
                        "@group({}) @binding({}) is remapped twice",
                        from.group, from.binding
                    )));
                }
            }
            Some(remap)
        };

        Ok(CompileOptions {
            features,
            target: TargetOptions {
                fold_constants: t.fold_constants.unwrap_or(defaults.fold_constants),
                eliminate_dead_code: t.eliminate_dead_code.unwrap_or(defaults.eliminate_dead_code),
                robustness,
                zero_init_workgroup_memory: t
                    .zero_init_workgroup_memory
                    .unwrap_or(defaults.zero_init_workgroup_memory),
                binding_remap,
                entry_point: self.entry_point.clone(),
            },
        })
    }
}

fn robustness_config(r: &Robustness) -> Result<RobustnessConfig, ConfigError> {
    let mut config = RobustnessConfig::default();
    for name in &r.ignored_spaces {
        let space = AddressSpace::from_name(name)
            .ok_or_else(|| ConfigError::new(format!("unknown address space '{name}'")))?;
        config.ignored_spaces.insert(space);
    }
    Ok(config)
}

/// Looks for `wgslc.toml` in `start` and its ancestors.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };
    loop {
        let candidate = cur.join("wgslc.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        cur = cur.parent()?.to_path_buf();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_default_options() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.compile_options().unwrap(), CompileOptions::default());
        assert_eq!(config.emit, None);
    }

    #[test]
    fn full_file_sets_every_option() {
        let config = Config::parse(
            r#"
emit = "none"
entry_point = "main"

[features]
f16 = false
subgroups = true

[target]
fold_constants = false
eliminate_dead_code = false
zero_init_workgroup_memory = true
robustness = { ignored_spaces = ["uniform", "storage"] }

[[target.binding_remap]]
from = { group = 0, binding = 1 }
to = { group = 2, binding = 0 }
"#,
        )
        .unwrap();
        assert_eq!(config.emit, Some(Emit::None));
        let options = config.compile_options().unwrap();
        assert!(!options.features.is_enabled("f16"));
        assert!(options.features.is_enabled("subgroups"));
        let t = &options.target;
        assert!(!t.fold_constants);
        assert!(!t.eliminate_dead_code);
        assert!(t.zero_init_workgroup_memory);
        assert_eq!(t.entry_point.as_deref(), Some("main"));
        let ignored: Vec<_> = t.robustness.as_ref().unwrap().ignored_spaces.iter().copied().collect();
        assert_eq!(ignored, [AddressSpace::Uniform, AddressSpace::Storage]);
        let remap = t.binding_remap.as_ref().unwrap();
        assert_eq!(
            remap.bindings.get(&BindingPoint { group: 0, binding: 1 }),
            Some(&BindingPoint { group: 2, binding: 0 })
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let e = Config::parse("[features]\nf64 = true").unwrap().compile_options().unwrap_err();
        assert!(e.message.contains("f64"), "{e}");

        let e = Config::parse("[target]\nrobustness = { ignored_spaces = [\"heap\"] }")
            .unwrap()
            .compile_options()
            .unwrap_err();
        assert!(e.message.contains("heap"), "{e}");

        assert!(Config::parse("optimize = true").is_err());
        assert!(Config::parse("emit = \"spirv\"").is_err());
    }

    #[test]
    fn a_binding_cannot_be_remapped_twice() {
        let e = Config::parse(
            "[[target.binding_remap]]\nfrom = { group = 0, binding = 0 }\nto = { group = 1, binding = 0 }\n\
             [[target.binding_remap]]\nfrom = { group = 0, binding = 0 }\nto = { group = 2, binding = 0 }\n",
        )
        .unwrap()
        .compile_options()
        .unwrap_err();
        assert!(e.message.contains("remapped twice"), "{e}");
    }
}
