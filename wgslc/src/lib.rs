#![forbid(unsafe_code)]

//! Compilation driver: source text in, transformed IR and diagnostics out.

pub mod config;

use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use wgsl_ast::Diagnostics;
use wgsl_core::FeatureSet;
use wgsl_ir::{Pipeline, TargetOptions};

pub use config::{Config, ConfigError, Emit};

/// Everything one compilation is configured with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompileOptions {
    pub features: FeatureSet,
    pub target: TargetOptions,
}

/// The outcome of compiling one source file.
///
/// `module` is `None` whenever `diagnostics` holds an error.
#[derive(Debug)]
pub struct Compilation {
    pub file_name: String,
    pub module: Option<wgsl_ir::Module>,
    pub ast: Option<wgsl_ast::Module>,
    pub diagnostics: Diagnostics,
}

impl Compilation {
    pub fn succeeded(&self) -> bool {
        self.module.is_some()
    }
}

/// Runs the whole front end over `source`.
pub fn compile(source: &str, file_name: &str, options: &CompileOptions) -> Compilation {
    let started = Instant::now();
    let mut diagnostics = Diagnostics::for_source(file_name, source);
    let (ast, module) = match run_stages(source, options, &mut diagnostics) {
        Ok((ast, module)) => (Some(ast), Some(module)),
        Err(ast) => (ast, None),
    };
    // Some stages report warnings alongside a successful result; an error
    // anywhere still withholds the module.
    let module = module.filter(|_| !diagnostics.has_errors());
    diagnostics.sort_by_position();
    debug!(
        "compiled {file_name} in {:?}: {} diagnostic(s), {}",
        started.elapsed(),
        diagnostics.len(),
        if module.is_some() { "ok" } else { "failed" }
    );
    Compilation {
        file_name: file_name.to_string(),
        module,
        ast,
        diagnostics,
    }
}

/// On failure, returns the AST when parsing got that far.
fn run_stages(
    source: &str,
    options: &CompileOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(wgsl_ast::Module, wgsl_ir::Module), Option<wgsl_ast::Module>> {
    let parsed = wgsl_parse::parse(wgsl_lex::tokenize(source), diagnostics).map_err(|_| None)?;

    // The whole module is checked even when only one entry point is kept.
    let Ok(full_info) = wgsl_core::resolve(&parsed, &options.features, diagnostics) else {
        return Err(Some(parsed));
    };

    let (ast, info) = match &options.target.entry_point {
        Some(name) => {
            let pruned = match wgsl_core::single_entry_point(&parsed, name) {
                Ok(pruned) => pruned,
                Err(e) => {
                    e.report(diagnostics);
                    return Err(Some(parsed));
                }
            };
            // Warnings were already reported against the full module.
            let mut scratch = Diagnostics::new(diagnostics.file().clone());
            match wgsl_core::resolve(&pruned, &options.features, &mut scratch) {
                Ok(info) => (pruned, info),
                Err(_) => {
                    for d in scratch.into_vec() {
                        diagnostics.push(d);
                    }
                    return Err(Some(pruned));
                }
            }
        }
        None => (parsed, full_info),
    };

    let Ok(mut module) = wgsl_core::lower(&ast, &info, diagnostics) else {
        return Err(Some(ast));
    };

    let pipeline = Pipeline::for_target(&options.target);
    if let Err(e) = pipeline.run(&mut module, options.target.inputs()) {
        diagnostics.error(wgsl_ast::span(0, 0), e.to_string());
        return Err(Some(ast));
    }
    if let Err(e) = wgsl_ir::validate(&module) {
        diagnostics.error(wgsl_ast::span(0, 0), format!("transformed module is invalid: {e}"));
        return Err(Some(ast));
    }
    Ok((ast, module))
}

/// Compiles independent `(file_name, source)` pairs in parallel. Results
/// keep the input order.
pub fn compile_many(inputs: &[(String, String)], options: &CompileOptions) -> Vec<Compilation> {
    inputs
        .par_iter()
        .map(|(name, source)| compile(source, name, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_compilation_carries_a_module() {
        let c = compile(
            "fn f() -> i32 { return 1 + 2; }",
            "ok.wgsl",
            &CompileOptions::default(),
        );
        assert!(c.succeeded(), "{:?}", c.diagnostics);
        assert!(!c.diagnostics.has_errors());
        assert_eq!(c.module.unwrap().functions.len(), 1);
    }

    #[test]
    fn any_error_withholds_the_module() {
        let c = compile(
            "fn f() -> i32 { return missing; }",
            "bad.wgsl",
            &CompileOptions::default(),
        );
        assert!(c.module.is_none());
        assert_eq!(c.diagnostics.error_count(), 1);
        assert!(c.ast.is_some());
    }

    #[test]
    fn syntax_errors_stop_before_resolution() {
        let c = compile("fn f( {", "syntax.wgsl", &CompileOptions::default());
        assert!(c.module.is_none());
        assert!(c.ast.is_none());
        assert!(c.diagnostics.has_errors());
    }

    #[test]
    fn disabled_feature_rejects_its_directive() {
        let options = CompileOptions {
            features: FeatureSet::new().with_disabled("f16"),
            ..CompileOptions::default()
        };
        let c = compile("enable f16;\nfn f() {}", "f16.wgsl", &options);
        assert!(c.module.is_none());
        assert!(c.diagnostics.errors().any(|d| d.message.contains("f16")));
    }

    #[test]
    fn entry_point_option_prunes_other_entry_points() {
        let src = "@vertex fn vs() -> @builtin(position) vec4<f32> { return vec4(0.0); }\n\
                   @compute @workgroup_size(8) fn cs() {}";
        let options = CompileOptions {
            target: TargetOptions {
                entry_point: Some("cs".to_string()),
                ..TargetOptions::default()
            },
            ..CompileOptions::default()
        };
        let c = compile(src, "two.wgsl", &options);
        let module = c.module.unwrap();
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["cs"]);
    }

    #[test]
    fn errors_in_pruned_declarations_are_still_reported() {
        let options = CompileOptions {
            target: TargetOptions {
                entry_point: Some("main".to_string()),
                ..TargetOptions::default()
            },
            ..CompileOptions::default()
        };
        let c = compile(
            "@compute @workgroup_size(1) fn main() {}\n\
             fn broken() -> i32 { return undefined_name; }",
            "pruned.wgsl",
            &options,
        );
        assert!(c.module.is_none());
        assert_eq!(c.diagnostics.error_count(), 1);
        let d = c.diagnostics.errors().next().unwrap();
        assert!(d.message.contains("undefined_name"), "{}", d.message);
    }

    #[test]
    fn unknown_entry_point_is_a_diagnostic() {
        let options = CompileOptions {
            target: TargetOptions {
                entry_point: Some("main".to_string()),
                ..TargetOptions::default()
            },
            ..CompileOptions::default()
        };
        let c = compile("@compute @workgroup_size(1) fn mian() {}", "ep.wgsl", &options);
        assert!(c.module.is_none());
        let d = c.diagnostics.errors().next().unwrap();
        assert!(d.message.contains("main"), "{}", d.message);
    }

    #[test]
    fn many_inputs_keep_their_order() {
        let inputs: Vec<_> = (0..8)
            .map(|i| {
                let src = if i % 3 == 0 {
                    format!("fn f{i}() -> i32 {{ return nope; }}")
                } else {
                    format!("fn f{i}() -> i32 {{ return {i}; }}")
                };
                (format!("s{i}.wgsl"), src)
            })
            .collect();
        let results = compile_many(&inputs, &CompileOptions::default());
        assert_eq!(results.len(), 8);
        for (i, c) in results.iter().enumerate() {
            assert_eq!(c.file_name, format!("s{i}.wgsl"));
            assert_eq!(c.succeeded(), i % 3 != 0);
        }
    }
}
