#![forbid(unsafe_code)]

//! Reduces a module to a single entry point.

use std::collections::HashSet;

use log::debug;
use wgsl_ast::{CloneContext, GlobalDecl, Module};

use crate::dependency;
use crate::error::ResolveError;
use crate::symbols::closest;

const STAGE_ATTRS: [&str; 3] = ["vertex", "fragment", "compute"];

fn is_entry_point(decl: &GlobalDecl) -> bool {
    match decl {
        GlobalDecl::Function(f) => f
            .attrs
            .iter()
            .any(|a| STAGE_ATTRS.contains(&a.name.node.as_str())),
        _ => false,
    }
}

/// Copies into a fresh module the entry point `name` and every declaration
/// it transitively references, in source order. Other entry points and
/// unused helpers are dropped. A `const_assert` survives when everything it
/// names survives.
pub fn single_entry_point(module: &Module, name: &str) -> Result<Module, ResolveError> {
    let entry_points = || {
        module
            .decls
            .iter()
            .filter(|(_, d)| is_entry_point(d))
            .filter_map(|(_, d)| d.name())
    };
    let Some(root) = entry_points().find(|n| n.node == name).and_then(|n| module.find_decl(&n.node))
    else {
        if let Some(id) = module.find_decl(name) {
            let decl = module.decl(id);
            return Err(ResolveError::validation(
                decl.span(),
                format!("'{name}' is a {}, not an entry point", decl.kind_name()),
            ));
        }
        return Err(ResolveError::UnresolvedIdentifier {
            name: name.to_string(),
            suggestion: closest(name, entry_points().map(|n| n.node.as_str())),
            span: wgsl_ast::span(0, 0),
        });
    };

    let mut keep: HashSet<_> = dependency::transitive(module, root);
    for (id, decl) in module.decls.iter() {
        if let GlobalDecl::ConstAssert(_) = decl {
            let mut needs = dependency::transitive(module, id);
            needs.remove(&id);
            if needs.is_subset(&keep) {
                keep.insert(id);
            }
        }
    }

    let mut out = Module::default();
    let mut ctx = CloneContext::new(module, &mut out);
    ctx.dst().directives.extend(module.directives.iter().cloned());
    for id in module.decls.handles() {
        if keep.contains(&id) {
            ctx.clone_decl(id);
        }
    }
    debug!(
        "kept {} of {} declarations for entry point '{name}'",
        keep.len(),
        module.decls.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHADERS: &str = "\
const scale = 2.0;
const unused = 7;
struct VertexOut { @builtin(position) pos: vec4<f32> }
fn helper(x: f32) -> f32 { return x * scale; }
fn other_helper() -> i32 { return unused; }
const_assert scale > 1.0;
const_assert unused > 1;
@vertex fn vs() -> VertexOut { return VertexOut(vec4(helper(1.0))); }
@compute @workgroup_size(1) fn cs() { _ = other_helper(); }
";

    fn names(module: &Module) -> Vec<String> {
        module
            .decls
            .iter()
            .map(|(_, d)| d.name().map_or_else(|| d.kind_name().to_string(), |n| n.node.clone()))
            .collect()
    }

    #[test]
    fn keeps_only_what_the_entry_point_uses() {
        let (module, errors) = wgsl_parse::parse_source(SHADERS);
        assert!(errors.is_empty(), "{errors:?}");
        let pruned = single_entry_point(&module, "vs").unwrap();
        assert_eq!(
            names(&pruned),
            ["scale", "VertexOut", "helper", "const_assert", "vs"]
        );
    }

    #[test]
    fn pruned_module_still_resolves() {
        let (module, _) = wgsl_parse::parse_source(SHADERS);
        let pruned = single_entry_point(&module, "cs").unwrap();
        let mut diags = wgsl_ast::Diagnostics::for_source("t.wgsl", SHADERS);
        crate::resolve::resolve(&pruned, &crate::features::FeatureSet::new(), &mut diags).unwrap();
        assert_eq!(
            names(&pruned),
            ["unused", "other_helper", "const_assert", "cs"]
        );
    }

    #[test]
    fn non_entry_points_are_rejected() {
        let (module, _) = wgsl_parse::parse_source(SHADERS);
        let e = single_entry_point(&module, "helper").unwrap_err();
        assert!(e.to_string().contains("not an entry point"), "{e}");
        let e = single_entry_point(&module, "v").unwrap_err();
        let ResolveError::UnresolvedIdentifier { suggestion, .. } = e else {
            panic!("unexpected error: {e:?}");
        };
        assert_eq!(suggestion.as_deref(), Some("vs"));
    }
}
