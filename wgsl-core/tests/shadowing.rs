use proptest::prelude::*;
use wgsl_ast::{Diagnostics, ExprKind, Module};
use wgsl_core::{FeatureSet, SemanticInfo, Symbol, resolve};

fn resolved(src: &str) -> (Module, SemanticInfo) {
    let (module, errors) = wgsl_parse::parse_source(src);
    assert!(errors.is_empty(), "{errors:?}");
    let mut diags = Diagnostics::for_source("shadow.wgsl", src);
    let info = resolve(&module, &FeatureSet::new(), &mut diags)
        .unwrap_or_else(|e| panic!("{e}\n{src}"));
    (module, info)
}

/// Symbols bound to each use of `name`, in source order.
fn uses(module: &Module, info: &SemanticInfo, name: &str) -> Vec<(usize, Symbol)> {
    let mut out: Vec<_> = module
        .exprs
        .iter()
        .filter(|(_, e)| matches!(&e.kind, ExprKind::Ident(t) if t.ident.node == name))
        .filter_map(|(id, e)| info.symbol(id).map(|s| (e.span.offset(), s)))
        .collect();
    out.sort_by_key(|u| u.0);
    out
}

#[test]
fn inner_block_binding_ends_at_the_closing_brace() {
    let src = "var<private> x: i32;\n\
               fn f() -> i32 {\n\
                   { let x = 2.0; let inner = x; }\n\
                   let outer = x;\n\
                   return outer;\n\
               }";
    let (module, info) = resolved(src);
    let found = uses(&module, &info, "x");
    assert_eq!(found.len(), 2);
    assert!(matches!(found[0].1, Symbol::Local(_)), "{found:?}");
    assert!(matches!(found[1].1, Symbol::Global(_)), "{found:?}");
}

#[test]
fn parameters_shadow_globals_and_locals_shadow_parameters() {
    let src = "const v = 1;\n\
               fn f(v: u32) -> u32 {\n\
                   let a = v;\n\
                   { let v = 3u; let b = v; }\n\
                   return v + a;\n\
               }";
    let (module, info) = resolved(src);
    let kinds: Vec<_> = uses(&module, &info, "v")
        .into_iter()
        .map(|(_, s)| match s {
            Symbol::Global(_) => "global",
            Symbol::Local(_) => "local",
            Symbol::Param(..) => "param",
            Symbol::Poisoned => "poisoned",
        })
        .collect();
    assert_eq!(kinds, ["param", "local", "param"]);
}

#[test]
fn loop_bodies_scope_their_declarations() {
    let src = "fn f() -> i32 {\n\
                   let i = 10;\n\
                   for (var i = 0; i < 3; i++) { let j = i; }\n\
                   return i;\n\
               }";
    let (module, info) = resolved(src);
    let found = uses(&module, &info, "i");
    let Symbol::Local(outer) = found.last().unwrap().1 else {
        panic!("{found:?}");
    };
    assert_eq!(info.locals[&outer].name, "i");
    assert_eq!(info.types.display(info.locals[&outer].ty), "i32");
    assert!(found[..found.len() - 1]
        .iter()
        .all(|(_, s)| *s != Symbol::Local(outer)));
}

proptest! {
    /// Nesting `depth` blocks that each redeclare `x`: a use right after
    /// each closing brace binds to the declaration one level out.
    #[test]
    fn every_nesting_level_restores_the_outer_binding(depth in 1usize..6) {
        let mut src = String::from("var<private> x: i32;\nfn f() {\n");
        for level in 0..depth {
            src.push_str(&format!("{{ let x = {level}; let in{level} = x;\n"));
        }
        for level in (0..depth).rev() {
            src.push_str(&format!("}} let out{level} = x;\n"));
        }
        src.push_str("}\n");

        let (module, info) = resolved(&src);
        let found = uses(&module, &info, "x");
        prop_assert_eq!(found.len(), depth * 2);
        let inner = &found[..depth];
        let after = &found[depth..];
        // Uses after the innermost block walk back out one level at a time.
        for (k, (_, symbol)) in after.iter().enumerate() {
            let expected = if k + 1 == depth {
                None
            } else {
                Some(inner[depth - 2 - k].1)
            };
            match expected {
                None => prop_assert!(matches!(symbol, Symbol::Global(_))),
                Some(e) => prop_assert_eq!(*symbol, e),
            }
        }
        for (_, symbol) in inner {
            prop_assert!(matches!(symbol, Symbol::Local(_)));
        }
    }
}
