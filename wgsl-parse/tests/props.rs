use std::time::{Duration, Instant};

use proptest::prelude::*;
use wgsl_ast::{ExprId, ExprKind, Module, for_each_child_expr};
use wgsl_parse::{parse_expr_source, parse_source};

/// Structure of an expression tree with node ids left out.
fn shape(module: &Module, id: ExprId) -> String {
    let kind = &module.expr(id).kind;
    let head = match kind {
        ExprKind::Ident(t) => format!("ident {}", t.ident.node),
        ExprKind::Literal(lit) => format!("{lit:?}"),
        ExprKind::Call { callee, .. } => format!("call {}", callee.ident.node),
        ExprKind::Binary { op, .. } => format!("{op:?}"),
        ExprKind::Unary { op, .. } => format!("{op:?}"),
        ExprKind::Member { member, .. } => format!("member {}", member.node),
        ExprKind::Index { .. } => "index".to_string(),
        ExprKind::Bitcast { .. } => "bitcast".to_string(),
    };
    let mut children = Vec::new();
    for_each_child_expr(kind, |child| children.push(shape(module, child)));
    format!("({head} {})", children.join(" "))
}

fn arb_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        "[a-z][a-z0-9]{0,3}".prop_filter("not a keyword", |s| {
            !matches!(s.as_str(), "fn" | "if" | "for" | "let" | "var" | "loop" | "case" | "else")
                && !wgsl_parse::is_reserved_word(s)
        }),
        (0u32..1000).prop_map(|n| n.to_string()),
        (0u32..100).prop_map(|n| format!("{n}.5")),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "%"]), inner.clone())
                .prop_map(|(a, op, b)| format!("{a} {op} {b}")),
            inner.clone().prop_map(|a| format!("({a})")),
            inner.clone().prop_map(|a| format!("-{a}")),
            (inner.clone(), inner).prop_map(|(a, b)| format!("max({a}, {b})")),
        ]
    })
}

proptest! {
    #[test]
    fn child_spans_nest_inside_parent(src in arb_expr()) {
        let (module, root) = parse_expr_source(&src).unwrap();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let parent = module.expr(id).span;
            for_each_child_expr(&module.expr(id).kind, |child| {
                let span = module.expr(child).span;
                assert!(span.offset() >= parent.offset());
                assert!(span.offset() + span.len() <= parent.offset() + parent.len());
                stack.push(child);
            });
        }
    }

    #[test]
    fn sibling_spans_do_not_overlap(src in arb_expr()) {
        let (module, root) = parse_expr_source(&src).unwrap();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let mut spans = Vec::new();
            for_each_child_expr(&module.expr(id).kind, |child| {
                spans.push(module.expr(child).span);
                stack.push(child);
            });
            spans.sort_by_key(|s| s.offset());
            for pair in spans.windows(2) {
                prop_assert!(
                    pair[0].offset() + pair[0].len() <= pair[1].offset(),
                    "{src}: {:?} overlaps {:?}", pair[0], pair[1]
                );
            }
        }
    }

    #[test]
    fn sliced_subexpressions_reparse_identically(src in arb_expr()) {
        let (module, root) = parse_expr_source(&src).unwrap();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let span = module.expr(id).span;
            let text = &src[span.offset()..span.offset() + span.len()];
            let (again, again_root) = parse_expr_source(text)
                .unwrap_or_else(|e| panic!("'{text}' from '{src}': {e:?}"));
            prop_assert_eq!(shape(&again, again_root), shape(&module, id));
            for_each_child_expr(&module.expr(id).kind, |child| stack.push(child));
        }
    }

    #[test]
    fn parsing_arbitrary_text_terminates(src in "[ -~\n]{0,64}") {
        let (_, errors) = parse_source(&src);
        for err in &errors {
            prop_assert!(err.span.offset() <= src.len());
        }
    }
}

#[test]
fn deep_nesting_parses_in_linear_time() {
    let budget = Duration::from_secs(2);

    let mut comparison = String::from("a");
    for _ in 0..40 {
        comparison = format!("a < ({comparison})");
    }
    let src = format!("fn f(a: i32) {{ let x = {comparison}; }}");
    let started = Instant::now();
    let _ = parse_source(&src);
    assert!(started.elapsed() < budget, "comparisons took {:?}", started.elapsed());

    let depth = 3000;
    let src = format!(
        "var<private> x: {}f32{};\nfn g() {{}}",
        "array<".repeat(depth),
        ">".repeat(depth)
    );
    let started = Instant::now();
    let (module, errors) = parse_source(&src);
    assert!(started.elapsed() < budget, "types took {:?}", started.elapsed());
    assert!(errors
        .iter()
        .any(|e| e.message == "maximum parser recursive depth reached"));
    assert!(module.functions().any(|(_, f)| f.name.node == "g"));
}
