use wgsl_ast::{Directive, ExprKind, GlobalDecl, StmtKind};
use wgsl_parse::{MAX_ERRORS, parse_expr_source, parse_source};

#[test]
fn directive_after_declaration_is_rejected() {
    let src = "diagnostic(off, foo); var<private> t: f32 = 0.0; diagnostic(off, bar);";
    let (module, errors) = parse_source(src);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(
        errors[0]
            .message
            .contains("directives must come before all global declarations"),
        "{}",
        errors[0].message
    );
    let second = src.rfind("diagnostic").unwrap();
    assert_eq!(errors[0].span.offset(), second);
    assert_eq!(module.directives.len(), 1);
    assert!(matches!(module.directives[0], Directive::Diagnostic(_)));
    assert_eq!(module.decls.len(), 1);
}

#[test]
fn unterminated_comment_at_end_of_file_is_one_error() {
    let src = "fn f() {}\n/* never closed";
    let (_, errors) = parse_source(src);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].message, "unterminated block comment");
    assert_eq!(errors[0].span.offset(), src.find("/*").unwrap());
}

#[test]
fn unterminated_comment_inside_function_is_one_error() {
    let src = "fn f() { let x = 1; /* oops";
    let (_, errors) = parse_source(src);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].span.offset(), src.find("/*").unwrap());
}

#[test]
fn recovers_at_statement_boundaries() {
    let src = "fn f() {\n  let a = ;\n  let b = 2;\n  let c = );\n}\nfn g() {}";
    let (module, errors) = parse_source(src);
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors[0].span.offset() < errors[1].span.offset());
    let names: Vec<_> = module
        .functions()
        .map(|(_, f)| f.name.node.clone())
        .collect();
    assert_eq!(names, ["f", "g"]);
    let (_, f) = module.functions().next().unwrap();
    assert_eq!(f.body.stmts.len(), 1);
}

#[test]
fn recovers_at_declaration_boundaries() {
    let src = "struct S { a: f32 b: i32 }\nconst x = 1;\nfn f( {}\nfn g() {}";
    let (module, errors) = parse_source(src);
    assert!(errors.len() >= 2, "{errors:?}");
    assert!(module.find_decl("x").is_some());
    assert!(module.find_decl("g").is_some());
}

#[test]
fn module_scope_let_is_explained() {
    let (_, errors) = parse_source("let x = 1;");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "module-scope 'let' is invalid, use 'const'");
}

#[test]
fn missing_semicolon_names_the_construct() {
    let (_, errors) = parse_source("const x = 1\nfn f() {}");
    assert_eq!(errors[0].message, "expected ';' for const declaration");
}

#[test]
fn reserved_words_cannot_name_declarations() {
    let (_, errors) = parse_source("var<private> class: i32;");
    assert_eq!(errors[0].message, "'class' is a reserved keyword");
}

#[test]
fn chained_comparison_requires_parentheses() {
    let err = parse_expr_source("a < b < c").unwrap_err();
    assert_eq!(err.message, "chained comparisons are not allowed; add parentheses");
    assert!(parse_expr_source("(a < b) == c").is_ok());
}

#[test]
fn mixing_bitwise_operators_requires_parentheses() {
    let err = parse_expr_source("a & b | c").unwrap_err();
    assert!(err.message.starts_with("mixing '&' and '|'"));
    let err = parse_expr_source("a && b || c").unwrap_err();
    assert!(err.message.starts_with("mixing '&&' and '||'"));
}

#[test]
fn logical_operator_ends_a_template_candidate() {
    let (module, e) = parse_expr_source("a < b && c > d").unwrap();
    let ExprKind::Binary { op, .. } = module.expr(e).kind else {
        panic!("expected binary");
    };
    assert_eq!(op, wgsl_ast::BinaryOp::LogicalAnd);
}

#[test]
fn unclosed_angle_inside_parentheses_is_a_comparison() {
    let (module, e) = parse_expr_source("f(a < b) > c").unwrap();
    let ExprKind::Binary { op, lhs, .. } = module.expr(e).kind else {
        panic!("expected binary");
    };
    assert_eq!(op, wgsl_ast::BinaryOp::Gt);
    assert!(matches!(module.expr(lhs).kind, ExprKind::Call { .. }));
}

#[test]
fn nested_comparisons_parse_without_templates() {
    let mut src = String::from("a");
    for _ in 0..24 {
        src = format!("a < ({src})");
    }
    let (module, e) = parse_expr_source(&src).unwrap();
    let ExprKind::Binary { op, .. } = module.expr(e).kind else {
        panic!("expected binary");
    };
    assert_eq!(op, wgsl_ast::BinaryOp::Lt);
}

#[test]
fn templates_close_on_split_tokens() {
    let (module, errors) =
        parse_source("var<private> m: array<vec2<f32>>;\nfn f() { var v: vec2<f32>= vec2(1.0); }");
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(module.decls.len(), 2);
}

#[test]
fn templated_call_and_bitcast() {
    let (module, e) = parse_expr_source("vec4<f32>(1.0, 2.0, 3.0, 4.0,)").unwrap();
    let ExprKind::Call { callee, args } = &module.expr(e).kind else {
        panic!("expected call");
    };
    assert_eq!(callee.ident.node, "vec4");
    assert_eq!(callee.template_args.len(), 1);
    assert_eq!(args.len(), 4);

    let (module, e) = parse_expr_source("bitcast<vec2<u32>>(x)").unwrap();
    assert!(matches!(module.expr(e).kind, ExprKind::Bitcast { .. }));
}

#[test]
fn parenthesized_expression_span_covers_parens() {
    let src = "(a + b)";
    let (module, e) = parse_expr_source(src).unwrap();
    assert_eq!(module.expr(e).span.offset(), 0);
    assert_eq!(module.expr(e).span.len(), src.len());
}

#[test]
fn loop_with_continuing_and_break_if() {
    let src = "fn f() { var i = 0; loop { i++; continuing { i += 1; break if i > 4; } } }";
    let (module, errors) = parse_source(src);
    assert!(errors.is_empty(), "{errors:?}");
    let (_, f) = module.functions().next().unwrap();
    let StmtKind::Loop(l) = &module.stmt(f.body.stmts[1]).kind else {
        panic!("expected loop");
    };
    let continuing = l.continuing.as_ref().unwrap();
    assert!(continuing.break_if.is_some());
    assert_eq!(continuing.body.stmts.len(), 1);
}

#[test]
fn break_if_must_be_last() {
    let src = "fn f() { loop { continuing { break if true; let x = 1; } } }";
    let (_, errors) = parse_source(src);
    assert!(
        errors
            .iter()
            .any(|e| e.message.contains("'break if' must be the last statement"))
    );
}

#[test]
fn switch_with_selector_lists() {
    let src = "fn f(x: i32) { switch x { case 1, 2: { } case default, 3 { } } }";
    let (module, errors) = parse_source(src);
    assert!(errors.is_empty(), "{errors:?}");
    let (_, f) = module.functions().next().unwrap();
    let StmtKind::Switch(s) = &module.stmt(f.body.stmts[0]).kind else {
        panic!("expected switch");
    };
    assert_eq!(s.clauses.len(), 2);
    assert_eq!(s.clauses[0].selectors.len(), 2);
}

#[test]
fn for_loop_header() {
    let src = "fn f() { for (var i = 0; i < 4; i++) { } }";
    let (module, errors) = parse_source(src);
    assert!(errors.is_empty(), "{errors:?}");
    let (_, f) = module.functions().next().unwrap();
    let StmtKind::For(l) = &module.stmt(f.body.stmts[0]).kind else {
        panic!("expected for");
    };
    assert!(l.init.is_some() && l.cond.is_some() && l.update.is_some());
}

#[test]
fn entry_point_attributes_are_kept() {
    let src = "@compute @workgroup_size(8, 8, 1) fn main(@builtin(global_invocation_id) id: vec3<u32>) {}";
    let (module, errors) = parse_source(src);
    assert!(errors.is_empty(), "{errors:?}");
    let (_, GlobalDecl::Function(f)) = module.decls.iter().next().unwrap() else {
        panic!("expected fn");
    };
    assert_eq!(f.attrs.len(), 2);
    assert_eq!(f.attrs[1].args.len(), 3);
    assert_eq!(f.params[0].attrs[0].name.node, "builtin");
}

#[test]
fn stops_after_error_limit() {
    let src = "fn f() {\n".to_string() + &"  let = 1;\n".repeat(MAX_ERRORS + 10) + "}";
    let (_, errors) = parse_source(&src);
    assert_eq!(errors.len(), MAX_ERRORS + 1);
    assert_eq!(
        errors.last().unwrap().message,
        format!("stopping after {MAX_ERRORS} errors")
    );
}

#[test]
fn deep_nesting_hits_recursion_limit() {
    let src = "(".repeat(400) + "1" + &")".repeat(400);
    let err = parse_expr_source(&src).unwrap_err();
    assert_eq!(err.message, "maximum parser recursive depth reached");
}
