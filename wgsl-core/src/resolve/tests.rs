use wgsl_ast::{Diagnostics, Severity};
use wgsl_ir::Stage;

use super::*;
use crate::info::LocalInfo;

fn run(src: &str, features: &FeatureSet) -> (Result<SemanticInfo>, Diagnostics) {
    let (module, errors) = wgsl_parse::parse_source(src);
    assert!(errors.is_empty(), "parse errors: {errors:?}");
    let mut diags = Diagnostics::for_source("test.wgsl", src);
    let result = resolve(&module, features, &mut diags);
    (result, diags)
}

fn ok(src: &str) -> SemanticInfo {
    let (result, diags) = run(src, &FeatureSet::new());
    match result {
        Ok(info) => info,
        Err(e) => panic!("unexpected error: {e}\n{:?}", diags.into_vec()),
    }
}

fn err(src: &str) -> ResolveError {
    run(src, &FeatureSet::new()).0.expect_err("expected a resolve error")
}

fn local<'a>(info: &'a SemanticInfo, name: &str) -> &'a LocalInfo {
    info.locals
        .values()
        .find(|l| l.name == name)
        .unwrap_or_else(|| panic!("no local named '{name}'"))
}

fn global_const(src: &str, name: &str) -> i64 {
    let (module, _) = wgsl_parse::parse_source(src);
    let info = ok(src);
    let id = module.find_decl(name).unwrap();
    match &info.globals[&id] {
        GlobalInfo::Const { value, .. } => value.as_i64().unwrap(),
        other => panic!("expected const, found {other:?}"),
    }
}

#[test]
fn folds_module_scope_constants() {
    let src = "const a = 4; const b = a * (a + 1); const c: i32 = b - 2;";
    assert_eq!(global_const(src, "b"), 20);
    assert_eq!(global_const(src, "c"), 18);
}

#[test]
fn declarations_resolve_out_of_order() {
    let info = ok("fn f() -> i32 { return g() + k; } fn g() -> i32 { return 1; } const k = 2;");
    assert_eq!(info.functions.len(), 2);
}

#[test]
fn let_concretizes_abstract_initializers() {
    let info = ok("fn f() { let x = 1; let y = 1.5; let z = vec2(1, 2); }");
    assert_eq!(info.types.display(local(&info, "x").ty), "i32");
    assert_eq!(info.types.display(local(&info, "y").ty), "f32");
    assert_eq!(info.types.display(local(&info, "z").ty), "vec2<i32>");
}

#[test]
fn unresolved_identifier_suggests_a_close_name() {
    let e = err("fn f() { let value = 1; let x = valeu; }");
    let ResolveError::UnresolvedIdentifier { name, suggestion, .. } = e else {
        panic!("unexpected error: {e:?}");
    };
    assert_eq!(name, "valeu");
    assert_eq!(suggestion.as_deref(), Some("value"));
}

#[test]
fn module_scope_redeclaration_points_at_both_sites() {
    let src = "const a = 1;\nconst a = 2;";
    let e = err(src);
    let ResolveError::Redeclaration { span, previous, .. } = e else {
        panic!("unexpected error: {e:?}");
    };
    assert_eq!(previous.offset(), src.find('a').unwrap());
    assert_eq!(span.offset(), src.rfind('a').unwrap());
}

#[test]
fn locals_may_shadow_globals_but_not_siblings() {
    ok("const a = 1; fn f() { let a = 2.0; { let a = true; } }");
    let e = err("fn f() { let a = 1; let a = 2; }");
    assert!(matches!(e, ResolveError::Redeclaration { .. }), "{e:?}");
}

#[test]
fn float_does_not_convert_to_unsigned() {
    let e = err("fn f() { let x: u32 = 1.5; }");
    assert!(
        matches!(e, ResolveError::InvalidImplicitConversion { .. }),
        "{e:?}"
    );
}

#[test]
fn const_overflow_is_an_error() {
    let e = err("const x = 2147483647i + 1i;");
    assert!(
        matches!(e, ResolveError::ConstEvaluationOverflow { .. }),
        "{e:?}"
    );
}

#[test]
fn f16_needs_its_enable_directive() {
    let e = err("var<private> h: f16;");
    let ResolveError::FeatureNotEnabled { directive, .. } = e else {
        panic!("unexpected error: {e:?}");
    };
    assert_eq!(directive, "enable f16;");
    ok("enable f16;\nvar<private> h: f16;");
}

#[test]
fn f16_literals_round_to_the_largest_finite_value() {
    let src = "enable f16;\nconst h = 65519.0h;";
    let (module, _) = wgsl_parse::parse_source(src);
    let info = ok(src);
    let id = module.find_decl("h").unwrap();
    let GlobalInfo::Const { value, .. } = &info.globals[&id] else {
        panic!("expected const");
    };
    let v = value.as_scalar().and_then(|s| s.as_f64());
    assert_eq!(v, Some(65504.0));
}

#[test]
fn disabled_extension_rejects_its_directive() {
    let features = FeatureSet::new().with_disabled("f16");
    let (result, diags) = run("enable f16;", &features);
    assert!(result.is_err());
    assert_eq!(diags.error_count(), 1);
}

#[test]
fn mutual_recursion_is_a_cycle() {
    let e = err("fn a() { b(); } fn b() { a(); }");
    assert!(matches!(e, ResolveError::CyclicDependency { .. }), "{e:?}");
}

#[test]
fn uses_of_a_failed_declaration_report_once() {
    let (result, diags) = run(
        "const a = missing; const b = a + 1; fn f() -> i32 { return b; }",
        &FeatureSet::new(),
    );
    assert!(result.is_err());
    assert_eq!(diags.error_count(), 1, "{:?}", diags.into_vec());
}

#[test]
fn independent_errors_are_all_reported_in_order() {
    let src = "fn f() { let a: u32 = -1; }\nfn g() { break; }";
    let (result, diags) = run(src, &FeatureSet::new());
    assert!(result.is_err());
    let offsets: Vec<_> = diags.errors().map(|d| d.span.offset()).collect();
    assert_eq!(offsets.len(), 2);
    assert!(offsets[0] < offsets[1]);
}

#[test]
fn falling_off_a_value_function_is_an_error() {
    let e = err("fn f(c: bool) -> i32 { if c { return 1; } }");
    assert!(e.to_string().contains("missing return"), "{e}");
    ok("fn f(c: bool) -> i32 { if c { return 1; } else { return 2; } }");
    ok("fn f() -> i32 { loop { return 1; } }");
}

#[test]
fn failed_statements_do_not_add_a_missing_return() {
    for src in [
        "fn f() -> i32 { return missing; }",
        "fn f() -> i32 { return 3000000000; }",
        "fn f() -> f32 { return 1e38f * 10.0f; }",
        "fn f(c: bool) -> i32 { if c { return 1; } else { let x: u32 = -1; } }",
    ] {
        let (result, diags) = run(src, &FeatureSet::new());
        assert!(result.is_err(), "{src}");
        let messages: Vec<_> = diags.errors().map(|d| d.message.clone()).collect();
        assert_eq!(messages.len(), 1, "{src}: {messages:?}");
        assert!(!messages[0].contains("missing return"), "{src}: {messages:?}");
    }
}

#[test]
fn break_and_continue_need_an_enclosing_construct() {
    assert!(err("fn f() { break; }").to_string().contains("'break'"));
    assert!(err("fn f() { continue; }").to_string().contains("'continue'"));
    ok("fn f() { for (var i = 0; i < 4; i++) { if i == 2 { continue; } break; } }");
}

#[test]
fn return_inside_continuing_is_rejected() {
    let e = err("fn f() { loop { continuing { return; } } }");
    assert!(matches!(e, ResolveError::Validation { .. }), "{e:?}");
}

#[test]
fn unreachable_code_warns_without_failing() {
    let (result, diags) = run("fn f() { return; let x = 1; }", &FeatureSet::new());
    assert!(result.is_ok());
    assert!(
        diags
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("unreachable")),
        "{:?}",
        diags.into_vec()
    );
}

#[test]
fn duplicate_switch_cases_are_rejected() {
    let e = err("fn f(x: i32) { switch x { case 1: {} case 2, 1: {} default: {} } }");
    let ResolveError::Redeclaration { name, .. } = e else {
        panic!("unexpected error: {e:?}");
    };
    assert_eq!(name, "case 1");
    assert!(err("fn f(x: i32) { switch x { case 1: {} } }").to_string().contains("default"));
}

#[test]
fn builtin_overloads_unify_abstract_arguments() {
    let info = ok("fn f() { let m = max(1, 2.5); let n = max(1u, 2); }");
    assert_eq!(info.types.display(local(&info, "m").ty), "f32");
    assert_eq!(info.types.display(local(&info, "n").ty), "u32");
}

#[test]
fn mismatched_builtin_arguments_list_candidates() {
    let e = err("fn f() { let x = max(1u, 2i); }");
    let ResolveError::NoMatchingOverload { call, candidates, .. } = e else {
        panic!("unexpected error: {e:?}");
    };
    assert_eq!(call, "max(u32, i32)");
    assert!(!candidates.is_empty());
}

#[test]
fn const_index_out_of_bounds() {
    let e = err("fn f() { let a = array(1, 2, 3); let b = a[3]; }");
    assert!(e.to_string().contains("out of bounds"), "{e}");
}

#[test]
fn resources_need_group_and_binding() {
    let e = err("@group(0) var<storage, read> data: array<u32>;");
    assert!(matches!(e, ResolveError::InvalidAttribute { .. }), "{e:?}");
    ok("@group(0) @binding(1) var<storage, read> data: array<u32>;");
}

#[test]
fn storage_access_mode_applies_only_to_storage() {
    let e = err("var<private, read> x: f32;");
    assert!(
        matches!(e, ResolveError::InvalidAddressSpaceUsage { .. }),
        "{e:?}"
    );
}

#[test]
fn writes_through_read_only_storage_fail() {
    let e = err(
        "@group(0) @binding(0) var<storage> data: array<u32>;\n\
         fn f() { data[0] = 1u; }",
    );
    assert!(
        matches!(e, ResolveError::InvalidAddressSpaceUsage { .. }),
        "{e:?}"
    );
}

#[test]
fn unknown_and_misplaced_attributes() {
    let e = err("@fancy fn f() {}");
    assert!(e.to_string().contains("unknown attribute"), "{e}");
    let e = err("@location(0) fn f() {}");
    assert!(e.to_string().contains("not valid on a function"), "{e}");
}

#[test]
fn override_ids_are_unique() {
    let e = err("@id(1) override a: f32; @id(1) override b: f32;");
    assert!(matches!(e, ResolveError::Redeclaration { .. }), "{e:?}");
}

#[test]
fn failing_const_assert() {
    let e = err("const_assert 1 > 2;");
    assert!(e.to_string().contains("const assertion failed"), "{e}");
    ok("const n = 4; const_assert n * 2 == 8;");
}

#[test]
fn compute_entry_point_records_workgroup_size() {
    let src = "@compute @workgroup_size(8, 4) fn main(@builtin(global_invocation_id) id: vec3<u32>) {}";
    let info = ok(src);
    let f = info.functions.values().next().unwrap();
    assert_eq!(f.stage, Some(Stage::Compute));
    assert_eq!(f.workgroup_size, Some([8, 4, 1]));
    assert!(err("@compute fn main() {}").to_string().contains("workgroup_size"));
    assert!(err("@compute @workgroup_size(0) fn main() {}").to_string().contains("at least 1"));
}

#[test]
fn vertex_output_must_include_position() {
    let e = err("@vertex fn vs() -> @location(0) vec4<f32> { return vec4(0.0); }");
    assert!(e.to_string().contains("position"), "{e}");
    ok("@vertex fn vs() -> @builtin(position) vec4<f32> { return vec4(0.0); }");
}

#[test]
fn builtin_stage_and_type_are_checked() {
    let e = err("@fragment fn fs(@builtin(vertex_index) i: u32) {}");
    assert!(e.to_string().contains("vertex_index"), "{e}");
    let e = err(
        "@vertex fn vs(@builtin(vertex_index) i: i32) -> @builtin(position) vec4<f32> { return vec4(0.0); }",
    );
    assert!(e.to_string().contains("cannot have type 'i32'"), "{e}");
}

#[test]
fn integral_fragment_inputs_need_flat_interpolation() {
    let e = err("@fragment fn fs(@location(0) v: u32) {}");
    assert!(e.to_string().contains("flat"), "{e}");
    ok("@fragment fn fs(@location(0) @interpolate(flat) v: u32) {}");
}

#[test]
fn struct_io_is_flattened_and_deduplicated() {
    let src = "struct Out { @builtin(position) pos: vec4<f32>, @location(0) a: f32, @location(0) b: f32 }\n\
               @vertex fn vs() -> Out { return Out(vec4(0.0), 1.0, 2.0); }";
    let e = err(src);
    assert!(e.to_string().contains("location 0 appears more than once"), "{e}");
}

#[test]
fn entry_points_cannot_be_called() {
    let e = err("@compute @workgroup_size(1) fn main() {} fn f() { main(); }");
    assert!(matches!(e, ResolveError::Validation { .. }), "{e:?}");
}

#[test]
fn unknown_diagnostic_rule_warns() {
    let (result, diags) = run("diagnostic(off, made_up_rule);", &FeatureSet::new());
    assert!(result.is_ok());
    assert_eq!(diags.error_count(), 0);
    assert!(diags.iter().any(|d| d.severity == Severity::Warning));
    assert!(err("diagnostic(loud, derivative_uniformity);").to_string().contains("severity"));
}

#[test]
fn pointer_parameters_follow_the_language_feature() {
    let features = FeatureSet::new().with_disabled("unrestricted_pointer_parameters");
    for src in [
        "fn g(p: ptr<function, i32>) {}",
        "fn g(p: ptr<private, i32>) {}",
    ] {
        assert!(run(src, &features).0.is_ok(), "{src}");
    }
    for src in [
        "fn g(p: ptr<workgroup, i32>) {}",
        "fn g(p: ptr<storage, i32, read>) {}",
        "fn g(p: ptr<uniform, i32>) {}",
    ] {
        ok(src);
        let e = run(src, &features).0.expect_err("expected a resolve error");
        assert!(matches!(e, ResolveError::FeatureNotEnabled { .. }), "{src}: {e:?}");
    }
}

#[test]
fn compound_assignment_uses_binary_overloads() {
    ok("fn f() { var v = vec3(1.0); v *= 2.0; v += vec3(1.0); }");
    let e = err("fn f() { var b = true; b += 1; }");
    assert!(matches!(e, ResolveError::NoMatchingOverload { .. }), "{e:?}");
}

#[test]
fn let_cannot_be_assigned() {
    let e = err("fn f() { let x = 1; x = 2; }");
    assert!(e.to_string().contains("cannot assign"), "{e}");
}
