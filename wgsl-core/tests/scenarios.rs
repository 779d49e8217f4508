use wgsl_ast::{Diagnostics, Module, Severity};
use wgsl_core::{FeatureSet, ResolveError, SemanticInfo, lower, resolve};
use wgsl_ir::{
    AddressSpace, ConstValue, InstKind, ScalarValue, Terminator, disassemble, validate,
};

fn front_end(src: &str) -> (Module, Result<SemanticInfo, ResolveError>, Diagnostics) {
    let mut diags = Diagnostics::for_source("scenario.wgsl", src);
    let module = wgsl_parse::parse(wgsl_lex::tokenize(src), &mut diags).expect("parse failed");
    let info = resolve(&module, &FeatureSet::new(), &mut diags);
    (module, info, diags)
}

fn compile(src: &str) -> wgsl_ir::Module {
    let (module, info, mut diags) = front_end(src);
    let info = info.unwrap_or_else(|e| panic!("{e}"));
    let ir = lower(&module, &info, &mut diags).unwrap();
    validate(&ir).unwrap_or_else(|e| panic!("{e}\n{}", disassemble(&ir)));
    ir
}

#[test]
fn abstract_sum_returns_folded_i32() {
    let ir = compile("fn f() -> i32 { return 1 + 2; }");
    assert_eq!(ir.functions.len(), 1);
    let f = &ir.functions[0];
    assert_eq!(f.name, "f");
    assert_eq!(f.blocks.len(), 1);
    let Some(Terminator::Return(Some(v))) = f.blocks[0].term else {
        panic!("{}", disassemble(&ir));
    };
    assert_eq!(ir.types.display(ir.value_type(v).unwrap()), "i32");
    assert_eq!(
        ir.constant_value(v),
        Some(&ConstValue::Scalar(ScalarValue::I32(3)))
    );
}

#[test]
fn private_variable_is_stored_from_a_function() {
    let ir = compile("var<private> x : i32; fn f() { x = 5; }");
    assert_eq!(ir.root.insts.len(), 1);
    let root = &ir.root.insts[0];
    let InstKind::Var { name, space, .. } = &root.kind else {
        panic!("{}", disassemble(&ir));
    };
    assert_eq!(name, "x");
    assert_eq!(*space, AddressSpace::Private);

    let f = ir.function_by_name("f").unwrap();
    let stores: Vec<_> = f
        .insts()
        .filter_map(|i| match i.kind {
            InstKind::Store { ptr, value } => Some((ptr, value)),
            _ => None,
        })
        .collect();
    assert_eq!(stores.len(), 1);
    assert_eq!(Some(stores[0].0), root.dest);
    assert_eq!(
        ir.constant_value(stores[0].1),
        Some(&ConstValue::Scalar(ScalarValue::I32(5)))
    );
}

#[test]
fn duplicate_module_scope_name_reports_both_locations() {
    let src = "var<private> x : i32; var<private> x : f32;";
    let (_, info, diags) = front_end(src);
    let Err(ResolveError::Redeclaration {
        name,
        span,
        previous,
    }) = info
    else {
        panic!("expected a redeclaration");
    };
    assert_eq!(name, "x");
    assert_eq!(previous.offset(), src.find("x :").unwrap());
    assert_eq!(span.offset(), src.rfind("x :").unwrap());

    let d = diags.errors().next().unwrap();
    assert_eq!(d.notes.len(), 1);
    assert_eq!(d.notes[0].span.offset(), previous.offset());
}

#[test]
fn mismatched_builtin_call_lists_the_attempted_signature() {
    let (_, info, diags) = front_end("fn f() { let v = dot(vec2(1.0), vec3(1.0)); }");
    let Err(ResolveError::NoMatchingOverload { call, candidates, .. }) = info else {
        panic!("expected no matching overload");
    };
    assert_eq!(call, "dot(vec2<abstract-float>, vec3<abstract-float>)");
    assert!(candidates.iter().all(|c| c.starts_with("dot(")), "{candidates:?}");
    assert_eq!(diags.error_count(), 1);
}

#[test]
fn unknown_builtin_is_unresolved() {
    let (_, info, _) = front_end("fn f() { let v = lenght(vec2(1.0)); }");
    let Err(ResolveError::UnresolvedIdentifier { suggestion, .. }) = info else {
        panic!("expected an unresolved identifier");
    };
    assert_eq!(suggestion.as_deref(), Some("length"));
}

#[test]
fn directive_after_declaration_fails_to_parse() {
    let src = "diagnostic(off, foo); var<private> t: f32 = 0.0; diagnostic(off, bar);";
    let mut diags = Diagnostics::for_source("scenario.wgsl", src);
    let err = wgsl_parse::parse(wgsl_lex::tokenize(src), &mut diags).unwrap_err();
    assert!(err
        .message
        .contains("directives must come before all global declarations"));
    assert_eq!(err.span.offset(), src.rfind("diagnostic").unwrap());
}

#[test]
fn unterminated_comment_is_one_error_at_its_start() {
    let src = "fn f() {}\n/* open";
    let mut diags = Diagnostics::for_source("scenario.wgsl", src);
    assert!(wgsl_parse::parse(wgsl_lex::tokenize(src), &mut diags).is_err());
    let errors: Vec<_> = diags.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "unterminated block comment");
    assert_eq!(errors[0].span.offset(), src.find("/*").unwrap());
}

#[test]
fn warnings_alone_do_not_fail_a_compilation() {
    let (module, info, mut diags) = front_end("diagnostic(off, not_a_rule);\nfn f() { return; }");
    let info = info.unwrap();
    assert!(lower(&module, &info, &mut diags).is_ok());
    assert!(!diags.has_errors());
    assert!(diags.iter().all(|d| d.severity == Severity::Warning));
}

#[test]
fn fragment_shader_with_texture_sampling() {
    let ir = compile(
        "@group(0) @binding(0) var t: texture_2d<f32>;\n\
         @group(0) @binding(1) var s: sampler;\n\
         @fragment fn fs(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {\n\
             return textureSample(t, s, uv);\n\
         }",
    );
    let fs = ir.entry_points().next().unwrap();
    assert_eq!(fs.ret.as_ref().unwrap().io.location, Some(0));
    assert!(fs.insts().any(|i| matches!(
        &i.kind,
        InstKind::BuiltinCall { name, .. } if name == "textureSample"
    )));
}
