use proptest::prelude::*;
use wgsl_ir::disassemble;
use wgslc::{Compilation, CompileOptions, compile, compile_many};

fn summary(c: &Compilation) -> (Option<String>, Vec<String>) {
    (
        c.module.as_ref().map(disassemble),
        c.diagnostics.iter().map(|d| d.render_plain()).collect(),
    )
}

fn shader(seed: u32) -> String {
    match seed % 4 {
        0 => format!("fn f() -> u32 {{ return {seed}u * 3u; }}"),
        1 => format!(
            "var<private> acc: i32;\n@compute @workgroup_size({}) fn main() {{ for (var i = 0; i < {seed}; i++) {{ acc += i; }} }}",
            seed % 7 + 1
        ),
        2 => format!("fn f() -> i32 {{ return undefined_{seed}; }}"),
        _ => "fn g(a: f32) -> f32 { return max(a, 1.5) + select(0.0, 2.0, a > 0.0); }".to_string(),
    }
}

proptest! {
    #[test]
    fn parallel_results_match_sequential_ones(seeds in prop::collection::vec(0u32..200, 1..10)) {
        let inputs: Vec<_> = seeds
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("in{i}.wgsl"), shader(*s)))
            .collect();
        let options = CompileOptions::default();
        let parallel = compile_many(&inputs, &options);
        prop_assert_eq!(parallel.len(), inputs.len());
        for ((name, src), got) in inputs.iter().zip(&parallel) {
            let want = compile(src, name, &options);
            prop_assert_eq!(summary(got), summary(&want));
        }
    }
}

#[test]
fn robustness_clamps_dynamic_indices() {
    let src = "var<private> table: array<f32, 4>;\n\
               fn get(i: u32) -> f32 { return table[i]; }";
    let plain = compile(src, "r.wgsl", &CompileOptions::default());
    let mut options = CompileOptions::default();
    options.target.robustness = Some(Default::default());
    let robust = compile(src, "r.wgsl", &options);

    let plain = disassemble(plain.module.as_ref().unwrap());
    let robust = disassemble(robust.module.as_ref().unwrap());
    assert!(!plain.contains("min"), "{plain}");
    assert!(robust.contains("min"), "{robust}");
}

#[test]
fn warnings_keep_the_module() {
    let c = compile(
        "diagnostic(off, no_such_rule);\nfn f() {}",
        "w.wgsl",
        &CompileOptions::default(),
    );
    assert!(c.succeeded());
    assert_eq!(c.diagnostics.error_count(), 0);
    assert!(!c.diagnostics.is_empty());
}
