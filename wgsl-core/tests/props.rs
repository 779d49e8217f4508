use proptest::prelude::*;
use wgsl_ast::Diagnostics;
use wgsl_core::{BuiltinTable, FeatureSet, lower, overload, resolve};
use wgsl_ir::{Pipeline, Scalar, TargetOptions, TypeArena, disassemble, validate};

const SCALARS: [Scalar; 5] = [
    Scalar::AbstractInt,
    Scalar::AbstractFloat,
    Scalar::I32,
    Scalar::U32,
    Scalar::F32,
];

const FUNCTIONS: [&str; 6] = ["max", "min", "clamp", "abs", "select", "dot"];

fn arg_type(types: &mut TypeArena, scalar: Scalar, width: u8) -> wgsl_ir::TypeId {
    if width == 1 {
        types.scalar(scalar)
    } else {
        types.vector(width, scalar)
    }
}

proptest! {
    #[test]
    fn overload_selection_is_deterministic(
        function in 0..FUNCTIONS.len(),
        args in prop::collection::vec((0..SCALARS.len(), 1u8..=4), 1..=3),
    ) {
        let table = BuiltinTable::standard();
        let overloads = table.function(FUNCTIONS[function]).unwrap();
        let mut types = TypeArena::new();
        let arg_tys: Vec<_> = args
            .iter()
            .map(|&(s, w)| arg_type(&mut types, SCALARS[s], w))
            .collect();
        let first = overload::select(&mut types, overloads, &arg_tys);
        for _ in 0..3 {
            let again = overload::select(&mut types, overloads, &arg_tys);
            prop_assert_eq!(&again, &first);
        }
    }

    #[test]
    fn lowered_blocks_each_end_in_one_terminator(
        a in -100i32..100,
        b in -100i32..100,
        n in 0u32..8,
        use_loop in any::<bool>(),
        use_switch in any::<bool>(),
    ) {
        let mut body = format!("var acc = {a};\n");
        if use_loop {
            body.push_str(&format!(
                "for (var i = 0u; i < {n}u; i++) {{ if acc > {b} && i != 3u {{ acc -= 1; continue; }} acc += 2; }}\n"
            ));
        }
        if use_switch {
            body.push_str("switch acc { case 0: { acc = 1; } case 1, 2: { break; } default: { acc *= 2; } }\n");
        }
        body.push_str("loop { acc += 1; if acc > 50 || acc < -50 { break; } continuing { break if acc == 7; } }\n");
        let src = format!("fn f() -> i32 {{\n{body}return acc;\n}}");

        let (module, errors) = wgsl_parse::parse_source(&src);
        prop_assert!(errors.is_empty(), "{:?}", errors);
        let mut diags = Diagnostics::for_source("prop.wgsl", &src);
        let info = resolve(&module, &FeatureSet::new(), &mut diags).unwrap();
        let mut ir = lower(&module, &info, &mut diags).unwrap();
        prop_assert!(validate(&ir).is_ok(), "{}", disassemble(&ir));
        for function in &ir.functions {
            for block in &function.blocks {
                prop_assert!(block.term.is_some());
            }
        }

        let target = TargetOptions::default();
        let pipeline = Pipeline::for_target(&target);
        pipeline.run(&mut ir, target.inputs()).unwrap();
        let once = disassemble(&ir);
        pipeline.run(&mut ir, target.inputs()).unwrap();
        prop_assert_eq!(disassemble(&ir), once);
    }

    #[test]
    fn resolving_twice_gives_the_same_types(values in prop::collection::vec(-1000i64..1000, 1..6)) {
        let sum = values
            .iter()
            .map(|v| format!("({v})"))
            .collect::<Vec<_>>()
            .join(" + ");
        let src = format!("const c = {sum};\nfn f() -> f32 {{ let x = max(c, 0.5); return x; }}");
        let (module, _) = wgsl_parse::parse_source(&src);
        let mut diags = Diagnostics::for_source("prop.wgsl", &src);
        let first = resolve(&module, &FeatureSet::new(), &mut diags).unwrap();
        let second = resolve(&module, &FeatureSet::new(), &mut diags).unwrap();
        prop_assert_eq!(first.calls, second.calls);
        let mut a: Vec<_> = first.exprs.iter().map(|(k, v)| (*k, first.types.display(v.ty))).collect();
        let mut b: Vec<_> = second.exprs.iter().map(|(k, v)| (*k, second.types.display(v.ty))).collect();
        a.sort_by_key(|e| e.0.index());
        b.sort_by_key(|e| e.0.index());
        prop_assert_eq!(a, b);
    }
}
