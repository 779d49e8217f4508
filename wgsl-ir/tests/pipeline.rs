use wgsl_ast::Span;
use wgsl_ir::transform::{BindingRemap, RobustnessConfig};
use wgsl_ir::{
    Access, AddressSpace, ArraySize, BindingPoint, Builder, ConstValue, InstKind, Pipeline,
    ScalarValue, Stage, TargetOptions, Terminator, TypeArena, disassemble, validate,
};

fn sp() -> Span {
    Span::from(0..0)
}

fn compute_module() -> wgsl_ir::Module {
    let mut b = Builder::new(TypeArena::new());
    let u32_ty = b.types().u32();
    let arr = b.types().array(u32_ty, ArraySize::Constant(16));
    let out = b.root_var(
        sp(),
        "out",
        AddressSpace::Storage,
        Access::ReadWrite,
        arr,
        None,
        Some(BindingPoint { group: 0, binding: 0 }),
    );
    let shared = b.root_var(sp(), "shared", AddressSpace::Workgroup, Access::ReadWrite, arr, None, None);
    b.begin_function("main", sp(), Some(Stage::Compute), Some([16, 1, 1]));
    let idx = b.add_param(
        "idx",
        u32_ty,
        wgsl_ir::IoAttributes {
            builtin: Some("local_invocation_index".into()),
            ..Default::default()
        },
    );
    let two = b.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(2)));
    let three = b.constant(u32_ty, ConstValue::Scalar(ScalarValue::U32(3)));
    let six = b.inst(sp(), u32_ty, InstKind::Binary { op: wgsl_ir::BinOp::Mul, lhs: two, rhs: three });
    let ptr_ty = b.types().pointer(AddressSpace::Workgroup, u32_ty, Access::ReadWrite);
    let slot = b.inst(sp(), ptr_ty, InstKind::Access { base: shared, indices: vec![idx] });
    b.effect(sp(), InstKind::Store { ptr: slot, value: six });
    let out_ptr = b.types().pointer(AddressSpace::Storage, u32_ty, Access::ReadWrite);
    let dst = b.inst(sp(), out_ptr, InstKind::Access { base: out, indices: vec![idx] });
    let loaded = b.inst(sp(), u32_ty, InstKind::Load { ptr: slot });
    b.effect(sp(), InstKind::Store { ptr: dst, value: loaded });
    b.terminate(Terminator::Return(None));
    b.finish_function();
    b.finish()
}

#[test]
fn full_target_pipeline_produces_valid_ir_and_is_idempotent() {
    let target = TargetOptions {
        robustness: Some(RobustnessConfig::default()),
        zero_init_workgroup_memory: true,
        binding_remap: Some(BindingRemap {
            bindings: [(
                BindingPoint { group: 0, binding: 0 },
                BindingPoint { group: 2, binding: 5 },
            )]
            .into_iter()
            .collect(),
        }),
        ..TargetOptions::default()
    };
    let pipeline = Pipeline::for_target(&target);
    let mut module = compute_module();
    pipeline.run(&mut module, target.inputs()).unwrap();
    validate(&module).unwrap();

    let text = disassemble(&module);
    assert!(text.contains("@binding_point(2, 5)"), "{text}");
    assert!(text.contains("workgroupBarrier"), "{text}");
    assert!(text.contains("min %"), "{text}");
    assert!(text.contains("store %"), "{text}");
    assert!(!text.contains("mul"), "{text}");

    let once = text.clone();
    pipeline.run(&mut module, target.inputs()).unwrap();
    assert_eq!(disassemble(&module), once);
}

#[test]
fn default_target_skips_optional_transforms() {
    let target = TargetOptions::default();
    let names = Pipeline::for_target(&target).names(&target.inputs()).unwrap();
    assert_eq!(names, ["ConstantFolding", "DeadCodeElimination"]);
}
