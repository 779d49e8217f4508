#![forbid(unsafe_code)]

//! Stable text form of an IR module.

use std::fmt::Write;

use crate::ir::{Function, Inst, InstKind, IoAttributes, Module, Terminator, ValueId, ValueKind};

/// Renders `module` as text. Identical modules render identically.
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    if !module.root.insts.is_empty() {
        out.push_str("$root = block {\n");
        for inst in &module.root.insts {
            write_inst(module, &mut out, inst);
        }
        out.push_str("}\n\n");
    }
    for function in &module.functions {
        write_function(module, &mut out, function);
        out.push('\n');
    }
    out
}

fn value(module: &Module, id: ValueId) -> String {
    match module.value(id).map(|v| &v.kind) {
        Some(ValueKind::Constant(c)) => c.display(&module.types),
        _ => format!("%{}", id.0),
    }
}

fn values(module: &Module, ids: &[ValueId]) -> String {
    ids.iter()
        .map(|v| value(module, *v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_attrs(io: &IoAttributes) -> String {
    let mut parts = Vec::new();
    if let Some(b) = &io.builtin {
        parts.push(format!("@builtin({b})"));
    }
    if let Some(l) = io.location {
        parts.push(format!("@location({l})"));
    }
    if let Some(i) = &io.interpolate {
        parts.push(format!("@interpolate({i})"));
    }
    if io.invariant {
        parts.push("@invariant".to_string());
    }
    if let Some(b) = io.blend_src {
        parts.push(format!("@blend_src({b})"));
    }
    let mut s = parts.join(" ");
    if !s.is_empty() {
        s.push(' ');
    }
    s
}

fn write_function(module: &Module, out: &mut String, f: &Function) {
    if let Some(stage) = f.stage {
        let _ = write!(out, "@{} ", stage.name());
    }
    if let Some([x, y, z]) = f.workgroup_size {
        let _ = write!(out, "@workgroup_size({x}, {y}, {z}) ");
    }
    let params: Vec<String> = f
        .params
        .iter()
        .map(|p| {
            format!(
                "{}%{}:{}",
                io_attrs(&p.io),
                p.value.0,
                module.types.display(p.ty)
            )
        })
        .collect();
    let ret = match &f.ret {
        Some(r) => format!("{}{}", io_attrs(&r.io), module.types.display(r.ty)),
        None => "void".to_string(),
    };
    let _ = writeln!(out, "%{} = func({}):{ret} {{", f.name, params.join(", "));
    for block in &f.blocks {
        let marker = if block.id == f.entry { " # entry" } else { "" };
        let _ = writeln!(out, "  %b{} = block {{{marker}", block.id.0);
        for inst in &block.insts {
            out.push_str("  ");
            write_inst(module, out, inst);
        }
        let term = match &block.term {
            Some(Terminator::Return(None)) => "ret".to_string(),
            Some(Terminator::Return(Some(v))) => format!("ret {}", value(module, *v)),
            Some(Terminator::Branch(b)) => format!("br %b{}", b.0),
            Some(Terminator::BranchIf {
                cond,
                then_bb,
                else_bb,
            }) => format!(
                "br_if {}, %b{}, %b{}",
                value(module, *cond),
                then_bb.0,
                else_bb.0
            ),
            Some(Terminator::Switch {
                selector,
                default_bb,
                cases,
            }) => {
                let arms: Vec<String> = cases
                    .iter()
                    .map(|(v, b)| format!("{v} => %b{}", b.0))
                    .collect();
                format!(
                    "switch {} [{}], default %b{}",
                    value(module, *selector),
                    arms.join(", "),
                    default_bb.0
                )
            }
            Some(Terminator::Unreachable) => "unreachable".to_string(),
            None => "<unterminated>".to_string(),
        };
        let _ = writeln!(out, "    {term}");
        out.push_str("  }\n");
    }
    out.push_str("}\n");
}

fn write_inst(module: &Module, out: &mut String, inst: &Inst) {
    out.push_str("  ");
    if let Some(dest) = inst.dest {
        let ty = module
            .value_type(dest)
            .map(|t| module.types.display(t))
            .unwrap_or_else(|| "?".to_string());
        let _ = write!(out, "%{}:{ty} = ", dest.0);
    }
    let body = match &inst.kind {
        InstKind::Var {
            name,
            init,
            binding,
            ..
        } => {
            let mut s = format!("var {name}");
            if let Some(init) = init {
                let _ = write!(s, ", {}", value(module, *init));
            }
            if let Some(bp) = binding {
                let _ = write!(s, " @binding_point({}, {})", bp.group, bp.binding);
            }
            s
        }
        InstKind::Override { name, id, init } => {
            let mut s = format!("override {name}");
            if let Some(init) = init {
                let _ = write!(s, ", {}", value(module, *init));
            }
            if let Some(id) = id {
                let _ = write!(s, " @id({id})");
            }
            s
        }
        InstKind::Let { name, value: v } => format!("let {name}, {}", value(module, *v)),
        InstKind::Load { ptr } => format!("load {}", value(module, *ptr)),
        InstKind::Store { ptr, value: v } => {
            format!("store {}, {}", value(module, *ptr), value(module, *v))
        }
        InstKind::Access { base, indices } => {
            format!("access {}, {}", value(module, *base), values(module, indices))
        }
        InstKind::Swizzle { base, components } => {
            let names: String = components
                .iter()
                .map(|c| ['x', 'y', 'z', 'w'].get(usize::from(*c)).copied().unwrap_or('?'))
                .collect();
            format!("swizzle {}, {names}", value(module, *base))
        }
        InstKind::Binary { op, lhs, rhs } => format!(
            "{} {}, {}",
            binop_name(*op),
            value(module, *lhs),
            value(module, *rhs)
        ),
        InstKind::Unary { op, operand } => {
            let name = match op {
                crate::ir::UnaryOp::Negate => "negation",
                crate::ir::UnaryOp::Not => "not",
                crate::ir::UnaryOp::Complement => "complement",
            };
            format!("{name} {}", value(module, *operand))
        }
        InstKind::Convert { value: v } => format!("convert {}", value(module, *v)),
        InstKind::Bitcast { value: v } => format!("bitcast {}", value(module, *v)),
        InstKind::Construct { args } => format!("construct {}", values(module, args)),
        InstKind::Call { callee, args } => {
            let name = module
                .function(*callee)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| format!("fn{}", callee.0));
            if args.is_empty() {
                format!("call %{name}")
            } else {
                format!("call %{name}, {}", values(module, args))
            }
        }
        InstKind::BuiltinCall { name, args } => {
            if args.is_empty() {
                name.clone()
            } else {
                format!("{name} {}", values(module, args))
            }
        }
        InstKind::Discard => "discard".to_string(),
    };
    out.push_str(&body);
    out.push('\n');
}

fn binop_name(op: crate::ir::BinOp) -> &'static str {
    use crate::ir::BinOp;
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
        BinOp::Eq => "eq",
        BinOp::Ne => "neq",
        BinOp::Lt => "lt",
        BinOp::Le => "lte",
        BinOp::Gt => "gt",
        BinOp::Ge => "gte",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::constant::{ConstValue, ScalarValue};
    use crate::ty::{Access, AddressSpace, TypeArena};
    use wgsl_ast::Span;

    #[test]
    fn renders_root_and_function() {
        let sp = Span::from(0..0);
        let mut b = Builder::new(TypeArena::new());
        let i32_ty = b.types().i32();
        let x = b.root_var(sp, "x", AddressSpace::Private, Access::ReadWrite, i32_ty, None, None);
        b.begin_function("f", sp, None, None);
        let five = b.constant(i32_ty, ConstValue::Scalar(ScalarValue::I32(5)));
        b.effect(sp, InstKind::Store { ptr: x, value: five });
        b.finish_function();
        let text = disassemble(&b.finish());
        let expected = "\
$root = block {
  %0:ptr<private, i32, read_write> = var x
}

%f = func():void {
  %b0 = block { # entry
    store %0, 5i
    ret
  }
}

";
        assert_eq!(text, expected);
    }
}
