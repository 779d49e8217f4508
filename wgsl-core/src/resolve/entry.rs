#![forbid(unsafe_code)]

//! Attributes, shader stages and entry point interfaces.

use std::collections::HashSet;

use wgsl_ast::{Attribute, ExprKind, FunctionDecl, Span, find_attr};
use wgsl_ir::{ArraySize, IoAttributes, Scalar, Stage, Type, TypeId};

use super::{Resolver, Result};
use crate::error::ResolveError;
use crate::features::Feature;
use crate::info::{EvalStage, FunctionInfo};
use crate::overload;

const ALL_ATTRS: &[&str] = &[
    "align",
    "binding",
    "blend_src",
    "builtin",
    "compute",
    "const",
    "diagnostic",
    "fragment",
    "group",
    "id",
    "interpolate",
    "invariant",
    "location",
    "must_use",
    "size",
    "vertex",
    "workgroup_size",
];

pub(super) const FUNCTION_ATTRS: &[&str] = &[
    "vertex",
    "fragment",
    "compute",
    "workgroup_size",
    "must_use",
    "diagnostic",
];
pub(super) const PARAM_ATTRS: &[&str] = &["builtin", "location", "interpolate", "invariant"];
pub(super) const RETURN_ATTRS: &[&str] =
    &["builtin", "location", "interpolate", "invariant", "blend_src"];
pub(super) const MEMBER_ATTRS: &[&str] = &[
    "builtin",
    "location",
    "interpolate",
    "invariant",
    "blend_src",
    "size",
    "align",
];
pub(super) const VAR_ATTRS: &[&str] = &["group", "binding"];
pub(super) const OVERRIDE_ATTRS: &[&str] = &["id"];

const INTERPOLATION_TYPES: [&str; 3] = ["perspective", "linear", "flat"];
const INTERPOLATION_SAMPLING: [&str; 5] = ["center", "centroid", "sample", "first", "either"];

/// Value type of a builtin input or output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuiltinTy {
    Bool,
    U32,
    F32,
    Vec3U32,
    Vec4F32,
    /// `array<f32, N>` with `N` at most 8.
    ClipArray,
}

struct BuiltinValue {
    /// Stage and direction (`true` for inputs) pairs the value is valid for.
    uses: &'static [(Stage, bool)],
    ty: BuiltinTy,
    feature: Option<Feature>,
}

fn builtin_value(name: &str) -> Option<BuiltinValue> {
    use Stage::{Compute, Fragment, Vertex};
    let (uses, ty, feature): (&'static [(Stage, bool)], _, _) = match name {
        "vertex_index" | "instance_index" => (&[(Vertex, true)], BuiltinTy::U32, None),
        "position" => (&[(Vertex, false), (Fragment, true)], BuiltinTy::Vec4F32, None),
        "front_facing" => (&[(Fragment, true)], BuiltinTy::Bool, None),
        "frag_depth" => (&[(Fragment, false)], BuiltinTy::F32, None),
        "sample_index" => (&[(Fragment, true)], BuiltinTy::U32, None),
        "sample_mask" => (&[(Fragment, true), (Fragment, false)], BuiltinTy::U32, None),
        "local_invocation_index" => (&[(Compute, true)], BuiltinTy::U32, None),
        "local_invocation_id" | "global_invocation_id" | "workgroup_id" | "num_workgroups" => {
            (&[(Compute, true)], BuiltinTy::Vec3U32, None)
        }
        "clip_distances" => (
            &[(Vertex, false)],
            BuiltinTy::ClipArray,
            Some(Feature::ClipDistances),
        ),
        "subgroup_invocation_id" | "subgroup_size" => (
            &[(Compute, true), (Fragment, true)],
            BuiltinTy::U32,
            Some(Feature::Subgroups),
        ),
        _ => return None,
    };
    Some(BuiltinValue { uses, ty, feature })
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Vertex => "vertex",
        Stage::Fragment => "fragment",
        Stage::Compute => "compute",
    }
}

/// Builtins and locations already used on one side of an interface.
#[derive(Default)]
struct Seen {
    builtins: HashSet<String>,
    locations: HashSet<(u32, Option<u32>)>,
}

impl Resolver<'_> {
    /// Rejects unknown, misplaced and repeated attributes.
    pub(super) fn check_attrs(&mut self, attrs: &[Attribute], allowed: &[&str], what: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for attr in attrs {
            let name = attr.name.node.as_str();
            if !ALL_ATTRS.contains(&name) {
                return Err(ResolveError::attribute(
                    attr.span,
                    format!("unknown attribute '@{name}'"),
                ));
            }
            if !allowed.contains(&name) {
                return Err(ResolveError::attribute(
                    attr.span,
                    format!("attribute '@{name}' is not valid on {what}"),
                ));
            }
            if !seen.insert(name) {
                return Err(ResolveError::attribute(
                    attr.span,
                    format!("duplicate attribute '@{name}'"),
                ));
            }
            if name == "diagnostic" {
                self.diagnostic_attr(attr)?;
            }
        }
        Ok(())
    }

    fn diagnostic_attr(&mut self, attr: &Attribute) -> Result<()> {
        let [severity, rule] = attr.args.as_slice() else {
            return Err(ResolveError::attribute(
                attr.span,
                "'@diagnostic' expects a severity and a rule name",
            ));
        };
        let (severity, severity_span) = self.enumerant(*severity)?;
        let rule = match &self.module.expr(*rule).kind {
            ExprKind::Member { base, member } => {
                let (prefix, _) = self.enumerant(*base)?;
                format!("{prefix}.{}", member.node)
            }
            _ => self.enumerant(*rule)?.0,
        };
        self.diagnostic_rule(&severity, severity_span, &rule, attr.span)
    }

    /// A non-negative integer const-expression attribute argument.
    pub(super) fn attr_u32(&mut self, attr: &Attribute) -> Result<u32> {
        let name = attr.name.node.as_str();
        let [arg] = attr.args.as_slice() else {
            return Err(ResolveError::attribute(
                attr.span,
                format!("'@{name}' expects one argument"),
            ));
        };
        let ty = self.expr(*arg)?;
        let ty = self.value_type(ty);
        let integer = self.info.types.as_scalar(ty).is_some_and(Scalar::is_integer);
        if !integer || self.stage(*arg) != EvalStage::Const {
            return Err(ResolveError::attribute(
                attr.span,
                format!("'@{name}' value must be an integer const-expression"),
            ));
        }
        self.concretize(*arg)?;
        let value = self.info.value_of(*arg).and_then(|v| v.as_i64()).unwrap_or(-1);
        u32::try_from(value).map_err(|_| {
            ResolveError::attribute(
                attr.span,
                format!("'@{name}' value must be non-negative, found {value}"),
            )
        })
    }

    pub(super) fn shader_stage(&mut self, attrs: &[Attribute]) -> Result<Option<Stage>> {
        let mut stage = None;
        for attr in attrs {
            let s = match attr.name.node.as_str() {
                "vertex" => Stage::Vertex,
                "fragment" => Stage::Fragment,
                "compute" => Stage::Compute,
                _ => continue,
            };
            if !attr.args.is_empty() {
                return Err(ResolveError::attribute(
                    attr.span,
                    format!("'@{}' does not take arguments", attr.name.node),
                ));
            }
            if stage.is_some() {
                return Err(ResolveError::attribute(
                    attr.span,
                    "a function can have at most one shader stage attribute",
                ));
            }
            stage = Some(s);
        }
        Ok(stage)
    }

    /// `@workgroup_size` of a compute entry point. Arguments must be
    /// positive const-expressions of one integer type.
    pub(super) fn workgroup_size(
        &mut self,
        f: &FunctionDecl,
        stage: Option<Stage>,
    ) -> Result<Option<[u32; 3]>> {
        let attr = find_attr(&f.attrs, "workgroup_size");
        let attr = match (stage, attr) {
            (Some(Stage::Compute), Some(a)) => a,
            (Some(Stage::Compute), None) => {
                return Err(ResolveError::attribute(
                    f.name.span,
                    "a compute shader must include '@workgroup_size' in its attributes",
                ));
            }
            (_, Some(a)) => {
                return Err(ResolveError::attribute(
                    a.span,
                    "'@workgroup_size' is only valid on compute shaders",
                ));
            }
            (_, None) => return Ok(None),
        };
        if attr.args.is_empty() || attr.args.len() > 3 {
            return Err(ResolveError::attribute(
                attr.span,
                "'@workgroup_size' expects 1 to 3 arguments",
            ));
        }
        let mut dims = [1u32; 3];
        let mut scalars = Vec::with_capacity(attr.args.len());
        for (i, arg) in attr.args.iter().enumerate() {
            let span = self.module.expr(*arg).span;
            let ty = self.expr(*arg)?;
            let ty = self.value_type(ty);
            match self.info.types.as_scalar(ty).filter(|s| s.is_integer()) {
                Some(s) => scalars.push(s),
                None => {
                    return Err(ResolveError::attribute(
                        span,
                        "'@workgroup_size' arguments must be integers",
                    ));
                }
            }
            if self.stage(*arg) != EvalStage::Const {
                return Err(ResolveError::attribute(
                    span,
                    "'@workgroup_size' arguments must be const-expressions",
                ));
            }
            let value = self.info.value_of(*arg).and_then(|v| v.as_i64()).unwrap_or(0);
            dims[i] = match u32::try_from(value) {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ResolveError::attribute(
                        span,
                        "'@workgroup_size' arguments must be at least 1",
                    ));
                }
            };
        }
        let common = overload::common_scalar(&scalars).ok_or_else(|| {
            ResolveError::attribute(
                attr.span,
                "'@workgroup_size' arguments must be of the same type, either i32 or u32",
            )
        })?;
        let common = self.info.types.scalar(common.concretize());
        for arg in &attr.args {
            self.convert(*arg, common)?;
        }
        Ok(Some(dims))
    }

    /// Shader IO attributes on a parameter, return type or struct member.
    pub(super) fn io_attributes(&mut self, attrs: &[Attribute], span: Span) -> Result<IoAttributes> {
        let mut io = IoAttributes::default();
        for attr in attrs {
            match attr.name.node.as_str() {
                "builtin" => {
                    let [arg] = attr.args.as_slice() else {
                        return Err(ResolveError::attribute(
                            attr.span,
                            "'@builtin' expects one argument",
                        ));
                    };
                    let (name, name_span) = self.enumerant(*arg)?;
                    if builtin_value(&name).is_none() {
                        return Err(ResolveError::attribute(
                            name_span,
                            format!("unknown builtin value '{name}'"),
                        ));
                    }
                    io.builtin = Some(name);
                }
                "location" => io.location = Some(self.attr_u32(attr)?),
                "interpolate" => io.interpolate = Some(self.interpolation(attr)?),
                "invariant" => {
                    if !attr.args.is_empty() {
                        return Err(ResolveError::attribute(
                            attr.span,
                            "'@invariant' does not take arguments",
                        ));
                    }
                    io.invariant = true;
                }
                "blend_src" => {
                    self.require(Feature::DualSourceBlending, "'@blend_src'", attr.span)?;
                    let value = self.attr_u32(attr)?;
                    if value > 1 {
                        return Err(ResolveError::attribute(
                            attr.span,
                            "'@blend_src' value must be 0 or 1",
                        ));
                    }
                    io.blend_src = Some(value);
                }
                _ => {}
            }
        }
        let fail = |message: &str| -> Result<IoAttributes> { Err(ResolveError::attribute(span, message)) };
        if io.builtin.is_some() && io.location.is_some() {
            return fail("'@builtin' and '@location' cannot be used together");
        }
        if io.interpolate.is_some() && io.location.is_none() {
            return fail("'@interpolate' can only be used with '@location'");
        }
        if io.invariant && io.builtin.as_deref() != Some("position") {
            return fail("'@invariant' must be applied to a 'position' builtin");
        }
        if io.blend_src.is_some() && io.location != Some(0) {
            return fail("'@blend_src' requires '@location(0)'");
        }
        Ok(io)
    }

    /// `@interpolate(type[, sampling])`, normalized to `"type"` or
    /// `"type, sampling"`.
    fn interpolation(&mut self, attr: &Attribute) -> Result<String> {
        let (ty, sampling) = match attr.args.as_slice() {
            [ty] => (self.enumerant(*ty)?, None),
            [ty, sampling] => (self.enumerant(*ty)?, Some(self.enumerant(*sampling)?)),
            _ => {
                return Err(ResolveError::attribute(
                    attr.span,
                    "'@interpolate' expects an interpolation type and an optional sampling",
                ));
            }
        };
        let (ty, ty_span) = ty;
        if !INTERPOLATION_TYPES.contains(&ty.as_str()) {
            return Err(ResolveError::attribute(
                ty_span,
                format!("unknown interpolation type '{ty}'"),
            ));
        }
        let Some((sampling, sampling_span)) = sampling else {
            return Ok(ty);
        };
        if !INTERPOLATION_SAMPLING.contains(&sampling.as_str()) {
            return Err(ResolveError::attribute(
                sampling_span,
                format!("unknown interpolation sampling '{sampling}'"),
            ));
        }
        let flat_sampling = matches!(sampling.as_str(), "first" | "either");
        if (ty == "flat") != flat_sampling {
            return Err(ResolveError::attribute(
                sampling_span,
                format!("interpolation sampling '{sampling}' is not valid with '{ty}'"),
            ));
        }
        Ok(format!("{ty}, {sampling}"))
    }

    /// Checks the parameters and return value of an entry point against the
    /// stage's interface rules.
    pub(super) fn entry_point_io(&mut self, f: &FunctionDecl, info: &FunctionInfo) -> Result<()> {
        let Some(stage) = info.stage else {
            return Ok(());
        };
        let mut inputs = Seen::default();
        for (p, param) in f.params.iter().zip(&info.params) {
            self.interface(stage, true, &param.io, param.ty, p.span, &mut inputs)?;
        }
        let mut outputs = Seen::default();
        if let (Some(ret), Some(r)) = (info.ret, &f.ret) {
            let span = self.module.expr(r.ty).span;
            if stage == Stage::Compute {
                return Err(ResolveError::validation(
                    span,
                    "compute entry points must not return a value",
                ));
            }
            self.interface(stage, false, &info.ret_io, ret, span, &mut outputs)?;
        }
        if stage == Stage::Vertex && !outputs.builtins.contains("position") {
            return Err(ResolveError::attribute(
                f.name.span,
                "a vertex shader must include the 'position' builtin in its return type",
            ));
        }
        Ok(())
    }

    fn interface(
        &mut self,
        stage: Stage,
        input: bool,
        io: &IoAttributes,
        ty: TypeId,
        span: Span,
        seen: &mut Seen,
    ) -> Result<()> {
        if !io.is_empty() {
            return self.interface_value(stage, input, io, ty, span, seen);
        }
        let Type::Struct(s) = self.info.types.get(ty).clone() else {
            return Err(ResolveError::attribute(
                span,
                if input {
                    "missing entry point IO attribute on parameter"
                } else {
                    "missing entry point IO attribute on return type"
                },
            ));
        };
        let members_io = self.info.struct_io.get(&ty).cloned().unwrap_or_default();
        for (i, member) in s.members.iter().enumerate() {
            let member_io = members_io.get(i).cloned().unwrap_or_default();
            if member_io.is_empty() {
                return Err(ResolveError::attribute(
                    span,
                    format!("missing entry point IO attribute on member '{}' of '{}'", member.name, s.name),
                ));
            }
            self.interface_value(stage, input, &member_io, member.ty, span, seen)?;
        }
        Ok(())
    }

    fn interface_value(
        &mut self,
        stage: Stage,
        input: bool,
        io: &IoAttributes,
        ty: TypeId,
        span: Span,
        seen: &mut Seen,
    ) -> Result<()> {
        let direction = if input { "input" } else { "output" };
        let stage_name = stage_name(stage);
        if let Some(name) = &io.builtin {
            let Some(value) = builtin_value(name) else {
                return Err(ResolveError::attribute(span, format!("unknown builtin value '{name}'")));
            };
            if let Some(feature) = value.feature {
                self.require(feature, format!("builtin '{name}'"), span)?;
            }
            if !value.uses.contains(&(stage, input)) {
                return Err(ResolveError::attribute(
                    span,
                    format!("builtin '{name}' cannot be used as an {direction} of a {stage_name} shader"),
                ));
            }
            if !self.builtin_type_matches(value.ty, ty) {
                return Err(ResolveError::attribute(
                    span,
                    format!(
                        "builtin '{name}' cannot have type '{}'",
                        self.display(ty)
                    ),
                ));
            }
            if !seen.builtins.insert(name.clone()) {
                return Err(ResolveError::attribute(
                    span,
                    format!("builtin '{name}' appears more than once in the {stage_name} shader {direction}s"),
                ));
            }
        }
        if let Some(location) = io.location {
            if stage == Stage::Compute {
                return Err(ResolveError::attribute(
                    span,
                    "'@location' is not valid for compute shader IO",
                ));
            }
            let scalar = match self.info.types.get(ty) {
                Type::Scalar(s) | Type::Vector { scalar: s, .. } if s.is_numeric() && !s.is_abstract() => *s,
                _ => {
                    return Err(ResolveError::attribute(
                        span,
                        format!(
                            "'@location' type must be a numeric scalar or vector, found '{}'",
                            self.display(ty)
                        ),
                    ));
                }
            };
            let interpolated = (stage == Stage::Vertex && !input) || (stage == Stage::Fragment && input);
            let flat = io.interpolate.as_deref().is_some_and(|i| i.starts_with("flat"));
            if scalar.is_integer() && interpolated && !flat {
                return Err(ResolveError::attribute(
                    span,
                    format!("integral user-defined {stage_name} {direction}s must have a '@interpolate(flat)' attribute"),
                ));
            }
            if !seen.locations.insert((location, io.blend_src)) {
                return Err(ResolveError::attribute(
                    span,
                    format!("location {location} appears more than once in the {stage_name} shader {direction}s"),
                ));
            }
        }
        if io.blend_src.is_some() && (stage != Stage::Fragment || input) {
            return Err(ResolveError::attribute(
                span,
                "'@blend_src' is only valid on fragment shader outputs",
            ));
        }
        Ok(())
    }

    fn builtin_type_matches(&self, expected: BuiltinTy, ty: TypeId) -> bool {
        match (expected, self.info.types.get(ty)) {
            (BuiltinTy::Bool, Type::Scalar(Scalar::Bool)) => true,
            (BuiltinTy::U32, Type::Scalar(Scalar::U32)) => true,
            (BuiltinTy::F32, Type::Scalar(Scalar::F32)) => true,
            (BuiltinTy::Vec3U32, Type::Vector { size: 3, scalar: Scalar::U32 }) => true,
            (BuiltinTy::Vec4F32, Type::Vector { size: 4, scalar: Scalar::F32 }) => true,
            (
                BuiltinTy::ClipArray,
                Type::Array {
                    base,
                    size: ArraySize::Constant(n),
                    ..
                },
            ) => *n <= 8 && matches!(self.info.types.get(*base), Type::Scalar(Scalar::F32)),
            _ => false,
        }
    }
}
