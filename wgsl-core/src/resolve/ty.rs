#![forbid(unsafe_code)]

//! Type expressions: predeclared types, template lists and user aliases.

use wgsl_ast::{ExprId, ExprKind, Span, TemplatedIdent};
use wgsl_ir::{
    Access, AddressSpace, ArraySize, Scalar, TexelFormat, TextureClass, TextureDim, Type, TypeId,
};

use super::{Resolver, Result};
use crate::error::ResolveError;
use crate::features::Feature;
use crate::info::{EvalStage, GlobalInfo};
use crate::symbols::Symbol;

/// Predeclared type generators and aliases, offered as suggestions for
/// misspelled names.
pub(super) const PREDECLARED_TYPES: &[&str] = &[
    "bool",
    "i32",
    "u32",
    "f32",
    "f16",
    "vec2",
    "vec3",
    "vec4",
    "vec2i",
    "vec3i",
    "vec4i",
    "vec2u",
    "vec3u",
    "vec4u",
    "vec2f",
    "vec3f",
    "vec4f",
    "vec2h",
    "vec3h",
    "vec4h",
    "mat2x2",
    "mat2x3",
    "mat2x4",
    "mat3x2",
    "mat3x3",
    "mat3x4",
    "mat4x2",
    "mat4x3",
    "mat4x4",
    "mat2x2f",
    "mat3x3f",
    "mat4x4f",
    "array",
    "atomic",
    "ptr",
    "sampler",
    "sampler_comparison",
    "texture_1d",
    "texture_2d",
    "texture_2d_array",
    "texture_3d",
    "texture_cube",
    "texture_cube_array",
    "texture_multisampled_2d",
    "texture_depth_2d",
    "texture_depth_2d_array",
    "texture_depth_cube",
    "texture_depth_cube_array",
    "texture_depth_multisampled_2d",
    "texture_storage_1d",
    "texture_storage_2d",
    "texture_storage_2d_array",
    "texture_storage_3d",
];

/// Shape encoded in a vector or matrix name: `vec3`, `vec4f`, `mat2x3h`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Shape {
    pub columns: Option<u8>,
    pub rows: u8,
    /// Element type fixed by an alias suffix.
    pub scalar: Option<Scalar>,
}

fn dimension(c: char) -> Option<u8> {
    match c {
        '2' => Some(2),
        '3' => Some(3),
        '4' => Some(4),
        _ => None,
    }
}

fn suffix_scalar(rest: &str, allow_int: bool) -> Option<Option<Scalar>> {
    match rest {
        "" => Some(None),
        "f" => Some(Some(Scalar::F32)),
        "h" => Some(Some(Scalar::F16)),
        "i" if allow_int => Some(Some(Scalar::I32)),
        "u" if allow_int => Some(Some(Scalar::U32)),
        _ => None,
    }
}

pub(super) fn parse_shape(name: &str) -> Option<Shape> {
    if let Some(rest) = name.strip_prefix("vec") {
        let mut chars = rest.chars();
        let rows = dimension(chars.next()?)?;
        let scalar = suffix_scalar(chars.as_str(), true)?;
        return Some(Shape {
            columns: None,
            rows,
            scalar,
        });
    }
    let rest = name.strip_prefix("mat")?;
    let mut chars = rest.chars();
    let columns = dimension(chars.next()?)?;
    if chars.next()? != 'x' {
        return None;
    }
    let rows = dimension(chars.next()?)?;
    let scalar = suffix_scalar(chars.as_str(), false)?;
    Some(Shape {
        columns: Some(columns),
        rows,
        scalar,
    })
}

pub(super) fn is_predeclared_type(name: &str) -> bool {
    Scalar::from_name(name).is_some()
        || parse_shape(name).is_some()
        || PREDECLARED_TYPES.contains(&name)
}

fn sampled_dim(name: &str) -> Option<(TextureDim, bool)> {
    Some(match name {
        "texture_1d" => (TextureDim::D1, false),
        "texture_2d" => (TextureDim::D2, false),
        "texture_2d_array" => (TextureDim::D2Array, false),
        "texture_3d" => (TextureDim::D3, false),
        "texture_cube" => (TextureDim::Cube, false),
        "texture_cube_array" => (TextureDim::CubeArray, false),
        "texture_multisampled_2d" => (TextureDim::D2, true),
        _ => return None,
    })
}

fn depth_dim(name: &str) -> Option<(TextureDim, bool)> {
    Some(match name {
        "texture_depth_2d" => (TextureDim::D2, false),
        "texture_depth_2d_array" => (TextureDim::D2Array, false),
        "texture_depth_cube" => (TextureDim::Cube, false),
        "texture_depth_cube_array" => (TextureDim::CubeArray, false),
        "texture_depth_multisampled_2d" => (TextureDim::D2, true),
        _ => return None,
    })
}

fn storage_dim(name: &str) -> Option<TextureDim> {
    Some(match name {
        "texture_storage_1d" => TextureDim::D1,
        "texture_storage_2d" => TextureDim::D2,
        "texture_storage_2d_array" => TextureDim::D2Array,
        "texture_storage_3d" => TextureDim::D3,
        _ => return None,
    })
}

impl Resolver<'_> {
    /// Resolves an expression that must name a type.
    pub(super) fn resolve_type(&mut self, id: ExprId) -> Result<TypeId> {
        let module = self.module;
        let expr = module.expr(id);
        match &expr.kind {
            ExprKind::Ident(t) => self.type_ident(t, expr.span),
            _ => Err(ResolveError::validation(expr.span, "expected a type")),
        }
    }

    fn type_ident(&mut self, t: &TemplatedIdent, span: Span) -> Result<TypeId> {
        let name = t.ident.node.as_str();
        if let Some(declared) = self.symbols.lookup(name) {
            let decl = match declared.symbol {
                Symbol::Global(decl) => decl,
                Symbol::Poisoned => {
                    return Err(ResolveError::Poisoned {
                        name: name.to_string(),
                        span,
                    });
                }
                _ => {
                    return Err(ResolveError::validation(span, format!("'{name}' is not a type")));
                }
            };
            return match self.info.globals.get(&decl) {
                Some(GlobalInfo::Type(ty)) => {
                    self.no_template(t, span)?;
                    Ok(*ty)
                }
                None if self.poisoned.contains(&decl) => Err(ResolveError::Poisoned {
                    name: name.to_string(),
                    span,
                }),
                _ => Err(ResolveError::validation(span, format!("'{name}' is not a type"))),
            };
        }
        match self.predeclared_type(t, span)? {
            Some(ty) => Ok(ty),
            None => Err(self.unresolved(name, span)),
        }
    }

    pub(super) fn no_template(&self, t: &TemplatedIdent, span: Span) -> Result<()> {
        if t.template_args.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::validation(
                span,
                format!("type '{}' does not take template arguments", t.ident.node),
            ))
        }
    }

    fn template_count(&self, t: &TemplatedIdent, span: Span, min: usize, max: usize) -> Result<()> {
        let n = t.template_args.len();
        if (min..=max).contains(&n) {
            return Ok(());
        }
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        Err(ResolveError::validation(
            span,
            format!(
                "'{}' expects {expected} template argument{}, found {n}",
                t.ident.node,
                if max == 1 { "" } else { "s" }
            ),
        ))
    }

    fn scalar_type(&mut self, scalar: Scalar, span: Span) -> Result<TypeId> {
        if scalar == Scalar::F16 {
            self.require(Feature::F16, "the 'f16' type", span)?;
        }
        Ok(self.info.types.scalar(scalar))
    }

    /// The scalar named by the single template argument of `t`.
    fn template_scalar(&mut self, t: &TemplatedIdent, span: Span) -> Result<Scalar> {
        self.template_count(t, span, 1, 1)?;
        let arg = t.template_args[0];
        let ty = self.resolve_type(arg)?;
        match self.info.types.as_scalar(ty) {
            Some(s) => Ok(s),
            None => Err(ResolveError::validation(
                self.module.expr(arg).span,
                format!("expected a scalar type, found '{}'", self.display(ty)),
            )),
        }
    }

    /// A name used as a template argument enumerant, e.g. `storage` or
    /// `rgba8unorm`.
    pub(super) fn enumerant(&self, id: ExprId) -> Result<(String, Span)> {
        let expr = self.module.expr(id);
        match &expr.kind {
            ExprKind::Ident(t) if t.template_args.is_empty() => Ok((t.ident.node.clone(), expr.span)),
            _ => Err(ResolveError::validation(expr.span, "expected a name")),
        }
    }

    pub(super) fn address_space_arg(&self, id: ExprId) -> Result<AddressSpace> {
        let (name, span) = self.enumerant(id)?;
        AddressSpace::from_name(&name).ok_or_else(|| {
            ResolveError::address_space(span, format!("unknown address space '{name}'"))
        })
    }

    pub(super) fn access_arg(&self, id: ExprId) -> Result<Access> {
        let (name, span) = self.enumerant(id)?;
        Access::from_name(&name)
            .ok_or_else(|| ResolveError::validation(span, format!("unknown access mode '{name}'")))
    }

    /// `var<space, access>` template list.
    pub(super) fn var_template(
        &self,
        args: &[ExprId],
    ) -> Result<(Option<AddressSpace>, Option<Access>)> {
        match args {
            [] => Ok((None, None)),
            [space] => Ok((Some(self.address_space_arg(*space)?), None)),
            [space, access] => Ok((
                Some(self.address_space_arg(*space)?),
                Some(self.access_arg(*access)?),
            )),
            [.., extra] => Err(ResolveError::validation(
                self.module.expr(*extra).span,
                "'var' takes at most an address space and an access mode",
            )),
        }
    }

    /// Predeclared types and type generators. `None` when the name is not a
    /// predeclared type.
    pub(super) fn predeclared_type(
        &mut self,
        t: &TemplatedIdent,
        span: Span,
    ) -> Result<Option<TypeId>> {
        let name = t.ident.node.as_str();
        if let Some(scalar) = Scalar::from_name(name) {
            self.no_template(t, span)?;
            return self.scalar_type(scalar, span).map(Some);
        }
        if let Some(shape) = parse_shape(name) {
            let scalar = match shape.scalar {
                Some(s) => {
                    self.no_template(t, span)?;
                    if s == Scalar::F16 {
                        self.require(Feature::F16, format!("'{name}'"), span)?;
                    }
                    s
                }
                None => self.template_scalar(t, span)?,
            };
            return self.shaped(shape, scalar, span).map(Some);
        }
        let ty = match name {
            "array" => self.array_type(t, span)?,
            "atomic" => {
                let scalar = self.template_scalar(t, span)?;
                if !matches!(scalar, Scalar::I32 | Scalar::U32) {
                    return Err(ResolveError::validation(
                        span,
                        "atomic element type must be 'i32' or 'u32'",
                    ));
                }
                self.info.types.insert(Type::Atomic(scalar))
            }
            "ptr" => self.pointer_type(t, span)?,
            "sampler" | "sampler_comparison" => {
                self.no_template(t, span)?;
                self.info.types.insert(Type::Sampler {
                    comparison: name == "sampler_comparison",
                })
            }
            _ => match self.texture_type(t, span)? {
                Some(ty) => ty,
                None => return Ok(None),
            },
        };
        Ok(Some(ty))
    }

    /// A vector or matrix type of the given shape.
    pub(super) fn shaped(&mut self, shape: Shape, scalar: Scalar, span: Span) -> Result<TypeId> {
        if scalar == Scalar::F16 {
            self.require(Feature::F16, "the 'f16' type", span)?;
        }
        match shape.columns {
            None => Ok(self.info.types.vector(shape.rows, scalar)),
            Some(columns) => {
                if !scalar.is_float() {
                    return Err(ResolveError::validation(
                        span,
                        format!("matrix element type must be a floating-point scalar, found '{scalar}'"),
                    ));
                }
                Ok(self.info.types.matrix(columns, shape.rows, scalar))
            }
        }
    }

    fn array_type(&mut self, t: &TemplatedIdent, span: Span) -> Result<TypeId> {
        self.template_count(t, span, 1, 2)?;
        let base = self.resolve_type(t.template_args[0])?;
        let types = &self.info.types;
        let element_ok = (types.is_constructible(base) || self.contains_atomic(base))
            && !types.has_runtime_array(base);
        if !element_ok {
            return Err(ResolveError::validation(
                span,
                format!("type '{}' cannot be used as an array element", self.display(base)),
            ));
        }
        let size = match t.template_args.get(1) {
            None => ArraySize::Runtime,
            Some(count) => ArraySize::Constant(self.array_count(*count)?),
        };
        Ok(self.info.types.array(base, size))
    }

    fn array_count(&mut self, id: ExprId) -> Result<u32> {
        let span = self.module.expr(id).span;
        let ty = self.expr(id)?;
        let ty = self.value_type(ty);
        if !self.info.types.as_scalar(ty).is_some_and(Scalar::is_integer) {
            return Err(ResolveError::TypeMismatch {
                expected: "i32 or u32".to_string(),
                found: self.display(ty),
                span,
            });
        }
        match self.stage(id) {
            EvalStage::Const => {}
            EvalStage::Override => {
                return Err(ResolveError::validation(
                    span,
                    "override-sized arrays are not supported",
                ));
            }
            EvalStage::Runtime => {
                return Err(ResolveError::validation(
                    span,
                    "array element count must be a const-expression",
                ));
            }
        }
        self.concretize(id)?;
        let count = self.info.value_of(id).and_then(|v| v.as_i64()).unwrap_or(0);
        match u32::try_from(count) {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ResolveError::validation(
                span,
                "array element count must be greater than 0",
            )),
        }
    }

    fn pointer_type(&mut self, t: &TemplatedIdent, span: Span) -> Result<TypeId> {
        self.template_count(t, span, 2, 3)?;
        let space = self.address_space_arg(t.template_args[0])?;
        let store = self.resolve_type(t.template_args[1])?;
        let access = match t.template_args.get(2) {
            Some(a) => {
                if space != AddressSpace::Storage {
                    return Err(ResolveError::address_space(
                        span,
                        "only pointers in the 'storage' address space may specify an access mode",
                    ));
                }
                self.access_arg(*a)?
            }
            None => space.default_access(),
        };
        if self.info.types.is_handle(store) {
            return Err(ResolveError::address_space(
                span,
                format!("pointers to '{}' are not allowed", self.display(store)),
            ));
        }
        Ok(self.info.types.pointer(space, store, access))
    }

    fn texture_type(&mut self, t: &TemplatedIdent, span: Span) -> Result<Option<TypeId>> {
        let name = t.ident.node.as_str();
        let ty = if let Some((dim, multisampled)) = sampled_dim(name) {
            let scalar = self.template_scalar(t, span)?;
            if !matches!(scalar, Scalar::F32 | Scalar::I32 | Scalar::U32) {
                return Err(ResolveError::validation(
                    span,
                    format!("texture sample type must be 'f32', 'i32' or 'u32', found '{scalar}'"),
                ));
            }
            Type::Texture {
                dim,
                class: TextureClass::Sampled {
                    scalar,
                    multisampled,
                },
            }
        } else if let Some((dim, multisampled)) = depth_dim(name) {
            self.no_template(t, span)?;
            Type::Texture {
                dim,
                class: TextureClass::Depth { multisampled },
            }
        } else if let Some(dim) = storage_dim(name) {
            self.template_count(t, span, 2, 2)?;
            let (format_name, format_span) = self.enumerant(t.template_args[0])?;
            let format = TexelFormat::from_name(&format_name).ok_or_else(|| {
                ResolveError::validation(format_span, format!("unknown texel format '{format_name}'"))
            })?;
            let access = self.access_arg(t.template_args[1])?;
            if access != Access::Write {
                self.require(
                    Feature::ReadonlyAndReadwriteStorageTextures,
                    format!("storage texture access mode '{}'", access.name()),
                    span,
                )?;
            }
            Type::Texture {
                dim,
                class: TextureClass::Storage { format, access },
            }
        } else {
            return Ok(None);
        };
        Ok(Some(self.info.types.insert(ty)))
    }
}
