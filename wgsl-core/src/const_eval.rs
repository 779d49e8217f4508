#![forbid(unsafe_code)]

//! Shader-creation-time evaluation of const-expressions.
//!
//! Everything here runs in [`EvalMode::Checked`]: integer overflow, division
//! by zero, oversized shifts and non-finite float results are errors.

use wgsl_ir::{BinOp, ConstError, ConstValue, EvalMode, Scalar, ScalarValue, Type, TypeArena, TypeId, UnaryOp};

pub type ConstResult = Result<ConstValue, ConstError>;

fn shape_error(what: &str) -> ConstError {
    ConstError(format!("cannot evaluate {what}: value does not match its type"))
}

/// Element types of a composite type, one per element of `len` elements.
fn element_types(types: &mut TypeArena, ty: TypeId, len: usize) -> Result<Vec<TypeId>, ConstError> {
    match types.get(ty).clone() {
        Type::Struct(st) => Ok(st.members.iter().map(|m| m.ty).collect()),
        _ => {
            let element = types.element(ty).ok_or_else(|| shape_error("composite"))?;
            Ok(vec![element; len])
        }
    }
}

fn map_leaves(
    types: &mut TypeArena,
    value: &ConstValue,
    to: TypeId,
    f: &impl Fn(ScalarValue, Scalar) -> Result<ScalarValue, ConstError>,
) -> ConstResult {
    match value {
        ConstValue::Scalar(s) => {
            let target = types.as_scalar(to).ok_or_else(|| {
                ConstError(format!("cannot convert '{}' to '{}'", s.scalar(), types.display(to)))
            })?;
            f(*s, target).map(ConstValue::Scalar)
        }
        ConstValue::Composite { elements, .. } => {
            let element_tys = element_types(types, to, elements.len())?;
            if element_tys.len() != elements.len() {
                return Err(shape_error("conversion"));
            }
            let mut out = Vec::with_capacity(elements.len());
            for (element, ty) in elements.iter().zip(element_tys) {
                out.push(map_leaves(types, element, ty, f)?);
            }
            Ok(ConstValue::Composite { ty: to, elements: out })
        }
    }
}

/// Implicit conversion of an abstract value to the concrete type `to`.
pub fn materialize(types: &mut TypeArena, value: &ConstValue, to: TypeId) -> ConstResult {
    map_leaves(types, value, to, &|s, t| s.materialize(t))
}

/// Value conversion `to(value)`, component-wise.
pub fn convert(types: &mut TypeArena, value: &ConstValue, to: TypeId) -> ConstResult {
    map_leaves(types, value, to, &|s, t| s.convert(t))
}

pub fn unary(op: UnaryOp, value: &ConstValue) -> ConstResult {
    match value {
        ConstValue::Scalar(s) => s.unary(op, EvalMode::Checked).map(ConstValue::Scalar),
        ConstValue::Composite { ty, elements } => {
            let elements = elements
                .iter()
                .map(|e| unary(op, e))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConstValue::Composite { ty: *ty, elements })
        }
    }
}

/// `lhs op rhs` producing a value of type `result`. Operand types decide
/// between linear-algebra products and component-wise evaluation; a scalar
/// paired with a composite is applied to every component.
pub fn binary(
    types: &mut TypeArena,
    op: BinOp,
    lhs: (&ConstValue, TypeId),
    rhs: (&ConstValue, TypeId),
    result: TypeId,
) -> ConstResult {
    if op == BinOp::Mul {
        let lhs_mat = matches!(types.get(lhs.1), Type::Matrix { .. });
        let rhs_mat = matches!(types.get(rhs.1), Type::Matrix { .. });
        let lhs_vec = matches!(types.get(lhs.1), Type::Vector { .. });
        let rhs_vec = matches!(types.get(rhs.1), Type::Vector { .. });
        if lhs_mat && rhs_vec {
            return mat_times_vec(lhs.0, rhs.0, result);
        }
        if lhs_vec && rhs_mat {
            return vec_times_mat(lhs.0, rhs.0, result);
        }
        if lhs_mat && rhs_mat {
            let column_ty = types.element(result).ok_or_else(|| shape_error("matrix product"))?;
            let columns = rhs
                .0
                .elements()
                .iter()
                .map(|column| mat_times_vec(lhs.0, column, column_ty))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(ConstValue::Composite { ty: result, elements: columns });
        }
    }
    componentwise(types, op, lhs.0, rhs.0, result)
}

fn componentwise(
    types: &mut TypeArena,
    op: BinOp,
    lhs: &ConstValue,
    rhs: &ConstValue,
    result: TypeId,
) -> ConstResult {
    match (lhs, rhs) {
        (ConstValue::Scalar(a), ConstValue::Scalar(b)) => {
            a.binary(op, *b, EvalMode::Checked).map(ConstValue::Scalar)
        }
        (ConstValue::Composite { elements: a, .. }, ConstValue::Composite { elements: b, .. }) => {
            if a.len() != b.len() {
                return Err(shape_error("binary expression"));
            }
            let element_ty = types.element(result).unwrap_or(result);
            let elements = a
                .iter()
                .zip(b)
                .map(|(x, y)| componentwise(types, op, x, y, element_ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConstValue::Composite { ty: result, elements })
        }
        (ConstValue::Scalar(_), ConstValue::Composite { elements, .. }) => {
            let element_ty = types.element(result).unwrap_or(result);
            let elements = elements
                .iter()
                .map(|y| componentwise(types, op, lhs, y, element_ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConstValue::Composite { ty: result, elements })
        }
        (ConstValue::Composite { elements, .. }, ConstValue::Scalar(_)) => {
            let element_ty = types.element(result).unwrap_or(result);
            let elements = elements
                .iter()
                .map(|x| componentwise(types, op, x, rhs, element_ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConstValue::Composite { ty: result, elements })
        }
    }
}

fn scalars(value: &ConstValue) -> Result<Vec<ScalarValue>, ConstError> {
    value
        .elements()
        .iter()
        .map(|e| e.as_scalar().ok_or_else(|| shape_error("vector")))
        .collect()
}

fn dot_scalars(a: &[ScalarValue], b: &[ScalarValue]) -> Result<ScalarValue, ConstError> {
    let mut terms = a.iter().zip(b).map(|(x, y)| x.binary(BinOp::Mul, *y, EvalMode::Checked));
    let mut sum = terms.next().ok_or_else(|| shape_error("dot product"))??;
    for term in terms {
        sum = sum.binary(BinOp::Add, term?, EvalMode::Checked)?;
    }
    Ok(sum)
}

fn mat_times_vec(matrix: &ConstValue, vector: &ConstValue, result: TypeId) -> ConstResult {
    let v = scalars(vector)?;
    let columns = matrix
        .elements()
        .iter()
        .map(scalars)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let row = columns
            .iter()
            .map(|c| c.get(r).copied().ok_or_else(|| shape_error("matrix")))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(ConstValue::Scalar(dot_scalars(&row, &v)?));
    }
    Ok(ConstValue::Composite { ty: result, elements: out })
}

fn vec_times_mat(vector: &ConstValue, matrix: &ConstValue, result: TypeId) -> ConstResult {
    let v = scalars(vector)?;
    let mut out = Vec::new();
    for column in matrix.elements() {
        out.push(ConstValue::Scalar(dot_scalars(&v, &scalars(column)?)?));
    }
    Ok(ConstValue::Composite { ty: result, elements: out })
}

/// Value constructor `ty(args)`. Arguments already have the element type
/// the constructor expects, except for conversions.
pub fn construct(types: &mut TypeArena, ty: TypeId, args: &[ConstValue]) -> ConstResult {
    if args.is_empty() {
        return ConstValue::zero(types, ty)
            .ok_or_else(|| ConstError(format!("'{}' has no zero value", types.display(ty))));
    }
    match types.get(ty).clone() {
        Type::Scalar(_) => convert(types, &args[0], ty),
        Type::Vector { size, scalar } => {
            if let [ConstValue::Scalar(s)] = args {
                let component = ConstValue::Scalar(s.convert(scalar)?);
                return Ok(ConstValue::Composite {
                    ty,
                    elements: vec![component; usize::from(size)],
                });
            }
            if let [single @ ConstValue::Composite { elements, .. }] = args {
                if elements.len() == usize::from(size) {
                    return convert(types, single, ty);
                }
            }
            let mut components = Vec::with_capacity(usize::from(size));
            for arg in args {
                match arg {
                    ConstValue::Scalar(s) => components.push(ConstValue::Scalar(s.convert(scalar)?)),
                    ConstValue::Composite { elements, .. } => {
                        for e in elements {
                            let s = e.as_scalar().ok_or_else(|| shape_error("vector constructor"))?;
                            components.push(ConstValue::Scalar(s.convert(scalar)?));
                        }
                    }
                }
            }
            if components.len() != usize::from(size) {
                return Err(ConstError(format!(
                    "'{}' constructor expects {size} components, found {}",
                    types.display(ty),
                    components.len()
                )));
            }
            Ok(ConstValue::Composite { ty, elements: components })
        }
        Type::Matrix { columns, rows, scalar } => {
            let column_ty = types.vector(rows, scalar);
            if let [single] = args {
                return convert(types, single, ty);
            }
            let flat: Vec<ScalarValue> = if args.iter().all(|a| a.as_scalar().is_some()) {
                args.iter().filter_map(ConstValue::as_scalar).collect()
            } else {
                let mut flat = Vec::new();
                for column in args {
                    flat.extend(scalars(column)?);
                }
                flat
            };
            let rows_n = usize::from(rows);
            if flat.len() != usize::from(columns) * rows_n {
                return Err(shape_error("matrix constructor"));
            }
            let mut elements = Vec::with_capacity(usize::from(columns));
            for chunk in flat.chunks(rows_n) {
                let components = chunk
                    .iter()
                    .map(|s| s.convert(scalar).map(ConstValue::Scalar))
                    .collect::<Result<Vec<_>, _>>()?;
                elements.push(ConstValue::Composite { ty: column_ty, elements: components });
            }
            Ok(ConstValue::Composite { ty, elements })
        }
        Type::Array { .. } | Type::Struct(_) => Ok(ConstValue::Composite {
            ty,
            elements: args.to_vec(),
        }),
        _ => Err(ConstError(format!("'{}' is not constructible", types.display(ty)))),
    }
}

pub fn index(value: &ConstValue, i: i64) -> ConstResult {
    let elements = value.elements();
    usize::try_from(i)
        .ok()
        .and_then(|i| elements.get(i))
        .cloned()
        .ok_or_else(|| {
            ConstError(format!(
                "index {i} is out of bounds [0..{}]",
                elements.len().saturating_sub(1)
            ))
        })
}

pub fn swizzle(value: &ConstValue, components: &[u8], result: TypeId) -> ConstResult {
    if let [single] = components {
        return index(value, i64::from(*single));
    }
    let elements = components
        .iter()
        .map(|c| index(value, i64::from(*c)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ConstValue::Composite { ty: result, elements })
}

// ---------------------------------------------------------------------------
// Builtin functions
// ---------------------------------------------------------------------------

/// Const evaluation of one builtin overload: return type and arguments.
pub type ConstFn = fn(&mut TypeArena, TypeId, &[ConstValue]) -> ConstResult;

/// Applies `f` to the scalars at matching positions of `args`. Scalar
/// arguments are reused for every component.
fn zip_components(
    args: &[ConstValue],
    ret: TypeId,
    f: &dyn Fn(&[ScalarValue]) -> Result<ScalarValue, ConstError>,
) -> ConstResult {
    let width = args.iter().map(|a| a.elements().len()).max().unwrap_or(0);
    if width == 0 {
        let leaves = args
            .iter()
            .map(|a| a.as_scalar().ok_or_else(|| shape_error("builtin call")))
            .collect::<Result<Vec<_>, _>>()?;
        return f(&leaves).map(ConstValue::Scalar);
    }
    let mut elements = Vec::with_capacity(width);
    for i in 0..width {
        let leaves = args
            .iter()
            .map(|a| match a {
                ConstValue::Scalar(s) => Ok(*s),
                ConstValue::Composite { .. } => a
                    .element(i)
                    .and_then(ConstValue::as_scalar)
                    .ok_or_else(|| shape_error("builtin call")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        elements.push(ConstValue::Scalar(f(&leaves)?));
    }
    Ok(ConstValue::Composite { ty: ret, elements })
}

fn float_of(like: ScalarValue, v: f64) -> Result<ScalarValue, ConstError> {
    ScalarValue::AbstractFloat(v).materialize(like.scalar())
}

fn map_float(s: ScalarValue, f: impl Fn(f64) -> f64) -> Result<ScalarValue, ConstError> {
    let v = s
        .as_f64()
        .ok_or_else(|| ConstError(format!("expected a float, found '{}'", s.scalar())))?;
    float_of(s, f(v))
}

fn compare(a: ScalarValue, b: ScalarValue) -> Result<std::cmp::Ordering, ConstError> {
    if a.scalar().is_integer() {
        return Ok(a.as_i64().cmp(&b.as_i64()));
    }
    a.as_f64()
        .zip(b.as_f64())
        .and_then(|(x, y)| x.partial_cmp(&y))
        .ok_or_else(|| ConstError("cannot order NaN".to_string()))
}

pub fn abs(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| match s[0] {
        ScalarValue::I32(v) => Ok(ScalarValue::I32(v.wrapping_abs())),
        ScalarValue::AbstractInt(v) => v
            .checked_abs()
            .map(ScalarValue::AbstractInt)
            .ok_or_else(|| ConstError(format!("'abs({v})' cannot be represented"))),
        ScalarValue::U32(v) => Ok(ScalarValue::U32(v)),
        other => map_float(other, f64::abs),
    })
}

pub fn min(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| {
        Ok(if compare(s[1], s[0])?.is_lt() { s[1] } else { s[0] })
    })
}

pub fn max(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| {
        Ok(if compare(s[1], s[0])?.is_gt() { s[1] } else { s[0] })
    })
}

pub fn clamp(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| {
        let (e, lo, hi) = (s[0], s[1], s[2]);
        let raised = if compare(lo, e)?.is_gt() { lo } else { e };
        Ok(if compare(hi, raised)?.is_lt() { hi } else { raised })
    })
}

pub fn select(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| {
        let cond = s[2]
            .as_bool()
            .ok_or_else(|| ConstError("select condition must be bool".to_string()))?;
        Ok(if cond { s[1] } else { s[0] })
    })
}

pub fn floor(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| map_float(s[0], f64::floor))
}

pub fn ceil(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| map_float(s[0], f64::ceil))
}

pub fn round(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| map_float(s[0], f64::round_ties_even))
}

pub fn sqrt(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| map_float(s[0], f64::sqrt))
}

fn bools(value: &ConstValue) -> Result<Vec<bool>, ConstError> {
    let found: Option<Vec<bool>> = match value {
        ConstValue::Scalar(s) => s.as_bool().map(|b| vec![b]),
        ConstValue::Composite { elements, .. } => {
            elements.iter().map(ConstValue::as_bool).collect()
        }
    };
    found.ok_or_else(|| ConstError("expected bool components".to_string()))
}

pub fn all(_: &mut TypeArena, _: TypeId, args: &[ConstValue]) -> ConstResult {
    let value = args.first().ok_or_else(|| shape_error("all"))?;
    Ok(ConstValue::Scalar(ScalarValue::Bool(bools(value)?.into_iter().all(|b| b))))
}

pub fn any(_: &mut TypeArena, _: TypeId, args: &[ConstValue]) -> ConstResult {
    let value = args.first().ok_or_else(|| shape_error("any"))?;
    Ok(ConstValue::Scalar(ScalarValue::Bool(bools(value)?.into_iter().any(|b| b))))
}

pub fn dot(_: &mut TypeArena, _: TypeId, args: &[ConstValue]) -> ConstResult {
    let [a, b] = args else {
        return Err(shape_error("dot"));
    };
    dot_scalars(&scalars(a)?, &scalars(b)?).map(ConstValue::Scalar)
}

pub fn count_one_bits(_: &mut TypeArena, ret: TypeId, args: &[ConstValue]) -> ConstResult {
    zip_components(args, ret, &|s| match s[0] {
        ScalarValue::I32(v) => Ok(ScalarValue::I32(v.count_ones() as i32)),
        ScalarValue::U32(v) => Ok(ScalarValue::U32(v.count_ones())),
        other => Err(ConstError(format!(
            "countOneBits expects a concrete integer, found '{}'",
            other.scalar()
        ))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: ScalarValue) -> ConstValue {
        ConstValue::Scalar(v)
    }

    fn vec_of(types: &mut TypeArena, scalar: Scalar, values: Vec<ScalarValue>) -> (ConstValue, TypeId) {
        let ty = types.vector(values.len() as u8, scalar);
        let elements = values.into_iter().map(ConstValue::Scalar).collect();
        (ConstValue::Composite { ty, elements }, ty)
    }

    #[test]
    fn overflow_in_const_context_is_an_error() {
        let mut types = TypeArena::new();
        let i32_ty = types.i32();
        let err = binary(
            &mut types,
            BinOp::Add,
            (&s(ScalarValue::I32(i32::MAX)), i32_ty),
            (&s(ScalarValue::I32(1)), i32_ty),
            i32_ty,
        )
        .unwrap_err();
        assert!(err.0.contains("cannot be represented as 'i32'"), "{err}");
    }

    #[test]
    fn vector_times_scalar_splats() {
        let mut types = TypeArena::new();
        let (v, vty) = vec_of(&mut types, Scalar::AbstractInt, vec![ScalarValue::AbstractInt(1), ScalarValue::AbstractInt(2)]);
        let ai = types.scalar(Scalar::AbstractInt);
        let r = binary(&mut types, BinOp::Mul, (&v, vty), (&s(ScalarValue::AbstractInt(3)), ai), vty).unwrap();
        assert_eq!(r.display(&types), "vec2<abstract-int>(3, 6)");
    }

    #[test]
    fn matrix_times_vector() {
        let mut types = TypeArena::new();
        let m_ty = types.matrix(2, 2, Scalar::F32);
        let col = types.vector(2, Scalar::F32);
        // columns (1, 2) and (3, 4)
        let m = construct(
            &mut types,
            m_ty,
            &[1.0, 2.0, 3.0, 4.0].map(|v| s(ScalarValue::F32(v))),
        )
        .unwrap();
        let (v, _) = vec_of(&mut types, Scalar::F32, vec![ScalarValue::F32(1.0), ScalarValue::F32(1.0)]);
        let r = binary(&mut types, BinOp::Mul, (&m, m_ty), (&v, col), col).unwrap();
        assert_eq!(r.display(&types), "vec2<f32>(4.0f, 6.0f)");
    }

    #[test]
    fn materialize_rejects_out_of_range() {
        let mut types = TypeArena::new();
        let u = types.u32();
        assert!(materialize(&mut types, &s(ScalarValue::AbstractInt(-1)), u).is_err());
        assert_eq!(
            materialize(&mut types, &s(ScalarValue::AbstractInt(7)), u),
            Ok(s(ScalarValue::U32(7)))
        );
    }

    #[test]
    fn splat_and_component_constructors() {
        let mut types = TypeArena::new();
        let v3 = types.vector(3, Scalar::F32);
        let splat = construct(&mut types, v3, &[s(ScalarValue::F32(2.0))]).unwrap();
        assert_eq!(splat.display(&types), "vec3<f32>(2.0f, 2.0f, 2.0f)");
        let (v2, _) = vec_of(&mut types, Scalar::F32, vec![ScalarValue::F32(1.0), ScalarValue::F32(2.0)]);
        let joined = construct(&mut types, v3, &[v2, s(ScalarValue::F32(3.0))]).unwrap();
        assert_eq!(joined.display(&types), "vec3<f32>(1.0f, 2.0f, 3.0f)");
        assert!(construct(&mut types, v3, &[s(ScalarValue::F32(1.0)), s(ScalarValue::F32(1.0))]).is_err());
    }

    #[test]
    fn builtins_evaluate_componentwise() {
        let mut types = TypeArena::new();
        let i = types.i32();
        let r = clamp(&mut types, i, &[s(ScalarValue::I32(9)), s(ScalarValue::I32(0)), s(ScalarValue::I32(5))]).unwrap();
        assert_eq!(r, s(ScalarValue::I32(5)));
        let f = types.f32();
        assert!(sqrt(&mut types, f, &[s(ScalarValue::F32(-1.0))]).is_err());
        assert_eq!(
            round(&mut types, f, &[s(ScalarValue::F32(2.5))]).unwrap(),
            s(ScalarValue::F32(2.0))
        );
        let b = types.bool();
        let (v, _) = vec_of(&mut types, Scalar::Bool, vec![ScalarValue::Bool(true), ScalarValue::Bool(false)]);
        assert_eq!(any(&mut types, b, &[v.clone()]).unwrap(), s(ScalarValue::Bool(true)));
        assert_eq!(all(&mut types, b, &[v]).unwrap(), s(ScalarValue::Bool(false)));
    }

    #[test]
    fn out_of_bounds_index() {
        let mut types = TypeArena::new();
        let (v, _) = vec_of(&mut types, Scalar::U32, vec![ScalarValue::U32(1), ScalarValue::U32(2)]);
        assert_eq!(index(&v, 1).unwrap(), s(ScalarValue::U32(2)));
        assert!(index(&v, 2).unwrap_err().0.contains("out of bounds"));
    }
}
