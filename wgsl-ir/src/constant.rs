#![forbid(unsafe_code)]

//! Compile-time values and the scalar arithmetic shared by constant
//! evaluation and constant folding.

use std::fmt;

use thiserror::Error;

use crate::ir::{BinOp, UnaryOp};
use crate::ty::{Scalar, Type, TypeArena, TypeId};

/// Largest finite `f16`.
pub const F16_MAX: f64 = 65504.0;

#[derive(Clone, Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ConstError(pub String);

impl ConstError {
    fn unrepresentable(value: impl fmt::Display, scalar: Scalar) -> Self {
        ConstError(format!("value {value} cannot be represented as '{scalar}'"))
    }
}

/// How integer overflow and division by zero behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalMode {
    /// Shader-creation time: overflow, division by zero and oversized shifts
    /// are errors.
    Checked,
    /// Runtime semantics: two's complement wrapping, `x / 0 == x`,
    /// `x % 0 == 0`, shift amounts taken modulo the bit width.
    Wrapping,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    /// Stored widened; always representable as `f16`.
    F16(f32),
    AbstractInt(i64),
    AbstractFloat(f64),
}

impl ScalarValue {
    pub fn scalar(self) -> Scalar {
        match self {
            ScalarValue::Bool(_) => Scalar::Bool,
            ScalarValue::I32(_) => Scalar::I32,
            ScalarValue::U32(_) => Scalar::U32,
            ScalarValue::F32(_) => Scalar::F32,
            ScalarValue::F16(_) => Scalar::F16,
            ScalarValue::AbstractInt(_) => Scalar::AbstractInt,
            ScalarValue::AbstractFloat(_) => Scalar::AbstractFloat,
        }
    }

    pub fn zero(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool => ScalarValue::Bool(false),
            Scalar::I32 => ScalarValue::I32(0),
            Scalar::U32 => ScalarValue::U32(0),
            Scalar::F32 => ScalarValue::F32(0.0),
            Scalar::F16 => ScalarValue::F16(0.0),
            Scalar::AbstractInt => ScalarValue::AbstractInt(0),
            Scalar::AbstractFloat => ScalarValue::AbstractFloat(0.0),
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Integer value, for integer scalars.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            ScalarValue::I32(v) => Some(i64::from(v)),
            ScalarValue::U32(v) => Some(i64::from(v)),
            ScalarValue::AbstractInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            ScalarValue::I32(v) => Some(f64::from(v)),
            ScalarValue::U32(v) => Some(f64::from(v)),
            ScalarValue::AbstractInt(v) => Some(v as f64),
            ScalarValue::F32(v) | ScalarValue::F16(v) => Some(f64::from(v)),
            ScalarValue::AbstractFloat(v) => Some(v),
            ScalarValue::Bool(_) => None,
        }
    }

    fn from_int(scalar: Scalar, v: i64) -> Result<Self, ConstError> {
        match scalar {
            Scalar::I32 => i32::try_from(v)
                .map(ScalarValue::I32)
                .map_err(|_| ConstError::unrepresentable(v, scalar)),
            Scalar::U32 => u32::try_from(v)
                .map(ScalarValue::U32)
                .map_err(|_| ConstError::unrepresentable(v, scalar)),
            Scalar::AbstractInt => Ok(ScalarValue::AbstractInt(v)),
            _ => Self::from_float(scalar, v as f64),
        }
    }

    fn from_float(scalar: Scalar, v: f64) -> Result<Self, ConstError> {
        if !v.is_finite() {
            return Err(ConstError::unrepresentable(v, scalar));
        }
        match scalar {
            Scalar::F32 => {
                let narrowed = v as f32;
                if narrowed.is_finite() {
                    Ok(ScalarValue::F32(narrowed))
                } else {
                    Err(ConstError::unrepresentable(v, scalar))
                }
            }
            Scalar::F16 if v.abs() <= F16_MAX => Ok(ScalarValue::F16(v as f32)),
            Scalar::AbstractFloat => Ok(ScalarValue::AbstractFloat(v)),
            _ => Err(ConstError::unrepresentable(v, scalar)),
        }
    }

    /// Implicit conversion of an abstract value to `to`; the value must be
    /// exactly representable in range.
    pub fn materialize(self, to: Scalar) -> Result<Self, ConstError> {
        if self.scalar() == to {
            return Ok(self);
        }
        match self {
            ScalarValue::AbstractInt(v) => Self::from_int(to, v),
            ScalarValue::AbstractFloat(v) if to.is_float() => Self::from_float(to, v),
            _ => Err(ConstError(format!(
                "cannot implicitly convert '{}' to '{to}'",
                self.scalar()
            ))),
        }
    }

    /// Value conversion `to(self)`: float to integer truncates toward zero
    /// and saturates, integer to integer reinterprets the bits.
    pub fn convert(self, to: Scalar) -> Result<Self, ConstError> {
        if self.scalar() == to {
            return Ok(self);
        }
        if self.scalar().is_abstract() && self.materialize(to).is_ok() {
            return self.materialize(to);
        }
        if to == Scalar::Bool {
            return Ok(ScalarValue::Bool(match self {
                ScalarValue::Bool(b) => b,
                other => other.as_f64().is_some_and(|v| v != 0.0),
            }));
        }
        if let ScalarValue::Bool(b) = self {
            return Self::from_int(to, i64::from(b));
        }
        let as_float = self.scalar().is_float();
        Ok(match to {
            Scalar::I32 => match self {
                ScalarValue::U32(v) => ScalarValue::I32(v as i32),
                ScalarValue::AbstractInt(v) => ScalarValue::I32(v as i32),
                other if as_float => ScalarValue::I32(other.as_f64().unwrap_or(0.0) as i32),
                other => ScalarValue::I32(other.as_i64().unwrap_or(0) as i32),
            },
            Scalar::U32 => match self {
                ScalarValue::I32(v) => ScalarValue::U32(v as u32),
                ScalarValue::AbstractInt(v) => ScalarValue::U32(v as u32),
                other if as_float => ScalarValue::U32(other.as_f64().unwrap_or(0.0) as u32),
                other => ScalarValue::U32(other.as_i64().unwrap_or(0) as u32),
            },
            Scalar::AbstractInt => {
                ScalarValue::AbstractInt(self.as_f64().unwrap_or(0.0) as i64)
            }
            float => Self::from_float(float, self.as_f64().unwrap_or(0.0))?,
        })
    }

    pub fn unary(self, op: UnaryOp, mode: EvalMode) -> Result<Self, ConstError> {
        let overflow = || ConstError(format!("'{}{self}' cannot be represented", op.symbol()));
        Ok(match (op, self) {
            (UnaryOp::Not, ScalarValue::Bool(b)) => ScalarValue::Bool(!b),
            (UnaryOp::Complement, ScalarValue::I32(v)) => ScalarValue::I32(!v),
            (UnaryOp::Complement, ScalarValue::U32(v)) => ScalarValue::U32(!v),
            (UnaryOp::Complement, ScalarValue::AbstractInt(v)) => ScalarValue::AbstractInt(!v),
            (UnaryOp::Negate, ScalarValue::I32(v)) => match mode {
                EvalMode::Checked => ScalarValue::I32(v.checked_neg().ok_or_else(overflow)?),
                EvalMode::Wrapping => ScalarValue::I32(v.wrapping_neg()),
            },
            (UnaryOp::Negate, ScalarValue::AbstractInt(v)) => {
                ScalarValue::AbstractInt(v.checked_neg().ok_or_else(overflow)?)
            }
            (UnaryOp::Negate, ScalarValue::F32(v)) => ScalarValue::F32(-v),
            (UnaryOp::Negate, ScalarValue::F16(v)) => ScalarValue::F16(-v),
            (UnaryOp::Negate, ScalarValue::AbstractFloat(v)) => ScalarValue::AbstractFloat(-v),
            _ => {
                return Err(ConstError(format!(
                    "no operator '{}' for '{}'",
                    op.symbol(),
                    self.scalar()
                )));
            }
        })
    }

    /// Applies `op` to two scalars of the same type. Shifts take a `u32`
    /// (or abstract) right-hand side.
    pub fn binary(self, op: BinOp, rhs: Self, mode: EvalMode) -> Result<Self, ConstError> {
        if op.is_comparison() {
            return self.compare(op, rhs);
        }
        match (self, rhs) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => match op {
                BinOp::And => Ok(ScalarValue::Bool(a & b)),
                BinOp::Or => Ok(ScalarValue::Bool(a | b)),
                _ => Err(self.no_operator(op)),
            },
            (ScalarValue::I32(a), _) if matches!(op, BinOp::Shl | BinOp::Shr) => {
                let amount = shift_amount(rhs, 32, mode)?;
                Ok(ScalarValue::I32(match op {
                    BinOp::Shl => {
                        let r = a.wrapping_shl(amount);
                        if mode == EvalMode::Checked && (r >> amount) != a {
                            return Err(ConstError(format!("'{a} << {amount}' overflows 'i32'")));
                        }
                        r
                    }
                    _ => a >> amount,
                }))
            }
            (ScalarValue::U32(a), _) if matches!(op, BinOp::Shl | BinOp::Shr) => {
                let amount = shift_amount(rhs, 32, mode)?;
                Ok(ScalarValue::U32(match op {
                    BinOp::Shl => {
                        let r = a.wrapping_shl(amount);
                        if mode == EvalMode::Checked && (r >> amount) != a {
                            return Err(ConstError(format!("'{a} << {amount}' overflows 'u32'")));
                        }
                        r
                    }
                    _ => a >> amount,
                }))
            }
            (ScalarValue::AbstractInt(a), _) if matches!(op, BinOp::Shl | BinOp::Shr) => {
                let amount = shift_amount(rhs, 64, EvalMode::Checked)?;
                Ok(ScalarValue::AbstractInt(match op {
                    BinOp::Shl => {
                        let r = a.wrapping_shl(amount);
                        if (r >> amount) != a {
                            return Err(ConstError(format!("'{a} << {amount}' overflows")));
                        }
                        r
                    }
                    _ => a >> amount,
                }))
            }
            (ScalarValue::I32(a), ScalarValue::I32(b)) => int_op(op, a, b, mode, "i32").map(ScalarValue::I32),
            (ScalarValue::U32(a), ScalarValue::U32(b)) => int_op(op, a, b, mode, "u32").map(ScalarValue::U32),
            (ScalarValue::AbstractInt(a), ScalarValue::AbstractInt(b)) => {
                int_op(op, a, b, EvalMode::Checked, "abstract-int").map(ScalarValue::AbstractInt)
            }
            (ScalarValue::F32(a), ScalarValue::F32(b)) => {
                let r = float_op(op, f64::from(a), f64::from(b)).ok_or_else(|| self.no_operator(op))?;
                Self::from_float(Scalar::F32, r)
            }
            (ScalarValue::F16(a), ScalarValue::F16(b)) => {
                let r = float_op(op, f64::from(a), f64::from(b)).ok_or_else(|| self.no_operator(op))?;
                Self::from_float(Scalar::F16, r)
            }
            (ScalarValue::AbstractFloat(a), ScalarValue::AbstractFloat(b)) => {
                let r = float_op(op, a, b).ok_or_else(|| self.no_operator(op))?;
                Self::from_float(Scalar::AbstractFloat, r)
            }
            _ => Err(ConstError(format!(
                "no operator '{}' for '{}' and '{}'",
                op.symbol(),
                self.scalar(),
                rhs.scalar()
            ))),
        }
    }

    fn no_operator(self, op: BinOp) -> ConstError {
        ConstError(format!("no operator '{}' for '{}'", op.symbol(), self.scalar()))
    }

    fn compare(self, op: BinOp, rhs: Self) -> Result<Self, ConstError> {
        use std::cmp::Ordering;
        let ord = match (self, rhs) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => {
                if !matches!(op, BinOp::Eq | BinOp::Ne) {
                    return Err(self.no_operator(op));
                }
                Some(a.cmp(&b))
            }
            (a, b) if a.scalar() == b.scalar() && a.scalar().is_integer() => {
                Some(a.as_i64().cmp(&b.as_i64()))
            }
            (a, b) if a.scalar() == b.scalar() => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y)),
            _ => {
                return Err(ConstError(format!(
                    "cannot compare '{}' with '{}'",
                    self.scalar(),
                    rhs.scalar()
                )));
            }
        };
        let result = match ord {
            // NaN compares unequal to everything.
            None => op == BinOp::Ne,
            Some(o) => match op {
                BinOp::Eq => o == Ordering::Equal,
                BinOp::Ne => o != Ordering::Equal,
                BinOp::Lt => o == Ordering::Less,
                BinOp::Le => o != Ordering::Greater,
                BinOp::Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            },
        };
        Ok(ScalarValue::Bool(result))
    }
}

fn shift_amount(rhs: ScalarValue, bits: u32, mode: EvalMode) -> Result<u32, ConstError> {
    let raw = rhs
        .as_i64()
        .ok_or_else(|| ConstError(format!("shift amount must be an integer, found '{}'", rhs.scalar())))?;
    match mode {
        EvalMode::Wrapping => Ok((raw as u32) % bits),
        EvalMode::Checked if (0..i64::from(bits)).contains(&raw) => Ok(raw as u32),
        EvalMode::Checked => Err(ConstError(format!(
            "shift amount {raw} must be less than the bit width ({bits})"
        ))),
    }
}

trait IntOps: Copy + fmt::Display + PartialEq {
    const ZERO: Self;
    fn checked(op: BinOp, a: Self, b: Self) -> Option<Self>;
    fn wrapping(op: BinOp, a: Self, b: Self) -> Self;
    fn bitwise(op: BinOp, a: Self, b: Self) -> Option<Self>;
}

macro_rules! int_ops {
    ($t:ty) => {
        impl IntOps for $t {
            const ZERO: Self = 0;

            fn checked(op: BinOp, a: Self, b: Self) -> Option<Self> {
                match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    BinOp::Mul => a.checked_mul(b),
                    BinOp::Div => a.checked_div(b),
                    BinOp::Mod => a.checked_rem(b),
                    _ => None,
                }
            }

            fn wrapping(op: BinOp, a: Self, b: Self) -> Self {
                match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div if b == 0 => a,
                    BinOp::Mod if b == 0 => 0,
                    BinOp::Div => a.checked_div(b).unwrap_or(a),
                    BinOp::Mod => a.checked_rem(b).unwrap_or(0),
                    _ => a,
                }
            }

            fn bitwise(op: BinOp, a: Self, b: Self) -> Option<Self> {
                match op {
                    BinOp::And => Some(a & b),
                    BinOp::Or => Some(a | b),
                    BinOp::Xor => Some(a ^ b),
                    _ => None,
                }
            }
        }
    };
}

int_ops!(i32);
int_ops!(u32);
int_ops!(i64);

fn int_op<T: IntOps>(op: BinOp, a: T, b: T, mode: EvalMode, ty: &str) -> Result<T, ConstError> {
    if let Some(r) = T::bitwise(op, a, b) {
        return Ok(r);
    }
    if !matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod) {
        return Err(ConstError(format!("no operator '{}' for '{ty}'", op.symbol())));
    }
    match mode {
        EvalMode::Wrapping => Ok(T::wrapping(op, a, b)),
        EvalMode::Checked => {
            if matches!(op, BinOp::Div | BinOp::Mod) && b == T::ZERO {
                return Err(ConstError(format!(
                    "integer division by zero is invalid ('{a} {} {b}')",
                    op.symbol()
                )));
            }
            T::checked(op, a, b).ok_or_else(|| {
                ConstError(format!("'{a} {} {b}' cannot be represented as '{ty}'", op.symbol()))
            })
        }
    }
}

fn float_op(op: BinOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a - b * (a / b).trunc(),
        _ => return None,
    })
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::I32(v) => write!(f, "{v}i"),
            ScalarValue::U32(v) => write!(f, "{v}u"),
            ScalarValue::F32(v) => write!(f, "{v:?}f"),
            ScalarValue::F16(v) => write!(f, "{v:?}h"),
            ScalarValue::AbstractInt(v) => write!(f, "{v}"),
            ScalarValue::AbstractFloat(v) => write!(f, "{v:?}"),
        }
    }
}

/// A value known at shader-creation time.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Scalar(ScalarValue),
    /// Vector components, matrix columns, array elements or struct members.
    Composite { ty: TypeId, elements: Vec<ConstValue> },
}

impl ConstValue {
    pub fn as_scalar(&self) -> Option<ScalarValue> {
        match self {
            ConstValue::Scalar(s) => Some(*s),
            ConstValue::Composite { .. } => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(ScalarValue::as_bool)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(ScalarValue::as_i64)
    }

    pub fn elements(&self) -> &[ConstValue] {
        match self {
            ConstValue::Scalar(_) => &[],
            ConstValue::Composite { elements, .. } => elements,
        }
    }

    pub fn element(&self, index: usize) -> Option<&ConstValue> {
        self.elements().get(index)
    }

    /// The zero value of a constructible type.
    pub fn zero(types: &mut TypeArena, ty: TypeId) -> Option<ConstValue> {
        Some(match types.get(ty).clone() {
            Type::Scalar(s) => ConstValue::Scalar(ScalarValue::zero(s)),
            Type::Vector { size, scalar } => ConstValue::Composite {
                ty,
                elements: vec![ConstValue::Scalar(ScalarValue::zero(scalar)); usize::from(size)],
            },
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column_ty = types.vector(rows, scalar);
                let column = ConstValue::zero(types, column_ty)?;
                ConstValue::Composite {
                    ty,
                    elements: vec![column; usize::from(columns)],
                }
            }
            Type::Array {
                base,
                size: crate::ty::ArraySize::Constant(n),
                ..
            } => {
                let element = ConstValue::zero(types, base)?;
                ConstValue::Composite {
                    ty,
                    elements: vec![element; n as usize],
                }
            }
            Type::Struct(s) => {
                let mut elements = Vec::with_capacity(s.members.len());
                for m in &s.members {
                    elements.push(ConstValue::zero(types, m.ty)?);
                }
                ConstValue::Composite { ty, elements }
            }
            _ => return None,
        })
    }

    /// Renders the value in WGSL syntax.
    pub fn display(&self, types: &TypeArena) -> String {
        match self {
            ConstValue::Scalar(s) => s.to_string(),
            ConstValue::Composite { ty, elements } => {
                let parts: Vec<String> = elements.iter().map(|e| e.display(types)).collect();
                format!("{}({})", types.display(*ty), parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_i32_overflow_is_an_error() {
        let max = ScalarValue::I32(i32::MAX);
        let err = max
            .binary(BinOp::Add, ScalarValue::I32(1), EvalMode::Checked)
            .unwrap_err();
        assert!(err.0.contains("cannot be represented as 'i32'"), "{err}");
        assert_eq!(
            max.binary(BinOp::Add, ScalarValue::I32(1), EvalMode::Wrapping),
            Ok(ScalarValue::I32(i32::MIN))
        );
    }

    #[test]
    fn runtime_division_by_zero_semantics() {
        let seven = ScalarValue::U32(7);
        let zero = ScalarValue::U32(0);
        assert_eq!(seven.binary(BinOp::Div, zero, EvalMode::Wrapping), Ok(seven));
        assert_eq!(seven.binary(BinOp::Mod, zero, EvalMode::Wrapping), Ok(zero));
        assert!(seven.binary(BinOp::Div, zero, EvalMode::Checked).is_err());
    }

    #[test]
    fn shifts() {
        let one = ScalarValue::U32(1);
        assert_eq!(
            one.binary(BinOp::Shl, ScalarValue::U32(33), EvalMode::Wrapping),
            Ok(ScalarValue::U32(2))
        );
        assert!(one.binary(BinOp::Shl, ScalarValue::U32(32), EvalMode::Checked).is_err());
        assert_eq!(
            ScalarValue::I32(-8).binary(BinOp::Shr, ScalarValue::U32(1), EvalMode::Checked),
            Ok(ScalarValue::I32(-4))
        );
    }

    #[test]
    fn materialize_checks_range() {
        assert_eq!(
            ScalarValue::AbstractInt(5).materialize(Scalar::U32),
            Ok(ScalarValue::U32(5))
        );
        assert!(ScalarValue::AbstractInt(-1).materialize(Scalar::U32).is_err());
        assert!(ScalarValue::AbstractFloat(1e300).materialize(Scalar::F32).is_err());
        assert!(ScalarValue::AbstractFloat(70000.0).materialize(Scalar::F16).is_err());
        assert!(ScalarValue::AbstractFloat(1.5).materialize(Scalar::I32).is_err());
    }

    #[test]
    fn value_conversions() {
        assert_eq!(ScalarValue::F32(-2.7).convert(Scalar::I32), Ok(ScalarValue::I32(-2)));
        assert_eq!(ScalarValue::F32(1e20).convert(Scalar::U32), Ok(ScalarValue::U32(u32::MAX)));
        assert_eq!(ScalarValue::I32(-1).convert(Scalar::U32), Ok(ScalarValue::U32(u32::MAX)));
        assert_eq!(ScalarValue::U32(3).convert(Scalar::Bool), Ok(ScalarValue::Bool(true)));
        assert_eq!(ScalarValue::Bool(true).convert(Scalar::F32), Ok(ScalarValue::F32(1.0)));
    }

    #[test]
    fn comparisons_yield_bool() {
        let r = ScalarValue::F32(1.0).binary(BinOp::Lt, ScalarValue::F32(2.0), EvalMode::Checked);
        assert_eq!(r, Ok(ScalarValue::Bool(true)));
        let nan = ScalarValue::F32(f32::NAN);
        assert_eq!(nan.binary(BinOp::Eq, nan, EvalMode::Wrapping), Ok(ScalarValue::Bool(false)));
    }

    #[test]
    fn zero_value_of_matrix() {
        let mut types = TypeArena::new();
        let m = types.matrix(2, 3, Scalar::F32);
        let zero = ConstValue::zero(&mut types, m).unwrap();
        assert_eq!(zero.elements().len(), 2);
        assert_eq!(zero.elements()[0].elements().len(), 3);
        assert_eq!(
            zero.display(&types),
            "mat2x3<f32>(vec3<f32>(0.0f, 0.0f, 0.0f), vec3<f32>(0.0f, 0.0f, 0.0f))"
        );
    }
}
