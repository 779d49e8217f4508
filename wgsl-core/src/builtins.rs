#![forbid(unsafe_code)]

//! Builtin functions and operators as data: each name maps to a list of
//! [`Overload`] records matched by [`crate::overload::select`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use wgsl_ast::{BinaryOp, UnaryOp};
use wgsl_ir::{Scalar, TextureDim};

use crate::const_eval::{self, ConstFn};
use crate::features::Feature;

use Scalar::{AbstractFloat, AbstractInt, Bool, F16, F32, I32, U32};

pub const NUMERIC: &[Scalar] = &[AbstractInt, AbstractFloat, I32, U32, F32, F16];
pub const SIGNED: &[Scalar] = &[AbstractInt, AbstractFloat, I32, F32, F16];
pub const FLOAT: &[Scalar] = &[AbstractFloat, F32, F16];
pub const INTEGER: &[Scalar] = &[AbstractInt, I32, U32];
pub const CONCRETE_INTEGER: &[Scalar] = &[I32, U32];
pub const CONCRETE_NUMERIC: &[Scalar] = &[I32, U32, F32, F16];
pub const ANY_SCALAR: &[Scalar] = &[AbstractInt, AbstractFloat, Bool, I32, U32, F32, F16];
pub const TEXEL: &[Scalar] = &[F32, I32, U32];

/// Width variable of a vector or matrix pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dim {
    N,
    C,
    R,
    K,
    Fixed(u8),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::N => f.write_str("N"),
            Dim::C => f.write_str("C"),
            Dim::R => f.write_str("R"),
            Dim::K => f.write_str("K"),
            Dim::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// A parameter or return type with holes.
#[derive(Clone, Debug, PartialEq)]
pub enum Pat {
    /// Matches any type; only valid for parameters.
    Any,
    /// Template scalar `T`, drawn from the overload's `t` set.
    T,
    /// Template scalar `U`, drawn from the overload's `u` set.
    U,
    Scalar(Scalar),
    Vec(Dim, Box<Pat>),
    Mat(Dim, Dim, Box<Pat>),
    Atomic(Box<Pat>),
    Ptr(Box<Pat>),
    RuntimeArray(Box<Pat>),
    Sampler { comparison: bool },
    SampledTexture(TextureDim, Box<Pat>),
    DepthTexture(TextureDim),
    /// Binds `T` to the channel type of the texel format.
    StorageTexture(TextureDim),
}

impl fmt::Display for Pat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pat::Any => f.write_str("_"),
            Pat::T => f.write_str("T"),
            Pat::U => f.write_str("U"),
            Pat::Scalar(s) => f.write_str(s.name()),
            Pat::Vec(d, inner) => write!(f, "vec{d}<{inner}>"),
            Pat::Mat(c, r, inner) => write!(f, "mat{c}x{r}<{inner}>"),
            Pat::Atomic(inner) => write!(f, "atomic<{inner}>"),
            Pat::Ptr(inner) => write!(f, "ptr<{inner}>"),
            Pat::RuntimeArray(inner) => write!(f, "array<{inner}>"),
            Pat::Sampler { comparison: false } => f.write_str("sampler"),
            Pat::Sampler { comparison: true } => f.write_str("sampler_comparison"),
            Pat::SampledTexture(dim, inner) => write!(f, "texture_{}<{inner}>", dim.suffix()),
            Pat::DepthTexture(dim) => write!(f, "texture_depth_{}", dim.suffix()),
            Pat::StorageTexture(dim) => write!(f, "texture_storage_{}<F, A>", dim.suffix()),
        }
    }
}

impl Pat {
    fn uses(&self, var: &Pat) -> bool {
        match self {
            Pat::T | Pat::U => self == var,
            Pat::StorageTexture(_) => *var == Pat::T,
            Pat::Vec(_, inner)
            | Pat::Mat(_, _, inner)
            | Pat::Atomic(inner)
            | Pat::Ptr(inner)
            | Pat::RuntimeArray(inner)
            | Pat::SampledTexture(_, inner) => inner.uses(var),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Overload {
    pub params: Vec<Pat>,
    pub ret: Option<Pat>,
    pub t: &'static [Scalar],
    pub u: &'static [Scalar],
    pub const_fn: Option<ConstFn>,
    pub feature: Option<Feature>,
}

impl Overload {
    pub fn new(params: Vec<Pat>, ret: Option<Pat>) -> Self {
        Self {
            params,
            ret,
            t: &[],
            u: &[],
            const_fn: None,
            feature: None,
        }
    }

    pub fn t(mut self, set: &'static [Scalar]) -> Self {
        self.t = set;
        self
    }

    pub fn u(mut self, set: &'static [Scalar]) -> Self {
        self.u = set;
        self
    }

    pub fn const_fn(mut self, f: ConstFn) -> Self {
        self.const_fn = Some(f);
        self
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    fn uses(&self, var: &Pat) -> bool {
        self.params.iter().chain(self.ret.iter()).any(|p| p.uses(var))
    }

    /// Human-readable signature, e.g. `max(T, T) -> T where T: i32, u32`.
    pub fn signature(&self, name: &str) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        let mut out = format!("{name}({})", params.join(", "));
        if let Some(ret) = &self.ret {
            out.push_str(&format!(" -> {ret}"));
        }
        let mut wheres = Vec::new();
        for (var, set) in [(Pat::T, self.t), (Pat::U, self.u)] {
            if self.uses(&var) && !set.is_empty() {
                let names: Vec<&str> = set.iter().map(|s| s.name()).collect();
                wheres.push(format!("{var}: {}", names.join(", ")));
            }
        }
        if !wheres.is_empty() {
            out.push_str(" where ");
            out.push_str(&wheres.join("; "));
        }
        out
    }
}

fn t() -> Pat {
    Pat::T
}

fn u() -> Pat {
    Pat::U
}

fn s(scalar: Scalar) -> Pat {
    Pat::Scalar(scalar)
}

fn vn(inner: Pat) -> Pat {
    Pat::Vec(Dim::N, Box::new(inner))
}

fn v(n: u8, inner: Pat) -> Pat {
    Pat::Vec(Dim::Fixed(n), Box::new(inner))
}

fn vd(d: Dim, inner: Pat) -> Pat {
    Pat::Vec(d, Box::new(inner))
}

fn mat(c: Dim, r: Dim, inner: Pat) -> Pat {
    Pat::Mat(c, r, Box::new(inner))
}

fn ptr(inner: Pat) -> Pat {
    Pat::Ptr(Box::new(inner))
}

fn atomic(inner: Pat) -> Pat {
    Pat::Atomic(Box::new(inner))
}

fn sampled(dim: TextureDim, inner: Pat) -> Pat {
    Pat::SampledTexture(dim, Box::new(inner))
}

fn ov(params: Vec<Pat>, ret: Pat) -> Overload {
    Overload::new(params, Some(ret))
}

fn void(params: Vec<Pat>) -> Overload {
    Overload::new(params, None)
}

/// Overloads for every builtin function and operator, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct BuiltinTable {
    functions: BTreeMap<&'static str, Vec<Overload>>,
    binary: HashMap<BinaryOp, Vec<Overload>>,
    unary: HashMap<UnaryOp, Vec<Overload>>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, name: &'static str, overload: Overload) {
        self.functions.entry(name).or_default().push(overload);
    }

    pub fn add_binary(&mut self, op: BinaryOp, overload: Overload) {
        self.binary.entry(op).or_default().push(overload);
    }

    pub fn add_unary(&mut self, op: UnaryOp, overload: Overload) {
        self.unary.entry(op).or_default().push(overload);
    }

    pub fn function(&self, name: &str) -> Option<&[Overload]> {
        self.functions.get(name).map(Vec::as_slice)
    }

    pub fn binary(&self, op: BinaryOp) -> &[Overload] {
        self.binary.get(&op).map_or(&[], Vec::as_slice)
    }

    pub fn unary(&self, op: UnaryOp) -> &[Overload] {
        self.unary.get(&op).map_or(&[], Vec::as_slice)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().copied()
    }

    /// The standard WGSL builtins this front-end knows.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.add_math();
        table.add_bits_and_logic();
        table.add_matrix();
        table.add_memory();
        table.add_textures();
        table.add_subgroups();
        table.add_operators();
        log::trace!(
            "builtin table: {} functions, {} operators",
            table.functions.len(),
            table.binary.len() + table.unary.len()
        );
        table
    }

    /// `name(T) -> T` and the vector form.
    fn unary_fn(&mut self, name: &'static str, set: &'static [Scalar], f: Option<ConstFn>) {
        for (p, r) in [(t(), t()), (vn(t()), vn(t()))] {
            let mut o = ov(vec![p], r).t(set);
            o.const_fn = f;
            self.add_function(name, o);
        }
    }

    fn nary_fn(&mut self, name: &'static str, arity: usize, set: &'static [Scalar], f: Option<ConstFn>) {
        for shape in [t(), vn(t())] {
            let mut o = ov(vec![shape.clone(); arity], shape).t(set);
            o.const_fn = f;
            self.add_function(name, o);
        }
    }

    fn add_math(&mut self) {
        self.unary_fn("abs", NUMERIC, Some(const_eval::abs));
        self.nary_fn("min", 2, NUMERIC, Some(const_eval::min));
        self.nary_fn("max", 2, NUMERIC, Some(const_eval::max));
        self.nary_fn("clamp", 3, NUMERIC, Some(const_eval::clamp));
        self.unary_fn("floor", FLOAT, Some(const_eval::floor));
        self.unary_fn("ceil", FLOAT, Some(const_eval::ceil));
        self.unary_fn("round", FLOAT, Some(const_eval::round));
        self.unary_fn("sqrt", FLOAT, Some(const_eval::sqrt));
        for name in [
            "sin", "cos", "tan", "asin", "acos", "atan", "exp", "exp2", "log", "log2", "fract",
            "trunc", "sign", "saturate", "inverseSqrt", "degrees", "radians",
        ] {
            self.unary_fn(name, FLOAT, None);
        }
        for name in ["pow", "atan2", "step"] {
            self.nary_fn(name, 2, FLOAT, None);
        }
        for name in ["mix", "smoothstep", "fma"] {
            self.nary_fn(name, 3, FLOAT, None);
        }
        self.add_function("mix", ov(vec![vn(t()), vn(t()), t()], vn(t())).t(FLOAT));
        for name in ["dpdx", "dpdy", "fwidth"] {
            self.unary_fn(name, &[F32], None);
        }

        self.add_function(
            "dot",
            ov(vec![vn(t()), vn(t())], t()).t(NUMERIC).const_fn(const_eval::dot),
        );
        self.add_function("cross", ov(vec![v(3, t()), v(3, t())], v(3, t())).t(FLOAT));
        self.add_function("length", ov(vec![t()], t()).t(FLOAT));
        self.add_function("length", ov(vec![vn(t())], t()).t(FLOAT));
        self.add_function("distance", ov(vec![t(), t()], t()).t(FLOAT));
        self.add_function("distance", ov(vec![vn(t()), vn(t())], t()).t(FLOAT));
        self.add_function("normalize", ov(vec![vn(t())], vn(t())).t(FLOAT));

        self.add_function(
            "select",
            ov(vec![t(), t(), s(Bool)], t()).t(ANY_SCALAR).const_fn(const_eval::select),
        );
        self.add_function(
            "select",
            ov(vec![vn(t()), vn(t()), s(Bool)], vn(t()))
                .t(ANY_SCALAR)
                .const_fn(const_eval::select),
        );
        self.add_function(
            "select",
            ov(vec![vn(t()), vn(t()), vn(s(Bool))], vn(t()))
                .t(ANY_SCALAR)
                .const_fn(const_eval::select),
        );
    }

    fn add_bits_and_logic(&mut self) {
        for (name, f) in [
            ("all", const_eval::all as ConstFn),
            ("any", const_eval::any as ConstFn),
        ] {
            self.add_function(name, ov(vec![vn(s(Bool))], s(Bool)).const_fn(f));
            self.add_function(name, ov(vec![s(Bool)], s(Bool)).const_fn(f));
        }
        self.unary_fn("countOneBits", CONCRETE_INTEGER, Some(const_eval::count_one_bits));
        for name in ["reverseBits", "firstLeadingBit", "firstTrailingBit", "countLeadingZeros", "countTrailingZeros"] {
            self.unary_fn(name, CONCRETE_INTEGER, None);
        }
        for (name, ret) in [("dot4U8Packed", U32), ("dot4I8Packed", I32)] {
            self.add_function(
                name,
                ov(vec![s(U32), s(U32)], s(ret)).feature(Feature::Packed4x8IntegerDotProduct),
            );
        }
    }

    fn add_matrix(&mut self) {
        self.add_function(
            "transpose",
            ov(vec![mat(Dim::C, Dim::R, t())], mat(Dim::R, Dim::C, t())).t(FLOAT),
        );
        self.add_function("determinant", ov(vec![mat(Dim::C, Dim::C, t())], t()).t(FLOAT));
    }

    fn add_memory(&mut self) {
        self.add_function(
            "arrayLength",
            ov(vec![ptr(Pat::RuntimeArray(Box::new(Pat::Any)))], s(U32)),
        );
        self.add_function("atomicLoad", ov(vec![ptr(atomic(t()))], t()).t(CONCRETE_INTEGER));
        self.add_function("atomicStore", void(vec![ptr(atomic(t())), t()]).t(CONCRETE_INTEGER));
        for name in [
            "atomicAdd", "atomicSub", "atomicMax", "atomicMin", "atomicAnd", "atomicOr",
            "atomicXor", "atomicExchange",
        ] {
            self.add_function(name, ov(vec![ptr(atomic(t())), t()], t()).t(CONCRETE_INTEGER));
        }
        for name in ["workgroupBarrier", "storageBarrier", "textureBarrier"] {
            self.add_function(name, void(Vec::new()));
        }
    }

    fn add_textures(&mut self) {
        use TextureDim::{D1, D2, D2Array, D3, Cube};

        let coords = |dim: TextureDim| match dim.coords() {
            1 => s(F32),
            n => v(n, s(F32)),
        };
        for dim in [D1, D2, D3, Cube] {
            self.add_function(
                "textureSample",
                ov(
                    vec![sampled(dim, s(F32)), Pat::Sampler { comparison: false }, coords(dim)],
                    v(4, s(F32)),
                ),
            );
            self.add_function(
                "textureSampleLevel",
                ov(
                    vec![sampled(dim, s(F32)), Pat::Sampler { comparison: false }, coords(dim), s(F32)],
                    v(4, s(F32)),
                ),
            );
        }
        self.add_function(
            "textureSample",
            ov(
                vec![Pat::DepthTexture(D2), Pat::Sampler { comparison: false }, v(2, s(F32))],
                s(F32),
            ),
        );
        self.add_function(
            "textureSampleCompare",
            ov(
                vec![Pat::DepthTexture(D2), Pat::Sampler { comparison: true }, v(2, s(F32)), s(F32)],
                s(F32),
            ),
        );

        let icoords = |dim: TextureDim| match dim.coords() {
            1 => u(),
            n => v(n, u()),
        };
        for dim in [D1, D2, D3] {
            self.add_function(
                "textureLoad",
                ov(vec![sampled(dim, t()), icoords(dim), u()], v(4, t()))
                    .t(TEXEL)
                    .u(CONCRETE_INTEGER),
            );
            self.add_function(
                "textureLoad",
                ov(vec![Pat::StorageTexture(dim), icoords(dim)], v(4, t()))
                    .t(TEXEL)
                    .u(CONCRETE_INTEGER)
                    .feature(Feature::ReadonlyAndReadwriteStorageTextures),
            );
            self.add_function(
                "textureStore",
                void(vec![Pat::StorageTexture(dim), icoords(dim), v(4, t())])
                    .t(TEXEL)
                    .u(CONCRETE_INTEGER),
            );
        }
        self.add_function(
            "textureStore",
            void(vec![Pat::StorageTexture(D2Array), v(2, u()), u(), v(4, t())])
                .t(TEXEL)
                .u(CONCRETE_INTEGER),
        );

        let dims = |dim: TextureDim| match dim {
            D1 => s(U32),
            D3 => v(3, s(U32)),
            _ => v(2, s(U32)),
        };
        for dim in [D1, D2, D2Array, D3, Cube] {
            self.add_function("textureDimensions", ov(vec![sampled(dim, t())], dims(dim)).t(TEXEL));
            self.add_function(
                "textureDimensions",
                ov(vec![sampled(dim, t()), u()], dims(dim)).t(TEXEL).u(CONCRETE_INTEGER),
            );
            self.add_function("textureNumLevels", ov(vec![sampled(dim, t())], s(U32)).t(TEXEL));
        }
        for dim in [D1, D2, D3] {
            self.add_function("textureDimensions", ov(vec![Pat::StorageTexture(dim)], dims(dim)).t(TEXEL));
        }
        self.add_function("textureDimensions", ov(vec![Pat::DepthTexture(D2)], dims(D2)));
    }

    fn add_subgroups(&mut self) {
        for name in ["subgroupAdd", "subgroupMul", "subgroupMin", "subgroupMax"] {
            for (p, r) in [(t(), t()), (vn(t()), vn(t()))] {
                self.add_function(name, ov(vec![p], r).t(CONCRETE_NUMERIC).feature(Feature::Subgroups));
            }
        }
        self.add_function(
            "subgroupBroadcast",
            ov(vec![t(), s(U32)], t()).t(CONCRETE_NUMERIC).feature(Feature::Subgroups),
        );
        self.add_function(
            "subgroupBallot",
            ov(vec![s(Bool)], v(4, s(U32))).feature(Feature::Subgroups),
        );
        self.add_function("subgroupElect", ov(Vec::new(), s(Bool)).feature(Feature::Subgroups));
    }

    fn add_operators(&mut self) {
        let arithmetic = |set: &'static [Scalar]| {
            vec![
                ov(vec![t(), t()], t()).t(set),
                ov(vec![vn(t()), vn(t())], vn(t())).t(set),
                ov(vec![vn(t()), t()], vn(t())).t(set),
                ov(vec![t(), vn(t())], vn(t())).t(set),
            ]
        };
        for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div, BinaryOp::Mod] {
            for o in arithmetic(NUMERIC) {
                self.add_binary(op, o);
            }
        }
        for op in [BinaryOp::Add, BinaryOp::Sub] {
            let m = mat(Dim::C, Dim::R, t());
            self.add_binary(op, ov(vec![m.clone(), m.clone()], m).t(FLOAT));
        }
        let m = mat(Dim::C, Dim::R, t());
        for o in [
            ov(vec![t(), m.clone()], m.clone()),
            ov(vec![m.clone(), t()], m.clone()),
            ov(vec![m.clone(), vd(Dim::C, t())], vd(Dim::R, t())),
            ov(vec![vd(Dim::R, t()), m.clone()], vd(Dim::C, t())),
            ov(
                vec![mat(Dim::K, Dim::R, t()), mat(Dim::C, Dim::K, t())],
                mat(Dim::C, Dim::R, t()),
            ),
        ] {
            self.add_binary(BinaryOp::Mul, o.t(FLOAT));
        }

        for op in [BinaryOp::And, BinaryOp::Or] {
            self.add_binary(op, ov(vec![s(Bool), s(Bool)], s(Bool)));
            self.add_binary(op, ov(vec![vn(s(Bool)), vn(s(Bool))], vn(s(Bool))));
        }
        for op in [BinaryOp::And, BinaryOp::Or, BinaryOp::Xor] {
            self.add_binary(op, ov(vec![t(), t()], t()).t(INTEGER));
            self.add_binary(op, ov(vec![vn(t()), vn(t())], vn(t())).t(INTEGER));
        }
        for op in [BinaryOp::LogicalAnd, BinaryOp::LogicalOr] {
            self.add_binary(op, ov(vec![s(Bool), s(Bool)], s(Bool)));
        }

        for op in [BinaryOp::Eq, BinaryOp::Ne] {
            self.add_binary(op, ov(vec![t(), t()], s(Bool)).t(ANY_SCALAR));
            self.add_binary(op, ov(vec![vn(t()), vn(t())], vn(s(Bool))).t(ANY_SCALAR));
        }
        for op in [BinaryOp::Lt, BinaryOp::Le, BinaryOp::Gt, BinaryOp::Ge] {
            self.add_binary(op, ov(vec![t(), t()], s(Bool)).t(NUMERIC));
            self.add_binary(op, ov(vec![vn(t()), vn(t())], vn(s(Bool))).t(NUMERIC));
        }

        for op in [BinaryOp::Shl, BinaryOp::Shr] {
            self.add_binary(op, ov(vec![s(AbstractInt), s(AbstractInt)], s(AbstractInt)));
            self.add_binary(
                op,
                ov(vec![vn(s(AbstractInt)), vn(s(AbstractInt))], vn(s(AbstractInt))),
            );
            self.add_binary(op, ov(vec![t(), s(U32)], t()).t(CONCRETE_INTEGER));
            self.add_binary(op, ov(vec![vn(t()), vn(s(U32))], vn(t())).t(CONCRETE_INTEGER));
        }

        for (p, r) in [(t(), t()), (vn(t()), vn(t()))] {
            self.add_unary(UnaryOp::Negate, ov(vec![p], r).t(SIGNED));
        }
        for (p, r) in [(t(), t()), (vn(t()), vn(t()))] {
            self.add_unary(UnaryOp::Complement, ov(vec![p], r).t(INTEGER));
        }
        self.add_unary(UnaryOp::Not, ov(vec![s(Bool)], s(Bool)));
        self.add_unary(UnaryOp::Not, ov(vec![vn(s(Bool))], vn(s(Bool))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_name_template_sets() {
        let table = BuiltinTable::standard();
        let max = table.function("max").unwrap();
        assert_eq!(
            max[0].signature("max"),
            "max(T, T) -> T where T: abstract-int, abstract-float, i32, u32, f32, f16"
        );
        assert_eq!(
            max[1].signature("max"),
            "max(vecN<T>, vecN<T>) -> vecN<T> where T: abstract-int, abstract-float, i32, u32, f32, f16"
        );
    }

    #[test]
    fn gated_builtins_carry_their_feature() {
        let table = BuiltinTable::standard();
        let dot4 = table.function("dot4U8Packed").unwrap();
        assert_eq!(dot4[0].feature, Some(Feature::Packed4x8IntegerDotProduct));
        assert!(table
            .function("subgroupAdd")
            .unwrap()
            .iter()
            .all(|o| o.feature == Some(Feature::Subgroups)));
    }

    #[test]
    fn operators_share_the_table() {
        let table = BuiltinTable::standard();
        assert!(!table.binary(BinaryOp::Mul).is_empty());
        assert!(table.unary(UnaryOp::Deref).is_empty());
        assert!(table.is_function("textureSample"));
    }
}
