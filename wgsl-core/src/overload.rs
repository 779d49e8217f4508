#![forbid(unsafe_code)]

//! Picks the builtin overload a call or operator refers to.
//!
//! Each candidate is matched structurally against the argument types, which
//! binds its width variables and collects the scalars feeding `T` and `U`.
//! A template scalar becomes the common type of those scalars (abstract
//! arguments follow a concrete sibling), lowered to the cheapest member of
//! the overload's set when the common type itself is not allowed. The
//! candidate with the lowest total conversion rank wins.

use wgsl_ir::{ArraySize, Scalar, TextureClass, Type, TypeArena, TypeId};

use crate::builtins::{Dim, Overload, Pat};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selected {
    /// Index of the overload in the candidate list.
    pub index: usize,
    /// Parameter types after substitution; arguments convert to these.
    pub params: Vec<TypeId>,
    pub ret: Option<TypeId>,
    pub rank: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverloadError {
    NoMatch,
    /// Indices of the candidates that tie.
    Ambiguous(Vec<usize>),
}

#[derive(Debug, Default)]
struct Bindings {
    t: Vec<Scalar>,
    u: Vec<Scalar>,
    dims: [Option<u8>; 4],
}

impl Bindings {
    fn bind_dim(&mut self, dim: Dim, n: u8) -> bool {
        let slot = match dim {
            Dim::Fixed(m) => return m == n,
            Dim::N => 0,
            Dim::C => 1,
            Dim::R => 2,
            Dim::K => 3,
        };
        match self.dims[slot] {
            Some(bound) => bound == n,
            None => {
                self.dims[slot] = Some(n);
                true
            }
        }
    }

    fn dim(&self, dim: Dim) -> Option<u8> {
        match dim {
            Dim::Fixed(n) => Some(n),
            Dim::N => self.dims[0],
            Dim::C => self.dims[1],
            Dim::R => self.dims[2],
            Dim::K => self.dims[3],
        }
    }
}

fn collect_scalar(pat: &Pat, scalar: Scalar, b: &mut Bindings) -> bool {
    match pat {
        Pat::T => {
            b.t.push(scalar);
            true
        }
        Pat::U => {
            b.u.push(scalar);
            true
        }
        Pat::Scalar(_) | Pat::Any => true,
        _ => false,
    }
}

fn collect(types: &TypeArena, pat: &Pat, arg: TypeId, b: &mut Bindings) -> bool {
    match (pat, types.get(arg)) {
        (Pat::Any, _) => true,
        (Pat::T | Pat::U | Pat::Scalar(_), Type::Scalar(s)) => collect_scalar(pat, *s, b),
        (Pat::Vec(d, inner), Type::Vector { size, scalar }) => {
            b.bind_dim(*d, *size) && collect_scalar(inner, *scalar, b)
        }
        (
            Pat::Mat(c, r, inner),
            Type::Matrix {
                columns,
                rows,
                scalar,
            },
        ) => b.bind_dim(*c, *columns) && b.bind_dim(*r, *rows) && collect_scalar(inner, *scalar, b),
        (Pat::Atomic(inner), Type::Atomic(s)) => collect_scalar(inner, *s, b),
        (Pat::Ptr(inner), Type::Pointer { store, .. }) => collect(types, inner, *store, b),
        (
            Pat::RuntimeArray(inner),
            Type::Array {
                base,
                size: ArraySize::Runtime,
                ..
            },
        ) => collect(types, inner, *base, b),
        (Pat::Sampler { comparison }, Type::Sampler { comparison: c }) => comparison == c,
        (
            Pat::SampledTexture(dim, inner),
            Type::Texture {
                dim: d,
                class:
                    TextureClass::Sampled {
                        scalar,
                        multisampled: false,
                    },
            },
        ) => dim == d && collect_scalar(inner, *scalar, b),
        (
            Pat::DepthTexture(dim),
            Type::Texture {
                dim: d,
                class: TextureClass::Depth { multisampled: false },
            },
        ) => dim == d,
        (
            Pat::StorageTexture(dim),
            Type::Texture {
                dim: d,
                class: TextureClass::Storage { format, .. },
            },
        ) => {
            b.t.push(format.channel_scalar());
            dim == d
        }
        _ => false,
    }
}

/// The scalar every candidate converts to: the single concrete candidate if
/// there is one, otherwise the widest abstract one.
pub fn common_scalar(candidates: &[Scalar]) -> Option<Scalar> {
    let mut concrete: Option<Scalar> = None;
    for s in candidates.iter().filter(|s| !s.is_abstract()) {
        match concrete {
            Some(c) if c != *s => return None,
            _ => concrete = Some(*s),
        }
    }
    let common = match concrete {
        Some(c) => c,
        None if candidates.contains(&Scalar::AbstractFloat) => Scalar::AbstractFloat,
        None if candidates.is_empty() => return None,
        None => Scalar::AbstractInt,
    };
    if candidates.iter().any(|s| s.conversion_rank(common).is_none()) {
        return None;
    }
    Some(common)
}

/// The type a template variable takes given the scalars bound to it.
fn choose(candidates: &[Scalar], set: &[Scalar]) -> Option<Scalar> {
    let common = common_scalar(candidates)?;
    if set.contains(&common) {
        return Some(common);
    }
    set.iter()
        .filter_map(|s| common.conversion_rank(*s).map(|rank| (rank, *s)))
        .min()
        .map(|(_, s)| s)
}

fn instantiate_scalar(pat: &Pat, t: Option<Scalar>, u: Option<Scalar>) -> Option<Scalar> {
    match pat {
        Pat::T => t,
        Pat::U => u,
        Pat::Scalar(s) => Some(*s),
        _ => None,
    }
}

fn instantiate(
    types: &mut TypeArena,
    pat: &Pat,
    b: &Bindings,
    t: Option<Scalar>,
    u: Option<Scalar>,
    arg: Option<TypeId>,
) -> Option<TypeId> {
    match pat {
        Pat::T | Pat::U | Pat::Scalar(_) => {
            instantiate_scalar(pat, t, u).map(|s| types.scalar(s))
        }
        Pat::Vec(d, inner) => {
            let scalar = instantiate_scalar(inner, t, u)?;
            Some(types.vector(b.dim(*d)?, scalar))
        }
        Pat::Mat(c, r, inner) => {
            let scalar = instantiate_scalar(inner, t, u)?;
            Some(types.matrix(b.dim(*c)?, b.dim(*r)?, scalar))
        }
        Pat::Atomic(inner) => {
            let scalar = instantiate_scalar(inner, t, u)?;
            Some(types.insert(Type::Atomic(scalar)))
        }
        Pat::Any
        | Pat::Ptr(_)
        | Pat::RuntimeArray(_)
        | Pat::Sampler { .. }
        | Pat::SampledTexture(..)
        | Pat::DepthTexture(_)
        | Pat::StorageTexture(_) => arg,
    }
}

/// Matches one overload; `None` when the arguments do not fit.
pub fn match_overload(types: &mut TypeArena, overload: &Overload, args: &[TypeId]) -> Option<(Vec<TypeId>, Option<TypeId>, u32)> {
    if overload.params.len() != args.len() {
        return None;
    }
    let mut b = Bindings::default();
    for (pat, arg) in overload.params.iter().zip(args) {
        if !collect(types, pat, *arg, &mut b) {
            return None;
        }
    }
    let t = if b.t.is_empty() { None } else { Some(choose(&b.t, overload.t)?) };
    let u = if b.u.is_empty() { None } else { Some(choose(&b.u, overload.u)?) };

    let mut params = Vec::with_capacity(args.len());
    let mut rank = 0;
    for (pat, arg) in overload.params.iter().zip(args) {
        let param = instantiate(types, pat, &b, t, u, Some(*arg))?;
        rank += types.conversion_rank(*arg, param)?;
        params.push(param);
    }
    let ret = match &overload.ret {
        Some(pat) => Some(instantiate(types, pat, &b, t, u, None)?),
        None => None,
    };
    Some((params, ret, rank))
}

/// Selects the best overload for `args`. Ties between candidates with
/// different parameter types are ambiguous; the result does not depend on
/// anything but the candidate order and the argument types.
pub fn select(types: &mut TypeArena, overloads: &[Overload], args: &[TypeId]) -> Result<Selected, OverloadError> {
    let mut matched: Vec<Selected> = Vec::new();
    for (index, overload) in overloads.iter().enumerate() {
        if let Some((params, ret, rank)) = match_overload(types, overload, args) {
            matched.push(Selected {
                index,
                params,
                ret,
                rank,
            });
        }
    }
    let Some(best) = matched.iter().map(|m| m.rank).min() else {
        return Err(OverloadError::NoMatch);
    };
    let mut winners = matched.into_iter().filter(|m| m.rank == best);
    let Some(first) = winners.next() else {
        return Err(OverloadError::NoMatch);
    };
    let rivals: Vec<usize> = winners.filter(|m| m.params != first.params).map(|m| m.index).collect();
    if rivals.is_empty() {
        Ok(first)
    } else {
        Err(OverloadError::Ambiguous(
            std::iter::once(first.index).chain(rivals).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{BuiltinTable, NUMERIC};
    use wgsl_ast::BinaryOp;

    #[test]
    fn abstract_arguments_follow_concrete_siblings() {
        let mut types = TypeArena::new();
        let table = BuiltinTable::standard();
        let f = types.f32();
        let ai = types.scalar(Scalar::AbstractInt);
        let sel = select(&mut types, table.function("max").unwrap(), &[f, ai]).unwrap();
        assert_eq!(sel.params, vec![f, f]);
        assert_eq!(sel.ret, Some(f));
        assert_eq!(sel.rank, 6);
    }

    #[test]
    fn all_abstract_stays_abstract_when_allowed() {
        let mut types = TypeArena::new();
        let table = BuiltinTable::standard();
        let ai = types.scalar(Scalar::AbstractInt);
        let af = types.scalar(Scalar::AbstractFloat);
        let sel = select(&mut types, table.binary(BinaryOp::Add), &[ai, af]).unwrap();
        assert_eq!(sel.ret, Some(af));
    }

    #[test]
    fn mismatched_concrete_types_do_not_match() {
        let mut types = TypeArena::new();
        let table = BuiltinTable::standard();
        let i = types.i32();
        let f = types.f32();
        assert_eq!(
            select(&mut types, table.function("max").unwrap(), &[i, f]),
            Err(OverloadError::NoMatch)
        );
    }

    #[test]
    fn matrix_times_vector_binds_widths() {
        let mut types = TypeArena::new();
        let table = BuiltinTable::standard();
        let m = types.matrix(3, 2, Scalar::F32);
        let v3 = types.vector(3, Scalar::F32);
        let v2 = types.vector(2, Scalar::F32);
        let sel = select(&mut types, table.binary(BinaryOp::Mul), &[m, v3]).unwrap();
        assert_eq!(sel.ret, Some(v2));
        assert!(select(&mut types, table.binary(BinaryOp::Mul), &[m, v2]).is_err());
    }

    #[test]
    fn shifts_prefer_abstract_overload_for_abstract_operands() {
        let mut types = TypeArena::new();
        let table = BuiltinTable::standard();
        let ai = types.scalar(Scalar::AbstractInt);
        let sel = select(&mut types, table.binary(BinaryOp::Shl), &[ai, ai]).unwrap();
        assert_eq!(sel.ret, Some(ai));
        let i = types.i32();
        let u = types.u32();
        let sel = select(&mut types, table.binary(BinaryOp::Shl), &[i, ai]).unwrap();
        assert_eq!(sel.params, vec![i, u]);
    }

    #[test]
    fn equal_rank_ties_are_ambiguous() {
        let mut types = TypeArena::new();
        let mut table = BuiltinTable::new();
        let a = Overload::new(vec![Pat::T], Some(Pat::T)).t(&[Scalar::I32]);
        let b = Overload::new(vec![Pat::T], Some(Pat::T)).t(&[Scalar::U32]);
        table.add_function("f", a);
        table.add_function("f", b);
        let ai = types.scalar(Scalar::AbstractInt);
        // i32 costs 3, u32 costs 4: not a tie.
        assert_eq!(select(&mut types, table.function("f").unwrap(), &[ai]).unwrap().index, 0);

        let mut table = BuiltinTable::new();
        table.add_function("g", Overload::new(vec![Pat::Scalar(Scalar::F32), Pat::Scalar(Scalar::I32)], None));
        table.add_function("g", Overload::new(vec![Pat::Scalar(Scalar::I32), Pat::Scalar(Scalar::F32)], None));
        // 6 + 3 either way.
        let err = select(&mut types, table.function("g").unwrap(), &[ai, ai]).unwrap_err();
        assert_eq!(err, OverloadError::Ambiguous(vec![0, 1]));
        let f = types.f32();
        assert_eq!(select(&mut types, table.function("g").unwrap(), &[f, ai]).unwrap().index, 0);
    }

    #[test]
    fn numeric_set_covers_abstract_types() {
        assert!(NUMERIC.contains(&Scalar::AbstractInt));
    }
}
