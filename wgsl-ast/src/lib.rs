#![forbid(unsafe_code)]

//! Syntax tree, source bookkeeping and diagnostics shared by every stage of
//! the WGSL front-end.

pub mod arena;
pub mod ast;
mod clone;
mod diagnostic;
mod source;

use miette::SourceSpan;

pub use arena::{Arena, Handle, UniqueArena};
pub use ast::*;
pub use clone::CloneContext;
pub use diagnostic::{Diagnostic, Diagnostics, Note, Severity};
pub use source::{SourceFile, SourceLocation};

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Smallest span covering both `a` and `b`.
pub fn join(a: Span, b: Span) -> Span {
    let start = a.offset().min(b.offset());
    let end = (a.offset() + a.len()).max(b.offset() + b.len());
    span_between(start, end)
}

pub fn span_end(s: Span) -> usize {
    s.offset() + s.len()
}

pub type Ident = Spanned<String>;
