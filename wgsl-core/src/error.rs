#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;
use wgsl_ast::{Diagnostics, Severity, Span};

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("; did you mean '{s}'?"),
        None => String::new(),
    }
}

fn candidate_list(candidates: &[String]) -> String {
    let mut out = format!(
        "\n\n{} candidate function{}:",
        candidates.len(),
        if candidates.len() == 1 { "" } else { "s" }
    );
    for c in candidates {
        out.push_str("\n  ");
        out.push_str(c);
    }
    out
}

#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum ResolveError {
    #[error("unresolved identifier '{name}'{}", did_you_mean(.suggestion))]
    #[diagnostic(code(wgsl::resolve::unresolved))]
    UnresolvedIdentifier {
        name: String,
        suggestion: Option<String>,
        #[label]
        span: Span,
    },

    #[error("redeclaration of '{name}'")]
    #[diagnostic(code(wgsl::resolve::redeclaration))]
    Redeclaration {
        name: String,
        #[label("redeclared here")]
        span: Span,
        #[label("previously declared here")]
        previous: Span,
    },

    #[error("'{ty}' has no member named '{member}'")]
    #[diagnostic(code(wgsl::resolve::unknown_member))]
    UnknownMember {
        ty: String,
        member: String,
        #[label]
        span: Span,
    },

    #[error("type mismatch: expected '{expected}', found '{found}'")]
    #[diagnostic(code(wgsl::types::mismatch))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label]
        span: Span,
    },

    #[error("no matching call to '{call}'{}", candidate_list(.candidates))]
    #[diagnostic(code(wgsl::types::no_matching_overload))]
    NoMatchingOverload {
        call: String,
        candidates: Vec<String>,
        #[label]
        span: Span,
    },

    #[error("ambiguous call to '{call}'{}", candidate_list(.candidates))]
    #[diagnostic(code(wgsl::types::ambiguous_overload))]
    AmbiguousOverload {
        call: String,
        candidates: Vec<String>,
        #[label]
        span: Span,
    },

    #[error("cannot implicitly convert '{from}' to '{to}'")]
    #[diagnostic(code(wgsl::types::implicit_conversion))]
    InvalidImplicitConversion {
        from: String,
        to: String,
        #[label]
        span: Span,
    },

    #[error("{message}")]
    #[diagnostic(code(wgsl::types::address_space))]
    InvalidAddressSpaceUsage {
        message: String,
        #[label]
        span: Span,
    },

    #[error("{message}")]
    #[diagnostic(code(wgsl::const_eval))]
    ConstEvaluationOverflow {
        message: String,
        #[label]
        span: Span,
    },

    #[error("{what} requires '{directive}'")]
    #[diagnostic(code(wgsl::feature))]
    FeatureNotEnabled {
        what: String,
        directive: String,
        #[label]
        span: Span,
    },

    #[error("cyclic dependency: {}", .chain.join(" -> "))]
    #[diagnostic(code(wgsl::resolve::cycle))]
    CyclicDependency {
        chain: Vec<String>,
        #[label]
        span: Span,
    },

    #[error("{message}")]
    #[diagnostic(code(wgsl::attribute))]
    InvalidAttribute {
        message: String,
        #[label]
        span: Span,
    },

    #[error("{message}")]
    #[diagnostic(code(wgsl::validation))]
    Validation {
        message: String,
        #[label]
        span: Span,
    },

    #[error("{message}")]
    #[diagnostic(code(wgsl::uniformity))]
    NonUniform {
        message: String,
        #[label]
        span: Span,
    },

    /// A use of a declaration that already failed to resolve. Never shown:
    /// the failure itself was reported.
    #[error("'{name}' could not be resolved because of an earlier error")]
    #[diagnostic(code(wgsl::resolve::poisoned))]
    Poisoned {
        name: String,
        #[label]
        span: Span,
    },
}

impl ResolveError {
    pub fn validation(span: Span, message: impl Into<String>) -> Self {
        ResolveError::Validation {
            message: message.into(),
            span,
        }
    }

    pub fn attribute(span: Span, message: impl Into<String>) -> Self {
        ResolveError::InvalidAttribute {
            message: message.into(),
            span,
        }
    }

    pub fn address_space(span: Span, message: impl Into<String>) -> Self {
        ResolveError::InvalidAddressSpaceUsage {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ResolveError::UnresolvedIdentifier { span, .. }
            | ResolveError::Redeclaration { span, .. }
            | ResolveError::UnknownMember { span, .. }
            | ResolveError::TypeMismatch { span, .. }
            | ResolveError::NoMatchingOverload { span, .. }
            | ResolveError::AmbiguousOverload { span, .. }
            | ResolveError::InvalidImplicitConversion { span, .. }
            | ResolveError::InvalidAddressSpaceUsage { span, .. }
            | ResolveError::ConstEvaluationOverflow { span, .. }
            | ResolveError::FeatureNotEnabled { span, .. }
            | ResolveError::CyclicDependency { span, .. }
            | ResolveError::InvalidAttribute { span, .. }
            | ResolveError::Validation { span, .. }
            | ResolveError::NonUniform { span, .. }
            | ResolveError::Poisoned { span, .. } => *span,
        }
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self, ResolveError::Poisoned { .. })
    }

    /// Appends this error to `diagnostics`, with a note for the earlier
    /// declaration of a redeclared name.
    pub fn report(&self, diagnostics: &mut Diagnostics) {
        if self.is_poisoned() {
            return;
        }
        let mut d = diagnostics.make(Severity::Error, self.span(), self.to_string());
        if let ResolveError::Redeclaration { name, previous, .. } = self {
            d.notes
                .push(diagnostics.note_at(*previous, format!("'{name}' previously declared here")));
        }
        diagnostics.push(d);
    }
}

#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum LowerError {
    #[error("cannot lower {construct}")]
    #[diagnostic(code(wgsl::lower::unsupported))]
    UnsupportedConstruct {
        construct: String,
        #[label]
        span: Span,
    },

    #[error("missing semantic information for {what}")]
    #[diagnostic(code(wgsl::lower::semantic_info))]
    MissingSemanticInfo {
        what: String,
        #[label]
        span: Span,
    },
}

impl LowerError {
    pub fn span(&self) -> Span {
        match self {
            LowerError::UnsupportedConstruct { span, .. }
            | LowerError::MissingSemanticInfo { span, .. } => *span,
        }
    }

    pub fn report(&self, diagnostics: &mut Diagnostics) {
        diagnostics.error(self.span(), self.to_string());
    }
}
