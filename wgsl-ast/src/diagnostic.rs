#![forbid(unsafe_code)]

use std::fmt;

use miette::{LabeledSpan, Severity as MietteSeverity};

use crate::source::{SourceFile, SourceLocation};
use crate::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A secondary message attached to a diagnostic, e.g. "previously declared here".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub message: String,
    pub span: Span,
    pub source: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub source: SourceLocation,
    pub notes: Vec<Note>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// `source` is the location, not a cause.
impl std::error::Error for Diagnostic {}

impl miette::Diagnostic for Diagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("wgsl"))
    }

    fn severity(&self) -> Option<MietteSeverity> {
        Some(match self.severity {
            Severity::Note => MietteSeverity::Advice,
            Severity::Warning => MietteSeverity::Warning,
            Severity::Error => MietteSeverity::Error,
        })
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = LabeledSpan::new_primary_with_span(None, self.span);
        let notes = self
            .notes
            .iter()
            .map(|n| LabeledSpan::new_with_span(Some(n.message.clone()), n.span));
        Some(Box::new(std::iter::once(primary).chain(notes)))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: note: {}", self.source, self.message)
    }
}

impl Diagnostic {
    /// `file:line:col severity: message`, followed by one line per note.
    pub fn render_plain(&self) -> String {
        let mut out = format!("{} {}: {}", self.source, self.severity, self.message);
        for note in &self.notes {
            out.push('\n');
            out.push_str(&note.to_string());
        }
        out
    }
}

/// The append-only diagnostics list owned by one compilation.
#[derive(Clone, Debug)]
pub struct Diagnostics {
    file: SourceFile,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(file: SourceFile) -> Self {
        Self {
            file,
            items: Vec::new(),
        }
    }

    pub fn for_source(name: impl Into<String>, text: &str) -> Self {
        Self::new(SourceFile::new(name, text))
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn make(&self, severity: Severity, span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            message: message.into(),
            span,
            source: self.file.location(span),
            notes: Vec::new(),
        }
    }

    pub fn note_at(&self, span: Span, message: impl Into<String>) -> Note {
        Note {
            message: message.into(),
            span,
            source: self.file.location(span),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        let d = self.make(Severity::Error, span, message);
        self.items.push(d);
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        let d = self.make(Severity::Warning, span, message);
        self.items.push(d);
    }

    pub fn note(&mut self, span: Span, message: impl Into<String>) {
        let d = self.make(Severity::Note, span, message);
        self.items.push(d);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    /// Stable sort by start offset; diagnostics at the same position keep
    /// their insertion order.
    pub fn sort_by_position(&mut self) {
        self.items.sort_by_key(|d| d.span.offset());
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span;

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::for_source("t.wgsl", "const a = 1;\n");
        diags.warning(span(6, 1), "unused");
        diags.note(span(0, 5), "fyi");
        assert!(!diags.has_errors());
        diags.error(span(10, 1), "bad");
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.len(), 3);
    }

    #[test]
    fn plain_rendering_includes_location_and_notes() {
        let mut diags = Diagnostics::for_source("t.wgsl", "var x : i32;\nvar x : f32;\n");
        let mut d = diags.make(Severity::Error, span(17, 1), "redeclaration of 'x'");
        d.notes.push(diags.note_at(span(4, 1), "'x' previously declared here"));
        diags.push(d);
        let text = diags.iter().next().map(|d| d.render_plain()).unwrap_or_default();
        assert_eq!(
            text,
            "t.wgsl:2:5 error: redeclaration of 'x'\nt.wgsl:1:5: note: 'x' previously declared here"
        );
    }

    #[test]
    fn location_is_not_reported_as_a_cause() {
        let mut diags = Diagnostics::for_source("t.wgsl", "fn f() {}\n");
        diags.error(span(3, 1), "bad name");
        let d = diags.iter().next().cloned().unwrap();
        assert_eq!(d.to_string(), "bad name");
        assert!(std::error::Error::source(&d).is_none());
        let report = miette::Report::new(d);
        assert_eq!(report.to_string(), "bad name");
    }
}
