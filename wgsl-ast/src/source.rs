#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::Span;

/// A named source text with a precomputed line index.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    text: Arc<str>,
    line_starts: Vec<usize>,
}

/// 1-based line/column range of a span inside a [`SourceFile`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: &str) -> Self {
        let mut line_starts: Vec<usize> = Vec::new();
        line_starts.push(0);
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name: name.into(),
            text: Arc::from(text),
            line_starts,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// Line and column (both 1-based) of a byte offset. Columns count
    /// characters, not bytes.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.text.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts.get(line_idx).copied().unwrap_or(0);
        let col0 = self
            .text
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - line_start);
        ((line_idx as u32) + 1, (col0 as u32) + 1)
    }

    pub fn location(&self, span: Span) -> SourceLocation {
        let start = span.offset();
        let end = start + span.len();
        let (line, column) = self.line_col(start);
        let (end_line, end_column) = self.line_col(end);
        SourceLocation {
            file: self.name.clone(),
            line,
            column,
            end_line,
            end_column,
        }
    }

    pub fn slice(&self, span: Span) -> Option<&str> {
        self.text.get(span.offset()..span.offset() + span.len())
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span;

    #[test]
    fn locations_are_one_based() {
        let file = SourceFile::new("a.wgsl", "fn f() {\n  x;\n}\n");
        let loc = file.location(span(11, 2));
        assert_eq!((loc.line, loc.column), (2, 3));
        assert_eq!((loc.end_line, loc.end_column), (2, 5));
        assert_eq!(loc.to_string(), "a.wgsl:2:3");
    }

    #[test]
    fn columns_count_characters() {
        let file = SourceFile::new("u.wgsl", "let héllo = 1;");
        let (_, col) = file.line_col("let héllo".len());
        assert_eq!(col, 10);
    }
}
