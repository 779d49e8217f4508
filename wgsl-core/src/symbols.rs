#![forbid(unsafe_code)]

use std::collections::HashMap;

use wgsl_ast::{DeclId, Span, StmtId};

/// What a name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Global(DeclId),
    /// A `var`, `let` or `const` declared by the statement.
    Local(StmtId),
    /// Parameter `index` of a function.
    Param(DeclId, usize),
    /// A local whose declaration failed; uses are silently rejected.
    Poisoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Declared {
    pub symbol: Symbol,
    pub span: Span,
}

/// Lexical scopes, innermost last. The bottom scope is module scope and is
/// never popped.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Declared>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Number of open scopes, module scope included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_module_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Binds `name` in the innermost scope. Fails with the span of the
    /// earlier declaration when the name is already bound there.
    pub fn declare(&mut self, name: &str, symbol: Symbol, span: Span) -> Result<(), Span> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if let Some(previous) = scope.get(name) {
            return Err(previous.span);
        }
        scope.insert(name.to_string(), Declared { symbol, span });
        Ok(())
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<Declared> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    pub fn lookup_module(&self, name: &str) -> Option<Declared> {
        self.scopes.first().and_then(|s| s.get(name).copied())
    }

    /// Every visible name, innermost scopes first.
    pub fn visible_names(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.keys().map(String::as_str))
    }
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// The candidate closest to `name` within edit distance 2. Ties go to the
/// lexicographically smallest candidate.
pub fn closest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for candidate in candidates {
        if candidate == name {
            continue;
        }
        let d = edit_distance(name, candidate);
        if d > 2 {
            continue;
        }
        best = match best {
            Some((bd, bc)) if (bd, bc) <= (d, candidate) => Some((bd, bc)),
            _ => Some((d, candidate)),
        };
    }
    best.map(|(_, c)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(n: usize) -> Span {
        Span::from(n..n + 1)
    }

    #[test]
    fn inner_scope_shadows_and_pops() {
        let mut table = SymbolTable::new();
        table.declare("x", Symbol::Poisoned, sp(0)).unwrap();
        table.push_scope();
        let inner = Symbol::Param(wgsl_ast::Handle::new(0), 0);
        table.declare("x", inner, sp(5)).unwrap();
        assert_eq!(table.lookup("x").map(|d| d.symbol), Some(inner));
        table.pop_scope();
        assert_eq!(table.lookup("x").map(|d| d.symbol), Some(Symbol::Poisoned));
    }

    #[test]
    fn same_scope_redeclaration_reports_previous_span() {
        let mut table = SymbolTable::new();
        table.declare("x", Symbol::Poisoned, sp(3)).unwrap();
        assert_eq!(table.declare("x", Symbol::Poisoned, sp(9)), Err(sp(3)));
    }

    #[test]
    fn module_scope_is_never_popped() {
        let mut table = SymbolTable::new();
        table.pop_scope();
        assert_eq!(table.depth(), 1);
        assert!(table.is_module_scope());
    }

    #[test]
    fn suggestions_within_two_edits() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(closest("colr", ["color", "count"]), Some("color".to_string()));
        assert_eq!(closest("zzzz", ["color"]), None);
        assert_eq!(closest("ab", ["ac", "ad"]), Some("ac".to_string()));
    }
}
