#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::mem;

use wgsl_ast::{
    AliasDecl, Attribute, ConstAssert, ConstDecl, DiagnosticControl, DiagnosticDirective,
    Directive, EnableDirective, Expr, ExprId, ExprKind, FunctionDecl, GlobalDecl, Ident, Module,
    OverrideDecl, Param, RequiresDirective, ReturnType, Span, Spanned, StructDecl, StructMember,
    TemplatedIdent, VarDecl, span, span_between,
};
use wgsl_lex::{Token, TokenKind};

use crate::error::ParseError;

pub(crate) const MAX_PARSE_DEPTH: usize = 128;

/// Parsing stops once this many errors have been recorded.
pub const MAX_ERRORS: usize = 32;

/// Words WGSL reserves for future use; they cannot name anything.
const RESERVED_WORDS: &[&str] = &[
    "NULL", "Self", "abstract", "active", "alignas", "alignof", "as", "asm", "asm_fragment",
    "async", "attribute", "auto", "await", "become", "cast", "catch", "class", "co_await",
    "co_return", "co_yield", "coherent", "column_major", "common", "compile",
    "compile_fragment", "concept", "const_cast", "consteval", "constexpr", "constinit", "crate",
    "debugger", "decltype", "delete", "demote", "demote_to_helper", "do", "dynamic_cast", "enum",
    "explicit", "export", "extends", "extern", "external", "fallthrough", "filter", "final",
    "finally", "friend", "from", "fxgroup", "get", "goto", "groupshared", "highp", "impl",
    "implements", "import", "inline", "instanceof", "interface", "layout", "lowp", "macro",
    "macro_rules", "match", "mediump", "meta", "mod", "module", "move", "mut", "mutable",
    "namespace", "new", "nil", "noexcept", "noinline", "nointerpolation", "noperspective",
    "null", "nullptr", "of", "operator", "package", "packoffset", "partition", "pass", "patch",
    "pixelfragment", "precise", "precision", "premerge", "priv", "protected", "pub", "public",
    "readonly", "ref", "regardless", "register", "reinterpret_cast", "require", "resource",
    "restrict", "self", "set", "shared", "sizeof", "smooth", "snorm", "static", "static_assert",
    "static_cast", "std", "subroutine", "super", "target", "template", "this", "thread_local",
    "throw", "trait", "try", "type", "typedef", "typeid", "typename", "typeof", "union",
    "unless", "unorm", "unsafe", "unsized", "use", "using", "varying", "virtual", "volatile",
    "wgsl", "where", "with", "writeonly", "yield",
];

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Recursive-descent WGSL parser.
///
/// Errors inside a statement are recorded and parsing resumes at the next
/// statement; errors elsewhere in a global declaration resume at the next
/// declaration.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) idx: usize,
    pub(crate) module: Module,
    errors: Vec<ParseError>,
    reported: HashSet<(usize, String)>,
    /// End offset of the last consumed token.
    pub(crate) last_end: usize,
    pub(crate) brace_depth: usize,
    pub(crate) depth: usize,
    /// Non-zero while parsing template arguments, where `>` closes the list.
    pub(crate) in_template: usize,
    /// Indices of `<` tokens that open a template list.
    template_starts: HashSet<usize>,
    pub(crate) stopped: bool,
}

impl Parser {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut tokens: Vec<Token> = tokens.into_iter().collect();
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let end = tokens
                .last()
                .map(|t| t.span.offset() + t.span.len())
                .unwrap_or(0);
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: span(end, 0),
            });
        }
        let template_starts = discover_template_lists(&tokens);
        Self {
            tokens,
            idx: 0,
            module: Module::default(),
            errors: Vec::new(),
            reported: HashSet::new(),
            last_end: 0,
            brace_depth: 0,
            depth: 0,
            in_template: 0,
            template_starts,
            stopped: false,
        }
    }

    /// Parses a whole module, recovering from errors.
    ///
    /// Returns a best-effort module and every error encountered, in source
    /// order.
    pub fn parse_module_with_recovery(mut self) -> (Module, Vec<ParseError>) {
        let mut seen_decl = false;
        while !self.at_eof() && !self.stopped {
            let start_idx = self.idx;
            if let Err(err) = self.parse_global(&mut seen_decl) {
                self.record_error(err);
                self.recover_to_decl_boundary(start_idx);
            }
        }
        log::debug!(
            "parsed {} directives, {} declarations, {} errors",
            self.module.directives.len(),
            self.module.decls.len(),
            self.errors.len()
        );
        let stop_marker = if self.stopped { self.errors.pop() } else { None };
        self.errors.sort_by_key(|e| e.span.offset());
        self.errors.extend(stop_marker);
        (self.module, self.errors)
    }

    /// Parses a single expression followed by end of input.
    pub fn parse_expression_eof(mut self) -> Result<(Module, ExprId), ParseError> {
        let expr = self.parse_expression()?;
        if !self.at_eof() {
            return Err(self.error_here("end of input", None));
        }
        Ok((self.module, expr))
    }

    // -----------------------------------------------------------------------
    // Global scope
    // -----------------------------------------------------------------------

    fn parse_global(&mut self, seen_decl: &mut bool) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::KwEnable | TokenKind::KwRequires | TokenKind::KwDiagnostic => {
                let keyword = self.peek().clone();
                let directive = self.parse_directive()?;
                if *seen_decl {
                    let kind = keyword.kind.spelling().unwrap_or("global");
                    self.record_error(ParseError::new(
                        format!("{kind} directives must come before all global declarations"),
                        directive.span(),
                    ));
                } else {
                    self.module.directives.push(directive);
                }
                Ok(())
            }
            TokenKind::Semicolon => {
                self.advance();
                *seen_decl = true;
                Ok(())
            }
            _ => {
                *seen_decl = true;
                let decl = self.parse_global_decl()?;
                log::trace!("parsed global {} '{}'", decl.kind_name(), decl.name().map(|n| n.node.as_str()).unwrap_or(""));
                self.module.decls.append(decl);
                Ok(())
            }
        }
    }

    fn parse_directive(&mut self) -> Result<Directive, ParseError> {
        let start = self.start_offset();
        match self.advance().kind {
            TokenKind::KwEnable => {
                let names = self.parse_name_list("enable directive")?;
                self.expect(TokenKind::Semicolon, "enable directive")?;
                Ok(Directive::Enable(EnableDirective {
                    span: self.span_from(start),
                    names,
                }))
            }
            TokenKind::KwRequires => {
                let names = self.parse_name_list("requires directive")?;
                self.expect(TokenKind::Semicolon, "requires directive")?;
                Ok(Directive::Requires(RequiresDirective {
                    span: self.span_from(start),
                    names,
                }))
            }
            _ => {
                let control = self.parse_diagnostic_control()?;
                self.expect(TokenKind::Semicolon, "diagnostic directive")?;
                Ok(Directive::Diagnostic(DiagnosticDirective {
                    span: self.span_from(start),
                    control,
                }))
            }
        }
    }

    fn parse_name_list(&mut self, use_: &str) -> Result<Vec<Ident>, ParseError> {
        let mut names = vec![self.expect_ident(use_)?];
        while self.eat(&TokenKind::Comma) {
            if !matches!(self.peek_kind(), TokenKind::Ident(_)) {
                break;
            }
            names.push(self.expect_ident(use_)?);
        }
        Ok(names)
    }

    /// `( severity , rule [. rule] [,] )`
    pub(crate) fn parse_diagnostic_control(&mut self) -> Result<DiagnosticControl, ParseError> {
        let start = self.start_offset();
        self.expect(TokenKind::LParen, "diagnostic control")?;
        let severity = self.expect_ident("diagnostic severity")?;
        self.expect(TokenKind::Comma, "diagnostic control")?;
        let mut rule = vec![self.expect_ident("diagnostic rule name")?];
        if self.eat(&TokenKind::Dot) {
            rule.push(self.expect_ident("diagnostic rule name")?);
        }
        self.eat(&TokenKind::Comma);
        self.expect(TokenKind::RParen, "diagnostic control")?;
        Ok(DiagnosticControl {
            span: self.span_from(start),
            severity,
            rule,
        })
    }

    fn parse_global_decl(&mut self) -> Result<GlobalDecl, ParseError> {
        let start = self.start_offset();
        let attrs = self.parse_attributes()?;
        match self.peek_kind() {
            TokenKind::KwVar => Ok(GlobalDecl::Var(self.parse_global_var(start, attrs)?)),
            TokenKind::KwOverride => Ok(GlobalDecl::Override(self.parse_override(start, attrs)?)),
            TokenKind::KwFn => Ok(GlobalDecl::Function(self.parse_function(start, attrs)?)),
            _ if !attrs.is_empty() => {
                Err(self.error_here("'var', 'override' or 'fn' after attributes", None))
            }
            TokenKind::KwConst => Ok(GlobalDecl::Const(self.parse_global_const(start)?)),
            TokenKind::KwLet => Err(ParseError::new(
                "module-scope 'let' is invalid, use 'const'",
                self.peek().span,
            )),
            TokenKind::KwAlias => Ok(GlobalDecl::Alias(self.parse_alias(start)?)),
            TokenKind::KwStruct => Ok(GlobalDecl::Struct(self.parse_struct(start)?)),
            TokenKind::KwConstAssert => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "const assertion")?;
                Ok(GlobalDecl::ConstAssert(ConstAssert {
                    span: self.span_from(start),
                    expr,
                }))
            }
            _ => Err(self.error_here("global declaration", None)),
        }
    }

    pub(crate) fn parse_attributes(&mut self) -> Result<Vec<Attribute>, ParseError> {
        let mut attrs = Vec::new();
        while self.at(&TokenKind::At) {
            let start = self.start_offset();
            self.advance();
            let name_tok = self.peek().clone();
            let name = match &name_tok.kind {
                TokenKind::Ident(n) => n.clone(),
                TokenKind::KwDiagnostic => "diagnostic".to_string(),
                TokenKind::KwConst => "const".to_string(),
                _ => return Err(self.error_here("attribute name", None)),
            };
            self.advance();
            let name = Spanned::new(name_tok.span, name);
            let mut args = Vec::new();
            if self.eat(&TokenKind::LParen) {
                let saved = mem::replace(&mut self.in_template, 0);
                let parsed = self.parse_expression_list(&TokenKind::RParen);
                self.in_template = saved;
                args = parsed?;
                self.expect(TokenKind::RParen, "attribute")?;
            }
            attrs.push(Attribute {
                span: self.span_from(start),
                name,
                args,
            });
        }
        Ok(attrs)
    }

    /// Comma separated expressions with an optional trailing comma, stopping
    /// before `close`.
    pub(crate) fn parse_expression_list(&mut self, close: &TokenKind) -> Result<Vec<ExprId>, ParseError> {
        let mut items = Vec::new();
        while !self.at(close) {
            items.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_global_var(&mut self, start: usize, attrs: Vec<Attribute>) -> Result<VarDecl, ParseError> {
        self.expect(TokenKind::KwVar, "variable declaration")?;
        let template_args = if self.at(&TokenKind::Lt) {
            self.parse_template_list("variable declaration")?
        } else {
            Vec::new()
        };
        let name = self.expect_ident("variable declaration")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type("variable declaration")?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "variable declaration")?;
        Ok(VarDecl {
            span: self.span_from(start),
            attrs,
            name,
            template_args,
            ty,
            init,
        })
    }

    fn parse_override(&mut self, start: usize, attrs: Vec<Attribute>) -> Result<OverrideDecl, ParseError> {
        self.expect(TokenKind::KwOverride, "override declaration")?;
        let name = self.expect_ident("override declaration")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type("override declaration")?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "override declaration")?;
        Ok(OverrideDecl {
            span: self.span_from(start),
            attrs,
            name,
            ty,
            init,
        })
    }

    fn parse_global_const(&mut self, start: usize) -> Result<ConstDecl, ParseError> {
        self.expect(TokenKind::KwConst, "const declaration")?;
        let name = self.expect_ident("const declaration")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type("const declaration")?)
        } else {
            None
        };
        self.expect(TokenKind::Eq, "const declaration")?;
        let init = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "const declaration")?;
        Ok(ConstDecl {
            span: self.span_from(start),
            name,
            ty,
            init,
        })
    }

    fn parse_alias(&mut self, start: usize) -> Result<AliasDecl, ParseError> {
        self.expect(TokenKind::KwAlias, "type alias")?;
        let name = self.expect_ident("type alias")?;
        self.expect(TokenKind::Eq, "type alias")?;
        let ty = self.parse_type("type alias")?;
        self.expect(TokenKind::Semicolon, "type alias")?;
        Ok(AliasDecl {
            span: self.span_from(start),
            name,
            ty,
        })
    }

    fn parse_struct(&mut self, start: usize) -> Result<StructDecl, ParseError> {
        self.expect(TokenKind::KwStruct, "struct declaration")?;
        let name = self.expect_ident("struct declaration")?;
        self.expect(TokenKind::LBrace, "struct declaration")?;
        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let member_start = self.start_offset();
            let attrs = self.parse_attributes()?;
            let member_name = self.expect_ident("struct member")?;
            self.expect(TokenKind::Colon, "struct member")?;
            let ty = self.parse_type("struct member")?;
            members.push(StructMember {
                span: self.span_from(member_start),
                attrs,
                name: member_name,
                ty,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "struct declaration")?;
        Ok(StructDecl {
            span: self.span_from(start),
            name,
            members,
        })
    }

    fn parse_function(&mut self, start: usize, attrs: Vec<Attribute>) -> Result<FunctionDecl, ParseError> {
        self.expect(TokenKind::KwFn, "function declaration")?;
        let name = self.expect_ident("function declaration")?;
        self.expect(TokenKind::LParen, "function declaration")?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let param_start = self.start_offset();
            let param_attrs = self.parse_attributes()?;
            let param_name = self.expect_ident("parameter")?;
            self.expect(TokenKind::Colon, "parameter")?;
            let ty = self.parse_type("parameter")?;
            params.push(Param {
                span: self.span_from(param_start),
                attrs: param_attrs,
                name: param_name,
                ty,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "function declaration")?;
        let ret = if self.eat(&TokenKind::Arrow) {
            let ret_attrs = self.parse_attributes()?;
            let ty = self.parse_type("function return type")?;
            Some(ReturnType { attrs: ret_attrs, ty })
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            span: self.span_from(start),
            attrs,
            name,
            params,
            ret,
            body,
        })
    }

    // -----------------------------------------------------------------------
    // Error recovery
    // -----------------------------------------------------------------------

    pub(crate) fn record_error(&mut self, err: ParseError) {
        if self.stopped {
            return;
        }
        // An error token that swallowed the rest of the input has already
        // explained why the parser ran into end of file.
        let eof = self.tokens.len() - 1;
        if err.span.offset() == self.tokens[eof].span.offset()
            && eof > 0
            && self.tokens[eof - 1].is_error()
            && !self.errors.is_empty()
        {
            return;
        }
        if !self.reported.insert((err.span.offset(), err.message.clone())) {
            return;
        }
        self.errors.push(err);
        if self.errors.len() >= MAX_ERRORS {
            let at = self.peek().span;
            self.errors.push(ParseError::new(
                format!("stopping after {MAX_ERRORS} errors"),
                at,
            ));
            self.stopped = true;
        }
    }

    fn report_error_token(&mut self) {
        if let TokenKind::Error(message) = &self.peek().kind {
            let err = ParseError::new(message.clone(), self.peek().span);
            self.record_error(err);
        }
    }

    fn recover_to_decl_boundary(&mut self, start_idx: usize) {
        let mut skipped = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Error(_) => {
                    self.report_error_token();
                    self.advance();
                }
                TokenKind::Semicolon if self.brace_depth == 0 => {
                    self.advance();
                    skipped += 1;
                    break;
                }
                TokenKind::RBrace => {
                    self.advance();
                    skipped += 1;
                    if self.brace_depth == 0 {
                        break;
                    }
                    continue;
                }
                k if self.brace_depth == 0 && starts_global(k) && self.idx > start_idx => break,
                _ => {
                    self.advance();
                }
            }
            skipped += 1;
        }
        self.brace_depth = 0;
        if skipped > 0 {
            log::warn!("skipped {skipped} tokens to reach the next declaration");
        }
    }

    /// Skips to the end of the current statement inside a block whose body
    /// sits at `depth`. Stops before the block's closing brace.
    pub(crate) fn recover_in_block(&mut self, depth: usize) {
        let mut skipped = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Error(_) => {
                    self.report_error_token();
                    self.advance();
                }
                TokenKind::Semicolon if self.brace_depth <= depth => {
                    self.advance();
                    break;
                }
                TokenKind::RBrace if self.brace_depth <= depth => break,
                _ => {
                    self.advance();
                }
            }
            skipped += 1;
        }
        if skipped > 0 {
            log::warn!("skipped {skipped} tokens to reach the next statement");
        }
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.idx.min(last)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_kind_n(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.idx + n).min(last)].kind
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        mem::discriminant(self.peek_kind()) == mem::discriminant(kind)
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn start_offset(&self) -> usize {
        self.peek().span.offset()
    }

    pub(crate) fn span_from(&self, start: usize) -> Span {
        span_between(start, self.last_end.max(start))
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !matches!(tok.kind, TokenKind::Eof) {
            self.idx += 1;
            self.last_end = tok.span.offset() + tok.span.len();
            match tok.kind {
                TokenKind::LBrace => self.brace_depth += 1,
                TokenKind::RBrace => self.brace_depth = self.brace_depth.saturating_sub(1),
                _ => {}
            }
        }
        tok
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, use_: &str) -> Result<Token, ParseError> {
        if self.at(&kind) {
            return Ok(self.advance());
        }
        Err(self.error_here(&kind.to_string(), Some(use_)))
    }

    /// Error for the current token: the lexer's message for error tokens,
    /// otherwise `expected <what> [for <use>]`.
    pub(crate) fn error_here(&self, what: &str, use_: Option<&str>) -> ParseError {
        let tok = self.peek();
        if let TokenKind::Error(message) = &tok.kind {
            return ParseError::new(message.clone(), tok.span);
        }
        let message = match use_ {
            Some(use_) => format!("expected {what} for {use_}"),
            None => format!("expected {what}"),
        };
        ParseError::new(message, tok.span)
    }

    pub(crate) fn expect_ident(&mut self, use_: &str) -> Result<Ident, ParseError> {
        let tok = self.peek().clone();
        let TokenKind::Ident(name) = tok.kind else {
            if tok.kind.is_keyword() {
                return Err(ParseError::new(
                    format!("expected identifier for {use_}, found keyword {}", tok.kind),
                    tok.span,
                ));
            }
            return Err(self.error_here("identifier", Some(use_)));
        };
        if is_reserved_word(&name) {
            return Err(ParseError::new(format!("'{name}' is a reserved keyword"), tok.span));
        }
        if name.starts_with("__") {
            return Err(ParseError::new(
                format!("identifiers must not start with two or more underscores ('{name}')"),
                tok.span,
            ));
        }
        self.advance();
        Ok(Spanned::new(tok.span, name))
    }

    /// Whether the current token is a `<` that opens a template list.
    pub(crate) fn at_template_start(&self) -> bool {
        self.at(&TokenKind::Lt) && self.template_starts.contains(&self.idx)
    }

    /// Consumes the first character of the current token, leaving `rest`
    /// in its place. Used for `>>`, `>=` and `>>=` closing a template list.
    pub(crate) fn split_current(&mut self, rest: TokenKind) {
        let tok = self.peek().clone();
        let offset = tok.span.offset();
        self.tokens[self.idx] = Token {
            kind: rest,
            span: span(offset + 1, tok.span.len().saturating_sub(1)),
        };
        self.last_end = offset + 1;
    }

    /// Runs `f` one recursion level deeper.
    pub(crate) fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(ParseError::new(
                "maximum parser recursive depth reached",
                self.peek().span,
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn append_expr(&mut self, span: Span, kind: ExprKind) -> ExprId {
        self.module.exprs.append(Expr { span, kind })
    }

    pub(crate) fn ident_expr(&mut self, ident: Ident, template_args: Vec<ExprId>, span: Span) -> ExprId {
        self.append_expr(
            span,
            ExprKind::Ident(TemplatedIdent {
                ident,
                template_args,
            }),
        )
    }
}

/// Finds every `<` that opens a template list in one pass over the tokens.
///
/// A `<` directly after an identifier is a candidate. It becomes a template
/// list when a `>` closes it at the same bracket nesting depth before any
/// token that cannot appear inside an expression (`;`, `{`, `}`, `:`, `=`),
/// an `&&`/`||` at that depth, or the bracket it sits in closes.
pub(crate) fn discover_template_lists(tokens: &[Token]) -> HashSet<usize> {
    struct Pending {
        lt: usize,
        depth: usize,
    }

    let mut starts = HashSet::new();
    let mut pending: Vec<Pending> = Vec::new();
    let mut depth = 0usize;

    // Closes the innermost candidate when it sits at the current depth.
    let close = |pending: &mut Vec<Pending>, starts: &mut HashSet<usize>, depth: usize| {
        match pending.last() {
            Some(top) if top.depth == depth => {
                starts.insert(top.lt);
                pending.pop();
                true
            }
            _ => false,
        }
    };

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i].kind {
            TokenKind::Ident(_) | TokenKind::KwVar
                if matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::Lt)) =>
            {
                pending.push(Pending { lt: i + 1, depth });
                i += 2;
                continue;
            }
            TokenKind::Gt => {
                close(&mut pending, &mut starts, depth);
            }
            TokenKind::Shr => {
                if close(&mut pending, &mut starts, depth) {
                    close(&mut pending, &mut starts, depth);
                }
            }
            TokenKind::Ge => {
                // `>` closing a list, then `=` as an assignment.
                if close(&mut pending, &mut starts, depth) {
                    pending.clear();
                    depth = 0;
                }
            }
            TokenKind::ShrEq => {
                let first = close(&mut pending, &mut starts, depth);
                if !first || close(&mut pending, &mut starts, depth) {
                    pending.clear();
                    depth = 0;
                }
            }
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => {
                while pending.last().is_some_and(|p| p.depth >= depth) {
                    pending.pop();
                }
                depth = depth.saturating_sub(1);
            }
            TokenKind::AmpAmp | TokenKind::PipePipe => {
                while pending.last().is_some_and(|p| p.depth >= depth) {
                    pending.pop();
                }
            }
            TokenKind::Semicolon
            | TokenKind::LBrace
            | TokenKind::RBrace
            | TokenKind::Colon
            | TokenKind::Eq
            | TokenKind::PlusEq
            | TokenKind::MinusEq
            | TokenKind::StarEq
            | TokenKind::SlashEq
            | TokenKind::PercentEq
            | TokenKind::AmpEq
            | TokenKind::PipeEq
            | TokenKind::CaretEq
            | TokenKind::ShlEq => {
                pending.clear();
                depth = 0;
            }
            _ => {}
        }
        i += 1;
    }
    starts
}

fn starts_global(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::KwFn
            | TokenKind::KwStruct
            | TokenKind::KwVar
            | TokenKind::KwConst
            | TokenKind::KwOverride
            | TokenKind::KwAlias
            | TokenKind::KwConstAssert
            | TokenKind::KwEnable
            | TokenKind::KwRequires
            | TokenKind::KwDiagnostic
            | TokenKind::At
    )
}
