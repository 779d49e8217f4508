#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;
use wgsl_ast::{FloatSuffix, IntSuffix, Span, span, span_between};

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
#[error("lex error: {message}")]
#[diagnostic(code(wgsl::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

/// Result of scanning one numeric literal.
#[derive(Clone, Debug, PartialEq)]
enum Number {
    Int(i64, IntSuffix),
    Float(f64, FloatSuffix),
    Invalid(String),
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\x0B\x0C\u{85}\u{200E}\u{200F}\u{2028}\u{2029}]+")]
#[logos(skip r"//[^\n\r]*")]
enum RawToken {
    #[token("/*", block_comment)]
    BlockComment(bool),

    #[token("alias")]
    KwAlias,
    #[token("break")]
    KwBreak,
    #[token("case")]
    KwCase,
    #[token("const")]
    KwConst,
    #[token("const_assert")]
    KwConstAssert,
    #[token("continue")]
    KwContinue,
    #[token("continuing")]
    KwContinuing,
    #[token("default")]
    KwDefault,
    #[token("diagnostic")]
    KwDiagnostic,
    #[token("discard")]
    KwDiscard,
    #[token("else")]
    KwElse,
    #[token("enable")]
    KwEnable,
    #[token("false")]
    KwFalse,
    #[token("fn")]
    KwFn,
    #[token("for")]
    KwFor,
    #[token("if")]
    KwIf,
    #[token("let")]
    KwLet,
    #[token("loop")]
    KwLoop,
    #[token("override")]
    KwOverride,
    #[token("requires")]
    KwRequires,
    #[token("return")]
    KwReturn,
    #[token("struct")]
    KwStruct,
    #[token("switch")]
    KwSwitch,
    #[token("true")]
    KwTrue,
    #[token("var")]
    KwVar,
    #[token("while")]
    KwWhile,

    #[token("&")]
    Amp,
    #[token("&&")]
    AmpAmp,
    #[token("&=")]
    AmpEq,
    #[token("->")]
    Arrow,
    #[token("@")]
    At,
    #[token("/")]
    Slash,
    #[token("/=")]
    SlashEq,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEq,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token(">>")]
    Shr,
    #[token(">>=")]
    ShrEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token("<<")]
    Shl,
    #[token("<<=")]
    ShlEq,
    #[token("%")]
    Percent,
    #[token("%=")]
    PercentEq,
    #[token("-")]
    Minus,
    #[token("--")]
    MinusMinus,
    #[token("-=")]
    MinusEq,
    #[token(".")]
    Dot,
    #[token("+")]
    Plus,
    #[token("++")]
    PlusPlus,
    #[token("+=")]
    PlusEq,
    #[token("|")]
    Pipe,
    #[token("||")]
    PipePipe,
    #[token("|=")]
    PipeEq,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(";")]
    Semicolon,
    #[token("*")]
    Star,
    #[token("*=")]
    StarEq,
    #[token("~")]
    Tilde,
    #[token("_")]
    Underscore,
    #[token("^")]
    Caret,
    #[token("^=")]
    CaretEq,

    // Only the first character is matched here; `lex_number` scans the rest
    // by hand so malformed literals become a single error token.
    #[regex(r"[0-9]", lex_number)]
    #[regex(r"\.[0-9]", lex_number)]
    Number(Number),

    #[regex(r"\p{XID_Start}\p{XID_Continue}*", |lex| lex.slice().to_string())]
    #[regex(r"_\p{XID_Continue}+", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Skips a (possibly nested) block comment. Returns `false` when the input
/// ends before the comment is closed; the rest of the input is consumed.
fn block_comment(lex: &mut logos::Lexer<RawToken>) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1).copied()) {
            (b'/', Some(b'*')) => {
                depth += 1;
                i += 2;
            }
            (b'*', Some(b'/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    lex.bump(i);
                    return true;
                }
            }
            _ => i += 1,
        }
    }
    let len = bytes.len();
    lex.bump(len);
    false
}

fn lex_number(lex: &mut logos::Lexer<RawToken>) -> Number {
    let start = lex.span().start;
    let matched = lex.slice().len();
    let (len, number) = scan_number(&lex.source()[start..]);
    lex.bump(len.saturating_sub(matched));
    number
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Length in bytes of the run of identifier characters at the start of `s`.
fn ident_run(s: &str) -> usize {
    s.char_indices()
        .find(|&(_, c)| !is_ident_continue(c))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn scan_number(s: &str) -> (usize, Number) {
    let b = s.as_bytes();
    if b.len() >= 2 && b[0] == b'0' && (b[1] == b'x' || b[1] == b'X') {
        return scan_hex(s);
    }
    let at = |i: usize| b.get(i).copied().unwrap_or(0);

    let mut i = 0;
    while at(i).is_ascii_digit() {
        i += 1;
    }
    let int_digits = i;
    let mut is_float = false;

    if at(i) == b'.' {
        is_float = true;
        i += 1;
        while at(i).is_ascii_digit() {
            i += 1;
        }
    }

    if matches!(at(i), b'e' | b'E') {
        let mut j = i + 1;
        if matches!(at(j), b'+' | b'-') {
            j += 1;
        }
        if !at(j).is_ascii_digit() {
            let end = j + ident_run(&s[j..]);
            return (end, Number::Invalid("expected exponent digits in float literal".into()));
        }
        while at(j).is_ascii_digit() {
            j += 1;
        }
        is_float = true;
        i = j;
    }
    let body_end = i;

    let mut int_suffix = IntSuffix::None;
    let mut float_suffix = FloatSuffix::None;
    match at(i) {
        b'f' => {
            float_suffix = FloatSuffix::F;
            i += 1;
        }
        b'h' => {
            float_suffix = FloatSuffix::H;
            i += 1;
        }
        b'i' if !is_float => {
            int_suffix = IntSuffix::I;
            i += 1;
        }
        b'u' if !is_float => {
            int_suffix = IntSuffix::U;
            i += 1;
        }
        _ => {}
    }

    let trailing = ident_run(&s[i..]);
    if trailing > 0 {
        let bad = s[i..].chars().next().unwrap_or('?');
        return (
            i + trailing,
            Number::Invalid(format!("invalid character '{bad}' in numeric literal")),
        );
    }

    let text = &s[..body_end];
    if !is_float && int_digits > 1 && b[0] == b'0' {
        return (i, Number::Invalid("leading zeros are not allowed in integer literals".into()));
    }

    if is_float || float_suffix != FloatSuffix::None {
        let value = match text.parse::<f64>() {
            Ok(v) => v,
            Err(_) => return (i, Number::Invalid(format!("invalid float literal '{text}'"))),
        };
        return (i, check_float(value, float_suffix));
    }

    let value = match text.parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            return (i, Number::Invalid(unrepresentable(int_suffix_type(int_suffix))));
        }
    };
    (i, check_int(value, int_suffix))
}

fn scan_hex(s: &str) -> (usize, Number) {
    let b = s.as_bytes();
    let at = |i: usize| b.get(i).copied().unwrap_or(0);
    let mut i = 2;

    let int_start = i;
    while at(i).is_ascii_hexdigit() {
        i += 1;
    }
    let int_part = &s[int_start..i];

    let mut frac_part = "";
    let mut is_float = false;
    if at(i) == b'.' {
        is_float = true;
        i += 1;
        let frac_start = i;
        while at(i).is_ascii_hexdigit() {
            i += 1;
        }
        frac_part = &s[frac_start..i];
    }

    if int_part.is_empty() && frac_part.is_empty() {
        let end = i + ident_run(&s[i..]);
        return (end, Number::Invalid("hexadecimal literal has no digits".into()));
    }

    let mut exponent: i64 = 0;
    let mut has_exponent = false;
    if matches!(at(i), b'p' | b'P') {
        let mut j = i + 1;
        let negative = at(j) == b'-';
        if matches!(at(j), b'+' | b'-') {
            j += 1;
        }
        if !at(j).is_ascii_digit() {
            let end = j + ident_run(&s[j..]);
            return (end, Number::Invalid("expected exponent digits in hexadecimal float literal".into()));
        }
        let exp_start = j;
        while at(j).is_ascii_digit() {
            j += 1;
        }
        // Saturate; anything this large overflows every float type anyway.
        let magnitude = s[exp_start..j].parse::<i64>().unwrap_or(i64::MAX / 2);
        exponent = if negative { -magnitude } else { magnitude };
        has_exponent = true;
        is_float = true;
        i = j;
    }

    let mut int_suffix = IntSuffix::None;
    let mut float_suffix = FloatSuffix::None;
    match at(i) {
        b'f' if has_exponent => {
            float_suffix = FloatSuffix::F;
            i += 1;
        }
        b'h' if has_exponent => {
            float_suffix = FloatSuffix::H;
            i += 1;
        }
        b'i' if !is_float => {
            int_suffix = IntSuffix::I;
            i += 1;
        }
        b'u' if !is_float => {
            int_suffix = IntSuffix::U;
            i += 1;
        }
        _ => {}
    }

    let trailing = ident_run(&s[i..]);
    if trailing > 0 {
        let bad = s[i..].chars().next().unwrap_or('?');
        return (
            i + trailing,
            Number::Invalid(format!("invalid digit '{bad}' in hexadecimal literal")),
        );
    }

    if !is_float {
        return match u64::from_str_radix(int_part, 16) {
            Ok(v) => (i, check_int(v, int_suffix)),
            Err(_) => (i, Number::Invalid(unrepresentable(int_suffix_type(int_suffix)))),
        };
    }

    // Keep at most 15 significant hex digits; later integer digits scale the
    // exponent, later fraction digits are below f64 precision.
    let mut mantissa: u64 = 0;
    let mut significant = 0usize;
    let mut scale: i64 = 0;
    for c in int_part.chars() {
        let d = c.to_digit(16).unwrap_or(0) as u64;
        if significant < 15 {
            if mantissa != 0 || d != 0 {
                significant += 1;
            }
            mantissa = mantissa * 16 + d;
        } else {
            scale += 4;
        }
    }
    for c in frac_part.chars() {
        let d = c.to_digit(16).unwrap_or(0) as u64;
        if significant < 15 {
            if mantissa != 0 || d != 0 {
                significant += 1;
            }
            mantissa = mantissa * 16 + d;
            scale -= 4;
        }
    }
    let total = exponent.saturating_add(scale).clamp(-2000, 2000) as i32;
    let value = mantissa as f64 * 2f64.powi(total);
    (i, check_float(value, float_suffix))
}

fn int_suffix_type(suffix: IntSuffix) -> &'static str {
    match suffix {
        IntSuffix::None => "abstract-int",
        IntSuffix::I => "i32",
        IntSuffix::U => "u32",
    }
}

fn unrepresentable(ty: &str) -> String {
    format!("value cannot be represented as '{ty}'")
}

fn check_int(value: u64, suffix: IntSuffix) -> Number {
    let max = match suffix {
        IntSuffix::None => i64::MAX as u64,
        IntSuffix::I => i32::MAX as u64,
        IntSuffix::U => u32::MAX as u64,
    };
    if value > max {
        return Number::Invalid(unrepresentable(int_suffix_type(suffix)));
    }
    Number::Int(value as i64, suffix)
}

/// Smallest magnitude that no longer rounds to a finite `f16`.
const F16_OVERFLOW: f64 = 65520.0;

fn check_float(value: f64, suffix: FloatSuffix) -> Number {
    let (ok, ty) = match suffix {
        FloatSuffix::None => (value.is_finite(), "abstract-float"),
        FloatSuffix::F => (value.is_finite() && (value as f32).is_finite(), "f32"),
        FloatSuffix::H => (value.is_finite() && value.abs() < F16_OVERFLOW, "f16"),
    };
    if ok {
        Number::Float(value, suffix)
    } else {
        Number::Invalid(unrepresentable(ty))
    }
}

/// Lazy token stream over a source string.
///
/// The stream never fails: lexical problems come out as
/// [`TokenKind::Error`] tokens and lexing resumes after them. The final
/// token is always a single [`TokenKind::Eof`].
pub struct Lexer<'a> {
    src: &'a str,
    inner: logos::Lexer<'a, RawToken>,
    finished: bool,
}

pub fn tokenize(src: &str) -> Lexer<'_> {
    Lexer::new(src)
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            inner: RawToken::lexer(src),
            finished: false,
        }
    }

    /// Collects every token, failing on the first lexical error.
    pub fn lex(self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        for tok in self {
            if let TokenKind::Error(message) = tok.kind {
                return Err(LexError {
                    message,
                    span: tok.span,
                });
            }
            tokens.push(tok);
        }
        log::debug!("lexed {} tokens", tokens.len());
        Ok(tokens)
    }

    fn invalid_character(&mut self, start: usize, matched: usize) -> Token {
        let ch = self.src[start..].chars().next().unwrap_or('\u{FFFD}');
        let width = ch.len_utf8();
        // Resynchronise on the next character boundary.
        if width > matched {
            self.inner.bump(width - matched);
        }
        let message = if ch == '\0' {
            "null character found".to_string()
        } else {
            "invalid character found".to_string()
        };
        Token {
            kind: TokenKind::Error(message),
            span: span(start, width),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let Some(raw) = self.inner.next() else {
                if self.finished {
                    return None;
                }
                self.finished = true;
                return Some(Token {
                    kind: TokenKind::Eof,
                    span: span(self.src.len(), 0),
                });
            };
            let range = self.inner.span();
            let token_span = span_between(range.start, range.end);

            let kind = match raw {
                Err(()) => return Some(self.invalid_character(range.start, range.len())),
                Ok(RawToken::BlockComment(true)) => continue,
                Ok(RawToken::BlockComment(false)) => {
                    return Some(Token {
                        kind: TokenKind::Error("unterminated block comment".into()),
                        span: span(range.start, 2),
                    });
                }

                Ok(RawToken::KwAlias) => TokenKind::KwAlias,
                Ok(RawToken::KwBreak) => TokenKind::KwBreak,
                Ok(RawToken::KwCase) => TokenKind::KwCase,
                Ok(RawToken::KwConst) => TokenKind::KwConst,
                Ok(RawToken::KwConstAssert) => TokenKind::KwConstAssert,
                Ok(RawToken::KwContinue) => TokenKind::KwContinue,
                Ok(RawToken::KwContinuing) => TokenKind::KwContinuing,
                Ok(RawToken::KwDefault) => TokenKind::KwDefault,
                Ok(RawToken::KwDiagnostic) => TokenKind::KwDiagnostic,
                Ok(RawToken::KwDiscard) => TokenKind::KwDiscard,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwEnable) => TokenKind::KwEnable,
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,
                Ok(RawToken::KwFn) => TokenKind::KwFn,
                Ok(RawToken::KwFor) => TokenKind::KwFor,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwLoop) => TokenKind::KwLoop,
                Ok(RawToken::KwOverride) => TokenKind::KwOverride,
                Ok(RawToken::KwRequires) => TokenKind::KwRequires,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,
                Ok(RawToken::KwStruct) => TokenKind::KwStruct,
                Ok(RawToken::KwSwitch) => TokenKind::KwSwitch,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwVar) => TokenKind::KwVar,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,

                Ok(RawToken::Amp) => TokenKind::Amp,
                Ok(RawToken::AmpAmp) => TokenKind::AmpAmp,
                Ok(RawToken::AmpEq) => TokenKind::AmpEq,
                Ok(RawToken::Arrow) => TokenKind::Arrow,
                Ok(RawToken::At) => TokenKind::At,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::SlashEq) => TokenKind::SlashEq,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::BangEq) => TokenKind::BangEq,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::Gt) => TokenKind::Gt,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Shr) => TokenKind::Shr,
                Ok(RawToken::ShrEq) => TokenKind::ShrEq,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Shl) => TokenKind::Shl,
                Ok(RawToken::ShlEq) => TokenKind::ShlEq,
                Ok(RawToken::Percent) => TokenKind::Percent,
                Ok(RawToken::PercentEq) => TokenKind::PercentEq,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::MinusMinus) => TokenKind::MinusMinus,
                Ok(RawToken::MinusEq) => TokenKind::MinusEq,
                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::PlusPlus) => TokenKind::PlusPlus,
                Ok(RawToken::PlusEq) => TokenKind::PlusEq,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::PipePipe) => TokenKind::PipePipe,
                Ok(RawToken::PipeEq) => TokenKind::PipeEq,
                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::Semicolon) => TokenKind::Semicolon,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::StarEq) => TokenKind::StarEq,
                Ok(RawToken::Tilde) => TokenKind::Tilde,
                Ok(RawToken::Underscore) => TokenKind::Underscore,
                Ok(RawToken::Caret) => TokenKind::Caret,
                Ok(RawToken::CaretEq) => TokenKind::CaretEq,

                Ok(RawToken::Number(Number::Int(v, s))) => TokenKind::IntLiteral(v, s),
                Ok(RawToken::Number(Number::Float(v, s))) => TokenKind::FloatLiteral(v, s),
                Ok(RawToken::Number(Number::Invalid(msg))) => TokenKind::Error(msg),

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
            };
            return Some(Token {
                kind,
                span: token_span,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(src: &str) -> Number {
        scan_number(src).1
    }

    #[test]
    fn decimal_scanning_stops_at_punctuation() {
        assert_eq!(scan_number("12;"), (2, Number::Int(12, IntSuffix::None)));
        assert_eq!(scan_number("3u)"), (2, Number::Int(3, IntSuffix::U)));
        assert_eq!(scan_number("1.5e3f,"), (6, Number::Float(1500.0, FloatSuffix::F)));
    }

    #[test]
    fn hex_float_with_exponent() {
        assert_eq!(number("0x1p4"), Number::Float(16.0, FloatSuffix::None));
        assert_eq!(number("0x1.8p1"), Number::Float(3.0, FloatSuffix::None));
        assert_eq!(number("0xA.8"), Number::Float(10.5, FloatSuffix::None));
    }

    #[test]
    fn hex_f_is_a_digit_without_exponent() {
        assert_eq!(number("0x1f"), Number::Int(31, IntSuffix::None));
        assert_eq!(number("0x1p0f"), Number::Float(1.0, FloatSuffix::F));
    }

    #[test]
    fn malformed_literals_are_invalid() {
        assert!(matches!(number("1e+"), Number::Invalid(m) if m.contains("exponent")));
        assert!(matches!(number("0x"), Number::Invalid(m) if m.contains("no digits")));
        assert!(matches!(number("0x1g"), Number::Invalid(m) if m.contains("'g'")));
        assert!(matches!(number("0123"), Number::Invalid(m) if m.contains("leading zeros")));
        assert!(matches!(number("4294967296u"), Number::Invalid(m) if m.contains("'u32'")));
        assert!(matches!(number("1e400"), Number::Invalid(m) if m.contains("abstract-float")));
        assert!(matches!(number("1e39f"), Number::Invalid(m) if m.contains("'f32'")));
        assert!(matches!(number("70000h"), Number::Invalid(m) if m.contains("'f16'")));
    }

    #[test]
    fn leading_zero_floats_are_fine() {
        assert_eq!(number("00.5"), Number::Float(0.5, FloatSuffix::None));
        assert_eq!(number("0f"), Number::Float(0.0, FloatSuffix::F));
    }
}
