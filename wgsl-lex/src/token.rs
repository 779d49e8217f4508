#![forbid(unsafe_code)]

use std::fmt;

use wgsl_ast::{FloatSuffix, IntSuffix, Span};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// The source text this token was lexed from.
    pub fn lexeme<'s>(&self, src: &'s str) -> &'s str {
        src.get(self.span.offset()..self.span.offset() + self.span.len())
            .unwrap_or("")
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwAlias,
    KwBreak,
    KwCase,
    KwConst,
    KwConstAssert,
    KwContinue,
    KwContinuing,
    KwDefault,
    KwDiagnostic,
    KwDiscard,
    KwElse,
    KwEnable,
    KwFalse,
    KwFn,
    KwFor,
    KwIf,
    KwLet,
    KwLoop,
    KwOverride,
    KwRequires,
    KwReturn,
    KwStruct,
    KwSwitch,
    KwTrue,
    KwVar,
    KwWhile,

    // Punctuation
    Amp,
    AmpAmp,
    AmpEq,
    Arrow,
    At,
    Slash,
    SlashEq,
    Bang,
    BangEq,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Eq,
    EqEq,
    Gt,
    Ge,
    Shr,
    ShrEq,
    Lt,
    Le,
    Shl,
    ShlEq,
    Percent,
    PercentEq,
    Minus,
    MinusMinus,
    MinusEq,
    Dot,
    Plus,
    PlusPlus,
    PlusEq,
    Pipe,
    PipePipe,
    PipeEq,
    LParen,
    RParen,
    Semicolon,
    Star,
    StarEq,
    Tilde,
    Underscore,
    Caret,
    CaretEq,

    // Literals
    IntLiteral(i64, IntSuffix),
    FloatLiteral(f64, FloatSuffix),

    Ident(String),

    /// A lexical error; the message describes what went wrong.
    Error(String),

    Eof,
}

impl TokenKind {
    /// Source spelling of fixed tokens, used in "expected ..." messages.
    pub fn spelling(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::KwAlias => "alias",
            TokenKind::KwBreak => "break",
            TokenKind::KwCase => "case",
            TokenKind::KwConst => "const",
            TokenKind::KwConstAssert => "const_assert",
            TokenKind::KwContinue => "continue",
            TokenKind::KwContinuing => "continuing",
            TokenKind::KwDefault => "default",
            TokenKind::KwDiagnostic => "diagnostic",
            TokenKind::KwDiscard => "discard",
            TokenKind::KwElse => "else",
            TokenKind::KwEnable => "enable",
            TokenKind::KwFalse => "false",
            TokenKind::KwFn => "fn",
            TokenKind::KwFor => "for",
            TokenKind::KwIf => "if",
            TokenKind::KwLet => "let",
            TokenKind::KwLoop => "loop",
            TokenKind::KwOverride => "override",
            TokenKind::KwRequires => "requires",
            TokenKind::KwReturn => "return",
            TokenKind::KwStruct => "struct",
            TokenKind::KwSwitch => "switch",
            TokenKind::KwTrue => "true",
            TokenKind::KwVar => "var",
            TokenKind::KwWhile => "while",
            TokenKind::Amp => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::AmpEq => "&=",
            TokenKind::Arrow => "->",
            TokenKind::At => "@",
            TokenKind::Slash => "/",
            TokenKind::SlashEq => "/=",
            TokenKind::Bang => "!",
            TokenKind::BangEq => "!=",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Shr => ">>",
            TokenKind::ShrEq => ">>=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Shl => "<<",
            TokenKind::ShlEq => "<<=",
            TokenKind::Percent => "%",
            TokenKind::PercentEq => "%=",
            TokenKind::Minus => "-",
            TokenKind::MinusMinus => "--",
            TokenKind::MinusEq => "-=",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::PlusPlus => "++",
            TokenKind::PlusEq => "+=",
            TokenKind::Pipe => "|",
            TokenKind::PipePipe => "||",
            TokenKind::PipeEq => "|=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Semicolon => ";",
            TokenKind::Star => "*",
            TokenKind::StarEq => "*=",
            TokenKind::Tilde => "~",
            TokenKind::Underscore => "_",
            TokenKind::Caret => "^",
            TokenKind::CaretEq => "^=",
            TokenKind::IntLiteral(..)
            | TokenKind::FloatLiteral(..)
            | TokenKind::Ident(_)
            | TokenKind::Error(_)
            | TokenKind::Eof => return None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::KwAlias
                | TokenKind::KwBreak
                | TokenKind::KwCase
                | TokenKind::KwConst
                | TokenKind::KwConstAssert
                | TokenKind::KwContinue
                | TokenKind::KwContinuing
                | TokenKind::KwDefault
                | TokenKind::KwDiagnostic
                | TokenKind::KwDiscard
                | TokenKind::KwElse
                | TokenKind::KwEnable
                | TokenKind::KwFalse
                | TokenKind::KwFn
                | TokenKind::KwFor
                | TokenKind::KwIf
                | TokenKind::KwLet
                | TokenKind::KwLoop
                | TokenKind::KwOverride
                | TokenKind::KwRequires
                | TokenKind::KwReturn
                | TokenKind::KwStruct
                | TokenKind::KwSwitch
                | TokenKind::KwTrue
                | TokenKind::KwVar
                | TokenKind::KwWhile
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.spelling() {
            return write!(f, "'{s}'");
        }
        match self {
            TokenKind::IntLiteral(..) => f.write_str("integer literal"),
            TokenKind::FloatLiteral(..) => f.write_str("float literal"),
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::Error(msg) => write!(f, "invalid token ({msg})"),
            _ => f.write_str("end of file"),
        }
    }
}
