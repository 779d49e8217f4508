#![forbid(unsafe_code)]

//! WGSL tokenizer.

mod lexer;
mod token;

pub use lexer::{LexError, Lexer, tokenize};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;
    use wgsl_ast::{FloatSuffix, IntSuffix};

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("fn main_1 var"),
            vec![
                TokenKind::KwFn,
                TokenKind::Ident("main_1".into()),
                TokenKind::KwVar,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lone_underscore_is_its_own_token() {
        assert_eq!(
            kinds("_ _a"),
            vec![TokenKind::Underscore, TokenKind::Ident("_a".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn literals_carry_suffixes() {
        assert_eq!(
            kinds("1 2u 3i 4.0 5f .5h"),
            vec![
                TokenKind::IntLiteral(1, IntSuffix::None),
                TokenKind::IntLiteral(2, IntSuffix::U),
                TokenKind::IntLiteral(3, IntSuffix::I),
                TokenKind::FloatLiteral(4.0, FloatSuffix::None),
                TokenKind::FloatLiteral(5.0, FloatSuffix::F),
                TokenKind::FloatLiteral(0.5, FloatSuffix::H),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn nested_block_comments_are_skipped() {
        assert_eq!(
            kinds("a /* x /* y */ z */ b // tail\nc"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Ident("c".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unicode_identifiers() {
        assert_eq!(
            kinds("δέλτα 日本"),
            vec![
                TokenKind::Ident("δέλτα".into()),
                TokenKind::Ident("日本".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn eof_is_emitted_once() {
        let mut lexer = tokenize("");
        assert_eq!(lexer.next().map(|t| t.kind), Some(TokenKind::Eof));
        assert_eq!(lexer.next(), None);
    }
}
