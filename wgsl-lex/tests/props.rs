use proptest::prelude::*;
use wgsl_lex::{TokenKind, tokenize};

proptest! {
    #[test]
    fn lexing_always_terminates_with_one_eof(src in "\\PC{0,64}") {
        let toks: Vec<_> = tokenize(&src).collect();
        let eofs = toks.iter().filter(|t| matches!(t.kind, TokenKind::Eof)).count();
        prop_assert_eq!(eofs, 1);
        prop_assert!(matches!(toks.last().map(|t| &t.kind), Some(TokenKind::Eof)));
    }

    #[test]
    fn token_spans_are_ordered_and_in_bounds(src in "[a-z0-9 +*/().;<>=_]{0,64}") {
        let mut last_end = 0usize;
        for tok in tokenize(&src) {
            let start = tok.span.offset();
            prop_assert!(start >= last_end);
            prop_assert!(start + tok.span.len() <= src.len());
            last_end = start + tok.span.len();
        }
    }
}
