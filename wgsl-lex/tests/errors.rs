use wgsl_lex::{Lexer, TokenKind, tokenize};

fn errors(src: &str) -> Vec<(String, usize)> {
    tokenize(src)
        .filter_map(|t| match t.kind {
            TokenKind::Error(msg) => Some((msg, t.span.offset())),
            _ => None,
        })
        .collect()
}

#[test]
fn unterminated_block_comment_reports_opening_position() {
    let src = "fn f() {}\n/* outer /* inner */ never closed";
    let errs = errors(src);
    assert_eq!(errs, vec![("unterminated block comment".to_string(), 10)]);
}

#[test]
fn unterminated_comment_consumes_rest_of_input() {
    let kinds: Vec<_> = tokenize("a /* b c").map(|t| t.kind).collect();
    assert_eq!(kinds.len(), 3);
    assert!(matches!(kinds[2], TokenKind::Eof));
}

#[test]
fn invalid_character_resumes_lexing() {
    let kinds: Vec<_> = tokenize("a $ b").map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Ident("a".into()),
            TokenKind::Error("invalid character found".into()),
            TokenKind::Ident("b".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn invalid_multibyte_character_is_one_error() {
    let errs = errors("let x = 1 € 2;");
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].0, "invalid character found");
}

#[test]
fn malformed_literal_is_single_error_token() {
    let toks: Vec<_> = tokenize("let v = 0x1.0pz;").collect();
    let errs: Vec<_> = toks.iter().filter(|t| t.is_error()).collect();
    assert_eq!(errs.len(), 1);
    assert!(matches!(toks.last().map(|t| &t.kind), Some(TokenKind::Eof)));
}

#[test]
fn lex_reports_first_error() {
    let err = Lexer::new("var a = 99999999999999999999;").lex().unwrap_err();
    assert!(err.message.contains("abstract-int"));
    assert_eq!(err.span.offset(), 8);
}

#[test]
fn lexemes_slice_the_source() {
    let src = "const answer = 42u;";
    let lexemes: Vec<_> = tokenize(src).map(|t| t.lexeme(src).to_string()).collect();
    assert_eq!(lexemes, vec!["const", "answer", "=", "42u", ";", ""]);
}

#[test]
fn f16_literals_round_before_overflowing() {
    for src in ["65504.0h", "65519.0h", "0x1.ffcp15h", "-65519.9h"] {
        assert!(errors(src).is_empty(), "{src}");
    }
    for src in ["65520.0h", "1e5h", "0x1p16h"] {
        let errs = errors(src);
        assert_eq!(errs.len(), 1, "{src}");
        assert!(errs[0].0.contains("f16"), "{src}: {}", errs[0].0);
    }
}
