#![forbid(unsafe_code)]

//! WGSL parser: tokens to [`wgsl_ast::Module`].

mod error;
mod expr;
mod parser;
mod stmt;

pub use error::ParseError;
pub use parser::{MAX_ERRORS, Parser, is_reserved_word};

use wgsl_ast::{Diagnostics, ExprId, Module};
use wgsl_lex::Token;

/// Parses a token stream, recording every error in `diags`.
///
/// Returns the first error when parsing failed; the recovered module is
/// discarded in that case.
pub fn parse(
    tokens: impl IntoIterator<Item = Token>,
    diags: &mut Diagnostics,
) -> Result<Module, ParseError> {
    let (module, errors) = Parser::new(tokens).parse_module_with_recovery();
    for err in &errors {
        diags.error(err.span, err.message.clone());
    }
    match errors.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(module),
    }
}

/// Lexes and parses `src`, returning the module and all errors.
pub fn parse_source(src: &str) -> (Module, Vec<ParseError>) {
    Parser::new(wgsl_lex::tokenize(src)).parse_module_with_recovery()
}

/// Parses `src` as a single expression.
pub fn parse_expr_source(src: &str) -> Result<(Module, ExprId), ParseError> {
    Parser::new(wgsl_lex::tokenize(src)).parse_expression_eof()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgsl_ast::{BinaryOp, ExprKind, GlobalDecl, StmtKind};

    fn parse_ok(src: &str) -> Module {
        let (module, errors) = parse_source(src);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        module
    }

    #[test]
    fn parses_function_with_body() {
        let module = parse_ok("fn f(a: i32) -> i32 { let b = a + 1; return b; }");
        let (_, f) = module.functions().next().unwrap();
        assert_eq!(f.name.node, "f");
        assert_eq!(f.params.len(), 1);
        assert_eq!(f.body.stmts.len(), 2);
    }

    #[test]
    fn precedence_multiplies_before_adding() {
        let (module, e) = parse_expr_source("1 + 2 * 3").unwrap();
        let ExprKind::Binary { op, rhs, .. } = &module.expr(e).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            module.expr(*rhs).kind,
            ExprKind::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn less_than_without_close_is_comparison() {
        let (module, e) = parse_expr_source("a < b").unwrap();
        assert!(matches!(
            module.expr(e).kind,
            ExprKind::Binary { op: BinaryOp::Lt, .. }
        ));
    }

    #[test]
    fn nested_template_closes_on_shift_token() {
        let module = parse_ok("var<private> v: array<vec3<f32>>;");
        let GlobalDecl::Var(var) = module.decls.iter().next().unwrap().1 else {
            panic!("expected var");
        };
        let ty = module.expr(var.ty.unwrap());
        let ExprKind::Ident(t) = &ty.kind else { panic!() };
        assert_eq!(t.ident.node, "array");
        assert_eq!(t.template_args.len(), 1);
    }

    #[test]
    fn call_statement_and_phony() {
        let module = parse_ok("fn f() { g(1, 2,); _ = h(); }");
        let (_, f) = module.functions().next().unwrap();
        assert!(matches!(module.stmt(f.body.stmts[0]).kind, StmtKind::Call(_)));
        assert!(matches!(
            module.stmt(f.body.stmts[1]).kind,
            StmtKind::Assign(ref a) if a.lhs.is_none()
        ));
    }

    #[test]
    fn parse_reports_into_diagnostics() {
        let mut diags = Diagnostics::for_source("t.wgsl", "fn f( {}");
        let tokens = wgsl_lex::tokenize("fn f( {}");
        assert!(parse(tokens, &mut diags).is_err());
        assert!(diags.has_errors());
    }
}
