#![forbid(unsafe_code)]

use std::mem;

use wgsl_ast::{BinaryOp, ExprId, ExprKind, Literal, TemplatedIdent, UnaryOp, join, span};
use wgsl_lex::TokenKind;

use crate::error::ParseError;
use crate::parser::Parser;

fn bitwise_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Amp => Some(BinaryOp::And),
        TokenKind::Pipe => Some(BinaryOp::Or),
        TokenKind::Caret => Some(BinaryOp::Xor),
        _ => None,
    }
}

impl Parser {
    /// expression:
    ///   unary (bitwise_op unary)+
    ///   relational (('&&' relational)* | ('||' relational)*)
    pub(crate) fn parse_expression(&mut self) -> Result<ExprId, ParseError> {
        self.nested(|p| p.parse_expression_inner())
    }

    fn parse_expression_inner(&mut self) -> Result<ExprId, ParseError> {
        let lhs = self.parse_unary()?;

        if let Some(op) = bitwise_op(self.peek_kind()) {
            let mut acc = lhs;
            while let Some(next) = bitwise_op(self.peek_kind()) {
                if next != op {
                    return Err(ParseError::new(
                        format!(
                            "mixing '{}' and '{}' requires parenthesis",
                            op.symbol(),
                            next.symbol()
                        ),
                        self.peek().span,
                    ));
                }
                self.advance();
                let rhs = self.parse_unary()?;
                acc = self.binary(op, acc, rhs);
            }
            return Ok(acc);
        }

        let lhs = self.parse_relational_rest(lhs)?;
        // `&&` and `||` end a candidate template list.
        if self.in_template > 0 {
            return Ok(lhs);
        }
        let (op, other) = match self.peek_kind() {
            TokenKind::AmpAmp => (BinaryOp::LogicalAnd, TokenKind::PipePipe),
            TokenKind::PipePipe => (BinaryOp::LogicalOr, TokenKind::AmpAmp),
            _ => return Ok(lhs),
        };
        let op_token = self.peek().kind.clone();
        let mut acc = lhs;
        while self.eat(&op_token) {
            let unary = self.parse_unary()?;
            let rhs = self.parse_relational_rest(unary)?;
            acc = self.binary(op, acc, rhs);
        }
        if self.at(&other) {
            return Err(ParseError::new(
                format!(
                    "mixing '{}' and '{}' requires parenthesis",
                    op.symbol(),
                    other.spelling().unwrap_or_default()
                ),
                self.peek().span,
            ));
        }
        Ok(acc)
    }

    fn relational_op(&self) -> Option<BinaryOp> {
        match self.peek_kind() {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::BangEq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Gt if self.in_template == 0 => Some(BinaryOp::Gt),
            TokenKind::Ge if self.in_template == 0 => Some(BinaryOp::Ge),
            _ => None,
        }
    }

    /// relational: shift (relational_op shift)?
    fn parse_relational_rest(&mut self, unary: ExprId) -> Result<ExprId, ParseError> {
        let lhs = self.parse_shift_rest(unary)?;
        let Some(op) = self.relational_op() else {
            return Ok(lhs);
        };
        self.advance();
        let rhs_unary = self.parse_unary()?;
        let rhs = self.parse_shift_rest(rhs_unary)?;
        let expr = self.binary(op, lhs, rhs);
        if self.relational_op().is_some() {
            return Err(ParseError::new(
                "chained comparisons are not allowed; add parentheses",
                self.peek().span,
            ));
        }
        Ok(expr)
    }

    /// shift: unary ('<<' | '>>') unary | additive
    fn parse_shift_rest(&mut self, unary: ExprId) -> Result<ExprId, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Shl => Some(BinaryOp::Shl),
            TokenKind::Shr if self.in_template == 0 => Some(BinaryOp::Shr),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_unary()?;
            return Ok(self.binary(op, unary, rhs));
        }
        self.parse_additive_rest(unary)
    }

    fn parse_additive_rest(&mut self, unary: ExprId) -> Result<ExprId, ParseError> {
        let mut acc = self.parse_multiplicative_rest(unary)?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(acc),
            };
            self.advance();
            let rhs_unary = self.parse_unary()?;
            let rhs = self.parse_multiplicative_rest(rhs_unary)?;
            acc = self.binary(op, acc, rhs);
        }
    }

    fn parse_multiplicative_rest(&mut self, unary: ExprId) -> Result<ExprId, ParseError> {
        let mut acc = unary;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(acc),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            acc = self.binary(op, acc, rhs);
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let span = join(self.module.exprs[lhs].span, self.module.exprs[rhs].span);
        self.append_expr(span, ExprKind::Binary { op, lhs, rhs })
    }

    pub(crate) fn parse_unary(&mut self) -> Result<ExprId, ParseError> {
        self.nested(|p| p.parse_unary_inner())
    }

    fn parse_unary_inner(&mut self) -> Result<ExprId, ParseError> {
        let start = self.start_offset();
        let (op, doubled) = match self.peek_kind() {
            TokenKind::Minus => (UnaryOp::Negate, false),
            TokenKind::MinusMinus => (UnaryOp::Negate, true),
            TokenKind::Bang => (UnaryOp::Not, false),
            TokenKind::Tilde => (UnaryOp::Complement, false),
            TokenKind::Star => (UnaryOp::Deref, false),
            TokenKind::Amp => (UnaryOp::AddressOf, false),
            TokenKind::AmpAmp => (UnaryOp::AddressOf, true),
            _ => {
                let primary = self.parse_primary()?;
                return self.parse_postfix(primary);
            }
        };
        self.advance();
        let operand = self.parse_unary()?;
        // `--x` and `&&x` are two prefix operators written as one token.
        let operand = if doubled {
            let inner = span(start + 1, self.last_end - start - 1);
            self.append_expr(inner, ExprKind::Unary { op, expr: operand })
        } else {
            operand
        };
        Ok(self.append_expr(self.span_from(start), ExprKind::Unary { op, expr: operand }))
    }

    fn parse_postfix(&mut self, mut base: ExprId) -> Result<ExprId, ParseError> {
        let start = self.module.exprs[base].span.offset();
        loop {
            match self.peek_kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let saved = mem::replace(&mut self.in_template, 0);
                    let index = self.parse_expression();
                    self.in_template = saved;
                    let index = index?;
                    self.expect(TokenKind::RBracket, "index accessor")?;
                    base = self.append_expr(self.span_from(start), ExprKind::Index { base, index });
                }
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_ident("member accessor")?;
                    base = self.append_expr(self.span_from(start), ExprKind::Member { base, member });
                }
                _ => return Ok(base),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<ExprId, ParseError> {
        let start = self.start_offset();
        let literal = match self.peek_kind().clone() {
            TokenKind::KwTrue => Some(Literal::Bool(true)),
            TokenKind::KwFalse => Some(Literal::Bool(false)),
            TokenKind::IntLiteral(value, suffix) => Some(Literal::Int { value, suffix }),
            TokenKind::FloatLiteral(value, suffix) => Some(Literal::Float { value, suffix }),
            _ => None,
        };
        if let Some(lit) = literal {
            let tok = self.advance();
            return Ok(self.append_expr(tok.span, ExprKind::Literal(lit)));
        }

        match self.peek_kind() {
            TokenKind::LParen => {
                self.advance();
                let saved = mem::replace(&mut self.in_template, 0);
                let inner = self.parse_expression();
                self.in_template = saved;
                let inner = inner?;
                self.expect(TokenKind::RParen, "parenthesized expression")?;
                self.module.exprs[inner].span = self.span_from(start);
                Ok(inner)
            }
            TokenKind::Ident(name)
                if name == "bitcast" && matches!(self.peek_kind_n(1), TokenKind::Lt) =>
            {
                self.parse_bitcast()
            }
            TokenKind::Ident(_) => {
                let ident = self.expect_ident("expression")?;
                let template_args = if self.at_template_start() {
                    self.parse_template_list("template argument list")?
                } else {
                    Vec::new()
                };
                if self.at(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    return Ok(self.append_expr(
                        self.span_from(start),
                        ExprKind::Call {
                            callee: TemplatedIdent {
                                ident,
                                template_args,
                            },
                            args,
                        },
                    ));
                }
                Ok(self.ident_expr(ident, template_args, self.span_from(start)))
            }
            _ => Err(self.error_here("expression", None)),
        }
    }

    fn parse_bitcast(&mut self) -> Result<ExprId, ParseError> {
        let start = self.start_offset();
        self.advance();
        let args = self.parse_template_list("bitcast")?;
        let &[ty] = args.as_slice() else {
            return Err(ParseError::new(
                "bitcast expects exactly one template argument",
                self.span_from(start),
            ));
        };
        self.expect(TokenKind::LParen, "bitcast")?;
        let saved = mem::replace(&mut self.in_template, 0);
        let expr = self.parse_expression();
        self.in_template = saved;
        let expr = expr?;
        self.expect(TokenKind::RParen, "bitcast")?;
        Ok(self.append_expr(self.span_from(start), ExprKind::Bitcast { ty, expr }))
    }

    fn parse_call_args(&mut self) -> Result<Vec<ExprId>, ParseError> {
        self.expect(TokenKind::LParen, "function call")?;
        let saved = mem::replace(&mut self.in_template, 0);
        let args = self.parse_expression_list(&TokenKind::RParen);
        self.in_template = saved;
        let args = args?;
        self.expect(TokenKind::RParen, "function call")?;
        Ok(args)
    }

    fn at_template_close(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Gt | TokenKind::Ge | TokenKind::Shr | TokenKind::ShrEq
        )
    }

    /// `< expr (, expr)* [,] >` with the current token on `<`.
    pub(crate) fn parse_template_list(&mut self, use_: &str) -> Result<Vec<ExprId>, ParseError> {
        self.expect(TokenKind::Lt, use_)?;
        self.in_template += 1;
        let args = self.parse_template_args();
        self.in_template -= 1;
        let args = args?;
        self.expect_template_close(use_)?;
        Ok(args)
    }

    fn parse_template_args(&mut self) -> Result<Vec<ExprId>, ParseError> {
        let mut args = Vec::new();
        loop {
            args.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) || self.at_template_close() {
                return Ok(args);
            }
        }
    }

    fn expect_template_close(&mut self, use_: &str) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::Gt => {
                self.advance();
            }
            TokenKind::Shr => self.split_current(TokenKind::Gt),
            TokenKind::Ge => self.split_current(TokenKind::Eq),
            TokenKind::ShrEq => self.split_current(TokenKind::Ge),
            _ => return Err(self.error_here("'>'", Some(use_))),
        }
        Ok(())
    }

    /// type_specifier: ident template_list?
    pub(crate) fn parse_type(&mut self, use_: &str) -> Result<ExprId, ParseError> {
        let start = self.start_offset();
        let ident = self.expect_ident(use_)?;
        let template_args = if self.at(&TokenKind::Lt) {
            self.parse_template_list(use_)?
        } else {
            Vec::new()
        };
        Ok(self.ident_expr(ident, template_args, self.span_from(start)))
    }
}
