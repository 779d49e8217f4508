#![forbid(unsafe_code)]

use wgsl_ast::{
    AssignStmt, BinaryOp, Block, CaseSelector, Continuing, ExprKind, ForStmt, IfStmt,
    IncrementOp, IncrementStmt, LocalDecl, LocalKind, LoopStmt, Stmt, StmtId, StmtKind,
    SwitchClause, SwitchStmt, WhileStmt,
};
use wgsl_lex::TokenKind;

use crate::error::ParseError;
use crate::parser::Parser;

fn compound_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEq => BinaryOp::Add,
        TokenKind::MinusEq => BinaryOp::Sub,
        TokenKind::StarEq => BinaryOp::Mul,
        TokenKind::SlashEq => BinaryOp::Div,
        TokenKind::PercentEq => BinaryOp::Mod,
        TokenKind::AmpEq => BinaryOp::And,
        TokenKind::PipeEq => BinaryOp::Or,
        TokenKind::CaretEq => BinaryOp::Xor,
        TokenKind::ShlEq => BinaryOp::Shl,
        TokenKind::ShrEq => BinaryOp::Shr,
        _ => return None,
    })
}

impl Parser {
    pub(crate) fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.nested(|p| {
            let start = p.start_offset();
            p.expect(TokenKind::LBrace, "block statement")?;
            let stmts = p.parse_statements_until(|_| false);
            p.expect(TokenKind::RBrace, "block statement")?;
            Ok(Block {
                span: p.span_from(start),
                stmts,
            })
        })
    }

    /// Parses statements up to the closing `}` of the enclosing braces, or
    /// up to a token `stop` accepts. Errors are recorded and parsing resumes
    /// at the next statement.
    fn parse_statements_until(&mut self, stop: impl Fn(&Parser) -> bool) -> Vec<StmtId> {
        let depth = self.brace_depth;
        let mut stmts = Vec::new();
        while !self.stopped
            && !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof)
            && !stop(self)
        {
            let before = self.idx;
            match self.parse_statement() {
                Ok(Some(stmt)) => stmts.push(stmt),
                Ok(None) => {}
                Err(err) => {
                    self.record_error(err);
                    self.recover_in_block(depth);
                    if self.idx == before && !self.at(&TokenKind::RBrace) && !self.at_eof() {
                        self.advance();
                    }
                }
            }
        }
        stmts
    }

    fn append_stmt(&mut self, start: usize, kind: StmtKind) -> StmtId {
        let span = self.span_from(start);
        self.module.stmts.append(Stmt { span, kind })
    }

    /// Returns `None` for the empty statement `;`.
    fn parse_statement(&mut self) -> Result<Option<StmtId>, ParseError> {
        self.nested(|p| p.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> Result<Option<StmtId>, ParseError> {
        let start = self.start_offset();
        let kind = match self.peek_kind() {
            TokenKind::Semicolon => {
                self.advance();
                return Ok(None);
            }
            TokenKind::At => {
                // Statement attributes only carry diagnostic filters, which
                // have no effect on the produced tree.
                let attrs = self.parse_attributes()?;
                log::trace!("ignoring {} statement attributes", attrs.len());
                return self.parse_statement();
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::KwReturn => {
                self.advance();
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenKind::Semicolon, "return statement")?;
                StmtKind::Return(value)
            }
            TokenKind::KwIf => self.parse_if()?,
            TokenKind::KwSwitch => self.parse_switch()?,
            TokenKind::KwLoop => self.parse_loop()?,
            TokenKind::KwFor => self.parse_for()?,
            TokenKind::KwWhile => {
                self.advance();
                let cond = self.parse_expression()?;
                let body = self.parse_block()?;
                StmtKind::While(WhileStmt { cond, body })
            }
            TokenKind::KwBreak => {
                let tok = self.advance();
                if self.at(&TokenKind::KwIf) {
                    return Err(ParseError::new(
                        "'break if' must be the last statement in a continuing block",
                        tok.span,
                    ));
                }
                self.expect(TokenKind::Semicolon, "break statement")?;
                StmtKind::Break
            }
            TokenKind::KwContinue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "continue statement")?;
                StmtKind::Continue
            }
            TokenKind::KwDiscard => {
                self.advance();
                self.expect(TokenKind::Semicolon, "discard statement")?;
                StmtKind::Discard
            }
            TokenKind::KwConstAssert => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "const assertion")?;
                StmtKind::ConstAssert(expr)
            }
            _ => {
                let kind = self.parse_simple_statement()?;
                self.expect(TokenKind::Semicolon, "statement")?;
                kind
            }
        };
        Ok(Some(self.append_stmt(start, kind)))
    }

    /// Declarations, assignments, increments and calls: the statements that
    /// may also appear in a `for` header.
    fn parse_simple_statement(&mut self) -> Result<StmtKind, ParseError> {
        match self.peek_kind() {
            TokenKind::KwVar => self.parse_local_decl(LocalKind::Var),
            TokenKind::KwLet => self.parse_local_decl(LocalKind::Let),
            TokenKind::KwConst => self.parse_local_decl(LocalKind::Const),
            TokenKind::Underscore => {
                self.advance();
                self.expect(TokenKind::Eq, "phony assignment")?;
                let rhs = self.parse_expression()?;
                Ok(StmtKind::Assign(AssignStmt {
                    lhs: None,
                    op: None,
                    rhs,
                }))
            }
            _ => {
                let lhs = self.parse_unary()?;
                let next = self.peek_kind().clone();
                if let TokenKind::Eq = next {
                    self.advance();
                    let rhs = self.parse_expression()?;
                    return Ok(StmtKind::Assign(AssignStmt {
                        lhs: Some(lhs),
                        op: None,
                        rhs,
                    }));
                }
                if let Some(op) = compound_op(&next) {
                    self.advance();
                    let rhs = self.parse_expression()?;
                    return Ok(StmtKind::Assign(AssignStmt {
                        lhs: Some(lhs),
                        op: Some(op),
                        rhs,
                    }));
                }
                match next {
                    TokenKind::PlusPlus | TokenKind::MinusMinus => {
                        self.advance();
                        let op = if next == TokenKind::PlusPlus {
                            IncrementOp::Increment
                        } else {
                            IncrementOp::Decrement
                        };
                        Ok(StmtKind::Increment(IncrementStmt { lhs, op }))
                    }
                    _ if matches!(self.module.exprs[lhs].kind, ExprKind::Call { .. }) => {
                        Ok(StmtKind::Call(lhs))
                    }
                    _ => Err(self.error_here("'='", Some("assignment"))),
                }
            }
        }
    }

    fn parse_local_decl(&mut self, kind: LocalKind) -> Result<StmtKind, ParseError> {
        let use_ = match kind {
            LocalKind::Var => "variable declaration",
            LocalKind::Let => "let declaration",
            LocalKind::Const => "const declaration",
        };
        self.advance();
        let template_args = if kind == LocalKind::Var && self.at(&TokenKind::Lt) {
            self.parse_template_list(use_)?
        } else {
            Vec::new()
        };
        let name = self.expect_ident(use_)?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type(use_)?)
        } else {
            None
        };
        let init = if kind == LocalKind::Var {
            if self.eat(&TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            }
        } else {
            self.expect(TokenKind::Eq, use_)?;
            Some(self.parse_expression()?)
        };
        Ok(StmtKind::Decl(LocalDecl {
            kind,
            name,
            template_args,
            ty,
            init,
        }))
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::KwIf, "if statement")?;
        let cond = self.parse_expression()?;
        let then_block = self.parse_block()?;
        let else_stmt = if self.eat(&TokenKind::KwElse) {
            let start = self.start_offset();
            let kind = if self.at(&TokenKind::KwIf) {
                self.nested(|p| p.parse_if())?
            } else {
                StmtKind::Block(self.parse_block()?)
            };
            Some(self.append_stmt(start, kind))
        } else {
            None
        };
        Ok(StmtKind::If(IfStmt {
            cond,
            then_block,
            else_stmt,
        }))
    }

    fn parse_switch(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::KwSwitch, "switch statement")?;
        let selector = self.parse_expression()?;
        self.parse_attributes()?;
        self.expect(TokenKind::LBrace, "switch statement")?;
        let mut clauses = Vec::new();
        loop {
            let start = self.start_offset();
            let selectors = match self.peek_kind() {
                TokenKind::KwCase => {
                    self.advance();
                    self.parse_case_selectors()?
                }
                TokenKind::KwDefault => {
                    let tok = self.advance();
                    vec![CaseSelector::Default(tok.span)]
                }
                TokenKind::RBrace => break,
                _ => return Err(self.error_here("'case', 'default' or '}'", Some("switch statement"))),
            };
            self.eat(&TokenKind::Colon);
            let body = self.parse_block()?;
            clauses.push(SwitchClause {
                span: self.span_from(start),
                selectors,
                body,
            });
        }
        self.expect(TokenKind::RBrace, "switch statement")?;
        Ok(StmtKind::Switch(SwitchStmt { selector, clauses }))
    }

    fn parse_case_selectors(&mut self) -> Result<Vec<CaseSelector>, ParseError> {
        let mut selectors = Vec::new();
        loop {
            if self.at(&TokenKind::KwDefault) {
                let tok = self.advance();
                selectors.push(CaseSelector::Default(tok.span));
            } else {
                selectors.push(CaseSelector::Expr(self.parse_expression()?));
            }
            if !self.eat(&TokenKind::Comma)
                || self.at(&TokenKind::Colon)
                || self.at(&TokenKind::LBrace)
            {
                return Ok(selectors);
            }
        }
    }

    fn parse_loop(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::KwLoop, "loop statement")?;
        self.parse_attributes()?;
        let start = self.start_offset();
        self.expect(TokenKind::LBrace, "loop statement")?;
        let stmts = self.parse_statements_until(|p| p.at(&TokenKind::KwContinuing));
        let body = Block {
            span: self.span_from(start),
            stmts,
        };
        let continuing = if self.at(&TokenKind::KwContinuing) {
            Some(self.parse_continuing()?)
        } else {
            None
        };
        self.expect(TokenKind::RBrace, "loop statement")?;
        Ok(StmtKind::Loop(LoopStmt { body, continuing }))
    }

    fn parse_continuing(&mut self) -> Result<Continuing, ParseError> {
        let start = self.start_offset();
        self.expect(TokenKind::KwContinuing, "continuing block")?;
        let body_start = self.start_offset();
        self.expect(TokenKind::LBrace, "continuing block")?;
        let is_break_if = |p: &Parser| {
            p.at(&TokenKind::KwBreak) && matches!(p.peek_kind_n(1), TokenKind::KwIf)
        };
        let stmts = self.parse_statements_until(is_break_if);
        let mut break_if = None;
        if is_break_if(self) {
            self.advance();
            self.advance();
            break_if = Some(self.parse_expression()?);
            self.expect(TokenKind::Semicolon, "break-if statement")?;
            if !self.at(&TokenKind::RBrace) {
                return Err(ParseError::new(
                    "'break if' must be the last statement in a continuing block",
                    self.peek().span,
                ));
            }
        }
        self.expect(TokenKind::RBrace, "continuing block")?;
        let body = Block {
            span: self.span_from(body_start),
            stmts,
        };
        Ok(Continuing {
            span: self.span_from(start),
            body,
            break_if,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::KwFor, "for loop")?;
        self.expect(TokenKind::LParen, "for loop")?;
        let init = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            let start = self.start_offset();
            let kind = self.parse_simple_statement()?;
            Some(self.append_stmt(start, kind))
        };
        self.expect(TokenKind::Semicolon, "initializer in for loop")?;
        let cond = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "condition in for loop")?;
        let update = if self.at(&TokenKind::RParen) {
            None
        } else {
            let start = self.start_offset();
            let kind = self.parse_simple_statement()?;
            if matches!(kind, StmtKind::Decl(_)) {
                return Err(ParseError::new(
                    "for-loop update must not be a declaration",
                    self.span_from(start),
                ));
            }
            Some(self.append_stmt(start, kind))
        };
        self.expect(TokenKind::RParen, "for loop")?;
        let body = self.parse_block()?;
        Ok(StmtKind::For(ForStmt {
            init,
            cond,
            update,
            body,
        }))
    }
}
