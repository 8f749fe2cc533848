// Expression parsing. Precedence ladder, lowest first:
//   assignment (right-assoc) ; ternary ?: ; ranges `to`/`through` ;
//   `or` ; `and` ; `|` ; `^` ; `&` ; == != ; < > <= >= ; << >> ;
//   + - ; * / % ; `as` ; `is` ; prefix unary ; postfix ; primary.

use super::{ParseResult, Parser};
use tml_ast::*;
use tml_diagnostics::Diagnostic;
use tml_lexer::{StrPayload, TemplateSegment, TokenKind};

impl<'a> Parser<'a> {
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> ParseResult<Expr> {
        let target = self.parse_ternary()?;

        let op = match self.peek() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::PercentEq => AssignOp::Rem,
            TokenKind::AmpEq => AssignOp::BitAnd,
            TokenKind::PipeEq => AssignOp::BitOr,
            TokenKind::CaretEq => AssignOp::BitXor,
            TokenKind::ShlEq => AssignOp::Shl,
            TokenKind::ShrEq => AssignOp::Shr,
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assign()?;
        let span = target.span.start..value.span.end;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_ternary(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_range()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_ternary()?;
        self.expect(&TokenKind::Colon, "in ternary expression")?;
        let else_expr = self.parse_ternary()?;
        let span = cond.span.start..else_expr.span.end;
        Ok(Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn parse_range(&mut self) -> ParseResult<Expr> {
        let start = self.parse_or()?;
        let inclusive = match self.peek() {
            TokenKind::To => false,
            TokenKind::Through => true,
            _ => return Ok(start),
        };
        self.advance();
        let end = self.parse_or()?;
        let span = start.span.start..end.span.end;
        Ok(Expr::new(
            ExprKind::Range {
                start: Box::new(start),
                end: Box::new(end),
                inclusive,
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_bitor()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_bitor()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(&TokenKind::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = binary(BinaryOp::BitOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(&TokenKind::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = binary(BinaryOp::BitXor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::Amp) {
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::BitAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_cast()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_cast()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cast(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_is()?;
        while self.eat(&TokenKind::As) {
            let ty = self.parse_type()?;
            let span = expr.span.start..ty.span().end;
            expr = Expr::new(
                ExprKind::Cast {
                    expr: Box::new(expr),
                    ty,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_is(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;
        while self.eat(&TokenKind::Is) {
            let ty = self.parse_type()?;
            let span = expr.span.start..ty.span().end;
            expr = Expr::new(
                ExprKind::Is {
                    expr: Box::new(expr),
                    ty,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Star => UnaryOp::Deref,
            TokenKind::PlusPlus => UnaryOp::PreInc,
            TokenKind::MinusMinus => UnaryOp::PreDec,
            TokenKind::Ref => {
                self.advance();
                let mutable = self.eat(&TokenKind::Mut);
                let operand = self.parse_unary()?;
                let span = start..operand.span.end;
                return Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Ref { mutable },
                        operand: Box::new(operand),
                    },
                    span,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = start..operand.span.end;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                TokenKind::LParen => {
                    let args = self.parse_call_args()?;
                    let span = expr.span.start..self.prev_byte_span().end;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            type_args: Vec::new(),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    // `callee[T, U](args)` is a generic call; everything
                    // else is indexing. Disambiguate by speculative parse.
                    let checkpoint = self.current;
                    if let Some(type_args) = self.speculate_type_args() {
                        if self.check(&TokenKind::LParen) {
                            let args = self.parse_call_args()?;
                            let span = expr.span.start..self.prev_byte_span().end;
                            expr = Expr::new(
                                ExprKind::Call {
                                    callee: Box::new(expr),
                                    type_args,
                                    args,
                                },
                                span,
                            );
                            continue;
                        }
                    }
                    self.current = checkpoint;
                    self.advance(); // [
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "to close index expression")?;
                    let span = expr.span.start..self.prev_byte_span().end;
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    if self.eat(&TokenKind::Await) {
                        let span = expr.span.start..self.prev_byte_span().end;
                        expr = Expr::new(ExprKind::Await(Box::new(expr)), span);
                        continue;
                    }
                    let name = self.expect_ident("after `.`")?;
                    // Optional `[T]` before the call parentheses.
                    let mut type_args = Vec::new();
                    if self.check(&TokenKind::LBracket) {
                        let checkpoint = self.current;
                        match self.speculate_type_args() {
                            Some(args) if self.check(&TokenKind::LParen) => type_args = args,
                            _ => self.current = checkpoint,
                        }
                    }
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        let span = expr.span.start..self.prev_byte_span().end;
                        expr = Expr::new(
                            ExprKind::MethodCall {
                                receiver: Box::new(expr),
                                method: name,
                                type_args,
                                args,
                            },
                            span,
                        );
                    } else {
                        let span = expr.span.start..self.prev_byte_span().end;
                        expr = Expr::new(
                            ExprKind::Field {
                                object: Box::new(expr),
                                field: name,
                            },
                            span,
                        );
                    }
                }
                TokenKind::Bang => {
                    self.advance();
                    let span = expr.span.start..self.prev_byte_span().end;
                    expr = Expr::new(ExprKind::Try(Box::new(expr)), span);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen, "to begin arguments")?;
        let mut args = Vec::new();
        let saved = self.struct_lit_allowed;
        self.struct_lit_allowed = true;
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            match self.parse_expr() {
                Ok(arg) => args.push(arg),
                Err(e) => {
                    self.struct_lit_allowed = saved;
                    return Err(e);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.struct_lit_allowed = saved;
        self.expect(&TokenKind::RParen, "to close arguments")?;
        Ok(args)
    }

    /// Try to parse `[T, U]`; restores nothing on failure (caller keeps a
    /// checkpoint). No diagnostics escape a speculative parse.
    fn speculate_type_args(&mut self) -> Option<Vec<TypeExpr>> {
        if !self.eat(&TokenKind::LBracket) {
            return None;
        }
        let mut args = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            match self.parse_type() {
                Ok(ty) => args.push(ty),
                Err(_) => return None,
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if self.eat(&TokenKind::RBracket) && !args.is_empty() {
            Some(args)
        } else {
            None
        }
    }

    // ==================== Primary ====================

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        match self.peek().clone() {
            TokenKind::IntLiteral(value) => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                let suffix = value.suffix.map(convert_suffix);
                // Integer tokens with a float suffix are float literals.
                if matches!(suffix, Some(LitSuffix::F32) | Some(LitSuffix::F64)) {
                    return Ok(Expr::new(
                        ExprKind::Literal(Literal::Float {
                            value: value.value as f64,
                            suffix,
                        }),
                        span,
                    ));
                }
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Int {
                        value: value.value,
                        suffix,
                    }),
                    span,
                ))
            }
            TokenKind::FloatLiteral(value) => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Float {
                        value: value.value,
                        suffix: value.suffix.map(convert_suffix),
                    }),
                    span,
                ))
            }
            TokenKind::StrLiteral(payload) => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                match payload {
                    StrPayload::Plain(text) => {
                        Ok(Expr::new(ExprKind::Literal(Literal::Str(text)), span))
                    }
                    StrPayload::Template(segments) => self.parse_interpolated(segments, span),
                }
            }
            TokenKind::RawStrLiteral(text) => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Literal(Literal::Str(text)), span))
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Literal(Literal::Char(c)), span))
            }
            TokenKind::True | TokenKind::False => {
                let value = matches!(self.peek(), TokenKind::True);
                self.advance();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(value)), span))
            }
            TokenKind::Null => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Literal(Literal::Null), span))
            }
            TokenKind::Ident(_) => self.parse_path_expr(),
            TokenKind::LParen => self.parse_paren_expr(),
            TokenKind::LBracket => self.parse_array_expr(),
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                let span = block.span.clone();
                Ok(Expr::new(ExprKind::Block(block), span))
            }
            TokenKind::If => self.parse_if_expr(),
            TokenKind::When => self.parse_when_expr(),
            TokenKind::Loop | TokenKind::While | TokenKind::For => self.parse_loop_expr(None),
            TokenKind::Do | TokenKind::Move => self.parse_closure(),
            TokenKind::New => self.parse_new_expr(),
            TokenKind::Base => {
                self.advance();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Base, span))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.expr_follows() {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Return(value), span))
            }
            TokenKind::Break => {
                self.advance();
                let label = self.eat_label();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Break { label }, span))
            }
            TokenKind::Continue => {
                self.advance();
                let label = self.eat_label();
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Continue { label }, span))
            }
            _ => Err(self.error_here(
                "P004",
                format!("expected an expression, found {}", self.peek().describe()),
                "expressions start with a literal, identifier, `(`, `[`, or a keyword like `if`, `when`, `new`, `do`",
            )),
        }
    }

    fn expr_follows(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::RBrace
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::Eof
        )
    }

    /// A bare identifier after `break`/`continue` is a loop label.
    fn eat_label(&mut self) -> Option<String> {
        if let TokenKind::Ident(name) = self.peek() {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        }
    }

    /// Identifier, `::` path, or struct literal.
    fn parse_path_expr(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        let mut segments = vec![self.expect_ident("for expression")?];

        // `label: loop { … }` at expression position.
        if segments.len() == 1
            && self.check(&TokenKind::Colon)
            && matches!(
                self.peek_nth(1),
                TokenKind::Loop | TokenKind::While | TokenKind::For
            )
        {
            self.advance(); // :
            return self.parse_loop_expr(Some(segments.remove(0)));
        }

        while self.eat(&TokenKind::ColonColon) {
            segments.push(self.expect_ident("after `::`")?);
        }

        let path_span = start..self.prev_byte_span().end;

        if segments.len() == 1 && !self.check(&TokenKind::LBrace) {
            return Ok(Expr::new(
                ExprKind::Ident(segments.pop().unwrap_or_default()),
                path_span,
            ));
        }

        // Struct literal: `Point { x: 1, y: 2 }` / `Point { ..base }`.
        if self.check(&TokenKind::LBrace) && self.struct_lit_allowed && starts_type_name(&segments)
        {
            self.advance(); // {
            let mut fields = Vec::new();
            let mut base = None;
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                if self.eat(&TokenKind::DotDot) {
                    base = Some(Box::new(self.parse_expr()?));
                    break;
                }
                let fname = self.expect_ident("for struct literal field")?;
                let value = if self.eat(&TokenKind::Colon) {
                    self.parse_expr()?
                } else {
                    // Shorthand `Point { x, y }`.
                    Expr::new(ExprKind::Ident(fname.clone()), self.prev_byte_span())
                };
                fields.push((fname, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "to close struct literal")?;
            let span = start..self.prev_byte_span().end;
            return Ok(Expr::new(
                ExprKind::StructLit {
                    path: PathRef {
                        segments,
                        type_args: Vec::new(),
                        span: path_span,
                    },
                    fields,
                    base,
                },
                span,
            ));
        }

        if segments.len() == 1 {
            return Ok(Expr::new(
                ExprKind::Ident(segments.pop().unwrap_or_default()),
                path_span,
            ));
        }

        Ok(Expr::new(
            ExprKind::Path(PathRef {
                segments,
                type_args: Vec::new(),
                span: path_span.clone(),
            }),
            path_span,
        ))
    }

    fn parse_paren_expr(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        self.advance(); // (
        if self.eat(&TokenKind::RParen) {
            // Unit-valued tuple.
            let span = start..self.prev_byte_span().end;
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), span));
        }
        let saved = self.struct_lit_allowed;
        self.struct_lit_allowed = true;
        let first = self.parse_expr();
        self.struct_lit_allowed = saved;
        let first = first?;

        if self.eat(&TokenKind::Comma) {
            let mut elems = vec![first];
            while !self.check(&TokenKind::RParen) && !self.at_eof() {
                elems.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "to close tuple")?;
            let span = start..self.prev_byte_span().end;
            return Ok(Expr::new(ExprKind::Tuple(elems), span));
        }

        self.expect(&TokenKind::RParen, "to close parenthesized expression")?;
        Ok(first)
    }

    fn parse_array_expr(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        self.advance(); // [
        if self.eat(&TokenKind::RBracket) {
            let span = start..self.prev_byte_span().end;
            return Ok(Expr::new(ExprKind::Array(Vec::new()), span));
        }
        let first = self.parse_expr()?;
        if self.eat(&TokenKind::Semicolon) {
            let count = self.parse_expr()?;
            self.expect(&TokenKind::RBracket, "to close array repeat")?;
            let span = start..self.prev_byte_span().end;
            return Ok(Expr::new(
                ExprKind::ArrayRepeat {
                    elem: Box::new(first),
                    count: Box::new(count),
                },
                span,
            ));
        }
        let mut elems = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            elems.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::RBracket, "to close array literal")?;
        let span = start..self.prev_byte_span().end;
        Ok(Expr::new(ExprKind::Array(elems), span))
    }

    fn parse_if_expr(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        self.advance(); // if
        let cond = self.without_struct_lit(|p| p.parse_expr())?;
        let then_block = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Box::new(self.parse_if_expr()?))
            } else {
                let block = self.parse_block()?;
                let span = block.span.clone();
                Some(Box::new(Expr::new(ExprKind::Block(block), span)))
            }
        } else {
            None
        };
        let span = start..self.prev_byte_span().end;
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_block,
                else_branch,
            },
            span,
        ))
    }

    fn parse_when_expr(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        self.advance(); // when
        let scrutinee = self.without_struct_lit(|p| p.parse_expr())?;
        self.expect(&TokenKind::LBrace, "to begin when arms")?;

        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let arm_start = self.byte_span().start;
            let pattern = self.parse_pattern()?;
            let guard = if self.eat(&TokenKind::If) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            if !self.eat(&TokenKind::FatArrow) {
                // `->` instead of `=>` is the classic slip.
                let mut diag = Diagnostic::error(
                    "P048",
                    format!(
                        "expected `=>` after when pattern, found {}",
                        self.peek().describe()
                    ),
                    self.span_here(),
                );
                if self.check(&TokenKind::Arrow) {
                    diag = diag.with_fix(self.span_here(), "=>", "use `=>` for when arms");
                }
                return Err(Box::new(diag));
            }
            let body = self.parse_expr()?;
            let arm_end = self.prev_byte_span().end;
            arms.push(WhenArm {
                pattern,
                guard,
                body,
                span: arm_start..arm_end,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "to close when expression")?;
        let span = start..self.prev_byte_span().end;
        Ok(Expr::new(
            ExprKind::When {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            span,
        ))
    }

    fn parse_loop_expr(&mut self, label: Option<String>) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        match self.peek() {
            TokenKind::Loop => {
                self.advance();
                let body = self.parse_block()?;
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(ExprKind::Loop { label, body }, span))
            }
            TokenKind::While => {
                self.advance();
                let cond = self.without_struct_lit(|p| p.parse_expr())?;
                let body = self.parse_block()?;
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(
                    ExprKind::While {
                        label,
                        cond: Box::new(cond),
                        body,
                    },
                    span,
                ))
            }
            TokenKind::For => {
                self.advance();
                let pattern = self.parse_pattern()?;
                self.expect(&TokenKind::In, "in for loop")?;
                let iter = self.without_struct_lit(|p| p.parse_expr())?;
                let body = self.parse_block()?;
                let span = start..self.prev_byte_span().end;
                Ok(Expr::new(
                    ExprKind::For {
                        label,
                        pattern,
                        iter: Box::new(iter),
                        body,
                    },
                    span,
                ))
            }
            _ => Err(self.error("P001", "expected `loop`, `while`, or `for`")),
        }
    }

    /// `do(params) { body }`, `move do(params) { body }`,
    /// `do(params) -> T { body }`.
    fn parse_closure(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        let is_move = self.eat(&TokenKind::Move);
        if !self.eat(&TokenKind::Do) {
            return Err(self.error_here(
                "P064",
                "expected `do` to begin closure",
                "closures look like `do(x) { x + 1 }` or `move do(x) { x + 1 }`",
            ));
        }

        self.expect(&TokenKind::LParen, "to begin closure parameters")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            let pattern = self.parse_pattern()?;
            if !matches!(pattern, Pattern::Ident { .. } | Pattern::Wildcard { .. }) {
                return Err(Box::new(Diagnostic::error(
                    "P065",
                    "closure parameters must be plain identifiers",
                    self.resolve_span(&pattern.span()),
                )));
            }
            let ty = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push((pattern, ty));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "to close closure parameters")?;

        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body_block = self.parse_block()?;
        let body_span = body_block.span.clone();
        let span = start..self.prev_byte_span().end;
        Ok(Expr::new(
            ExprKind::Closure {
                is_move,
                params,
                return_type,
                body: Box::new(Expr::new(ExprKind::Block(body_block), body_span)),
            },
            span,
        ))
    }

    fn parse_new_expr(&mut self) -> ParseResult<Expr> {
        let start = self.byte_span().start;
        self.advance(); // new
        let path_start = self.byte_span().start;
        let mut segments = vec![self.expect_ident("for class name after `new`")?];
        while self.eat(&TokenKind::ColonColon) {
            segments.push(self.expect_ident("after `::`")?);
        }
        let mut type_args = Vec::new();
        if self.check(&TokenKind::LBracket) {
            let checkpoint = self.current;
            match self.speculate_type_args() {
                Some(args) => type_args = args,
                None => self.current = checkpoint,
            }
        }
        let path_span = path_start..self.prev_byte_span().end;
        let args = self.parse_call_args()?;
        let span = start..self.prev_byte_span().end;
        Ok(Expr::new(
            ExprKind::New {
                class: PathRef {
                    segments,
                    type_args,
                    span: path_span,
                },
                args,
            },
            span,
        ))
    }

    /// Re-parse the expression holes of an interpolated string.
    fn parse_interpolated(
        &mut self,
        segments: Vec<TemplateSegment>,
        span: tml_ast::Span,
    ) -> ParseResult<Expr> {
        let mut parts = Vec::new();
        for segment in segments {
            match segment {
                TemplateSegment::Text(text) => parts.push(InterpPart::Text(text)),
                TemplateSegment::Expr { source, offset } => {
                    if source.trim().is_empty() {
                        return Err(Box::new(Diagnostic::error(
                            "P037",
                            "interpolation `${}` is missing its expression",
                            self.resolve_span(&(offset..offset + source.len().max(1))),
                        )));
                    }
                    let (tokens, lex_diags) = tml_lexer::tokenize(&source, &self.file_name);
                    if let Some(first) = lex_diags.into_iter().next() {
                        return Err(Box::new(first));
                    }
                    let mut sub = Parser::new(tokens, self.source, &self.file_name);
                    sub.span_base = offset;
                    let expr = sub.parse_expr()?;
                    if !sub.at_eof() {
                        return Err(Box::new(Diagnostic::error(
                            "P037",
                            "interpolation hole contains trailing tokens",
                            sub.span_here(),
                        )));
                    }
                    parts.push(InterpPart::Expr(Box::new(expr)));
                }
            }
        }
        Ok(Expr::new(ExprKind::InterpolatedString(parts), span))
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.start..rhs.span.end;
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn convert_suffix(suffix: tml_lexer::NumSuffix) -> LitSuffix {
    use tml_lexer::NumSuffix as S;
    match suffix {
        S::I8 => LitSuffix::I8,
        S::I16 => LitSuffix::I16,
        S::I32 => LitSuffix::I32,
        S::I64 => LitSuffix::I64,
        S::I128 => LitSuffix::I128,
        S::U8 => LitSuffix::U8,
        S::U16 => LitSuffix::U16,
        S::U32 => LitSuffix::U32,
        S::U64 => LitSuffix::U64,
        S::U128 => LitSuffix::U128,
        S::F32 => LitSuffix::F32,
        S::F64 => LitSuffix::F64,
    }
}

/// Struct literals require a capitalized head segment, so `point { … }`
/// in statement position stays an identifier followed by a block.
fn starts_type_name(segments: &[String]) -> bool {
    segments
        .last()
        .and_then(|s| s.chars().next())
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
}
