// Statement and block parsing. Statements are newline-delimited with
// optional semicolons; blocks recover at statement boundaries.

use super::{ParseResult, Parser};
use tml_ast::*;
use tml_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_block(&mut self) -> ParseResult<Block> {
        let start = self.byte_span().start;
        self.expect(&TokenKind::LBrace, "to begin block")?;
        let mut stmts = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(diag) => {
                    self.diagnostics.push(*diag);
                    self.sync_to_stmt();
                }
            }
        }

        self.expect(&TokenKind::RBrace, "to close block")?;
        let end = self.prev_byte_span().end;
        Ok(Block {
            stmts,
            span: start..end,
        })
    }

    pub(crate) fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek() {
            TokenKind::Let => self.parse_let(),
            TokenKind::Var => self.parse_var(),
            TokenKind::Const => {
                let decl = self.parse_const(false)?;
                Ok(Stmt::Decl(Box::new(Decl::Const(decl))))
            }
            // Nested declarations inside function bodies.
            TokenKind::Func | TokenKind::Struct | TokenKind::Enum => {
                let decl = self.parse_decl()?;
                Ok(Stmt::Decl(Box::new(decl)))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.eat(&TokenKind::Semicolon);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_let(&mut self) -> ParseResult<Stmt> {
        let start = self.byte_span().start;
        self.advance(); // let
        let pattern = self.parse_pattern()?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq, "in let binding")?;
        let value = self.parse_expr()?;

        if self.eat(&TokenKind::Else) {
            let else_block = self.parse_block()?;
            self.eat(&TokenKind::Semicolon);
            let end = self.prev_byte_span().end;
            return Ok(Stmt::LetElse {
                pattern,
                ty,
                value,
                else_block,
                span: start..end,
            });
        }

        self.eat(&TokenKind::Semicolon);
        let end = self.prev_byte_span().end;
        Ok(Stmt::Let {
            pattern,
            ty,
            value,
            span: start..end,
        })
    }

    fn parse_var(&mut self) -> ParseResult<Stmt> {
        let start = self.byte_span().start;
        self.advance(); // var
        let name = self.expect_ident("for variable name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq, "in var binding")?;
        let value = self.parse_expr()?;
        self.eat(&TokenKind::Semicolon);
        let end = self.prev_byte_span().end;
        Ok(Stmt::Var {
            name,
            ty,
            value,
            span: start..end,
        })
    }
}
