// Parser core: token cursor, expectation helpers, error recovery.
// The grammar itself is split across the sibling modules.

use tml_ast::*;
use tml_diagnostics::{Diagnostic, Span};
use tml_lexer::{Token, TokenKind};

mod classes;
mod expressions;
mod items;
mod patterns;
mod statements;
mod types;

pub(crate) type ParseResult<T> = Result<T, Box<Diagnostic>>;

pub struct Parser<'a> {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
    pub(crate) source: &'a str,
    pub(crate) file_name: String,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Cleared while parsing `if`/`while`/`for`/`when` heads, where a brace
    /// starts the body instead of a struct literal.
    pub(crate) struct_lit_allowed: bool,
    /// Byte offset added to token spans; non-zero when parsing the inside
    /// of a string interpolation hole.
    pub(crate) span_base: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, source: &'a str, file_name: &str) -> Self {
        Self {
            tokens,
            current: 0,
            source,
            file_name: file_name.to_string(),
            diagnostics: Vec::new(),
            struct_lit_allowed: true,
            span_base: 0,
        }
    }

    /// Parse a whole module, recovering at declaration boundaries.
    pub fn parse_module(&mut self) -> (Module, Vec<Diagnostic>) {
        let mut decls = Vec::new();

        while !self.at_eof() {
            match self.parse_decl() {
                Ok(decl) => decls.push(decl),
                Err(diag) => {
                    self.diagnostics.push(*diag);
                    self.sync_to_decl();
                }
            }
        }

        let name = module_name_from_file(&self.file_name);
        (Module { name, decls }, std::mem::take(&mut self.diagnostics))
    }

    // ==================== Cursor helpers ====================

    pub(crate) fn peek(&self) -> &TokenKind {
        &self.tokens[self.current.min(self.tokens.len() - 1)].kind
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &TokenKind {
        let idx = (self.current + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    pub(crate) fn peek_token(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.at_eof() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Current token's span as a resolved diagnostic span.
    pub(crate) fn span_here(&self) -> Span {
        let tok = self.peek_token();
        self.resolve_span(&(tok.span.start + self.span_base..tok.span.end + self.span_base))
    }

    pub(crate) fn resolve_span(&self, span: &tml_ast::Span) -> Span {
        Span::from_source_range(&self.file_name, self.source, span.clone())
    }

    /// Byte span of the current token (with interpolation offset applied).
    pub(crate) fn byte_span(&self) -> tml_ast::Span {
        let tok = self.peek_token();
        tok.span.start + self.span_base..tok.span.end + self.span_base
    }

    pub(crate) fn prev_byte_span(&self) -> tml_ast::Span {
        let idx = self.current.saturating_sub(1);
        let tok = &self.tokens[idx];
        tok.span.start + self.span_base..tok.span.end + self.span_base
    }

    // ==================== Errors ====================

    pub(crate) fn error(&self, code: &str, message: impl Into<String>) -> Box<Diagnostic> {
        Box::new(Diagnostic::error(code, message, self.span_here()))
    }

    pub(crate) fn error_here(
        &self,
        code: &str,
        message: impl Into<String>,
        help: impl Into<String>,
    ) -> Box<Diagnostic> {
        Box::new(Diagnostic::error(code, message, self.span_here()).with_help(help))
    }

    /// `expect` with the canonical P-code for the missing token class.
    pub(crate) fn expect(&mut self, kind: &TokenKind, context: &str) -> ParseResult<()> {
        if self.eat(kind) {
            return Ok(());
        }
        let wanted = kind.fixed_lexeme().unwrap_or("token");
        let code = match kind {
            TokenKind::LBrace | TokenKind::RBrace => "P003",
            TokenKind::Colon => "P008",
            TokenKind::Comma => "P009",
            TokenKind::LParen => "P010",
            TokenKind::RParen => "P017",
            _ => "P001",
        };
        let mut diag = Diagnostic::error(
            code,
            format!(
                "expected `{}` {}, found {}",
                wanted,
                context,
                self.peek().describe()
            ),
            self.span_here(),
        );
        // A missing single-char token is usually a plain insertion.
        if matches!(
            kind,
            TokenKind::Comma | TokenKind::Colon | TokenKind::RParen | TokenKind::RBracket
        ) {
            diag = diag.with_fix(self.span_here(), wanted, format!("insert `{}`", wanted));
        }
        Err(Box::new(diag))
    }

    pub(crate) fn expect_ident(&mut self, context: &str) -> ParseResult<String> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(
                "P001",
                format!("expected identifier {}, found {}", context, self.peek().describe()),
            )),
        }
    }

    // ==================== Recovery ====================

    /// Skip to the next top-level declaration boundary.
    pub(crate) fn sync_to_decl(&mut self) {
        let mut brace_depth = 0usize;
        // Always make progress.
        if !self.at_eof() {
            match self.peek() {
                TokenKind::LBrace => brace_depth += 1,
                _ => {}
            }
            self.advance();
        }
        while !self.at_eof() {
            match self.peek() {
                TokenKind::Func
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Union
                | TokenKind::Class
                | TokenKind::Behavior
                | TokenKind::Impl
                | TokenKind::Type
                | TokenKind::Const
                | TokenKind::Use
                | TokenKind::Mod
                | TokenKind::Pub
                | TokenKind::At
                    if brace_depth == 0 =>
                {
                    break;
                }
                TokenKind::LBrace => {
                    brace_depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    if brace_depth > 0 {
                        brace_depth -= 1;
                        self.advance();
                        if brace_depth == 0 {
                            break;
                        }
                    } else {
                        self.advance();
                        break;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip within a block to the next statement boundary.
    pub(crate) fn sync_to_stmt(&mut self) {
        let mut depth = 0usize;
        if !self.at_eof() {
            if matches!(self.peek(), TokenKind::LBrace) {
                depth += 1;
            }
            self.advance();
        }
        while !self.at_eof() {
            match self.peek() {
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    break;
                }
                TokenKind::Let | TokenKind::Var | TokenKind::Return | TokenKind::RBrace
                    if depth == 0 =>
                {
                    break;
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Run a sub-parse with struct literals disabled (loop/if heads).
    pub(crate) fn without_struct_lit<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let saved = self.struct_lit_allowed;
        self.struct_lit_allowed = false;
        let result = f(self);
        self.struct_lit_allowed = saved;
        result
    }
}

fn module_name_from_file(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string()
}
