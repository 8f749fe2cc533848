// Top-level declaration parsing: functions, structs, enums, unions,
// behaviors, impl blocks, type aliases, consts, use imports, modules.
// Classes live in classes.rs.

use super::{ParseResult, Parser};
use tml_ast::*;
use tml_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_decl(&mut self) -> ParseResult<Decl> {
        let decorators = self.parse_decorators()?;
        let is_pub = self.eat(&TokenKind::Pub);

        match self.peek() {
            TokenKind::Func | TokenKind::Async | TokenKind::Lowlevel => {
                Ok(Decl::Func(self.parse_func(decorators, is_pub)?))
            }
            TokenKind::Struct => Ok(Decl::Struct(self.parse_struct(decorators, is_pub)?)),
            TokenKind::Enum => Ok(Decl::Enum(self.parse_enum(decorators, is_pub)?)),
            TokenKind::Union => Ok(Decl::Union(self.parse_union(decorators, is_pub)?)),
            TokenKind::Class => Ok(Decl::Class(self.parse_class(decorators, is_pub)?)),
            TokenKind::Behavior => Ok(Decl::Behavior(self.parse_behavior(decorators, is_pub)?)),
            TokenKind::Impl => Ok(Decl::Impl(self.parse_impl()?)),
            TokenKind::Type => Ok(Decl::TypeAlias(self.parse_type_alias(is_pub)?)),
            TokenKind::Const => Ok(Decl::Const(self.parse_const(is_pub)?)),
            TokenKind::Use => Ok(Decl::Use(self.parse_use()?)),
            TokenKind::Mod => Ok(Decl::Mod(self.parse_mod(is_pub)?)),
            _ => Err(self.error(
                "P001",
                format!(
                    "expected a declaration (func, struct, enum, union, class, behavior, impl, type, const, use, mod), found {}",
                    self.peek().describe()
                ),
            )),
        }
    }

    pub(crate) fn parse_decorators(&mut self) -> ParseResult<Vec<Decorator>> {
        let mut decorators = Vec::new();
        while self.check(&TokenKind::At) {
            let start = self.byte_span().start;
            self.advance();
            let name = self.expect_ident("after `@`")?;
            let mut args = Vec::new();
            if self.eat(&TokenKind::LParen) {
                while !self.check(&TokenKind::RParen) && !self.at_eof() {
                    args.push(self.parse_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "to close decorator arguments")?;
            }
            let end = self.prev_byte_span().end;
            decorators.push(Decorator {
                name,
                args,
                span: start..end,
            });
        }
        Ok(decorators)
    }

    pub(crate) fn parse_func(
        &mut self,
        decorators: Vec<Decorator>,
        is_pub: bool,
    ) -> ParseResult<FuncDecl> {
        let start = self.byte_span().start;
        let is_async = self.eat(&TokenKind::Async);
        let is_lowlevel = self.eat(&TokenKind::Lowlevel);
        self.expect(&TokenKind::Func, "to begin function declaration")?;
        let name = self.expect_ident("for function name")?;
        let generics = self.parse_generic_params()?;
        let params = self.parse_params()?;
        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let where_clause = self.parse_where_clause()?;
        let body = if self.check(&TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            self.eat(&TokenKind::Semicolon);
            None
        };
        let end = self.prev_byte_span().end;

        Ok(FuncDecl {
            decorators,
            is_pub,
            is_async,
            is_lowlevel,
            is_static: false,
            is_virtual: false,
            is_override: false,
            name,
            generics,
            params,
            return_type,
            where_clause,
            body,
            span: start..end,
        })
    }

    pub(crate) fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(&TokenKind::LParen, "to begin parameter list")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            let start = self.byte_span().start;
            // Bare `this` receiver has no type annotation.
            if let TokenKind::Ident(name) = self.peek() {
                if name == "this" && params.is_empty() {
                    let span = self.byte_span();
                    self.advance();
                    params.push(Param {
                        pattern: Pattern::Ident {
                            name: "this".to_string(),
                            mutable: false,
                            ty: None,
                            span: span.clone(),
                        },
                        ty: TypeExpr::Infer { span: span.clone() },
                        span,
                    });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    continue;
                }
            }
            let pattern = self.parse_pattern()?;
            self.expect(&TokenKind::Colon, "after parameter name")?;
            let ty = self.parse_type()?;
            let end = self.prev_byte_span().end;
            params.push(Param {
                pattern,
                ty,
                span: start..end,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "to close parameter list")?;
        Ok(params)
    }

    /// `[T]`, `[T: Bound]`, `[T: A + B, U]`. Empty when absent.
    pub(crate) fn parse_generic_params(&mut self) -> ParseResult<Vec<GenericParam>> {
        if !self.check(&TokenKind::LBracket) {
            return Ok(Vec::new());
        }
        self.advance();
        let mut params = Vec::new();
        loop {
            let start = self.byte_span().start;
            let name = self.expect_ident("for type parameter")?;
            let mut bounds = Vec::new();
            if self.eat(&TokenKind::Colon) {
                loop {
                    bounds.push(self.expect_ident("for behavior bound")?);
                    if !self.eat(&TokenKind::Plus) {
                        break;
                    }
                }
            }
            let end = self.prev_byte_span().end;
            params.push(GenericParam {
                name,
                bounds,
                span: start..end,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "to close type parameters")?;
        Ok(params)
    }

    pub(crate) fn parse_where_clause(&mut self) -> ParseResult<Vec<WherePredicate>> {
        if !self.eat(&TokenKind::Where) {
            return Ok(Vec::new());
        }
        let mut predicates = Vec::new();
        loop {
            let start = self.byte_span().start;
            let param = self.expect_ident("for where-clause type parameter")?;
            self.expect(&TokenKind::Colon, "in where clause")?;
            let mut bounds = Vec::new();
            loop {
                bounds.push(self.expect_ident("for behavior bound")?);
                if !self.eat(&TokenKind::Plus) {
                    break;
                }
            }
            let end = self.prev_byte_span().end;
            predicates.push(WherePredicate {
                param,
                bounds,
                span: start..end,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(predicates)
    }

    fn parse_struct(&mut self, decorators: Vec<Decorator>, is_pub: bool) -> ParseResult<StructDecl> {
        let start = self.byte_span().start;
        self.advance(); // struct
        let name = self.expect_ident("for struct name")?;
        let generics = self.parse_generic_params()?;
        let where_clause = self.parse_where_clause()?;
        self.expect(&TokenKind::LBrace, "to begin struct body")?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            fields.push(self.parse_field_def()?);
            if !self.eat(&TokenKind::Comma) {
                self.eat(&TokenKind::Semicolon);
            }
        }
        self.expect(&TokenKind::RBrace, "to close struct body")?;
        let end = self.prev_byte_span().end;

        Ok(StructDecl {
            decorators,
            is_pub,
            name,
            generics,
            where_clause,
            fields,
            span: start..end,
        })
    }

    pub(crate) fn parse_field_def(&mut self) -> ParseResult<FieldDef> {
        let start = self.byte_span().start;
        let is_pub = self.eat(&TokenKind::Pub);
        let name = self.expect_ident("for field name")?;
        if !self.check(&TokenKind::Colon) {
            return Err(self.error_here(
                "P045",
                format!("field `{}` is missing its type", name),
                "write `name: Type`",
            ));
        }
        self.advance();
        let ty = self.parse_type()?;
        let default = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let end = self.prev_byte_span().end;
        Ok(FieldDef {
            is_pub,
            name,
            ty,
            default,
            span: start..end,
        })
    }

    fn parse_enum(&mut self, decorators: Vec<Decorator>, is_pub: bool) -> ParseResult<EnumDecl> {
        let start = self.byte_span().start;
        self.advance(); // enum
        let name = self.expect_ident("for enum name")?;
        let generics = self.parse_generic_params()?;
        let where_clause = self.parse_where_clause()?;
        self.expect(&TokenKind::LBrace, "to begin enum body")?;

        let mut variants = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let vstart = self.byte_span().start;
            let vname = self.expect_ident("for enum variant")?;
            let mut payload = Vec::new();
            if self.eat(&TokenKind::LParen) {
                while !self.check(&TokenKind::RParen) && !self.at_eof() {
                    payload.push(self.parse_type()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "to close variant payload")?;
            }
            let vend = self.prev_byte_span().end;
            variants.push(VariantDef {
                name: vname,
                payload,
                span: vstart..vend,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "to close enum body")?;
        let end = self.prev_byte_span().end;

        Ok(EnumDecl {
            decorators,
            is_pub,
            name,
            generics,
            where_clause,
            variants,
            span: start..end,
        })
    }

    fn parse_union(&mut self, decorators: Vec<Decorator>, is_pub: bool) -> ParseResult<UnionDecl> {
        let start = self.byte_span().start;
        self.advance(); // union
        let name = self.expect_ident("for union name")?;
        self.expect(&TokenKind::LBrace, "to begin union body")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            fields.push(self.parse_field_def()?);
            if !self.eat(&TokenKind::Comma) {
                self.eat(&TokenKind::Semicolon);
            }
        }
        self.expect(&TokenKind::RBrace, "to close union body")?;
        let end = self.prev_byte_span().end;
        Ok(UnionDecl {
            decorators,
            is_pub,
            name,
            fields,
            span: start..end,
        })
    }

    fn parse_behavior(
        &mut self,
        decorators: Vec<Decorator>,
        is_pub: bool,
    ) -> ParseResult<BehaviorDecl> {
        let start = self.byte_span().start;
        self.advance(); // behavior
        let name = self.expect_ident("for behavior name")?;
        let generics = self.parse_generic_params()?;

        let mut super_behaviors = Vec::new();
        if self.eat(&TokenKind::Colon) {
            loop {
                super_behaviors.push(self.expect_ident("for super-behavior")?);
                if !self.eat(&TokenKind::Plus) {
                    break;
                }
            }
        }

        self.expect(&TokenKind::LBrace, "to begin behavior body")?;
        let mut assoc_types = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.eat(&TokenKind::Type) {
                assoc_types.push(self.expect_ident("for associated type")?);
                self.eat(&TokenKind::Semicolon);
                continue;
            }
            let method_decorators = self.parse_decorators()?;
            methods.push(self.parse_func(method_decorators, false)?);
        }
        self.expect(&TokenKind::RBrace, "to close behavior body")?;
        let end = self.prev_byte_span().end;

        Ok(BehaviorDecl {
            decorators,
            is_pub,
            name,
            generics,
            super_behaviors,
            assoc_types,
            methods,
            span: start..end,
        })
    }

    fn parse_impl(&mut self) -> ParseResult<ImplDecl> {
        let start = self.byte_span().start;
        self.advance(); // impl
        let generics = self.parse_generic_params()?;

        // `impl Behavior for Type` vs `impl Type`: parse one type first and
        // look for `for`.
        let first = self.parse_type()?;
        let (behavior, self_type) = if self.eat(&TokenKind::For) {
            let behavior = match first {
                TypeExpr::Named { path, args, span } => PathRef {
                    segments: path,
                    type_args: args,
                    span,
                },
                other => {
                    return Err(Box::new(
                        tml_diagnostics::Diagnostic::error(
                            "P022",
                            "expected a behavior name before `for`",
                            self.resolve_span(&other.span()),
                        ),
                    ));
                }
            };
            (Some(behavior), self.parse_type()?)
        } else {
            (None, first)
        };

        let where_clause = self.parse_where_clause()?;
        self.expect(&TokenKind::LBrace, "to begin impl body")?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let method_decorators = self.parse_decorators()?;
            let is_pub = self.eat(&TokenKind::Pub);
            methods.push(self.parse_func(method_decorators, is_pub)?);
        }
        self.expect(&TokenKind::RBrace, "to close impl body")?;
        let end = self.prev_byte_span().end;

        Ok(ImplDecl {
            generics,
            behavior,
            self_type,
            where_clause,
            methods,
            span: start..end,
        })
    }

    fn parse_type_alias(&mut self, is_pub: bool) -> ParseResult<TypeAliasDecl> {
        let start = self.byte_span().start;
        self.advance(); // type
        let name = self.expect_ident("for type alias")?;
        let generics = self.parse_generic_params()?;
        self.expect(&TokenKind::Eq, "in type alias")?;
        let ty = self.parse_type()?;
        self.eat(&TokenKind::Semicolon);
        let end = self.prev_byte_span().end;
        Ok(TypeAliasDecl {
            is_pub,
            name,
            generics,
            ty,
            span: start..end,
        })
    }

    pub(crate) fn parse_const(&mut self, is_pub: bool) -> ParseResult<ConstDecl> {
        let start = self.byte_span().start;
        self.advance(); // const
        let name = self.expect_ident("for constant name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq, "in constant declaration")?;
        let value = self.parse_expr()?;
        self.eat(&TokenKind::Semicolon);
        let end = self.prev_byte_span().end;
        Ok(ConstDecl {
            is_pub,
            name,
            ty,
            value,
            span: start..end,
        })
    }

    fn parse_use(&mut self) -> ParseResult<UseDecl> {
        let start = self.byte_span().start;
        self.advance(); // use
        let mut path = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Ident(seg) => {
                    path.push(seg.clone());
                    self.advance();
                }
                _ => {
                    return Err(self.error_here(
                        "P026",
                        format!("expected module name, found {}", self.peek().describe()),
                        "imports look like `use std::io::println`",
                    ));
                }
            }
            if !self.eat(&TokenKind::ColonColon) {
                break;
            }
        }
        let alias = if self.eat(&TokenKind::As) {
            Some(self.expect_ident("for import alias")?)
        } else {
            None
        };
        self.eat(&TokenKind::Semicolon);
        let end = self.prev_byte_span().end;
        Ok(UseDecl {
            path,
            alias,
            span: start..end,
        })
    }

    fn parse_mod(&mut self, is_pub: bool) -> ParseResult<ModDecl> {
        let start = self.byte_span().start;
        self.advance(); // mod
        let name = self.expect_ident("for module name")?;
        self.expect(&TokenKind::LBrace, "to begin module body")?;
        let mut decls = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_decl() {
                Ok(decl) => decls.push(decl),
                Err(diag) => {
                    self.diagnostics.push(*diag);
                    self.sync_to_decl();
                }
            }
        }
        self.expect(&TokenKind::RBrace, "to close module body")?;
        let end = self.prev_byte_span().end;
        Ok(ModDecl {
            is_pub,
            name,
            decls,
            span: start..end,
        })
    }
}
