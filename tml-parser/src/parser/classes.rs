// Class declarations: inheritance clause, fields, methods (virtual /
// override / static), and get/set properties.

use super::{ParseResult, Parser};
use tml_ast::*;
use tml_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_class(
        &mut self,
        decorators: Vec<Decorator>,
        is_pub: bool,
    ) -> ParseResult<ClassDecl> {
        let start = self.byte_span().start;
        self.advance(); // class
        let name = self.expect_ident("for class name")?;
        let generics = self.parse_generic_params()?;

        let base = if self.eat(&TokenKind::Extends) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let mut interfaces = Vec::new();
        if self.eat(&TokenKind::Implements) {
            loop {
                interfaces.push(self.parse_type()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let where_clause = self.parse_where_clause()?;
        self.expect(&TokenKind::LBrace, "to begin class body")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut properties = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let member_decorators = self.parse_decorators()?;
            let member_pub = self.eat(&TokenKind::Pub);
            let is_static = self.eat(&TokenKind::Static);
            let is_virtual = self.eat(&TokenKind::Virtual);
            let is_override = self.eat(&TokenKind::Override);

            if self.check(&TokenKind::Func)
                || self.check(&TokenKind::Async)
                || self.check(&TokenKind::Lowlevel)
            {
                let mut method = self.parse_func(member_decorators, member_pub)?;
                method.is_static = is_static;
                method.is_virtual = is_virtual;
                method.is_override = is_override;
                methods.push(method);
                continue;
            }

            if is_virtual || is_override {
                return Err(self.error(
                    "P001",
                    "`virtual` and `override` only apply to methods",
                ));
            }

            // Field or property: `name: Type [= default]` or
            // `name: Type { get {…} set {…} }`.
            let mstart = self.byte_span().start;
            let member_name = self.expect_ident("for class member")?;
            self.expect(&TokenKind::Colon, "after class member name")?;
            let ty = self.parse_type()?;

            if self.check(&TokenKind::LBrace) {
                let property = self.parse_property(member_pub, member_name, ty, mstart)?;
                properties.push(property);
                continue;
            }

            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let mend = self.prev_byte_span().end;
            // Static fields keep their own table slot in the checker; the
            // parser stores them alongside instance fields.
            let _ = is_static;
            fields.push(FieldDef {
                is_pub: member_pub,
                name: member_name,
                ty,
                default,
                span: mstart..mend,
            });
            if !self.eat(&TokenKind::Comma) {
                self.eat(&TokenKind::Semicolon);
            }
        }

        self.expect(&TokenKind::RBrace, "to close class body")?;
        let end = self.prev_byte_span().end;

        Ok(ClassDecl {
            decorators,
            is_pub,
            name,
            generics,
            base,
            interfaces,
            where_clause,
            fields,
            methods,
            properties,
            span: start..end,
        })
    }

    fn parse_property(
        &mut self,
        is_pub: bool,
        name: String,
        ty: TypeExpr,
        start: usize,
    ) -> ParseResult<Property> {
        self.expect(&TokenKind::LBrace, "to begin property accessors")?;
        let mut getter = None;
        let mut setter = None;

        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.peek() {
                TokenKind::Ident(word) if word == "get" => {
                    self.advance();
                    getter = Some(self.parse_block()?);
                }
                TokenKind::Ident(word) if word == "set" => {
                    self.advance();
                    setter = Some(self.parse_block()?);
                }
                _ => {
                    return Err(self.error_here(
                        "P050",
                        format!(
                            "expected `get` or `set` in property `{}`, found {}",
                            name,
                            self.peek().describe()
                        ),
                        "property accessors look like `get { … }` and `set { … }`",
                    ));
                }
            }
        }
        self.expect(&TokenKind::RBrace, "to close property accessors")?;
        let end = self.prev_byte_span().end;

        Ok(Property {
            is_pub,
            name,
            ty,
            getter,
            setter,
            span: start..end,
        })
    }
}
