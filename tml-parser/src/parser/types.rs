// Syntactic type parsing: named types with bracket generics, references,
// raw pointers, arrays/slices, tuples, function types, `dyn Behavior`.

use super::{ParseResult, Parser};
use tml_ast::*;
use tml_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.byte_span().start;
        match self.peek().clone() {
            TokenKind::Ref => {
                self.advance();
                let mutable = self.eat(&TokenKind::Mut);
                // Optional named lifetime: `ref 'a T` is spelled `ref@a T`.
                let lifetime = if self.eat(&TokenKind::At) {
                    Some(self.expect_ident("for lifetime name")?)
                } else {
                    None
                };
                let inner = self.parse_type()?;
                let span = start..inner.span().end;
                Ok(TypeExpr::Ref {
                    mutable,
                    inner: Box::new(inner),
                    lifetime,
                    span,
                })
            }
            TokenKind::Ptr => {
                self.advance();
                let mutable = self.eat(&TokenKind::Mut);
                let inner = self.parse_type()?;
                let span = start..inner.span().end;
                Ok(TypeExpr::Ptr {
                    mutable,
                    inner: Box::new(inner),
                    span,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let mut elems = Vec::new();
                while !self.check(&TokenKind::RParen) && !self.at_eof() {
                    elems.push(self.parse_type()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "to close tuple type")?;
                let span = start..self.prev_byte_span().end;
                Ok(TypeExpr::Tuple { elems, span })
            }
            TokenKind::Func => {
                self.advance();
                self.expect(&TokenKind::LParen, "to begin function type parameters")?;
                let mut params = Vec::new();
                while !self.check(&TokenKind::RParen) && !self.at_eof() {
                    params.push(self.parse_type()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "to close function type parameters")?;
                let ret = if self.eat(&TokenKind::Arrow) {
                    Some(Box::new(self.parse_type()?))
                } else {
                    None
                };
                let span = start..self.prev_byte_span().end;
                Ok(TypeExpr::Func { params, ret, span })
            }
            TokenKind::Underscore => {
                self.advance();
                Ok(TypeExpr::Infer {
                    span: start..self.prev_byte_span().end,
                })
            }
            TokenKind::Ident(name) => {
                if name == "dyn" {
                    self.advance();
                    let bstart = self.byte_span().start;
                    let mut segments = vec![self.expect_ident("for behavior after `dyn`")?];
                    while self.eat(&TokenKind::ColonColon) {
                        segments.push(self.expect_ident("after `::`")?);
                    }
                    let mut type_args = Vec::new();
                    if self.eat(&TokenKind::LBracket) {
                        while !self.check(&TokenKind::RBracket) && !self.at_eof() {
                            type_args.push(self.parse_type()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RBracket, "to close behavior arguments")?;
                    }
                    let span = start..self.prev_byte_span().end;
                    return Ok(TypeExpr::Dyn {
                        behavior: PathRef {
                            segments,
                            type_args,
                            span: bstart..self.prev_byte_span().end,
                        },
                        span,
                    });
                }
                self.parse_named_type()
            }
            _ => Err(self.error_here(
                "P005",
                format!("expected a type, found {}", self.peek().describe()),
                "types look like `I32`, `Maybe[T]`, `ref Str`, `(I32, Bool)`, or `func(I32) -> Bool`",
            )),
        }
    }

    /// `path::To::Name[Args]`. `Array[T; N]` and `Slice[T]` get their own
    /// structural forms.
    fn parse_named_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.byte_span().start;
        let mut path = vec![self.expect_ident("for type name")?];
        while self.eat(&TokenKind::ColonColon) {
            path.push(self.expect_ident("after `::` in type path")?);
        }

        let mut args = Vec::new();
        let mut array_size = None;
        if self.eat(&TokenKind::LBracket) {
            while !self.check(&TokenKind::RBracket) && !self.at_eof() {
                args.push(self.parse_type()?);
                if self.eat(&TokenKind::Semicolon) {
                    // `Array[T; N]`.
                    array_size = Some(self.parse_expr()?);
                    break;
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket, "to close type arguments")?;
        }
        let span = start..self.prev_byte_span().end;

        let base = path.last().map(|s| s.as_str()).unwrap_or("");
        if base == "Array" {
            if let (Some(size), true) = (array_size, args.len() == 1) {
                let elem = args.remove(0);
                return Ok(TypeExpr::Array {
                    elem: Box::new(elem),
                    size: Box::new(size),
                    span,
                });
            }
            return Err(self.error_here(
                "P022",
                "`Array` types need an element type and a length",
                "write `Array[T; N]`",
            ));
        }
        if array_size.is_some() {
            return Err(self.error(
                "P022",
                format!("type `{}` does not take a `; length` argument", base),
            ));
        }
        if base == "Slice" {
            if args.len() != 1 {
                return Err(self.error_here(
                    "P022",
                    "`Slice` types take exactly one element type",
                    "write `Slice[T]`",
                ));
            }
            let elem = args.remove(0);
            return Ok(TypeExpr::Slice {
                elem: Box::new(elem),
                span,
            });
        }

        Ok(TypeExpr::Named { path, args, span })
    }
}
