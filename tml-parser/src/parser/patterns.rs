// Pattern parsing for `when` arms, `let` bindings, and parameters.

use super::{ParseResult, Parser};
use tml_ast::*;
use tml_diagnostics::Diagnostic;
use tml_lexer::TokenKind;

impl<'a> Parser<'a> {
    pub(crate) fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let first = self.parse_single_pattern()?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(first);
        }

        let start = first.span().start;
        let mut alts = vec![first];
        while self.eat(&TokenKind::Pipe) {
            alts.push(self.parse_single_pattern()?);
        }
        let end = self.prev_byte_span().end;

        // Every alternative of an or-pattern must bind the same names.
        let expected = alts[0].bindings();
        for alt in &alts[1..] {
            if alt.bindings() != expected {
                return Err(Box::new(Diagnostic::error(
                    "P007",
                    "or-pattern alternatives bind different names",
                    self.resolve_span(&alt.span()),
                )));
            }
        }

        Ok(Pattern::Or {
            alts,
            span: start..end,
        })
    }

    fn parse_single_pattern(&mut self) -> ParseResult<Pattern> {
        let start = self.byte_span().start;
        match self.peek().clone() {
            TokenKind::Underscore => {
                self.advance();
                Ok(Pattern::Wildcard {
                    span: start..self.prev_byte_span().end,
                })
            }
            TokenKind::Minus
            | TokenKind::IntLiteral(_)
            | TokenKind::FloatLiteral(_)
            | TokenKind::StrLiteral(_)
            | TokenKind::CharLiteral(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null => {
                let value = self.parse_literal_for_pattern()?;
                // Range pattern: `1 to 9` / `'a' through 'z'`.
                if self.check(&TokenKind::To) || self.check(&TokenKind::Through) {
                    let inclusive = matches!(self.peek(), TokenKind::Through);
                    self.advance();
                    let end_lit = self.parse_literal_for_pattern()?;
                    return Ok(Pattern::Range {
                        start: value,
                        end: end_lit,
                        inclusive,
                        span: start..self.prev_byte_span().end,
                    });
                }
                Ok(Pattern::Literal {
                    value,
                    span: start..self.prev_byte_span().end,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let mut elems = Vec::new();
                while !self.check(&TokenKind::RParen) && !self.at_eof() {
                    elems.push(self.parse_pattern()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                if !self.eat(&TokenKind::RParen) {
                    return Err(self.error_here(
                        "P043",
                        "unclosed tuple pattern",
                        "tuple patterns look like `(a, b, c)`",
                    ));
                }
                Ok(Pattern::Tuple {
                    elems,
                    span: start..self.prev_byte_span().end,
                })
            }
            TokenKind::Mut => {
                self.advance();
                let name = self.expect_ident("after `mut` in pattern")?;
                Ok(Pattern::Ident {
                    name,
                    mutable: true,
                    // The annotation slot is filled from context (`let x:
                    // T`); a colon after a pattern belongs to the outer
                    // grammar.
                    ty: None,
                    span: start..self.prev_byte_span().end,
                })
            }
            TokenKind::Ident(_) => self.parse_path_pattern(),
            _ => Err(self.error_here(
                "P007",
                format!("expected a pattern, found {}", self.peek().describe()),
                "patterns are `_`, identifiers, literals, tuples, `Variant(…)`, or `Type { … }`",
            )),
        }
    }

    fn parse_literal_for_pattern(&mut self) -> ParseResult<Literal> {
        let negative = self.eat(&TokenKind::Minus);
        match self.peek().clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                let value = Literal::Int {
                    value: v.value,
                    suffix: None,
                };
                if negative {
                    // Negative literals keep their magnitude; the checker
                    // re-applies the sign from the pattern context.
                    return Ok(negate_int(value));
                }
                Ok(value)
            }
            TokenKind::FloatLiteral(v) => {
                self.advance();
                Ok(Literal::Float {
                    value: if negative { -v.value } else { v.value },
                    suffix: None,
                })
            }
            TokenKind::StrLiteral(tml_lexer::StrPayload::Plain(text)) => {
                self.advance();
                Ok(Literal::Str(text))
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                Ok(Literal::Char(c))
            }
            TokenKind::True => {
                self.advance();
                Ok(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Literal::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Literal::Null)
            }
            _ => Err(self.error("P014", "invalid literal in pattern")),
        }
    }

    /// Ident, enum variant `Path::Variant(pats…)`, bare constructor
    /// `Just(x)`, or struct destructuring `Point { x, y }`.
    fn parse_path_pattern(&mut self) -> ParseResult<Pattern> {
        let start = self.byte_span().start;
        let mut segments = vec![self.expect_ident("for pattern")?];
        while self.eat(&TokenKind::ColonColon) {
            segments.push(self.expect_ident("after `::`")?);
        }
        let path_span = start..self.prev_byte_span().end;

        // Variant with payload: `Just(v)`, `Shape::Circle(r)`.
        if self.check(&TokenKind::LParen) {
            self.advance();
            let mut args = Vec::new();
            while !self.check(&TokenKind::RParen) && !self.at_eof() {
                args.push(self.parse_pattern()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "to close variant pattern")?;
            let variant = segments.pop().unwrap_or_default();
            return Ok(Pattern::Enum {
                path: PathRef {
                    segments,
                    type_args: Vec::new(),
                    span: path_span,
                },
                variant,
                args,
                span: start..self.prev_byte_span().end,
            });
        }

        // Struct destructuring: `Point { x, y: py, .. }`.
        if self.check(&TokenKind::LBrace) && is_type_like(&segments) {
            self.advance();
            let mut fields = Vec::new();
            let mut has_rest = false;
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                if self.eat(&TokenKind::DotDot) {
                    has_rest = true;
                    break;
                }
                let fname = match self.peek() {
                    TokenKind::Ident(name) => {
                        let n = name.clone();
                        self.advance();
                        n
                    }
                    _ => {
                        return Err(self.error_here(
                            "P041",
                            format!(
                                "expected field name in struct pattern, found {}",
                                self.peek().describe()
                            ),
                            "struct patterns look like `Point { x, y }`",
                        ));
                    }
                };
                let pat = if self.eat(&TokenKind::Colon) {
                    self.parse_pattern()?
                } else {
                    Pattern::Ident {
                        name: fname.clone(),
                        mutable: false,
                        ty: None,
                        span: self.prev_byte_span(),
                    }
                };
                fields.push((fname, pat));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "to close struct pattern")?;
            return Ok(Pattern::Struct {
                path: PathRef {
                    segments,
                    type_args: Vec::new(),
                    span: path_span,
                },
                fields,
                has_rest,
                span: start..self.prev_byte_span().end,
            });
        }

        // Multi-segment path without payload is a unit variant.
        if segments.len() > 1 {
            let variant = segments.pop().unwrap_or_default();
            return Ok(Pattern::Enum {
                path: PathRef {
                    segments,
                    type_args: Vec::new(),
                    span: path_span.clone(),
                },
                variant,
                args: Vec::new(),
                span: path_span,
            });
        }

        // A capitalized bare name is a unit constructor (`Nothing`); a
        // lowercase one is a binding.
        let name = segments.pop().unwrap_or_default();
        let is_constructor = name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
        if is_constructor {
            return Ok(Pattern::Enum {
                path: PathRef {
                    segments: Vec::new(),
                    type_args: Vec::new(),
                    span: path_span.clone(),
                },
                variant: name,
                args: Vec::new(),
                span: path_span,
            });
        }

        Ok(Pattern::Ident {
            name,
            mutable: false,
            ty: None,
            span: start..self.prev_byte_span().end,
        })
    }
}

fn is_type_like(segments: &[String]) -> bool {
    segments
        .last()
        .and_then(|s| s.chars().next())
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
}

fn negate_int(value: Literal) -> Literal {
    match value {
        Literal::Int { value, suffix } => Literal::Int {
            // Two's-complement magnitude; sign context lives in the
            // pattern's matched type.
            value: value.wrapping_neg(),
            suffix,
        },
        other => other,
    }
}
