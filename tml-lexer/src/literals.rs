// Literal classification callbacks. Everything here runs inside logos
// callbacks: the token regex matches a coarse shape and these routines do
// the real validation, producing L-coded errors.

use crate::{FloatValue, IntValue, LexErrorKind, TokenKind};
use logos::Lexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBase {
    Binary,
    Octal,
    Decimal,
    Hex,
}

impl IntBase {
    pub fn radix(self) -> u32 {
        match self {
            IntBase::Binary => 2,
            IntBase::Octal => 8,
            IntBase::Decimal => 10,
            IntBase::Hex => 16,
        }
    }

    fn bad_digit_code(self) -> &'static str {
        match self {
            IntBase::Hex => "L008",
            IntBase::Binary => "L009",
            IntBase::Octal => "L010",
            IntBase::Decimal => "L003",
        }
    }

    fn name(self) -> &'static str {
        match self {
            IntBase::Binary => "binary",
            IntBase::Octal => "octal",
            IntBase::Decimal => "decimal",
            IntBase::Hex => "hexadecimal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumSuffix {
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
}

impl NumSuffix {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "i8" => NumSuffix::I8,
            "i16" => NumSuffix::I16,
            "i32" => NumSuffix::I32,
            "i64" => NumSuffix::I64,
            "i128" => NumSuffix::I128,
            "u8" => NumSuffix::U8,
            "u16" => NumSuffix::U16,
            "u32" => NumSuffix::U32,
            "u64" => NumSuffix::U64,
            "u128" => NumSuffix::U128,
            "f32" => NumSuffix::F32,
            "f64" => NumSuffix::F64,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumSuffix::F32 | NumSuffix::F64)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            NumSuffix::U8 | NumSuffix::U16 | NumSuffix::U32 | NumSuffix::U64 | NumSuffix::U128
        )
    }

    pub fn type_name(self) -> &'static str {
        match self {
            NumSuffix::I8 => "I8",
            NumSuffix::I16 => "I16",
            NumSuffix::I32 => "I32",
            NumSuffix::I64 => "I64",
            NumSuffix::I128 => "I128",
            NumSuffix::U8 => "U8",
            NumSuffix::U16 => "U16",
            NumSuffix::U32 => "U32",
            NumSuffix::U64 => "U64",
            NumSuffix::U128 => "U128",
            NumSuffix::F32 => "F32",
            NumSuffix::F64 => "F64",
        }
    }

    /// Largest magnitude an integer literal of this width may carry. Signed
    /// widths allow 2^(n-1) so the minimum value survives a leading minus.
    fn int_limit(self) -> Option<u128> {
        Some(match self {
            NumSuffix::I8 => 1 << 7,
            NumSuffix::I16 => 1 << 15,
            NumSuffix::I32 => 1 << 31,
            NumSuffix::I64 => 1 << 63,
            NumSuffix::I128 => u128::MAX,
            NumSuffix::U8 => u8::MAX as u128,
            NumSuffix::U16 => u16::MAX as u128,
            NumSuffix::U32 => u32::MAX as u128,
            NumSuffix::U64 => u64::MAX as u128,
            NumSuffix::U128 => u128::MAX,
            NumSuffix::F32 | NumSuffix::F64 => return None,
        })
    }
}

/// Piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Text(String),
    /// Source text of a `${…}` hole plus its byte offset in the file, so
    /// the parser can lex and parse the hole with correct spans.
    Expr { source: String, offset: usize },
}

/// Payload of a string token: plain text or interpolation segments.
#[derive(Debug, Clone, PartialEq)]
pub enum StrPayload {
    Plain(String),
    Template(Vec<TemplateSegment>),
}

pub(crate) fn lex_int(lex: &mut Lexer<TokenKind>) -> Result<IntValue, LexErrorKind> {
    let slice = lex.slice();
    let (base, body) = match slice.get(..2) {
        Some("0x") | Some("0X") => (IntBase::Hex, &slice[2..]),
        Some("0b") | Some("0B") => (IntBase::Binary, &slice[2..]),
        Some("0o") | Some("0O") => (IntBase::Octal, &slice[2..]),
        _ => (IntBase::Decimal, slice),
    };

    let mut digits = String::new();
    let mut suffix_start = None;
    for (i, c) in body.char_indices() {
        if c == '_' {
            continue;
        }
        if c.is_digit(base.radix()) {
            digits.push(c);
            continue;
        }
        if matches!(c, 'i' | 'u' | 'f') {
            suffix_start = Some(i);
            break;
        }
        return Err(LexErrorKind::new(
            base.bad_digit_code(),
            format!("invalid digit `{}` in {} literal", c, base.name()),
        ));
    }

    if digits.is_empty() {
        return Err(LexErrorKind::new(
            "L003",
            format!("{} literal has no digits", base.name()),
        ));
    }

    let suffix = match suffix_start {
        Some(start) => {
            let text = &body[start..];
            match NumSuffix::parse(text) {
                Some(s) => Some(s),
                None => {
                    let code = if text.starts_with('f') { "L017" } else { "L016" };
                    return Err(LexErrorKind::new(
                        code,
                        format!("`{}` is not a valid numeric type suffix", text),
                    ));
                }
            }
        }
        None => None,
    };

    let value = u128::from_str_radix(&digits, base.radix()).map_err(|_| {
        LexErrorKind::new("L020", "integer literal is too large for any integer type")
    })?;

    if let Some(suffix) = suffix {
        if let Some(limit) = suffix.int_limit() {
            if value > limit {
                return Err(LexErrorKind::new(
                    "L020",
                    format!(
                        "integer literal out of range for `{}`",
                        suffix.type_name()
                    ),
                ));
            }
        }
    }

    Ok(IntValue {
        value,
        base,
        suffix,
    })
}

pub(crate) fn lex_float(lex: &mut Lexer<TokenKind>) -> Result<FloatValue, LexErrorKind> {
    let slice = lex.slice();
    let mut chars = slice.char_indices().peekable();
    let mut digits = String::new();
    let mut suffix_start = None;

    // Mantissa, optional fraction.
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else if c == '_' {
            chars.next();
        } else {
            break;
        }
    }
    if let Some(&(_, '.')) = chars.peek() {
        digits.push('.');
        chars.next();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                chars.next();
            } else if c == '_' {
                chars.next();
            } else {
                break;
            }
        }
    }

    // Optional exponent.
    if let Some(&(_, c)) = chars.peek() {
        if c == 'e' || c == 'E' {
            digits.push('e');
            chars.next();
            if let Some(&(_, sign)) = chars.peek() {
                if sign == '+' || sign == '-' {
                    digits.push(sign);
                    chars.next();
                }
            }
            let mut exp_digits = 0;
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    exp_digits += 1;
                    chars.next();
                } else if c == '_' {
                    chars.next();
                } else {
                    break;
                }
            }
            if exp_digits == 0 {
                return Err(LexErrorKind::new(
                    "L018",
                    "exponent has no digits",
                ));
            }
        }
    }

    if let Some(&(i, _)) = chars.peek() {
        suffix_start = Some(i);
    }

    let suffix = match suffix_start {
        Some(start) => {
            let text = &slice[start..];
            match NumSuffix::parse(text) {
                Some(s) if s.is_float() => Some(s),
                _ => {
                    return Err(LexErrorKind::new(
                        "L017",
                        format!("`{}` is not a valid float type suffix", text),
                    ));
                }
            }
        }
        None => None,
    };

    let value: f64 = digits.parse().map_err(|_| {
        LexErrorKind::new("L019", "invalid floating-point literal")
    })?;
    if value.is_infinite() {
        return Err(LexErrorKind::new(
            "L019",
            "floating-point literal overflows `F64`",
        ));
    }

    Ok(FloatValue { value, suffix })
}

/// Decode one escape sequence. `rest` starts after the backslash; returns
/// the decoded char and the bytes consumed from `rest`.
fn scan_escape(rest: &str) -> Result<(char, usize), LexErrorKind> {
    let mut chars = rest.chars();
    let first = chars.next().ok_or_else(|| {
        LexErrorKind::new("L004", "escape sequence at end of input")
    })?;
    match first {
        '\\' => Ok(('\\', 1)),
        '"' => Ok(('"', 1)),
        '\'' => Ok(('\'', 1)),
        'n' => Ok(('\n', 1)),
        'r' => Ok(('\r', 1)),
        't' => Ok(('\t', 1)),
        '0' => Ok(('\0', 1)),
        'x' => {
            let hex: String = rest[1..].chars().take(2).collect();
            if hex.len() < 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(LexErrorKind::new(
                    "L004",
                    "`\\x` escape requires two hex digits",
                ));
            }
            let code = u8::from_str_radix(&hex, 16)
                .map_err(|_| LexErrorKind::new("L004", "invalid `\\x` escape"))?;
            Ok((code as char, 3))
        }
        'u' => {
            if !rest[1..].starts_with('{') {
                return Err(LexErrorKind::new(
                    "L004",
                    "`\\u` escape requires braces: `\\u{…}`",
                ));
            }
            let close = rest[2..].find('}').ok_or_else(|| {
                LexErrorKind::new("L004", "unterminated `\\u{…}` escape")
            })?;
            let hex = &rest[2..2 + close];
            if hex.is_empty() || hex.len() > 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(LexErrorKind::new("L004", "invalid `\\u{…}` escape"));
            }
            let code = u32::from_str_radix(hex, 16)
                .map_err(|_| LexErrorKind::new("L004", "invalid `\\u{…}` escape"))?;
            let decoded = char::from_u32(code).ok_or_else(|| {
                LexErrorKind::new("L004", "`\\u{…}` escape is not a valid char")
            })?;
            Ok((decoded, 2 + close + 1))
        }
        other => Err(LexErrorKind::new(
            "L004",
            format!("unknown escape sequence `\\{}`", other),
        )),
    }
}

/// Consume the rest of a broken string so one bad escape does not cascade
/// into spurious tokens. Stops after an unescaped closing quote or at the
/// end of the line.
fn skip_to_string_end(lex: &mut Lexer<TokenKind>) {
    let rest = lex.remainder();
    let mut consumed = 0;
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                consumed = i + 1;
                break;
            }
            '\n' => {
                consumed = i;
                break;
            }
            '\\' => {
                if let Some((j, esc)) = chars.next() {
                    consumed = j + esc.len_utf8();
                }
            }
            _ => consumed = i + c.len_utf8(),
        }
    }
    lex.bump(consumed);
}

pub(crate) fn lex_string(lex: &mut Lexer<TokenKind>) -> Result<StrPayload, LexErrorKind> {
    let rest = lex.remainder().to_string();
    let content_start = lex.span().end;
    let mut segments: Vec<TemplateSegment> = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    loop {
        let Some(c) = rest[i..].chars().next() else {
            lex.bump(i);
            return Err(LexErrorKind::new("L002", "unterminated string literal"));
        };
        match c {
            '"' => {
                i += 1;
                lex.bump(i);
                break;
            }
            '\n' => {
                lex.bump(i);
                return Err(LexErrorKind::new("L002", "unterminated string literal"));
            }
            '\\' => match scan_escape(&rest[i + 1..]) {
                Ok((decoded, consumed)) => {
                    text.push(decoded);
                    i += 1 + consumed;
                }
                Err(err) => {
                    lex.bump(i + 1);
                    skip_to_string_end(lex);
                    return Err(err);
                }
            },
            '$' if rest[i + 1..].starts_with('{') => {
                let expr_start = i + 2;
                let mut depth = 1;
                let mut end = None;
                for (j, ch) in rest[expr_start..].char_indices() {
                    match ch {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                end = Some(expr_start + j);
                                break;
                            }
                        }
                        '"' | '\n' => break,
                        _ => {}
                    }
                }
                let Some(end) = end else {
                    lex.bump(rest.len());
                    return Err(LexErrorKind::new(
                        "L015",
                        "unterminated `${…}` interpolation",
                    ));
                };
                if !text.is_empty() {
                    segments.push(TemplateSegment::Text(std::mem::take(&mut text)));
                }
                segments.push(TemplateSegment::Expr {
                    source: rest[expr_start..end].to_string(),
                    offset: content_start + expr_start,
                });
                i = end + 1;
            }
            _ => {
                text.push(c);
                i += c.len_utf8();
            }
        }
    }

    if segments.is_empty() {
        Ok(StrPayload::Plain(text))
    } else {
        if !text.is_empty() {
            segments.push(TemplateSegment::Text(text));
        }
        Ok(StrPayload::Template(segments))
    }
}

pub(crate) fn lex_raw_string(lex: &mut Lexer<TokenKind>) -> Result<String, LexErrorKind> {
    // Slice is the opener: `r`, zero or more `#`, `"`.
    let hashes = lex.slice().len() - 2;
    let closer = format!("\"{}", "#".repeat(hashes));
    let rest = lex.remainder();
    match rest.find(&closer) {
        Some(pos) => {
            lex.bump(pos + closer.len());
            Ok(rest[..pos].to_string())
        }
        None => {
            lex.bump(rest.len());
            Err(LexErrorKind::new(
                "L013",
                "unterminated raw string literal",
            ))
        }
    }
}

pub(crate) fn lex_char(lex: &mut Lexer<TokenKind>) -> Result<char, LexErrorKind> {
    let rest = lex.remainder();
    let mut chars = rest.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => {
            return Err(LexErrorKind::new(
                "L005",
                "unterminated character literal",
            ));
        }
    };

    if first == '\'' {
        lex.bump(1);
        return Err(LexErrorKind::new("L006", "empty character literal"));
    }

    let (decoded, consumed) = if first == '\\' {
        let (c, n) = scan_escape(&rest[1..])?;
        (c, 1 + n)
    } else {
        (first, first.len_utf8())
    };

    if rest[consumed..].starts_with('\'') {
        lex.bump(consumed + 1);
        Ok(decoded)
    } else {
        // Consume up to a nearby closing quote so `'ab'` is one error.
        let extra = rest[consumed..]
            .char_indices()
            .take_while(|(_, c)| *c != '\'' && *c != '\n')
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let close = usize::from(rest[consumed + extra..].starts_with('\''));
        lex.bump(consumed + extra + close);
        Err(LexErrorKind::new(
            "L005",
            "unterminated character literal",
        ))
    }
}

pub(crate) fn lex_block_comment(lex: &mut Lexer<TokenKind>) -> Result<(), LexErrorKind> {
    let rest = lex.remainder();
    let bytes = rest.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return Ok(());
            }
        } else {
            i += 1;
        }
    }
    lex.bump(rest.len());
    Err(LexErrorKind::new("L012", "unterminated block comment"))
}
