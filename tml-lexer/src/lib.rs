// Tokenizer for the TML programming language.
//
// The token grammar is driven by logos; everything a regular expression
// cannot carry (nested block comments, raw strings with matched hash
// counts, string interpolation, numeric literal classification) lives in
// callbacks in the `literals` module.

use logos::Logos;
use tml_diagnostics::{Diagnostic, Span};

mod literals;
pub use literals::{IntBase, NumSuffix, StrPayload, TemplateSegment};

/// Lexer error carried through logos. `Default` is the catch-all L001.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct LexErrorKind {
    pub code: &'static str,
    pub message: String,
}

impl Default for LexErrorKind {
    fn default() -> Self {
        Self {
            code: "L001",
            message: "invalid character".to_string(),
        }
    }
}

impl LexErrorKind {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Decoded integer literal.
#[derive(Debug, Clone, PartialEq)]
pub struct IntValue {
    pub value: u128,
    pub base: IntBase,
    pub suffix: Option<NumSuffix>,
}

/// Decoded float literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatValue {
    pub value: f64,
    pub suffix: Option<NumSuffix>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    // Declarations
    #[token("func")]
    Func,
    #[token("var")]
    Var,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("type")]
    Type,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("union")]
    Union,
    #[token("class")]
    Class,
    #[token("behavior")]
    Behavior,
    #[token("impl")]
    Impl,
    #[token("use")]
    Use,
    #[token("mod")]
    Mod,
    #[token("pub")]
    Pub,

    // Control flow
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("when")]
    When,
    #[token("loop")]
    Loop,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,

    // Modifiers and qualifiers
    #[token("async")]
    Async,
    #[token("lowlevel")]
    Lowlevel,
    #[token("ref")]
    Ref,
    #[token("mut")]
    Mut,
    #[token("ptr")]
    Ptr,
    #[token("move")]
    Move,
    #[token("where")]
    Where,
    #[token("static")]
    Static,
    #[token("virtual")]
    Virtual,
    #[token("override")]
    Override,
    #[token("extends")]
    Extends,
    #[token("implements")]
    Implements,

    // Expression keywords
    #[token("as")]
    As,
    #[token("is")]
    Is,
    #[token("to")]
    To,
    #[token("through")]
    Through,
    #[token("do")]
    Do,
    #[token("new")]
    New,
    #[token("base")]
    Base,
    #[token("await")]
    Await,
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,

    // Literal keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Compound assignment (before the single-char forms)
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,

    // Multi-char operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("..")]
    DotDot,
    #[token("::")]
    ColonColon,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Single-char operators and delimiters
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("@")]
    At,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("_", priority = 10)]
    Underscore,

    // Literals. Exponent floats need higher priority than the integer rule
    // because "1e10" matches both at equal length.
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9a-zA-Z_]*([eE][+-]?[0-9a-zA-Z_]*)?", literals::lex_float, priority = 12)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9a-zA-Z_]*", literals::lex_float, priority = 11)]
    FloatLiteral(FloatValue),

    #[regex(r"[0-9][0-9a-zA-Z_]*", literals::lex_int, priority = 10)]
    IntLiteral(IntValue),

    /// Plain or interpolated string; decoded at lex time.
    #[token("\"", literals::lex_string)]
    StrLiteral(StrPayload),

    /// Raw string r"…" / r#"…"# with matched hash counts.
    #[regex(r##"r#*""##, literals::lex_raw_string)]
    RawStrLiteral(String),

    #[token("'", literals::lex_char)]
    CharLiteral(char),

    // Comments. Line comments vanish in the lexer; block comments become a
    // token so the nesting callback can report L012, and the driver drops
    // them from the stream.
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
    #[token("/*", literals::lex_block_comment)]
    BlockComment,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 5)]
    Ident(String),

    /// Appended by the driver, never produced by logos.
    Eof,
}

impl TokenKind {
    /// Keyword or punctuation text for diagnostics ("expected `{`" etc.).
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{}`", name),
            TokenKind::IntLiteral(_) => "integer literal".to_string(),
            TokenKind::FloatLiteral(_) => "float literal".to_string(),
            TokenKind::StrLiteral(_) | TokenKind::RawStrLiteral(_) => "string literal".to_string(),
            TokenKind::CharLiteral(_) => "character literal".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("`{}`", other.fixed_lexeme().unwrap_or("token")),
        }
    }

    /// The source text of fixed-spelling tokens.
    pub fn fixed_lexeme(&self) -> Option<&'static str> {
        use TokenKind::*;
        Some(match self {
            Func => "func",
            Var => "var",
            Let => "let",
            Const => "const",
            Type => "type",
            Struct => "struct",
            Enum => "enum",
            Union => "union",
            Class => "class",
            Behavior => "behavior",
            Impl => "impl",
            Use => "use",
            Mod => "mod",
            Pub => "pub",
            If => "if",
            Else => "else",
            When => "when",
            Loop => "loop",
            While => "while",
            For => "for",
            In => "in",
            Return => "return",
            Break => "break",
            Continue => "continue",
            Async => "async",
            Lowlevel => "lowlevel",
            Ref => "ref",
            Mut => "mut",
            Ptr => "ptr",
            Move => "move",
            Where => "where",
            Static => "static",
            Virtual => "virtual",
            Override => "override",
            Extends => "extends",
            Implements => "implements",
            As => "as",
            Is => "is",
            To => "to",
            Through => "through",
            Do => "do",
            New => "new",
            Base => "base",
            Await => "await",
            Not => "not",
            And => "and",
            Or => "or",
            True => "true",
            False => "false",
            Null => "null",
            ShlEq => "<<=",
            ShrEq => ">>=",
            PlusEq => "+=",
            MinusEq => "-=",
            StarEq => "*=",
            SlashEq => "/=",
            PercentEq => "%=",
            AmpEq => "&=",
            PipeEq => "|=",
            CaretEq => "^=",
            EqEq => "==",
            NotEq => "!=",
            LtEq => "<=",
            GtEq => ">=",
            Shl => "<<",
            Shr => ">>",
            Arrow => "->",
            FatArrow => "=>",
            DotDot => "..",
            ColonColon => "::",
            PlusPlus => "++",
            MinusMinus => "--",
            Eq => "=",
            Lt => "<",
            Gt => ">",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            Bang => "!",
            Question => "?",
            At => "@",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            Dot => ".",
            Underscore => "_",
            _ => return None,
        })
    }
}

/// A token with its source slice and byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: std::ops::Range<usize>,
}

impl Token {
    pub fn eof(offset: usize) -> Self {
        Self {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: offset..offset,
        }
    }
}

/// Tokenize a whole buffer, collecting errors instead of stopping.
///
/// Returns the token sequence terminated by `Eof` and the lexer
/// diagnostics. Block comments are consumed for nesting but not emitted.
pub fn tokenize(source: &str, file: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(TokenKind::BlockComment) => {}
            Ok(kind) => tokens.push(Token {
                kind,
                lexeme: lexer.slice().to_string(),
                span,
            }),
            Err(err) => {
                diagnostics.push(Diagnostic::error(
                    err.code,
                    err.message,
                    Span::from_source_range(file, source, span),
                ));
            }
        }
    }

    tokens.push(Token::eof(source.len()));
    (tokens, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = tokenize(source, "test.tml");
        assert!(
            diagnostics.is_empty(),
            "unexpected lex errors: {:?}",
            diagnostics
        );
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn error_codes(source: &str) -> Vec<String> {
        let (_, diagnostics) = tokenize(source, "test.tml");
        diagnostics.into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn keywords_and_idents() {
        let toks = kinds("func main when behavior speak");
        assert_eq!(toks[0], TokenKind::Func);
        assert_eq!(toks[1], TokenKind::Ident("main".to_string()));
        assert_eq!(toks[2], TokenKind::When);
        assert_eq!(toks[3], TokenKind::Behavior);
        assert_eq!(toks[4], TokenKind::Ident("speak".to_string()));
        assert_eq!(toks[5], TokenKind::Eof);
    }

    #[test]
    fn operators_longest_match() {
        let toks = kinds("<<= << <= < -> => .. ++");
        assert_eq!(
            toks[..8],
            [
                TokenKind::ShlEq,
                TokenKind::Shl,
                TokenKind::LtEq,
                TokenKind::Lt,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::DotDot,
                TokenKind::PlusPlus,
            ]
        );
    }

    #[test]
    fn integer_bases_and_suffixes() {
        let toks = kinds("42 0xFF 0b1010 0o755 1_000_000 7u8 10i64");
        let values: Vec<(u128, IntBase, Option<NumSuffix>)> = toks
            .iter()
            .filter_map(|t| match t {
                TokenKind::IntLiteral(v) => Some((v.value, v.base, v.suffix)),
                _ => None,
            })
            .collect();
        assert_eq!(values[0], (42, IntBase::Decimal, None));
        assert_eq!(values[1], (255, IntBase::Hex, None));
        assert_eq!(values[2], (10, IntBase::Binary, None));
        assert_eq!(values[3], (0o755, IntBase::Octal, None));
        assert_eq!(values[4], (1_000_000, IntBase::Decimal, None));
        assert_eq!(values[5], (7, IntBase::Decimal, Some(NumSuffix::U8)));
        assert_eq!(values[6], (10, IntBase::Decimal, Some(NumSuffix::I64)));
    }

    #[test]
    fn float_forms() {
        let toks = kinds("3.14 1.5e10 2.0E-5 9.0f32 1e3");
        let values: Vec<f64> = toks
            .iter()
            .filter_map(|t| match t {
                TokenKind::FloatLiteral(v) => Some(v.value),
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 5);
        assert!((values[0] - 3.14).abs() < 1e-9);
        assert!((values[1] - 1.5e10).abs() < 1.0);
        assert!((values[4] - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn numeric_error_codes() {
        assert_eq!(error_codes("0b102"), ["L009"]);
        assert_eq!(error_codes("0xG1"), ["L008"]);
        assert_eq!(error_codes("0o78"), ["L010"]);
        assert_eq!(error_codes("42i99"), ["L016"]);
        assert_eq!(error_codes("1.0f16"), ["L017"]);
        assert_eq!(error_codes("1.0e"), ["L018"]);
        assert_eq!(
            error_codes("340282366920938463463374607431768211456"),
            ["L020"]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#""a\tb\n" "\x41" "\u{1F600}""#);
        let texts: Vec<String> = toks
            .iter()
            .filter_map(|t| match t {
                TokenKind::StrLiteral(StrPayload::Plain(s)) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts[0], "a\tb\n");
        assert_eq!(texts[1], "A");
        assert_eq!(texts[2], "\u{1F600}");
    }

    #[test]
    fn string_error_codes() {
        assert_eq!(error_codes(r#""bad \q escape""#), ["L004"]);
        assert_eq!(error_codes("\"unterminated"), ["L002"]);
    }

    #[test]
    fn interpolated_strings() {
        let toks = kinds(r#""x is ${x} and ${y + 1}!""#);
        match &toks[0] {
            TokenKind::StrLiteral(StrPayload::Template(segments)) => {
                assert_eq!(segments.len(), 5);
                match &segments[0] {
                    TemplateSegment::Text(t) => assert_eq!(t, "x is "),
                    other => panic!("expected text, got {:?}", other),
                }
                match &segments[1] {
                    TemplateSegment::Expr { source, .. } => assert_eq!(source, "x"),
                    other => panic!("expected expr, got {:?}", other),
                }
                match &segments[3] {
                    TemplateSegment::Expr { source, .. } => assert_eq!(source, "y + 1"),
                    other => panic!("expected expr, got {:?}", other),
                }
            }
            other => panic!("expected template string, got {:?}", other),
        }
        assert_eq!(error_codes(r#""open ${x"#), ["L015"]);
    }

    #[test]
    fn raw_strings() {
        let toks = kinds(r####"r"plain" r#"with "quotes""# r##"nested "#"##"####);
        let values: Vec<String> = toks
            .iter()
            .filter_map(|t| match t {
                TokenKind::RawStrLiteral(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(values[0], "plain");
        assert_eq!(values[1], "with \"quotes\"");
        assert_eq!(values[2], "nested \"#");
        assert_eq!(error_codes(r###"r#"never closed"###), ["L013"]);
    }

    #[test]
    fn char_literals() {
        let toks = kinds(r"'a' '\n' '\u{263A}'");
        let values: Vec<char> = toks
            .iter()
            .filter_map(|t| match t {
                TokenKind::CharLiteral(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(values, ['a', '\n', '\u{263A}']);
        assert_eq!(error_codes("'ab'"), ["L005"]);
        assert_eq!(error_codes("''"), ["L006"]);
    }

    #[test]
    fn nested_block_comments() {
        let toks = kinds("a /* outer /* inner */ still outer */ b");
        assert_eq!(toks[0], TokenKind::Ident("a".to_string()));
        assert_eq!(toks[1], TokenKind::Ident("b".to_string()));
        assert_eq!(error_codes("/* never /* closed */"), ["L012"]);
    }

    #[test]
    fn lexeme_round_trip() {
        let source = "func main() -> I32 {\n    let x = 0xFF // hex\n    return x\n}\n";
        let (tokens, diagnostics) = tokenize(source, "test.tml");
        assert!(diagnostics.is_empty());
        // Each lexeme is exactly its span's slice, so lexemes plus the
        // original inter-token text reconstruct the input.
        let mut reconstructed = String::new();
        let mut cursor = 0;
        for token in &tokens {
            if token.kind == TokenKind::Eof {
                continue;
            }
            assert_eq!(&source[token.span.clone()], token.lexeme);
            reconstructed.push_str(&source[cursor..token.span.start]);
            reconstructed.push_str(&token.lexeme);
            cursor = token.span.end;
        }
        reconstructed.push_str(&source[cursor..]);
        assert_eq!(reconstructed, source);
    }
}
