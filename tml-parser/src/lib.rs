// Recursive-descent parser for TML.
//
// Tokens come from `tml-lexer`; the output is a `tml_ast::Module` plus a
// list of diagnostics. Parsing never aborts on the first error: failures
// synchronize at declaration boundaries and continue.

use thiserror::Error;

mod parser;
pub use parser::Parser;

/// Top-level failure producing no AST at all (lexer refused the input).
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("source is not valid TML: {0} lexer error(s)")]
    LexerFailed(usize),
}

/// Convenience entry point: lex and parse one file.
///
/// Returns the module (possibly partial when errors were recovered) and
/// every diagnostic from both the lexer and the parser.
pub fn parse_source(
    source: &str,
    file_name: &str,
) -> (Option<tml_ast::Module>, Vec<tml_diagnostics::Diagnostic>) {
    let (tokens, mut diagnostics) = tml_lexer::tokenize(source, file_name);
    let mut parser = Parser::new(tokens, source, file_name);
    let (module, parse_diags) = parser.parse_module();
    diagnostics.extend(parse_diags);
    let failed = diagnostics
        .iter()
        .any(|d| d.severity == tml_diagnostics::Severity::Error);
    if failed {
        (None, diagnostics)
    } else {
        (Some(module), diagnostics)
    }
}

/// Like [`parse_source`] but keeps the partial AST even when errors were
/// reported, for tooling that wants best-effort trees.
pub fn parse_source_partial(
    source: &str,
    file_name: &str,
) -> (tml_ast::Module, Vec<tml_diagnostics::Diagnostic>) {
    let (tokens, mut diagnostics) = tml_lexer::tokenize(source, file_name);
    let mut parser = Parser::new(tokens, source, file_name);
    let (module, parse_diags) = parser.parse_module();
    diagnostics.extend(parse_diags);
    (module, diagnostics)
}
