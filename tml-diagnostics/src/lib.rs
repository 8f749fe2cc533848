// Structured diagnostics for the TML compiler.
// Collects errors from every pipeline stage and renders them either as
// Rust-style colored text or as a stable JSON document for tooling.

use colored::Colorize;
use serde::Serialize;
use std::fmt;

pub mod source_map;
pub use source_map::{FileId, SourceFile, SourceMap};

/// Source code location: half-open byte range plus resolved line/column.
/// Lines and columns are 1-based; `line == 0` means the location is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
    #[serde(skip)]
    pub offset: usize,
    #[serde(skip)]
    pub end_offset: usize,
}

impl Span {
    pub fn new(file: impl Into<String>, line: usize, column: usize, length: usize) -> Self {
        let line = line.max(1);
        Self {
            file: file.into(),
            line,
            column,
            end_line: line,
            end_column: column + length.max(1),
            offset: 0,
            end_offset: 0,
        }
    }

    /// Resolve a byte range against source text.
    pub fn from_source_range(file: &str, source: &str, range: std::ops::Range<usize>) -> Self {
        let (line, column) = offset_to_line_col(source, range.start);
        let (end_line, end_column) = offset_to_line_col(source, range.end);
        Self {
            file: file.to_string(),
            line,
            column,
            end_line,
            end_column,
            offset: range.start,
            end_offset: range.end,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            end_line: 0,
            end_column: 0,
            offset: 0,
            end_offset: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }

    /// Length of the underlined region on the starting line.
    pub fn caret_len(&self) -> usize {
        if self.end_line == self.line && self.end_column > self.column {
            self.end_column - self.column
        } else {
            1
        }
    }

    /// Join two spans into one covering both.
    pub fn to(&self, other: &Span) -> Span {
        let mut joined = self.clone();
        joined.end_line = other.end_line;
        joined.end_column = other.end_column;
        joined.end_offset = other.end_offset;
        joined
    }
}

pub(crate) fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let clamped = offset.min(source.len());
    let before = &source[..clamped];
    let line = before.bytes().filter(|&b| b == b'\n').count() + 1;
    let column = before.rfind('\n').map_or(clamped + 1, |pos| clamped - pos);
    (line, column)
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "{}", "error".red().bold()),
            Severity::Warning => write!(f, "{}", "warning".yellow().bold()),
            Severity::Note => write!(f, "{}", "note".cyan().bold()),
            Severity::Help => write!(f, "{}", "help".green().bold()),
        }
    }
}

/// Label style: primary gets caret underlines, secondary gets dashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    Primary,
    Secondary,
}

/// An annotated secondary span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub style: LabelStyle,
}

/// A machine-applicable replacement suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub span: Span,
    pub replacement: String,
    pub description: String,
}

/// Structured diagnostic message with code, spans, notes, and fix-its.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub fixes: Vec<Fix>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            span,
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
            fixes: Vec::new(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, code, message, span)
    }

    pub fn warning(code: &str, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, code, message, span)
    }

    pub fn note(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Note, "", message, span)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
            style: LabelStyle::Secondary,
        });
        self
    }

    pub fn with_fix(
        mut self,
        span: Span,
        replacement: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.fixes.push(Fix {
            span,
            replacement: replacement.into(),
            description: description.into(),
        });
        self
    }

    /// Render in Rust style against the given source map. Missing source
    /// degrades to header + location only.
    pub fn render(&self, sources: &SourceMap) -> String {
        let mut out = String::new();

        if self.code.is_empty() {
            out.push_str(&format!("{}: {}\n", self.severity, self.message.bold()));
        } else {
            out.push_str(&format!(
                "{}[{}]: {}\n",
                self.severity,
                self.code,
                self.message.bold()
            ));
        }

        if !self.span.is_unknown() {
            out.push_str(&format!(
                " {} {}:{}:{}\n",
                "-->".cyan().bold(),
                self.span.file,
                self.span.line,
                self.span.column
            ));
            if let Some(snippet) = render_snippet(sources, &self.span, '^', |s| {
                s.red().bold().to_string()
            }) {
                out.push_str(&snippet);
            }
        }

        for label in &self.labels {
            if label.span.is_unknown() {
                continue;
            }
            if let Some(snippet) = render_snippet(sources, &label.span, '-', |s| {
                s.blue().bold().to_string()
            }) {
                out.push_str(&snippet);
                if !label.message.is_empty() {
                    out.push_str(&format!("      {}\n", label.message.blue()));
                }
            }
        }

        for note in &self.notes {
            out.push_str(&format!(" {} note: {}\n", "=".cyan().bold(), note));
        }

        if let Some(help) = &self.help {
            out.push_str(&format!(" {} help: {}\n", "=".cyan().bold(), help));
        }

        for fix in &self.fixes {
            out.push_str(&format!(" {} {}\n", "fix:".green().bold(), fix.description));
            if let Some(preview) = render_fix_preview(sources, fix) {
                out.push_str(&preview);
            }
        }

        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}: {} at {}", self.severity, self.message, self.span)
        } else {
            write!(
                f,
                "{}[{}]: {} at {}",
                self.severity, self.code, self.message, self.span
            )
        }
    }
}

fn render_snippet(
    sources: &SourceMap,
    span: &Span,
    underline_char: char,
    paint: impl Fn(&str) -> String,
) -> Option<String> {
    let line_text = sources.line_text(&span.file, span.line)?;

    let mut snippet = String::new();
    let width = span.line.to_string().len().max(2);

    snippet.push_str(&format!(" {} {}\n", " ".repeat(width), "|".cyan().bold()));
    snippet.push_str(&format!(
        " {} {} {}\n",
        format!("{:>width$}", span.line, width = width).cyan().bold(),
        "|".cyan().bold(),
        line_text
    ));

    let pad = " ".repeat(span.column.saturating_sub(1));
    let max_width = line_text.len().saturating_sub(pad.len()) + 1;
    let underline: String = std::iter::repeat(underline_char)
        .take(span.caret_len().min(max_width))
        .collect();
    snippet.push_str(&format!(
        " {} {} {}{}\n",
        " ".repeat(width),
        "|".cyan().bold(),
        pad,
        paint(&underline)
    ));

    Some(snippet)
}

fn render_fix_preview(sources: &SourceMap, fix: &Fix) -> Option<String> {
    let line_text = sources.line_text(&fix.span.file, fix.span.line)?;
    let col = fix.span.column.saturating_sub(1);
    if col > line_text.len() {
        return None;
    }
    let removed = fix.span.caret_len().min(line_text.len() - col);
    let patched = format!(
        "{}{}{}",
        &line_text[..col],
        fix.replacement,
        &line_text[col + removed..]
    );

    let width = fix.span.line.to_string().len().max(2);
    let mut out = String::new();
    out.push_str(&format!(
        " {} {} {}\n",
        format!("{:>width$}", fix.span.line, width = width).cyan().bold(),
        "|".cyan().bold(),
        patched
    ));
    let pad = " ".repeat(col);
    let plus: String = "+".repeat(fix.replacement.len().max(1));
    out.push_str(&format!(
        " {} {} {}{}\n",
        " ".repeat(width),
        "|".cyan().bold(),
        pad,
        plus.green().bold()
    ));
    Some(out)
}

/// Accumulates diagnostics across one compilation. Insertion-ordered,
/// never deduplicates, never panics.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn emit_error(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::error(code, message, span));
    }

    pub fn emit_warning(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::warning(code, message, span));
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.emit(d);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        self.warning_count = 0;
        std::mem::take(&mut self.diagnostics)
    }

    /// Print all diagnostics to stderr with source snippets.
    pub fn print_all(&self, sources: &SourceMap) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.render(sources));
        }
    }

    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }
        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }

    /// Serialize all diagnostics using the stable JSON schema. One object
    /// per diagnostic under a top-level "diagnostics" array.
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct Document<'a> {
            diagnostics: &'a [Diagnostic],
        }
        serde_json::to_string_pretty(&Document {
            diagnostics: &self.diagnostics,
        })
        .unwrap_or_else(|_| "{\"diagnostics\":[]}".to_string())
    }
}

/// Fuzzy matching for "did you mean?" suggestions.
pub mod fuzzy {
    use strsim::jaro_winkler;

    /// Rank `candidates` by Jaro-Winkler similarity to `target`, keeping
    /// those above `threshold`, best first.
    pub fn find_similar_names(
        target: &str,
        candidates: &[String],
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), jaro_winkler(target, candidate)))
            .filter(|(_, score)| *score > threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }

    /// Default suggestion query used by the checker: threshold 0.7, top 3.
    pub fn suggest(target: &str, candidates: &[String]) -> Vec<String> {
        find_similar_names(target, candidates, 0.7, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources_with(text: &str) -> SourceMap {
        let mut map = SourceMap::new();
        map.add_file("test.tml", text);
        map
    }

    #[test]
    fn span_resolution() {
        let source = "func main() -> I32 {\n    return 0\n}";
        let span = Span::from_source_range("test.tml", source, 25..31);
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 5);
        assert_eq!(span.caret_len(), 6);
    }

    #[test]
    fn render_contains_code_and_location() {
        let source = "let x = add(1, \"two\")";
        let sources = sources_with(source);
        let span = Span::from_source_range("test.tml", source, 15..20);
        let diag = Diagnostic::error("T001", "mismatched types", span)
            .with_note("expected `I32`, found `Str`");

        let rendered = diag.render(&sources);
        assert!(rendered.contains("T001"));
        assert!(rendered.contains("mismatched types"));
        assert!(rendered.contains("test.tml:1:16"));
        assert!(rendered.contains("note: expected `I32`, found `Str`"));
    }

    #[test]
    fn render_without_source_degrades() {
        let sources = SourceMap::new();
        let diag = Diagnostic::error("E001", "file not found", Span::new("gone.tml", 1, 1, 1));
        let rendered = diag.render(&sources);
        assert!(rendered.contains("E001"));
        assert!(rendered.contains("gone.tml:1:1"));
    }

    #[test]
    fn engine_counts_and_order() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error("T009", "undeclared variable `y`", Span::unknown());
        engine.emit_warning("T008", "shadowed binding", Span::unknown());
        engine.emit_error("T001", "mismatched types", Span::unknown());

        assert_eq!(engine.error_count(), 2);
        assert_eq!(engine.warning_count(), 1);
        assert!(engine.has_errors());
        let codes: Vec<&str> = engine.diagnostics().iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, ["T009", "T008", "T001"]);
    }

    #[test]
    fn json_schema_fields() {
        let mut engine = DiagnosticEngine::new();
        let span = Span::new("a.tml", 3, 7, 4);
        engine.emit(
            Diagnostic::error("B004", "cannot assign to `x` while borrowed", span.clone())
                .with_label(Span::new("a.tml", 2, 13, 5), "borrow occurs here")
                .with_fix(span, "x2", "use a fresh binding"),
        );

        let json = engine.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let diag = &value["diagnostics"][0];
        assert_eq!(diag["severity"], "error");
        assert_eq!(diag["code"], "B004");
        assert_eq!(diag["line"], 3);
        assert_eq!(diag["labels"][0]["style"], "secondary");
        assert_eq!(diag["fixes"][0]["replacement"], "x2");
    }

    #[test]
    fn fuzzy_suggestions() {
        let candidates = vec![
            "count".to_string(),
            "counter".to_string(),
            "total".to_string(),
        ];
        let found = fuzzy::suggest("coutn", &candidates);
        assert!(found.contains(&"count".to_string()));
        assert!(!found.contains(&"total".to_string()));
    }
}
