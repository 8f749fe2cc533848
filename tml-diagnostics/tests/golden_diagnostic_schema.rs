use jsonschema::Validator;
use serde_json::Value;
use std::fs;
use tml_diagnostics::{Diagnostic, DiagnosticEngine, Span};

#[test]
fn diagnostics_json_matches_schema() {
    let mut engine = DiagnosticEngine::new();

    let span = Span::new("main.tml".to_string(), 2, 5, 3);
    let borrow_span = Span::new("main.tml".to_string(), 1, 13, 5);

    let diag = Diagnostic::error("B004", "cannot assign to `x` while it is borrowed", span.clone())
        .with_label(borrow_span, "borrow of `x` occurs here")
        .with_note("the borrow is later used")
        .with_help("move the assignment after the last use of the reference")
        .with_fix(span, "x2", "assign to a fresh binding instead");

    engine.emit(diag);
    engine.emit_warning("T008", "duplicate definition of `helper`", Span::new("lib.tml", 9, 1, 6));

    let json = engine.to_json();
    let v: Value = serde_json::from_str(&json).expect("valid json");

    let schema_str = fs::read_to_string("schemas/diagnostic.schema.json").expect("schema exists");
    let schema_json: Value = serde_json::from_str(&schema_str).expect("valid schema");
    let compiled = Validator::new(&schema_json).expect("valid schema compiles");

    let messages: Vec<String> = match compiled.validate(&v) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|err| err.to_string()).collect(),
    };
    for message in messages {
        panic!("schema validation error: {}", message);
    }
}

#[test]
fn json_is_stable_across_runs() {
    let build = || {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error("T001", "mismatched types", Span::new("a.tml", 1, 1, 3));
        engine.emit_error("L002", "unterminated string literal", Span::new("a.tml", 2, 9, 1));
        engine.to_json()
    };
    assert_eq!(build(), build());
}
