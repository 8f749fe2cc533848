// The TML compiler core: semantic types, type checking (with borrow
// analysis), module registry, and LLVM textual IR generation. The
// pipeline runs each stage to completion and stops at the first stage
// that reports errors.

pub mod borrow;
pub mod codegen;
pub mod env;
pub mod module_registry;
pub mod ty;
pub mod typeck;

pub use borrow::BorrowChecker;
pub use codegen::{
    demangle_type, mangle_name, mangle_type, CodegenError, CodegenOptions, LlvmIrGen,
};
pub use env::TypeEnv;
pub use module_registry::ModuleRegistry;
pub use ty::Ty;
pub use typeck::{check_module, CheckResult};

use tml_diagnostics::{Diagnostic, Span};

/// Smart pointer type heads that participate in field/method auto-deref.
pub(crate) fn typeck_is_smart_pointer(name: &str) -> bool {
    matches!(name, "Arc" | "Rc" | "Shared" | "Box" | "Heap")
}

/// Outcome of a full front-to-back compilation of one file.
pub struct CompileOutput {
    pub ir: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run lexer, parser, checker, borrow analysis, and IR generation over
/// one source buffer. Each stage's errors suppress the following
/// stages; warnings flow through.
pub fn compile_source(
    source: &str,
    file_name: &str,
    registry: &mut ModuleRegistry,
    options: CodegenOptions,
) -> CompileOutput {
    log::debug!("compiling {} ({} bytes)", file_name, source.len());
    let (module, mut diagnostics) = tml_parser::parse_source_partial(source, file_name);
    if has_errors(&diagnostics) {
        return CompileOutput {
            ir: None,
            diagnostics,
        };
    }

    let check = check_module(&module, source, file_name, registry);
    diagnostics.extend(check.diagnostics);
    if has_errors(&diagnostics) {
        return CompileOutput {
            ir: None,
            diagnostics,
        };
    }

    let borrow_diags = BorrowChecker::new(source, file_name, &check.env).check_module(&module);
    diagnostics.extend(borrow_diags);
    if has_errors(&diagnostics) {
        return CompileOutput {
            ir: None,
            diagnostics,
        };
    }

    let generator = LlvmIrGen::new(&check.env, &module, options);
    match generator.generate() {
        Ok(ir) => {
            log::debug!("emitted {} bytes of IR for {}", ir.len(), file_name);
            CompileOutput {
                ir: Some(ir),
                diagnostics,
            }
        }
        Err(errors) => {
            for err in errors {
                let span = err
                    .span
                    .as_ref()
                    .map(|s| Span::from_source_range(file_name, source, s.clone()))
                    .unwrap_or_else(Span::unknown);
                diagnostics.push(Diagnostic::error(&err.code, err.message.clone(), span));
            }
            CompileOutput {
                ir: None,
                diagnostics,
            }
        }
    }
}

/// Run the pipeline through the type checker only (`check` command).
pub fn check_source(
    source: &str,
    file_name: &str,
    registry: &mut ModuleRegistry,
) -> Vec<Diagnostic> {
    let (module, mut diagnostics) = tml_parser::parse_source_partial(source, file_name);
    if has_errors(&diagnostics) {
        return diagnostics;
    }
    let check = check_module(&module, source, file_name, registry);
    diagnostics.extend(check.diagnostics);
    if !has_errors(&diagnostics) {
        let borrow_diags = BorrowChecker::new(source, file_name, &check.env).check_module(&module);
        diagnostics.extend(borrow_diags);
    }
    diagnostics
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.severity == tml_diagnostics::Severity::Error)
}
