// The `tml` command line driver: lex / parse / check / build / run /
// explain. Each subcommand runs the pipeline up to its stage; errors
// render as text (or JSON with --json) and set the exit code.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;
use tml_compiler::{CodegenOptions, ModuleRegistry};
use tml_diagnostics::{Diagnostic, SourceMap};

mod explain;

#[derive(Parser)]
#[command(name = "tml")]
#[command(version = "0.2.0")]
#[command(about = "TML Programming Language Compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize a TML source file
    Lex {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        #[arg(long)]
        verbose: bool,
    },
    /// Parse a TML source file to an AST
    Parse {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        #[arg(long)]
        verbose: bool,
        /// Emit diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Type-check a TML source file
    Check {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        json: bool,
    },
    /// Compile a TML source file to an executable
    Build {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        /// Write the LLVM IR next to the output and stop
        #[arg(long)]
        emit_ir: bool,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        release: bool,
        #[arg(long)]
        no_cache: bool,
    },
    /// Compile and run a TML source file
    Run {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        #[arg(long)]
        verbose: bool,
        /// Instrument functions and when arms with coverage counters
        #[arg(long)]
        coverage: bool,
        /// Arguments passed to the program
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Explain a diagnostic code (e.g. T001, B004)
    Explain {
        #[arg(value_name = "CODE")]
        code: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error[E002]: {}", err);
            1
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Lex { input, verbose } => cmd_lex(&input, verbose),
        Commands::Parse {
            input,
            verbose,
            json,
        } => cmd_parse(&input, verbose, json),
        Commands::Check {
            input,
            verbose,
            json,
        } => cmd_check(&input, verbose, json),
        Commands::Build {
            input,
            emit_ir,
            verbose,
            release,
            no_cache,
        } => cmd_build(&input, emit_ir, verbose, release, no_cache).map(|out| match out {
            Some(_) => 0,
            None => 1,
        }),
        Commands::Run {
            input,
            verbose,
            coverage,
            args,
        } => cmd_run(&input, verbose, coverage, &args),
        Commands::Explain { code } => Ok(explain::run(&code)),
    }
}

fn read_source(input: &Path) -> Result<String> {
    std::fs::read_to_string(input)
        .map_err(|e| anyhow::anyhow!("cannot read `{}`: {} (E001)", input.display(), e))
}

fn report(diagnostics: &[Diagnostic], source: &str, file: &str, json: bool) {
    if json {
        let mut engine = tml_diagnostics::DiagnosticEngine::new();
        engine.extend(diagnostics.iter().cloned());
        println!("{}", engine.to_json());
        return;
    }
    let mut sources = SourceMap::new();
    sources.add_file(file, source);
    let mut engine = tml_diagnostics::DiagnosticEngine::new();
    engine.extend(diagnostics.iter().cloned());
    engine.print_all(&sources);
    engine.print_summary();
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.severity == tml_diagnostics::Severity::Error)
}

fn cmd_lex(input: &Path, verbose: bool) -> Result<i32> {
    let source = read_source(input)?;
    let file = input.display().to_string();
    let (tokens, diagnostics) = tml_lexer::tokenize(&source, &file);
    if verbose {
        for token in &tokens {
            println!("{:>5}..{:<5} {:?}", token.span.start, token.span.end, token.kind);
        }
    } else {
        println!("{} token(s)", tokens.len());
    }
    report(&diagnostics, &source, &file, false);
    Ok(i32::from(has_errors(&diagnostics)))
}

fn cmd_parse(input: &Path, verbose: bool, json: bool) -> Result<i32> {
    let source = read_source(input)?;
    let file = input.display().to_string();
    let (module, diagnostics) = tml_parser::parse_source_partial(&source, &file);
    if verbose && !has_errors(&diagnostics) {
        println!("{}", serde_json::to_string_pretty(&module)?);
    }
    report(&diagnostics, &source, &file, json);
    Ok(i32::from(has_errors(&diagnostics)))
}

fn cmd_check(input: &Path, verbose: bool, json: bool) -> Result<i32> {
    let source = read_source(input)?;
    let file = input.display().to_string();
    let mut registry = sibling_module_registry(input)?;
    let diagnostics = tml_compiler::check_source(&source, &file, &mut registry);
    if verbose && !has_errors(&diagnostics) {
        log::info!("check passed: {}", file);
        println!("ok");
    }
    report(&diagnostics, &source, &file, json);
    Ok(i32::from(has_errors(&diagnostics)))
}

fn cmd_build(
    input: &Path,
    emit_ir: bool,
    verbose: bool,
    release: bool,
    no_cache: bool,
) -> Result<Option<PathBuf>> {
    let source = read_source(input)?;
    let file = input.display().to_string();
    let mut registry = sibling_module_registry(input)?;

    let options = CodegenOptions::default();
    let output = tml_compiler::compile_source(&source, &file, &mut registry, options);
    report(&output.diagnostics, &source, &file, false);
    let Some(ir) = output.ir else {
        return Ok(None);
    };

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("program");
    let build_dir = input.parent().unwrap_or(Path::new(".")).join("tml-build");
    std::fs::create_dir_all(&build_dir)?;
    let ir_path = build_dir.join(format!("{}.ll", stem));
    std::fs::write(&ir_path, &ir)?;
    if verbose {
        log::info!("wrote IR to {}", ir_path.display());
    }
    if emit_ir {
        println!("{}", ir_path.display());
        return Ok(Some(ir_path));
    }

    let binary_path = build_dir.join(stem);
    let cc = std::env::var("TML_CC").unwrap_or_else(|_| "clang".to_string());
    let mut command = Command::new(&cc);
    command.arg(&ir_path).arg("-o").arg(&binary_path);
    if release {
        command.arg("-O2");
    }
    if no_cache {
        // The external compiler has no incremental state to reuse; the
        // flag is accepted for interface compatibility.
    }
    // The runtime archive sits next to the compiler when installed.
    if let Ok(runtime) = std::env::var("TML_RUNTIME") {
        command.arg(runtime);
    }
    let status = command
        .status()
        .map_err(|e| anyhow::anyhow!("failed to invoke `{}`: {} (E004)", cc, e))?;
    if !status.success() {
        anyhow::bail!("C compiler failed with {} (C010)", status);
    }
    Ok(Some(binary_path))
}

fn cmd_run(input: &Path, verbose: bool, coverage: bool, args: &[String]) -> Result<i32> {
    let source = read_source(input)?;
    let file = input.display().to_string();
    let mut registry = sibling_module_registry(input)?;

    let options = CodegenOptions {
        coverage,
        ..CodegenOptions::default()
    };
    let output = tml_compiler::compile_source(&source, &file, &mut registry, options);
    report(&output.diagnostics, &source, &file, false);
    let Some(ir) = output.ir else {
        return Ok(1);
    };

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("program");
    let build_dir = input.parent().unwrap_or(Path::new(".")).join("tml-build");
    std::fs::create_dir_all(&build_dir)?;
    let ir_path = build_dir.join(format!("{}.ll", stem));
    std::fs::write(&ir_path, &ir)?;
    let binary_path = build_dir.join(stem);

    let cc = std::env::var("TML_CC").unwrap_or_else(|_| "clang".to_string());
    let mut command = Command::new(&cc);
    command.arg(&ir_path).arg("-o").arg(&binary_path);
    if let Ok(runtime) = std::env::var("TML_RUNTIME") {
        command.arg(runtime);
    }
    let status = command
        .status()
        .map_err(|e| anyhow::anyhow!("failed to invoke `{}`: {} (E004)", cc, e))?;
    if !status.success() {
        anyhow::bail!("C compiler failed with {} (C010)", status);
    }
    if verbose {
        log::info!("running {}", binary_path.display());
    }

    let status = Command::new(&binary_path)
        .args(args)
        .status()
        .map_err(|e| anyhow::anyhow!("failed to run `{}`: {}", binary_path.display(), e))?;
    Ok(status.code().unwrap_or(1))
}

/// Register sibling `.tml` files as importable modules, keyed by their
/// file stem. Nested module paths come from subdirectories.
fn sibling_module_registry(input: &Path) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    let Some(dir) = input.parent() else {
        return Ok(registry);
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(registry);
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path == input {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("tml") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(source) = std::fs::read_to_string(&path) else {
            continue;
        };
        let file_name = path.display().to_string();
        let (module, diagnostics) = tml_parser::parse_source_partial(&source, &file_name);
        if has_errors(&diagnostics) {
            // Broken siblings surface when they are imported.
            continue;
        }
        registry.register(stem, module, source, file_name);
    }
    Ok(registry)
}
