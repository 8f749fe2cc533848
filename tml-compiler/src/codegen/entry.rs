// Module header, runtime declarations, string constants, and @main
// synthesis: forward the user main, or run @test / @bench functions.

use super::LlvmIrGen;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn render_header(&self) -> String {
        format!(
            "; ModuleID = '{}'\nsource_filename = \"{}\"\ntarget triple = \"{}\"\n\n",
            self.module.name, self.module.name, self.options.target_triple
        )
    }

    /// Declarations for every external symbol actually referenced.
    pub(crate) fn render_runtime_decls(&self) -> String {
        let mut out = String::new();
        out.push_str("; Runtime declarations\n");
        for name in &self.used_runtime {
            let decl = match *name {
                "malloc" => "declare ptr @malloc(i64)",
                "free" => "declare void @free(ptr)",
                "exit" => "declare void @exit(i32)",
                "tml_print" => "declare void @tml_print(ptr)",
                "tml_println" => "declare void @tml_println(ptr)",
                "tml_eprint" => "declare void @tml_eprint(ptr)",
                "tml_print_int" => "declare void @tml_print_int(i64)",
                "tml_print_float" => "declare void @tml_print_float(double)",
                "tml_str_len" => "declare i64 @tml_str_len(ptr)",
                "tml_str_concat" => "declare ptr @tml_str_concat(ptr, ptr)",
                "tml_str_eq" => "declare i1 @tml_str_eq(ptr, ptr)",
                "tml_str_dup" => "declare ptr @tml_str_dup(ptr)",
                "tml_str_free" => "declare void @tml_str_free(ptr)",
                "tml_int_to_str" => "declare ptr @tml_int_to_str(i64)",
                "tml_float_to_str" => "declare ptr @tml_float_to_str(double)",
                "tml_bool_to_str" => "declare ptr @tml_bool_to_str(i1)",
                "time_us" => "declare i64 @time_us()",
                "time_ns" => "declare i64 @time_ns()",
                "tml_cov_hit" => "declare void @tml_cov_hit(i32)",
                "print_coverage_report" => "declare void @print_coverage_report()",
                "llvm.memcpy" => {
                    "declare void @llvm.memcpy.p0.p0.i64(ptr, ptr, i64, i1)"
                }
                "llvm.lifetime.start" => {
                    "declare void @llvm.lifetime.start.p0(i64, ptr)"
                }
                "llvm.lifetime.end" => "declare void @llvm.lifetime.end.p0(i64, ptr)",
                "llvm.sqrt.f64" => "declare double @llvm.sqrt.f64(double)",
                "llvm.abs.i64" => "declare i64 @llvm.abs.i64(i64, i1)",
                _ => continue,
            };
            out.push_str(decl);
            out.push('\n');
        }
        out
    }

    pub(crate) fn render_string_constants(&self) -> String {
        if self.string_order.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        out.push_str("; String constants\n");
        for (label, value) in &self.string_order {
            let encoded = encode_c_string(value);
            out.push_str(&format!(
                "{} = private unnamed_addr constant [{} x i8] c\"{}\"\n",
                label,
                value.len() + 1,
                encoded
            ));
        }
        out.push('\n');
        out
    }

    /// Entry point synthesis: user main, the @test runner, or the
    /// @bench runner with 1000-iteration timing loops.
    pub(crate) fn synthesize_main(&mut self) -> String {
        let mut tests = Vec::new();
        let mut benches = Vec::new();
        let mut has_user_main = false;
        collect_entry_functions(
            &self.module.decls,
            &mut tests,
            &mut benches,
            &mut has_user_main,
        );

        let mut out = String::new();
        if !benches.is_empty() {
            self.runtime("time_us");
            out.push_str("; Auto-generated benchmark runner\n");
            out.push_str("define i32 @main(i32 %argc, ptr %argv) {\n");
            out.push_str("entry:\n");
            let mut prev_block = "entry".to_string();
            for (i, bench) in benches.iter().enumerate() {
                let header = format!("bench_loop_header_{}", i);
                let body = format!("bench_loop_body_{}", i);
                let done = format!("bench_loop_end_{}", i);
                out.push_str(&format!("  %bench_start_{} = call i64 @time_us()\n", i));
                out.push_str(&format!("  br label %{}\n\n", header));
                out.push_str(&format!("{}:\n", header));
                out.push_str(&format!(
                    "  %bench_iter_{} = phi i32 [ 0, %{} ], [ %bench_iter_{}_next, %{} ]\n",
                    i, prev_block, i, body
                ));
                out.push_str(&format!(
                    "  %bench_cmp_{} = icmp slt i32 %bench_iter_{}, 1000\n",
                    i, i
                ));
                out.push_str(&format!(
                    "  br i1 %bench_cmp_{}, label %{}, label %{}\n\n",
                    i, body, done
                ));
                out.push_str(&format!("{}:\n", body));
                out.push_str(&format!("  call void @tml_{}()\n", bench));
                out.push_str(&format!(
                    "  %bench_iter_{}_next = add i32 %bench_iter_{}, 1\n",
                    i, i
                ));
                out.push_str(&format!("  br label %{}\n\n", header));
                out.push_str(&format!("{}:\n", done));
                out.push_str(&format!("  %bench_end_{} = call i64 @time_us()\n", i));
                out.push_str(&format!(
                    "  %bench_duration_{} = sub i64 %bench_end_{}, %bench_start_{}\n",
                    i, i, i
                ));
                out.push_str(&format!(
                    "  %bench_avg_{} = sdiv i64 %bench_duration_{}, 1000\n",
                    i, i
                ));
                prev_block = done;
            }
            out.push_str("  ret i32 0\n}\n");
        } else if !tests.is_empty() {
            out.push_str("; Auto-generated test runner\n");
            out.push_str("define i32 @main(i32 %argc, ptr %argv) {\n");
            out.push_str("entry:\n");
            for test in &tests {
                out.push_str(&format!("  call void @tml_{}()\n", test));
            }
            if self.options.coverage {
                self.runtime("print_coverage_report");
                out.push_str("  call void @print_coverage_report()\n");
            }
            out.push_str("  ret i32 0\n}\n");
        } else if has_user_main {
            out.push_str("; Entry point\n");
            out.push_str("define i32 @main(i32 %argc, ptr %argv) {\n");
            out.push_str("entry:\n");
            out.push_str("  %ret = call i32 @tml_main()\n");
            if self.options.coverage {
                self.runtime("print_coverage_report");
                out.push_str("  call void @print_coverage_report()\n");
            }
            out.push_str("  ret i32 %ret\n}\n");
        }
        out
    }
}

fn collect_entry_functions(
    decls: &[ast::Decl],
    tests: &mut Vec<String>,
    benches: &mut Vec<String>,
    has_user_main: &mut bool,
) {
    for decl in decls {
        match decl {
            ast::Decl::Func(f) => {
                if f.name == "main" {
                    *has_user_main = true;
                }
                if f.has_decorator("test") {
                    tests.push(f.name.clone());
                } else if f.has_decorator("bench") {
                    benches.push(f.name.clone());
                }
            }
            ast::Decl::Mod(m) => {
                collect_entry_functions(&m.decls, tests, benches, has_user_main)
            }
            _ => {}
        }
    }
}

/// Escape a string for a `c"…"` constant, appending the NUL terminator.
fn encode_c_string(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'"' | b'\\' => out.push_str(&format!("\\{:02X}", byte)),
            0x20..=0x7E => out.push(byte as char),
            other => out.push_str(&format!("\\{:02X}", other)),
        }
    }
    out.push_str("\\00");
    out
}
