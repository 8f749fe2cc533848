// End-to-end IR landmark tests: source in, textual LLVM out, asserted
// against the structural landmarks each scenario must produce.

use tml_compiler::{compile_source, CodegenOptions, ModuleRegistry};

fn compile(source: &str) -> String {
    let mut registry = ModuleRegistry::new();
    let output = compile_source(source, "test.tml", &mut registry, CodegenOptions::default());
    if output.ir.is_none() {
        panic!(
            "expected successful compilation, got diagnostics: {:#?}",
            output.diagnostics
        );
    }
    output.ir.unwrap_or_default()
}

fn expect_codes(source: &str, codes: &[&str]) {
    let mut registry = ModuleRegistry::new();
    let output = compile_source(source, "test.tml", &mut registry, CodegenOptions::default());
    assert!(output.ir.is_none(), "expected failure, got IR");
    for code in codes {
        assert!(
            output.diagnostics.iter().any(|d| d.code == *code),
            "expected {} in {:?}",
            code,
            output
                .diagnostics
                .iter()
                .map(|d| (d.code.clone(), d.message.clone()))
                .collect::<Vec<_>>()
        );
    }
}

#[test]
fn s1_hello() {
    let ir = compile(r#"func main() -> I32 { print("hello"); return 0 }"#);
    assert!(
        ir.contains("@.str.0 = private unnamed_addr constant [6 x i8] c\"hello\\00\""),
        "missing hello constant in:\n{}",
        ir
    );
    assert!(ir.contains("call void @tml_print(ptr @.str.0)"), "{}", ir);
    assert!(ir.contains("ret i32 0"), "{}", ir);
    assert!(ir.contains("%ret = call i32 @tml_main()"), "{}", ir);
    assert!(ir.contains("target triple"), "{}", ir);
}

#[test]
fn s2_generic_instantiation() {
    let ir = compile(
        "func id[T](x: T) -> T { return x }\n\
         func main() -> I32 { return id[I32](7) }",
    );
    assert!(ir.contains("@tml_id__I32(i32 %x)"), "{}", ir);
    assert!(ir.contains("call i32 @tml_id__I32(i32 7)"), "{}", ir);
}

#[test]
fn s3_maybe_and_match() {
    let ir = compile(
        "func first(xs: Array[I32; 3]) -> Maybe[I32] {\n\
             if xs.len() == 0 { return Nothing } else { return Just(xs[0]) }\n\
         }\n\
         func main() -> I32 {\n\
             let m = first([4,5,6])\n\
             when m { Just(v) => return v, Nothing => return -1 }\n\
         }",
    );
    assert!(ir.contains("%struct.Maybe__I32"), "{}", ir);
    // Just stores tag 1.
    assert!(ir.contains("store i32 1, ptr"), "{}", ir);
    // The when arm compares the tag and extracts the payload.
    assert!(ir.contains("icmp eq i32"), "{}", ir);
    assert!(ir.contains("alloca %struct.Maybe__I32"), "{}", ir);
}

#[test]
fn s4_borrow_rejection() {
    let source = "func main() -> I32 {\n\
                      var x = 1\n\
                      let r = ref x\n\
                      x = 2\n\
                      return r\n\
                  }";
    let mut registry = ModuleRegistry::new();
    let output = compile_source(source, "test.tml", &mut registry, CodegenOptions::default());
    assert!(output.ir.is_none(), "borrow error must suppress IR");
    let errors: Vec<_> = output
        .diagnostics
        .iter()
        .filter(|d| d.severity == tml_diagnostics::Severity::Error)
        .collect();
    assert_eq!(
        errors.len(),
        1,
        "expected exactly one diagnostic, got {:#?}",
        errors
    );
    assert_eq!(errors[0].code, "B004");
    // The primary span covers the assignment on line 4.
    assert_eq!(errors[0].span.line, 4);
}

#[test]
fn s5_virtual_dispatch() {
    let ir = compile(
        "class Animal { virtual func speak(this) -> Str { return \"?\" } }\n\
         class Dog extends Animal { override func speak(this) -> Str { return \"woof\" } }\n\
         func main() -> I32 { let a: Animal = new Dog()\n print(a.speak())\n return 0 }",
    );
    assert!(ir.contains("@vtable.Animal"), "{}", ir);
    assert!(ir.contains("@vtable.Dog"), "{}", ir);
    assert!(ir.contains("@tml_Dog_speak"), "{}", ir);
    // new Dog(): sizeof via GEP-null then malloc, then vtable store.
    assert!(ir.contains("getelementptr %class.Dog, ptr null, i32 1"), "{}", ir);
    assert!(ir.contains("call ptr @malloc"), "{}", ir);
    assert!(ir.contains("store ptr @vtable.Dog"), "{}", ir);
    // The call site loads a function pointer and calls indirectly.
    let has_indirect = ir
        .lines()
        .any(|line| line.trim_start().starts_with("%") && line.contains("= call ptr %t"));
    assert!(has_indirect, "expected an indirect call in:\n{}", ir);
}

#[test]
fn s6_closure_capture() {
    let ir = compile(
        "func main() -> I32 {\n\
             var n = 10\n\
             let add = do(x) { n = n + x }\n\
             add(5)\n\
             add(7)\n\
             return n\n\
         }",
    );
    // The closure value is a fat pointer.
    assert!(ir.contains("alloca { ptr, ptr }"), "{}", ir);
    assert!(ir.contains("insertvalue { ptr, ptr }"), "{}", ir);
    // The trampoline takes the environment first.
    assert!(ir.contains("@tml_closure_1(ptr %env, i32 %x)"), "{}", ir);
    // Two call sites dispatch through extractvalue.
    let extracts = ir.matches("extractvalue { ptr, ptr }").count();
    assert!(extracts >= 4, "expected 2 fat-pointer call sites:\n{}", ir);
}

#[test]
fn monomorphization_totality() {
    // Every call site's mangled callee has a definition.
    let ir = compile(
        "func id[T](x: T) -> T { return x }\n\
         func main() -> I32 {\n\
             let a = id[I32](1)\n\
             let b = id[I64](2i64)\n\
             let c = id[Bool](true)\n\
             return a\n\
         }",
    );
    for mangled in ["@tml_id__I32", "@tml_id__I64", "@tml_id__Bool"] {
        assert!(
            ir.contains(&format!("define internal")) && ir.contains(mangled),
            "missing instantiation {} in:\n{}",
            mangled,
            ir
        );
        let defined = ir
            .lines()
            .any(|l| l.starts_with("define") && l.contains(mangled));
        assert!(defined, "{} referenced but never defined:\n{}", mangled, ir);
    }
}

#[test]
fn try_operator_lowering() {
    let ir = compile(
        "func safe_div(a: I32, b: I32) -> Outcome[I32, Str] {\n\
             if b == 0 { return Err(\"division by zero\") }\n\
             return Ok(a / b)\n\
         }\n\
         func compute() -> Outcome[I32, Str] {\n\
             let x = safe_div(10, 2)!\n\
             return Ok(x + 1)\n\
         }\n\
         func main() -> I32 { return 0 }",
    );
    assert!(ir.contains("%struct.Outcome__I32__Str"), "{}", ir);
    // The try branches on the tag.
    assert!(ir.contains("try_ok"), "{}", ir);
    assert!(ir.contains("try_err"), "{}", ir);
}

#[test]
fn enum_payload_when_guards() {
    let ir = compile(
        "enum Shape { Circle(I32), Rect(I32, I32), Empty }\n\
         func area(s: Shape) -> I32 {\n\
             when s {\n\
                 Circle(r) if r > 10 => return r * r * 3,\n\
                 Circle(r) => return r * r,\n\
                 Rect(w, h) => return w * h,\n\
                 Empty => return 0,\n\
             }\n\
         }\n\
         func main() -> I32 { return area(Circle(2)) }",
    );
    assert!(ir.contains("%struct.Shape"), "{}", ir);
    assert!(ir.contains("when_guarded"), "{}", ir);
}

#[test]
fn coverage_instrumentation() {
    let mut registry = ModuleRegistry::new();
    let options = CodegenOptions {
        coverage: true,
        ..CodegenOptions::default()
    };
    let output = compile_source(
        "func main() -> I32 { return 0 }",
        "test.tml",
        &mut registry,
        options,
    );
    let ir = output.ir.expect("compiles");
    assert!(ir.contains("call void @tml_cov_hit(i32 0)"), "{}", ir);
    assert!(ir.contains("call void @print_coverage_report()"), "{}", ir);
}

#[test]
fn test_runner_main() {
    let ir = compile(
        "@test\nfunc check_math() { assert_eq(4, 4) }\n\
         @test\nfunc check_more() { assert_eq(5, 5) }",
    );
    assert!(ir.contains("Auto-generated test runner"), "{}", ir);
    assert!(ir.contains("call void @tml_check_math()"), "{}", ir);
    assert!(ir.contains("call void @tml_check_more()"), "{}", ir);
}

#[test]
fn bench_runner_main() {
    let ir = compile("@bench\nfunc tight_loop() { var n = 0\n n = n + 1 }");
    assert!(ir.contains("Auto-generated benchmark runner"), "{}", ir);
    assert!(ir.contains("call i64 @time_us()"), "{}", ir);
    assert!(ir.contains("icmp slt i32 %bench_iter_0, 1000"), "{}", ir);
}

#[test]
fn pure_functions_get_attribute_group() {
    let ir = compile(
        "func add(a: I32, b: I32) -> I32 { return a + b }\n\
         func main() -> I32 { return add(1, 2) }",
    );
    assert!(ir.contains("@tml_add(i32 %a, i32 %b) #0"), "{}", ir);
    assert!(
        ir.contains("attributes #0 = { nounwind mustprogress willreturn }"),
        "{}",
        ir
    );
}

#[test]
fn interpolated_string_concat() {
    let ir = compile(
        "func main() -> I32 {\n\
             let name = \"world\"\n\
             print(\"hello ${name}\")\n\
             return 0\n\
         }",
    );
    assert!(ir.contains("call ptr @tml_str_concat"), "{}", ir);
    assert!(ir.contains("declare ptr @tml_str_concat(ptr, ptr)"), "{}", ir);
}

#[test]
fn allocates_decorator_gets_drop_glue() {
    let ir = compile(
        "@allocates\nfunc label_for(n: I64) -> Str { return int_to_str(n) }\n\
         func main() -> I32 {\n\
             let s = label_for(7)\n\
             print(s)\n\
             return 0\n\
         }",
    );
    assert!(ir.contains("call void @tml_str_free"), "{}", ir);
}

#[test]
fn type_errors_stop_codegen() {
    expect_codes("func main() -> I32 { return \"nope\" }", &["T016"]);
    expect_codes(
        "func main() -> I32 { let x: I32 = true\n return 0 }",
        &["T001"],
    );
    expect_codes("func main() -> I32 { return missing() }", &["T003"]);
}
