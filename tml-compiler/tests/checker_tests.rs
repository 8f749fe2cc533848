// Type-checker diagnostics: one test per family of T-codes, plus the
// module-registry paths (imports, cycles).

use tml_ast::Module;
use tml_compiler::{check_source, ModuleRegistry};
use tml_diagnostics::Severity;

fn codes_of(source: &str) -> Vec<String> {
    let mut registry = ModuleRegistry::new();
    check_source(source, "test.tml", &mut registry)
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.code)
        .collect()
}

fn expect_code(source: &str, code: &str) {
    let codes = codes_of(source);
    assert!(
        codes.iter().any(|c| c == code),
        "expected {} in {:?} for:\n{}",
        code,
        codes,
        source
    );
}

fn expect_clean(source: &str) {
    let codes = codes_of(source);
    assert!(codes.is_empty(), "expected clean, got {:?}:\n{}", codes, source);
}

fn parse(source: &str, file: &str) -> Module {
    let (module, diags) = tml_parser::parse_source_partial(source, file);
    assert!(diags.is_empty(), "parse errors: {:?}", diags);
    module
}

#[test]
fn type_mismatch_t001() {
    expect_code("func main() -> I32 { let x: Bool = 3\n return 0 }", "T001");
}

#[test]
fn unknown_type_t002() {
    expect_code("func f(x: Nonexistent) { }", "T002");
}

#[test]
fn arity_t004() {
    expect_code(
        "func add(a: I32, b: I32) -> I32 { return a + b }\n\
         func main() -> I32 { return add(1) }",
        "T004",
    );
}

#[test]
fn undeclared_t009_with_suggestion() {
    let mut registry = ModuleRegistry::new();
    let diags = check_source(
        "func main() -> I32 { let count = 1\n return coutn }",
        "test.tml",
        &mut registry,
    );
    let t009 = diags.iter().find(|d| d.code == "T009").expect("T009");
    assert!(
        t009.message.contains("did you mean"),
        "suggestion missing: {}",
        t009.message
    );
}

#[test]
fn immutable_assignment_t013() {
    expect_code("func main() -> I32 { let x = 1\n x = 2\n return x }", "T013");
}

#[test]
fn condition_not_bool_t014() {
    expect_code("func main() -> I32 { if 1 { return 0 }\n return 1 }", "T014");
}

#[test]
fn missing_return_t029() {
    expect_code("func f(x: I32) -> I32 { let y = x }", "T029");
}

#[test]
fn break_outside_loop_t030() {
    expect_code("func main() -> I32 { break\n return 0 }", "T030");
}

#[test]
fn await_outside_async_t032() {
    expect_code(
        "func slow() -> I32 { return 1 }\n\
         func main() -> I32 { return slow().await }",
        "T032",
    );
}

#[test]
fn try_on_wrong_type_t033() {
    expect_code("func main() -> I32 { return compute()! }\nfunc compute() -> I32 { return 1 }", "T033");
}

#[test]
fn variant_arity_t034() {
    expect_code(
        "func main() -> I32 { let m: Maybe[I32] = Just(1, 2)\n return 0 }",
        "T034",
    );
}

#[test]
fn exhaustiveness_t037_names_witness() {
    let mut registry = ModuleRegistry::new();
    let diags = check_source(
        "enum Light { Red, Yellow, Green }\n\
         func act(l: Light) -> I32 {\n\
             when l { Red => return 0, Green => return 1 }\n\
         }",
        "test.tml",
        &mut registry,
    );
    let t037 = diags.iter().find(|d| d.code == "T037").expect("T037");
    assert!(
        t037.message.contains("Yellow"),
        "witness missing: {}",
        t037.message
    );
}

#[test]
fn bool_when_needs_both_sides() {
    expect_code(
        "func f(b: Bool) -> I32 { when b { true => return 1 } }",
        "T037",
    );
    expect_clean(
        "func f(b: Bool) -> I32 { when b { true => return 1, false => return 0 } }",
    );
}

#[test]
fn duplicate_definition_t008() {
    expect_code("func f() { }\nfunc f() { }", "T008");
}

#[test]
fn abstract_instantiation_t040() {
    expect_code(
        "@abstract\nclass Base { virtual func work(this) -> I32 }\n\
         func main() -> I32 { let b = new Base()\n return 0 }",
        "T040",
    );
}

#[test]
fn value_class_virtual_t042() {
    expect_code(
        "@value\nclass Vec2 { x: F64, y: F64\n virtual func norm(this) -> F64 { return 0.0 } }",
        "T042",
    );
}

#[test]
fn pool_value_conflict_t044() {
    expect_code("@pool\n@value\nclass Buf { data: I64 }", "T044");
}

#[test]
fn missing_abstract_impl_t045() {
    expect_code(
        "@abstract\nclass Shape { virtual func area(this) -> I32 }\n\
         class Square extends Shape { side: I32 }",
        "T045",
    );
}

#[test]
fn base_class_not_found_t046() {
    expect_code("class Dog extends Animal { }", "T046");
}

#[test]
fn override_without_base_t063() {
    expect_code(
        "class Lone { override func f(this) -> I32 { return 1 } }",
        "T063",
    );
}

#[test]
fn override_of_non_virtual_t064() {
    expect_code(
        "class A { func f(this) -> I32 { return 1 } }\n\
         class B extends A { override func f(this) -> I32 { return 2 } }",
        "T064",
    );
}

#[test]
fn override_not_found_t065() {
    expect_code(
        "class A { }\n\
         class B extends A { override func ghost(this) -> I32 { return 2 } }",
        "T065",
    );
}

#[test]
fn override_signature_mismatch_t058() {
    expect_code(
        "class A { virtual func f(this, x: I32) -> I32 { return x } }\n\
         class B extends A { override func f(this, x: Str) -> I32 { return 0 } }",
        "T058",
    );
}

#[test]
fn inheritance_cycle_t039() {
    expect_code(
        "class A extends B { }\nclass B extends A { }",
        "T039",
    );
}

#[test]
fn behavior_impl_missing_method_t026() {
    expect_code(
        "behavior Printable { func fmt(this) -> Str }\n\
         struct Point { x: I32 }\n\
         impl Printable for Point { }",
        "T026",
    );
}

#[test]
fn behavior_default_fills_gap() {
    expect_clean(
        "behavior Greet {\n\
             func name(this) -> Str\n\
             func hello(this) -> Str { return \"hi\" }\n\
         }\n\
         struct Person { age: I32 }\n\
         impl Greet for Person { func name(this) -> Str { return \"p\" } }",
    );
}

#[test]
fn const_division_by_zero_t020() {
    expect_code("const BAD = 1 / 0", "T020");
}

#[test]
fn class_hierarchy_accepts_valid_tree() {
    expect_clean(
        "class Animal { name: Str\n virtual func speak(this) -> Str { return \"?\" } }\n\
         class Dog extends Animal { override func speak(this) -> Str { return \"woof\" } }\n\
         class Puppy extends Dog { }\n\
         func main() -> I32 { let p: Animal = new Puppy()\n return 0 }",
    );
}

#[test]
fn generic_inference_defaults_and_t007() {
    expect_code(
        "func make[T]() -> T { return make[T]() }\n\
         func main() -> I32 { let x = make()\n return 0 }",
        "T007",
    );
    expect_clean(
        "func id[T](x: T) -> T { return x }\n\
         func main() -> I32 { return id(41) + 1 }",
    );
}

// ==================== Modules ====================

#[test]
fn import_resolves_and_call_checks() {
    let mut registry = ModuleRegistry::new();
    let helper_src = "pub func square(x: I32) -> I32 { return x * x }";
    let helper = parse(helper_src, "mathx.tml");
    registry.register("mathx", helper, helper_src.to_string(), "mathx.tml".to_string());

    let diags = check_source(
        "use mathx::square\n\
         func main() -> I32 { return square(4) }",
        "test.tml",
        &mut registry,
    );
    assert!(diags.is_empty(), "unexpected: {:?}", diags);
}

#[test]
fn import_alias_binds_local_name() {
    let mut registry = ModuleRegistry::new();
    let helper_src = "pub func square(x: I32) -> I32 { return x * x }";
    let helper = parse(helper_src, "mathx.tml");
    registry.register("mathx", helper, helper_src.to_string(), "mathx.tml".to_string());

    let diags = check_source(
        "use mathx::square as sq\n\
         func main() -> I32 { return sq(3) }",
        "test.tml",
        &mut registry,
    );
    assert!(diags.is_empty(), "unexpected: {:?}", diags);
}

#[test]
fn missing_module_t027() {
    expect_code(
        "use ghosts::summon\nfunc main() -> I32 { return 0 }",
        "T027",
    );
}
