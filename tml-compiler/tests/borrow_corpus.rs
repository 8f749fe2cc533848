// Borrow-checker corpus: programs that must produce specific B-codes,
// and programs that must come through clean.

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
    assert!(codes.is_empty(), "expected no errors, got {:?}:\n{}", codes, source);
}

// ==================== should-error ====================

#[test]
fn use_after_move_is_b001() {
    expect_code(
        "func main() -> I32 {\n\
             let s = \"hello\"\n\
             let t = s\n\
             print(s)\n\
             return 0\n\
         }",
        "B001",
    );
}

#[test]
fn move_while_borrowed_is_b002() {
    expect_code(
        "func consume(s: Str) { print(s) }\n\
         func main() -> I32 {\n\
             let s = \"data\"\n\
             let r = ref s\n\
             let t = s\n\
             print(*r)\n\
             return 0\n\
         }",
        "B002",
    );
}

#[test]
fn assign_while_borrowed_is_b004() {
    expect_code(
        "func main() -> I32 {\n\
             var x = 1\n\
             let r = ref x\n\
             x = 2\n\
             return r\n\
         }",
        "B004",
    );
}

#[test]
fn borrow_after_move_is_b005() {
    expect_code(
        "func main() -> I32 {\n\
             let s = \"text\"\n\
             let t = s\n\
             let r = ref s\n\
             return 0\n\
         }",
        "B005",
    );
}

#[test]
fn mut_borrow_of_let_is_b006() {
    expect_code(
        "func main() -> I32 {\n\
             let x = 1\n\
             let r = ref mut x\n\
             return 0\n\
         }",
        "B006",
    );
}

#[test]
fn mut_borrow_while_shared_is_b007() {
    expect_code(
        "func main() -> I32 {\n\
             var x = 1\n\
             let a = ref x\n\
             let b = ref mut x\n\
             return *a\n\
         }",
        "B007",
    );
}

#[test]
fn double_mut_borrow_is_b008() {
    expect_code(
        "func main() -> I32 {\n\
             var x = 1\n\
             let a = ref mut x\n\
             let b = ref mut x\n\
             return 0\n\
         }",
        "B008",
    );
}

#[test]
fn return_local_ref_is_b010() {
    expect_code(
        "func leak() -> ref I32 {\n\
             let x = 1\n\
             return ref x\n\
         }\n\
         func main() -> I32 { return 0 }",
        "B010",
    );
}

#[test]
fn partial_move_is_b011() {
    expect_code(
        "struct Pair { left: Str, right: Str }\n\
         func main() -> I32 {\n\
             let p = Pair { left: \"a\", right: \"b\" }\n\
             let l = p.left\n\
             let again = p.left\n\
             return 0\n\
         }",
        "B011",
    );
}

#[test]
fn whole_use_after_partial_move_is_b016() {
    expect_code(
        "struct Pair { left: Str, right: Str }\n\
         func consume(p: Pair) { }\n\
         func main() -> I32 {\n\
             let p = Pair { left: \"a\", right: \"b\" }\n\
             let l = p.left\n\
             consume(p)\n\
             return 0\n\
         }",
        "B016",
    );
}

#[test]
fn closure_capture_after_move_is_b014() {
    expect_code(
        "func main() -> I32 {\n\
             let s = \"gone\"\n\
             let t = s\n\
             let f = do() { print(s) }\n\
             return 0\n\
         }",
        "B014",
    );
}

#[test]
fn move_in_one_branch_poisons_the_join() {
    expect_code(
        "func consume(s: Str) { }\n\
         func main() -> I32 {\n\
             let s = \"maybe\"\n\
             if true { consume(s) } else { }\n\
             print(s)\n\
             return 0\n\
         }",
        "B001",
    );
}

// ==================== should-accept ====================

#[test]
fn copies_do_not_move() {
    expect_clean(
        "func main() -> I32 {\n\
             let x = 1\n\
             let y = x\n\
             return x + y\n\
         }",
    );
}

#[test]
fn sibling_fields_stay_usable() {
    expect_clean(
        "struct Pair { left: Str, right: Str }\n\
         func main() -> I32 {\n\
             let p = Pair { left: \"a\", right: \"b\" }\n\
             let l = p.left\n\
             let r = p.right\n\
             return 0\n\
         }",
    );
}

#[test]
fn sequential_shared_borrows_are_fine() {
    expect_clean(
        "func main() -> I32 {\n\
             var x = 1\n\
             let a = ref x\n\
             let b = ref x\n\
             return *a + *b\n\
         }",
    );
}

#[test]
fn reassignment_after_scoped_borrow() {
    expect_clean(
        "func main() -> I32 {\n\
             var x = 1\n\
             {\n\
                 let r = ref x\n\
                 print_int(*r as I64)\n\
             }\n\
             x = 2\n\
             return x\n\
         }",
    );
}

#[test]
fn closure_reads_are_shared_captures() {
    expect_clean(
        "func main() -> I32 {\n\
             let base = 10\n\
             let add = do(x) { x + base }\n\
             return add(5)\n\
         }",
    );
}

#[test]
fn mutating_closure_on_var_is_fine() {
    expect_clean(
        "func main() -> I32 {\n\
             var n = 10\n\
             let add = do(x) { n = n + x }\n\
             add(5)\n\
             add(7)\n\
             return n\n\
         }",
    );
}

#[test]
fn references_do_not_consume() {
    expect_clean(
        "func show(s: ref Str) { }\n\
         func main() -> I32 {\n\
             let s = \"keep\"\n\
             show(ref s)\n\
             print(s)\n\
             return 0\n\
         }",
    );
}
