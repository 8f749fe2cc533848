// Structural validation of emitted IR text: every `%tN` register is
// defined before use within its function, every branched-to label
// exists, every function has exactly one entry block, and nothing
// follows a terminator inside a block.

use std::collections::HashSet;
use tml_compiler::{compile_source, CodegenOptions, ModuleRegistry};

fn compile(source: &str) -> String {
    let mut registry = ModuleRegistry::new();
    let output = compile_source(source, "test.tml", &mut registry, CodegenOptions::default());
    output.ir.unwrap_or_else(|| {
        panic!("expected IR, got {:#?}", output.diagnostics);
    })
}

/// Split the module text into function bodies (text between `define`'s
/// opening `{` and its closing `}` at column zero).
fn function_bodies(ir: &str) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for line in ir.lines() {
        if line.starts_with("define") {
            current = Some((line.to_string(), Vec::new()));
            continue;
        }
        if line.starts_with('}') {
            if let Some(done) = current.take() {
                out.push(done);
            }
            continue;
        }
        if let Some((_, body)) = current.as_mut() {
            body.push(line.to_string());
        }
    }
    out
}

fn temp_registers(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 1 < bytes.len() && bytes[i + 1] == b't' {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 2 {
                found.push(text[i..j].to_string());
            }
            i = j;
        } else {
            i += 1;
        }
    }
    found
}

fn assert_wellformed(ir: &str) {
    for (header, body) in function_bodies(ir) {
        let mut defined: HashSet<String> = HashSet::new();
        // Parameters count as defined.
        for reg in temp_registers(&header) {
            defined.insert(reg);
        }

        let mut labels: HashSet<String> = HashSet::new();
        let mut branch_targets: Vec<(String, usize)> = Vec::new();
        let mut entry_count = 0;
        let mut terminated = false;

        for (lineno, line) in body.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            if !line.starts_with(' ') && trimmed.ends_with(':') {
                let label = trimmed.trim_end_matches(':').to_string();
                if label == "entry" {
                    entry_count += 1;
                }
                labels.insert(label);
                terminated = false;
                continue;
            }

            assert!(
                !terminated,
                "instruction after terminator in `{}` line {}: {}",
                header, lineno, line
            );

            // Definition before use.
            if let Some(eq) = trimmed.find(" = ") {
                let lhs = &trimmed[..eq];
                for reg in temp_registers(&trimmed[eq..]) {
                    assert!(
                        defined.contains(&reg),
                        "register {} used before definition in `{}`: {}",
                        reg,
                        header,
                        line
                    );
                }
                for reg in temp_registers(lhs) {
                    defined.insert(reg);
                }
            } else {
                for reg in temp_registers(trimmed) {
                    assert!(
                        defined.contains(&reg),
                        "register {} used before definition in `{}`: {}",
                        reg,
                        header,
                        line
                    );
                }
            }

            // Collect branch targets.
            let mut rest = trimmed;
            while let Some(pos) = rest.find("label %") {
                let target: String = rest[pos + 7..]
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
                    .collect();
                branch_targets.push((target, lineno));
                rest = &rest[pos + 7..];
            }

            if trimmed.starts_with("ret ")
                || trimmed.starts_with("br ")
                || trimmed == "unreachable"
            {
                terminated = true;
            }
        }

        assert_eq!(entry_count, 1, "exactly one entry block in `{}`", header);
        for (target, lineno) in branch_targets {
            assert!(
                labels.contains(&target) || target == "entry",
                "branch to missing label `{}` at line {} in `{}`",
                target,
                lineno,
                header
            );
        }
    }
}

#[test]
fn hello_is_wellformed() {
    assert_wellformed(&compile(
        r#"func main() -> I32 { print("hello"); return 0 }"#,
    ));
}

#[test]
fn control_flow_is_wellformed() {
    assert_wellformed(&compile(
        "func classify(n: I32) -> I32 {\n\
             var total = 0\n\
             for i in 0 to n {\n\
                 if i % 2 == 0 { total = total + i } else { total = total - 1 }\n\
             }\n\
             while total > 100 { total = total / 2 }\n\
             return total\n\
         }\n\
         func main() -> I32 { return classify(10) }",
    ));
}

#[test]
fn enums_and_when_are_wellformed() {
    assert_wellformed(&compile(
        "enum Shape { Circle(I32), Rect(I32, I32), Empty }\n\
         func area(s: Shape) -> I32 {\n\
             when s {\n\
                 Circle(r) => return r * r,\n\
                 Rect(w, h) => return w * h,\n\
                 Empty => return 0,\n\
             }\n\
         }\n\
         func main() -> I32 { return area(Rect(3, 4)) }",
    ));
}

#[test]
fn closures_are_wellformed() {
    assert_wellformed(&compile(
        "func main() -> I32 {\n\
             var n = 10\n\
             let add = do(x) { n = n + x }\n\
             add(5)\n\
             return n\n\
         }",
    ));
}

#[test]
fn classes_are_wellformed() {
    assert_wellformed(&compile(
        "class Animal { virtual func speak(this) -> Str { return \"?\" } }\n\
         class Dog extends Animal { override func speak(this) -> Str { return \"woof\" } }\n\
         func main() -> I32 { let a: Animal = new Dog()\n print(a.speak())\n return 0 }",
    ));
}

#[test]
fn generics_are_wellformed() {
    assert_wellformed(&compile(
        "func pick[T](flag: Bool, a: T, b: T) -> T {\n\
             if flag { return a } else { return b }\n\
         }\n\
         func main() -> I32 { return pick[I32](true, 1, 2) }",
    ));
}

#[test]
fn short_circuit_is_wellformed() {
    assert_wellformed(&compile(
        "func both(a: Bool, b: Bool) -> Bool { return a and b }\n\
         func either(a: Bool, b: Bool) -> Bool { return a or b }\n\
         func main() -> I32 {\n\
             if both(true, false) or either(false, true) { return 1 }\n\
             return 0\n\
         }",
    ));
}

#[test]
fn string_constants_are_deterministic() {
    let source = r#"func main() -> I32 { print("a"); print("b"); print("a"); return 0 }"#;
    let first = compile(source);
    let second = compile(source);
    assert_eq!(first, second, "IR must be byte-identical across runs");
    // Interning: "a" appears once as a constant.
    let count = first.matches("c\"a\\00\"").count();
    assert_eq!(count, 1, "string literal should be interned once:\n{}", first);
}
