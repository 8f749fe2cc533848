// Driver tests: exercise the `tml` binary's stage commands and exit
// codes against temporary source trees.

use std::process::Command;

fn tml() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tml"))
}

fn write(dir: &std::path::Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write source");
    path
}

#[test]
fn lex_reports_success_and_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = write(dir.path(), "good.tml", "func main() -> I32 { return 0 }");
    let bad = write(dir.path(), "bad.tml", "let s = \"unterminated");

    let ok = tml().arg("lex").arg(&good).output().expect("run");
    assert!(ok.status.success());

    let fail = tml().arg("lex").arg(&bad).output().expect("run");
    assert_eq!(fail.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&fail.stderr);
    assert!(stderr.contains("L002"), "stderr: {}", stderr);
}

#[test]
fn check_exit_codes_follow_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = write(
        dir.path(),
        "ok.tml",
        "func add(a: I32, b: I32) -> I32 { return a + b }",
    );
    let bad = write(
        dir.path(),
        "bad.tml",
        "func main() -> I32 { return \"text\" }",
    );

    assert!(tml().arg("check").arg(&good).status().expect("run").success());
    let fail = tml().arg("check").arg(&bad).output().expect("run");
    assert_eq!(fail.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&fail.stderr);
    assert!(stderr.contains("T016"), "stderr: {}", stderr);
}

#[test]
fn check_json_output_is_parseable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bad = write(
        dir.path(),
        "bad.tml",
        "func main() -> I32 {\n    var x = 1\n    let r = ref x\n    x = 2\n    return r\n}",
    );
    let out = tml()
        .arg("check")
        .arg(&bad)
        .arg("--json")
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let diags = value["diagnostics"].as_array().expect("array");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0]["code"], "B004");
    assert_eq!(diags[0]["line"], 4);
}

#[test]
fn build_emit_ir_writes_module() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = write(
        dir.path(),
        "hello.tml",
        "func main() -> I32 { print(\"hello\"); return 0 }",
    );
    let out = tml()
        .arg("build")
        .arg(&src)
        .arg("--emit-ir")
        .output()
        .expect("run");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let ir_path = dir.path().join("tml-build").join("hello.ll");
    let ir = std::fs::read_to_string(&ir_path).expect("IR file written");
    assert!(ir.contains("target triple"));
    assert!(ir.contains("@tml_main"));
    assert!(ir.contains("c\"hello\\00\""));
}

#[test]
fn sibling_modules_are_importable() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "mathx.tml",
        "pub func square(x: I32) -> I32 { return x * x }",
    );
    let main = write(
        dir.path(),
        "main.tml",
        "use mathx::square\nfunc main() -> I32 { return square(3) }",
    );
    let out = tml().arg("check").arg(&main).output().expect("run");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn explain_known_and_unknown() {
    let known = tml().arg("explain").arg("B004").output().expect("run");
    assert!(known.status.success());
    let text = String::from_utf8_lossy(&known.stdout);
    assert!(text.contains("B004"));
    assert!(text.contains("borrow"));

    let unknown = tml().arg("explain").arg("Z123").output().expect("run");
    assert_eq!(unknown.status.code(), Some(1));
}

#[test]
fn version_flag_prints_stable_string() {
    let out = tml().arg("--version").output().expect("run");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("0.2.0"), "version output: {}", text);
}
