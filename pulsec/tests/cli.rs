use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn pulsec() -> Command {
    Command::cargo_bin("pulsec").expect("binary exists")
}

#[test]
fn emits_ir_to_file() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("prog.pulse");
    fs::write(&input_path, "def f(x): return x + 1\nf(2)\n").expect("write input");
    let output_path = dir.path().join("out/prog.clif");

    pulsec()
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .arg("--target")
        .arg("x86_64_linux")
        .assert()
        .success();

    let ir = fs::read_to_string(&output_path).expect("read ir");
    assert!(ir.starts_with("; module 'prog'\n"));
    assert!(ir.contains("; target x86_64-unknown-linux-gnu\n"));
    assert!(ir.contains("function %f(i64) -> i64"));
    assert!(ir.contains("function %main() -> i32"));
}

#[test]
fn emits_object_file() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("prog.o");

    pulsec()
        .args(["--emit", "obj", "--target", "x86_64_linux", "--output"])
        .arg(&output_path)
        .write_stdin("def f(x): return x + 1\nprintf(\"%ld\\n\", f(2))\n")
        .assert()
        .success();

    let object = fs::read(&output_path).expect("read object");
    assert!(object.starts_with(b"\x7fELF"));
}

#[test]
fn reads_standard_input() {
    pulsec()
        .arg("--emit")
        .arg("tokens")
        .write_stdin("x = 1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Identifier \"x\""))
        .stdout(predicate::str::contains("Integer \"1\" = 1"));

    pulsec()
        .arg("--emit")
        .arg("ast")
        .write_stdin("x = 1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("assignment x (1:1)"));
}

#[test]
fn module_name_option() {
    pulsec()
        .args(["--module-name", "demo"])
        .write_stdin("x = 1\n")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("; module 'demo'"));
}

#[test]
fn reports_warnings_and_succeeds() {
    pulsec()
        .write_stdin("x = y\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: 1:5: undefined name `y`"));
}

#[test]
fn reports_errors_and_fails() {
    pulsec()
        .write_stdin("x = $\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: 1:5: unexpected character '$'"));

    pulsec()
        .write_stdin("x = \ny = (\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "error: 1:5: expected expression, but got newline",
        ))
        .stderr(predicate::str::contains("failed to compile `stdin`"));

    pulsec()
        .write_stdin("[1]\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "error: 1:1: list literals are not supported",
        ));
}

#[test]
fn reports_missing_input() {
    pulsec()
        .arg("does-not-exist.pulse")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read input file"));
}

#[test]
fn verbose_prints_stage_summaries() {
    pulsec()
        .arg("--verbose")
        .args(["--target", "aarch64_darwin"])
        .write_stdin("def f(): return 1\nf()\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("lexed"))
        .stderr(predicate::str::contains("parsed 1 functions"))
        .stderr(predicate::str::contains(
            "generated 2 functions for aarch64_darwin",
        ));
}

#[test]
fn compiles_every_sample() {
    let samples = Path::new(env!("CARGO_MANIFEST_DIR")).join("../samples");
    let mut count = 0;
    for entry in fs::read_dir(&samples).expect("read samples") {
        let path = entry.expect("sample entry").path();
        pulsec().arg(&path).assert().success();
        count += 1;
    }
    assert!(count > 0);
}
