use assert_cmd::prelude::*;
use std::fs;
use std::process::Command;

const PLAIN: &str = "<!DOCTYPE html>\n<html><body><p>No math here.</p></body></html>\n";

#[test]
fn pages_without_math_are_left_alone() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let page = tmp.path().join("plain.html");
    fs::write(&page, PLAIN).expect("write page");
    fs::write(tmp.path().join("preamble.tex"), "").expect("write preamble");

    let exe = assert_cmd::cargo_bin!("pretex");
    // No external tool is needed, so bogus tool paths must not matter.
    Command::new(exe)
        .current_dir(tmp.path())
        .args(["--latex", "/nonexistent/pdflatex", "plain.html"])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&page).expect("read page"), PLAIN);
    assert!(!tmp.path().join("pretex-cache").exists());
}

#[test]
fn missing_preamble_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let page = tmp.path().join("plain.html");
    fs::write(&page, PLAIN).expect("write page");

    let exe = assert_cmd::cargo_bin!("pretex");
    let out = Command::new(exe)
        .current_dir(tmp.path())
        .arg("plain.html")
        .output()
        .expect("run pretex");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("preamble.tex"));
}

#[test]
fn unavailable_typesetter_fails_the_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let page = tmp.path().join("math.html");
    let doc = "<html><body><p><script type=\"text/x-latex-inline\">x^2</script></p></body></html>";
    fs::write(&page, doc).expect("write page");
    fs::write(tmp.path().join("preamble.tex"), "").expect("write preamble");

    let exe = assert_cmd::cargo_bin!("pretex");
    Command::new(exe)
        .current_dir(tmp.path())
        .args(["--latex", "/nonexistent/pdflatex", "math.html"])
        .assert()
        .failure();

    assert_eq!(fs::read_to_string(&page).expect("read page"), doc);
}

#[test]
fn files_are_required() {
    let exe = assert_cmd::cargo_bin!("pretex");
    Command::new(exe).assert().failure();
}
