//! End-to-end runs of the `jsguard` binary.

use assert_cmd::Command;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const UNGUARDED: &str = indoc! {r#"
    use safejs::raw;

    pub fn foo() {
        raw::value_of(1);
    }
"#};

const GUARDED: &str = indoc! {r#"
    use safejs::{catch, raw};

    pub fn foo() -> safejs::Result<raw::Value> {
        catch::attempt(|| raw::value_of(1))
    }
"#};

fn package(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn jsguard(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jsguard").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_clean_package_exits_zero() {
    let dir = package(&[("src/lib.rs", GUARDED)]);
    let output = jsguard(dir.path()).arg("src").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_diagnostics_exit_three() {
    let dir = package(&[("src/lib.rs", GUARDED), ("src/bad.rs", UNGUARDED)]);
    let output = jsguard(dir.path()).arg("src").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let expected = format!(
        "{}:4:5: unsafe call to safejs::raw found: raw::value_of(...)\n",
        Path::new("src").join("bad.rs").display()
    );
    assert_eq!(String::from_utf8(output.stdout).unwrap(), expected);
}

#[test]
fn test_json_output() {
    let dir = package(&[
        ("src/bad.rs", UNGUARDED),
        ("src/plain.rs", "pub fn plain() {}\n"),
    ]);
    let output = jsguard(dir.path())
        .args(["--format", "json", "--no-parallel", "src"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["files_analyzed"], 1);
    assert_eq!(json["files_skipped"], 1);
    assert_eq!(json["diagnostics"][0]["line"], 4);
    assert_eq!(json["diagnostics"][0]["column"], 5);
    assert_eq!(json["diagnostics"][0]["category"], "package_call");
}

#[test]
fn test_strict_flag_reports_wrapped_calls() {
    let dir = package(&[("lib.rs", GUARDED)]);
    let output = jsguard(dir.path())
        .args(["--strict", "lib.rs"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_config_file_sets_unsafe_path() {
    let dir = package(&[
        (
            ".jsguard.toml",
            "[analyzer]\nunsafe_paths = [\"crate::raw\"]\n",
        ),
        ("src/lib.rs", "use crate::raw;\nfn f() { raw::global(); raw::func_of(g); }\n"),
    ]);
    let output = jsguard(dir.path()).arg("src").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(
        stdout.contains("unsafe call to crate::raw found: raw::func_of(...)"),
        "{stdout}"
    );
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn test_ignore_pattern_skips_files() {
    let dir = package(&[("src/gen/bad.rs", UNGUARDED), ("src/lib.rs", GUARDED)]);
    let output = jsguard(dir.path())
        .args(["--ignore", "**/gen/**", "src"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_parse_error_is_a_tool_error() {
    let dir = package(&[("broken.rs", "fn (")]);
    let output = jsguard(dir.path()).arg("broken.rs").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_missing_path_is_a_tool_error() {
    let dir = package(&[]);
    let output = jsguard(dir.path()).arg("nope.rs").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_explicit_broken_config_is_a_tool_error() {
    let dir = package(&[("custom.toml", "[analyzer\n"), ("lib.rs", GUARDED)]);
    let output = jsguard(dir.path())
        .args(["--config", "custom.toml", "lib.rs"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

const TARGET_WARNING: &str = "CARGO_BUILD_TARGET is not set to a wasm32 target";

#[test]
fn test_host_target_warns_and_still_reports() {
    let dir = package(&[("src/bad.rs", UNGUARDED)]);
    let output = jsguard(dir.path())
        .env_remove("CARGO_BUILD_TARGET")
        .arg("src")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8(output.stderr).unwrap().contains(TARGET_WARNING));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("unsafe call to safejs::raw found: raw::value_of(...)"));
}

#[test]
fn test_wasm_target_is_quiet() {
    let dir = package(&[("src/bad.rs", UNGUARDED)]);
    let output = jsguard(dir.path())
        .env("CARGO_BUILD_TARGET", "wasm32-unknown-unknown")
        .arg("src")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(!String::from_utf8(output.stderr).unwrap().contains(TARGET_WARNING));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("unsafe call to safejs::raw found: raw::value_of(...)"));
}
