//! The `intentcode` binary end to end.

use assert_cmd::Command;
use intentcode::test_utils::{ExtensionFixture, IntentFixture};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn intentcode(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("intentcode").unwrap();
    cmd.env_remove("RUST_LOG").env("NO_COLOR", "1").arg("--home").arg(home).arg("--no-progress");
    cmd
}

fn init_project(temp: &TempDir) -> std::path::PathBuf {
    let home = temp.path().join("home");
    let root = temp.path().join("web");
    intentcode(&home)
        .arg("init")
        .arg(&root)
        .arg("--name")
        .arg("web")
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered project web"));
    root
}

#[test]
fn test_init_creates_layout() {
    let temp = TempDir::new().unwrap();
    let root = init_project(&temp);

    assert!(root.join("specs").is_dir());
    assert!(root.join("intent").is_dir());
    assert!(root.join(".intentcode").is_dir());
    assert!(temp.path().join("home").join("graph.db").is_file());
}

#[test]
fn test_build_unknown_project_suggests_closest() {
    let temp = TempDir::new().unwrap();
    init_project(&temp);

    intentcode(&temp.path().join("home"))
        .arg("build")
        .arg("wbe")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Did you mean 'web'?"));
}

#[test]
fn test_build_without_provider_fails() {
    let temp = TempDir::new().unwrap();
    let root = init_project(&temp);
    IntentFixture::main_rs().write_to(&root).unwrap();

    intentcode(&temp.path().join("home"))
        .arg("build")
        .arg("web")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No generation provider configured"));
    assert!(!root.join("src/main.rs").exists());
}

#[test]
fn test_deps_verify_on_fresh_project() {
    let temp = TempDir::new().unwrap();
    init_project(&temp);

    intentcode(&temp.path().join("home"))
        .args(["deps", "verify", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("matches the build graph"));
}

#[test]
fn test_extensions_list() {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");

    intentcode(&home)
        .args(["extensions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No extensions found"));

    ExtensionFixture::new("rust-style", "1.2.0")
        .with_skill("iterators.md", "Prefer iterator adapters.\n")
        .write_to(&home.join("extensions"))
        .unwrap();

    intentcode(&home)
        .args(["extensions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust-style@1.2.0").and(predicate::str::contains("rust-style conventions")));
}

#[cfg(unix)]
const PROVIDER_SCRIPT: &str = r##"#!/bin/sh
prompt=$(cat)
task=$(printf '%s\n' "$prompt" | head -n 1)
case "$task" in
  "# task: compile") printf '%s\n' '{"targetSource": "fn main() {\n    println!(\"hello\");\n}\n"}' ;;
  "# task: define-tech-stack") printf '%s\n' '{"tool": "cargo", "runtimes": {"rust": {}}}' ;;
  "# task: specs-to-intent") printf '%s\n' '{"fileOps": []}' ;;
  "# task: index") printf '%s\n' '{"summary": "Entry point.", "symbols": []}' ;;
  "# task: analyze-intent") printf '%s\n' '{"suggestions": []}' ;;
  *) echo "unknown task: $task" >&2; exit 2 ;;
esac
"##;

#[cfg(unix)]
#[test]
fn test_build_with_command_provider() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let root = init_project(&temp);
    IntentFixture::main_rs().write_to(&root).unwrap();

    let script = temp.path().join("provider.sh");
    std::fs::write(&script, PROVIDER_SCRIPT).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::write(
        root.join(".intentcode/build.toml"),
        format!("[model]\nid = \"shell\"\n\n[provider]\nprogram = \"{}\"\ntimeout_secs = 30\n", script.display()),
    )
    .unwrap();

    let output = intentcode(&temp.path().join("home"))
        .args(["build", "web", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["compiled"], serde_json::json!(["src/main.rs"]));
    assert_eq!(summary["replans"], 0);

    let source = std::fs::read_to_string(root.join("src/main.rs")).unwrap();
    assert!(source.contains("println!(\"hello\");"));

    // A second build leaves the target alone.
    intentcode(&temp.path().join("home"))
        .args(["build", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged").and(predicate::str::contains("src/main.rs")));
}
