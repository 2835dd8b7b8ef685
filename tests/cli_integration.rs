//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end. Every test points the host at
//! a temporary home and an unreachable registry, so nothing leaves the machine.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary to test, isolated in `home`.
fn kithost(home: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kithost").unwrap();
    cmd.env("KITHOST_HOME", home.path())
        .env("KITHOST_REGISTRY", "http://127.0.0.1:9")
        .env("KITHOST_SETTINGS", home.child("settings.toml").path())
        .env_remove("RUST_LOG")
        .current_dir(home.path());
    cmd
}

fn temp_home() -> assert_fs::TempDir {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("settings.toml")
        .write_str("[registry]\ninstaller = \"kithost-missing-installer\"\n")
        .unwrap();
    temp
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    let home = temp_home();
    kithost(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("versioned toolkit modules"));
}

#[test]
fn test_version_flag() {
    let home = temp_home();
    kithost(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_run_requires_command() {
    let home = temp_home();
    kithost(&home).arg("run").assert().failure().stderr(predicate::str::contains("<COMMAND>"));
}

#[test]
fn test_run_rejects_malformed_option() {
    let home = temp_home();
    kithost(&home)
        .args(["run", "--set", "novalue", "dev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_path_under_home() {
    let home = temp_home();
    kithost(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    home.child("modules").child("package.json").assert(predicate::path::exists());
}

#[test]
fn test_config_set_get_list() {
    let home = temp_home();
    kithost(&home).args(["config", "set", "kit", "react"]).assert().success();

    kithost(&home)
        .args(["config", "get", "kit"])
        .assert()
        .success()
        .stdout(predicate::str::diff("react\n"));

    kithost(&home)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kit = \"react\""));
}

#[test]
fn test_config_get_missing_key() {
    let home = temp_home();
    kithost(&home)
        .args(["config", "get", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error[config]"));
}

#[test]
fn test_project_config_shadows_home() {
    let home = temp_home();
    kithost(&home).args(["config", "set", "kit", "react"]).assert().success();
    home.child("kithost.toml").write_str("kit = \"vue\"\n").unwrap();

    kithost(&home).args(["config", "get", "kit"]).assert().success().stdout("vue\n");
}

// ============================================================================
// Run & Cache Tests
// ============================================================================

#[test]
fn test_run_without_kit() {
    let home = temp_home();
    kithost(&home)
        .args(["run", "dev"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error[no-kit]"));
}

#[test]
fn test_run_with_unreachable_registry() {
    let home = temp_home();
    kithost(&home)
        .args(["run", "--kit", "react", "dev"])
        .assert()
        .code(1)
        .stderr(
            predicate::str::contains("error[").and(predicate::str::contains("@kithost/kit-react")),
        );
}

#[test]
fn test_cache_clean() {
    let home = temp_home();
    home.child("cache.json")
        .write_str(r#"{"cli-check":{"value":{"status":true},"expires_at":null}}"#)
        .unwrap();

    kithost(&home)
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleaned"));
    home.child("cache.json").assert(predicate::str::contains("cli-check").not());
}

#[test]
fn test_module_list_empty() {
    let home = temp_home();
    kithost(&home)
        .args(["module", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No modules installed."));
}

#[test]
fn test_module_remove_rejects_path_names() {
    let home = temp_home();
    home.child("keep").child("file.txt").write_str("keep").unwrap();

    kithost(&home)
        .args(["module", "remove", "../../../keep"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error[invalid-name]"));

    home.child("keep").child("file.txt").assert(predicate::path::exists());
}

// ============================================================================
// Shell Completion Tests
// ============================================================================

#[test]
fn test_completions() {
    let home = temp_home();
    for shell in ["bash", "zsh", "fish"] {
        kithost(&home)
            .args(["completions", shell])
            .assert()
            .success()
            .stdout(predicate::str::contains("kithost"));
    }
}
