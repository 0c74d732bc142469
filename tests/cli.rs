//! Command-line behavior of the `pull-detached` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pull_detached() -> Command {
    let mut cmd = Command::cargo_bin("pull-detached").unwrap();
    for var in [
        "GITHUB_PAT",
        "GITHUB_TOKEN",
        "DETACHED_CREDS_PRINCIPAL",
        "DETACHED_CREDS_PW",
        "PULL_DETACHED_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_describes_tool() {
    pull_detached()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("detached upstream"))
        .stdout(predicate::str::contains("--genconf"));
}

#[test]
fn version_flag_works() {
    pull_detached()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pull-detached"));
}

#[test]
fn invalid_clone_mode_is_usage_error() {
    pull_detached()
        .args(["--clone-mode", "sometimes"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sometimes"));
}

#[test]
fn missing_token_fails() {
    let temp = TempDir::new().unwrap();
    pull_detached()
        .current_dir(temp.path())
        .args([
            "--upstream-repo",
            "https://example.org/up.git",
            "--identity-email",
            "bot@example.com",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("GITHUB_PAT"));

    assert!(!temp.path().join("workdir").exists());
}

#[test]
fn genconf_writes_effective_config_without_secrets() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out").join("config.toml");

    pull_detached()
        .env("GITHUB_PAT", "ghp_secret")
        .args([
            "--upstream-repo",
            "https://example.org/up.git",
            "--clone-mode",
            "clone-always",
            "--pr-labels",
            "upstream,sync",
            "--genconf",
        ])
        .arg(&out)
        .assert()
        .success();

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("https://example.org/up.git"));
    assert!(written.contains("clone-always"));
    assert!(written.contains("upstream"));
    assert!(!written.contains("ghp_secret"));
}

#[test]
fn genconf_output_loads_back() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first.toml");
    let second = temp.path().join("second.toml");

    pull_detached()
        .args(["--origin-branch", "develop", "--hide-credits", "--genconf"])
        .arg(&first)
        .assert()
        .success();

    pull_detached()
        .arg("--config")
        .arg(&first)
        .arg("--genconf")
        .arg(&second)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        std::fs::read_to_string(&second).unwrap()
    );
}

#[test]
fn escaped_input_is_unquoted() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("config.toml");

    pull_detached()
        .args([
            "--expect-escaped-input",
            "--upstream-repo",
            "\"https://example.org/up.git\"",
            "--genconf",
        ])
        .arg(&out)
        .assert()
        .success();

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("\"https://example.org/up.git\""));
    assert!(!written.contains("\\\"https"));
}

#[test]
fn unreadable_config_fails() {
    let temp = TempDir::new().unwrap();
    pull_detached()
        .arg("--config")
        .arg(temp.path().join("missing.toml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to load configuration"));
}
