//! CLI integration tests for sqlport.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for configuration and connection errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the sqlport binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlport").unwrap()
}

const VALID: &str = "\
source:
  type: postgres
  host: 127.0.0.1
  port: 1
  database: shop
  user: app
  password: secret
  ssl_mode: disable
target:
  type: mssql
";

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--schema"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--create-table"))
        .stdout(predicate::str::contains("--ignore-table"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--no-bom"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlport"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_listed() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let file = config_file("source:\n  type: mssql\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_oracle_source_rejected() {
    let file = config_file(&VALID.replace("type: postgres", "type: oracle"));
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("oracle"));
}

#[test]
fn test_unknown_ssl_mode_rejected() {
    let file = config_file(&VALID.replace("ssl_mode: disable", "ssl_mode: sometimes"));
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ssl_mode"));
}

#[test]
fn test_zero_batch_size_override_rejected() {
    let file = config_file(VALID);
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--batch-size", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("data_batch_size"));
}

#[test]
fn test_table_both_selected_and_ignored_rejected() {
    let file = config_file(VALID);
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--table",
            "orders",
            "--ignore-table",
            "orders",
        ])
        .assert()
        .code(1);
}

// =============================================================================
// Exit Code Tests - Connection Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_unreachable_source_exits_with_code_2() {
    let file = config_file(VALID);
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_failed_run_leaves_no_script_on_stdout() {
    let file = config_file(VALID);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.sql");
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
            "run",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
    // Connection failures happen before the script file is opened.
    assert!(!out.exists());
}
