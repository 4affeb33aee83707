//! CLI behavior tests for the `dccb` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn dccb() -> Command {
    let mut cmd = Command::cargo_bin("dccb").expect("dccb binary");
    cmd.env_remove("DCCB_CONFIG");
    cmd
}

/// A config file with one live-looking backend and one dead backend, tuned
/// for fast failures.
fn fast_config() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    write!(
        file,
        r#"
[backends.modeler]
host = "127.0.0.1"
port = 9876

[backends.dead]
host = "127.0.0.1"
port = 1

[client]
timeout = "200ms"
retry_attempts = 1
retry_delay = "0s"
"#
    )
    .expect("write temp config");
    file
}

#[test]
fn test_help_lists_subcommands() {
    dccb()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("gateway"))
        .stdout(predicate::str::contains("host"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_call_unknown_backend_is_a_usage_error() {
    let config = fast_config();
    dccb()
        .args(["call", "sculptor", "ping"])
        .arg("--config")
        .arg(config.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown backend 'sculptor'"));
}

#[test]
fn test_call_rejects_non_object_params() {
    let config = fast_config();
    dccb()
        .args(["call", "modeler", "ping", "--params", "[1,2]"])
        .arg("--config")
        .arg(config.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("must be a JSON object"));
}

#[test]
fn test_call_rejects_invalid_params_json() {
    let config = fast_config();
    dccb()
        .args(["call", "modeler", "ping", "--params", "{nope"])
        .arg("--config")
        .arg(config.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_call_dead_backend_prints_connection_error() {
    let config = fast_config();
    dccb()
        .args(["call", "dead", "ping"])
        .arg("--config")
        .arg(config.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("CONNECTION_ERROR"));
}

#[test]
fn test_invalid_config_is_a_usage_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "this is not toml [").unwrap();
    dccb()
        .args(["call", "modeler", "ping"])
        .arg("--config")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_config_show_prints_effective_toml() {
    let config = fast_config();
    dccb()
        .args(["config", "show"])
        .env("DCCB_CONFIG", config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[gateway]"))
        .stdout(predicate::str::contains("[backends.dead]"))
        .stdout(predicate::str::contains("retry_attempts = 1"));
}

#[test]
fn test_config_path_reports_env_override() {
    let config = fast_config();
    dccb()
        .args(["config", "path"])
        .env("DCCB_CONFIG", config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            config.path().to_string_lossy().as_ref(),
        ));
}
