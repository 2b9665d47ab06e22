//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("picoflash")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("picoflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("picoflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("picoflash"))
        .stderr(predicate::str::is_empty());
}

// ============================================================================
// Exit Code Tests
// ============================================================================

/// Exit code 0: successful operations that need no hardware.
#[test]
fn exit_code_zero_on_success() {
    let mut cmd = cli_cmd();
    cmd.arg("--help").assert().success().code(0);

    let mut cmd = cli_cmd();
    cmd.arg("--version").assert().success().code(0);

    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"]).assert().success().code(0);
}

/// Exit code 2: usage error (unknown command, invalid arguments).
#[test]
fn exit_code_two_for_usage_error_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_usage_error_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_missing_required_arg() {
    // flash requires the image path
    let mut cmd = cli_cmd();
    cmd.arg("flash").assert().failure().code(2);

    // read requires --length
    let mut cmd = cli_cmd();
    cmd.args(["read", "out.bin"]).assert().failure().code(2);
}

#[test]
fn exit_code_two_for_malformed_address() {
    let dir = tempdir().expect("tempdir");
    let image = dir.path().join("app.bin");
    fs::write(&image, b"dummy").expect("write image");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(&image)
        .args(["--addr", "0xNOTHEX"])
        .assert()
        .failure()
        .code(2);
}

/// Exit code 1: runtime failure.
#[test]
fn exit_code_one_for_missing_image() {
    let dir = tempdir().expect("tempdir");
    let nonexistent = dir.path().join("does_not_exist.bin");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error"));
}

#[test]
fn empty_image_is_rejected_before_any_traffic() {
    let dir = tempdir().expect("tempdir");
    let image = dir.path().join("empty.bin");
    fs::write(&image, b"").expect("write image");

    // Fails at load time, so no port/tcp flags are needed.
    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("empty"));
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn flash_errors_write_to_stderr_only() {
    let dir = tempdir().expect("tempdir");
    let nonexistent = dir.path().join("nope.bin");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("picoflash"));
}

// ============================================================================
// TTY Detection Tests (colors disabled on non-TTY)
// ============================================================================

#[test]
fn colors_disabled_when_not_tty() {
    let mut cmd = cli_cmd();
    let output = cmd.arg("--help").assert().success().get_output().clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}

// ============================================================================
// -- Option Terminator Tests
// ============================================================================

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir");
    let test_file = dir.path().join("test.bin");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg("--")
        .arg(test_file)
        .assert()
        .failure()
        .code(1); // File doesn't exist, but parsing works
}
