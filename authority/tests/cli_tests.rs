//! Argument validation of the `licensor-authority` binary. Every case here
//! fails during parsing, before any port is bound.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn authority_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("licensor-authority");
    cmd.env_remove("LICENSOR_AUTHORITY_PORT");
    cmd
}

// ── Passcode lifetime ─────────────────────────────────────────────

#[test]
fn zero_passcode_lifetime_is_refused() {
    authority_cmd()
        .args(["--otp-ttl-secs", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--otp-ttl-secs"));
}

#[test]
fn negative_passcode_lifetime_is_refused() {
    authority_cmd()
        .args(["--otp-ttl-secs=-5"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--otp-ttl-secs"));
}

#[test]
fn passcode_lifetime_over_a_day_is_refused() {
    authority_cmd()
        .args(["--otp-ttl-secs", "9223372036854775807"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--otp-ttl-secs"));
}

// ── Other arguments ───────────────────────────────────────────────

#[test]
fn help_lists_the_options() {
    authority_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--otp-ttl-secs").and(predicate::str::contains("--seed")),
        );
}

#[test]
fn non_numeric_port_is_refused() {
    authority_cmd()
        .args(["--port", "http"])
        .assert()
        .failure()
        .code(2);
}
