use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("careconnect")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("open"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn test_login_help_mentions_password_env() {
    cargo_bin_cmd!("careconnect")
        .args(["login", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--password"))
        .stdout(predicate::str::contains("CARECONNECT_PASSWORD"))
        .stdout(predicate::str::contains("--return-to"));
}

#[test]
fn test_open_requires_path() {
    cargo_bin_cmd!("careconnect")
        .arg("open")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PATH"));
}
