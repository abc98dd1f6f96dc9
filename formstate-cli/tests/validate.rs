use assert_cmd::cargo::{self};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

const FIELDS: &str = r#"{
    "fields": [
        {"name": "user.name", "rules": [{"required": true}]},
        {"name": "user.age", "rules": [{"type": "integer", "min": 0}]}
    ]
}"#;

#[test]
fn valid_values_resolve_with_ok_payload() {
    let mut cmd = cargo::cargo_bin_cmd!("formstate");
    cmd.arg("--fields")
        .arg(FIELDS)
        .arg("--values")
        .arg(r#"{"user": {"name": "ann", "age": 7}}"#)
        .assert()
        .success()
        .stdout(contains("\"ok\": true").and(contains("\"ann\"")));
}

#[test]
fn violations_exit_nonzero_with_nested_errors() {
    let mut cmd = cargo::cargo_bin_cmd!("formstate");
    cmd.arg("--fields")
        .arg(FIELDS)
        .arg("--values")
        .arg(r#"{"user": {"name": "", "age": -3}}"#)
        .assert()
        .failure()
        .stdout(contains("user.name is required").and(contains("cannot be less than")));
}

#[test]
fn unregistered_value_paths_are_rejected() {
    let mut cmd = cargo::cargo_bin_cmd!("formstate");
    cmd.arg("--fields")
        .arg(FIELDS)
        .arg("--values")
        .arg(r#"{"ghost": 1}"#)
        .assert()
        .failure()
        .stderr(contains("ghost"));
}

#[test]
fn only_restricts_validation_to_a_group() {
    let mut cmd = cargo::cargo_bin_cmd!("formstate");
    cmd.arg("--fields")
        .arg(FIELDS)
        .arg("--values")
        .arg(r#"{"user": {"name": "", "age": 7}}"#)
        .arg("--only")
        .arg("user.age")
        .assert()
        .success()
        .stdout(contains("\"ok\": true"));
}
