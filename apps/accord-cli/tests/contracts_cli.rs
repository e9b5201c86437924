use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn bin() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("accord-cli").expect("binary");
    for key in [
        "ACCORD_HOST",
        "ACCORD_PORT",
        "ACCORD_UNMATCHED_STATUS",
        "ACCORD_CONTRACTS_DIR",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../contracts")
}

#[test]
fn validate_lists_fixture_contracts_in_match_order() {
    let assert = bin().arg("validate").arg(fixtures()).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let starbuxman = stdout.find("starbuxman").expect("starbuxman listed");
    let grumpy = stdout.find("grumpy").expect("grumpy listed");
    assert!(starbuxman < grumpy, "lower priority value lists first");
    assert!(stdout.contains("2 contract(s) loaded"));
}

#[test]
fn broken_contract_set_exits_with_startup_code() {
    let tmp = tempdir().expect("tmpdir");
    fs::write(tmp.path().join("bad.json"), r#"{"id": "bad"}"#).expect("write");
    fs::write(tmp.path().join("also-bad.yaml"), "request: [unclosed").expect("write");

    bin()
        .arg("validate")
        .arg(tmp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing request and response block"))
        .stderr(predicate::str::contains("also-bad.yaml"));
}

#[test]
fn generate_writes_delegated_assertions() {
    let tmp = tempdir().expect("tmpdir");
    let out = tmp.path().join("cases.json");
    bin()
        .arg("generate")
        .arg(fixtures())
        .arg("--out")
        .arg(&out)
        .arg("--pretty")
        .assert()
        .success();

    let text = fs::read_to_string(&out).expect("read cases");
    let doc: serde_json::Value = serde_json::from_str(&text).expect("json");
    let cases = doc["cases"].as_array().expect("cases array");
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0]["contract_id"], "starbuxman");
    assert_eq!(cases[0]["request"]["body"]["age"], 25);
    assert!(text.contains("assertStatus"));
    assert!(text.contains("assertMessage"));
    assert_eq!(doc["errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn config_schema_prints_json_schema() {
    bin()
        .args(["config", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$schema"));
}

#[test]
fn verify_requires_a_base_url() {
    bin()
        .arg("verify")
        .arg(fixtures())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("base URL"));
}

#[test]
fn verify_reports_unreachable_producer_as_failure() {
    bin()
        .arg("verify")
        .arg(fixtures())
        .args(["--base-url", "http://127.0.0.1:1", "--timeout-ms", "500"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("FAIL starbuxman"));
}
