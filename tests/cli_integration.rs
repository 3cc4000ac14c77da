//! CLI Integration Tests
//!
//! These tests verify that the CLI commands work correctly end-to-end.
//! They test the actual binary behavior, not just the library.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use serde_json::{json, Value};
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::tempdir;

const SMT: &str = env!("CARGO_BIN_EXE_smt");

/// Run smt against a database file and return (stdout, stderr, success)
fn run_smt(args: &[&str], db_path: &str) -> (String, String, bool) {
    let output = Command::new(SMT)
        .args(["-d", db_path, "-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute smt");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn exec(request: Value, db_path: &str) -> Value {
    let (stdout, stderr, _) = run_smt(&["exec", &request.to_string()], db_path);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("bad response {:?} ({}), stderr: {}", stdout, e, stderr))
}

// ============================================================================
// Database Initialization Tests
// ============================================================================

#[test]
fn test_cli_init_creates_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.smt");
    let db_str = db_path.to_str().unwrap();

    let (stdout, _stderr, success) = run_smt(&["init"], db_str);

    assert!(success, "init should succeed");
    assert!(stdout.contains("\"status\":\"ok\""), "status should be ok");
    assert!(db_path.exists(), "database file should be created");
}

// ============================================================================
// Exec Tests
// ============================================================================

#[test]
fn test_cli_exec_persists_between_invocations() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.smt");
    let db_str = db_path.to_str().unwrap();

    let updated = exec(
        json!({
            "method": "update",
            "namespace": "test",
            "key": { "user_id": "1000" },
            "value": { "nonce": 1, "balance": 10 }
        }),
        db_str,
    );
    assert_eq!(updated["status"], "ok");

    let root = exec(json!({ "method": "get_root", "namespace": "test" }), db_str);
    assert_eq!(root["root"], updated["root"]);

    let value = exec(
        json!({ "method": "get_value", "namespace": "test", "key": { "user_id": "1000" } }),
        db_str,
    );
    assert_eq!(value["value"], json!({ "nonce": 1, "balance": 10 }));
}

#[test]
fn test_cli_proof_verifies_in_separate_process() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.smt");
    let db_str = db_path.to_str().unwrap();

    exec(
        json!({ "method": "update", "namespace": "test", "key": "a", "value": 1 }),
        db_str,
    );
    let proved = exec(
        json!({ "method": "get_merkle_proof", "namespace": "test", "key": "a" }),
        db_str,
    );

    let verified = exec(
        json!({ "method": "verify_proof", "proof": proved["proof"] }),
        db_str,
    );
    assert_eq!(verified["valid"], true);
}

#[test]
fn test_cli_exec_error_exits_nonzero() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.smt");
    let db_str = db_path.to_str().unwrap();

    let (stdout, _stderr, success) = run_smt(
        &["exec", r#"{"method":"update","namespace":"test","key":null,"value":1}"#],
        db_str,
    );
    assert!(!success);
    let response: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(response["status"], "error");
    assert_eq!(response["kind"], "malformed_key_or_value");
}

// ============================================================================
// Serve Tests
// ============================================================================

#[test]
fn test_cli_serve_answers_each_line() {
    let mut child = Command::new(SMT)
        .args(["--memory", "serve"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn smt");

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"{{"method":"update","namespace":"test","key":"a","value":1}}"#).unwrap();
        writeln!(stdin).unwrap();
        writeln!(stdin, r#"{{"method":"history","namespace":"test"}}"#).unwrap();
        writeln!(stdin, "not json").unwrap();
    }

    let output = child.wait_with_output().unwrap();
    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["status"], "ok");
    assert_eq!(lines[1]["roots"].as_array().unwrap().len(), 2);
    assert_eq!(lines[2]["kind"], "bad_request");
}

// ============================================================================
// Inspection Tests
// ============================================================================

#[test]
fn test_cli_log_and_namespaces() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.smt");
    let db_str = db_path.to_str().unwrap();

    exec(
        json!({ "method": "update", "namespace": "test", "key": "a", "value": 1 }),
        db_str,
    );
    exec(
        json!({ "method": "update", "namespace": "test", "key": "a", "value": 2 }),
        db_str,
    );

    let (stdout, _stderr, success) = run_smt(&["log", "test"], db_str);
    assert!(success);
    let log: Value = serde_json::from_str(stdout.trim()).unwrap();
    let versions = log["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["sequence"], 2);

    let (stdout, _stderr, success) = run_smt(&["namespaces"], db_str);
    assert!(success);
    let listed: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(listed["namespaces"], json!(["test"]));
}

#[test]
fn test_cli_compact_keeps_data() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.smt");
    let db_str = db_path.to_str().unwrap();

    for i in 0..5 {
        exec(
            json!({ "method": "update", "namespace": "test", "key": "a", "value": i }),
            db_str,
        );
    }
    let before = std::fs::metadata(&db_path).unwrap().len();

    let (stdout, _stderr, success) = run_smt(&["compact"], db_str);
    assert!(success);
    assert!(stdout.contains("\"status\":\"ok\""));
    assert!(std::fs::metadata(&db_path).unwrap().len() < before);

    let value = exec(
        json!({ "method": "get_value", "namespace": "test", "key": "a" }),
        db_str,
    );
    assert_eq!(value["value"], 4);
    let history = exec(json!({ "method": "history", "namespace": "test" }), db_str);
    assert_eq!(history["roots"].as_array().unwrap().len(), 6);
}
