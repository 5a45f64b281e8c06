//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory holding a
//! small catalog, and checks the printed output.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

const CATALOG: &str = r#"{
    "games": [{ "id": "alpha", "name": "Alpha" }],
    "accounts": [
        { "id": "x", "game_id": "alpha", "name": "Xavier", "started_at": "2020-01-01T00:00:00Z" },
        { "id": "y", "game_id": "alpha", "name": "Yara", "started_at": "2020-01-01T00:00:00Z" }
    ],
    "levels": [
        { "id": "l1", "game_id": "alpha", "number": 1, "event_token": "lv1", "time_spent": 60 },
        { "id": "l2", "game_id": "alpha", "number": 2, "event_token": "lv2", "time_spent": 120 }
    ],
    "purchase_events": [],
    "requests": {
        "x": [
            { "kind": "session", "event_token": "lv1", "time_spent": 60, "level_id": "l1" },
            { "kind": "event", "event_token": "lv1", "time_spent": 60, "level_id": "l1" },
            { "kind": "session", "event_token": "lv2", "time_spent": 120, "level_id": "l2" }
        ],
        "y": [
            { "kind": "session", "event_token": "lv1", "time_spent": 60, "level_id": "l1" }
        ]
    }
}"#;

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("catalog.json"), CATALOG).unwrap();
    dir
}

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_cadence"))
        .args(args)
        .env("CADENCE_HOME", home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_generate_reports_plan() {
    let home = setup();
    let report = run_json(home.path(), &["generate", "--json"]);
    assert_eq!(report["batches"], 2);
    assert_eq!(report["tasks"], 3);
    assert!(home.path().join("cadence.db").exists());
}

#[test]
fn test_status_without_plan() {
    let home = setup();
    let (stdout, _, code) = run_cli(home.path(), &["status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No plan"));
}

#[test]
fn test_status_lists_tasks() {
    let home = setup();
    run_json(home.path(), &["generate", "--json"]);

    let statuses = run_json(home.path(), &["status", "--json"]);
    let statuses = statuses.as_array().unwrap();
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses[0]["account_id"], "x");
    assert_eq!(statuses[0]["readiness"]["state"], "ready");
    assert_eq!(statuses[2]["readiness"]["state"], "blocked");

    let (stdout, _, code) = run_cli(home.path(), &["status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("[batch 0] Xavier (alpha) lv1"));
}

#[test]
fn test_complete_group_updates_ledger_and_catalog() {
    let home = setup();
    run_json(home.path(), &["generate", "--json"]);

    let (stdout, _, code) = run_cli(home.path(), &["complete", "x", "0"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("1 left in group"));

    let (stdout, _, code) = run_cli(home.path(), &["complete", "x", "1", "--batch", "0"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Completed lv1 for Xavier (Alpha)"));

    let ledger = run_json(home.path(), &["ledger", "--json"]);
    assert_eq!(ledger.as_array().unwrap().len(), 1);
    assert_eq!(ledger[0]["request_type"], "level");

    let catalog = std::fs::read_to_string(home.path().join("catalog.json")).unwrap();
    assert!(catalog.contains("\"milestone_id\": \"l1\""));

    let report = run_json(home.path(), &["generate", "--json"]);
    assert_eq!(report["tasks"], 2);
}

#[test]
fn test_complete_unknown_batch_fails() {
    let home = setup();
    run_json(home.path(), &["generate", "--json"]);
    let (_, stderr, code) = run_cli(home.path(), &["complete", "x", "0", "--batch", "7"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_complete_without_plan_fails() {
    let home = setup();
    let (_, stderr, code) = run_cli(home.path(), &["complete", "x", "0"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("cadence generate"));
}

#[test]
fn test_watch_runs_bounded_ticks() {
    let home = setup();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "engine.tick_interval_ms", "10"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["watch", "--ticks", "3"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.lines().count(), 3);
}

#[test]
fn test_watch_picks_up_completions_from_other_runs() {
    let home = setup();
    run_json(home.path(), &["generate", "--json"]);
    let (_, _, code) = run_cli(home.path(), &["config", "set", "engine.tick_interval_ms", "100"]);
    assert_eq!(code, 0);

    let watch = Command::new(env!("CARGO_BIN_EXE_cadence"))
        .args(["watch", "--ticks", "40"])
        .env("CADENCE_HOME", home.path())
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to start watch");
    std::thread::sleep(Duration::from_millis(800));

    let (_, stderr, code) = run_cli(home.path(), &["complete", "x", "0"]);
    assert_eq!(code, 0, "{stderr}");
    let (_, stderr, code) = run_cli(home.path(), &["complete", "x", "1"]);
    assert_eq!(code, 0, "{stderr}");

    let output = watch.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lv2: Vec<&str> = stdout
        .lines()
        .filter(|l| l.contains("[batch 1] Xavier (alpha) lv2"))
        .collect();
    assert!(
        lv2.last().is_some_and(|l| l.contains("cooldown")),
        "watch output:\n{stdout}"
    );
}

#[test]
fn test_config_get_set() {
    let home = setup();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "engine.purchase_jitter_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "30");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "engine.purchase_jitter_secs", "12"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "engine.purchase_jitter_secs"]);
    assert_eq!(stdout.trim(), "12");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "engine.bogus", "1"]);
    assert_ne!(code, 0);
}
