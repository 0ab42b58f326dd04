//! End-to-end tests for the `envx` binary.
//!
//! stdout is not a terminal here, so every command answers in JSON.
//! `--quiet` keeps log lines out of stderr, which then holds only the
//! structured error.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn envx(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("envx").unwrap();
    cmd.env_remove("ENVX_DB")
        .env_remove("ENVX_MODE")
        .env_remove("ENVX_SOURCE")
        .env_remove("RUST_LOG")
        .arg("--quiet")
        .arg("--root")
        .arg(root);
    cmd
}

fn json_out(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn json_err(cmd: &mut Command, code: i32) -> Value {
    let output = cmd.assert().code(code).get_output().stderr.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn init_then_init_again_fails() {
    let dir = TempDir::new().unwrap();
    let out = json_out(envx(dir.path()).arg("init"));
    assert_eq!(out["mode"], "tagged");
    assert!(dir.path().join(".envx/envx.db").exists());

    let err = json_err(envx(dir.path()).arg("init"), 2);
    assert_eq!(err["error"]["code"], "ALREADY_INITIALIZED");

    envx(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn commands_before_init_report_not_initialized() {
    let dir = TempDir::new().unwrap();
    let err = json_err(envx(dir.path()).arg("tags"), 2);
    assert_eq!(err["error"]["code"], "NOT_INITIALIZED");
}

#[test]
fn tag_show_and_auto_tags() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "# app\nA=1\nexport B=\"two words\"\n").unwrap();
    envx(dir.path()).arg("init").assert().success();

    let env_file = dir.path().join(".env");
    let first = json_out(envx(dir.path()).arg("tag").arg("--file").arg(&env_file));
    assert_eq!(first["tag"], "auto-1");
    assert_eq!(first["written"], 2);

    let second = json_out(envx(dir.path()).arg("tag").arg("--file").arg(&env_file));
    assert_eq!(second["tag"], "auto-2");

    let shown = json_out(envx(dir.path()).args(["show", "auto-1"]));
    assert_eq!(shown["values"]["B"], "two words");
    assert_eq!(shown["count"], 2);

    let tags = json_out(envx(dir.path()).arg("tags"));
    assert_eq!(tags["count"], 2);

    let err = json_err(envx(dir.path()).args(["show", "missing"]), 3);
    assert_eq!(err["error"]["code"], "TAG_NOT_FOUND");
}

#[test]
fn versioned_set_del_latest() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).args(["--mode", "versioned", "init"]).assert().success();

    let first = json_out(envx(dir.path()).args(["set", "API_URL", "http://a"]));
    assert_eq!(first["version"], 1);
    assert_eq!(first["action"], "created");

    let second = json_out(envx(dir.path()).args(["set", "API_URL", "http://b"]));
    assert_eq!(second["version"], 2);
    assert_eq!(second["action"], "updated");

    let latest = json_out(envx(dir.path()).args(["latest", "API_URL"]));
    assert_eq!(latest["value"], "http://b");

    let deleted = json_out(envx(dir.path()).args(["del", "API_URL"]));
    assert_eq!(deleted["action"], "deleted");

    let err = json_err(envx(dir.path()).args(["latest", "API_URL"]), 3);
    assert_eq!(err["error"]["code"], "KEY_NOT_FOUND");

    let history = json_out(envx(dir.path()).args(["history", "API_URL"]));
    assert_eq!(history["count"], 3);
    assert_eq!(history["records"][0]["version"], 3);
}

#[test]
fn tagged_store_rejects_versioned_mode() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).arg("init").assert().success();

    let err = json_err(envx(dir.path()).args(["--mode", "versioned", "tags"]), 2);
    assert_eq!(err["error"]["code"], "DIALECT_MISMATCH");

    let err = json_err(envx(dir.path()).args(["stats", "--versions"]), 4);
    assert_eq!(err["error"]["code"], "UNSUPPORTED_OPERATION");
}

#[test]
fn upgrade_converts_versioned_store() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).args(["--mode", "versioned", "init"]).assert().success();
    envx(dir.path()).args(["set", "A", "1"]).assert().success();
    envx(dir.path()).args(["set", "A", "2", "--tag", "v1"]).assert().success();

    let upgraded = json_out(envx(dir.path()).arg("upgrade"));
    assert_eq!(upgraded["mode"], "tagged");
    assert_eq!(upgraded["applied"][0], "003_convert_to_tagged");

    let stats = json_out(envx(dir.path()).arg("stats"));
    assert_eq!(stats["total_records"], 2);

    let shown = json_out(envx(dir.path()).args(["show", "v1"]));
    assert_eq!(shown["values"]["A"], "2");
}

#[test]
fn export_import_roundtrip() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    envx(source.path()).arg("init").assert().success();
    envx(target.path()).arg("init").assert().success();
    envx(source.path()).args(["set", "A", "1", "--tag", "release"]).assert().success();
    envx(source.path()).args(["set", "B", "2", "--tag", "release"]).assert().success();

    let file = source.path().join("release.json");
    envx(source.path())
        .args(["export", "release", "--out"])
        .arg(&file)
        .assert()
        .success();

    let imported = json_out(envx(target.path()).arg("import").arg(&file));
    assert_eq!(imported["tag"], "release");
    assert_eq!(imported["written"], 2);

    envx(target.path()).arg("import").arg(&file).assert().success();
    let stats = json_out(envx(target.path()).args(["stats", "--tag", "release"]));
    assert_eq!(stats["total_records"], 2);
}

#[test]
fn invalid_key_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).arg("init").assert().success();

    let err = json_err(envx(dir.path()).args(["set", "A=B", "1"]), 4);
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
}

#[test]
fn explicit_db_path_wins() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("custom").join("history.db");
    envx(dir.path()).arg("--db").arg(&db).arg("init").assert().success();
    assert!(db.exists());
    assert!(!dir.path().join(".envx/envx.db").exists());
}

#[test]
fn version_reports_schema() {
    let dir = TempDir::new().unwrap();
    let out = json_out(envx(dir.path()).arg("version"));
    assert_eq!(out["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(out["schema"]["tagged"], "001_tagged_history");
}

#[test]
fn history_narrows_by_key_and_tag() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).arg("init").assert().success();
    envx(dir.path()).args(["set", "A", "1", "--tag", "v1"]).assert().success();
    envx(dir.path()).args(["set", "A", "2", "--tag", "v2"]).assert().success();
    envx(dir.path()).args(["set", "B", "3", "--tag", "v1"]).assert().success();

    let both = json_out(envx(dir.path()).args(["history", "A", "--tag", "v1"]));
    assert_eq!(both["count"], 1);
    assert_eq!(both["records"][0]["key"], "A");
    assert_eq!(both["records"][0]["tag"], "v1");
    assert_eq!(both["records"][0]["value"], "1");

    let none = json_out(envx(dir.path()).args(["history", "B", "--tag", "v2"]));
    assert_eq!(none["count"], 0);
}

#[test]
fn show_writes_dotenv_file() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).arg("init").assert().success();
    envx(dir.path()).args(["set", "A", "two words", "--tag", "v1"]).assert().success();

    let out = dir.path().join(".env.restored");
    let written = json_out(envx(dir.path()).args(["show", "v1", "--out"]).arg(&out));
    assert_eq!(written["count"], 1);

    let restored = std::fs::read_to_string(&out).unwrap();
    assert!(restored.contains("A="));
    assert!(restored.contains("two words"));
}

/// Sorted `(key, value, timestamp)` triples from `history` output.
fn history_triples(root: &Path) -> Vec<(String, String, String)> {
    let out = json_out(envx(root).arg("history"));
    let mut triples: Vec<_> = out["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["key"].as_str().unwrap().to_string(),
                r["value"].as_str().unwrap().to_string(),
                r["timestamp"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    triples.sort();
    triples
}

#[test]
fn legacy_store_keeps_its_data_through_migration_and_upgrade() {
    let dir = TempDir::new().unwrap();
    let store_dir = dir.path().join(".envx");
    std::fs::create_dir_all(&store_dir).unwrap();
    let conn = rusqlite::Connection::open(store_dir.join("envx.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE env_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            version INTEGER NOT NULL,
            action TEXT NOT NULL,
            source TEXT NOT NULL
        );
        INSERT INTO env_history (key, value, timestamp, version, action, source) VALUES
            ('API_URL', 'http://a', '2024-01-01T00:00:00.000Z', 1, 'created', 'init'),
            ('API_URL', 'http://b', '2024-01-02T00:00:00.000Z', 2, 'updated', 'set'),
            ('TOKEN', 's3cret', '2024-01-03T00:00:00.000Z', 1, 'created', 'set'),
            ('API_URL', '', '2024-01-04T00:00:00.000Z', 3, 'deleted', 'del');",
    )
    .unwrap();
    drop(conn);

    let expected = vec![
        ("API_URL".to_string(), String::new(), "2024-01-04T00:00:00.000Z".to_string()),
        ("API_URL".to_string(), "http://a".to_string(), "2024-01-01T00:00:00.000Z".to_string()),
        ("API_URL".to_string(), "http://b".to_string(), "2024-01-02T00:00:00.000Z".to_string()),
        ("TOKEN".to_string(), "s3cret".to_string(), "2024-01-03T00:00:00.000Z".to_string()),
    ];

    // First open adopts the table and runs the pending versioned step
    assert_eq!(history_triples(dir.path()), expected);
    let latest = json_out(envx(dir.path()).args(["latest", "TOKEN"]));
    assert_eq!(latest["version"], 1);

    let upgraded = json_out(envx(dir.path()).arg("upgrade"));
    assert_eq!(upgraded["mode"], "tagged");
    assert_eq!(history_triples(dir.path()), expected);

    let stats = json_out(envx(dir.path()).arg("stats"));
    assert_eq!(stats["total_records"], 4);
    assert_eq!(stats["unique_keys"], 2);
}

#[test]
fn prune_with_largest_day_count_removes_nothing() {
    let dir = TempDir::new().unwrap();
    envx(dir.path()).arg("init").assert().success();
    envx(dir.path()).args(["set", "A", "1", "--tag", "v1"]).assert().success();

    let out = json_out(envx(dir.path()).args(["prune", "--days", "4294967295"]));
    assert_eq!(out["deleted"], 0);

    let stats = json_out(envx(dir.path()).arg("stats"));
    assert_eq!(stats["total_records"], 1);
}
