//! CLI command contract tests.
//!
//! Runs the `segfuse` binary against temp fixtures with the in-process
//! store and hash embedders, so no network or model download is needed.
//!
//! Contract guarantees tested:
//! - Command results are JSON on stdout
//! - Failures exit with status 1 and an actionable message on stderr
//! - `query` never returns more hits than `--limit`

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

// =============================================================================
// Test fixture helpers
// =============================================================================

const CORPUS: &str = r#"[
    {"_id": 1, "start": "00:00:00", "end": "00:00:12", "text": "inflammatory bowel disease is a chronic condition", "full_text": "a lecture on gut health"},
    {"_id": 2, "start": "00:00:12", "end": "00:00:25", "text": "common symptoms of IBD include abdominal pain", "full_text": "a lecture on gut health"},
    {"_id": 3, "start": "00:00:25", "end": "00:00:33", "text": "fatigue and weight loss are also reported", "full_text": "a lecture on gut health"},
    {"_id": 4, "start": "00:00:33", "end": "00:00:47", "text": "a fiber rich diet supports the microbiome", "full_text": "a lecture on gut health"},
    {"_id": 5, "start": "00:00:47", "end": "00:01:02", "text": "treatment combines medication and diet", "full_text": "a lecture on gut health"},
    {"_id": 6, "start": "00:01:02", "end": "00:01:10", "text": "", "full_text": "a lecture on gut health"}
]"#;

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path.to_string_lossy().to_string()
}

/// Temp workspace with a small-dimension config and a corpus file.
fn setup_workspace() -> (TempDir, String, String) {
    let dir = TempDir::new().expect("create temp dir");
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).expect("create docs dir");
    std::fs::write(docs.join("lecture.json"), CORPUS).expect("write document");

    let config = format!(
        r#"
[models.full_text]
dimension = 64

[models.segment]
dimension = 64

[models.late_interaction]
dimension = 32

[retry]
initial_delay_ms = 1
max_delay_ms = 5

[logging]
level = "warn"

[notifications]
documents_dir = "{}"
"#,
        docs.to_string_lossy().replace('\\', "/")
    );
    let config_path = write(dir.path(), "segfuse.toml", &config);
    let corpus_path = write(dir.path(), "corpus.json", CORPUS);
    (dir, config_path, corpus_path)
}

fn segfuse(config: &str) -> Command {
    let mut cmd = Command::cargo_bin("segfuse").expect("binary built");
    cmd.env_remove("RUST_LOG").arg("--config").arg(config);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// =============================================================================
// config
// =============================================================================

#[test]
fn config_prints_effective_toml() {
    let (_dir, config, _) = setup_workspace();
    segfuse(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[collection]"))
        .stdout(predicate::str::contains("rrf_k = 60"))
        .stdout(predicate::str::contains("prefetch_limit = 20"));
}

#[test]
fn invalid_config_exits_with_remediation() {
    let dir = TempDir::new().unwrap();
    let config = write(dir.path(), "bad.toml", "[collection]\nname = \"  \"\n");
    segfuse(&config)
        .arg("config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("collection.name"))
        .stderr(predicate::str::contains("Category: config"))
        .stderr(predicate::str::contains("segfuse config"));
}

#[test]
fn missing_config_file_fails() {
    segfuse("/nonexistent/segfuse.toml")
        .arg("config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

// =============================================================================
// ensure / index
// =============================================================================

#[test]
fn ensure_reports_created_collection() {
    let (_dir, config, _) = setup_workspace();
    let output = segfuse(&config).arg("ensure").output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["collection"], "segments");
    assert_eq!(json["provisioning"], "created");
}

#[test]
fn index_reports_counts_and_rejections() {
    let (_dir, config, corpus) = setup_workspace();
    let output = segfuse(&config).args(["index", &corpus]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["indexed"], 5);
    assert_eq!(json["provisioning"], "created");
    assert_eq!(json["rejected"].as_array().unwrap().len(), 1);
    assert_eq!(json["rejected"][0]["position"], 5);
    assert_eq!(json["batches"].as_array().unwrap().len(), 2);
}

#[test]
fn index_missing_corpus_fails() {
    let (_dir, config, _) = setup_workspace();
    segfuse(&config)
        .args(["index", "/nonexistent/corpus.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Category: io"));
}

// =============================================================================
// query
// =============================================================================

#[test]
fn query_respects_limit_and_orders_scores() {
    let (_dir, config, corpus) = setup_workspace();
    let output = segfuse(&config)
        .args(["query", "symptoms of IBD", "--limit", "3", "--corpus", &corpus])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let hits = stdout_json(&output)["hits"].as_array().unwrap().clone();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 3);
    let scores: Vec<f64> = hits.iter().map(|h| h["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    for hit in &hits {
        assert_eq!(hit["payload"]["_id"], hit["id"]);
        assert!(hit["payload"]["text"].is_string());
    }
}

#[test]
fn query_without_collection_is_store_rejected() {
    let (_dir, config, _) = setup_workspace();
    segfuse(&config)
        .args(["query", "anything"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Category: store_rejected"))
        .stderr(predicate::str::contains("segfuse ensure"));
}

// =============================================================================
// notify
// =============================================================================

#[test]
fn notify_answers_subscription_validation() {
    let (dir, config, _) = setup_workspace();
    let events = write(
        dir.path(),
        "events.json",
        r#"[{"eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
             "data": {"validationCode": "512d38b6-c7b8-40c8-89fe-f46f9e9622b6"}}]"#,
    );
    let output = segfuse(&config).args(["notify", &events]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output)["validationResponse"],
        "512d38b6-c7b8-40c8-89fe-f46f9e9622b6"
    );
}

#[test]
fn notify_indexes_added_document_from_stdin() {
    let (_dir, config, _) = setup_workspace();
    let events = r#"{"eventType": "Microsoft.Storage.BlobCreated",
                    "data": {"url": "https://account.blob.core.windows.net/docs/lecture.json"}}"#;
    let output = segfuse(&config)
        .args(["notify", "-"])
        .write_stdin(events)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let outcomes = stdout_json(&output);
    assert_eq!(outcomes[0]["outcome"], "indexed");
    assert_eq!(outcomes[0]["document"], "lecture.json");
    assert_eq!(outcomes[0]["report"]["indexed"], 5);
}

#[test]
fn notify_ignores_unknown_event_types() {
    let (dir, config, _) = setup_workspace();
    let events = write(
        dir.path(),
        "events.json",
        r#"[{"eventType": "Microsoft.Storage.BlobTierChanged", "data": {}}]"#,
    );
    let output = segfuse(&config).args(["notify", &events]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)[0]["outcome"], "ignored");
}

// =============================================================================
// delete
// =============================================================================

#[test]
fn delete_requires_ids() {
    let (_dir, config, _) = setup_workspace();
    segfuse(&config).arg("delete").assert().failure();
}
