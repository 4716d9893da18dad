//! CommandProcessor and stage tests. Use `sh`, so unix only.
#![cfg(unix)]

use enricher::checkpoint::CheckpointStore;
use enricher::pipeline::PipelineRunner;
use enricher::process::{CommandProcessor, Processor};
use enricher::stage::{Stage, write_results};
use enricher::{ItemContext, PipelineOpts};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn sh(script: &str) -> CommandProcessor {
    CommandProcessor::new(&["sh".to_string(), "-c".to_string(), script.to_string()]).unwrap()
}

fn ctx() -> ItemContext {
    ItemContext {
        dataset_label: "ds".to_string(),
        file_id: "f.json".to_string(),
        item_id: "42".to_string(),
        worker_id: 0,
    }
}

#[test]
fn test_command_echoes_payload() {
    let out = sh("cat").process(&ctx(), &json!({"name": "Acme Ltd"})).unwrap();
    assert_eq!(out, Some(json!({"name": "Acme Ltd"})));
}

#[test]
fn test_command_sees_item_environment() {
    let out = sh(r#"printf '{"item":"%s","file":"%s"}' "$ENRICHER_ITEM" "$ENRICHER_FILE""#)
        .process(&ctx(), &json!(null))
        .unwrap();
    assert_eq!(out, Some(json!({"item": "42", "file": "f.json"})));
}

#[test]
fn test_command_empty_or_null_output_is_no_result() {
    assert_eq!(sh("cat > /dev/null").process(&ctx(), &json!(1)).unwrap(), None);
    assert_eq!(sh("echo null").process(&ctx(), &json!(1)).unwrap(), None);
}

#[test]
fn test_command_failure_is_an_error() {
    let err = sh("echo 'rate limited' >&2; exit 3")
        .process(&ctx(), &json!({}))
        .unwrap_err();
    assert!(format!("{err:#}").contains("rate limited"));
}

#[test]
fn test_command_invalid_json_is_an_error() {
    assert!(sh("echo not-json").process(&ctx(), &json!({})).is_err());
}

#[test]
fn test_command_timeout_kills_child() {
    let processor = sh("sleep 5").with_timeout(Some(Duration::from_millis(100)));
    let start = std::time::Instant::now();
    let err = processor.process(&ctx(), &json!({})).unwrap_err();
    assert!(err.to_string().contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_empty_command_is_rejected() {
    assert!(CommandProcessor::new(&[]).is_err());
}

#[test]
fn test_stage_runs_command_and_writes_results() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    std::fs::write(
        input.path().join("people.json"),
        br#"{"a": {"n": 1}, "b": {"n": 2}}"#,
    )
    .unwrap();

    let mut stage = Stage::new(
        "people",
        input.path(),
        vec!["sh".to_string(), "-c".to_string(), "cat".to_string()],
    );
    let output = work.path().join("out").join("people.json");
    stage.output = Some(output.clone());
    stage.limits.max_concurrent_sessions = Some(1);

    let base = PipelineOpts {
        max_concurrent_requests: 2,
        checkpoint_dir: work.path().join("checkpoints"),
        ..Default::default()
    };
    let store = Arc::new(CheckpointStore::open(&base.checkpoint_dir).unwrap());
    let mut runner = PipelineRunner::with_store(stage.opts(&base), Arc::clone(&store)).unwrap();
    let outcome = stage.run(&mut runner).unwrap();

    assert_eq!(outcome.results.len(), 2);
    let written: Vec<Value> =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written.len(), 2);
    assert!(written.contains(&json!({"n": 1})));
    assert!(written.contains(&json!({"n": 2})));
    assert_eq!(store.load("people").total_processed, 2);
}

#[test]
fn test_write_results_pretty_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    write_results(&path, &[json!({"a": 1})]).unwrap();
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains('\n'));
    assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), json!([{"a": 1}]));
}
