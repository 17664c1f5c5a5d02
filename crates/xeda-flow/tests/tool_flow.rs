#![cfg(unix)]

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;
use xeda_core::XedaError;
use xeda_flow::{Flow, FlowRunner, RunnerOptions, SettingsRequest};

fn runner(runs_root: &Path, synth_args: serde_json::Value) -> FlowRunner {
    let project = json!({
        "design": {"name": "aes"},
        "flows": {"synth": {"clock_period": 5.0, "tool": "/bin/sh", "args": synth_args}}
    });
    let resolved =
        FlowRunner::resolve_settings(&project, &SettingsRequest::default()).expect("resolve");
    FlowRunner::new(
        resolved,
        RunnerOptions {
            runs_root: runs_root.to_path_buf(),
            ..RunnerOptions::default()
        },
    )
}

#[tokio::test]
async fn launch_runs_tool_and_parses_results() {
    let dir = tempdir().expect("tempdir");
    let script = r#"echo '{"wns": 0.12, "lut": 1204}' > results.json; echo "period {clock_period} threads $XEDA_NTHREADS""#;
    let runner = runner(dir.path(), json!(["-c", script]));

    let results = runner.launch("synth").await.expect("launch");
    assert!(results.success());
    assert_eq!(results.get_f64("lut"), Some(1204.0));
    assert_eq!(results.get_f64("clock_frequency"), Some(200.0));
    assert_eq!(results.get("design.name"), Some(&json!("aes")));
    assert_eq!(results.get("flow.name"), Some(&json!("synth")));

    let run_dir = dir.path().join("synth");
    assert!(run_dir.join("settings.json").exists());
    assert!(run_dir.join("synth_results.json").exists());
    let log = fs::read_to_string(run_dir.join("synth_stdout.log")).expect("log");
    assert!(log.contains("period 5.0 threads 4"));
}

#[tokio::test]
async fn negative_slack_fails_the_flow() {
    let dir = tempdir().expect("tempdir");
    let script = r#"echo '{"wns": -0.3}' > results.json"#;
    let runner = runner(dir.path(), json!(["-c", script]));
    let results = runner.launch("synth").await.expect("launch");
    assert!(!results.success());
}

#[tokio::test]
async fn nonzero_exit_is_tool_execution_error() {
    let dir = tempdir().expect("tempdir");
    let runner = runner(dir.path(), json!(["-c", "exit 3"]));
    let err = runner.launch("synth").await.unwrap_err();
    assert!(matches!(err, XedaError::ToolExecution(_)));
    assert_eq!(err.info().context.get("exit").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn missing_tool_setting_is_flow_fatal() {
    let dir = tempdir().expect("tempdir");
    let project = json!({"design": {"name": "aes"}, "flows": {}});
    let resolved =
        FlowRunner::resolve_settings(&project, &SettingsRequest::default()).expect("resolve");
    let runner = FlowRunner::new(
        resolved,
        RunnerOptions {
            runs_root: dir.path().to_path_buf(),
            ..RunnerOptions::default()
        },
    );
    let mut flow = runner.instantiate("sim").expect("instantiate");
    let err = flow.run().await.unwrap_err();
    assert!(matches!(err, XedaError::FlowFatal(_)));
}
