//! End-to-end coverage of `csp:iterate` against a discovered run.

mod common;

use common::{discover, read_json_file, run_cli, run_dir};
use tempfile::tempdir;

#[test]
fn iterate_after_discover_advances_the_run() {
    let workspace = tempdir().expect("tempdir");
    let discovered = discover(workspace.path(), "3", "Iterate test");
    assert_eq!(discovered.exit_code, 0, "stderr: {}", discovered.stderr);
    let run_id = discovered.json["run_id"].as_str().expect("run_id");

    let iterated = run_cli(
        workspace.path(),
        &[
            "csp:iterate",
            "--dry-run",
            "--workspace",
            workspace.path().to_str().expect("utf-8"),
            "--run-id",
            run_id,
            "--seed",
            "3",
        ],
    );
    assert_eq!(iterated.exit_code, 0, "stderr: {}", iterated.stderr);
    assert_eq!(iterated.json["status"], "ok");
    assert_eq!(iterated.json["iteration"], 1);
    assert!(iterated.json["decision"]["action"].is_string());

    let run_dir = run_dir(workspace.path(), &discovered);
    let record = read_json_file(&run_dir.join("iteration_1.json"));
    assert_eq!(record["iteration"], 1);
    assert_eq!(record["summary_hash"], iterated.json["summary_hash"]);

    let manifest = read_json_file(&run_dir.join("run_manifest.json"));
    assert_eq!(manifest["iteration"], 1);
    assert_eq!(manifest["status"], "ok");

    let constraints = read_json_file(&run_dir.join("constraints.json"));
    let adjustments = constraints["adjustments"].as_array().expect("adjustments");
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0]["iteration"], 1);
}

#[test]
fn iterating_past_the_cap_fails_and_leaves_the_manifest_alone() {
    let workspace = tempdir().expect("tempdir");
    let discovered = run_cli(
        workspace.path(),
        &[
            "csp:discover",
            "--dry-run",
            "--workspace",
            workspace.path().to_str().expect("utf-8"),
            "--seed",
            "5",
            "--objective",
            "Capped run",
            "--max-iters",
            "0",
        ],
    );
    assert_eq!(discovered.exit_code, 0, "stderr: {}", discovered.stderr);
    let run_id = discovered.json["run_id"].as_str().expect("run_id");
    let run_dir = run_dir(workspace.path(), &discovered);
    let before = read_json_file(&run_dir.join("run_manifest.json"));

    let iterated = run_cli(
        workspace.path(),
        &[
            "csp:iterate",
            "--dry-run",
            "--workspace",
            workspace.path().to_str().expect("utf-8"),
            "--run-id",
            run_id,
        ],
    );
    assert_eq!(iterated.exit_code, 1);
    assert_eq!(iterated.json["status"], "error");
    assert!(iterated.json["error"]
        .as_str()
        .expect("error message")
        .contains("max iterations"));

    let after = read_json_file(&run_dir.join("run_manifest.json"));
    assert_eq!(after, before);
}

#[test]
fn unknown_run_id_is_reported_without_creating_artifacts() {
    let workspace = tempdir().expect("tempdir");
    let result = run_cli(
        workspace.path(),
        &[
            "csp:iterate",
            "--dry-run",
            "--workspace",
            workspace.path().to_str().expect("utf-8"),
            "--run-id",
            "run_1_deadbeef",
        ],
    );
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.json["status"], "error");
    assert!(result.json["error"]
        .as_str()
        .expect("error message")
        .contains("run not found"));
    assert!(!workspace.path().join("runs/run_1_deadbeef").exists());
}
