//! Shared test infrastructure for the CLI integration suites.

use serde_json::Value;
use std::path::Path;
use std::process::Command;

pub struct CliResult {
    pub exit_code: i32,
    pub json: Value,
    pub stderr: String,
}

/// Runs the compiled binary with `HOME` pinned to the test directory so the
/// resolver never picks up a real user config.
pub fn run_cli(home: &Path, args: &[&str]) -> CliResult {
    let output = Command::new(env!("CARGO_BIN_EXE_csp-flow"))
        .args(args)
        .env("HOME", home)
        .output()
        .expect("run csp-flow");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert_eq!(
        stdout.lines().count(),
        1,
        "expected one JSON line on stdout, got: {stdout:?}"
    );
    let json: Value = serde_json::from_str(stdout.trim_end())
        .unwrap_or_else(|err| panic!("stdout is not strict JSON ({err}): {stdout:?}"));
    CliResult {
        exit_code: output.status.code().unwrap_or(-1),
        json,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

pub fn discover(workspace: &Path, seed: &str, objective: &str) -> CliResult {
    run_cli(
        workspace,
        &[
            "csp:discover",
            "--dry-run",
            "--workspace",
            workspace.to_str().expect("utf-8 workspace"),
            "--seed",
            seed,
            "--objective",
            objective,
        ],
    )
}

pub fn read_json_file(path: &Path) -> Value {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("read {} ({err})", path.display()));
    serde_json::from_str(&content)
        .unwrap_or_else(|err| panic!("parse {} ({err})", path.display()))
}

pub fn run_dir(workspace: &Path, result: &CliResult) -> std::path::PathBuf {
    let run_id = result.json["run_id"].as_str().expect("run_id in output");
    workspace.join("runs").join(run_id)
}
