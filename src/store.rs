//! Artifact store: the per-run directory layout, typed reads and writes, and
//! the append-only event log. No other module touches the filesystem.

use crate::schema::{
    Candidate, ConstraintsSpec, IterationRecord, RunManifest, ValidationReport,
    ValidationSummary,
};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CIF_EXTENSION: &str = "cif";
pub const POSCAR_EXTENSION: &str = "poscar";

static CANDIDATE_ID: OnceLock<Regex> = OnceLock::new();

pub fn candidate_id_regex() -> &'static Regex {
    CANDIDATE_ID.get_or_init(|| Regex::new(r"^cand_\d{4}$").expect("candidate id pattern"))
}

/// Path catalogue for one run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    run_id: String,
    run_dir: PathBuf,
}

impl RunPaths {
    pub fn new(workspace: &Path, run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            run_dir: workspace.join("runs").join(run_id),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.run_dir.join("run_manifest.json")
    }

    pub fn constraints_path(&self) -> PathBuf {
        self.run_dir.join("constraints.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.run_dir.join("events.jsonl")
    }

    pub fn candidates_dir(&self) -> PathBuf {
        self.run_dir.join("candidates")
    }

    pub fn candidate_path(&self, candidate_id: &str) -> PathBuf {
        self.candidates_dir().join(format!("{candidate_id}.{CIF_EXTENSION}"))
    }

    pub fn validation_dir(&self) -> PathBuf {
        self.run_dir.join("validation")
    }

    pub fn report_path(&self, candidate_id: &str) -> PathBuf {
        self.validation_dir().join(format!("report_{candidate_id}.json"))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.validation_dir().join("summary.json")
    }

    pub fn iteration_path(&self, iteration: u32) -> PathBuf {
        self.run_dir.join(format!("iteration_{iteration}.json"))
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.run_dir.join("exports")
    }

    pub fn export_path(&self, candidate_id: &str, extension: &str) -> PathBuf {
        self.exports_dir().join(format!("{candidate_id}.{extension}"))
    }
}

pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}

/// Write-temp-then-rename so readers never observe a half-written artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("no parent directory for {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");
    let tmp_path = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, bytes).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("publish {}", path.display()))?;
    Ok(())
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value).context("serialize JSON artifact")?;
    text.push('\n');
    write_atomic(path, text.as_bytes())
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    write_atomic(path, text.as_bytes())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn load_manifest(paths: &RunPaths) -> Result<RunManifest> {
    let path = paths.manifest_path();
    if !path.is_file() {
        return Err(anyhow!("run not found: {}", paths.run_id()));
    }
    read_json(&path)
}

pub fn write_manifest(paths: &RunPaths, manifest: &RunManifest) -> Result<()> {
    write_json_pretty(&paths.manifest_path(), manifest)
}

pub fn load_constraints(paths: &RunPaths) -> Result<ConstraintsSpec> {
    read_json(&paths.constraints_path())
}

pub fn write_constraints(paths: &RunPaths, constraints: &ConstraintsSpec) -> Result<()> {
    write_json_pretty(&paths.constraints_path(), constraints)
}

pub fn load_summary(paths: &RunPaths) -> Result<ValidationSummary> {
    read_json(&paths.summary_path())
}

pub fn write_summary(paths: &RunPaths, summary: &ValidationSummary) -> Result<()> {
    write_json_pretty(&paths.summary_path(), summary)
}

pub fn write_candidate(paths: &RunPaths, candidate: &Candidate) -> Result<()> {
    write_text(&paths.candidate_path(&candidate.candidate_id), &candidate.content)
}

pub fn write_report(paths: &RunPaths, report: &ValidationReport) -> Result<()> {
    write_json_pretty(&paths.report_path(&report.candidate_id), report)
}

pub fn write_iteration_record(paths: &RunPaths, record: &IterationRecord) -> Result<()> {
    write_json_pretty(&paths.iteration_path(record.iteration), record)
}

/// Candidate ids recovered from `candidates/`, ascending by filename.
/// Files that do not match the `cand_NNNN.cif` shape are ignored.
pub fn list_candidate_ids(paths: &RunPaths) -> Result<Vec<String>> {
    let dir = paths.candidates_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let is_cif = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == CIF_EXTENSION);
        if is_cif && candidate_id_regex().is_match(stem) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// One compact JSON object per line; the log only ever grows.
pub fn append_event(paths: &RunPaths, event: &str, details: Value) -> Result<()> {
    let path = paths.events_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut record = serde_json::Map::new();
    record.insert("event".to_string(), Value::String(event.to_string()));
    record.insert("timestamp".to_string(), Value::from(now_epoch_ms()? as u64));
    if let Value::Object(extra) = details {
        for (key, value) in extra {
            record.insert(key, value);
        }
    }
    let line = serde_json::to_string(&Value::Object(record)).context("serialize run event")?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
