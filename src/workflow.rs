//! Workflow engine: sequences scout, priors, constraints, solve, and
//! validation for discover; replays the solve half under a policy-mutated
//! constraint spec for iterate. All durable state goes through the artifact
//! store, keyed by the run id.

use crate::aggregate::aggregate_reports;
use crate::canonical;
use crate::config::Config;
use crate::persistence;
use crate::policy;
use crate::rng::Mulberry32;
use crate::schema::{
    Candidate, ChemistryPriors, ChemistrySuggestion, ConstraintsSpec, Decision, IterationRecord,
    RunManifest, RunStatus, ValidationReport, ValidationSummary,
};
use crate::store::{self, RunPaths, CIF_EXTENSION, POSCAR_EXTENSION};
use crate::tools::{self, ToolClient};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Salt for the chemistry-pick fork so the selection draw never disturbs the
/// run-id stream.
const CHEMISTRY_PICK_SALT: u32 = 0x003f_1c2b;

/// Everything a command needs; passed explicitly instead of living in module
/// state.
#[derive(Debug)]
pub struct WorkflowContext {
    pub config: Config,
    pub workspace: PathBuf,
    pub seed: u64,
    pub verbose: bool,
    pub client: ToolClient,
}

impl WorkflowContext {
    fn say(&self, message: &str) {
        if self.verbose {
            eprintln!("{message}");
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DiscoverOutcome {
    pub run_id: String,
    pub status: String,
    pub run_dir: String,
    pub selected_chemistry: ChemistrySuggestion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth_score: Option<f64>,
    pub candidate_ids: Vec<String>,
    pub summary_hash: String,
    pub iteration: u32,
}

#[derive(Debug, Serialize)]
pub struct IterateOutcome {
    pub run_id: String,
    pub status: String,
    pub iteration: u32,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth_score: Option<f64>,
    pub summary_hash: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutcome {
    pub run_id: String,
    pub status: String,
    pub validated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth_score: Option<f64>,
    pub summary_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Cif,
    Poscar,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Cif => CIF_EXTENSION,
            ExportFormat::Poscar => POSCAR_EXTENSION,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportOutcome {
    pub run_id: String,
    pub status: String,
    pub format: String,
    pub candidate_ids: Vec<String>,
    pub files: Vec<String>,
}

pub fn run_discover(
    ctx: &mut WorkflowContext,
    objective: &str,
    chem_system: Option<&str>,
) -> Result<DiscoverOutcome> {
    let mut rng = Mulberry32::new(ctx.seed).fork_label(objective);
    let run_id = format!("run_{}_{}", ctx.seed, rng.next_hex(8));
    let paths = RunPaths::new(&ctx.workspace, &run_id);
    ctx.say(&format!("discover: run {run_id}"));

    let now = store::now_epoch_ms()?;
    let manifest = RunManifest {
        run_id: run_id.clone(),
        status: RunStatus::Running,
        objective: objective.to_string(),
        chem_system: None,
        seed: ctx.seed,
        created_at: now,
        updated_at: now,
        iteration: 0,
        max_iters: ctx.config.policy.max_iters,
        selected_candidate_id: None,
        truth_score: None,
        config_snapshot: serde_json::to_value(&ctx.config).context("snapshot config")?,
    };
    store::write_manifest(&paths, &manifest)?;
    store::append_event(&paths, "run_manifest", json!({ "run_id": run_id }))?;
    store::append_event(
        &paths,
        "run_started",
        json!({ "objective": objective, "seed": ctx.seed }),
    )?;
    if ctx.config.persistence.enabled {
        let status = persistence::probe(&ctx.config.persistence);
        store::append_event(
            &paths,
            "persistence_status",
            serde_json::to_value(&status).context("serialize persistence status")?,
        )?;
    }

    match discover_inner(ctx, &paths, manifest, chem_system, &rng) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            mark_run_error(&paths);
            Err(err)
        }
    }
}

fn discover_inner(
    ctx: &mut WorkflowContext,
    paths: &RunPaths,
    mut manifest: RunManifest,
    chem_system: Option<&str>,
    rng: &Mulberry32,
) -> Result<DiscoverOutcome> {
    let selected = match chem_system {
        Some(raw) => ChemistrySuggestion {
            chem_system: normalize_chem_system(raw),
            rationale: "provided".to_string(),
            confidence: 1.0,
        },
        None => {
            let output = call_tool(
                ctx,
                paths,
                tools::SUGGEST_CHEMISTRIES,
                json!({ "objective": manifest.objective }),
            )?;
            let suggestions: Vec<ChemistrySuggestion> =
                parse_field(output, "chemistries", tools::SUGGEST_CHEMISTRIES)?;
            if suggestions.is_empty() {
                return Err(anyhow!("suggest_chemistries returned no chemistries"));
            }
            let index = rng
                .fork(CHEMISTRY_PICK_SALT)
                .next_int(0, suggestions.len() as i64 - 1) as usize;
            suggestions
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow!("chemistry index out of range"))?
        }
    };
    ctx.say(&format!("discover: chemistry {}", selected.chem_system));

    let output = call_tool(
        ctx,
        paths,
        tools::FETCH_PRIORS,
        json!({ "chem_system": selected.chem_system }),
    )?;
    let priors: ChemistryPriors = parse_field(output, "priors", tools::FETCH_PRIORS)?;

    let output = call_tool(
        ctx,
        paths,
        tools::BUILD_CONSTRAINTS,
        json!({
            "chem_system": selected.chem_system,
            "priors": priors,
            "overrides": ctx.config.overrides,
        }),
    )?;
    let constraints: ConstraintsSpec =
        parse_field(output, "constraints", tools::BUILD_CONSTRAINTS)?;
    store::write_constraints(paths, &constraints)?;

    let solve = solve_and_validate(ctx, paths, &constraints)?;

    manifest.status = RunStatus::Ok;
    manifest.chem_system = Some(selected.chem_system.clone());
    manifest.updated_at = store::now_epoch_ms()?;
    manifest.selected_candidate_id = best_candidate(&solve.summary);
    manifest.truth_score = best_truth_score(&solve.summary);
    store::write_manifest(paths, &manifest)?;

    Ok(DiscoverOutcome {
        run_id: paths.run_id().to_string(),
        status: RunStatus::Ok.as_str().to_string(),
        run_dir: paths.run_dir().display().to_string(),
        selected_chemistry: selected,
        chosen_candidate_id: manifest.selected_candidate_id.clone(),
        truth_score: manifest.truth_score,
        candidate_ids: solve.candidate_ids,
        summary_hash: solve.summary_hash,
        iteration: 0,
    })
}

pub fn run_iterate(ctx: &mut WorkflowContext, run_id: &str) -> Result<IterateOutcome> {
    let paths = RunPaths::new(&ctx.workspace, run_id);
    let mut manifest = store::load_manifest(&paths)?;
    let constraints = store::load_constraints(&paths)?;
    let prior_summary = store::load_summary(&paths)?;

    let next = manifest.iteration + 1;
    if next > manifest.max_iters {
        return Err(anyhow!(
            "max iterations reached ({} of {})",
            manifest.iteration,
            manifest.max_iters
        ));
    }

    let decision = policy::decide(&prior_summary, &ctx.config.policy, next);
    ctx.say(&format!(
        "iterate {next}: {} via {}",
        decision.mode, decision.action
    ));
    let constraints = policy::apply(constraints, &decision, next);
    store::append_event(
        &paths,
        "iteration_started",
        json!({
            "iteration": next,
            "mode": decision.mode.as_str(),
            "action": decision.action,
        }),
    )?;
    store::write_constraints(&paths, &constraints)?;

    match iterate_inner(ctx, &paths, &mut manifest, &constraints, decision, next) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            mark_run_error(&paths);
            Err(err)
        }
    }
}

fn iterate_inner(
    ctx: &mut WorkflowContext,
    paths: &RunPaths,
    manifest: &mut RunManifest,
    constraints: &ConstraintsSpec,
    decision: Decision,
    next: u32,
) -> Result<IterateOutcome> {
    let solve = solve_and_validate(ctx, paths, constraints)?;
    let chosen_candidate_id = best_candidate(&solve.summary);
    let truth_score = best_truth_score(&solve.summary);

    let record = IterationRecord {
        iteration: next,
        decision: decision.clone(),
        summary_hash: solve.summary_hash.clone(),
        chosen_candidate_id: chosen_candidate_id.clone(),
        truth_score,
    };
    store::write_iteration_record(paths, &record)?;

    manifest.iteration = next;
    manifest.status = RunStatus::Ok;
    manifest.updated_at = store::now_epoch_ms()?;
    manifest.selected_candidate_id = chosen_candidate_id.clone();
    manifest.truth_score = truth_score;
    store::write_manifest(paths, manifest)?;

    Ok(IterateOutcome {
        run_id: paths.run_id().to_string(),
        status: RunStatus::Ok.as_str().to_string(),
        iteration: next,
        decision,
        chosen_candidate_id,
        truth_score,
        summary_hash: solve.summary_hash,
    })
}

pub fn run_validate(
    ctx: &mut WorkflowContext,
    run_id: &str,
    top_k: Option<usize>,
) -> Result<ValidateOutcome> {
    let paths = RunPaths::new(&ctx.workspace, run_id);
    store::load_manifest(&paths)?;

    let mut ids = store::list_candidate_ids(&paths)?;
    if let Some(top_k) = top_k {
        ids.truncate(top_k);
    }
    if ids.is_empty() {
        return Err(anyhow!("no candidates found for run {run_id}"));
    }
    ctx.say(&format!("validate: {} candidates", ids.len()));

    let candidates = ids
        .iter()
        .map(|candidate_id| {
            let content = store::read_text(&paths.candidate_path(candidate_id))?;
            Ok(Candidate {
                candidate_id: candidate_id.clone(),
                score: 0.0,
                format: CIF_EXTENSION.to_string(),
                content,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let solve = match validate_candidates(ctx, &paths, &candidates) {
        Ok(solve) => solve,
        Err(err) => {
            mark_run_error(&paths);
            return Err(err);
        }
    };

    Ok(ValidateOutcome {
        run_id: paths.run_id().to_string(),
        status: RunStatus::Ok.as_str().to_string(),
        validated: solve.summary.total,
        best_candidate_id: best_candidate(&solve.summary),
        truth_score: best_truth_score(&solve.summary),
        summary_hash: solve.summary_hash,
    })
}

pub fn run_export(
    ctx: &WorkflowContext,
    run_id: &str,
    format: ExportFormat,
    top_k: Option<usize>,
) -> Result<ExportOutcome> {
    let paths = RunPaths::new(&ctx.workspace, run_id);
    store::load_manifest(&paths)?;

    let ordered: Vec<String> = if paths.summary_path().is_file() {
        let summary = store::load_summary(&paths)?;
        summary
            .top_candidates
            .iter()
            .map(|top| top.candidate_id.clone())
            .collect()
    } else {
        store::list_candidate_ids(&paths)?
    };
    let ids: Vec<String> = ordered.into_iter().take(top_k.unwrap_or(1)).collect();
    if ids.is_empty() {
        return Err(anyhow!("no candidates to export for run {run_id}"));
    }

    let mut files = Vec::with_capacity(ids.len());
    for candidate_id in &ids {
        let content = store::read_text(&paths.candidate_path(candidate_id))?;
        let payload = match format {
            ExportFormat::Cif => content,
            ExportFormat::Poscar => {
                format!("# POSCAR placeholder for {candidate_id}\n{content}")
            }
        };
        let path = paths.export_path(candidate_id, format.extension());
        store::write_text(&path, &payload)?;
        ctx.say(&format!("export: wrote {}", path.display()));
        files.push(path.display().to_string());
    }

    Ok(ExportOutcome {
        run_id: paths.run_id().to_string(),
        status: RunStatus::Ok.as_str().to_string(),
        format: format.extension().to_string(),
        candidate_ids: ids,
        files,
    })
}

struct SolveOutcome {
    candidate_ids: Vec<String>,
    summary: ValidationSummary,
    summary_hash: String,
}

fn solve_and_validate(
    ctx: &mut WorkflowContext,
    paths: &RunPaths,
    constraints: &ConstraintsSpec,
) -> Result<SolveOutcome> {
    let output = call_tool(
        ctx,
        paths,
        tools::RUN_QLIP,
        json!({ "constraints": constraints, "solver": ctx.config.solver }),
    )?;
    let candidates: Vec<Candidate> = parse_field(output, "candidates", tools::RUN_QLIP)?;
    for candidate in &candidates {
        if !store::candidate_id_regex().is_match(&candidate.candidate_id) {
            return Err(anyhow!(
                "run_qlip returned malformed candidate id {:?}",
                candidate.candidate_id
            ));
        }
        store::write_candidate(paths, candidate)?;
    }
    validate_candidates(ctx, paths, &candidates)
}

fn validate_candidates(
    ctx: &mut WorkflowContext,
    paths: &RunPaths,
    candidates: &[Candidate],
) -> Result<SolveOutcome> {
    let threshold = ctx.config.policy.truth_accept_threshold;
    let output = call_tool(
        ctx,
        paths,
        tools::BATCH_VALIDATE,
        json!({ "candidates": candidates, "truth_threshold": threshold }),
    )?;
    let reports: Vec<ValidationReport> = parse_field(output, "reports", tools::BATCH_VALIDATE)?;

    // The tool may return its own summary; authority stays local.
    let summary = aggregate_reports(&reports, threshold);
    for report in &reports {
        store::write_report(paths, report)?;
    }
    store::write_summary(paths, &summary)?;
    let summary_hash = canonical::summary_hash(&summary)?;

    Ok(SolveOutcome {
        candidate_ids: candidates
            .iter()
            .map(|candidate| candidate.candidate_id.clone())
            .collect(),
        summary,
        summary_hash,
    })
}

fn call_tool(
    ctx: &mut WorkflowContext,
    paths: &RunPaths,
    tool: &str,
    input: Value,
) -> Result<Value> {
    ctx.say(&format!("tool: {tool}"));
    match ctx.client.call(tool, &input) {
        Ok(output) => {
            store::append_event(paths, "tool_call", json!({ "tool": tool, "status": "ok" }))?;
            Ok(output)
        }
        Err(err) => {
            let _ = store::append_event(
                paths,
                "tool_call",
                json!({ "tool": tool, "status": "error", "error": format!("{err:#}") }),
            );
            Err(err)
        }
    }
}

fn parse_field<T: DeserializeOwned>(mut output: Value, field: &str, tool: &str) -> Result<T> {
    let value = output
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| anyhow!("{tool} output missing {field}"))?;
    serde_json::from_value(value).with_context(|| format!("parse {tool} output"))
}

fn best_candidate(summary: &ValidationSummary) -> Option<String> {
    (!summary.best_candidate_id.is_empty()).then(|| summary.best_candidate_id.clone())
}

fn best_truth_score(summary: &ValidationSummary) -> Option<f64> {
    summary.truth_scores.get(&summary.best_candidate_id).copied()
}

/// Best-effort terminal marking; the original error stays primary.
fn mark_run_error(paths: &RunPaths) {
    let Ok(mut manifest) = store::load_manifest(paths) else {
        return;
    };
    manifest.status = RunStatus::Error;
    if let Ok(now) = store::now_epoch_ms() {
        manifest.updated_at = now;
    }
    let _ = store::write_manifest(paths, &manifest);
}

/// CSV input (`Li,Fe,P,O`) normalizes to the dashed chemistry form.
fn normalize_chem_system(raw: &str) -> String {
    if raw.contains(',') {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    } else {
        raw.trim().to_string()
    }
}
