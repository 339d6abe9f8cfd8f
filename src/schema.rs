//! Schema types for runs, constraints, candidates, and validation artifacts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One chemistry proposal from the materials-data service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemistrySuggestion {
    pub chem_system: String,
    pub rationale: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatticePrior {
    pub symmetry: String,
}

/// Numeric and categorical ranges that constrain the MILP search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemistryPriors {
    pub lattice_prior: LatticePrior,
    /// `[min, max]` with `min <= max`, both positive.
    pub density_range: [f64; 2],
    pub oxidation_state_constraints: BTreeMap<String, Vec<i64>>,
    pub prototypes: Vec<String>,
}

/// Full constraint specification handed to the solver. `adjustments` is the
/// append-only history of policy decisions; its length equals the iteration
/// count of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintsSpec {
    pub chem_system: String,
    pub priors: ChemistryPriors,
    /// Solver tuning knobs, opaque to the orchestrator.
    pub overrides: serde_json::Map<String, Value>,
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Adjustment {
    pub iteration: u32,
    pub mode: PolicyMode,
    pub action: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    Relax,
    Tighten,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Relax => "relax",
            PolicyMode::Tighten => "tighten",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate structure returned by the solver. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Matches `cand_NNNN`.
    pub candidate_id: String,
    /// Solver-side score in `[0, 1]`.
    pub score: f64,
    pub format: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    Parseable,
    MinDistance,
    DensityInRange,
    ChargeNeutralityFeasible,
    CoordinationReasonable,
    SymmetryMatch,
}

impl CheckName {
    /// Every check name, in report order. The failure histogram carries all
    /// of these even when nothing failed.
    pub const ALL: [CheckName; 6] = [
        CheckName::Parseable,
        CheckName::MinDistance,
        CheckName::DensityInRange,
        CheckName::ChargeNeutralityFeasible,
        CheckName::CoordinationReasonable,
        CheckName::SymmetryMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::Parseable => "parseable",
            CheckName::MinDistance => "min_distance",
            CheckName::DensityInRange => "density_in_range",
            CheckName::ChargeNeutralityFeasible => "charge_neutrality_feasible",
            CheckName::CoordinationReasonable => "coordination_reasonable",
            CheckName::SymmetryMatch => "symmetry_match",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Info,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: CheckName,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<CheckSeverity>,
}

/// Per-candidate validator verdict. `accept` always equals
/// `truth_score >= truth_accept_threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub candidate_id: String,
    pub truth_score: f64,
    pub accept: bool,
    pub checks: Vec<ValidationCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopCandidate {
    pub candidate_id: String,
    pub truth_score: f64,
}

/// Reduction over all reports for one iteration. This is the only artifact
/// that is ever canonicalized and hashed, so it must stay free of timestamps
/// and paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub best_candidate_id: String,
    pub truth_scores: BTreeMap<String, f64>,
    pub failure_histogram: BTreeMap<String, u32>,
    /// Sorted by truth score descending, candidate id ascending on ties.
    pub top_candidates: Vec<TopCandidate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of a run. Created by discover, mutated only by discover
/// and iterate, never deleted. `status` moves running -> (ok | error) and
/// never back; `iteration <= max_iters` holds after every command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub status: RunStatus,
    pub objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chem_system: Option<String>,
    pub seed: u64,
    pub created_at: u128,
    pub updated_at: u128,
    pub iteration: u32,
    pub max_iters: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_candidate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_score: Option<f64>,
    pub config_snapshot: Value,
}

/// Policy output for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub mode: PolicyMode,
    pub action: String,
}

/// Persisted as `iteration_<n>.json` after each feedback pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub decision: Decision,
    pub summary_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_candidate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_score: Option<f64>,
}
